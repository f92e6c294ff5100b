//! Arrow encodings of the star-schema rows.

use std::sync::Arc;

use arrow::{
    datatypes::{DataType, Field, Fields, Schema, SchemaRef, TimeUnit},
    error::ArrowError,
    record_batch::RecordBatch,
};
use arrow_array::{
    ArrayRef, Float64Array, Int32Array, Int64Array, StringArray, StructArray,
    TimestampMicrosecondArray,
};
use chrono::{DateTime, Utc};

use crate::transform::{
    activity::UserRow,
    catalog::{ArtistRow, SongRow},
    songplays::SongplayRow,
    time::TimeRow,
};

/// Time zone recorded on every `start_time` column.
pub const START_TIME_TZ: &str = "UTC";

/// A row type the sink can write.
pub trait TableRow {
    /// Arrow schema of the table.
    fn schema() -> SchemaRef;

    /// Encode `rows` as one batch matching [`TableRow::schema`].
    fn encode(rows: &[&Self]) -> Result<RecordBatch, ArrowError>;

    /// Textual value of a partition column for this row.
    fn partition_value(&self, column: &str) -> Option<String>;
}

fn start_time_type() -> DataType {
    DataType::Timestamp(TimeUnit::Microsecond, Some(START_TIME_TZ.into()))
}

fn micros(t: DateTime<Utc>) -> i64 {
    t.timestamp_micros()
}

fn strings<'a, R: 'a>(rows: &[&'a R], f: impl Fn(&'a R) -> Option<&'a str>) -> ArrayRef {
    Arc::new(rows.iter().copied().map(f).collect::<StringArray>())
}

fn int32s<R>(rows: &[&R], f: impl Fn(&R) -> Option<i32>) -> ArrayRef {
    Arc::new(rows.iter().copied().map(f).collect::<Int32Array>())
}

fn float64s<R>(rows: &[&R], f: impl Fn(&R) -> Option<f64>) -> ArrayRef {
    Arc::new(rows.iter().copied().map(f).collect::<Float64Array>())
}

fn int64s<R>(rows: &[&R], f: impl Fn(&R) -> Option<i64>) -> ArrayRef {
    Arc::new(rows.iter().copied().map(f).collect::<Int64Array>())
}

fn timestamps<R>(rows: &[&R], f: impl Fn(&R) -> Option<DateTime<Utc>>) -> ArrayRef {
    Arc::new(
        rows.iter()
            .map(|r| f(*r).map(micros))
            .collect::<TimestampMicrosecondArray>()
            .with_timezone(START_TIME_TZ),
    )
}

impl TableRow for SongRow {
    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("song_id", DataType::Utf8, true),
            Field::new("title", DataType::Utf8, true),
            Field::new("artist_id", DataType::Utf8, true),
            Field::new("year", DataType::Int32, true),
            Field::new("duration", DataType::Float64, true),
        ]))
    }

    fn encode(rows: &[&Self]) -> Result<RecordBatch, ArrowError> {
        RecordBatch::try_new(
            Self::schema(),
            vec![
                strings(rows, |r| r.song_id.as_deref()),
                strings(rows, |r| r.title.as_deref()),
                strings(rows, |r| r.artist_id.as_deref()),
                int32s(rows, |r| r.year),
                float64s(rows, |r| r.duration),
            ],
        )
    }

    fn partition_value(&self, column: &str) -> Option<String> {
        match column {
            "year" => self.year.map(|y| y.to_string()),
            "artist_id" => self.artist_id.clone(),
            _ => None,
        }
    }
}

impl TableRow for ArtistRow {
    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("artist_id", DataType::Utf8, true),
            Field::new("name", DataType::Utf8, true),
            Field::new("location", DataType::Utf8, true),
            Field::new("latitude", DataType::Float64, true),
            Field::new("longitude", DataType::Float64, true),
        ]))
    }

    fn encode(rows: &[&Self]) -> Result<RecordBatch, ArrowError> {
        RecordBatch::try_new(
            Self::schema(),
            vec![
                strings(rows, |r| r.artist_id.as_deref()),
                strings(rows, |r| r.name.as_deref()),
                strings(rows, |r| r.location.as_deref()),
                float64s(rows, |r| r.latitude),
                float64s(rows, |r| r.longitude),
            ],
        )
    }

    fn partition_value(&self, _column: &str) -> Option<String> {
        None
    }
}

impl TableRow for UserRow {
    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("user_id", DataType::Int32, false),
            Field::new("first_name", DataType::Utf8, true),
            Field::new("last_name", DataType::Utf8, true),
            Field::new("gender", DataType::Utf8, true),
            Field::new("level", DataType::Utf8, true),
        ]))
    }

    fn encode(rows: &[&Self]) -> Result<RecordBatch, ArrowError> {
        RecordBatch::try_new(
            Self::schema(),
            vec![
                int32s(rows, |r| Some(r.user_id)),
                strings(rows, |r| r.first_name.as_deref()),
                strings(rows, |r| r.last_name.as_deref()),
                strings(rows, |r| r.gender.as_deref()),
                strings(rows, |r| r.level.as_deref()),
            ],
        )
    }

    fn partition_value(&self, _column: &str) -> Option<String> {
        None
    }
}

impl TableRow for TimeRow {
    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("start_time", start_time_type(), false),
            Field::new("hour", DataType::Int32, false),
            Field::new("day", DataType::Int32, false),
            Field::new("week", DataType::Int32, false),
            Field::new("month", DataType::Int32, false),
            Field::new("year", DataType::Int32, false),
            Field::new("weekday", DataType::Utf8, false),
        ]))
    }

    fn encode(rows: &[&Self]) -> Result<RecordBatch, ArrowError> {
        RecordBatch::try_new(
            Self::schema(),
            vec![
                timestamps(rows, |r| Some(r.start_time)),
                int32s(rows, |r| Some(r.hour)),
                int32s(rows, |r| Some(r.day)),
                int32s(rows, |r| Some(r.week)),
                int32s(rows, |r| Some(r.month)),
                int32s(rows, |r| Some(r.year)),
                strings(rows, |r| Some(r.weekday.as_str())),
            ],
        )
    }

    fn partition_value(&self, column: &str) -> Option<String> {
        match column {
            "year" => Some(self.year.to_string()),
            "month" => Some(self.month.to_string()),
            _ => None,
        }
    }
}

fn songplay_id_fields() -> Fields {
    Fields::from(vec![
        Field::new("user_id", DataType::Int64, true),
        Field::new("session_id", DataType::Int64, true),
        Field::new("item_in_session", DataType::Int64, true),
    ])
}

impl TableRow for SongplayRow {
    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("songplay_id", DataType::Struct(songplay_id_fields()), false),
            Field::new("start_time", start_time_type(), true),
            Field::new("user_id", DataType::Int32, true),
            Field::new("level", DataType::Utf8, true),
            Field::new("song_id", DataType::Utf8, true),
            Field::new("artist_id", DataType::Utf8, true),
            Field::new("session_id", DataType::Int32, true),
            Field::new("location", DataType::Utf8, true),
            Field::new("user_agent", DataType::Utf8, true),
            Field::new("year", DataType::Int32, true),
            Field::new("month", DataType::Int32, true),
        ]))
    }

    fn encode(rows: &[&Self]) -> Result<RecordBatch, ArrowError> {
        let songplay_id = StructArray::try_new(
            songplay_id_fields(),
            vec![
                int64s(rows, |r| r.songplay_id.user_id),
                int64s(rows, |r| r.songplay_id.session_id),
                int64s(rows, |r| r.songplay_id.item_in_session),
            ],
            None,
        )?;

        RecordBatch::try_new(
            Self::schema(),
            vec![
                Arc::new(songplay_id) as ArrayRef,
                timestamps(rows, |r| r.start_time),
                int32s(rows, |r| r.user_id),
                strings(rows, |r| r.level.as_deref()),
                strings(rows, |r| r.song_id.as_deref()),
                strings(rows, |r| r.artist_id.as_deref()),
                int32s(rows, |r| r.session_id),
                strings(rows, |r| r.location.as_deref()),
                strings(rows, |r| r.user_agent.as_deref()),
                int32s(rows, |r| r.year),
                int32s(rows, |r| r.month),
            ],
        )
    }

    fn partition_value(&self, column: &str) -> Option<String> {
        match column {
            "year" => self.year.map(|y| y.to_string()),
            "month" => self.month.map(|m| m.to_string()),
            _ => None,
        }
    }
}
