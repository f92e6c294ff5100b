//! Raw source records and schema enforcement.
//!
//! Both sources are JSON Lines. Every line is decoded against a fixed schema
//! where every field is optional: a field that is absent or carries the wrong
//! JSON type becomes `None` (see [`lenient`]). A line that is not a JSON
//! object at all decodes to a record with every field `None`.

pub mod lenient;

use serde_json::{Map, Value};

use lenient::{double_field, int_field, string_field};

/// A record type decodable from one JSON object.
pub trait SourceRecord: Default + Send {
    /// Short name of the source, used in logs and reports.
    const SOURCE: &'static str;

    /// Decode a record from a JSON object, nulling mismatched fields.
    fn from_object(obj: &Map<String, Value>) -> Self;
}

/// Outcome of decoding a single source line.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine<R> {
    /// The line was a JSON object.
    Record(R),
    /// The line was not a JSON object; holds the all-null record.
    Corrupt(R),
}

impl<R> ParsedLine<R> {
    /// The decoded record, regardless of whether the line was corrupt.
    pub fn into_record(self) -> R {
        match self {
            ParsedLine::Record(r) | ParsedLine::Corrupt(r) => r,
        }
    }
}

/// Decode one line of a JSON Lines source.
pub fn parse_line<R: SourceRecord>(line: &str) -> ParsedLine<R> {
    match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(obj)) => ParsedLine::Record(R::from_object(&obj)),
        _ => ParsedLine::Corrupt(R::default()),
    }
}

/// One song-catalog document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogRecord {
    /// Free-form artist field (unused downstream, kept for schema fidelity).
    pub artist: Option<String>,
    /// Catalog artist identifier.
    pub artist_id: Option<String>,
    /// Artist latitude in degrees.
    pub artist_latitude: Option<f64>,
    /// Artist location text.
    pub artist_location: Option<String>,
    /// Artist longitude in degrees.
    pub artist_longitude: Option<f64>,
    /// Artist display name; part of the fact join key.
    pub artist_name: Option<String>,
    /// Track length in seconds; part of the fact join key.
    pub duration: Option<f64>,
    /// Number of songs in the document.
    pub num_songs: Option<i32>,
    /// Catalog song identifier.
    pub song_id: Option<String>,
    /// Song title; part of the fact join key.
    pub title: Option<String>,
    /// Release year (`0` in the catalog means unknown).
    pub year: Option<i32>,
}

impl SourceRecord for CatalogRecord {
    const SOURCE: &'static str = "catalog";

    fn from_object(obj: &Map<String, Value>) -> Self {
        CatalogRecord {
            artist: string_field(obj, "artist"),
            artist_id: string_field(obj, "artist_id"),
            artist_latitude: double_field(obj, "artist_latitude"),
            artist_location: string_field(obj, "artist_location"),
            artist_longitude: double_field(obj, "artist_longitude"),
            artist_name: string_field(obj, "artist_name"),
            duration: double_field(obj, "duration"),
            num_songs: int_field(obj, "num_songs"),
            song_id: string_field(obj, "song_id"),
            title: string_field(obj, "title"),
            year: int_field(obj, "year"),
        }
    }
}

/// Name of the `userId` field in the activity log.
pub const USER_ID_FIELD: &str = "userId";
/// Name of the `ts` field in the activity log.
pub const TS_FIELD: &str = "ts";

/// One activity-log event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityRecord {
    /// Artist name as reported by the client.
    pub artist: Option<String>,
    /// Authentication state.
    pub auth: Option<String>,
    /// User first name.
    pub first_name: Option<String>,
    /// User gender.
    pub gender: Option<String>,
    /// Position of the event within its session.
    pub item_in_session: Option<i32>,
    /// User last name.
    pub last_name: Option<String>,
    /// Track length in seconds as reported by the client.
    pub length: Option<f64>,
    /// Subscription level (`free` / `paid`).
    pub level: Option<String>,
    /// User location text.
    pub location: Option<String>,
    /// HTTP method of the request.
    pub method: Option<String>,
    /// Page the event happened on; `NextSong` marks a playback.
    pub page: Option<String>,
    /// Registration marker.
    pub registration: Option<String>,
    /// Session identifier.
    pub session_id: Option<i32>,
    /// Song title as reported by the client.
    pub song: Option<String>,
    /// HTTP status code.
    pub status: Option<i32>,
    /// Epoch milliseconds as a digit string. Required.
    pub ts: Option<String>,
    /// Client user agent.
    pub user_agent: Option<String>,
    /// User identifier. Required.
    pub user_id: Option<String>,
}

impl SourceRecord for ActivityRecord {
    const SOURCE: &'static str = "activity";

    fn from_object(obj: &Map<String, Value>) -> Self {
        ActivityRecord {
            artist: string_field(obj, "artist"),
            auth: string_field(obj, "auth"),
            first_name: string_field(obj, "firstName"),
            gender: string_field(obj, "gender"),
            item_in_session: int_field(obj, "itemInSession"),
            last_name: string_field(obj, "lastName"),
            length: double_field(obj, "length"),
            level: string_field(obj, "level"),
            location: string_field(obj, "location"),
            method: string_field(obj, "method"),
            page: string_field(obj, "page"),
            registration: string_field(obj, "registration"),
            session_id: int_field(obj, "sessionId"),
            song: string_field(obj, "song"),
            status: int_field(obj, "status"),
            ts: string_field(obj, TS_FIELD),
            user_agent: string_field(obj, "userAgent"),
            user_id: string_field(obj, USER_ID_FIELD),
        }
    }
}

impl ActivityRecord {
    /// Names of the required fields that are absent, null, or empty.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let blank = |v: &Option<String>| v.as_deref().is_none_or(str::is_empty);

        let mut missing = Vec::new();
        if blank(&self.user_id) {
            missing.push(USER_ID_FIELD);
        }
        if blank(&self.ts) {
            missing.push(TS_FIELD);
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::time::start_time_from_ts;

    const LOG_LINE: &str = r#"{"artist":"Artist X","auth":"Logged In","firstName":"Ada","gender":"F","itemInSession":3,"lastName":"Lovelace","length":210.5,"level":"paid","location":"London","method":"PUT","page":"NextSong","registration":1.540919166796E12,"sessionId":100,"song":"Song A","status":200,"ts":1542242481796,"userAgent":"Mozilla/5.0","userId":"42"}"#;

    #[test]
    fn activity_line_maps_camel_case_fields() {
        let rec = parse_line::<ActivityRecord>(LOG_LINE).into_record();
        assert_eq!(rec.first_name.as_deref(), Some("Ada"));
        assert_eq!(rec.item_in_session, Some(3));
        assert_eq!(rec.session_id, Some(100));
        assert_eq!(rec.length, Some(210.5));
        assert_eq!(rec.ts.as_deref(), Some("1542242481796"));
        assert_eq!(rec.user_id.as_deref(), Some("42"));
        assert_eq!(rec.user_agent.as_deref(), Some("Mozilla/5.0"));
        assert!(rec.missing_required().is_empty());
    }

    #[test]
    fn float_ts_does_not_become_an_instant() {
        let line = r#"{"page":"NextSong","ts":1.542242481796E12,"userId":"42"}"#;
        let rec = parse_line::<ActivityRecord>(line).into_record();
        assert_eq!(rec.ts.as_deref(), Some("1.542242481796E12"));
        assert!(rec.missing_required().is_empty());
        assert_eq!(start_time_from_ts(rec.ts.as_deref()), None);
    }

    #[test]
    fn mismatched_types_degrade_to_null() {
        let line = r#"{"song_id":"S1","duration":"long","year":"1999","artist_latitude":12.5}"#;
        let rec = parse_line::<CatalogRecord>(line).into_record();
        assert_eq!(rec.song_id.as_deref(), Some("S1"));
        assert_eq!(rec.duration, None);
        assert_eq!(rec.year, None);
        assert_eq!(rec.artist_latitude, Some(12.5));
    }

    #[test]
    fn non_object_lines_are_corrupt() {
        for line in ["not json", "[1,2,3]", "\"text\"", "{\"unterminated\":"] {
            let parsed = parse_line::<CatalogRecord>(line);
            assert_eq!(parsed, ParsedLine::Corrupt(CatalogRecord::default()));
        }
    }

    #[test]
    fn missing_required_treats_empty_user_id_as_missing() {
        let rec = parse_line::<ActivityRecord>(r#"{"userId":"","page":"Home"}"#).into_record();
        assert_eq!(rec.missing_required(), vec![USER_ID_FIELD, TS_FIELD]);

        let rec = parse_line::<ActivityRecord>(r#"{"userId":"7","ts":null}"#).into_record();
        assert_eq!(rec.missing_required(), vec![TS_FIELD]);
    }
}
