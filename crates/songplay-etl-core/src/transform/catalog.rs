//! Song and artist dimensions derived from catalog documents.

use crate::{
    records::CatalogRecord,
    transform::dedup::{DedupKey, F64Key, dedup},
};

/// One row of `songs_table`.
#[derive(Debug, Clone, PartialEq)]
pub struct SongRow {
    /// Catalog song identifier.
    pub song_id: Option<String>,
    /// Song title.
    pub title: Option<String>,
    /// Catalog artist identifier.
    pub artist_id: Option<String>,
    /// Release year; negative catalog values are unknown.
    pub year: Option<i32>,
    /// Track length in seconds.
    pub duration: Option<f64>,
}

impl DedupKey for SongRow {
    type Key = (
        Option<String>,
        Option<String>,
        Option<String>,
        Option<i32>,
        Option<F64Key>,
    );

    fn dedup_key(&self) -> Self::Key {
        (
            self.song_id.clone(),
            self.title.clone(),
            self.artist_id.clone(),
            self.year,
            F64Key::of(self.duration),
        )
    }
}

/// One row of `artist_table`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtistRow {
    /// Catalog artist identifier.
    pub artist_id: Option<String>,
    /// Artist display name.
    pub name: Option<String>,
    /// Artist location text.
    pub location: Option<String>,
    /// Latitude in degrees.
    pub latitude: Option<f64>,
    /// Longitude in degrees.
    pub longitude: Option<f64>,
}

impl DedupKey for ArtistRow {
    type Key = (
        Option<String>,
        Option<String>,
        Option<String>,
        Option<F64Key>,
        Option<F64Key>,
    );

    fn dedup_key(&self) -> Self::Key {
        (
            self.artist_id.clone(),
            self.name.clone(),
            self.location.clone(),
            F64Key::of(self.latitude),
            F64Key::of(self.longitude),
        )
    }
}

/// Project catalog documents to distinct song rows.
pub fn extract_songs(records: &[CatalogRecord]) -> Vec<SongRow> {
    let rows = records
        .iter()
        .map(|r| SongRow {
            song_id: r.song_id.clone(),
            title: r.title.clone(),
            artist_id: r.artist_id.clone(),
            year: r.year.filter(|y| *y >= 0),
            duration: r.duration,
        })
        .collect();
    dedup(rows)
}

/// Project catalog documents to distinct artist rows.
pub fn extract_artists(records: &[CatalogRecord]) -> Vec<ArtistRow> {
    let rows = records
        .iter()
        .map(|r| ArtistRow {
            artist_id: r.artist_id.clone(),
            name: r.artist_name.clone(),
            location: r.artist_location.clone(),
            latitude: r.artist_latitude,
            longitude: r.artist_longitude,
        })
        .collect();
    dedup(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(song_id: &str, artist_id: &str, year: Option<i32>) -> CatalogRecord {
        CatalogRecord {
            artist_id: Some(artist_id.to_string()),
            artist_name: Some(format!("{artist_id} name")),
            artist_location: Some("Chicago".to_string()),
            duration: Some(210.5),
            song_id: Some(song_id.to_string()),
            title: Some(format!("{song_id} title")),
            year,
            ..CatalogRecord::default()
        }
    }

    #[test]
    fn songs_are_projected_and_deduplicated() {
        let records = vec![
            record("S1", "AR1", Some(1999)),
            record("S2", "AR1", Some(0)),
            record("S1", "AR1", Some(1999)),
        ];
        let songs = extract_songs(&records);
        assert_eq!(songs.len(), 2);
        assert_eq!(songs[0].song_id.as_deref(), Some("S1"));
        assert_eq!(songs[0].title.as_deref(), Some("S1 title"));
        assert_eq!(songs[0].year, Some(1999));
        assert_eq!(songs[1].year, Some(0));
        assert_eq!(extract_songs(&records), songs);
    }

    #[test]
    fn rows_differing_in_one_field_are_kept() {
        let mut other = record("S1", "AR1", Some(1999));
        other.duration = Some(211.0);
        let songs = extract_songs(&[record("S1", "AR1", Some(1999)), other]);
        assert_eq!(songs.len(), 2);
    }

    #[test]
    fn negative_year_is_unknown() {
        let songs = extract_songs(&[record("S1", "AR1", Some(-1))]);
        assert_eq!(songs[0].year, None);
    }

    #[test]
    fn artists_rename_catalog_fields() {
        let mut with_coords = record("S3", "AR2", None);
        with_coords.artist_latitude = Some(41.88);
        with_coords.artist_longitude = Some(-87.63);

        let artists = extract_artists(&[
            record("S1", "AR1", None),
            record("S2", "AR1", None),
            with_coords,
        ]);
        assert_eq!(artists.len(), 2);
        assert_eq!(artists[0].name.as_deref(), Some("AR1 name"));
        assert_eq!(artists[0].location.as_deref(), Some("Chicago"));
        assert_eq!(artists[0].latitude, None);
        assert_eq!(artists[1].latitude, Some(41.88));
        assert_eq!(artists[1].longitude, Some(-87.63));
    }

    #[test]
    fn all_null_records_collapse_to_one_row() {
        let records = vec![CatalogRecord::default(), CatalogRecord::default()];
        assert_eq!(extract_songs(&records).len(), 1);
        assert_eq!(extract_artists(&records).len(), 1);
    }
}
