//! The songplay fact table.
//!
//! Each playback event is matched against the catalog on the business key
//! `(title, artist_name, duration)` with exact equality and no normalization.
//! The match is outer: an event without a catalog entry still yields one row
//! with null `song_id` and `artist_id`. A key component that is null never
//! matches anything.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Datelike, Utc};

use crate::{
    records::CatalogRecord,
    transform::{
        activity::{PlayEvents, user_id_from_text},
        dedup::{DedupKey, F64Key, dedup},
        time::{SessionTimeZone, start_time_from_ts},
    },
};

/// Business key shared by catalog entries and playback events.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JoinKey {
    title: String,
    artist_name: String,
    duration: F64Key,
}

impl JoinKey {
    /// Build a key; `None` when any component is null.
    pub fn new(
        title: Option<&str>,
        artist_name: Option<&str>,
        duration: Option<f64>,
    ) -> Option<Self> {
        Some(JoinKey {
            title: title?.to_string(),
            artist_name: artist_name?.to_string(),
            duration: F64Key::new(duration?),
        })
    }
}

/// Identifiers resolved for a matched event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CatalogMatch {
    /// Catalog song identifier.
    pub song_id: Option<String>,
    /// Catalog artist identifier.
    pub artist_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct CatalogEntry {
    title: Option<String>,
    artist_name: Option<String>,
    artist_id: Option<String>,
    duration: Option<f64>,
    song_id: Option<String>,
}

impl DedupKey for CatalogEntry {
    type Key = (
        Option<String>,
        Option<String>,
        Option<String>,
        Option<F64Key>,
        Option<String>,
    );

    fn dedup_key(&self) -> Self::Key {
        (
            self.title.clone(),
            self.artist_name.clone(),
            self.artist_id.clone(),
            F64Key::of(self.duration),
            self.song_id.clone(),
        )
    }
}

/// Lookup from business key to catalog identifiers.
///
/// Built from the distinct `(title, artist_name, artist_id, duration,
/// song_id)` projection of the catalog. When several distinct entries share a
/// key, the first in catalog order wins so every event still maps to exactly
/// one row; such keys are counted in [`CatalogIndex::ambiguous_keys`].
#[derive(Debug, Clone, Default)]
pub struct CatalogIndex {
    by_key: HashMap<JoinKey, CatalogMatch>,
    ambiguous: HashSet<JoinKey>,
    entries: usize,
}

impl CatalogIndex {
    /// Index catalog documents by business key.
    pub fn build(records: &[CatalogRecord]) -> Self {
        let entries = dedup(
            records
                .iter()
                .map(|r| CatalogEntry {
                    title: r.title.clone(),
                    artist_name: r.artist_name.clone(),
                    artist_id: r.artist_id.clone(),
                    duration: r.duration,
                    song_id: r.song_id.clone(),
                })
                .collect(),
        );

        let mut index = CatalogIndex {
            entries: entries.len(),
            ..CatalogIndex::default()
        };
        for entry in entries {
            let Some(key) = JoinKey::new(
                entry.title.as_deref(),
                entry.artist_name.as_deref(),
                entry.duration,
            ) else {
                continue;
            };
            let found = CatalogMatch {
                song_id: entry.song_id,
                artist_id: entry.artist_id,
            };
            match index.by_key.get(&key) {
                Some(existing) if *existing != found => {
                    index.ambiguous.insert(key);
                }
                Some(_) => {}
                None => {
                    index.by_key.insert(key, found);
                }
            }
        }
        index
    }

    /// Resolve an event's `(song, artist, length)`.
    pub fn lookup(
        &self,
        song: Option<&str>,
        artist: Option<&str>,
        length: Option<f64>,
    ) -> Option<&CatalogMatch> {
        self.by_key.get(&JoinKey::new(song, artist, length)?)
    }

    /// Distinct catalog entries the index was built from.
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Keys matched by more than one distinct catalog entry.
    pub fn ambiguous_keys(&self) -> usize {
        self.ambiguous.len()
    }
}

/// Composite identifier of a songplay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SongplayId {
    /// `userId` cast to integer.
    pub user_id: Option<i64>,
    /// Raw `sessionId`.
    pub session_id: Option<i64>,
    /// `itemInSession`.
    pub item_in_session: Option<i64>,
}

/// One row of `songplays_table`.
#[derive(Debug, Clone, PartialEq)]
pub struct SongplayRow {
    /// Composite identifier.
    pub songplay_id: SongplayId,
    /// Instant of the playback; null when `ts` does not convert.
    pub start_time: Option<DateTime<Utc>>,
    /// `userId` cast to integer.
    pub user_id: Option<i32>,
    /// Subscription level at the time of the event.
    pub level: Option<String>,
    /// Matched catalog song, if any.
    pub song_id: Option<String>,
    /// Matched catalog artist, if any.
    pub artist_id: Option<String>,
    /// `itemInSession` of the event.
    pub session_id: Option<i32>,
    /// User location text.
    pub location: Option<String>,
    /// Client user agent.
    pub user_agent: Option<String>,
    /// Year of `start_time` in the session time zone.
    pub year: Option<i32>,
    /// Month of `start_time` in the session time zone.
    pub month: Option<i32>,
}

/// Build one songplay per playback event, ordered by `start_time`
/// (stable; events with a null `start_time` first).
pub fn compose_songplays(
    events: &PlayEvents,
    index: &CatalogIndex,
    tz: SessionTimeZone,
) -> Vec<SongplayRow> {
    let mut rows: Vec<SongplayRow> = events
        .as_slice()
        .iter()
        .map(|e| {
            let user_id = user_id_from_text(e.user_id.as_deref());
            let start_time = start_time_from_ts(e.ts.as_deref());
            let local = start_time.map(|t| tz.local(t));
            let found = index.lookup(e.song.as_deref(), e.artist.as_deref(), e.length);

            SongplayRow {
                songplay_id: SongplayId {
                    user_id: user_id.map(i64::from),
                    session_id: e.session_id.map(i64::from),
                    item_in_session: e.item_in_session.map(i64::from),
                },
                start_time,
                user_id,
                level: e.level.clone(),
                song_id: found.and_then(|m| m.song_id.clone()),
                artist_id: found.and_then(|m| m.artist_id.clone()),
                session_id: e.item_in_session,
                location: e.location.clone(),
                user_agent: e.user_agent.clone(),
                year: local.map(|t| t.year()),
                month: local.map(|t| t.month() as i32),
            }
        })
        .collect();

    rows.sort_by_key(|r| r.start_time);
    rows
}
