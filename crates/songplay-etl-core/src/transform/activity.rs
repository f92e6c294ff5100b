//! Playback filtering and the user dimension.

use crate::{
    records::ActivityRecord,
    transform::dedup::{DedupKey, dedup},
};

/// `page` value marking an actual playback.
pub const NEXT_SONG_PAGE: &str = "NextSong";

/// Activity records that passed the playback filter.
///
/// Only [`filter_song_plays`] builds this, so every stage taking
/// `&PlayEvents` sees playbacks and nothing else.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayEvents(Vec<ActivityRecord>);

impl PlayEvents {
    /// The events in input order.
    pub fn as_slice(&self) -> &[ActivityRecord] {
        &self.0
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no event passed the filter.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Keep only records whose `page` is exactly `NextSong`.
pub fn filter_song_plays(records: Vec<ActivityRecord>) -> PlayEvents {
    PlayEvents(
        records
            .into_iter()
            .filter(|r| r.page.as_deref() == Some(NEXT_SONG_PAGE))
            .collect(),
    )
}

/// Cast a textual `userId` to an integer. Values that are not a base-10
/// `i32` after trimming become `None`.
pub fn user_id_from_text(raw: Option<&str>) -> Option<i32> {
    raw?.trim().parse().ok()
}

/// One row of `users_table`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserRow {
    /// User identifier. Never null.
    pub user_id: i32,
    /// First name.
    pub first_name: Option<String>,
    /// Last name.
    pub last_name: Option<String>,
    /// Gender.
    pub gender: Option<String>,
    /// Subscription level at the time of the event.
    pub level: Option<String>,
}

impl DedupKey for UserRow {
    type Key = UserRow;

    fn dedup_key(&self) -> Self::Key {
        self.clone()
    }
}

/// Project playback events to distinct user rows.
///
/// Events whose `userId` does not cast to an integer are skipped: the user
/// dimension never holds a null key. A user whose level changed appears
/// once per distinct level.
pub fn extract_users(events: &PlayEvents) -> Vec<UserRow> {
    let rows = events
        .as_slice()
        .iter()
        .filter_map(|e| {
            Some(UserRow {
                user_id: user_id_from_text(e.user_id.as_deref())?,
                first_name: e.first_name.clone(),
                last_name: e.last_name.clone(),
                gender: e.gender.clone(),
                level: e.level.clone(),
            })
        })
        .collect();
    dedup(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(user_id: &str, page: &str, level: &str) -> ActivityRecord {
        ActivityRecord {
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            gender: Some("F".to_string()),
            level: Some(level.to_string()),
            page: Some(page.to_string()),
            ts: Some("1542242481796".to_string()),
            user_id: Some(user_id.to_string()),
            ..ActivityRecord::default()
        }
    }

    #[test]
    fn filter_keeps_only_next_song() {
        let plays = filter_song_plays(vec![
            event("1", "Home", "free"),
            event("2", "NextSong", "free"),
            event("3", "nextsong", "free"),
            event("4", "Logout", "free"),
            ActivityRecord::default(),
            event("5", "NextSong", "paid"),
        ]);
        let ids: Vec<_> = plays
            .as_slice()
            .iter()
            .filter_map(|r| r.user_id.as_deref())
            .collect();
        assert_eq!(ids, vec!["2", "5"]);
    }

    #[test]
    fn users_come_only_from_playbacks() {
        let plays = filter_song_plays(vec![
            event("1", "Home", "free"),
            event("2", "NextSong", "free"),
        ]);
        let users = extract_users(&plays);
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].user_id, 2);
    }

    #[test]
    fn users_dedup_exact_rows_only() {
        let plays = filter_song_plays(vec![
            event("42", "NextSong", "free"),
            event("42", "NextSong", "free"),
            event("42", "NextSong", "paid"),
        ]);
        let users = extract_users(&plays);
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].level.as_deref(), Some("free"));
        assert_eq!(users[1].level.as_deref(), Some("paid"));
    }

    #[test]
    fn users_skip_non_numeric_ids() {
        let plays = filter_song_plays(vec![
            event("abc", "NextSong", "free"),
            event(" 7 ", "NextSong", "free"),
        ]);
        let users = extract_users(&plays);
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].user_id, 7);
    }

    #[test]
    fn user_id_cast() {
        assert_eq!(user_id_from_text(Some("42")), Some(42));
        assert_eq!(user_id_from_text(Some("")), None);
        assert_eq!(user_id_from_text(Some("4.2")), None);
        assert_eq!(user_id_from_text(None), None);
    }
}
