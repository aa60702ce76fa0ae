//! Persisted history document and its legacy shape
//!
//! The current shape is a JSON list of sessions. Older deployments stored a
//! flat list of turns; those documents are decoded by shape and upgraded into
//! a single session with a deterministic id so repeated loads agree.

use super::types::{summarize, ChatSession, ChatTurn, SessionCollection};
use crate::error::StorageResult;
use serde::Deserialize;

/// Either shape the history document may take on disk
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum HistoryDocument {
    /// List of sessions
    Sessions(Vec<ChatSession>),
    /// Flat list of turns written before sessions existed
    Legacy(Vec<ChatTurn>),
}

impl HistoryDocument {
    /// Decode a document by shape
    ///
    /// # Errors
    ///
    /// Returns `NebenchatError::Serialization` when the text matches neither shape
    pub fn parse(text: &str) -> StorageResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Whether this is the pre-session shape
    pub fn is_legacy(&self) -> bool {
        matches!(self, HistoryDocument::Legacy(_))
    }

    /// Convert into the session collection, back-filling summaries
    ///
    /// A non-empty legacy list becomes one session with id
    /// `legacy-<unix seconds of first turn>`, spanning its first and last
    /// timestamps.
    pub fn upgrade(self) -> SessionCollection {
        match self {
            HistoryDocument::Sessions(mut sessions) => {
                for session in sessions.iter_mut().filter(|s| s.summary.is_empty()) {
                    session.refresh_summary();
                }
                SessionCollection::from(sessions)
            }
            HistoryDocument::Legacy(turns) => {
                let (Some(first), Some(last)) = (turns.first(), turns.last()) else {
                    return SessionCollection::new();
                };
                let session = ChatSession {
                    session_id: format!("legacy-{}", first.timestamp.timestamp()),
                    created_at: first.timestamp,
                    updated_at: last.timestamp,
                    summary: summarize(&first.user_message),
                    vector_store_id: None,
                    exchanges: turns.clone(),
                };
                tracing::debug!(
                    "Upgraded legacy history with {} turns into session {}",
                    session.exchanges.len(),
                    session.session_id
                );
                SessionCollection::from(vec![session])
            }
        }
    }
}

/// Serialize a collection the way it is stored
pub fn to_json(collection: &SessionCollection) -> StorageResult<String> {
    Ok(serde_json::to_string_pretty(collection)?)
}

/// Timestamps as RFC 3339 with the local offset
///
/// Naive ISO-8601 values, as written by older versions, are read as local
/// time.
pub mod timestamp {
    use chrono::{DateTime, Local, LocalResult, NaiveDateTime, TimeZone};
    use serde::{de, Deserialize, Deserializer, Serializer};

    /// Write `value` as RFC 3339
    pub fn serialize<S: Serializer>(
        value: &DateTime<Local>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    /// Read an RFC 3339 or naive ISO-8601 timestamp
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Local>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {}", raw)))
    }

    /// Parse either accepted form
    pub fn parse(raw: &str) -> Option<DateTime<Local>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Local));
        }
        let naive = raw.parse::<NaiveDateTime>().ok()?;
        Some(from_wall_clock(&Local, &naive))
    }

    /// A wall-clock time skipped by a DST change is read as UTC
    fn from_wall_clock<Tz: TimeZone>(tz: &Tz, naive: &NaiveDateTime) -> DateTime<Tz> {
        resolve(tz.from_local_datetime(naive), || tz.from_utc_datetime(naive))
    }

    /// Earliest of an ambiguous pair, `skipped` inside a gap
    fn resolve<T>(result: LocalResult<T>, skipped: impl FnOnce() -> T) -> T {
        match result {
            LocalResult::Single(value) => value,
            LocalResult::Ambiguous(earliest, _) => earliest,
            LocalResult::None => skipped(),
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_skipped_wall_clock_falls_back() {
            assert_eq!(resolve(LocalResult::None, || 7), 7);
            assert_eq!(resolve(LocalResult::Ambiguous(1, 2), || 7), 1);
            assert_eq!(resolve(LocalResult::Single(3), || 7), 3);
        }

        #[test]
        fn test_spring_forward_times_parse() {
            // Skipped in Europe and North America respectively
            assert!(parse("2024-03-31T02:30:00").is_some());
            assert!(parse("2024-03-10T02:30:00").is_some());
        }
    }
}
