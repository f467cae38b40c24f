//! Rejected play records and their tallies.

use serde::{Deserialize, Serialize};

/// Why a play event produced no `songplays` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The event has a null artist or song.
    MissingJoinKey,
    /// No catalog row has the same artist and title.
    NoCatalogMatch,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MissingJoinKey => "missing_join_key",
            RejectReason::NoCatalogMatch => "no_catalog_match",
        }
    }
}

/// A play event that did not match the song catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedPlay {
    pub user_id: Option<String>,
    pub session_id: Option<i64>,
    pub start_time: Option<i64>,
    pub artist: Option<String>,
    pub song: Option<String>,
    pub reason: RejectReason,
}

/// Rejected play counts by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RejectStats {
    pub missing_join_key: usize,
    pub no_catalog_match: usize,
}

impl RejectStats {
    /// Count one rejected play.
    pub fn increment(&mut self, reason: RejectReason) {
        match reason {
            RejectReason::MissingJoinKey => self.missing_join_key += 1,
            RejectReason::NoCatalogMatch => self.no_catalog_match += 1,
        }
    }

    /// Get total rejected count.
    pub fn total(&self) -> usize {
        self.missing_join_key + self.no_catalog_match
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_stats_increment() {
        let mut stats = RejectStats::default();
        stats.increment(RejectReason::NoCatalogMatch);
        stats.increment(RejectReason::NoCatalogMatch);
        stats.increment(RejectReason::MissingJoinKey);

        assert_eq!(stats.no_catalog_match, 2);
        assert_eq!(stats.missing_join_key, 1);
        assert_eq!(stats.total(), 3);
    }

    #[test]
    fn test_rejected_play_serialization() {
        let play = RejectedPlay {
            user_id: Some("26".to_string()),
            session_id: Some(583),
            start_time: Some(1542241826),
            artist: Some("Sam Cooke".to_string()),
            song: None,
            reason: RejectReason::MissingJoinKey,
        };

        let json = serde_json::to_string(&play).unwrap();
        assert!(json.contains("\"reason\":\"missing_join_key\""));
        assert!(json.contains("\"song\":null"));

        let back: RejectedPlay = serde_json::from_str(&json).unwrap();
        assert_eq!(back, play);
    }
}
