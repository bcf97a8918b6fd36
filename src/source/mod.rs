//! History event sources.
//!
//! An [`EventSource`] yields each user's recommendations and logged meals,
//! newest first. Two adapters exist: the Firestore REST API and a local
//! JSON snapshot.

pub mod firestore;
pub mod snapshot;

pub use firestore::{FirestoreClient, FirestoreConfig};
pub use snapshot::SnapshotSource;

use crate::config::{Config, SourceKind};
use crate::error::SourceUnavailableError;
use crate::models::{
    localize_timestamp, shift_timestamp, HistoryEvent, MealTakenEvent, RecommendationEvent,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::FixedOffset;
use std::cmp::Reverse;
use std::path::PathBuf;
use tracing::info;

/// Pull-based access to a user's history streams.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Human-readable source name.
    fn name(&self) -> &str;

    /// Recommendations, newest first.
    async fn fetch_recommendations(
        &self,
        user_id: &str,
    ) -> Result<Vec<RecommendationEvent>, SourceUnavailableError>;

    /// Logged meals, newest first.
    async fn fetch_meals_taken(
        &self,
        user_id: &str,
    ) -> Result<Vec<MealTakenEvent>, SourceUnavailableError>;

    /// The most recently logged meal, if any.
    async fn fetch_latest_meal(
        &self,
        user_id: &str,
    ) -> Result<Option<MealTakenEvent>, SourceUnavailableError> {
        Ok(self.fetch_meals_taken(user_id).await?.into_iter().next())
    }
}

/// Sort events newest first. Events without a usable timestamp keep their
/// relative order at the end.
pub fn sort_newest_first<E: HistoryEvent>(events: &mut [E]) {
    events.sort_by_key(|e| Reverse(e.captured_at().ok()));
}

/// Timestamp field accessor shared by both event kinds.
pub(crate) trait TimestampMut {
    fn timestamp_mut(&mut self) -> &mut Option<String>;
}

impl TimestampMut for RecommendationEvent {
    fn timestamp_mut(&mut self) -> &mut Option<String> {
        &mut self.recommended_at
    }
}

impl TimestampMut for MealTakenEvent {
    fn timestamp_mut(&mut self) -> &mut Option<String> {
        &mut self.taken_at
    }
}

/// Re-express every parseable timestamp in `offset`.
pub(crate) fn apply_offset<E: TimestampMut>(events: &mut [E], offset: Option<FixedOffset>) {
    let Some(offset) = offset else {
        return;
    };
    for event in events {
        if let Some(raw) = event.timestamp_mut() {
            *raw = shift_timestamp(raw, offset);
        }
    }
}

/// Re-express every parseable timestamp in the local zone.
pub(crate) fn apply_local_zone<E: TimestampMut>(events: &mut [E]) {
    for event in events {
        if let Some(raw) = event.timestamp_mut() {
            *raw = localize_timestamp(raw);
        }
    }
}

/// Build the configured event source.
///
/// The Firestore adapter takes its ID token separately since it is never
/// stored in the config file.
pub fn build_source(config: &Config, id_token: Option<String>) -> Result<Box<dyn EventSource>> {
    let utc_offset = config.source.utc_offset()?;

    match config.source.kind {
        SourceKind::Firestore => {
            let fs_config = FirestoreConfig {
                base_url: config.source.base_url.clone(),
                project_id: config.source.project_id.clone(),
                database: config.source.database.clone(),
                api_key: non_empty(&config.source.api_key),
                id_token,
                timeout_seconds: config.source.timeout_seconds,
                utc_offset,
            };
            info!(
                "Using Firestore project {} ({})",
                fs_config.project_id, fs_config.database
            );
            Ok(Box::new(FirestoreClient::new(fs_config)?))
        }
        SourceKind::Snapshot => {
            let path = PathBuf::from(&config.source.snapshot_path);
            info!("Using snapshot file {}", path.display());
            Ok(Box::new(SnapshotSource::new(path, utc_offset)))
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Payload;
    use chrono::{DateTime, Local, TimeZone};

    fn meal(id: &str, at: Option<&str>) -> MealTakenEvent {
        MealTakenEvent {
            id: id.to_string(),
            meal_taken: Payload::Absent,
            taken_at: at.map(String::from),
            meal_type: Some("lunch".to_string()),
        }
    }

    #[test]
    fn test_sort_newest_first() {
        let mut meals = vec![
            meal("old", Some("2024-01-01T12:00:00Z")),
            meal("broken", Some("??")),
            meal("new", Some("2024-03-01T12:00:00Z")),
            meal("missing", None),
            meal("mid", Some("2024-02-01T12:00:00+05:00")),
        ];

        sort_newest_first(&mut meals);
        let ids: Vec<&str> = meals.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old", "broken", "missing"]);
    }

    #[test]
    fn test_apply_offset() {
        let mut meals = vec![meal("a", Some("2024-01-01T23:00:00Z")), meal("b", None)];
        apply_offset(&mut meals, FixedOffset::east_opt(3600));

        assert_eq!(
            meals[0].taken_at.as_deref(),
            Some("2024-01-02T00:00:00+01:00")
        );
        assert_eq!(meals[1].taken_at, None);
    }

    #[test]
    fn test_apply_local_zone() {
        let mut meals = vec![meal("a", Some("2024-01-01T23:00:00Z")), meal("b", Some("??"))];
        apply_local_zone(&mut meals);

        let shifted = meals[0].captured_at().unwrap();
        assert_eq!(
            shifted,
            DateTime::parse_from_rfc3339("2024-01-01T23:00:00Z").unwrap()
        );
        assert_eq!(
            *shifted.offset(),
            Local.offset_from_utc_datetime(&shifted.naive_utc())
        );
        assert_eq!(meals[1].taken_at.as_deref(), Some("??"));
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty("  "), None);
        assert_eq!(non_empty("key"), Some("key".to_string()));
    }
}
