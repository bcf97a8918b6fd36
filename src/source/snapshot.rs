//! Local JSON snapshot of the document store.
//!
//! The file mirrors the store layout, keyed by user id:
//!
//! ```json
//! { "users": { "<uid>": { "recommendations": [...], "mealsTaken": [...] } } }
//! ```
//!
//! Entries use the store field names (`recommendedAt`, `takenAt`,
//! `mealType`, ...). New events can be appended for offline logging.

use crate::error::{EventKind, SourceUnavailableError};
use crate::models::{MealTakenEvent, RecommendationEvent};
use crate::source::{apply_offset, sort_newest_first, EventSource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// History stored for one user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserHistory {
    #[serde(default)]
    pub recommendations: Vec<RecommendationEvent>,
    #[serde(rename = "mealsTaken", default)]
    pub meals_taken: Vec<MealTakenEvent>,
}

/// Whole snapshot file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub users: BTreeMap<String, UserHistory>,
}

impl Snapshot {
    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        let mut snapshot: Snapshot = serde_json::from_str(content)?;
        snapshot.fill_missing_ids();
        Ok(snapshot)
    }

    /// Give unnamed entries a stable positional id.
    fn fill_missing_ids(&mut self) {
        for history in self.users.values_mut() {
            for (i, rec) in history.recommendations.iter_mut().enumerate() {
                if rec.id.is_empty() {
                    rec.id = format!("{}-{}", EventKind::Recommendation.collection(), i);
                }
            }
            for (i, meal) in history.meals_taken.iter_mut().enumerate() {
                if meal.id.is_empty() {
                    meal.id = format!("{}-{}", EventKind::MealTaken.collection(), i);
                }
            }
        }
    }
}

/// Event source backed by a snapshot file.
pub struct SnapshotSource {
    path: PathBuf,
    utc_offset: Option<FixedOffset>,
}

impl SnapshotSource {
    pub fn new(path: PathBuf, utc_offset: Option<FixedOffset>) -> Self {
        Self { path, utc_offset }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Snapshot, SourceUnavailableError> {
        let snapshot_error = |reason: String| SourceUnavailableError::Snapshot {
            path: self.path.display().to_string(),
            reason,
        };

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| snapshot_error(e.to_string()))?;
        Snapshot::from_json(&content).map_err(|e| snapshot_error(e.to_string()))
    }

    async fn user_history(&self, user_id: &str) -> Result<UserHistory, SourceUnavailableError> {
        let mut snapshot = self.load().await?;
        match snapshot.users.remove(user_id) {
            Some(history) => Ok(history),
            None => {
                debug!("No history for {} in {}", user_id, self.path.display());
                Ok(UserHistory::default())
            }
        }
    }

    /// Load the snapshot for writing; a missing file starts empty.
    async fn load_for_update(&self) -> Result<Snapshot> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(Snapshot::default());
        }
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read snapshot: {}", self.path.display()))?;
        Snapshot::from_json(&content)
            .with_context(|| format!("Failed to parse snapshot: {}", self.path.display()))
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let content = serde_json::to_string_pretty(snapshot)?;
        tokio::fs::write(&self.path, content)
            .await
            .with_context(|| format!("Failed to write snapshot: {}", self.path.display()))
    }

    /// Append a recommendation for `user_id`.
    pub async fn record_recommendation(
        &self,
        user_id: &str,
        event: RecommendationEvent,
    ) -> Result<()> {
        let mut snapshot = self.load_for_update().await?;
        info!("Recording recommendation {} for {}", event.id, user_id);
        snapshot
            .users
            .entry(user_id.to_string())
            .or_default()
            .recommendations
            .push(event);
        self.save(&snapshot).await
    }

    /// Append a logged meal for `user_id`.
    pub async fn record_meal(&self, user_id: &str, event: MealTakenEvent) -> Result<()> {
        let mut snapshot = self.load_for_update().await?;
        info!("Recording meal {} for {}", event.id, user_id);
        snapshot
            .users
            .entry(user_id.to_string())
            .or_default()
            .meals_taken
            .push(event);
        self.save(&snapshot).await
    }
}

#[async_trait]
impl EventSource for SnapshotSource {
    fn name(&self) -> &str {
        "snapshot"
    }

    async fn fetch_recommendations(
        &self,
        user_id: &str,
    ) -> Result<Vec<RecommendationEvent>, SourceUnavailableError> {
        let mut events = self.user_history(user_id).await?.recommendations;
        apply_offset(&mut events, self.utc_offset);
        sort_newest_first(&mut events);
        Ok(events)
    }

    async fn fetch_meals_taken(
        &self,
        user_id: &str,
    ) -> Result<Vec<MealTakenEvent>, SourceUnavailableError> {
        let mut events = self.user_history(user_id).await?.meals_taken;
        apply_offset(&mut events, self.utc_offset);
        sort_newest_first(&mut events);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Payload;
    use chrono::DateTime;
    use tempfile::TempDir;

    const SNAPSHOT: &str = r#"{
      "users": {
        "u1": {
          "recommendations": [
            { "id": "r1", "recommendation": "Oatmeal", "recommendedAt": "2024-06-01T08:00:00Z", "mealType": "breakfast" },
            { "id": "r2", "recommendation": ["Salad", "Soup"], "recommendedAt": "2024-06-02T12:00:00Z", "mealType": "lunch" }
          ],
          "mealsTaken": [
            { "mealTaken": {"protein": "30g"}, "takenAt": {"seconds": 1717268400, "nanoseconds": 0}, "mealType": "dinner" }
          ]
        }
      }
    }"#;

    fn write_snapshot(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, SNAPSHOT).unwrap();
        path
    }

    #[tokio::test]
    async fn test_fetch_sorted_newest_first() {
        let dir = TempDir::new().unwrap();
        let source = SnapshotSource::new(write_snapshot(&dir), None);

        let recs = source.fetch_recommendations("u1").await.unwrap();
        let ids: Vec<&str> = recs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r2", "r1"]);
        assert_eq!(recs[0].recommendation, Payload::Text("Salad\nSoup".into()));

        let meals = source.fetch_meals_taken("u1").await.unwrap();
        assert_eq!(meals.len(), 1);
        assert_eq!(meals[0].id, "mealsTaken-0");
        assert_eq!(meals[0].taken_at.as_deref(), Some("2024-06-01T19:00:00+00:00"));
    }

    #[tokio::test]
    async fn test_unknown_user_is_empty() {
        let dir = TempDir::new().unwrap();
        let source = SnapshotSource::new(write_snapshot(&dir), None);

        assert!(source.fetch_recommendations("nobody").await.unwrap().is_empty());
        assert!(source.fetch_latest_meal("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_source_error() {
        let dir = TempDir::new().unwrap();
        let source = SnapshotSource::new(dir.path().join("absent.json"), None);

        let err = source.fetch_meals_taken("u1").await.unwrap_err();
        assert!(matches!(err, SourceUnavailableError::Snapshot { .. }));
    }

    #[tokio::test]
    async fn test_utc_offset_applied() {
        let dir = TempDir::new().unwrap();
        let offset = FixedOffset::west_opt(9 * 3600);
        let source = SnapshotSource::new(write_snapshot(&dir), offset);

        let recs = source.fetch_recommendations("u1").await.unwrap();
        assert_eq!(
            recs[1].recommended_at.as_deref(),
            Some("2024-05-31T23:00:00-09:00")
        );
    }

    #[test]
    fn test_record_and_read_back() {
        let dir = TempDir::new().unwrap();
        let source = SnapshotSource::new(dir.path().join("new.json"), None);
        let at = DateTime::parse_from_rfc3339("2024-06-03T12:10:00+02:00").unwrap();

        tokio_test::block_on(async {
            source
                .record_meal(
                    "u2",
                    MealTakenEvent::captured("m-1".into(), Payload::from("Ramen"), at),
                )
                .await
                .unwrap();
            source
                .record_recommendation(
                    "u2",
                    RecommendationEvent::captured("r-1".into(), Payload::from("Tofu"), at),
                )
                .await
                .unwrap();

            let latest = source.fetch_latest_meal("u2").await.unwrap().unwrap();
            assert_eq!(latest.id, "m-1");
            assert_eq!(latest.meal_type.as_deref(), Some("lunch"));

            let recs = source.fetch_recommendations("u2").await.unwrap();
            assert_eq!(recs.len(), 1);
        });
    }
}
