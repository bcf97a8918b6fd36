//! Fetch both streams and regroup from scratch.
//!
//! The recommendation and meal fetches run concurrently and are joined
//! before grouping. A failed fetch contributes an empty list and is kept in
//! [`HistoryView::source_errors`]; the other stream is still shown.

use crate::error::{DataShapeError, SourceUnavailableError};
use crate::history::grouping::{group_history, DayGroup};
use crate::models::MealTakenEvent;
use crate::source::EventSource;
use chrono::{DateTime, Utc};
use futures::future::join3;
use tracing::{debug, info, warn};

/// One fully recomputed history snapshot.
#[derive(Debug)]
pub struct HistoryView {
    pub user_id: String,
    pub source_name: String,
    pub fetched_at: DateTime<Utc>,
    /// Days, most recent first.
    pub days: Vec<DayGroup>,
    pub recommendation_count: usize,
    pub meal_count: usize,
    pub latest_meal: Option<MealTakenEvent>,
    pub skipped: Vec<DataShapeError>,
    pub source_errors: Vec<SourceUnavailableError>,
}

impl HistoryView {
    /// True when any stream failed or any event was skipped.
    pub fn has_errors(&self) -> bool {
        !self.source_errors.is_empty() || !self.skipped.is_empty()
    }
}

/// Fetch both streams for `user_id` and group them.
///
/// Never fails: unavailable streams become empty inputs.
pub async fn load_history(
    source: &dyn EventSource,
    user_id: &str,
    include_latest: bool,
) -> HistoryView {
    let latest = async {
        if include_latest {
            source.fetch_latest_meal(user_id).await
        } else {
            Ok(None)
        }
    };

    let (recommendations, meals_taken, latest_meal) = join3(
        source.fetch_recommendations(user_id),
        source.fetch_meals_taken(user_id),
        latest,
    )
    .await;

    let mut source_errors = Vec::new();

    let recommendations = recommendations.unwrap_or_else(|e| {
        warn!("Recommendations unavailable: {}", e);
        source_errors.push(e);
        Vec::new()
    });

    let meals_taken = meals_taken.unwrap_or_else(|e| {
        warn!("Meals unavailable: {}", e);
        source_errors.push(e);
        Vec::new()
    });

    // The latest meal is informational only
    let latest_meal = latest_meal.unwrap_or_else(|e| {
        warn!("Latest meal unavailable: {}", e);
        None
    });

    let grouping = group_history(&recommendations, &meals_taken);

    if !grouping.skipped.is_empty() {
        info!(
            "Skipped {} events with unusable timestamps or meal types",
            grouping.skipped_count()
        );
    }
    if grouping.is_empty() {
        info!("No history recorded for {}", user_id);
    }
    for day in &grouping.days {
        debug!("{}: {} events", day.date_key, day.event_count());
    }
    info!(
        "Grouped {} recommendations and {} meals into {} days",
        recommendations.len(),
        meals_taken.len(),
        grouping.days.len()
    );

    HistoryView {
        user_id: user_id.to_string(),
        source_name: source.name().to_string(),
        fetched_at: Utc::now(),
        days: grouping.days,
        recommendation_count: recommendations.len(),
        meal_count: meals_taken.len(),
        latest_meal,
        skipped: grouping.skipped,
        source_errors,
    }
}
