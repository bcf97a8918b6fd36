//! Day and meal-slot grouping of history events.
//!
//! Merges the recommendation and meal streams into one view: days newest
//! first, each holding at most one recommendation and one meal per meal
//! slot. The pass is pure and always starts from scratch.

use crate::error::DataShapeError;
use crate::models::{HistoryEvent, MealTakenEvent, MealType, RecommendationEvent};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// The per-(day, meal type) container.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MealSlot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<RecommendationEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meal_taken: Option<MealTakenEvent>,
}

/// A meal slot tagged with its meal type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MealEntry {
    pub meal_type: MealType,
    #[serde(flatten)]
    pub slot: MealSlot,
}

/// All slots recorded on one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayGroup {
    pub date_key: NaiveDate,
    /// Meal slots in the order they were first filled.
    pub meals: Vec<MealEntry>,
}

impl DayGroup {
    pub fn new(date_key: NaiveDate) -> Self {
        Self {
            date_key,
            meals: Vec::new(),
        }
    }

    /// Slot for `meal_type`, created empty on first use.
    fn slot_mut(&mut self, meal_type: MealType) -> &mut MealSlot {
        let index = match self.meals.iter().position(|e| e.meal_type == meal_type) {
            Some(index) => index,
            None => {
                self.meals.push(MealEntry {
                    meal_type,
                    slot: MealSlot::default(),
                });
                self.meals.len() - 1
            }
        };
        &mut self.meals[index].slot
    }

    /// Number of events placed on this day.
    pub fn event_count(&self) -> usize {
        self.meals
            .iter()
            .map(|e| {
                usize::from(e.slot.recommendation.is_some()) + usize::from(e.slot.meal_taken.is_some())
            })
            .sum()
    }
}

/// Output of one grouping pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grouping {
    /// Days, most recent first.
    pub days: Vec<DayGroup>,
    /// Events that could not be placed.
    pub skipped: Vec<DataShapeError>,
}

impl Grouping {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

/// Where an event lands: its calendar date and meal slot.
fn placement<E: HistoryEvent>(event: &E) -> Result<(NaiveDate, MealType), DataShapeError> {
    let captured_at = event.captured_at()?;
    let meal_type = event.meal_type()?;
    Ok((captured_at.date_naive(), meal_type))
}

/// Group both event streams by day and meal slot.
///
/// Events are placed in input order, recommendations first. A later event
/// for an occupied (day, meal type, kind) slot replaces the earlier one.
/// Events with an unusable timestamp or meal type are skipped and reported
/// in [`Grouping::skipped`].
pub fn group_history(
    recommendations: &[RecommendationEvent],
    meals_taken: &[MealTakenEvent],
) -> Grouping {
    let mut by_date: HashMap<NaiveDate, DayGroup> = HashMap::new();
    let mut skipped = Vec::new();

    for rec in recommendations {
        match placement(rec) {
            Ok((date, meal_type)) => {
                let slot = by_date
                    .entry(date)
                    .or_insert_with(|| DayGroup::new(date))
                    .slot_mut(meal_type);
                if let Some(previous) = slot.recommendation.replace(rec.clone()) {
                    debug!(
                        "Recommendation {} replaces {} in {} {}",
                        rec.id, previous.id, date, meal_type
                    );
                }
            }
            Err(e) => {
                debug!("Skipping event: {}", e);
                skipped.push(e);
            }
        }
    }

    for meal in meals_taken {
        match placement(meal) {
            Ok((date, meal_type)) => {
                let slot = by_date
                    .entry(date)
                    .or_insert_with(|| DayGroup::new(date))
                    .slot_mut(meal_type);
                if let Some(previous) = slot.meal_taken.replace(meal.clone()) {
                    debug!(
                        "Meal {} replaces {} in {} {}",
                        meal.id, previous.id, date, meal_type
                    );
                }
            }
            Err(e) => {
                debug!("Skipping event: {}", e);
                skipped.push(e);
            }
        }
    }

    let mut days: Vec<DayGroup> = by_date.into_values().collect();
    days.sort_by(|a, b| b.date_key.cmp(&a.date_key));

    Grouping { days, skipped }
}
