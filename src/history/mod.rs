//! History aggregation.
//!
//! Groups recommendation and meal events by day and meal slot, tracks
//! which parts of the grouped view are expanded, and ties fetching and
//! grouping together.

pub mod expansion;
pub mod grouping;
pub mod sync;

pub use expansion::{ExpansionState, ExpansionToggle};
pub use grouping::{group_history, DayGroup, MealEntry};
pub use sync::{load_history, HistoryView};
