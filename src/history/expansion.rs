//! Expand/collapse state for the grouped history view.
//!
//! Days and (day, meal type) pairs are tracked independently and default
//! to collapsed. Toggling flips the stored state, so two toggles restore it.

use crate::history::grouping::DayGroup;
use crate::models::MealType;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Key used for a meal pair, e.g. `2024-06-01:breakfast`.
pub fn meal_key(date: NaiveDate, meal_type: MealType) -> String {
    format!("{}:{}", date.format("%Y-%m-%d"), meal_type)
}

/// A toggle request for either a day or a meal within a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionToggle {
    Day(NaiveDate),
    Meal(NaiveDate, MealType),
}

impl FromStr for ExpansionToggle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (date_part, meal_part) = match s.split_once(':') {
            Some((d, m)) => (d, Some(m)),
            None => (s, None),
        };

        let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
            .map_err(|_| format!("invalid date {:?}, expected YYYY-MM-DD", date_part))?;

        match meal_part {
            None => Ok(ExpansionToggle::Day(date)),
            Some(m) => Ok(ExpansionToggle::Meal(date, m.parse()?)),
        }
    }
}

impl fmt::Display for ExpansionToggle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpansionToggle::Day(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            ExpansionToggle::Meal(date, meal_type) => write!(f, "{}", meal_key(*date, *meal_type)),
        }
    }
}

/// Which days and meals are currently expanded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionState {
    days: HashMap<NaiveDate, bool>,
    meals: HashMap<(NaiveDate, MealType), bool>,
}

impl ExpansionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip a day's state and return the new value.
    pub fn toggle_day(&mut self, date: NaiveDate) -> bool {
        let expanded = self.days.entry(date).or_insert(false);
        *expanded = !*expanded;
        *expanded
    }

    /// Flip a meal pair's state and return the new value.
    pub fn toggle_meal(&mut self, date: NaiveDate, meal_type: MealType) -> bool {
        let expanded = self.meals.entry((date, meal_type)).or_insert(false);
        *expanded = !*expanded;
        *expanded
    }

    pub fn toggle(&mut self, toggle: ExpansionToggle) -> bool {
        match toggle {
            ExpansionToggle::Day(date) => self.toggle_day(date),
            ExpansionToggle::Meal(date, meal_type) => self.toggle_meal(date, meal_type),
        }
    }

    pub fn is_day_expanded(&self, date: NaiveDate) -> bool {
        self.days.get(&date).copied().unwrap_or(false)
    }

    pub fn is_meal_expanded(&self, date: NaiveDate, meal_type: MealType) -> bool {
        self.meals.get(&(date, meal_type)).copied().unwrap_or(false)
    }

    /// Expand every day and meal in `days`.
    pub fn expand_all(&mut self, days: &[DayGroup]) {
        for day in days {
            self.days.insert(day.date_key, true);
            for entry in &day.meals {
                self.meals.insert((day.date_key, entry.meal_type), true);
            }
        }
    }

    /// Keys currently expanded, sorted, in their string form.
    pub fn expanded_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .days
            .iter()
            .filter(|(_, expanded)| **expanded)
            .map(|(date, _)| date.format("%Y-%m-%d").to_string())
            .chain(
                self.meals
                    .iter()
                    .filter(|(_, expanded)| **expanded)
                    .map(|((date, meal_type), _)| meal_key(*date, *meal_type)),
            )
            .collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_defaults_to_collapsed() {
        let state = ExpansionState::new();
        assert!(!state.is_day_expanded(date("2024-06-01")));
        assert!(!state.is_meal_expanded(date("2024-06-01"), MealType::Lunch));
    }

    #[test]
    fn test_double_toggle_restores_state() {
        let mut state = ExpansionState::new();
        let day = date("2024-06-01");

        assert!(state.toggle_day(day));
        assert!(state.is_day_expanded(day));
        assert!(!state.toggle_day(day));
        assert!(!state.is_day_expanded(day));

        assert!(state.toggle_meal(day, MealType::Dinner));
        assert!(!state.toggle_meal(day, MealType::Dinner));
        assert!(!state.is_meal_expanded(day, MealType::Dinner));
    }

    #[test]
    fn test_day_and_meal_are_independent() {
        let mut state = ExpansionState::new();
        let day = date("2024-06-01");

        state.toggle_meal(day, MealType::Breakfast);
        assert!(!state.is_day_expanded(day));
        assert!(state.is_meal_expanded(day, MealType::Breakfast));
        assert!(!state.is_meal_expanded(day, MealType::Lunch));
    }

    #[test]
    fn test_parse_toggle() {
        assert_eq!(
            "2024-06-01".parse::<ExpansionToggle>(),
            Ok(ExpansionToggle::Day(date("2024-06-01")))
        );
        assert_eq!(
            "2024-06-01:Lunch".parse::<ExpansionToggle>(),
            Ok(ExpansionToggle::Meal(date("2024-06-01"), MealType::Lunch))
        );
        assert!("06/01/2024".parse::<ExpansionToggle>().is_err());
        assert!("2024-06-01:brunch".parse::<ExpansionToggle>().is_err());
    }

    #[test]
    fn test_meal_key_format() {
        assert_eq!(
            meal_key(date("2024-06-01"), MealType::Breakfast),
            "2024-06-01:breakfast"
        );
        let toggle = ExpansionToggle::Meal(date("2024-06-01"), MealType::Dinner);
        assert_eq!(toggle.to_string(), "2024-06-01:dinner");
    }

    #[test]
    fn test_expand_all_and_keys() {
        let mut state = ExpansionState::new();
        let day = DayGroup {
            date_key: date("2024-06-01"),
            meals: Vec::new(),
        };
        state.expand_all(&[day]);
        state.toggle_meal(date("2024-05-31"), MealType::Lunch);

        assert_eq!(
            state.expanded_keys(),
            vec!["2024-05-31:lunch".to_string(), "2024-06-01".to_string()]
        );
    }
}
