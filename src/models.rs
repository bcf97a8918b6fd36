//! Data models for meal history.
//!
//! This module contains the event records produced by the document store,
//! the meal-type bucketing applied when an event is captured, and the
//! payload variant used to carry free-form recommendation/meal content.

use crate::error::{DataShapeError, EventKind};
use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone, Timelike};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Meal slot an event was captured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    /// Captured before 11:00
    Breakfast,
    /// Captured from 11:00 until 17:00
    Lunch,
    /// Captured from 17:00 onwards
    Dinner,
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MealType::Breakfast => write!(f, "breakfast"),
            MealType::Lunch => write!(f, "lunch"),
            MealType::Dinner => write!(f, "dinner"),
        }
    }
}

impl FromStr for MealType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "breakfast" => Ok(MealType::Breakfast),
            "lunch" => Ok(MealType::Lunch),
            "dinner" => Ok(MealType::Dinner),
            other => Err(format!("unknown meal type: {}", other)),
        }
    }
}

impl MealType {
    /// Bucket an hour of day (0-23) into a meal slot.
    pub fn from_hour(hour: u32) -> Self {
        if hour < 11 {
            MealType::Breakfast
        } else if hour < 17 {
            MealType::Lunch
        } else {
            MealType::Dinner
        }
    }

    /// Meal slot for an event captured at `at`, using the wall-clock hour
    /// of the zone the instant is expressed in.
    pub fn for_capture<Tz: TimeZone>(at: &DateTime<Tz>) -> Self {
        Self::from_hour(at.hour())
    }

    /// Title-cased label for headings.
    pub fn label(&self) -> &'static str {
        match self {
            MealType::Breakfast => "Breakfast",
            MealType::Lunch => "Lunch",
            MealType::Dinner => "Dinner",
        }
    }

    /// Returns an emoji representation of the meal.
    pub fn emoji(&self) -> &'static str {
        match self {
            MealType::Breakfast => "🍳",
            MealType::Lunch => "🥗",
            MealType::Dinner => "🍽️",
        }
    }
}

/// Free-form event content, classified once when it is ingested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum Payload {
    #[default]
    Absent,
    Text(String),
    Structured(Map<String, Value>),
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Payload::Absent,
            Value::String(s) => {
                if s.trim().is_empty() {
                    Payload::Absent
                } else {
                    Payload::Text(s)
                }
            }
            Value::Bool(b) => Payload::Text(b.to_string()),
            Value::Number(n) => Payload::Text(n.to_string()),
            Value::Array(items) => {
                // Lists are flattened to one line per entry
                let lines: Vec<String> = items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::Null => None,
                        Value::String(s) => Some(s),
                        other => Some(other.to_string()),
                    })
                    .filter(|line| !line.trim().is_empty())
                    .collect();

                if lines.is_empty() {
                    Payload::Absent
                } else {
                    Payload::Text(lines.join("\n"))
                }
            }
            Value::Object(map) => {
                if map.is_empty() {
                    Payload::Absent
                } else {
                    Payload::Structured(map)
                }
            }
        }
    }
}

impl From<Payload> for Value {
    fn from(payload: Payload) -> Self {
        match payload {
            Payload::Absent => Value::Null,
            Payload::Text(s) => Value::String(s),
            Payload::Structured(map) => Value::Object(map),
        }
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::from(Value::String(s.to_string()))
    }
}

impl Payload {
    pub fn is_absent(&self) -> bool {
        matches!(self, Payload::Absent)
    }

    /// One-line preview, cut to at most `max_chars` characters.
    pub fn summary(&self, max_chars: usize) -> String {
        let full = match self {
            Payload::Absent => return "N/A".to_string(),
            Payload::Text(text) => text.lines().next().unwrap_or("").trim().to_string(),
            Payload::Structured(map) => map
                .keys()
                .filter(|k| k.as_str() != "notes")
                .map(|k| title_case_key(k))
                .collect::<Vec<_>>()
                .join(", "),
        };

        if full.chars().count() <= max_chars {
            full
        } else {
            let cut: String = full.chars().take(max_chars.saturating_sub(3)).collect();
            format!("{}...", cut.trim_end())
        }
    }
}

/// Render a snake_case key as Title Case words.
pub fn title_case_key(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a stored timestamp into an instant, keeping its own offset.
///
/// Accepts RFC 3339 and offset-less ISO forms; the latter are read as
/// wall-clock time at offset zero so their calendar date is preserved.
pub fn parse_instant(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt);
    }

    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];

    let utc = FixedOffset::east_opt(0)?;
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .and_then(|naive| utc.from_local_datetime(&naive).single())
}

/// Re-express a stored timestamp in `offset`, leaving unparseable values
/// untouched so they fail later with a proper shape error.
pub fn shift_timestamp(raw: &str, offset: FixedOffset) -> String {
    match parse_instant(raw) {
        Some(dt) => dt.with_timezone(&offset).to_rfc3339(),
        None => raw.to_string(),
    }
}

/// Re-express a stored timestamp in the local zone, using the offset in
/// effect at that instant.
pub fn localize_timestamp(raw: &str) -> String {
    match parse_instant(raw) {
        Some(dt) => dt.with_timezone(&Local).to_rfc3339(),
        None => raw.to_string(),
    }
}

/// Accept a timestamp as a string, a `{seconds, nanoseconds}` object, or null.
///
/// Any other shape is kept as its JSON text so it is reported as a bad
/// timestamp rather than a missing one.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match &v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => Some(object_timestamp(map).unwrap_or_else(|| v.to_string())),
        _ => Some(v.to_string()),
    }))
}

fn object_timestamp(map: &Map<String, Value>) -> Option<String> {
    let seconds = map.get("seconds").and_then(Value::as_i64)?;
    let nanos = match map.get("nanoseconds").or_else(|| map.get("nanos")) {
        Some(v) => u32::try_from(v.as_u64()?).ok()?,
        None => 0,
    };
    DateTime::from_timestamp(seconds, nanos).map(|dt| dt.to_rfc3339())
}

/// Common view over both kinds of history event.
pub trait HistoryEvent: Clone {
    const KIND: EventKind;

    fn id(&self) -> &str;
    fn raw_timestamp(&self) -> Option<&str>;
    fn raw_meal_type(&self) -> Option<&str>;
    fn payload(&self) -> &Payload;

    /// The capture instant, in the offset it was recorded with.
    fn captured_at(&self) -> Result<DateTime<FixedOffset>, DataShapeError> {
        let raw = self
            .raw_timestamp()
            .ok_or_else(|| DataShapeError::MissingField {
                kind: Self::KIND,
                id: self.id().to_string(),
                field: Self::KIND.timestamp_field(),
            })?;

        parse_instant(raw).ok_or_else(|| DataShapeError::BadTimestamp {
            kind: Self::KIND,
            id: self.id().to_string(),
            value: raw.to_string(),
        })
    }

    fn meal_type(&self) -> Result<MealType, DataShapeError> {
        let raw = self
            .raw_meal_type()
            .ok_or_else(|| DataShapeError::MissingField {
                kind: Self::KIND,
                id: self.id().to_string(),
                field: "mealType",
            })?;

        raw.parse().map_err(|_| DataShapeError::UnknownMealType {
            kind: Self::KIND,
            id: self.id().to_string(),
            value: raw.to_string(),
        })
    }
}

/// A recommendation produced from a menu analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationEvent {
    /// Document identifier.
    #[serde(default)]
    pub id: String,
    /// Recommendation content.
    #[serde(default)]
    pub recommendation: Payload,
    /// Capture instant as stored.
    #[serde(
        rename = "recommendedAt",
        default,
        deserialize_with = "deserialize_timestamp"
    )]
    pub recommended_at: Option<String>,
    /// Meal slot assigned at capture time.
    #[serde(rename = "mealType", default)]
    pub meal_type: Option<String>,
}

impl HistoryEvent for RecommendationEvent {
    const KIND: EventKind = EventKind::Recommendation;

    fn id(&self) -> &str {
        &self.id
    }
    fn raw_timestamp(&self) -> Option<&str> {
        self.recommended_at.as_deref()
    }
    fn raw_meal_type(&self) -> Option<&str> {
        self.meal_type.as_deref()
    }
    fn payload(&self) -> &Payload {
        &self.recommendation
    }
}

/// A meal logged from a food photo analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealTakenEvent {
    /// Document identifier.
    #[serde(default)]
    pub id: String,
    /// Meal detail, either text or a nutrition mapping.
    #[serde(rename = "mealTaken", default)]
    pub meal_taken: Payload,
    /// Capture instant as stored.
    #[serde(rename = "takenAt", default, deserialize_with = "deserialize_timestamp")]
    pub taken_at: Option<String>,
    /// Meal slot assigned at capture time.
    #[serde(rename = "mealType", default)]
    pub meal_type: Option<String>,
}

impl HistoryEvent for MealTakenEvent {
    const KIND: EventKind = EventKind::MealTaken;

    fn id(&self) -> &str {
        &self.id
    }
    fn raw_timestamp(&self) -> Option<&str> {
        self.taken_at.as_deref()
    }
    fn raw_meal_type(&self) -> Option<&str> {
        self.meal_type.as_deref()
    }
    fn payload(&self) -> &Payload {
        &self.meal_taken
    }
}

impl RecommendationEvent {
    /// Build a new recommendation captured at `at`, bucketing its meal slot.
    pub fn captured(id: String, recommendation: Payload, at: DateTime<FixedOffset>) -> Self {
        Self {
            id,
            recommendation,
            recommended_at: Some(at.to_rfc3339()),
            meal_type: Some(MealType::for_capture(&at).to_string()),
        }
    }
}

impl MealTakenEvent {
    /// Build a new meal captured at `at`, bucketing its meal slot.
    pub fn captured(id: String, meal_taken: Payload, at: DateTime<FixedOffset>) -> Self {
        Self {
            id,
            meal_taken,
            taken_at: Some(at.to_rfc3339()),
            meal_type: Some(MealType::for_capture(&at).to_string()),
        }
    }
}
