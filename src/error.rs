//! Error types for history sources and event ingestion.
//!
//! Neither error is fatal to a history run: source failures degrade the
//! affected stream to an empty list, and shape failures skip one event.

use std::fmt;
use thiserror::Error;

/// Which of the two history streams an error or event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Recommendation,
    MealTaken,
}

impl EventKind {
    /// Collection name under `Users/{uid}` in the document store.
    pub fn collection(&self) -> &'static str {
        match self {
            EventKind::Recommendation => "recommendations",
            EventKind::MealTaken => "mealsTaken",
        }
    }

    /// Field holding the capture instant.
    pub fn timestamp_field(&self) -> &'static str {
        match self {
            EventKind::Recommendation => "recommendedAt",
            EventKind::MealTaken => "takenAt",
        }
    }

    /// Field holding the free-form content.
    pub fn payload_field(&self) -> &'static str {
        match self {
            EventKind::Recommendation => "recommendation",
            EventKind::MealTaken => "mealTaken",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Recommendation => write!(f, "recommendation"),
            EventKind::MealTaken => write!(f, "meal"),
        }
    }
}

/// Fetching one of the event streams failed.
#[derive(Debug, Error)]
pub enum SourceUnavailableError {
    #[error("cannot reach document store for {stream}: {reason}")]
    Transport { stream: EventKind, reason: String },

    #[error("document store rejected credentials for {stream} (HTTP {status})")]
    Unauthorized { stream: EventKind, status: u16 },

    #[error("document store returned HTTP {status} for {stream}: {body}")]
    Status {
        stream: EventKind,
        status: u16,
        body: String,
    },

    #[error("malformed response for {stream}: {reason}")]
    MalformedResponse { stream: EventKind, reason: String },

    #[error("cannot read snapshot {path}: {reason}")]
    Snapshot { path: String, reason: String },
}

impl SourceUnavailableError {
    /// The stream that failed, when the failure is stream-specific.
    pub fn stream(&self) -> Option<EventKind> {
        match self {
            SourceUnavailableError::Transport { stream, .. }
            | SourceUnavailableError::Unauthorized { stream, .. }
            | SourceUnavailableError::Status { stream, .. }
            | SourceUnavailableError::MalformedResponse { stream, .. } => Some(*stream),
            SourceUnavailableError::Snapshot { .. } => None,
        }
    }
}

/// A single event could not be placed in the grouped history.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataShapeError {
    #[error("{kind} {id}: timestamp {value:?} is not a valid instant")]
    BadTimestamp {
        kind: EventKind,
        id: String,
        value: String,
    },

    #[error("{kind} {id}: missing required field `{field}`")]
    MissingField {
        kind: EventKind,
        id: String,
        field: &'static str,
    },

    #[error("{kind} {id}: unknown meal type {value:?}")]
    UnknownMealType {
        kind: EventKind,
        id: String,
        value: String,
    },
}

impl DataShapeError {
    /// Identifier of the offending event.
    pub fn event_id(&self) -> &str {
        match self {
            DataShapeError::BadTimestamp { id, .. }
            | DataShapeError::MissingField { id, .. }
            | DataShapeError::UnknownMealType { id, .. } => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_store_fields() {
        assert_eq!(EventKind::Recommendation.collection(), "recommendations");
        assert_eq!(EventKind::MealTaken.collection(), "mealsTaken");
        assert_eq!(EventKind::Recommendation.timestamp_field(), "recommendedAt");
        assert_eq!(EventKind::MealTaken.payload_field(), "mealTaken");
    }

    #[test]
    fn test_data_shape_error_message() {
        let err = DataShapeError::BadTimestamp {
            kind: EventKind::MealTaken,
            id: "m1".to_string(),
            value: "yesterday".to_string(),
        };
        assert_eq!(err.event_id(), "m1");
        assert!(err.to_string().contains("\"yesterday\""));
        assert!(err.to_string().starts_with("meal m1"));
    }

    #[test]
    fn test_source_error_stream() {
        let err = SourceUnavailableError::Unauthorized {
            stream: EventKind::Recommendation,
            status: 401,
        };
        assert_eq!(err.stream(), Some(EventKind::Recommendation));

        let err = SourceUnavailableError::Snapshot {
            path: "x.json".to_string(),
            reason: "not found".to_string(),
        };
        assert_eq!(err.stream(), None);
    }
}
