//! Firestore REST adapter.
//!
//! Reads `Users/{uid}/recommendations` and `Users/{uid}/mealsTaken` through
//! the `runQuery` endpoint, ordered by capture time descending. The client
//! is constructed explicitly and passed to whoever needs it.

use crate::error::{EventKind, SourceUnavailableError};
use crate::models::{MealTakenEvent, Payload, RecommendationEvent};
use crate::source::{apply_local_zone, apply_offset, EventSource, TimestampMut};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::FixedOffset;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info};

/// Connection settings for the Firestore REST API.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub base_url: String,
    pub project_id: String,
    pub database: String,
    /// Web API key, sent as the `key` query parameter.
    pub api_key: Option<String>,
    /// User ID token, sent as a bearer token.
    pub id_token: Option<String>,
    pub timeout_seconds: u64,
    /// Offset to re-express stored UTC timestamps in; the local zone
    /// when unset.
    pub utc_offset: Option<FixedOffset>,
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            base_url: "https://firestore.googleapis.com/v1".to_string(),
            project_id: String::new(),
            database: "(default)".to_string(),
            api_key: None,
            id_token: None,
            timeout_seconds: 30,
            utc_offset: None,
        }
    }
}

/// One element of a `runQuery` response stream.
#[derive(Debug, Deserialize)]
struct RunQueryItem {
    #[serde(default)]
    document: Option<Document>,
}

#[derive(Debug, Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

/// Firestore client for history queries.
pub struct FirestoreClient {
    config: FirestoreConfig,
    http_client: reqwest::Client,
}

impl FirestoreClient {
    pub fn new(config: FirestoreConfig) -> Result<Self> {
        if config.project_id.trim().is_empty() {
            anyhow::bail!("Firestore project id is not set (use --project-id or [source].project_id)");
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn query_url(&self, user_id: &str) -> String {
        format!(
            "{}/projects/{}/databases/{}/documents/Users/{}:runQuery",
            self.config.base_url.trim_end_matches('/'),
            self.config.project_id,
            self.config.database,
            user_id
        )
    }

    /// The store keeps UTC, so timestamps are moved into the zone the
    /// user records in before grouping.
    fn localize<E: TimestampMut>(&self, events: &mut [E]) {
        match self.config.utc_offset {
            Some(offset) => apply_offset(events, Some(offset)),
            None => apply_local_zone(events),
        }
    }

    /// Run an ordered query over one of the user's collections.
    async fn run_query(
        &self,
        user_id: &str,
        kind: EventKind,
        limit: Option<u32>,
    ) -> Result<Vec<(String, Map<String, Value>)>, SourceUnavailableError> {
        let url = self.query_url(user_id);
        debug!("Querying {} for {}", kind.collection(), user_id);

        let mut request = self.http_client.post(&url).json(&build_query(kind, limit));
        if let Some(ref key) = self.config.api_key {
            request = request.query(&[("key", key)]);
        }
        if let Some(ref token) = self.config.id_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            let reason = if e.is_timeout() {
                format!("request timed out after {}s", self.config.timeout_seconds)
            } else if e.is_connect() {
                format!("cannot connect to {}", self.config.base_url)
            } else {
                e.to_string()
            };
            SourceUnavailableError::Transport {
                stream: kind,
                reason,
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(SourceUnavailableError::Unauthorized {
                stream: kind,
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceUnavailableError::Status {
                stream: kind,
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| SourceUnavailableError::Transport {
                stream: kind,
                reason: e.to_string(),
            })?;

        let documents = parse_run_query(kind, &body)?;
        info!("Fetched {} {} documents", documents.len(), kind.collection());
        Ok(documents)
    }
}

#[async_trait]
impl EventSource for FirestoreClient {
    fn name(&self) -> &str {
        "firestore"
    }

    async fn fetch_recommendations(
        &self,
        user_id: &str,
    ) -> Result<Vec<RecommendationEvent>, SourceUnavailableError> {
        let docs = self
            .run_query(user_id, EventKind::Recommendation, None)
            .await?;
        let mut events: Vec<RecommendationEvent> =
            docs.into_iter().map(|(id, f)| to_recommendation(id, f)).collect();
        self.localize(&mut events);
        Ok(events)
    }

    async fn fetch_meals_taken(
        &self,
        user_id: &str,
    ) -> Result<Vec<MealTakenEvent>, SourceUnavailableError> {
        let docs = self.run_query(user_id, EventKind::MealTaken, None).await?;
        let mut events: Vec<MealTakenEvent> =
            docs.into_iter().map(|(id, f)| to_meal_taken(id, f)).collect();
        self.localize(&mut events);
        Ok(events)
    }

    async fn fetch_latest_meal(
        &self,
        user_id: &str,
    ) -> Result<Option<MealTakenEvent>, SourceUnavailableError> {
        let docs = self
            .run_query(user_id, EventKind::MealTaken, Some(1))
            .await?;
        let mut events: Vec<MealTakenEvent> =
            docs.into_iter().map(|(id, f)| to_meal_taken(id, f)).collect();
        self.localize(&mut events);
        Ok(events.into_iter().next())
    }
}

/// Structured query body for one collection, newest first.
fn build_query(kind: EventKind, limit: Option<u32>) -> Value {
    let mut query = json!({
        "from": [{ "collectionId": kind.collection() }],
        "orderBy": [{
            "field": { "fieldPath": kind.timestamp_field() },
            "direction": "DESCENDING"
        }]
    });
    if let Some(limit) = limit {
        query["limit"] = json!(limit);
    }
    json!({ "structuredQuery": query })
}

/// Parse a `runQuery` response body into (document id, decoded fields).
fn parse_run_query(
    kind: EventKind,
    body: &str,
) -> Result<Vec<(String, Map<String, Value>)>, SourceUnavailableError> {
    let items: Vec<RunQueryItem> =
        serde_json::from_str(body).map_err(|e| SourceUnavailableError::MalformedResponse {
            stream: kind,
            reason: e.to_string(),
        })?;

    Ok(items
        .into_iter()
        .filter_map(|item| item.document)
        .map(|doc| {
            let id = doc
                .name
                .rsplit('/')
                .next()
                .unwrap_or(doc.name.as_str())
                .to_string();
            let fields = doc
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), decode_value(v)))
                .collect();
            (id, fields)
        })
        .collect())
}

/// Convert a Firestore typed value into plain JSON.
fn decode_value(value: &Value) -> Value {
    let Some(obj) = value.as_object() else {
        return value.clone();
    };
    let Some((tag, inner)) = obj.iter().next() else {
        return Value::Null;
    };

    match tag.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" | "doubleValue" | "stringValue" | "timestampValue"
        | "referenceValue" | "bytesValue" => inner.clone(),
        // Integers arrive as decimal strings
        "integerValue" => inner
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Value::from)
            .unwrap_or_else(|| inner.clone()),
        "mapValue" => {
            let fields = inner
                .get("fields")
                .and_then(Value::as_object)
                .map(|fields| {
                    fields
                        .iter()
                        .map(|(k, v)| (k.clone(), decode_value(v)))
                        .collect::<Map<String, Value>>()
                })
                .unwrap_or_default();
            Value::Object(fields)
        }
        "arrayValue" => {
            let values = inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode_value).collect())
                .unwrap_or_default();
            Value::Array(values)
        }
        _ => inner.clone(),
    }
}

fn string_field(fields: &Map<String, Value>, name: &str) -> Option<String> {
    fields.get(name).and_then(Value::as_str).map(String::from)
}

fn to_recommendation(id: String, mut fields: Map<String, Value>) -> RecommendationEvent {
    let kind = EventKind::Recommendation;
    RecommendationEvent {
        recommended_at: string_field(&fields, kind.timestamp_field()),
        meal_type: string_field(&fields, "mealType"),
        recommendation: Payload::from(fields.remove(kind.payload_field()).unwrap_or(Value::Null)),
        id,
    }
}

fn to_meal_taken(id: String, mut fields: Map<String, Value>) -> MealTakenEvent {
    let kind = EventKind::MealTaken;
    MealTakenEvent {
        taken_at: string_field(&fields, kind.timestamp_field()),
        meal_type: string_field(&fields, "mealType"),
        meal_taken: Payload::from(fields.remove(kind.payload_field()).unwrap_or(Value::Null)),
        id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::group_history;
    use crate::models::{HistoryEvent, MealType};
    use chrono::{Local, NaiveDate, TimeZone};

    const LATE_DINNER_RESPONSE: &str = r#"[
      {
        "document": {
          "name": "projects/demo/databases/(default)/documents/Users/u1/mealsTaken/late",
          "fields": {
            "mealType": { "stringValue": "dinner" },
            "takenAt": { "timestampValue": "2024-06-02T01:00:00Z" },
            "mealTaken": { "stringValue": "Tacos" }
          }
        }
      }
    ]"#;

    fn late_dinner(client: &FirestoreClient) -> Vec<MealTakenEvent> {
        let docs = parse_run_query(EventKind::MealTaken, LATE_DINNER_RESPONSE).unwrap();
        let mut meals: Vec<MealTakenEvent> = docs
            .into_iter()
            .map(|(id, f)| to_meal_taken(id, f))
            .collect();
        client.localize(&mut meals);
        meals
    }

    fn demo_client(utc_offset: Option<FixedOffset>) -> FirestoreClient {
        FirestoreClient::new(FirestoreConfig {
            project_id: "demo".into(),
            utc_offset,
            ..FirestoreConfig::default()
        })
        .unwrap()
    }

    const MEALS_RESPONSE: &str = r#"[
      {
        "document": {
          "name": "projects/demo/databases/(default)/documents/Users/u1/mealsTaken/abc123",
          "fields": {
            "mealType": { "stringValue": "dinner" },
            "takenAt": { "timestampValue": "2024-06-01T18:45:12.345Z" },
            "mealTaken": {
              "mapValue": {
                "fields": {
                  "calories": { "mapValue": { "fields": {
                    "range": { "stringValue": "600-700 kcal" }
                  } } },
                  "servings": { "integerValue": "2" },
                  "tips": { "arrayValue": { "values": [
                    { "stringValue": "More greens" },
                    { "booleanValue": true }
                  ] } }
                }
              }
            }
          },
          "createTime": "2024-06-01T18:45:12.400Z"
        },
        "readTime": "2024-06-02T00:00:00Z"
      }
    ]"#;

    #[test]
    fn test_build_query() {
        let q = build_query(EventKind::MealTaken, Some(1));
        assert_eq!(q["structuredQuery"]["from"][0]["collectionId"], "mealsTaken");
        assert_eq!(
            q["structuredQuery"]["orderBy"][0]["field"]["fieldPath"],
            "takenAt"
        );
        assert_eq!(q["structuredQuery"]["orderBy"][0]["direction"], "DESCENDING");
        assert_eq!(q["structuredQuery"]["limit"], 1);

        let q = build_query(EventKind::Recommendation, None);
        assert!(q["structuredQuery"].get("limit").is_none());
    }

    #[test]
    fn test_parse_run_query_documents() {
        let docs = parse_run_query(EventKind::MealTaken, MEALS_RESPONSE).unwrap();
        assert_eq!(docs.len(), 1);

        let (id, fields) = docs.into_iter().next().unwrap();
        assert_eq!(id, "abc123");

        let meal = to_meal_taken(id, fields);
        assert_eq!(meal.meal_type.as_deref(), Some("dinner"));
        assert_eq!(meal.taken_at.as_deref(), Some("2024-06-01T18:45:12.345Z"));
        assert!(meal.captured_at().is_ok());

        match meal.meal_taken {
            Payload::Structured(map) => {
                assert_eq!(map["calories"]["range"], "600-700 kcal");
                assert_eq!(map["servings"], 2);
                assert_eq!(map["tips"], json!(["More greens", true]));
            }
            other => panic!("expected structured meal, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_empty_result() {
        // An empty collection yields a single item with only readTime
        let docs = parse_run_query(
            EventKind::Recommendation,
            r#"[{"readTime": "2024-06-02T00:00:00Z"}]"#,
        )
        .unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn test_parse_malformed_body() {
        let err = parse_run_query(EventKind::Recommendation, "<html>oops</html>").unwrap_err();
        assert!(matches!(
            err,
            SourceUnavailableError::MalformedResponse {
                stream: EventKind::Recommendation,
                ..
            }
        ));
    }

    #[test]
    fn test_recommendation_text_payload() {
        let mut fields = Map::new();
        fields.insert("recommendation".into(), json!("Try the grilled salmon"));
        fields.insert("recommendedAt".into(), json!("2024-06-01T12:00:00Z"));
        fields.insert("mealType".into(), json!("lunch"));

        let rec = to_recommendation("r1".into(), fields);
        assert_eq!(rec.recommendation, Payload::Text("Try the grilled salmon".into()));
        assert_eq!(rec.meal_type.as_deref(), Some("lunch"));
    }

    #[test]
    fn test_missing_fields_stay_missing() {
        let meal = to_meal_taken("m1".into(), Map::new());
        assert!(meal.meal_taken.is_absent());
        assert!(meal.taken_at.is_none());
        assert!(meal.captured_at().is_err());
    }

    #[test]
    fn test_client_requires_project_id() {
        assert!(FirestoreClient::new(FirestoreConfig::default()).is_err());

        let client = FirestoreClient::new(FirestoreConfig {
            project_id: "demo".into(),
            base_url: "http://localhost:8080/v1/".into(),
            ..FirestoreConfig::default()
        })
        .unwrap();
        assert_eq!(
            client.query_url("u1"),
            "http://localhost:8080/v1/projects/demo/databases/(default)/documents/Users/u1:runQuery"
        );
    }

    #[test]
    fn test_utc_dinner_grouped_on_recorded_day() {
        // 20:00 at -05:00 is stored as 01:00Z the next day
        let client = demo_client(FixedOffset::west_opt(5 * 3600));
        let meals = late_dinner(&client);

        assert_eq!(meals[0].taken_at.as_deref(), Some("2024-06-01T20:00:00-05:00"));

        let grouping = group_history(&[], &meals);
        assert_eq!(grouping.days.len(), 1);
        assert_eq!(
            grouping.days[0].date_key,
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
        );
        assert_eq!(grouping.days[0].meals[0].meal_type, MealType::Dinner);
    }

    #[test]
    fn test_default_zone_is_local() {
        let client = demo_client(None);
        let meals = late_dinner(&client);

        let at = meals[0].captured_at().unwrap();
        let expected = Local
            .from_utc_datetime(&at.naive_utc())
            .fixed_offset();
        assert_eq!(at, expected);
        assert_eq!(*at.offset(), *expected.offset());

        let grouping = group_history(&[], &meals);
        assert_eq!(grouping.days[0].date_key, expected.date_naive());
    }

    #[tokio::test]
    async fn test_unreachable_store_is_source_error() {
        let client = FirestoreClient::new(FirestoreConfig {
            project_id: "demo".into(),
            base_url: "http://127.0.0.1:9".into(),
            timeout_seconds: 2,
            ..FirestoreConfig::default()
        })
        .unwrap();

        let err = client.fetch_recommendations("u1").await.unwrap_err();
        assert_eq!(err.stream(), Some(EventKind::Recommendation));
    }
}
