//! Markdown and JSON rendering of the grouped history.
//!
//! Collapsed days list their meal slots on one line each; expanded days
//! show each slot, and expanded slots show the full recommendation and
//! meal content. Content may be absent, plain text, or a nested mapping;
//! every shape renders.

use crate::error::EventKind;
use crate::history::{DayGroup, ExpansionState, HistoryView, MealEntry};
use crate::models::{title_case_key, HistoryEvent, MealTakenEvent, Payload};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Metadata about the history report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub user_id: String,
    pub source: String,
    pub generated_at: DateTime<Utc>,
    pub days: usize,
    pub recommendations: usize,
    pub meals_taken: usize,
    pub skipped_events: usize,
}

/// An event left out of the grouping.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedEntry {
    pub id: String,
    pub reason: String,
}

/// A stream that could not be fetched.
#[derive(Debug, Clone, Serialize)]
pub struct SourceErrorEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<EventKind>,
    pub message: String,
}

/// Serializable form of a history view.
#[derive(Debug, Serialize)]
pub struct HistoryReport<'a> {
    pub metadata: ReportMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_meal: Option<&'a MealTakenEvent>,
    pub days: &'a [DayGroup],
    pub expanded: Vec<String>,
    pub skipped: Vec<SkippedEntry>,
    pub source_errors: Vec<SourceErrorEntry>,
}

impl<'a> HistoryReport<'a> {
    pub fn from_view(view: &'a HistoryView, expansion: &ExpansionState) -> Self {
        Self {
            metadata: ReportMetadata {
                user_id: view.user_id.clone(),
                source: view.source_name.clone(),
                generated_at: view.fetched_at,
                days: view.days.len(),
                recommendations: view.recommendation_count,
                meals_taken: view.meal_count,
                skipped_events: view.skipped.len(),
            },
            latest_meal: view.latest_meal.as_ref(),
            days: &view.days,
            expanded: expansion.expanded_keys(),
            skipped: view
                .skipped
                .iter()
                .map(|e| SkippedEntry {
                    id: e.event_id().to_string(),
                    reason: e.to_string(),
                })
                .collect(),
            source_errors: view
                .source_errors
                .iter()
                .map(|e| SourceErrorEntry {
                    stream: e.stream(),
                    message: e.to_string(),
                })
                .collect(),
        }
    }
}

/// Generate a JSON report.
pub fn generate_json_report(view: &HistoryView, expansion: &ExpansionState) -> Result<String> {
    let report = HistoryReport::from_view(view, expansion);
    serde_json::to_string_pretty(&report).map_err(Into::into)
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(
    view: &HistoryView,
    expansion: &ExpansionState,
    preview_chars: usize,
) -> String {
    let mut output = String::new();

    output.push_str("# Platewise History\n\n");
    output.push_str(&generate_overview_section(view));
    output.push_str(&generate_latest_meal_section(view.latest_meal.as_ref(), preview_chars));
    output.push_str(&generate_days_section(&view.days, expansion, preview_chars));
    output.push_str(&generate_skipped_section(view));
    output.push_str("---\n\n*Generated by Platewise*\n");

    output
}

fn generate_overview_section(view: &HistoryView) -> String {
    let mut section = String::new();

    section.push_str("## Overview\n\n");
    section.push_str(&format!("- **User:** `{}`\n", view.user_id));
    section.push_str(&format!("- **Source:** {}\n", view.source_name));
    section.push_str(&format!(
        "- **Fetched:** {}\n",
        view.fetched_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Days:** {}\n", view.days.len()));
    section.push_str(&format!(
        "- **Recommendations:** {} | **Meals Logged:** {}\n",
        view.recommendation_count, view.meal_count
    ));
    if !view.skipped.is_empty() {
        section.push_str(&format!("- **Skipped Events:** {}\n", view.skipped.len()));
    }
    section.push('\n');

    for err in &view.source_errors {
        section.push_str(&format!("> ⚠️ {}\n", err));
    }
    if !view.source_errors.is_empty() {
        section.push('\n');
    }

    section
}

fn generate_latest_meal_section(latest: Option<&MealTakenEvent>, preview_chars: usize) -> String {
    let Some(meal) = latest else {
        return String::new();
    };

    let when = meal
        .captured_at()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| "unknown time".to_string());
    let heading = match meal.meal_type() {
        Ok(meal_type) => format!("{} **{}**", meal_type.emoji(), meal_type.label()),
        Err(_) => "**Meal**".to_string(),
    };

    format!(
        "## Latest Meal\n\n{} on {} - {}\n\n",
        heading,
        when,
        meal.payload().summary(preview_chars)
    )
}

fn generate_days_section(
    days: &[DayGroup],
    expansion: &ExpansionState,
    preview_chars: usize,
) -> String {
    let mut section = String::new();

    section.push_str("## Days\n\n");

    if days.is_empty() {
        section.push_str("No meals or recommendations recorded yet.\n\n");
        return section;
    }

    for day in days {
        section.push_str(&generate_day_block(day, expansion, preview_chars));
    }

    section
}

fn generate_day_block(day: &DayGroup, expansion: &ExpansionState, preview_chars: usize) -> String {
    let mut block = String::new();
    let expanded = expansion.is_day_expanded(day.date_key);

    block.push_str(&format!(
        "### {} {}\n\n",
        if expanded { "▼" } else { "▶" },
        day.date_key.format("%Y-%m-%d (%A)")
    ));

    if !expanded {
        for entry in &day.meals {
            block.push_str(&format!(
                "- {} {}: {}\n",
                entry.meal_type.emoji(),
                entry.meal_type.label(),
                slot_contents(entry)
            ));
        }
        block.push('\n');
        return block;
    }

    for entry in &day.meals {
        block.push_str(&generate_meal_block(
            entry,
            expansion.is_meal_expanded(day.date_key, entry.meal_type),
            preview_chars,
        ));
    }

    block
}

/// Short description of what a slot holds.
fn slot_contents(entry: &MealEntry) -> &'static str {
    match (&entry.slot.recommendation, &entry.slot.meal_taken) {
        (Some(_), Some(_)) => "recommendation, meal",
        (Some(_), None) => "recommendation",
        (None, Some(_)) => "meal",
        (None, None) => "empty",
    }
}

fn generate_meal_block(entry: &MealEntry, expanded: bool, preview_chars: usize) -> String {
    let mut block = String::new();

    block.push_str(&format!(
        "#### {} {} {}\n\n",
        if expanded { "▼" } else { "▶" },
        entry.meal_type.emoji(),
        entry.meal_type.label()
    ));

    let parts: [(&str, Option<(&Payload, String)>); 2] = [
        (
            "Recommended",
            entry.slot.recommendation.as_ref().map(event_part),
        ),
        ("Eaten", entry.slot.meal_taken.as_ref().map(event_part)),
    ];

    for (label, part) in parts {
        let Some((payload, time)) = part else {
            continue;
        };

        if expanded {
            block.push_str(&format!("**{}** at {}\n\n", label, time));
            block.push_str(&render_payload(payload));
        } else {
            block.push_str(&format!(
                "- **{}:** {}\n",
                label,
                payload.summary(preview_chars)
            ));
        }
    }

    if !expanded {
        block.push('\n');
    }

    block
}

/// Content and capture time (HH:MM) of one event.
fn event_part<E: HistoryEvent>(event: &E) -> (&Payload, String) {
    let time = event
        .captured_at()
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|_| "?".to_string());
    (event.payload(), time)
}

/// Render a payload as a Markdown block.
pub fn render_payload(payload: &Payload) -> String {
    match payload {
        Payload::Absent => "N/A\n\n".to_string(),
        Payload::Text(text) => {
            let mut out = text
                .lines()
                .map(str::trim_end)
                .collect::<Vec<_>>()
                .join("  \n");
            out.push_str("\n\n");
            out
        }
        Payload::Structured(map) => {
            let mut out = String::new();
            render_map(map, 0, &mut out);
            out.push('\n');
            if let Some(notes) = map.get("notes") {
                out.push_str(&format!("{}\n\n", scalar_text(notes)));
            }
            out
        }
    }
}

fn render_map(map: &Map<String, Value>, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);

    for (key, value) in map {
        if key == "notes" {
            continue;
        }
        let label = title_case_key(key);

        match value {
            Value::Object(inner) => {
                if let Some(range) = inner.get("range") {
                    out.push_str(&format!("{}- **{}:** {}\n", indent, label, scalar_text(range)));
                } else {
                    out.push_str(&format!("{}- **{}:**\n", indent, label));
                    render_map(inner, depth + 1, out);
                }
            }
            Value::Array(items) if items.iter().all(|v| !v.is_object() && !v.is_array()) => {
                let joined = items.iter().map(scalar_text).collect::<Vec<_>>().join(", ");
                out.push_str(&format!("{}- **{}:** {}\n", indent, label, joined));
            }
            Value::Array(items) => {
                out.push_str(&format!("{}- **{}:**\n", indent, label));
                for item in items {
                    match item {
                        Value::Object(inner) => {
                            out.push_str(&format!("{}  -\n", indent));
                            render_map(inner, depth + 2, out);
                        }
                        other => {
                            out.push_str(&format!("{}  - {}\n", indent, scalar_text(other)));
                        }
                    }
                }
            }
            scalar => {
                out.push_str(&format!("{}- **{}:** {}\n", indent, label, scalar_text(scalar)));
            }
        }
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => "N/A".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn generate_skipped_section(view: &HistoryView) -> String {
    if view.skipped.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Skipped Events\n\n");
    for err in &view.skipped {
        section.push_str(&format!("- {}\n", err));
    }
    section.push('\n');

    section
}
