use chrono::{DateTime, Local};
use serde_json::Value;

use crate::models::{is_truthy, value_text, AdviceResponse, Answer};

pub const NO_WEATHER: &str = "No weather data.";
pub const WEATHER_FAILED: &str = "Failed to load weather.";
pub const FERTILIZER_PLACEHOLDER: &str = "—";
pub const TIMEOUT_TEXT: &str = "Timed out. Please try again.";

/// What the weather box shows.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherDisplay {
    pub text: String,
    pub updated: Option<String>,
}

impl WeatherDisplay {
    pub fn message(text: &str) -> Self {
        Self {
            text: text.to_string(),
            updated: None,
        }
    }
}

/// Formats a weather payload: message payloads, current conditions, or the
/// no-data text for anything that is not an object.
pub fn format_weather(payload: &Value) -> WeatherDisplay {
    let Some(obj) = payload.as_object() else {
        return WeatherDisplay::message(NO_WEATHER);
    };

    for key in ["error", "warning"] {
        if let Some(msg) = obj.get(key).filter(|v| is_truthy(v)) {
            return WeatherDisplay::message(&value_text(msg));
        }
    }

    let current = obj.get("current").filter(|v| v.is_object());
    let field = |name: &str| {
        current
            .and_then(|c| c.get(name))
            .map(value_text)
            .unwrap_or_else(|| "n/a".to_string())
    };
    let description = current
        .and_then(|c| c.pointer("/weather/0/description"))
        .filter(|v| is_truthy(v))
        .map(value_text)
        .unwrap_or_default();

    let text = [
        format!("Temp: {} \u{00b0}C", field("temp")),
        format!("Humidity: {}%", field("humidity")),
        format!("Conditions: {}", description),
    ]
    .join(" | ");

    let updated = current
        .and_then(|c| c.get("dt"))
        .and_then(Value::as_i64)
        .filter(|dt| *dt != 0)
        .and_then(|dt| DateTime::from_timestamp(dt, 0))
        .map(|dt| format!("Updated: {}", dt.with_timezone(&Local).format("%H:%M:%S")));

    WeatherDisplay { text, updated }
}

/// Plan region content.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanView {
    Steps(Vec<String>),
    Text(String),
}

impl Default for PlanView {
    fn default() -> Self {
        PlanView::Text(String::new())
    }
}

impl PlanView {
    pub fn is_empty(&self) -> bool {
        match self {
            PlanView::Steps(steps) => steps.is_empty(),
            PlanView::Text(text) => text.is_empty(),
        }
    }

    /// Plain text of the region, steps one per line.
    pub fn text(&self) -> String {
        match self {
            PlanView::Steps(steps) => steps.join("\n"),
            PlanView::Text(text) => text.clone(),
        }
    }
}

pub fn format_plan(plan: Option<&Value>) -> PlanView {
    match plan {
        Some(Value::Array(items)) => PlanView::Steps(items.iter().map(value_text).collect()),
        Some(Value::String(text)) => PlanView::Text(text.clone()),
        None | Some(Value::Null) => PlanView::Text(String::new()),
        Some(other) => PlanView::Text(other.to_string()),
    }
}

pub fn format_fertilizer(response: &AdviceResponse) -> String {
    response
        .fertilizer
        .clone()
        .unwrap_or_else(|| FERTILIZER_PLACEHOLDER.to_string())
}

/// Summary paragraph, checklist bullets, then warning bullets, separated by a
/// blank line; empty sections are dropped.
pub fn format_answer(answer: &Answer) -> String {
    let summary = answer
        .summary
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| format!("\n{}\n", s))
        .unwrap_or_default();
    let checklist = bullet_lines("\u{2022} ", &answer.checklist);
    let warnings = bullet_lines("\u{26a0} ", &answer.warnings);

    [summary, checklist, warnings]
        .into_iter()
        .filter(|section| !section.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn bullet_lines(prefix: &str, items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("{}{}", prefix, item))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_speed(rate: f32) -> String {
    let rounded = (rate * 100.0).round() / 100.0;
    format!("{}x", rounded)
}
