use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::constants::{DEFAULT_LANG, FARMER_ID};

// ============================================================================
// Client State Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Weather cache key: both coordinates at 3 decimals plus the language.
    pub fn cache_key(&self, lang: &str) -> String {
        format!("{:.3},{:.3}:{}", self.lat, self.lon, lang)
    }

    /// Text written back into the location field.
    pub fn display(&self) -> String {
        format!("{:.4},{:.4}", self.lat, self.lon)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormState {
    #[serde(default)]
    pub crop: String,
    #[serde(default)]
    pub question: String,
    #[serde(default, rename = "loc")]
    pub location: String,
    #[serde(default = "default_lang", rename = "lang")]
    pub language: String,
}

impl Default for FormState {
    fn default() -> Self {
        Self {
            crop: String::new(),
            question: String::new(),
            location: String::new(),
            language: default_lang(),
        }
    }
}

fn default_lang() -> String {
    DEFAULT_LANG.to_string()
}

/// Snapshot of the last successful render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastResult {
    pub plan: String,
    pub fert: String,
    pub answer: String,
}

// ============================================================================
// Advisory Backend Models
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdviceRequest {
    pub farmer_id: String,
    pub question: String,
    pub crop: String,
    pub latitude: f64,
    pub longitude: f64,
    pub language: String,
}

impl AdviceRequest {
    pub fn new(crop: &str, question: &str, coords: Coordinates, language: &str) -> Self {
        Self {
            farmer_id: FARMER_ID.to_string(),
            question: question.to_string(),
            crop: crop.to_string(),
            latitude: coords.lat,
            longitude: coords.lon,
            language: language.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdviceResponse {
    #[serde(default)]
    pub plan: Option<Value>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub fertilizer: Option<String>,
    #[serde(default, deserialize_with = "lenient_answer")]
    pub answer: Answer,
    #[serde(default, deserialize_with = "lenient_text")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Answer {
    #[serde(default, deserialize_with = "lenient_text")]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "text_list")]
    pub checklist: Vec<String>,
    #[serde(default, deserialize_with = "text_list")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TtsRequest<'a> {
    pub text: &'a str,
    pub lang: &'a str,
}

// ============================================================================
// IP Geolocation Models
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct IpApiResponse {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct IpWhoResponse {
    #[serde(default)]
    pub success: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

// ============================================================================
// Lenient decoding
// ============================================================================

/// Text form of a JSON value: strings verbatim, everything else as JSON.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Whether a JSON value would count as set: non-null, non-false, non-empty,
/// non-zero.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn lenient_text<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(de)?;
    Ok(value.filter(is_truthy).map(|v| value_text(&v)))
}

fn text_list<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<String>, D::Error> {
    let value = Option::<Value>::deserialize(de)?;
    Ok(match value {
        Some(Value::Array(items)) => items.iter().map(value_text).collect(),
        _ => Vec::new(),
    })
}

fn lenient_answer<'de, D: Deserializer<'de>>(de: D) -> Result<Answer, D::Error> {
    let value = Option::<Value>::deserialize(de)?;
    Ok(match value {
        Some(v @ Value::Object(_)) => serde_json::from_value(v).unwrap_or_default(),
        _ => Answer::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cache_key_rounds_to_three_decimals() {
        let c = Coordinates::new(18.78834, 98.98531);
        assert_eq!(c.cache_key("hi"), "18.788,98.985:hi");
    }

    #[test]
    fn display_uses_four_decimals() {
        assert_eq!(Coordinates::new(12.5, 77.25).display(), "12.5000,77.2500");
    }

    #[test]
    fn request_carries_fixed_farmer_id() {
        let req = AdviceRequest::new("wheat", "When to sow?", Coordinates::new(1.0, 2.0), "hi");
        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(
            body,
            json!({
                "farmer_id": "web_user",
                "question": "When to sow?",
                "crop": "wheat",
                "latitude": 1.0,
                "longitude": 2.0,
                "language": "hi"
            })
        );
    }

    #[test]
    fn response_decodes_loose_shapes() {
        let resp: AdviceResponse = serde_json::from_value(json!({
            "plan": "just text",
            "fertilizer": null,
            "answer": {"summary": "", "checklist": ["a", 2], "warnings": null}
        }))
        .unwrap();
        assert_eq!(resp.plan, Some(json!("just text")));
        assert_eq!(resp.fertilizer, None);
        assert_eq!(resp.answer.summary, None);
        assert_eq!(resp.answer.checklist, vec!["a".to_string(), "2".to_string()]);
        assert!(resp.answer.warnings.is_empty());
        assert!(resp.error.is_none());
    }

    #[test]
    fn empty_error_is_not_an_error() {
        let resp: AdviceResponse = serde_json::from_value(json!({"error": ""})).unwrap();
        assert!(resp.error.is_none());
        let resp: AdviceResponse = serde_json::from_value(json!({"error": "boom"})).unwrap();
        assert_eq!(resp.error.as_deref(), Some("boom"));
    }

    #[test]
    fn form_state_uses_storage_field_names() {
        let form = FormState {
            crop: "rice".into(),
            question: "q".into(),
            location: "1,2".into(),
            language: "ta".into(),
        };
        let stored = serde_json::to_value(&form).unwrap();
        assert_eq!(stored, json!({"crop": "rice", "question": "q", "loc": "1,2", "lang": "ta"}));
        let partial: FormState = serde_json::from_value(json!({"crop": "rice"})).unwrap();
        assert_eq!(partial.language, "en");
    }
}
