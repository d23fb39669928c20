//! Maps an advisory outcome onto the plan, fertilizer and answer regions.

use std::sync::Arc;

use crate::constants::LAST_RESULT_KEY;
use crate::error::ClientError;
use crate::formatters::{format_answer, format_fertilizer, format_plan, PlanView, TIMEOUT_TEXT};
use crate::models::{AdviceResponse, LastResult};
use crate::storage::{save_json, KeyValueStore};

/// One of the three result regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Plan,
    Fertilizer,
    Answer,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Regions {
    pub plan: PlanView,
    pub fertilizer: String,
    pub answer: String,
}

impl Regions {
    pub fn clear(&mut self) {
        *self = Regions::default();
    }

    pub fn is_empty(&self) -> bool {
        self.plan.is_empty() && self.fertilizer.is_empty() && self.answer.is_empty()
    }

    /// Plain text of one region as shown.
    pub fn text(&self, region: Region) -> String {
        match region {
            Region::Plan => self.plan.text(),
            Region::Fertilizer => self.fertilizer.clone(),
            Region::Answer => self.answer.clone(),
        }
    }

    pub fn snapshot(&self) -> LastResult {
        LastResult {
            plan: self.plan.text(),
            fert: self.fertilizer.clone(),
            answer: self.answer.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub regions: Regions,
    pub toast: String,
}

pub struct Renderer {
    store: Arc<dyn KeyValueStore>,
}

impl Renderer {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Renders a finished submission. A successful, error-free response is
    /// also saved as the last result.
    pub fn render(&self, outcome: &Result<AdviceResponse, ClientError>) -> Rendered {
        match outcome {
            Ok(response) => match &response.error {
                Some(error) => Rendered {
                    regions: Regions {
                        answer: format!("Error: {}", error),
                        ..Regions::default()
                    },
                    toast: format!("Error: {}", error),
                },
                None => {
                    let regions = render_advice(response);
                    save_json(self.store.as_ref(), LAST_RESULT_KEY, &regions.snapshot());
                    Rendered {
                        regions,
                        toast: "Answer ready".to_string(),
                    }
                }
            },
            Err(e) => {
                let reason = if e.is_abort() {
                    TIMEOUT_TEXT.to_string()
                } else {
                    e.to_string()
                };
                Rendered {
                    regions: Regions {
                        answer: format!("Request failed: {}", reason),
                        ..Regions::default()
                    },
                    toast: "Request failed".to_string(),
                }
            }
        }
    }
}

pub fn render_advice(response: &AdviceResponse) -> Regions {
    Regions {
        plan: format_plan(response.plan.as_ref()),
        fertilizer: format_fertilizer(response),
        answer: format_answer(&response.answer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{load_json, MemoryStore};
    use serde_json::json;

    fn sample() -> AdviceResponse {
        serde_json::from_value(json!({
            "plan": ["Apply urea", "Irrigate"],
            "fertilizer": "Urea 50kg/acre",
            "answer": {"summary": "Good season", "checklist": ["Test soil"], "warnings": ["Rain expected"]}
        }))
        .unwrap()
    }

    #[test]
    fn successful_response_fills_regions_and_snapshots() {
        let store = Arc::new(MemoryStore::default());
        let renderer = Renderer::new(store.clone());

        let rendered = renderer.render(&Ok(sample()));
        assert_eq!(
            rendered.regions.plan,
            PlanView::Steps(vec!["Apply urea".into(), "Irrigate".into()])
        );
        assert_eq!(rendered.regions.fertilizer, "Urea 50kg/acre");
        assert_eq!(rendered.regions.answer, "\nGood season\n\n\n• Test soil\n\n⚠ Rain expected");
        assert_eq!(rendered.toast, "Answer ready");

        let last: LastResult = load_json(store.as_ref(), LAST_RESULT_KEY).unwrap();
        assert_eq!(last.plan, "Apply urea\nIrrigate");
        assert_eq!(last.fert, "Urea 50kg/acre");
    }

    #[test]
    fn backend_error_only_fills_answer() {
        let store = Arc::new(MemoryStore::default());
        let renderer = Renderer::new(store.clone());
        let mut response = sample();
        response.error = Some("Server error".into());

        let rendered = renderer.render(&Ok(response));
        assert_eq!(rendered.regions.answer, "Error: Server error");
        assert!(rendered.regions.plan.is_empty());
        assert!(rendered.regions.fertilizer.is_empty());
        assert!(store.get(LAST_RESULT_KEY).is_none());
    }

    #[test]
    fn timeout_has_its_own_message() {
        let renderer = Renderer::new(Arc::new(MemoryStore::default()));

        let timed_out = renderer.render(&Err(ClientError::TimedOut));
        assert_eq!(timed_out.regions.answer, "Request failed: Timed out. Please try again.");
        assert_eq!(timed_out.toast, "Request failed");

        let other = renderer.render(&Err(ClientError::Status(502)));
        assert_eq!(other.regions.answer, "Request failed: Request failed with status: 502");
    }

    #[test]
    fn missing_fertilizer_uses_placeholder() {
        let regions = render_advice(&AdviceResponse::default());
        assert_eq!(regions.fertilizer, "—");
        assert_eq!(regions.answer, "");
    }
}
