//! Advisory submission: validation, the single-in-flight rule, and dispatch.
//!
//! A new submission is rejected while one is busy. When one is accepted, the
//! previously issued controller (if any) is cancelled and only the newest id
//! is allowed to render.

use std::sync::Arc;

use crate::cancel::{self, CancelHandle, CancelToken};
use crate::constants::ASK_TIMEOUT;
use crate::error::ClientResult;
use crate::location::parse_manual;
use crate::models::{AdviceRequest, AdviceResponse, Coordinates, FormState};
use crate::service::AdvisoryBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRejection {
    /// A submission is already in flight.
    Busy,
    /// Crop, question or coordinates missing.
    Invalid,
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub id: u64,
    pub request: AdviceRequest,
    pub signal: CancelToken,
}

#[derive(Debug, Default)]
pub struct FormOrchestrator {
    busy: bool,
    next_id: u64,
    current: Option<(u64, CancelHandle)>,
}

/// Coordinates used at submit time: a parseable location field wins over the
/// resolved pair.
pub fn effective_coordinates(form: &FormState, resolved: Option<Coordinates>) -> Option<Coordinates> {
    parse_manual(&form.location).or(resolved)
}

/// Validated request for `form`, or `None` when a required field is missing.
pub fn build_request(form: &FormState, resolved: Option<Coordinates>) -> Option<AdviceRequest> {
    let crop = form.crop.trim();
    let question = form.question.trim();
    let coords = effective_coordinates(form, resolved)?;
    if crop.is_empty() || question.is_empty() {
        return None;
    }
    Some(AdviceRequest::new(crop, question, coords, &form.language))
}

impl FormOrchestrator {
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Accepts a submission or says why not. Rejections leave all state alone.
    pub fn begin(&mut self, form: &FormState, resolved: Option<Coordinates>) -> Result<Submission, SubmitRejection> {
        if self.busy {
            return Err(SubmitRejection::Busy);
        }
        let request = build_request(form, resolved).ok_or(SubmitRejection::Invalid)?;

        self.busy = true;
        if let Some((id, previous)) = self.current.take() {
            tracing::debug!("Cancelling superseded submission {}", id);
            previous.cancel();
        }

        self.next_id += 1;
        let (handle, signal) = cancel::pair();
        self.current = Some((self.next_id, handle));

        Ok(Submission {
            id: self.next_id,
            request,
            signal: signal.with_timeout(ASK_TIMEOUT),
        })
    }

    /// Marks submission `id` finished. Returns whether its result should be
    /// shown; stale ids never clear the flag of a newer submission.
    pub fn finish(&mut self, id: u64) -> bool {
        match &self.current {
            Some((current, _)) if *current == id => {
                self.busy = false;
                true
            }
            _ => false,
        }
    }
}

/// Sends the request, bounded by the submission's signal.
pub async fn dispatch(backend: Arc<dyn AdvisoryBackend>, submission: &Submission) -> ClientResult<AdviceResponse> {
    submission
        .signal
        .run(backend.ask(&submission.request))
        .await?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(crop: &str, question: &str, location: &str) -> FormState {
        FormState {
            crop: crop.into(),
            question: question.into(),
            location: location.into(),
            language: "en".into(),
        }
    }

    #[test]
    fn missing_fields_are_invalid() {
        let mut orch = FormOrchestrator::default();
        let resolved = Some(Coordinates::new(1.0, 2.0));

        assert_eq!(orch.begin(&form("", "q", ""), resolved).unwrap_err(), SubmitRejection::Invalid);
        assert_eq!(orch.begin(&form("rice", "   ", ""), resolved).unwrap_err(), SubmitRejection::Invalid);
        assert_eq!(orch.begin(&form("rice", "q", "not coords"), None).unwrap_err(), SubmitRejection::Invalid);
        assert!(!orch.is_busy());
    }

    #[test]
    fn manual_location_wins_over_resolved() {
        let f = form("rice", "q", "10.5, 20.25");
        let req = build_request(&f, Some(Coordinates::new(1.0, 2.0))).unwrap();
        assert_eq!((req.latitude, req.longitude), (10.5, 20.25));

        let f = form(" rice ", " q ", "");
        let req = build_request(&f, Some(Coordinates::new(1.0, 2.0))).unwrap();
        assert_eq!((req.latitude, req.longitude), (1.0, 2.0));
        assert_eq!(req.crop, "rice");
        assert_eq!(req.question, "q");
    }

    #[test]
    fn busy_rejects_without_cancelling() {
        let mut orch = FormOrchestrator::default();
        let f = form("rice", "q", "1,2");

        let first = orch.begin(&f, None).unwrap();
        assert!(orch.is_busy());
        assert_eq!(orch.begin(&f, None).unwrap_err(), SubmitRejection::Busy);
        assert!(!first.signal.is_cancelled());

        assert!(orch.finish(first.id));
        assert!(!orch.is_busy());

        let second = orch.begin(&f, None).unwrap();
        assert!(second.id > first.id);
    }

    #[test]
    fn stale_finish_is_ignored() {
        let mut orch = FormOrchestrator::default();
        let f = form("rice", "q", "1,2");
        let first = orch.begin(&f, None).unwrap();
        assert!(orch.finish(first.id));
        let second = orch.begin(&f, None).unwrap();
        assert!(first.signal.is_cancelled());

        assert!(!orch.finish(first.id));
        assert!(orch.is_busy());
        assert!(orch.finish(second.id));
    }
}
