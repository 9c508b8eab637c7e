use crate::display::DisplayTarget;
use crate::platform::PlatformProvider;
use crate::store::{Envelope, ResponseStore, SubmissionBody, SubmitFormat};
use crate::transport::{Delivery, SubmitError, Submitter};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequenceExhausted {
    pub passed_practice: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Submitted {
        envelope: Envelope,
        delivery: Delivery,
        completed_at: DateTime<Utc>,
    },
    AlreadyCompleted,
    NothingPending,
}

pub struct CompletionHandler {
    practice: bool,
    task_id: String,
    format: SubmitFormat,
    platform: Box<dyn PlatformProvider>,
    submitter: Submitter,
    fired: AtomicBool,
    pending: Option<(Envelope, SubmissionBody)>,
}

impl CompletionHandler {
    pub fn new(
        practice: bool,
        task_id: impl Into<String>,
        format: SubmitFormat,
        platform: Box<dyn PlatformProvider>,
        submitter: Submitter,
    ) -> Self {
        Self {
            practice,
            task_id: task_id.into(),
            format,
            platform,
            submitter,
            fired: AtomicBool::new(false),
            pending: None,
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    pub fn pending(&self) -> Option<&SubmissionBody> {
        self.pending.as_ref().map(|(_, body)| body)
    }

    /// Annotates the response set, freezes it, and submits it.
    ///
    /// Only the first call does anything. Non-practice runs always record
    /// `passed_practice = true`.
    pub fn on_sequence_exhausted(
        &mut self,
        event: SequenceExhausted,
        store: &mut ResponseStore,
        display: &mut dyn DisplayTarget,
    ) -> Result<Completion, SubmitError> {
        if self.fired.swap(true, Ordering::SeqCst) {
            warn!(task_id = %self.task_id, "sequence exhausted twice; ignoring");
            return Ok(Completion::AlreadyCompleted);
        }

        let passed_practice = if self.practice {
            event.passed_practice
        } else {
            true
        };
        store.record("is_practice", self.practice);
        store.record("passed_practice", passed_practice);

        let platform = self.platform.platform_info();
        store.record("assignmentId", platform.assignment_id);
        store.record("hitId", platform.hit_id);
        store.record("workerId", platform.worker_id);
        store.record("previewMode", platform.preview_mode);
        store.record("outsideTurk", platform.outside_turk);
        store.record("taskId", self.task_id.clone());

        let envelope = store.snapshot();
        let body = envelope.to_body(self.format)?;
        info!(
            task_id = %self.task_id,
            practice = self.practice,
            passed_practice,
            fields = envelope.fields().len(),
            digest = %body.digest,
            "sequence complete; submitting responses"
        );
        self.pending = Some((envelope, body));
        self.deliver(display)
    }

    pub fn retry_submission(
        &mut self,
        display: &mut dyn DisplayTarget,
    ) -> Result<Completion, SubmitError> {
        if self.pending.is_none() {
            return Ok(Completion::NothingPending);
        }
        info!(task_id = %self.task_id, "manual submission retry");
        self.deliver(display)
    }

    fn deliver(&mut self, display: &mut dyn DisplayTarget) -> Result<Completion, SubmitError> {
        let delivery = match &self.pending {
            Some((_, body)) => self.submitter.send(body, display)?,
            None => return Ok(Completion::NothingPending),
        };
        match self.pending.take() {
            Some((envelope, _)) => Ok(Completion::Submitted {
                envelope,
                delivery,
                completed_at: Utc::now(),
            }),
            None => Ok(Completion::NothingPending),
        }
    }
}
