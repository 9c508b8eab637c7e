use crate::assemble::{assemble, ExperimentSequence};
use crate::block::Block;
use crate::completion::{Completion, CompletionHandler, SequenceExhausted};
use crate::config::TaskConfig;
use crate::display::DisplayTarget;
use crate::engine::{EngineHooks, TrialEngine};
use crate::platform::PlatformProvider;
use crate::registry::BlockRegistry;
use crate::store::ResponseStore;
use crate::transport::{SubmitError, Submitter, Transport};
use crate::validate::{check_demographics, FormState, Verdict};
use anyhow::Result;
use serde_json::Value;
use tracing::{info, warn};

#[derive(Debug)]
pub enum RunOutcome {
    Completed(Completion),
    SubmissionPending(SubmitError),
    Incomplete,
}

pub struct Session {
    task_id: String,
    sequence: ExperimentSequence,
    store: ResponseStore,
    completion: CompletionHandler,
}

impl Session {
    pub fn new(
        config: &TaskConfig,
        platform: Box<dyn PlatformProvider>,
        transport: Box<dyn Transport>,
    ) -> Self {
        let registry = BlockRegistry::from_assets(&config.assets);
        let sequence = assemble(&config.blocks, config.flags, &registry);
        let submitter = Submitter::new(transport, config.endpoint.clone(), config.retry.clone());
        let completion = CompletionHandler::new(
            config.flags.practice,
            config.task_id.clone(),
            config.submit_format,
            platform,
            submitter,
        );
        Self {
            task_id: config.task_id.clone(),
            sequence,
            store: ResponseStore::new(),
            completion,
        }
    }

    pub fn sequence(&self) -> &ExperimentSequence {
        &self.sequence
    }

    pub fn store(&self) -> &ResponseStore {
        &self.store
    }

    pub fn run(
        &mut self,
        engine: &mut dyn TrialEngine,
        display: &mut dyn DisplayTarget,
    ) -> Result<RunOutcome> {
        info!(task_id = %self.task_id, blocks = self.sequence.len(), "starting task");
        let mut hooks = Hooks {
            store: &mut self.store,
            completion: &mut self.completion,
            outcome: None,
        };
        engine.start(display, &self.sequence, &mut hooks)?;
        Ok(hooks.outcome.unwrap_or(RunOutcome::Incomplete))
    }

    pub fn retry_submission(
        &mut self,
        display: &mut dyn DisplayTarget,
    ) -> Result<Completion, SubmitError> {
        self.completion.retry_submission(display)
    }
}

struct Hooks<'a> {
    store: &'a mut ResponseStore,
    completion: &'a mut CompletionHandler,
    outcome: Option<RunOutcome>,
}

impl EngineHooks for Hooks<'_> {
    fn check(&mut self, block: &Block, form: &FormState) -> Verdict {
        match block.form() {
            Some(_) => check_demographics(form, self.store),
            None => Verdict::Accepted,
        }
    }

    fn record(&mut self, key: &str, value: Value) {
        self.store.record(key, value);
    }

    fn finished(
        &mut self,
        event: SequenceExhausted,
        display: &mut dyn DisplayTarget,
    ) -> Result<()> {
        match self
            .completion
            .on_sequence_exhausted(event, self.store, display)
        {
            Ok(Completion::AlreadyCompleted) => {}
            Ok(completion) => self.outcome = Some(RunOutcome::Completed(completion)),
            Err(err @ SubmitError::Exhausted { .. }) => {
                warn!(error = %err, "submission pending manual retry");
                self.outcome = Some(RunOutcome::SubmissionPending(err));
            }
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }
}
