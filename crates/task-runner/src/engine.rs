use crate::assemble::ExperimentSequence;
use crate::block::Block;
use crate::completion::SequenceExhausted;
use crate::display::DisplayTarget;
use crate::validate::{FormState, Verdict};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use tracing::debug;

pub trait EngineHooks {
    fn check(&mut self, block: &Block, form: &FormState) -> Verdict;
    fn record(&mut self, key: &str, value: Value);
    /// Called once, after the last block.
    fn finished(&mut self, event: SequenceExhausted, display: &mut dyn DisplayTarget)
        -> Result<()>;
}

pub trait TrialEngine {
    fn start(
        &mut self,
        display: &mut dyn DisplayTarget,
        sequence: &ExperimentSequence,
        hooks: &mut dyn EngineHooks,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    #[serde(default)]
    pub forms: Vec<FormState>,
    #[serde(default)]
    pub choices: BTreeMap<String, Value>,
    #[serde(default)]
    pub passed_practice: bool,
}

impl Script {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display()))?;
        let is_json = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let script = if is_json {
            serde_json::from_str(&data)
                .with_context(|| format!("invalid script {}", path.display()))?
        } else {
            serde_yaml::from_str(&data)
                .with_context(|| format!("invalid script {}", path.display()))?
        };
        Ok(script)
    }
}

#[derive(Debug)]
pub struct ScriptedEngine {
    forms: VecDeque<FormState>,
    choices: BTreeMap<String, Value>,
    passed_practice: bool,
}

impl ScriptedEngine {
    pub fn new(script: Script) -> Self {
        Self {
            forms: script.forms.into(),
            choices: script.choices,
            passed_practice: script.passed_practice,
        }
    }
}

impl TrialEngine for ScriptedEngine {
    fn start(
        &mut self,
        display: &mut dyn DisplayTarget,
        sequence: &ExperimentSequence,
        hooks: &mut dyn EngineHooks,
    ) -> Result<()> {
        for (idx, block) in sequence.iter().enumerate() {
            debug!(idx, block = %block.label(), "playing block");
            match block {
                Block::ClickChoice(choice) => {
                    if let Some(value) = self.choices.get(&choice.name) {
                        hooks.record(&choice.name, value.clone());
                    }
                }
                Block::Html(html) if html.form.is_some() => loop {
                    let form = self.forms.pop_front().ok_or_else(|| {
                        anyhow!(
                            "script has no form submission left for block {} ({})",
                            idx,
                            html.url
                        )
                    })?;
                    match hooks.check(block, &form) {
                        Verdict::Accepted => break,
                        Verdict::Rejected { message } => display.alert(&message),
                    }
                },
                Block::Instructions(_) | Block::Html(_) | Block::Debrief(_) => {}
            }
        }
        hooks.finished(
            SequenceExhausted {
                passed_practice: self.passed_practice,
            },
            display,
        )
    }
}
