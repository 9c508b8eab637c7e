use crate::block::Block;
use crate::registry::BlockRegistry;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunFlags {
    pub practice: bool,
    pub collect_demo: bool,
    pub collect_validating_demo: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExperimentSequence {
    blocks: Vec<Block>,
}

impl ExperimentSequence {
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Block> {
        self.blocks.iter()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.blocks.iter().map(Block::kind).collect()
    }
}

impl<'a> IntoIterator for &'a ExperimentSequence {
    type Item = &'a Block;
    type IntoIter = std::slice::Iter<'a, Block>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}

pub fn assemble(base: &[Block], flags: RunFlags, registry: &BlockRegistry) -> ExperimentSequence {
    let mut blocks = Vec::with_capacity(base.len() + 3);
    if flags.collect_validating_demo {
        blocks.push(registry.validating_demographics().clone());
    }
    if flags.collect_demo {
        blocks.push(registry.demographics().clone());
    }
    blocks.extend(base.iter().cloned());
    if flags.practice {
        blocks.push(registry.debrief().clone());
    }
    tracing::debug!(
        practice = flags.practice,
        collect_demo = flags.collect_demo,
        collect_validating_demo = flags.collect_validating_demo,
        base = base.len(),
        total = blocks.len(),
        "assembled experiment sequence"
    );
    ExperimentSequence { blocks }
}
