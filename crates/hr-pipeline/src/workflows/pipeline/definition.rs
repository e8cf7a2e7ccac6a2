use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

use serde::Serialize;

/// Closed vocabulary of stages for one workflow.
pub trait PipelineStage: Copy + Eq + Hash + Debug + Serialize + Send + Sync + 'static {
    /// Every stage of the vocabulary, in declaration order.
    fn all() -> &'static [Self];

    /// Stable storage/wire key, e.g. `interview_2`.
    fn key(self) -> &'static str;

    fn label(self) -> &'static str;

    /// Exact key match; padded or differently cased values are not stage keys.
    fn from_key(raw: &str) -> Option<Self> {
        Self::all().iter().copied().find(|stage| stage.key() == raw)
    }
}

/// Problems detected while assembling a [`PipelineDefinition`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    #[error("pipeline order is empty")]
    EmptyOrder,
    #[error("stage {0} appears more than once in the pipeline order")]
    DuplicateStage(&'static str),
    #[error("absorbing stage {0} is also part of the pipeline order")]
    AbsorbingInOrder(&'static str),
    #[error("terminal stage {0} cannot have successors")]
    TerminalHasSuccessors(&'static str),
    #[error("absorbing stage {0} cannot have a transition table entry")]
    AbsorbingHasSuccessors(&'static str),
    #[error("transition {from} -> {to} references a stage outside the pipeline")]
    UnknownStage {
        from: &'static str,
        to: &'static str,
    },
}

/// Immutable shape of one workflow: canonical order, successor table,
/// absorbing (halted) stages and the terminal (completed) stage.
#[derive(Debug, Clone)]
pub struct PipelineDefinition<S: PipelineStage> {
    entity_type: &'static str,
    stage_field: &'static str,
    order: Vec<S>,
    base_rank: usize,
    ranks: HashMap<S, usize>,
    successors: HashMap<S, HashSet<S>>,
    absorbing: Vec<S>,
    terminal: S,
}

impl<S: PipelineStage> PipelineDefinition<S> {
    pub fn builder(entity_type: &'static str, stage_field: &'static str) -> PipelineBuilder<S> {
        PipelineBuilder {
            entity_type,
            stage_field,
            order: Vec::new(),
            base_rank: 0,
            transitions: Vec::new(),
            absorbing: Vec::new(),
        }
    }

    /// Entity name used in audit events, e.g. `request`.
    pub fn entity_type(&self) -> &'static str {
        self.entity_type
    }

    /// Name of the stored field holding the stage, e.g. `status`.
    pub fn stage_field(&self) -> &'static str {
        self.stage_field
    }

    pub fn order(&self) -> &[S] {
        &self.order
    }

    pub fn entry(&self) -> S {
        self.order[0]
    }

    pub fn entry_rank(&self) -> usize {
        self.base_rank
    }

    pub fn terminal(&self) -> S {
        self.terminal
    }

    pub fn absorbing(&self) -> &[S] {
        &self.absorbing
    }

    pub fn is_terminal(&self, stage: S) -> bool {
        stage == self.terminal
    }

    pub fn is_absorbing(&self, stage: S) -> bool {
        self.absorbing.contains(&stage)
    }

    /// Rank of a stage along the canonical order. Absorbing stages are unranked.
    pub fn index_of(&self, stage: S) -> Option<usize> {
        self.ranks.get(&stage).copied()
    }

    /// Legal direct successors of `stage`, absorbing stages included.
    /// Terminal and absorbing stages have none.
    pub fn transitions(&self, stage: S) -> HashSet<S> {
        if self.is_terminal(stage) || self.is_absorbing(stage) {
            return HashSet::new();
        }

        let mut next = self.successors.get(&stage).cloned().unwrap_or_default();
        next.extend(self.absorbing.iter().copied());
        next
    }

    pub(crate) fn permits(&self, from: S, to: S) -> bool {
        self.is_absorbing(to)
            || self
                .successors
                .get(&from)
                .is_some_and(|next| next.contains(&to))
    }

    /// Sort key placing ranked stages first, then absorbing stages in declaration order.
    pub(crate) fn sort_key(&self, stage: S) -> (usize, usize) {
        match self.index_of(stage) {
            Some(rank) => (0, rank),
            None => (
                1,
                self.absorbing
                    .iter()
                    .position(|candidate| *candidate == stage)
                    .unwrap_or(usize::MAX),
            ),
        }
    }
}

/// Collects the declarative tables and validates them once in [`PipelineBuilder::build`].
#[derive(Debug)]
pub struct PipelineBuilder<S: PipelineStage> {
    entity_type: &'static str,
    stage_field: &'static str,
    order: Vec<S>,
    base_rank: usize,
    transitions: Vec<(S, Vec<S>)>,
    absorbing: Vec<S>,
}

impl<S: PipelineStage> PipelineBuilder<S> {
    /// Canonical forward progression; the last stage becomes the terminal stage.
    pub fn order(mut self, order: &[S]) -> Self {
        self.order = order.to_vec();
        self
    }

    /// Rank assigned to the entry stage. Later stages count up from here.
    pub fn base_rank(mut self, base_rank: usize) -> Self {
        self.base_rank = base_rank;
        self
    }

    pub fn transition(mut self, from: S, to: &[S]) -> Self {
        self.transitions.push((from, to.to_vec()));
        self
    }

    pub fn absorbing(mut self, stages: &[S]) -> Self {
        self.absorbing = stages.to_vec();
        self
    }

    pub fn build(self) -> Result<PipelineDefinition<S>, DefinitionError> {
        let terminal = *self.order.last().ok_or(DefinitionError::EmptyOrder)?;

        let mut ranks = HashMap::with_capacity(self.order.len());
        for (position, stage) in self.order.iter().enumerate() {
            if ranks.insert(*stage, self.base_rank + position).is_some() {
                return Err(DefinitionError::DuplicateStage(stage.key()));
            }
        }

        if let Some(stage) = self.absorbing.iter().find(|stage| ranks.contains_key(*stage)) {
            return Err(DefinitionError::AbsorbingInOrder(stage.key()));
        }

        let mut successors: HashMap<S, HashSet<S>> = HashMap::new();
        for (from, to) in self.transitions {
            if self.absorbing.contains(&from) {
                return Err(DefinitionError::AbsorbingHasSuccessors(from.key()));
            }
            if !ranks.contains_key(&from) {
                return Err(DefinitionError::UnknownStage {
                    from: from.key(),
                    to: to.first().map_or("-", |stage| stage.key()),
                });
            }
            if from == terminal && !to.is_empty() {
                return Err(DefinitionError::TerminalHasSuccessors(from.key()));
            }
            for target in &to {
                if !ranks.contains_key(target) && !self.absorbing.contains(target) {
                    return Err(DefinitionError::UnknownStage {
                        from: from.key(),
                        to: target.key(),
                    });
                }
            }
            successors.entry(from).or_default().extend(to);
        }

        Ok(PipelineDefinition {
            entity_type: self.entity_type,
            stage_field: self.stage_field,
            order: self.order,
            base_rank: self.base_rank,
            ranks,
            successors,
            absorbing: self.absorbing,
            terminal,
        })
    }
}
