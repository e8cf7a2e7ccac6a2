use std::fmt;

use serde::Serialize;

use super::definition::{PipelineDefinition, PipelineStage};

/// Why the evaluator refused a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    TerminalState,
    RestoreToCompletion,
    InvalidRestoreTarget,
    RestoreBeyondProgress,
    NotPermitted,
}

impl RejectionReason {
    pub const fn message(self) -> &'static str {
        match self {
            Self::TerminalState => "terminal state has no outgoing transitions",
            Self::RestoreToCompletion => "cannot restore directly to completion",
            Self::InvalidRestoreTarget => "invalid restore target",
            Self::RestoreBeyondProgress => "restore target exceeds previously reached progress",
            Self::NotPermitted => "transition not permitted by pipeline graph",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Outcome of [`evaluate`]. The caller persists the new stage and mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransitionDecision {
    pub allowed: bool,
    pub reason: Option<RejectionReason>,
    pub new_high_water_mark: usize,
}

impl TransitionDecision {
    fn allow(new_high_water_mark: usize) -> Self {
        Self {
            allowed: true,
            reason: None,
            new_high_water_mark,
        }
    }

    fn reject(reason: RejectionReason, high_water_mark: usize) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            new_high_water_mark: high_water_mark,
        }
    }
}

/// Decide whether `current -> target` is legal given the furthest rank reached so far.
///
/// Rules, first match wins:
/// 1. staying put is always allowed;
/// 2. nothing leaves the terminal stage;
/// 3. any absorbing stage can be entered;
/// 4. leaving an absorbing stage restores at most up to the high-water mark, never to terminal;
/// 5. everything else follows the successor table and raises the mark when it advances.
pub fn evaluate<S: PipelineStage>(
    definition: &PipelineDefinition<S>,
    current: S,
    high_water_mark: usize,
    target: S,
) -> TransitionDecision {
    if target == current {
        return TransitionDecision::allow(high_water_mark);
    }

    if definition.is_terminal(current) {
        return TransitionDecision::reject(RejectionReason::TerminalState, high_water_mark);
    }

    if definition.is_absorbing(target) {
        return TransitionDecision::allow(high_water_mark);
    }

    if definition.is_absorbing(current) {
        if definition.is_terminal(target) {
            return TransitionDecision::reject(
                RejectionReason::RestoreToCompletion,
                high_water_mark,
            );
        }

        return match definition.index_of(target) {
            None => TransitionDecision::reject(RejectionReason::InvalidRestoreTarget, high_water_mark),
            Some(rank) if rank <= high_water_mark => {
                TransitionDecision::allow(high_water_mark.max(rank))
            }
            Some(_) => {
                TransitionDecision::reject(RejectionReason::RestoreBeyondProgress, high_water_mark)
            }
        };
    }

    if !definition.permits(current, target) {
        return TransitionDecision::reject(RejectionReason::NotPermitted, high_water_mark);
    }

    let new_mark = definition
        .index_of(target)
        .map_or(high_water_mark, |rank| high_water_mark.max(rank));
    TransitionDecision::allow(new_mark)
}
