//! The activity-level waterfall.
//!
//! Once per elaboration step the waterfall finds the shallowest goal with
//! pending rule activity, classifies how that level moved since the last
//! step, and commits the firing type the step may use. Moving back up to a
//! shallower goal always re-validates that goal's decisions first: activity
//! deeper in the stack may have changed its preferences while it was not
//! being elaborated.
//!
//! The APPLY and PROPOSE variants share this structure. PROPOSE never fires
//! output assertions and always fires inference elaborations.

use serde::Serialize;

use crate::activity::{FiringType, MatchActivity};
use crate::changes::WorkingMemory;
use crate::error::{DecideError, DecideResult};
use crate::goal::GoalId;
use crate::phase::{Phase, PhaseControl};
use crate::semantics::PreferenceSemantics;

use super::Decider;

/// How the active level moved relative to the previous step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelTransition {
    /// Only retractions of removed goals are pending.
    NilGoalRetractions,
    /// First activity since the decision.
    NewDecision,
    SameLevel,
    /// Activity moved deeper into the stack.
    LowerLevel,
    /// Activity moved back up to a shallower goal.
    HigherLevel,
}

/// Why the waterfall ended the elaboration loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    Quiescence,
    ElaborationLimit,
    /// A decision was found inconsistent and removed.
    Inconsistency,
}

/// Result of one waterfall step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WaterfallOutcome {
    /// Rules of `firing_type` may fire at `goal` (`None` for nil-goal
    /// retractions).
    Fire {
        goal: Option<GoalId>,
        level: u32,
        firing_type: FiringType,
        transition: LevelTransition,
    },
    /// The elaboration loop is over; the cycle moved on to `phase`.
    PhaseChange {
        phase: Phase,
        reason: TransitionReason,
    },
}

/// Active-level tracking for one decision cycle.
///
/// Reset at the start of every decision and updated once per elaboration
/// step by the waterfall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveLevelState {
    active_goal: Option<GoalId>,
    active_level: u32,
    previous_active_goal: Option<GoalId>,
    previous_active_level: u32,
    firing_type: FiringType,
}

impl ActiveLevelState {
    pub fn new() -> Self {
        Self {
            active_goal: None,
            active_level: 0,
            previous_active_goal: None,
            previous_active_level: 0,
            firing_type: FiringType::InferenceElaboration,
        }
    }

    /// Forget all activity; called when a new decision begins.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn active_goal(&self) -> Option<GoalId> {
        self.active_goal
    }

    /// Level of the active goal; 0 when nothing (or only nil-goal
    /// retractions) is active.
    pub fn active_level(&self) -> u32 {
        self.active_level
    }

    pub fn previous_active_goal(&self) -> Option<GoalId> {
        self.previous_active_goal
    }

    pub fn previous_active_level(&self) -> u32 {
        self.previous_active_level
    }

    /// The committed firing type.
    pub fn firing_type(&self) -> FiringType {
        self.firing_type
    }
}

impl Default for ActiveLevelState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Apply,
    Propose,
}

impl Mode {
    fn next_phase(self) -> Phase {
        match self {
            Self::Apply => Phase::Output,
            Self::Propose => Phase::Decision,
        }
    }
}

enum Pass {
    Done(WaterfallOutcome),
    /// A saved firing type was restored; classify again.
    Reclassify,
}

impl<S, W, P> Decider<S, W, P>
where
    S: PreferenceSemantics,
    W: WorkingMemory,
    P: PhaseControl,
{
    /// One APPLY-phase waterfall step, reading activity from the goal
    /// stack's own queues.
    pub fn run_waterfall_apply(
        &mut self,
        state: &mut ActiveLevelState,
    ) -> DecideResult<WaterfallOutcome> {
        self.run_waterfall(state, Mode::Apply, None)
    }

    /// One PROPOSE-phase waterfall step, reading activity from the goal
    /// stack's own queues.
    pub fn run_waterfall_propose(
        &mut self,
        state: &mut ActiveLevelState,
    ) -> DecideResult<WaterfallOutcome> {
        self.run_waterfall(state, Mode::Propose, None)
    }

    /// APPLY step with activity reported by an external match engine.
    ///
    /// `activity` answers for the goal handles of this decider's stack.
    pub fn run_waterfall_apply_with(
        &mut self,
        state: &mut ActiveLevelState,
        activity: &dyn MatchActivity,
    ) -> DecideResult<WaterfallOutcome> {
        self.run_waterfall(state, Mode::Apply, Some(activity))
    }

    /// PROPOSE step with activity reported by an external match engine.
    pub fn run_waterfall_propose_with(
        &mut self,
        state: &mut ActiveLevelState,
        activity: &dyn MatchActivity,
    ) -> DecideResult<WaterfallOutcome> {
        self.run_waterfall(state, Mode::Propose, Some(activity))
    }

    fn activity<'a>(
        &'a self,
        external: Option<&'a dyn MatchActivity>,
    ) -> &'a dyn MatchActivity {
        external.unwrap_or(&self.stack)
    }

    /// Shallowest goal with activity the given phase would fire.
    fn highest_active_goal(
        &self,
        mode: Mode,
        external: Option<&dyn MatchActivity>,
    ) -> Option<GoalId> {
        let activity = self.activity(external);
        self.stack
            .iter()
            .find(|(handle, _)| {
                activity.has_inference_activity(*handle)
                    || (mode == Mode::Apply && activity.has_pending_output_assertions(*handle))
            })
            .map(|(handle, _)| handle)
    }

    /// Inference elaborations ran out at a goal that was firing them.
    fn minor_quiescence_at_goal(
        &self,
        state: &ActiveLevelState,
        goal: GoalId,
        external: Option<&dyn MatchActivity>,
    ) -> bool {
        state.firing_type == FiringType::InferenceElaboration
            && !self.activity(external).has_inference_activity(goal)
    }

    fn firing_type_at(
        &self,
        mode: Mode,
        goal: GoalId,
        external: Option<&dyn MatchActivity>,
    ) -> FiringType {
        match mode {
            Mode::Apply if !self.activity(external).has_inference_activity(goal) => {
                FiringType::PreferenceElaboration
            }
            _ => FiringType::InferenceElaboration,
        }
    }

    fn run_waterfall(
        &mut self,
        state: &mut ActiveLevelState,
        mode: Mode,
        external: Option<&dyn MatchActivity>,
    ) -> DecideResult<WaterfallOutcome> {
        // Each restore clears a saved firing type, so the depth bounds the loop.
        let bound = self.stack.depth() + 1;
        for _ in 0..=bound {
            if let Pass::Done(outcome) = self.waterfall_pass(state, mode, external)? {
                return Ok(outcome);
            }
        }
        tracing::error!(iterations = bound + 1, "waterfall did not settle");
        Err(DecideError::WaterfallDiverged {
            iterations: bound + 1,
        })
    }

    fn change_phase(&mut self, mode: Mode, reason: TransitionReason) -> Pass {
        let phase = mode.next_phase();
        tracing::debug!(%phase, ?reason, "leaving elaboration loop");
        self.phases.transition_to(phase);
        Pass::Done(WaterfallOutcome::PhaseChange { phase, reason })
    }

    fn waterfall_pass(
        &mut self,
        state: &mut ActiveLevelState,
        mode: Mode,
        external: Option<&dyn MatchActivity>,
    ) -> DecideResult<Pass> {
        let any_activity = match mode {
            Mode::Apply => self.activity(external).any_activity_anywhere(),
            Mode::Propose => self.activity(external).any_inference_activity_anywhere(),
        };
        if !any_activity {
            if let Some(bottom) = self.stack.bottom() {
                if self.minor_quiescence_at_goal(state, bottom, external) {
                    // Flush any pending inconsistency; the phase changes either way.
                    let _ = self.check_stack_through_goal(bottom)?;
                }
            }
            return Ok(self.change_phase(mode, TransitionReason::Quiescence));
        }

        if self.phases.elaboration_limit_exceeded() {
            return Ok(self.change_phase(mode, TransitionReason::ElaborationLimit));
        }

        let (active_goal, active_level) = match self.highest_active_goal(mode, external) {
            Some(goal) => (Some(goal), self.stack.goal(goal)?.level()),
            None if self.activity(external).has_nil_goal_retractions() => (None, 0),
            None => {
                tracing::error!(
                    active_level = state.active_level,
                    "activity pending but no active goal"
                );
                return Err(DecideError::NoActiveGoal);
            }
        };
        state.previous_active_goal = state.active_goal;
        state.previous_active_level = state.active_level;
        state.active_goal = active_goal;
        state.active_level = active_level;

        let Some(active) = state.active_goal else {
            state.firing_type = FiringType::InferenceElaboration;
            return Ok(fire(state, LevelTransition::NilGoalRetractions));
        };

        if state.previous_active_level == 0 {
            state.firing_type = self.firing_type_at(mode, active, external);
            return Ok(fire(state, LevelTransition::NewDecision));
        }

        match state.active_level.cmp(&state.previous_active_level) {
            std::cmp::Ordering::Equal => {
                if self.minor_quiescence_at_goal(state, active, external)
                    && !self.check_stack_through_goal(active)?
                {
                    return Ok(self.change_phase(mode, TransitionReason::Inconsistency));
                }
                state.firing_type = self.firing_type_at(mode, active, external);
                Ok(fire(state, LevelTransition::SameLevel))
            }
            std::cmp::Ordering::Greater => {
                if let Some(previous) = state.previous_active_goal.filter(|g| self.stack.contains(*g)) {
                    if self.minor_quiescence_at_goal(state, previous, external)
                        && !self.check_stack_through_goal(previous)?
                    {
                        return Ok(self.change_phase(mode, TransitionReason::Inconsistency));
                    }
                }
                // The check may have removed the goal we moved to.
                let Some(saved) = self.stack.get_mut(active).map(|g| g.take_saved_firing_type())
                else {
                    return Ok(self.change_phase(mode, TransitionReason::Inconsistency));
                };
                match (saved, mode) {
                    (Some(firing_type), Mode::Apply) => {
                        tracing::debug!(level = state.active_level, %firing_type, "restoring saved firing type");
                        state.firing_type = firing_type;
                        Ok(Pass::Reclassify)
                    }
                    (Some(_), Mode::Propose) => {
                        state.firing_type = FiringType::InferenceElaboration;
                        Ok(fire(state, LevelTransition::LowerLevel))
                    }
                    (None, _) => {
                        state.firing_type = self.firing_type_at(mode, active, external);
                        Ok(fire(state, LevelTransition::LowerLevel))
                    }
                }
            }
            std::cmp::Ordering::Less => {
                if let Some(previous) = state.previous_active_goal.and_then(|g| self.stack.get_mut(g)) {
                    previous.save_firing_type(state.firing_type);
                }
                if !self.check_stack_through_goal(active)? {
                    return Ok(self.change_phase(mode, TransitionReason::Inconsistency));
                }
                state.firing_type = self.firing_type_at(mode, active, external);
                Ok(fire(state, LevelTransition::HigherLevel))
            }
        }
    }
}

fn fire(state: &ActiveLevelState, transition: LevelTransition) -> Pass {
    tracing::debug!(
        level = state.active_level,
        previous = state.previous_active_level,
        firing_type = %state.firing_type,
        ?transition,
        "active level"
    );
    Pass::Done(WaterfallOutcome::Fire {
        goal: state.active_goal,
        level: state.active_level,
        firing_type: state.firing_type,
        transition,
    })
}
