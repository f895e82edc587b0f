//! Consistency checking of installed decisions.
//!
//! An installed operator (or an impasse sub-goal) is only trusted while the
//! goal's live preferences would still produce it. The checker asks the
//! preference semantics what it would decide now, without committing, and
//! tears the decision down when the answer no longer matches.

use crate::changes::WorkingMemory;
use crate::error::DecideResult;
use crate::goal::GoalId;
use crate::phase::PhaseControl;
use crate::semantics::{ImpasseClassification, PreferenceSemantics};

use super::Decider;

impl<S, W, P> Decider<S, W, P>
where
    S: PreferenceSemantics,
    W: WorkingMemory,
    P: PhaseControl,
{
    /// Whether `goal`'s current decision is still what its preferences
    /// support.
    ///
    /// The existing sub-goal's impasse is compared by kind only; an operator
    /// no-change compares as `None`, so its operator is re-validated like any
    /// unique decision. With no sub-goal, the installed operator only has to
    /// be *one of* the candidates: indifferent alternatives do not unseat it.
    pub fn is_consistent(&mut self, goal: GoalId) -> DecideResult<bool> {
        let g = self.stack.goal(goal)?;
        let current = match g.lower() {
            Some(lower) => ImpasseClassification::of_existing(self.stack.goal(lower)?.impasse()),
            None => ImpasseClassification::None,
        };
        let installed = g.operator().installed_value();
        let has_subgoal = g.has_subgoal();
        let level = g.level();

        // Bottom goal awaiting its first decision: nothing to invalidate.
        if installed.is_none() && !has_subgoal {
            return Ok(true);
        }

        let evaluation = self.semantics.evaluate(g.operator(), false);

        if current != evaluation.classification {
            tracing::debug!(
                level,
                %current,
                new = %evaluation.classification,
                "impasse classification changed"
            );
            return Ok(false);
        }

        if current != ImpasseClassification::None {
            return Ok(true);
        }

        // An operator no-change sub-goal without an installed operator is stale.
        let consistent = installed.is_some_and(|value| evaluation.has_candidate(value));
        if !consistent {
            tracing::debug!(level, "installed operator is no longer a candidate");
        }
        Ok(consistent)
    }

    /// Tear down `goal`'s decision: withdraw the installed operator, remove
    /// every goal below it, then flush the buffered changes.
    pub fn remove_decision(&mut self, goal: GoalId) -> DecideResult<()> {
        let mut changes = self.stack.remove_operator(goal)?;
        if let Some(lower) = self.stack.goal(goal)?.lower() {
            changes.absorb(self.stack.remove_goal_and_descendants(lower)?);
        }
        tracing::info!(
            %goal,
            level = self.stack.goal(goal)?.level(),
            changes = changes.len(),
            "removing inconsistent decision"
        );
        self.flush(changes)
    }

    /// Check decisions from the highest goal whose context changed down to
    /// `bound_level`.
    ///
    /// Stops at the first inconsistent goal, removes its decision and returns
    /// `false`: everything below it is gone, so there is nothing left to scan.
    pub fn check_slot_decisions(&mut self, bound_level: u32) -> DecideResult<bool> {
        let Some(start) = self.stack.highest_goal_whose_context_changed() else {
            return Ok(true);
        };

        let mut visited = Vec::new();
        let mut cursor = Some(start);
        let mut verdict = true;
        while let Some(handle) = cursor {
            let goal = self.stack.goal(handle)?;
            if goal.level() > bound_level {
                break;
            }
            cursor = goal.lower();
            visited.push(handle);

            let slot = goal.operator();
            let decided = goal.has_subgoal() || slot.installed().is_some();
            if decided && slot.is_changed() && !self.is_consistent(handle)? {
                self.remove_decision(handle)?;
                verdict = false;
                break;
            }
        }

        for handle in visited {
            if let Some(goal) = self.stack.get_mut(handle) {
                goal.operator_mut().clear_changed();
            }
        }
        self.stack.recompute_highest_changed();
        Ok(verdict)
    }

    /// [`check_slot_decisions`](Self::check_slot_decisions) bounded at
    /// `goal`'s level.
    pub fn check_stack_through_goal(&mut self, goal: GoalId) -> DecideResult<bool> {
        let level = self.stack.goal(goal)?.level();
        self.check_slot_decisions(level)
    }
}
