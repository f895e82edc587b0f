//! The decision core: consistency checking, decision removal and the
//! activity-level waterfall.
//!
//! A [`Decider`] owns the goal stack and its three collaborators: the
//! preference semantics, working memory, and the phase facility. The
//! active-level state is *not* owned by the decider; callers pass an
//! [`ActiveLevelState`] into each waterfall step so that independent
//! waterfalls never share hidden state.

mod consistency;
mod waterfall;

pub use waterfall::{ActiveLevelState, LevelTransition, TransitionReason, WaterfallOutcome};

use serde::Serialize;

use crate::changes::{ChangeBuffer, ChangeLog, WorkingMemory};
use crate::config::DecideConfig;
use crate::error::DecideResult;
use crate::goal::{GoalId, GoalStack, Impasse};
use crate::phase::{PhaseControl, PhaseTracker};
use crate::semantics::{ImpasseClassification, PreferenceResolver, PreferenceSemantics};
use crate::slot::ContextAttribute;
use crate::symbol::{SymbolId, SymbolTable};

/// Result of a decision-phase pass over one goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// The installed operator or existing impasse still stands.
    Unchanged,
    /// A new operator was installed.
    Installed(SymbolId),
    /// A sub-goal was created for an impasse.
    Impasse { goal: GoalId, impasse: Impasse },
}

/// Owner of the goal stack and the collaborators a decision step needs.
#[derive(Debug)]
pub struct Decider<S = PreferenceResolver, W = ChangeLog, P = PhaseTracker> {
    stack: GoalStack,
    symbols: SymbolTable,
    semantics: S,
    wm: W,
    phases: P,
    check_invariants: bool,
}

impl Decider {
    /// Decider with the reference collaborators, configured from `config`.
    pub fn from_config(config: &DecideConfig) -> Self {
        Decider::new(
            GoalStack::new(),
            PreferenceResolver::new(config.indifferent_selection, config.seed),
            ChangeLog::new(),
            PhaseTracker::new(config.max_elaborations),
        )
        .with_invariant_checks(config.check_invariants)
    }
}

impl<S, W, P> Decider<S, W, P>
where
    S: PreferenceSemantics,
    W: WorkingMemory,
    P: PhaseControl,
{
    pub fn new(stack: GoalStack, semantics: S, wm: W, phases: P) -> Self {
        Self {
            stack,
            symbols: SymbolTable::new(),
            semantics,
            wm,
            phases,
            check_invariants: true,
        }
    }

    /// Verify the goal-stack invariant after every removal.
    pub fn with_invariant_checks(mut self, enabled: bool) -> Self {
        self.check_invariants = enabled;
        self
    }

    /// Use `symbols` for naming new goals and operators.
    pub fn with_symbols(mut self, symbols: SymbolTable) -> Self {
        self.symbols = symbols;
        self
    }

    pub fn stack(&self) -> &GoalStack {
        &self.stack
    }

    /// Mutable access for the match engine and rule firings (queueing
    /// activations, adding and removing preferences).
    pub fn stack_mut(&mut self) -> &mut GoalStack {
        &mut self.stack
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    pub fn semantics(&self) -> &S {
        &self.semantics
    }

    pub fn working_memory(&self) -> &W {
        &self.wm
    }

    pub fn working_memory_mut(&mut self) -> &mut W {
        &mut self.wm
    }

    pub fn phases(&self) -> &P {
        &self.phases
    }

    pub fn phases_mut(&mut self) -> &mut P {
        &mut self.phases
    }

    /// Create the top goal with a fresh state identifier.
    pub fn create_top_goal(&mut self) -> DecideResult<GoalId> {
        let id = self.symbols.fresh('S')?;
        self.stack.push_top_goal(id)
    }

    fn flush(&mut self, changes: ChangeBuffer) -> DecideResult<()> {
        self.wm.flush(changes);
        if self.check_invariants {
            self.stack.check_invariants()?;
        }
        Ok(())
    }

    /// Decision-phase pass over `goal`: commit the preference semantics and
    /// install the winner or create the impasse sub-goal.
    ///
    /// Re-deciding an operator that is still among the candidates keeps it,
    /// and at the bottom goal creates an operator no-change sub-goal.
    pub fn decide_operator(&mut self, goal: GoalId) -> DecideResult<Decision> {
        let g = self.stack.goal(goal)?;
        let installed = g.operator().installed_value();
        let existing = match g.lower() {
            Some(lower) => Some((lower, self.stack.goal(lower)?.impasse())),
            None => None,
        };
        let evaluation = self.semantics.evaluate(g.operator(), true);

        let decision = match (evaluation.classification, evaluation.winner()) {
            (ImpasseClassification::None, Some(winner)) => {
                // An indifferent alternative never unseats the installed operator.
                let winner = match installed {
                    Some(current) if evaluation.has_candidate(current) => current,
                    _ => winner,
                };
                if installed == Some(winner) {
                    match existing {
                        Some((_, Some(impasse))) if impasse.is_operator_no_change() => {
                            Decision::Unchanged
                        }
                        Some((lower, _)) => {
                            let changes = self.stack.remove_goal_and_descendants(lower)?;
                            self.flush(changes)?;
                            Decision::Unchanged
                        }
                        None => self.push_impasse(Impasse::operator_no_change())?,
                    }
                } else {
                    let mut changes = ChangeBuffer::new();
                    if let Some((lower, _)) = existing {
                        changes.absorb(self.stack.remove_goal_and_descendants(lower)?);
                    }
                    changes.absorb(self.stack.install_operator(goal, winner)?);
                    self.flush(changes)?;
                    Decision::Installed(winner)
                }
            }
            (classification, _) => {
                let impasse = match classification.impasse_kind() {
                    Some(kind) if evaluation.candidates.is_empty() => {
                        Impasse::new(kind, ContextAttribute::State)
                    }
                    Some(kind) => Impasse::new(kind, ContextAttribute::Operator),
                    None => Impasse::state_no_change(),
                };
                match existing {
                    Some((_, Some(current))) if current == impasse && installed.is_none() => {
                        Decision::Unchanged
                    }
                    _ => {
                        let mut changes = self.stack.remove_operator(goal)?;
                        if let Some((lower, _)) = existing {
                            changes.absorb(self.stack.remove_goal_and_descendants(lower)?);
                        }
                        self.flush(changes)?;
                        self.push_impasse(impasse)?
                    }
                }
            }
        };

        self.stack.goal_mut(goal)?.operator_mut().clear_changed();
        self.stack.recompute_highest_changed();
        tracing::debug!(%goal, ?decision, "decision phase");
        Ok(decision)
    }

    fn push_impasse(&mut self, impasse: Impasse) -> DecideResult<Decision> {
        let id = self.symbols.fresh('S')?;
        let goal = self.stack.push_subgoal(id, impasse)?;
        Ok(Decision::Impasse { goal, impasse })
    }
}
