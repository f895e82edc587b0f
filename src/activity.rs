//! Pending rule activity, as reported by the match engine.
//!
//! The match engine is external: it pushes [`Activation`]s onto the queue of
//! the goal they match in, and the waterfall only asks yes/no questions
//! through [`MatchActivity`].

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::goal::{GoalId, GoalStack};

/// Which class of pending activations may fire at the active level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FiringType {
    /// Inference-class rules (i-supported assertions and retractions).
    InferenceElaboration,
    /// Evaluation-class rules (o-supported assertions that apply operators).
    PreferenceElaboration,
}

impl std::fmt::Display for FiringType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InferenceElaboration => f.write_str("IE"),
            Self::PreferenceElaboration => f.write_str("PE"),
        }
    }
}

/// Queue an activation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationClass {
    InferenceAssertion,
    OutputAssertion,
    Retraction,
}

/// A matched (or unmatched, for retractions) rule instantiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activation {
    pub rule: String,
}

impl Activation {
    pub fn new(rule: impl Into<String>) -> Self {
        Self { rule: rule.into() }
    }
}

/// Per-goal queues of pending activations.
#[derive(Debug, Clone, Default)]
pub struct PendingActivity {
    inference_assertions: VecDeque<Activation>,
    output_assertions: VecDeque<Activation>,
    retractions: VecDeque<Activation>,
}

impl PendingActivity {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, class: ActivationClass) -> &VecDeque<Activation> {
        match class {
            ActivationClass::InferenceAssertion => &self.inference_assertions,
            ActivationClass::OutputAssertion => &self.output_assertions,
            ActivationClass::Retraction => &self.retractions,
        }
    }

    fn queue_mut(&mut self, class: ActivationClass) -> &mut VecDeque<Activation> {
        match class {
            ActivationClass::InferenceAssertion => &mut self.inference_assertions,
            ActivationClass::OutputAssertion => &mut self.output_assertions,
            ActivationClass::Retraction => &mut self.retractions,
        }
    }

    pub fn push(&mut self, class: ActivationClass, activation: Activation) {
        self.queue_mut(class).push_back(activation);
    }

    pub fn pop(&mut self, class: ActivationClass) -> Option<Activation> {
        self.queue_mut(class).pop_front()
    }

    pub fn has(&self, class: ActivationClass) -> bool {
        !self.queue(class).is_empty()
    }

    pub fn len(&self, class: ActivationClass) -> usize {
        self.queue(class).len()
    }

    pub fn is_empty(&self) -> bool {
        self.inference_assertions.is_empty()
            && self.output_assertions.is_empty()
            && self.retractions.is_empty()
    }

    pub fn clear(&mut self) {
        self.inference_assertions.clear();
        self.output_assertions.clear();
        self.retractions.clear();
    }

    /// Drain the retraction queue, leaving assertions untouched.
    pub(crate) fn take_retractions(&mut self) -> VecDeque<Activation> {
        std::mem::take(&mut self.retractions)
    }
}

/// What the waterfall needs to know from the match engine.
pub trait MatchActivity {
    fn has_pending_inference_assertions(&self, goal: GoalId) -> bool;

    fn has_pending_output_assertions(&self, goal: GoalId) -> bool;

    fn has_pending_retractions(&self, goal: GoalId) -> bool;

    /// Retractions whose goal no longer exists.
    fn has_nil_goal_retractions(&self) -> bool;

    /// Global quiescence test: `false` means nothing is pending anywhere.
    fn any_activity_anywhere(&self) -> bool;

    /// Like [`any_activity_anywhere`](Self::any_activity_anywhere), ignoring
    /// output assertions (the PROPOSE phase never fires them).
    fn any_inference_activity_anywhere(&self) -> bool;

    /// Inference-class activity at `goal`: i-assertions or retractions.
    fn has_inference_activity(&self, goal: GoalId) -> bool {
        self.has_pending_inference_assertions(goal) || self.has_pending_retractions(goal)
    }
}

impl MatchActivity for GoalStack {
    fn has_pending_inference_assertions(&self, goal: GoalId) -> bool {
        self.get(goal)
            .is_some_and(|g| g.pending().has(ActivationClass::InferenceAssertion))
    }

    fn has_pending_output_assertions(&self, goal: GoalId) -> bool {
        self.get(goal)
            .is_some_and(|g| g.pending().has(ActivationClass::OutputAssertion))
    }

    fn has_pending_retractions(&self, goal: GoalId) -> bool {
        self.get(goal)
            .is_some_and(|g| g.pending().has(ActivationClass::Retraction))
    }

    fn has_nil_goal_retractions(&self) -> bool {
        !self.nil_goal_retractions().is_empty()
    }

    fn any_activity_anywhere(&self) -> bool {
        self.has_nil_goal_retractions() || self.iter().any(|(_, g)| !g.pending().is_empty())
    }

    fn any_inference_activity_anywhere(&self) -> bool {
        self.has_nil_goal_retractions()
            || self.iter().any(|(_, g)| {
                g.pending().has(ActivationClass::InferenceAssertion)
                    || g.pending().has(ActivationClass::Retraction)
            })
    }
}
