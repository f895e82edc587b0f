//! The goal stack: a chain of goals from the top goal down to the deepest
//! impasse.
//!
//! Goals live in a generational arena and link to each other with
//! [`GoalId`] handles (`higher` toward the top, `lower` toward the bottom).
//! Goals are only ever pushed below the bottom goal and removed as a suffix
//! of the chain, so `level(lower(g)) == level(g) + 1` holds by construction;
//! [`GoalStack::check_invariants`] verifies it explicitly.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::activity::{Activation, ActivationClass, FiringType, PendingActivity};
use crate::changes::{ChangeBuffer, WmChange};
use crate::error::{DecideError, DecideResult};
use crate::preference::{Preference, PreferenceId};
use crate::slot::{ContextAttribute, Fact, Slot};
use crate::symbol::SymbolId;

/// Handle of a goal in the [`GoalStack`] arena.
///
/// The generation makes handles of removed goals stale: they never resolve
/// to a goal created later in the same arena slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct GoalId {
    index: u32,
    generation: u32,
}

impl std::fmt::Display for GoalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "goal#{}.{}", self.index, self.generation)
    }
}

/// Why no unique operator could be chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpasseKind {
    ConstraintFailure,
    Conflict,
    Tie,
    NoChange,
}

impl std::fmt::Display for ImpasseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConstraintFailure => f.write_str("constraint-failure"),
            Self::Conflict => f.write_str("conflict"),
            Self::Tie => f.write_str("tie"),
            Self::NoChange => f.write_str("no-change"),
        }
    }
}

/// The impasse a sub-goal was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Impasse {
    pub kind: ImpasseKind,
    pub attribute: ContextAttribute,
}

impl Impasse {
    pub fn new(kind: ImpasseKind, attribute: ContextAttribute) -> Self {
        Self { kind, attribute }
    }

    /// An operator was selected but nothing applies it.
    pub fn operator_no_change() -> Self {
        Self::new(ImpasseKind::NoChange, ContextAttribute::Operator)
    }

    /// No operator was proposed at all.
    pub fn state_no_change() -> Self {
        Self::new(ImpasseKind::NoChange, ContextAttribute::State)
    }

    pub fn is_operator_no_change(&self) -> bool {
        self.kind == ImpasseKind::NoChange && self.attribute == ContextAttribute::Operator
    }
}

impl std::fmt::Display for Impasse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.attribute, self.kind)
    }
}

/// One goal of the stack.
#[derive(Debug, Clone)]
pub struct Goal {
    id: SymbolId,
    level: u32,
    higher: Option<GoalId>,
    lower: Option<GoalId>,
    operator: Slot,
    impasse: Option<Impasse>,
    saved_firing_type: Option<FiringType>,
    pending: PendingActivity,
}

impl Goal {
    fn new(id: SymbolId, level: u32, higher: Option<GoalId>, impasse: Option<Impasse>) -> Self {
        Self {
            id,
            level,
            higher,
            lower: None,
            operator: Slot::new(id, ContextAttribute::Operator),
            impasse,
            saved_firing_type: None,
            pending: PendingActivity::new(),
        }
    }

    /// The goal's state identifier.
    pub fn id(&self) -> SymbolId {
        self.id
    }

    /// Depth in the stack; the top goal is level 1.
    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn higher(&self) -> Option<GoalId> {
        self.higher
    }

    pub fn lower(&self) -> Option<GoalId> {
        self.lower
    }

    /// Whether an impasse sub-goal exists below this goal.
    pub fn has_subgoal(&self) -> bool {
        self.lower.is_some()
    }

    /// The operator context slot.
    pub fn operator(&self) -> &Slot {
        &self.operator
    }

    /// The impasse this goal was created for; `None` for the top goal.
    pub fn impasse(&self) -> Option<Impasse> {
        self.impasse
    }

    /// Firing type saved when activity at a shallower goal interrupted this one.
    pub fn saved_firing_type(&self) -> Option<FiringType> {
        self.saved_firing_type
    }

    pub fn pending(&self) -> &PendingActivity {
        &self.pending
    }

    pub fn pending_mut(&mut self) -> &mut PendingActivity {
        &mut self.pending
    }

    pub(crate) fn save_firing_type(&mut self, firing_type: FiringType) {
        self.saved_firing_type = Some(firing_type);
    }

    pub(crate) fn take_saved_firing_type(&mut self) -> Option<FiringType> {
        self.saved_firing_type.take()
    }

    pub(crate) fn operator_mut(&mut self) -> &mut Slot {
        &mut self.operator
    }
}

#[derive(Debug, Clone)]
struct Entry {
    generation: u32,
    goal: Option<Goal>,
}

/// Arena-backed goal stack.
#[derive(Debug, Clone, Default)]
pub struct GoalStack {
    entries: Vec<Entry>,
    free: Vec<u32>,
    top: Option<GoalId>,
    bottom: Option<GoalId>,
    highest_changed: Option<GoalId>,
    nil_goal_retractions: VecDeque<Activation>,
    next_timetag: u64,
    next_preference: u64,
}

impl GoalStack {
    pub fn new() -> Self {
        Self::default()
    }

    // -- structure ---------------------------------------------------------

    /// Create the top goal (level 1).
    pub fn push_top_goal(&mut self, id: SymbolId) -> DecideResult<GoalId> {
        if self.top.is_some() {
            return Err(DecideError::TopGoalExists);
        }
        let handle = self.alloc(Goal::new(id, 1, None, None));
        self.top = Some(handle);
        self.bottom = Some(handle);
        Ok(handle)
    }

    /// Create a sub-goal for `impasse` below the current bottom goal.
    pub fn push_subgoal(&mut self, id: SymbolId, impasse: Impasse) -> DecideResult<GoalId> {
        let bottom = self.bottom.ok_or(DecideError::EmptyStack)?;
        let level = self.goal(bottom)?.level + 1;
        let handle = self.alloc(Goal::new(id, level, Some(bottom), Some(impasse)));
        self.goal_mut(bottom)?.lower = Some(handle);
        self.bottom = Some(handle);
        tracing::debug!(goal = %id, level, %impasse, "sub-goal created");
        Ok(handle)
    }

    fn alloc(&mut self, goal: Goal) -> GoalId {
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            entry.goal = Some(goal);
            GoalId {
                index,
                generation: entry.generation,
            }
        } else {
            let index = self.entries.len() as u32;
            self.entries.push(Entry {
                generation: 0,
                goal: Some(goal),
            });
            GoalId {
                index,
                generation: 0,
            }
        }
    }

    fn release(&mut self, handle: GoalId) -> Option<Goal> {
        let entry = self.entries.get_mut(handle.index as usize)?;
        if entry.generation != handle.generation {
            return None;
        }
        let goal = entry.goal.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(handle.index);
        Some(goal)
    }

    pub fn get(&self, handle: GoalId) -> Option<&Goal> {
        self.entries
            .get(handle.index as usize)
            .filter(|e| e.generation == handle.generation)
            .and_then(|e| e.goal.as_ref())
    }

    pub fn get_mut(&mut self, handle: GoalId) -> Option<&mut Goal> {
        self.entries
            .get_mut(handle.index as usize)
            .filter(|e| e.generation == handle.generation)
            .and_then(|e| e.goal.as_mut())
    }

    /// Like [`get`](Self::get), but a stale handle is an error.
    pub fn goal(&self, handle: GoalId) -> DecideResult<&Goal> {
        self.get(handle).ok_or_else(|| DecideError::GoalNotFound {
            goal: handle.to_string(),
        })
    }

    pub fn goal_mut(&mut self, handle: GoalId) -> DecideResult<&mut Goal> {
        self.get_mut(handle).ok_or_else(|| DecideError::GoalNotFound {
            goal: handle.to_string(),
        })
    }

    pub fn contains(&self, handle: GoalId) -> bool {
        self.get(handle).is_some()
    }

    pub fn top(&self) -> Option<GoalId> {
        self.top
    }

    pub fn bottom(&self) -> Option<GoalId> {
        self.bottom
    }

    pub fn is_empty(&self) -> bool {
        self.top.is_none()
    }

    /// Number of goals on the stack.
    pub fn depth(&self) -> usize {
        self.iter().count()
    }

    /// Goals from the top down.
    pub fn iter(&self) -> impl Iterator<Item = (GoalId, &Goal)> {
        let mut cursor = self.top;
        std::iter::from_fn(move || {
            let handle = cursor?;
            let goal = self.get(handle)?;
            cursor = goal.lower;
            Some((handle, goal))
        })
    }

    pub fn goal_at_level(&self, level: u32) -> Option<GoalId> {
        self.iter()
            .find(|(_, g)| g.level == level)
            .map(|(handle, _)| handle)
    }

    // -- preferences ---------------------------------------------------------

    /// Add a preference to `goal`'s operator slot.
    pub fn add_preference(
        &mut self,
        goal: GoalId,
        preference: Preference,
    ) -> DecideResult<PreferenceId> {
        self.next_preference += 1;
        let id = PreferenceId(self.next_preference);
        self.goal_mut(goal)?
            .operator_mut()
            .add_preference(id, preference);
        self.note_context_changed(goal)?;
        Ok(id)
    }

    /// Remove a preference from `goal`'s operator slot.
    pub fn remove_preference(
        &mut self,
        goal: GoalId,
        id: PreferenceId,
    ) -> DecideResult<Option<Preference>> {
        let removed = self.goal_mut(goal)?.operator_mut().remove_preference(id);
        if removed.is_some() {
            self.note_context_changed(goal)?;
        }
        Ok(removed)
    }

    /// Raise the "highest goal whose context changed" mark to `goal` if it is
    /// shallower than the current mark.
    fn note_context_changed(&mut self, goal: GoalId) -> DecideResult<()> {
        let level = self.goal(goal)?.level;
        let replace = match self.highest_changed.and_then(|h| self.get(h)) {
            Some(current) => level < current.level,
            None => true,
        };
        if replace {
            self.highest_changed = Some(goal);
        }
        Ok(())
    }

    /// The shallowest goal whose operator slot changed since the last
    /// consistency pass.
    pub fn highest_goal_whose_context_changed(&self) -> Option<GoalId> {
        self.highest_changed.filter(|h| self.contains(*h))
    }

    /// Re-derive the mark from the slots' changed markers, after a
    /// consistency pass cleared the ones it consumed.
    pub(crate) fn recompute_highest_changed(&mut self) {
        let changed = self
            .iter()
            .find(|(_, g)| g.operator.is_changed())
            .map(|(handle, _)| handle);
        self.highest_changed = changed;
    }

    // -- decisions -----------------------------------------------------------

    fn fresh_timetag(&mut self) -> u64 {
        self.next_timetag += 1;
        self.next_timetag
    }

    /// Install `value` as `goal`'s operator. A previously installed operator
    /// is withdrawn through the returned buffer.
    pub fn install_operator(&mut self, goal: GoalId, value: SymbolId) -> DecideResult<ChangeBuffer> {
        let timetag = self.fresh_timetag();
        let g = self.goal_mut(goal)?;
        let id = g.id;
        let mut changes = ChangeBuffer::new();
        if let Some(old) = g.operator_mut().install(Fact { value, timetag }) {
            changes.push(WmChange::FactRemoved {
                goal: id,
                attribute: ContextAttribute::Operator,
                value: old.value,
                timetag: old.timetag,
            });
        }
        tracing::debug!(goal = %id, operator = %value, timetag, "operator installed");
        Ok(changes)
    }

    /// Withdraw `goal`'s installed operator, if any.
    pub fn remove_operator(&mut self, goal: GoalId) -> DecideResult<ChangeBuffer> {
        let g = self.goal_mut(goal)?;
        let id = g.id;
        let mut changes = ChangeBuffer::new();
        if let Some(old) = g.operator_mut().take_fact() {
            changes.push(WmChange::FactRemoved {
                goal: id,
                attribute: ContextAttribute::Operator,
                value: old.value,
                timetag: old.timetag,
            });
        }
        Ok(changes)
    }

    /// Remove `goal` and every goal below it, deepest first.
    ///
    /// Pending retractions of removed goals become nil-goal retractions;
    /// their pending assertions are dropped.
    pub fn remove_goal_and_descendants(&mut self, goal: GoalId) -> DecideResult<ChangeBuffer> {
        let higher = self.goal(goal)?.higher;

        let mut chain = Vec::new();
        let mut cursor = Some(goal);
        while let Some(handle) = cursor {
            cursor = self.goal(handle)?.lower;
            chain.push(handle);
        }

        let mut changes = ChangeBuffer::new();
        for handle in chain.into_iter().rev() {
            let Some(mut removed) = self.release(handle) else {
                continue;
            };
            if let Some(fact) = removed.operator.take_fact() {
                changes.push(WmChange::FactRemoved {
                    goal: removed.id,
                    attribute: ContextAttribute::Operator,
                    value: fact.value,
                    timetag: fact.timetag,
                });
            }
            let count = removed.operator.preference_count();
            if count > 0 {
                changes.push(WmChange::PreferencesReleased {
                    goal: removed.id,
                    count,
                });
            }
            self.nil_goal_retractions
                .extend(removed.pending.take_retractions());
            changes.push(WmChange::GoalRemoved {
                goal: removed.id,
                level: removed.level,
            });
            tracing::debug!(goal = %removed.id, level = removed.level, "goal removed");
        }

        match higher {
            Some(h) => {
                self.goal_mut(h)?.lower = None;
                self.bottom = Some(h);
            }
            None => {
                self.top = None;
                self.bottom = None;
            }
        }
        if self.highest_changed.is_some_and(|h| !self.contains(h)) {
            self.highest_changed = None;
        }
        Ok(changes)
    }

    // -- activity ------------------------------------------------------------

    /// Queue an activation at `goal` (match-engine entry point).
    pub fn enqueue(
        &mut self,
        goal: GoalId,
        class: ActivationClass,
        activation: Activation,
    ) -> DecideResult<()> {
        self.goal_mut(goal)?.pending.push(class, activation);
        Ok(())
    }

    /// Queue a retraction whose goal no longer exists.
    pub fn enqueue_nil_goal_retraction(&mut self, activation: Activation) {
        self.nil_goal_retractions.push_back(activation);
    }

    pub fn nil_goal_retractions(&self) -> &VecDeque<Activation> {
        &self.nil_goal_retractions
    }

    pub fn pop_nil_goal_retraction(&mut self) -> Option<Activation> {
        self.nil_goal_retractions.pop_front()
    }

    /// Drop every pending activation, including nil-goal retractions.
    pub fn clear_activity(&mut self) {
        self.nil_goal_retractions.clear();
        for entry in &mut self.entries {
            if let Some(goal) = entry.goal.as_mut() {
                goal.pending.clear();
            }
        }
    }

    // -- invariants ----------------------------------------------------------

    /// Verify links and levels from the top goal down.
    pub fn check_invariants(&self) -> DecideResult<()> {
        let violation = |level: u32, message: String| DecideError::StackInvariant { level, message };

        let mut expected_level = 1;
        let mut expected_higher: Option<GoalId> = None;
        let mut last = None;
        let mut cursor = self.top;
        while let Some(handle) = cursor {
            let goal = self
                .get(handle)
                .ok_or_else(|| violation(expected_level, format!("dangling handle {handle}")))?;
            if goal.level != expected_level {
                return Err(violation(
                    expected_level,
                    format!("goal {} has level {}", goal.id, goal.level),
                ));
            }
            if goal.higher != expected_higher {
                return Err(violation(
                    expected_level,
                    format!("goal {} has a broken higher link", goal.id),
                ));
            }
            if expected_level == 1 && goal.impasse.is_some() {
                return Err(violation(1, "top goal carries an impasse".into()));
            }
            if expected_level > 1 && goal.impasse.is_none() {
                return Err(violation(
                    expected_level,
                    format!("sub-goal {} has no impasse", goal.id),
                ));
            }
            expected_higher = Some(handle);
            last = Some(handle);
            expected_level += 1;
            cursor = goal.lower;
        }

        if last != self.bottom {
            return Err(violation(expected_level, "bottom goal is not the end of the chain".into()));
        }
        let live = self.entries.iter().filter(|e| e.goal.is_some()).count();
        let walked = (expected_level - 1) as usize;
        if live != walked {
            return Err(violation(
                expected_level,
                format!("{live} goals allocated but {walked} reachable"),
            ));
        }
        Ok(())
    }
}
