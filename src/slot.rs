//! Context slots: the (identifier, attribute) cells a decision is made for.
//!
//! A slot holds at most one installed [`Fact`] and the preferences competing
//! for it. Any preference change raises the slot's `changed` marker, which is
//! what makes the consistency checker look at the slot again.

use serde::{Deserialize, Serialize};

use crate::preference::{Preference, PreferenceId};
use crate::symbol::SymbolId;

/// Attribute of a context slot.
///
/// Only the operator slot takes part in consistency checking; `State` exists
/// so that impasses can tell a state no-change from an operator no-change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextAttribute {
    State,
    Operator,
}

impl std::fmt::Display for ContextAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::State => f.write_str("state"),
            Self::Operator => f.write_str("operator"),
        }
    }
}

/// An installed decision: `(id ^attribute value)` with its timetag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub value: SymbolId,
    pub timetag: u64,
}

/// A context slot and the preferences for it.
#[derive(Debug, Clone)]
pub struct Slot {
    id: SymbolId,
    attribute: ContextAttribute,
    fact: Option<Fact>,
    preferences: Vec<(PreferenceId, Preference)>,
    changed: bool,
}

impl Slot {
    pub fn new(id: SymbolId, attribute: ContextAttribute) -> Self {
        Self {
            id,
            attribute,
            fact: None,
            preferences: Vec::new(),
            changed: false,
        }
    }

    pub fn id(&self) -> SymbolId {
        self.id
    }

    pub fn attribute(&self) -> ContextAttribute {
        self.attribute
    }

    /// The installed fact, if a decision has been made for this slot.
    pub fn installed(&self) -> Option<&Fact> {
        self.fact.as_ref()
    }

    pub fn installed_value(&self) -> Option<SymbolId> {
        self.fact.map(|f| f.value)
    }

    /// Preferences in insertion order.
    pub fn preferences(&self) -> impl Iterator<Item = &Preference> {
        self.preferences.iter().map(|(_, p)| p)
    }

    pub fn preference_entries(&self) -> &[(PreferenceId, Preference)] {
        &self.preferences
    }

    pub fn preference(&self, id: PreferenceId) -> Option<&Preference> {
        self.preferences
            .iter()
            .find(|(pid, _)| *pid == id)
            .map(|(_, p)| p)
    }

    pub fn preference_count(&self) -> usize {
        self.preferences.len()
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn mark_changed(&mut self) {
        self.changed = true;
    }

    pub fn clear_changed(&mut self) {
        self.changed = false;
    }

    /// Add a preference and mark the slot changed.
    pub fn add_preference(&mut self, id: PreferenceId, preference: Preference) {
        self.preferences.push((id, preference));
        self.changed = true;
    }

    /// Remove a preference by handle, marking the slot changed if it existed.
    pub fn remove_preference(&mut self, id: PreferenceId) -> Option<Preference> {
        let pos = self.preferences.iter().position(|(pid, _)| *pid == id)?;
        self.changed = true;
        Some(self.preferences.remove(pos).1)
    }

    /// Drop every preference (goal teardown).
    pub fn clear_preferences(&mut self) {
        if !self.preferences.is_empty() {
            self.preferences.clear();
            self.changed = true;
        }
    }

    /// Install a decision, returning the fact it replaced.
    pub(crate) fn install(&mut self, fact: Fact) -> Option<Fact> {
        self.fact.replace(fact)
    }

    /// Take the installed decision out of the slot.
    pub(crate) fn take_fact(&mut self) -> Option<Fact> {
        self.fact.take()
    }
}
