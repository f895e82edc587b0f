//! Preference semantics: turning a slot's preferences into a decision.
//!
//! [`PreferenceSemantics`] is the seam the decision core consumes. Given a
//! slot it returns an [`Evaluation`]: an impasse classification plus the
//! ordered candidates. For a `None` classification the first candidate is
//! the one that gets installed.
//!
//! With `commit = false` an implementation must be free of side effects.
//! The slot is only borrowed immutably, and the implementor's own state
//! (e.g. the random generator behind indifferent selection) must stay
//! untouched, so the consistency checker can ask "what would you decide
//! now?" without disturbing the real decision.
//!
//! [`PreferenceResolver`] is the reference implementation: a reduced
//! preference algebra (require/prohibit, acceptable/reject, better/worse,
//! best/worst, unary and binary indifference) that can produce every
//! classification.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::goal::{Impasse, ImpasseKind};
use crate::preference::{Preference, PreferenceKind};
use crate::slot::Slot;
use crate::symbol::SymbolId;

/// Outcome class of preference resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpasseClassification {
    /// A single operator is determined (or several indifferent ones).
    None,
    ConstraintFailure,
    Conflict,
    Tie,
    NoChange,
}

impl From<ImpasseKind> for ImpasseClassification {
    fn from(kind: ImpasseKind) -> Self {
        match kind {
            ImpasseKind::ConstraintFailure => Self::ConstraintFailure,
            ImpasseKind::Conflict => Self::Conflict,
            ImpasseKind::Tie => Self::Tie,
            ImpasseKind::NoChange => Self::NoChange,
        }
    }
}

impl ImpasseClassification {
    /// The impasse kind a sub-goal would be created for, if any.
    pub fn impasse_kind(self) -> Option<ImpasseKind> {
        match self {
            Self::None => None,
            Self::ConstraintFailure => Some(ImpasseKind::ConstraintFailure),
            Self::Conflict => Some(ImpasseKind::Conflict),
            Self::Tie => Some(ImpasseKind::Tie),
            Self::NoChange => Some(ImpasseKind::NoChange),
        }
    }

    /// Classification used when comparing an existing sub-goal against
    /// fresh preference semantics.
    ///
    /// An operator no-change compares as `None`: the installed operator must
    /// still be backed by live preferences like any unique decision.
    pub fn of_existing(impasse: Option<Impasse>) -> Self {
        match impasse {
            Some(i) if i.is_operator_no_change() => Self::None,
            Some(i) => i.kind.into(),
            None => Self::None,
        }
    }
}

impl std::fmt::Display for ImpasseClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.impasse_kind() {
            Some(kind) => write!(f, "{kind}"),
            None => f.write_str("none"),
        }
    }
}

/// Result of evaluating a slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub classification: ImpasseClassification,
    pub candidates: Vec<Preference>,
}

impl Evaluation {
    pub fn new(classification: ImpasseClassification, candidates: Vec<Preference>) -> Self {
        Self {
            classification,
            candidates,
        }
    }

    /// The value that would be installed, for a `None` classification.
    pub fn winner(&self) -> Option<SymbolId> {
        match self.classification {
            ImpasseClassification::None => self.candidates.first().map(|p| p.value),
            _ => None,
        }
    }

    /// Whether any candidate proposes `value`.
    pub fn has_candidate(&self, value: SymbolId) -> bool {
        self.candidates.iter().any(|p| p.value == value)
    }
}

/// The preference-resolution seam.
pub trait PreferenceSemantics {
    /// Evaluate `slot`. With `commit = false` this must not change any state.
    fn evaluate(&mut self, slot: &Slot, commit: bool) -> Evaluation;
}

/// How a committed decision picks among mutually indifferent candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndifferentSelection {
    /// Always the first candidate in preference order.
    First,
    /// Uniformly at random from a seeded generator.
    #[default]
    Random,
}

/// Reference [`PreferenceSemantics`] implementation.
#[derive(Debug, Clone)]
pub struct PreferenceResolver {
    selection: IndifferentSelection,
    rng: StdRng,
    commits: u64,
}

impl PreferenceResolver {
    pub fn new(selection: IndifferentSelection, seed: u64) -> Self {
        Self {
            selection,
            rng: StdRng::seed_from_u64(seed),
            commits: 0,
        }
    }

    pub fn selection(&self) -> IndifferentSelection {
        self.selection
    }

    /// Number of committed evaluations so far.
    pub fn commits(&self) -> u64 {
        self.commits
    }

    /// Side-effect-free resolution with candidates in preference order.
    fn resolve(slot: &Slot) -> Evaluation {
        let prefs: Vec<&Preference> = slot.preferences().collect();
        let has = |kind: PreferenceKind, value: SymbolId| {
            prefs.iter().any(|p| p.kind == kind && p.value == value)
        };
        let relates = |kind: PreferenceKind, value: SymbolId, referent: SymbolId| {
            prefs
                .iter()
                .any(|p| p.kind == kind && p.value == value && p.referent == Some(referent))
        };

        let prohibited: HashSet<SymbolId> = prefs
            .iter()
            .filter(|p| p.kind == PreferenceKind::Prohibit)
            .map(|p| p.value)
            .collect();

        let requires = first_per_value(&prefs, PreferenceKind::Require, |_| true);
        if let Some(first) = requires.first() {
            if requires.len() > 1 || prohibited.contains(&first.value) {
                return Evaluation::new(ImpasseClassification::ConstraintFailure, requires);
            }
            return Evaluation::new(ImpasseClassification::None, requires);
        }

        let mut candidates = first_per_value(&prefs, PreferenceKind::Acceptable, |v| {
            !prohibited.contains(&v) && !has(PreferenceKind::Reject, v)
        });
        if candidates.is_empty() {
            return Evaluation::new(ImpasseClassification::NoChange, candidates);
        }

        // a dominates b: (a > b) or (b < a)
        let dominates = |a: SymbolId, b: SymbolId| {
            a != b && (relates(PreferenceKind::Better, a, b) || relates(PreferenceKind::Worse, b, a))
        };
        let conflicted: Vec<Preference> = candidates
            .iter()
            .filter(|a| {
                candidates
                    .iter()
                    .any(|b| dominates(a.value, b.value) && dominates(b.value, a.value))
            })
            .copied()
            .collect();
        if !conflicted.is_empty() {
            return Evaluation::new(ImpasseClassification::Conflict, conflicted);
        }
        let undominated: Vec<Preference> = candidates
            .iter()
            .filter(|a| !candidates.iter().any(|b| dominates(b.value, a.value)))
            .copied()
            .collect();
        if undominated.is_empty() {
            // Dominance cycle longer than two.
            return Evaluation::new(ImpasseClassification::Conflict, candidates);
        }
        candidates = undominated;

        if candidates.iter().any(|c| has(PreferenceKind::Best, c.value)) {
            candidates.retain(|c| has(PreferenceKind::Best, c.value));
        }
        if candidates.iter().any(|c| !has(PreferenceKind::Worst, c.value)) {
            candidates.retain(|c| !has(PreferenceKind::Worst, c.value));
        }

        if candidates.len() == 1 {
            return Evaluation::new(ImpasseClassification::None, candidates);
        }

        let indifferent = |a: SymbolId, b: SymbolId| {
            has(PreferenceKind::UnaryIndifferent, a)
                || has(PreferenceKind::UnaryIndifferent, b)
                || relates(PreferenceKind::BinaryIndifferent, a, b)
                || relates(PreferenceKind::BinaryIndifferent, b, a)
        };
        let all_indifferent = candidates.iter().enumerate().all(|(i, a)| {
            candidates[i + 1..]
                .iter()
                .all(|b| indifferent(a.value, b.value))
        });
        if all_indifferent {
            Evaluation::new(ImpasseClassification::None, candidates)
        } else {
            Evaluation::new(ImpasseClassification::Tie, candidates)
        }
    }
}

impl Default for PreferenceResolver {
    fn default() -> Self {
        Self::new(IndifferentSelection::default(), 0)
    }
}

impl PreferenceSemantics for PreferenceResolver {
    fn evaluate(&mut self, slot: &Slot, commit: bool) -> Evaluation {
        let mut evaluation = Self::resolve(slot);
        if !commit {
            return evaluation;
        }

        self.commits += 1;
        let n = evaluation.candidates.len();
        if evaluation.classification == ImpasseClassification::None && n > 1 {
            let pick = match self.selection {
                IndifferentSelection::First => 0,
                IndifferentSelection::Random => self.rng.gen_range(0..n),
            };
            let chosen = evaluation.candidates.remove(pick);
            evaluation.candidates.insert(0, chosen);
        }
        evaluation
    }
}

/// First preference of `kind` for each distinct value accepted by `keep`,
/// in insertion order.
fn first_per_value(
    prefs: &[&Preference],
    kind: PreferenceKind,
    keep: impl Fn(SymbolId) -> bool,
) -> Vec<Preference> {
    let mut seen = HashSet::new();
    prefs
        .iter()
        .filter(|p| p.kind == kind && keep(p.value))
        .filter(|p| seen.insert(p.value))
        .map(|p| **p)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preference::PreferenceId;
    use crate::slot::ContextAttribute;

    fn sym(id: u64) -> SymbolId {
        SymbolId::new(id).unwrap()
    }

    fn slot_with(prefs: &[Preference]) -> Slot {
        let mut slot = Slot::new(sym(100), ContextAttribute::Operator);
        for (i, p) in prefs.iter().enumerate() {
            slot.add_preference(PreferenceId(i as u64 + 1), *p);
        }
        slot
    }

    fn values(e: &Evaluation) -> Vec<SymbolId> {
        e.candidates.iter().map(|p| p.value).collect()
    }

    fn resolve(prefs: &[Preference]) -> Evaluation {
        PreferenceResolver::new(IndifferentSelection::First, 0).evaluate(&slot_with(prefs), false)
    }

    #[test]
    fn single_acceptable_is_unique() {
        let e = resolve(&[Preference::acceptable(sym(1))]);
        assert_eq!(e.classification, ImpasseClassification::None);
        assert_eq!(e.winner(), Some(sym(1)));
    }

    #[test]
    fn no_candidates_is_no_change() {
        let e = resolve(&[Preference::acceptable(sym(1)), Preference::reject(sym(1))]);
        assert_eq!(e.classification, ImpasseClassification::NoChange);
        assert!(e.candidates.is_empty());
        assert_eq!(e.winner(), None);

        let empty = resolve(&[]);
        assert_eq!(empty.classification, ImpasseClassification::NoChange);
    }

    #[test]
    fn two_acceptables_tie() {
        let e = resolve(&[Preference::acceptable(sym(1)), Preference::acceptable(sym(2))]);
        assert_eq!(e.classification, ImpasseClassification::Tie);
        assert_eq!(values(&e), vec![sym(1), sym(2)]);
        assert_eq!(e.winner(), None);
    }

    #[test]
    fn indifferent_candidates_are_all_returned() {
        let e = resolve(&[
            Preference::acceptable(sym(1)),
            Preference::acceptable(sym(2)),
            Preference::indifferent(sym(1)),
            Preference::indifferent(sym(2)),
        ]);
        assert_eq!(e.classification, ImpasseClassification::None);
        assert_eq!(values(&e), vec![sym(1), sym(2)]);

        let binary = resolve(&[
            Preference::acceptable(sym(1)),
            Preference::acceptable(sym(2)),
            Preference::indifferent_to(sym(2), sym(1)),
        ]);
        assert_eq!(binary.classification, ImpasseClassification::None);
    }

    #[test]
    fn better_and_worse_prune_candidates() {
        let e = resolve(&[
            Preference::acceptable(sym(1)),
            Preference::acceptable(sym(2)),
            Preference::acceptable(sym(3)),
            Preference::better(sym(2), sym(1)),
            Preference::worse(sym(3), sym(2)),
        ]);
        assert_eq!(e.classification, ImpasseClassification::None);
        assert_eq!(e.winner(), Some(sym(2)));
    }

    #[test]
    fn mutual_dominance_is_conflict() {
        let e = resolve(&[
            Preference::acceptable(sym(1)),
            Preference::acceptable(sym(2)),
            Preference::better(sym(1), sym(2)),
            Preference::better(sym(2), sym(1)),
        ]);
        assert_eq!(e.classification, ImpasseClassification::Conflict);
        assert_eq!(values(&e), vec![sym(1), sym(2)]);
    }

    #[test]
    fn dominance_cycle_is_conflict() {
        let e = resolve(&[
            Preference::acceptable(sym(1)),
            Preference::acceptable(sym(2)),
            Preference::acceptable(sym(3)),
            Preference::better(sym(1), sym(2)),
            Preference::better(sym(2), sym(3)),
            Preference::better(sym(3), sym(1)),
        ]);
        assert_eq!(e.classification, ImpasseClassification::Conflict);
    }

    #[test]
    fn requires_decide_or_fail() {
        let one = resolve(&[Preference::acceptable(sym(1)), Preference::require(sym(2))]);
        assert_eq!(one.classification, ImpasseClassification::None);
        assert_eq!(one.winner(), Some(sym(2)));

        let two = resolve(&[Preference::require(sym(1)), Preference::require(sym(2))]);
        assert_eq!(two.classification, ImpasseClassification::ConstraintFailure);

        let prohibited = resolve(&[Preference::require(sym(1)), Preference::prohibit(sym(1))]);
        assert_eq!(prohibited.classification, ImpasseClassification::ConstraintFailure);
    }

    #[test]
    fn best_and_worst_filter() {
        let best = resolve(&[
            Preference::acceptable(sym(1)),
            Preference::acceptable(sym(2)),
            Preference::best(sym(2)),
        ]);
        assert_eq!(best.winner(), Some(sym(2)));

        let worst = resolve(&[
            Preference::acceptable(sym(1)),
            Preference::acceptable(sym(2)),
            Preference::worst(sym(1)),
        ]);
        assert_eq!(worst.winner(), Some(sym(2)));

        let all_worst = resolve(&[Preference::acceptable(sym(1)), Preference::worst(sym(1))]);
        assert_eq!(all_worst.winner(), Some(sym(1)));
    }

    #[test]
    fn evaluate_without_commit_is_repeatable_and_leaves_rng_alone() {
        let slot = slot_with(&[
            Preference::acceptable(sym(1)),
            Preference::acceptable(sym(2)),
            Preference::acceptable(sym(3)),
            Preference::indifferent(sym(1)),
            Preference::indifferent(sym(2)),
            Preference::indifferent(sym(3)),
        ]);
        let mut resolver = PreferenceResolver::new(IndifferentSelection::Random, 7);
        let mut reference = PreferenceResolver::new(IndifferentSelection::Random, 7);

        let a = resolver.evaluate(&slot, false);
        let b = resolver.evaluate(&slot, false);
        assert_eq!(a, b);
        assert_eq!(resolver.commits(), 0);

        // Same seed, same committed choice: the uncommitted calls did not
        // advance the generator.
        assert_eq!(resolver.evaluate(&slot, true), reference.evaluate(&slot, true));
        assert_eq!(resolver.commits(), 1);
    }

    #[test]
    fn committed_choice_is_moved_to_front() {
        let slot = slot_with(&[
            Preference::acceptable(sym(1)),
            Preference::acceptable(sym(2)),
            Preference::indifferent(sym(1)),
            Preference::indifferent(sym(2)),
        ]);
        let mut resolver = PreferenceResolver::new(IndifferentSelection::Random, 3);
        let e = resolver.evaluate(&slot, true);
        assert_eq!(e.classification, ImpasseClassification::None);
        assert_eq!(e.candidates.len(), 2);
        let winner = e.winner().unwrap();
        assert!(winner == sym(1) || winner == sym(2));
    }

    #[test]
    fn existing_operator_no_change_compares_as_none() {
        use crate::slot::ContextAttribute as A;
        assert_eq!(
            ImpasseClassification::of_existing(Some(Impasse::operator_no_change())),
            ImpasseClassification::None
        );
        assert_eq!(
            ImpasseClassification::of_existing(Some(Impasse::state_no_change())),
            ImpasseClassification::NoChange
        );
        assert_eq!(
            ImpasseClassification::of_existing(Some(Impasse::new(ImpasseKind::Tie, A::Operator))),
            ImpasseClassification::Tie
        );
        assert_eq!(ImpasseClassification::of_existing(None), ImpasseClassification::None);
    }
}
