//! Preferences: the competing claims rule firings make about a context slot.
//!
//! The decision core only reads preferences. They are added when a rule
//! fires and removed when that firing is retracted; both events mark the
//! owning slot as changed.

use serde::{Deserialize, Serialize};

use crate::symbol::SymbolId;

/// Type of a preference.
///
/// Unary kinds talk about `value` alone; binary kinds relate `value` to a
/// `referent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceKind {
    Acceptable,
    Reject,
    Require,
    Prohibit,
    /// `value` is better than `referent`.
    Better,
    /// `value` is worse than `referent`.
    Worse,
    Best,
    Worst,
    UnaryIndifferent,
    /// `value` and `referent` are interchangeable.
    BinaryIndifferent,
}

impl PreferenceKind {
    /// Whether this kind needs a referent.
    pub fn is_binary(self) -> bool {
        matches!(self, Self::Better | Self::Worse | Self::BinaryIndifferent)
    }

    /// Symbol used in traces, following the classic rule syntax.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Acceptable => "+",
            Self::Reject => "-",
            Self::Require => "!",
            Self::Prohibit => "~",
            Self::Better => ">",
            Self::Worse => "<",
            Self::Best => ">",
            Self::Worst => "<",
            Self::UnaryIndifferent => "=",
            Self::BinaryIndifferent => "=",
        }
    }
}

impl std::fmt::Display for PreferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Acceptable => "acceptable",
            Self::Reject => "reject",
            Self::Require => "require",
            Self::Prohibit => "prohibit",
            Self::Better => "better",
            Self::Worse => "worse",
            Self::Best => "best",
            Self::Worst => "worst",
            Self::UnaryIndifferent => "unary-indifferent",
            Self::BinaryIndifferent => "binary-indifferent",
        };
        f.write_str(name)
    }
}

/// Where a preference's support comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Support {
    /// Created by the architecture itself (e.g. impasse bookkeeping).
    Architecture,
    /// Created by a rule firing and retracted with it.
    #[default]
    Inference,
}

/// Handle of a preference within its slot, unique per goal stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PreferenceId(pub u64);

impl std::fmt::Display for PreferenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pref:{}", self.0)
    }
}

/// A preference for (or against) a value of a context slot.
///
/// The (identifier, attribute) half of the assertion is implied by the slot
/// that owns the preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preference {
    pub kind: PreferenceKind,
    pub value: SymbolId,
    pub referent: Option<SymbolId>,
    pub support: Support,
}

impl Preference {
    /// Create a unary preference.
    pub fn unary(kind: PreferenceKind, value: SymbolId) -> Self {
        Self {
            kind,
            value,
            referent: None,
            support: Support::Inference,
        }
    }

    /// Create a binary preference relating `value` to `referent`.
    pub fn binary(kind: PreferenceKind, value: SymbolId, referent: SymbolId) -> Self {
        Self {
            kind,
            value,
            referent: Some(referent),
            support: Support::Inference,
        }
    }

    pub fn acceptable(value: SymbolId) -> Self {
        Self::unary(PreferenceKind::Acceptable, value)
    }

    pub fn reject(value: SymbolId) -> Self {
        Self::unary(PreferenceKind::Reject, value)
    }

    pub fn require(value: SymbolId) -> Self {
        Self::unary(PreferenceKind::Require, value)
    }

    pub fn prohibit(value: SymbolId) -> Self {
        Self::unary(PreferenceKind::Prohibit, value)
    }

    pub fn best(value: SymbolId) -> Self {
        Self::unary(PreferenceKind::Best, value)
    }

    pub fn worst(value: SymbolId) -> Self {
        Self::unary(PreferenceKind::Worst, value)
    }

    pub fn indifferent(value: SymbolId) -> Self {
        Self::unary(PreferenceKind::UnaryIndifferent, value)
    }

    pub fn better(value: SymbolId, referent: SymbolId) -> Self {
        Self::binary(PreferenceKind::Better, value, referent)
    }

    pub fn worse(value: SymbolId, referent: SymbolId) -> Self {
        Self::binary(PreferenceKind::Worse, value, referent)
    }

    pub fn indifferent_to(value: SymbolId, referent: SymbolId) -> Self {
        Self::binary(PreferenceKind::BinaryIndifferent, value, referent)
    }

    /// Mark this preference as architecture-supported.
    pub fn with_support(mut self, support: Support) -> Self {
        self.support = support;
        self
    }

    /// Whether this preference is well formed: binary kinds need a referent,
    /// unary kinds must not carry one.
    pub fn is_well_formed(&self) -> bool {
        self.kind.is_binary() == self.referent.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(id: u64) -> SymbolId {
        SymbolId::new(id).unwrap()
    }

    #[test]
    fn constructors_set_referents() {
        let p = Preference::better(sym(1), sym(2));
        assert_eq!(p.kind, PreferenceKind::Better);
        assert_eq!(p.referent, Some(sym(2)));
        assert!(p.is_well_formed());

        let q = Preference::acceptable(sym(1));
        assert!(q.referent.is_none());
        assert!(q.is_well_formed());
    }

    #[test]
    fn malformed_binary_preference_is_detected() {
        let p = Preference::unary(PreferenceKind::Worse, sym(1));
        assert!(!p.is_well_formed());
    }

    #[test]
    fn default_support_is_inference() {
        let p = Preference::reject(sym(3));
        assert_eq!(p.support, Support::Inference);
        let q = p.with_support(Support::Architecture);
        assert_eq!(q.support, Support::Architecture);
    }

    #[test]
    fn kind_display_and_symbols() {
        assert_eq!(PreferenceKind::BinaryIndifferent.to_string(), "binary-indifferent");
        assert_eq!(PreferenceKind::Require.symbol(), "!");
        assert!(PreferenceKind::Worse.is_binary());
        assert!(!PreferenceKind::Worst.is_binary());
    }
}
