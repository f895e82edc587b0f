//! Decision-cycle phases and the elaboration limit.

use serde::{Deserialize, Serialize};

/// Phase of the decision cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Input,
    Propose,
    Decision,
    Apply,
    Output,
}

impl Phase {
    /// The phase that follows this one's elaboration loop.
    pub fn next(self) -> Self {
        match self {
            Self::Input => Self::Propose,
            Self::Propose => Self::Decision,
            Self::Decision => Self::Apply,
            Self::Apply => Self::Output,
            Self::Output => Self::Input,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Propose => f.write_str("propose"),
            Self::Decision => f.write_str("decision"),
            Self::Apply => f.write_str("apply"),
            Self::Output => f.write_str("output"),
        }
    }
}

/// Elaboration-limit and phase-transition facility used by the waterfall.
pub trait PhaseControl {
    fn elaboration_limit_exceeded(&self) -> bool;

    fn transition_to(&mut self, phase: Phase);
}

/// Tracks the current phase and the elaborations run in this decision.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    current: Phase,
    elaborations: u32,
    max_elaborations: u32,
    transitions: u64,
}

impl PhaseTracker {
    pub fn new(max_elaborations: u32) -> Self {
        Self {
            current: Phase::Input,
            elaborations: 0,
            max_elaborations,
            transitions: 0,
        }
    }

    pub fn current(&self) -> Phase {
        self.current
    }

    /// Elaborations run since the last [`begin_decision`](Self::begin_decision).
    pub fn elaborations(&self) -> u32 {
        self.elaborations
    }

    pub fn max_elaborations(&self) -> u32 {
        self.max_elaborations
    }

    /// Number of phase transitions so far.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Count one elaboration step.
    pub fn record_elaboration(&mut self) {
        self.elaborations = self.elaborations.saturating_add(1);
    }

    /// Reset the elaboration counter at the start of a decision cycle.
    pub fn begin_decision(&mut self) {
        self.elaborations = 0;
    }

    /// Enter `phase` directly (driver-initiated, not a waterfall transition).
    pub fn enter(&mut self, phase: Phase) {
        self.current = phase;
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_ELABORATIONS)
    }
}

impl PhaseControl for PhaseTracker {
    fn elaboration_limit_exceeded(&self) -> bool {
        let exceeded = self.elaborations >= self.max_elaborations;
        if exceeded {
            tracing::warn!(
                max = self.max_elaborations,
                phase = %self.current,
                "elaboration limit reached, forcing phase change"
            );
        }
        exceeded
    }

    fn transition_to(&mut self, phase: Phase) {
        tracing::debug!(from = %self.current, to = %phase, "phase transition");
        self.current = phase;
        self.transitions += 1;
    }
}
