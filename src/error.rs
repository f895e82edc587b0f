//! Rich diagnostic error types for the decision core.
//!
//! Only genuine failures live here. Inconsistent decisions, quiescence and
//! the elaboration limit are ordinary outcomes of a step and are reported as
//! values by the waterfall, never as errors.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the decision core.
#[derive(Debug, Error, Diagnostic)]
pub enum DecideError {
    #[error("goal not found: {goal}")]
    #[diagnostic(
        code(akh::decide::goal_not_found),
        help(
            "The goal handle is stale: the goal was removed together with its \
             ancestor's decision. Re-read the stack from `GoalStack::bottom()`."
        )
    )]
    GoalNotFound { goal: String },

    #[error("goal stack is empty")]
    #[diagnostic(
        code(akh::decide::empty_stack),
        help("Create the top goal with `GoalStack::push_top_goal` before running a decision cycle.")
    )]
    EmptyStack,

    #[error("goal stack already has a top goal")]
    #[diagnostic(
        code(akh::decide::top_exists),
        help("Sub-goals are created with `GoalStack::push_subgoal`; only one top goal may exist.")
    )]
    TopGoalExists,

    #[error("goal stack invariant violated at level {level}: {message}")]
    #[diagnostic(
        code(akh::decide::stack_invariant),
        help(
            "Every goal must sit exactly one level below its higher goal and be linked \
             both ways. This is an internal error; file a bug report with the trace."
        )
    )]
    StackInvariant { level: u32, message: String },

    #[error("no active goal found although rule activity is pending")]
    #[diagnostic(
        code(akh::decide::no_active_goal),
        help(
            "Quiescence was ruled out but no goal, and no un-owned retraction, reports \
             pending activity. The match engine and the goal stack disagree; the decision \
             state cannot be trusted and the agent must stop."
        )
    )]
    NoActiveGoal,

    #[error("activity waterfall did not settle after {iterations} re-classifications")]
    #[diagnostic(
        code(akh::decide::waterfall_diverged),
        help(
            "Restoring saved firing types is bounded by the goal-stack depth. \
             A saved firing type that is never cleared indicates an internal error."
        )
    )]
    WaterfallDiverged { iterations: usize },

    #[error("symbol allocator exhausted")]
    #[diagnostic(
        code(akh::decide::symbols_exhausted),
        help("The symbol ID space (2^64 - 1) is exhausted. Check for allocation loops.")
    )]
    SymbolsExhausted,

    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(akh::decide::config_read),
        help("Ensure the config file exists and is valid TOML.")
    )]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}: {message}")]
    #[diagnostic(
        code(akh::decide::config_parse),
        help("Check the TOML syntax and field names in the config file.")
    )]
    ConfigParse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(akh::decide::config_write),
        help("Ensure you have write permissions to the target directory.")
    )]
    ConfigWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid scenario: {message}")]
    #[diagnostic(
        code(akh::decide::scenario),
        help(
            "Scenario goals are listed top first; every goal but the top needs an \
             `impasse`, and steps must name goals by their level."
        )
    )]
    Scenario { message: String },
}

/// Convenience alias for decision-core operations.
pub type DecideResult<T> = std::result::Result<T, DecideError>;
