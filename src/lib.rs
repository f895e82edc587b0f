// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # akh-decide
//!
//! The decision core of a production-rule agent: a goal stack of impasse
//! sub-goals, a consistency checker that tears down decisions their
//! preferences no longer support, and the activity-level waterfall that
//! picks where and which rules fire next.
//!
//! ## Architecture
//!
//! - **Goal stack** (`goal`): Generational arena of goals linked by level
//! - **Preferences** (`preference`, `slot`): Operator slots and their preferences
//! - **Semantics** (`semantics`): The preference-evaluation seam and a reference resolver
//! - **Decider** (`decide`): Consistency checking, decision removal, waterfall
//! - **Scenarios** (`scenario`): TOML-scripted decision cycles
//!
//! ## Library usage
//!
//! ```no_run
//! use akh_decide::config::DecideConfig;
//! use akh_decide::decide::{ActiveLevelState, Decider};
//! use akh_decide::preference::Preference;
//!
//! let mut decider = Decider::from_config(&DecideConfig::default());
//! let top = decider.create_top_goal().unwrap();
//! let op = decider.symbols_mut().intern("O1").unwrap();
//! decider.stack_mut().add_preference(top, Preference::acceptable(op)).unwrap();
//! decider.decide_operator(top).unwrap();
//!
//! let mut state = ActiveLevelState::new();
//! let outcome = decider.run_waterfall_apply(&mut state).unwrap();
//! println!("{outcome:?}");
//! ```

pub mod activity;
pub mod changes;
pub mod config;
pub mod decide;
pub mod error;
pub mod goal;
pub mod phase;
pub mod preference;
pub mod scenario;
pub mod semantics;
pub mod slot;
pub mod symbol;
