//! Scenario files: a goal stack plus a script of decision-cycle steps.
//!
//! A scenario describes a settled goal stack (top goal first) and then a
//! sequence of steps: waterfall passes, decisions, preference changes and
//! rule firings. Running it yields a [`TraceEntry`] per step. Values are
//! written as names (`"O1"`) and interned on load; goals are addressed by
//! level, and level 0 stands for the nil goal in `fire` steps.
//!
//! ```toml
//! name = "rejected operator"
//!
//! [[goals]]
//! operator = "O1"
//! preferences = [{ kind = "acceptable", value = "O1" }]
//!
//! [[goals]]
//! impasse = "no_change"
//! pending = [{ class = "output_assertion", rule = "apply*deep" }]
//!
//! [[steps]]
//! action = "add_preference"
//! level = 1
//! kind = "reject"
//! value = "O1"
//!
//! [[steps]]
//! action = "apply"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::activity::{Activation, ActivationClass};
use crate::changes::WorkingMemory;
use crate::config::DecideConfig;
use crate::decide::{ActiveLevelState, Decider, Decision, WaterfallOutcome};
use crate::error::{DecideError, DecideResult};
use crate::goal::{GoalId, Impasse, ImpasseKind};
use crate::phase::Phase;
use crate::preference::{Preference, PreferenceId, PreferenceKind, Support};
use crate::slot::ContextAttribute;
use crate::symbol::SymbolTable;

/// A scenario file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub goals: Vec<GoalSpec>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One goal of the initial stack.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GoalSpec {
    /// Impasse that created this goal; required for every goal but the top.
    #[serde(default)]
    pub impasse: Option<ImpasseKind>,
    /// Attribute of the impasse (defaults to `operator`).
    #[serde(default)]
    pub attribute: Option<ContextAttribute>,
    /// Installed operator value.
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub preferences: Vec<PreferenceSpec>,
    #[serde(default)]
    pub pending: Vec<ActivationSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreferenceSpec {
    pub kind: PreferenceKind,
    pub value: String,
    #[serde(default)]
    pub referent: Option<String>,
    #[serde(default)]
    pub support: Support,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivationSpec {
    pub class: ActivationClass,
    pub rule: String,
}

/// A scripted step.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// One APPLY waterfall pass.
    Apply,
    /// One PROPOSE waterfall pass.
    Propose,
    /// Decision-phase pass over the goal at `level`.
    Decide { level: u32 },
    AddPreference {
        level: u32,
        kind: PreferenceKind,
        value: String,
        #[serde(default)]
        referent: Option<String>,
        #[serde(default)]
        support: Support,
    },
    /// Remove the first matching preference.
    RemovePreference {
        level: u32,
        kind: PreferenceKind,
        value: String,
        #[serde(default)]
        referent: Option<String>,
    },
    Enqueue {
        level: u32,
        class: ActivationClass,
        rule: String,
    },
    /// Fire (dequeue) the oldest activation of `class` at `level`, counting
    /// one elaboration. Level 0 fires a nil-goal retraction.
    Fire {
        level: u32,
        #[serde(default = "default_fire_class")]
        class: ActivationClass,
    },
    ClearActivity,
    /// Reset active-level tracking and the elaboration counter.
    BeginDecision,
    /// Consistency pass bounded at `level`.
    Check { level: u32 },
}

fn default_fire_class() -> ActivationClass {
    ActivationClass::Retraction
}

impl Step {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::Propose => "propose",
            Self::Decide { .. } => "decide",
            Self::AddPreference { .. } => "add_preference",
            Self::RemovePreference { .. } => "remove_preference",
            Self::Enqueue { .. } => "enqueue",
            Self::Fire { .. } => "fire",
            Self::ClearActivity => "clear_activity",
            Self::BeginDecision => "begin_decision",
            Self::Check { .. } => "check",
        }
    }
}

/// What a step did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOutcome {
    Waterfall { outcome: WaterfallOutcome },
    Decision { level: u32, decision: Decision },
    PreferenceAdded { level: u32, id: PreferenceId },
    PreferenceRemoved { level: u32, removed: bool },
    Enqueued { level: u32 },
    Fired { level: u32, rule: Option<String> },
    ActivityCleared,
    DecisionBegun,
    Checked { level: u32, consistent: bool },
}

/// One line of a scenario trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEntry {
    pub step: usize,
    pub action: &'static str,
    pub outcome: StepOutcome,
    /// Goal-stack depth after the step.
    pub depth: usize,
    /// Phase after the step.
    pub phase: Phase,
}

impl Scenario {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> DecideResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DecideError::ConfigRead {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse from TOML text.
    pub fn from_toml(content: &str) -> DecideResult<Self> {
        toml::from_str(content).map_err(|e| DecideError::Scenario {
            message: e.to_string(),
        })
    }

    /// Build the initial goal stack without running any step.
    pub fn build(&self, config: &DecideConfig) -> DecideResult<ScenarioRun> {
        let mut run = ScenarioRun {
            decider: Decider::from_config(config),
            state: ActiveLevelState::new(),
            trace: Vec::new(),
        };
        if self.goals.is_empty() {
            return Err(DecideError::Scenario {
                message: "scenario has no goals".into(),
            });
        }

        for (index, goal_spec) in self.goals.iter().enumerate() {
            let level = index + 1;
            let goal = match (index, goal_spec.impasse) {
                (0, None) => run.decider.create_top_goal()?,
                (0, Some(_)) => {
                    return Err(DecideError::Scenario {
                        message: "the top goal cannot have an impasse".into(),
                    });
                }
                (_, Some(kind)) => {
                    let attribute = goal_spec.attribute.unwrap_or(ContextAttribute::Operator);
                    let id = run.decider.symbols_mut().fresh('S')?;
                    run.decider
                        .stack_mut()
                        .push_subgoal(id, Impasse::new(kind, attribute))?
                }
                (_, None) => {
                    return Err(DecideError::Scenario {
                        message: format!("goal at level {level} needs an impasse"),
                    });
                }
            };

            for pref in &goal_spec.preferences {
                let preference = resolve_preference(
                    run.decider.symbols_mut(),
                    pref.kind,
                    &pref.value,
                    pref.referent.as_deref(),
                    pref.support,
                )?;
                run.decider.stack_mut().add_preference(goal, preference)?;
            }
            if let Some(name) = &goal_spec.operator {
                let value = run.decider.symbols_mut().intern(name)?;
                let changes = run.decider.stack_mut().install_operator(goal, value)?;
                run.decider.working_memory_mut().flush(changes);
            }
            for activation in &goal_spec.pending {
                run.decider.stack_mut().enqueue(
                    goal,
                    activation.class,
                    Activation::new(activation.rule.clone()),
                )?;
            }
        }

        // The initial stack is settled: nothing is pending re-validation.
        let handles: Vec<GoalId> = run.decider.stack().iter().map(|(h, _)| h).collect();
        for handle in handles {
            run.decider
                .stack_mut()
                .goal_mut(handle)?
                .operator_mut()
                .clear_changed();
        }
        run.decider.stack_mut().recompute_highest_changed();
        run.decider.stack().check_invariants()?;

        tracing::info!(
            scenario = %self.name,
            goals = self.goals.len(),
            steps = self.steps.len(),
            "scenario loaded"
        );
        Ok(run)
    }

    /// Build the stack and run every step.
    pub fn run(&self, config: &DecideConfig) -> DecideResult<ScenarioRun> {
        let mut run = self.build(config)?;
        for step in &self.steps {
            run.step(step)?;
        }
        Ok(run)
    }
}

fn resolve_preference(
    symbols: &mut SymbolTable,
    kind: PreferenceKind,
    value: &str,
    referent: Option<&str>,
    support: Support,
) -> DecideResult<Preference> {
    let value = symbols.intern(value)?;
    let preference = match referent {
        Some(name) => Preference::binary(kind, value, symbols.intern(name)?),
        None => Preference::unary(kind, value),
    }
    .with_support(support);
    if !preference.is_well_formed() {
        return Err(DecideError::Scenario {
            message: format!("preference `{kind}` on {value} has the wrong arity"),
        });
    }
    Ok(preference)
}

/// A scenario in progress: the decider, its active-level state and the
/// trace so far.
#[derive(Debug)]
pub struct ScenarioRun {
    decider: Decider,
    state: ActiveLevelState,
    trace: Vec<TraceEntry>,
}

impl ScenarioRun {
    pub fn decider(&self) -> &Decider {
        &self.decider
    }

    pub fn decider_mut(&mut self) -> &mut Decider {
        &mut self.decider
    }

    pub fn state(&self) -> &ActiveLevelState {
        &self.state
    }

    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    pub fn into_trace(self) -> Vec<TraceEntry> {
        self.trace
    }

    /// Handle of the goal at `level`.
    pub fn goal(&self, level: u32) -> DecideResult<GoalId> {
        self.decider
            .stack()
            .goal_at_level(level)
            .ok_or_else(|| DecideError::Scenario {
                message: format!("no goal at level {level}"),
            })
    }

    /// Run one step and record it.
    pub fn step(&mut self, step: &Step) -> DecideResult<&TraceEntry> {
        let outcome = match step {
            Step::Apply => {
                self.decider.phases_mut().enter(Phase::Apply);
                let outcome = self.decider.run_waterfall_apply(&mut self.state)?;
                StepOutcome::Waterfall { outcome }
            }
            Step::Propose => {
                self.decider.phases_mut().enter(Phase::Propose);
                let outcome = self.decider.run_waterfall_propose(&mut self.state)?;
                StepOutcome::Waterfall { outcome }
            }
            Step::Decide { level } => {
                let goal = self.goal(*level)?;
                self.decider.phases_mut().enter(Phase::Decision);
                let decision = self.decider.decide_operator(goal)?;
                StepOutcome::Decision {
                    level: *level,
                    decision,
                }
            }
            Step::AddPreference {
                level,
                kind,
                value,
                referent,
                support,
            } => {
                let goal = self.goal(*level)?;
                let preference = resolve_preference(
                    self.decider.symbols_mut(),
                    *kind,
                    value,
                    referent.as_deref(),
                    *support,
                )?;
                let id = self.decider.stack_mut().add_preference(goal, preference)?;
                StepOutcome::PreferenceAdded { level: *level, id }
            }
            Step::RemovePreference {
                level,
                kind,
                value,
                referent,
            } => {
                let goal = self.goal(*level)?;
                let symbols = self.decider.symbols();
                let value = symbols.lookup(value);
                let referent = referent.as_deref().map(|r| symbols.lookup(r));
                let found = self
                    .decider
                    .stack()
                    .goal(goal)?
                    .operator()
                    .preference_entries()
                    .iter()
                    .find(|(_, p)| {
                        p.kind == *kind
                            && Some(p.value) == value
                            && referent.is_none_or(|r| r.is_some() && p.referent == r)
                    })
                    .map(|(id, _)| *id);
                let removed = match found {
                    Some(id) => self.decider.stack_mut().remove_preference(goal, id)?.is_some(),
                    None => false,
                };
                StepOutcome::PreferenceRemoved {
                    level: *level,
                    removed,
                }
            }
            Step::Enqueue { level, class, rule } => {
                let goal = self.goal(*level)?;
                self.decider
                    .stack_mut()
                    .enqueue(goal, *class, Activation::new(rule.clone()))?;
                StepOutcome::Enqueued { level: *level }
            }
            Step::Fire { level: 0, .. } => {
                let fired = self.decider.stack_mut().pop_nil_goal_retraction();
                self.decider.phases_mut().record_elaboration();
                StepOutcome::Fired {
                    level: 0,
                    rule: fired.map(|a| a.rule),
                }
            }
            Step::Fire { level, class } => {
                let goal = self.goal(*level)?;
                let fired = self.decider.stack_mut().goal_mut(goal)?.pending_mut().pop(*class);
                self.decider.phases_mut().record_elaboration();
                StepOutcome::Fired {
                    level: *level,
                    rule: fired.map(|a| a.rule),
                }
            }
            Step::ClearActivity => {
                self.decider.stack_mut().clear_activity();
                StepOutcome::ActivityCleared
            }
            Step::BeginDecision => {
                self.state.reset();
                self.decider.phases_mut().begin_decision();
                StepOutcome::DecisionBegun
            }
            Step::Check { level } => {
                let consistent = self.decider.check_slot_decisions(*level)?;
                StepOutcome::Checked {
                    level: *level,
                    consistent,
                }
            }
        };

        let entry = TraceEntry {
            step: self.trace.len(),
            action: step.action(),
            outcome,
            depth: self.decider.stack().depth(),
            phase: self.decider.phases().current(),
        };
        tracing::debug!(step = entry.step, action = entry.action, depth = entry.depth, "scenario step");
        self.trace.push(entry);
        let index = self.trace.len() - 1;
        Ok(&self.trace[index])
    }

    /// Re-validate every decision in the stack from the top down.
    ///
    /// Marks every operator slot changed and runs a consistency pass bounded
    /// at the bottom goal.
    pub fn check_all(&mut self) -> DecideResult<bool> {
        let handles: Vec<GoalId> = self.decider.stack().iter().map(|(h, _)| h).collect();
        let Some(bottom) = handles.last().copied() else {
            return Err(DecideError::EmptyStack);
        };
        for handle in &handles {
            self.decider
                .stack_mut()
                .goal_mut(*handle)?
                .operator_mut()
                .mark_changed();
        }
        self.decider.stack_mut().recompute_highest_changed();
        self.decider.check_stack_through_goal(bottom)
    }

    /// Human-readable rendering of a trace entry, with symbol names.
    pub fn describe(&self, entry: &TraceEntry) -> String {
        let symbols = self.decider.symbols();
        let detail = match &entry.outcome {
            StepOutcome::Waterfall {
                outcome:
                    WaterfallOutcome::Fire {
                        level,
                        firing_type,
                        transition,
                        ..
                    },
            } => format!("fire {firing_type} at level {level} ({transition:?})"),
            StepOutcome::Waterfall {
                outcome: WaterfallOutcome::PhaseChange { phase, reason },
            } => format!("phase change to {phase} ({reason:?})"),
            StepOutcome::Decision { level, decision } => match decision {
                Decision::Unchanged => format!("level {level}: unchanged"),
                Decision::Installed(value) => {
                    format!("level {level}: installed {}", symbols.display(*value))
                }
                Decision::Impasse { impasse, .. } => format!("level {level}: impasse {impasse}"),
            },
            StepOutcome::PreferenceAdded { level, id } => format!("level {level}: added {id}"),
            StepOutcome::PreferenceRemoved { level, removed } => {
                format!("level {level}: removed={removed}")
            }
            StepOutcome::Enqueued { level } => format!("level {level}: activation queued"),
            StepOutcome::Fired { level, rule } => match rule {
                Some(rule) => format!("level {level}: fired {rule}"),
                None => format!("level {level}: nothing to fire"),
            },
            StepOutcome::ActivityCleared => "activity cleared".to_string(),
            StepOutcome::DecisionBegun => "new decision".to_string(),
            StepOutcome::Checked { level, consistent } => {
                format!("check through level {level}: consistent={consistent}")
            }
        };
        format!(
            "[{:>3}] {:<17} depth={} phase={:<8} {detail}",
            entry.step, entry.action, entry.depth, entry.phase
        )
    }
}
