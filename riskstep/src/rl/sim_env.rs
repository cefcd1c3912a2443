// src/rl/sim_env.rs
//
// Gym-style clinical simulation environment.
//
// - reset(initial) copies a caller-supplied state and zeroes the step counter
// - step(index, delta) scores, applies one clamped mutation, re-scores and
//   returns (next_state, reward, done, info)
//
// reward = alpha * (old_score - new_score): positive when risk drops.
// Exactly one coordinate can change per step; the vector length never does.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::domain::VariableDomainTable;
use super::scorer::RiskScorer;
use crate::error::{InputError, NumericError, RolloutError};
use crate::types::{name_of, ClinicalState, PatientInput};

/// Result of a single environment step.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// The state after the action.
    pub state: ClinicalState,
    pub reward: f64,
    /// Whether the episode has reached its step limit.
    pub done: bool,
    pub info: StepInfo,
}

/// What a step did to the mutated variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    /// Step counter after this call (1-based for applied steps).
    pub step: u32,
    pub index: usize,
    pub variable: String,
    pub previous_value: f64,
    /// `previous_value + delta` before clamping.
    pub proposed_value: f64,
    pub applied_value: f64,
    /// True when the proposed value was outside the domain.
    pub saturated: bool,
    pub old_score: f64,
    pub new_score: f64,
    /// True when the episode was already over and nothing was applied.
    pub ignored: bool,
}

/// Episode length and reward scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvConfig {
    pub max_steps: u32,
    pub alpha: f64,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::probe()
    }
}

impl EnvConfig {
    /// Short counterfactual probe: 5 steps, alpha 100.
    pub fn probe() -> Self {
        Self {
            max_steps: 5,
            alpha: 100.0,
        }
    }

    /// Full planning rollout: 8 steps, alpha 5.
    pub fn rollout() -> Self {
        Self {
            max_steps: 8,
            alpha: 5.0,
        }
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }
}

/// Stateful environment over one clinical state.
///
/// The scorer and domain table are shared read-only; the state is owned and
/// never leaves the environment except by copy.
pub struct SimEnv {
    scorer: Arc<dyn RiskScorer>,
    domains: Arc<VariableDomainTable>,
    config: EnvConfig,
    state: ClinicalState,
    steps: u32,
    done: bool,
}

impl SimEnv {
    pub fn new(
        scorer: Arc<dyn RiskScorer>,
        domains: Arc<VariableDomainTable>,
        config: EnvConfig,
        initial: &ClinicalState,
    ) -> Self {
        Self {
            scorer,
            domains,
            config,
            state: *initial,
            steps: 0,
            done: config.max_steps == 0,
        }
    }

    /// Start a new episode from a copy of `initial`.
    pub fn reset(&mut self, initial: &ClinicalState) -> ClinicalState {
        self.state = *initial;
        self.steps = 0;
        self.done = self.config.max_steps == 0;
        self.state
    }

    /// Validate a named record and start a new episode from it.
    pub fn reset_from_input(&mut self, input: &PatientInput) -> Result<ClinicalState, InputError> {
        let initial = input.to_state()?;
        Ok(self.reset(&initial))
    }

    /// Apply `delta` to variable `index`, saturating at its domain bounds.
    ///
    /// A NaN delta leaves the coordinate unchanged. An out-of-range index is
    /// rejected before anything is scored or mutated, and a scorer failure
    /// leaves the state as it was.
    pub fn step(&mut self, index: usize, delta: f64) -> Result<StepResult, RolloutError> {
        let domain = self.domains.domain(index)?;
        let variable = name_of(index)?.to_string();
        let previous = self.state.get(index)?;

        if self.done {
            let score = self.scorer.score(&self.state)?;
            return Ok(StepResult {
                state: self.state,
                reward: 0.0,
                done: true,
                info: StepInfo {
                    step: self.steps,
                    index,
                    variable,
                    previous_value: previous,
                    proposed_value: previous,
                    applied_value: previous,
                    saturated: false,
                    old_score: score,
                    new_score: score,
                    ignored: true,
                },
            });
        }

        let old_score = self.scorer.score(&self.state)?;

        let proposed = previous + delta;
        let applied = if proposed.is_nan() {
            previous
        } else {
            domain.clamp(proposed)
        };
        let mut next = self.state;
        next.set(index, applied)?;

        let new_score = self.scorer.score(&next)?;
        self.state = next;
        let reward = self.config.alpha * (old_score - new_score);

        self.steps += 1;
        self.done = self.steps >= self.config.max_steps;

        Ok(StepResult {
            state: self.state,
            reward,
            done: self.done,
            info: StepInfo {
                step: self.steps,
                index,
                variable,
                previous_value: previous,
                proposed_value: proposed,
                applied_value: applied,
                saturated: !proposed.is_nan() && !domain.contains(proposed),
                old_score,
                new_score,
                ignored: false,
            },
        })
    }

    /// Score of the current state.
    pub fn score(&self) -> Result<f64, NumericError> {
        self.scorer.score(&self.state)
    }

    pub fn state(&self) -> &ClinicalState {
        &self.state
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }
}
