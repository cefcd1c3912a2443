// src/rl/policy.rs
//
// Policy trait and implementations.
//
// The learned agent is a hybrid discrete/continuous policy:
// - shared encoder 34 -> 128 -> 64 (ReLU)
// - discrete head 64 -> 34 logits; the variable index is a categorical
//   sample, not an arg-max
// - continuous head: concat(state, one_hot(index)) (68) -> 128 -> 40 -> 8
//   -> 4 -> 1, a scalar delta
//
// The raw delta is clamped with the chosen variable's (min, max) domain,
// i.e. the same bounds the environment applies to absolute values. This is
// kept as observed in the trained system; the environment clamps the
// resulting value again.
//
// Non-finite network outputs (action probabilities or the raw delta) are
// errors; the agent never substitutes a different decision rule.

use std::path::Path;
use std::sync::Arc;

use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use super::domain::VariableDomainTable;
use crate::artifact::{read_artifact, write_artifact, ArtifactInfo, ArtifactKind};
use crate::error::{ConfigError, IndexOutOfRange, NumericError, RolloutError};
use crate::nn::{softmax, Activation, DenseLayer, Mlp};
use crate::types::{ClinicalState, STATE_DIM};

/// Version reported by [`ScriptedPolicy`].
pub const SCRIPTED_POLICY_VERSION: &str = "scripted-v1.0.0";

const ENCODER_DIM: usize = 64;
const DELTA_INPUT_DIM: usize = STATE_DIM * 2;

/// A single decision: which variable to move and by how much.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyAction {
    pub index: usize,
    pub delta: f64,
}

/// Policy trait: interface for everything that can drive a rollout.
pub trait Policy: Send + Sync {
    /// Unique version string for this policy implementation.
    fn version(&self) -> &str;

    /// Decide the action for `step` (1-based) given the current state.
    ///
    /// All randomness must come from `rng` so seeded rollouts reproduce.
    fn act(
        &self,
        step: u32,
        state: &ClinicalState,
        rng: &mut dyn RngCore,
    ) -> Result<PolicyAction, RolloutError>;
}

/// Frozen parameters of the learned agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyWeights {
    pub encoder: Mlp,
    pub action_head: DenseLayer,
    pub delta_net: Mlp,
}

impl PolicyWeights {
    /// Untrained weights with the default widths.
    pub fn seeded<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            encoder: Mlp::seeded(
                &[STATE_DIM, 128, ENCODER_DIM],
                Activation::Relu,
                Activation::Relu,
                0.0,
                rng,
            ),
            action_head: DenseLayer::seeded(ENCODER_DIM, STATE_DIM, Activation::Identity, 0.0, rng),
            delta_net: Mlp::seeded(
                &[DELTA_INPUT_DIM, 128, 40, 8, 4, 1],
                Activation::Relu,
                Activation::Identity,
                0.0,
                rng,
            ),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.encoder
            .validate("encoder", STATE_DIM, self.action_head.in_dim)?;
        self.action_head.validate("action_head")?;
        if self.action_head.out_dim != STATE_DIM {
            return Err(ConfigError::shape(
                "action_head",
                format!(
                    "emits {} logits, expected {}",
                    self.action_head.out_dim, STATE_DIM
                ),
            ));
        }
        self.delta_net.validate("delta_net", DELTA_INPUT_DIM, 1)
    }
}

/// Learned hybrid policy bound to the domain table.
#[derive(Debug, Clone)]
pub struct PolicyAgent {
    weights: PolicyWeights,
    version: String,
    domains: Arc<VariableDomainTable>,
}

impl PolicyAgent {
    pub fn from_weights(
        weights: PolicyWeights,
        version: &str,
        domains: Arc<VariableDomainTable>,
    ) -> Result<Self, ConfigError> {
        weights.validate()?;
        Ok(Self {
            weights,
            version: version.to_string(),
            domains,
        })
    }

    pub fn load(
        path: &Path,
        domains: Arc<VariableDomainTable>,
    ) -> Result<(Self, ArtifactInfo), ConfigError> {
        let loaded = read_artifact::<PolicyWeights>(path, ArtifactKind::PolicyAgent)?;
        let agent = Self::from_weights(loaded.payload, &loaded.info.model_version, domains)?;
        Ok((agent, loaded.info))
    }

    pub fn save(&self, path: &Path) -> Result<ArtifactInfo, ConfigError> {
        write_artifact(path, ArtifactKind::PolicyAgent, &self.version, &self.weights)
    }

    #[cfg(test)]
    pub(crate) fn weights_mut(&mut self) -> &mut PolicyWeights {
        &mut self.weights
    }

    /// Discrete-head logits, one per variable.
    pub fn action_logits(&self, state: &ClinicalState) -> Vec<f32> {
        let encoded = self.weights.encoder.forward(&state.to_f32_vec());
        self.weights.action_head.forward(&encoded)
    }

    /// Categorical distribution over the 34 variables.
    pub fn action_probabilities(&self, state: &ClinicalState) -> Vec<f64> {
        softmax(&self.action_logits(state))
    }

    /// Sample a variable index from the categorical distribution.
    ///
    /// Degenerate probabilities (non-finite, or no positive weight) are a
    /// `NumericError`.
    pub fn select<R: Rng + ?Sized>(
        &self,
        state: &ClinicalState,
        rng: &mut R,
    ) -> Result<usize, NumericError> {
        let probs = self.action_probabilities(state);
        if let Some(bad) = probs.iter().find(|p| !p.is_finite()) {
            return Err(NumericError::new(
                "policy.action_probabilities",
                format!("probability {} for model {}", bad, self.version),
            ));
        }
        let dist = WeightedIndex::new(&probs).map_err(|e| {
            NumericError::new(
                "policy.action_probabilities",
                format!("{} for model {}", e, self.version),
            )
        })?;
        Ok(dist.sample(rng))
    }

    /// Unclamped continuous-head output for `index`.
    pub fn raw_delta(&self, state: &ClinicalState, index: usize) -> Result<f64, IndexOutOfRange> {
        if index >= STATE_DIM {
            return Err(IndexOutOfRange {
                index,
                len: STATE_DIM,
            });
        }
        let mut input = state.to_f32_vec();
        input.resize(DELTA_INPUT_DIM, 0.0);
        input[STATE_DIM + index] = 1.0;
        let out = self.weights.delta_net.forward(&input);
        Ok(out.first().copied().unwrap_or(0.0) as f64)
    }

    /// Deterministic delta for `index`, clamped into that variable's domain.
    pub fn compute_delta(
        &self,
        state: &ClinicalState,
        index: usize,
    ) -> Result<f64, RolloutError> {
        let raw = self.raw_delta(state, index)?;
        let domain = self.domains.domain(index)?;
        if !raw.is_finite() {
            return Err(NumericError::new(
                "policy.delta",
                format!("raw delta {} for variable index {}", raw, index),
            )
            .into());
        }
        Ok(domain.clamp(raw))
    }
}

impl Policy for PolicyAgent {
    fn version(&self) -> &str {
        &self.version
    }

    fn act(
        &self,
        _step: u32,
        state: &ClinicalState,
        rng: &mut dyn RngCore,
    ) -> Result<PolicyAction, RolloutError> {
        let index = self.select(state, rng)?;
        let delta = self.compute_delta(state, index)?;
        Ok(PolicyAction { index, delta })
    }
}

/// Replays a fixed action list, cycling when the rollout is longer.
///
/// Used for counterfactual probes ("what if we move X by d") and tests.
#[derive(Debug, Clone)]
pub struct ScriptedPolicy {
    actions: Vec<PolicyAction>,
    version: String,
}

impl ScriptedPolicy {
    pub fn new(actions: Vec<PolicyAction>) -> Result<Self, ConfigError> {
        if actions.is_empty() {
            return Err(ConfigError::validation(
                "scripted_policy.actions",
                "at least one action is required",
            ));
        }
        Ok(Self {
            actions,
            version: SCRIPTED_POLICY_VERSION.to_string(),
        })
    }

}

impl Policy for ScriptedPolicy {
    fn version(&self) -> &str {
        &self.version
    }

    fn act(
        &self,
        step: u32,
        _state: &ClinicalState,
        _rng: &mut dyn RngCore,
    ) -> Result<PolicyAction, RolloutError> {
        let slot = (step.saturating_sub(1) as usize) % self.actions.len();
        Ok(self.actions[slot])
    }
}
