// src/rl/scorer.rs
//
// Feature-grouped risk-scoring network (inference only).
//
// Architecture:
//   state[group_a] -> subnet_a (3 hidden layers) -> proj_a -> 3-dim embedding
//   state[group_b] -> subnet_b (3 hidden layers) -> proj_b -> 7-dim embedding
//   concat (10) -> residual block (x + act(Wx + b)) -> head -> 3 class logits
//   softmax -> (p0, p1, p2); score = (p1 + 2 * p2) * 50, in [0, 100]
//
// The model holds no mutable state; identical weights and input always give
// the same score.

use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::artifact::{read_artifact, write_artifact, ArtifactInfo, ArtifactKind};
use crate::error::{ConfigError, NumericError};
use crate::nn::{softmax, Activation, DenseLayer, Mlp};
use crate::types::{ClinicalState, STATE_DIM};

/// Number of risk classes (low, medium, high).
pub const NUM_CLASSES: usize = 3;

/// Embedding width produced by the group-A branch.
pub const GROUP_A_EMBED: usize = 3;

/// Embedding width produced by the group-B branch.
pub const GROUP_B_EMBED: usize = 7;

const FUSED_DIM: usize = GROUP_A_EMBED + GROUP_B_EMBED;

/// Lower and upper end of the score scale.
pub const SCORE_MIN: f64 = 0.0;
pub const SCORE_MAX: f64 = 100.0;

/// Scalar risk function over a clinical state.
///
/// The environment only depends on this trait, so it can be driven by the
/// trained network or by any other scoring function.
pub trait RiskScorer: Send + Sync {
    /// Version string of the backing model.
    fn version(&self) -> &str;

    /// Score one state. `Ok` values always lie in [0, 100]; a model that
    /// cannot produce a finite score returns `NumericError`.
    fn score(&self, state: &ClinicalState) -> Result<f64, NumericError>;

    /// Score many states; fails on the first non-finite score.
    fn score_batch(&self, states: &[ClinicalState]) -> Result<Vec<f64>, NumericError> {
        states.iter().map(|s| self.score(s)).collect()
    }
}

/// Partition of the 34 state indices into the two scorer branches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureGroups {
    pub group_a: Vec<usize>,
    pub group_b: Vec<usize>,
}

impl Default for FeatureGroups {
    /// gender, age, race, marry, glu, hb1ac vs. everything else.
    fn default() -> Self {
        let group_a = vec![0, 1, 2, 4, 28, 31];
        let group_b = (0..STATE_DIM).filter(|i| !group_a.contains(i)).collect();
        Self { group_a, group_b }
    }
}

impl FeatureGroups {
    /// Groups must be disjoint and together cover every index exactly once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = [false; STATE_DIM];
        for (group, indices) in [("group_a", &self.group_a), ("group_b", &self.group_b)] {
            if indices.is_empty() {
                return Err(ConfigError::validation(
                    format!("groups.{}", group),
                    "group is empty",
                ));
            }
            for &i in indices.iter() {
                if i >= STATE_DIM {
                    return Err(ConfigError::validation(
                        format!("groups.{}", group),
                        format!("index {} outside [0, {}]", i, STATE_DIM - 1),
                    ));
                }
                if seen[i] {
                    return Err(ConfigError::validation(
                        format!("groups.{}", group),
                        format!("index {} assigned more than once", i),
                    ));
                }
                seen[i] = true;
            }
        }
        if let Some(missing) = seen.iter().position(|s| !s) {
            return Err(ConfigError::validation(
                "groups",
                format!("index {} belongs to no group", missing),
            ));
        }
        Ok(())
    }

    fn gather(indices: &[usize], input: &[f32]) -> Vec<f32> {
        indices.iter().map(|&i| input[i]).collect()
    }
}

/// Frozen parameters of the risk scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScorerWeights {
    pub groups: FeatureGroups,
    pub subnet_a: Mlp,
    pub proj_a: DenseLayer,
    pub subnet_b: Mlp,
    pub proj_b: DenseLayer,
    pub residual: DenseLayer,
    pub head: Mlp,
}

impl RiskScorerWeights {
    /// Untrained weights with the default layer widths.
    pub fn seeded<R: Rng + ?Sized>(
        groups: FeatureGroups,
        activation: Activation,
        dropout: f32,
        rng: &mut R,
    ) -> Self {
        let a_in = groups.group_a.len();
        let b_in = groups.group_b.len();
        Self {
            subnet_a: Mlp::seeded(&[a_in, 28, 14, 7], activation, activation, dropout, rng),
            proj_a: DenseLayer::seeded(7, GROUP_A_EMBED, Activation::Identity, 0.0, rng),
            subnet_b: Mlp::seeded(&[b_in, 28, 14, 7], activation, activation, dropout, rng),
            proj_b: DenseLayer::seeded(7, GROUP_B_EMBED, Activation::Identity, 0.0, rng),
            residual: DenseLayer::seeded(FUSED_DIM, FUSED_DIM, activation, dropout, rng),
            head: Mlp::seeded(
                &[FUSED_DIM, 5, 5, NUM_CLASSES],
                activation,
                Activation::Identity,
                dropout,
                rng,
            ),
            groups,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.groups.validate()?;
        if self.subnet_a.layers.len() != 3 || self.subnet_b.layers.len() != 3 {
            return Err(ConfigError::shape(
                "risk_scorer",
                "group sub-networks must have exactly three hidden layers",
            ));
        }
        self.subnet_a
            .validate("subnet_a", self.groups.group_a.len(), self.proj_a.in_dim)?;
        self.subnet_b
            .validate("subnet_b", self.groups.group_b.len(), self.proj_b.in_dim)?;
        self.proj_a.validate("proj_a")?;
        self.proj_b.validate("proj_b")?;
        if self.proj_a.out_dim != GROUP_A_EMBED || self.proj_b.out_dim != GROUP_B_EMBED {
            return Err(ConfigError::shape(
                "risk_scorer",
                format!(
                    "embeddings are {} + {}, expected {} + {}",
                    self.proj_a.out_dim, self.proj_b.out_dim, GROUP_A_EMBED, GROUP_B_EMBED
                ),
            ));
        }
        self.residual.validate("residual")?;
        if self.residual.in_dim != FUSED_DIM || self.residual.out_dim != FUSED_DIM {
            return Err(ConfigError::shape(
                "residual",
                format!("must map {} -> {}", FUSED_DIM, FUSED_DIM),
            ));
        }
        self.head.validate("head", FUSED_DIM, NUM_CLASSES)
    }
}

/// The trained scorer: validated weights plus the artifact version.
#[derive(Debug, Clone)]
pub struct RiskScoreModel {
    weights: RiskScorerWeights,
    version: String,
}

impl RiskScoreModel {
    pub fn from_weights(weights: RiskScorerWeights, version: &str) -> Result<Self, ConfigError> {
        weights.validate()?;
        Ok(Self {
            weights,
            version: version.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<(Self, ArtifactInfo), ConfigError> {
        let loaded = read_artifact::<RiskScorerWeights>(path, ArtifactKind::RiskScorer)?;
        let model = Self::from_weights(loaded.payload, &loaded.info.model_version)?;
        Ok((model, loaded.info))
    }

    pub fn save(&self, path: &Path) -> Result<ArtifactInfo, ConfigError> {
        write_artifact(path, ArtifactKind::RiskScorer, &self.version, &self.weights)
    }

    pub fn weights(&self) -> &RiskScorerWeights {
        &self.weights
    }

    /// Raw class logits for one state.
    pub fn logits(&self, state: &ClinicalState) -> Vec<f32> {
        let w = &self.weights;
        let x = state.to_f32_vec();

        let a = w
            .proj_a
            .forward(&w.subnet_a.forward(&FeatureGroups::gather(&w.groups.group_a, &x)));
        let b = w
            .proj_b
            .forward(&w.subnet_b.forward(&FeatureGroups::gather(&w.groups.group_b, &x)));

        let mut fused = a;
        fused.extend_from_slice(&b);
        let transformed = w.residual.forward(&fused);
        for (f, t) in fused.iter_mut().zip(transformed.iter()) {
            *f += t;
        }
        w.head.forward(&fused)
    }

    /// Softmax over the three risk classes.
    pub fn class_probabilities(&self, state: &ClinicalState) -> Vec<f64> {
        softmax(&self.logits(state))
    }

    /// `(p1 + 2 * p2) * 50`, saturated into [0, 100].
    pub fn score_from_probabilities(probs: &[f64]) -> f64 {
        let p1 = probs.get(1).copied().unwrap_or(0.0);
        let p2 = probs.get(2).copied().unwrap_or(0.0);
        ((p1 + 2.0 * p2) * 50.0).clamp(SCORE_MIN, SCORE_MAX)
    }
}

impl RiskScorer for RiskScoreModel {
    fn version(&self) -> &str {
        &self.version
    }

    fn score(&self, state: &ClinicalState) -> Result<f64, NumericError> {
        let probs = self.class_probabilities(state);
        if let Some(bad) = probs.iter().find(|p| !p.is_finite()) {
            return Err(NumericError::new(
                "risk_scorer.probabilities",
                format!("class probability {} for model {}", bad, self.version),
            ));
        }
        Ok(Self::score_from_probabilities(&probs))
    }
}
