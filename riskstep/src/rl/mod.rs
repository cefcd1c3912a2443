// src/rl/mod.rs
//
// Decision and simulation engine.
//
// Key components (leaves first):
// - VariableDomainTable: per-variable clamp bounds from a reference dataset
// - RiskScoreModel: feature-grouped network, state -> score in [0, 100]
// - SimEnv: one clamped mutation per step, reward from the score delta
// - PolicyAgent: hybrid discrete/continuous action selection
// - RolloutController: N sequential decisions -> RolloutResult
// - RolloutTelemetry: JSONL trace of every step
//
// Weights and the domain table are loaded once and shared read-only; each
// rollout owns its state.

pub mod domain;
pub mod policy;
pub mod runner;
pub mod scorer;
pub mod sim_env;
pub mod telemetry;

pub use domain::{DomainEntry, DomainTablePayload, VariableDomain, VariableDomainTable};
pub use policy::{
    Policy, PolicyAction, PolicyAgent, PolicyWeights, ScriptedPolicy, SCRIPTED_POLICY_VERSION,
};
pub use runner::{ActionRecord, PlannedAction, RolloutConfig, RolloutController, RolloutResult};
pub use scorer::{FeatureGroups, RiskScoreModel, RiskScorer, RiskScorerWeights, NUM_CLASSES};
pub use sim_env::{EnvConfig, SimEnv, StepInfo, StepResult};
pub use telemetry::{RolloutMarker, RolloutTelemetry, StepRecord, TELEMETRY_SCHEMA_VERSION};
