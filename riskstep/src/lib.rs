//! riskstep core library.
//!
//! Simulates incremental, bounded adjustments to a patient's clinical and
//! lifestyle variables, guided by a frozen risk-scoring network, and produces
//! a short ordered action plan (which variable, by how much, at which step)
//! that plausibly lowers a composite risk score in [0, 100].
//!
//! # Architecture
//!
//! - **Types** (`types`): the fixed-order 34-variable `ClinicalState` and the
//!   named `PatientInput` record it is validated from.
//! - **Network primitives** (`nn`): frozen dense layers, activations, softmax.
//! - **Artifacts** (`artifact`): versioned, checksummed weight/table envelopes.
//! - **Engine** (`rl`): domain table, risk scorer, environment, policy,
//!   rollout controller and telemetry.
//! - **Assets** (`assets`): the immutable bundle loaded once at startup.
//!
//! The binaries (`src/main.rs`, `src/bin/build_artifacts.rs`) are thin
//! harnesses around these components.

pub mod artifact;
pub mod assets;
pub mod config;
pub mod error;
pub mod nn;
pub mod rl;
pub mod types;

// --- Re-exports for ergonomic external use ---------------------------------

pub use assets::PlannerAssets;
pub use config::{resolve_effective_profile, Config, RolloutProfile};
pub use error::{ConfigError, IndexOutOfRange, InputError, NumericError, RolloutError};
pub use rl::{
    ActionRecord, EnvConfig, PlannedAction, Policy, PolicyAction, PolicyAgent, RiskScoreModel,
    RiskScorer, RolloutConfig, RolloutController, RolloutResult, RolloutTelemetry,
    ScriptedPolicy, SimEnv, VariableDomain, VariableDomainTable,
};
pub use types::{ClinicalState, NamedValue, PatientInput, FEATURE_NAMES, STATE_DIM};
