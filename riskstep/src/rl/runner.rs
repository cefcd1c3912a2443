// src/rl/runner.rs
//
// Rollout controller: drives N sequential decisions through the environment
// and packages the trace.
//
// Per rollout:
//   old_score = score(initial)
//   for step in 1..=N: policy.act -> env.step -> ActionRecord
//   new_score = score(final)
//
// Action selection is stochastic, so traces differ between unseeded runs;
// scoring is deterministic. Errors propagate immediately; there are no
// retries and no partial results.

use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::domain::VariableDomainTable;
use super::policy::Policy;
use super::scorer::RiskScorer;
use super::sim_env::{EnvConfig, SimEnv};
use super::telemetry::{RolloutTelemetry, StepRecord};
use crate::error::{ConfigError, RolloutError};
use crate::types::{NamedValue, PatientInput};

/// Configuration for a rollout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RolloutConfig {
    /// Number of decision steps.
    pub max_steps: u32,
    /// Reward scale passed to the environment.
    pub alpha: f64,
    /// Fixed seed; `None` draws a fresh one per rollout.
    pub seed: Option<u64>,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        let env = EnvConfig::rollout();
        Self {
            max_steps: env.max_steps,
            alpha: env.alpha,
            seed: None,
        }
    }
}

impl RolloutConfig {
    pub fn from_env_config(env: EnvConfig) -> Self {
        Self {
            max_steps: env.max_steps,
            alpha: env.alpha,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn env_config(&self) -> EnvConfig {
        EnvConfig {
            max_steps: self.max_steps,
            alpha: self.alpha,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_steps == 0 {
            return Err(ConfigError::validation("rollout.max_steps", "must be > 0"));
        }
        if !self.alpha.is_finite() {
            return Err(ConfigError::validation(
                "rollout.alpha",
                format!("must be finite, got {}", self.alpha),
            ));
        }
        Ok(())
    }
}

/// One recorded decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// 1-based, strictly increasing.
    pub step: u32,
    pub variable: String,
    pub index: usize,
    /// Delta proposed by the policy, before the environment clamps the value.
    pub delta: f64,
}

/// Downstream view of one action: where the variable starts and where the
/// plan takes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub step: u32,
    pub variable: String,
    /// Value from the original input.
    pub baseline: f64,
    pub delta: f64,
    /// `baseline + delta`.
    pub target: f64,
}

/// Full trace of a completed rollout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutResult {
    pub policy_version: String,
    pub scorer_version: String,
    pub seed: u64,
    /// Free-text context passed through from the input, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub original_values: Vec<NamedValue>,
    pub actions: Vec<ActionRecord>,
    pub old_score: f64,
    pub new_score: f64,
    pub final_values: Vec<NamedValue>,
    pub total_reward: f64,
}

impl RolloutResult {
    /// Positive when the plan lowered the risk score.
    pub fn score_reduction(&self) -> f64 {
        self.old_score - self.new_score
    }

    /// Original value of `variable`.
    pub fn baseline(&self, variable: &str) -> Option<f64> {
        self.original_values
            .iter()
            .find(|nv| nv.name == variable)
            .map(|nv| nv.value)
    }

    pub fn action_plan(&self) -> Vec<PlannedAction> {
        self.actions
            .iter()
            .map(|a| {
                let baseline = self.baseline(&a.variable).unwrap_or(0.0);
                PlannedAction {
                    step: a.step,
                    variable: a.variable.clone(),
                    baseline,
                    delta: a.delta,
                    target: baseline + a.delta,
                }
            })
            .collect()
    }
}

/// Drives rollouts over shared, read-only assets.
#[derive(Clone)]
pub struct RolloutController {
    scorer: Arc<dyn RiskScorer>,
    policy: Arc<dyn Policy>,
    domains: Arc<VariableDomainTable>,
    config: RolloutConfig,
}

impl RolloutController {
    pub fn from_parts(
        scorer: Arc<dyn RiskScorer>,
        policy: Arc<dyn Policy>,
        domains: Arc<VariableDomainTable>,
        config: RolloutConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            scorer,
            policy,
            domains,
            config,
        })
    }

    pub fn config(&self) -> &RolloutConfig {
        &self.config
    }

    pub fn policy_version(&self) -> &str {
        self.policy.version()
    }

    /// Run one rollout. Uses the configured seed, or a fresh random one.
    pub fn run(&self, input: &PatientInput) -> Result<RolloutResult, RolloutError> {
        let seed = self.config.seed.unwrap_or_else(rand::random);
        self.run_seeded(input, seed)
    }

    /// Run one rollout with a fixed seed; identical seeds give identical traces.
    pub fn run_seeded(&self, input: &PatientInput, seed: u64) -> Result<RolloutResult, RolloutError> {
        let mut telemetry = RolloutTelemetry::new();
        self.run_with_telemetry(input, seed, &mut telemetry)
    }

    pub fn run_with_telemetry(
        &self,
        input: &PatientInput,
        seed: u64,
        telemetry: &mut RolloutTelemetry,
    ) -> Result<RolloutResult, RolloutError> {
        let initial = input.to_state()?;
        let mut env = SimEnv::new(
            Arc::clone(&self.scorer),
            Arc::clone(&self.domains),
            self.config.env_config(),
            &initial,
        );
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let old_score = env.score()?;
        let rollout_id = telemetry.log_rollout_start(
            seed,
            self.policy.version(),
            self.scorer.version(),
            old_score,
        );

        let mut actions = Vec::with_capacity(self.config.max_steps as usize);
        let mut total_reward = 0.0;
        for step in 1..=self.config.max_steps {
            let action = self.policy.act(step, env.state(), &mut rng)?;
            let result = env.step(action.index, action.delta)?;
            telemetry.log_step(&StepRecord::new(
                rollout_id,
                seed,
                action.delta,
                result.reward,
                &result.info,
            ));
            total_reward += result.reward;
            actions.push(ActionRecord {
                step,
                variable: result.info.variable,
                index: action.index,
                delta: action.delta,
            });
            if result.done {
                break;
            }
        }

        let new_score = env.score()?;
        telemetry.log_rollout_end(
            rollout_id,
            seed,
            self.policy.version(),
            self.scorer.version(),
            new_score,
            env.steps(),
            total_reward,
        );

        Ok(RolloutResult {
            policy_version: self.policy.version().to_string(),
            scorer_version: self.scorer.version().to_string(),
            seed,
            context: input.context().map(str::to_string),
            original_values: initial.named_values(),
            actions,
            old_score,
            new_score,
            final_values: env.state().named_values(),
            total_reward,
        })
    }

    /// Independent rollouts in parallel; input `i` uses seed `base_seed + i`.
    ///
    /// Results are returned in input order. Telemetry is not emitted.
    pub fn run_many(
        &self,
        inputs: &[PatientInput],
        base_seed: u64,
    ) -> Vec<Result<RolloutResult, RolloutError>> {
        inputs
            .par_iter()
            .enumerate()
            .map(|(i, input)| self.run_seeded(input, base_seed.wrapping_add(i as u64)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InputError;
    use crate::rl::policy::{PolicyAction, ScriptedPolicy};
    use crate::testkit::{
        scenario_input, seeded_controller, seeded_policy, seeded_scorer, wide_domains,
        LinearScorer,
    };

    fn scripted_controller(actions: Vec<PolicyAction>) -> RolloutController {
        RolloutController::from_parts(
            Arc::new(LinearScorer::on(28, 0.25)),
            Arc::new(ScriptedPolicy::new(actions).unwrap()),
            Arc::new(wide_domains()),
            RolloutConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_rollout_records_eight_ordered_steps() {
        let controller = seeded_controller(5);
        let result = controller.run_seeded(&scenario_input(), 42).unwrap();
        assert_eq!(result.actions.len(), 8);
        let steps: Vec<u32> = result.actions.iter().map(|a| a.step).collect();
        assert_eq!(steps, (1..=8).collect::<Vec<_>>());
        assert!((0.0..=100.0).contains(&result.old_score));
        assert!((0.0..=100.0).contains(&result.new_score));
        assert_eq!(result.context.as_deref(), Some("dd"));
    }

    #[test]
    fn test_same_seed_same_trace() {
        let controller = seeded_controller(5);
        let a = controller.run_seeded(&scenario_input(), 7).unwrap();
        let b = controller.run_seeded(&scenario_input(), 7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_scripted_rollout_scores_and_plan() {
        let controller = scripted_controller(vec![PolicyAction {
            index: 28,
            delta: -10.0,
        }]);
        let result = controller.run_seeded(&scenario_input(), 0).unwrap();
        // glu 204 -> 124 after 8 steps of -10.
        assert_eq!(result.final_values[28].value, 124.0);
        assert_eq!(result.old_score, 51.0);
        assert_eq!(result.new_score, 31.0);
        assert_eq!(result.score_reduction(), 20.0);
        assert!((result.total_reward - 5.0 * 20.0).abs() < 1e-9);

        let plan = result.action_plan();
        assert_eq!(plan.len(), 8);
        assert!(plan.iter().all(|p| p.baseline == 204.0 && p.target == 194.0));
    }

    #[test]
    fn test_missing_variable_aborts_rollout() {
        let controller = seeded_controller(5);
        let mut input = scenario_input();
        input.remove("mvpa");
        let err = controller.run_seeded(&input, 1).unwrap_err();
        assert_eq!(
            err,
            RolloutError::Input(InputError::MissingVariable {
                name: "mvpa".to_string()
            })
        );
        assert!(err.is_caller_fixable());
    }

    #[test]
    fn test_value_beyond_single_precision_aborts_rollout() {
        let controller = seeded_controller(5);
        let mut input = scenario_input();
        input.set("crp", 1.0e300);
        let err = controller.run_seeded(&input, 1).unwrap_err();
        assert!(matches!(
            err,
            RolloutError::Input(InputError::NonNumeric { ref name, .. }) if name == "crp"
        ));
    }

    #[test]
    fn test_degenerate_policy_output_aborts_rollout() {
        let domains = Arc::new(wide_domains());
        let mut policy = seeded_policy(3, Arc::clone(&domains));
        policy.weights_mut().action_head.bias[0] = f32::NAN;
        let controller = RolloutController::from_parts(
            Arc::new(seeded_scorer(3)),
            Arc::new(policy),
            domains,
            RolloutConfig::default(),
        )
        .unwrap();
        let err = controller.run_seeded(&scenario_input(), 1).unwrap_err();
        assert!(matches!(err, RolloutError::Numeric(_)));
        assert!(err.is_operator_fixable());
    }

    #[test]
    fn test_scorer_failure_mid_rollout_is_not_a_result() {
        // glu climbs 204 -> 254 on the first step; the scorer refuses > 250.
        let controller = RolloutController::from_parts(
            Arc::new(LinearScorer::on(28, 0.25).failing_above(250.0)),
            Arc::new(
                ScriptedPolicy::new(vec![PolicyAction {
                    index: 28,
                    delta: 50.0,
                }])
                .unwrap(),
            ),
            Arc::new(wide_domains()),
            RolloutConfig::default(),
        )
        .unwrap();
        let err = controller.run_seeded(&scenario_input(), 1).unwrap_err();
        assert!(matches!(err, RolloutError::Numeric(_)));
    }

    #[test]
    fn test_policy_index_defect_propagates() {
        let controller = scripted_controller(vec![PolicyAction {
            index: 40,
            delta: 1.0,
        }]);
        let err = controller.run_seeded(&scenario_input(), 1).unwrap_err();
        assert!(matches!(err, RolloutError::IndexOutOfRange(_)));
    }

    #[test]
    fn test_zero_steps_rejected_at_construction() {
        let err = RolloutController::from_parts(
            Arc::new(LinearScorer::on(28, 0.25)),
            Arc::new(
                ScriptedPolicy::new(vec![PolicyAction {
                    index: 0,
                    delta: 0.0,
                }])
                .unwrap(),
            ),
            Arc::new(wide_domains()),
            RolloutConfig::default().with_max_steps(0),
        )
        .err();
        assert!(matches!(err, Some(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_run_many_matches_sequential_seeds() {
        let controller = seeded_controller(12);
        let inputs = vec![scenario_input(), scenario_input(), scenario_input()];
        let many = controller.run_many(&inputs, 100);
        for (i, result) in many.into_iter().enumerate() {
            let expected = controller.run_seeded(&inputs[i], 100 + i as u64).unwrap();
            assert_eq!(result.unwrap(), expected);
        }
    }
}
