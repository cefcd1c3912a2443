// src/assets.rs
//
// Immutable asset bundle: scorer, policy and domain table, loaded once at
// startup and shared read-only by every rollout.

use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::artifact::ArtifactInfo;
use crate::config::{ArtifactPaths, Config};
use crate::error::ConfigError;
use crate::nn::Activation;
use crate::rl::policy::{PolicyAgent, PolicyWeights};
use crate::rl::runner::{RolloutConfig, RolloutController};
use crate::rl::scorer::{FeatureGroups, RiskScoreModel, RiskScorerWeights};
use crate::rl::VariableDomainTable;

/// Version stamped on untrained fixture networks.
pub const FIXTURE_MODEL_VERSION: &str = "untrained-fixture";

#[derive(Debug, Clone)]
pub struct PlannerAssets {
    pub scorer: Arc<RiskScoreModel>,
    pub policy: Arc<PolicyAgent>,
    pub domains: Arc<VariableDomainTable>,
    /// Envelope metadata per artifact, in scorer/policy/domains order.
    pub manifest: Vec<ArtifactInfo>,
}

impl PlannerAssets {
    /// Load all three artifacts. Any failure is fatal.
    ///
    /// The scorer's feature groups must match `groups` from configuration.
    pub fn load(paths: &ArtifactPaths, groups: &FeatureGroups) -> Result<Self, ConfigError> {
        let (domains, domains_info) = VariableDomainTable::load(&paths.domains)?;
        log_loaded("domains", &paths.domains.display().to_string(), &domains_info);
        let domains = Arc::new(domains);

        let (scorer, scorer_info) = RiskScoreModel::load(&paths.scorer)?;
        log_loaded("scorer", &paths.scorer.display().to_string(), &scorer_info);
        if &scorer.weights().groups != groups {
            return Err(ConfigError::validation(
                "groups",
                format!(
                    "scorer artifact '{}' was built with different feature groups",
                    paths.scorer.display()
                ),
            ));
        }

        let (policy, policy_info) = PolicyAgent::load(&paths.policy, Arc::clone(&domains))?;
        log_loaded("policy", &paths.policy.display().to_string(), &policy_info);

        Ok(Self {
            scorer: Arc::new(scorer),
            policy: Arc::new(policy),
            domains,
            manifest: vec![scorer_info, policy_info, domains_info],
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, ConfigError> {
        Self::load(&cfg.artifacts, &cfg.groups)
    }

    /// Untrained networks over a real domain table, for smoke runs and tests.
    pub fn seeded(
        seed: u64,
        groups: FeatureGroups,
        domains: VariableDomainTable,
    ) -> Result<Self, ConfigError> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let scorer = RiskScoreModel::from_weights(
            RiskScorerWeights::seeded(groups, Activation::Gelu, 0.1, &mut rng),
            FIXTURE_MODEL_VERSION,
        )?;
        let domains = Arc::new(domains);
        let policy = PolicyAgent::from_weights(
            PolicyWeights::seeded(&mut rng),
            FIXTURE_MODEL_VERSION,
            Arc::clone(&domains),
        )?;
        Ok(Self {
            scorer: Arc::new(scorer),
            policy: Arc::new(policy),
            domains,
            manifest: Vec::new(),
        })
    }

    /// Controller over these assets.
    pub fn controller(&self, config: RolloutConfig) -> Result<RolloutController, ConfigError> {
        RolloutController::from_parts(
            self.scorer.clone(),
            self.policy.clone(),
            Arc::clone(&self.domains),
            config,
        )
    }
}

fn log_loaded(component: &str, path: &str, info: &ArtifactInfo) {
    eprintln!(
        "[assets] loaded {} path={} model_version={} sha256={}",
        component, path, info.model_version, info.payload_sha256
    );
}
