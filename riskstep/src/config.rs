// src/config.rs
//
// Central configuration for the rollout engine: where the frozen artifacts
// live, rollout/probe lengths and reward scales, and the scorer's feature
// groups.
//
// Sources, lowest to highest precedence:
//   built-in defaults < optional YAML file < RISKSTEP_* environment variables
//   < CLI flags (applied by the binaries).

use std::env;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::rl::runner::RolloutConfig;
use crate::rl::scorer::FeatureGroups;
use crate::rl::sim_env::EnvConfig;

/// Human-readable config version stamped on every run header.
pub const CONFIG_VERSION: &str = "riskstep-cfg-v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactPaths {
    pub scorer: PathBuf,
    pub policy: PathBuf,
    pub domains: PathBuf,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            scorer: PathBuf::from("artifacts/risk_scorer.json"),
            policy: PathBuf::from("artifacts/policy_agent.json"),
            domains: PathBuf::from("artifacts/domain_table.json"),
        }
    }
}

/// Defaults for full planning rollouts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutDefaults {
    pub max_steps: u32,
    pub alpha: f64,
}

impl Default for RolloutDefaults {
    fn default() -> Self {
        let env = EnvConfig::rollout();
        Self {
            max_steps: env.max_steps,
            alpha: env.alpha,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: String,
    pub artifacts: ArtifactPaths,
    pub rollout: RolloutDefaults,
    /// Episode settings for short counterfactual probes.
    pub probe: EnvConfig,
    pub groups: FeatureGroups,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            artifacts: ArtifactPaths::default(),
            rollout: RolloutDefaults::default(),
            probe: EnvConfig::probe(),
            groups: FeatureGroups::default(),
        }
    }
}

/// Which episode shape a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloutProfile {
    /// 5 steps, alpha 100 by default.
    Probe,
    /// 8 steps, alpha 5 by default.
    Full,
}

impl RolloutProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            RolloutProfile::Probe => "probe",
            RolloutProfile::Full => "full",
        }
    }

    /// Case-insensitive; `None` if unrecognized.
    pub fn parse(s: &str) -> Option<RolloutProfile> {
        match s.trim().to_ascii_lowercase().as_str() {
            "probe" | "p" => Some(RolloutProfile::Probe),
            "full" | "rollout" | "f" => Some(RolloutProfile::Full),
            _ => None,
        }
    }
}

/// Where the effective profile came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSource {
    Cli,
    Env,
    Default,
}

impl ProfileSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileSource::Cli => "cli",
            ProfileSource::Env => "env",
            ProfileSource::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EffectiveProfile {
    pub profile: RolloutProfile,
    pub source: ProfileSource,
}

impl EffectiveProfile {
    /// Format: `[config] effective_rollout_profile=<profile> source=<source>`
    pub fn log_startup(&self) {
        eprintln!(
            "[config] effective_rollout_profile={} source={}",
            self.profile.as_str(),
            self.source.as_str()
        );
    }
}

/// Precedence: `cli_profile` > RISKSTEP_ROLLOUT_PROFILE > Full.
pub fn resolve_effective_profile(cli_profile: Option<RolloutProfile>) -> EffectiveProfile {
    if let Some(p) = cli_profile {
        return EffectiveProfile {
            profile: p,
            source: ProfileSource::Cli,
        };
    }

    if let Ok(env_val) = env::var("RISKSTEP_ROLLOUT_PROFILE") {
        if !env_val.trim().is_empty() {
            if let Some(p) = RolloutProfile::parse(&env_val) {
                return EffectiveProfile {
                    profile: p,
                    source: ProfileSource::Env,
                };
            }
            eprintln!(
                "[config] WARN: invalid RISKSTEP_ROLLOUT_PROFILE={:?}; ignoring",
                env_val
            );
        }
    }

    EffectiveProfile {
        profile: RolloutProfile::Full,
        source: ProfileSource::Default,
    }
}

fn override_from_env<T>(name: &str, slot: &mut T)
where
    T: FromStr + Display,
{
    let Ok(raw) = env::var(name) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => {
            eprintln!("[config] {} = {} (overrode default)", name, v);
            *slot = v;
        }
        Err(_) => {
            eprintln!(
                "[config] WARN: could not parse {} = {:?}; using default {}",
                name, raw, slot
            );
        }
    }
}

fn override_path_from_env(name: &str, slot: &mut PathBuf) {
    if let Ok(raw) = env::var(name) {
        if raw.trim().is_empty() {
            eprintln!("[config] WARN: empty {}; using default {}", name, slot.display());
        } else {
            *slot = PathBuf::from(raw.trim());
            eprintln!("[config] {} = {} (overrode default)", name, slot.display());
        }
    }
}

impl Config {
    /// Defaults, then environment overrides.
    pub fn from_env_or_default() -> Self {
        Self::default().apply_env_overrides()
    }

    /// Read a YAML file; absent sections keep their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let label = path.display().to_string();
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: label.clone(),
            source: e.to_string(),
        })?;
        let cfg: Config = serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: label,
            source: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply RISKSTEP_* overrides. Unparsable values warn and are ignored.
    ///
    ///   - RISKSTEP_SCORER_PATH   (path)
    ///   - RISKSTEP_POLICY_PATH   (path)
    ///   - RISKSTEP_DOMAINS_PATH  (path)
    ///   - RISKSTEP_MAX_STEPS     (u32, full rollouts)
    ///   - RISKSTEP_REWARD_ALPHA  (f64, full rollouts)
    pub fn apply_env_overrides(mut self) -> Self {
        override_path_from_env("RISKSTEP_SCORER_PATH", &mut self.artifacts.scorer);
        override_path_from_env("RISKSTEP_POLICY_PATH", &mut self.artifacts.policy);
        override_path_from_env("RISKSTEP_DOMAINS_PATH", &mut self.artifacts.domains);
        override_from_env("RISKSTEP_MAX_STEPS", &mut self.rollout.max_steps);
        override_from_env("RISKSTEP_REWARD_ALPHA", &mut self.rollout.alpha);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rollout.max_steps == 0 {
            return Err(ConfigError::validation("rollout.max_steps", "must be > 0"));
        }
        if !self.rollout.alpha.is_finite() {
            return Err(ConfigError::validation("rollout.alpha", "must be finite"));
        }
        if self.probe.max_steps == 0 {
            return Err(ConfigError::validation("probe.max_steps", "must be > 0"));
        }
        if !self.probe.alpha.is_finite() {
            return Err(ConfigError::validation("probe.alpha", "must be finite"));
        }
        self.groups.validate()
    }

    /// Episode shape for `profile`.
    pub fn env_config(&self, profile: RolloutProfile) -> EnvConfig {
        match profile {
            RolloutProfile::Probe => self.probe,
            RolloutProfile::Full => EnvConfig {
                max_steps: self.rollout.max_steps,
                alpha: self.rollout.alpha,
            },
        }
    }

    pub fn rollout_config(&self, profile: RolloutProfile) -> RolloutConfig {
        RolloutConfig::from_env_config(self.env_config(profile))
    }
}

/// FNV-1a 64-bit hash, used for the config fingerprint in run headers.
pub fn fnv1a64(s: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let mut h = FNV_OFFSET;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}
