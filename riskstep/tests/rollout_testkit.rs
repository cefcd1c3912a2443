// tests/rollout_testkit.rs
//
// Shared helpers for rollout integration tests: fixture records, a domain
// table built from the reference dataset, seeded asset bundles and a simple
// monotone scorer.
//
// Note: This module is included via #[path] from other test files.
// The dead_code warnings are suppressed because not all functions
// are used in every test file that includes this module.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use riskstep::config::ArtifactPaths;
use riskstep::rl::FeatureGroups;
use riskstep::{
    ClinicalState, NumericError, PatientInput, PlannerAssets, RiskScorer, VariableDomain,
    VariableDomainTable, STATE_DIM,
};

pub fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

pub fn reference_path() -> PathBuf {
    fixture_dir().join("reference.jsonl")
}

pub fn scenario_path() -> PathBuf {
    fixture_dir().join("patient_scenario.json")
}

/// age=33, bmi=35.7, glu=204.0, hb1ac=9.5, mvpa=840.0, context="dd".
pub fn scenario_input() -> PatientInput {
    let text = fs::read_to_string(scenario_path()).expect("read scenario fixture");
    PatientInput::from_json_str(&text).expect("scenario fixture is valid")
}

pub fn scenario_state() -> ClinicalState {
    scenario_input().to_state().expect("scenario fixture is complete")
}

pub fn reference_table() -> VariableDomainTable {
    VariableDomainTable::from_reference_jsonl(&reference_path()).expect("reference dataset")
}

/// Reference domains with one variable overridden.
pub fn reference_table_with(index: usize, min: f64, max: f64) -> VariableDomainTable {
    let table = reference_table();
    let mut domains = [VariableDomain { min: 0.0, max: 0.0 }; STATE_DIM];
    for (i, d) in domains.iter_mut().enumerate() {
        *d = table.domain(i).expect("index in range");
    }
    domains[index] = VariableDomain { min, max };
    VariableDomainTable::from_domains(domains)
}

pub fn seeded_assets(seed: u64) -> PlannerAssets {
    PlannerAssets::seeded(seed, FeatureGroups::default(), reference_table())
        .expect("seeded assets")
}

/// Write seeded scorer/policy and the reference domain table into `dir`.
pub fn write_fixture_artifacts(dir: &Path, seed: u64) -> ArtifactPaths {
    let paths = ArtifactPaths {
        scorer: dir.join("risk_scorer.json"),
        policy: dir.join("policy_agent.json"),
        domains: dir.join("domain_table.json"),
    };
    let assets = seeded_assets(seed);
    assets.scorer.save(&paths.scorer).expect("save scorer");
    assets.policy.save(&paths.policy).expect("save policy");
    assets
        .domains
        .save(&paths.domains, "domains-test")
        .expect("save domains");
    paths
}

/// `weight * state[index]` saturated into [0, 100]; monotone in one variable.
pub struct MonotoneScorer {
    pub index: usize,
    pub weight: f64,
}

impl RiskScorer for MonotoneScorer {
    fn version(&self) -> &str {
        "monotone-test"
    }

    fn score(&self, state: &ClinicalState) -> Result<f64, NumericError> {
        Ok((self.weight * state.values()[self.index]).clamp(0.0, 100.0))
    }
}
