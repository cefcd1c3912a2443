//! Artifact envelope loading: round trip through disk, and every failure mode
//! surfaces as a configuration error before any rollout runs.

use std::fs;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use riskstep::artifact::{write_artifact, ArtifactKind};
use riskstep::nn::{Activation, DenseLayer};
use riskstep::rl::{FeatureGroups, PolicyWeights};
use riskstep::{ConfigError, PlannerAssets, RiskScoreModel, RiskScorer, VariableDomainTable};

#[path = "rollout_testkit.rs"]
mod rollout_testkit;

use rollout_testkit::{reference_table, scenario_state, seeded_assets, write_fixture_artifacts};

#[test]
fn test_written_artifacts_load_and_score_identically() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_fixture_artifacts(dir.path(), 21);
    let loaded = PlannerAssets::load(&paths, &FeatureGroups::default()).unwrap();
    let original = seeded_assets(21);

    let state = scenario_state();
    assert_eq!(
        loaded.scorer.score(&state).unwrap().to_bits(),
        original.scorer.score(&state).unwrap().to_bits()
    );
    assert_eq!(*loaded.domains, reference_table());
    assert_eq!(loaded.manifest[2].model_version, "domains-test");
}

#[test]
fn test_domain_table_reload_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("domains.json");
    let table = reference_table();
    table.save(&path, "v1").unwrap();
    let (first, info1) = VariableDomainTable::load(&path).unwrap();
    let (second, info2) = VariableDomainTable::load(&path).unwrap();
    assert_eq!(first, table);
    assert_eq!(first, second);
    assert_eq!(info1.payload_sha256, info2.payload_sha256);
    assert_eq!(first.lookup(9).unwrap(), (22.4, 35.7));
    assert_eq!(first.lookup_name("mvpa"), Some((0.0, 1680.0)));
}

#[test]
fn test_tampered_payload_is_checksum_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_fixture_artifacts(dir.path(), 22);
    let text = fs::read_to_string(&paths.domains).unwrap();
    fs::write(&paths.domains, text.replacen("\"min\":22.4", "\"min\":20.0", 1)).unwrap();
    assert!(matches!(
        VariableDomainTable::load(&paths.domains),
        Err(ConfigError::ChecksumMismatch { .. })
    ));
}

#[test]
fn test_future_format_version_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_fixture_artifacts(dir.path(), 23);
    let text = fs::read_to_string(&paths.scorer).unwrap();
    fs::write(
        &paths.scorer,
        text.replacen("\"format_version\": 1", "\"format_version\": 9", 1),
    )
    .unwrap();
    match RiskScoreModel::load(&paths.scorer) {
        Err(ConfigError::VersionMismatch {
            expected, found, ..
        }) => {
            assert_eq!(expected, 1);
            assert_eq!(found, 9);
        }
        other => panic!("expected VersionMismatch, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_wrong_kind_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_fixture_artifacts(dir.path(), 24);
    assert!(matches!(
        RiskScoreModel::load(&paths.policy),
        Err(ConfigError::KindMismatch { .. })
    ));
}

#[test]
fn test_policy_with_wrong_head_width_is_shape_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut paths = write_fixture_artifacts(dir.path(), 25);
    let mut rng = ChaCha8Rng::seed_from_u64(25);
    let mut weights = PolicyWeights::seeded(&mut rng);
    weights.action_head = DenseLayer::seeded(64, 30, Activation::Identity, 0.0, &mut rng);
    paths.policy = dir.path().join("bad_policy.json");
    write_artifact(&paths.policy, ArtifactKind::PolicyAgent, "bad", &weights).unwrap();

    assert!(matches!(
        PlannerAssets::load(&paths, &FeatureGroups::default()),
        Err(ConfigError::Shape { .. })
    ));
}

#[test]
fn test_truncated_domain_table_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.json");
    let mut payload = reference_table().to_payload();
    payload.entries.truncate(33);
    write_artifact(&path, ArtifactKind::DomainTable, "short", &payload).unwrap();
    assert!(matches!(
        VariableDomainTable::load(&path),
        Err(ConfigError::Validation { .. })
    ));
}

#[test]
fn test_reference_dataset_with_missing_variable_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reference.jsonl");
    fs::write(&path, "{\"gender\": 1.0, \"age\": 40.0}\n").unwrap();
    let err = VariableDomainTable::from_reference_jsonl(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("race"));
}
