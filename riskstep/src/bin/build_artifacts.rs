// src/bin/build_artifacts.rs
//
// Offline artifact builder.
//
// - Always: derive the domain table from a reference JSONL dataset and write
//   it as a versioned envelope.
// - With --with-fixtures: also write seeded, untrained scorer/policy
//   artifacts so the rollout binary can be smoke-tested end to end.
//
// Trained weights are exported by the training pipeline, not by this tool.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use riskstep::artifact::ArtifactInfo;
use riskstep::config::Config;
use riskstep::{PlannerAssets, VariableDomainTable};

#[derive(Debug, Parser)]
#[command(
    name = "build_artifacts",
    about = "Build riskstep artifacts (domain table, optional untrained fixtures)",
    version
)]
struct Args {
    /// Reference dataset: one JSON patient record per line.
    #[arg(long)]
    reference: PathBuf,

    /// Output directory.
    #[arg(long, default_value = "artifacts")]
    out_dir: PathBuf,

    /// Version string recorded in the domain-table envelope.
    #[arg(long, default_value = "domains-v1")]
    domains_version: String,

    /// Also write seeded, untrained scorer and policy artifacts.
    #[arg(long)]
    with_fixtures: bool,

    /// Seed for fixture weights.
    #[arg(long, default_value_t = 42)]
    fixture_seed: u64,

    /// Optional YAML configuration (feature groups for fixtures).
    #[arg(long)]
    config: Option<PathBuf>,
}

fn report(path: &PathBuf, info: &ArtifactInfo) {
    println!(
        "build_artifacts: wrote {} kind={} model_version={} sha256={}",
        path.display(),
        info.kind.as_str(),
        info.model_version,
        info.payload_sha256
    );
}

fn run(args: Args) -> Result<()> {
    let cfg = match &args.config {
        Some(path) => Config::from_yaml_file(path)?,
        None => Config::default(),
    };

    let table = VariableDomainTable::from_reference_jsonl(&args.reference)
        .with_context(|| format!("Failed to build domain table from {}", args.reference.display()))?;
    eprintln!(
        "[build_artifacts] reference rows={} path={}",
        table.source_rows(),
        args.reference.display()
    );

    let domains_path = args.out_dir.join("domain_table.json");
    let info = table.save(&domains_path, &args.domains_version)?;
    report(&domains_path, &info);

    if args.with_fixtures {
        let assets = PlannerAssets::seeded(args.fixture_seed, cfg.groups.clone(), table)?;

        let scorer_path = args.out_dir.join("risk_scorer.json");
        let info = assets.scorer.save(&scorer_path)?;
        report(&scorer_path, &info);

        let policy_path = args.out_dir.join("policy_agent.json");
        let info = assets.policy.save(&policy_path)?;
        report(&policy_path, &info);
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    if let Err(err) = run(args) {
        eprintln!("build_artifacts: error: {:#}", err);
        std::process::exit(2);
    }
}
