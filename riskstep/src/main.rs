// src/main.rs
//
// CLI entrypoint: run one rollout for a patient record and emit the
// RolloutResult as JSON.
//
// Constraints:
// - Profile precedence: --profile > RISKSTEP_ROLLOUT_PROFILE > full.
// - Config precedence: --config YAML (or defaults) < RISKSTEP_* env < flags.
// - Reproducible traces via --seed; without it a fresh seed is drawn and
//   reported in the result.
// - Run header (cfg version/hash, profile, steps, seed) goes to stderr so
//   stdout stays valid JSON.
//
// Exit codes: 0 ok, 2 configuration/artifact error (including non-finite
// network output), 3 input contract error, 4 internal index defect,
// 1 anything else.

use std::fs;
use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};

use riskstep::config::{fnv1a64, resolve_effective_profile, Config, RolloutProfile};
use riskstep::{
    ConfigError, InputError, PatientInput, PlannerAssets, RolloutError, RolloutTelemetry,
};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ProfileArg {
    Probe,
    Full,
}

#[derive(Debug, Parser)]
#[command(
    name = "riskstep",
    about = "Risk-guided rollout: bounded clinical action plans from frozen networks",
    version
)]
struct Args {
    /// Patient record (JSON object keyed by variable name); "-" reads stdin.
    #[arg(long)]
    input: PathBuf,

    /// Number of decision steps (overrides the profile default).
    #[arg(long)]
    steps: Option<u32>,

    /// Seed for action sampling.
    #[arg(long)]
    seed: Option<u64>,

    /// Episode profile. If omitted, uses RISKSTEP_ROLLOUT_PROFILE (default full).
    #[arg(long, value_enum)]
    profile: Option<ProfileArg>,

    /// Optional YAML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Risk-scorer artifact path.
    #[arg(long)]
    scorer: Option<PathBuf>,

    /// Policy artifact path.
    #[arg(long)]
    policy: Option<PathBuf>,

    /// Domain-table artifact path.
    #[arg(long)]
    domains: Option<PathBuf>,

    /// Write the result here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Verbosity: -v, -vv
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn read_input(path: &PathBuf) -> Result<PatientInput> {
    let text = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read patient record from stdin")?;
        buf
    } else {
        fs::read_to_string(path)
            .with_context(|| format!("Failed to read patient record: {}", path.display()))?
    };
    Ok(PatientInput::from_json_str(&text)?)
}

fn run(args: Args) -> Result<()> {
    let cli_profile = args.profile.map(|p| match p {
        ProfileArg::Probe => RolloutProfile::Probe,
        ProfileArg::Full => RolloutProfile::Full,
    });
    let effective = resolve_effective_profile(cli_profile);
    effective.log_startup();
    let profile = effective.profile;

    let mut cfg = match &args.config {
        Some(path) => Config::from_yaml_file(path)?.apply_env_overrides(),
        None => Config::from_env_or_default(),
    };
    if let Some(p) = args.scorer {
        cfg.artifacts.scorer = p;
    }
    if let Some(p) = args.policy {
        cfg.artifacts.policy = p;
    }
    if let Some(p) = args.domains {
        cfg.artifacts.domains = p;
    }
    cfg.validate()?;

    let mut rollout_cfg = cfg.rollout_config(profile);
    if let Some(steps) = args.steps {
        rollout_cfg = rollout_cfg.with_max_steps(steps);
    }
    let seed = args.seed.unwrap_or_else(rand::random);
    rollout_cfg = rollout_cfg.with_seed(seed);

    let cfg_hash = fnv1a64(&format!("{cfg:?}"));
    eprintln!(
        "riskstep | cfg={} | cfg_hash=0x{:016x} | profile={} | steps={} | alpha={} | seed={}",
        cfg.version,
        cfg_hash,
        profile.as_str(),
        rollout_cfg.max_steps,
        rollout_cfg.alpha,
        seed
    );

    let input = read_input(&args.input)?;
    let assets = PlannerAssets::from_config(&cfg)?;
    let controller = assets.controller(rollout_cfg)?;

    let mut telemetry = RolloutTelemetry::from_env();
    let result = controller.run_with_telemetry(&input, seed, &mut telemetry)?;

    if args.verbose > 0 {
        eprintln!(
            "[rollout] old_score={:.3} new_score={:.3} reduction={:.3} steps={}",
            result.old_score,
            result.new_score,
            result.score_reduction(),
            result.actions.len()
        );
    }
    if args.verbose > 1 {
        for p in result.action_plan() {
            eprintln!(
                "[rollout] step={} variable={} baseline={} delta={:.4} target={:.4}",
                p.step, p.variable, p.baseline, p.delta, p.target
            );
        }
    }

    let payload =
        serde_json::to_string_pretty(&result).context("Failed to serialize rollout result")?;
    match &args.out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create output directory {}", parent.display())
                })?;
            }
            fs::write(path, payload)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("riskstep: wrote {}", path.display());
        }
        None => println!("{}", payload),
    }
    Ok(())
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(e) = err.downcast_ref::<RolloutError>() {
        return match e {
            RolloutError::Config(_) | RolloutError::Numeric(_) => 2,
            RolloutError::Input(_) => 3,
            RolloutError::IndexOutOfRange(_) => 4,
        };
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return 2;
    }
    if err.downcast_ref::<InputError>().is_some() {
        return 3;
    }
    1
}

fn main() {
    let args = Args::parse();
    if let Err(err) = run(args) {
        eprintln!("riskstep: error: {:#}", err);
        std::process::exit(exit_code_for(&err));
    }
}
