#![forbid(unsafe_code)]

use anyhow::{bail, Context, Result};
use clap::Parser;
use flint_config::{DeviceConfig, RawConfig, ScoringConfig};
use flint_harness::{run_scenario, Scenario};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Run one FlintFTL scenario against a device configuration.
#[derive(Parser)]
#[command(name = "flint-harness", version)]
struct Args {
    /// Scenario name: overwrite, block-fill, capacity-bound, gc-minimal,
    /// wear-limit, or trim-reuse.
    scenario: String,
    /// Device configuration file.
    config: PathBuf,
    /// Operation log written during the run.
    log: PathBuf,
    /// Print the report as JSON on stdout as well.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(&Args::parse()) {
        Ok(score) => {
            println!("SUCCESS");
            println!("SCORE = {score}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            println!("FAILED");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<u64> {
    let Some(scenario) = Scenario::from_name(&args.scenario) else {
        let names: Vec<&str> = Scenario::ALL.iter().map(|s| s.name()).collect();
        bail!(
            "unknown scenario {:?}; expected one of: {}",
            args.scenario,
            names.join(", ")
        );
    };

    let raw = RawConfig::from_path(&args.config)
        .with_context(|| format!("reading {}", args.config.display()))?;
    let cfg = DeviceConfig::from_raw(&raw)?;
    let scoring = ScoringConfig::from_raw_optional(&raw)?;

    let mut log = BufWriter::new(
        File::create(&args.log).with_context(|| format!("creating {}", args.log.display()))?,
    );
    let report = run_scenario(scenario, &cfg, scoring.as_ref(), &mut log)
        .with_context(|| format!("scenario {}", scenario.name()))?;
    log.flush()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(report.scores.map(|s| s.total).unwrap_or_default())
}
