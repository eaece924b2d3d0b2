#![forbid(unsafe_code)]

use flint_config::{DeviceConfig, GcPolicyId, RawConfig, ScoringConfig};
use flint_harness::{run_scenario, Scenario};
use std::io::Write as _;
use std::path::Path;

fn conf_path(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(Path::parent)
        .expect("workspace root")
        .join("conf")
        .join(name)
}

fn load(name: &str) -> (DeviceConfig, Option<ScoringConfig>) {
    let raw = RawConfig::from_path(&conf_path(name)).expect("readable config");
    (
        DeviceConfig::from_raw(&raw).expect("device keys"),
        ScoringConfig::from_raw_optional(&raw).expect("scoring keys"),
    )
}

fn run(scenario: Scenario, cfg: &DeviceConfig, scoring: Option<&ScoringConfig>) -> flint_sim::RunReport {
    let mut log = Vec::new();
    let report = run_scenario(scenario, cfg, scoring, &mut log)
        .unwrap_or_else(|err| panic!("{} failed: {err}", scenario.name()));
    assert!(!log.is_empty(), "scenario should narrate its run");
    report
}

#[test]
fn overwrite_scenario_passes() {
    let (cfg, scoring) = load("overwrite.conf");
    let report = run(Scenario::Overwrite, &cfg, scoring.as_ref());
    assert_eq!(report.writes_done, 2);
    assert_eq!(report.physical_erases, 0);
}

#[test]
fn block_fill_scenario_passes() {
    let (cfg, scoring) = load("block-fill.conf");
    let report = run(Scenario::BlockFill, &cfg, scoring.as_ref());
    assert_eq!(report.writes_done, u64::from(cfg.block_size) + 1);
    assert_eq!(report.physical_erases, 0);
}

#[test]
fn capacity_bound_scenario_passes() {
    let (cfg, scoring) = load("capacity-bound.conf");
    let report = run(Scenario::CapacityBound, &cfg, scoring.as_ref());
    assert_eq!(report.writes_done, 2);
    assert_eq!(report.writes_requested, 4);
}

#[test]
fn gc_minimal_scenario_passes() {
    let (cfg, scoring) = load("gc-minimal.conf");
    let report = run(Scenario::MinimalFirstGc, &cfg, scoring.as_ref());
    assert_eq!(report.physical_erases, 3);
    // Finite run with scoring keys present.
    let scores = report.scores.expect("scoring configured");
    assert!(scores.total > 0);
}

#[test]
fn wear_limit_scenario_passes() {
    let (cfg, scoring) = load("wear-limit.conf");
    let report = run(Scenario::WearLimit, &cfg, scoring.as_ref());
    // 22 full passes of 512 pages, plus the two rejected writes.
    assert_eq!(report.writes_done, 22 * 512);
    assert_eq!(report.writes_requested, 22 * 512 + 2);
    let scores = report.scores.expect("scoring configured");
    assert!(scores.endurance > 0.0);
}

#[test]
fn trim_reuse_scenario_passes() {
    let (cfg, scoring) = load("trim-reuse.conf");
    let report = run(Scenario::TrimReuse, &cfg, scoring.as_ref());
    assert_eq!(report.writes_done, 64);
    // Every in-range trim reports success, mapped or not.
    assert_eq!(report.trims_done, 128);
    assert!(report.write_amplification >= 1.0);
}

#[test]
fn scenario_names_round_trip() {
    for scenario in Scenario::ALL {
        assert_eq!(Scenario::from_name(scenario.name()), Some(scenario));
    }
    assert_eq!(Scenario::from_name("nope"), None);
}

#[test]
fn config_mismatch_is_reported_not_panicked() {
    let (cfg, _) = load("overwrite.conf");
    // The minimal-GC workload needs its dedicated geometry.
    let mut log = Vec::new();
    let err = run_scenario(Scenario::MinimalFirstGc, &cfg, None, &mut log).unwrap_err();
    assert!(err.to_string().contains("BLOCK_SIZE 200"));
}

#[test]
fn scenario_runs_from_a_config_written_at_runtime() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "SSD_SIZE 1\nPACKAGE_SIZE 1\nDIE_SIZE 1\nPLANE_SIZE 4\nBLOCK_SIZE 8\n\
         BLOCK_ERASES 100\nOVERPROVISIONING 50\nSELECTED_GC_POLICY 3"
    )
    .unwrap();
    let cfg = DeviceConfig::from_path(file.path()).unwrap();
    assert_eq!(cfg.gc_policy, GcPolicyId::CostBenefit);
    run(Scenario::TrimReuse, &cfg, None);
}
