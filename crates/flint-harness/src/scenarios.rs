//! Scenario implementations.
//!
//! Workloads use seeded pseudo-random value streams, explicit erase-count
//! windows, and readback sweeps that replay the generation stream, so every
//! run is reproducible from the configuration alone.

use flint_config::{DeviceConfig, GcPolicyId, ScoringConfig};
use flint_sim::{RunReport, SimError, SimTest};
use flint_types::Lba;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Write;
use thiserror::Error;
use tracing::info;

const SEED: u64 = 15746;
const VALUE_RANGE: u32 = 18746;
const MARKER: u32 = 18746;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("scenario requires {0}")]
    Config(String),

    #[error("check failed: {0}")]
    Check(String),

    #[error(transparent)]
    Sim(#[from] SimError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn check(cond: bool, msg: impl FnOnce() -> String) -> Result<(), ScenarioError> {
    if cond {
        Ok(())
    } else {
        Err(ScenarioError::Check(msg()))
    }
}

fn require(cond: bool, what: &str) -> Result<(), ScenarioError> {
    if cond {
        Ok(())
    } else {
        Err(ScenarioError::Config(what.to_string()))
    }
}

/// The six end-to-end workloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Overwrite one page and read the newest value back.
    Overwrite,
    /// Fill a logical block plus one page; the log absorbs the spill.
    BlockFill,
    /// Writes past the advertised capacity are rejected.
    CapacityBound,
    /// The first collection round erases exactly three blocks.
    MinimalFirstGc,
    /// Writes keep succeeding until the erase budget is truly gone.
    WearLimit,
    /// Trimmed pages stop counting against reclaim.
    TrimReuse,
}

impl Scenario {
    pub const ALL: [Scenario; 6] = [
        Scenario::Overwrite,
        Scenario::BlockFill,
        Scenario::CapacityBound,
        Scenario::MinimalFirstGc,
        Scenario::WearLimit,
        Scenario::TrimReuse,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Scenario::Overwrite => "overwrite",
            Scenario::BlockFill => "block-fill",
            Scenario::CapacityBound => "capacity-bound",
            Scenario::MinimalFirstGc => "gc-minimal",
            Scenario::WearLimit => "wear-limit",
            Scenario::TrimReuse => "trim-reuse",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    /// Whether the workload runs the device to its wear limit, which selects
    /// the endurance-weighted score set.
    #[must_use]
    pub fn endurance_scored(self) -> bool {
        matches!(self, Scenario::WearLimit)
    }
}

/// Run one scenario to completion and produce its report.
pub fn run_scenario(
    scenario: Scenario,
    cfg: &DeviceConfig,
    scoring: Option<&ScoringConfig>,
    log: &mut dyn Write,
) -> Result<RunReport, ScenarioError> {
    info!(scenario = scenario.name(), "starting");
    let mut test = SimTest::new(cfg)
        .map_err(|err| ScenarioError::Config(format!("valid device configuration: {err}")))?;
    match scenario {
        Scenario::Overwrite => overwrite(cfg, &mut test, log)?,
        Scenario::BlockFill => block_fill(cfg, &mut test, log)?,
        Scenario::CapacityBound => capacity_bound(cfg, &mut test, log)?,
        Scenario::MinimalFirstGc => minimal_first_gc(cfg, &mut test, log)?,
        Scenario::WearLimit => wear_limit(cfg, &mut test, log)?,
        Scenario::TrimReuse => trim_reuse(cfg, &mut test, log)?,
    }
    let report = test.report(scoring, scenario.endurance_scored());
    write!(log, "{}", report.render())?;
    Ok(report)
}

// ── Shared steps ────────────────────────────────────────────────────────────

fn write_ok(test: &mut SimTest, lba: u64, value: u32) -> Result<(), ScenarioError> {
    check(test.write(Lba(lba), value)?, || {
        format!("write of lba {lba} was rejected")
    })
}

fn read_expect(test: &mut SimTest, lba: u64, expected: u32) -> Result<(), ScenarioError> {
    let got = test.read(Lba(lba))?;
    check(got == Some(expected), || {
        format!("lba {lba}: expected {expected}, got {got:?}")
    })
}

fn read_none(test: &mut SimTest, lba: u64) -> Result<(), ScenarioError> {
    let got = test.read(Lba(lba))?;
    check(got.is_none(), || {
        format!("lba {lba} should not be readable, got {got:?}")
    })
}

// ── Scenarios ───────────────────────────────────────────────────────────────

fn overwrite(
    cfg: &DeviceConfig,
    test: &mut SimTest,
    log: &mut dyn Write,
) -> Result<(), ScenarioError> {
    let max_lba = test.ftl().max_lba().0;
    write_ok(test, 0, 15746)?;
    write_ok(test, 0, MARKER)?;
    read_expect(test, 0, MARKER)?;

    // Nothing else was ever written.
    for probe in [1, u64::from(cfg.block_size), max_lba] {
        read_none(test, probe)?;
    }
    writeln!(log, "newest value wins; untouched pages stay unreadable")?;
    Ok(())
}

fn block_fill(
    cfg: &DeviceConfig,
    test: &mut SimTest,
    log: &mut dyn Write,
) -> Result<(), ScenarioError> {
    let mut rng = StdRng::seed_from_u64(SEED);
    let mut last = 0;
    for _ in 0..=cfg.block_size {
        last = rng.gen_range(0..VALUE_RANGE);
        write_ok(test, 0, last)?;
    }
    read_expect(test, 0, last)?;
    check(test.total_erases() == 0, || {
        format!(
            "filling one block must not collect, saw {} erases",
            test.total_erases()
        )
    })?;
    writeln!(
        log,
        "{} rewrites of one page absorbed without collection",
        cfg.block_size + 1
    )?;
    Ok(())
}

fn capacity_bound(
    cfg: &DeviceConfig,
    test: &mut SimTest,
    log: &mut dyn Write,
) -> Result<(), ScenarioError> {
    let geom = cfg
        .geometry()
        .map_err(|err| ScenarioError::Config(err.to_string()))?;
    let max_lba = cfg.max_lba(&geom).0;
    let raw_pages = u64::from(geom.num_pages());

    write_ok(test, 0, 1)?;
    write_ok(test, max_lba, 2)?;
    check(!test.write(Lba(raw_pages - 1), 0)?, || {
        "write into the reserved tail must be rejected".to_string()
    })?;
    check(!test.write(Lba(max_lba + 1), 0)?, || {
        "write past the advertised capacity must be rejected".to_string()
    })?;
    read_none(test, max_lba + 1)?;
    read_expect(test, max_lba, 2)?;
    writeln!(
        log,
        "capacity bounded at {} pages, {} raw",
        max_lba + 1,
        raw_pages
    )?;
    Ok(())
}

fn minimal_first_gc(
    cfg: &DeviceConfig,
    test: &mut SimTest,
    log: &mut dyn Write,
) -> Result<(), ScenarioError> {
    require(cfg.block_size == 200, "BLOCK_SIZE 200")?;
    require(cfg.plane_size == 8, "PLANE_SIZE 8")?;
    require(
        cfg.gc_policy == GcPolicyId::Lru,
        "the least-recently-used policy",
    )?;
    let geom = cfg
        .geometry()
        .map_err(|err| ScenarioError::Config(err.to_string()))?;
    let reserve = u64::from(cfg.num_op_blocks(&geom));
    require(
        reserve >= 3 && reserve < u64::from(cfg.block_size),
        "a small reserve of overprovisioned blocks",
    )?;

    let block_size = u64::from(cfg.block_size);
    let mut rng = StdRng::seed_from_u64(SEED);
    let mut touched = 0u64;
    let mut writes_before_trigger = 0u64;

    // Keep home 0 the most recently used: every round touches page 0 again,
    // so when the reserve runs dry the collector must consolidate the pair
    // whose home has been quiet the longest.
    while test.total_erases() == 0 {
        check(touched <= reserve, || {
            "reserve exhausted without any collection".to_string()
        })?;
        let live_pages = match touched {
            0 => block_size,
            1 => block_size - 1,
            _ => 2 + u64::from(rng.gen_range(0..u32::try_from(block_size - 3).expect("size"))),
        };

        let block_start = touched * block_size;
        for lba in block_start..block_start + live_pages {
            write_ok(test, lba, rng.gen_range(0..VALUE_RANGE))?;
            check(test.total_erases() == 0, || {
                format!("collection started during fresh writes of round {touched}")
            })?;
        }

        writes_before_trigger = test.total_writes();
        write_ok(test, block_start, MARKER)?;
        read_expect(test, block_start, MARKER)?;

        if test.total_erases() == 0 && touched != 0 {
            write_ok(test, 0, MARKER)?;
        }
        touched += 1;
    }
    writeln!(log, "collection after {touched} rounds")?;

    check(test.total_erases() == 3, || {
        format!(
            "first round must erase home, log, and cleaning blocks; saw {}",
            test.total_erases()
        )
    })?;
    check(touched > 1, || "collected before any pressure".to_string())?;
    let moved = test.total_writes() - writes_before_trigger - 1;
    check(moved == 2 * block_size, || {
        format!(
            "first round should relocate a full pair ({} pages), moved {moved}",
            2 * block_size
        )
    })?;

    // Replay the generation stream and verify every surviving page.
    let mut rng = StdRng::seed_from_u64(SEED);
    for round in 0..touched {
        let live_pages = match round {
            0 => block_size,
            1 => block_size - 1,
            _ => 2 + u64::from(rng.gen_range(0..u32::try_from(block_size - 3).expect("size"))),
        };
        let block_start = round * block_size;
        for lba in block_start..block_start + live_pages {
            let mut expected = rng.gen_range(0..VALUE_RANGE);
            if lba == block_start {
                expected = MARKER;
            }
            read_expect(test, lba, expected)?;
        }
        for lba in block_start + live_pages..block_start + block_size {
            read_none(test, lba)?;
        }
    }
    Ok(())
}

fn wear_limit(
    cfg: &DeviceConfig,
    test: &mut SimTest,
    log: &mut dyn Write,
) -> Result<(), ScenarioError> {
    require(cfg.block_size == 512, "BLOCK_SIZE 512")?;
    require(cfg.block_erase_count == 20, "BLOCK_ERASES 20")?;

    let block_size = u64::from(cfg.block_size);
    let passes = 2 + cfg.block_erase_count;
    for pass in 0..passes {
        for lba in (0..block_size).rev() {
            let erases_before = test.total_erases();
            let value = u32::try_from(lba).expect("block offset") << pass;
            write_ok(test, lba, value)?;
            if pass >= 2 && lba == block_size - 1 {
                let delta = test.total_erases() - erases_before;
                check((2..=3).contains(&delta), || {
                    format!("pass {pass} should start with one merge, saw {delta} erases")
                })?;
            }
            read_expect(test, lba, value)?;
        }
    }
    writeln!(log, "{passes} full-block passes completed")?;

    // The home block's budget is spent: nothing can consolidate the pair.
    for _ in 0..2 {
        check(!test.write(Lba(0), 0)?, || {
            "write must fail once the home block is worn out".to_string()
        })?;
    }
    check(test.any_block_worn_out(), || {
        "a block should have reached its erase limit".to_string()
    })?;

    let final_shift = passes - 1;
    for lba in 0..block_size {
        read_expect(
            test,
            lba,
            u32::try_from(lba).expect("block offset") << final_shift,
        )?;
    }
    writeln!(log, "all pages retain their pass-{final_shift} image")?;
    Ok(())
}

fn trim_reuse(
    cfg: &DeviceConfig,
    test: &mut SimTest,
    log: &mut dyn Write,
) -> Result<(), ScenarioError> {
    require(cfg.block_size == 8, "BLOCK_SIZE 8")?;

    let mut rng = StdRng::seed_from_u64(SEED);
    for _round in 0..8 {
        for lba in 0..u64::from(cfg.block_size) {
            test.trim(Lba(lba))?;
            let value = rng.gen_range(0..VALUE_RANGE);
            write_ok(test, lba, value)?;
            read_expect(test, lba, value)?;
            check(test.trim(Lba(lba))?, || {
                format!("trim of mapped lba {lba} reported failure")
            })?;
        }
    }
    writeln!(
        log,
        "64 write/trim cycles; {} physical writes, {} erases",
        test.total_writes(),
        test.total_erases()
    )?;
    Ok(())
}
