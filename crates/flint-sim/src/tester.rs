//! Logical test driver and per-run accounting.
//!
//! `SimTest` wraps a controller with request counters and renders the
//! end-of-run report: raw counts, internal write amplification, and the
//! weighted endurance/amplification/memory sub-scores when the
//! configuration carries scoring keys.

use crate::controller::{Controller, OpCounters};
use crate::device::PageValue;
use crate::Result;
use flint_config::{ConfigError, DeviceConfig, ScoringConfig};
use flint_core::FtlCore;
use flint_types::{ExecState, Lba};
use serde::Serialize;
use tracing::debug;

pub struct SimTest {
    ctrl: Controller,
    writes_requested: u64,
    writes_done: u64,
    trims_requested: u64,
    trims_done: u64,
}

impl SimTest {
    pub fn new(cfg: &DeviceConfig) -> std::result::Result<Self, ConfigError> {
        let ftl = FtlCore::new(cfg)?;
        Ok(Self {
            ctrl: Controller::new(ftl, cfg.block_erase_count),
            writes_requested: 0,
            writes_done: 0,
            trims_requested: 0,
            trims_done: 0,
        })
    }

    /// Write `value` at `lba`. `Ok(true)` on success, `Ok(false)` when the
    /// FTL rejects the request, `Err` on a protocol violation.
    pub fn write(&mut self, lba: Lba, value: PageValue) -> Result<bool> {
        self.writes_requested += 1;
        let state = self.ctrl.write_lba(lba, value)?;
        let ok = state == ExecState::Success;
        if ok {
            self.writes_done += 1;
        } else {
            debug!(lba = lba.0, "not writable");
        }
        Ok(ok)
    }

    /// Read `lba`. `Ok(Some(value))` on success, `Ok(None)` on failure.
    pub fn read(&mut self, lba: Lba) -> Result<Option<PageValue>> {
        let (_, value) = self.ctrl.read_lba(lba)?;
        if value.is_none() {
            debug!(lba = lba.0, "not readable");
        }
        Ok(value)
    }

    pub fn trim(&mut self, lba: Lba) -> Result<bool> {
        self.trims_requested += 1;
        let ok = self.ctrl.trim_lba(lba)? == ExecState::Success;
        if ok {
            self.trims_done += 1;
        }
        Ok(ok)
    }

    // ── Observation ─────────────────────────────────────────────────────

    #[must_use]
    pub fn total_writes(&self) -> u64 {
        self.ctrl.counters().writes
    }

    #[must_use]
    pub fn total_erases(&self) -> u64 {
        self.ctrl.counters().erases
    }

    #[must_use]
    pub fn counters(&self) -> OpCounters {
        self.ctrl.counters()
    }

    #[must_use]
    pub fn ftl(&self) -> &FtlCore {
        self.ctrl.ftl()
    }

    #[must_use]
    pub fn any_block_worn_out(&self) -> bool {
        self.ctrl.device().any_block_worn_out()
    }

    /// Build the end-of-run report. `endurance_scored` selects the weight
    /// set for runs that push the device to its wear limit.
    #[must_use]
    pub fn report(&self, scoring: Option<&ScoringConfig>, endurance_scored: bool) -> RunReport {
        let counters = self.ctrl.counters();
        let write_amplification = if self.writes_done == 0 {
            0.0
        } else {
            counters.writes as f64 / self.writes_done as f64
        };
        let memory_bytes = self.ctrl.ftl().working_set_bytes() as u64;
        let scores = scoring.map(|weights| {
            Scores::compute(
                weights,
                endurance_scored,
                self.writes_done,
                write_amplification,
                memory_bytes,
            )
        });
        RunReport {
            writes_requested: self.writes_requested,
            writes_done: self.writes_done,
            trims_requested: self.trims_requested,
            trims_done: self.trims_done,
            physical_reads: counters.reads,
            physical_writes: counters.writes,
            physical_erases: counters.erases,
            write_amplification,
            memory_bytes,
            scores,
        }
    }

}

// ── Report ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Scores {
    pub endurance: f64,
    pub amplification: f64,
    pub memory: f64,
    pub total: u64,
    pub out_of: u64,
}

impl Scores {
    fn compute(
        weights: &ScoringConfig,
        endurance_scored: bool,
        writes_done: u64,
        write_amplification: f64,
        memory_bytes: u64,
    ) -> Self {
        let amp_ratio = if write_amplification > 0.0 {
            (weights.write_amplification_threshold / write_amplification).min(1.0)
        } else {
            1.0
        };
        let mem_ratio = (weights.memory_baseline as f64 / memory_bytes.max(1) as f64).min(1.0);

        if endurance_scored {
            let endurance_ratio = (writes_done as f64 * weights.writes_threshold
                / weights.writes_baseline.max(1) as f64)
                .min(1.0);
            let endurance = weights.weight_endurance_infinite as f64 * endurance_ratio;
            let amplification = weights.weight_write_amplification_infinite as f64 * amp_ratio;
            let memory = weights.weight_memory_infinite as f64 * mem_ratio;
            Self {
                endurance,
                amplification,
                memory,
                total: (endurance + amplification + memory) as u64,
                out_of: weights.weight_endurance_infinite
                    + weights.weight_write_amplification_infinite
                    + weights.weight_memory_infinite,
            }
        } else {
            let amplification = weights.weight_write_amplification_finite as f64 * amp_ratio;
            let memory = weights.weight_memory_finite as f64 * mem_ratio;
            Self {
                endurance: 0.0,
                amplification,
                memory,
                total: (amplification + memory) as u64,
                out_of: weights.weight_write_amplification_finite + weights.weight_memory_finite,
            }
        }
    }
}

/// Per-run accounting, printable and serialisable.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RunReport {
    pub writes_requested: u64,
    pub writes_done: u64,
    pub trims_requested: u64,
    pub trims_done: u64,
    pub physical_reads: u64,
    pub physical_writes: u64,
    pub physical_erases: u64,
    pub write_amplification: f64,
    pub memory_bytes: u64,
    pub scores: Option<Scores>,
}

impl RunReport {
    /// Render the report in the log format consumed by graders.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("-----------------------------------------------------\n");
        out.push_str(&format!("WRITES REQUESTED = {}\n", self.writes_requested));
        out.push_str(&format!("WRITES DONE = {}\n", self.writes_done));
        out.push_str(&format!(
            "INTERNAL WRITE_AMPLIFICATION = {:.6}\n",
            self.write_amplification
        ));
        out.push_str(&format!("TRIMS REQUESTED = {}\n", self.trims_requested));
        out.push_str(&format!("TRIMS DONE = {}\n", self.trims_done));
        out.push_str("-----------------------------------------------------\n");
        if let Some(scores) = &self.scores {
            out.push_str(&format!("Endurance Score: {:.2}\n", scores.endurance));
            out.push_str(&format!("Amp Score: {:.2}\n", scores.amplification));
            out.push_str(&format!("Mem Score: {:.2}\n", scores.memory));
            out.push_str(&format!(
                "Total Score: {}/{}\n",
                scores.total, scores.out_of
            ));
        }
        out
    }
}
