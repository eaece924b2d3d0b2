#![forbid(unsafe_code)]
//! Configuration parsing for FlintFTL.
//!
//! The harness consumes a line-oriented file: `#` starts a comment, each
//! non-empty line is one `KEY VALUE` pair. Duplicate keys and keys without a
//! value are errors. Device keys are mandatory for every run; scoring keys
//! are only required when a report is produced.

use flint_types::{Geometry, GeometryError, Lba};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

pub const KEY_SSD_SIZE: &str = "SSD_SIZE";
pub const KEY_PACKAGE_SIZE: &str = "PACKAGE_SIZE";
pub const KEY_DIE_SIZE: &str = "DIE_SIZE";
pub const KEY_PLANE_SIZE: &str = "PLANE_SIZE";
pub const KEY_BLOCK_SIZE: &str = "BLOCK_SIZE";
pub const KEY_BLOCK_ERASES: &str = "BLOCK_ERASES";
pub const KEY_OVERPROVISIONING: &str = "OVERPROVISIONING";
pub const KEY_GC_POLICY: &str = "SELECTED_GC_POLICY";

pub const KEY_MEMORY_BASELINE: &str = "MEMORY_BASELINE";
pub const KEY_WRITES_BASELINE: &str = "WRITES_BASELINE";
pub const KEY_WRITE_AMPLIFICATION_THRESHOLD: &str = "WRITE_AMPLIFICATION_THRESHOLD";
pub const KEY_WRITES_THRESHOLD: &str = "WRITES_THRESHOLD";
pub const KEY_WEIGHT_WRITE_AMPLIFICATION_INFINITE: &str = "WEIGHT_WRITE_AMPLIFICATION_INFINITE";
pub const KEY_WEIGHT_MEMORY_INFINITE: &str = "WEIGHT_MEMORY_INFINITE";
pub const KEY_WEIGHT_ENDURANCE_INFINITE: &str = "WEIGHT_ENDURANCE_INFINITE";
pub const KEY_WEIGHT_WRITE_AMPLIFICATION_FINITE: &str = "WEIGHT_WRITE_AMPLIFICATION_FINITE";
pub const KEY_WEIGHT_MEMORY_FINITE: &str = "WEIGHT_MEMORY_FINITE";

/// Configuration errors. All are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: key {key} defined more than once")]
    DuplicateKey { key: String, line: usize },

    #[error("line {line}: key {key} has no value")]
    MissingValue { key: String, line: usize },

    #[error("required key {0} is missing")]
    MissingKey(&'static str),

    #[error("key {key}: value {value:?} is not a valid number")]
    InvalidNumber { key: &'static str, value: String },

    #[error("unknown garbage collection policy id {0}")]
    UnknownPolicy(u64),

    #[error("invalid geometry: {0}")]
    Geometry(#[from] GeometryError),
}

/// Victim-selection strategy, keyed by the `SELECTED_GC_POLICY` id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GcPolicyId {
    /// Oldest pair wins.
    RoundRobin,
    /// Least-recently-written home block wins.
    Lru,
    /// Minimum live-page count wins.
    Greedy,
    /// Maximum `age * (1 - u) / (1 + u)` wins.
    CostBenefit,
}

impl GcPolicyId {
    pub fn from_id(id: u64) -> Result<Self, ConfigError> {
        match id {
            0 => Ok(Self::RoundRobin),
            1 => Ok(Self::Lru),
            2 => Ok(Self::Greedy),
            3 => Ok(Self::CostBenefit),
            other => Err(ConfigError::UnknownPolicy(other)),
        }
    }
}

// ── Raw key/value layer ─────────────────────────────────────────────────────

/// Parsed key/value pairs with their defining line numbers.
#[derive(Debug, Clone, Default)]
pub struct RawConfig {
    entries: HashMap<String, (String, usize)>,
}

impl RawConfig {
    pub fn parse_str(text: &str) -> Result<Self, ConfigError> {
        let mut entries = HashMap::new();
        for (idx, raw_line) in text.lines().enumerate() {
            let line = idx + 1;
            let content = match raw_line.split_once('#') {
                Some((before, _)) => before,
                None => raw_line,
            }
            .trim();
            if content.is_empty() {
                continue;
            }

            let mut parts = content.split_whitespace();
            let key = parts.next().expect("non-empty line has a first token");
            let Some(value) = parts.next() else {
                return Err(ConfigError::MissingValue {
                    key: key.to_string(),
                    line,
                });
            };
            if entries
                .insert(key.to_string(), (value.to_string(), line))
                .is_some()
            {
                return Err(ConfigError::DuplicateKey {
                    key: key.to_string(),
                    line,
                });
            }
        }
        Ok(Self { entries })
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse_str(&text)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|(value, _)| value.as_str())
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn require(&self, key: &'static str) -> Result<&str, ConfigError> {
        self.get(key).ok_or(ConfigError::MissingKey(key))
    }

    fn get_u64(&self, key: &'static str) -> Result<u64, ConfigError> {
        let value = self.require(key)?;
        value.parse().map_err(|_| ConfigError::InvalidNumber {
            key,
            value: value.to_string(),
        })
    }

    fn get_f64(&self, key: &'static str) -> Result<f64, ConfigError> {
        let value = self.require(key)?;
        value.parse().map_err(|_| ConfigError::InvalidNumber {
            key,
            value: value.to_string(),
        })
    }
}

// ── Device configuration ────────────────────────────────────────────────────

/// The eight construction-time scalars of the FTL.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Packages per device.
    pub ssd_size: u32,
    /// Dies per package.
    pub package_size: u32,
    /// Planes per die.
    pub die_size: u32,
    /// Blocks per plane.
    pub plane_size: u32,
    /// Pages per block.
    pub block_size: u32,
    /// Maximum erases per block.
    pub block_erase_count: u32,
    /// Reserved-block percentage.
    pub overprovisioning_pct: u32,
    /// Victim-selection strategy.
    pub gc_policy: GcPolicyId,
}

impl DeviceConfig {
    pub fn from_raw(raw: &RawConfig) -> Result<Self, ConfigError> {
        let policy_id = raw.get_u64(KEY_GC_POLICY)?;
        Ok(Self {
            ssd_size: narrow(raw.get_u64(KEY_SSD_SIZE)?, KEY_SSD_SIZE)?,
            package_size: narrow(raw.get_u64(KEY_PACKAGE_SIZE)?, KEY_PACKAGE_SIZE)?,
            die_size: narrow(raw.get_u64(KEY_DIE_SIZE)?, KEY_DIE_SIZE)?,
            plane_size: narrow(raw.get_u64(KEY_PLANE_SIZE)?, KEY_PLANE_SIZE)?,
            block_size: narrow(raw.get_u64(KEY_BLOCK_SIZE)?, KEY_BLOCK_SIZE)?,
            block_erase_count: narrow(raw.get_u64(KEY_BLOCK_ERASES)?, KEY_BLOCK_ERASES)?,
            overprovisioning_pct: narrow(raw.get_u64(KEY_OVERPROVISIONING)?, KEY_OVERPROVISIONING)?,
            gc_policy: GcPolicyId::from_id(policy_id)?,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        Self::from_raw(&RawConfig::from_path(path)?)
    }

    pub fn geometry(&self) -> Result<Geometry, ConfigError> {
        Ok(Geometry::new(
            self.ssd_size,
            self.package_size,
            self.die_size,
            self.plane_size,
            self.block_size,
        )?)
    }

    /// Overprovisioned block count, rounded to the nearest integer.
    #[must_use]
    pub fn num_op_blocks(&self, geometry: &Geometry) -> u32 {
        let blocks = u64::from(geometry.num_blocks());
        let rounded = (blocks * u64::from(self.overprovisioning_pct) + 50) / 100;
        u32::try_from(rounded.min(blocks)).expect("bounded by num_blocks")
    }

    #[must_use]
    pub fn num_data_blocks(&self, geometry: &Geometry) -> u32 {
        geometry.num_blocks() - self.num_op_blocks(geometry)
    }

    /// Largest valid LBA (closed interval).
    #[must_use]
    pub fn max_lba(&self, geometry: &Geometry) -> Lba {
        let data_pages = u64::from(self.num_data_blocks(geometry)) * u64::from(self.block_size);
        Lba(data_pages.saturating_sub(1))
    }
}

fn narrow(value: u64, key: &'static str) -> Result<u32, ConfigError> {
    u32::try_from(value).map_err(|_| ConfigError::InvalidNumber {
        key,
        value: value.to_string(),
    })
}

// ── Scoring configuration ───────────────────────────────────────────────────

/// Weighting and threshold fields used solely by the per-run report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub memory_baseline: u64,
    pub writes_baseline: u64,
    pub write_amplification_threshold: f64,
    pub writes_threshold: f64,
    pub weight_write_amplification_infinite: u64,
    pub weight_memory_infinite: u64,
    pub weight_endurance_infinite: u64,
    pub weight_write_amplification_finite: u64,
    pub weight_memory_finite: u64,
}

impl ScoringConfig {
    pub fn from_raw(raw: &RawConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            memory_baseline: raw.get_u64(KEY_MEMORY_BASELINE)?,
            writes_baseline: raw.get_u64(KEY_WRITES_BASELINE)?,
            write_amplification_threshold: raw.get_f64(KEY_WRITE_AMPLIFICATION_THRESHOLD)?,
            writes_threshold: raw.get_f64(KEY_WRITES_THRESHOLD)?,
            weight_write_amplification_infinite: raw
                .get_u64(KEY_WEIGHT_WRITE_AMPLIFICATION_INFINITE)?,
            weight_memory_infinite: raw.get_u64(KEY_WEIGHT_MEMORY_INFINITE)?,
            weight_endurance_infinite: raw.get_u64(KEY_WEIGHT_ENDURANCE_INFINITE)?,
            weight_write_amplification_finite: raw.get_u64(KEY_WEIGHT_WRITE_AMPLIFICATION_FINITE)?,
            weight_memory_finite: raw.get_u64(KEY_WEIGHT_MEMORY_FINITE)?,
        })
    }

    /// Scoring block if the file carries the scoring keys, `None` otherwise.
    pub fn from_raw_optional(raw: &RawConfig) -> Result<Option<Self>, ConfigError> {
        if raw.contains(KEY_MEMORY_BASELINE) {
            Self::from_raw(raw).map(Some)
        } else {
            Ok(None)
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    const GOOD: &str = "\
# device shape
SSD_SIZE 4
PACKAGE_SIZE 8
DIE_SIZE 2
PLANE_SIZE 10
BLOCK_SIZE 16   # pages per block
BLOCK_ERASES 100
OVERPROVISIONING 5
SELECTED_GC_POLICY 1
";

    #[test]
    fn parses_keys_comments_and_blank_lines() {
        let raw = RawConfig::parse_str(GOOD).unwrap();
        assert_eq!(raw.get(KEY_SSD_SIZE), Some("4"));
        assert_eq!(raw.get(KEY_BLOCK_SIZE), Some("16"));
        assert!(!raw.contains("device"));
    }

    #[test]
    fn device_config_and_derived_counts() {
        let raw = RawConfig::parse_str(GOOD).unwrap();
        let cfg = DeviceConfig::from_raw(&raw).unwrap();
        assert_eq!(cfg.gc_policy, GcPolicyId::Lru);

        let geom = cfg.geometry().unwrap();
        assert_eq!(geom.num_blocks(), 640);
        assert_eq!(cfg.num_op_blocks(&geom), 32);
        assert_eq!(cfg.num_data_blocks(&geom), 608);
        assert_eq!(cfg.max_lba(&geom), Lba(608 * 16 - 1));
    }

    #[test]
    fn duplicate_key_is_an_error() {
        let err = RawConfig::parse_str("A 1\nA 2\n").unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateKey { line: 2, .. }));
    }

    #[test]
    fn key_without_value_is_an_error() {
        let err = RawConfig::parse_str("SSD_SIZE\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingValue { line: 1, .. }));
    }

    #[test]
    fn missing_required_key_is_an_error() {
        let raw = RawConfig::parse_str("SSD_SIZE 4\n").unwrap();
        let err = DeviceConfig::from_raw(&raw).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(KEY_PACKAGE_SIZE)));
    }

    #[test]
    fn unknown_policy_is_an_error() {
        let text = GOOD.replace("SELECTED_GC_POLICY 1", "SELECTED_GC_POLICY 9");
        let raw = RawConfig::parse_str(&text).unwrap();
        assert!(matches!(
            DeviceConfig::from_raw(&raw),
            Err(ConfigError::UnknownPolicy(9))
        ));
    }

    #[test]
    fn op_rounding_is_to_nearest() {
        // 640 blocks at 5% -> 32 exactly; at 7% -> 44.8 rounds to 45.
        let raw = RawConfig::parse_str(&GOOD.replace("OVERPROVISIONING 5", "OVERPROVISIONING 7"))
            .unwrap();
        let cfg = DeviceConfig::from_raw(&raw).unwrap();
        let geom = cfg.geometry().unwrap();
        assert_eq!(cfg.num_op_blocks(&geom), 45);
    }

    #[test]
    fn scoring_block_is_optional() {
        let raw = RawConfig::parse_str(GOOD).unwrap();
        assert!(ScoringConfig::from_raw_optional(&raw).unwrap().is_none());

        let with_scoring = format!(
            "{GOOD}\
MEMORY_BASELINE 262144
WRITES_BASELINE 100000
WRITE_AMPLIFICATION_THRESHOLD 1.5
WRITES_THRESHOLD 1.1
WEIGHT_WRITE_AMPLIFICATION_INFINITE 30
WEIGHT_MEMORY_INFINITE 30
WEIGHT_ENDURANCE_INFINITE 40
WEIGHT_WRITE_AMPLIFICATION_FINITE 50
WEIGHT_MEMORY_FINITE 50
"
        );
        let raw = RawConfig::parse_str(&with_scoring).unwrap();
        let scoring = ScoringConfig::from_raw_optional(&raw).unwrap().unwrap();
        assert_eq!(scoring.weight_endurance_infinite, 40);
        assert!((scoring.write_amplification_threshold - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn reads_from_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(GOOD.as_bytes()).unwrap();
        let cfg = DeviceConfig::from_path(file.path()).unwrap();
        assert_eq!(cfg.ssd_size, 4);
    }
}
