//! Translate dispatcher.
//!
//! `FtlCore` owns every table and exposes the three logical operations. A
//! write lands on its canonical home page when that page is still erased;
//! otherwise it appends to the home's log block, allocating one from the
//! free pool (merging a victim pair on demand when the pool is empty) or
//! merging its own pair first when the log is full.
//!
//! Strictly single-threaded, one outstanding command: callbacks emitted
//! during a call are driven to completion by the caller before the next
//! call begins, so no state is ever observed mid-transition.

use crate::gc::{GcStats, MergeCtx};
use crate::map::MapTables;
use crate::pairs::{PairEntry, PairTable};
use crate::policy::{VictimCandidate, VictimPolicy};
use crate::pool::FreePool;
use crate::wear::WearLedger;
use flint_config::{ConfigError, DeviceConfig};
use flint_error::{FtlError, Result};
use flint_types::{Address, ExecCallback, Geometry, Lba, Pbn, Ppn};
use tracing::{debug, info};

/// The flash translation layer.
pub struct FtlCore {
    geom: Geometry,
    num_data_blocks: u32,
    num_data_pages: u64,
    map: MapTables,
    wear: WearLedger,
    pool: FreePool,
    pairs: PairTable,
    policy: VictimPolicy,
    /// Logical write clock; drives policy recency and ages.
    clock: u64,
    stats: GcStats,
}

impl FtlCore {
    pub fn new(cfg: &DeviceConfig) -> std::result::Result<Self, ConfigError> {
        let geom = cfg.geometry()?;
        let num_data_blocks = cfg.num_data_blocks(&geom);
        if num_data_blocks == 0 {
            return Err(ConfigError::Geometry(
                flint_types::GeometryError::NoDataBlocks {
                    pct: cfg.overprovisioning_pct,
                },
            ));
        }
        let num_data_pages = u64::from(num_data_blocks) * u64::from(geom.block_size());
        let pool = FreePool::new(num_data_blocks, geom.num_blocks());

        info!(
            packages = cfg.ssd_size,
            dies = cfg.package_size,
            planes = cfg.die_size,
            blocks_per_plane = cfg.plane_size,
            pages_per_block = cfg.block_size,
            erase_budget = cfg.block_erase_count,
            data_blocks = num_data_blocks,
            reserved_blocks = geom.num_blocks() - num_data_blocks,
            policy = ?cfg.gc_policy,
            "flash translation layer initialised"
        );

        Ok(Self {
            geom,
            num_data_blocks,
            num_data_pages,
            map: MapTables::new(
                num_data_pages,
                geom.num_pages(),
                geom.num_blocks(),
                geom.block_size(),
            ),
            wear: WearLedger::new(geom.num_blocks(), cfg.block_erase_count),
            pool,
            pairs: PairTable::new(num_data_blocks),
            policy: VictimPolicy::new(cfg.gc_policy, num_data_blocks),
            clock: 0,
            stats: GcStats::default(),
        })
    }

    #[must_use]
    pub fn geometry(&self) -> &Geometry {
        &self.geom
    }

    /// Largest valid LBA (closed interval).
    #[must_use]
    pub fn max_lba(&self) -> Lba {
        Lba(self.num_data_pages - 1)
    }

    #[must_use]
    pub fn gc_stats(&self) -> GcStats {
        self.stats
    }

    // ── Logical operations ──────────────────────────────────────────────

    /// Translate a logical read. No callbacks, no mutation.
    pub fn read_translate(&self, lba: Lba) -> Result<Address> {
        self.check_range(lba)?;
        let ppn = self.map.fwd(lba).ok_or(FtlError::UnreadPage(lba))?;
        Ok(self.geom.address_of(ppn))
    }

    /// Translate a logical write, running garbage collection as needed.
    ///
    /// Callbacks for any merge round are emitted before the translated
    /// address is returned; the caller performs exactly one `WRITE` against
    /// that address afterwards.
    pub fn write_translate(&mut self, lba: Lba, cb: &mut dyn ExecCallback) -> Result<Address> {
        self.check_range(lba)?;
        self.clock += 1;
        let now = self.clock;

        let block_size = u64::from(self.geom.block_size());
        let home = Pbn(u32::try_from(lba.0 / block_size).expect("range checked"));
        let offset = u32::try_from(lba.0 % block_size).expect("offset");
        let canonical = self.geom.page_in_block(home, offset);

        // Placement is re-evaluated after each merge: a merge either frees
        // the canonical page or dissolves the pair so a fresh log can be
        // opened. Three passes bound the dance.
        for _ in 0..3 {
            if !self.map.is_written(canonical) {
                self.map.map(lba, canonical);
                self.map.mark_written(canonical);
                self.policy.on_home_write(home, now);
                return Ok(self.geom.address_of(canonical));
            }

            let pair = self.pairs.get(home).copied();
            match pair {
                Some(entry) if entry.cursor < self.geom.block_size() => {
                    let dst = self.geom.page_in_block(entry.log_block, entry.cursor);
                    self.pairs
                        .get_mut(home)
                        .ok_or(FtlError::Internal("pair vanished"))?
                        .cursor += 1;
                    self.map.map(lba, dst);
                    self.map.mark_written(dst);
                    return Ok(self.geom.address_of(dst));
                }
                Some(entry) => {
                    // Log full: this pair must be consolidated before the
                    // write can be placed.
                    self.merge(home, &entry, cb)?;
                    self.stats.forced += 1;
                }
                None => {
                    if !self.pool.has_free() {
                        self.reclaim_one(now, cb)?;
                        self.stats.on_demand += 1;
                    }
                    let log_block = self
                        .pool
                        .take_free()
                        .ok_or(FtlError::Internal("free pool empty after reclaim"))?;
                    debug!(home = home.0, log = log_block.0, "opened log block");
                    self.pairs.insert(
                        home,
                        PairEntry {
                            log_block,
                            cursor: 0,
                            created_seq: now,
                        },
                    );
                    self.policy.on_log_allocated(home, now);
                }
            }
        }
        Err(FtlError::Internal("write placement did not converge"))
    }

    /// Mark a logical page as garbage. Idempotent.
    pub fn trim(&mut self, lba: Lba) -> Result<()> {
        self.check_range(lba)?;
        if let Some(ppn) = self.map.unmap(lba) {
            debug!(lba = lba.0, page = ppn.0, "trimmed");
        }
        Ok(())
    }

    /// Resident size of the translation tables, for memory accounting.
    #[must_use]
    pub fn working_set_bytes(&self) -> usize {
        use std::mem::size_of;
        let pages = self.geom.num_pages() as usize;
        let blocks = self.geom.num_blocks() as usize;
        self.map.num_lbas() * size_of::<u32>()
            + pages * size_of::<u32>()
            + pages.div_ceil(8)
            + blocks * (size_of::<u16>() + size_of::<u32>())
            + self.num_data_blocks as usize * size_of::<Option<PairEntry>>()
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn check_range(&self, lba: Lba) -> Result<()> {
        if lba.0 >= self.num_data_pages {
            return Err(FtlError::OutOfRangeLba {
                lba,
                max: self.max_lba(),
            });
        }
        Ok(())
    }

    fn merge(&mut self, home: Pbn, entry: &PairEntry, cb: &mut dyn ExecCallback) -> Result<()> {
        let mut ctx = MergeCtx {
            geom: &self.geom,
            map: &mut self.map,
            wear: &mut self.wear,
            pool: &mut self.pool,
            stats: &mut self.stats,
        };
        ctx.merge_pair(home, entry, cb)?;
        self.pairs.remove(home);
        Ok(())
    }

    /// Free one block by merging the policy's victim.
    ///
    /// A victim that cannot be erased fails the request; no other candidate
    /// is tried.
    fn reclaim_one(&mut self, now: u64, cb: &mut dyn ExecCallback) -> Result<()> {
        let candidates: Vec<VictimCandidate> = self
            .pairs
            .iter()
            .map(|(home, entry)| VictimCandidate {
                home,
                created_seq: entry.created_seq,
                live_pages: u32::from(self.map.live(home)) + u32::from(self.map.live(entry.log_block)),
            })
            .collect();
        let victim = self
            .policy
            .select_victim(candidates, now, 2 * self.geom.block_size())
            .ok_or(FtlError::NoSpace)?;
        debug!(victim = victim.0, "reclaiming");
        let entry = *self
            .pairs
            .get(victim)
            .ok_or(FtlError::Internal("victim has no pair entry"))?;
        self.merge(victim, &entry, cb)
    }

    // ── Diagnostics ─────────────────────────────────────────────────────

    /// Verify the cross-table invariants. Intended for tests and debugging;
    /// linear in the device size.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        let block_size = u64::from(self.geom.block_size());
        let mut mapped = 0usize;
        for raw in 0..self.num_data_pages {
            let lba = Lba(raw);
            let Some(ppn) = self.map.fwd(lba) else {
                continue;
            };
            mapped += 1;
            if self.map.rev(ppn) != Some(lba) {
                return Err(format!("rev[{ppn}] does not point back to lba {lba}"));
            }
            if !self.map.is_written(ppn) {
                return Err(format!("live page {ppn} not marked written"));
            }
            let block = self.geom.block_of_page(ppn);
            let home = Pbn(u32::try_from(raw / block_size).expect("range"));
            let in_pair_log = self
                .pairs
                .get(home)
                .is_some_and(|entry| entry.log_block == block);
            if block != home && !in_pair_log {
                return Err(format!(
                    "lba {lba} lives in block {block}, neither home {home} nor its log"
                ));
            }
        }

        let mut live_sum = 0usize;
        for raw in 0..self.geom.num_blocks() {
            let block = Pbn(raw);
            let mut counted = 0u16;
            for offset in 0..self.geom.block_size() {
                let ppn = self.geom.page_in_block(block, offset);
                if let Some(lba) = self.map.rev(ppn) {
                    if self.map.fwd(lba) != Some(ppn) {
                        return Err(format!("fwd[{lba}] does not point back to page {ppn}"));
                    }
                    counted += 1;
                }
            }
            if counted != self.map.live(block) {
                return Err(format!(
                    "block {block} live count {} but {counted} reverse entries",
                    self.map.live(block)
                ));
            }
            live_sum += usize::from(counted);
        }
        if live_sum != mapped {
            return Err(format!(
                "{live_sum} live pages across blocks but {mapped} mapped LBAs"
            ));
        }
        Ok(())
    }

    /// Remaining erase cycles of a block, for tests and reporting.
    #[must_use]
    pub fn remaining_erases(&self, block: Pbn) -> u32 {
        self.wear.remaining_life(block)
    }

    /// Physical page currently backing `lba`, if any.
    #[must_use]
    pub fn probe(&self, lba: Lba) -> Option<Ppn> {
        if lba.0 >= self.num_data_pages {
            return None;
        }
        self.map.fwd(lba)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use flint_config::GcPolicyId;
    use flint_types::{NullCallback, OpCode};

    /// Records callbacks and enforces the controller's buffer discipline:
    /// reads are buffered, each write drains the oldest read, and erases
    /// require an empty buffer.
    #[derive(Default)]
    struct Recorder {
        ops: Vec<(OpCode, Address)>,
        buffered: usize,
    }

    impl Recorder {
        fn count(&self, op: OpCode) -> usize {
            self.ops.iter().filter(|(o, _)| *o == op).count()
        }
    }

    impl ExecCallback for Recorder {
        fn exec(&mut self, op: OpCode, addr: Address) {
            match op {
                OpCode::Read => self.buffered += 1,
                OpCode::Write => {
                    assert!(self.buffered > 0, "write without a buffered read");
                    self.buffered -= 1;
                }
                OpCode::Erase => {
                    assert_eq!(self.buffered, 0, "erase with buffered reads");
                }
            }
            self.ops.push((op, addr));
        }
    }

    fn config(plane_size: u32, block_size: u32, erases: u32, op_pct: u32) -> DeviceConfig {
        DeviceConfig {
            ssd_size: 1,
            package_size: 1,
            die_size: 1,
            plane_size,
            block_size,
            block_erase_count: erases,
            overprovisioning_pct: op_pct,
            gc_policy: GcPolicyId::Lru,
        }
    }

    /// 10 blocks of 8 pages; 3 reserved (2 free logs + 1 cleaning).
    fn small() -> FtlCore {
        FtlCore::new(&config(10, 8, 100, 30)).unwrap()
    }

    #[test]
    fn fresh_write_lands_on_the_canonical_page() {
        let mut ftl = small();
        let addr = ftl.write_translate(Lba(11), &mut NullCallback).unwrap();
        assert_eq!(ftl.geometry().page_index(addr), Ppn(11));
        assert_eq!(ftl.read_translate(Lba(11)).unwrap(), addr);
        ftl.check_invariants().unwrap();
    }

    #[test]
    fn overwrite_is_redirected_to_a_log_block() {
        let mut ftl = small();
        ftl.write_translate(Lba(0), &mut NullCallback).unwrap();
        let addr = ftl.write_translate(Lba(0), &mut NullCallback).unwrap();
        // First reserved block (7) opens as the log.
        assert_eq!(ftl.geometry().page_index(addr), Ppn(7 * 8));
        assert_eq!(ftl.read_translate(Lba(0)).unwrap(), addr);
        ftl.check_invariants().unwrap();
    }

    #[test]
    fn reads_fail_for_unwritten_and_out_of_range() {
        let ftl = small();
        assert_eq!(
            ftl.read_translate(Lba(0)),
            Err(FtlError::UnreadPage(Lba(0)))
        );
        let max = ftl.max_lba();
        assert_eq!(
            ftl.read_translate(Lba(max.0 + 1)),
            Err(FtlError::OutOfRangeLba {
                lba: Lba(max.0 + 1),
                max
            })
        );
    }

    #[test]
    fn write_beyond_capacity_fails_without_side_effects() {
        let mut ftl = small();
        let max = ftl.max_lba();
        ftl.write_translate(max, &mut NullCallback).unwrap();
        let err = ftl.write_translate(Lba(max.0 + 1), &mut NullCallback);
        assert!(matches!(err, Err(FtlError::OutOfRangeLba { .. })));
        ftl.check_invariants().unwrap();
    }

    #[test]
    fn trim_is_idempotent_and_frees_the_mapping() {
        let mut ftl = small();
        ftl.write_translate(Lba(3), &mut NullCallback).unwrap();
        ftl.trim(Lba(3)).unwrap();
        assert_eq!(ftl.read_translate(Lba(3)), Err(FtlError::UnreadPage(Lba(3))));
        ftl.trim(Lba(3)).unwrap();
        assert!(ftl.trim(Lba(1_000_000)).is_err());
        ftl.check_invariants().unwrap();
    }

    #[test]
    fn rewrite_after_trim_goes_to_the_log() {
        let mut ftl = small();
        ftl.write_translate(Lba(5), &mut NullCallback).unwrap();
        ftl.trim(Lba(5)).unwrap();
        // The canonical page is dead, not free, until the pair merges.
        let addr = ftl.write_translate(Lba(5), &mut NullCallback).unwrap();
        assert_eq!(ftl.geometry().block_index(addr), Pbn(7));
        ftl.check_invariants().unwrap();
    }

    #[test]
    fn full_log_forces_a_two_erase_rebuild() {
        let mut ftl = small();
        let mut cb = Recorder::default();
        ftl.write_translate(Lba(0), &mut cb).unwrap();
        // Eight overwrites fill the log pair exactly.
        for _ in 0..8 {
            ftl.write_translate(Lba(0), &mut cb).unwrap();
        }
        assert_eq!(cb.count(OpCode::Erase), 0);

        // The ninth overwrite merges: home has no live pages, so the home
        // is rebuilt in place from the single live log page.
        let addr = ftl.write_translate(Lba(0), &mut cb).unwrap();
        assert_eq!(cb.count(OpCode::Erase), 2);
        assert_eq!(cb.count(OpCode::Write), 1);
        assert_eq!(cb.count(OpCode::Read), 1);
        // The write itself reopened a fresh log.
        assert_eq!(ftl.geometry().block_index(addr), Pbn(8));
        assert_eq!(ftl.gc_stats().forced, 1);
        ftl.check_invariants().unwrap();
    }

    #[test]
    fn live_home_pages_force_a_three_erase_cleaning_merge() {
        let mut ftl = small();
        let mut cb = Recorder::default();
        // Fill home block 0 with eight distinct LBAs, then overwrite one of
        // them eight times to fill the log.
        for lba in 0..8 {
            ftl.write_translate(Lba(lba), &mut cb).unwrap();
        }
        for _ in 0..8 {
            ftl.write_translate(Lba(0), &mut cb).unwrap();
        }
        assert_eq!(cb.count(OpCode::Erase), 0);

        let before_writes = cb.count(OpCode::Write);
        ftl.write_translate(Lba(0), &mut cb).unwrap();
        // All eight LBAs survive: staged out and copied back.
        assert_eq!(cb.count(OpCode::Erase), 3);
        assert_eq!(cb.count(OpCode::Write) - before_writes, 2 * 8);
        for lba in 1..8 {
            assert_eq!(ftl.probe(Lba(lba)), Some(Ppn(lba as u32)));
        }
        ftl.check_invariants().unwrap();
    }

    #[test]
    fn pool_exhaustion_reclaims_the_least_recently_used_pair() {
        // 2 free log blocks: pairs for homes 0 and 1 consume them; opening
        // a pair for home 2 must merge the stalest pair (home 0).
        let mut ftl = small();
        let mut cb = Recorder::default();
        for home in 0u64..3 {
            ftl.write_translate(Lba(home * 8), &mut cb).unwrap();
        }
        ftl.write_translate(Lba(0), &mut cb).unwrap(); // pair for home 0
        ftl.write_translate(Lba(8), &mut cb).unwrap(); // pair for home 1
        assert_eq!(cb.count(OpCode::Erase), 0);

        ftl.write_translate(Lba(16), &mut cb).unwrap(); // needs a pair: GC
        assert_eq!(ftl.gc_stats().on_demand, 1);
        // Home 0 still readable through its rebuilt canonical page.
        assert_eq!(ftl.probe(Lba(0)), Some(Ppn(0)));
        ftl.check_invariants().unwrap();
    }

    #[test]
    fn worn_out_home_fails_the_write_and_preserves_state() {
        // One erase per block: the first forced merge succeeds, the second
        // finds the home exhausted.
        let mut ftl = FtlCore::new(&config(10, 8, 1, 30)).unwrap();
        ftl.write_translate(Lba(0), &mut NullCallback).unwrap();
        for _ in 0..8 {
            ftl.write_translate(Lba(0), &mut NullCallback).unwrap();
        }
        // Merge #1: erases home 0 and its log.
        ftl.write_translate(Lba(0), &mut NullCallback).unwrap();
        assert_eq!(ftl.remaining_erases(Pbn(0)), 0);

        for _ in 0..7 {
            ftl.write_translate(Lba(0), &mut NullCallback).unwrap();
        }
        let before = ftl.probe(Lba(0));
        let err = ftl.write_translate(Lba(0), &mut NullCallback);
        assert_eq!(err, Err(FtlError::WearExhausted(Pbn(0))));
        assert_eq!(ftl.probe(Lba(0)), before);
        // Failing again is stable.
        assert_eq!(
            ftl.write_translate(Lba(0), &mut NullCallback),
            Err(FtlError::WearExhausted(Pbn(0)))
        );
        ftl.check_invariants().unwrap();
    }

    #[test]
    fn no_reserved_blocks_means_overwrites_fail() {
        let mut ftl = FtlCore::new(&config(4, 8, 10, 0)).unwrap();
        ftl.write_translate(Lba(0), &mut NullCallback).unwrap();
        assert_eq!(
            ftl.write_translate(Lba(0), &mut NullCallback),
            Err(FtlError::NoSpace)
        );
    }

    #[test]
    fn working_set_scales_with_geometry() {
        let small_ftl = small();
        let large_ftl = FtlCore::new(&config(64, 64, 10, 10)).unwrap();
        assert!(large_ftl.working_set_bytes() > small_ftl.working_set_bytes());
        assert!(small_ftl.working_set_bytes() > 0);
    }
}
