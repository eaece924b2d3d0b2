//! Merge rounds.
//!
//! A merge reclaims the log block of one home/log pair and leaves the home
//! block holding every surviving page at its canonical offset. Two shapes:
//!
//! * **Rebuild in place** — the home holds no live pages, so it is erased
//!   first and the log's live pages are copied straight in. Two erases.
//! * **Cleaning merge** — live pages remain in the home. The merged image
//!   is staged in the dedicated cleaning block, home and log are erased,
//!   the image is copied back, and the cleaning block is erased again.
//!   Three erases, two copy writes per surviving page.
//!
//! Every `WRITE` is immediately preceded by the `READ` of the page being
//! moved, and the controller buffer is empty at each `ERASE`. Wear is
//! prechecked for all blocks a round will erase before the first callback,
//! so a failed round leaves no trace.

use crate::map::MapTables;
use crate::pairs::PairEntry;
use crate::pool::FreePool;
use crate::wear::WearLedger;
use flint_error::{FtlError, Result};
use flint_types::{ExecCallback, Geometry, Lba, OpCode, Pbn, Ppn};
use serde::Serialize;
use tracing::{debug, trace};

/// Counters for the run so far.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct GcStats {
    pub rounds: u64,
    pub pages_copied: u64,
    pub blocks_erased: u64,
    /// Rounds forced by a full pair log.
    pub forced: u64,
    /// Rounds triggered by an empty free pool.
    pub on_demand: u64,
}

pub(crate) struct MergeCtx<'a> {
    pub geom: &'a Geometry,
    pub map: &'a mut MapTables,
    pub wear: &'a mut WearLedger,
    pub pool: &'a mut FreePool,
    pub stats: &'a mut GcStats,
}

impl MergeCtx<'_> {
    /// Merge `home` with its log `entry`, returning the log block to the
    /// free pool. The caller removes the pair table entry on success.
    pub(crate) fn merge_pair(
        &mut self,
        home: Pbn,
        entry: &PairEntry,
        cb: &mut dyn ExecCallback,
    ) -> Result<()> {
        let log = entry.log_block;
        let live_home = self.map.live(home);
        let live_log = self.map.live(log);
        debug!(
            home = home.0,
            log = log.0,
            live_home,
            live_log,
            "merging pair"
        );

        if live_home == 0 {
            self.rebuild_in_place(home, entry, cb)?;
        } else {
            self.cleaning_merge(home, log, cb)?;
        }
        self.pool.return_free(log);
        self.stats.rounds += 1;
        Ok(())
    }

    fn rebuild_in_place(
        &mut self,
        home: Pbn,
        entry: &PairEntry,
        cb: &mut dyn ExecCallback,
    ) -> Result<()> {
        let log = entry.log_block;
        self.precheck_wear(&[home, log])?;

        // Home first: its pages are all dead, and the log copies need the
        // canonical pages to be programmable.
        self.erase(home, cb)?;
        for offset in 0..entry.cursor {
            let src = self.geom.page_in_block(log, offset);
            let Some(lba) = self.map.rev(src) else {
                continue;
            };
            let dst = self.canonical_page(lba);
            self.move_page(lba, src, dst, cb);
        }
        self.erase(log, cb)
    }

    fn cleaning_merge(&mut self, home: Pbn, log: Pbn, cb: &mut dyn ExecCallback) -> Result<()> {
        let cleaning = self.pool.cleaning().ok_or(FtlError::NoSpace)?;
        self.precheck_wear(&[home, log, cleaning])?;

        let block_size = self.geom.block_size();
        let base = u64::from(home.0) * u64::from(block_size);

        // Stage the newest version of every surviving offset in the
        // cleaning block.
        let mut staged = Vec::new();
        for offset in 0..block_size {
            let lba = Lba(base + u64::from(offset));
            let Some(src) = self.map.fwd(lba) else {
                continue;
            };
            let dst = self.geom.page_in_block(cleaning, offset);
            self.move_page(lba, src, dst, cb);
            staged.push(offset);
        }

        self.erase(home, cb)?;
        self.erase(log, cb)?;

        // Copy the image back to its canonical pages.
        for &offset in &staged {
            let lba = Lba(base + u64::from(offset));
            let src = self.geom.page_in_block(cleaning, offset);
            let dst = self.geom.page_in_block(home, offset);
            self.move_page(lba, src, dst, cb);
        }
        self.erase(cleaning, cb)
    }

    fn precheck_wear(&self, blocks: &[Pbn]) -> Result<()> {
        for &block in blocks {
            if !self.wear.can_erase(block) {
                return Err(FtlError::WearExhausted(block));
            }
        }
        Ok(())
    }

    /// Relocate one live page: paired `READ`/`WRITE` plus the map update.
    fn move_page(&mut self, lba: Lba, src: Ppn, dst: Ppn, cb: &mut dyn ExecCallback) {
        cb.exec(OpCode::Read, self.geom.address_of(src));
        cb.exec(OpCode::Write, self.geom.address_of(dst));
        self.map.map(lba, dst);
        self.map.mark_written(dst);
        self.stats.pages_copied += 1;
        trace!(lba = lba.0, from = src.0, to = dst.0, "moved page");
    }

    fn erase(&mut self, block: Pbn, cb: &mut dyn ExecCallback) -> Result<()> {
        cb.exec(OpCode::Erase, self.geom.address_of_block(block));
        self.wear.record_erase(block)?;
        self.map.clear_block(block);
        self.stats.blocks_erased += 1;
        Ok(())
    }

    fn canonical_page(&self, lba: Lba) -> Ppn {
        let block_size = u64::from(self.geom.block_size());
        let home = Pbn(u32::try_from(lba.0 / block_size).expect("validated lba"));
        self.geom
            .page_in_block(home, u32::try_from(lba.0 % block_size).expect("offset"))
    }
}
