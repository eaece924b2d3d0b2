//! Forward and reverse mapping tables.
//!
//! Three coherent structures sized once at construction:
//!
//! * `fwd` — LBA to physical page, or none.
//! * `rev` — physical page to LBA, or none.
//! * `live` — per-block count of pages with a reverse entry.
//!
//! Entries are stored as `Option<NonZeroU32>` holding `index + 1`, giving a
//! four-byte slot with an explicit absent state. A separate written bitmap
//! records which pages have been programmed since their block's last erase;
//! it is what distinguishes a *free* page from a *dead* one.

use flint_types::{Lba, Pbn, Ppn};
use std::num::NonZeroU32;

#[derive(Debug, Clone)]
pub struct MapTables {
    fwd: Vec<Option<NonZeroU32>>,
    rev: Vec<Option<NonZeroU32>>,
    live: Vec<u16>,
    written: Vec<u64>,
    block_size: u32,
}

fn pack(index: u32) -> Option<NonZeroU32> {
    // index + 1 cannot wrap: indices are bounded by num_pages <= u32::MAX.
    NonZeroU32::new(index + 1)
}

fn unpack(slot: Option<NonZeroU32>) -> Option<u32> {
    slot.map(|value| value.get() - 1)
}

impl MapTables {
    #[must_use]
    pub fn new(num_lbas: u64, num_pages: u32, num_blocks: u32, block_size: u32) -> Self {
        let lba_slots = usize::try_from(num_lbas).expect("logical space fits in memory");
        Self {
            fwd: vec![None; lba_slots],
            rev: vec![None; num_pages as usize],
            live: vec![0; num_blocks as usize],
            written: vec![0; (num_pages as usize).div_ceil(64)],
            block_size,
        }
    }

    #[must_use]
    pub fn fwd(&self, lba: Lba) -> Option<Ppn> {
        unpack(self.fwd[usize::try_from(lba.0).expect("validated lba")]).map(Ppn)
    }

    #[must_use]
    pub fn rev(&self, ppn: Ppn) -> Option<Lba> {
        unpack(self.rev[ppn.0 as usize]).map(|raw| Lba(u64::from(raw)))
    }

    #[must_use]
    pub fn live(&self, pbn: Pbn) -> u16 {
        self.live[pbn.0 as usize]
    }

    /// Number of LBAs currently mapped.
    #[must_use]
    pub fn mapped_count(&self) -> usize {
        self.fwd.iter().filter(|slot| slot.is_some()).count()
    }

    #[must_use]
    pub fn num_lbas(&self) -> usize {
        self.fwd.len()
    }

    /// Point `lba` at `ppn`, retiring any previous mapping.
    ///
    /// Updates `fwd`, `rev`, and both blocks' live counts as one step so no
    /// caller can observe a half-applied transition.
    pub fn map(&mut self, lba: Lba, ppn: Ppn) {
        let lba_slot = usize::try_from(lba.0).expect("validated lba");
        if let Some(old) = unpack(self.fwd[lba_slot]) {
            debug_assert_eq!(unpack(self.rev[old as usize]), Some(lba.0 as u32));
            self.rev[old as usize] = None;
            self.dec_live(Ppn(old));
        }
        debug_assert!(
            self.rev[ppn.0 as usize].is_none(),
            "page {ppn} already owned by another LBA"
        );
        self.fwd[lba_slot] = pack(ppn.0);
        self.rev[ppn.0 as usize] = pack(u32::try_from(lba.0).expect("lba fits page width"));
        self.inc_live(ppn);
    }

    /// Drop the mapping for `lba`, returning the page it occupied.
    pub fn unmap(&mut self, lba: Lba) -> Option<Ppn> {
        let lba_slot = usize::try_from(lba.0).expect("validated lba");
        let old = unpack(self.fwd[lba_slot])?;
        self.fwd[lba_slot] = None;
        self.rev[old as usize] = None;
        self.dec_live(Ppn(old));
        Some(Ppn(old))
    }

    // ── Written bitmap ──────────────────────────────────────────────────

    #[must_use]
    pub fn is_written(&self, ppn: Ppn) -> bool {
        let idx = ppn.0 as usize;
        (self.written[idx / 64] >> (idx % 64)) & 1 == 1
    }

    pub fn mark_written(&mut self, ppn: Ppn) {
        let idx = ppn.0 as usize;
        debug_assert!(!self.is_written(ppn), "page {ppn} written twice");
        self.written[idx / 64] |= 1 << (idx % 64);
    }

    /// Reset a block after a physical erase.
    ///
    /// Precondition: the block has no live pages left.
    pub fn clear_block(&mut self, pbn: Pbn) {
        debug_assert_eq!(self.live(pbn), 0, "erasing block {pbn} with live pages");
        let start = pbn.0 * self.block_size;
        for page in start..start + self.block_size {
            debug_assert!(self.rev[page as usize].is_none());
            self.written[page as usize / 64] &= !(1u64 << (page % 64));
        }
    }

    fn inc_live(&mut self, ppn: Ppn) {
        let block = (ppn.0 / self.block_size) as usize;
        self.live[block] += 1;
        debug_assert!(u32::from(self.live[block]) <= self.block_size);
    }

    fn dec_live(&mut self, ppn: Ppn) {
        let block = (ppn.0 / self.block_size) as usize;
        debug_assert!(self.live[block] > 0);
        self.live[block] -= 1;
    }
}
