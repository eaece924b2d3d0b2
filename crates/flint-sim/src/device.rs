//! Simulated NAND device.
//!
//! An array of typed page slots with the reinforcing properties of real
//! flash: a slot must be written before it can be read, cannot be rewritten
//! without an intervening block erase, and every block carries a finite
//! erase budget that the device enforces on its own — a translation-layer
//! accounting bug shows up here as a hard error.

use crate::{Result, SimError};
use flint_types::{Geometry, Pbn, Ppn};
use tracing::trace;

/// Page payload. A word is enough to carry the test patterns.
pub type PageValue = u32;

#[derive(Debug)]
pub struct FlashDevice {
    slots: Vec<Option<PageValue>>,
    erases_remaining: Vec<u32>,
    block_size: u32,
}

impl FlashDevice {
    #[must_use]
    pub fn new(geom: &Geometry, block_erase_count: u32) -> Self {
        Self {
            slots: vec![None; geom.num_pages() as usize],
            erases_remaining: vec![block_erase_count; geom.num_blocks() as usize],
            block_size: geom.block_size(),
        }
    }

    /// Read a programmed slot.
    pub fn read(&self, ppn: Ppn) -> Result<PageValue> {
        self.slots[ppn.0 as usize].ok_or(SimError::InvalidRead(ppn))
    }

    /// Program an erased slot.
    pub fn write(&mut self, ppn: Ppn, value: PageValue) -> Result<()> {
        let slot = &mut self.slots[ppn.0 as usize];
        if slot.is_some() {
            return Err(SimError::WriteDirtyPage(ppn));
        }
        *slot = Some(value);
        Ok(())
    }

    /// Erase a whole block, consuming one cycle of its budget.
    pub fn erase_block(&mut self, pbn: Pbn) -> Result<()> {
        let remaining = &mut self.erases_remaining[pbn.0 as usize];
        if *remaining == 0 {
            return Err(SimError::BlockWornOut(pbn));
        }
        *remaining -= 1;
        let start = (pbn.0 * self.block_size) as usize;
        for slot in &mut self.slots[start..start + self.block_size as usize] {
            *slot = None;
        }
        trace!(block = pbn.0, remaining = *remaining, "erased block");
        Ok(())
    }

    #[must_use]
    pub fn erases_remaining(&self, pbn: Pbn) -> u32 {
        self.erases_remaining[pbn.0 as usize]
    }

    /// True if some block has exhausted its erase budget.
    #[must_use]
    pub fn any_block_worn_out(&self) -> bool {
        self.erases_remaining.iter().any(|&r| r == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> FlashDevice {
        let geom = Geometry::new(1, 1, 1, 4, 8).unwrap();
        FlashDevice::new(&geom, 2)
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut dev = device();
        dev.write(Ppn(5), 746).unwrap();
        assert_eq!(dev.read(Ppn(5)), Ok(746));
    }

    #[test]
    fn clean_pages_cannot_be_read() {
        let dev = device();
        assert_eq!(dev.read(Ppn(0)), Err(SimError::InvalidRead(Ppn(0))));
    }

    #[test]
    fn dirty_pages_cannot_be_rewritten() {
        let mut dev = device();
        dev.write(Ppn(0), 1).unwrap();
        assert_eq!(dev.write(Ppn(0), 2), Err(SimError::WriteDirtyPage(Ppn(0))));
    }

    #[test]
    fn erase_frees_the_block_and_spends_budget() {
        let mut dev = device();
        dev.write(Ppn(0), 1).unwrap();
        dev.write(Ppn(7), 2).unwrap();
        dev.erase_block(Pbn(0)).unwrap();
        assert_eq!(dev.read(Ppn(0)), Err(SimError::InvalidRead(Ppn(0))));
        dev.write(Ppn(0), 3).unwrap();
        assert_eq!(dev.erases_remaining(Pbn(0)), 1);

        dev.erase_block(Pbn(0)).unwrap();
        assert!(dev.any_block_worn_out());
        assert_eq!(dev.erase_block(Pbn(0)), Err(SimError::BlockWornOut(Pbn(0))));
    }
}
