//! Per-block erase budget.

use flint_error::{FtlError, Result};
use flint_types::Pbn;

/// Remaining erase cycles for every block.
///
/// The ledger mirrors the device's own wear enforcement; the GC consults it
/// before emitting any `ERASE` so a worn victim fails the request instead of
/// aborting the run.
#[derive(Debug, Clone)]
pub struct WearLedger {
    remaining: Vec<u32>,
}

impl WearLedger {
    #[must_use]
    pub fn new(num_blocks: u32, block_erase_count: u32) -> Self {
        Self {
            remaining: vec![block_erase_count; num_blocks as usize],
        }
    }

    #[must_use]
    pub fn can_erase(&self, pbn: Pbn) -> bool {
        self.remaining[pbn.0 as usize] > 0
    }

    /// Consume one erase cycle.
    pub fn record_erase(&mut self, pbn: Pbn) -> Result<()> {
        let slot = &mut self.remaining[pbn.0 as usize];
        if *slot == 0 {
            return Err(FtlError::WearExhausted(pbn));
        }
        *slot -= 1;
        Ok(())
    }

    #[must_use]
    pub fn remaining_life(&self, pbn: Pbn) -> u32 {
        self.remaining[pbn.0 as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_down_to_exhaustion() {
        let mut ledger = WearLedger::new(2, 2);
        assert!(ledger.can_erase(Pbn(0)));
        ledger.record_erase(Pbn(0)).unwrap();
        ledger.record_erase(Pbn(0)).unwrap();
        assert!(!ledger.can_erase(Pbn(0)));
        assert_eq!(ledger.remaining_life(Pbn(0)), 0);
        assert_eq!(
            ledger.record_erase(Pbn(0)),
            Err(FtlError::WearExhausted(Pbn(0)))
        );
        // Other blocks keep their own budget.
        assert_eq!(ledger.remaining_life(Pbn(1)), 2);
    }
}
