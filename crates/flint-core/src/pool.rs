//! Erased-block pool.
//!
//! Seeded at construction with the overprovisioned tail of the block range.
//! The last block is carved out as the dedicated cleaning block used for GC
//! transit; the rest form a FIFO of erased blocks ready to open as logs.

use flint_types::Pbn;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct FreePool {
    free: VecDeque<Pbn>,
    cleaning: Option<Pbn>,
}

impl FreePool {
    /// Build the pool from the overprovisioned range `[first_op, num_blocks)`.
    #[must_use]
    pub fn new(first_op: u32, num_blocks: u32) -> Self {
        let mut free: VecDeque<Pbn> = (first_op..num_blocks).map(Pbn).collect();
        let cleaning = if free.len() >= 2 {
            free.pop_back()
        } else {
            // Degenerate shapes keep every reserved block in the queue;
            // merges that need transit space will report no-space instead.
            None
        };
        Self { free, cleaning }
    }

    pub fn take_free(&mut self) -> Option<Pbn> {
        self.free.pop_front()
    }

    /// Requeue a block after a successful erase.
    pub fn return_free(&mut self, pbn: Pbn) {
        debug_assert!(!self.free.contains(&pbn));
        debug_assert_ne!(Some(pbn), self.cleaning);
        self.free.push_back(pbn);
    }

    #[must_use]
    pub fn has_free(&self) -> bool {
        !self.free.is_empty()
    }

    #[must_use]
    pub fn count_free(&self) -> usize {
        self.free.len()
    }

    #[must_use]
    pub fn cleaning(&self) -> Option<Pbn> {
        self.cleaning
    }
}
