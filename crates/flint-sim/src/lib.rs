#![forbid(unsafe_code)]
//! NAND-flash collaborator for FlintFTL.
//!
//! Three layers:
//!
//! 1. [`device`] — typed page slots with erase-before-write semantics and
//!    an independent per-block erase ceiling.
//! 2. [`controller`] — drives the FTL's translate calls, executes its
//!    callbacks against the device through a FIFO page buffer, and enforces
//!    the command protocol.
//! 3. [`tester`] — logical read/write/trim driver with per-run accounting
//!    and the scoring report.
//!
//! Protocol violations are implementation bugs; they surface as `SimError`
//! and terminate the run.

pub mod controller;
pub mod device;
pub mod tester;

use flint_types::{Lba, Pbn, Ppn};
use thiserror::Error;

/// Fatal simulator-side errors.
///
/// Unlike an ordinary `FAILURE` status, any of these means the FTL broke
/// the physical contract and the run cannot continue.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimError {
    #[error("read of page {0} which was never written since its last erase")]
    InvalidRead(Ppn),

    #[error("write to dirty page {0}")]
    WriteDirtyPage(Ppn),

    #[error("erase of worn-out block {0}")]
    BlockWornOut(Pbn),

    #[error("erase issued while {0} read results are still buffered")]
    EraseWithBufferedReads(usize),

    #[error("write issued with an empty page buffer")]
    WriteWithEmptyBuffer,

    #[error("page buffer holds {0} entries after a translate call returned")]
    BufferNotDrained(usize),

    #[error("translate call for LBA {0} reported an unrecoverable error: {1}")]
    FtlInternal(Lba, String),
}

/// Result alias for simulator operations.
pub type Result<T> = std::result::Result<T, SimError>;

pub use controller::Controller;
pub use device::FlashDevice;
pub use tester::{RunReport, SimTest};
