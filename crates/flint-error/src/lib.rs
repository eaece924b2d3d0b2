#![forbid(unsafe_code)]
//! Error types for the FlintFTL runtime.
//!
//! Defines `FtlError` and a `Result<T>` alias used by the translation core.
//! Recoverable kinds map to a `FAILURE` status at the controller boundary;
//! `Internal` indicates a broken invariant and is terminal for the run.

use flint_types::{Lba, Pbn};
use thiserror::Error;

/// Unified error type for FTL translate operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FtlError {
    #[error("LBA {lba} beyond device capacity (max {max})")]
    OutOfRangeLba { lba: Lba, max: Lba },

    #[error("LBA {0} has never been written or was trimmed")]
    UnreadPage(Lba),

    #[error("no free block available and garbage collection cannot reclaim one")]
    NoSpace,

    #[error("block {0} has no erase cycles remaining")]
    WearExhausted(Pbn),

    #[error("internal invariant violated: {0}")]
    Internal(&'static str),
}

impl FtlError {
    /// Whether the caller may treat this as an ordinary failed request.
    ///
    /// Non-recoverable errors signal an implementation bug; the hosting
    /// process is expected to abort rather than continue on corrupt state.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}

/// Result alias using `FtlError`.
pub type Result<T> = std::result::Result<T, FtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_classification() {
        assert!(FtlError::NoSpace.is_recoverable());
        assert!(FtlError::WearExhausted(Pbn(3)).is_recoverable());
        assert!(FtlError::UnreadPage(Lba(0)).is_recoverable());
        assert!(!FtlError::Internal("bad state").is_recoverable());
    }

    #[test]
    fn messages_name_the_subject() {
        let err = FtlError::OutOfRangeLba {
            lba: Lba(900),
            max: Lba(899),
        };
        assert!(err.to_string().contains("900"));
        assert!(err.to_string().contains("899"));
    }
}
