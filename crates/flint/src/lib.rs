#![forbid(unsafe_code)]
//! FlintFTL public API facade.
//!
//! Re-exports the translation core through a stable external interface.
//! This is the crate downstream consumers (simulator, harness) depend on.

pub use flint_core::*;
