#![forbid(unsafe_code)]
//! Shared types for FlintFTL.
//!
//! Defines the physical `Address` tuple, the device `Geometry` with its
//! bijective address codec, opcodes, execution status, and the unit-carrying
//! newtypes used across the workspace.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ── Identifier newtypes ─────────────────────────────────────────────────────

/// Logical block address: the external identifier for a page-sized unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Lba(pub u64);

/// Physical page number: linear page index in `[0, num_pages)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ppn(pub u32);

/// Physical block number: linear block index in `[0, num_blocks)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pbn(pub u32);

impl fmt::Display for Lba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Ppn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Pbn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Physical address ────────────────────────────────────────────────────────

/// Five-level physical address: package, die, plane, block, page.
///
/// Field widths match the controller callback encoding (8/8/16/16/16 bits)
/// and must not be widened without changing the wire format. Pages are the
/// atomic read/write unit; `ERASE` ignores the `page` field.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Address {
    pub package: u8,
    pub die: u8,
    pub plane: u16,
    pub block: u16,
    pub page: u16,
}

impl Address {
    #[must_use]
    pub fn new(package: u8, die: u8, plane: u16, block: u16, page: u16) -> Self {
        Self {
            package,
            die,
            plane,
            block,
            page,
        }
    }

    /// Block-level address (page zeroed), as used by `ERASE`.
    #[must_use]
    pub fn block_level(self) -> Self {
        Self { page: 0, ..self }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pkg {} die {} plane {} block {} page {}",
            self.package, self.die, self.plane, self.block, self.page
        )
    }
}

// ── Opcodes and execution status ────────────────────────────────────────────

/// Physical operation issued from the FTL to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum OpCode {
    /// Read a page into the controller buffer.
    Read = 0,
    /// Write the oldest buffered page out.
    Write = 1,
    /// Erase a block (page field ignored).
    Erase = 2,
}

/// Terminal status of a translate call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ExecState {
    Success = 0,
    Failure = 1,
}

/// Callback seam between the FTL and the controller.
///
/// The FTL holds no reference to the controller; the callback is passed into
/// each translate call and is only valid for its duration.
pub trait ExecCallback {
    fn exec(&mut self, op: OpCode, addr: Address);
}

/// Callback that drops every command. Useful for translate-only exercises
/// where no device is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCallback;

impl ExecCallback for NullCallback {
    fn exec(&mut self, _op: OpCode, _addr: Address) {}
}

// ── Geometry ────────────────────────────────────────────────────────────────

/// Validation failures for a device geometry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("geometry component {component} is zero")]
    ZeroComponent { component: &'static str },
    #[error("geometry component {component} = {value} exceeds its address width ({max})")]
    ComponentTooWide {
        component: &'static str,
        value: u64,
        max: u64,
    },
    #[error("device holds {pages} pages, more than the codec can index")]
    TooManyPages { pages: u64 },
    #[error("overprovisioning {pct}% leaves no data blocks")]
    NoDataBlocks { pct: u32 },
}

/// Immutable device shape plus the linear address codec.
///
/// Component names follow the device hierarchy: `ssd_size` packages per
/// device, `package_size` dies per package, `die_size` planes per die,
/// `plane_size` blocks per plane, `block_size` pages per block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    ssd_size: u32,
    package_size: u32,
    die_size: u32,
    plane_size: u32,
    block_size: u32,
    num_blocks: u32,
    num_pages: u32,
}

impl Geometry {
    pub fn new(
        ssd_size: u32,
        package_size: u32,
        die_size: u32,
        plane_size: u32,
        block_size: u32,
    ) -> Result<Self, GeometryError> {
        for (component, value) in [
            ("ssd_size", ssd_size),
            ("package_size", package_size),
            ("die_size", die_size),
            ("plane_size", plane_size),
            ("block_size", block_size),
        ] {
            if value == 0 {
                return Err(GeometryError::ZeroComponent { component });
            }
        }
        for (component, value, max) in [
            ("ssd_size", ssd_size, 1 << 8),
            ("package_size", package_size, 1 << 8),
            ("die_size", die_size, 1 << 16),
            ("plane_size", plane_size, 1 << 16),
            ("block_size", block_size, 1 << 16),
        ] {
            if value > max {
                return Err(GeometryError::ComponentTooWide {
                    component,
                    value: u64::from(value),
                    max: u64::from(max),
                });
            }
        }

        let num_blocks = u64::from(ssd_size)
            * u64::from(package_size)
            * u64::from(die_size)
            * u64::from(plane_size);
        let num_pages = num_blocks * u64::from(block_size);
        if num_pages > u64::from(u32::MAX) {
            return Err(GeometryError::TooManyPages { pages: num_pages });
        }

        Ok(Self {
            ssd_size,
            package_size,
            die_size,
            plane_size,
            block_size,
            num_blocks: u32::try_from(num_blocks).expect("checked above"),
            num_pages: u32::try_from(num_pages).expect("checked above"),
        })
    }

    #[must_use]
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    #[must_use]
    pub fn num_blocks(&self) -> u32 {
        self.num_blocks
    }

    #[must_use]
    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    // ── Codec ───────────────────────────────────────────────────────────

    /// Linear page index of a full address.
    ///
    /// Out-of-range components are a programming error and abort.
    #[must_use]
    pub fn page_index(&self, addr: Address) -> Ppn {
        let block = self.block_index(addr);
        let page = u32::from(addr.page);
        assert!(
            page < self.block_size,
            "page {page} out of range for geometry ({addr})"
        );
        Ppn(block.0 * self.block_size + page)
    }

    /// Linear block index of an address (page field ignored).
    #[must_use]
    pub fn block_index(&self, addr: Address) -> Pbn {
        let package = u32::from(addr.package);
        let die = u32::from(addr.die);
        let plane = u32::from(addr.plane);
        let block = u32::from(addr.block);
        assert!(
            package < self.ssd_size
                && die < self.package_size
                && plane < self.die_size
                && block < self.plane_size,
            "address components out of range for geometry ({addr})"
        );
        Pbn(((package * self.package_size + die) * self.die_size + plane) * self.plane_size + block)
    }

    /// Inverse of [`Self::page_index`].
    #[must_use]
    pub fn address_of(&self, ppn: Ppn) -> Address {
        assert!(ppn.0 < self.num_pages, "page {ppn} out of range");
        let page = ppn.0 % self.block_size;
        let mut rest = ppn.0 / self.block_size;
        let block = rest % self.plane_size;
        rest /= self.plane_size;
        let plane = rest % self.die_size;
        rest /= self.die_size;
        let die = rest % self.package_size;
        let package = rest / self.package_size;
        Address {
            package: u8::try_from(package).expect("validated width"),
            die: u8::try_from(die).expect("validated width"),
            plane: u16::try_from(plane).expect("validated width"),
            block: u16::try_from(block).expect("validated width"),
            page: u16::try_from(page).expect("validated width"),
        }
    }

    /// Block-level address of a linear block index.
    #[must_use]
    pub fn address_of_block(&self, pbn: Pbn) -> Address {
        assert!(pbn.0 < self.num_blocks, "block {pbn} out of range");
        self.address_of(Ppn(pbn.0 * self.block_size)).block_level()
    }

    // ── Linear helpers ──────────────────────────────────────────────────

    #[must_use]
    pub fn block_of_page(&self, ppn: Ppn) -> Pbn {
        Pbn(ppn.0 / self.block_size)
    }

    #[must_use]
    pub fn page_offset(&self, ppn: Ppn) -> u32 {
        ppn.0 % self.block_size
    }

    #[must_use]
    pub fn page_in_block(&self, pbn: Pbn, offset: u32) -> Ppn {
        debug_assert!(offset < self.block_size);
        Ppn(pbn.0 * self.block_size + offset)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
