//! Controller between the FTL and the device.
//!
//! Holds the FIFO page buffer: `READ` copies a page and its originating LBA
//! into the buffer, `WRITE` pops the oldest entry and programs it at the
//! target page, `ERASE` requires an empty buffer. The controller keeps its
//! own physical-to-logical association (established by writes, cleared by
//! erases) so it can re-tag relocated pages without the FTL's help.
//!
//! Each logical operation is one translate call driven to completion: any
//! callbacks run inside the call, the buffer must be empty when it returns,
//! and the caller's own read or write follows against the translated
//! address.

use crate::device::{FlashDevice, PageValue};
use crate::{Result, SimError};
use flint_core::FtlCore;
use flint_error::FtlError;
use flint_types::{Address, ExecCallback, ExecState, Geometry, Lba, OpCode};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Physical operation counters for a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OpCounters {
    pub reads: u64,
    pub writes: u64,
    pub erases: u64,
}

/// Device-facing half of the controller, handed to the FTL as the callback
/// for the duration of one translate call.
struct DeviceBus<'a> {
    geom: &'a Geometry,
    device: &'a mut FlashDevice,
    buffer: &'a mut VecDeque<(PageValue, Lba)>,
    page_owner: &'a mut HashMap<u32, Lba>,
    counters: &'a mut OpCounters,
    fault: Option<SimError>,
}

impl DeviceBus<'_> {
    fn execute(&mut self, op: OpCode, addr: Address) -> Result<()> {
        match op {
            OpCode::Read => {
                let ppn = self.geom.page_index(addr);
                let owner = *self
                    .page_owner
                    .get(&ppn.0)
                    .ok_or(SimError::InvalidRead(ppn))?;
                let value = self.device.read(ppn)?;
                self.buffer.push_back((value, owner));
                self.counters.reads += 1;
            }
            OpCode::Write => {
                let (value, owner) = self
                    .buffer
                    .pop_front()
                    .ok_or(SimError::WriteWithEmptyBuffer)?;
                let ppn = self.geom.page_index(addr);
                self.device.write(ppn, value)?;
                self.page_owner.insert(ppn.0, owner);
                self.counters.writes += 1;
            }
            OpCode::Erase => {
                if !self.buffer.is_empty() {
                    return Err(SimError::EraseWithBufferedReads(self.buffer.len()));
                }
                let pbn = self.geom.block_index(addr);
                self.device.erase_block(pbn)?;
                let start = pbn.0 * self.geom.block_size();
                for page in start..start + self.geom.block_size() {
                    self.page_owner.remove(&page);
                }
                self.counters.erases += 1;
            }
        }
        Ok(())
    }
}

impl ExecCallback for DeviceBus<'_> {
    fn exec(&mut self, op: OpCode, addr: Address) {
        if self.fault.is_some() {
            return;
        }
        if let Err(err) = self.execute(op, addr) {
            debug!(%err, "callback fault");
            self.fault = Some(err);
        }
    }
}

pub struct Controller {
    ftl: FtlCore,
    geom: Geometry,
    device: FlashDevice,
    buffer: VecDeque<(PageValue, Lba)>,
    page_owner: HashMap<u32, Lba>,
    counters: OpCounters,
}

impl Controller {
    #[must_use]
    pub fn new(ftl: FtlCore, block_erase_count: u32) -> Self {
        let geom = *ftl.geometry();
        let device = FlashDevice::new(&geom, block_erase_count);
        Self {
            ftl,
            geom,
            device,
            buffer: VecDeque::new(),
            page_owner: HashMap::new(),
            counters: OpCounters::default(),
        }
    }

    /// Read one logical page.
    pub fn read_lba(&mut self, lba: Lba) -> Result<(ExecState, Option<PageValue>)> {
        let addr = match self.ftl.read_translate(lba) {
            Ok(addr) => addr,
            Err(err) => return self.failure(lba, err),
        };
        self.ensure_drained()?;

        let ppn = self.geom.page_index(addr);
        if !self.page_owner.contains_key(&ppn.0) {
            return Err(SimError::InvalidRead(ppn));
        }
        let value = self.device.read(ppn)?;
        self.counters.reads += 1;
        Ok((ExecState::Success, Some(value)))
    }

    /// Write one logical page, running any GC the FTL needs inside the call.
    pub fn write_lba(&mut self, lba: Lba, value: PageValue) -> Result<ExecState> {
        let mut bus = DeviceBus {
            geom: &self.geom,
            device: &mut self.device,
            buffer: &mut self.buffer,
            page_owner: &mut self.page_owner,
            counters: &mut self.counters,
            fault: None,
        };
        let translated = self.ftl.write_translate(lba, &mut bus);
        if let Some(fault) = bus.fault {
            return Err(fault);
        }
        let addr = match translated {
            Ok(addr) => addr,
            Err(err) => return self.failure(lba, err).map(|(state, _)| state),
        };
        self.ensure_drained()?;

        // The user payload takes the same path as a relocated page: through
        // the buffer, tagged with its logical owner.
        self.buffer.push_back((value, lba));
        let mut bus = DeviceBus {
            geom: &self.geom,
            device: &mut self.device,
            buffer: &mut self.buffer,
            page_owner: &mut self.page_owner,
            counters: &mut self.counters,
            fault: None,
        };
        bus.execute(OpCode::Write, addr)?;
        Ok(ExecState::Success)
    }

    /// Pass a trim hint through to the FTL.
    pub fn trim_lba(&mut self, lba: Lba) -> Result<ExecState> {
        let outcome = self.ftl.trim(lba);
        self.ensure_drained()?;
        match outcome {
            Ok(()) => Ok(ExecState::Success),
            Err(err) => self.failure(lba, err).map(|(state, _)| state),
        }
    }

    #[must_use]
    pub fn counters(&self) -> OpCounters {
        self.counters
    }

    #[must_use]
    pub fn ftl(&self) -> &FtlCore {
        &self.ftl
    }

    #[must_use]
    pub fn device(&self) -> &FlashDevice {
        &self.device
    }

    fn ensure_drained(&self) -> Result<()> {
        if self.buffer.is_empty() {
            Ok(())
        } else {
            Err(SimError::BufferNotDrained(self.buffer.len()))
        }
    }

    fn failure(&self, lba: Lba, err: FtlError) -> Result<(ExecState, Option<PageValue>)> {
        if err.is_recoverable() {
            debug!(lba = lba.0, %err, "request failed");
            Ok((ExecState::Failure, None))
        } else {
            Err(SimError::FtlInternal(lba, err.to_string()))
        }
    }
}
