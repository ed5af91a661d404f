//! # PCI Function Emulation
//!
//! A [`PciFunction`] presents one virtual PCI function to the guest. It owns the Configuration
//! Space and the BARs of the function and keeps the routing subsystem ([`IoRequestServer`])
//! informed about which guest address ranges the BARs currently decode.
//!
//! The lifecycle is:
//!
//! 1. [`register`](PciFunction::register) the function, which claims its Configuration Space,
//! 2. [`register_bar`](PciFunction::register_bar) each BAR,
//! 3. service guest accesses via [`read_config`](PciFunction::read_config),
//!    [`write_config`](PciFunction::write_config), [`read_bar`](PciFunction::read_bar) and
//!    [`write_bar`](PciFunction::write_bar),
//! 4. [`deregister_bar`](PciFunction::deregister_bar) the BARs and
//!    [`deregister`](PciFunction::deregister) the function.
//!
//! Every change to the Configuration Space re-evaluates where the BARs are mapped.

use std::io;
use std::sync::Mutex;

use tracing::{debug, trace, warn};

use crate::device::request::Request;

use super::{
    bar::{Bar, BarInfo, BarTable},
    config_space::ConfigSpace,
    constants::config_space::{self, bar, mask, MAX_BARS},
    info::PciInfo,
    sbdf::Sbdf,
    traits::{BarOps, IoRequestServer, PciDevice, SpaceKind},
};

/// Registration of a function or one of its BARs failed.
#[derive(thiserror::Error, Debug)]
pub enum RegistrationError {
    /// Device or function number exceed their bit widths.
    #[error("Invalid PCI function address {0}")]
    InvalidLocation(Sbdf),

    /// There is no BAR with this index.
    #[error("BAR index {0} is out of range")]
    BarIndexOutOfRange(u8),

    /// The BAR slot is already in use.
    #[error("BAR {0} is already registered")]
    BarAlreadyRegistered(u8),

    /// The size order does not describe a valid BAR of this kind.
    #[error("BAR size 2^{order} is not valid for a {kind:?} BAR")]
    InvalidBarSize {
        /// The requested size as a power of two.
        order: u32,
        /// The requested address space.
        kind: SpaceKind,
    },

    /// The routing subsystem refused to route the function's Configuration Space to us.
    #[error("Failed to claim PCI function {sbdf}")]
    Routing {
        /// The function we tried to claim.
        sbdf: Sbdf,
        /// The error reported by the routing subsystem.
        #[source]
        source: io::Error,
    },
}

/// An emulated PCI function.
#[derive(Debug)]
pub struct PciFunction<S> {
    sbdf: Sbdf,
    config_space: ConfigSpace,
    bars: BarTable,
    irq_pin: u8,
    irq_state: bool,
    server: S,
}

impl<S: IoRequestServer> PciFunction<S> {
    /// Create the function described by `info` and claim its Configuration Space.
    ///
    /// The address is checked before anything else happens. If the routing subsystem refuses the
    /// function, the error is returned and the function is dropped.
    pub fn register(info: PciInfo, mut server: S) -> Result<Self, RegistrationError> {
        let sbdf = info.sbdf();

        if !sbdf.is_valid() {
            return Err(RegistrationError::InvalidLocation(sbdf));
        }

        let config_space = ConfigSpace::new(&info);

        debug!("{sbdf}: registering {:04x}:{:04x}", info.vendor_id, info.device_id);

        server
            .map_pcidev(sbdf)
            .map_err(|source| RegistrationError::Routing { sbdf, source })?;

        Ok(Self {
            sbdf,
            config_space,
            bars: BarTable::new(),
            irq_pin: info.interrupt_pin,
            irq_state: false,
            server,
        })
    }

    /// Stop receiving Configuration Space accesses for this function.
    ///
    /// Failures are only logged: during teardown there is nothing left to do about them. BAR
    /// mappings are not touched. Use [`deregister_bar`](Self::deregister_bar) for them.
    pub fn deregister(&mut self) {
        debug!("{}: deregistering", self.sbdf);

        if let Err(e) = self.server.unmap_pcidev(self.sbdf) {
            warn!("{}: failed to release function: {e}", self.sbdf);
        }
    }

    /// Add a BAR of `2^order` bytes in the given address space.
    ///
    /// The BAR register is set up to only accept addresses aligned to its size. The BAR is not
    /// mapped until the next Configuration Space write or [`update_bars`](Self::update_bars) call
    /// finds a valid address in it.
    pub fn register_bar(
        &mut self,
        index: u8,
        kind: SpaceKind,
        order: u32,
        ops: Box<dyn BarOps>,
    ) -> Result<(), RegistrationError> {
        let slot = usize::from(index);

        if slot >= MAX_BARS {
            return Err(RegistrationError::BarIndexOutOfRange(index));
        }

        if self.bars.get(slot).is_some() {
            return Err(RegistrationError::BarAlreadyRegistered(index));
        }

        let min_size = match kind {
            SpaceKind::Memory => bar::MIN_MEMORY_SIZE,
            SpaceKind::Io => bar::MIN_IO_SIZE,
        };
        let size = 1u32
            .checked_shl(order)
            .filter(|&size| size >= min_size)
            .ok_or(RegistrationError::InvalidBarSize { order, kind })?;

        debug!("{}: BAR{index}: {kind:?} {size:#x}", self.sbdf);

        self.config_space.set_bar(slot, kind, size);
        self.bars.insert(slot, Bar::new(kind, size, ops));

        Ok(())
    }

    /// Remove a BAR again.
    ///
    /// If the BAR is currently mapped, the routing subsystem is asked to stop routing its range to
    /// us. The slot becomes free for a new registration. The BAR register keeps its content until
    /// then.
    pub fn deregister_bar(&mut self, index: u8) {
        let Some(bar) = self.bars.take(usize::from(index)) else {
            debug!("{}: BAR{index}: not registered", self.sbdf);
            return;
        };

        debug!("{}: BAR{index}: deregistering", self.sbdf);

        if let Some(range) = bar.mapped_range() {
            if let Err(e) = self
                .server
                .unmap_io_range(bar.kind(), range.start..=range.end - 1)
            {
                warn!("{}: BAR{index}: failed to unmap {range:x?}: {e}", self.sbdf);
            }
        }
    }

    /// The address this function responds to.
    #[must_use]
    pub const fn sbdf(&self) -> Sbdf {
        self.sbdf
    }

    /// The Configuration Space of this function.
    #[must_use]
    pub const fn config_space(&self) -> &ConfigSpace {
        &self.config_space
    }

    /// The current Configuration Space contents.
    #[must_use]
    pub const fn config_bytes(&self) -> &[u8; config_space::SIZE] {
        self.config_space.bytes()
    }

    /// Retrieve information about a registered BAR.
    #[must_use]
    pub fn bar(&self, index: u8) -> Option<BarInfo> {
        self.bars.get(usize::from(index)).map(Bar::info)
    }

    /// The routing subsystem this function talks to.
    #[must_use]
    pub const fn server(&self) -> &S {
        &self.server
    }

    /// The interrupt pin the function is wired to.
    #[must_use]
    pub const fn irq_pin(&self) -> u8 {
        self.irq_pin
    }

    /// Whether the device model currently asserts the interrupt.
    #[must_use]
    pub const fn irq_state(&self) -> bool {
        self.irq_state
    }

    /// Record the interrupt state. Delivering the interrupt is up to the caller.
    pub fn set_irq_state(&mut self, asserted: bool) {
        self.irq_state = asserted;
    }

    /// Log the standard header.
    pub fn log_header(&self) {
        debug!("{}: config space\n{}", self.sbdf, self.config_space.header());
    }

    /// Read from the Configuration Space of the function at `sbdf`.
    ///
    /// If `sbdf` is not this function, the read returns all ones, which is what the guest sees for
    /// a missing device.
    #[must_use]
    pub fn read_config(&self, sbdf: Sbdf, req: Request) -> u32 {
        if sbdf != self.sbdf {
            return req.size.all_ones();
        }

        let value = self.config_space.read(req);

        trace!("{sbdf}: config read  {req} -> {value:#x}");
        value
    }

    /// Write to the Configuration Space of the function at `sbdf`.
    ///
    /// Writes to other functions are ignored. After the write, all BARs are re-evaluated, because a
    /// single write may move any number of them.
    pub fn write_config(&mut self, sbdf: Sbdf, req: Request, value: u32) {
        if sbdf != self.sbdf {
            return;
        }

        trace!("{sbdf}: config write {req} <- {value:#x}");

        self.config_space.write(req, value);
        self.update_bars();
    }

    /// Read from the BAR that decodes the guest address of `req`.
    ///
    /// # Panics
    ///
    /// If no BAR decodes the address. The routing subsystem only forwards accesses to ranges we
    /// mapped, so this means our state and the routing state disagree.
    pub fn read_bar(&mut self, kind: SpaceKind, req: Request) -> u32 {
        let (index, bar_req) = self.claim(kind, req);

        self.bars.get_mut(index).unwrap().read(bar_req)
    }

    /// Write to the BAR that decodes the guest address of `req`.
    ///
    /// # Panics
    ///
    /// See [`read_bar`](Self::read_bar).
    pub fn write_bar(&mut self, kind: SpaceKind, req: Request, value: u32) {
        let (index, bar_req) = self.claim(kind, req);

        self.bars.get_mut(index).unwrap().write(bar_req, value)
    }

    fn claim(&self, kind: SpaceKind, req: Request) -> (usize, Request) {
        let Some(found) = self.bars.resolve(kind, req) else {
            panic!(
                "{}: {kind:?} access to {req} is not decoded by any BAR",
                self.sbdf
            );
        };

        (usize::from(found.bar_no), found.request)
    }

    /// Copy the Configuration Space for a snapshot.
    #[must_use]
    pub fn dump(&self) -> [u8; config_space::SIZE] {
        *self.config_space.bytes()
    }

    /// Restore the Configuration Space from a snapshot and map the BARs it describes.
    ///
    /// The data is trusted to come from [`dump`](Self::dump) and is not checked against the write
    /// mask.
    pub fn restore(&mut self, data: &[u8; config_space::SIZE]) {
        debug!("{}: restoring config space", self.sbdf);

        self.config_space.load(data);
        self.update_bars();
    }

    /// Bring all BAR mappings in line with the Configuration Space.
    ///
    /// This happens automatically after Configuration Space writes and restores. Device models call
    /// this directly to map BARs whose registers already hold an address at registration time.
    pub fn update_bars(&mut self) {
        let mut targets = [None; MAX_BARS];

        for (index, bar) in self.bars.iter() {
            targets[index] = self.decoded_address(index, bar);
        }

        let moved: Vec<usize> = self
            .bars
            .iter()
            .filter(|&(index, bar)| bar.mapped_at() != targets[index])
            .map(|(index, _)| index)
            .collect();

        // All old ranges are released before any new one is claimed. BARs that swap places would
        // otherwise briefly claim each other's range.
        for &index in &moved {
            if self.bars.get(index).is_some_and(|bar| bar.mapped_at().is_some()) {
                self.unmap_bar(index);
            }
        }

        for &index in &moved {
            if let Some(base) = targets[index] {
                self.map_bar(index, base);
            }
        }
    }

    /// The address BAR `index` should be mapped at according to the Configuration Space.
    fn decoded_address(&self, index: usize, bar: &Bar) -> Option<u64> {
        let addr_mask = match bar.kind() {
            SpaceKind::Memory => mask::MMIO_BAR_ADDRESS,
            SpaceKind::Io => mask::PIO_BAR_ADDRESS,
        };
        let size_mask = !(bar.size() - 1);
        // Restored registers did not pass through the write mask, so align them here as well.
        let addr = self.config_space.bar_register(index) & addr_mask & size_mask;

        // Zero and the size mask are what an unprogrammed BAR or a sizing probe leave behind.
        let programmed = addr != 0 && addr != size_mask;

        (self.config_space.decodes(bar.kind()) && programmed).then_some(u64::from(addr))
    }

    fn unmap_bar(&mut self, index: usize) {
        let bar = self.bars.get_mut(index).unwrap();
        let kind = bar.kind();
        let range = bar.mapped_range().unwrap();

        debug!("{}: BAR{index}: unmapping {range:x?}", self.sbdf);

        bar.notify_unmap();
        bar.clear_mapped();

        // TODO Failures leave the routing subsystem and our view of the BAR out of sync. Propagate
        // them once device models can handle a failed config write.
        if let Err(e) = self.server.unmap_io_range(kind, range.start..=range.end - 1) {
            warn!("{}: BAR{index}: failed to unmap {range:x?}: {e}", self.sbdf);
        }
    }

    fn map_bar(&mut self, index: usize, base: u64) {
        let bar = self.bars.get(index).unwrap();
        let kind = bar.kind();
        let range = base..base + u64::from(bar.size());

        debug!("{}: BAR{index}: mapping {range:x?}", self.sbdf);

        if let Some(other) = self.bars.find_overlap(index, kind, &range) {
            warn!(
                "{}: BAR{index}: {range:x?} overlaps BAR{other}, accesses go to the lower index",
                self.sbdf
            );
        }

        if let Err(e) = self.server.map_io_range(kind, range.start..=range.end - 1) {
            warn!("{}: BAR{index}: failed to map {range:x?}: {e}", self.sbdf);
        }

        self.bars.get_mut(index).unwrap().set_mapped(base);
    }
}

/// A function behind a mutex can be shared between threads that service guest exits. The lock
/// serializes Configuration Space updates, remapping and BAR lookups.
impl<S: IoRequestServer + std::fmt::Debug + Send> PciDevice for Mutex<PciFunction<S>> {
    fn write_cfg(&self, sbdf: Sbdf, req: Request, value: u32) {
        self.lock().unwrap().write_config(sbdf, req, value)
    }

    fn read_cfg(&self, sbdf: Sbdf, req: Request) -> u32 {
        self.lock().unwrap().read_config(sbdf, req)
    }

    fn io_write(&self, kind: SpaceKind, req: Request, value: u32) {
        self.lock().unwrap().write_bar(kind, req, value)
    }

    fn io_read(&self, kind: SpaceKind, req: Request) -> u32 {
        self.lock().unwrap().read_bar(kind, req)
    }
}
