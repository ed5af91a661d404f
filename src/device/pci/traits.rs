//! # PCI Core Traits
//!
//! This module contains the seams between the PCI function emulation and its collaborators:
//!
//! - [`BarOps`] is implemented by the device backend that emulates the registers behind a BAR,
//! - [`IoRequestServer`] is implemented by the hypervisor glue that routes guest accesses to us,
//! - [`PciDevice`] is the thread-safe face of a PCI function towards a dispatch loop.

use std::fmt::Debug;
use std::io;
use std::ops::RangeInclusive;

use crate::device::request::Request;

use super::sbdf::Sbdf;

/// The address space a BAR decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpaceKind {
    /// A MMIO region.
    Memory,

    /// A legacy x86 port I/O region. Usually accessed via `IN` or `OUT` instructions.
    Io,
}

/// The register emulation behind a single BAR.
///
/// Offsets are relative to the start of the BAR. Byte accesses are mandatory. Wider accesses are
/// optional: the default implementations return `None`, which makes the caller split the access
/// into narrower ones. An implementation that returns `None` must not have performed the access.
///
/// The implementing object is the backend's context. It is handed back untouched on every call.
pub trait BarOps: Debug + Send {
    /// Read a single byte.
    fn read_u8(&mut self, offset: u64) -> u8;

    /// Write a single byte.
    fn write_u8(&mut self, offset: u64, value: u8);

    /// Read a 16-bit value, if the backend supports this width.
    #[must_use]
    fn read_u16(&mut self, _offset: u64) -> Option<u16> {
        None
    }

    /// Write a 16-bit value, if the backend supports this width.
    #[must_use]
    fn write_u16(&mut self, _offset: u64, _value: u16) -> Option<()> {
        None
    }

    /// Read a 32-bit value, if the backend supports this width.
    #[must_use]
    fn read_u32(&mut self, _offset: u64) -> Option<u32> {
        None
    }

    /// Write a 32-bit value, if the backend supports this width.
    #[must_use]
    fn write_u32(&mut self, _offset: u64, _value: u32) -> Option<()> {
        None
    }

    /// The BAR now decodes guest accesses starting at `base`.
    fn on_map(&mut self, _base: u64) {}

    /// The BAR no longer decodes any guest accesses.
    fn on_unmap(&mut self) {}
}

/// The hypervisor component that intercepts guest accesses and forwards them to us.
///
/// All calls are synchronous. Ranges are inclusive on both ends.
pub trait IoRequestServer {
    /// Route Configuration Space accesses for `sbdf` to this server.
    fn map_pcidev(&mut self, sbdf: Sbdf) -> io::Result<()>;

    /// Stop routing Configuration Space accesses for `sbdf` to this server.
    fn unmap_pcidev(&mut self, sbdf: Sbdf) -> io::Result<()>;

    /// Route guest accesses to `range` in the given address space to this server.
    fn map_io_range(&mut self, kind: SpaceKind, range: RangeInclusive<u64>) -> io::Result<()>;

    /// Stop routing guest accesses to `range` in the given address space to this server.
    fn unmap_io_range(&mut self, kind: SpaceKind, range: RangeInclusive<u64>) -> io::Result<()>;
}

/// The interface a dispatch loop uses to forward guest accesses to a PCI function.
///
/// This is implemented for a [`PciFunction`](super::function::PciFunction) behind a
/// [`std::sync::Mutex`], so multiple threads servicing guest exits can share one function. Each call
/// holds the lock for its whole duration, including any remapping it triggers.
pub trait PciDevice: Debug {
    /// Write to the PCI Configuration Space of the function addressed by `sbdf`.
    ///
    /// # Parameters
    ///
    /// - `sbdf`: The address the access was made to.
    /// - `req`: The register offset and size of the request.
    /// - `value`: The value to be written.
    fn write_cfg(&self, sbdf: Sbdf, req: Request, value: u32);

    /// Read from the PCI Configuration Space of the function addressed by `sbdf`.
    ///
    /// # Parameters
    ///
    /// - `sbdf`: The address the access was made to.
    /// - `req`: The register offset and size of the request.
    fn read_cfg(&self, sbdf: Sbdf, req: Request) -> u32;

    /// Write a value to a region decoded by one of the BARs.
    ///
    /// # Parameters
    ///
    /// - `kind`: Specifies the address space of the request.
    /// - `req`: The guest address and size of the request.
    /// - `value`: The value to be written.
    fn io_write(&self, kind: SpaceKind, req: Request, value: u32);

    /// Read a value from a region decoded by one of the BARs.
    ///
    /// # Parameters
    ///
    /// - `kind`: Specifies the address space of the request.
    /// - `req`: The guest address and size of the request.
    fn io_read(&self, kind: SpaceKind, req: Request) -> u32;
}
