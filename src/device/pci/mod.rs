//! # PCI Function Emulation
//!
//! This module emulates a single PCI function as seen by a guest: its Configuration Space and the
//! BARs that decode guest memory and port I/O accesses. The hypervisor side is abstracted by
//! [`traits::IoRequestServer`], the device model behind each BAR by [`traits::BarOps`].
//!
//! ## Example
//!
//! ```rust
//! use std::io;
//! use std::ops::RangeInclusive;
//!
//! use vpci::device::pci::{
//!     function::PciFunction,
//!     info::PciInfo,
//!     sbdf::Sbdf,
//!     traits::{BarOps, IoRequestServer, SpaceKind},
//! };
//! use vpci::device::request::{Request, RequestSize};
//!
//! #[derive(Debug)]
//! struct Router;
//!
//! impl IoRequestServer for Router {
//!     fn map_pcidev(&mut self, _: Sbdf) -> io::Result<()> { Ok(()) }
//!     fn unmap_pcidev(&mut self, _: Sbdf) -> io::Result<()> { Ok(()) }
//!     fn map_io_range(&mut self, _: SpaceKind, _: RangeInclusive<u64>) -> io::Result<()> { Ok(()) }
//!     fn unmap_io_range(&mut self, _: SpaceKind, _: RangeInclusive<u64>) -> io::Result<()> { Ok(()) }
//! }
//!
//! #[derive(Debug)]
//! struct Registers([u8; 16]);
//!
//! impl BarOps for Registers {
//!     fn read_u8(&mut self, offset: u64) -> u8 { self.0[offset as usize] }
//!     fn write_u8(&mut self, offset: u64, value: u8) { self.0[offset as usize] = value }
//! }
//!
//! let sbdf = Sbdf::new(0, 0, 3, 0);
//! let mut function = PciFunction::register(PciInfo::new(0x5853, 0x0001).location(sbdf), Router)?;
//! function.register_bar(0, SpaceKind::Io, 4, Box::new(Registers([0; 16])))?;
//!
//! // The guest programs the BAR and enables port I/O decoding.
//! function.write_config(sbdf, Request::new(0x10, RequestSize::Size4), 0xc000);
//! function.write_config(sbdf, Request::new(0x04, RequestSize::Size2), 0x1);
//!
//! function.write_bar(SpaceKind::Io, Request::new(0xc004, RequestSize::Size2), 0xbeef);
//! assert_eq!(function.read_bar(SpaceKind::Io, Request::new(0xc005, RequestSize::Size1)), 0xbe);
//! # Ok::<(), vpci::device::pci::function::RegistrationError>(())
//! ```

pub mod bar;
pub mod config_space;
pub mod constants;
pub mod function;
pub mod info;
pub mod sbdf;
pub mod traits;

#[cfg(test)]
mod testutils;
