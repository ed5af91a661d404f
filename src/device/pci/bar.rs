//! # Base Address Registers
//!
//! This module keeps track of the BARs of a PCI function: which address space and size each of
//! them has, where it is currently mapped and which backend emulates the registers behind it.
//!
//! Guest accesses are matched against the mapped BARs with [`BarTable::resolve`] and then forwarded
//! with [`Bar::read`] and [`Bar::write`]. These split accesses into narrower ones when the backend
//! does not support the requested width.

use std::ops::Range;

use tracing::trace;

use crate::device::request::{Request, RequestSize};

use super::{constants::config_space::MAX_BARS, traits::BarOps, traits::SpaceKind};

/// Meta-information about a PCI BAR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarInfo {
    /// The size of the BAR in bytes.
    pub size: u32,

    /// The address space this BAR decodes.
    pub kind: SpaceKind,

    /// The base address the BAR is currently mapped at, if any.
    pub mapped_at: Option<u64>,
}

/// A registered BAR.
#[derive(Debug)]
pub struct Bar {
    kind: SpaceKind,
    size: u32,
    mapped_at: Option<u64>,
    ops: Box<dyn BarOps>,
}

impl Bar {
    /// Create an unmapped BAR.
    ///
    /// `size` must be a power of two.
    #[must_use]
    pub fn new(kind: SpaceKind, size: u32, ops: Box<dyn BarOps>) -> Self {
        assert!(size.is_power_of_two());

        Self {
            kind,
            size,
            mapped_at: None,
            ops,
        }
    }

    /// The address space this BAR decodes.
    #[must_use]
    pub const fn kind(&self) -> SpaceKind {
        self.kind
    }

    /// The size of the BAR in bytes.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// The base address the BAR is currently mapped at, if any.
    #[must_use]
    pub const fn mapped_at(&self) -> Option<u64> {
        self.mapped_at
    }

    /// The guest address range the BAR currently decodes.
    #[must_use]
    pub fn mapped_range(&self) -> Option<Range<u64>> {
        self.mapped_at
            .map(|base| base..base + u64::from(self.size))
    }

    /// Meta-information about the BAR.
    #[must_use]
    pub const fn info(&self) -> BarInfo {
        BarInfo {
            size: self.size,
            kind: self.kind,
            mapped_at: self.mapped_at,
        }
    }

    /// Record that the BAR now decodes `base` and tell the backend.
    pub(crate) fn set_mapped(&mut self, base: u64) {
        assert!(self.mapped_at.is_none());
        assert_eq!(base % u64::from(self.size), 0);

        self.mapped_at = Some(base);
        self.ops.on_map(base);
    }

    /// Tell the backend that the BAR stops decoding its range.
    ///
    /// The mapping itself is forgotten with [`clear_mapped`](Self::clear_mapped).
    pub(crate) fn notify_unmap(&mut self) {
        self.ops.on_unmap();
    }

    /// Forget the current mapping.
    pub(crate) fn clear_mapped(&mut self) {
        self.mapped_at = None;
    }

    /// Read from the BAR. The address of `req` is relative to the start of the BAR.
    pub fn read(&mut self, req: Request) -> u32 {
        let value = read_with(self.ops.as_mut(), req);

        trace!("bar read  {req} -> {value:#x}");
        value
    }

    /// Write to the BAR. The address of `req` is relative to the start of the BAR.
    pub fn write(&mut self, req: Request, value: u32) {
        trace!("bar write {req} <- {value:#x}");

        write_with(self.ops.as_mut(), req, value)
    }
}

/// Perform a read with the widest callback the backend supports.
///
/// Unsupported widths are split into two accesses of the next narrower width. The lower half is
/// read first and lands in the least significant bits.
fn read_with(ops: &mut dyn BarOps, req: Request) -> u32 {
    let native = match req.size {
        RequestSize::Size1 => Some(ops.read_u8(req.addr).into()),
        RequestSize::Size2 => ops.read_u16(req.addr).map(u32::from),
        RequestSize::Size4 => ops.read_u32(req.addr),
    };

    native.unwrap_or_else(|| {
        // Byte reads always succeed, so we only get here for wider requests.
        let chunk = req.size.narrower().unwrap();
        let chunk_bits = u32::from(chunk) * 8;

        req.iter_chunks(chunk)
            .enumerate()
            .fold(0, |acc, (i, chunk_req)| {
                acc | read_with(ops, chunk_req) << (i as u32 * chunk_bits)
            })
    })
}

/// Perform a write with the widest callback the backend supports.
///
/// See [`read_with`] for how unsupported widths are handled.
fn write_with(ops: &mut dyn BarOps, req: Request, value: u32) {
    let native = match req.size {
        RequestSize::Size1 => {
            ops.write_u8(req.addr, value as u8);
            Some(())
        }
        RequestSize::Size2 => ops.write_u16(req.addr, value as u16),
        RequestSize::Size4 => ops.write_u32(req.addr, value),
    };

    if native.is_none() {
        let chunk = req.size.narrower().unwrap();
        let chunk_bits = u32::from(chunk) * 8;

        for (i, chunk_req) in req.iter_chunks(chunk).enumerate() {
            write_with(ops, chunk_req, value >> (i as u32 * chunk_bits));
        }
    }
}

/// The result of matching a guest access against the mapped BARs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarMatch {
    /// A request relative to the BAR itself.
    pub request: Request,

    /// The index of the BAR that matched.
    pub bar_no: u8,
}

/// The BAR slots of a PCI function. Empty slots are not registered.
#[derive(Debug, Default)]
pub struct BarTable {
    bars: [Option<Bar>; MAX_BARS],
}

impl BarTable {
    /// Create a table without any registered BARs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Access the BAR in slot `index`, if it is registered.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Bar> {
        self.bars.get(index).and_then(Option::as_ref)
    }

    /// Mutably access the BAR in slot `index`, if it is registered.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Bar> {
        self.bars.get_mut(index).and_then(Option::as_mut)
    }

    /// Put a BAR into slot `index`. The slot must be empty.
    pub(crate) fn insert(&mut self, index: usize, bar: Bar) {
        assert!(self.bars[index].is_none());

        self.bars[index] = Some(bar);
    }

    /// Remove the BAR from slot `index`.
    pub(crate) fn take(&mut self, index: usize) -> Option<Bar> {
        self.bars.get_mut(index).and_then(Option::take)
    }

    /// Iterate over the registered BARs together with their index.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Bar)> {
        self.bars
            .iter()
            .enumerate()
            .filter_map(|(i, bar)| bar.as_ref().map(|bar| (i, bar)))
    }

    /// Find the BAR that decodes the guest access `req` in the given address space.
    ///
    /// The access only matches if it starts within the BAR's range. If guest programming made
    /// several BARs overlap, the one with the lowest index wins.
    #[must_use]
    pub fn resolve(&self, kind: SpaceKind, req: Request) -> Option<BarMatch> {
        self.iter()
            .filter(|(_, bar)| bar.kind() == kind)
            .find_map(|(i, bar)| {
                let range = bar.mapped_range()?;

                range.contains(&req.addr).then(|| BarMatch {
                    request: req.relative_to(range.start),
                    bar_no: i.try_into().unwrap(),
                })
            })
    }

    /// Return the index of a mapped BAR of the given kind, other than `index`, whose range overlaps
    /// `range`.
    #[must_use]
    pub fn find_overlap(&self, index: usize, kind: SpaceKind, range: &Range<u64>) -> Option<usize> {
        self.iter()
            .filter(|&(i, bar)| i != index && bar.kind() == kind)
            .find_map(|(i, bar)| {
                let other = bar.mapped_range()?;

                (other.start < range.end && range.start < other.end).then_some(i)
            })
    }
}
