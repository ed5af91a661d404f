//! # PCI Configuration Space
//!
//! This module lays out a type 0 PCI Configuration Space header on top of a [`RegisterSet`]. To
//! construct a Configuration Space use [`ConfigSpace::new`] with a [`PciInfo`].

use std::fmt::{self, Display, Formatter};

use crate::device::{register_set::RegisterSet, request::Request};

use super::{
    constants::config_space::{self, bar, command, offset, HEADER_SIZE, MAX_BARS},
    info::PciInfo,
    traits::SpaceKind,
};

/// The Configuration Space of a PCI function.
///
/// Reads are never masked. Writes only change bits the guest may change. Besides the bits that
/// are writable from the start, only [`set_bar`](Self::set_bar) alters which bits are writable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSpace {
    regs: RegisterSet<{ config_space::SIZE }>,
}

impl ConfigSpace {
    /// Create the initial Configuration Space for the described function.
    ///
    /// All BARs are hardwired to zero until they are set up with [`set_bar`](Self::set_bar).
    #[must_use]
    pub fn new(info: &PciInfo) -> Self {
        let mut regs = RegisterSet::new();

        regs.u16_le_ro_at(offset::VENDOR, info.vendor_id)
            .u16_le_ro_at(offset::DEVICE, info.device_id)
            .u16_le_at(offset::COMMAND, info.command, command::WRITABLE_BITS)
            .u8_ro_at(offset::REVISION, info.revision)
            .u8_ro_at(offset::PROG_IF, info.prog_if)
            .u8_ro_at(offset::SUBCLASS, info.subclass)
            .u8_ro_at(offset::CLASS, info.class)
            .u8_rw_at(offset::CACHE_LINE_SIZE, 0)
            .u8_ro_at(offset::HEADER_TYPE, info.header_type)
            .u16_le_ro_at(offset::SUBSYSTEM_VENDOR_ID, info.subsystem_vendor_id)
            .u16_le_ro_at(offset::SUBSYSTEM_ID, info.subsystem_id)
            // This field is written by firmware at boot time to indicate which interrupt
            // controller input the pin is routed to.
            .u8_rw_at(offset::IRQ_LINE, 0)
            .u8_ro_at(offset::IRQ_PIN, info.interrupt_pin)
            // Device specific registers are plain memory for the guest.
            .rw_range(HEADER_SIZE..config_space::SIZE);

        Self { regs }
    }

    /// Read from the Configuration Space. Bytes beyond its end read as `0xFF`.
    #[must_use]
    pub fn read(&self, req: Request) -> u32 {
        self.regs.read(req)
    }

    /// Write to the Configuration Space, honoring the write mask.
    pub fn write(&mut self, req: Request, value: u32) {
        self.regs.write(req, value)
    }

    /// The current value of the command register.
    #[must_use]
    pub fn command(&self) -> u16 {
        self.regs.u16_le(offset::COMMAND)
    }

    /// Whether the command register enables decoding of the given address space.
    #[must_use]
    pub fn decodes(&self, kind: SpaceKind) -> bool {
        let enable = match kind {
            SpaceKind::Memory => command::MEMORY_SPACE,
            SpaceKind::Io => command::IO_SPACE,
        };

        self.command() & enable != 0
    }

    /// The current raw value of the register of BAR `index`.
    #[must_use]
    pub fn bar_register(&self, index: usize) -> u32 {
        assert!(index < MAX_BARS);

        self.regs.u32_le(offset::bar(index))
    }

    /// Set up the register of BAR `index` for a region of `size` bytes.
    ///
    /// The encoding bits are set for the given address space and the register only accepts
    /// addresses aligned to `size`. Guest operating systems determine the size of the region behind
    /// the BAR by checking which lower bits don't toggle.
    pub fn set_bar(&mut self, index: usize, kind: SpaceKind, size: u32) {
        assert!(index < MAX_BARS);
        assert!(size.is_power_of_two());

        let encoding = match kind {
            SpaceKind::Memory => bar::SPACE_MEMORY,
            SpaceKind::Io => bar::SPACE_IO,
        };

        self.regs.u32_le_at(offset::bar(index), encoding, !(size - 1));
    }

    /// The write mask of the byte at `pos`.
    #[must_use]
    pub fn mask(&self, pos: usize) -> u8 {
        self.regs.mask(pos)
    }

    /// The raw Configuration Space contents.
    #[must_use]
    pub const fn bytes(&self) -> &[u8; config_space::SIZE] {
        self.regs.bytes()
    }

    /// Overwrite the whole Configuration Space, ignoring the write mask.
    pub fn load(&mut self, data: &[u8; config_space::SIZE]) {
        self.regs.load(data)
    }

    /// A printable view of the standard header.
    #[must_use]
    pub const fn header(&self) -> HeaderDump<'_> {
        HeaderDump(self)
    }
}

/// Displays the standard header as one row per 32-bit register, most significant byte first.
///
/// ```text
///     3  2  1  0
/// --------------
/// 00 |12 34 56 78
/// ```
#[derive(Debug, Clone, Copy)]
pub struct HeaderDump<'a>(&'a ConfigSpace);

impl Display for HeaderDump<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "    3  2  1  0")?;
        writeln!(f, "--------------")?;

        for (i, reg) in self.0.bytes()[..HEADER_SIZE].chunks_exact(4).enumerate() {
            writeln!(
                f,
                "{:02x} |{:02x} {:02x} {:02x} {:02x}",
                i * 4,
                reg[3],
                reg[2],
                reg[1],
                reg[0]
            )?;
        }

        Ok(())
    }
}
