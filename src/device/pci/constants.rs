//! # PCI Constants
//!
//! This module collects PCI related constants. All definitions are derived from the "PCI Local Bus
//! Specification".

// Allow missing docs to avoid duplicating the PCI spec for all constants.
#![allow(missing_docs)]

/// The number of devices on a PCI bus.
pub const MAX_BUS_DEVICES: u8 = 32;

/// The number of functions in a PCI device.
pub const MAX_DEVICE_FUNCTIONS: u8 = 8;

/// Constants related to the configuration space.
pub mod config_space {

    /// The config space size of a single PCI function in bytes.
    pub const SIZE: usize = 256;

    /// The size of the standard type 0 header. Everything above is device specific.
    pub const HEADER_SIZE: usize = 0x40;

    /// The maximum number of Base Address Registers (BARs) per function.
    pub const MAX_BARS: usize = 6;

    /// The size in bytes of a single BAR.
    pub const BAR_ENTRY_SIZE: usize = 4;

    /// Masks for various configuration space fields.
    pub mod mask {
        pub const PIO_BAR_ADDRESS: u32 = 0xffff_fffc;
        pub const MMIO_BAR_ADDRESS: u32 = 0xffff_fff0;
    }

    /// The offsets of various fields in the configuration space.
    pub mod offset {
        pub const VENDOR: usize = 0x0;
        pub const DEVICE: usize = 0x2;
        pub const COMMAND: usize = 0x4;
        pub const STATUS: usize = 0x6;
        pub const REVISION: usize = 0x8;
        pub const PROG_IF: usize = 0x9;
        pub const SUBCLASS: usize = 0xA;
        pub const CLASS: usize = 0xB;
        pub const CACHE_LINE_SIZE: usize = 0xC;
        pub const HEADER_TYPE: usize = 0xE;

        pub const BAR_0: usize = 0x10;
        pub const BAR_1: usize = 0x14;
        pub const BAR_2: usize = 0x18;
        pub const BAR_3: usize = 0x1C;
        pub const BAR_4: usize = 0x20;
        pub const BAR_5: usize = 0x24;

        pub const SUBSYSTEM_VENDOR_ID: usize = 0x2C;
        pub const SUBSYSTEM_ID: usize = 0x2E;
        pub const IRQ_LINE: usize = 0x3C;
        pub const IRQ_PIN: usize = 0x3D;

        /// The offset of the register of BAR `index`.
        #[must_use]
        pub const fn bar(index: usize) -> usize {
            BAR_0 + index * super::BAR_ENTRY_SIZE
        }
    }

    /// Command Register Constants.
    pub mod command {
        pub const IO_SPACE: u16 = 1 << 0;
        pub const MEMORY_SPACE: u16 = 1 << 1;
        pub const BUS_MASTER: u16 = 1 << 2;
        pub const INTX_DISABLE: u16 = 1 << 10;

        /// The bits of the command register the guest may change.
        pub const WRITABLE_BITS: u16 = IO_SPACE | MEMORY_SPACE | BUS_MASTER | INTX_DISABLE;
    }

    /// Encoding bits in the low part of a BAR register.
    pub mod bar {
        pub const SPACE_IO: u32 = 1 << 0;
        pub const SPACE_MEMORY: u32 = 0;

        /// The smallest memory BAR that keeps its encoding bits read-only.
        pub const MIN_MEMORY_SIZE: u32 = 16;

        /// The smallest I/O BAR that keeps its encoding bits read-only.
        pub const MIN_IO_SIZE: u32 = 4;
    }

    /// PCI header type.
    pub mod header_type {
        pub const TYPE_00: u8 = 0;
    }

    /// The device vendor.
    pub mod vendor {
        pub const XENSOURCE: u16 = 0x5853;
    }

    /// PCI class constants.
    pub mod class {
        pub const SYSTEM_PERIPHERAL: u8 = 0x8;
        pub const UNASSIGNED: u8 = 0xFF;
    }

    /// PCI sub-class constants.
    pub mod subclass {
        pub const OTHER_SYSTEM_PERIPHERAL: u8 = 0x80;
        pub const UNASSIGNED: u8 = 0xFF;
    }

    /// PCI interrupt pins.
    pub mod irq_pin {
        pub const NONE: u8 = 0;
        pub const INTA: u8 = 1;
    }
}
