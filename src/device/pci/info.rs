//! # PCI Function Description
//!
//! The device model describes the function it wants to expose with a [`PciInfo`]. Registering the
//! function turns this description into the initial Configuration Space.

use super::{
    constants::config_space::{class, header_type, irq_pin, subclass},
    sbdf::Sbdf,
};

/// The identity and initial register values of a PCI function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PciInfo {
    pub(crate) location: Sbdf,
    pub(crate) vendor_id: u16,
    pub(crate) device_id: u16,
    pub(crate) revision: u8,
    pub(crate) class: u8,
    pub(crate) subclass: u8,
    pub(crate) prog_if: u8,
    pub(crate) header_type: u8,
    pub(crate) subsystem_vendor_id: u16,
    pub(crate) subsystem_id: u16,
    pub(crate) command: u16,
    pub(crate) interrupt_pin: u8,
}

impl PciInfo {
    /// Describe a function with the given vendor and device IDs at `00:00.0`.
    ///
    /// Class and subclass default to `0xFF` (unassigned), everything else to zero.
    #[must_use]
    pub const fn new(vendor_id: u16, device_id: u16) -> Self {
        Self {
            location: Sbdf::new(0, 0, 0, 0),
            vendor_id,
            device_id,
            revision: 0,
            class: class::UNASSIGNED,
            subclass: subclass::UNASSIGNED,
            prog_if: 0,
            header_type: header_type::TYPE_00,
            subsystem_vendor_id: 0,
            subsystem_id: 0,
            command: 0,
            interrupt_pin: irq_pin::NONE,
        }
    }

    /// Place the function at the given address.
    ///
    /// The address is validated when the function is registered.
    #[must_use]
    pub const fn location(mut self, location: Sbdf) -> Self {
        self.location = location;
        self
    }

    /// Configure the class, subclass and programming interface fields.
    #[must_use]
    pub const fn class(mut self, class: u8, subclass: u8, prog_if: u8) -> Self {
        self.class = class;
        self.subclass = subclass;
        self.prog_if = prog_if;
        self
    }

    /// Configure the revision field.
    #[must_use]
    pub const fn revision(mut self, revision: u8) -> Self {
        self.revision = revision;
        self
    }

    /// Configure the header type field.
    ///
    /// Only type 0 headers are emulated, but the multifunction bit is passed through as is.
    #[must_use]
    pub const fn header_type(mut self, header_type: u8) -> Self {
        self.header_type = header_type;
        self
    }

    /// Configure the subsystem and subsystem vendor IDs.
    #[must_use]
    pub const fn subsystem(mut self, subsystem_vendor_id: u16, subsystem_id: u16) -> Self {
        self.subsystem_vendor_id = subsystem_vendor_id;
        self.subsystem_id = subsystem_id;
        self
    }

    /// Configure the value of the command register at registration time.
    #[must_use]
    pub const fn command(mut self, command: u16) -> Self {
        self.command = command;
        self
    }

    /// Configure the PCI interrupt pin the function is wired to.
    ///
    /// When not specified, the interrupt pin defaults to 0 (None).
    #[must_use]
    pub const fn interrupt_pin(mut self, irq_pin: u8) -> Self {
        self.interrupt_pin = irq_pin;
        self
    }

    /// The address the function will respond to.
    #[must_use]
    pub const fn sbdf(&self) -> Sbdf {
        self.location
    }
}
