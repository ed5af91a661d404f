//! Emulation of a single virtual PCI function for hypervisor device models.

pub mod device;
