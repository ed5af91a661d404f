//! # Byte-Masked Register File
//!
//! This module implements the storage behind a PCI Configuration Space: a fixed-size byte array of
//! register contents and a parallel array of write masks.

use std::convert::TryInto;

use crate::device::request::Request;

/// A compile-time sized register file with per-bit writability.
///
/// A set bit in the write mask makes the corresponding data bit writable for
/// [`write`](Self::write). Cleared bits keep their value. Reads are never masked.
///
/// Registers are placed with the chaining `*_at` methods:
///
/// ```
/// use vpci::device::register_set::RegisterSet;
///
/// let mut regs = RegisterSet::<8>::new();
///
/// regs.u8_ro_at(0, 0xAB)        // A completely read-only byte register containing 0xAB at offset 0.
///     .u8_at(1, 0x10, 0x0F)     // A byte register with writable low nibble at offset 1.
///     .u16_le_rw_at(2, 0xCAFE)  // A little-endian fully writable 16-bit value.
///     .u32_le_at(4, 0, !0xFFF); // A 32-bit register where only the upper 20 bits are writable.
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterSet<const SIZE: usize> {
    data: [u8; SIZE],
    rw_mask: [u8; SIZE],
}

impl<const SIZE: usize> Default for RegisterSet<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const SIZE: usize> RegisterSet<SIZE> {
    /// Create a register file where all bytes are zero and read-only.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            data: [0; SIZE],
            rw_mask: [0; SIZE],
        }
    }

    fn init_u8(&mut self, pos: usize, value: u8, write_mask: u8) {
        assert!(pos < SIZE);

        self.data[pos] = value;
        self.rw_mask[pos] = write_mask;
    }

    fn init_u8_slice(&mut self, pos: usize, value_bytes: &[u8], write_mask_bytes: &[u8]) {
        assert_eq!(value_bytes.len(), write_mask_bytes.len());

        for (offset, (&value, &mask)) in value_bytes.iter().zip(write_mask_bytes).enumerate() {
            self.init_u8(pos + offset, value, mask)
        }
    }

    /// Place a byte at the specified address with a mask indicating
    /// which bits are writable.
    pub fn u8_at(&mut self, pos: usize, value: u8, write_mask: u8) -> &mut Self {
        self.init_u8(pos, value, write_mask);
        self
    }

    /// Place a read-only byte at the given position.
    pub fn u8_ro_at(&mut self, pos: usize, value: u8) -> &mut Self {
        self.u8_at(pos, value, 0)
    }

    /// Place a writable byte at the given position.
    pub fn u8_rw_at(&mut self, pos: usize, value: u8) -> &mut Self {
        self.u8_at(pos, value, 0xFF)
    }

    /// Place a 16-bit value at the specified address in little-endian
    /// order with a mask indicating which bits are writable.
    pub fn u16_le_at(&mut self, pos: usize, value: u16, write_mask: u16) -> &mut Self {
        self.init_u8_slice(pos, &value.to_le_bytes(), &write_mask.to_le_bytes());
        self
    }

    /// Place a read-only 16-bit value at the given position in
    /// little-endian order.
    pub fn u16_le_ro_at(&mut self, pos: usize, value: u16) -> &mut Self {
        self.u16_le_at(pos, value, 0)
    }

    /// Place a writable 16-bit value at the given position in
    /// little-endian order.
    pub fn u16_le_rw_at(&mut self, pos: usize, value: u16) -> &mut Self {
        self.u16_le_at(pos, value, 0xFFFF)
    }

    /// Place a 32-bit value at the specified address in little-endian
    /// order with a mask indicating which bits are writable.
    pub fn u32_le_at(&mut self, pos: usize, value: u32, write_mask: u32) -> &mut Self {
        self.init_u8_slice(pos, &value.to_le_bytes(), &write_mask.to_le_bytes());
        self
    }

    /// Place a read-only 32-bit value at the given position in
    /// little-endian order.
    pub fn u32_le_ro_at(&mut self, pos: usize, value: u32) -> &mut Self {
        self.u32_le_at(pos, value, 0)
    }

    /// Make all bytes in `range` fully writable without touching their content.
    pub fn rw_range(&mut self, range: std::ops::Range<usize>) -> &mut Self {
        assert!(range.end <= SIZE);

        self.rw_mask[range].fill(0xFF);
        self
    }

    /// The write mask of the byte at `pos`.
    #[must_use]
    pub fn mask(&self, pos: usize) -> u8 {
        self.rw_mask[pos]
    }

    /// Read a little-endian 16-bit value at `pos` without going through a [`Request`].
    #[must_use]
    pub fn u16_le(&self, pos: usize) -> u16 {
        u16::from_le_bytes(self.data[pos..pos + 2].try_into().unwrap())
    }

    /// Read a little-endian 32-bit value at `pos` without going through a [`Request`].
    #[must_use]
    pub fn u32_le(&self, pos: usize) -> u32 {
        u32::from_le_bytes(self.data[pos..pos + 4].try_into().unwrap())
    }

    /// The raw register contents.
    #[must_use]
    pub const fn bytes(&self) -> &[u8; SIZE] {
        &self.data
    }

    /// Replace the register contents wholesale, ignoring the write mask.
    ///
    /// The write mask itself is left alone.
    pub fn load(&mut self, data: &[u8; SIZE]) {
        self.data = *data;
    }

    /// Read a little-endian value.
    ///
    /// Bytes beyond the end of the register file read as `0xFF`.
    #[must_use]
    pub fn read(&self, req: Request) -> u32 {
        fold_iter_le(req.iter_bytes().map(|r| -> u8 {
            usize::try_from(r.addr)
                .ok()
                .and_then(|off| self.data.get(off))
                .copied()
                .unwrap_or(0xFF)
        }))
    }

    /// Write a little-endian value, only changing writable bits.
    ///
    /// Bytes beyond the end of the register file are dropped.
    pub fn write(&mut self, req: Request, val: u32) {
        let le_bytes = val.to_le_bytes();

        for (req, &byte) in req.iter_bytes().zip(&le_bytes) {
            let Some(off) = usize::try_from(req.addr).ok().filter(|&off| off < SIZE) else {
                continue;
            };

            // Set writable bits to zero.
            self.data[off] &= !self.rw_mask[off];

            // Populate writable bits with new content.
            self.data[off] |= byte & self.rw_mask[off];
        }
    }
}

/// Fold a sequence of bytes into a little-endian value.
///
/// **Note**: This function will cause a runtime error in case the
/// iterator yields more bytes than fit into an u32.
fn fold_iter_le(it: impl Iterator<Item = u8>) -> u32 {
    it.enumerate().fold(0, |acc, (pos, byte)| {
        let bytes_in_u32 = 4;
        assert!(pos < bytes_in_u32);

        let shifted_byte: u32 = u32::from(byte) << (pos * 8);
        acc | shifted_byte
    })
}
