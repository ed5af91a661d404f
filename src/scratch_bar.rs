//! A BAR backend that behaves like plain memory.

use tracing::debug;
use vpci::device::pci::traits::BarOps;

/// How much of a BAR is backed by memory. Offsets beyond read as all ones and ignore writes.
const BACKED_SIZE: usize = 0x1000;

/// Scratch registers behind a BAR.
///
/// Only byte and dword accesses are implemented natively. Word accesses are split into bytes.
#[derive(Debug)]
pub struct ScratchBar {
    data: Vec<u8>,
}

impl ScratchBar {
    /// Create scratch registers for a BAR of `2^order` bytes.
    pub fn new(order: u32) -> Self {
        let size = 1usize.checked_shl(order).unwrap_or(usize::MAX);

        Self {
            data: vec![0; size.min(BACKED_SIZE)],
        }
    }

    fn range(offset: u64, len: usize) -> Option<std::ops::Range<usize>> {
        let start = usize::try_from(offset).ok()?;

        Some(start..start.checked_add(len)?)
    }

    fn bytes(&self, offset: u64, len: usize) -> Option<&[u8]> {
        self.data.get(Self::range(offset, len)?)
    }

    fn bytes_mut(&mut self, offset: u64, len: usize) -> Option<&mut [u8]> {
        self.data.get_mut(Self::range(offset, len)?)
    }
}

impl BarOps for ScratchBar {
    fn read_u8(&mut self, offset: u64) -> u8 {
        self.bytes(offset, 1).map_or(0xFF, |bytes| bytes[0])
    }

    fn write_u8(&mut self, offset: u64, value: u8) {
        if let Some(bytes) = self.bytes_mut(offset, 1) {
            bytes[0] = value;
        }
    }

    fn read_u32(&mut self, offset: u64) -> Option<u32> {
        let bytes = self.bytes(offset, 4)?;

        Some(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn write_u32(&mut self, offset: u64, value: u32) -> Option<()> {
        self.bytes_mut(offset, 4)?
            .copy_from_slice(&value.to_le_bytes());

        Some(())
    }

    fn on_map(&mut self, base: u64) {
        debug!("scratch BAR now at {base:#x}");
    }

    fn on_unmap(&mut self) {
        debug!("scratch BAR unmapped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_and_dwords_share_storage() {
        let mut bar = ScratchBar::new(4);

        assert_eq!(bar.write_u32(4, 0x4433_2211), Some(()));
        assert_eq!(bar.read_u8(5), 0x22);

        bar.write_u8(7, 0xAA);
        assert_eq!(bar.read_u32(4), Some(0xAA33_2211));
    }

    #[test]
    fn words_are_not_native() {
        let mut bar = ScratchBar::new(4);

        assert_eq!(bar.read_u16(0), None);
        assert_eq!(bar.write_u16(0, 0xFFFF), None);
        assert_eq!(bar.read_u32(0), Some(0));
    }

    #[test]
    fn accesses_past_the_end_are_byte_wise_and_harmless() {
        let mut bar = ScratchBar::new(4);

        // The dword does not fit, so the caller falls back to bytes. Only the first two exist.
        assert_eq!(bar.write_u32(14, 0xAABB_CCDD), None);
        bar.write_u8(14, 0xDD);
        bar.write_u8(15, 0xCC);
        bar.write_u8(16, 0xBB);
        bar.write_u8(17, 0xAA);

        assert_eq!(bar.read_u32(14), None);
        assert_eq!(bar.read_u8(15), 0xCC);
        assert_eq!(bar.read_u8(16), 0xFF);
        assert_eq!(bar.read_u8(u64::MAX), 0xFF);
    }

    #[test]
    fn large_bars_are_only_partially_backed() {
        let mut bar = ScratchBar::new(40);

        bar.write_u8(0xfff, 0x12);
        bar.write_u8(0x1000, 0x34);

        assert_eq!(bar.read_u8(0xfff), 0x12);
        assert_eq!(bar.read_u8(0x1000), 0xFF);
        assert_eq!(bar.data.len(), BACKED_SIZE);
    }
}
