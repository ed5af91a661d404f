//! # PCI Function Addresses
//!
//! A PCI function is named by its segment, bus, device and function numbers. The routing subsystem
//! qualifies every Configuration Space access with this identifier, packed into a single integer.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use super::constants::{MAX_BUS_DEVICES, MAX_DEVICE_FUNCTIONS};

/// The segment:bus:device.function address of a PCI function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Sbdf {
    /// The PCI segment (domain).
    pub segment: u16,

    /// The bus number.
    pub bus: u8,

    /// The device number. Only the low 5 bits are valid.
    pub device: u8,

    /// The function number. Only the low 3 bits are valid.
    pub function: u8,
}

impl Sbdf {
    /// Create an address from its components.
    ///
    /// The components are not checked. Use [`is_valid`](Self::is_valid) before packing.
    #[must_use]
    pub const fn new(segment: u16, bus: u8, device: u8, function: u8) -> Self {
        Self {
            segment,
            bus,
            device,
            function,
        }
    }

    /// Check whether device and function fit their architectural bit widths.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.device < MAX_BUS_DEVICES && self.function < MAX_DEVICE_FUNCTIONS
    }

    /// The bus/device/function part packed as bits 15:8, 7:3 and 2:0.
    #[must_use]
    pub const fn bdf(&self) -> u16 {
        (self.bus as u16) << 8 | (self.device as u16 & 0x1f) << 3 | (self.function as u16 & 0x7)
    }

    /// The full identifier with the segment in bits 31:16.
    #[must_use]
    pub const fn to_u32(&self) -> u32 {
        (self.segment as u32) << 16 | self.bdf() as u32
    }

    /// Unpack an identifier created by [`to_u32`](Self::to_u32).
    #[must_use]
    pub const fn from_u32(sbdf: u32) -> Self {
        Self {
            segment: (sbdf >> 16) as u16,
            bus: (sbdf >> 8) as u8,
            device: ((sbdf >> 3) & 0x1f) as u8,
            function: (sbdf & 0x7) as u8,
        }
    }
}

impl Display for Sbdf {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.segment, self.bus, self.device, self.function
        )
    }
}

/// A textual PCI address could not be parsed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseSbdfError {
    /// The string does not have the expected shape.
    #[error("Expected [SEGMENT:]BUS:DEVICE.FUNCTION, got {0:?}")]
    Format(String),

    /// One of the components is not a hexadecimal number of the right width.
    #[error("Invalid hexadecimal number {0:?}")]
    Number(String),

    /// Device or function exceed their bit widths.
    #[error("Device {device:#x} or function {function:#x} out of range")]
    OutOfRange {
        /// The parsed device number.
        device: u8,
        /// The parsed function number.
        function: u8,
    },
}

fn parse_hex<T>(s: &str) -> Result<T, ParseSbdfError>
where
    T: TryFrom<u32>,
{
    u32::from_str_radix(s, 16)
        .ok()
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| ParseSbdfError::Number(s.to_owned()))
}

impl FromStr for Sbdf {
    type Err = ParseSbdfError;

    /// Parse the `lspci` notation, `0000:00:03.0` or `00:03.0`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let format_err = || ParseSbdfError::Format(s.to_owned());

        let (location, function) = s.rsplit_once('.').ok_or_else(format_err)?;
        let parts: Vec<&str> = location.split(':').collect();

        let (segment, bus, device) = match parts.as_slice() {
            [bus, device] => (0, parse_hex(bus)?, parse_hex(device)?),
            [segment, bus, device] => (parse_hex(segment)?, parse_hex(bus)?, parse_hex(device)?),
            _ => return Err(format_err()),
        };

        let sbdf = Self::new(segment, bus, device, parse_hex(function)?);

        if sbdf.is_valid() {
            Ok(sbdf)
        } else {
            Err(ParseSbdfError::OutOfRange {
                device: sbdf.device,
                function: sbdf.function,
            })
        }
    }
}

/// Split a Configuration Space address as delivered by the routing subsystem.
///
/// The identifier lives in the upper 32 bits, the register offset in the low 8 bits.
#[must_use]
pub const fn decode_config_address(addr: u64) -> (Sbdf, u64) {
    (Sbdf::from_u32((addr >> 32) as u32), addr & 0xff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn bdf_is_packed_like_hardware() {
        let sbdf = Sbdf::new(0, 0x12, 0x1f, 0x7);

        assert_eq!(sbdf.bdf(), 0x12ff);
        assert_eq!(Sbdf::new(1, 0, 3, 0).to_u32(), 0x0001_0018);
    }

    #[test]
    fn out_of_range_components_are_invalid() {
        assert!(Sbdf::new(0, 0xff, 31, 7).is_valid());
        assert!(!Sbdf::new(0, 0, 32, 0).is_valid());
        assert!(!Sbdf::new(0, 0, 0, 8).is_valid());
    }

    #[test]
    fn lspci_notation_is_parsed() {
        assert_eq!("00:03.0".parse(), Ok(Sbdf::new(0, 0, 3, 0)));
        assert_eq!("0001:0a:1f.7".parse(), Ok(Sbdf::new(1, 0x0a, 0x1f, 7)));
        assert_eq!(Sbdf::new(1, 0x0a, 0x1f, 7).to_string(), "0001:0a:1f.7");
    }

    #[test]
    fn malformed_addresses_are_rejected() {
        assert!(matches!(
            "00:03".parse::<Sbdf>(),
            Err(ParseSbdfError::Format(_))
        ));
        assert!(matches!(
            "zz:03.0".parse::<Sbdf>(),
            Err(ParseSbdfError::Number(_))
        ));
        assert_eq!(
            "00:20.0".parse::<Sbdf>(),
            Err(ParseSbdfError::OutOfRange {
                device: 0x20,
                function: 0
            })
        );
    }

    #[test]
    fn config_addresses_are_split() {
        let (sbdf, offset) = decode_config_address(0x0000_0018_0000_0104);

        assert_eq!(sbdf, Sbdf::new(0, 0, 3, 0));
        assert_eq!(offset, 0x04);
    }

    proptest! {
        #[test]
        fn packing_valid_addresses_is_reversible(segment: u16, bus: u8, device in 0u8..32, function in 0u8..8) {
            let sbdf = Sbdf::new(segment, bus, device, function);

            assert_eq!(Sbdf::from_u32(sbdf.to_u32()), sbdf);
        }
    }
}
