//! # Access Requests
//!
//! Every guest access that reaches the emulation, be it to the PCI Configuration Space or to a
//! region behind a BAR, is described by a [`Request`]: an address and one of the access widths
//! PCI allows for a single transaction.

use std::fmt::{self, Display, Formatter};
use std::{
    convert::{TryFrom, TryInto},
    error::Error,
};

/// The size of an access.
///
/// We don't use plain integers here to prevent use with illegal sizes. Config Space and BAR
/// accesses are at most 4 bytes wide. [`RequestSize`] can be converted from and to integers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum RequestSize {
    Size1 = 1,
    Size2 = 2,
    Size4 = 4,
}

impl RequestSize {
    /// The value with all bits of an access of this size set.
    ///
    /// This is what a read returns when no device answers it.
    #[must_use]
    pub const fn all_ones(self) -> u32 {
        let empty_bits = u32::BITS - u8::BITS * self as u32;

        !0 >> empty_bits
    }

    /// The next narrower access size, if there is one.
    #[must_use]
    pub const fn narrower(self) -> Option<Self> {
        match self {
            Self::Size1 => None,
            Self::Size2 => Some(Self::Size1),
            Self::Size4 => Some(Self::Size2),
        }
    }
}

impl From<RequestSize> for u8 {
    fn from(r: RequestSize) -> Self {
        r as Self
    }
}

impl From<RequestSize> for u32 {
    fn from(r: RequestSize) -> Self {
        r as Self
    }
}

impl From<RequestSize> for u64 {
    fn from(r: RequestSize) -> Self {
        r as Self
    }
}

impl From<RequestSize> for usize {
    fn from(r: RequestSize) -> Self {
        r as Self
    }
}

impl Display for RequestSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let val = u8::from(*self);
        write!(f, "{val}")
    }
}

/// An attempt was made to convert a size into a [`RequestSize`] that
/// cannot be represented.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IllegalRequestSize {}

impl Display for IllegalRequestSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Access size must be 1, 2 or 4 bytes")
    }
}

impl Error for IllegalRequestSize {}

impl TryFrom<u32> for RequestSize {
    type Error = IllegalRequestSize;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        u64::from(value).try_into()
    }
}

impl TryFrom<usize> for RequestSize {
    type Error = IllegalRequestSize;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        u64::try_from(value)
            .map_err(|_| IllegalRequestSize {})?
            .try_into()
    }
}

impl TryFrom<u64> for RequestSize {
    type Error = IllegalRequestSize;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Size1),
            2 => Ok(Self::Size2),
            4 => Ok(Self::Size4),
            _ => Err(IllegalRequestSize {}),
        }
    }
}

/// The address-size pair of a single access.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Request {
    /// The address of the request. Whether this is a Config Space offset, a guest physical
    /// address or an offset into a BAR depends on where the request is used.
    pub addr: u64,

    /// The size of this request.
    pub size: RequestSize,
}

impl Display for Request {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let size: u64 = self.size.into();

        write!(f, "{:#010x}+{:x}", self.addr, size)
    }
}

impl Request {
    /// Create a new request from address and size.
    #[must_use]
    pub const fn new(addr: u64, size: RequestSize) -> Self {
        Self { addr, size }
    }

    /// Split a request into individual byte requests.
    ///
    /// Bytes are yielded in increasing address order, which for little-endian values is also the
    /// order from least to most significant byte.
    pub fn iter_bytes(&self) -> impl Iterator<Item = Self> {
        self.iter_chunks(RequestSize::Size1)
    }

    /// Split a request into consecutive requests of size `chunk`.
    ///
    /// `chunk` must not be larger than the request itself.
    pub fn iter_chunks(&self, chunk: RequestSize) -> impl Iterator<Item = Self> {
        assert!(
            u8::from(chunk) <= u8::from(self.size),
            "Cannot split a {} byte request into {} byte chunks",
            self.size,
            chunk
        );

        let step = u64::from(chunk);
        let addr = self.addr;

        (0..u64::from(self.size) / step).map(move |i| Self::new(addr + i * step, chunk))
    }

    /// Return the same request moved to be relative to `base`.
    ///
    /// `base` must not be larger than the address of the request.
    #[must_use]
    pub fn relative_to(&self, base: u64) -> Self {
        assert!(base <= self.addr);

        Self::new(self.addr - base, self.size)
    }
}
