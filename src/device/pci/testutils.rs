//! Test doubles for the collaborators of a PCI function.
//!
//! Both doubles write into the same [`EventLog`], so tests can check the order in which backend
//! notifications and routing calls happen.

use std::io;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex};

use crate::device::request::RequestSize;

use super::{
    sbdf::Sbdf,
    traits::{BarOps, IoRequestServer, SpaceKind},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    MapDevice(Sbdf),
    UnmapDevice(Sbdf),
    MapRange(SpaceKind, RangeInclusive<u64>),
    UnmapRange(SpaceKind, RangeInclusive<u64>),
    Map(u64),
    Unmap,
    BarRead(u64, RequestSize),
    BarWrite(u64, RequestSize, u32),
}

#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    pub fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event)
    }

    /// Return all events recorded so far and start over.
    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }

    /// Return only the routing calls recorded so far and start over.
    pub fn take_routing(&self) -> Vec<Event> {
        self.take()
            .into_iter()
            .filter(|e| {
                matches!(
                    e,
                    Event::MapDevice(_)
                        | Event::UnmapDevice(_)
                        | Event::MapRange(..)
                        | Event::UnmapRange(..)
                )
            })
            .collect()
    }
}

/// A routing subsystem that records all calls and optionally fails them.
#[derive(Debug, Default)]
pub struct RecordingServer {
    log: EventLog,
    pub fail: bool,
}

impl RecordingServer {
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: log.clone(),
            fail: false,
        }
    }

    fn record(&self, event: Event) -> io::Result<()> {
        self.log.push(event);

        if self.fail {
            Err(io::Error::other("injected routing failure"))
        } else {
            Ok(())
        }
    }
}

impl IoRequestServer for RecordingServer {
    fn map_pcidev(&mut self, sbdf: Sbdf) -> io::Result<()> {
        self.record(Event::MapDevice(sbdf))
    }

    fn unmap_pcidev(&mut self, sbdf: Sbdf) -> io::Result<()> {
        self.record(Event::UnmapDevice(sbdf))
    }

    fn map_io_range(&mut self, kind: SpaceKind, range: RangeInclusive<u64>) -> io::Result<()> {
        self.record(Event::MapRange(kind, range))
    }

    fn unmap_io_range(&mut self, kind: SpaceKind, range: RangeInclusive<u64>) -> io::Result<()> {
        self.record(Event::UnmapRange(kind, range))
    }
}

/// The access widths a [`TestBar`] implements natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Widths {
    word: bool,
    dword: bool,
}

impl Widths {
    pub const BYTE: Self = Self {
        word: false,
        dword: false,
    };
    pub const UP_TO_WORD: Self = Self {
        word: true,
        dword: false,
    };
    pub const ALL: Self = Self {
        word: true,
        dword: true,
    };
}

/// A BAR backend that behaves like RAM and records every access it performs.
#[derive(Debug)]
pub struct TestBar {
    data: Vec<u8>,
    widths: Widths,
    log: EventLog,
}

impl TestBar {
    pub fn new(size: u32, widths: Widths, log: &EventLog) -> Self {
        Self {
            data: vec![0; size.try_into().unwrap()],
            widths,
            log: log.clone(),
        }
    }

    fn bytes<const N: usize>(&self, offset: u64) -> [u8; N] {
        let offset: usize = offset.try_into().unwrap();
        self.data[offset..offset + N].try_into().unwrap()
    }

    fn set_bytes(&mut self, offset: u64, bytes: &[u8]) {
        let offset: usize = offset.try_into().unwrap();
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes)
    }
}

impl BarOps for TestBar {
    fn read_u8(&mut self, offset: u64) -> u8 {
        self.log.push(Event::BarRead(offset, RequestSize::Size1));
        self.bytes::<1>(offset)[0]
    }

    fn write_u8(&mut self, offset: u64, value: u8) {
        self.log
            .push(Event::BarWrite(offset, RequestSize::Size1, value.into()));
        self.set_bytes(offset, &[value])
    }

    fn read_u16(&mut self, offset: u64) -> Option<u16> {
        self.widths.word.then(|| {
            self.log.push(Event::BarRead(offset, RequestSize::Size2));
            u16::from_le_bytes(self.bytes(offset))
        })
    }

    fn write_u16(&mut self, offset: u64, value: u16) -> Option<()> {
        self.widths.word.then(|| {
            self.log
                .push(Event::BarWrite(offset, RequestSize::Size2, value.into()));
            self.set_bytes(offset, &value.to_le_bytes())
        })
    }

    fn read_u32(&mut self, offset: u64) -> Option<u32> {
        self.widths.dword.then(|| {
            self.log.push(Event::BarRead(offset, RequestSize::Size4));
            u32::from_le_bytes(self.bytes(offset))
        })
    }

    fn write_u32(&mut self, offset: u64, value: u32) -> Option<()> {
        self.widths.dword.then(|| {
            self.log
                .push(Event::BarWrite(offset, RequestSize::Size4, value));
            self.set_bytes(offset, &value.to_le_bytes())
        })
    }

    fn on_map(&mut self, base: u64) {
        self.log.push(Event::Map(base))
    }

    fn on_unmap(&mut self) {
        self.log.push(Event::Unmap)
    }
}
