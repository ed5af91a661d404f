//! This module implements the CLI interface.
//!
//! Numbers are given in hex, with or without `0x` prefix, because that is how PCI identifiers and
//! addresses are usually written down.
use std::str::FromStr;

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use vpci::device::pci::{sbdf::Sbdf, traits::SpaceKind};

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = env!("CARGO_PKG_DESCRIPTION"),
    long_about = None
)]
pub struct Cli {
    /// Enable verbose logging. Can be specified multiple times to
    /// increase verbosity.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// The address of the function as [SEGMENT:]BUS:DEVICE.FUNCTION.
    #[arg(long, default_value = "0000:00:03.0")]
    pub sbdf: Sbdf,

    /// The PCI vendor ID.
    #[arg(long, value_parser = parse_hex::<u16>, default_value = "5853")]
    pub vendor: u16,

    /// The PCI device ID.
    #[arg(long, value_parser = parse_hex::<u16>, default_value = "0001")]
    pub device: u16,

    /// The 24-bit class code: class, subclass and programming interface.
    #[arg(long, value_parser = parse_hex::<u32>, default_value = "088000")]
    pub class: u32,

    /// The subsystem as VENDOR:ID.
    #[arg(long, value_parser = parse_subsystem)]
    pub subsystem: Option<(u16, u16)>,

    /// The revision ID.
    #[arg(long, value_parser = parse_hex::<u8>, default_value = "0")]
    pub revision: u8,

    /// The interrupt pin. 0 means none, 1 to 4 are INTA to INTD.
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=4), default_value = "1")]
    pub interrupt_pin: u8,

    /// A BAR as INDEX:KIND:ORDER[@ADDRESS]. KIND is `mem` or `io`, the size is
    /// 2^ORDER bytes. Can be specified multiple times.
    ///
    /// With an address, the BAR is programmed like firmware would do it.
    #[arg(long = "bar", value_name = "BAR")]
    pub bars: Vec<BarArg>,

    /// Size-probe every BAR before programming it.
    #[arg(long)]
    pub probe: bool,
}

impl Cli {
    /// Split the class code into class, subclass and programming interface.
    pub fn class_code(&self) -> (u8, u8, u8) {
        let [prog_if, subclass, class, _] = self.class.to_le_bytes();

        (class, subclass, prog_if)
    }
}

/// A BAR given on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarArg {
    pub index: u8,
    pub kind: SpaceKind,
    pub order: u32,
    pub address: Option<u32>,
}

impl FromStr for BarArg {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (layout, address) = match s.split_once('@') {
            Some((layout, address)) => (layout, Some(parse_hex(address)?)),
            None => (s, None),
        };

        let [index, kind, order] = layout.split(':').collect::<Vec<_>>()[..] else {
            bail!("{s}: expected INDEX:KIND:ORDER[@ADDRESS]");
        };

        let kind = match kind {
            "mem" => SpaceKind::Memory,
            "io" => SpaceKind::Io,
            _ => bail!("{s}: unknown BAR kind {kind}"),
        };

        Ok(Self {
            index: index.parse().with_context(|| format!("{s}: invalid index"))?,
            kind,
            order: order.parse().with_context(|| format!("{s}: invalid order"))?,
            address,
        })
    }
}

fn parse_hex<T: TryFrom<u32>>(s: &str) -> anyhow::Result<T> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    let value = u32::from_str_radix(digits, 16).with_context(|| format!("{s} is not a hex number"))?;

    T::try_from(value).map_err(|_| anyhow!("{s} is out of range"))
}

fn parse_subsystem(s: &str) -> anyhow::Result<(u16, u16)> {
    let (vendor, id) = s
        .split_once(':')
        .ok_or_else(|| anyhow!("{s}: expected VENDOR:ID"))?;

    Ok((parse_hex(vendor)?, parse_hex(id)?))
}
