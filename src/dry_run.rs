//! A dry run of the PCI function emulation.
//!
//! There is no hypervisor behind the routing calls. We play both sides: the device model registers
//! the function and its BARs, and we act as firmware and guest driver by programming the BARs and
//! touching their registers.

use std::io;
use std::ops::RangeInclusive;

use anyhow::{Context, Result};
use tracing::{debug, info};
use vpci::device::{
    pci::{
        constants::config_space::{command, mask, offset},
        function::PciFunction,
        info::PciInfo,
        sbdf::Sbdf,
        traits::{IoRequestServer, SpaceKind},
    },
    request::{Request, RequestSize},
};

use crate::{cli::Cli, scratch_bar::ScratchBar};

/// A routing subsystem that only logs what it is asked to do.
#[derive(Debug, Default)]
pub struct DryRunServer;

impl IoRequestServer for DryRunServer {
    fn map_pcidev(&mut self, sbdf: Sbdf) -> io::Result<()> {
        info!("Routing config space of {sbdf}");
        Ok(())
    }

    fn unmap_pcidev(&mut self, sbdf: Sbdf) -> io::Result<()> {
        info!("No longer routing config space of {sbdf}");
        Ok(())
    }

    fn map_io_range(&mut self, kind: SpaceKind, range: RangeInclusive<u64>) -> io::Result<()> {
        info!("Routing {kind:?} {:#x}..={:#x}", range.start(), range.end());
        Ok(())
    }

    fn unmap_io_range(&mut self, kind: SpaceKind, range: RangeInclusive<u64>) -> io::Result<()> {
        info!("No longer routing {kind:?} {:#x}..={:#x}", range.start(), range.end());
        Ok(())
    }
}

fn bar_request(index: u8) -> Request {
    Request::new(offset::bar(index.into()) as u64, RequestSize::Size4)
}

/// Determine the size of a BAR the way a guest operating system does.
fn probe_bar(function: &mut PciFunction<DryRunServer>, index: u8, kind: SpaceKind) -> u32 {
    let sbdf = function.sbdf();
    let req = bar_request(index);
    let addr_mask = match kind {
        SpaceKind::Memory => mask::MMIO_BAR_ADDRESS,
        SpaceKind::Io => mask::PIO_BAR_ADDRESS,
    };

    let original = function.read_config(sbdf, req);
    function.write_config(sbdf, req, 0xffff_ffff);
    let probed = function.read_config(sbdf, req);
    function.write_config(sbdf, req, original);

    (!(probed & addr_mask)).wrapping_add(1)
}

pub fn run(args: &Cli) -> Result<()> {
    let (class, subclass, prog_if) = args.class_code();
    let mut info = PciInfo::new(args.vendor, args.device)
        .location(args.sbdf)
        .class(class, subclass, prog_if)
        .revision(args.revision)
        .interrupt_pin(args.interrupt_pin);

    if let Some((vendor, id)) = args.subsystem {
        info = info.subsystem(vendor, id);
    }

    let mut function = PciFunction::register(info, DryRunServer)
        .context("Failed to register PCI function")?;
    let sbdf = function.sbdf();

    for bar in &args.bars {
        function
            .register_bar(
                bar.index,
                bar.kind,
                bar.order,
                Box::new(ScratchBar::new(bar.order)),
            )
            .with_context(|| format!("Failed to register BAR{}", bar.index))?;
    }

    if args.probe {
        for bar in &args.bars {
            let size = probe_bar(&mut function, bar.index, bar.kind);
            info!("BAR{}: probed size {size:#x}", bar.index);
        }
    }

    for bar in &args.bars {
        if let Some(address) = bar.address {
            function.write_config(sbdf, bar_request(bar.index), address);
        }
    }

    let mut enable = 0;
    for bar in &args.bars {
        enable |= match bar.kind {
            SpaceKind::Memory => command::MEMORY_SPACE,
            SpaceKind::Io => command::IO_SPACE,
        };
    }
    function.write_config(
        sbdf,
        Request::new(offset::COMMAND as u64, RequestSize::Size2),
        enable.into(),
    );

    // Touch the first register of every mapped BAR, with a width the backend has to split.
    for bar in &args.bars {
        let Some(base) = function.bar(bar.index).and_then(|bar_info| bar_info.mapped_at) else {
            info!("BAR{}: not mapped", bar.index);
            continue;
        };

        let req = Request::new(base, RequestSize::Size2);
        function.write_bar(bar.kind, req, 0xcafe);
        let value = function.read_bar(bar.kind, req);

        info!("BAR{}: mapped at {base:#x}, read back {value:#x}", bar.index);
    }

    function.log_header();
    println!("{}", function.config_space().header());

    for bar in &args.bars {
        function.deregister_bar(bar.index);
    }
    function.deregister();

    debug!("Config space at exit: {:x?}", function.config_bytes());

    Ok(())
}
