//! Target driver layer (L4, spec §3/§4): the debug session talks to a single
//! [`TargetDriver`], which dispatches to whichever vendor driver the attached
//! probe and target description resolved to.

pub mod avr8;
pub mod riscv;

use crate::clock::Clock;
use crate::error::ChipLinkResult;
use crate::probe::edbg::EdbgTransport;
use crate::probe::wch::WchTransport;
use crate::target_descriptor::SegmentType;

use avr8::Avr8Driver;
use riscv::{RiscVDriver, RiscVMemoryTranslator};

/// Per-access parameters the AVR8 driver needs beyond `(segment_type,
/// address, length)` — page geometry, OCD register exclusion, the probe's
/// max payload size — resolved by the session from the target description.
/// RISC-V reads/writes ignore this (the WCH-Link probe has no equivalent
/// masked-read/page-alignment surface).
#[derive(Debug, Clone, Default)]
pub struct MemoryAccessParams {
    pub page_size: Option<u32>,
    pub boot_section_start: Option<u32>,
    pub ocd_data_register: Option<u32>,
    pub excluded_addresses: Vec<u32>,
    pub probe_input_report_size: u32,
}

/// Session-facing union of the two vendor drivers (spec §9: "the session
/// layer is generic over which vendor driver is live; it never matches on
/// vendor beyond this one dispatch point"). Memory/breakpoint/run-control
/// operations common to both vendors are exposed directly; operations that
/// only make sense for one vendor (fuse writes, erase modes, hardware
/// breakpoints) stay on the concrete driver, reached via [`TargetDriver::as_avr8`]
/// /[`TargetDriver::as_riscv`].
pub enum TargetDriver<ET, WT, EC, WC, M> {
    Avr8(Avr8Driver<ET, EC>),
    RiscV(RiscVDriver<WT, WC, M>),
}

impl<ET, WT, EC, WC, M> TargetDriver<ET, WT, EC, WC, M>
where
    ET: EdbgTransport,
    WT: WchTransport,
    EC: Clock,
    WC: Clock,
    M: RiscVMemoryTranslator,
{
    pub fn as_avr8(&mut self) -> Option<&mut Avr8Driver<ET, EC>> {
        match self {
            TargetDriver::Avr8(driver) => Some(driver),
            TargetDriver::RiscV(_) => None,
        }
    }

    pub fn as_riscv(&mut self) -> Option<&mut RiscVDriver<WT, WC, M>> {
        match self {
            TargetDriver::Avr8(_) => None,
            TargetDriver::RiscV(driver) => Some(driver),
        }
    }

    pub fn read_memory(
        &mut self,
        segment_type: SegmentType,
        address: u32,
        length: u32,
        params: &MemoryAccessParams,
    ) -> ChipLinkResult<Vec<u8>> {
        match self {
            TargetDriver::Avr8(driver) => driver.read_memory(
                segment_type,
                address,
                length,
                params.page_size,
                params.boot_section_start,
                params.ocd_data_register,
                &params.excluded_addresses,
                params.probe_input_report_size,
            ),
            TargetDriver::RiscV(driver) => driver.read_memory(segment_type, address, length),
        }
    }

    pub fn write_memory(
        &mut self,
        segment_type: SegmentType,
        address: u32,
        data: &[u8],
        params: &MemoryAccessParams,
    ) -> ChipLinkResult<()> {
        match self {
            TargetDriver::Avr8(driver) => driver.write_memory(
                segment_type,
                address,
                data,
                params.page_size,
                params.boot_section_start,
                params.probe_input_report_size,
            ),
            TargetDriver::RiscV(driver) => driver.write_memory(segment_type, address, data),
        }
    }

    pub fn get_program_counter(&mut self) -> ChipLinkResult<u32> {
        match self {
            TargetDriver::Avr8(driver) => driver.get_program_counter(),
            TargetDriver::RiscV(driver) => driver.get_program_counter(),
        }
    }

    pub fn set_program_counter(&mut self, address: u32) -> ChipLinkResult<()> {
        match self {
            TargetDriver::Avr8(driver) => driver.set_program_counter(address),
            TargetDriver::RiscV(driver) => driver.set_program_counter(address),
        }
    }

    pub fn run(&mut self) -> ChipLinkResult<()> {
        match self {
            TargetDriver::Avr8(driver) => driver.run(),
            TargetDriver::RiscV(driver) => driver.resume(),
        }
    }

    pub fn stop(&mut self) -> ChipLinkResult<()> {
        match self {
            TargetDriver::Avr8(driver) => driver.stop(),
            TargetDriver::RiscV(driver) => driver.halt(),
        }
    }

    pub fn step(&mut self) -> ChipLinkResult<()> {
        match self {
            TargetDriver::Avr8(driver) => driver.step(),
            TargetDriver::RiscV(driver) => driver.step(),
        }
    }

    pub fn set_software_breakpoint(&mut self, address: u32) -> ChipLinkResult<()> {
        match self {
            TargetDriver::Avr8(driver) => driver.set_software_breakpoint(address),
            TargetDriver::RiscV(driver) => driver.set_software_breakpoint(address),
        }
    }

    pub fn clear_software_breakpoint(&mut self, address: u32) -> ChipLinkResult<()> {
        match self {
            TargetDriver::Avr8(driver) => driver.clear_software_breakpoint(address),
            TargetDriver::RiscV(driver) => driver.clear_software_breakpoint(address),
        }
    }

    pub fn clear_all_breakpoints(&mut self) -> ChipLinkResult<()> {
        match self {
            TargetDriver::Avr8(driver) => driver.clear_all_breakpoints(),
            TargetDriver::RiscV(driver) => driver.clear_all_breakpoints(),
        }
    }
}
