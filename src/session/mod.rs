//! Debug Session (L5, spec §4.7/§5): consumes already-parsed `CommandPacket`s
//! and dispatches them onto a single owned [`TargetDriver`], tracking the
//! active range-stepping session and the ordered teardown sequence.
//!
//! GDB wire parsing/framing is the excluded collaborator (spec §6); this
//! module's contract starts at the parsed packet and ends at an RSP reply
//! body, leaving `$`/`#checksum` framing to [`RspTransport`].

pub mod dispatch;

use log::{error, info, warn};

use crate::clock::Clock;
use crate::driver::avr8::registers::{extract_register_value, plan_batched_reads, to_wire_order, RegisterRequest};
use crate::driver::{MemoryAccessParams, TargetDriver};
use crate::error::{ChipLinkError, ChipLinkResult};
use crate::probe::edbg::EdbgTransport;
use crate::probe::wch::WchTransport;
use crate::driver::riscv::RiscVMemoryTranslator;
use crate::rangestep::{self, RangeSteppingSession, ResumeDecision};
use crate::target_descriptor::{
    HalfOpenRange, RegisterDescriptor, RegisterGroupDescriptor, SegmentType, TargetDescriptor,
};

use std::collections::BTreeMap;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointKind {
    Software,
    Hardware,
}

/// The subset of GDB RSP commands the core must honour (spec §6), already
/// parsed by the excluded wire-protocol collaborator.
#[derive(Debug, Clone)]
pub enum CommandPacket {
    HaltReason,
    ReadAllRegisters,
    WriteAllRegisters(Vec<u8>),
    ReadRegister(u32),
    WriteRegister(u32, Vec<u8>),
    ReadMemory { address: u32, length: u32 },
    WriteMemory { address: u32, data: Vec<u8> },
    WriteMemoryBinary { address: u32, data: Vec<u8> },
    Continue,
    Step,
    ContinueRange { start: u32, end: u32 },
    SetBreakpoint { kind: BreakpointKind, address: u32 },
    ClearBreakpoint { kind: BreakpointKind, address: u32 },
    QuerySupported,
    QueryFeatures,
    Interrupt,
}

/// Narrow collaborator contract for the RSP socket transport (L6, out of
/// scope): reads a fully-framed packet body (checksum verified, `$`/`#`
/// stripped) and writes one back the same way.
pub trait RspTransport {
    fn read_packet(&mut self) -> ChipLinkResult<Option<String>>;
    fn write_packet(&mut self, body: &str) -> ChipLinkResult<()>;
    /// Non-blocking check for an out-of-band `\x03` (Ctrl-C) interrupt.
    fn read_interrupt(&mut self) -> ChipLinkResult<bool>;
}

/// Reply body the session hands back to the transport for framing. `Stop`
/// carries a pre-formatted RSP stop-reply (`S05`/`T05...`); everything else
/// is the raw body string (`OK`, hex data, or `E01`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionReply {
    Ok,
    Data(String),
    Stop(String),
    Unsupported,
}

impl SessionReply {
    pub fn body(&self) -> String {
        match self {
            SessionReply::Ok => "OK".to_string(),
            SessionReply::Data(data) => data.clone(),
            SessionReply::Stop(stop) => stop.clone(),
            SessionReply::Unsupported => String::new(),
        }
    }
}

/// Default EDBG HID report payload size (spec §6 leaves USB enumeration to
/// the excluded transport layer); used only to size AVR8 chunked memory
/// requests when the real probe didn't report one via
/// [`DebugSession::with_probe_input_report_size`].
const DEFAULT_PROBE_INPUT_REPORT_SIZE: u32 = 64;

pub struct DebugSession<ET, WT, EC, WC, M> {
    driver: TargetDriver<ET, WT, EC, WC, M>,
    target: Rc<TargetDescriptor>,
    range_stepping: Option<RangeSteppingSession>,
    waiting_for_break: bool,
    probe_input_report_size: u32,
}

impl<ET, WT, EC, WC, M> DebugSession<ET, WT, EC, WC, M>
where
    ET: EdbgTransport,
    WT: WchTransport,
    EC: Clock,
    WC: Clock,
    M: RiscVMemoryTranslator,
{
    pub fn new(driver: TargetDriver<ET, WT, EC, WC, M>, target: Rc<TargetDescriptor>) -> Self {
        Self {
            driver,
            target,
            range_stepping: None,
            waiting_for_break: false,
            probe_input_report_size: DEFAULT_PROBE_INPUT_REPORT_SIZE,
        }
    }

    /// Overrides the chunking size used for AVR8 memory requests with the
    /// value the live probe actually reported during USB enumeration.
    pub fn with_probe_input_report_size(mut self, probe_input_report_size: u32) -> Self {
        self.probe_input_report_size = probe_input_report_size;
        self
    }

    fn segment_for(&self, segment_type: SegmentType) -> Option<&crate::target_descriptor::MemorySegmentDescriptor> {
        self.target
            .address_spaces
            .values()
            .find_map(|space| space.segment_of_type(segment_type))
    }

    /// Resolves the parameters the AVR8 driver needs for a given access from
    /// the target description (spec §4.2: page geometry and the debugWIRE
    /// OCDDR exclusion are per-device, not per-request, quirks). Ignored
    /// entirely by the RISC-V driver.
    fn memory_access_params(&self, segment_type: SegmentType) -> MemoryAccessParams {
        MemoryAccessParams {
            page_size: self.segment_for(segment_type).and_then(|segment| segment.page_size),
            boot_section_start: self.target.property_u32("avr8.boot_section_start"),
            ocd_data_register: self.target.property_u32("avr8.ocd_data_register"),
            excluded_addresses: Vec::new(),
            probe_input_report_size: self.probe_input_report_size,
        }
    }

    fn flash_segment_range(&self) -> ChipLinkResult<HalfOpenRange> {
        let space = self
            .target
            .address_spaces
            .values()
            .next()
            .ok_or_else(|| ChipLinkError::InvalidTargetDescriptionData("target has no address spaces".into()))?;
        let segment = space.segment_of_type(SegmentType::Flash).ok_or_else(|| {
            ChipLinkError::InvalidTargetDescriptionData("target description has no flash segment".into())
        })?;
        Ok(HalfOpenRange::new(
            segment.address_range.start as u32,
            segment.address_range.end as u32 + 1,
        ))
    }

    /// Flattens every register in the target description's peripheral tree
    /// into the fixed order GDB's `g`/`G` packets address registers by index
    /// (spec §4.2/§4.7): each peripheral's groups depth-first, registers
    /// before subgroups. Returned owned so callers can hold it across the
    /// mutable driver calls a batched read/write needs.
    fn all_registers(&self) -> Vec<(String, RegisterDescriptor)> {
        fn collect(group: &RegisterGroupDescriptor, out: &mut Vec<(String, RegisterDescriptor)>) {
            for register in &group.registers {
                out.push((group.address_space_key.clone(), register.clone()));
            }
            for subgroup in &group.subgroups {
                collect(subgroup, out);
            }
        }

        let mut out = Vec::new();
        for peripheral in &self.target.peripherals {
            for group in &peripheral.register_groups {
                collect(group, &mut out);
            }
        }
        out
    }

    /// Batches every known register into at most one read per address space
    /// (spec §4.2) and returns their values concatenated in `all_registers`
    /// order. Falls back to just the program counter when the target
    /// description has no register descriptors at all.
    fn read_all_registers(&mut self) -> ChipLinkResult<Vec<u8>> {
        let registers = self.all_registers();
        if registers.is_empty() {
            let pc = self.driver.get_program_counter()?;
            return Ok(pc.to_le_bytes().to_vec());
        }

        let requests: Vec<RegisterRequest<'_>> = registers
            .iter()
            .map(|(address_space_key, descriptor)| RegisterRequest {
                address_space_key,
                descriptor,
            })
            .collect();
        let batches = plan_batched_reads(&requests);

        let mut batch_data: BTreeMap<&str, (u64, Vec<u8>)> = BTreeMap::new();
        for batch in &batches {
            let segment_type = dispatch::segment_type_for_address(&self.target, batch.start_address as u32);
            let params = self.memory_access_params(segment_type);
            let data = self
                .driver
                .read_memory(segment_type, batch.start_address as u32, batch.length, &params)?;
            batch_data.insert(batch.address_space_key.as_str(), (batch.start_address, data));
        }

        let mut result = Vec::new();
        for (address_space_key, descriptor) in &registers {
            let (batch_start, data) = batch_data.get(address_space_key.as_str()).ok_or_else(|| {
                ChipLinkError::InvalidTargetDescriptionData(format!(
                    "no batched read covers address space '{address_space_key}'"
                ))
            })?;
            result.extend(extract_register_value(*batch_start, data, descriptor));
        }
        Ok(result)
    }

    /// Writes back every register in `all_registers` order from a `G` packet
    /// payload, or just the program counter when the target description has
    /// no registers. Stops at the first register whose bytes weren't fully
    /// supplied rather than reading past the end of `data`.
    fn write_all_registers(&mut self, data: &[u8]) -> ChipLinkResult<()> {
        let registers = self.all_registers();
        if registers.is_empty() {
            if data.len() >= 4 {
                let pc = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
                self.driver.set_program_counter(pc)?;
            }
            return Ok(());
        }

        let mut offset = 0usize;
        for (_, descriptor) in &registers {
            let size = descriptor.size as usize;
            if offset + size > data.len() {
                break;
            }
            let segment_type = dispatch::segment_type_for_address(&self.target, descriptor.start_address as u32);
            let params = self.memory_access_params(segment_type);
            let wire = to_wire_order(&data[offset..offset + size]);
            self.driver
                .write_memory(segment_type, descriptor.start_address as u32, &wire, &params)?;
            offset += size;
        }
        Ok(())
    }

    /// Dispatches one parsed command packet, catching every error at this
    /// boundary and converting it to the fixed `E01` reply (spec §7
    /// propagation policy): RSP command handling never propagates a driver
    /// error up to the run-loop.
    pub fn dispatch(&mut self, packet: CommandPacket) -> SessionReply {
        match self.dispatch_inner(packet) {
            Ok(reply) => reply,
            Err(err) => {
                warn!("command handling failed, replying {}: {err}", err.rsp_error_code());
                SessionReply::Data(err.rsp_error_code().to_string())
            }
        }
    }

    fn dispatch_inner(&mut self, packet: CommandPacket) -> ChipLinkResult<SessionReply> {
        match packet {
            CommandPacket::HaltReason => Ok(SessionReply::Stop(dispatch::stop_reply(5))),
            CommandPacket::ReadMemory { address, length } => {
                let segment_type = dispatch::segment_type_for_address(&self.target, address);
                let params = self.memory_access_params(segment_type);
                let bytes = self.driver.read_memory(segment_type, address, length, &params)?;
                Ok(SessionReply::Data(dispatch::to_hex(&bytes)))
            }
            CommandPacket::WriteMemory { address, data } | CommandPacket::WriteMemoryBinary { address, data } => {
                let segment_type = dispatch::segment_type_for_address(&self.target, address);
                let params = self.memory_access_params(segment_type);
                self.driver.write_memory(segment_type, address, &data, &params)?;
                Ok(SessionReply::Ok)
            }
            CommandPacket::ReadAllRegisters => {
                let bytes = self.read_all_registers()?;
                Ok(SessionReply::Data(dispatch::to_hex(&bytes)))
            }
            CommandPacket::ReadRegister(index) => {
                let registers = self.all_registers();
                match registers.get(index as usize) {
                    Some((_, descriptor)) => {
                        let segment_type =
                            dispatch::segment_type_for_address(&self.target, descriptor.start_address as u32);
                        let params = self.memory_access_params(segment_type);
                        let data = self.driver.read_memory(
                            segment_type,
                            descriptor.start_address as u32,
                            descriptor.size,
                            &params,
                        )?;
                        let value = extract_register_value(descriptor.start_address, &data, descriptor);
                        Ok(SessionReply::Data(dispatch::to_hex(&value)))
                    }
                    None => {
                        let pc = self.driver.get_program_counter()?;
                        Ok(SessionReply::Data(dispatch::to_hex(&pc.to_le_bytes())))
                    }
                }
            }
            CommandPacket::WriteAllRegisters(data) => {
                self.write_all_registers(&data)?;
                Ok(SessionReply::Ok)
            }
            CommandPacket::WriteRegister(index, data) => {
                let registers = self.all_registers();
                match registers.get(index as usize) {
                    Some((_, descriptor)) => {
                        let segment_type =
                            dispatch::segment_type_for_address(&self.target, descriptor.start_address as u32);
                        let params = self.memory_access_params(segment_type);
                        let wire = to_wire_order(&data);
                        self.driver
                            .write_memory(segment_type, descriptor.start_address as u32, &wire, &params)?;
                    }
                    None if data.len() >= 4 => {
                        let pc = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
                        self.driver.set_program_counter(pc)?;
                    }
                    None => {}
                }
                Ok(SessionReply::Ok)
            }
            CommandPacket::Continue => {
                self.range_stepping = None;
                self.driver.run()?;
                self.waiting_for_break = true;
                Ok(SessionReply::Ok)
            }
            CommandPacket::Step => {
                self.range_stepping = None;
                self.driver.step()?;
                self.waiting_for_break = true;
                Ok(SessionReply::Ok)
            }
            CommandPacket::Interrupt => {
                self.driver.stop()?;
                self.waiting_for_break = false;
                Ok(SessionReply::Stop(dispatch::stop_reply(5)))
            }
            CommandPacket::ContinueRange { start, end } => self.start_range_step(start, end),
            CommandPacket::SetBreakpoint { kind, address } => {
                match kind {
                    BreakpointKind::Software => self.driver.set_software_breakpoint(address)?,
                    BreakpointKind::Hardware => {
                        if let Some(avr) = self.driver.as_avr8() {
                            avr.set_hardware_breakpoint(address)?;
                        } else {
                            self.driver.set_software_breakpoint(address)?;
                        }
                    }
                }
                Ok(SessionReply::Ok)
            }
            CommandPacket::ClearBreakpoint { kind, address } => {
                match kind {
                    BreakpointKind::Software => self.driver.clear_software_breakpoint(address)?,
                    BreakpointKind::Hardware => {
                        if let Some(avr) = self.driver.as_avr8() {
                            avr.clear_hardware_breakpoint(address)?;
                        } else {
                            self.driver.clear_software_breakpoint(address)?;
                        }
                    }
                }
                Ok(SessionReply::Ok)
            }
            CommandPacket::QuerySupported | CommandPacket::QueryFeatures => Ok(SessionReply::Unsupported),
        }
    }

    /// `vCont;r start,end` (spec §4.4): starts a new range-stepping session,
    /// terminating any session already active first, then issues the
    /// mandatory initial single step.
    fn start_range_step(&mut self, start: u32, end: u32) -> ChipLinkResult<SessionReply> {
        if self.range_stepping.is_some() {
            warn!("new range-stepping session requested with one already active, terminating it first");
            self.range_stepping = None;
        }

        let program_memory = self.flash_segment_range()?;
        let params = self.memory_access_params(SegmentType::Flash);
        let range = HalfOpenRange::new(start, end);
        let driver = &mut self.driver;
        let session = rangestep::start_session(range, program_memory, |addr, len| {
            driver.read_memory(SegmentType::Flash, addr, len, &params)
        })?;

        self.range_stepping = session;
        self.driver.step()?;
        self.waiting_for_break = true;
        Ok(SessionReply::Ok)
    }

    /// Consulted by the run-loop on a break event while a range-stepping
    /// session is active (spec §4.4): continues range-running or reports the
    /// stop, per [`rangestep::decide_resume`].
    pub fn on_range_step_break(&mut self) -> ChipLinkResult<SessionReply> {
        let Some(session) = self.range_stepping.take() else {
            self.waiting_for_break = false;
            return Ok(SessionReply::Stop(dispatch::stop_reply(5)));
        };
        let pc = self.driver.get_program_counter()?;
        match rangestep::decide_resume(&session, pc) {
            ResumeDecision::ContinueRangeRun => {
                for &address in &session.intercepted_addresses {
                    self.driver.set_software_breakpoint(address)?;
                }
                self.driver.run()?;
                self.range_stepping = Some(session);
                self.waiting_for_break = true;
                Ok(SessionReply::Ok)
            }
            ResumeDecision::ReportStop => {
                for &address in &session.intercepted_addresses {
                    self.driver.clear_software_breakpoint(address)?;
                }
                self.waiting_for_break = false;
                Ok(SessionReply::Stop(dispatch::stop_reply(5)))
            }
        }
    }

    pub fn is_waiting_for_break(&self) -> bool {
        self.waiting_for_break
    }

    /// Session teardown on client disconnect (spec §5): clear breakpoints,
    /// leave programming mode, detach, deactivate — each step tolerating the
    /// failure of its predecessors and logging rather than propagating.
    pub fn teardown(&mut self) {
        if let Err(err) = self.driver.clear_all_breakpoints() {
            warn!("teardown: clear_all_breakpoints failed: {err}");
        }
        if let Some(avr) = self.driver.as_avr8() {
            if avr.is_attached() {
                if let Err(err) = avr.leave_programming_mode() {
                    warn!("teardown: leave_programming_mode failed: {err}");
                }
            }
            if let Err(err) = avr.detach() {
                warn!("teardown: detach failed: {err}");
            }
            if let Err(err) = avr.deactivate() {
                error!("teardown: deactivate failed: {err}");
            }
        } else {
            info!("teardown: RISC-V driver has no separate detach/deactivate step");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::RefCell;
    use std::collections::BTreeMap;

    use crate::clock::FakeClock;
    use crate::driver::riscv::RiscVDriver;
    use crate::error::ChipLinkError;
    use crate::interface::wch_interface::WchInterface;
    use crate::probe::edbg::EdbgTransport;
    use crate::probe::wch::WchTransport;
    use crate::target_descriptor::builder::{AddressSpaceBuilder, SegmentBuilder, TargetDescriptorBuilder};
    use crate::target_descriptor::{AccessMask, DeviceAttributes, PeripheralDescriptor, RegisterAccess};

    struct NullEdbgTransport;
    impl EdbgTransport for NullEdbgTransport {
        fn exchange(&mut self, _report: &[u8]) -> ChipLinkResult<Vec<u8>> {
            Err(ChipLinkError::InternalFatal("unused in RISC-V session tests".into()))
        }
        fn poll_event(&mut self) -> ChipLinkResult<Option<Vec<u8>>> {
            Ok(None)
        }
    }

    #[derive(Default)]
    struct FakeWchTransport {
        command_responses: RefCell<Vec<Vec<u8>>>,
    }

    impl WchTransport for FakeWchTransport {
        fn send_command(&mut self, _frame: &[u8]) -> ChipLinkResult<Vec<u8>> {
            Ok(self.command_responses.borrow_mut().remove(0))
        }
        fn send_data(&mut self, _payload: &[u8]) -> ChipLinkResult<Vec<u8>> {
            Ok(vec![])
        }
    }

    fn dmi_response(reg_addr: u8, value: u32, status: u8) -> Vec<u8> {
        let mut raw = vec![reg_addr];
        raw.extend_from_slice(&value.to_be_bytes());
        raw.push(status);
        raw
    }

    #[derive(Default)]
    struct FakeTranslator {
        flash: BTreeMap<u32, u8>,
    }

    impl RiscVMemoryTranslator for FakeTranslator {
        fn read_memory(
            &mut self,
            _wch: &mut dyn FnMut(u8) -> ChipLinkResult<u32>,
            address: u32,
            length: u32,
        ) -> ChipLinkResult<Vec<u8>> {
            Ok((0..length).map(|i| *self.flash.get(&(address + i)).unwrap_or(&0)).collect())
        }
        fn write_memory(
            &mut self,
            _wch: &mut dyn FnMut(u8, u32) -> ChipLinkResult<()>,
            address: u32,
            data: &[u8],
        ) -> ChipLinkResult<()> {
            for (i, byte) in data.iter().enumerate() {
                self.flash.insert(address + i as u32, *byte);
            }
            Ok(())
        }
        fn clear_program_buffer(&mut self) {}
        fn abstract_command_error(&self) -> u32 {
            0
        }
    }

    type TestDriver = TargetDriver<NullEdbgTransport, FakeWchTransport, FakeClock, FakeClock, FakeTranslator>;

    fn target() -> Rc<TargetDescriptor> {
        let flash = SegmentBuilder::new("flash", SegmentType::Flash, 0, 0xFFFF)
            .page_size(256)
            .debug_access(AccessMask {
                readable: true,
                writeable: true,
                executable: true,
            })
            .build();
        let space = AddressSpaceBuilder::new("flash_space", 0, 0xFFFF).segment(flash).build();
        let device = DeviceAttributes {
            name: "CH32V003".into(),
            signature: None,
            avr_family: None,
        };
        Rc::new(TargetDescriptorBuilder::new(device).address_space(space).build())
    }

    fn new_session(command_responses: Vec<Vec<u8>>) -> DebugSession<NullEdbgTransport, FakeWchTransport, FakeClock, FakeClock, FakeTranslator> {
        let transport = FakeWchTransport {
            command_responses: RefCell::new(command_responses),
        };
        let wch = WchInterface::new(transport, FakeClock::new());
        let driver: TestDriver = TargetDriver::RiscV(RiscVDriver::new(wch, FakeTranslator::default(), target()));
        DebugSession::new(driver, target())
    }

    fn target_with_registers() -> Rc<TargetDescriptor> {
        let flash = SegmentBuilder::new("flash", SegmentType::Flash, 0, 0xFFFF)
            .page_size(256)
            .debug_access(AccessMask {
                readable: true,
                writeable: true,
                executable: true,
            })
            .build();
        let gpr = SegmentBuilder::new("gpr", SegmentType::GeneralPurposeRegisters, 0x1_0000, 0x1_00FF)
            .debug_access(AccessMask {
                readable: true,
                writeable: true,
                executable: false,
            })
            .build();
        let space = AddressSpaceBuilder::new("flash_space", 0, 0x1_00FF)
            .segment(flash)
            .segment(gpr)
            .build();
        let device = DeviceAttributes {
            name: "CH32V003".into(),
            signature: None,
            avr_family: None,
        };
        let group = RegisterGroupDescriptor {
            name: "GPR".into(),
            address_space_key: "flash_space".into(),
            registers: vec![
                RegisterDescriptor {
                    name: "r0".into(),
                    start_address: 0x1_0000,
                    size: 1,
                    access: RegisterAccess::ReadWrite,
                    initial_value: None,
                    bit_fields: Vec::new(),
                },
                RegisterDescriptor {
                    name: "sp".into(),
                    start_address: 0x1_0001,
                    size: 2,
                    access: RegisterAccess::ReadWrite,
                    initial_value: None,
                    bit_fields: Vec::new(),
                },
            ],
            subgroups: Vec::new(),
        };
        let peripheral = PeripheralDescriptor {
            name: "CPU".into(),
            register_groups: vec![group],
        };
        Rc::new(
            TargetDescriptorBuilder::new(device)
                .address_space(space)
                .peripheral(peripheral)
                .build(),
        )
    }

    fn new_session_with_registers(
        command_responses: Vec<Vec<u8>>,
    ) -> DebugSession<NullEdbgTransport, FakeWchTransport, FakeClock, FakeClock, FakeTranslator> {
        let transport = FakeWchTransport {
            command_responses: RefCell::new(command_responses),
        };
        let wch = WchInterface::new(transport, FakeClock::new());
        let driver: TestDriver =
            TargetDriver::RiscV(RiscVDriver::new(wch, FakeTranslator::default(), target_with_registers()));
        DebugSession::new(driver, target_with_registers())
    }

    #[test]
    fn write_then_read_memory_round_trips() {
        // 0x2_0000 falls outside the target's one flash segment (0..0x1_0000),
        // so this takes the non-flash, translator-direct path and needs no
        // queued DMI responses.
        let mut session = new_session(vec![]);
        let write = session.dispatch(CommandPacket::WriteMemory {
            address: 0x2_0000,
            data: vec![0xde, 0xad, 0xbe, 0xef],
        });
        assert_eq!(write, SessionReply::Ok);

        let read = session.dispatch(CommandPacket::ReadMemory {
            address: 0x2_0000,
            length: 4,
        });
        assert_eq!(read, SessionReply::Data("deadbeef".to_string()));
    }

    #[test]
    fn unknown_failure_maps_to_fixed_e01_reply() {
        let mut session = new_session(vec![]);
        // A range-step request against a range outside program memory fails
        // validation in the range-stepping engine, which must surface as E01
        // rather than panicking or leaking the underlying error text.
        let reply = session.dispatch(CommandPacket::ContinueRange {
            start: 0x1_0000,
            end: 0x1_0010,
        });
        assert_eq!(reply, SessionReply::Data("E01".to_string()));
    }

    #[test]
    fn halt_reason_reports_sigtrap() {
        let mut session = new_session(vec![]);
        assert_eq!(session.dispatch(CommandPacket::HaltReason), SessionReply::Stop("S05".to_string()));
    }

    #[test]
    fn read_register_returns_program_counter_via_abstract_command() {
        const DM_DATA0: u8 = 0x04;
        const DM_ABSTRACTCS: u8 = 0x16;
        const DM_COMMAND: u8 = 0x17;

        let mut session = new_session(vec![
            dmi_response(DM_COMMAND, 0, 0x00),
            dmi_response(DM_ABSTRACTCS, 0, 0x00),
            dmi_response(DM_DATA0, 0x1234, 0x00),
        ]);
        let reply = session.dispatch(CommandPacket::ReadRegister(0));
        assert_eq!(reply, SessionReply::Data("34120000".to_string()));
    }

    #[test]
    fn teardown_on_riscv_driver_does_not_panic() {
        let mut session = new_session(vec![]);
        session.teardown();
    }

    #[test]
    fn write_all_registers_then_read_all_registers_round_trips() {
        let mut session = new_session_with_registers(vec![]);
        let pairs = vec![0xAB, 0xCD, 0xEF]; // r0 (1 byte) then sp (2 bytes)

        let write = session.dispatch(CommandPacket::WriteAllRegisters(pairs.clone()));
        assert_eq!(write, SessionReply::Ok);

        let read = session.dispatch(CommandPacket::ReadAllRegisters);
        assert_eq!(read, SessionReply::Data(dispatch::to_hex(&pairs)));
    }

    #[test]
    fn write_register_then_read_register_round_trips_single_register() {
        let mut session = new_session_with_registers(vec![]);

        let write = session.dispatch(CommandPacket::WriteRegister(1, vec![0x12, 0x34]));
        assert_eq!(write, SessionReply::Ok);

        let read = session.dispatch(CommandPacket::ReadRegister(1));
        assert_eq!(read, SessionReply::Data("1234".to_string()));
    }
}
