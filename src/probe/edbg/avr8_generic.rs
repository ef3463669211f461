//! EDBG AVR8-Generic sub-protocol: command frame builders and response
//! parsers (spec §4.1).
//!
//! Every command frame is
//! `[0x0E, sequence_id_lo, sequence_id_hi, sub_protocol_id=0x12, command_id, version=0x00, ...payload]`.
//! Responses come back from the probe as `[response_id, ...payload]` once
//! the outer CMSIS-DAP/AVR envelope has been stripped by the transport layer
//! (L1, out of scope here) — see [`crate::probe::edbg::EdbgTransport`].

use crate::error::{ChipLinkError, ChipLinkResult};
use crate::frame::{le_u32, push_le_u32};

pub const ENVELOPE_PREFIX: u8 = 0x0E;
pub const SUB_PROTOCOL_ID: u8 = 0x12;
pub const VERSION: u8 = 0x00;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandId {
    SetParameter = 0x01,
    GetParameter = 0x02,
    ActivatePhysical = 0x10,
    DeactivatePhysical = 0x11,
    GetDeviceId = 0x12,
    Attach = 0x13,
    Detach = 0x14,
    EnterProgrammingMode = 0x15,
    LeaveProgrammingMode = 0x16,
    DisableDebugWire = 0x17,
    EraseMemory = 0x20,
    ReadMemory = 0x21,
    ReadMemoryMasked = 0x22,
    WriteMemory = 0x23,
    Stop = 0x31,
    Run = 0x32,
    RunTo = 0x33,
    Step = 0x34,
    GetProgramCounter = 0x35,
    SetProgramCounter = 0x36,
    SetHardwareBreakpoint = 0x40,
    ClearHardwareBreakpoint = 0x41,
    SetSoftwareBreakpoints = 0x43,
    ClearSoftwareBreakpoints = 0x44,
    ClearAllSoftwareBreakpoints = 0x45,
}

/// Response IDs (`Avr8GenericResponses` in the vendor protocol).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseId {
    StatusOk = 0x80,
    List = 0x81,
    Pc = 0x83,
    Data = 0x84,
    Failed = 0xA0,
}

impl ResponseId {
    fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x80 => ResponseId::StatusOk,
            0x81 => ResponseId::List,
            0x83 => ResponseId::Pc,
            0x84 => ResponseId::Data,
            0xA0 => ResponseId::Failed,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseMode {
    Chip = 0x00,
    ApplicationSection = 0x01,
    BootSection = 0x02,
}

/// Internal memory-type opcode used on the wire for `ReadMemory`/`WriteMemory`
/// (`Avr8GenericMemtypes`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryType {
    Sram = 0x20,
    Eeprom = 0x22,
    Spm = 0xA0,
    FlashPage = 0xB0,
    EepromPage = 0xB1,
    Fuses = 0xB2,
    Lockbits = 0xB3,
    Signatures = 0xB4,
    Osccal = 0xB5,
    RegisterFile = 0xB8,
    ApplFlash = 0xC0,
    BootFlash = 0xC1,
    ApplFlashAtomic = 0xC2,
    BootFlashAtomic = 0xC3,
    EepromAtomic = 0xC4,
    UserSignatures = 0xC5,
    CalibrationSignatures = 0xC6,
}

fn envelope(sequence_id: u16, command_id: CommandId, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(6 + payload.len());
    frame.push(ENVELOPE_PREFIX);
    frame.push((sequence_id & 0xFF) as u8);
    frame.push((sequence_id >> 8) as u8);
    frame.push(SUB_PROTOCOL_ID);
    frame.push(command_id as u8);
    frame.push(VERSION);
    frame.extend_from_slice(payload);
    frame
}

pub fn build_set_parameter(sequence_id: u16, context: u8, param_id: u8, value: &[u8]) -> Vec<u8> {
    let mut payload = vec![context, param_id, value.len() as u8];
    payload.extend_from_slice(value);
    envelope(sequence_id, CommandId::SetParameter, &payload)
}

pub fn build_get_parameter(sequence_id: u16, context: u8, param_id: u8, length: u8) -> Vec<u8> {
    envelope(
        sequence_id,
        CommandId::GetParameter,
        &[context, param_id, length],
    )
}

pub fn build_activate_physical(sequence_id: u16, apply_external_reset: bool) -> Vec<u8> {
    envelope(
        sequence_id,
        CommandId::ActivatePhysical,
        &[apply_external_reset as u8],
    )
}

pub fn build_deactivate_physical(sequence_id: u16) -> Vec<u8> {
    envelope(sequence_id, CommandId::DeactivatePhysical, &[])
}

pub fn build_get_device_id(sequence_id: u16) -> Vec<u8> {
    envelope(sequence_id, CommandId::GetDeviceId, &[])
}

pub fn build_attach(sequence_id: u16, break_after_attach: bool) -> Vec<u8> {
    envelope(sequence_id, CommandId::Attach, &[break_after_attach as u8])
}

pub fn build_detach(sequence_id: u16) -> Vec<u8> {
    envelope(sequence_id, CommandId::Detach, &[])
}

pub fn build_enter_programming_mode(sequence_id: u16) -> Vec<u8> {
    envelope(sequence_id, CommandId::EnterProgrammingMode, &[])
}

pub fn build_leave_programming_mode(sequence_id: u16) -> Vec<u8> {
    envelope(sequence_id, CommandId::LeaveProgrammingMode, &[])
}

pub fn build_disable_debug_wire(sequence_id: u16) -> Vec<u8> {
    envelope(sequence_id, CommandId::DisableDebugWire, &[])
}

pub fn build_erase_memory(sequence_id: u16, mode: EraseMode, start_address: u32) -> Vec<u8> {
    let mut payload = vec![mode as u8];
    push_le_u32(&mut payload, start_address);
    envelope(sequence_id, CommandId::EraseMemory, &payload)
}

pub fn build_read_memory(
    sequence_id: u16,
    memory_type: MemoryType,
    address: u32,
    byte_count: u32,
) -> Vec<u8> {
    let mut payload = vec![memory_type as u8];
    push_le_u32(&mut payload, address);
    push_le_u32(&mut payload, byte_count);
    envelope(sequence_id, CommandId::ReadMemory, &payload)
}

/// Masked read (`0x22`): appends a bit-mask with one bit per requested byte,
/// `1` meaning "include this byte in the response".
pub fn build_read_memory_masked(
    sequence_id: u16,
    memory_type: MemoryType,
    address: u32,
    byte_count: u32,
    mask: &[u8],
) -> Vec<u8> {
    let mut payload = vec![memory_type as u8];
    push_le_u32(&mut payload, address);
    push_le_u32(&mut payload, byte_count);
    payload.extend_from_slice(mask);
    envelope(sequence_id, CommandId::ReadMemoryMasked, &payload)
}

pub fn build_write_memory(
    sequence_id: u16,
    memory_type: MemoryType,
    address: u32,
    data: &[u8],
) -> Vec<u8> {
    let mut payload = vec![memory_type as u8];
    push_le_u32(&mut payload, address);
    push_le_u32(&mut payload, data.len() as u32);
    payload.push(0x00); // asyncFlag
    payload.extend_from_slice(data);
    envelope(sequence_id, CommandId::WriteMemory, &payload)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    Immediate = 0x01,
    AtNextSymbol = 0x02,
}

pub fn build_stop(sequence_id: u16, mode: StopMode) -> Vec<u8> {
    envelope(sequence_id, CommandId::Stop, &[mode as u8])
}

pub fn build_run(sequence_id: u16) -> Vec<u8> {
    envelope(sequence_id, CommandId::Run, &[])
}

/// `wordAddress` is the byte address divided by 2 (AVR PCs are word
/// addresses on the wire).
pub fn build_run_to(sequence_id: u16, byte_address: u32) -> Vec<u8> {
    let mut payload = Vec::new();
    push_le_u32(&mut payload, byte_address / 2);
    envelope(sequence_id, CommandId::RunTo, &payload)
}

pub fn build_step(sequence_id: u16) -> Vec<u8> {
    envelope(sequence_id, CommandId::Step, &[0x01, 0x01])
}

pub fn build_get_program_counter(sequence_id: u16) -> Vec<u8> {
    envelope(sequence_id, CommandId::GetProgramCounter, &[])
}

pub fn build_set_program_counter(sequence_id: u16, byte_address: u32) -> Vec<u8> {
    let mut payload = Vec::new();
    push_le_u32(&mut payload, byte_address / 2);
    envelope(sequence_id, CommandId::SetProgramCounter, &payload)
}

pub fn build_set_hardware_breakpoint(sequence_id: u16, slot: u8, byte_address: u32) -> Vec<u8> {
    let mut payload = vec![0x01, slot];
    push_le_u32(&mut payload, byte_address);
    payload.push(0x03);
    envelope(sequence_id, CommandId::SetHardwareBreakpoint, &payload)
}

pub fn build_clear_hardware_breakpoint(sequence_id: u16, slot: u8) -> Vec<u8> {
    envelope(sequence_id, CommandId::ClearHardwareBreakpoint, &[slot])
}

pub fn build_set_software_breakpoints(sequence_id: u16, addresses: &[u32]) -> Vec<u8> {
    let mut payload = Vec::new();
    for addr in addresses {
        push_le_u32(&mut payload, *addr);
    }
    envelope(sequence_id, CommandId::SetSoftwareBreakpoints, &payload)
}

pub fn build_clear_software_breakpoints(sequence_id: u16, addresses: &[u32]) -> Vec<u8> {
    let mut payload = Vec::new();
    for addr in addresses {
        push_le_u32(&mut payload, *addr);
    }
    envelope(sequence_id, CommandId::ClearSoftwareBreakpoints, &payload)
}

pub fn build_clear_all_software_breakpoints(sequence_id: u16) -> Vec<u8> {
    envelope(sequence_id, CommandId::ClearAllSoftwareBreakpoints, &[])
}

/// Parsed form of a raw AVR8-Generic response frame `[response_id, ...]`.
#[derive(Debug, Clone)]
pub enum Avr8Response {
    Ok,
    Failed { code: u8 },
    Data(Vec<u8>),
    Pc(u32),
    List(Vec<u8>),
}

fn decode_envelope(raw: &[u8]) -> ChipLinkResult<(ResponseId, &[u8])> {
    let (id_byte, payload) = raw.split_first().ok_or_else(|| {
        ChipLinkError::DeviceCommunication("empty AVR8-Generic response frame".into())
    })?;
    let response_id = ResponseId::from_byte(*id_byte).ok_or_else(|| {
        ChipLinkError::DeviceCommunication(format!("unrecognised response id {id_byte:#04x}"))
    })?;
    Ok((response_id, payload))
}

pub fn parse_response(raw: &[u8]) -> ChipLinkResult<Avr8Response> {
    let (response_id, payload) = decode_envelope(raw)?;
    Ok(match response_id {
        ResponseId::StatusOk => Avr8Response::Ok,
        ResponseId::Failed => {
            let code = *payload
                .first()
                .ok_or_else(|| ChipLinkError::DeviceCommunication("FAILED response missing status byte".into()))?;
            Avr8Response::Failed { code }
        }
        ResponseId::Data => Avr8Response::Data(payload.to_vec()),
        ResponseId::Pc => {
            if payload.len() < 4 {
                return Err(ChipLinkError::DeviceCommunication(
                    "PC response shorter than 4 bytes".into(),
                ));
            }
            Avr8Response::Pc(le_u32(payload))
        }
        ResponseId::List => Avr8Response::List(payload.to_vec()),
    })
}

/// Converts a parsed response into a target-operation error if it was a
/// FAILED response, otherwise returns the response unchanged.
pub fn ensure_ok(response: Avr8Response) -> ChipLinkResult<Avr8Response> {
    match response {
        Avr8Response::Failed { code } => Err(ChipLinkError::edbg_failure(code)),
        other => Ok(other),
    }
}

pub fn parse_status_ok(raw: &[u8]) -> ChipLinkResult<()> {
    match ensure_ok(parse_response(raw)?)? {
        Avr8Response::Ok => Ok(()),
        other => Err(ChipLinkError::DeviceCommunication(format!(
            "expected StatusOk response, got {other:?}"
        ))),
    }
}

pub fn parse_data(raw: &[u8]) -> ChipLinkResult<Vec<u8>> {
    match ensure_ok(parse_response(raw)?)? {
        Avr8Response::Data(data) => Ok(data),
        other => Err(ChipLinkError::DeviceCommunication(format!(
            "expected Data response, got {other:?}"
        ))),
    }
}

/// `GetProgramCounter` returns the PC as a *word* address; callers multiply
/// by 2 to get a byte address (spec §4.2, "Program counter").
pub fn parse_program_counter_words(raw: &[u8]) -> ChipLinkResult<u32> {
    match ensure_ok(parse_response(raw)?)? {
        Avr8Response::Pc(word_address) => Ok(word_address),
        other => Err(ChipLinkError::DeviceCommunication(format!(
            "expected Pc response, got {other:?}"
        ))),
    }
}

/// The `GetDeviceId` response payload (already stripped of its response-id
/// envelope by [`super::super::EdbgTransport`]-driven parsing): ASCII
/// loopback `"AVR "` on UPDI parts, a 3-byte signature otherwise (spec
/// §4.2).
pub fn is_updi_loopback_payload(data: &[u8]) -> bool {
    data.len() >= 4 && &data[0..4] == b"AVR "
}

pub fn extract_device_id_payload(data: &[u8]) -> ChipLinkResult<[u8; 3]> {
    if data.len() < 3 {
        return Err(ChipLinkError::DeviceCommunication(
            "device id response shorter than 3 bytes".into(),
        ));
    }
    Ok([data[0], data[1], data[2]])
}

/// The break-event frame carries its PC as a 4-byte little-endian *word*
/// address at bytes 1..4 (after an event id byte we assume the transport
/// has already stripped), and the break cause at byte 5: `0x01` = breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakCause {
    Breakpoint,
    Unknown,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakEvent {
    pub program_counter_bytes: u32,
    pub cause: BreakCause,
}

pub const AVR8_BREAK_EVENT_ID: u8 = 0x40;

/// Parses an AVR8 event frame shaped `[event_id, pc_lo, pc_mid_lo, pc_mid_hi, pc_hi, _reserved, cause]`
/// per spec §6 ("program counter in bytes 1-4 LE, multiplied by 2 ...; break
/// cause in byte 7").
pub fn parse_break_event(raw: &[u8]) -> ChipLinkResult<Option<BreakEvent>> {
    if raw.is_empty() {
        return Ok(None);
    }
    if raw[0] != AVR8_BREAK_EVENT_ID {
        return Ok(None);
    }
    if raw.len() < 8 {
        return Err(ChipLinkError::DeviceCommunication(
            "AVR8_BREAK_EVENT frame shorter than 8 bytes".into(),
        ));
    }
    let word_address = le_u32(&raw[1..5]);
    let cause_byte = raw[7];
    let cause = if cause_byte == 0x01 {
        BreakCause::Breakpoint
    } else {
        BreakCause::Unknown
    };
    Ok(Some(BreakEvent {
        program_counter_bytes: word_address * 2,
        cause,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_parameter_envelope_matches_layout() {
        let frame = build_set_parameter(0x0102, 0x02, 0x00, &[0x03]);
        assert_eq!(
            frame,
            vec![0x0E, 0x02, 0x01, SUB_PROTOCOL_ID, CommandId::SetParameter as u8, VERSION, 0x02, 0x00, 0x01, 0x03]
        );
    }

    #[test]
    fn run_to_divides_address_by_two() {
        let frame = build_run_to(0, 0x2000);
        // envelope(6 bytes) + word address (4 bytes LE) = 0x1000
        assert_eq!(&frame[6..10], &0x1000u32.to_le_bytes());
    }

    #[test]
    fn parse_status_ok_roundtrip() {
        let raw = [ResponseId::StatusOk as u8];
        parse_status_ok(&raw).unwrap();
    }

    #[test]
    fn parse_failed_surfaces_reason() {
        let raw = [ResponseId::Failed as u8, 0x10];
        let err = parse_status_ok(&raw).unwrap_err();
        match err {
            ChipLinkError::TargetOperation { code, .. } => assert_eq!(code, 0x10),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn parse_program_counter_multiplies_on_read_by_caller() {
        let mut raw = vec![ResponseId::Pc as u8];
        raw.extend_from_slice(&100u32.to_le_bytes());
        let words = parse_program_counter_words(&raw).unwrap();
        assert_eq!(words, 100);
        assert_eq!(words * 2, 200);
    }

    #[test]
    fn break_event_converts_word_to_byte_address() {
        let mut raw = vec![AVR8_BREAK_EVENT_ID];
        raw.extend_from_slice(&0x50u32.to_le_bytes());
        raw.push(0x00); // reserved byte 5
        raw.push(0x00); // reserved byte 6
        raw.push(0x01); // cause
        let event = parse_break_event(&raw).unwrap().unwrap();
        assert_eq!(event.program_counter_bytes, 0xA0);
        assert_eq!(event.cause, BreakCause::Breakpoint);
    }
}
