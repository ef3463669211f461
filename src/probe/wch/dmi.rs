//! WCH-Link DMI (Debug Module Interface) operation frame (spec §4.1, §4.3).
//! The RISC-V debug spec's DMI register bus is reached through a single
//! `0x08` command carrying a register address, a 32-bit big-endian value, and
//! an operation selector.

use crate::error::{ChipLinkError, ChipLinkResult};
use crate::frame::{be_u32, push_be_u32};

use super::commands::{CMD_DMI, ENVELOPE_PREFIX};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmiOp {
    None = 0x00,
    Read = 0x01,
    Write = 0x02,
}

pub fn build_dmi_operation(reg_addr: u8, value: u32, op: DmiOp) -> Vec<u8> {
    let mut payload = vec![reg_addr];
    push_be_u32(&mut payload, value);
    payload.push(op as u8);
    let mut frame = vec![ENVELOPE_PREFIX, CMD_DMI, payload.len() as u8];
    frame.extend_from_slice(&payload);
    frame
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmiStatus {
    Success = 0x00,
    Failed = 0x02,
    Busy = 0x03,
}

impl DmiStatus {
    fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x00 => DmiStatus::Success,
            0x02 => DmiStatus::Failed,
            0x03 => DmiStatus::Busy,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DmiResponse {
    pub reg_addr: u8,
    pub value: u32,
    pub status: DmiStatus,
}

pub fn parse_dmi_response(raw: &[u8]) -> ChipLinkResult<DmiResponse> {
    if raw.len() < 6 {
        return Err(ChipLinkError::DeviceCommunication(
            "DMI response shorter than 6 bytes".into(),
        ));
    }
    let reg_addr = raw[0];
    let value = be_u32(&raw[1..5]);
    let status = DmiStatus::from_byte(raw[5]).ok_or_else(|| {
        ChipLinkError::DeviceCommunication(format!("unrecognised DMI status byte {:#04x}", raw[5]))
    })?;
    Ok(DmiResponse {
        reg_addr,
        value,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dmi_frame_carries_big_endian_value() {
        let frame = build_dmi_operation(0x11, 0x1234_5678, DmiOp::Write);
        assert_eq!(&frame[4..8], &0x1234_5678u32.to_be_bytes());
        assert_eq!(*frame.last().unwrap(), DmiOp::Write as u8);
    }

    #[test]
    fn parses_busy_status() {
        let mut raw = vec![0x11];
        raw.extend_from_slice(&0u32.to_be_bytes());
        raw.push(0x03);
        let response = parse_dmi_response(&raw).unwrap();
        assert_eq!(response.status, DmiStatus::Busy);
    }
}
