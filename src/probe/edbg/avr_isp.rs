//! EDBG AVR-ISP sub-protocol (spec §4.1): fuse/lock/signature access via
//! in-system programming rather than the debug channel.

use crate::error::{ChipLinkError, ChipLinkResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IspCommandId {
    EnterProgrammingMode = 0x10,
    LeaveProgrammingMode = 0x11,
    ProgramFuse = 0x17,
    ReadFuse = 0x18,
    ReadLock = 0x1A,
    ReadSignature = 0x1B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuseKind {
    Low,
    High,
    Extended,
}

impl FuseKind {
    fn program_isp_bytes(self) -> (u8, u8) {
        match self {
            FuseKind::Low => (0xAC, 0xA0),
            FuseKind::High => (0xAC, 0xA8),
            FuseKind::Extended => (0xAC, 0xA4),
        }
    }

    fn read_isp_bytes(self) -> (u8, u8, u8, u8) {
        match self {
            FuseKind::Low => (0x50, 0x00, 0x00, 0x00),
            FuseKind::High => (0x58, 0x08, 0x00, 0x00),
            FuseKind::Extended => (0x50, 0x08, 0x00, 0x00),
        }
    }
}

fn isp_envelope(command_id: IspCommandId, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![command_id as u8];
    frame.extend_from_slice(payload);
    frame
}

pub fn build_enter_programming_mode(
    timeout: u8,
    stab_delay: u8,
    cmd_exe_delay: u8,
    sync_loops: u8,
    byte_delay: u8,
    poll_value: u8,
    poll_index: u8,
) -> Vec<u8> {
    isp_envelope(
        IspCommandId::EnterProgrammingMode,
        &[
            timeout,
            stab_delay,
            cmd_exe_delay,
            sync_loops,
            byte_delay,
            poll_value,
            poll_index,
            0xAC,
            0x53,
            0x00,
            0x00,
        ],
    )
}

pub fn build_leave_programming_mode(pre_delay: u8, post_delay: u8) -> Vec<u8> {
    isp_envelope(IspCommandId::LeaveProgrammingMode, &[pre_delay, post_delay])
}

pub fn build_program_fuse(ret_addr: u8, kind: FuseKind, value: u8) -> Vec<u8> {
    let (isp1, isp2) = kind.program_isp_bytes();
    isp_envelope(
        IspCommandId::ProgramFuse,
        &[ret_addr, isp1, isp2, 0x00, value],
    )
}

pub fn build_read_fuse(ret_addr: u8, kind: FuseKind) -> Vec<u8> {
    let (isp1, isp2, isp3, isp4) = kind.read_isp_bytes();
    isp_envelope(IspCommandId::ReadFuse, &[ret_addr, isp1, isp2, isp3, isp4])
}

pub fn build_read_lock(ret_addr: u8) -> Vec<u8> {
    isp_envelope(
        IspCommandId::ReadLock,
        &[ret_addr, 0x58, 0x00, 0x00, 0x00],
    )
}

pub fn build_read_signature(ret_addr: u8, signature_byte_index: u8) -> Vec<u8> {
    isp_envelope(
        IspCommandId::ReadSignature,
        &[ret_addr, 0x30, 0x00, signature_byte_index & 0x03, 0x00],
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IspStatus {
    Ok,
    Timeout,
    Failed,
}

impl IspStatus {
    fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x00 => IspStatus::Ok,
            0x80 => IspStatus::Timeout,
            0xC0 => IspStatus::Failed,
            _ => return None,
        })
    }
}

/// Parses an ISP response for a read command: status at `payload[0]`, data
/// byte at `payload[2]`, a second status byte at `payload[3]` that must also
/// be `OK`.
pub fn parse_isp_read_response(raw: &[u8]) -> ChipLinkResult<u8> {
    if raw.len() < 4 {
        return Err(ChipLinkError::DeviceCommunication(
            "ISP read response shorter than 4 bytes".into(),
        ));
    }
    let first_status = IspStatus::from_byte(raw[0]).ok_or_else(|| {
        ChipLinkError::DeviceCommunication(format!("unrecognised ISP status byte {:#04x}", raw[0]))
    })?;
    if first_status != IspStatus::Ok {
        return Err(isp_status_error(first_status));
    }
    let data = raw[2];
    let second_status = IspStatus::from_byte(raw[3]).ok_or_else(|| {
        ChipLinkError::DeviceCommunication(format!("unrecognised ISP status byte {:#04x}", raw[3]))
    })?;
    if second_status != IspStatus::Ok {
        return Err(isp_status_error(second_status));
    }
    Ok(data)
}

/// Parses an ISP response for a write command: a single leading status byte.
pub fn parse_isp_write_response(raw: &[u8]) -> ChipLinkResult<()> {
    let status_byte = *raw
        .first()
        .ok_or_else(|| ChipLinkError::DeviceCommunication("empty ISP response".into()))?;
    let status = IspStatus::from_byte(status_byte).ok_or_else(|| {
        ChipLinkError::DeviceCommunication(format!(
            "unrecognised ISP status byte {status_byte:#04x}"
        ))
    })?;
    match status {
        IspStatus::Ok => Ok(()),
        other => Err(isp_status_error(other)),
    }
}

fn isp_status_error(status: IspStatus) -> ChipLinkError {
    match status {
        IspStatus::Timeout => ChipLinkError::target_operation(0x80, "ISP command timed out"),
        IspStatus::Failed => ChipLinkError::target_operation(0xC0, "ISP command failed"),
        IspStatus::Ok => unreachable!("Ok is not an error status"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_fuse_picks_isp_bytes_per_kind() {
        let frame = build_program_fuse(0x00, FuseKind::High, 0xD9);
        assert_eq!(frame, vec![IspCommandId::ProgramFuse as u8, 0x00, 0xAC, 0xA8, 0x00, 0xD9]);
    }

    #[test]
    fn parse_read_response_extracts_data_byte() {
        let raw = [0x00, 0x00, 0x62, 0x00];
        assert_eq!(parse_isp_read_response(&raw).unwrap(), 0x62);
    }

    #[test]
    fn parse_read_response_rejects_failed_status() {
        let raw = [0xC0, 0x00, 0x00, 0x00];
        assert!(parse_isp_read_response(&raw).is_err());
    }
}
