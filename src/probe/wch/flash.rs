//! WCH-Link flash-write data-endpoint response parsing (spec §6): "Data
//! endpoint: used for flash write payloads; response is 4 bytes where byte 3
//! ∈ {0x02, 0x04} signals success and any other value is failure."

use crate::error::{ChipLinkError, ChipLinkResult};

pub fn parse_flash_data_response(raw: &[u8]) -> ChipLinkResult<()> {
    if raw.len() < 4 {
        return Err(ChipLinkError::DeviceCommunication(
            "flash data response shorter than 4 bytes".into(),
        ));
    }
    match raw[3] {
        0x02 | 0x04 => Ok(()),
        other => Err(ChipLinkError::DeviceCommunication(format!(
            "flash data write failed (status byte {other:#04x})"
        ))),
    }
}
