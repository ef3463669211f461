//! WCH-Link probe protocol (spec §4.1, §4.3, §6): command/lifecycle frames,
//! DMI bus access, and flash-write data-endpoint framing.

pub mod commands;
pub mod dmi;
pub mod flash;

use crate::error::ChipLinkResult;

/// Narrow collaborator contract for a WCH-Link bulk-endpoint transport (L1,
/// out of scope). `send_command` writes a command-endpoint frame and reads
/// its response; `send_data` writes a data-endpoint payload (flash write
/// data) and reads its 4-byte status response.
pub trait WchTransport {
    fn send_command(&mut self, frame: &[u8]) -> ChipLinkResult<Vec<u8>>;
    fn send_data(&mut self, payload: &[u8]) -> ChipLinkResult<Vec<u8>>;
}
