//! EDBG/CMSIS-DAP probe protocol (spec §4.1, §6): AVR8-Generic debug
//! sub-protocol plus the AVR-ISP sub-protocol used for fuse/lock/signature
//! access.

pub mod avr8_generic;
pub mod avr_isp;
pub mod params;

use crate::error::ChipLinkResult;

/// Narrow collaborator contract for an EDBG USB HID transport (L1, out of
/// scope). `exchange` sends one framed report and returns the probe's
/// synchronous response; `poll_event` returns a pending out-of-band event
/// frame (e.g. `AVR8_BREAK_EVENT`) if one is queued, without blocking.
pub trait EdbgTransport {
    fn exchange(&mut self, report: &[u8]) -> ChipLinkResult<Vec<u8>>;
    fn poll_event(&mut self) -> ChipLinkResult<Option<Vec<u8>>>;
}
