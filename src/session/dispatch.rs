//! Small stateless helpers shared by [`super::DebugSession`]'s command
//! handling: hex encoding, stop-reply formatting, and resolving which
//! address space segment a bare address falls in.

use crate::target_descriptor::{SegmentType, TargetDescriptor};

pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// `Sgg` stop reply, where `gg` is the GDB signal number (5 = SIGTRAP,
/// used for every halt this core reports).
pub fn stop_reply(signal: u8) -> String {
    format!("S{signal:02x}")
}

/// Resolves the [`SegmentType`] a bare address falls into by scanning every
/// address space's segments. Defaults to `Ram` when no segment claims the
/// address, matching the common case of a flat SRAM-like space with no
/// segment table entry for scratch addresses.
pub fn segment_type_for_address(target: &TargetDescriptor, address: u32) -> SegmentType {
    for space in target.address_spaces.values() {
        if let Some(segment) = space.segment_containing(address as u64) {
            return segment.segment_type;
        }
    }
    SegmentType::Ram
}
