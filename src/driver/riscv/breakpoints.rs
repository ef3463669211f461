//! RISC-V software breakpoints (spec §4.3): the probe exposes no dedicated
//! breakpoint command, so the driver splices an `EBREAK`/`c.ebreak` opcode
//! into program memory itself and restores the original bytes on clear.

use std::collections::BTreeMap;

use crate::error::{ChipLinkError, ChipLinkResult};

/// 32-bit `EBREAK` instruction.
pub const EBREAK_32: u32 = 0x0010_0073;
/// 16-bit `c.ebreak` (compressed) instruction.
pub const C_EBREAK_16: u16 = 0x9002;

/// Picks the breakpoint opcode matching the width of the instruction being
/// replaced. `original` must be exactly 2 or 4 bytes (the width the caller
/// already determined by inspecting the instruction's low two bits).
pub fn breakpoint_opcode(original: &[u8]) -> ChipLinkResult<Vec<u8>> {
    match original.len() {
        2 => Ok(C_EBREAK_16.to_le_bytes().to_vec()),
        4 => Ok(EBREAK_32.to_le_bytes().to_vec()),
        other => Err(ChipLinkError::InternalFatal(format!(
            "software breakpoint opcode requested for a {other}-byte instruction"
        ))),
    }
}

/// Returns whether the first two bytes of an instruction (little-endian)
/// indicate a 32-bit (non-compressed) encoding: the RISC-V C extension
/// reserves low bits `11` in the first halfword for 32-bit instructions.
pub fn is_32_bit_instruction(first_halfword: [u8; 2]) -> bool {
    first_halfword[0] & 0b11 == 0b11
}

#[derive(Debug, Clone, Default)]
pub struct SoftwareBreakpointRegistry {
    original_bytes: BTreeMap<u32, Vec<u8>>,
}

impl SoftwareBreakpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, address: u32) -> bool {
        self.original_bytes.contains_key(&address)
    }

    pub fn record(&mut self, address: u32, original: Vec<u8>) {
        self.original_bytes.insert(address, original);
    }

    pub fn take_original(&mut self, address: u32) -> Option<Vec<u8>> {
        self.original_bytes.remove(&address)
    }

    pub fn addresses(&self) -> Vec<u32> {
        self.original_bytes.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compressed_instruction_low_bits_select_16_bit_opcode() {
        assert!(!is_32_bit_instruction([0x02, 0x90])); // c.ebreak itself is compressed
        assert_eq!(breakpoint_opcode(&[0, 0]).unwrap(), C_EBREAK_16.to_le_bytes().to_vec());
    }

    #[test]
    fn non_compressed_instruction_low_bits_select_32_bit_opcode() {
        assert!(is_32_bit_instruction([0x13, 0x00]));
        assert_eq!(
            breakpoint_opcode(&[0, 0, 0, 0]).unwrap(),
            EBREAK_32.to_le_bytes().to_vec()
        );
    }

    #[test]
    fn rejects_other_widths() {
        assert!(breakpoint_opcode(&[0, 0, 0]).is_err());
    }

    #[test]
    fn set_then_clear_round_trips_original_bytes() {
        let mut registry = SoftwareBreakpointRegistry::new();
        registry.record(0x100, vec![0x13, 0x00, 0x00, 0x00]);
        assert!(registry.contains(0x100));
        let original = registry.take_original(0x100).unwrap();
        assert_eq!(original, vec![0x13, 0x00, 0x00, 0x00]);
        assert!(!registry.contains(0x100));
    }
}
