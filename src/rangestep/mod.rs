//! Range-stepping engine (L5, spec §4.4): decides, from a static read of the
//! AVR opcodes within `[start, end)`, which addresses must be intercepted so
//! `vCont;r` can run instead of single-stepping through the whole range.

pub mod opcode;

use std::collections::BTreeSet;

use crate::error::{ChipLinkError, ChipLinkResult};
use crate::target_descriptor::HalfOpenRange;

use opcode::Instruction;

#[derive(Debug, Clone)]
pub struct RangeSteppingSession {
    pub range: HalfOpenRange,
    pub intercepted_addresses: BTreeSet<u32>,
    pub single_stepping: bool,
}

/// Builds a new range-stepping session for `range`, reading the program
/// memory bytes spanning it via `read_program_memory` (an external
/// collaborator closure so this stays decoupled from the driver layer).
/// Returns `Ok(None)` when the range is a single instruction and the caller
/// should just issue a plain single step instead of starting a session.
pub fn start_session(
    range: HalfOpenRange,
    program_memory_range: HalfOpenRange,
    mut read_program_memory: impl FnMut(u32, u32) -> ChipLinkResult<Vec<u8>>,
) -> ChipLinkResult<Option<RangeSteppingSession>> {
    if range.start >= range.end || range.start % 2 != 0 || range.end % 2 != 0 {
        return Err(ChipLinkError::Configuration(format!(
            "invalid range-stepping range [{:#x}, {:#x})",
            range.start, range.end
        )));
    }
    if !program_memory_range.contains(range.start) || range.end > program_memory_range.end {
        return Err(ChipLinkError::Configuration(format!(
            "range-stepping range [{:#x}, {:#x}) is not entirely within program memory",
            range.start, range.end
        )));
    }

    let step_byte_size = range.byte_size();
    if step_byte_size <= 2 {
        return Ok(None);
    }

    let bytes = read_program_memory(range.start, step_byte_size - 1)?;
    let instructions = opcode::decode(range.start, &bytes);

    let mut intercepted = BTreeSet::new();
    for (&address, instruction) in &instructions {
        classify_for_interception(address, *instruction, range, program_memory_range, &mut intercepted);
    }
    intercepted.insert(range.end);

    Ok(Some(RangeSteppingSession {
        range,
        intercepted_addresses: intercepted,
        single_stepping: true,
    }))
}

fn classify_for_interception(
    address: u32,
    instruction: Option<Instruction>,
    range: HalfOpenRange,
    program_memory_range: HalfOpenRange,
    intercepted: &mut BTreeSet<u32>,
) {
    let Some(instruction) = instruction else {
        // Decode failure: an opaque hazard, treat the instruction itself as
        // the interception point.
        intercepted.insert(address);
        return;
    };
    if !instruction.can_change_program_flow {
        return;
    }
    let Some(destination) = instruction.destination_address else {
        // Indirect jump/call or conditional skip: destination unknowable
        // ahead of time, intercept the instruction itself.
        intercepted.insert(address);
        return;
    };
    if !program_memory_range.contains(destination) {
        intercepted.insert(address);
        return;
    }
    if !range.contains(destination) {
        // Destination is known and falls outside the range: only the
        // destination needs interception, the instruction may run freely.
        intercepted.insert(destination);
    }
}

/// The decision a break event makes while a range-stepping session is
/// active (spec §4.4): either the target is still legitimately inside the
/// range and range-running should continue, or the stop must be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeDecision {
    ContinueRangeRun,
    ReportStop,
}

/// Consulted on a break event while `session` is active: the PC is still
/// inside the range and wasn't an intercepted address, so range-running
/// (breakpoints at every intercepted address, then `run`) should continue;
/// otherwise the stop must be reported to the debugger.
pub fn decide_resume(session: &RangeSteppingSession, current_pc: u32) -> ResumeDecision {
    if session.range.contains(current_pc) && !session.intercepted_addresses.contains(&current_pc) {
        ResumeDecision::ContinueRangeRun
    } else {
        ResumeDecision::ReportStop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program_memory() -> HalfOpenRange {
        HalfOpenRange::new(0, 0x8000)
    }

    #[test]
    fn single_instruction_range_returns_none() {
        let range = HalfOpenRange::new(0, 2);
        let session = start_session(range, program_memory(), |_, _| Ok(vec![])).unwrap();
        assert!(session.is_none());
    }

    #[test]
    fn rejects_odd_or_inverted_range() {
        assert!(start_session(HalfOpenRange::new(4, 2), program_memory(), |_, _| Ok(vec![])).is_err());
        assert!(start_session(HalfOpenRange::new(1, 5), program_memory(), |_, _| Ok(vec![])).is_err());
    }

    #[test]
    fn rejects_range_outside_program_memory() {
        let range = HalfOpenRange::new(0x7FFE, 0x8004);
        assert!(start_session(range, program_memory(), |_, _| Ok(vec![])).is_err());
    }

    #[test]
    fn intercepts_destination_of_out_of_range_rjmp() {
        // RJMP from word address 0 to word address 10 (byte 20), well past
        // the requested range [0, 8).
        let rjmp: u16 = 0b1100_0000_0000_1001; // offset +9 -> dest word 0+1+9=10
        let mut bytes = rjmp.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 6]); // pad out to cover the requested range
        let range = HalfOpenRange::new(0, 8);
        let session = start_session(range, program_memory(), move |_, _| Ok(bytes.clone()))
            .unwrap()
            .unwrap();
        assert!(session.intercepted_addresses.contains(&20));
        assert!(!session.intercepted_addresses.contains(&0));
        assert!(session.intercepted_addresses.contains(&8)); // end address always intercepted
    }

    #[test]
    fn continues_range_run_when_pc_still_inside_and_not_intercepted() {
        let session = RangeSteppingSession {
            range: HalfOpenRange::new(0, 20),
            intercepted_addresses: [20u32].into_iter().collect(),
            single_stepping: false,
        };
        assert_eq!(decide_resume(&session, 10), ResumeDecision::ContinueRangeRun);
        assert_eq!(decide_resume(&session, 20), ResumeDecision::ReportStop);
    }
}
