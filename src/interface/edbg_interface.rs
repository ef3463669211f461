//! EDBG Probe Interface (L3, spec §4.1/§4.2/§5): connection lifecycle,
//! chunked memory I/O, and breakpoint/programming-mode commands built on top
//! of the stateless L2 frame codec.

use std::time::Duration;

use log::{debug, trace};

use crate::clock::Clock;
use crate::error::ChipLinkResult;
use crate::probe::edbg::avr8_generic::{self, BreakEvent, EraseMode, MemoryType, StopMode};
use crate::probe::edbg::EdbgTransport;

/// Post-reset quiescence floor (spec §5): issuing a command too soon after a
/// reset risks `ILLEGAL_TARGET_STATE`.
pub const POST_RESET_QUIESCENCE: Duration = Duration::from_millis(250);

pub struct EdbgInterface<T, C> {
    transport: T,
    clock: C,
    sequence_id: u16,
}

impl<T: EdbgTransport, C: Clock> EdbgInterface<T, C> {
    pub fn new(transport: T, clock: C) -> Self {
        Self {
            transport,
            clock,
            sequence_id: 0,
        }
    }

    /// Exposes the interface's clock to driver-level bounded polling loops
    /// (e.g. the post-attach halt wait) so they stay testable via `FakeClock`
    /// rather than reaching for `std::thread::sleep` directly.
    pub fn sleep(&self, duration: Duration) {
        self.clock.sleep(duration);
    }

    fn next_sequence(&mut self) -> u16 {
        let id = self.sequence_id;
        self.sequence_id = self.sequence_id.wrapping_add(1);
        id
    }

    fn exchange(&mut self, frame: Vec<u8>) -> ChipLinkResult<Vec<u8>> {
        trace!("edbg >> {} bytes", frame.len());
        let response = self.transport.exchange(&frame)?;
        trace!("edbg << {} bytes", response.len());
        Ok(response)
    }

    pub fn activate_physical(&mut self, apply_external_reset: bool) -> ChipLinkResult<()> {
        let seq = self.next_sequence();
        let frame = avr8_generic::build_activate_physical(seq, apply_external_reset);
        let raw = self.exchange(frame)?;
        avr8_generic::parse_status_ok(&raw)?;
        debug!("activated physical interface (external_reset={apply_external_reset})");
        self.clock.sleep(POST_RESET_QUIESCENCE);
        Ok(())
    }

    pub fn deactivate_physical(&mut self) -> ChipLinkResult<()> {
        let seq = self.next_sequence();
        let frame = avr8_generic::build_deactivate_physical(seq);
        let raw = self.exchange(frame)?;
        avr8_generic::parse_status_ok(&raw)
    }

    pub fn set_parameter(&mut self, context: u8, param_id: u8, value: &[u8]) -> ChipLinkResult<()> {
        let seq = self.next_sequence();
        let frame = avr8_generic::build_set_parameter(seq, context, param_id, value);
        let raw = self.exchange(frame)?;
        avr8_generic::parse_status_ok(&raw)
    }

    pub fn get_parameter(&mut self, context: u8, param_id: u8, length: u8) -> ChipLinkResult<Vec<u8>> {
        let seq = self.next_sequence();
        let frame = avr8_generic::build_get_parameter(seq, context, param_id, length);
        let raw = self.exchange(frame)?;
        avr8_generic::parse_data(&raw)
    }

    /// Returns the raw `GetDeviceId` response payload. Callers interpret it
    /// (ASCII `"AVR "` loopback vs. 3-byte signature) per driver variant.
    pub fn get_device_id_raw(&mut self) -> ChipLinkResult<Vec<u8>> {
        let seq = self.next_sequence();
        let frame = avr8_generic::build_get_device_id(seq);
        let raw = self.exchange(frame)?;
        avr8_generic::parse_data(&raw)
    }

    pub fn attach(&mut self, break_after_attach: bool) -> ChipLinkResult<()> {
        let seq = self.next_sequence();
        let frame = avr8_generic::build_attach(seq, break_after_attach);
        let raw = self.exchange(frame)?;
        avr8_generic::parse_status_ok(&raw)
    }

    pub fn detach(&mut self) -> ChipLinkResult<()> {
        let seq = self.next_sequence();
        let frame = avr8_generic::build_detach(seq);
        let raw = self.exchange(frame)?;
        avr8_generic::parse_status_ok(&raw)
    }

    pub fn enter_programming_mode(&mut self) -> ChipLinkResult<()> {
        let seq = self.next_sequence();
        let frame = avr8_generic::build_enter_programming_mode(seq);
        let raw = self.exchange(frame)?;
        avr8_generic::parse_status_ok(&raw)
    }

    pub fn leave_programming_mode(&mut self) -> ChipLinkResult<()> {
        let seq = self.next_sequence();
        let frame = avr8_generic::build_leave_programming_mode(seq);
        let raw = self.exchange(frame)?;
        avr8_generic::parse_status_ok(&raw)
    }

    pub fn disable_debug_wire(&mut self) -> ChipLinkResult<()> {
        let seq = self.next_sequence();
        let frame = avr8_generic::build_disable_debug_wire(seq);
        let raw = self.exchange(frame)?;
        avr8_generic::parse_status_ok(&raw)
    }

    pub fn erase_memory(&mut self, mode: EraseMode, start_address: u32) -> ChipLinkResult<()> {
        let seq = self.next_sequence();
        let frame = avr8_generic::build_erase_memory(seq, mode, start_address);
        let raw = self.exchange(frame)?;
        avr8_generic::parse_status_ok(&raw)
    }

    /// Reads `byte_count` bytes starting at `address`, transparently
    /// splitting the request into `max_chunk`-sized probe calls. Alignment to
    /// page boundaries is the caller's (driver layer's) responsibility.
    pub fn read_memory_chunked(
        &mut self,
        memory_type: MemoryType,
        address: u32,
        byte_count: u32,
        max_chunk: u32,
    ) -> ChipLinkResult<Vec<u8>> {
        let mut result = Vec::with_capacity(byte_count as usize);
        let mut offset = 0u32;
        while offset < byte_count {
            let chunk_len = max_chunk.min(byte_count - offset);
            let seq = self.next_sequence();
            let frame = avr8_generic::build_read_memory(seq, memory_type, address + offset, chunk_len);
            let raw = self.exchange(frame)?;
            let data = avr8_generic::parse_data(&raw)?;
            result.extend_from_slice(&data);
            offset += chunk_len;
        }
        Ok(result)
    }

    /// Masked read (spec §4.2): `mask[i] == true` includes byte `i`;
    /// excluded bytes come back as `0x00` directly from the probe.
    pub fn read_memory_masked(
        &mut self,
        memory_type: MemoryType,
        address: u32,
        byte_count: u32,
        mask: &[bool],
    ) -> ChipLinkResult<Vec<u8>> {
        let packed = pack_mask(mask);
        let seq = self.next_sequence();
        let frame = avr8_generic::build_read_memory_masked(seq, memory_type, address, byte_count, &packed);
        let raw = self.exchange(frame)?;
        avr8_generic::parse_data(&raw)
    }

    pub fn write_memory_chunked(
        &mut self,
        memory_type: MemoryType,
        address: u32,
        data: &[u8],
        max_chunk: u32,
    ) -> ChipLinkResult<()> {
        let mut offset = 0usize;
        while offset < data.len() {
            let chunk_len = (max_chunk as usize).min(data.len() - offset);
            let seq = self.next_sequence();
            let frame = avr8_generic::build_write_memory(
                seq,
                memory_type,
                address + offset as u32,
                &data[offset..offset + chunk_len],
            );
            let raw = self.exchange(frame)?;
            avr8_generic::parse_status_ok(&raw)?;
            offset += chunk_len;
        }
        Ok(())
    }

    pub fn stop(&mut self, mode: StopMode) -> ChipLinkResult<()> {
        let seq = self.next_sequence();
        let frame = avr8_generic::build_stop(seq, mode);
        let raw = self.exchange(frame)?;
        avr8_generic::parse_status_ok(&raw)
    }

    pub fn run(&mut self) -> ChipLinkResult<()> {
        let seq = self.next_sequence();
        let frame = avr8_generic::build_run(seq);
        let raw = self.exchange(frame)?;
        avr8_generic::parse_status_ok(&raw)
    }

    pub fn run_to(&mut self, byte_address: u32) -> ChipLinkResult<()> {
        let seq = self.next_sequence();
        let frame = avr8_generic::build_run_to(seq, byte_address);
        let raw = self.exchange(frame)?;
        avr8_generic::parse_status_ok(&raw)
    }

    pub fn step(&mut self) -> ChipLinkResult<()> {
        let seq = self.next_sequence();
        let frame = avr8_generic::build_step(seq);
        let raw = self.exchange(frame)?;
        avr8_generic::parse_status_ok(&raw)
    }

    /// Returns the program counter as a *byte* address (word address × 2).
    pub fn get_program_counter(&mut self) -> ChipLinkResult<u32> {
        let seq = self.next_sequence();
        let frame = avr8_generic::build_get_program_counter(seq);
        let raw = self.exchange(frame)?;
        Ok(avr8_generic::parse_program_counter_words(&raw)? * 2)
    }

    pub fn set_program_counter(&mut self, byte_address: u32) -> ChipLinkResult<()> {
        let seq = self.next_sequence();
        let frame = avr8_generic::build_set_program_counter(seq, byte_address);
        let raw = self.exchange(frame)?;
        avr8_generic::parse_status_ok(&raw)
    }

    pub fn set_hardware_breakpoint(&mut self, slot: u8, byte_address: u32) -> ChipLinkResult<()> {
        let seq = self.next_sequence();
        let frame = avr8_generic::build_set_hardware_breakpoint(seq, slot, byte_address);
        let raw = self.exchange(frame)?;
        avr8_generic::parse_status_ok(&raw)
    }

    pub fn clear_hardware_breakpoint(&mut self, slot: u8) -> ChipLinkResult<()> {
        let seq = self.next_sequence();
        let frame = avr8_generic::build_clear_hardware_breakpoint(seq, slot);
        let raw = self.exchange(frame)?;
        avr8_generic::parse_status_ok(&raw)
    }

    pub fn set_software_breakpoints(&mut self, addresses: &[u32]) -> ChipLinkResult<()> {
        let seq = self.next_sequence();
        let frame = avr8_generic::build_set_software_breakpoints(seq, addresses);
        let raw = self.exchange(frame)?;
        avr8_generic::parse_status_ok(&raw)
    }

    pub fn clear_software_breakpoints(&mut self, addresses: &[u32]) -> ChipLinkResult<()> {
        let seq = self.next_sequence();
        let frame = avr8_generic::build_clear_software_breakpoints(seq, addresses);
        let raw = self.exchange(frame)?;
        avr8_generic::parse_status_ok(&raw)
    }

    pub fn clear_all_software_breakpoints(&mut self) -> ChipLinkResult<()> {
        let seq = self.next_sequence();
        let frame = avr8_generic::build_clear_all_software_breakpoints(seq);
        let raw = self.exchange(frame)?;
        avr8_generic::parse_status_ok(&raw)
    }

    /// Drains exactly one pending event, if any, without blocking.
    pub fn poll_break_event(&mut self) -> ChipLinkResult<Option<BreakEvent>> {
        match self.transport.poll_event()? {
            Some(raw) => avr8_generic::parse_break_event(&raw),
            None => Ok(None),
        }
    }

    /// Drains every currently queued event (spec §5: "events discovered via
    /// `read_event()` are drained to empty before issuing run/run-to/step").
    pub fn drain_events(&mut self) -> ChipLinkResult<()> {
        while self.transport.poll_event()?.is_some() {}
        Ok(())
    }
}

fn pack_mask(mask: &[bool]) -> Vec<u8> {
    let mut packed = vec![0u8; mask.len().div_ceil(8)];
    for (i, &include) in mask.iter().enumerate() {
        if include {
            packed[i / 8] |= 1 << (i % 8);
        }
    }
    packed
}
