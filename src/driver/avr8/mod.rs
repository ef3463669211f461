//! AVR8 target driver (L4, spec §4.2): owns the live session's cached
//! execution state, breakpoint registries, programming-mode flag, and the
//! memory-type dispatch that turns address-space/segment requests into EDBG
//! probe calls.

pub mod breakpoints;
pub mod memory;
pub mod programming;
pub mod registers;
pub mod variant;

use std::rc::Rc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{ChipLinkError, ChipLinkResult};
use crate::interface::edbg_interface::EdbgInterface;
use crate::probe::edbg::avr8_generic::{self, EraseMode, StopMode};
use crate::probe::edbg::params;
use crate::probe::edbg::EdbgTransport;
use crate::target_descriptor::{PhysicalInterface, SegmentType, TargetDescriptor};

use breakpoints::{HardwareBreakpointRegistry, SoftwareBreakpointRegistry};
use programming::{fuse_write_epilogue, plan_entry, FuseWriteEpilogue};
use variant::{resolve_config_variant, ConfigVariant};

/// Attach/halt handshake poll budget (spec §5): "poll the control/status
/// register up to a fixed budget (e.g. 10 attempts at 10 µs)."
const HALT_POLL_ATTEMPTS: u32 = 10;
const HALT_POLL_INTERVAL: Duration = Duration::from_micros(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Running,
    Stopped,
    Stepping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverPhase {
    Created,
    PhysicalActive,
    Attached,
    Detached,
}

pub struct Avr8Driver<T, C> {
    interface: EdbgInterface<T, C>,
    target: Rc<TargetDescriptor>,
    physical_interface: PhysicalInterface,
    variant: ConfigVariant,
    phase: DriverPhase,
    execution_state: ExecutionState,
    programming_mode_enabled: bool,
    hardware_breakpoints: HardwareBreakpointRegistry,
    software_breakpoints: SoftwareBreakpointRegistry,
    cached_device_id: Option<[u8; 3]>,
    force_masked_read_emulation: bool,
}

impl<T: EdbgTransport, C: Clock> Avr8Driver<T, C> {
    pub fn new(
        interface: EdbgInterface<T, C>,
        target: Rc<TargetDescriptor>,
        physical_interface: PhysicalInterface,
    ) -> ChipLinkResult<Self> {
        let family = target.device.avr_family.ok_or_else(|| {
            ChipLinkError::Configuration("target description is missing an AVR family".into())
        })?;
        let variant = resolve_config_variant(family, physical_interface).ok_or_else(|| {
            ChipLinkError::Configuration(format!(
                "unsupported (family={family:?}, interface={physical_interface:?}) combination"
            ))
        })?;
        Ok(Self {
            interface,
            target,
            physical_interface,
            variant,
            phase: DriverPhase::Created,
            execution_state: ExecutionState::Stopped,
            programming_mode_enabled: false,
            hardware_breakpoints: HardwareBreakpointRegistry::new(3),
            software_breakpoints: SoftwareBreakpointRegistry::new(),
            cached_device_id: None,
            force_masked_read_emulation: false,
        })
    }

    pub fn force_masked_read_emulation(&mut self, force: bool) {
        self.force_masked_read_emulation = force;
    }

    pub fn is_attached(&self) -> bool {
        self.phase == DriverPhase::Attached
    }

    /// `[Created] --activate()--> [PhysicalActive]` then immediately
    /// `--attach()--> [Attached, Stopped]` (spec §4.2 folds both into one
    /// public `activate` call, matching the C++ source's combined entry
    /// point).
    pub fn activate(&mut self) -> ChipLinkResult<()> {
        self.load_variant_parameters()?;

        let mut apply_external_reset = false;
        let mut last_err = None;
        for attempt in 0..2 {
            match self.interface.activate_physical(apply_external_reset) {
                Ok(()) => {
                    last_err = None;
                    break;
                }
                Err(ChipLinkError::TargetOperation { code, message })
                    if self.physical_interface == PhysicalInterface::DebugWire
                        && ChipLinkError::is_debug_wire_physical_code(code)
                        && attempt == 0 =>
                {
                    warn!("debugWIRE activation failed ({code:#04x}): {message}; retrying with external reset");
                    apply_external_reset = true;
                    last_err = Some(ChipLinkError::TargetOperation { code, message });
                    continue;
                }
                Err(ChipLinkError::TargetOperation { code, message })
                    if self.physical_interface == PhysicalInterface::DebugWire
                        && ChipLinkError::is_debug_wire_physical_code(code) =>
                {
                    return Err(ChipLinkError::DebugWirePhysicalInterface { message });
                }
                Err(other) => return Err(other),
            }
        }
        if let Some(err) = last_err {
            return Err(err);
        }
        self.phase = DriverPhase::PhysicalActive;

        let break_after_attach = self.variant != ConfigVariant::MegaJtag;
        self.interface.attach(break_after_attach)?;
        self.wait_for_break_after_attach()?;

        self.phase = DriverPhase::Attached;
        self.execution_state = ExecutionState::Stopped;
        info!("attached ({:?} via {:?})", self.variant, self.physical_interface);
        Ok(())
    }

    fn wait_for_break_after_attach(&mut self) -> ChipLinkResult<()> {
        for _ in 0..HALT_POLL_ATTEMPTS {
            if self.interface.poll_break_event()?.is_some() {
                return Ok(());
            }
            self.interface.sleep(HALT_POLL_INTERVAL);
        }
        warn!("no break event observed within the attach poll budget; proceeding anyway");
        Ok(())
    }

    fn load_variant_parameters(&mut self) -> ChipLinkResult<()> {
        self.interface
            .set_parameter(params::CONTEXT_AVR8, params::CONFIG_VARIANT, &[self.variant.wire_value()])?;
        self.interface.set_parameter(
            params::CONTEXT_AVR8,
            params::CONFIG_FUNCTION,
            &[params::CONFIG_FUNCTION_DEBUGGING],
        )?;
        let interface_byte = match self.physical_interface {
            PhysicalInterface::JTAG => params::PHYSICAL_INTERFACE_JTAG,
            PhysicalInterface::DebugWire => params::PHYSICAL_INTERFACE_DEBUG_WIRE,
            PhysicalInterface::PDI => params::PHYSICAL_INTERFACE_PDI,
            PhysicalInterface::UPDI => params::PHYSICAL_INTERFACE_UPDI,
        };
        self.interface
            .set_parameter(params::CONTEXT_AVR8, params::PHYSICAL_INTERFACE, &[interface_byte])?;
        // Variant-specific device parameter bundles (flash/EEPROM geometry,
        // OCD register addresses, ...) are read from TDF properties and
        // pushed per §4.2.a; the concrete per-variant property keys are an
        // external-collaborator concern (TDF shape), so only the three
        // always-required parameters above are unconditionally sent here.
        Ok(())
    }

    pub fn deactivate(&mut self) -> ChipLinkResult<()> {
        self.interface.deactivate_physical()?;
        self.phase = DriverPhase::Detached;
        Ok(())
    }

    pub fn detach(&mut self) -> ChipLinkResult<()> {
        self.interface.detach()
    }

    /// `getExecutionState()` (spec §4.2): returns the cache without querying
    /// the probe when cached as `Stopped`; otherwise polls for a break event.
    pub fn execution_state(&mut self) -> ChipLinkResult<ExecutionState> {
        if self.execution_state == ExecutionState::Stopped {
            return Ok(ExecutionState::Stopped);
        }
        if self.interface.poll_break_event()?.is_some() {
            self.execution_state = ExecutionState::Stopped;
        }
        Ok(self.execution_state)
    }

    fn ensure_stopped(&mut self) -> ChipLinkResult<()> {
        if self.execution_state()? != ExecutionState::Stopped {
            self.stop()?;
        }
        Ok(())
    }

    pub fn run(&mut self) -> ChipLinkResult<()> {
        self.interface.drain_events()?;
        self.interface.run()?;
        self.execution_state = ExecutionState::Running;
        Ok(())
    }

    pub fn run_to(&mut self, byte_address: u32) -> ChipLinkResult<()> {
        self.interface.drain_events()?;
        self.interface.run_to(byte_address)?;
        self.execution_state = ExecutionState::Running;
        Ok(())
    }

    pub fn step(&mut self) -> ChipLinkResult<()> {
        self.interface.drain_events()?;
        self.interface.step()?;
        self.execution_state = ExecutionState::Stepping;
        Ok(())
    }

    pub fn stop(&mut self) -> ChipLinkResult<()> {
        self.interface.stop(StopMode::Immediate)?;
        self.execution_state = ExecutionState::Stopped;
        Ok(())
    }

    /// Observes a break event, if any, transitioning the cached state to
    /// `Stopped`.
    pub fn poll_break(&mut self) -> ChipLinkResult<Option<avr8_generic::BreakEvent>> {
        let event = self.interface.poll_break_event()?;
        if event.is_some() {
            self.execution_state = ExecutionState::Stopped;
        }
        Ok(event)
    }

    pub fn get_program_counter(&mut self) -> ChipLinkResult<u32> {
        self.ensure_stopped()?;
        self.interface.get_program_counter()
    }

    pub fn set_program_counter(&mut self, byte_address: u32) -> ChipLinkResult<()> {
        self.ensure_stopped()?;
        self.interface.set_program_counter(byte_address)
    }

    pub fn get_device_id(&mut self) -> ChipLinkResult<[u8; 3]> {
        if let Some(id) = self.cached_device_id {
            return Ok(id);
        }
        let payload = self.interface.get_device_id_raw()?;
        let id = if avr8_generic::is_updi_loopback_payload(&payload) {
            let signature_addr = self.signature_segment_start()?;
            self.read_memory_sram(signature_addr, 3)?
                .try_into()
                .map_err(|_| ChipLinkError::InternalFatal("signature read returned != 3 bytes".into()))?
        } else {
            avr8_generic::extract_device_id_payload(&payload)?
        };
        self.cached_device_id = Some(id);
        Ok(id)
    }

    fn signature_segment_start(&self) -> ChipLinkResult<u32> {
        let space = self
            .target
            .address_space("prog")
            .or_else(|| self.target.address_spaces.values().next());
        let segment = space
            .and_then(|s| s.segment_of_type(SegmentType::Signatures))
            .ok_or_else(|| {
                ChipLinkError::InvalidTargetDescriptionData(
                    "target description has no signatures segment".into(),
                )
            })?;
        Ok(segment.address_range.start as u32)
    }

    fn read_memory_sram(&mut self, address: u32, length: u32) -> ChipLinkResult<Vec<u8>> {
        use crate::probe::edbg::avr8_generic::MemoryType;
        self.interface.read_memory_chunked(MemoryType::Sram, address, length, 512)
    }

    /// `readMemory` dispatch (spec §4.2): selects the probe memory type,
    /// applies page alignment and masked-read emulation, and chunks the
    /// request to the probe's maximum payload size.
    pub fn read_memory(
        &mut self,
        segment_type: SegmentType,
        start_addr: u32,
        byte_count: u32,
        page_size: Option<u32>,
        boot_section_start: Option<u32>,
        ocd_data_register: Option<u32>,
        excluded_addresses: &[u32],
        probe_input_report_size: u32,
    ) -> ChipLinkResult<Vec<u8>> {
        self.ensure_stopped()?;
        let (memory_type, rebased_addr) = memory::dispatch_memory_type(
            segment_type,
            self.variant,
            self.programming_mode_enabled,
            false,
            start_addr,
            boot_section_start,
        )?;

        let mut excluded: Vec<u32> = excluded_addresses.to_vec();
        if memory_type == crate::probe::edbg::avr8_generic::MemoryType::Sram {
            if let Some(ocd) = ocd_data_register {
                excluded.push(ocd);
            }
        }

        let max_chunk = memory::max_request_bytes(probe_input_report_size, page_size);

        let use_native_mask = memory_type == crate::probe::edbg::avr8_generic::MemoryType::Sram
            && !self.force_masked_read_emulation;

        if !excluded.is_empty() && use_native_mask {
            let mut mask = vec![true; byte_count as usize];
            for &addr in &excluded {
                if addr >= rebased_addr && addr < rebased_addr + byte_count {
                    mask[(addr - rebased_addr) as usize] = false;
                }
            }
            return self
                .interface
                .read_memory_masked(memory_type, rebased_addr, byte_count, &mask);
        }

        let paged = memory::requires_page_alignment(memory_type);

        if excluded.is_empty() {
            if paged {
                let page_size = page_size.expect("paged memory type implies a known page size");
                let aligned = memory::align_request(page_size, rebased_addr, byte_count);
                let data = self.interface.read_memory_chunked(
                    memory_type,
                    aligned.aligned_address,
                    aligned.aligned_length,
                    max_chunk,
                )?;
                return Ok(aligned.slice_caller_bytes(&data).to_vec());
            }
            return self
                .interface
                .read_memory_chunked(memory_type, rebased_addr, byte_count, max_chunk);
        }

        let interface = &mut self.interface;
        memory::emulate_masked_read(rebased_addr, byte_count, &excluded, move |addr, len| {
            if paged {
                let page_size = page_size.expect("paged memory type implies a known page size");
                let aligned = memory::align_request(page_size, addr, len);
                let data = interface.read_memory_chunked(
                    memory_type,
                    aligned.aligned_address,
                    aligned.aligned_length,
                    max_chunk,
                )?;
                Ok(aligned.slice_caller_bytes(&data).to_vec())
            } else {
                interface.read_memory_chunked(memory_type, addr, len, max_chunk)
            }
        })
    }

    /// `writeMemory` dispatch; fuse writes additionally manage transparent
    /// programming-mode entry/exit per spec §4.2.
    pub fn write_memory(
        &mut self,
        segment_type: SegmentType,
        start_addr: u32,
        data: &[u8],
        page_size: Option<u32>,
        boot_section_start: Option<u32>,
        probe_input_report_size: u32,
    ) -> ChipLinkResult<()> {
        self.ensure_stopped()?;

        let entry = if segment_type == SegmentType::Fuses {
            let entry = plan_entry(self.programming_mode_enabled);
            if entry == programming::ProgrammingModeEntry::EnteredTransparently {
                self.enter_programming_mode()?;
            }
            Some(entry)
        } else {
            None
        };

        let (memory_type, rebased_addr) = memory::dispatch_memory_type(
            segment_type,
            self.variant,
            self.programming_mode_enabled,
            true,
            start_addr,
            boot_section_start,
        )?;

        let max_chunk = memory::max_request_bytes(probe_input_report_size, page_size);
        let paged = memory::requires_page_alignment(memory_type);

        if paged {
            let page_size = page_size.expect("paged memory type implies a known page size");
            let aligned = memory::align_request(page_size, rebased_addr, data.len() as u32);
            let mut block = self
                .interface
                .read_memory_chunked(memory_type, aligned.aligned_address, aligned.aligned_length, max_chunk)?;
            aligned.patch_caller_bytes(&mut block, data);
            self.interface
                .write_memory_chunked(memory_type, aligned.aligned_address, &block, max_chunk)?;
        } else {
            self.interface
                .write_memory_chunked(memory_type, rebased_addr, data, max_chunk)?;
        }

        if let Some(entry) = entry {
            match fuse_write_epilogue(entry) {
                FuseWriteEpilogue::LeaveOnly => self.leave_programming_mode()?,
                FuseWriteEpilogue::LeaveThenReenter => {
                    self.leave_programming_mode()?;
                    self.enter_programming_mode()?;
                }
            }
        }

        Ok(())
    }

    pub fn enter_programming_mode(&mut self) -> ChipLinkResult<()> {
        self.interface.enter_programming_mode()?;
        self.programming_mode_enabled = true;
        self.hardware_breakpoints.clear_all();
        debug!("entered programming mode (hardware breakpoints invalidated)");
        Ok(())
    }

    pub fn leave_programming_mode(&mut self) -> ChipLinkResult<()> {
        self.interface.leave_programming_mode()?;
        self.programming_mode_enabled = false;
        Ok(())
    }

    pub fn erase(&mut self, mode: EraseMode, start_address: u32) -> ChipLinkResult<()> {
        if mode != EraseMode::Chip && self.variant != ConfigVariant::Xmega {
            return Err(ChipLinkError::target_operation(
                0x90,
                "only XMEGA supports section erase; other variants support chip erase only",
            ));
        }
        self.interface.erase_memory(mode, start_address)
    }

    pub fn set_hardware_breakpoint(&mut self, address: u32) -> ChipLinkResult<()> {
        let slot = self.hardware_breakpoints.allocate(address)?;
        if let Err(err) = self.interface.set_hardware_breakpoint(slot, address) {
            self.hardware_breakpoints.clear(address);
            return Err(err);
        }
        Ok(())
    }

    pub fn clear_hardware_breakpoint(&mut self, address: u32) -> ChipLinkResult<()> {
        match self.hardware_breakpoints.clear(address) {
            Some(slot) => self.interface.clear_hardware_breakpoint(slot),
            None => {
                warn!("clear_hardware_breakpoint: no breakpoint set at {address:#x}");
                Ok(())
            }
        }
    }

    pub fn set_software_breakpoint(&mut self, address: u32) -> ChipLinkResult<()> {
        self.interface.set_software_breakpoints(&[address])?;
        self.software_breakpoints.insert(address);
        Ok(())
    }

    pub fn clear_software_breakpoint(&mut self, address: u32) -> ChipLinkResult<()> {
        self.interface.clear_software_breakpoints(&[address])?;
        self.software_breakpoints.remove(address);
        Ok(())
    }

    /// `clearAllBreakpoints` (spec §4.2): "clears all software breakpoints
    /// via the dedicated probe command and then clears each hardware
    /// breakpoint individually."
    pub fn clear_all_breakpoints(&mut self) -> ChipLinkResult<()> {
        self.interface.clear_all_software_breakpoints()?;
        self.software_breakpoints.take_all();
        for slot in self.hardware_breakpoints.clear_all() {
            self.interface.clear_hardware_breakpoint(slot)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::target_descriptor::builder::{AddressSpaceBuilder, SegmentBuilder, TargetDescriptorBuilder};
    use crate::target_descriptor::{AccessMask, AvrFamily, DeviceAttributes};
    use std::cell::RefCell;

    #[derive(Default)]
    struct FakeTransport {
        responses: RefCell<Vec<Vec<u8>>>,
    }

    impl EdbgTransport for FakeTransport {
        fn exchange(&mut self, _report: &[u8]) -> ChipLinkResult<Vec<u8>> {
            Ok(self.responses.borrow_mut().remove(0))
        }
        fn poll_event(&mut self) -> ChipLinkResult<Option<Vec<u8>>> {
            Ok(None)
        }
    }

    fn status_ok() -> Vec<u8> {
        vec![0x80]
    }

    fn attiny_target() -> Rc<TargetDescriptor> {
        let signatures = SegmentBuilder::new("sig", SegmentType::Signatures, 0, 2)
            .debug_access(AccessMask {
                readable: true,
                writeable: false,
                executable: false,
            })
            .build();
        let space = AddressSpaceBuilder::new("prog", 0, 0xFFFF)
            .segment(signatures)
            .build();
        let device = DeviceAttributes {
            name: "ATtiny85".into(),
            signature: Some([0x1E, 0x93, 0x0B]),
            avr_family: Some(AvrFamily::Tiny),
        };
        Rc::new(TargetDescriptorBuilder::new(device).address_space(space).build())
    }

    fn new_driver(responses: Vec<Vec<u8>>) -> Avr8Driver<FakeTransport, FakeClock> {
        let transport = FakeTransport {
            responses: RefCell::new(responses),
        };
        let interface = EdbgInterface::new(transport, FakeClock::new());
        Avr8Driver::new(interface, attiny_target(), PhysicalInterface::DebugWire).unwrap()
    }

    #[test]
    fn activate_fails_on_unsupported_combination() {
        let target = attiny_target();
        let transport = FakeTransport::default();
        let interface = EdbgInterface::new(transport, FakeClock::new());
        // TINY + PDI is not in the resolution table.
        let err = Avr8Driver::new(interface, target, PhysicalInterface::PDI).unwrap_err();
        assert!(matches!(err, ChipLinkError::Configuration(_)));
    }

    #[test]
    fn run_then_stop_updates_cached_execution_state() {
        let mut driver = new_driver(vec![status_ok(), status_ok()]);
        driver.run().unwrap();
        assert_eq!(driver.execution_state, ExecutionState::Running);
        driver.stop().unwrap();
        assert_eq!(driver.execution_state, ExecutionState::Stopped);
    }

    #[test]
    fn hardware_breakpoint_rollback_on_probe_failure() {
        let mut driver = new_driver(vec![vec![0xA0, 0x81]]); // FAILED, code 0x81
        let err = driver.set_hardware_breakpoint(0x100).unwrap_err();
        assert!(matches!(err, ChipLinkError::TargetOperation { code: 0x81, .. }));
        assert!(driver.hardware_breakpoints.slot_for(0x100).is_none());
    }

    #[test]
    fn entering_programming_mode_clears_hardware_breakpoints() {
        let mut driver = new_driver(vec![status_ok(), status_ok()]);
        driver.set_hardware_breakpoint(0x100).unwrap();
        driver.enter_programming_mode().unwrap();
        assert!(driver.hardware_breakpoints.is_empty());
    }
}
