//! AVR8 memory-access dispatch (spec §4.2): selects the internal EDBG
//! memory-type opcode for a logical `(segment type, variant, programming
//! mode)` triple, applies page alignment, and emulates masked reads for
//! memory types the probe doesn't support natively.

use crate::error::{ChipLinkError, ChipLinkResult};
use crate::probe::edbg::avr8_generic::MemoryType;
use crate::target_descriptor::SegmentType;

use super::variant::ConfigVariant;

/// Resolves `(segment.type, variant, programmingModeEnabled)` to a probe
/// memory-type opcode and a (possibly rebased) address, per the table in
/// spec §4.2.
pub fn dispatch_memory_type(
    segment_type: SegmentType,
    variant: ConfigVariant,
    programming_mode_enabled: bool,
    is_write: bool,
    start_addr: u32,
    boot_section_start: Option<u32>,
) -> ChipLinkResult<(MemoryType, u32)> {
    if programming_mode_enabled && segment_type == SegmentType::Ram {
        return Err(ChipLinkError::target_operation(
            0x32,
            "RAM is not accessible while programming mode is enabled",
        ));
    }

    match segment_type {
        SegmentType::Flash => match variant {
            ConfigVariant::MegaJtag => Ok((
                if programming_mode_enabled {
                    MemoryType::FlashPage
                } else {
                    MemoryType::Spm
                },
                start_addr,
            )),
            ConfigVariant::Xmega => {
                let boot_start = boot_section_start.unwrap_or(u32::MAX);
                if start_addr >= boot_start {
                    Ok((MemoryType::BootFlash, start_addr - boot_start))
                } else {
                    Ok((MemoryType::ApplFlash, start_addr))
                }
            }
            ConfigVariant::DebugWire | ConfigVariant::Updi => {
                Ok((MemoryType::FlashPage, start_addr))
            }
        },
        SegmentType::Eeprom => match variant {
            ConfigVariant::MegaJtag => Ok((
                if programming_mode_enabled {
                    MemoryType::EepromPage
                } else {
                    MemoryType::Eeprom
                },
                start_addr,
            )),
            ConfigVariant::Xmega => Ok((MemoryType::Eeprom, start_addr)),
            ConfigVariant::Updi if is_write => Ok((MemoryType::EepromAtomic, start_addr)),
            ConfigVariant::Updi | ConfigVariant::DebugWire => Ok((MemoryType::Eeprom, start_addr)),
        },
        SegmentType::Fuses => {
            if variant == ConfigVariant::DebugWire {
                return Err(ChipLinkError::target_operation(
                    0x34,
                    "debugWIRE cannot access fuses",
                ));
            }
            let addr = if variant == ConfigVariant::Xmega {
                start_addr - boot_section_start.unwrap_or(0)
            } else {
                start_addr
            };
            Ok((MemoryType::Fuses, addr))
        }
        _ => Ok((MemoryType::Sram, start_addr)),
    }
}

/// Whether this probe memory type requires page-aligned access (spec §4.2).
pub fn requires_page_alignment(memory_type: MemoryType) -> bool {
    matches!(
        memory_type,
        MemoryType::FlashPage
            | MemoryType::ApplFlash
            | MemoryType::BootFlash
            | MemoryType::Spm
            | MemoryType::EepromPage
            | MemoryType::EepromAtomic
    )
}

/// An access request expanded to the enclosing page-aligned range, with the
/// caller's original byte range recorded as an offset/length slice into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignedRequest {
    pub aligned_address: u32,
    pub aligned_length: u32,
    pub caller_offset: u32,
    pub caller_length: u32,
}

pub fn align_request(page_size: u32, address: u32, length: u32) -> AlignedRequest {
    assert!(page_size > 0, "page size must be nonzero");
    let aligned_address = (address / page_size) * page_size;
    let end = address + length;
    let aligned_end = end.div_ceil(page_size) * page_size;
    AlignedRequest {
        aligned_address,
        aligned_length: aligned_end - aligned_address,
        caller_offset: address - aligned_address,
        caller_length: length,
    }
}

impl AlignedRequest {
    pub fn slice_caller_bytes<'a>(&self, aligned_data: &'a [u8]) -> &'a [u8] {
        let start = self.caller_offset as usize;
        let end = start + self.caller_length as usize;
        &aligned_data[start..end]
    }

    /// Patches `caller_data` into a copy of `aligned_data` at the caller's
    /// offset, for the read-modify-write path of paged writes.
    pub fn patch_caller_bytes(&self, aligned_data: &mut [u8], caller_data: &[u8]) {
        let start = self.caller_offset as usize;
        aligned_data[start..start + caller_data.len()].copy_from_slice(caller_data);
    }
}

/// Maximum per-request byte count (spec §4.2): `max(2 * (probeInputReportSize
/// - 30), pageSize)`.
pub fn max_request_bytes(probe_input_report_size: u32, page_size: Option<u32>) -> u32 {
    let from_report = 2 * probe_input_report_size.saturating_sub(30);
    from_report.max(page_size.unwrap_or(1))
}

/// Emulates a masked read for memory types that don't support the probe's
/// native `0x22` masked-read command: splits the request at each excluded
/// address, reads the surrounding segments via `raw_read`, and splices in
/// `0x00` at excluded offsets.
pub fn emulate_masked_read(
    address: u32,
    byte_count: u32,
    excluded_addresses: &[u32],
    mut raw_read: impl FnMut(u32, u32) -> ChipLinkResult<Vec<u8>>,
) -> ChipLinkResult<Vec<u8>> {
    let mut excluded: Vec<u32> = excluded_addresses
        .iter()
        .copied()
        .filter(|&addr| addr >= address && addr < address + byte_count)
        .collect();
    excluded.sort_unstable();
    excluded.dedup();

    if excluded.is_empty() {
        return raw_read(address, byte_count);
    }

    let mut result = vec![0u8; byte_count as usize];
    let mut cursor = address;
    for &excluded_addr in &excluded {
        if excluded_addr > cursor {
            let run_len = excluded_addr - cursor;
            let data = raw_read(cursor, run_len)?;
            let offset = (cursor - address) as usize;
            result[offset..offset + run_len as usize].copy_from_slice(&data);
        }
        cursor = excluded_addr + 1;
    }
    let end = address + byte_count;
    if cursor < end {
        let run_len = end - cursor;
        let data = raw_read(cursor, run_len)?;
        let offset = (cursor - address) as usize;
        result[offset..offset + run_len as usize].copy_from_slice(&data);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flash_jtag_debug_mode_selects_spm() {
        let (memory_type, addr) =
            dispatch_memory_type(SegmentType::Flash, ConfigVariant::MegaJtag, false, false, 0x100, None)
                .unwrap();
        assert_eq!(memory_type, MemoryType::Spm);
        assert_eq!(addr, 0x100);
    }

    #[test]
    fn flash_xmega_rebases_boot_section() {
        let (memory_type, addr) = dispatch_memory_type(
            SegmentType::Flash,
            ConfigVariant::Xmega,
            false,
            false,
            0x8010,
            Some(0x8000),
        )
        .unwrap();
        assert_eq!(memory_type, MemoryType::BootFlash);
        assert_eq!(addr, 0x10);
    }

    #[test]
    fn debug_wire_fuses_is_rejected() {
        let err = dispatch_memory_type(
            SegmentType::Fuses,
            ConfigVariant::DebugWire,
            true,
            false,
            0,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ChipLinkError::TargetOperation { .. }));
    }

    #[test]
    fn programming_mode_rejects_ram() {
        let err =
            dispatch_memory_type(SegmentType::Ram, ConfigVariant::Updi, true, false, 0, None)
                .unwrap_err();
        assert!(matches!(err, ChipLinkError::TargetOperation { .. }));
    }

    #[test]
    fn align_request_expands_to_page_boundaries() {
        let aligned = align_request(64, 70, 10);
        assert_eq!(aligned.aligned_address, 64);
        assert_eq!(aligned.aligned_length, 64);
        assert_eq!(aligned.caller_offset, 6);
        assert_eq!(aligned.caller_length, 10);
    }

    #[test]
    fn max_request_bytes_picks_larger_of_report_or_page() {
        assert_eq!(max_request_bytes(64, Some(256)), 256);
        assert_eq!(max_request_bytes(512, Some(64)), 964);
    }

    #[test]
    fn masked_read_splices_zero_at_excluded_address() {
        let data = emulate_masked_read(0x00, 4, &[0x02], |addr, len| {
            Ok((addr..addr + len).map(|a| a as u8 + 1).collect())
        })
        .unwrap();
        assert_eq!(data, vec![1, 2, 0, 4]);
    }

    #[test]
    fn masked_read_with_no_excluded_addresses_is_passthrough() {
        let calls = std::cell::RefCell::new(0);
        let data = emulate_masked_read(0x10, 4, &[], |addr, len| {
            *calls.borrow_mut() += 1;
            Ok((addr..addr + len).map(|a| a as u8).collect())
        })
        .unwrap();
        assert_eq!(*calls.borrow(), 1);
        assert_eq!(data, vec![0x10, 0x11, 0x12, 0x13]);
    }
}
