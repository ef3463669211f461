//! AVR8 register access batching (spec §4.2): "The driver batches a
//! `readRegisters(descriptors)` call into at most two large reads (one SRAM
//! range, one REGISTER_FILE range) spanning the min/max addresses of the
//! requested descriptors." Multi-byte registers are little-endian on the
//! wire and big-endian to callers.

use std::collections::BTreeMap;

use crate::target_descriptor::RegisterDescriptor;

/// A register together with the address-space key its group belongs to.
pub struct RegisterRequest<'a> {
    pub address_space_key: &'a str,
    pub descriptor: &'a RegisterDescriptor,
}

/// One batched read: a single contiguous range to fetch from a single
/// address space, spanning the min/max of every register requested in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchedRead {
    pub address_space_key: String,
    pub start_address: u64,
    pub length: u32,
}

/// Groups register requests by address space and computes the minimal
/// spanning range for each group. With the current data model there are at
/// most two groups in practice (SRAM, REGISTER_FILE) but this makes no
/// assumption about the number of distinct address spaces in play.
pub fn plan_batched_reads(requests: &[RegisterRequest<'_>]) -> Vec<BatchedRead> {
    let mut spans: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for request in requests {
        let start = request.descriptor.start_address;
        let end = start + request.descriptor.size as u64;
        spans
            .entry(request.address_space_key)
            .and_modify(|(lo, hi)| {
                *lo = (*lo).min(start);
                *hi = (*hi).max(end);
            })
            .or_insert((start, end));
    }
    spans
        .into_iter()
        .map(|(key, (lo, hi))| BatchedRead {
            address_space_key: key.to_string(),
            start_address: lo,
            length: (hi - lo) as u32,
        })
        .collect()
}

/// Slices one register's raw little-endian bytes out of a batched read's
/// result buffer and reverses them into caller (big-endian) order.
pub fn extract_register_value(
    batch_start_address: u64,
    batch_data: &[u8],
    descriptor: &RegisterDescriptor,
) -> Vec<u8> {
    let offset = (descriptor.start_address - batch_start_address) as usize;
    let mut value = batch_data[offset..offset + descriptor.size as usize].to_vec();
    value.reverse();
    value
}

/// Converts a caller-supplied (big-endian) register value back into
/// little-endian wire order for a write.
pub fn to_wire_order(caller_value: &[u8]) -> Vec<u8> {
    let mut wire = caller_value.to_vec();
    wire.reverse();
    wire
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target_descriptor::RegisterAccess;

    fn descriptor(name: &str, start_address: u64, size: u32) -> RegisterDescriptor {
        RegisterDescriptor {
            name: name.to_string(),
            start_address,
            size,
            access: RegisterAccess::ReadWrite,
            initial_value: None,
            bit_fields: Vec::new(),
        }
    }

    #[test]
    fn plans_one_batch_per_address_space() {
        let r0 = descriptor("r0", 0x00, 1);
        let r31 = descriptor("r31", 0x1F, 1);
        let sp = descriptor("sp", 0x5D, 2);
        let requests = vec![
            RegisterRequest {
                address_space_key: "sram",
                descriptor: &r0,
            },
            RegisterRequest {
                address_space_key: "sram",
                descriptor: &r31,
            },
            RegisterRequest {
                address_space_key: "sram",
                descriptor: &sp,
            },
        ];
        let batches = plan_batched_reads(&requests);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].start_address, 0x00);
        assert_eq!(batches[0].length, 0x5F);
    }

    #[test]
    fn register_bytes_are_reversed_into_caller_order() {
        let sp = descriptor("sp", 0x10, 2);
        let batch_data = [0xAA, 0xBB, 0x34, 0x12];
        let value = extract_register_value(0x10, &batch_data, &sp);
        assert_eq!(value, vec![0xBB, 0xAA]);
    }

    #[test]
    fn wire_order_reverses_back() {
        assert_eq!(to_wire_order(&[0x12, 0x34]), vec![0x34, 0x12]);
    }
}
