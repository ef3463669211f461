//! RISC-V flash-write planning (spec §4.3): pure functions deciding how a
//! `writeMemory(FLASH, ...)` request splits across the WCH-Link's two
//! dedicated write paths (full block vs. partial block), and how a
//! partial-block write itself splits to stay within the probe's 64-byte,
//! page-respecting, 16-bit-aligned limits.

/// Partial block writes are capped at this many bytes per call.
pub const PARTIAL_BLOCK_MAX_BYTES: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashWriteOp {
    FullBlock { address: u32, length: u32 },
    PartialBlock { address: u32, length: u32 },
}

/// Dispatch rule (spec §4.3): writes of 64 bytes or fewer, or ones whose
/// start address isn't block-aligned, or ones that can't fit a whole block
/// before the segment ends, go entirely through the partial-block path.
/// Otherwise as many whole blocks as fit are written in full and the
/// remainder (which may still be nonzero when `length` isn't itself a
/// multiple of `block_size`) is delegated to the partial-block path.
pub fn plan_flash_write(
    address: u32,
    length: u32,
    block_size: u32,
    segment_end: u32,
) -> Vec<FlashWriteOp> {
    let block_aligned = block_size > 0 && address % block_size == 0;
    let full_blocks_bytes = if block_aligned {
        (length / block_size) * block_size
    } else {
        0
    };
    let exceeds_boundary = address.saturating_add(full_blocks_bytes) > segment_end;

    if length <= PARTIAL_BLOCK_MAX_BYTES || full_blocks_bytes == 0 || exceeds_boundary {
        return vec![FlashWriteOp::PartialBlock { address, length }];
    }

    let mut ops = vec![FlashWriteOp::FullBlock {
        address,
        length: full_blocks_bytes,
    }];
    let tail_len = length - full_blocks_bytes;
    if tail_len > 0 {
        ops.push(FlashWriteOp::PartialBlock {
            address: address + full_blocks_bytes,
            length: tail_len,
        });
    }
    ops
}

/// Splits a partial-block write into calls that are each `<=
/// PARTIAL_BLOCK_MAX_BYTES`, stay within a single flash page, and keep an
/// even (16-bit aligned) start address and length — the constraints the
/// probe's `PreparePartialFlashBlockWrite` command imposes.
pub fn split_partial_block(address: u32, length: u32, page_size: u32) -> Vec<(u32, u32)> {
    let mut chunks = Vec::new();
    let mut addr = address;
    let mut remaining = length;
    while remaining > 0 {
        let page_remaining = page_size - (addr % page_size);
        let mut chunk_len = remaining.min(PARTIAL_BLOCK_MAX_BYTES).min(page_remaining);
        if chunk_len % 2 != 0 {
            chunk_len -= 1;
        }
        if chunk_len == 0 {
            // A single misaligned byte remains; the caller's buffer is
            // assumed even-length/aligned, so this only happens at the very
            // tail of an odd-length request.
            chunk_len = remaining.min(1);
        }
        chunks.push((addr, chunk_len));
        addr += chunk_len;
        remaining -= chunk_len;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_across_one_full_block_and_a_partial_tail() {
        let ops = plan_flash_write(0, 5 * 1024, 4096, 62 * 1024);
        assert_eq!(
            ops,
            vec![
                FlashWriteOp::FullBlock { address: 0, length: 4096 },
                FlashWriteOp::PartialBlock { address: 4096, length: 1024 },
            ]
        );
    }

    #[test]
    fn small_write_is_always_partial() {
        let ops = plan_flash_write(0, 32, 4096, 62 * 1024);
        assert_eq!(ops, vec![FlashWriteOp::PartialBlock { address: 0, length: 32 }]);
    }

    #[test]
    fn write_that_would_overrun_segment_falls_back_to_partial() {
        // 62 KiB segment, 4 KiB blocks: a write starting 2 KiB from the end
        // cannot fit even one whole block before the boundary.
        let segment_end = 62 * 1024;
        let address = segment_end - 2048;
        let ops = plan_flash_write(address, 2048, 4096, segment_end);
        assert_eq!(ops, vec![FlashWriteOp::PartialBlock { address, length: 2048 }]);
    }

    #[test]
    fn unaligned_start_address_forces_partial_path() {
        let ops = plan_flash_write(10, 4096, 4096, 62 * 1024);
        assert_eq!(ops, vec![FlashWriteOp::PartialBlock { address: 10, length: 4096 }]);
    }

    #[test]
    fn partial_block_splits_at_page_boundary() {
        let chunks = split_partial_block(250, 20, 256);
        assert_eq!(chunks, vec![(250, 6), (256, 14)]);
    }

    #[test]
    fn partial_block_splits_at_max_bytes() {
        let chunks = split_partial_block(0, 100, 4096);
        assert_eq!(chunks, vec![(0, 64), (64, 36)]);
    }
}
