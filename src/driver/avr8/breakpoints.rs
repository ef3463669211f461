//! AVR8 breakpoint registries (spec §4.2, §9): "Ordered or hash maps
//! `address -> slot`... Plain owned collections; no cyclic references."

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{ChipLinkError, ChipLinkResult};

/// Hardware breakpoint slot allocator. AVR8 probes expose a small, fixed
/// number of slots (typically 1-3); `set` allocates the lowest free slot and
/// fails once all are taken.
#[derive(Debug, Clone)]
pub struct HardwareBreakpointRegistry {
    max_slots: u8,
    slots: BTreeMap<u32, u8>,
}

impl HardwareBreakpointRegistry {
    pub fn new(max_slots: u8) -> Self {
        Self {
            max_slots,
            slots: BTreeMap::new(),
        }
    }

    pub fn free_count(&self) -> u8 {
        self.max_slots - self.slots.len() as u8
    }

    pub fn slot_for(&self, address: u32) -> Option<u8> {
        self.slots.get(&address).copied()
    }

    /// Allocates the lowest unused slot number for `address`. Fails without
    /// mutating the map if no slot is free (spec §8 boundary behaviour).
    pub fn allocate(&mut self, address: u32) -> ChipLinkResult<u8> {
        if let Some(&slot) = self.slots.get(&address) {
            return Ok(slot);
        }
        if self.slots.len() as u8 >= self.max_slots {
            return Err(ChipLinkError::target_operation(
                0x81,
                "no free hardware breakpoint slots",
            ));
        }
        let used: BTreeSet<u8> = self.slots.values().copied().collect();
        let slot = (0..self.max_slots)
            .find(|slot| !used.contains(slot))
            .expect("free_count > 0 guarantees a free slot exists");
        self.slots.insert(address, slot);
        Ok(slot)
    }

    /// Clears the breakpoint at `address` if one exists. Returns `None` for
    /// an unknown address — the caller logs a non-fatal warning rather than
    /// treating this as an error (spec §4.2).
    pub fn clear(&mut self, address: u32) -> Option<u8> {
        self.slots.remove(&address)
    }

    /// Returns every currently allocated slot and empties the registry
    /// (spec §4.2: "Entering programming mode invalidates all hardware
    /// breakpoints (the map is cleared)").
    pub fn clear_all(&mut self) -> Vec<u8> {
        let slots: Vec<u8> = self.slots.values().copied().collect();
        self.slots.clear();
        slots
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Software breakpoints are tracked only as a set of addresses: AVR8
/// software breakpoints are inserted/removed entirely by the probe firmware
/// via `SetSoftwareBreakpoints`/`ClearSoftwareBreakpoints` — the driver never
/// reads back or stores original instruction bytes for these (contrast with
/// the RISC-V driver, which has to splice opcodes itself).
#[derive(Debug, Clone, Default)]
pub struct SoftwareBreakpointRegistry {
    addresses: BTreeSet<u32>,
}

impl SoftwareBreakpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, address: u32) {
        self.addresses.insert(address);
    }

    pub fn remove(&mut self, address: u32) -> bool {
        self.addresses.remove(&address)
    }

    pub fn addresses(&self) -> Vec<u32> {
        self.addresses.iter().copied().collect()
    }

    pub fn take_all(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.addresses).into_iter().collect()
    }
}
