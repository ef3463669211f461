//! Target description data model (spec §3).
//!
//! A [`TargetDescriptor`] is built once, at daemon startup, from a TDF
//! (out of scope here — see `tdf` for the minimal fixture reader used by
//! tests) and is immutable for the lifetime of the session. Address-space and
//! segment descriptors are borrowed by reference from it; nothing holds a
//! back-pointer into a `TargetDescriptor`.

pub mod builder;
pub mod tdf;

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AddressRange {
    /// inclusive
    pub start: u64,
    /// inclusive
    pub end: u64,
}

impl AddressRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn contains_addr(&self, addr: u64) -> bool {
        addr >= self.start && addr <= self.end
    }

    pub fn contains_range(&self, other: &AddressRange) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// `[start, end)` half-open range, as used by GDB's `vCont;r` and the
/// range-stepping engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HalfOpenRange {
    pub start: u32,
    pub end: u32,
}

impl HalfOpenRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.start && addr < self.end
    }

    /// Number of bytes spanned, inclusive of `end - 1`.
    pub fn byte_size(&self) -> u32 {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessMask {
    pub readable: bool,
    pub writeable: bool,
    pub executable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentType {
    Ram,
    Flash,
    Eeprom,
    Fuses,
    Lockbits,
    Signatures,
    Io,
    Registers,
    Osccal,
    UserSignatures,
    ProductionSignatures,
    Aliased,
    GeneralPurposeRegisters,
}

#[derive(Debug, Clone)]
pub struct MemorySegmentDescriptor {
    pub key: String,
    pub segment_type: SegmentType,
    /// inclusive byte-address range
    pub address_range: AddressRange,
    pub page_size: Option<u32>,
    pub debug_mode_access: AccessMask,
    pub programming_mode_access: AccessMask,
}

impl MemorySegmentDescriptor {
    pub fn is_paged(&self) -> bool {
        self.page_size.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct AddressSpaceDescriptor {
    pub key: String,
    pub address_range: AddressRange,
    pub endianness: Endianness,
    pub unit_size: u32,
    pub segments: BTreeMap<String, MemorySegmentDescriptor>,
}

impl AddressSpaceDescriptor {
    pub fn segment(&self, key: &str) -> Option<&MemorySegmentDescriptor> {
        self.segments.get(key)
    }

    /// Finds the (unique) segment whose address range contains `addr`.
    pub fn segment_containing(&self, addr: u64) -> Option<&MemorySegmentDescriptor> {
        self.segments
            .values()
            .find(|segment| segment.address_range.contains_addr(addr))
    }

    pub fn segment_of_type(&self, segment_type: SegmentType) -> Option<&MemorySegmentDescriptor> {
        self.segments
            .values()
            .find(|segment| segment.segment_type == segment_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterAccess {
    ReadOnly,
    ReadWrite,
    WriteOnly,
}

#[derive(Debug, Clone)]
pub struct BitFieldDescriptor {
    pub name: String,
    pub mask: u32,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RegisterDescriptor {
    pub name: String,
    pub start_address: u64,
    pub size: u32,
    pub access: RegisterAccess,
    pub initial_value: Option<u64>,
    pub bit_fields: Vec<BitFieldDescriptor>,
}

#[derive(Debug, Clone)]
pub struct RegisterGroupDescriptor {
    pub name: String,
    pub address_space_key: String,
    pub registers: Vec<RegisterDescriptor>,
    pub subgroups: Vec<RegisterGroupDescriptor>,
}

#[derive(Debug, Clone)]
pub struct PeripheralDescriptor {
    pub name: String,
    pub register_groups: Vec<RegisterGroupDescriptor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvrFamily {
    Mega,
    Tiny,
    Xmega,
    Da,
    Db,
    Dd,
    Ea,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicalInterface {
    JTAG,
    DebugWire,
    PDI,
    UPDI,
}

#[derive(Debug, Clone)]
pub struct DeviceAttributes {
    pub name: String,
    pub signature: Option<[u8; 3]>,
    pub avr_family: Option<AvrFamily>,
}

/// Immutable, session-wide description of the attached target. Built once
/// from a TDF; every reference a driver holds into this is a plain borrow,
/// never a back-pointer.
#[derive(Debug, Clone)]
pub struct TargetDescriptor {
    pub device: DeviceAttributes,
    pub address_spaces: BTreeMap<String, AddressSpaceDescriptor>,
    pub peripherals: Vec<PeripheralDescriptor>,
    pub properties: BTreeMap<String, String>,
}

impl TargetDescriptor {
    pub fn address_space(&self, key: &str) -> Option<&AddressSpaceDescriptor> {
        self.address_spaces.get(key)
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn property_u32(&self, key: &str) -> Option<u32> {
        self.property(key).and_then(|value| {
            value
                .strip_prefix("0x")
                .map(|hex| u32::from_str_radix(hex, 16).ok())
                .unwrap_or_else(|| value.parse::<u32>().ok())
        })
    }

    /// Validates the invariants named in spec §3: every segment lies within
    /// its address space, segment keys are unique within an address space
    /// (guaranteed by the `BTreeMap` representation), and every register
    /// group's registers lie within the address space named by
    /// `address_space_key`.
    pub fn validate(&self) -> Result<(), crate::error::ChipLinkError> {
        for space in self.address_spaces.values() {
            for segment in space.segments.values() {
                if !space.address_range.contains_range(&segment.address_range) {
                    return Err(crate::error::ChipLinkError::InvalidTargetDescriptionData(
                        format!(
                            "segment '{}' ({:?}..{:?}) lies outside address space '{}' ({:?}..{:?})",
                            segment.key,
                            segment.address_range.start,
                            segment.address_range.end,
                            space.key,
                            space.address_range.start,
                            space.address_range.end,
                        ),
                    ));
                }
            }
        }

        fn validate_group(
            group: &RegisterGroupDescriptor,
            target: &TargetDescriptor,
        ) -> Result<(), crate::error::ChipLinkError> {
            let space = target.address_space(&group.address_space_key).ok_or_else(|| {
                crate::error::ChipLinkError::InvalidTargetDescriptionData(format!(
                    "register group '{}' references unknown address space '{}'",
                    group.name, group.address_space_key
                ))
            })?;

            for register in &group.registers {
                if space.segment_containing(register.start_address).is_none() {
                    return Err(crate::error::ChipLinkError::InvalidTargetDescriptionData(format!(
                        "register '{}' at {:#x} does not lie within exactly one segment of address space '{}'",
                        register.name, register.start_address, group.address_space_key
                    )));
                }
            }

            for subgroup in &group.subgroups {
                validate_group(subgroup, target)?;
            }

            Ok(())
        }

        for peripheral in &self.peripherals {
            for group in &peripheral.register_groups {
                validate_group(group, self)?;
            }
        }

        Ok(())
    }
}
