//! Convenience builder for constructing [`super::TargetDescriptor`] values in
//! tests and in the minimal fixture reader ([`super::tdf`]), without going
//! through the (out of scope) XML loader.

use std::collections::BTreeMap;

use super::{
    AccessMask, AddressRange, AddressSpaceDescriptor, DeviceAttributes, Endianness,
    MemorySegmentDescriptor, PeripheralDescriptor, SegmentType, TargetDescriptor,
};

#[derive(Debug, Default)]
pub struct AddressSpaceBuilder {
    key: String,
    start: u64,
    end: u64,
    endianness: Endianness,
    unit_size: u32,
    segments: BTreeMap<String, MemorySegmentDescriptor>,
}

impl Default for Endianness {
    fn default() -> Self {
        Endianness::Little
    }
}

impl AddressSpaceBuilder {
    pub fn new(key: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            key: key.into(),
            start,
            end,
            endianness: Endianness::Little,
            unit_size: 1,
            segments: BTreeMap::new(),
        }
    }

    pub fn endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    pub fn unit_size(mut self, unit_size: u32) -> Self {
        self.unit_size = unit_size;
        self
    }

    pub fn segment(mut self, segment: MemorySegmentDescriptor) -> Self {
        self.segments.insert(segment.key.clone(), segment);
        self
    }

    pub fn build(self) -> AddressSpaceDescriptor {
        AddressSpaceDescriptor {
            key: self.key,
            address_range: AddressRange::new(self.start, self.end),
            endianness: self.endianness,
            unit_size: self.unit_size,
            segments: self.segments,
        }
    }
}

pub struct SegmentBuilder {
    key: String,
    segment_type: SegmentType,
    start: u64,
    end: u64,
    page_size: Option<u32>,
    debug_mode_access: AccessMask,
    programming_mode_access: AccessMask,
}

impl SegmentBuilder {
    pub fn new(key: impl Into<String>, segment_type: SegmentType, start: u64, end: u64) -> Self {
        Self {
            key: key.into(),
            segment_type,
            start,
            end,
            page_size: None,
            debug_mode_access: AccessMask::default(),
            programming_mode_access: AccessMask::default(),
        }
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn debug_access(mut self, mask: AccessMask) -> Self {
        self.debug_mode_access = mask;
        self
    }

    pub fn programming_access(mut self, mask: AccessMask) -> Self {
        self.programming_mode_access = mask;
        self
    }

    pub fn build(self) -> MemorySegmentDescriptor {
        MemorySegmentDescriptor {
            key: self.key,
            segment_type: self.segment_type,
            address_range: AddressRange::new(self.start, self.end),
            page_size: self.page_size,
            debug_mode_access: self.debug_mode_access,
            programming_mode_access: self.programming_mode_access,
        }
    }
}

#[derive(Debug, Default)]
pub struct TargetDescriptorBuilder {
    device: Option<DeviceAttributes>,
    address_spaces: BTreeMap<String, AddressSpaceDescriptor>,
    peripherals: Vec<PeripheralDescriptor>,
    properties: BTreeMap<String, String>,
}

impl TargetDescriptorBuilder {
    pub fn new(device: DeviceAttributes) -> Self {
        Self {
            device: Some(device),
            ..Default::default()
        }
    }

    pub fn address_space(mut self, space: AddressSpaceDescriptor) -> Self {
        self.address_spaces.insert(space.key.clone(), space);
        self
    }

    pub fn peripheral(mut self, peripheral: PeripheralDescriptor) -> Self {
        self.peripherals.push(peripheral);
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> TargetDescriptor {
        TargetDescriptor {
            device: self.device.expect("device attributes are required"),
            address_spaces: self.address_spaces,
            peripherals: self.peripherals,
            properties: self.properties,
        }
    }
}
