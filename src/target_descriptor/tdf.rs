//! Minimal TDF fixture reader.
//!
//! The real Target Description File loader (XML, per spec §6) is an
//! external collaborator and out of scope for this crate. This module exists
//! only so tests and the `chiplinkd` binary have something concrete to point
//! at: it reads a small TOML document shaped like the TDF's data model and
//! turns it into a [`super::TargetDescriptor`]. It does not attempt to cover
//! the full XML schema (pinouts, pads, variants) — only the fields this
//! crate's drivers actually consume.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ChipLinkError, ChipLinkResult};

use super::{
    AccessMask, AddressRange, AddressSpaceDescriptor, AvrFamily, BitFieldDescriptor,
    DeviceAttributes, Endianness, MemorySegmentDescriptor, PeripheralDescriptor, RegisterAccess,
    RegisterDescriptor, RegisterGroupDescriptor, SegmentType, TargetDescriptor,
};

#[derive(Debug, Deserialize)]
struct TdfDocument {
    device: TdfDevice,
    #[serde(default)]
    address_space: Vec<TdfAddressSpace>,
    #[serde(default)]
    peripheral: Vec<TdfPeripheral>,
    #[serde(default)]
    property: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct TdfDevice {
    name: String,
    #[serde(default)]
    signature: Option<[u8; 3]>,
    #[serde(default)]
    family: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TdfAddressSpace {
    key: String,
    start: u64,
    end: u64,
    #[serde(default)]
    endianness: Option<String>,
    #[serde(default = "default_unit_size")]
    unit_size: u32,
    #[serde(default)]
    segment: Vec<TdfSegment>,
}

fn default_unit_size() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct TdfSegment {
    key: String,
    #[serde(rename = "type")]
    segment_type: String,
    start: u64,
    end: u64,
    #[serde(default)]
    page_size: Option<u32>,
    #[serde(default)]
    debug_access: TdfAccess,
    #[serde(default)]
    programming_access: TdfAccess,
}

#[derive(Debug, Default, Deserialize)]
struct TdfAccess {
    #[serde(default)]
    readable: bool,
    #[serde(default)]
    writeable: bool,
    #[serde(default)]
    executable: bool,
}

impl From<TdfAccess> for AccessMask {
    fn from(access: TdfAccess) -> Self {
        AccessMask {
            readable: access.readable,
            writeable: access.writeable,
            executable: access.executable,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TdfPeripheral {
    name: String,
    #[serde(default)]
    register_group: Vec<TdfRegisterGroup>,
}

#[derive(Debug, Deserialize)]
struct TdfRegisterGroup {
    name: String,
    address_space_key: String,
    #[serde(default)]
    register: Vec<TdfRegister>,
    #[serde(default)]
    subgroup: Vec<TdfRegisterGroup>,
}

#[derive(Debug, Deserialize)]
struct TdfRegister {
    name: String,
    start_address: u64,
    size: u32,
    #[serde(default)]
    access: Option<String>,
    #[serde(default)]
    initial_value: Option<u64>,
    #[serde(default)]
    bit_field: Vec<TdfBitField>,
}

#[derive(Debug, Deserialize)]
struct TdfBitField {
    name: String,
    mask: u32,
    #[serde(default)]
    description: Option<String>,
}

fn parse_register_access(value: &str) -> ChipLinkResult<RegisterAccess> {
    Ok(match value {
        "read_only" => RegisterAccess::ReadOnly,
        "read_write" => RegisterAccess::ReadWrite,
        "write_only" => RegisterAccess::WriteOnly,
        other => {
            return Err(ChipLinkError::InvalidTargetDescriptionData(format!(
                "unknown register access '{other}'"
            )))
        }
    })
}

fn convert_register_group(group: TdfRegisterGroup) -> ChipLinkResult<RegisterGroupDescriptor> {
    let mut registers = Vec::with_capacity(group.register.len());
    for register in group.register {
        let access = register
            .access
            .as_deref()
            .map(parse_register_access)
            .transpose()?
            .unwrap_or(RegisterAccess::ReadWrite);
        registers.push(RegisterDescriptor {
            name: register.name,
            start_address: register.start_address,
            size: register.size,
            access,
            initial_value: register.initial_value,
            bit_fields: register
                .bit_field
                .into_iter()
                .map(|field| BitFieldDescriptor {
                    name: field.name,
                    mask: field.mask,
                    description: field.description,
                })
                .collect(),
        });
    }

    let mut subgroups = Vec::with_capacity(group.subgroup.len());
    for subgroup in group.subgroup {
        subgroups.push(convert_register_group(subgroup)?);
    }

    Ok(RegisterGroupDescriptor {
        name: group.name,
        address_space_key: group.address_space_key,
        registers,
        subgroups,
    })
}

fn parse_segment_type(value: &str) -> ChipLinkResult<SegmentType> {
    Ok(match value {
        "ram" => SegmentType::Ram,
        "flash" => SegmentType::Flash,
        "eeprom" => SegmentType::Eeprom,
        "fuses" => SegmentType::Fuses,
        "lockbits" => SegmentType::Lockbits,
        "signatures" => SegmentType::Signatures,
        "io" => SegmentType::Io,
        "registers" => SegmentType::Registers,
        "osccal" => SegmentType::Osccal,
        "user_signatures" => SegmentType::UserSignatures,
        "production_signatures" => SegmentType::ProductionSignatures,
        "aliased" => SegmentType::Aliased,
        "general_purpose_registers" => SegmentType::GeneralPurposeRegisters,
        other => {
            return Err(ChipLinkError::InvalidTargetDescriptionData(format!(
                "unknown segment type '{other}'"
            )))
        }
    })
}

fn parse_family(value: &str) -> ChipLinkResult<AvrFamily> {
    Ok(match value.to_ascii_uppercase().as_str() {
        "MEGA" => AvrFamily::Mega,
        "TINY" => AvrFamily::Tiny,
        "XMEGA" => AvrFamily::Xmega,
        "DA" => AvrFamily::Da,
        "DB" => AvrFamily::Db,
        "DD" => AvrFamily::Dd,
        "EA" => AvrFamily::Ea,
        other => {
            return Err(ChipLinkError::InvalidTargetDescriptionData(format!(
                "unknown AVR family '{other}'"
            )))
        }
    })
}

/// Parses a TDF fixture document from its TOML text.
pub fn parse(source: &str) -> ChipLinkResult<TargetDescriptor> {
    let document: TdfDocument = toml::from_str(source)
        .map_err(|err| ChipLinkError::InvalidTargetDescriptionData(err.to_string()))?;

    let mut address_spaces = BTreeMap::new();
    for space in document.address_space {
        let endianness = match space.endianness.as_deref() {
            None | Some("little") => Endianness::Little,
            Some("big") => Endianness::Big,
            Some(other) => {
                return Err(ChipLinkError::InvalidTargetDescriptionData(format!(
                    "unknown endianness '{other}'"
                )))
            }
        };

        let mut segments = BTreeMap::new();
        for segment in space.segment {
            let descriptor = MemorySegmentDescriptor {
                key: segment.key.clone(),
                segment_type: parse_segment_type(&segment.segment_type)?,
                address_range: AddressRange::new(segment.start, segment.end),
                page_size: segment.page_size,
                debug_mode_access: segment.debug_access.into(),
                programming_mode_access: segment.programming_access.into(),
            };
            segments.insert(segment.key, descriptor);
        }

        address_spaces.insert(
            space.key.clone(),
            AddressSpaceDescriptor {
                key: space.key,
                address_range: AddressRange::new(space.start, space.end),
                endianness,
                unit_size: space.unit_size,
                segments,
            },
        );
    }

    let device = DeviceAttributes {
        name: document.device.name,
        signature: document.device.signature,
        avr_family: document.device.family.as_deref().map(parse_family).transpose()?,
    };

    let mut peripherals = Vec::with_capacity(document.peripheral.len());
    for peripheral in document.peripheral {
        let mut register_groups = Vec::with_capacity(peripheral.register_group.len());
        for group in peripheral.register_group {
            register_groups.push(convert_register_group(group)?);
        }
        peripherals.push(PeripheralDescriptor {
            name: peripheral.name,
            register_groups,
        });
    }

    let descriptor = TargetDescriptor {
        device,
        address_spaces,
        peripherals,
        properties: document.property,
    };

    descriptor.validate()?;
    Ok(descriptor)
}

pub fn load(path: &Path) -> ChipLinkResult<TargetDescriptor> {
    let contents = std::fs::read_to_string(path).map_err(|err| {
        ChipLinkError::InvalidTargetDescriptionData(format!(
            "failed to read TDF fixture '{}': {err}",
            path.display()
        ))
    })?;
    parse(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_attiny_fixture() {
        let toml = r#"
            [device]
            name = "ATtiny85"
            signature = [0x1E, 0x93, 0x0B]
            family = "tiny"

            [[address_space]]
            key = "prog"
            start = 0
            end = 0x1FFF
            unit_size = 1

            [[address_space.segment]]
            key = "flash"
            type = "flash"
            start = 0
            end = 0x1FFF
            page_size = 64
            [address_space.segment.debug_access]
            readable = true
            executable = true
        "#;

        let descriptor = parse(toml).expect("fixture should parse");
        assert_eq!(descriptor.device.name, "ATtiny85");
        assert_eq!(descriptor.device.signature, Some([0x1E, 0x93, 0x0B]));
        let prog = descriptor.address_space("prog").unwrap();
        let flash = prog.segment("flash").unwrap();
        assert_eq!(flash.page_size, Some(64));
        assert!(flash.debug_mode_access.readable);
    }

    #[test]
    fn parses_peripheral_register_groups() {
        let toml = r#"
            [device]
            name = "ATtiny85"

            [[address_space]]
            key = "sram"
            start = 0
            end = 0xFF

            [[address_space.segment]]
            key = "gpr"
            type = "general_purpose_registers"
            start = 0
            end = 0x1F
            [address_space.segment.debug_access]
            readable = true
            writeable = true

            [[peripheral]]
            name = "CPU"

            [[peripheral.register_group]]
            name = "GPR"
            address_space_key = "sram"

            [[peripheral.register_group.register]]
            name = "r0"
            start_address = 0
            size = 1

            [[peripheral.register_group.register]]
            name = "sp"
            start_address = 0x1D
            size = 2
            access = "read_write"

            [[peripheral.register_group.register.bit_field]]
            name = "high_byte"
            mask = 0xFF00
        "#;

        let descriptor = parse(toml).expect("fixture should parse");
        assert_eq!(descriptor.peripherals.len(), 1);
        let group = &descriptor.peripherals[0].register_groups[0];
        assert_eq!(group.address_space_key, "sram");
        assert_eq!(group.registers.len(), 2);
        assert_eq!(group.registers[1].name, "sp");
        assert_eq!(group.registers[1].bit_fields[0].mask, 0xFF00);
        assert_eq!(group.registers[0].access, RegisterAccess::ReadWrite);
    }

    #[test]
    fn rejects_segment_outside_address_space() {
        let toml = r#"
            [device]
            name = "Bogus"

            [[address_space]]
            key = "prog"
            start = 0
            end = 0xFF

            [[address_space.segment]]
            key = "flash"
            type = "flash"
            start = 0
            end = 0x1FF
        "#;

        let err = parse(toml).unwrap_err();
        assert!(matches!(err, ChipLinkError::InvalidTargetDescriptionData(_)));
    }
}
