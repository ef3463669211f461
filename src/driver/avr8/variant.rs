//! `ConfigVariant` resolution (spec §4.2): maps `(avr_family, physical_interface)`
//! to the probe-level configuration variant that drives parameter selection.

use crate::target_descriptor::{AvrFamily, PhysicalInterface};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigVariant {
    DebugWire,
    MegaJtag,
    Xmega,
    Updi,
}

impl ConfigVariant {
    /// Wire value sent as `CONFIG_VARIANT` (param id `0x00`). Concrete byte
    /// values aren't specified beyond "variant ∈ {DEBUG_WIRE, MEGAJTAG,
    /// XMEGA, UPDI}"; indices here are stable ordinals used consistently
    /// between `activate` and tests.
    pub fn wire_value(self) -> u8 {
        match self {
            ConfigVariant::DebugWire => 0x00,
            ConfigVariant::MegaJtag => 0x01,
            ConfigVariant::Xmega => 0x02,
            ConfigVariant::Updi => 0x03,
        }
    }
}

/// Pure function per spec §4.2 / §8: "For every variant-to-interface mapping
/// in §4.2, `resolveConfigVariant(family, interface)` is a pure function;
/// supplying any unmapped pair yields `None`."
pub fn resolve_config_variant(
    family: AvrFamily,
    interface: PhysicalInterface,
) -> Option<ConfigVariant> {
    use AvrFamily::*;
    use PhysicalInterface::*;
    match (family, interface) {
        (Mega, JTAG) | (Tiny, JTAG) => Some(ConfigVariant::MegaJtag),
        (Mega, DebugWire) | (Tiny, DebugWire) => Some(ConfigVariant::DebugWire),
        (Mega, UPDI) | (Tiny, UPDI) => Some(ConfigVariant::Updi),
        (Xmega, JTAG) | (Xmega, PDI) => Some(ConfigVariant::Xmega),
        (Da, UPDI) | (Db, UPDI) | (Dd, UPDI) | (Ea, UPDI) => Some(ConfigVariant::Updi),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target_descriptor::{AvrFamily, PhysicalInterface};

    #[test]
    fn resolves_every_table_row() {
        assert_eq!(
            resolve_config_variant(AvrFamily::Mega, PhysicalInterface::JTAG),
            Some(ConfigVariant::MegaJtag)
        );
        assert_eq!(
            resolve_config_variant(AvrFamily::Tiny, PhysicalInterface::DebugWire),
            Some(ConfigVariant::DebugWire)
        );
        assert_eq!(
            resolve_config_variant(AvrFamily::Xmega, PhysicalInterface::PDI),
            Some(ConfigVariant::Xmega)
        );
        assert_eq!(
            resolve_config_variant(AvrFamily::Da, PhysicalInterface::UPDI),
            Some(ConfigVariant::Updi)
        );
    }

    #[test]
    fn rejects_unmapped_pairs() {
        assert_eq!(
            resolve_config_variant(AvrFamily::Xmega, PhysicalInterface::UPDI),
            None
        );
        assert_eq!(
            resolve_config_variant(AvrFamily::Da, PhysicalInterface::JTAG),
            None
        );
        assert_eq!(
            resolve_config_variant(AvrFamily::Mega, PhysicalInterface::PDI),
            None
        );
    }
}
