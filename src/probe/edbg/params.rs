//! EDBG `SetParameter`/`GetParameter` ID table (spec §6).
//!
//! IDs are grouped by the context byte they're addressed under. Most AVR8
//! parameters live under `CONTEXT_AVR8 = 0x02`; the JTAG daisy-chain setting
//! is the one exception, addressed under `CONTEXT_JTAG = 0x01`.

pub const CONTEXT_JTAG: u8 = 0x01;
pub const CONTEXT_AVR8: u8 = 0x02;

pub const CONFIG_VARIANT: u8 = 0x00;
pub const CONFIG_FUNCTION: u8 = 0x01;
pub const PHYSICAL_INTERFACE: u8 = 0x02;
pub const PDI_CLOCK_SPEED: u8 = 0x03;
pub const MEGA_DEBUG_CLOCK: u8 = 0x20;
pub const JTAG_DAISY_CHAIN_SETTINGS: u8 = 0x01;
pub const ENABLE_HIGH_VOLTAGE_UPDI: u8 = 0x06;

/// `CONFIG_FUNCTION` value meaning "debugging" (as opposed to programming).
pub const CONFIG_FUNCTION_DEBUGGING: u8 = 0x00;

/// `PHYSICAL_INTERFACE` values.
pub const PHYSICAL_INTERFACE_JTAG: u8 = 0x04;
pub const PHYSICAL_INTERFACE_DEBUG_WIRE: u8 = 0x05;
pub const PHYSICAL_INTERFACE_PDI: u8 = 0x06;
pub const PHYSICAL_INTERFACE_UPDI: u8 = 0x08;

/// DEBUG_WIRE / MEGAJTAG device parameters, IDs `0x80..0x95`.
pub const DEVICE_FLASH_PAGE_SIZE: u8 = 0x80;
pub const DEVICE_FLASH_SIZE: u8 = 0x81;
pub const DEVICE_FLASH_BASE: u8 = 0x82;
pub const DEVICE_SRAM_START: u8 = 0x83;
pub const DEVICE_EEPROM_SIZE: u8 = 0x84;
pub const DEVICE_EEPROM_PAGE_SIZE: u8 = 0x85;
pub const DEVICE_BOOT_START_ADDR: u8 = 0x86;
pub const DEVICE_OCD_REVISION: u8 = 0x87;
pub const DEVICE_OCD_DATA_REGISTER: u8 = 0x88;
pub const DEVICE_EEARL_ADDR: u8 = 0x89;
pub const DEVICE_EEARH_ADDR: u8 = 0x8A;
pub const DEVICE_EECR_ADDR: u8 = 0x8B;
pub const DEVICE_EEDR_ADDR: u8 = 0x8C;
pub const DEVICE_SPMCR_REGISTER: u8 = 0x8D;
pub const DEVICE_OSCCAL_ADDR: u8 = 0x8E;

/// XMEGA device parameters, IDs `0xC0..0xCF`.
pub const DEVICE_XMEGA_APPL_BASE_ADDR: u8 = 0xC0;
pub const DEVICE_XMEGA_BOOT_BASE_ADDR: u8 = 0xC1;
pub const DEVICE_XMEGA_EEPROM_BASE_ADDR: u8 = 0xC2;
pub const DEVICE_XMEGA_FUSE_BASE_ADDR: u8 = 0xC3;
pub const DEVICE_XMEGA_LOCKBIT_BASE_ADDR: u8 = 0xC4;
pub const DEVICE_XMEGA_USER_SIGN_BASE_ADDR: u8 = 0xC5;
pub const DEVICE_XMEGA_PROD_SIGN_BASE_ADDR: u8 = 0xC6;
pub const DEVICE_XMEGA_DATA_BASE_ADDR: u8 = 0xC7;
pub const DEVICE_XMEGA_APPLICATION_BYTES: u8 = 0xC8;
pub const DEVICE_XMEGA_BOOT_BYTES: u8 = 0xC9;
pub const DEVICE_XMEGA_FLASH_PAGE_BYTES: u8 = 0xCA;
pub const DEVICE_XMEGA_EEPROM_SIZE: u8 = 0xCB;
pub const DEVICE_XMEGA_EEPROM_PAGE_SIZE: u8 = 0xCC;
pub const DEVICE_XMEGA_NVM_BASE: u8 = 0xCD;
pub const DEVICE_XMEGA_SIGNATURE_OFFSET: u8 = 0xCE;

/// UPDI device parameters, IDs `0xD0..0xDE`.
pub const DEVICE_UPDI_PROGMEM_BASE_ADDR: u8 = 0xD0;
pub const DEVICE_UPDI_PROGMEM_BASE_ADDR_MSB: u8 = 0xD1;
pub const DEVICE_UPDI_24_BIT_ADDRESSING_ENABLE: u8 = 0xD2;
pub const DEVICE_UPDI_FLASH_PAGE_SIZE: u8 = 0xD3;
pub const DEVICE_UPDI_FLASH_PAGE_SIZE_MSB: u8 = 0xD4;
pub const DEVICE_UPDI_EEPROM_PAGE_SIZE: u8 = 0xD5;
pub const DEVICE_UPDI_NVMCTRL_ADDR: u8 = 0xD6;
pub const DEVICE_UPDI_OCD_ADDR: u8 = 0xD7;
pub const DEVICE_UPDI_FLASH_SIZE: u8 = 0xD8;
pub const DEVICE_UPDI_EEPROM_SIZE: u8 = 0xD9;
pub const DEVICE_UPDI_EEPROM_BASE_ADDR: u8 = 0xDA;
pub const DEVICE_UPDI_SIG_BASE_ADDR: u8 = 0xDB;
pub const DEVICE_UPDI_FUSE_BASE_ADDR: u8 = 0xDC;
pub const DEVICE_UPDI_FUSE_SIZE: u8 = 0xDD;
pub const DEVICE_UPDI_LOCK_BASE_ADDR: u8 = 0xDE;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_interface_encodings_are_distinct() {
        let values = [
            PHYSICAL_INTERFACE_JTAG,
            PHYSICAL_INTERFACE_DEBUG_WIRE,
            PHYSICAL_INTERFACE_PDI,
            PHYSICAL_INTERFACE_UPDI,
        ];
        for (i, a) in values.iter().enumerate() {
            for b in &values[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
