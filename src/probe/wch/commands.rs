//! WCH-Link command sub-protocol (spec §4.1): device/attach lifecycle,
//! clock speed, and flash write-session commands. Every frame shares the
//! envelope `[0x81, cmd_id, payload_length, ...payload]`.

use crate::frame::push_be_u32;

pub const ENVELOPE_PREFIX: u8 = 0x81;

fn envelope(cmd_id: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![ENVELOPE_PREFIX, cmd_id, payload.len() as u8];
    frame.extend_from_slice(payload);
    frame
}

pub const CMD_LIFECYCLE: u8 = 0x0D;
pub const CMD_CLOCK: u8 = 0x0C;
pub const CMD_DMI: u8 = 0x08;
pub const CMD_FLASH: u8 = 0x02;
pub const CMD_SET_FLASH_WRITE_REGION: u8 = 0x01;
pub const CMD_PARTIAL_FLASH_BLOCK: u8 = 0x0A;

pub fn build_get_device_info() -> Vec<u8> {
    envelope(CMD_LIFECYCLE, &[0x01])
}

pub fn build_attach_target() -> Vec<u8> {
    envelope(CMD_LIFECYCLE, &[0x02])
}

pub fn build_post_attach() -> Vec<u8> {
    envelope(CMD_LIFECYCLE, &[0x03])
}

pub fn build_detach_target() -> Vec<u8> {
    envelope(CMD_LIFECYCLE, &[0xFF])
}

pub fn build_set_clock_speed(target_group_id: u8, speed_id: u8) -> Vec<u8> {
    envelope(CMD_CLOCK, &[target_group_id, speed_id])
}

pub fn build_set_flash_write_region(start_address: u32, byte_count: u32) -> Vec<u8> {
    let mut payload = Vec::with_capacity(8);
    push_be_u32(&mut payload, start_address);
    push_be_u32(&mut payload, byte_count);
    envelope(CMD_SET_FLASH_WRITE_REGION, &payload)
}

pub fn build_write_flash() -> Vec<u8> {
    envelope(CMD_FLASH, &[0x02])
}

pub fn build_start_ram_code_write() -> Vec<u8> {
    envelope(CMD_FLASH, &[0x05])
}

pub fn build_end_ram_code_write() -> Vec<u8> {
    envelope(CMD_FLASH, &[0x07])
}

pub fn build_end_programming_session() -> Vec<u8> {
    envelope(CMD_FLASH, &[0x08])
}

pub fn build_erase_program_memory() -> Vec<u8> {
    envelope(CMD_FLASH, &[0x01])
}

pub fn build_prepare_partial_flash_block_write(start_address: u32, length: u8) -> Vec<u8> {
    let mut payload = Vec::with_capacity(5);
    push_be_u32(&mut payload, start_address);
    payload.push(length);
    envelope(CMD_PARTIAL_FLASH_BLOCK, &payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_device_info_envelope() {
        assert_eq!(build_get_device_info(), vec![0x81, 0x0D, 0x01, 0x01]);
    }

    #[test]
    fn set_flash_write_region_is_big_endian() {
        let frame = build_set_flash_write_region(0x0000_1000, 0x0000_1000);
        assert_eq!(&frame[3..7], &0x0000_1000u32.to_be_bytes());
        assert_eq!(&frame[7..11], &0x0000_1000u32.to_be_bytes());
    }
}
