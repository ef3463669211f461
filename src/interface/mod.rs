//! Probe Interface (L3, spec §4.1/§4.2/§4.3/§5): connection lifecycle,
//! busy-retry, and chunked memory I/O wrapping the stateless L2 frame codec
//! for each vendor protocol.

pub mod edbg_interface;
pub mod wch_interface;
