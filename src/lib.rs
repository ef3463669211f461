//! chiplink-core: vendor-agnostic GDB remote-serial-protocol daemon core for
//! Microchip EDBG/AVR8 and WCH-Link/RISC-V debug probes.
//!
//! This crate covers L2-L5 of the daemon's layering: command frame codecs,
//! probe interfaces, target drivers, the range-stepping engine, and the
//! debug session run-loop core. GDB wire framing, the USB transport, and the
//! TDF's full XML schema are external collaborators kept out of scope (see
//! each module's docs for the exact boundary).

pub mod clock;
pub mod config;
pub mod driver;
pub mod error;
pub mod frame;
pub mod interface;
pub mod probe;
pub mod rangestep;
pub mod session;
pub mod target_descriptor;
