//! Command Frame Codec (L2, spec §4.1): per-command encoders and response
//! decoders for the two vendor protocols. Stateless — every function here is
//! a pure transform between typed arguments and bytes.

pub mod edbg;
pub mod wch;
