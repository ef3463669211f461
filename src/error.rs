//! Error taxonomy for the daemon core (spec §7).
//!
//! Kinds, not exhaustive types: every layer from the frame codec up through
//! the debug session returns [`ChipLinkError`]; the session boundary is
//! responsible for translating it into an RSP reply or tearing the session
//! down, per the propagation policy in §7.

/// Looks up a human-readable reason for an EDBG AVR8-Generic failure code
/// (response `RSP_FAILED`, payload byte 0). Table from spec §7 / EDBG vendor
/// docs (`Avr8GenericFailureCodes` in the probe-rs pack).
pub fn edbg_failure_reason(code: u8) -> &'static str {
    match code {
        0x00 => "no failure",
        0x10 => "debugWIRE physical error",
        0x11 => "JTAGM failed to initialise",
        0x12 => "JTAGM did something strange",
        0x13 => "JTAG low level error",
        0x14 => "unsupported version of JTAGM",
        0x15 => "JTAG master timed out",
        0x16 => "JTAG bit banger timed out",
        0x17 => "parity error in received data",
        0x18 => "did not receive EMPTY byte",
        0x19 => "PDI physical timed out",
        0x1A => "collision on physical level",
        0x1B => "PDI enable failed",
        0x20 => "no device found",
        0x21 => "failure when increasing baud rate",
        0x22 => "target power not detected",
        0x23 => "must run attach command first",
        0x24 => "daisy chain too long",
        0x25 => "daisy chain configuration mismatch",
        0x31 => "physical interface not activated",
        0x32 => "illegal run/stopped state",
        0x33 => "invalid config for activate physical",
        0x34 => "not a valid memory type",
        0x35 => "too many or too few bytes requested",
        0x36 => "invalid address",
        0x37 => "badly aligned data",
        0x38 => "address not within legal range",
        0x39 => "illegal value given",
        0x3A => "illegal target ID",
        0x3B => "clock value out of range",
        0x3C => "a timeout occurred",
        0x3D => "read an illegal OCD status",
        0x40 => "NVM failed to be enabled",
        0x41 => "NVM failed to be disabled",
        0x42 => "illegal control/status bits",
        0x43 => "CRC mismatch",
        0x44 => "failed to enable OCD",
        0x50 => "device is not under OCD control",
        0x60 => "error while reading program counter",
        0x61 => "error while reading register",
        0x70 => "error while reading",
        0x71 => "error while writing",
        0x72 => "timeout while writing",
        0x80 => "invalid breakpoint configuration",
        0x81 => "not enough breakpoint resources available",
        0x90 => "feature not supported",
        0x91 => "command not implemented",
        0xFF => "unknown failure",
        _ => "unrecognised failure code",
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ChipLinkError {
    /// Invalid user input: unknown physical interface, inconsistent target
    /// selection. Aborts activation.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Unexpected USB framing or response size. Fatal for the session.
    #[error("device communication failure: {0}")]
    DeviceCommunication(String),

    /// The probe reported a command failure (EDBG FAILED, ISP non-OK status,
    /// DMI FAILED). `code` is the vendor status/failure byte where one
    /// exists; `message` is the enriched, human-readable reason.
    #[error("target operation failed ({code:#04x}): {message}")]
    TargetOperation { code: u8, message: String },

    /// A distinguished subtype of `TargetOperation`, raised only when
    /// activation fails on debugWIRE with failure code 0x10 or 0x44.
    #[error("debugWIRE physical interface error: {message} (check target connection, cycle power)")]
    DebugWirePhysicalInterface { message: String },

    /// Invariant violation: missing register in TDF, impossible memory-type
    /// dispatch branch. Aborts the daemon.
    #[error("internal fatal error: {0} (please report a bug)")]
    InternalFatal(String),

    /// Structural or semantic problem in the loaded TDF. Aborts daemon
    /// initialisation.
    #[error("invalid target description data: {0}")]
    InvalidTargetDescriptionData(String),
}

impl ChipLinkError {
    pub fn target_operation(code: u8, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        ChipLinkError::TargetOperation {
            code,
            message: reason,
        }
    }

    pub fn edbg_failure(code: u8) -> Self {
        ChipLinkError::TargetOperation {
            code,
            message: edbg_failure_reason(code).to_string(),
        }
    }

    /// True for the two EDBG failure codes that the spec requires be raised
    /// as `DebugWirePhysicalInterfaceError` instead of a generic
    /// `TargetOperationFailure`, when activation is attempted over debugWIRE.
    pub fn is_debug_wire_physical_code(code: u8) -> bool {
        matches!(code, 0x10 | 0x44)
    }

    /// RSP error replies are always a fixed `E01` per spec §6; this accessor
    /// documents that mapping at the one place callers need it.
    pub fn rsp_error_code(&self) -> &'static str {
        "E01"
    }
}

pub type ChipLinkResult<T> = Result<T, ChipLinkError>;
