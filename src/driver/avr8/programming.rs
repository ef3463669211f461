//! Programming-mode bookkeeping for fuse access (spec §4.2): deciding
//! whether an access needs a transparent programming-mode entry, and what
//! must happen afterward to make fuse writes take effect.

/// Whether programming mode was already enabled before a fuse access, or the
/// driver entered it transparently just for this one access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgrammingModeEntry {
    AlreadyEnabled,
    EnteredTransparently,
}

pub fn plan_entry(programming_mode_enabled: bool) -> ProgrammingModeEntry {
    if programming_mode_enabled {
        ProgrammingModeEntry::AlreadyEnabled
    } else {
        ProgrammingModeEntry::EnteredTransparently
    }
}

/// What the driver must do after a `WriteMemory(FUSES, ...)` completes (spec
/// §4.2: "the driver must leave and (if it was already in programming mode)
/// re-enter programming mode to make the new fuse bits take effect. If the
/// driver entered programming mode transparently for this access, it stays
/// out.").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuseWriteEpilogue {
    LeaveOnly,
    LeaveThenReenter,
}

pub fn fuse_write_epilogue(entry: ProgrammingModeEntry) -> FuseWriteEpilogue {
    match entry {
        ProgrammingModeEntry::AlreadyEnabled => FuseWriteEpilogue::LeaveThenReenter,
        ProgrammingModeEntry::EnteredTransparently => FuseWriteEpilogue::LeaveOnly,
    }
}
