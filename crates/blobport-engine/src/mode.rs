//! Process-wide execution mode.
//!
//! The mode is fixed once for the process; every net constructed afterwards
//! runs under it.

use std::sync::OnceLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Cpu,
    Gpu { device: u32 },
}

static MODE: OnceLock<Mode> = OnceLock::new();

/// Number of accelerator devices this engine can drive.
///
/// The reference engine only ships CPU kernels.
pub fn accelerator_count() -> usize {
    0
}

/// Fixes the process-wide mode. The first call wins; the mode in force is returned.
pub fn set_mode(mode: Mode) -> Mode {
    *MODE.get_or_init(|| mode)
}

/// The mode in force, or `Cpu` if none has been set.
pub fn mode() -> Mode {
    MODE.get().copied().unwrap_or(Mode::Cpu)
}
