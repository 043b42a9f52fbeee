use blobport_core::{Device, SessionOptions};
use blobport_engine::mode::{self, Mode};
use tracing::info;

/// Reports how many accelerator devices are present.
pub trait DeviceProbe {
    fn accelerator_count(&self) -> usize;
}

/// Asks the engine for its accelerator count.
#[derive(Clone, Copy, Debug, Default)]
pub struct EngineProbe;

impl DeviceProbe for EngineProbe {
    fn accelerator_count(&self) -> usize {
        mode::accelerator_count()
    }
}

/// Picks accelerator 0 when one is usable, otherwise the CPU.
///
/// A `"gpu"` entry in `options.device_count` caps how many accelerators count
/// as usable, so a hint of 0 forces the CPU.
pub fn select_device(probe: &dyn DeviceProbe, options: &SessionOptions) -> Device {
    let mut usable = probe.accelerator_count();
    if let Some(limit) = options.device_limit("gpu") {
        usable = usable.min(limit);
    }
    if usable > 0 {
        Device::Cuda { device_id: 0 }
    } else {
        Device::Cpu
    }
}

/// Fixes the engine's process-wide execution mode. Call once from the entry
/// point before constructing sessions; later calls return the mode already in force.
pub fn init_execution_mode(probe: &dyn DeviceProbe, options: &SessionOptions) -> Device {
    let wanted = select_device(probe, options);
    let device = from_mode(mode::set_mode(to_mode(wanted)));
    if device != wanted {
        info!(requested = %wanted, mode = %device, "execution mode already fixed");
    } else {
        info!(mode = %device, accelerated = device.is_accelerated(), "execution mode");
    }
    device
}

/// The execution mode currently in force.
pub fn current_device() -> Device {
    from_mode(mode::mode())
}

fn to_mode(device: Device) -> Mode {
    match device {
        Device::Cpu => Mode::Cpu,
        Device::Cuda { device_id } => Mode::Gpu { device: device_id },
    }
}

fn from_mode(mode: Mode) -> Device {
    match mode {
        Mode::Cpu => Device::Cpu,
        Mode::Gpu { device } => Device::Cuda { device_id: device },
    }
}
