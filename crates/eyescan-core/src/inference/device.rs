//! Device selection for inference.

use candle_core::Device;
use tracing::info;

/// Returns the best available device for inference.
///
/// Uses CUDA or Metal when the matching cargo feature is enabled and a device
/// is present, falling back to CPU.
#[must_use]
pub fn get_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            info!("Using CUDA device for inference");
            return device;
        }
    }

    #[cfg(feature = "metal")]
    {
        if let Ok(device) = Device::new_metal(0) {
            info!("Using Metal device for inference");
            return device;
        }
    }

    info!("Using CPU for inference");
    Device::Cpu
}

/// Short device name for status output.
#[must_use]
pub const fn describe_device(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "cpu",
        Device::Cuda(_) => "cuda",
        Device::Metal(_) => "metal",
    }
}
