//! Device selection for tensor work.

use candle_core::Device;
use tracing::info;

use crate::Result;

/// Select the best available device.
///
/// GPU backends are only compiled in behind the `cuda` / `metal` features;
/// anything unavailable falls back to CPU.
pub fn select_device(use_gpu: bool) -> Result<Device> {
    if !use_gpu {
        return Ok(Device::Cpu);
    }

    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => {
                info!("CUDA device available");
                return Ok(device);
            }
            Err(e) => {
                tracing::debug!("CUDA not available: {}, falling back to CPU", e);
            }
        }
    }

    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => {
                info!("Metal device available");
                return Ok(device);
            }
            Err(e) => {
                tracing::debug!("Metal not available: {}, falling back to CPU", e);
            }
        }
    }

    info!("No GPU backend available, using CPU");
    Ok(Device::Cpu)
}

/// Short name for reports and logs.
pub fn device_label(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "cpu",
        Device::Cuda(_) => "cuda",
        Device::Metal(_) => "metal",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_when_gpu_disabled() {
        let device = select_device(false).unwrap();
        assert_eq!(device_label(&device), "cpu");
    }
}
