use std::sync::atomic::{AtomicBool, Ordering};

/// Device path requested by the caller.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum DevicePreference {
    /// GPU when compute shaders are available, CPU otherwise.
    #[default]
    PreferGpu,
    Cpu,
    /// GPU; degrades to CPU with a warning if compute is unsupported.
    Gpu,
    /// Evaluation disabled.
    None,
}

/// Device path that actually runs an evaluation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PhysicalDevice {
    Cpu,
    Gpu,
}

static WARNED_NO_COMPUTE: AtomicBool = AtomicBool::new(false);

impl DevicePreference {
    /// Resolves the preference against the host's compute capability.
    ///
    /// Returns `None` when evaluation is disabled.
    pub fn select(self, supports_compute: bool) -> Option<PhysicalDevice> {
        match self {
            DevicePreference::None => None,
            DevicePreference::Cpu => Some(PhysicalDevice::Cpu),
            DevicePreference::PreferGpu => Some(if supports_compute {
                PhysicalDevice::Gpu
            } else {
                PhysicalDevice::Cpu
            }),
            DevicePreference::Gpu => {
                if supports_compute {
                    return Some(PhysicalDevice::Gpu);
                }
                if !WARNED_NO_COMPUTE.swap(true, Ordering::Relaxed) {
                    log::warn!("GPU requested but compute shaders are unsupported; using CPU");
                }
                Some(PhysicalDevice::Cpu)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefer_gpu_follows_capability() {
        assert_eq!(DevicePreference::PreferGpu.select(true), Some(PhysicalDevice::Gpu));
        assert_eq!(DevicePreference::PreferGpu.select(false), Some(PhysicalDevice::Cpu));
    }

    #[test]
    fn forced_gpu_degrades_to_cpu() {
        assert_eq!(DevicePreference::Gpu.select(true), Some(PhysicalDevice::Gpu));
        assert_eq!(DevicePreference::Gpu.select(false), Some(PhysicalDevice::Cpu));
    }

    #[test]
    fn cpu_ignores_capability() {
        assert_eq!(DevicePreference::Cpu.select(true), Some(PhysicalDevice::Cpu));
    }

    #[test]
    fn none_disables_evaluation() {
        assert_eq!(DevicePreference::None.select(true), None);
        assert_eq!(DevicePreference::None.select(false), None);
    }
}
