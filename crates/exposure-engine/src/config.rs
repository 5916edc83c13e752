use crate::device::DevicePreference;
use crate::geometry::Resolution;

/// Externally supplied knobs for a vehicle's exposure evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ExposureConfig {
    /// Evaluate exposure to the airstream while in atmosphere.
    pub airstream: bool,
    /// Evaluate exposure to the sun.
    pub sun: bool,
    pub device: DevicePreference,
    /// RGBA color painted behind objects in debug images.
    pub debug_background: [u8; 4],
    pub width: u32,
    pub height: u32,
}

impl Default for ExposureConfig {
    fn default() -> Self {
        Self {
            airstream: true,
            sun: true,
            device: DevicePreference::PreferGpu,
            debug_background: [0, 0, 0, 255],
            width: 512,
            height: 512,
        }
    }
}

impl ExposureConfig {
    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_values() {
        let config = ExposureConfig::default();
        assert!(config.airstream);
        assert!(config.sun);
        assert_eq!(config.device, DevicePreference::PreferGpu);
        assert_eq!(config.debug_background, [0, 0, 0, 255]);
        assert_eq!(config.resolution(), Resolution::new(512, 512));
    }
}
