use thiserror::Error;

/// Errors surfaced by the exposure pipeline.
///
/// Degenerate requests and cancellation are not errors; they show up as a
/// [`crate::evaluator::Outcome`] on the delivered result instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExposureError {
    /// Every palette color is in use; the object was not tagged.
    #[error("color palette exhausted ({capacity} identifiers in use)")]
    CapacityExceeded { capacity: usize },

    /// GPU rasterization, dispatch or readback failed.
    #[error("device failure: {0}")]
    DeviceFailure(String),

    /// Render target size the device cannot allocate.
    #[error("invalid resolution {width}x{height}")]
    InvalidResolution { width: u32, height: u32 },
}

impl ExposureError {
    pub(crate) fn device(context: &str, err: impl std::fmt::Display) -> Self {
        ExposureError::DeviceFailure(format!("{context}: {err}"))
    }
}
