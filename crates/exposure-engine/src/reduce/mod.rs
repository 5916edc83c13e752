//! Pixel reduction: tag image to per-slot pixel counts.
//!
//! The CPU path scans a host image synchronously. The GPU path dispatches a
//! counting compute pass and hands back a [`PendingReduction`] that the
//! evaluator polls once per tick until the readback is mapped.

mod cpu;
mod gpu;
mod histogram;

pub use cpu::CpuReducer;
pub use gpu::GpuReducer;
pub use histogram::Histogram;

use crate::device::PhysicalDevice;
use crate::error::ExposureError;
use crate::render::{Frame, Image};

/// Output of a finished reduction.
#[derive(Debug, Clone, PartialEq)]
pub struct ReducedFrame {
    pub histogram: Histogram,
    /// Host copy of the tag image, when requested.
    pub image: Option<Image>,
}

/// Result of starting a reduction.
pub enum Reduction {
    Ready(ReducedFrame),
    Pending(Box<dyn PendingReduction>),
}

/// State of an in-flight reduction.
#[derive(Debug)]
pub enum ReductionPoll {
    Pending,
    Ready(ReducedFrame),
    Failed(ExposureError),
}

/// In-flight reduction owning its device buffers until it completes or is
/// dropped.
pub trait PendingReduction {
    /// Advances the reduction without blocking.
    fn poll(&mut self) -> ReductionPoll;
}

/// Counts visible pixels per palette slot.
///
/// Background and values outside `0..palette_len` are never counted.
pub trait PixelReducer {
    fn device(&self) -> PhysicalDevice;

    fn reduce(
        &mut self,
        frame: &Frame,
        palette_len: u32,
        want_image: bool,
    ) -> Result<Reduction, ExposureError>;
}
