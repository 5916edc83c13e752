//! Debug visualization of delivered results.
//!
//! A [`DebugVisualizer`] is a pure consumer: it turns the tag image of an
//! evaluation into a colorized picture, an arrow along the view direction and
//! per-object text rows. Nothing it does feeds back into the engine.

mod colormap;
mod label;
mod visualizer;

pub use colormap::ColorMap;
pub use visualizer::{Arrow, DebugRow, DebugView, DebugVisualizer};

use thiserror::Error;

/// Errors from debug output.
#[derive(Debug, Error)]
pub enum DebugError {
    #[error("no result has been observed yet")]
    NoFrame,

    #[error("font load error: {0}")]
    Font(String),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}
