//! Exposure engine crate.
//!
//! Estimates, per tracked object, the surface area visible along a direction
//! (airstream, sun) by rendering color-tagged geometry offscreen and counting
//! pixels on the CPU or with a GPU compute pass.

pub mod area;
pub mod config;
pub mod debug;
pub mod device;
pub mod error;
pub mod evaluator;
pub mod geometry;
pub mod logging;
pub mod palette;
pub mod reduce;
pub mod render;
pub mod scene;
pub mod vehicle;

pub use config::ExposureConfig;
pub use error::ExposureError;
