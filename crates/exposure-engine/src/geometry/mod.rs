//! Geometry primitives and the orthographic framing used by every render.
//!
//! Conventions:
//! - world units are meters; areas are square meters
//! - clip space follows wgpu: x/y in [-1, 1], depth in [0, 1]
//! - image row 0 is the top of the frame

mod bounds;
mod camera;
mod resolution;

pub use bounds::Bounds;
pub use camera::CameraInfo;
pub use resolution::Resolution;
