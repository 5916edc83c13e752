//! Tagged scene description.
//!
//! Objects register their surfaces with the [`ObjectTagger`], which assigns
//! each object a color and produces a [`DrawList`] for the rasterizers. Meshes
//! are shared (`Arc`) and never modified; the color lives on the draw item.

mod list;
mod mesh;
mod tagger;

pub use list::{DrawItem, DrawList};
pub use mesh::{Mesh, Surface};
pub use tagger::ObjectTagger;
