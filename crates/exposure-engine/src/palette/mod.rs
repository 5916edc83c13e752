//! Color identifiers.
//!
//! Every tagged object is drawn in a flat color that encodes a slot index;
//! reading a pixel back yields the slot, and the allocator maps the slot to the
//! object. Identifiers carry a slot generation and an allocator epoch so that
//! colors counted after a release or reset no longer resolve.

mod allocator;
mod color;

pub use allocator::{ColorAllocator, ColorId, DEFAULT_CAPACITY};
pub use color::{TagColor, MAX_CAPACITY};
