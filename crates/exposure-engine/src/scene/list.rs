use std::sync::Arc;

use glam::Mat4;

use crate::palette::{ColorId, TagColor};

use super::{Mesh, Surface};

/// A single draw: shared mesh, world transform and the per-draw tag color.
#[derive(Debug, Clone)]
pub struct DrawItem {
    pub mesh: Arc<Mesh>,
    pub transform: Mat4,
    pub tag: TagColor,
}

/// Snapshot of the tagged scene taken when an evaluation starts.
///
/// Besides the draws it records which [`ColorId`] each palette slot held, so a
/// histogram counted later resolves against the identifiers that were drawn.
#[derive(Debug, Clone, Default)]
pub struct DrawList {
    items: Vec<DrawItem>,
    ids: Vec<Option<ColorId>>,
}

impl DrawList {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the surface drawn in `id`'s color. Hidden and empty surfaces are
    /// skipped, but the identifier is still recorded.
    pub fn push(&mut self, id: ColorId, surface: &Surface) {
        let slot = id.index() as usize;
        if self.ids.len() <= slot {
            self.ids.resize(slot + 1, None);
        }
        self.ids[slot] = Some(id);

        if !surface.visible || surface.mesh.is_empty() {
            return;
        }
        self.items.push(DrawItem {
            mesh: Arc::clone(&surface.mesh),
            transform: surface.transform,
            tag: id.color(),
        });
    }

    #[inline]
    pub fn items(&self) -> &[DrawItem] {
        &self.items
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Identifier drawn for palette slot `index`.
    #[inline]
    pub fn id_at(&self, index: u32) -> Option<ColorId> {
        self.ids.get(index as usize).copied().flatten()
    }

    /// Number of palette slots a histogram must cover.
    #[inline]
    pub fn palette_len(&self) -> u32 {
        self.ids.len() as u32
    }

    pub fn total_triangles(&self) -> usize {
        self.items.iter().map(|i| i.mesh.triangle_count()).sum()
    }
}
