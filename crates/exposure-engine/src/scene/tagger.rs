use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::hash::Hash;

use crate::error::ExposureError;
use crate::geometry::Bounds;
use crate::palette::{ColorAllocator, ColorId};

use super::{DrawList, Surface};

#[derive(Debug)]
struct Tagged {
    id: ColorId,
    surfaces: Vec<Surface>,
}

/// Registers tracked objects and assigns each one a unique tag color.
///
/// The tagger owns the per-vehicle [`ColorAllocator`]; evaluators borrow the
/// tagger to snapshot the scene and to resolve counted colors.
#[derive(Debug)]
pub struct ObjectTagger<K> {
    allocator: ColorAllocator<K>,
    objects: HashMap<K, Tagged>,
    rejected: Vec<K>,
}

impl<K: Clone + Eq + Hash> Default for ObjectTagger<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone + Eq + Hash> ObjectTagger<K> {
    pub fn new() -> Self {
        Self::with_allocator(ColorAllocator::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_allocator(ColorAllocator::with_capacity(capacity))
    }

    pub fn with_allocator(allocator: ColorAllocator<K>) -> Self {
        Self {
            allocator,
            objects: HashMap::new(),
            rejected: Vec::new(),
        }
    }

    /// Tags `object` and records the surfaces drawn for it.
    ///
    /// Idempotent: an object that is still registered keeps its identifier
    /// and only its surface list is replaced. On palette exhaustion the object
    /// is remembered in [`rejected`](Self::rejected) and left out of renders.
    pub fn setup_renderers(
        &mut self,
        object: K,
        surfaces: impl IntoIterator<Item = Surface>,
    ) -> Result<ColorId, ExposureError> {
        let surfaces: Vec<Surface> = surfaces.into_iter().collect();

        if let Some(entry) = self.objects.get_mut(&object) {
            if self.allocator.resolve(entry.id).is_some() {
                entry.surfaces = surfaces;
                return Ok(entry.id);
            }
        }

        match self.allocator.assign(object.clone()) {
            Ok(id) => {
                self.rejected.retain(|r| r != &object);
                self.objects.insert(object, Tagged { id, surfaces });
                Ok(id)
            }
            Err(err) => {
                self.objects.remove(&object);
                if !self.rejected.contains(&object) {
                    self.rejected.push(object);
                }
                Err(err)
            }
        }
    }

    /// Unregisters `object` and returns its color to the palette.
    pub fn remove(&mut self, object: &K) -> bool {
        self.rejected.retain(|r| r != object);
        let Some(entry) = self.objects.remove(object) else {
            return false;
        };
        self.allocator.release(entry.id);
        true
    }

    /// Number of tagged objects.
    #[inline]
    pub fn count(&self) -> usize {
        self.objects.len()
    }

    /// Drops every registration and invalidates all identifiers.
    pub fn reset(&mut self) {
        self.objects.clear();
        self.rejected.clear();
        self.allocator.reset();
    }

    #[inline]
    pub fn resolve(&self, id: ColorId) -> Option<&K> {
        self.allocator.resolve(id)
    }

    pub fn color_of(&self, object: &K) -> Option<ColorId> {
        self.objects.get(object).map(|t| t.id)
    }

    pub fn surfaces(&self, object: &K) -> Option<&[Surface]> {
        self.objects.get(object).map(|t| t.surfaces.as_slice())
    }

    /// Objects refused for lack of palette colors since the last reset.
    #[inline]
    pub fn rejected(&self) -> &[K] {
        &self.rejected
    }

    #[inline]
    pub fn allocator(&self) -> &ColorAllocator<K> {
        &self.allocator
    }

    /// Snapshot of every tagged surface, ordered by palette slot.
    pub fn draw_list(&self) -> DrawList {
        let mut tagged: Vec<&Tagged> = self.objects.values().collect();
        tagged.sort_by_key(|t| t.id.index());

        let mut list = DrawList::new();
        for t in tagged {
            for surface in &t.surfaces {
                list.push(t.id, surface);
            }
        }
        list
    }

    /// World bounds of all visible tagged surfaces.
    pub fn bounds(&self) -> Option<Bounds> {
        self.objects
            .values()
            .flat_map(|t| t.surfaces.iter())
            .filter(|s| s.visible)
            .filter_map(Surface::world_bounds)
            .reduce(|a, b| a.union(&b))
    }
}

impl<K: Clone + Eq + Hash + fmt::Display> ObjectTagger<K> {
    /// Human-readable listing of tagged objects, for diagnostics.
    pub fn describe(&self) -> String {
        let mut tagged: Vec<(&K, &Tagged)> = self.objects.iter().collect();
        tagged.sort_by_key(|(_, t)| t.id.index());

        let mut out = format!("{} tagged objects", tagged.len());
        for (object, t) in tagged {
            let visible = t.surfaces.iter().filter(|s| s.visible).count();
            let triangles: usize = t.surfaces.iter().map(|s| s.mesh.triangle_count()).sum();
            let _ = write!(
                out,
                "\n  {object}: color #{} ({} surfaces, {visible} visible, {triangles} triangles)",
                t.id.index(),
                t.surfaces.len(),
            );
        }
        if !self.rejected.is_empty() {
            let _ = write!(out, "\n  {} objects without a color", self.rejected.len());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use glam::{Mat4, Vec3};

    use super::*;
    use crate::scene::Mesh;

    fn cube() -> Arc<Mesh> {
        Arc::new(Mesh::cuboid(Vec3::splat(-0.5), Vec3::splat(0.5)))
    }

    fn surface(mesh: &Arc<Mesh>) -> Surface {
        Surface::new(Arc::clone(mesh), Mat4::IDENTITY)
    }

    // ── setup_renderers ───────────────────────────────────────────────────

    #[test]
    fn retagging_keeps_the_same_color() {
        let mesh = cube();
        let mut tagger = ObjectTagger::new();
        let first = tagger.setup_renderers("wing", [surface(&mesh)]).unwrap();
        let again = tagger
            .setup_renderers("wing", [surface(&mesh), surface(&mesh)])
            .unwrap();
        assert_eq!(first, again);
        assert_eq!(tagger.count(), 1);
        assert_eq!(tagger.surfaces(&"wing").unwrap().len(), 2);
    }

    #[test]
    fn objects_sharing_a_mesh_get_distinct_colors() {
        let mesh = cube();
        let mut tagger = ObjectTagger::new();
        let a = tagger.setup_renderers(1, [surface(&mesh)]).unwrap();
        let b = tagger.setup_renderers(2, [surface(&mesh)]).unwrap();
        assert_ne!(a.color(), b.color());

        let list = tagger.draw_list();
        assert_eq!(list.len(), 2);
        assert!(Arc::ptr_eq(&list.items()[0].mesh, &list.items()[1].mesh));
        assert_eq!(list.items()[0].tag, a.color());
        assert_eq!(list.items()[1].tag, b.color());
    }

    #[test]
    fn exhaustion_is_reported_and_object_omitted() {
        let mesh = cube();
        let mut tagger = ObjectTagger::with_capacity(2);
        tagger.setup_renderers(1, [surface(&mesh)]).unwrap();
        tagger.setup_renderers(2, [surface(&mesh)]).unwrap();
        let err = tagger.setup_renderers(3, [surface(&mesh)]).unwrap_err();
        assert_eq!(err, ExposureError::CapacityExceeded { capacity: 2 });
        assert_eq!(tagger.rejected(), &[3]);
        assert_eq!(tagger.count(), 2);
        assert_eq!(tagger.draw_list().len(), 2);
    }

    // ── remove / reset ────────────────────────────────────────────────────

    #[test]
    fn remove_releases_the_color() {
        let mesh = cube();
        let mut tagger = ObjectTagger::with_capacity(1);
        let a = tagger.setup_renderers("a", [surface(&mesh)]).unwrap();
        assert!(tagger.remove(&"a"));
        assert!(!tagger.remove(&"a"));
        assert_eq!(tagger.resolve(a), None);
        tagger.setup_renderers("b", [surface(&mesh)]).unwrap();
        assert_eq!(tagger.count(), 1);
    }

    #[test]
    fn reset_clears_and_stales_ids() {
        let mesh = cube();
        let mut tagger = ObjectTagger::new();
        let a = tagger.setup_renderers("a", [surface(&mesh)]).unwrap();
        tagger.reset();
        assert_eq!(tagger.count(), 0);
        assert_eq!(tagger.resolve(a), None);
        let again = tagger.setup_renderers("a", [surface(&mesh)]).unwrap();
        assert_ne!(a, again);
    }

    // ── draw list ─────────────────────────────────────────────────────────

    #[test]
    fn hidden_surfaces_are_not_drawn_but_resolvable() {
        let mesh = cube();
        let mut tagger = ObjectTagger::new();
        let id = tagger.setup_renderers("a", [surface(&mesh).hidden()]).unwrap();
        let list = tagger.draw_list();
        assert!(list.is_empty());
        assert_eq!(list.id_at(id.index()), Some(id));
        assert_eq!(list.palette_len(), 1);
    }

    #[test]
    fn describe_lists_objects() {
        let mesh = cube();
        let mut tagger = ObjectTagger::new();
        tagger.setup_renderers("nose", [surface(&mesh)]).unwrap();
        let text = tagger.describe();
        assert!(text.starts_with("1 tagged objects"));
        assert!(text.contains("nose: color #0"));
        assert!(text.contains("12 triangles"));
    }
}
