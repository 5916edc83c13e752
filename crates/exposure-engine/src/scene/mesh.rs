use std::sync::Arc;

use glam::{Mat4, Vec3};

use crate::geometry::Bounds;

/// Indexed triangle mesh in local space.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    positions: Vec<Vec3>,
    indices: Vec<u32>,
}

impl Mesh {
    /// Builds a mesh, dropping triangles that reference missing vertices and a
    /// trailing partial triangle.
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        let n = positions.len() as u32;
        let mut kept = Vec::with_capacity(indices.len() - indices.len() % 3);
        for tri in indices.chunks_exact(3) {
            if tri.iter().all(|&i| i < n) {
                kept.extend_from_slice(tri);
            }
        }
        if kept.len() != indices.len() {
            log::debug!(
                "Mesh: dropped {} invalid indices",
                indices.len() - kept.len()
            );
        }
        Self { positions, indices: kept }
    }

    /// Closed box spanning `min..max`.
    pub fn cuboid(min: Vec3, max: Vec3) -> Self {
        let positions = Bounds::from_min_max(min, max).corners().to_vec();
        #[rustfmt::skip]
        let indices = vec![
            0, 2, 1, 1, 2, 3, // -z
            4, 5, 6, 5, 7, 6, // +z
            0, 1, 4, 1, 5, 4, // -y
            2, 6, 3, 3, 6, 7, // +y
            0, 4, 2, 2, 4, 6, // -x
            1, 3, 5, 3, 7, 5, // +x
        ];
        Self { positions, indices }
    }

    /// Single quad with corners in winding order.
    pub fn quad(corners: [Vec3; 4]) -> Self {
        Self {
            positions: corners.to_vec(),
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }

    #[inline]
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn triangles(&self) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        self.indices.chunks_exact(3).map(|t| {
            [
                self.positions[t[0] as usize],
                self.positions[t[1] as usize],
                self.positions[t[2] as usize],
            ]
        })
    }

    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_points(self.positions.iter().copied())
    }
}

/// One renderable piece of a tracked object.
#[derive(Debug, Clone)]
pub struct Surface {
    pub mesh: Arc<Mesh>,
    /// Object-to-world transform.
    pub transform: Mat4,
    pub visible: bool,
}

impl Surface {
    pub fn new(mesh: Arc<Mesh>, transform: Mat4) -> Self {
        Self { mesh, transform, visible: true }
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Axis-aligned world bounds of the transformed mesh.
    pub fn world_bounds(&self) -> Option<Bounds> {
        let t = self.transform;
        Bounds::from_points(self.mesh.positions().iter().map(|&p| t.transform_point3(p)))
    }
}
