use glam::{Mat4, Vec3};

/// Axis-aligned box in an object's local space, stored as center + half extents.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Bounds {
    pub center: Vec3,
    /// Half size along each axis.
    pub extents: Vec3,
}

impl Bounds {
    #[inline]
    pub const fn new(center: Vec3, extents: Vec3) -> Self {
        Self { center, extents }
    }

    #[inline]
    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        Self {
            center: (min + max) * 0.5,
            extents: (max - min).abs() * 0.5,
        }
    }

    /// Smallest box containing every point, or `None` for an empty iterator.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let (min, max) = points.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p)));
        Some(Self::from_min_max(min, max))
    }

    #[inline]
    pub fn min(&self) -> Vec3 {
        self.center - self.extents
    }

    #[inline]
    pub fn max(&self) -> Vec3 {
        self.center + self.extents
    }

    #[inline]
    pub fn size(&self) -> Vec3 {
        self.extents * 2.0
    }

    #[inline]
    pub fn volume(&self) -> f32 {
        let s = self.size();
        s.x * s.y * s.z
    }

    /// Zero volume or non-finite.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        !self.center.is_finite() || !self.extents.is_finite() || self.volume() <= 0.0
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min(), self.max());
        [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ]
    }

    /// Axis-aligned box enclosing this box after `transform`.
    pub fn transformed(&self, transform: Mat4) -> Self {
        Self::from_points(self.corners().map(|c| transform.transform_point3(c)))
            .unwrap_or(*self)
    }

    pub fn union(&self, other: &Bounds) -> Self {
        Self::from_min_max(self.min().min(other.min()), self.max().max(other.max()))
    }
}
