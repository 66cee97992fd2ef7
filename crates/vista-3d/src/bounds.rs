use glam::{Mat4, Vec3, Vec4};

/// Axis-aligned bounding box in mesh-local space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest box around `points`, or `None` when there are none.
    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Some(Self { min, max })
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// Conservative test against the clip volume of `world_view_proj`.
    ///
    /// The box is rejected only when all eight corners are outside the same
    /// plane, so a few boxes near frustum edges are accepted though they do
    /// not intersect. Depth follows wgpu's `0..=w` range.
    pub fn intersects_clip(&self, world_view_proj: &Mat4) -> bool {
        let clip = self
            .corners()
            .map(|c| *world_view_proj * Vec4::new(c.x, c.y, c.z, 1.0));

        let outside = |test: fn(&Vec4) -> bool| clip.iter().all(test);

        !(outside(|p: &Vec4| p.x < -p.w)
            || outside(|p: &Vec4| p.x > p.w)
            || outside(|p: &Vec4| p.y < -p.w)
            || outside(|p: &Vec4| p.y > p.w)
            || outside(|p: &Vec4| p.z < 0.0)
            || outside(|p: &Vec4| p.z > p.w))
    }
}
