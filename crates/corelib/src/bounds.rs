//! Axis-aligned bounding box accumulated one point at a time.

use crate::Vec3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    /// Empty box: min at +inf, max at -inf, so the first point defines it.
    #[inline]
    pub const fn empty() -> Self {
        Self {
            min: Vec3::INFINITY,
            max: Vec3::NEG_INFINITY,
        }
    }

    #[inline]
    pub fn reset(&mut self) {
        *self = Self::empty();
    }

    /// Fold one point into the box.
    #[inline]
    pub fn add(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    pub fn size(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            self.max - self.min
        }
    }

    /// Largest extent along any axis.
    #[inline]
    pub fn max_size(&self) -> f32 {
        self.size().max_element()
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

impl FromIterator<Vec3> for BoundingBox {
    fn from_iter<I: IntoIterator<Item = Vec3>>(iter: I) -> Self {
        let mut bbox = Self::empty();
        for p in iter {
            bbox.add(p);
        }
        bbox
    }
}
