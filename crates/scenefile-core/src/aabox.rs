//! Axis-aligned bounding box.

use glam::Vec3;

/// Axis-aligned box. Starts out inverted (`min = +inf`, `max = -inf`) so
/// that it acts as the identity of [`Aabox::expand`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabox {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabox {
    /// The inverted box containing nothing.
    pub const EMPTY: Self = Self {
        min: Vec3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
        max: Vec3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
    };

    /// Grow the box to contain `p`.
    pub fn expand(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Grow the box to contain `other`.
    pub fn union(&mut self, other: &Aabox) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// False while the box is still inverted (no point ever expanded it).
    pub fn is_valid(&self) -> bool {
        self.max.x >= self.min.x && self.max.y >= self.min.y && self.max.z >= self.min.z
    }
}

impl Default for Aabox {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_box_is_invalid() {
        assert!(!Aabox::EMPTY.is_valid());
    }

    #[test]
    fn expand_and_union() {
        let mut b = Aabox::EMPTY;
        b.expand(Vec3::new(1.0, -2.0, 3.0));
        assert!(b.is_valid());
        assert_eq!(b.min, b.max);

        b.expand(Vec3::new(-1.0, 4.0, 0.0));
        assert_eq!(b.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(b.max, Vec3::new(1.0, 4.0, 3.0));

        let mut u = Aabox::EMPTY;
        u.union(&b);
        assert_eq!(u, b);
        // Union with an empty box changes nothing.
        u.union(&Aabox::EMPTY);
        assert_eq!(u, b);
    }
}
