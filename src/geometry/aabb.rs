use crate::geometry::{FloatType, WorldPoint, WorldVector};

/// Axis aligned bounding box.
///
/// A box describing real geometry satisfies `min <= max` componentwise.
/// The explicitly invalid box ([`Aabb::invalid`]) has `min = +inf`,
/// `max = -inf`; it marks "no geometry" and is neutral under [`Aabb::union`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb<Point> {
    pub min: Point,
    pub max: Point,
}

impl<Point> Aabb<Point> {
    pub fn new(min: Point, max: Point) -> Aabb<Point> {
        Aabb { min, max }
    }
}

impl Aabb<WorldPoint> {
    pub fn invalid() -> Self {
        Aabb {
            min: WorldPoint::new(
                FloatType::INFINITY,
                FloatType::INFINITY,
                FloatType::INFINITY,
            ),
            max: WorldPoint::new(
                FloatType::NEG_INFINITY,
                FloatType::NEG_INFINITY,
                FloatType::NEG_INFINITY,
            ),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }

    /// True when the box has exactly zero extent on all three axes.
    /// Exact comparison is intentional, the values compared are the literal
    /// stored floats, not recomputed ones.
    pub fn is_point(&self) -> bool {
        self.min == self.max
    }

    pub fn union(&self, rhs: &Self) -> Self {
        Aabb {
            min: self.min.coords.zip_map(&rhs.min.coords, FloatType::min).into(),
            max: self.max.coords.zip_map(&rhs.max.coords, FloatType::max).into(),
        }
    }

    pub fn grow(&mut self, p: &WorldPoint) {
        self.min.coords.zip_apply(&p.coords, |x, y| *x = x.min(y));
        self.max.coords.zip_apply(&p.coords, |x, y| *x = x.max(y));
    }

    pub fn center(&self) -> WorldPoint {
        self.min + self.size() / 2.0
    }

    pub fn size(&self) -> WorldVector {
        self.max - self.min
    }

    pub fn surface_area(&self) -> FloatType {
        if !self.is_valid() {
            return 0.0;
        }
        let s = self.size();
        2.0 * (s.x * s.y + s.x * s.z + s.y * s.z)
    }

    /// Componentwise containment check, `rhs` fully inside `self`.
    /// An invalid `rhs` is contained in anything.
    pub fn contains_box(&self, rhs: &Self) -> bool {
        if !rhs.is_valid() {
            return true;
        }
        self.min.x <= rhs.min.x
            && self.min.y <= rhs.min.y
            && self.min.z <= rhs.min.z
            && self.max.x >= rhs.max.x
            && self.max.y >= rhs.max.y
            && self.max.z >= rhs.max.z
    }
}

impl Default for Aabb<WorldPoint> {
    fn default() -> Self {
        Self::invalid()
    }
}
