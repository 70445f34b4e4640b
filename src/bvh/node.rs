use assert2::debug_assert;
use simba::simd::WideF32x4;
use wide::f32x4;

use super::node_ref::PackedNodeRef;
use crate::geometry::{Aabb, FloatType, SimdFloatType, WorldBox, WorldPoint};

/// Branching factor of the tree.
pub const NODE_WIDTH: usize = 4;

/// One corner of one child: three coordinates plus a reference slot.
///
/// The lower and upper arrays share this shape so that a wide load picks up
/// four children's worth of one corner group in a single instruction; only
/// the lower side's `link` is meaningful, the upper side's stays
/// [`PackedNodeRef::EMPTY`] as reserved padding.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NodeCorner {
    pub x: FloatType,
    pub y: FloatType,
    pub z: FloatType,
    pub link: PackedNodeRef,
}

unsafe impl bytemuck::Zeroable for NodeCorner {}
unsafe impl bytemuck::Pod for NodeCorner {}

/// Full precision 4-wide node: bounds and references of four children,
/// stored as two parallel corner arrays. Two cache lines, lower half then
/// upper half.
#[repr(C, align(64))]
#[derive(Copy, Clone, PartialEq)]
pub struct Node {
    pub lower: [NodeCorner; NODE_WIDTH],
    pub upper: [NodeCorner; NODE_WIDTH],
}

unsafe impl bytemuck::Zeroable for Node {}
unsafe impl bytemuck::Pod for Node {}

const _: () = assert!(size_of::<Node>() == 128);
const _: () = assert!(align_of::<Node>() == 64);

impl Node {
    /// A node with all four child slots invalidated.
    pub fn invalid() -> Node {
        let mut node = Node {
            lower: [NodeCorner {
                x: 0.0,
                y: 0.0,
                z: 0.0,
                link: PackedNodeRef::EMPTY,
            }; NODE_WIDTH],
            upper: [NodeCorner {
                x: 0.0,
                y: 0.0,
                z: 0.0,
                link: PackedNodeRef::EMPTY,
            }; NODE_WIDTH],
        };
        for i in 0..NODE_WIDTH {
            node.set_invalid(i);
        }
        node
    }

    /// Bounds of child `i`. Out of range `i` is checked in debug builds only.
    pub fn bounds(&self, i: usize) -> WorldBox {
        debug_assert!(i < NODE_WIDTH);
        Aabb {
            min: WorldPoint::new(self.lower[i].x, self.lower[i].y, self.lower[i].z),
            max: WorldPoint::new(self.upper[i].x, self.upper[i].y, self.upper[i].z),
        }
    }

    pub fn set_bounds(&mut self, i: usize, b: &WorldBox) {
        debug_assert!(i < NODE_WIDTH);
        self.lower[i].x = b.min.x;
        self.lower[i].y = b.min.y;
        self.lower[i].z = b.min.z;

        self.upper[i].x = b.max.x;
        self.upper[i].y = b.max.y;
        self.upper[i].z = b.max.z;
    }

    /// Marks child slot `i` as never populated: infinite inverted bounds,
    /// invalid link on the lower side, empty link in the reserved slot.
    pub fn set_invalid(&mut self, i: usize) {
        debug_assert!(i < NODE_WIDTH);
        self.lower[i].x = FloatType::INFINITY;
        self.lower[i].y = FloatType::INFINITY;
        self.lower[i].z = FloatType::INFINITY;
        self.lower[i].link = PackedNodeRef::INVALID;

        self.upper[i].x = FloatType::NEG_INFINITY;
        self.upper[i].y = FloatType::NEG_INFINITY;
        self.upper[i].z = FloatType::NEG_INFINITY;
        self.upper[i].link = PackedNodeRef::EMPTY;
    }

    /// True when child `i` has exactly zero extent on all three axes.
    /// Compares the stored floats bit for bit, no epsilon; a degenerate
    /// triangle stores the same literal value in both corners.
    pub fn is_degenerate(&self, i: usize) -> bool {
        debug_assert!(i < NODE_WIDTH);
        self.lower[i].x == self.upper[i].x
            && self.lower[i].y == self.upper[i].y
            && self.lower[i].z == self.upper[i].z
    }

    pub fn child(&self, i: usize) -> PackedNodeRef {
        debug_assert!(i < NODE_WIDTH);
        self.lower[i].link
    }

    pub fn set_child(&mut self, i: usize, child: PackedNodeRef) {
        debug_assert!(i < NODE_WIDTH);
        self.lower[i].link = child;
    }

    /// All four children's lower x coordinates as one 4-lane vector.
    /// Together with the y/z/upper variants this is the portable form of
    /// the one-instruction ray-vs-four-children bounds test.
    pub fn lower_x(&self) -> SimdFloatType {
        WideF32x4(f32x4::from(self.lower.map(|c| c.x)))
    }

    pub fn lower_y(&self) -> SimdFloatType {
        WideF32x4(f32x4::from(self.lower.map(|c| c.y)))
    }

    pub fn lower_z(&self) -> SimdFloatType {
        WideF32x4(f32x4::from(self.lower.map(|c| c.z)))
    }

    pub fn upper_x(&self) -> SimdFloatType {
        WideF32x4(f32x4::from(self.upper.map(|c| c.x)))
    }

    pub fn upper_y(&self) -> SimdFloatType {
        WideF32x4(f32x4::from(self.upper.map(|c| c.y)))
    }

    pub fn upper_z(&self) -> SimdFloatType {
        WideF32x4(f32x4::from(self.upper.map(|c| c.z)))
    }

    /// Raw 16-byte lane group of child `i`'s lower corner (x, y, z and the
    /// link bit pattern). The quantizer and debug tooling use this view.
    pub fn lower_lanes(&self, i: usize) -> f32x4 {
        debug_assert!(i < NODE_WIDTH);
        f32x4::from(bytemuck::cast::<NodeCorner, [f32; 4]>(self.lower[i]))
    }

    pub fn upper_lanes(&self, i: usize) -> f32x4 {
        debug_assert!(i < NODE_WIDTH);
        f32x4::from(bytemuck::cast::<NodeCorner, [f32; 4]>(self.upper[i]))
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::invalid()
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut list = f.debug_list();
        for i in 0..NODE_WIDTH {
            list.entry(&format_args!(
                "lower [{}, {}, {}] upper [{}, {}, {}] link {:?}",
                self.lower[i].x,
                self.lower[i].y,
                self.lower[i].z,
                self.upper[i].x,
                self.upper[i].y,
                self.upper[i].z,
                self.lower[i].link,
            ));
        }
        list.finish()
    }
}
