use assert2::debug_assert;
use simba::simd::WideF32x4;
use wide::f32x4;

use super::node::{NODE_WIDTH, Node};
use super::node_ref::PackedNodeRef;
use crate::geometry::{Aabb, FloatType, SimdFloatType, WorldBox, WorldPoint};

/// Relative inflation applied to the persisted quantization step.
///
/// The step is computed as `extent / 255` but the transient encode scale is
/// `255 / extent`; the two do not cancel exactly in f32, and at the clamped
/// byte 255 the half-unit rounding margin is gone. A few ulps of slack on
/// the step keep `start + diff * 255 >= max` on every axis.
const STEP_SLACK: FloatType = 1.0 + 4.0 * FloatType::EPSILON;

/// Byte-quantized 4-wide node, exactly one cache line.
///
/// All four children share one affine map: a real coordinate is
/// `start + diff * q` for a quantized byte `q`. The corner bytes are
/// child-major xyz triples. Decompressed bounds are conservative, never
/// smaller than the bounds of the [`Node`] this was compressed from;
/// downstream ray-box tests rely on that.
#[repr(C, align(64))]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct QuantizedNode {
    start: [FloatType; 3],
    child0: PackedNodeRef,
    diff: [FloatType; 3],
    child1: PackedNodeRef,
    lower_q: [u8; 12],
    child2: PackedNodeRef,
    upper_q: [u8; 12],
    child3: PackedNodeRef,
}

unsafe impl bytemuck::Zeroable for QuantizedNode {}
unsafe impl bytemuck::Pod for QuantizedNode {}

const _: () = assert!(size_of::<QuantizedNode>() == 64);
const _: () = assert!(align_of::<QuantizedNode>() == 64);

impl QuantizedNode {
    /// Compresses a fully populated node. One-shot single-writer operation,
    /// independent across nodes.
    ///
    /// The combined extent of the children must be finite on every axis; a
    /// node spanning more than the f32 range has no representable affine
    /// map. Checked in debug builds only.
    pub fn compress(node: &Node) -> QuantizedNode {
        let mut min = [FloatType::INFINITY; 3];
        let mut max = [FloatType::NEG_INFINITY; 3];
        let mut any_valid = false;
        for i in 0..NODE_WIDTH {
            let b = node.bounds(i);
            if !b.is_valid() {
                // Invalid slots hold the +inf/-inf sentinel, neutral here
                continue;
            }
            any_valid = true;
            for a in 0..3 {
                min[a] = min[a].min(b.min[a]);
                max[a] = max[a].max(b.max[a]);
            }
        }
        if !any_valid {
            min = [0.0; 3];
            max = [0.0; 3];
        }

        let mut step = [0.0; 3];
        let mut scale = [0.0; 3];
        for a in 0..3 {
            let extent = max[a] - min[a];
            debug_assert!(extent.is_finite(), "axis {a} extent overflows f32");
            if extent > 0.0 {
                let s = (extent / 255.0) * STEP_SLACK;
                if s >= FloatType::MIN_POSITIVE {
                    step[a] = s;
                    scale[a] = 255.0 / extent;
                } else {
                    // Extent below quantization resolution; keep scale 0 so
                    // every byte quantizes to the shared minimum and let a
                    // single whole step span the axis
                    step[a] = extent * STEP_SLACK;
                }
            }
        }

        let mut lower_q = [0u8; 12];
        let mut upper_q = [0u8; 12];
        for i in 0..NODE_WIDTH {
            let b = node.bounds(i);
            // Invalid children collapse to the shared minimum corner
            let (lo, hi) = if b.is_valid() {
                (b.min, b.max)
            } else {
                (WorldPoint::from(min), WorldPoint::from(min))
            };
            for a in 0..3 {
                let ql = (lo[a] - min[a]) * scale[a];
                let qu = (hi[a] - min[a]) * scale[a];
                // Half-unit margin, lower rounds down, upper rounds up; this
                // is what keeps the decompressed box conservative across the
                // 8-bit truncation and the float rounding of the affine map.
                lower_q[i * 3 + a] = (ql - 0.5).floor().clamp(0.0, 255.0) as u8;
                upper_q[i * 3 + a] = (qu + 0.5).ceil().clamp(0.0, 255.0) as u8;
            }
        }

        let quantized = QuantizedNode {
            start: min,
            child0: node.child(0),
            diff: step,
            child1: node.child(1),
            lower_q,
            child2: node.child(2),
            upper_q,
            child3: node.child(3),
        };

        #[cfg(debug_assertions)]
        for i in 0..NODE_WIDTH {
            debug_assert!(
                quantized.bounds(i).contains_box(&node.bounds(i)),
                "child {i}: {:?} does not contain {:?}",
                quantized.bounds(i),
                node.bounds(i)
            );
        }

        quantized
    }

    /// Decompressed bounds of child `i`. Pure function of the stored bytes,
    /// bit-deterministic, safe to call from any number of threads.
    pub fn bounds(&self, i: usize) -> WorldBox {
        debug_assert!(i < NODE_WIDTH);
        Aabb {
            min: WorldPoint::new(
                self.decompress(0, self.lower_q[i * 3]),
                self.decompress(1, self.lower_q[i * 3 + 1]),
                self.decompress(2, self.lower_q[i * 3 + 2]),
            ),
            max: WorldPoint::new(
                self.decompress(0, self.upper_q[i * 3]),
                self.decompress(1, self.upper_q[i * 3 + 1]),
                self.decompress(2, self.upper_q[i * 3 + 2]),
            ),
        }
    }

    /// True when child `i` decompresses to a single point.
    pub fn is_point(&self, i: usize) -> bool {
        self.bounds(i).is_point()
    }

    pub fn child(&self, i: usize) -> PackedNodeRef {
        debug_assert!(i < NODE_WIDTH);
        match i {
            0 => self.child0,
            1 => self.child1,
            2 => self.child2,
            _ => self.child3,
        }
    }

    pub fn start(&self) -> WorldPoint {
        WorldPoint::from(self.start)
    }

    pub fn diff(&self) -> [FloatType; 3] {
        self.diff
    }

    /// All four children's decompressed lower x coordinates as one 4-lane
    /// vector; the portable counterpart of [`Node::lower_x`].
    pub fn lower_x(&self) -> SimdFloatType {
        self.decompress_axis(0, &self.lower_q)
    }

    pub fn lower_y(&self) -> SimdFloatType {
        self.decompress_axis(1, &self.lower_q)
    }

    pub fn lower_z(&self) -> SimdFloatType {
        self.decompress_axis(2, &self.lower_q)
    }

    pub fn upper_x(&self) -> SimdFloatType {
        self.decompress_axis(0, &self.upper_q)
    }

    pub fn upper_y(&self) -> SimdFloatType {
        self.decompress_axis(1, &self.upper_q)
    }

    pub fn upper_z(&self) -> SimdFloatType {
        self.decompress_axis(2, &self.upper_q)
    }

    fn decompress(&self, axis: usize, q: u8) -> FloatType {
        self.start[axis] + self.diff[axis] * q as FloatType
    }

    fn decompress_axis(&self, axis: usize, q: &[u8; 12]) -> SimdFloatType {
        let quantized = f32x4::from([
            q[axis] as FloatType,
            q[3 + axis] as FloatType,
            q[6 + axis] as FloatType,
            q[9 + axis] as FloatType,
        ]);
        // Plain multiply-add, not fused, to stay bit-identical with the
        // scalar decompression in `bounds`
        WideF32x4(f32x4::splat(self.start[axis]) + f32x4::splat(self.diff[axis]) * quantized)
    }
}
