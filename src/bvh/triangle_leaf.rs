use assert2::debug_assert;
use wide::f32x4;

use crate::geometry::{FloatType, WorldPoint, WorldVector};

/// Packed triangle leaf record, one cache line.
///
/// Three vertices travel in four 16-byte lane groups. The 4th lane of a 3D
/// point is dead weight, so the metadata rides there for free: `v0` carries
/// the primitive id bit pattern, `v1` the geometry id, `v2` the ray mask.
/// The 4th group holds the unnormalized geometric normal with a zero 4th
/// lane. The whole record loads into a 16-lane register in one instruction
/// and shuffles the same way the bounds data does.
#[repr(C, align(64))]
#[derive(Copy, Clone)]
pub struct TriangleLeafRecord {
    v0: [FloatType; 4],
    v1: [FloatType; 4],
    v2: [FloatType; 4],
    v3: [FloatType; 4],
}

unsafe impl bytemuck::Zeroable for TriangleLeafRecord {}
unsafe impl bytemuck::Pod for TriangleLeafRecord {}

const _: () = assert!(size_of::<TriangleLeafRecord>() == 64);
const _: () = assert!(align_of::<TriangleLeafRecord>() == 64);

impl TriangleLeafRecord {
    pub fn pack(
        v0: WorldPoint,
        v1: WorldPoint,
        v2: WorldPoint,
        geom_id: u32,
        prim_id: u32,
        mask: u32,
    ) -> TriangleLeafRecord {
        let e1 = v0 - v1;
        let e2 = v2 - v0;
        let normal = e1.cross(&e2);
        TriangleLeafRecord {
            v0: [v0.x, v0.y, v0.z, FloatType::from_bits(prim_id)],
            v1: [v1.x, v1.y, v1.z, FloatType::from_bits(geom_id)],
            v2: [v2.x, v2.y, v2.z, FloatType::from_bits(mask)],
            v3: [normal.x, normal.y, normal.z, 0.0],
        }
    }

    /// Vertex `i`, `i < 3`.
    pub fn vertex(&self, i: usize) -> WorldPoint {
        debug_assert!(i < 3);
        let v = match i {
            0 => &self.v0,
            1 => &self.v1,
            _ => &self.v2,
        };
        WorldPoint::new(v[0], v[1], v[2])
    }

    pub fn prim_id(&self) -> u32 {
        self.v0[3].to_bits()
    }

    pub fn geom_id(&self) -> u32 {
        self.v1[3].to_bits()
    }

    pub fn mask(&self) -> u32 {
        self.v2[3].to_bits()
    }

    /// Unnormalized geometric normal, `cross(v0 - v1, v2 - v0)`.
    pub fn normal(&self) -> WorldVector {
        WorldVector::new(self.v3[0], self.v3[1], self.v3[2])
    }

    /// Lane group `i` of the record as a 4-lane vector, `i < 4`. This is
    /// the unit the intersector consumes directly.
    pub fn lane_group(&self, i: usize) -> f32x4 {
        debug_assert!(i < 4);
        let v = match i {
            0 => &self.v0,
            1 => &self.v1,
            2 => &self.v2,
            _ => &self.v3,
        };
        f32x4::from(*v)
    }
}

impl std::fmt::Debug for TriangleLeafRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriangleLeafRecord")
            .field("v0", &self.vertex(0))
            .field("v1", &self.vertex(1))
            .field("v2", &self.vertex(2))
            .field("normal", &self.normal())
            .field("geom_id", &self.geom_id())
            .field("prim_id", &self.prim_id())
            .field("mask", &format_args!("{:#010x}", self.mask()))
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use assert2::assert;
    use proptest::prelude::Strategy;
    use test_strategy::proptest;

    fn point_strategy() -> impl Strategy<Value = WorldPoint> {
        let range = -1e6f32..1e6f32;
        (range.clone(), range.clone(), range).prop_map(|(x, y, z)| WorldPoint::new(x, y, z))
    }

    #[proptest]
    fn pack_preserves_vertices_and_metadata(
        #[strategy(point_strategy())] v0: WorldPoint,
        #[strategy(point_strategy())] v1: WorldPoint,
        #[strategy(point_strategy())] v2: WorldPoint,
        geom_id: u32,
        prim_id: u32,
        mask: u32,
    ) {
        let record = TriangleLeafRecord::pack(v0, v1, v2, geom_id, prim_id, mask);
        assert!(record.vertex(0) == v0);
        assert!(record.vertex(1) == v1);
        assert!(record.vertex(2) == v2);
        assert!(record.geom_id() == geom_id);
        assert!(record.prim_id() == prim_id);
        assert!(record.mask() == mask);
    }

    #[proptest]
    fn packed_normal_matches_edge_cross_product(
        #[strategy(point_strategy())] v0: WorldPoint,
        #[strategy(point_strategy())] v1: WorldPoint,
        #[strategy(point_strategy())] v2: WorldPoint,
    ) {
        let record = TriangleLeafRecord::pack(v0, v1, v2, 0, 0, 0);
        let expected = (v0 - v1).cross(&(v2 - v0));
        assert!(record.normal() == expected);
    }

    #[test]
    fn metadata_rides_the_fourth_lanes() {
        let record = TriangleLeafRecord::pack(
            WorldPoint::new(1.0, 2.0, 3.0),
            WorldPoint::new(4.0, 5.0, 6.0),
            WorldPoint::new(7.0, 8.0, 9.0),
            0xdead_beef,
            42,
            0xff,
        );

        let g0 = record.lane_group(0);
        let g1 = record.lane_group(1);
        let g2 = record.lane_group(2);
        let g3 = record.lane_group(3);
        assert!(g0.as_array_ref()[3].to_bits() == 42);
        assert!(g1.as_array_ref()[3].to_bits() == 0xdead_beef);
        assert!(g2.as_array_ref()[3].to_bits() == 0xff);
        assert!(g3.as_array_ref()[3] == 0.0);
        assert!(g0.as_array_ref()[0] == 1.0);
        assert!(g2.as_array_ref()[2] == 9.0);
    }

    #[test]
    fn degenerate_triangle_has_zero_normal() {
        let p = WorldPoint::new(1.0, 2.0, 3.0);
        let record = TriangleLeafRecord::pack(p, p, p, 0, 0, 0);
        assert!(record.normal() == WorldVector::zeros());
    }

    #[test]
    fn layout_contract() {
        assert!(size_of::<TriangleLeafRecord>() == 64);
        assert!(align_of::<TriangleLeafRecord>() == 64);
    }
}
