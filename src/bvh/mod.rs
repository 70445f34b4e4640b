mod node;
mod node_ref;
mod quantized;
mod triangle_leaf;

pub use node::{NODE_WIDTH, Node, NodeCorner};
pub use node_ref::{
    ENCODING_BITS, EncodeError, ITEMS_MASK, LEAF_MASK, LEAF_SHIFT, MAX_LEAF_ITEMS,
    MAX_LEAF_OFFSET, NodeRef, OFFSET_MASK, PackedNodeRef,
};
pub use quantized::QuantizedNode;
pub use triangle_leaf::TriangleLeafRecord;

use std::sync::{Arc, Weak};

use assert2::debug_assert;
use index_vec::IndexVec;
use log::trace;

use crate::geometry::{FloatType, WorldBox};

index_vec::define_index_type! {
    pub struct NodeIdx = u32;
    IMPL_RAW_CONVERSIONS = true;
}

index_vec::define_index_type! {
    pub struct PrimIdx = u32;
    IMPL_RAW_CONVERSIONS = true;
}

/// Primitive type descriptor: how leaf references are interpreted against
/// the primitive arena. External traversers read records of this type
/// straight out of the arena, so the layout must be plain old data.
pub trait PrimitiveRecord: bytemuck::Pod {
    /// Multiplier converting a stored leaf offset into a byte offset.
    /// Stored offsets are pre-shifted by the 4 encoding bits, so a record
    /// of `16 * OFFSET_SCALE` bytes is addressed exactly by its index.
    const OFFSET_SCALE: u32 = 4;

    /// SAH cost of intersecting one record of this type.
    const INTERSECT_COST: FloatType = 1.0;
}

impl PrimitiveRecord for TriangleLeafRecord {}

/// Cost model constants for the surface area heuristic estimate.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SahCosts {
    /// Cost of one traversal step through an internal node.
    pub traversal: FloatType,
    /// Cost of intersecting one leaf record.
    pub leaf_intersect: FloatType,
}

impl Default for SahCosts {
    fn default() -> Self {
        SahCosts {
            traversal: 1.0,
            leaf_intersect: 1.0,
        }
    }
}

impl SahCosts {
    pub fn for_record<P: PrimitiveRecord>() -> Self {
        SahCosts {
            traversal: 1.0,
            leaf_intersect: P::INTERSECT_COST,
        }
    }
}

/// Container of one built hierarchy: the root reference, the node and
/// primitive arenas and a non-owning back-reference to the source geometry.
///
/// The arenas are owned exclusively and freed with the container. A builder
/// fills them and publishes the root; after that any number of concurrent
/// readers may traverse, nothing here mutates on the read paths. Growing
/// the arenas while readers hold references is ruled out by the borrow
/// checker, matching the build-then-publish discipline this layout assumes.
#[derive(Debug)]
pub struct QuadBvh<P: PrimitiveRecord, G> {
    root: PackedNodeRef,
    bounds: WorldBox,
    nodes: IndexVec<NodeIdx, Node>,
    primitives: IndexVec<PrimIdx, P>,
    node_bytes: usize,
    prim_bytes: usize,
    geometry: Weak<G>,
}

impl<P: PrimitiveRecord, G> QuadBvh<P, G> {
    /// Creates an empty hierarchy referring back to `geometry`. The
    /// reference is weak; this container never keeps the scene alive.
    pub fn new(geometry: &Arc<G>) -> Self {
        Self::with_geometry(Arc::downgrade(geometry))
    }

    /// An empty hierarchy with no geometry back-reference.
    pub fn detached() -> Self {
        Self::with_geometry(Weak::new())
    }

    fn with_geometry(geometry: Weak<G>) -> Self {
        QuadBvh {
            root: PackedNodeRef::EMPTY,
            bounds: WorldBox::invalid(),
            nodes: IndexVec::new(),
            primitives: IndexVec::new(),
            node_bytes: 0,
            prim_bytes: 0,
            geometry,
        }
    }

    /// Grows the node arena by `n` invalidated nodes and returns the index
    /// of the first new one. Exclusive access; must not race traversal.
    pub fn allocate_nodes(&mut self, n: usize) -> NodeIdx {
        let first = self.nodes.next_idx();
        self.nodes
            .extend(std::iter::repeat_with(Node::invalid).take(n));
        self.node_bytes = self.nodes.len() * size_of::<Node>();
        trace!(
            "node arena grown by {n} to {} nodes ({} bytes)",
            self.nodes.len(),
            self.node_bytes
        );
        first
    }

    /// Grows the primitive arena by `n` zeroed records and returns the index
    /// of the first new one. Exclusive access; must not race traversal.
    pub fn allocate_primitives(&mut self, n: usize) -> PrimIdx {
        let first = self.primitives.next_idx();
        self.primitives
            .extend(std::iter::repeat_with(|| <P as bytemuck::Zeroable>::zeroed()).take(n));
        self.prim_bytes = self.primitives.len() * size_of::<P>();
        trace!(
            "primitive arena grown by {n} to {} records ({} bytes)",
            self.primitives.len(),
            self.prim_bytes
        );
        first
    }

    /// Drops the arena contents for an in-place rebuild. The geometry
    /// back-reference is kept.
    pub fn clear(&mut self) {
        self.root = PackedNodeRef::EMPTY;
        self.bounds = WorldBox::invalid();
        self.nodes.clear();
        self.primitives.clear();
        self.node_bytes = 0;
        self.prim_bytes = 0;
    }

    /// Publishes the root reference and the overall bounds. Called once by
    /// the builder after the arenas are fully written.
    pub fn set_root(&mut self, root: PackedNodeRef, bounds: WorldBox) {
        self.root = root;
        self.bounds = bounds;
    }

    pub fn root(&self) -> PackedNodeRef {
        self.root
    }

    pub fn bounds(&self) -> &WorldBox {
        &self.bounds
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn primitive_count(&self) -> usize {
        self.primitives.len()
    }

    /// Total arena footprint, for build-time memory budgeting.
    pub fn total_bytes(&self) -> usize {
        self.node_bytes + self.prim_bytes
    }

    /// Upgrades the geometry back-reference. `None` once the scene has been
    /// dropped; this layer never extends the scene's lifetime.
    pub fn geometry(&self) -> Option<Arc<G>> {
        self.geometry.upgrade()
    }

    /// The packed reference addressing node `idx` of this arena.
    pub fn node_ref(&self, idx: NodeIdx) -> PackedNodeRef {
        debug_assert!(idx.index() < self.nodes.len());
        PackedNodeRef::internal(idx.raw() * (size_of::<Node>() as u32 / 2))
    }

    /// The packed reference addressing `count` records starting at `first`.
    pub fn leaf_ref(&self, first: PrimIdx, count: u32) -> PackedNodeRef {
        let byte_offset = first.index() * size_of::<P>();
        let unit = 16 * P::OFFSET_SCALE as usize;
        debug_assert!(byte_offset % unit == 0);
        PackedNodeRef::leaf((byte_offset / unit) as u32, count)
    }

    pub fn node(&self, r: PackedNodeRef) -> &Node {
        debug_assert!(r.is_node());
        &self.nodes[NodeIdx::from_usize(r.node_index())]
    }

    pub fn node_mut(&mut self, idx: NodeIdx) -> &mut Node {
        &mut self.nodes[idx]
    }

    /// The primitive records a leaf descriptor refers to. Must not be
    /// called with the empty or invalid sentinels.
    pub fn leaf_records(&self, r: PackedNodeRef) -> &[P] {
        debug_assert!(r.is_leaf());
        debug_assert!(!r.is_empty());
        debug_assert!(!r.is_invalid());
        let byte_offset = r.leaf_byte_offset(P::OFFSET_SCALE);
        debug_assert!(byte_offset % size_of::<P>() == 0);
        let first = PrimIdx::from_usize(byte_offset / size_of::<P>());
        let last = first + r.leaf_count() as usize;
        self.primitives[first..last].as_raw_slice()
    }

    pub fn primitive_mut(&mut self, idx: PrimIdx) -> &mut P {
        &mut self.primitives[idx]
    }

    /// Surface area heuristic cost of the whole tree, the builder's metric
    /// for comparing candidate trees.
    pub fn surface_area_heuristic(&self, costs: &SahCosts) -> FloatType {
        self.sah_recursive(self.root, &self.bounds, costs)
    }

    fn sah_recursive(
        &self,
        r: PackedNodeRef,
        bounds: &WorldBox,
        costs: &SahCosts,
    ) -> FloatType {
        match r.decode() {
            NodeRef::Empty | NodeRef::Invalid => 0.0,
            NodeRef::Leaf { count, .. } => count as FloatType * costs.leaf_intersect,
            NodeRef::Internal { .. } => {
                let node = self.node(r);
                let area = bounds.surface_area();
                let mut cost = costs.traversal;
                if area <= 0.0 {
                    return cost;
                }
                for i in 0..NODE_WIDTH {
                    let child_bounds = node.bounds(i);
                    if !child_bounds.is_valid() {
                        continue;
                    }
                    cost += (child_bounds.surface_area() / area)
                        * self.sah_recursive(node.child(i), &child_bounds, costs);
                }
                cost
            }
        }
    }
}
