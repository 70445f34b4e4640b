//! Data model of a 4-wide bounding volume hierarchy.
//!
//! This crate only defines the binary layout and the value-level algorithms
//! on it: the packed 32-bit node reference, the full precision and the
//! byte-quantized 4-wide nodes, the packed triangle leaf record and the
//! container that owns the node and primitive arenas. Building the tree and
//! traversing it are jobs for external collaborators that consume this
//! layout.

pub mod bvh;
pub mod geometry;

pub use bvh::{
    EncodeError, Node, NodeIdx, NodeRef, PackedNodeRef, PrimIdx, PrimitiveRecord, QuadBvh,
    QuantizedNode, SahCosts, TriangleLeafRecord,
};
pub use geometry::{Aabb, WorldBox, WorldPoint, WorldVector};
