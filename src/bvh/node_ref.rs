use assert2::debug_assert;
use thiserror::Error;

use super::node::Node;

/// Number of low bits used by the leaf tag and item count.
pub const ENCODING_BITS: u32 = 4;
pub const LEAF_SHIFT: u32 = 3;
pub const LEAF_MASK: u32 = 1 << LEAF_SHIFT;
pub const ITEMS_MASK: u32 = LEAF_MASK - 1;
pub const OFFSET_MASK: u32 = !0u32 << ENCODING_BITS;

/// Largest item count a leaf descriptor can carry (3 bits).
pub const MAX_LEAF_ITEMS: u32 = ITEMS_MASK;
/// Largest record offset a leaf descriptor can carry (28 bits).
pub const MAX_LEAF_OFFSET: u32 = (1 << (u32::BITS - ENCODING_BITS)) - 1;

/// Packed 32-bit reference to a node or a list of primitives.
///
/// This is the serialized form shared with external builders and traversers;
/// its bit layout is a contract. Bit 3 set means leaf descriptor: bits 0..=2
/// are the item count, bits 4..=31 the record offset. Bit 3 clear means
/// internal node offset in 2-byte slots relative to the node arena base.
/// Business logic should [`decode`](Self::decode) into [`NodeRef`] and match
/// on that instead of poking at the bits.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct PackedNodeRef(u32);

unsafe impl bytemuck::Zeroable for PackedNodeRef {}
unsafe impl bytemuck::Pod for PackedNodeRef {}

/// Decoded view of a [`PackedNodeRef`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeRef {
    /// Offset of an internal node in 2-byte slots. Always a multiple of
    /// `size_of::<Node>() / 2`, so bit 3 is never set.
    Internal { offset: u32 },
    /// `offset` indexes primitive records, `count` is the number of records.
    Leaf { offset: u32, count: u8 },
    /// No child in this slot (a leaf with 0 items at offset 0).
    Empty,
    /// The slot was never written. Dereferencing it is a caller bug.
    Invalid,
}

impl PackedNodeRef {
    pub const EMPTY: Self = Self(LEAF_MASK);
    pub const INVALID: Self = Self(u32::MAX);

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Encodes a leaf descriptor. `count` must fit in 3 bits and `offset`
    /// in 28 bits; violations are caller errors checked in debug builds only.
    pub fn leaf(offset: u32, count: u32) -> Self {
        debug_assert!(count <= MAX_LEAF_ITEMS);
        debug_assert!(offset <= MAX_LEAF_OFFSET);
        Self((offset << ENCODING_BITS) | LEAF_MASK | count)
    }

    /// Encodes an internal node offset. The offset is stored as-is, so its
    /// bit 3 must be clear; node offsets are multiples of half the node
    /// size (64), which guarantees that for well-formed callers.
    pub fn internal(offset: u32) -> Self {
        debug_assert!(offset & LEAF_MASK == 0);
        Self(offset)
    }

    /// Checked variant of [`leaf`](Self::leaf) for builders that validate
    /// at runtime instead of relying on debug assertions.
    pub fn try_leaf(offset: u32, count: u32) -> Result<Self, EncodeError> {
        if count > MAX_LEAF_ITEMS {
            return Err(EncodeError::LeafCountOverflow { count });
        }
        if offset > MAX_LEAF_OFFSET {
            return Err(EncodeError::LeafOffsetOverflow { offset });
        }
        Ok(Self((offset << ENCODING_BITS) | LEAF_MASK | count))
    }

    /// Checked variant of [`internal`](Self::internal).
    pub fn try_internal(offset: u32) -> Result<Self, EncodeError> {
        if offset & LEAF_MASK != 0 {
            return Err(EncodeError::MisalignedInternalOffset { offset });
        }
        Ok(Self(offset))
    }

    pub fn is_leaf(self) -> bool {
        self.0 & LEAF_MASK != 0
    }

    pub fn is_node(self) -> bool {
        self.0 & LEAF_MASK == 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == Self::EMPTY.0
    }

    pub fn is_invalid(self) -> bool {
        self.0 == Self::INVALID.0
    }

    /// Item count of a leaf descriptor.
    pub fn leaf_count(self) -> u32 {
        debug_assert!(self.is_leaf());
        self.0 & ITEMS_MASK
    }

    /// Record offset of a leaf descriptor, in record units.
    pub fn leaf_offset_index(self) -> u32 {
        debug_assert!(self.is_leaf());
        self.0 >> ENCODING_BITS
    }

    /// Byte offset of the first record of a leaf descriptor. `scale` comes
    /// from the primitive type descriptor, leaf record sizes vary per type.
    pub fn leaf_byte_offset(self, scale: u32) -> usize {
        debug_assert!(self.is_leaf());
        (self.0 & OFFSET_MASK) as usize * scale as usize
    }

    /// Index of an internal node in the node arena. The raw value addresses
    /// 2-byte slots, so `index = raw * 2 / size_of::<Node>()`.
    pub fn node_index(self) -> usize {
        debug_assert!(self.is_node());
        self.0 as usize * 2 / size_of::<Node>()
    }

    pub fn decode(self) -> NodeRef {
        if self.is_invalid() {
            NodeRef::Invalid
        } else if self.is_empty() {
            NodeRef::Empty
        } else if self.is_leaf() {
            NodeRef::Leaf {
                offset: self.leaf_offset_index(),
                count: self.leaf_count() as u8,
            }
        } else {
            NodeRef::Internal { offset: self.0 }
        }
    }
}

impl NodeRef {
    pub fn pack(self) -> PackedNodeRef {
        match self {
            NodeRef::Internal { offset } => PackedNodeRef::internal(offset),
            NodeRef::Leaf { offset, count } => PackedNodeRef::leaf(offset, count as u32),
            NodeRef::Empty => PackedNodeRef::EMPTY,
            NodeRef::Invalid => PackedNodeRef::INVALID,
        }
    }
}

impl From<NodeRef> for PackedNodeRef {
    fn from(value: NodeRef) -> Self {
        value.pack()
    }
}

impl Default for PackedNodeRef {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl std::fmt::Debug for PackedNodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackedNodeRef")
            .field("raw", &self.0)
            .field("<decoded>", &self.decode())
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("leaf item count {count} does not fit in 3 bits")]
    LeafCountOverflow { count: u32 },

    #[error("leaf record offset {offset} does not fit in 28 bits")]
    LeafOffsetOverflow { offset: u32 },

    #[error("internal node offset {offset} collides with the leaf tag bit")]
    MisalignedInternalOffset { offset: u32 },
}

#[cfg(test)]
mod test {
    use super::*;

    use assert2::{assert, let_assert};
    use test_case::test_case;
    use test_strategy::proptest;

    #[proptest]
    fn discrimination_is_exhaustive(raw: u32) {
        let r = PackedNodeRef::from_raw(raw);
        assert!(r.is_leaf() != r.is_node());
    }

    #[proptest]
    fn decode_matches_tag_bit(raw: u32) {
        let r = PackedNodeRef::from_raw(raw);
        match r.decode() {
            NodeRef::Internal { .. } => assert!(r.is_node()),
            NodeRef::Leaf { .. } | NodeRef::Empty | NodeRef::Invalid => assert!(r.is_leaf()),
        }
    }

    #[proptest]
    fn decode_pack_round_trip(raw: u32) {
        let r = PackedNodeRef::from_raw(raw);
        assert!(r.decode().pack() == r);
    }

    #[proptest]
    fn leaf_round_trip(
        #[strategy(0u32..=MAX_LEAF_OFFSET)] offset: u32,
        #[strategy(0u32..=MAX_LEAF_ITEMS)] count: u32,
    ) {
        let r = PackedNodeRef::leaf(offset, count);
        assert!(r.is_leaf());
        assert!(!r.is_node());
        assert!(r.leaf_offset_index() == offset);
        assert!(r.leaf_count() == count);
    }

    #[proptest]
    fn internal_round_trip(#[strategy(0u32..(1u32 << 25))] index: u32) {
        // Node offsets address 2-byte slots, nodes are 128 bytes apart
        let offset = index * (size_of::<Node>() as u32 / 2);
        let r = PackedNodeRef::internal(offset);
        assert!(r.is_node());
        assert!(!r.is_leaf());
        let_assert!(NodeRef::Internal { offset: decoded } = r.decode());
        assert!(decoded == offset);
        assert!(r.node_index() == index as usize);
    }

    #[test]
    fn internal_offset_64_is_a_node() {
        // Node offsets are multiples of size_of::<Node>() / 2 = 64; a raw
        // value such as 40 has the leaf tag bit set and can never address
        // an internal node in this encoding.
        let r = PackedNodeRef::internal(64);
        assert!(r.is_node());
        assert!(!r.is_leaf());
        assert!(r.node_index() == 64 * 2 / size_of::<Node>());
        assert!(r.node_index() == 1);
    }

    #[test]
    fn empty_is_a_leaf_with_zero_items() {
        let r = PackedNodeRef::EMPTY;
        assert!(r.is_leaf());
        assert!(r.is_empty());
        assert!(r.leaf_count() == 0);
        assert!(r.leaf_offset_index() == 0);
        assert!(r.decode() == NodeRef::Empty);
    }

    #[test]
    fn invalid_is_distinguished_from_full_offset_leaf() {
        let invalid = PackedNodeRef::INVALID;
        assert!(invalid.is_invalid());
        assert!(invalid.decode() == NodeRef::Invalid);

        // A legitimate 0-item leaf at the maximal offset differs from the
        // invalid sentinel only in the count bits; it must stay a leaf.
        let leaf = PackedNodeRef::leaf(MAX_LEAF_OFFSET, 0);
        assert!(!leaf.is_invalid());
        let_assert!(NodeRef::Leaf { offset, count } = leaf.decode());
        assert!(offset == MAX_LEAF_OFFSET);
        assert!(count == 0);
    }

    #[test]
    fn leaf_capacity_boundary() {
        let r = PackedNodeRef::leaf(123, MAX_LEAF_ITEMS);
        assert!(r.leaf_count() == MAX_LEAF_ITEMS);
        assert!(r.leaf_offset_index() == 123);
    }

    #[test]
    #[should_panic]
    fn leaf_count_eight_is_rejected() {
        PackedNodeRef::leaf(0, MAX_LEAF_ITEMS + 1);
    }

    #[test]
    #[should_panic]
    fn leaf_offset_overflow_is_rejected() {
        PackedNodeRef::leaf(MAX_LEAF_OFFSET + 1, 1);
    }

    #[test]
    #[should_panic]
    fn internal_offset_with_tag_bit_is_rejected() {
        PackedNodeRef::internal(LEAF_MASK);
    }

    #[test]
    fn try_variants_report_errors() {
        assert!(
            PackedNodeRef::try_leaf(0, 8) == Err(EncodeError::LeafCountOverflow { count: 8 })
        );
        assert!(
            PackedNodeRef::try_leaf(MAX_LEAF_OFFSET + 1, 1)
                == Err(EncodeError::LeafOffsetOverflow {
                    offset: MAX_LEAF_OFFSET + 1
                })
        );
        assert!(
            PackedNodeRef::try_internal(8)
                == Err(EncodeError::MisalignedInternalOffset { offset: 8 })
        );
        assert!(PackedNodeRef::try_leaf(5, 3) == Ok(PackedNodeRef::leaf(5, 3)));
        assert!(PackedNodeRef::try_internal(128) == Ok(PackedNodeRef::internal(128)));
    }

    #[test_case(4, 64; "default triangle scale")]
    #[test_case(8, 128; "double sized records")]
    fn leaf_byte_offset_scales(scale: u32, expected: usize) {
        // offset index 1 is stored shifted left by ENCODING_BITS
        let r = PackedNodeRef::leaf(1, 2);
        assert!(r.leaf_byte_offset(scale) == expected);
    }
}
