//! Packed entity identity: a version tag and an id, round-tripped through a
//! single `u32`. Two entities with the same id but different versions are
//! distinct; the version is bumped on id reuse so stale references fail
//! lookup instead of silently aliasing a new entity.

/// Bits reserved for the id portion of a packed [`Entity`]. The remaining
/// high bits hold the version. Chosen so that the all-ones pattern
/// (`u32::MAX`) simultaneously reads as [`NULL_ID`] in the low bits and the
/// maximal version in the high bits, letting sparse-set "empty slot"
/// detection stay a single word compare.
pub const ID_BITS: u32 = 20;
pub const VERSION_BITS: u32 = 32 - ID_BITS;
pub const NULL_ID: u32 = (1 << ID_BITS) - 1;
pub const MAX_VERSION: u32 = (1 << VERSION_BITS) - 1;

/// A weak reference into any number of [`crate::sparse_set::SparseSet`]s.
///
/// Entities are values: nothing owns them, and liveness is defined purely by
/// having a live slot in some sparse set.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entity {
    bits: u32,
}

impl Entity {
    /// The reserved "no entity" value: `id == NULL_ID`, `version == MAX_VERSION`.
    #[inline]
    pub const fn null() -> Self {
        Entity { bits: u32::MAX }
    }

    #[inline]
    pub fn new(version: u32, id: u32) -> Self {
        debug_assert!(id <= NULL_ID, "entity id {} exceeds {} reserved bits", id, ID_BITS);
        debug_assert!(
            version <= MAX_VERSION,
            "entity version {} exceeds {} reserved bits",
            version,
            VERSION_BITS
        );
        Entity {
            bits: (version << ID_BITS) | id,
        }
    }

    #[inline]
    pub(crate) fn from_bits(bits: u32) -> Self {
        Entity { bits }
    }

    #[inline]
    pub(crate) fn to_bits(self) -> u32 {
        self.bits
    }

    #[inline]
    pub fn id(self) -> u32 {
        self.bits & NULL_ID
    }

    #[inline]
    pub fn version(self) -> u32 {
        self.bits >> ID_BITS
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.bits == u32::MAX
    }
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            write!(f, "Entity(null)")
        } else {
            write!(f, "Entity(id={}, version={})", self.id(), self.version())
        }
    }
}
