use core::fmt;
use core::num::NonZeroU32;

/// Compact, stable identifier for anything that can own a refire request.
///
/// - `u32` keeps calendar entries small
/// - `NonZero` enables `Option<ActorId>` to be pointer-optimized
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActorId(NonZeroU32);

impl ActorId {
    /// Create an id from a 0-based index by storing index+1.
    pub fn from_index(index: u32) -> Self {
        Self(NonZeroU32::MIN.saturating_add(index))
    }

    /// Recover the 0-based index.
    pub fn index(self) -> u32 {
        self.0.get() - 1
    }
}

impl fmt::Debug for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorId({})", self.index())
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index())
    }
}

/// Hands out fresh, sequential actor ids.
#[derive(Debug, Default, Clone)]
pub struct ActorIdAllocator {
    next: u32,
}

impl ActorIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> ActorId {
        let id = ActorId::from_index(self.next);
        self.next += 1;
        id
    }
}
