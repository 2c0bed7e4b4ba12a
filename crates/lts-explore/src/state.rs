//! State values, indices and fingerprinting.

use std::fmt;
use std::hash::{Hash, Hasher};

/// A state value produced by a next-state generator.
///
/// The explorer never looks inside a state: it only hashes, compares and
/// stores it.
pub trait StateValue: Clone + Eq + Hash + fmt::Debug {}

impl<T: Clone + Eq + Hash + fmt::Debug> StateValue for T {}

/// Dense index of a state inside a [`StateStore`](crate::StateStore).
///
/// For the exact store indices are assigned 0, 1, 2, ... in discovery order.
/// For the bit-hash store an index is the slot a state hashes to and may be
/// shared by several distinct states.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateIndex(usize);

impl StateIndex {
    #[inline]
    pub fn new(index: usize) -> Self {
        StateIndex(index)
    }

    #[inline]
    pub fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Debug for StateIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateIndex({})", self.0)
    }
}

impl fmt::Display for StateIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fingerprint is a 64-bit hash identifying a state.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn from_u64(v: u64) -> Self {
        Fingerprint(v)
    }

    /// Fingerprint of an arbitrary hashable state.
    ///
    /// Uses AHash with its fixed default keys, so the result is stable within
    /// a build and across runs.
    pub fn of<S: Hash + ?Sized>(state: &S) -> Self {
        let mut hasher = ahash::AHasher::default();
        state.hash(&mut hasher);
        Fingerprint(hasher.finish())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({:016x})", self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
