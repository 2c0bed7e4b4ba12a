//! State storage for exploration.

use crate::bithash::BitHashTable;
use crate::state::{Fingerprint, StateIndex, StateValue};
use indexmap::IndexSet;

/// Default initial capacity of the exact store.
pub const DEFAULT_INIT_TABLE_SIZE: usize = 10_000;

enum Backend<S> {
    /// Exact bijection between states and dense indices, in insertion order.
    Exact(IndexSet<S>),
    /// Bounded, approximate membership; indices are slots.
    BitHash(BitHashTable),
}

/// Deduplicates states and assigns each a [`StateIndex`].
///
/// Supports two modes:
/// - Exact: every state value is kept, indices are dense and stable, and a
///   state can be recovered from its index.
/// - Bit-hash: only one bit per slot is kept. Distinct states hashing to the
///   same slot share an index and the second one is reported as already
///   seen. States cannot be recovered, but slots can be released again with
///   [`StateStore::remove`].
pub struct StateStore<S> {
    backend: Backend<S>,
}

impl<S: StateValue> StateStore<S> {
    /// Create an exact store with pre-allocated capacity.
    pub fn exact(capacity: usize) -> Self {
        Self {
            backend: Backend::Exact(IndexSet::with_capacity(capacity)),
        }
    }

    /// Create a bit-hash store with `num_bits` slots.
    pub fn bithash(num_bits: usize) -> Self {
        Self {
            backend: Backend::BitHash(BitHashTable::new(num_bits)),
        }
    }

    /// Add a state. Returns its index and whether it was new.
    pub fn add(&mut self, state: &S) -> (StateIndex, bool) {
        match &mut self.backend {
            Backend::Exact(set) => {
                if let Some(i) = set.get_index_of(state) {
                    (StateIndex::new(i), false)
                } else {
                    let (i, _) = set.insert_full(state.clone());
                    (StateIndex::new(i), true)
                }
            }
            Backend::BitHash(table) => {
                let (slot, is_new) = table.insert(Fingerprint::of(state));
                (StateIndex::new(slot), is_new)
            }
        }
    }

    /// Index of a previously added state, None if it was never added (or its
    /// slot has been released).
    pub fn index_of(&self, state: &S) -> Option<StateIndex> {
        match &self.backend {
            Backend::Exact(set) => set.get_index_of(state).map(StateIndex::new),
            Backend::BitHash(table) => {
                let fp = Fingerprint::of(state);
                table.contains(fp).then(|| StateIndex::new(table.slot(fp)))
            }
        }
    }

    /// The state stored at `index`. Always None in bit-hash mode.
    pub fn get(&self, index: StateIndex) -> Option<&S> {
        match &self.backend {
            Backend::Exact(set) => set.get_index(index.as_usize()),
            Backend::BitHash(_) => None,
        }
    }

    /// Release the slot of `state` so it can be reported as new again.
    ///
    /// Only the bit-hash store supports eviction; the exact store keeps
    /// indices stable and returns false.
    pub fn remove(&mut self, state: &S) -> bool {
        match &mut self.backend {
            Backend::Exact(_) => false,
            Backend::BitHash(table) => table.remove(Fingerprint::of(state)),
        }
    }

    /// Number of stored states (set slots in bit-hash mode).
    #[inline]
    pub fn len(&self) -> usize {
        match &self.backend {
            Backend::Exact(set) => set.len(),
            Backend::BitHash(table) => table.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_bithashing(&self) -> bool {
        matches!(self.backend, Backend::BitHash(_))
    }

    /// Stored states in index order. Empty in bit-hash mode.
    pub fn iter(&self) -> impl Iterator<Item = (StateIndex, &S)> + '_ {
        let set = match &self.backend {
            Backend::Exact(set) => Some(set),
            Backend::BitHash(_) => None,
        };
        set.into_iter()
            .flat_map(|set| set.iter().enumerate())
            .map(|(i, s)| (StateIndex::new(i), s))
    }
}
