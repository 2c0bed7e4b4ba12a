//! Bit-hash table for bounded-memory, probabilistic state deduplication.
//!
//! Fixed-memory alternative to exact state storage. Each state is hashed to
//! a single bit; a set bit means "some state hashing here was seen". Two
//! distinct states with the same slot are treated as one, which makes the
//! exploration incomplete but never unbounded in memory.

use crate::state::Fingerprint;

/// Default table size in bits (~25 MB).
pub const DEFAULT_BITHASH_SIZE: usize = 209_715_200;

/// A table of `num_bits` bits packed into u64 words.
pub struct BitHashTable {
    bits: Vec<u64>,
    num_bits: u64,
    count: usize,
}

impl BitHashTable {
    /// Create a table with `num_bits` slots, all clear.
    ///
    /// Panics if `num_bits` is zero; configuration validation rejects that
    /// before a table is ever built.
    pub fn new(num_bits: usize) -> Self {
        assert!(num_bits > 0, "bit-hash table needs at least one slot");
        Self {
            bits: vec![0; num_bits.div_ceil(64)],
            num_bits: num_bits as u64,
            count: 0,
        }
    }

    /// Slot a fingerprint maps to.
    #[inline]
    pub fn slot(&self, fp: Fingerprint) -> usize {
        (fp.as_u64() % self.num_bits) as usize
    }

    /// Mark the slot of `fp`. Returns the slot and whether it was clear.
    pub fn insert(&mut self, fp: Fingerprint) -> (usize, bool) {
        let slot = self.slot(fp);
        let (word, mask) = Self::locate(slot);
        let was_new = self.bits[word] & mask == 0;
        if was_new {
            self.bits[word] |= mask;
            self.count += 1;
        }
        (slot, was_new)
    }

    /// Whether the slot of `fp` is set (may return false positives).
    pub fn contains(&self, fp: Fingerprint) -> bool {
        let (word, mask) = Self::locate(self.slot(fp));
        self.bits[word] & mask != 0
    }

    /// Clear the slot of `fp`. Returns true if it was set.
    pub fn remove(&mut self, fp: Fingerprint) -> bool {
        let (word, mask) = Self::locate(self.slot(fp));
        let was_set = self.bits[word] & mask != 0;
        if was_set {
            self.bits[word] &= !mask;
            self.count -= 1;
        }
        was_set
    }

    /// Number of set slots.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.num_bits as usize
    }

    /// Memory usage in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.bits.len() * 8
    }

    /// Fraction of slots in use; the chance that a fresh state is mistaken
    /// for a seen one.
    pub fn fill_ratio(&self) -> f64 {
        self.count as f64 / self.num_bits as f64
    }

    #[inline]
    fn locate(slot: usize) -> (usize, u64) {
        (slot / 64, 1u64 << (slot % 64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bithash_basic() {
        let mut table = BitHashTable::new(1024);
        let fp1 = Fingerprint::from_u64(12345);
        let fp2 = Fingerprint::from_u64(67890);

        assert!(!table.contains(fp1));
        assert!(table.insert(fp1).1);
        assert!(table.contains(fp1));
        assert!(!table.insert(fp1).1); // already present

        assert!(table.insert(fp2).1);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_bithash_collision_is_not_new() {
        // 100 and 200 both land in slot 0 of a 100-slot table
        let mut table = BitHashTable::new(100);
        let (slot_a, new_a) = table.insert(Fingerprint::from_u64(100));
        let (slot_b, new_b) = table.insert(Fingerprint::from_u64(200));

        assert_eq!(slot_a, slot_b);
        assert!(new_a);
        assert!(!new_b);
    }

    #[test]
    fn test_bithash_remove() {
        let mut table = BitHashTable::new(64);
        let fp = Fingerprint::from_u64(7);
        table.insert(fp);
        assert!(table.remove(fp));
        assert!(!table.remove(fp));
        assert!(table.is_empty());
        assert!(table.insert(fp).1);
    }

    #[test]
    fn test_bithash_memory() {
        let table = BitHashTable::new(1 << 20);
        assert_eq!(table.memory_bytes(), 1 << 17);
        assert_eq!(table.capacity(), 1 << 20);
        assert_eq!(table.fill_ratio(), 0.0);
    }
}
