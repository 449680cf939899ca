//! Computed table of the BDD manager.

use std::cell::Cell;
use std::fmt::{Display, Formatter};

/// Perfect hash of an operation key. Distinct keys must hash differently,
/// since the table compares keys by their hash only.
pub trait CacheKey {
    fn key_hash(&self) -> u64;
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

impl Display for CacheStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let total = self.hits + self.misses;
        if total == 0 {
            write!(f, "no lookups")
        } else {
            write!(
                f,
                "{} hits / {} lookups ({:.1}%)",
                self.hits,
                total,
                100.0 * self.hits as f64 / total as f64
            )
        }
    }
}

/// Direct-mapped table of `2^bits` slots. A store into an occupied slot
/// evicts the previous result.
pub struct ComputedTable<V> {
    slots: Vec<Option<(u64, V)>>,
    mask: u64,
    stats: Cell<CacheStats>,
}

impl<V: Copy> ComputedTable<V> {
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 31, "table size must be at most 2^31");
        let size = 1usize << bits;
        Self {
            slots: vec![None; size],
            mask: (size - 1) as u64,
            stats: Cell::new(CacheStats::default()),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.get()
    }

    pub fn clear(&mut self) {
        self.slots.fill(None);
    }

    pub fn lookup(&self, key: &impl CacheKey) -> Option<V> {
        let h = key.key_hash();
        let mut stats = self.stats.get();
        let res = match self.slots[(h & self.mask) as usize] {
            Some((k, v)) if k == h => {
                stats.hits += 1;
                Some(v)
            }
            _ => {
                stats.misses += 1;
                None
            }
        };
        self.stats.set(stats);
        res
    }

    pub fn store(&mut self, key: &impl CacheKey, value: V) {
        let h = key.key_hash();
        self.slots[(h & self.mask) as usize] = Some((h, value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::utils::pairing2;

    struct Pair(u64, u64);

    impl CacheKey for Pair {
        fn key_hash(&self) -> u64 {
            pairing2(self.0, self.1)
        }
    }

    #[test]
    fn test_lookup_and_store() {
        let mut table = ComputedTable::<i32>::new(3);

        table.store(&Pair(1, 2), 3);
        table.store(&Pair(2, 3), 1);

        assert_eq!(table.lookup(&Pair(1, 2)), Some(3));
        assert_eq!(table.lookup(&Pair(2, 3)), Some(1));
        assert_eq!(table.lookup(&Pair(3, 3)), None);
        assert_eq!(table.stats(), CacheStats { hits: 2, misses: 1 });

        table.clear();
        assert_eq!(table.lookup(&Pair(1, 2)), None);
    }

    #[test]
    fn test_eviction() {
        // A single slot: the second store evicts the first.
        let mut table = ComputedTable::<u8>::new(0);
        table.store(&Pair(0, 1), 1);
        table.store(&Pair(1, 0), 2);
        assert_eq!(table.lookup(&Pair(0, 1)), None);
        assert_eq!(table.lookup(&Pair(1, 0)), Some(2));
        assert_eq!(table.stats().to_string(), "1 hits / 2 lookups (50.0%)");
    }
}
