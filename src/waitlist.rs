//! Exploration order of the abstractor.
//!
//! The order affects performance and the counterexamples found, never the
//! verdict.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::fmt::{Debug, Formatter};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::arg::NodeId;

#[derive(Clone, Copy, Default)]
pub enum SearchStrategy {
    /// First in, first out.
    #[default]
    Bfs,
    /// Last in, first out.
    Dfs,
    /// Uniformly random, reproducible from the seed.
    Random { seed: u64 },
    /// Highest priority first, computed from the node and its depth. Ties
    /// are broken in insertion order.
    Priority(fn(NodeId, usize) -> i64),
}

impl Debug for SearchStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchStrategy::Bfs => write!(f, "Bfs"),
            SearchStrategy::Dfs => write!(f, "Dfs"),
            SearchStrategy::Random { seed } => write!(f, "Random({})", seed),
            SearchStrategy::Priority(_) => write!(f, "Priority"),
        }
    }
}

enum Items {
    Queue(VecDeque<NodeId>),
    Random(Vec<NodeId>, ChaCha8Rng),
    Heap(BinaryHeap<(i64, Reverse<u64>, NodeId)>, u64, fn(NodeId, usize) -> i64),
}

pub struct Waitlist {
    strategy: SearchStrategy,
    items: Items,
}

impl Waitlist {
    pub fn new(strategy: SearchStrategy) -> Self {
        let items = match strategy {
            SearchStrategy::Bfs | SearchStrategy::Dfs => Items::Queue(VecDeque::new()),
            SearchStrategy::Random { seed } => Items::Random(Vec::new(), ChaCha8Rng::seed_from_u64(seed)),
            SearchStrategy::Priority(f) => Items::Heap(BinaryHeap::new(), 0, f),
        };
        Self { strategy, items }
    }

    pub fn strategy(&self) -> SearchStrategy {
        self.strategy
    }

    pub fn add(&mut self, node: NodeId, depth: usize) {
        match &mut self.items {
            Items::Queue(q) => q.push_back(node),
            Items::Random(v, _) => v.push(node),
            Items::Heap(h, seq, f) => {
                h.push((f(node, depth), Reverse(*seq), node));
                *seq += 1;
            }
        }
    }

    pub fn add_all(&mut self, nodes: impl IntoIterator<Item = (NodeId, usize)>) {
        for (node, depth) in nodes {
            self.add(node, depth);
        }
    }

    pub fn remove(&mut self) -> Option<NodeId> {
        match &mut self.items {
            Items::Queue(q) => match self.strategy {
                SearchStrategy::Dfs => q.pop_back(),
                _ => q.pop_front(),
            },
            Items::Random(v, rng) => {
                if v.is_empty() {
                    None
                } else {
                    let i = rng.gen_range(0..v.len());
                    Some(v.swap_remove(i))
                }
            }
            Items::Heap(h, _, _) => h.pop().map(|(_, _, node)| node),
        }
    }

    pub fn len(&self) -> usize {
        match &self.items {
            Items::Queue(q) => q.len(),
            Items::Random(v, _) => v.len(),
            Items::Heap(h, _, _) => h.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        *self = Waitlist::new(self.strategy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    fn ids(n: usize) -> Vec<(NodeId, usize)> {
        let mut arg: crate::arg::Arg<usize, ()> = crate::arg::Arg::new();
        (0..n)
            .map(|i| {
                let id = arg.create_init_node(crate::arg::NodeData {
                    state: i,
                    target: false,
                    key: 0,
                    prec_version: 0,
                });
                (id, n - i)
            })
            .collect()
    }

    fn drain(w: &mut Waitlist) -> Vec<usize> {
        std::iter::from_fn(|| w.remove()).map(|id| id.index()).collect()
    }

    #[test]
    fn test_bfs_dfs() {
        let mut w = Waitlist::new(SearchStrategy::Bfs);
        w.add_all(ids(3));
        assert_eq!(drain(&mut w), vec![0, 1, 2]);
        let mut w = Waitlist::new(SearchStrategy::Dfs);
        w.add_all(ids(3));
        assert_eq!(drain(&mut w), vec![2, 1, 0]);
    }

    #[test]
    fn test_priority_breaks_ties_in_order() {
        fn shallow_first(_: NodeId, depth: usize) -> i64 {
            -(depth as i64 / 2)
        }
        let mut w = Waitlist::new(SearchStrategy::Priority(shallow_first));
        // depths 4, 3, 2, 1
        w.add_all(ids(4));
        assert_eq!(drain(&mut w), vec![3, 1, 2, 0]);
    }

    #[test]
    fn test_random_is_reproducible() {
        let mut a = Waitlist::new(SearchStrategy::Random { seed: 42 });
        let mut b = Waitlist::new(SearchStrategy::Random { seed: 42 });
        a.add_all(ids(20));
        b.add_all(ids(20));
        let (ra, rb) = (drain(&mut a), drain(&mut b));
        assert_eq!(ra, rb);
        let mut sorted = ra.clone();
        sorted.sort();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());
    }
}
