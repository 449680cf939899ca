//! Reduced ordered BDD manager with complement edges.
//!
//! This is the boolean engine behind the finite-domain solver backend
//! ([`crate::solver::finite`]). All operations go through the [`Bdd`]
//! manager, which hash-conses nodes and memoizes ITE calls in a computed
//! table.
//!
//! Variables are 1-indexed; variable `0` is reserved for the terminal node.
//! Smaller indices are closer to the root. The high edge of a stored node is
//! never negated, which keeps the representation canonical.
//!
//! The manager has a node limit and an optional deadline. Once either is
//! exceeded it becomes *exhausted*: further node allocations yield `zero`,
//! and every result computed since then is meaningless. Callers must check
//! [`Bdd::exhausted`] and discard such results.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::time::Instant;

use log::debug;
use num_bigint::BigUint;

use crate::cache::{CacheKey, CacheStats, ComputedTable};
use crate::reference::Ref;
use crate::utils::pairing3;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
struct Node {
    variable: u32,
    low: Ref,
    high: Ref,
}

#[derive(Debug, Eq, PartialEq, Clone)]
pub enum OpKey {
    Ite(Ref, Ref, Ref),
}

impl CacheKey for OpKey {
    fn key_hash(&self) -> u64 {
        match self {
            OpKey::Ite(f, g, h) => pairing3(
                f.unsigned() as u64,
                g.unsigned() as u64,
                h.unsigned() as u64,
            ),
        }
    }
}

/// Why a manager stopped allocating nodes.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Exhaustion {
    NodeLimit,
    Deadline,
}

pub struct Bdd {
    nodes: RefCell<Vec<Node>>,
    unique: RefCell<HashMap<Node, u32>>,
    cache: RefCell<ComputedTable<Ref>>,
    node_limit: usize,
    deadline: Cell<Option<Instant>>,
    exhausted: Cell<Option<Exhaustion>>,
    pub zero: Ref,
    pub one: Ref,
}

impl Bdd {
    pub fn new(cache_bits: usize, node_limit: usize) -> Self {
        let placeholder = Node {
            variable: 0,
            low: Ref::positive(0),
            high: Ref::positive(0),
        };
        // Index 0 is unused (so that `-0` never occurs), index 1 is the terminal.
        let nodes = vec![placeholder, placeholder];
        let one = Ref::positive(1);
        let zero = -one;

        Self {
            nodes: RefCell::new(nodes),
            unique: RefCell::new(HashMap::new()),
            cache: RefCell::new(ComputedTable::new(cache_bits)),
            node_limit,
            deadline: Cell::new(None),
            exhausted: Cell::new(None),
            zero,
            one,
        }
    }
}

impl Default for Bdd {
    fn default() -> Self {
        Bdd::new(16, 1 << 22)
    }
}

impl Debug for Bdd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bdd")
            .field("nodes", &self.num_nodes())
            .field("node_limit", &self.node_limit)
            .field("exhausted", &self.exhausted.get())
            .finish()
    }
}

impl Bdd {
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.borrow().stats()
    }

    /// Number of allocated nodes (including the terminal).
    pub fn num_nodes(&self) -> usize {
        self.nodes.borrow().len() - 1
    }

    pub fn set_deadline(&self, deadline: Option<Instant>) {
        self.deadline.set(deadline);
    }

    pub fn exhausted(&self) -> Option<Exhaustion> {
        if self.exhausted.get().is_none() {
            if let Some(deadline) = self.deadline.get() {
                if Instant::now() >= deadline {
                    self.exhausted.set(Some(Exhaustion::Deadline));
                }
            }
        }
        self.exhausted.get()
    }

    pub fn variable(&self, index: u32) -> u32 {
        self.nodes.borrow()[index as usize].variable
    }
    pub fn low(&self, index: u32) -> Ref {
        self.nodes.borrow()[index as usize].low
    }
    pub fn high(&self, index: u32) -> Ref {
        self.nodes.borrow()[index as usize].high
    }

    pub fn low_node(&self, node: Ref) -> Ref {
        let low = self.low(node.index());
        if node.is_negated() {
            -low
        } else {
            low
        }
    }
    pub fn high_node(&self, node: Ref) -> Ref {
        let high = self.high(node.index());
        if node.is_negated() {
            -high
        } else {
            high
        }
    }

    pub fn is_zero(&self, node: Ref) -> bool {
        node == self.zero
    }
    pub fn is_one(&self, node: Ref) -> bool {
        node == self.one
    }
    pub fn is_terminal(&self, node: Ref) -> bool {
        self.is_zero(node) || self.is_one(node)
    }

    pub fn mk_node(&self, v: u32, low: Ref, high: Ref) -> Ref {
        assert_ne!(v, 0, "Variable index should not be zero");

        // Handle canonicity
        if high.is_negated() {
            return -self.mk_node(v, -low, -high);
        }

        // Handle duplicates
        if low == high {
            return low;
        }

        let node = Node {
            variable: v,
            low,
            high,
        };
        if let Some(&i) = self.unique.borrow().get(&node) {
            return Ref::positive(i);
        }

        if self.exhausted.get().is_some() {
            return self.zero;
        }
        let mut nodes = self.nodes.borrow_mut();
        if nodes.len() >= self.node_limit {
            debug!("mk: node limit {} reached", self.node_limit);
            self.exhausted.set(Some(Exhaustion::NodeLimit));
            return self.zero;
        }
        if nodes.len() % 1024 == 0 {
            if let Some(deadline) = self.deadline.get() {
                if Instant::now() >= deadline {
                    debug!("mk: deadline passed");
                    self.exhausted.set(Some(Exhaustion::Deadline));
                    return self.zero;
                }
            }
        }

        let i = nodes.len() as u32;
        nodes.push(node);
        self.unique.borrow_mut().insert(node, i);
        Ref::positive(i)
    }

    pub fn mk_var(&self, v: u32) -> Ref {
        assert_ne!(v, 0, "Variable index should not be zero");
        self.mk_node(v, self.zero, self.one)
    }

    /// Conjunction of literals given as signed variable indices.
    pub fn cube(&self, literals: impl IntoIterator<Item = i32>) -> Ref {
        let mut literals = literals.into_iter().collect::<Vec<_>>();
        literals.sort_by_key(|&v| v.abs());
        literals.reverse();
        let mut current = self.one;
        for lit in literals {
            assert_ne!(lit, 0, "Variable index should not be zero");
            current = if lit < 0 {
                self.mk_node(lit.unsigned_abs(), current, self.zero)
            } else {
                self.mk_node(lit as u32, self.zero, current)
            };
        }
        current
    }

    pub fn top_cofactors(&self, node: Ref, v: u32) -> (Ref, Ref) {
        assert_ne!(v, 0, "Variable index should not be zero");

        let i = node.index();
        if self.is_terminal(node) || v < self.variable(i) {
            return (node, node);
        }
        assert_eq!(v, self.variable(i));
        (self.low_node(node), self.high_node(node))
    }

    /// Apply the ITE operation to the arguments.
    ///
    /// ```text
    /// ITE(x, y, z) = (x ∧ y) ∨ (¬x ∧ z)
    /// ```
    pub fn apply_ite(&self, f: Ref, g: Ref, h: Ref) -> Ref {
        // Base cases:
        //   ite(1,G,H) => G
        //   ite(0,G,H) => H
        if self.is_one(f) {
            return g;
        }
        if self.is_zero(f) {
            return h;
        }

        // More base cases:
        //   ite(F,G,G) => G
        //   ite(F,1,0) => F
        //   ite(F,0,1) => ~F
        //   ite(F,1,~F) => 1
        //   ite(F,F,1) => 1
        //   ite(F,~F,0) => 0
        //   ite(F,0,F) => F
        if g == h {
            return g;
        }
        if self.is_one(g) && self.is_zero(h) {
            return f;
        }
        if self.is_zero(g) && self.is_one(h) {
            return -f;
        }
        if self.is_one(g) && h == -f {
            return self.one;
        }
        if g == f && self.is_one(h) {
            return self.one;
        }
        if g == -f && self.is_zero(h) {
            return self.zero;
        }
        if self.is_zero(g) && h == f {
            return f;
        }

        // Standard triples:
        //   ite(F,F,H) => ite(F,1,H)
        //   ite(F,G,F) => ite(F,G,0)
        //   ite(F,~F,H) => ite(F,0,H)
        //   ite(F,G,~F) => ite(F,G,1)
        if g == f {
            return self.apply_ite(f, self.one, h);
        }
        if h == f {
            return self.apply_ite(f, g, self.zero);
        }
        if g == -f {
            return self.apply_ite(f, self.zero, h);
        }
        if h == -f {
            return self.apply_ite(f, g, self.one);
        }

        let i = self.variable(f.index());
        let j = self.variable(g.index());
        let k = self.variable(h.index());
        assert_ne!(i, 0);

        // Equivalent pairs (choose the one with the lowest top variable):
        //   ite(F,1,H) == ite(H,1,F) == F ∨ H
        //   ite(F,G,0) == ite(G,F,0) == F ∧ G
        //   ite(F,G,1) == ite(~G,~F,1) == F -> G
        //   ite(F,0,H) == ite(~H,0,~F) == ~F ∧ H
        //   ite(F,G,~G) == ite(G,F,~F)
        if self.is_one(g) && k != 0 && k < i {
            return self.apply_ite(h, self.one, f);
        }
        if self.is_zero(h) && j != 0 && j < i {
            return self.apply_ite(g, f, self.zero);
        }
        if self.is_one(h) && j != 0 && j < i {
            return self.apply_ite(-g, -f, self.one);
        }
        if self.is_zero(g) && k != 0 && k < i {
            return self.apply_ite(-h, self.zero, -f);
        }
        if g == -h && j != 0 && j < i {
            return self.apply_ite(g, f, -f);
        }

        // Make sure the first two pointers (f and g) are regular (not negated)
        let (mut f, mut g, mut h) = (f, g, h);

        // ite(~F,G,H) => ite(F,H,G)
        if f.is_negated() {
            f = -f;
            std::mem::swap(&mut g, &mut h);
        }

        // ite(F,~G,H) => ~ite(F,G,~H)
        let mut n = false;
        if g.is_negated() {
            n = true;
            g = -g;
            h = -h;
        }

        let key = OpKey::Ite(f, g, h);
        let cached = self.cache.borrow().lookup(&key);
        if let Some(res) = cached {
            return if n { -res } else { res };
        }

        // Determine the top variable:
        let mut m = self.variable(f.index());
        for x in [g, h] {
            let v = self.variable(x.index());
            if v != 0 {
                m = m.min(v);
            }
        }
        assert_ne!(m, 0);

        let (f0, f1) = self.top_cofactors(f, m);
        let (g0, g1) = self.top_cofactors(g, m);
        let (h0, h1) = self.top_cofactors(h, m);

        let e = self.apply_ite(f0, g0, h0);
        let t = self.apply_ite(f1, g1, h1);

        let res = self.mk_node(m, e, t);
        self.cache.borrow_mut().store(&key, res);

        if n {
            -res
        } else {
            res
        }
    }

    pub fn apply_not(&self, f: Ref) -> Ref {
        -f
    }

    pub fn apply_and(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, self.zero)
    }

    pub fn apply_or(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, self.one, v)
    }

    pub fn apply_xor(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, -v, v)
    }

    pub fn apply_eq(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, -v)
    }

    pub fn apply_imply(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, self.one)
    }

    pub fn apply_and_many(&self, nodes: impl IntoIterator<Item = Ref>) -> Ref {
        let mut res = self.one;
        for node in nodes {
            res = self.apply_and(res, node);
            if self.is_zero(res) {
                break;
            }
        }
        res
    }

    pub fn apply_or_many(&self, nodes: impl IntoIterator<Item = Ref>) -> Ref {
        let mut res = self.zero;
        for node in nodes {
            res = self.apply_or(res, node);
            if self.is_one(res) {
                break;
            }
        }
        res
    }

    pub fn is_implies(&self, f: Ref, g: Ref) -> bool {
        self.is_zero(self.apply_and(f, -g))
    }

    /// Existential quantification of `vars` out of `f`.
    pub fn exists(&self, f: Ref, vars: &HashSet<u32>) -> Ref {
        let mut cache = HashMap::new();
        self.exists_(f, vars, &mut cache)
    }

    fn exists_(&self, f: Ref, vars: &HashSet<u32>, cache: &mut HashMap<Ref, Ref>) -> Ref {
        if self.is_terminal(f) {
            return f;
        }
        if let Some(&res) = cache.get(&f) {
            return res;
        }
        let v = self.variable(f.index());
        let e = self.exists_(self.low_node(f), vars, cache);
        let t = self.exists_(self.high_node(f), vars, cache);
        let res = if vars.contains(&v) {
            self.apply_or(e, t)
        } else {
            self.mk_node(v, e, t)
        };
        cache.insert(f, res);
        res
    }

    /// Variables `f` depends on.
    pub fn support(&self, f: Ref) -> HashSet<u32> {
        let mut visited = HashSet::new();
        let mut res = HashSet::new();
        let mut stack = vec![f.index()];
        while let Some(i) = stack.pop() {
            if i == 1 || !visited.insert(i) {
                continue;
            }
            res.insert(self.variable(i));
            stack.push(self.low(i).index());
            stack.push(self.high(i).index());
        }
        res
    }

    /// Number of nodes reachable from `f`.
    pub fn size(&self, f: Ref) -> usize {
        let mut visited = HashSet::new();
        let mut stack = vec![f.index()];
        while let Some(i) = stack.pop() {
            if !visited.insert(i) || i == 1 {
                continue;
            }
            stack.push(self.low(i).index());
            stack.push(self.high(i).index());
        }
        visited.len()
    }

    /// Returns one satisfying path as signed literals, if any exists.
    ///
    /// Variables not on the path are don't-cares.
    pub fn one_sat(&self, node: Ref) -> Option<Vec<i32>> {
        if self.is_zero(node) {
            return None;
        }

        let mut path = Vec::new();
        let mut current = node;

        // Walk down the BDD, always picking a satisfying branch
        while !self.is_one(current) {
            let var = self.variable(current.index()) as i32;
            let high = self.high_node(current);
            let low = self.low_node(current);

            if !self.is_zero(high) {
                path.push(var);
                current = high;
            } else {
                path.push(-var);
                current = low;
            }
        }

        Some(path)
    }

    /// All paths to `one`, or `None` if there are more than `limit` of them.
    pub fn paths(&self, f: Ref, limit: usize) -> Option<Vec<Vec<i32>>> {
        let mut res = Vec::new();
        let mut path = Vec::new();
        self.paths_(f, limit, &mut path, &mut res).then_some(res)
    }

    fn paths_(&self, f: Ref, limit: usize, path: &mut Vec<i32>, res: &mut Vec<Vec<i32>>) -> bool {
        if self.is_zero(f) {
            return true;
        }
        if self.is_one(f) {
            res.push(path.clone());
            return res.len() <= limit;
        }
        let var = self.variable(f.index()) as i32;
        path.push(var);
        let ok = self.paths_(self.high_node(f), limit, path, res);
        path.pop();
        if !ok {
            return false;
        }
        path.push(-var);
        let ok = self.paths_(self.low_node(f), limit, path, res);
        path.pop();
        ok
    }

    /// Number of satisfying assignments over variables `1..=num_vars`.
    pub fn sat_count(&self, node: Ref, num_vars: usize) -> BigUint {
        let mut cache = HashMap::new();
        let max = BigUint::from(1u32) << num_vars;
        self.sat_count_(node, &max, &mut cache)
    }

    fn sat_count_(&self, node: Ref, max: &BigUint, cache: &mut HashMap<Ref, BigUint>) -> BigUint {
        if self.is_zero(node) {
            return BigUint::ZERO;
        } else if self.is_one(node) {
            return max.clone();
        }

        if let Some(count) = cache.get(&node) {
            return count.clone();
        }

        let low = self.low(node.index());
        let high = self.high(node.index());

        let count_low = self.sat_count_(low, max, cache);
        let count_high = self.sat_count_(high, max, cache);

        let count: BigUint = (count_low + count_high) >> 1;
        let count = if node.is_negated() { max - count } else { count };

        cache.insert(node, count.clone());
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    #[test]
    fn test_var() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(1);
        assert_eq!(bdd.variable(x.index()), 1);
        assert_eq!(bdd.low_node(x), bdd.zero);
        assert_eq!(bdd.high_node(x), bdd.one);
        assert_eq!(bdd.mk_var(1), x);
    }

    #[test]
    fn test_not_var() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(1);
        let nx = bdd.apply_not(x);
        assert_eq!(bdd.low_node(nx), bdd.one);
        assert_eq!(bdd.high_node(nx), bdd.zero);
    }

    #[test]
    fn test_de_morgan() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let f = -bdd.apply_and(x, y);
        let g = bdd.apply_or(-x, -y);
        assert_eq!(f, g);
        let f = -bdd.apply_or(x, y);
        let g = bdd.apply_and(-x, -y);
        assert_eq!(f, g);
    }

    #[test]
    fn test_xor() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        assert_eq!(bdd.apply_xor(x, x), bdd.zero);
        assert_eq!(bdd.apply_xor(x, -x), bdd.one);
        assert_eq!(bdd.apply_xor(x, y), -bdd.apply_eq(x, y));
    }

    #[test]
    fn test_apply_ite() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let z = bdd.mk_var(3);
        let f = bdd.apply_ite(x, y, z);
        assert_eq!(f, bdd.mk_node(1, z, y));
        let x_and_y = bdd.apply_and(x, y);
        let not_x_and_z = bdd.apply_and(-x, z);
        assert_eq!(f, bdd.apply_or(x_and_y, not_x_and_z));
    }

    #[test]
    fn test_exists() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let f = bdd.apply_and(x, y);
        let g = bdd.exists(f, &HashSet::from([1]));
        assert_eq!(g, y);
        let h = bdd.exists(bdd.apply_xor(x, y), &HashSet::from([2]));
        assert_eq!(h, bdd.one);
    }

    #[test]
    fn test_one_sat() {
        let bdd = Bdd::default();
        let f = bdd.cube([1, -2, -3]);
        let model = bdd.one_sat(f);
        assert_eq!(model, Some(vec![1, -2, -3]));
        let g = bdd.apply_and(f, -bdd.cube(model.unwrap()));
        assert_eq!(bdd.one_sat(g), None);
    }

    #[test]
    fn test_paths() {
        let bdd = Bdd::default();
        let f = bdd.apply_xor(bdd.mk_var(1), bdd.mk_var(2));
        let paths = bdd.paths(f, 10).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(bdd.paths(f, 1).is_none());
        assert_eq!(bdd.paths(bdd.one, 1), Some(vec![vec![]]));
        assert_eq!(bdd.paths(bdd.zero, 1), Some(vec![]));
    }

    #[test]
    fn test_sat_count() {
        let bdd = Bdd::default();
        let f = bdd.cube([1, 2]);
        assert_eq!(bdd.sat_count(f, 2), BigUint::from(1u32));
        assert_eq!(bdd.sat_count(f, 4), BigUint::from(4u32));
        assert_eq!(bdd.sat_count(-f, 2), BigUint::from(3u32));
        assert_eq!(bdd.sat_count(bdd.one, 3), BigUint::from(8u32));
        assert_eq!(bdd.sat_count(bdd.zero, 3), BigUint::ZERO);
    }

    #[test]
    fn test_support() {
        let bdd = Bdd::default();
        let f = bdd.apply_or(bdd.mk_var(2), bdd.mk_var(5));
        assert_eq!(bdd.support(f), HashSet::from([2, 5]));
    }

    #[test]
    fn test_node_limit() {
        let bdd = Bdd::new(4, 4);
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        assert!(bdd.exhausted().is_none());
        let _ = bdd.apply_and(x, bdd.apply_or(y, bdd.mk_var(3)));
        assert_eq!(bdd.exhausted(), Some(Exhaustion::NodeLimit));
    }

    #[test]
    fn test_deadline() {
        let bdd = Bdd::default();
        bdd.set_deadline(Some(Instant::now()));
        assert_eq!(bdd.exhausted(), Some(Exhaustion::Deadline));
    }
}
