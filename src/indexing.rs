//! Time indexing of variables along a path.
//!
//! Expressions of actions talk about the current state (`x`) and the next
//! states (`x'`, `x''`, ...). To encode a whole path as one formula, every
//! variable gets a time index: [`unfold`] turns `prime^k(x)` into
//! `x@(i + k)` where `i` is the offset of `x` in the current indexing, and
//! [`fold_in`] maps indexed symbols back to state variables.

use std::collections::BTreeMap;
use std::fmt::{Debug, Display, Formatter};

use crate::expr::{Expr, ExprKind, VarDecl};

/// Per-variable time offsets. Variables not mentioned have the default offset.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct VarIndexing {
    offsets: BTreeMap<VarDecl, u32>,
    default: u32,
}

impl VarIndexing {
    /// Every variable at offset `k`.
    pub fn all(k: u32) -> Self {
        Self {
            offsets: BTreeMap::new(),
            default: k,
        }
    }

    pub fn get(&self, var: &VarDecl) -> u32 {
        self.offsets.get(var).copied().unwrap_or(self.default)
    }

    /// Increment the offset of `var` by one.
    pub fn inc(&mut self, var: &VarDecl) {
        let k = self.get(var);
        self.offsets.insert(var.clone(), k + 1);
    }

    pub fn with_offset(mut self, var: &VarDecl, k: u32) -> Self {
        self.offsets.insert(var.clone(), k);
        self
    }

    /// Pointwise sum.
    pub fn add(&self, other: &VarIndexing) -> VarIndexing {
        let mut res = VarIndexing::all(self.default + other.default);
        for var in self.offsets.keys().chain(other.offsets.keys()) {
            res.offsets.insert(var.clone(), self.get(var) + other.get(var));
        }
        res
    }
}

impl Debug for VarIndexing {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl Display for VarIndexing {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (var, k) in &self.offsets {
            write!(f, "{}: {}, ", var, k)?;
        }
        write!(f, "_: {}]", self.default)
    }
}

/// Replace every unindexed variable `x` under `k` primes by `x@(indexing[x] + k)`.
pub fn unfold(e: &Expr, indexing: &VarIndexing) -> Expr {
    unfold_rec(e, indexing, 0)
}

fn unfold_rec(e: &Expr, indexing: &VarIndexing, primes: u32) -> Expr {
    match e.kind() {
        ExprKind::Lit(_) => e.clone(),
        ExprKind::Sym(s) => match s.index {
            None => s.decl.indexed(indexing.get(&s.decl) + primes),
            Some(_) => e.clone(),
        },
        ExprKind::Prime(a) => unfold_rec(a, indexing, primes + 1),
        _ => {
            let children = e
                .children()
                .into_iter()
                .map(|c| unfold_rec(c, indexing, primes))
                .collect();
            e.with_children(children)
        }
    }
}

/// Map `x@k` back to `prime^(k - indexing[x])(x)`.
///
/// Versions older than the indexing fold onto the current value of `x`.
pub fn fold_in(e: &Expr, indexing: &VarIndexing) -> Expr {
    e.rewrite(&mut |node: &Expr| {
        let s = node.as_symbol()?;
        let k = s.index?;
        let offset = k.saturating_sub(indexing.get(&s.decl));
        let mut res = s.decl.expr();
        for _ in 0..offset {
            res = crate::expr::prime(res).ok()?;
        }
        Some(res)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::expr::{add, eq, int};
    use crate::types::Type;

    #[test]
    fn test_unfold_primes() {
        let x = VarDecl::new("x", Type::Int);
        let y = VarDecl::new("y", Type::Int);
        // x' = x + y
        let e = eq(x.primed(), add(vec![x.expr(), y.expr()]).unwrap()).unwrap();
        let idx = VarIndexing::all(2).with_offset(&x, 5);
        let u = unfold(&e, &idx);
        assert_eq!(u.to_string(), "(= x@6 (+ x@5 y@2))");
        let back = fold_in(&u, &idx);
        assert_eq!(back, e);
    }

    #[test]
    fn test_indexing_add() {
        let x = VarDecl::new("x", Type::Int);
        let y = VarDecl::new("y", Type::Int);
        let mut a = VarIndexing::all(0);
        a.inc(&x);
        let b = VarIndexing::all(1).with_offset(&y, 3);
        let c = a.add(&b);
        assert_eq!(c.get(&x), 2);
        assert_eq!(c.get(&y), 3);
        assert_eq!(c.get(&VarDecl::new("z", Type::Int)), 1);
    }

    #[test]
    fn test_fold_in_after_unfold() {
        let x = VarDecl::new("x", Type::Int);
        let e = eq(x.expr(), int(1)).unwrap();
        let idx = VarIndexing::all(4);
        assert_eq!(fold_in(&unfold(&e, &idx), &idx), e);
    }
}
