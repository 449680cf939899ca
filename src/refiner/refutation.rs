//! Explanations of why a counterexample is infeasible.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use crate::expr::{Expr, VarDecl};

pub trait Refutation {
    /// Index of the earliest state of the trace from which the ARG has to
    /// be rebuilt.
    fn prune_index(&self) -> usize;
}

/// One interpolant per state of the trace, over unindexed variables.
///
/// `itps[i]` overapproximates the states reachable along the first `i`
/// actions and is inconsistent with the rest of the trace.
#[derive(Debug, Clone, PartialEq)]
pub struct ItpRefutation {
    itps: Vec<Expr>,
    prune_index: usize,
}

impl ItpRefutation {
    /// A `prune_index` past the last interpolant is clamped to it.
    pub fn new(itps: Vec<Expr>, prune_index: usize) -> Self {
        let prune_index = prune_index.min(itps.len().saturating_sub(1));
        Self { itps, prune_index }
    }

    pub fn itps(&self) -> &[Expr] {
        &self.itps
    }

    pub fn get(&self, i: usize) -> Option<&Expr> {
        self.itps.get(i)
    }

    pub fn size(&self) -> usize {
        self.itps.len()
    }

    /// Atoms of all interpolants.
    pub fn atoms(&self) -> BTreeSet<Expr> {
        self.itps.iter().flat_map(|itp| itp.atoms()).collect()
    }

    pub fn vars(&self) -> BTreeSet<VarDecl> {
        self.itps.iter().flat_map(|itp| itp.vars()).collect()
    }
}

impl Refutation for ItpRefutation {
    fn prune_index(&self) -> usize {
        self.prune_index
    }
}

impl Display for ItpRefutation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, itp) in self.itps.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", itp)?;
        }
        write!(f, "] (prune at {})", self.prune_index)
    }
}

/// Unsatisfiable subset of the trace formula.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsatCoreRefutation {
    core: Vec<Expr>,
    prune_index: usize,
}

impl UnsatCoreRefutation {
    pub fn new(core: Vec<Expr>, prune_index: usize) -> Self {
        Self { core, prune_index }
    }

    /// Core formulas, over indexed symbols.
    pub fn core(&self) -> &[Expr] {
        &self.core
    }

    pub fn vars(&self) -> BTreeSet<VarDecl> {
        self.core.iter().flat_map(|e| e.vars()).collect()
    }
}

impl Refutation for UnsatCoreRefutation {
    fn prune_index(&self) -> usize {
        self.prune_index
    }
}

impl Display for UnsatCoreRefutation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "core of {} formula(s) (prune at {})", self.core.len(), self.prune_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::expr;

    #[test]
    fn test_prune_index_is_clamped() {
        let r = ItpRefutation::new(vec![expr::tt(), expr::ff()], 5);
        assert_eq!(r.prune_index(), 1);
        let r = ItpRefutation::new(vec![expr::tt(), expr::ff()], 0);
        assert_eq!(r.prune_index(), 0);
        let r = ItpRefutation::new(vec![], 3);
        assert_eq!(r.prune_index(), 0);
        assert_eq!(r.size(), 0);
    }
}
