//! Predicate abstraction.
//!
//! A state is a cube over the tracked predicates: each predicate appears
//! positively, negatively, or not at all. Successors are computed by boolean
//! abstraction: every combination of predicate values consistent with the
//! transition yields one successor cube.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

use crate::analysis::{Analysis, Domain, ExprAction, ExprState, InitFunc, Prec, TransFunc};
use crate::domain::all_sat;
use crate::error::Result;
use crate::eval::Value;
use crate::expr::{self, Expr, ExprKind, Symbol, VarDecl};
use crate::indexing::{unfold, VarIndexing};
use crate::solver::{SessionTheme, SolverFactory};
use crate::types::Type;

/// Tracked predicates, kept without top-level negation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PredPrec {
    preds: BTreeSet<Expr>,
}

impl PredPrec {
    /// Literals `true`/`false` are dropped, negations are stripped.
    pub fn new(preds: impl IntoIterator<Item = Expr>) -> Self {
        Self {
            preds: preds
                .into_iter()
                .map(|p| p.ponate())
                .filter(|p| p.as_lit().is_none())
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn preds(&self) -> &BTreeSet<Expr> {
        &self.preds
    }
}

impl Prec for PredPrec {
    fn join(&self, other: &Self) -> Self {
        Self {
            preds: self.preds.union(&other.preds).cloned().collect(),
        }
    }

    fn size(&self) -> usize {
        self.preds.len()
    }
}

impl Display for PredPrec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, p) in self.preds.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p)?;
        }
        write!(f, "}}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PredState {
    Bottom,
    /// Conjunction of predicate literals (`p` or `not p`).
    Cube(BTreeSet<Expr>),
}

impl PredState {
    pub fn top() -> Self {
        PredState::Cube(BTreeSet::new())
    }

    pub fn literals(&self) -> Option<&BTreeSet<Expr>> {
        match self {
            PredState::Bottom => None,
            PredState::Cube(lits) => Some(lits),
        }
    }
}

impl ExprState for PredState {
    fn to_expr(&self) -> Expr {
        match self {
            PredState::Bottom => expr::ff(),
            PredState::Cube(lits) => {
                expr::and(lits.iter().cloned().collect()).unwrap_or_else(|_| expr::ff())
            }
        }
    }
}

impl Display for PredState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PredState::Bottom => write!(f, "⊥"),
            PredState::Cube(_) => write!(f, "{}", self.to_expr()),
        }
    }
}

fn negate(lit: &Expr) -> Option<Expr> {
    match lit.kind() {
        ExprKind::Not(a) => Some(a.clone()),
        _ => expr::not(lit.clone()).ok(),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PredDomain;

impl Domain<PredState, PredPrec> for PredDomain {
    fn top(&self, _prec: &PredPrec) -> PredState {
        PredState::top()
    }

    fn is_bottom(&self, state: &PredState) -> bool {
        matches!(state, PredState::Bottom)
    }

    fn is_leq(&self, a: &PredState, b: &PredState, _prec: &PredPrec) -> bool {
        match (a, b) {
            (PredState::Bottom, _) => true,
            (_, PredState::Bottom) => false,
            (PredState::Cube(a), PredState::Cube(b)) => b.is_subset(a),
        }
    }

    fn join(&self, a: &PredState, b: &PredState, prec: &PredPrec) -> Option<PredState> {
        if self.is_leq(a, b, prec) {
            return Some(b.clone());
        }
        if self.is_leq(b, a, prec) {
            return Some(a.clone());
        }
        let (la, lb) = (a.literals()?, b.literals()?);
        if la.len() != lb.len() {
            return None;
        }
        let only_a: Vec<&Expr> = la.difference(lb).collect();
        let only_b: Vec<&Expr> = lb.difference(la).collect();
        match (only_a.as_slice(), only_b.as_slice()) {
            ([p], [q]) if negate(p).as_ref() == Some(*q) => {
                let mut joined = la.clone();
                joined.remove(*p);
                Some(PredState::Cube(joined))
            }
            _ => None,
        }
    }

    fn has_exact_join(&self) -> bool {
        true
    }
}

/// Cubes over `prec` consistent with `query` at `next`.
fn abstract_states(
    solver: &dyn SolverFactory,
    query: &Expr,
    next: &VarIndexing,
    prec: &PredPrec,
) -> Result<Vec<PredState>> {
    let mut session = solver.open_session(SessionTheme::incremental());
    session.add(query)?;
    let mut activations = Vec::with_capacity(prec.preds.len());
    for (i, p) in prec.preds.iter().enumerate() {
        let act = VarDecl::new(format!("__pred{}", i), Type::Bool);
        session.add(&expr::iff(act.expr(), unfold(p, next))?)?;
        activations.push(Symbol::var(act));
    }
    let Some(models) = all_sat(session.as_mut(), &activations, None)? else {
        return Ok(vec![PredState::top()]);
    };
    let mut states = Vec::with_capacity(models.len());
    for model in models {
        let mut cube = BTreeSet::new();
        for (act, p) in activations.iter().zip(&prec.preds) {
            match model.get(act) {
                Some(Value::Bool(true)) => {
                    cube.insert(p.clone());
                }
                Some(Value::Bool(false)) => {
                    cube.insert(expr::not(p.clone())?);
                }
                _ => {}
            }
        }
        states.push(PredState::Cube(cube));
    }
    Ok(states)
}

pub struct PredInitFunc {
    init: Expr,
    solver: Rc<dyn SolverFactory>,
}

impl PredInitFunc {
    pub fn new(init: Expr, solver: Rc<dyn SolverFactory>) -> Self {
        Self { init, solver }
    }
}

impl InitFunc<PredState, PredPrec> for PredInitFunc {
    fn init_states(&self, prec: &PredPrec) -> Result<Vec<PredState>> {
        let idx = VarIndexing::all(0);
        abstract_states(self.solver.as_ref(), &unfold(&self.init, &idx), &idx, prec)
    }
}

pub struct PredTransFunc {
    solver: Rc<dyn SolverFactory>,
}

impl PredTransFunc {
    pub fn new(solver: Rc<dyn SolverFactory>) -> Self {
        Self { solver }
    }
}

impl<A: ExprAction> TransFunc<PredState, A, PredPrec> for PredTransFunc {
    fn succ_states(&self, state: &PredState, action: &A, prec: &PredPrec) -> Result<Vec<PredState>> {
        if matches!(state, PredState::Bottom) {
            return Ok(vec![]);
        }
        let query = expr::and(vec![state.to_expr(), action.to_expr()])?;
        let query = unfold(&query, &VarIndexing::all(0));
        abstract_states(self.solver.as_ref(), &query, &action.next_indexing(), prec)
    }
}

/// Predicate analysis starting from the states satisfying `init`.
pub fn analysis<A: ExprAction + 'static>(
    solver: Rc<dyn SolverFactory>,
    init: Expr,
) -> Analysis<PredState, A, PredPrec> {
    Analysis::new(
        PredDomain,
        PredInitFunc::new(init, solver.clone()),
        PredTransFunc::new(solver),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::domain::tests::TestAction;
    use crate::solver::finite::BddSolverFactory;

    fn x() -> VarDecl {
        VarDecl::new("x", Type::Int)
    }

    #[test]
    fn test_prec_normalization() {
        let p = expr::gt(x().expr(), expr::int(0)).unwrap();
        let prec = PredPrec::new([expr::not(p.clone()).unwrap(), expr::tt(), p.clone()]);
        assert_eq!(prec.size(), 1);
        assert!(prec.preds().contains(&p));
    }

    #[test]
    fn test_boolean_abstraction() {
        let x = x();
        let solver: Rc<dyn SolverFactory> = Rc::new(BddSolverFactory::default());
        let trans = PredTransFunc::new(solver);
        let pos = expr::gt(x.expr(), expr::int(0)).unwrap();
        let even = expr::eq(expr::modulo(x.expr(), expr::int(2)).unwrap(), expr::int(0)).unwrap();
        let prec = PredPrec::new([pos.clone(), even.clone()]);
        // x' = x + 1 from x > 0
        let action = TestAction::step(
            expr::eq(x.primed(), expr::add(vec![x.expr(), expr::int(1)]).unwrap()).unwrap(),
        );
        let s = PredState::Cube([pos.clone()].into());
        let succs = trans.succ_states(&s, &action, &prec).unwrap();
        assert_eq!(succs.len(), 2);
        for succ in &succs {
            assert!(succ.literals().unwrap().contains(&pos));
        }
    }

    #[test]
    fn test_infeasible_transition_has_no_successor() {
        let x = x();
        let solver: Rc<dyn SolverFactory> = Rc::new(BddSolverFactory::default());
        let trans = PredTransFunc::new(solver);
        let pos = expr::gt(x.expr(), expr::int(0)).unwrap();
        let prec = PredPrec::new([pos.clone()]);
        let guard = TestAction {
            expr: expr::lt(x.expr(), expr::int(0)).unwrap(),
            next: VarIndexing::all(0),
        };
        let s = PredState::Cube([pos].into());
        assert!(trans.succ_states(&s, &guard, &prec).unwrap().is_empty());
    }

    #[test]
    fn test_order_and_join() {
        let x = x();
        let p = expr::gt(x.expr(), expr::int(0)).unwrap();
        let q = expr::lt(x.expr(), expr::int(5)).unwrap();
        let not_p = expr::not(p.clone()).unwrap();
        let prec = PredPrec::new([p.clone(), q.clone()]);
        let d = PredDomain;

        let a = PredState::Cube([p.clone(), q.clone()].into());
        let b = PredState::Cube([not_p.clone(), q.clone()].into());
        let c = PredState::Cube([q.clone()].into());
        assert!(d.is_leq(&a, &c, &prec));
        assert!(!d.is_leq(&c, &a, &prec));
        assert_eq!(d.join(&a, &b, &prec), Some(c));
        let e = PredState::Cube([not_p, expr::not(q).unwrap()].into());
        assert_eq!(d.join(&a, &e, &prec), None);
    }
}
