//! Control-flow automata, optionally timed.
//!
//! A [`Cfa`] has locations connected by edges labelled with sequences of
//! statements. Data statements (`Assume`, `Assign`, `Havoc`) become the
//! expression of the edge in SSA form: the `k`-th assignment of `x` on an
//! edge writes `prime^k(x)`. Clock statements (`ClockGuard`, `ClockReset`)
//! become clock operations; after them the invariants of the target
//! location are applied, time elapses unless the target is urgent, and the
//! invariants are applied again.
//!
//! The analysis of a CFA wraps an inner analysis with the current location.
//! Nodes only cover nodes at the same location, and the error location is
//! the target.
//!
//! ```
//! use cegar_rs::cfa::{CfaBuilder, Stmt};
//! use cegar_rs::expr::{self, VarDecl};
//! use cegar_rs::types::Type;
//!
//! let x = VarDecl::new("x", Type::Int);
//! let mut builder = CfaBuilder::new("init");
//! let err = builder.create_loc("err");
//! builder.set_error_loc(err);
//! let init = builder.init_loc();
//! builder
//!     .create_edge(init, err, vec![Stmt::Assume(expr::lt(x.expr(), expr::int(0)).unwrap())])
//!     .unwrap();
//! let cfa = builder.build().unwrap();
//! assert_eq!(cfa.edges().len(), 1);
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::{Display, Formatter};

use crate::abstractor::ArgBuilder;
use crate::analysis::{Analysis, Domain, ExprAction, ExprState, InitFunc, Lts, TargetPredicate, TransFunc};
use crate::domain::zone::{ClockAction, ClockConstraint, ClockOp};
use crate::error::{FormulaError, Result};
use crate::expr::{self, Expr, ExprKind, VarDecl};
use crate::indexing::VarIndexing;
use crate::types::Type;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocId(usize);

impl LocId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct Loc {
    name: String,
    invariants: Vec<ClockConstraint>,
    urgent: bool,
}

impl Loc {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn invariants(&self) -> &[ClockConstraint] {
        &self.invariants
    }

    /// Time cannot elapse in an urgent location.
    pub fn is_urgent(&self) -> bool {
        self.urgent
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Assume(Expr),
    Assign(VarDecl, Expr),
    Havoc(VarDecl),
    ClockGuard(ClockConstraint),
    ClockReset(VarDecl, i64),
}

impl Display for Stmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Stmt::Assume(e) => write!(f, "assume {}", e),
            Stmt::Assign(x, e) => write!(f, "{} := {}", x, e),
            Stmt::Havoc(x) => write!(f, "havoc {}", x),
            Stmt::ClockGuard(c) => write!(f, "guard {:?}", c),
            Stmt::ClockReset(x, v) => write!(f, "{} := {}", x, v),
        }
    }
}

/// An edge of the automaton, which is also the action of its analysis.
#[derive(Debug, Clone)]
pub struct CfaEdge {
    source: LocId,
    target: LocId,
    stmts: Vec<Stmt>,
    expr: Expr,
    next: VarIndexing,
    clock_ops: Vec<ClockOp>,
}

impl CfaEdge {
    pub fn source(&self) -> LocId {
        self.source
    }

    pub fn target(&self) -> LocId {
        self.target
    }

    pub fn stmts(&self) -> &[Stmt] {
        &self.stmts
    }
}

impl ExprAction for CfaEdge {
    fn to_expr(&self) -> Expr {
        self.expr.clone()
    }

    fn next_indexing(&self) -> VarIndexing {
        self.next.clone()
    }
}

impl ClockAction for CfaEdge {
    fn clock_ops(&self) -> Vec<ClockOp> {
        self.clock_ops.clone()
    }
}

impl Display for CfaEdge {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{} -> L{}", self.source.0, self.target.0)?;
        for (i, stmt) in self.stmts.iter().enumerate() {
            write!(f, "{} {}", if i == 0 { ":" } else { ";" }, stmt)?;
        }
        Ok(())
    }
}

/// Replace every variable `x` by `prime^k(x)`, where `k` is its offset.
fn shift(e: &Expr, idx: &VarIndexing) -> Expr {
    e.rewrite(&mut |node: &Expr| match node.kind() {
        ExprKind::Sym(s) if s.index.is_none() => {
            let k = idx.get(&s.decl);
            if k == 0 {
                None
            } else {
                expr::prime_n(node.clone(), k).ok()
            }
        }
        _ => None,
    })
}

fn expect_unprimed(what: &'static str, e: &Expr) -> Result<(), FormulaError> {
    if e.has_prime() || e.is_indexed() {
        return Err(FormulaError::UnexpectedPrime(what.to_string()));
    }
    Ok(())
}

fn validate(stmt: &Stmt) -> Result<(), FormulaError> {
    match stmt {
        Stmt::Assume(e) => {
            expect_unprimed("assume", e)?;
            if !e.ty().is_bool() {
                return Err(FormulaError::TypeMismatch {
                    op: "assume",
                    expected: Type::Bool.to_string(),
                    found: e.ty().clone(),
                });
            }
        }
        Stmt::Assign(x, e) => {
            expect_unprimed("assign", e)?;
            if x.ty() != e.ty() {
                return Err(FormulaError::TypeMismatch {
                    op: "assign",
                    expected: x.ty().to_string(),
                    found: e.ty().clone(),
                });
            }
        }
        Stmt::Havoc(_) | Stmt::ClockGuard(_) | Stmt::ClockReset(..) => {}
    }
    Ok(())
}

/// Expression and offsets of a sequence of data statements.
fn encode(stmts: &[Stmt]) -> Result<(Expr, VarIndexing), FormulaError> {
    let mut idx = VarIndexing::all(0);
    let mut conjuncts = Vec::new();
    for stmt in stmts {
        match stmt {
            Stmt::Assume(e) => conjuncts.push(shift(e, &idx)),
            Stmt::Assign(x, e) => {
                let value = shift(e, &idx);
                idx.inc(x);
                conjuncts.push(expr::eq(expr::prime_n(x.expr(), idx.get(x))?, value)?);
            }
            Stmt::Havoc(x) => idx.inc(x),
            Stmt::ClockGuard(_) | Stmt::ClockReset(..) => {}
        }
    }
    Ok((expr::and(conjuncts)?, idx))
}

struct RawEdge {
    source: LocId,
    target: LocId,
    stmts: Vec<Stmt>,
}

pub struct CfaBuilder {
    locs: Vec<Loc>,
    edges: Vec<RawEdge>,
    error: Option<LocId>,
}

impl CfaBuilder {
    /// Start with the initial location.
    pub fn new(init_name: impl Into<String>) -> Self {
        let mut builder = Self {
            locs: Vec::new(),
            edges: Vec::new(),
            error: None,
        };
        builder.create_loc(init_name);
        builder
    }

    pub fn init_loc(&self) -> LocId {
        LocId(0)
    }

    pub fn create_loc(&mut self, name: impl Into<String>) -> LocId {
        self.locs.push(Loc {
            name: name.into(),
            invariants: Vec::new(),
            urgent: false,
        });
        LocId(self.locs.len() - 1)
    }

    pub fn set_urgent(&mut self, loc: LocId) {
        if let Some(l) = self.locs.get_mut(loc.0) {
            l.urgent = true;
        }
    }

    pub fn add_invariant(&mut self, loc: LocId, invariant: ClockConstraint) {
        if let Some(l) = self.locs.get_mut(loc.0) {
            l.invariants.push(invariant);
        }
    }

    pub fn set_error_loc(&mut self, loc: LocId) {
        self.error = Some(loc);
    }

    pub fn create_edge(&mut self, source: LocId, target: LocId, stmts: Vec<Stmt>) -> Result<(), FormulaError> {
        for stmt in &stmts {
            validate(stmt)?;
        }
        self.edges.push(RawEdge { source, target, stmts });
        Ok(())
    }

    pub fn build(self) -> Result<Cfa, FormulaError> {
        let mut edges = Vec::with_capacity(self.edges.len());
        for raw in self.edges {
            let (expr, next) = encode(&raw.stmts)?;
            let mut clock_ops: Vec<ClockOp> = raw
                .stmts
                .iter()
                .filter_map(|stmt| match stmt {
                    Stmt::ClockGuard(c) => Some(ClockOp::Guard(c.clone())),
                    Stmt::ClockReset(x, v) => Some(ClockOp::Reset(x.clone(), *v)),
                    _ => None,
                })
                .collect();
            if let Some(target) = self.locs.get(raw.target.0) {
                let invariants = target.invariants.iter().map(|c| ClockOp::Invariant(c.clone()));
                clock_ops.extend(invariants.clone());
                if !target.urgent {
                    clock_ops.push(ClockOp::Delay);
                    clock_ops.extend(invariants);
                }
            }
            edges.push(CfaEdge {
                source: raw.source,
                target: raw.target,
                stmts: raw.stmts,
                expr,
                next,
                clock_ops,
            });
        }
        let mut outgoing: HashMap<LocId, Vec<usize>> = HashMap::new();
        for (i, e) in edges.iter().enumerate() {
            outgoing.entry(e.source).or_default().push(i);
        }
        Ok(Cfa {
            locs: self.locs,
            edges,
            outgoing,
            error: self.error,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Cfa {
    locs: Vec<Loc>,
    edges: Vec<CfaEdge>,
    outgoing: HashMap<LocId, Vec<usize>>,
    error: Option<LocId>,
}

impl Cfa {
    pub fn init_loc(&self) -> LocId {
        LocId(0)
    }

    pub fn error_loc(&self) -> Option<LocId> {
        self.error
    }

    pub fn loc(&self, id: LocId) -> Option<&Loc> {
        self.locs.get(id.0)
    }

    pub fn locs(&self) -> &[Loc] {
        &self.locs
    }

    pub fn edges(&self) -> &[CfaEdge] {
        &self.edges
    }

    pub fn outgoing(&self, loc: LocId) -> impl Iterator<Item = &CfaEdge> {
        self.outgoing
            .get(&loc)
            .into_iter()
            .flatten()
            .filter_map(|&i| self.edges.get(i))
    }

    /// Data variables of all statements.
    pub fn vars(&self) -> BTreeSet<VarDecl> {
        let mut res = BTreeSet::new();
        for stmt in self.edges.iter().flat_map(|e| &e.stmts) {
            match stmt {
                Stmt::Assume(e) => res.extend(e.vars()),
                Stmt::Assign(x, e) => {
                    res.insert(x.clone());
                    res.extend(e.vars());
                }
                Stmt::Havoc(x) => {
                    res.insert(x.clone());
                }
                _ => {}
            }
        }
        res
    }

    /// Clocks of all guards, resets and invariants.
    pub fn clocks(&self) -> BTreeSet<VarDecl> {
        self.clock_constraints()
            .flat_map(|c| c.clocks().cloned().collect::<Vec<_>>())
            .chain(self.edges.iter().flat_map(|e| &e.stmts).filter_map(|s| match s {
                Stmt::ClockReset(x, _) => Some(x.clone()),
                _ => None,
            }))
            .collect()
    }

    /// Largest constant each clock is compared with.
    pub fn max_clock_consts(&self) -> BTreeMap<VarDecl, i64> {
        let mut res: BTreeMap<VarDecl, i64> = BTreeMap::new();
        for c in self.clock_constraints() {
            for clock in c.clocks() {
                let k = res.entry(clock.clone()).or_insert(0);
                *k = (*k).max(c.bound.abs());
            }
        }
        res
    }

    fn clock_constraints(&self) -> impl Iterator<Item = &ClockConstraint> {
        let guards = self.edges.iter().flat_map(|e| &e.stmts).filter_map(|s| match s {
            Stmt::ClockGuard(c) => Some(c),
            _ => None,
        });
        guards.chain(self.locs.iter().flat_map(|l| &l.invariants))
    }
}

/// A location together with an inner abstract state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CfaState<S> {
    pub loc: LocId,
    pub state: S,
}

impl<S: ExprState> ExprState for CfaState<S> {
    fn to_expr(&self) -> Expr {
        self.state.to_expr()
    }
}

impl<S: Display> Display for CfaState<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "(L{}, {})", self.loc.0, self.state)
    }
}

pub struct CfaDomain<S, P> {
    init: LocId,
    inner: Box<dyn Domain<S, P>>,
}

impl<S: Clone, P> Domain<CfaState<S>, P> for CfaDomain<S, P> {
    fn top(&self, prec: &P) -> CfaState<S> {
        CfaState {
            loc: self.init,
            state: self.inner.top(prec),
        }
    }

    fn is_bottom(&self, state: &CfaState<S>) -> bool {
        self.inner.is_bottom(&state.state)
    }

    fn is_leq(&self, a: &CfaState<S>, b: &CfaState<S>, prec: &P) -> bool {
        a.loc == b.loc && self.inner.is_leq(&a.state, &b.state, prec)
    }

    fn join(&self, a: &CfaState<S>, b: &CfaState<S>, prec: &P) -> Option<CfaState<S>> {
        if a.loc != b.loc {
            return None;
        }
        Some(CfaState {
            loc: a.loc,
            state: self.inner.join(&a.state, &b.state, prec)?,
        })
    }

    fn has_exact_join(&self) -> bool {
        self.inner.has_exact_join()
    }
}

pub struct CfaInitFunc<S, P> {
    init: LocId,
    inner: Box<dyn InitFunc<S, P>>,
}

impl<S, P> InitFunc<CfaState<S>, P> for CfaInitFunc<S, P> {
    fn init_states(&self, prec: &P) -> Result<Vec<CfaState<S>>> {
        let states = self.inner.init_states(prec)?;
        Ok(states
            .into_iter()
            .map(|state| CfaState { loc: self.init, state })
            .collect())
    }
}

pub struct CfaTransFunc<S, P> {
    inner: Box<dyn TransFunc<S, CfaEdge, P>>,
}

impl<S, P> TransFunc<CfaState<S>, CfaEdge, P> for CfaTransFunc<S, P> {
    fn succ_states(&self, state: &CfaState<S>, edge: &CfaEdge, prec: &P) -> Result<Vec<CfaState<S>>> {
        if edge.source != state.loc {
            return Ok(vec![]);
        }
        let succs = self.inner.succ_states(&state.state, edge, prec)?;
        Ok(succs
            .into_iter()
            .map(|state| CfaState {
                loc: edge.target,
                state,
            })
            .collect())
    }
}

/// Outgoing edges of the current location.
pub struct CfaLts {
    outgoing: HashMap<LocId, Vec<CfaEdge>>,
}

impl CfaLts {
    pub fn new(cfa: &Cfa) -> Self {
        let mut outgoing: HashMap<LocId, Vec<CfaEdge>> = HashMap::new();
        for e in &cfa.edges {
            outgoing.entry(e.source).or_default().push(e.clone());
        }
        Self { outgoing }
    }
}

impl<S> Lts<CfaState<S>, CfaEdge> for CfaLts {
    fn enabled_actions(&self, state: &CfaState<S>) -> Vec<CfaEdge> {
        self.outgoing.get(&state.loc).cloned().unwrap_or_default()
    }
}

/// States at the error location.
pub struct CfaErrorPredicate {
    error: Option<LocId>,
}

impl CfaErrorPredicate {
    pub fn new(cfa: &Cfa) -> Self {
        Self { error: cfa.error }
    }
}

impl<S> TargetPredicate<CfaState<S>> for CfaErrorPredicate {
    fn is_target(&self, state: &CfaState<S>) -> Result<bool> {
        Ok(Some(state.loc) == self.error)
    }
}

/// Lift an analysis over edges to one that also tracks locations. The
/// precision is shared by all locations.
pub fn analysis<S, P>(cfa: &Cfa, inner: Analysis<S, CfaEdge, P>) -> Analysis<CfaState<S>, CfaEdge, P>
where
    S: Clone + 'static,
    P: 'static,
{
    Analysis {
        domain: Box::new(CfaDomain {
            init: cfa.init_loc(),
            inner: inner.domain,
        }),
        init: Box::new(CfaInitFunc {
            init: cfa.init_loc(),
            inner: inner.init,
        }),
        trans: Box::new(CfaTransFunc { inner: inner.trans }),
    }
}

/// ARG builder for `cfa`: locations as projection, the error location as
/// target.
pub fn arg_builder<S, P>(cfa: &Cfa, inner: Analysis<S, CfaEdge, P>) -> ArgBuilder<CfaState<S>, CfaEdge, P>
where
    S: Clone + 'static,
    P: 'static,
{
    ArgBuilder::new(analysis(cfa, inner), CfaLts::new(cfa), CfaErrorPredicate::new(cfa))
        .with_projection(|s: &CfaState<S>| s.loc.0 as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::rc::Rc;

    use test_log::test;

    use crate::domain::expl::{self, ExplPrec};
    use crate::domain::prod::{self, Prod2Prec};
    use crate::domain::zone::{self, ZonePrec};
    use crate::eval::Value;
    use crate::solver::finite::BddSolverFactory;
    use crate::solver::SolverFactory;

    #[test]
    fn test_ssa_encoding() {
        let x = VarDecl::new("x", Type::Int);
        let y = VarDecl::new("y", Type::Int);
        let inc = expr::add(vec![x.expr(), expr::int(1)]).unwrap();
        let (e, next) = encode(&[
            Stmt::Assign(x.clone(), inc.clone()),
            Stmt::Assign(x.clone(), inc),
            Stmt::Havoc(y.clone()),
            Stmt::Assume(expr::eq(x.expr(), y.expr()).unwrap()),
        ])
        .unwrap();
        assert_eq!(next.get(&x), 2);
        assert_eq!(next.get(&y), 1);
        let x1 = x.primed();
        let x2 = expr::prime(x1.clone()).unwrap();
        let expected = expr::and(vec![
            expr::eq(x1.clone(), expr::add(vec![x.expr(), expr::int(1)]).unwrap()).unwrap(),
            expr::eq(x2.clone(), expr::add(vec![x1, expr::int(1)]).unwrap()).unwrap(),
            expr::eq(x2, y.primed()).unwrap(),
        ])
        .unwrap();
        assert_eq!(e, expected);
    }

    #[test]
    fn test_validation() {
        let x = VarDecl::new("x", Type::Int);
        let b = VarDecl::new("b", Type::Bool);
        let mut builder = CfaBuilder::new("l0");
        let l1 = builder.create_loc("l1");
        let l0 = builder.init_loc();
        assert!(matches!(
            builder.create_edge(l0, l1, vec![Stmt::Assign(b, x.expr())]),
            Err(FormulaError::TypeMismatch { .. })
        ));
        assert!(matches!(
            builder.create_edge(l0, l1, vec![Stmt::Assume(expr::eq(x.primed(), x.expr()).unwrap())]),
            Err(FormulaError::UnexpectedPrime(_))
        ));
        assert!(builder.create_edge(l0, l1, vec![Stmt::Havoc(x)]).is_ok());
        assert_eq!(builder.build().unwrap().edges().len(), 1);
    }

    #[test]
    fn test_explicit_transfer_moves_location() {
        let x = VarDecl::new("x", Type::Int);
        let mut builder = CfaBuilder::new("l0");
        let l0 = builder.init_loc();
        let l1 = builder.create_loc("l1");
        builder
            .create_edge(l0, l1, vec![Stmt::Assign(x.clone(), expr::int(5))])
            .unwrap();
        let cfa = builder.build().unwrap();
        let solver: Rc<dyn SolverFactory> = Rc::new(BddSolverFactory::default());
        let analysis = analysis(&cfa, expl::analysis(solver, expr::tt(), None));
        let prec = ExplPrec::new([x.clone()]);
        let init = analysis.init.init_states(&prec).unwrap();
        assert_eq!(init.len(), 1);
        assert_eq!(init[0].loc, l0);

        let lts = CfaLts::new(&cfa);
        let edges = lts.enabled_actions(&init[0]);
        assert_eq!(edges.len(), 1);
        let succs = analysis.trans.succ_states(&init[0], &edges[0], &prec).unwrap();
        assert_eq!(succs.len(), 1);
        assert_eq!(succs[0].loc, l1);
        assert_eq!(succs[0].state.value(&x), Some(&Value::Int(5)));
        assert!(lts.enabled_actions(&succs[0]).is_empty());
        // Edges leaving other locations do not apply.
        assert!(analysis.trans.succ_states(&succs[0], &edges[0], &prec).unwrap().is_empty());
    }

    #[test]
    fn test_timed_edge() {
        let c = VarDecl::new("c", Type::Rat);
        let mut builder = CfaBuilder::new("l0");
        let l0 = builder.init_loc();
        let l1 = builder.create_loc("l1");
        let l2 = builder.create_loc("l2");
        builder.add_invariant(l0, ClockConstraint::leq(&c, 3));
        builder
            .create_edge(l0, l1, vec![Stmt::ClockGuard(ClockConstraint::gt(&c, 3))])
            .unwrap();
        builder
            .create_edge(l0, l2, vec![Stmt::ClockGuard(ClockConstraint::geq(&c, 2)), Stmt::ClockReset(c.clone(), 0)])
            .unwrap();
        let cfa = builder.build().unwrap();
        assert_eq!(cfa.clocks().into_iter().collect::<Vec<_>>(), vec![c.clone()]);
        assert_eq!(cfa.max_clock_consts().get(&c), Some(&3));

        let solver: Rc<dyn SolverFactory> = Rc::new(BddSolverFactory::default());
        let inner = prod::analysis(
            zone::analysis(cfa.loc(l0).map(|l| l.invariants().to_vec()).unwrap_or_default(), cfa.max_clock_consts()),
            expl::analysis(solver, expr::tt(), None),
        );
        let analysis = analysis(&cfa, inner);
        let prec = Prod2Prec(ZonePrec::new([c.clone()]), ExplPrec::empty());
        let init = analysis.init.init_states(&prec).unwrap();
        assert_eq!(init.len(), 1);
        let lts = CfaLts::new(&cfa);
        let edges = lts.enabled_actions(&init[0]);
        assert_eq!(edges.len(), 2);
        // c > 3 contradicts the invariant c <= 3.
        assert!(analysis.trans.succ_states(&init[0], &edges[0], &prec).unwrap().is_empty());
        let succs = analysis.trans.succ_states(&init[0], &edges[1], &prec).unwrap();
        assert_eq!(succs.len(), 1);
        assert_eq!(succs[0].loc, l2);
    }
}
