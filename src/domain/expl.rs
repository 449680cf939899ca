//! Explicit-value domain.
//!
//! A state maps each tracked variable to a single value, or leaves it
//! unknown. Successors are enumerated with the solver, up to `max_enum`
//! per transition. Beyond that, only the variables with a unique successor
//! value are kept.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

use log::debug;

use crate::analysis::{Analysis, Domain, ExprAction, ExprState, InitFunc, Prec, TransFunc};
use crate::domain::{all_sat, determined};
use crate::error::Result;
use crate::eval::{Valuation, Value};
use crate::expr::{self, Expr, Symbol, VarDecl};
use crate::indexing::{unfold, VarIndexing};
use crate::solver::{SessionTheme, SolverFactory};

/// Tracked variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ExplPrec {
    vars: BTreeSet<VarDecl>,
}

impl ExplPrec {
    pub fn new(vars: impl IntoIterator<Item = VarDecl>) -> Self {
        Self {
            vars: vars.into_iter().collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn vars(&self) -> &BTreeSet<VarDecl> {
        &self.vars
    }

    /// Forget the values of untracked variables.
    pub fn create_state(&self, val: &Valuation) -> ExplState {
        ExplState::Val(val.project(&self.vars))
    }
}

impl Prec for ExplPrec {
    fn join(&self, other: &Self) -> Self {
        Self {
            vars: self.vars.union(&other.vars).cloned().collect(),
        }
    }

    fn size(&self) -> usize {
        self.vars.len()
    }
}

impl Display for ExplPrec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, v) in self.vars.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, "}}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExplState {
    Bottom,
    Val(Valuation),
}

impl ExplState {
    pub fn top() -> Self {
        ExplState::Val(Valuation::new())
    }

    pub fn valuation(&self) -> Option<&Valuation> {
        match self {
            ExplState::Bottom => None,
            ExplState::Val(val) => Some(val),
        }
    }

    pub fn value(&self, var: &VarDecl) -> Option<&Value> {
        self.valuation()?.get_var(var)
    }

    /// `self` is at least as specific as `other`.
    fn is_leq(&self, other: &ExplState) -> bool {
        match (self, other) {
            (ExplState::Bottom, _) => true,
            (_, ExplState::Bottom) => false,
            (ExplState::Val(a), ExplState::Val(b)) => b.iter().all(|(s, v)| a.get(s) == Some(v)),
        }
    }
}

impl ExprState for ExplState {
    fn to_expr(&self) -> Expr {
        match self {
            ExplState::Bottom => expr::ff(),
            ExplState::Val(val) => val.to_expr(),
        }
    }
}

impl Display for ExplState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ExplState::Bottom => write!(f, "⊥"),
            ExplState::Val(val) => write!(f, "{}", val),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExplDomain;

impl Domain<ExplState, ExplPrec> for ExplDomain {
    fn top(&self, _prec: &ExplPrec) -> ExplState {
        ExplState::top()
    }

    fn is_bottom(&self, state: &ExplState) -> bool {
        matches!(state, ExplState::Bottom)
    }

    fn is_leq(&self, a: &ExplState, b: &ExplState, _prec: &ExplPrec) -> bool {
        a.is_leq(b)
    }

    fn join(&self, a: &ExplState, b: &ExplState, _prec: &ExplPrec) -> Option<ExplState> {
        if a.is_leq(b) {
            return Some(b.clone());
        }
        if b.is_leq(a) {
            return Some(a.clone());
        }
        let (va, vb) = (a.valuation()?, b.valuation()?);
        if va.len() != vb.len() {
            return None;
        }
        // Exact only if the states differ in one boolean variable.
        let mut diff = None;
        for (s, v) in va.iter() {
            match vb.get(s) {
                None => return None,
                Some(w) if w == v => {}
                Some(_) if diff.is_none() && matches!(v, Value::Bool(_)) => diff = Some(s.clone()),
                Some(_) => return None,
            }
        }
        let mut joined = va.clone();
        joined.remove(&diff?);
        Some(ExplState::Val(joined))
    }

    fn has_exact_join(&self) -> bool {
        true
    }
}

fn unindexed(val: &Valuation) -> Valuation {
    val.iter()
        .map(|(s, v)| (Symbol::var(s.decl.clone()), v.clone()))
        .collect()
}

/// Explicit successors of `query` projected onto the tracked variables at
/// `next`.
fn abstract_states(
    solver: &dyn SolverFactory,
    query: &Expr,
    next: &VarIndexing,
    prec: &ExplPrec,
    max_enum: Option<usize>,
) -> Result<Vec<ExplState>> {
    let symbols: Vec<Symbol> = prec
        .vars
        .iter()
        .map(|v| Symbol::indexed(v.clone(), next.get(v)))
        .collect();
    let mut session = solver.open_session(SessionTheme::incremental());
    session.add(query)?;
    let states = match all_sat(session.as_mut(), &symbols, max_enum)? {
        Some(vals) => vals.iter().map(|v| ExplState::Val(unindexed(v))).collect(),
        None => {
            let val = determined(session.as_mut(), &symbols)?;
            debug!("too many successors, keeping determined values {}", val);
            vec![ExplState::Val(unindexed(&val))]
        }
    };
    Ok(states)
}

pub struct ExplInitFunc {
    init: Expr,
    solver: Rc<dyn SolverFactory>,
    max_enum: Option<usize>,
}

impl ExplInitFunc {
    pub fn new(init: Expr, solver: Rc<dyn SolverFactory>) -> Self {
        Self {
            init,
            solver,
            max_enum: Some(DEFAULT_MAX_ENUM),
        }
    }
}

impl InitFunc<ExplState, ExplPrec> for ExplInitFunc {
    fn init_states(&self, prec: &ExplPrec) -> Result<Vec<ExplState>> {
        let idx = VarIndexing::all(0);
        let query = unfold(&self.init, &idx);
        abstract_states(self.solver.as_ref(), &query, &idx, prec, self.max_enum)
    }
}

pub const DEFAULT_MAX_ENUM: usize = 16;

pub struct ExplTransFunc {
    solver: Rc<dyn SolverFactory>,
    max_enum: Option<usize>,
}

impl ExplTransFunc {
    pub fn new(solver: Rc<dyn SolverFactory>) -> Self {
        Self {
            solver,
            max_enum: Some(DEFAULT_MAX_ENUM),
        }
    }

    /// `None` enumerates without limit.
    pub fn with_max_enum(mut self, max_enum: Option<usize>) -> Self {
        self.max_enum = max_enum;
        self
    }
}

impl<A: ExprAction> TransFunc<ExplState, A, ExplPrec> for ExplTransFunc {
    fn succ_states(&self, state: &ExplState, action: &A, prec: &ExplPrec) -> Result<Vec<ExplState>> {
        if matches!(state, ExplState::Bottom) {
            return Ok(vec![]);
        }
        let idx = VarIndexing::all(0);
        let query = expr::and(vec![state.to_expr(), action.to_expr()])?;
        let query = unfold(&query, &idx);
        abstract_states(
            self.solver.as_ref(),
            &query,
            &action.next_indexing(),
            prec,
            self.max_enum,
        )
    }
}

/// Explicit-value analysis starting from the states satisfying `init`.
pub fn analysis<A: ExprAction + 'static>(
    solver: Rc<dyn SolverFactory>,
    init: Expr,
    max_enum: Option<usize>,
) -> Analysis<ExplState, A, ExplPrec> {
    let mut init = ExplInitFunc::new(init, solver.clone());
    init.max_enum = max_enum;
    Analysis::new(ExplDomain, init, ExplTransFunc::new(solver).with_max_enum(max_enum))
}
