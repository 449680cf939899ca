//! Capability traits connecting a formalism to the CEGAR core.
//!
//! The core is generic over three types:
//!
//! - `S`, the abstract state ([`State`]),
//! - `A`, the action labelling transitions ([`Action`]),
//! - `P`, the precision ([`Prec`]).
//!
//! An [`Analysis`] bundles the [`Domain`] (lattice operations), the
//! [`InitFunc`] and the [`TransFunc`] of one abstraction. The formalism
//! supplies an [`Lts`] enumerating enabled actions and a [`TargetPredicate`]
//! defining the unsafe states.
//!
//! # Soundness
//!
//! Implementations must keep `is_leq` consistent with the transfer function:
//! if `is_leq(a, b, p)` then every successor of `a` under an action is covered
//! by some successor of `b` under the same action and the same precision.

use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::rc::Rc;

use crate::error::Result;
use crate::expr::{self, Expr};
use crate::indexing::{unfold, VarIndexing};
use crate::solver::{SessionTheme, SolverFactory};

pub trait State: Clone + Debug + Display + Eq + Hash {}

impl<T: Clone + Debug + Display + Eq + Hash> State for T {}

pub trait Action: Clone + Debug + Display {}

impl<T: Clone + Debug + Display> Action for T {}

/// Amount of information tracked by a domain.
///
/// Precisions are values: refinement builds a new precision, it never
/// mutates the one in use.
pub trait Prec: Clone + Debug + Display + PartialEq {
    /// Least precision tracking everything either side tracks.
    fn join(&self, other: &Self) -> Self;

    /// Number of tracked items.
    fn size(&self) -> usize;
}

/// Lattice operations of an abstract domain.
pub trait Domain<S, P> {
    /// The least precise state.
    fn top(&self, prec: &P) -> S;

    fn is_bottom(&self, state: &S) -> bool;

    /// Partial order: `a` is subsumed by `b`.
    fn is_leq(&self, a: &S, b: &S, prec: &P) -> bool;

    /// Exact join, if `a ⊔ b` represents exactly the union of `a` and `b`.
    fn join(&self, _a: &S, _b: &S, _prec: &P) -> Option<S> {
        None
    }

    /// Whether `join` can ever succeed. Join coverage is disabled otherwise.
    fn has_exact_join(&self) -> bool {
        false
    }
}

pub trait InitFunc<S, P> {
    fn init_states(&self, prec: &P) -> Result<Vec<S>>;
}

/// Successors of an abstract state. Must return a finite set, without
/// bottom states.
pub trait TransFunc<S, A, P> {
    fn succ_states(&self, state: &S, action: &A, prec: &P) -> Result<Vec<S>>;
}

/// Labelled transition system of the formalism.
pub trait Lts<S, A> {
    fn enabled_actions(&self, state: &S) -> Vec<A>;
}

pub trait TargetPredicate<S> {
    fn is_target(&self, state: &S) -> Result<bool>;
}

/// States with a logical meaning over unindexed variables.
pub trait ExprState {
    fn to_expr(&self) -> Expr;
}

/// Actions with a logical meaning: a formula over current (`x`) and next
/// (`x'`, `x''`, ...) versions of variables.
pub trait ExprAction {
    fn to_expr(&self) -> Expr;

    /// Offsets of the last versions written by the action.
    fn next_indexing(&self) -> VarIndexing;
}

/// The three components of an abstraction.
pub struct Analysis<S, A, P> {
    pub domain: Box<dyn Domain<S, P>>,
    pub init: Box<dyn InitFunc<S, P>>,
    pub trans: Box<dyn TransFunc<S, A, P>>,
}

impl<S, A, P> Analysis<S, A, P> {
    pub fn new(
        domain: impl Domain<S, P> + 'static,
        init: impl InitFunc<S, P> + 'static,
        trans: impl TransFunc<S, A, P> + 'static,
    ) -> Self {
        Self {
            domain: Box::new(domain),
            init: Box::new(init),
            trans: Box::new(trans),
        }
    }
}

/// Target states are those intersecting a formula.
pub struct ExprStatePredicate {
    expr: Expr,
    solver: Rc<dyn SolverFactory>,
}

impl ExprStatePredicate {
    pub fn new(expr: Expr, solver: Rc<dyn SolverFactory>) -> Self {
        Self { expr, solver }
    }
}

impl<S: ExprState> TargetPredicate<S> for ExprStatePredicate {
    fn is_target(&self, state: &S) -> Result<bool> {
        let idx = VarIndexing::all(0);
        let query = expr::and(vec![state.to_expr(), self.expr.clone()])?;
        let mut solver = self.solver.open_session(SessionTheme::plain());
        solver.add(&unfold(&query, &idx))?;
        solver.check().decided()
    }
}
