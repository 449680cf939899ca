//! # cegar-rs: Counterexample-Guided Abstraction Refinement
//!
//! **`cegar-rs`** is a generic engine for checking safety properties of
//! transition systems by **CEGAR**: explore an over-approximation of the
//! state space, and whenever it reaches a bad state, check whether the
//! abstract counterexample is real. Spurious ones make the abstraction more
//! precise, and the loop starts over.
//!
//! ## How it fits together
//!
//! - An [`Analysis`][crate::analysis::Analysis] bundles an abstract
//!   [`Domain`][crate::analysis::Domain] with initial and transfer
//!   functions, all parametrized by a precision. Ready-made domains live in
//!   [`domain`]: explicit values, predicates, zones and their products.
//! - The [`Abstractor`][crate::abstractor::Abstractor] builds an
//!   [`Arg`][crate::arg::Arg] (abstract reachability graph) under the current
//!   precision, with coverage between nodes.
//! - A [`Refiner`][crate::refiner::Refiner] checks a counterexample with a
//!   [`Solver`][crate::solver::Solver] and either confirms it or returns a
//!   finer precision and the point from which to rebuild the ARG.
//! - The [`CegarChecker`][crate::cegar::CegarChecker] alternates both until
//!   the verdict is Safe or Unsafe, or a limit turns it into Unknown.
//!
//! Models come as symbolic transition systems ([`sts`]) or control-flow
//! automata, optionally timed ([`cfa`]). Formulas are [`expr::Expr`] trees,
//! decided by the finite-domain BDD backend in [`solver::finite`].
//!
//! ## Basic Usage
//!
//! ```rust
//! use std::rc::Rc;
//!
//! use cegar_rs::abstractor::{Abstractor, ArgBuilder};
//! use cegar_rs::cegar::{CegarChecker, ResourceLimits, Verdict};
//! use cegar_rs::domain::expl::{self, ExplPrec};
//! use cegar_rs::expr::{self, VarDecl};
//! use cegar_rs::refiner::checker::ExprTraceSeqItpChecker;
//! use cegar_rs::refiner::prec::ItpRefToExplPrec;
//! use cegar_rs::refiner::SingleExprTraceRefiner;
//! use cegar_rs::solver::finite::BddSolverFactory;
//! use cegar_rs::solver::SolverFactory;
//! use cegar_rs::sts::Sts;
//! use cegar_rs::types::Type;
//!
//! // x starts at 0 and toggles between 0 and 1; it never reaches 2.
//! let x = VarDecl::new("x", Type::Int);
//! let sts = Sts::new(
//!     expr::eq(x.expr(), expr::int(0)).unwrap(),
//!     expr::eq(x.primed(), expr::sub(expr::int(1), x.expr()).unwrap()).unwrap(),
//!     expr::neq(x.expr(), expr::int(2)).unwrap(),
//! )
//! .unwrap();
//!
//! let solver: Rc<dyn SolverFactory> = Rc::new(BddSolverFactory::default());
//! let builder = ArgBuilder::new(
//!     expl::analysis(solver.clone(), sts.init().clone(), None),
//!     sts.lts(),
//!     sts.target(solver.clone()).unwrap(),
//! );
//! let refiner = SingleExprTraceRefiner::new(
//!     ExprTraceSeqItpChecker::new(sts.init().clone(), sts.negated_prop().unwrap(), solver.clone()),
//!     ItpRefToExplPrec,
//! );
//! let mut checker = CegarChecker::new(Abstractor::new(builder), refiner).with_solver(solver);
//!
//! let res = checker.verify(ExplPrec::empty(), &ResourceLimits::default());
//! assert_eq!(res.verdict(), Verdict::Safe);
//! ```
//!
//! ## Core Components
//!
//! - **[`cegar`]**: the refinement loop, resource limits and results.
//! - **[`abstractor`]** and **[`arg`]**: ARG construction and storage.
//! - **[`refiner`]**: trace checkers, refutations and precision refiners.
//! - **[`solver`]**: the solver interface and its BDD-based implementation.
//! - **[`portfolio`]**: running independent tasks in parallel.
//!
//! The library only logs through the [`log`] facade; install a logger in the
//! application to see per-iteration progress.

pub mod abstractor;
pub mod analysis;
pub mod arg;
pub mod bdd;
pub mod cache;
pub mod cegar;
pub mod cfa;
pub mod domain;
pub mod error;
pub mod eval;
pub mod expr;
pub mod indexing;
pub mod portfolio;
pub mod reference;
pub mod refiner;
pub mod solver;
pub mod sts;
pub mod trace;
pub mod types;
pub mod utils;
pub mod waitlist;
