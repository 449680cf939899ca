//! Error types.
//!
//! Construction of ill-typed expressions fails fast with [`FormulaError`].
//! Misuse of a solver session yields [`SolverError`]. Everything raised while
//! running the engine is a [`CegarError`], which the CEGAR loop turns into an
//! `Unknown` verdict carrying the reason.

use thiserror::Error;

use crate::cegar::ResourceKind;
use crate::solver::UnknownCause;
use crate::types::Type;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormulaError {
    #[error("type mismatch in `{op}`: expected {expected}, found {found}")]
    TypeMismatch {
        op: &'static str,
        expected: String,
        found: Type,
    },

    #[error("`{op}` expects {expected} operand(s), got {found}")]
    Arity {
        op: &'static str,
        expected: &'static str,
        found: usize,
    },

    #[error("cannot prime an indexed symbol `{0}`")]
    PrimedIndexedSymbol(String),

    #[error("`{0}` must not refer to next-state values")]
    UnexpectedPrime(String),

    #[error("bitvector width {0} is out of range 1..=64")]
    BitVecWidth(u32),

    #[error("malformed model: {0}")]
    Model(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    #[error(transparent)]
    Formula(#[from] FormulaError),

    #[error("pop on an empty assertion stack")]
    StackUnderflow,

    #[error("no model available (last status: {0})")]
    NoModel(String),

    #[error("no unsat core available (last status: {0})")]
    NoUnsatCore(String),

    #[error("session was not opened for interpolation")]
    NotInterpolating,

    #[error("unknown interpolation marker #{0}")]
    UnknownMarker(usize),

    #[error("interpolant requested while the assertions are not unsat")]
    NoInterpolant,

    #[error("operation could not be completed: {0}")]
    Incomplete(UnknownCause),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CegarError {
    #[error(transparent)]
    Formula(#[from] FormulaError),

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error("solver returned unknown: {0}")]
    SolverUnknown(UnknownCause),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(ResourceKind),

    #[error("verification was cancelled")]
    Cancelled,

    #[error("refinement stalled in iteration {iteration}: the precision did not grow")]
    RefinementStalled { iteration: usize },

    #[error("inconsistent ARG: {0}")]
    InconsistentArg(String),
}

pub type Result<T, E = CegarError> = std::result::Result<T, E>;
