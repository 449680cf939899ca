//! Uniform interface to satisfiability and interpolation backends.
//!
//! A [`SolverFactory`] opens sessions. A session ([`Solver`]) accumulates
//! assertions on a stack of frames, answers `check`, and, depending on the
//! requested [`SessionTheme`], produces models, unsat cores and
//! interpolants. Sessions are owned values: dropping the box releases every
//! backend resource, on every exit path.
//!
//! Backend trouble (timeouts, limits, unsupported theories) is never an
//! error: it surfaces as [`SolverStatus::Unknown`].

pub mod encoding;
pub mod finite;

use std::fmt::{Display, Formatter};
use std::ops::{Deref, DerefMut};

use log::warn;

use crate::error::{CegarError, SolverError};
use crate::eval::Valuation;
use crate::expr::Expr;

/// Why a query was inconclusive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UnknownCause {
    Timeout,
    ResourceLimit,
    Unsupported(String),
    Unavailable(String),
}

impl Display for UnknownCause {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            UnknownCause::Timeout => write!(f, "timeout"),
            UnknownCause::ResourceLimit => write!(f, "resource limit"),
            UnknownCause::Unsupported(what) => write!(f, "unsupported: {}", what),
            UnknownCause::Unavailable(why) => write!(f, "unavailable: {}", why),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolverStatus {
    Sat,
    Unsat,
    Unknown(UnknownCause),
}

impl SolverStatus {
    pub fn is_sat(&self) -> bool {
        matches!(self, SolverStatus::Sat)
    }

    pub fn is_unsat(&self) -> bool {
        matches!(self, SolverStatus::Unsat)
    }

    /// `Ok(true)` for SAT, `Ok(false)` for UNSAT, an error for UNKNOWN.
    pub fn decided(self) -> Result<bool, CegarError> {
        match self {
            SolverStatus::Sat => Ok(true),
            SolverStatus::Unsat => Ok(false),
            SolverStatus::Unknown(cause) => Err(CegarError::SolverUnknown(cause)),
        }
    }
}

impl Display for SolverStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SolverStatus::Sat => write!(f, "sat"),
            SolverStatus::Unsat => write!(f, "unsat"),
            SolverStatus::Unknown(cause) => write!(f, "unknown ({})", cause),
        }
    }
}

/// What a session will be used for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionTheme {
    pub incremental: bool,
    pub interpolating: bool,
}

impl SessionTheme {
    pub const fn plain() -> Self {
        Self {
            incremental: false,
            interpolating: false,
        }
    }

    pub const fn incremental() -> Self {
        Self {
            incremental: true,
            interpolating: false,
        }
    }

    pub const fn interpolating() -> Self {
        Self {
            incremental: true,
            interpolating: true,
        }
    }
}

/// Partition handle of an interpolating session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItpMarker(pub(crate) usize);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SolverStats {
    pub sessions: usize,
    pub checks: usize,
    pub unknowns: usize,
}

/// A solver session.
pub trait Solver {
    /// Assert a boolean expression in the current frame.
    fn add(&mut self, assertion: &Expr) -> Result<(), SolverError>;

    /// Assert a boolean expression that may appear in an unsat core.
    fn track(&mut self, assertion: &Expr) -> Result<(), SolverError>;

    fn push(&mut self);

    /// Discard the assertions of the innermost frame.
    fn pop(&mut self) -> Result<(), SolverError>;

    /// Decide the conjunction of all live assertions. Idempotent until the
    /// assertion stack changes.
    fn check(&mut self) -> SolverStatus;

    /// Result of the last `check`, unless the assertions changed since.
    fn status(&self) -> Option<SolverStatus>;

    /// Values of the symbols of the live assertions (after SAT).
    fn model(&self) -> Result<Valuation, SolverError>;

    /// Subset of the tracked assertions that is unsat together with the
    /// untracked ones (after UNSAT).
    fn unsat_core(&mut self) -> Result<Vec<Expr>, SolverError>;

    fn assertions(&self) -> Vec<Expr>;

    /// Open a new interpolation partition.
    fn create_marker(&mut self) -> Result<ItpMarker, SolverError>;

    /// Assert into the given partition.
    fn add_to(&mut self, marker: ItpMarker, assertion: &Expr) -> Result<(), SolverError>;

    /// Interpolant between the partitions in `a` and everything else (after
    /// UNSAT). It is implied by `a`, inconsistent with the rest, and only
    /// mentions symbols shared by both sides.
    fn interpolant(&mut self, a: &[ItpMarker]) -> Result<Expr, SolverError>;
}

/// Opens solver sessions.
pub trait SolverFactory {
    fn open_session(&self, theme: SessionTheme) -> Box<dyn Solver>;

    fn stats(&self) -> SolverStats;
}

/// Pushes a frame on creation and pops it when dropped.
pub struct ScopedPush<'a> {
    solver: &'a mut dyn Solver,
}

impl<'a> ScopedPush<'a> {
    pub fn new(solver: &'a mut dyn Solver) -> Self {
        solver.push();
        Self { solver }
    }
}

impl<'a> Deref for ScopedPush<'a> {
    type Target = dyn Solver + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.solver
    }
}

impl<'a> DerefMut for ScopedPush<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.solver
    }
}

impl Drop for ScopedPush<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.solver.pop() {
            warn!("scoped pop failed: {}", e);
        }
    }
}
