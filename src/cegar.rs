//! The CEGAR loop.
//!
//! [`CegarChecker::verify`] alternates the [`Abstractor`] and a
//! [`Refiner`] until the ARG is complete without targets (safe), a
//! counterexample turns out feasible (unsafe), or a limit is hit (unknown).
//! Errors never escape `verify`: they become [`SafetyResult::Unknown`] with
//! an [`UnknownReason`].
//!
//! Precisions are versioned. Every ARG node records the version it was built
//! under, so a counterexample running through nodes of an older version
//! that teaches nothing new is pruned at its first stale node instead of
//! being reported as a stalled refinement.

use std::fmt::{Display, Formatter};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::abstractor::{Abstractor, AbstractorStatus};
use crate::analysis::Prec;
use crate::arg::Arg;
use crate::error::{CegarError, Result, SolverError};
use crate::eval::Valuation;
use crate::refiner::{Refiner, RefinerResult};
use crate::solver::{SolverFactory, UnknownCause};
use crate::trace::{Counterexample, Trace};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Iterations,
    WallClock,
    SolverCalls,
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Iterations => write!(f, "iteration limit"),
            ResourceKind::WallClock => write!(f, "wall-clock limit"),
            ResourceKind::SolverCalls => write!(f, "solver call limit"),
        }
    }
}

/// Shared flag requesting cancellation. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResourceLimits {
    /// Maximum number of abstraction steps. Zero stops before the first one.
    pub max_iterations: Option<usize>,
    pub timeout: Option<Duration>,
    /// Maximum number of solver checks, counted on the checker's factory.
    pub max_solver_calls: Option<usize>,
    pub cancel: Option<CancelToken>,
}

impl ResourceLimits {
    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = Some(n);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_solver_calls(mut self, n: usize) -> Self {
        self.max_solver_calls = Some(n);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Limits of one run, polled at waitlist pops and before refinement.
pub struct Budget<'a> {
    limits: &'a ResourceLimits,
    start: Instant,
    solver: Option<&'a dyn SolverFactory>,
    checks_at_start: usize,
}

impl<'a> Budget<'a> {
    pub fn new(limits: &'a ResourceLimits, solver: Option<&'a dyn SolverFactory>) -> Self {
        Self {
            limits,
            start: Instant::now(),
            solver,
            checks_at_start: solver.map_or(0, |s| s.stats().checks),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Solver checks since the budget was created.
    pub fn solver_calls(&self) -> usize {
        self.solver
            .map_or(0, |s| s.stats().checks.saturating_sub(self.checks_at_start))
    }

    pub fn poll(&self) -> Result<()> {
        if self.limits.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Err(CegarError::Cancelled);
        }
        if self.limits.timeout.is_some_and(|t| self.elapsed() >= t) {
            return Err(CegarError::ResourceExhausted(ResourceKind::WallClock));
        }
        if self.limits.max_solver_calls.is_some_and(|n| self.solver_calls() >= n) {
            return Err(CegarError::ResourceExhausted(ResourceKind::SolverCalls));
        }
        Ok(())
    }
}

/// Why a run ended without a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnknownReason {
    Resource(ResourceKind),
    Solver(UnknownCause),
    Cancelled,
    /// Internal defect, including stalled refinement.
    Fatal(CegarError),
}

impl UnknownReason {
    pub fn is_defect(&self) -> bool {
        matches!(self, UnknownReason::Fatal(_))
    }
}

impl From<CegarError> for UnknownReason {
    fn from(e: CegarError) -> Self {
        match e {
            CegarError::ResourceExhausted(kind) => UnknownReason::Resource(kind),
            CegarError::Cancelled => UnknownReason::Cancelled,
            CegarError::SolverUnknown(cause) | CegarError::Solver(SolverError::Incomplete(cause)) => {
                UnknownReason::Solver(cause)
            }
            e => UnknownReason::Fatal(e),
        }
    }
}

impl Display for UnknownReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            UnknownReason::Resource(kind) => write!(f, "{}", kind),
            UnknownReason::Solver(cause) => write!(f, "solver: {}", cause),
            UnknownReason::Cancelled => write!(f, "cancelled"),
            UnknownReason::Fatal(e) => write!(f, "internal error: {}", e),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CegarStatistics {
    pub iterations: usize,
    pub refinements: usize,
    pub arg_size: usize,
    pub arg_depth: usize,
    pub prec_size: usize,
    pub solver_checks: usize,
    pub elapsed: Duration,
}

impl Display for CegarStatistics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} iteration(s), {} refinement(s), ARG {} node(s) / depth {}, precision size {}, {} solver check(s), {:?}",
            self.iterations,
            self.refinements,
            self.arg_size,
            self.arg_depth,
            self.prec_size,
            self.solver_checks,
            self.elapsed
        )
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Verdict {
    Safe,
    Unsafe,
    Unknown,
}

impl Display for Verdict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Safe => write!(f, "SAFE"),
            Verdict::Unsafe => write!(f, "UNSAFE"),
            Verdict::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

#[derive(Debug)]
pub enum SafetyResult<S, A, P> {
    /// The final ARG proves that no target is reachable.
    Safe {
        arg: Arg<S, A>,
        prec: P,
        stats: CegarStatistics,
    },
    /// `concrete` holds one valuation per state of `cex`.
    Unsafe {
        cex: Trace<S, A>,
        concrete: Vec<Valuation>,
        arg: Arg<S, A>,
        prec: P,
        stats: CegarStatistics,
    },
    Unknown {
        reason: UnknownReason,
        stats: CegarStatistics,
    },
}

impl<S, A, P> SafetyResult<S, A, P> {
    pub fn verdict(&self) -> Verdict {
        match self {
            SafetyResult::Safe { .. } => Verdict::Safe,
            SafetyResult::Unsafe { .. } => Verdict::Unsafe,
            SafetyResult::Unknown { .. } => Verdict::Unknown,
        }
    }

    pub fn is_safe(&self) -> bool {
        self.verdict() == Verdict::Safe
    }

    pub fn is_unsafe(&self) -> bool {
        self.verdict() == Verdict::Unsafe
    }

    pub fn is_unknown(&self) -> bool {
        self.verdict() == Verdict::Unknown
    }

    pub fn stats(&self) -> &CegarStatistics {
        match self {
            SafetyResult::Safe { stats, .. }
            | SafetyResult::Unsafe { stats, .. }
            | SafetyResult::Unknown { stats, .. } => stats,
        }
    }

    pub fn unknown_reason(&self) -> Option<&UnknownReason> {
        match self {
            SafetyResult::Unknown { reason, .. } => Some(reason),
            _ => None,
        }
    }

    pub fn cex(&self) -> Option<&Trace<S, A>> {
        match self {
            SafetyResult::Unsafe { cex, .. } => Some(cex),
            _ => None,
        }
    }

    pub fn prec(&self) -> Option<&P> {
        match self {
            SafetyResult::Safe { prec, .. } | SafetyResult::Unsafe { prec, .. } => Some(prec),
            SafetyResult::Unknown { .. } => None,
        }
    }

    pub fn arg(&self) -> Option<&Arg<S, A>> {
        match self {
            SafetyResult::Safe { arg, .. } | SafetyResult::Unsafe { arg, .. } => Some(arg),
            SafetyResult::Unknown { .. } => None,
        }
    }
}

/// What happens to the ARG after a spurious counterexample.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum PruneStrategy {
    /// Prune below the point indicated by the refiner and keep the rest.
    #[default]
    Lazy,
    /// Rebuild from scratch.
    Full,
}

enum Outcome<S, A, P> {
    Safe {
        arg: Arg<S, A>,
        prec: P,
    },
    Unsafe {
        cex: Trace<S, A>,
        concrete: Vec<Valuation>,
        arg: Arg<S, A>,
        prec: P,
    },
}

pub struct CegarChecker<S, A, P> {
    abstractor: Abstractor<S, A, P>,
    refiner: Box<dyn Refiner<S, A, P>>,
    solver: Option<Rc<dyn SolverFactory>>,
    prune: PruneStrategy,
}

impl<S: Clone, A: Clone, P: Prec> CegarChecker<S, A, P> {
    pub fn new(abstractor: Abstractor<S, A, P>, refiner: impl Refiner<S, A, P> + 'static) -> Self {
        Self {
            abstractor,
            refiner: Box::new(refiner),
            solver: None,
            prune: PruneStrategy::default(),
        }
    }

    /// Factory whose checks are counted against the solver call limit and
    /// reported in the statistics.
    pub fn with_solver(mut self, solver: Rc<dyn SolverFactory>) -> Self {
        self.solver = Some(solver);
        self
    }

    pub fn with_prune_strategy(mut self, prune: PruneStrategy) -> Self {
        self.prune = prune;
        self
    }

    pub fn abstractor(&self) -> &Abstractor<S, A, P> {
        &self.abstractor
    }

    pub fn verify(&mut self, prec: P, limits: &ResourceLimits) -> SafetyResult<S, A, P> {
        let solver = self.solver.clone();
        let budget = Budget::new(limits, solver.as_deref());
        let mut stats = CegarStatistics::default();
        let outcome = self.run(prec, limits, &budget, &mut stats);
        stats.elapsed = budget.elapsed();
        stats.solver_checks = budget.solver_calls();

        let res = match outcome {
            Ok(Outcome::Safe { arg, prec }) => SafetyResult::Safe { arg, prec, stats },
            Ok(Outcome::Unsafe {
                cex,
                concrete,
                arg,
                prec,
            }) => SafetyResult::Unsafe {
                cex,
                concrete,
                arg,
                prec,
                stats,
            },
            Err(e) => {
                let reason = UnknownReason::from(e);
                if reason.is_defect() {
                    error!("verification failed: {}", reason);
                }
                SafetyResult::Unknown { reason, stats }
            }
        };
        info!("{} after {}", res.verdict(), res.stats());
        res
    }

    fn run(
        &mut self,
        mut prec: P,
        limits: &ResourceLimits,
        budget: &Budget,
        stats: &mut CegarStatistics,
    ) -> Result<Outcome<S, A, P>> {
        let mut arg = Arg::new();
        let mut version = 0;
        loop {
            if limits.max_iterations.is_some_and(|n| stats.iterations >= n) {
                return Err(CegarError::ResourceExhausted(ResourceKind::Iterations));
            }
            budget.poll()?;
            stats.iterations += 1;
            let iteration = stats.iterations;
            stats.prec_size = prec.size();
            info!("iteration {}: precision of size {}", iteration, prec.size());
            debug!("precision: {}", prec);

            let status = self.abstractor.check(&mut arg, &prec, version, budget)?;
            stats.arg_size = arg.size();
            stats.arg_depth = arg.depth();
            info!("abstraction {}: {} node(s)", status, arg.size());
            match status {
                AbstractorStatus::Exhausted => return Ok(Outcome::Safe { arg, prec }),
                AbstractorStatus::TargetFound => {}
                status => {
                    return Err(CegarError::InconsistentArg(format!(
                        "abstractor returned in state {}",
                        status
                    )))
                }
            }

            let target = arg
                .target_nodes()
                .into_iter()
                .filter_map(|id| arg.node(id).map(|n| (n.depth(), id)))
                .min()
                .map(|(_, id)| id)
                .ok_or_else(|| CegarError::InconsistentArg("no target node".into()))?;
            let cex = Counterexample::from_arg(&arg, target)?;
            debug!("counterexample of length {} ending in {}", cex.trace().length(), target);

            budget.poll()?;
            match self.refiner.refine(cex.trace(), &prec)? {
                RefinerResult::Unsafe { concrete } => {
                    return Ok(Outcome::Unsafe {
                        cex: cex.into_trace(),
                        concrete,
                        arg,
                        prec,
                    });
                }
                RefinerResult::Spurious {
                    prec: refined,
                    prune_index,
                } => {
                    stats.refinements += 1;
                    let nodes = cex.nodes();
                    let prune_index = if refined == prec {
                        let stale = nodes
                            .iter()
                            .position(|&id| arg.node(id).is_some_and(|n| n.prec_version() < version));
                        match stale {
                            Some(i) => {
                                warn!("counterexample built under an older precision, pruning at {}", nodes[i]);
                                i
                            }
                            None => return Err(CegarError::RefinementStalled { iteration }),
                        }
                    } else {
                        version += 1;
                        prec = refined;
                        prune_index.min(nodes.len() - 1)
                    };
                    match self.prune {
                        PruneStrategy::Full => arg.prune_all(),
                        PruneStrategy::Lazy => arg.prune(nodes[prune_index])?,
                    }
                    debug!("{} node(s) left after pruning", arg.size());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use std::cell::RefCell;
    use std::collections::VecDeque;

    use crate::abstractor::tests::{abstractor, NoPrec};
    use crate::analysis::Prec;
    use crate::trace::Trace;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Level(u8);

    impl Display for Level {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            write!(f, "level {}", self.0)
        }
    }

    impl Prec for Level {
        fn join(&self, other: &Self) -> Self {
            Level(self.0.max(other.0))
        }

        fn size(&self) -> usize {
            self.0 as usize
        }
    }

    /// Replays `(precision, prune index)` refinements, then reports the
    /// counterexample as feasible.
    struct Scripted {
        steps: RefCell<VecDeque<(Level, usize)>>,
    }

    impl Scripted {
        fn new(steps: impl IntoIterator<Item = (Level, usize)>) -> Self {
            Self {
                steps: RefCell::new(steps.into_iter().collect()),
            }
        }
    }

    impl Refiner<u8, (), Level> for Scripted {
        fn refine(&self, trace: &Trace<u8, ()>, _: &Level) -> Result<RefinerResult<Level>> {
            Ok(match self.steps.borrow_mut().pop_front() {
                Some((prec, prune_index)) => RefinerResult::Spurious { prec, prune_index },
                None => RefinerResult::Unsafe {
                    concrete: vec![Valuation::new(); trace.states().len()],
                },
            })
        }
    }

    /// Spurious forever, without ever changing the precision.
    struct Stubborn;

    impl Refiner<u8, (), NoPrec> for Stubborn {
        fn refine(&self, _: &Trace<u8, ()>, prec: &NoPrec) -> Result<RefinerResult<NoPrec>> {
            Ok(RefinerResult::Spurious {
                prec: prec.join(prec),
                prune_index: 0,
            })
        }
    }

    struct Feasible;

    impl Refiner<u8, (), NoPrec> for Feasible {
        fn refine(&self, trace: &Trace<u8, ()>, _: &NoPrec) -> Result<RefinerResult<NoPrec>> {
            Ok(RefinerResult::Unsafe {
                concrete: vec![Valuation::new(); trace.states().len()],
            })
        }
    }

    #[test]
    fn test_safe_without_refinement() {
        let mut checker = CegarChecker::new(abstractor(vec![0b1], 4, 7), Stubborn);
        let res = checker.verify(NoPrec, &ResourceLimits::default());
        assert!(res.is_safe());
        assert_eq!(res.stats().iterations, 1);
        assert_eq!(res.stats().refinements, 0);
        assert!(res.arg().is_some_and(|arg| arg.is_safe()));
    }

    #[test]
    fn test_unsafe() {
        let mut checker = CegarChecker::new(abstractor(vec![0b1], 4, 3), Feasible);
        let res = checker.verify(NoPrec, &ResourceLimits::default());
        assert_eq!(res.verdict(), Verdict::Unsafe);
        assert_eq!(res.cex().map(|t| t.length()), Some(3));
    }

    #[test]
    fn test_stalled_refinement_is_a_defect() {
        let mut checker = CegarChecker::new(abstractor(vec![0b1], 4, 2), Stubborn);
        let res = checker.verify(NoPrec, &ResourceLimits::default());
        let reason = res.unknown_reason().cloned();
        assert_eq!(
            reason,
            Some(UnknownReason::Fatal(CegarError::RefinementStalled { iteration: 1 }))
        );
        assert!(reason.is_some_and(|r| r.is_defect()));
    }

    #[test]
    fn test_stale_counterexample_is_pruned() {
        // Refining to level 1 prunes only the target, so the next
        // counterexample runs through nodes built under level 0. The
        // unchanged precision then prunes at the first of them.
        let steps = [(Level(1), 2), (Level(1), 2)];
        let mut checker = CegarChecker::new(abstractor(vec![0b1], 4, 2), Scripted::new(steps));
        let res = checker.verify(Level(0), &ResourceLimits::default());
        assert_eq!(res.verdict(), Verdict::Unsafe, "{:?}", res.unknown_reason());
        assert_eq!(res.stats().iterations, 3);
        assert_eq!(res.stats().refinements, 2);
        assert_eq!(res.prec(), Some(&Level(1)));
        let arg = res.arg().unwrap();
        assert!(arg.nodes().all(|n| n.prec_version() == 1));
        arg.check_well_formed().unwrap();

        // Once everything is rebuilt, the same answer is a stall.
        let steps = [(Level(1), 2), (Level(1), 2), (Level(1), 2)];
        let mut checker = CegarChecker::new(abstractor(vec![0b1], 4, 2), Scripted::new(steps));
        let res = checker.verify(Level(0), &ResourceLimits::default());
        assert_eq!(
            res.unknown_reason(),
            Some(&UnknownReason::Fatal(CegarError::RefinementStalled { iteration: 3 }))
        );
    }

    #[test]
    fn test_zero_iterations() {
        let mut checker = CegarChecker::new(abstractor(vec![0b1], 4, 2), Stubborn);
        let res = checker.verify(NoPrec, &ResourceLimits::default().with_max_iterations(0));
        assert_eq!(
            res.unknown_reason(),
            Some(&UnknownReason::Resource(ResourceKind::Iterations))
        );
        assert_eq!(res.stats().iterations, 0);
    }

    #[test]
    fn test_cancelled() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let limits = ResourceLimits::default().with_cancel_token(cancel.clone());
        let mut checker = CegarChecker::new(abstractor(vec![0b1], 4, 2), Stubborn);
        let res = checker.verify(NoPrec, &limits);
        assert_eq!(res.unknown_reason(), Some(&UnknownReason::Cancelled));
        assert!(!UnknownReason::Cancelled.is_defect());
    }

    #[test]
    fn test_error_mapping() {
        use crate::solver::UnknownCause;
        assert_eq!(
            UnknownReason::from(CegarError::Solver(SolverError::Incomplete(UnknownCause::Timeout))),
            UnknownReason::Solver(UnknownCause::Timeout)
        );
        assert_eq!(
            UnknownReason::from(CegarError::SolverUnknown(UnknownCause::ResourceLimit)),
            UnknownReason::Solver(UnknownCause::ResourceLimit)
        );
        assert!(UnknownReason::from(CegarError::InconsistentArg("x".into())).is_defect());
    }
}
