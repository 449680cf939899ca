//! Feasibility checks of abstract traces.
//!
//! A trace `s0 -a0-> s1 ... sn` is encoded as a sequence of step formulas
//! over time-indexed symbols:
//!
//! - step 0: `init ∧ s0` at indexing `idx_0 = 0`,
//! - step i+1: `a_i` at `idx_i` and `s_{i+1}` at `idx_{i+1} = idx_i + next(a_i)`,
//! - a final step with the target condition at `idx_n`.
//!
//! The conjunction of the steps is satisfiable iff the trace is feasible.

use std::collections::BTreeSet;
use std::rc::Rc;

use log::debug;

use crate::analysis::{ExprAction, ExprState};
use crate::error::Result;
use crate::eval::Valuation;
use crate::expr::{self, Expr, Symbol, VarDecl};
use crate::indexing::{fold_in, unfold, VarIndexing};
use crate::refiner::refutation::{ItpRefutation, Refutation, UnsatCoreRefutation};
use crate::solver::{SessionTheme, SolverFactory};
use crate::trace::Trace;

#[derive(Debug, Clone, PartialEq)]
pub enum ExprTraceStatus<R> {
    /// One valuation per state.
    Feasible(Vec<Valuation>),
    Infeasible(R),
}

impl<R> ExprTraceStatus<R> {
    pub fn is_feasible(&self) -> bool {
        matches!(self, ExprTraceStatus::Feasible(_))
    }
}

pub trait ExprTraceChecker {
    type Refutation: Refutation;

    fn check<S: ExprState, A: ExprAction>(&self, trace: &Trace<S, A>) -> Result<ExprTraceStatus<Self::Refutation>>;
}

struct PathEncoding {
    /// States, then the target.
    steps: Vec<Expr>,
    indexings: Vec<VarIndexing>,
    vars: BTreeSet<VarDecl>,
}

impl PathEncoding {
    fn new<S: ExprState, A: ExprAction>(init: &Expr, target: &Expr, trace: &Trace<S, A>) -> Result<Self> {
        let states = trace.states();
        let mut idx = VarIndexing::all(0);
        let mut steps = vec![unfold(&expr::and(vec![init.clone(), states[0].to_expr()])?, &idx)];
        let mut indexings = vec![idx.clone()];
        for (action, state) in trace.actions().iter().zip(&states[1..]) {
            let next = idx.add(&action.next_indexing());
            steps.push(expr::and(vec![
                unfold(&action.to_expr(), &idx),
                unfold(&state.to_expr(), &next),
            ])?);
            indexings.push(next.clone());
            idx = next;
        }
        steps.push(unfold(target, &idx));
        let vars = steps.iter().flat_map(|s| s.vars()).collect();
        Ok(Self {
            steps,
            indexings,
            vars,
        })
    }

    fn states(&self) -> usize {
        self.indexings.len()
    }

    /// Values of the variables at each state of the path.
    fn concrete(&self, model: &Valuation) -> Vec<Valuation> {
        self.indexings
            .iter()
            .map(|idx| {
                self.vars
                    .iter()
                    .filter_map(|v| {
                        let value = model.get(&Symbol::indexed(v.clone(), idx.get(v)))?;
                        Some((Symbol::var(v.clone()), value.clone()))
                    })
                    .collect()
            })
            .collect()
    }
}

/// First state that does not already imply its interpolant.
fn first_not_entailed<S: ExprState>(
    solver: &dyn SolverFactory,
    states: &[S],
    itps: &[Expr],
) -> Result<usize> {
    for (i, (state, itp)) in states.iter().zip(itps).enumerate() {
        if itp.is_true() {
            continue;
        }
        let mut session = solver.open_session(SessionTheme::plain());
        let query = expr::and(vec![state.to_expr(), expr::not(itp.clone())?])?;
        session.add(&unfold(&query, &VarIndexing::all(0)))?;
        if session.check().decided()? {
            return Ok(i);
        }
    }
    Ok(itps.len().saturating_sub(1))
}

/// Sequence interpolation over all prefixes of the trace.
pub struct ExprTraceSeqItpChecker {
    init: Expr,
    target: Expr,
    solver: Rc<dyn SolverFactory>,
}

impl ExprTraceSeqItpChecker {
    pub fn new(init: Expr, target: Expr, solver: Rc<dyn SolverFactory>) -> Self {
        Self { init, target, solver }
    }
}

impl ExprTraceChecker for ExprTraceSeqItpChecker {
    type Refutation = ItpRefutation;

    fn check<S: ExprState, A: ExprAction>(&self, trace: &Trace<S, A>) -> Result<ExprTraceStatus<ItpRefutation>> {
        let path = PathEncoding::new(&self.init, &self.target, trace)?;
        let mut session = self.solver.open_session(SessionTheme::interpolating());
        let mut markers = Vec::with_capacity(path.steps.len());
        for step in &path.steps {
            let marker = session.create_marker()?;
            session.add_to(marker, step)?;
            markers.push(marker);
        }
        if session.check().decided()? {
            return Ok(ExprTraceStatus::Feasible(path.concrete(&session.model()?)));
        }
        let mut itps = Vec::with_capacity(path.states());
        for i in 0..path.states() {
            let itp = session.interpolant(&markers[..=i])?;
            itps.push(fold_in(&itp, &path.indexings[i]));
        }
        let prune = first_not_entailed(self.solver.as_ref(), trace.states(), &itps)?;
        let refutation = ItpRefutation::new(itps, prune);
        debug!("sequence interpolants: {}", refutation);
        Ok(ExprTraceStatus::Infeasible(refutation))
    }
}

/// Binary interpolation at the first step that makes the prefix infeasible.
///
/// States before the interpolant get `true`, states after it `false`.
pub struct ExprTraceBinItpChecker {
    init: Expr,
    target: Expr,
    solver: Rc<dyn SolverFactory>,
}

impl ExprTraceBinItpChecker {
    pub fn new(init: Expr, target: Expr, solver: Rc<dyn SolverFactory>) -> Self {
        Self { init, target, solver }
    }
}

impl ExprTraceChecker for ExprTraceBinItpChecker {
    type Refutation = ItpRefutation;

    fn check<S: ExprState, A: ExprAction>(&self, trace: &Trace<S, A>) -> Result<ExprTraceStatus<ItpRefutation>> {
        let path = PathEncoding::new(&self.init, &self.target, trace)?;
        let mut session = self.solver.open_session(SessionTheme::interpolating());
        let mut markers = Vec::with_capacity(path.steps.len());
        let mut infeasible_at = None;
        for (k, step) in path.steps.iter().enumerate() {
            let marker = session.create_marker()?;
            session.add_to(marker, step)?;
            markers.push(marker);
            if !session.check().decided()? {
                infeasible_at = Some(k);
                break;
            }
        }
        let Some(k) = infeasible_at else {
            return Ok(ExprTraceStatus::Feasible(path.concrete(&session.model()?)));
        };

        let n = path.states();
        let mut itps = vec![expr::tt(); n];
        if k > 0 {
            let itp = session.interpolant(&markers[..k])?;
            itps[k - 1] = fold_in(&itp, &path.indexings[k - 1]);
        }
        for itp in itps.iter_mut().skip(k) {
            *itp = expr::ff();
        }
        let prune = first_not_entailed(self.solver.as_ref(), trace.states(), &itps)?;
        let refutation = ItpRefutation::new(itps, prune);
        debug!("binary interpolant at step {}: {}", k, refutation);
        Ok(ExprTraceStatus::Infeasible(refutation))
    }
}

/// Unsat core over the steps of the trace.
pub struct ExprTraceUnsatCoreChecker {
    init: Expr,
    target: Expr,
    solver: Rc<dyn SolverFactory>,
}

impl ExprTraceUnsatCoreChecker {
    pub fn new(init: Expr, target: Expr, solver: Rc<dyn SolverFactory>) -> Self {
        Self { init, target, solver }
    }
}

impl ExprTraceChecker for ExprTraceUnsatCoreChecker {
    type Refutation = UnsatCoreRefutation;

    fn check<S: ExprState, A: ExprAction>(
        &self,
        trace: &Trace<S, A>,
    ) -> Result<ExprTraceStatus<UnsatCoreRefutation>> {
        let path = PathEncoding::new(&self.init, &self.target, trace)?;
        let mut session = self.solver.open_session(SessionTheme::incremental());
        for step in &path.steps {
            session.track(step)?;
        }
        if session.check().decided()? {
            return Ok(ExprTraceStatus::Feasible(path.concrete(&session.model()?)));
        }
        let core = session.unsat_core()?;
        let prune = path
            .steps
            .iter()
            .position(|step| core.contains(step))
            .unwrap_or(0)
            .min(path.states() - 1);
        let refutation = UnsatCoreRefutation::new(core, prune);
        debug!("{}", refutation);
        Ok(ExprTraceStatus::Infeasible(refutation))
    }
}
