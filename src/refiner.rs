//! Counterexample analysis.
//!
//! A [`Refiner`] decides whether an abstract counterexample is feasible. If
//! not, it returns a more precise precision together with the index of the
//! earliest state from which the ARG has to be rebuilt.
//!
//! [`SingleExprTraceRefiner`] is composed of a trace checker
//! ([`checker`]), which yields a refutation ([`refutation`]) for infeasible
//! traces, and a precision refiner ([`prec`]) turning that refutation into
//! new tracked information.

pub mod checker;
pub mod prec;
pub mod refutation;

use log::debug;

use crate::analysis::{ExprAction, ExprState, Prec};
use crate::error::Result;
use crate::eval::Valuation;
use crate::refiner::checker::{ExprTraceChecker, ExprTraceStatus};
use crate::refiner::prec::PrecRefiner;
use crate::refiner::refutation::Refutation;
use crate::trace::Trace;

#[derive(Debug, Clone, PartialEq)]
pub enum RefinerResult<P> {
    /// The counterexample is feasible; one valuation per state.
    Unsafe { concrete: Vec<Valuation> },
    Spurious { prec: P, prune_index: usize },
}

pub trait Refiner<S, A, P> {
    fn refine(&self, trace: &Trace<S, A>, prec: &P) -> Result<RefinerResult<P>>;
}

impl<S, A, P, R: Refiner<S, A, P> + ?Sized> Refiner<S, A, P> for Box<R> {
    fn refine(&self, trace: &Trace<S, A>, prec: &P) -> Result<RefinerResult<P>> {
        (**self).refine(trace, prec)
    }
}

/// Refines by checking the whole counterexample as one expression trace.
pub struct SingleExprTraceRefiner<C, PR> {
    checker: C,
    prec_refiner: PR,
}

impl<C, PR> SingleExprTraceRefiner<C, PR> {
    pub fn new(checker: C, prec_refiner: PR) -> Self {
        Self { checker, prec_refiner }
    }
}

impl<S, A, P, C, PR> Refiner<S, A, P> for SingleExprTraceRefiner<C, PR>
where
    S: ExprState,
    A: ExprAction,
    P: Prec,
    C: ExprTraceChecker,
    PR: PrecRefiner<P, C::Refutation>,
{
    fn refine(&self, trace: &Trace<S, A>, prec: &P) -> Result<RefinerResult<P>> {
        match self.checker.check(trace)? {
            ExprTraceStatus::Feasible(concrete) => {
                debug!("counterexample of length {} is feasible", trace.length());
                Ok(RefinerResult::Unsafe { concrete })
            }
            ExprTraceStatus::Infeasible(refutation) => {
                let refined = self.prec_refiner.refine(prec, &refutation);
                debug!(
                    "counterexample of length {} is spurious, precision size {} -> {}",
                    trace.length(),
                    prec.size(),
                    refined.size()
                );
                Ok(RefinerResult::Spurious {
                    prec: refined,
                    prune_index: refutation.prune_index(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::rc::Rc;

    use test_log::test;

    use crate::domain::expl::{ExplPrec, ExplState};
    use crate::domain::pred::PredPrec;
    use crate::domain::tests::TestAction;
    use crate::expr::{self, VarDecl};
    use crate::indexing::VarIndexing;
    use crate::refiner::checker::ExprTraceSeqItpChecker;
    use crate::refiner::prec::{ItpRefToExplPrec, ItpRefToPredPrec};
    use crate::solver::finite::BddSolverFactory;
    use crate::solver::SolverFactory;
    use crate::types::Type;

    /// `b := true; assume !b`
    fn spurious(b: &VarDecl) -> Trace<ExplState, TestAction> {
        Trace::new(
            vec![ExplState::top(); 3],
            vec![
                TestAction {
                    expr: b.primed(),
                    next: VarIndexing::all(0).with_offset(b, 1),
                },
                TestAction {
                    expr: expr::not(b.expr()).unwrap(),
                    next: VarIndexing::all(0),
                },
            ],
        )
    }

    #[test]
    fn test_refine_expl() {
        let b = VarDecl::new("b", Type::Bool);
        let solver: Rc<dyn SolverFactory> = Rc::new(BddSolverFactory::default());
        let refiner = SingleExprTraceRefiner::new(
            ExprTraceSeqItpChecker::new(expr::tt(), expr::tt(), solver),
            ItpRefToExplPrec,
        );
        let res = refiner.refine(&spurious(&b), &ExplPrec::empty()).unwrap();
        assert_eq!(
            res,
            RefinerResult::Spurious {
                prec: ExplPrec::new([b]),
                prune_index: 1,
            }
        );
    }

    #[test]
    fn test_refine_pred_strictly_grows() {
        let b = VarDecl::new("b", Type::Bool);
        let solver: Rc<dyn SolverFactory> = Rc::new(BddSolverFactory::default());
        let refiner = SingleExprTraceRefiner::new(
            ExprTraceSeqItpChecker::new(expr::tt(), expr::tt(), solver),
            ItpRefToPredPrec,
        );
        let old = PredPrec::empty();
        let RefinerResult::Spurious { prec, .. } = refiner.refine(&spurious(&b), &old).unwrap() else {
            panic!("expected a spurious counterexample");
        };
        assert!(prec.size() > old.size());
        assert!(prec.preds().contains(&b.expr()));
    }
}
