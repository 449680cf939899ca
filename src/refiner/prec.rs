//! Turning refutations into precisions.
//!
//! Every refiner returns the join of the old precision and the new
//! information, so precisions only grow.

use log::debug;

use crate::analysis::Prec;
use crate::domain::expl::ExplPrec;
use crate::domain::pred::PredPrec;
use crate::domain::prod::Prod2Prec;
use crate::refiner::refutation::{ItpRefutation, UnsatCoreRefutation};

pub trait PrecRefiner<P, R> {
    fn refine(&self, prec: &P, refutation: &R) -> P;
}

/// Atoms of the interpolants become predicates.
#[derive(Debug, Clone, Copy, Default)]
pub struct ItpRefToPredPrec;

impl PrecRefiner<PredPrec, ItpRefutation> for ItpRefToPredPrec {
    fn refine(&self, prec: &PredPrec, refutation: &ItpRefutation) -> PredPrec {
        let new = PredPrec::new(refutation.atoms());
        debug!("new predicates: {}", new);
        prec.join(&new)
    }
}

/// Variables of the interpolants become tracked.
#[derive(Debug, Clone, Copy, Default)]
pub struct ItpRefToExplPrec;

impl PrecRefiner<ExplPrec, ItpRefutation> for ItpRefToExplPrec {
    fn refine(&self, prec: &ExplPrec, refutation: &ItpRefutation) -> ExplPrec {
        prec.join(&ExplPrec::new(refutation.vars()))
    }
}

/// Variables of the unsat core become tracked.
#[derive(Debug, Clone, Copy, Default)]
pub struct UcRefToExplPrec;

impl PrecRefiner<ExplPrec, UnsatCoreRefutation> for UcRefToExplPrec {
    fn refine(&self, prec: &ExplPrec, refutation: &UnsatCoreRefutation) -> ExplPrec {
        prec.join(&ExplPrec::new(refutation.vars()))
    }
}

/// Refine the first component of a product precision.
#[derive(Debug, Clone, Copy, Default)]
pub struct Prod2FirstRefiner<PR>(pub PR);

impl<P1, P2: Clone, R, PR: PrecRefiner<P1, R>> PrecRefiner<Prod2Prec<P1, P2>, R> for Prod2FirstRefiner<PR> {
    fn refine(&self, prec: &Prod2Prec<P1, P2>, refutation: &R) -> Prod2Prec<P1, P2> {
        Prod2Prec(self.0.refine(&prec.0, refutation), prec.1.clone())
    }
}

/// Refine the second component of a product precision.
#[derive(Debug, Clone, Copy, Default)]
pub struct Prod2SecondRefiner<PR>(pub PR);

impl<P1: Clone, P2, R, PR: PrecRefiner<P2, R>> PrecRefiner<Prod2Prec<P1, P2>, R> for Prod2SecondRefiner<PR> {
    fn refine(&self, prec: &Prod2Prec<P1, P2>, refutation: &R) -> Prod2Prec<P1, P2> {
        Prod2Prec(prec.0.clone(), self.0.refine(&prec.1, refutation))
    }
}
