//! Product of two domains.
//!
//! Components are combined component-wise. A product state is bottom if
//! either component is; products of products give more components.

use std::fmt::{Display, Formatter};

use crate::analysis::{Analysis, Domain, ExprState, InitFunc, Prec, TransFunc};
use crate::error::Result;
use crate::expr::{self, Expr};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Prod2State<S1, S2>(pub S1, pub S2);

impl<S1: ExprState, S2: ExprState> ExprState for Prod2State<S1, S2> {
    fn to_expr(&self) -> Expr {
        expr::and(vec![self.0.to_expr(), self.1.to_expr()]).unwrap_or_else(|_| expr::ff())
    }
}

impl<S1: Display, S2: Display> Display for Prod2State<S1, S2> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.0, self.1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Prod2Prec<P1, P2>(pub P1, pub P2);

impl<P1: Prec, P2: Prec> Prec for Prod2Prec<P1, P2> {
    fn join(&self, other: &Self) -> Self {
        Prod2Prec(self.0.join(&other.0), self.1.join(&other.1))
    }

    fn size(&self) -> usize {
        self.0.size() + self.1.size()
    }
}

impl<P1: Display, P2: Display> Display for Prod2Prec<P1, P2> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.0, self.1)
    }
}

pub struct Prod2Domain<S1, S2, P1, P2> {
    d1: Box<dyn Domain<S1, P1>>,
    d2: Box<dyn Domain<S2, P2>>,
}

impl<S1: Clone, S2: Clone, P1, P2> Domain<Prod2State<S1, S2>, Prod2Prec<P1, P2>>
    for Prod2Domain<S1, S2, P1, P2>
{
    fn top(&self, prec: &Prod2Prec<P1, P2>) -> Prod2State<S1, S2> {
        Prod2State(self.d1.top(&prec.0), self.d2.top(&prec.1))
    }

    fn is_bottom(&self, state: &Prod2State<S1, S2>) -> bool {
        self.d1.is_bottom(&state.0) || self.d2.is_bottom(&state.1)
    }

    fn is_leq(&self, a: &Prod2State<S1, S2>, b: &Prod2State<S1, S2>, prec: &Prod2Prec<P1, P2>) -> bool {
        if self.is_bottom(a) {
            return true;
        }
        self.d1.is_leq(&a.0, &b.0, &prec.0) && self.d2.is_leq(&a.1, &b.1, &prec.1)
    }

    /// Exact when one component is equal on both sides and the other has
    /// an exact join.
    fn join(
        &self,
        a: &Prod2State<S1, S2>,
        b: &Prod2State<S1, S2>,
        prec: &Prod2Prec<P1, P2>,
    ) -> Option<Prod2State<S1, S2>> {
        let same1 = self.d1.is_leq(&a.0, &b.0, &prec.0) && self.d1.is_leq(&b.0, &a.0, &prec.0);
        let same2 = self.d2.is_leq(&a.1, &b.1, &prec.1) && self.d2.is_leq(&b.1, &a.1, &prec.1);
        if same1 {
            let j2 = self.d2.join(&a.1, &b.1, &prec.1)?;
            Some(Prod2State(a.0.clone(), j2))
        } else if same2 {
            let j1 = self.d1.join(&a.0, &b.0, &prec.0)?;
            Some(Prod2State(j1, a.1.clone()))
        } else {
            None
        }
    }

    fn has_exact_join(&self) -> bool {
        self.d1.has_exact_join() || self.d2.has_exact_join()
    }
}

pub struct Prod2InitFunc<S1, S2, P1, P2> {
    i1: Box<dyn InitFunc<S1, P1>>,
    i2: Box<dyn InitFunc<S2, P2>>,
}

impl<S1: Clone, S2: Clone, P1, P2> InitFunc<Prod2State<S1, S2>, Prod2Prec<P1, P2>>
    for Prod2InitFunc<S1, S2, P1, P2>
{
    fn init_states(&self, prec: &Prod2Prec<P1, P2>) -> Result<Vec<Prod2State<S1, S2>>> {
        let first = self.i1.init_states(&prec.0)?;
        if first.is_empty() {
            return Ok(vec![]);
        }
        let second = self.i2.init_states(&prec.1)?;
        Ok(cartesian(&first, &second))
    }
}

fn cartesian<S1: Clone, S2: Clone>(first: &[S1], second: &[S2]) -> Vec<Prod2State<S1, S2>> {
    first
        .iter()
        .flat_map(|s1| second.iter().map(move |s2| Prod2State(s1.clone(), s2.clone())))
        .collect()
}

pub struct Prod2TransFunc<S1, S2, A, P1, P2> {
    t1: Box<dyn TransFunc<S1, A, P1>>,
    t2: Box<dyn TransFunc<S2, A, P2>>,
}

impl<S1: Clone, S2: Clone, A, P1, P2> TransFunc<Prod2State<S1, S2>, A, Prod2Prec<P1, P2>>
    for Prod2TransFunc<S1, S2, A, P1, P2>
{
    fn succ_states(
        &self,
        state: &Prod2State<S1, S2>,
        action: &A,
        prec: &Prod2Prec<P1, P2>,
    ) -> Result<Vec<Prod2State<S1, S2>>> {
        // No need to compute the second component if the first is empty.
        let first = self.t1.succ_states(&state.0, action, &prec.0)?;
        if first.is_empty() {
            return Ok(vec![]);
        }
        let second = self.t2.succ_states(&state.1, action, &prec.1)?;
        Ok(cartesian(&first, &second))
    }
}

/// Product of two analyses over the same actions.
pub fn analysis<S1, S2, A, P1, P2>(
    first: Analysis<S1, A, P1>,
    second: Analysis<S2, A, P2>,
) -> Analysis<Prod2State<S1, S2>, A, Prod2Prec<P1, P2>>
where
    S1: Clone + 'static,
    S2: Clone + 'static,
    A: 'static,
    P1: 'static,
    P2: 'static,
{
    Analysis {
        domain: Box::new(Prod2Domain {
            d1: first.domain,
            d2: second.domain,
        }),
        init: Box::new(Prod2InitFunc {
            i1: first.init,
            i2: second.init,
        }),
        trans: Box::new(Prod2TransFunc {
            t1: first.trans,
            t2: second.trans,
        }),
    }
}
