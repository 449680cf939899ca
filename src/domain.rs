//! Abstract domains.
//!
//! - [`expl`]: explicit values of tracked variables.
//! - [`pred`]: boolean abstraction over tracked predicates.
//! - [`zone`]: difference bound matrices over tracked clocks.
//! - [`prod`]: products of two domains.

pub mod expl;
pub mod pred;
pub mod prod;
pub mod zone;

use log::warn;

use crate::error::Result;
use crate::eval::{eq_value, Valuation};
use crate::expr::{self, Symbol};
use crate::solver::{ScopedPush, Solver};

/// Distinct projections of the models of the asserted formula onto
/// `symbols`, or `None` if there are more than `limit` of them.
///
/// Symbols that do not occur in the assertions are left out of the
/// projections. The solver's assertions are unchanged afterwards.
pub(crate) fn all_sat(
    solver: &mut dyn Solver,
    symbols: &[Symbol],
    limit: Option<usize>,
) -> Result<Option<Vec<Valuation>>> {
    let mut res = Vec::new();
    let mut scoped = ScopedPush::new(solver);
    while scoped.check().decided()? {
        let model = scoped.model()?;
        let projection: Valuation = symbols
            .iter()
            .filter_map(|s| model.get(s).map(|v| (s.clone(), v.clone())))
            .collect();
        if projection.is_empty() {
            res.push(projection);
            break;
        }
        scoped.add(&expr::not(projection.to_expr())?)?;
        res.push(projection);
        if limit.is_some_and(|n| res.len() > n) {
            warn!("more than {} abstract successors", res.len() - 1);
            return Ok(None);
        }
    }
    Ok(Some(res))
}

/// Symbols that have the same value in every model. The formula must be
/// satisfiable.
pub(crate) fn determined(solver: &mut dyn Solver, symbols: &[Symbol]) -> Result<Valuation> {
    if !solver.check().decided()? {
        return Ok(Valuation::new());
    }
    let model = solver.model()?;
    let mut res = Valuation::new();
    for s in symbols {
        let Some(value) = model.get(s) else {
            continue;
        };
        let mut scoped = ScopedPush::new(&mut *solver);
        scoped.add(&expr::not(eq_value(s, value))?)?;
        // An inconclusive answer leaves the symbol undetermined.
        if scoped.check().is_unsat() {
            res.insert(s.clone(), value.clone());
        }
    }
    Ok(res)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use test_log::test;

    use crate::analysis::ExprAction;
    use crate::expr::{Expr, VarDecl};
    use crate::indexing::VarIndexing;
    use crate::solver::finite::BddSolverFactory;
    use crate::solver::{SessionTheme, SolverFactory};
    use crate::types::Type;

    /// A bare action for domain tests.
    #[derive(Debug, Clone)]
    pub(crate) struct TestAction {
        pub expr: Expr,
        pub next: VarIndexing,
    }

    impl TestAction {
        /// `vars' = ...` style action where every variable moves to index 1.
        pub(crate) fn step(expr: Expr) -> Self {
            Self {
                expr,
                next: VarIndexing::all(1),
            }
        }
    }

    impl std::fmt::Display for TestAction {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.expr)
        }
    }

    impl ExprAction for TestAction {
        fn to_expr(&self) -> Expr {
            self.expr.clone()
        }

        fn next_indexing(&self) -> VarIndexing {
            self.next.clone()
        }
    }

    #[test]
    fn test_all_sat_limit() {
        let x = VarDecl::new("x", Type::Int);
        let factory = BddSolverFactory::default();
        let mut solver = factory.open_session(SessionTheme::plain());
        let range = expr::and(vec![
            expr::geq(x.expr(), expr::int(0)).unwrap(),
            expr::lt(x.expr(), expr::int(3)).unwrap(),
        ])
        .unwrap();
        solver.add(&range).unwrap();
        let symbols = vec![Symbol::var(x.clone())];
        let all = all_sat(solver.as_mut(), &symbols, None).unwrap().unwrap();
        assert_eq!(all.len(), 3);
        assert!(all_sat(solver.as_mut(), &symbols, Some(2)).unwrap().is_none());
        // The blocking clauses are gone.
        assert_eq!(solver.assertions(), vec![range]);
    }

    #[test]
    fn test_determined() {
        let x = VarDecl::new("x", Type::Int);
        let y = VarDecl::new("y", Type::Int);
        let factory = BddSolverFactory::default();
        let mut solver = factory.open_session(SessionTheme::plain());
        solver.add(&expr::eq(x.expr(), expr::int(4)).unwrap()).unwrap();
        solver.add(&expr::gt(y.expr(), x.expr()).unwrap()).unwrap();
        let symbols = vec![Symbol::var(x.clone()), Symbol::var(y.clone())];
        let val = determined(solver.as_mut(), &symbols).unwrap();
        assert_eq!(val.get_var(&x), Some(&crate::eval::Value::Int(4)));
        assert_eq!(val.get_var(&y), None);
    }
}
