//! Symbolic transition systems.
//!
//! An [`Sts`] is given by an initial condition over the state variables, a
//! transition relation over current (`x`) and next (`prime(x)`) values and a
//! property that should hold in every reachable state. Every step takes the
//! single action [`StsAction`], so each variable moves to its next version;
//! a variable the relation does not constrain takes an arbitrary value.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

use crate::analysis::{ExprAction, ExprStatePredicate, Lts};
use crate::error::FormulaError;
use crate::expr::{self, Expr, VarDecl};
use crate::indexing::VarIndexing;
use crate::solver::SolverFactory;
use crate::types::Type;

#[derive(Debug, Clone)]
pub struct Sts {
    vars: BTreeSet<VarDecl>,
    init: Expr,
    trans: Expr,
    prop: Expr,
}

fn expect_state_formula(what: &'static str, e: &Expr) -> Result<(), FormulaError> {
    if !e.ty().is_bool() {
        return Err(FormulaError::TypeMismatch {
            op: what,
            expected: Type::Bool.to_string(),
            found: e.ty().clone(),
        });
    }
    if e.has_prime() {
        return Err(FormulaError::UnexpectedPrime(what.to_string()));
    }
    Ok(())
}

impl Sts {
    pub fn new(init: Expr, trans: Expr, prop: Expr) -> Result<Self, FormulaError> {
        expect_state_formula("init", &init)?;
        expect_state_formula("prop", &prop)?;
        if !trans.ty().is_bool() {
            return Err(FormulaError::TypeMismatch {
                op: "trans",
                expected: Type::Bool.to_string(),
                found: trans.ty().clone(),
            });
        }
        let vars = [&init, &trans, &prop].iter().flat_map(|e| e.vars()).collect();
        Ok(Self {
            vars,
            init,
            trans,
            prop,
        })
    }

    pub fn vars(&self) -> &BTreeSet<VarDecl> {
        &self.vars
    }

    pub fn init(&self) -> &Expr {
        &self.init
    }

    pub fn trans(&self) -> &Expr {
        &self.trans
    }

    pub fn prop(&self) -> &Expr {
        &self.prop
    }

    pub fn action(&self) -> StsAction {
        StsAction {
            trans: self.trans.clone(),
        }
    }

    pub fn lts(&self) -> StsLts {
        StsLts { action: self.action() }
    }

    /// States violating the property.
    pub fn target(&self, solver: Rc<dyn SolverFactory>) -> Result<ExprStatePredicate, FormulaError> {
        Ok(ExprStatePredicate::new(self.negated_prop()?, solver))
    }

    pub fn negated_prop(&self) -> Result<Expr, FormulaError> {
        expr::not(self.prop.clone())
    }
}

#[derive(Debug, Clone)]
pub struct StsAction {
    trans: Expr,
}

impl ExprAction for StsAction {
    fn to_expr(&self) -> Expr {
        self.trans.clone()
    }

    fn next_indexing(&self) -> VarIndexing {
        VarIndexing::all(1)
    }
}

impl Display for StsAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "trans")
    }
}

pub struct StsLts {
    action: StsAction,
}

impl<S> Lts<S, StsAction> for StsLts {
    fn enabled_actions(&self, _state: &S) -> Vec<StsAction> {
        vec![self.action.clone()]
    }
}
