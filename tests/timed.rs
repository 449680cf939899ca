use std::rc::Rc;

use color_eyre::Result;
use test_log::test;

use cegar_rs::abstractor::{Abstractor, CoverageMode};
use cegar_rs::cegar::{CegarChecker, ResourceLimits, SafetyResult, Verdict};
use cegar_rs::cfa::{self, Cfa, CfaBuilder, CfaEdge, CfaState, Stmt};
use cegar_rs::domain::expl::{self, ExplPrec, ExplState};
use cegar_rs::domain::prod::{self, Prod2Prec, Prod2State};
use cegar_rs::domain::zone::{self, ClockConstraint, ZonePrec, ZoneState};
use cegar_rs::expr::{self, VarDecl};
use cegar_rs::refiner::checker::ExprTraceSeqItpChecker;
use cegar_rs::refiner::prec::{ItpRefToExplPrec, Prod2SecondRefiner};
use cegar_rs::refiner::SingleExprTraceRefiner;
use cegar_rs::solver::finite::BddSolverFactory;
use cegar_rs::solver::SolverFactory;
use cegar_rs::types::Type;

type TimedState = CfaState<Prod2State<ZoneState, ExplState>>;
type TimedPrec = Prod2Prec<ZonePrec, ExplPrec>;

fn verify(cfa: &Cfa) -> SafetyResult<TimedState, CfaEdge, TimedPrec> {
    let solver: Rc<dyn SolverFactory> = Rc::new(BddSolverFactory::default());
    let init_invariants = cfa
        .loc(cfa.init_loc())
        .map(|l| l.invariants().to_vec())
        .unwrap_or_default();
    let inner = prod::analysis(
        zone::analysis(init_invariants, cfa.max_clock_consts()),
        expl::analysis(solver.clone(), expr::tt(), None),
    );
    let refiner = SingleExprTraceRefiner::new(
        ExprTraceSeqItpChecker::new(expr::tt(), expr::tt(), solver.clone()),
        Prod2SecondRefiner(ItpRefToExplPrec),
    );
    let abstractor = Abstractor::new(cfa::arg_builder(cfa, inner)).with_coverage(CoverageMode::Single);
    let mut checker = CegarChecker::new(abstractor, refiner).with_solver(solver);
    checker.verify(
        Prod2Prec(ZonePrec::new(cfa.clocks()), ExplPrec::empty()),
        &ResourceLimits::default(),
    )
}

/// `l0` has invariant `c <= 3`; `l0 -[c >= 2, c := 0]-> l1 -[c >= 1]-> err`
/// and `l0 -[c > 3]-> err`.
fn timed(c: &VarDecl, urgent: bool) -> Result<Cfa> {
    let mut builder = CfaBuilder::new("l0");
    let l0 = builder.init_loc();
    let l1 = builder.create_loc("l1");
    let err = builder.create_loc("err");
    builder.set_error_loc(err);
    builder.add_invariant(l0, ClockConstraint::leq(c, 3));
    if urgent {
        builder.set_urgent(l1);
    }
    builder.create_edge(
        l0,
        l1,
        vec![Stmt::ClockGuard(ClockConstraint::geq(c, 2)), Stmt::ClockReset(c.clone(), 0)],
    )?;
    builder.create_edge(l1, err, vec![Stmt::ClockGuard(ClockConstraint::geq(c, 1))])?;
    builder.create_edge(l0, err, vec![Stmt::ClockGuard(ClockConstraint::gt(c, 3))])?;
    Ok(builder.build()?)
}

#[test]
fn test_time_elapses_to_error() -> Result<()> {
    let c = VarDecl::new("c", Type::Rat);
    let res = verify(&timed(&c, false)?);
    assert_eq!(res.verdict(), Verdict::Unsafe);
    assert_eq!(res.stats().refinements, 0);
    assert_eq!(res.cex().map(|t| t.length()), Some(2));
    Ok(())
}

#[test]
fn test_urgent_location_blocks_delay() -> Result<()> {
    let c = VarDecl::new("c", Type::Rat);
    let res = verify(&timed(&c, true)?);
    assert_eq!(res.verdict(), Verdict::Safe);
    assert_eq!(res.stats().iterations, 1);
    Ok(())
}

#[test]
fn test_data_refinement_under_clocks() -> Result<()> {
    // The clock path to `err` is open, but `x` is 1 there and the last edge
    // needs it to be 0.
    let c = VarDecl::new("c", Type::Rat);
    let x = VarDecl::new("x", Type::Int);
    let mut builder = CfaBuilder::new("l0");
    let l0 = builder.init_loc();
    let l1 = builder.create_loc("l1");
    let err = builder.create_loc("err");
    builder.set_error_loc(err);
    builder.add_invariant(l0, ClockConstraint::leq(&c, 3));
    builder.create_edge(
        l0,
        l1,
        vec![
            Stmt::ClockGuard(ClockConstraint::geq(&c, 2)),
            Stmt::ClockReset(c.clone(), 0),
            Stmt::Assign(x.clone(), expr::int(1)),
        ],
    )?;
    builder.create_edge(
        l1,
        err,
        vec![
            Stmt::ClockGuard(ClockConstraint::geq(&c, 1)),
            Stmt::Assume(expr::eq(x.expr(), expr::int(0))?),
        ],
    )?;
    let cfa = builder.build()?;

    let res = verify(&cfa);
    assert_eq!(res.verdict(), Verdict::Safe);
    assert_eq!(res.stats().iterations, 2);
    assert_eq!(res.stats().refinements, 1);
    let prec = res.prec().expect("safe results carry the precision");
    assert_eq!(prec.0, ZonePrec::new([c]));
    assert_eq!(prec.1, ExplPrec::new([x]));
    Ok(())
}
