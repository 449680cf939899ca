use std::collections::{BTreeSet, VecDeque};
use std::rc::Rc;

use proptest::prelude::*;

use cegar_rs::abstractor::{Abstractor, AbstractorStatus, CoverageMode, StopCriterion};
use cegar_rs::analysis::{Domain, TransFunc};
use cegar_rs::arg::Arg;
use cegar_rs::cegar::{Budget, CegarChecker, PruneStrategy, ResourceLimits, SafetyResult, UnknownReason, Verdict};
use cegar_rs::cfa::{self, Cfa, CfaBuilder, CfaEdge, CfaState, Stmt};
use cegar_rs::domain::expl::{self, ExplDomain, ExplPrec, ExplState, ExplTransFunc};
use cegar_rs::eval::{Valuation, Value};
use cegar_rs::expr::{self, Expr, VarDecl};
use cegar_rs::refiner::checker::{ExprTraceBinItpChecker, ExprTraceSeqItpChecker};
use cegar_rs::refiner::prec::ItpRefToExplPrec;
use cegar_rs::refiner::{Refiner, SingleExprTraceRefiner};
use cegar_rs::solver::finite::{BddSolverConfig, BddSolverFactory};
use cegar_rs::solver::{SolverFactory, UnknownCause};
use cegar_rs::types::Type;
use cegar_rs::waitlist::SearchStrategy;

/// Integer range of the solver.
const LO: i64 = -4;
const HI: i64 = 4;
/// Initial values of `x`.
const INIT: std::ops::RangeInclusive<i64> = -3..=3;

/// Statement of a random edge over the single variable `x`.
#[derive(Debug, Clone, Copy)]
enum Op {
    Set(i64),
    Inc,
    Eq(i64),
    Lt(i64),
    Skip,
}

impl Op {
    fn stmt(self, x: &VarDecl) -> Stmt {
        match self {
            Op::Set(k) => Stmt::Assign(x.clone(), expr::int(k)),
            Op::Inc => Stmt::Assign(
                x.clone(),
                expr::add(vec![x.expr(), expr::int(1)]).expect("well-typed"),
            ),
            Op::Eq(k) => Stmt::Assume(expr::eq(x.expr(), expr::int(k)).expect("well-typed")),
            Op::Lt(k) => Stmt::Assume(expr::lt(x.expr(), expr::int(k)).expect("well-typed")),
            Op::Skip => Stmt::Assume(expr::tt()),
        }
    }

    /// Concrete successor of `x`. Values above `HI` are all `HI + 1`, since
    /// no constant of an edge tells them apart.
    fn apply(self, x: i64) -> Option<i64> {
        match self {
            Op::Set(k) => Some(k),
            Op::Inc => Some((x + 1).min(HI + 1)),
            Op::Eq(k) => (x == k).then_some(x),
            Op::Lt(k) => (x < k).then_some(x),
            Op::Skip => Some(x),
        }
    }
}

/// Locations `0..n`, where `n` is the error location.
#[derive(Debug, Clone)]
struct Model {
    n: usize,
    edges: Vec<(usize, usize, Op)>,
}

impl Model {
    fn to_cfa(&self, x: &VarDecl) -> Cfa {
        let mut builder = CfaBuilder::new("l0");
        let mut locs = vec![builder.init_loc()];
        for i in 1..self.n {
            locs.push(builder.create_loc(format!("l{}", i)));
        }
        let err = builder.create_loc("err");
        builder.set_error_loc(err);
        locs.push(err);
        for &(src, tgt, op) in &self.edges {
            builder
                .create_edge(locs[src], locs[tgt], vec![op.stmt(x)])
                .expect("well-typed");
        }
        builder.build().expect("well-typed")
    }

    /// Explicit-state search over all initial values of `x`: whether the
    /// error location is reachable, and whether some reachable value lies
    /// above the integer range of the solver.
    fn explore(&self) -> (bool, bool) {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<(usize, i64)> = INIT.map(|x| (0, x)).collect();
        let mut reachable = false;
        let mut leaves_range = false;
        while let Some((loc, x)) = queue.pop_front() {
            if !seen.insert((loc, x)) {
                continue;
            }
            leaves_range |= x > HI;
            if loc == self.n {
                reachable = true;
                continue;
            }
            for &(src, tgt, op) in &self.edges {
                if src == loc {
                    if let Some(y) = op.apply(x) {
                        queue.push_back((tgt, y));
                    }
                }
            }
        }
        (reachable, leaves_range)
    }
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (-3i64..=3).prop_map(Op::Set),
        Just(Op::Inc),
        (-3i64..=3).prop_map(Op::Eq),
        (-3i64..=3).prop_map(Op::Lt),
        Just(Op::Skip),
    ]
}

fn model() -> impl Strategy<Value = Model> {
    (2usize..5).prop_flat_map(|n| {
        prop::collection::vec((0..n, 0..=n, op()), 1..8).prop_map(move |edges| Model { n, edges })
    })
}

/// Forward edges only, so every path is finite.
fn acyclic_model() -> impl Strategy<Value = Model> {
    (2usize..5).prop_flat_map(|n| {
        prop::collection::vec((0..n, 1..=n, op()), 1..8).prop_map(move |edges| Model {
            n,
            edges: edges.into_iter().filter(|&(src, tgt, _)| src < tgt).collect(),
        })
    })
}

fn strategy() -> impl Strategy<Value = SearchStrategy> {
    prop_oneof![
        Just(SearchStrategy::Bfs),
        Just(SearchStrategy::Dfs),
        any::<u64>().prop_map(|seed| SearchStrategy::Random { seed }),
    ]
}

type Res = SafetyResult<CfaState<ExplState>, CfaEdge, ExplPrec>;

struct Config {
    search: SearchStrategy,
    coverage: CoverageMode,
    prune: PruneStrategy,
    binary: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search: SearchStrategy::Bfs,
            coverage: CoverageMode::Single,
            prune: PruneStrategy::Lazy,
            binary: false,
        }
    }
}

fn solver() -> Rc<dyn SolverFactory> {
    Rc::new(BddSolverFactory::new(
        BddSolverConfig::default().with_default_int_range(LO, HI),
    ))
}

/// Solver that trusts its integer range.
fn bounded_solver() -> Rc<dyn SolverFactory> {
    Rc::new(BddSolverFactory::new(
        BddSolverConfig::default()
            .with_default_int_range(LO, HI)
            .with_range_margin(0),
    ))
}

fn init(x: &VarDecl) -> Expr {
    expr::and(vec![
        expr::leq(expr::int(*INIT.start()), x.expr()).expect("well-typed"),
        expr::leq(x.expr(), expr::int(*INIT.end())).expect("well-typed"),
    ])
    .expect("well-typed")
}

fn verify(cfa: &Cfa, x: &VarDecl, config: Config) -> Res {
    let solver = solver();
    let builder = cfa::arg_builder(cfa, expl::analysis(solver.clone(), init(x), None));
    let abstractor = Abstractor::new(builder)
        .with_search_strategy(config.search)
        .with_coverage(config.coverage);
    let refiner: Box<dyn Refiner<CfaState<ExplState>, CfaEdge, ExplPrec>> = if config.binary {
        Box::new(SingleExprTraceRefiner::new(
            ExprTraceBinItpChecker::new(init(x), expr::tt(), solver.clone()),
            ItpRefToExplPrec,
        ))
    } else {
        Box::new(SingleExprTraceRefiner::new(
            ExprTraceSeqItpChecker::new(init(x), expr::tt(), solver.clone()),
            ItpRefToExplPrec,
        ))
    };
    let mut checker = CegarChecker::new(abstractor, refiner)
        .with_solver(solver)
        .with_prune_strategy(config.prune);
    checker.verify(ExplPrec::empty(), &ResourceLimits::default().with_max_iterations(50))
}

/// The counterexample follows edges of the CFA from the initial to the
/// error location.
fn check_cex(cfa: &Cfa, res: &Res) {
    let cex = res.cex().expect("unsafe results carry the counterexample");
    let states = cex.states();
    assert_eq!(states[0].loc, cfa.init_loc());
    assert_eq!(Some(states[states.len() - 1].loc), cfa.error_loc());
    for (i, edge) in cex.actions().iter().enumerate() {
        assert_eq!(edge.source(), states[i].loc);
        assert_eq!(edge.target(), states[i + 1].loc);
    }
}

fn expected(m: &Model) -> Verdict {
    if m.explore().0 {
        Verdict::Unsafe
    } else {
        Verdict::Safe
    }
}

/// The verdict is the expected one, unless `x` leaves the integer range of
/// the solver and the result says so.
fn check_verdict(m: &Model, res: &Res) -> Result<(), TestCaseError> {
    let range = UnknownReason::Solver(UnknownCause::Unsupported("integer range".into()));
    if m.explore().1 && res.unknown_reason() == Some(&range) {
        return Ok(());
    }
    prop_assert_eq!(res.verdict(), expected(m), "{:?}", res.unknown_reason());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn verdict_matches_explicit_search(m in model()) {
        let x = VarDecl::new("x", Type::Int);
        let cfa = m.to_cfa(&x);
        let res = verify(&cfa, &x, Config::default());
        check_verdict(&m, &res)?;
        match res.verdict() {
            Verdict::Unsafe => check_cex(&cfa, &res),
            Verdict::Unknown => {}
            Verdict::Safe => {
                let arg = res.arg().expect("safe results carry the ARG");
                prop_assert!(arg.is_safe());
                prop_assert!(arg.check_well_formed().is_ok());
            }
        }
    }

    #[test]
    fn verdict_independent_of_search_order(m in model(), search in strategy()) {
        let x = VarDecl::new("x", Type::Int);
        let cfa = m.to_cfa(&x);
        let res = verify(&cfa, &x, Config { search, ..Config::default() });
        check_verdict(&m, &res)?;
    }

    #[test]
    fn refinement_never_stalls(m in model(), binary in any::<bool>(), full in any::<bool>()) {
        let x = VarDecl::new("x", Type::Int);
        let cfa = m.to_cfa(&x);
        let prune = if full { PruneStrategy::Full } else { PruneStrategy::Lazy };
        let res = verify(&cfa, &x, Config { binary, prune, ..Config::default() });
        prop_assert!(!res.unknown_reason().is_some_and(|r| r.is_defect()), "{:?}", res.unknown_reason());
        check_verdict(&m, &res)?;
        // Only `x` can ever be learned.
        prop_assert!(res.prec().map_or(true, |p| p.vars().len() <= 1));
    }

    #[test]
    fn join_coverage_keeps_verdict(m in model()) {
        let x = VarDecl::new("x", Type::Int);
        let cfa = m.to_cfa(&x);
        let res = verify(&cfa, &x, Config { coverage: CoverageMode::Join, ..Config::default() });
        check_verdict(&m, &res)?;
    }

    #[test]
    fn transfer_is_monotone(
        a in prop::collection::vec(prop::option::of(-3i64..=3), 2),
        forget in prop::collection::vec(any::<bool>(), 2),
        op in op(),
        on_y in any::<bool>(),
    ) {
        let x = VarDecl::new("x", Type::Int);
        let y = VarDecl::new("y", Type::Int);
        let vars = [x.clone(), y.clone()];
        let mut va = Valuation::new();
        let mut vb = Valuation::new();
        for (i, v) in vars.iter().enumerate() {
            if let Some(k) = a[i] {
                va.put_var(v, Value::Int(k));
                if !forget[i] {
                    vb.put_var(v, Value::Int(k));
                }
            }
        }
        let (sa, sb) = (ExplState::Val(va), ExplState::Val(vb));
        let prec = ExplPrec::new(vars.clone());
        prop_assert!(ExplDomain.is_leq(&sa, &sb, &prec));

        let edge_var = if on_y { &y } else { &x };
        let cfa = Model { n: 1, edges: vec![(0, 1, op)] }.to_cfa(edge_var);
        let edge = &cfa.edges()[0];
        let trans = ExplTransFunc::new(bounded_solver()).with_max_enum(None);
        let succ_a = trans.succ_states(&sa, edge, &prec).expect("transfer succeeds");
        let succ_b = trans.succ_states(&sb, edge, &prec).expect("transfer succeeds");
        for s in &succ_a {
            prop_assert!(
                succ_b.iter().any(|t| ExplDomain.is_leq(s, t, &prec)),
                "{} has no cover among {:?}", s, succ_b
            );
        }
    }

    #[test]
    fn pruning_loses_no_states(m in acyclic_model(), at in any::<prop::sample::Index>()) {
        let x = VarDecl::new("x", Type::Int);
        let cfa = m.to_cfa(&x);
        let prec = ExplPrec::new([x.clone()]);
        let limits = ResourceLimits::default();
        let budget = Budget::new(&limits, None);
        let solver = bounded_solver();
        let mut abstractor = Abstractor::new(cfa::arg_builder(&cfa, expl::analysis(solver.clone(), expr::tt(), None)))
            .with_stop_criterion(StopCriterion::FullExploration)
            .with_coverage(CoverageMode::None);

        let mut scratch = Arg::new();
        let status = abstractor.check(&mut scratch, &prec, 0, &budget).expect("exploration succeeds");
        prop_assert_ne!(status, AbstractorStatus::Idle);
        let expected: BTreeSet<String> = scratch.nodes().map(|n| n.state().to_string()).collect();

        let mut arg = Arg::new();
        abstractor.check(&mut arg, &prec, 0, &budget).expect("exploration succeeds");
        let ids: Vec<_> = arg.nodes().map(|n| n.id()).collect();
        arg.prune(ids[at.index(ids.len())]).expect("node exists");
        abstractor.check(&mut arg, &prec, 0, &budget).expect("exploration succeeds");
        arg.check_well_formed().expect("well-formed after pruning");
        let rebuilt: BTreeSet<String> = arg.nodes().map(|n| n.state().to_string()).collect();
        prop_assert!(rebuilt.is_superset(&expected));
    }
}
