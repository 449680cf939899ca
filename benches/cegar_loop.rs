//! End-to-end benchmarks of the CEGAR loop.
//!
//! Run with:
//! ```bash
//! cargo bench --bench cegar_loop
//! ```

use std::rc::Rc;

use cegar_rs::abstractor::{Abstractor, CoverageMode};
use cegar_rs::cegar::{CegarChecker, PruneStrategy, ResourceLimits, Verdict};
use cegar_rs::cfa::{self, Cfa, CfaBuilder, Stmt};
use cegar_rs::domain::expl::{self, ExplPrec};
use cegar_rs::domain::pred::{self, PredPrec};
use cegar_rs::expr::{self, VarDecl};
use cegar_rs::refiner::checker::ExprTraceSeqItpChecker;
use cegar_rs::refiner::prec::{ItpRefToExplPrec, ItpRefToPredPrec};
use cegar_rs::refiner::SingleExprTraceRefiner;
use cegar_rs::solver::finite::BddSolverFactory;
use cegar_rs::solver::SolverFactory;
use cegar_rs::types::Type;
use cegar_rs::waitlist::SearchStrategy;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

/// `i := 0; while i < limit { i := i + 1 }`, failing at `i == limit + 1`.
fn counter(limit: i64) -> Cfa {
    let i = VarDecl::new("i", Type::Int);
    let mut builder = CfaBuilder::new("start");
    let start = builder.init_loc();
    let head = builder.create_loc("head");
    let err = builder.create_loc("err");
    builder.set_error_loc(err);
    let stmts = || -> Result<_, cegar_rs::error::FormulaError> {
        Ok([
            vec![Stmt::Assign(i.clone(), expr::int(0))],
            vec![
                Stmt::Assume(expr::lt(i.expr(), expr::int(limit))?),
                Stmt::Assign(i.clone(), expr::add(vec![i.expr(), expr::int(1)])?),
            ],
            vec![Stmt::Assume(expr::eq(i.expr(), expr::int(limit + 1))?)],
        ])
    };
    let [init, step, fail] = stmts().unwrap();
    builder.create_edge(start, head, init).unwrap();
    builder.create_edge(head, head, step).unwrap();
    builder.create_edge(head, err, fail).unwrap();
    builder.build().unwrap()
}

fn verify_expl(cfa: &Cfa, search: SearchStrategy, prune: PruneStrategy) -> Verdict {
    let solver: Rc<dyn SolverFactory> = Rc::new(BddSolverFactory::default());
    let builder = cfa::arg_builder(cfa, expl::analysis(solver.clone(), expr::tt(), None));
    let refiner = SingleExprTraceRefiner::new(
        ExprTraceSeqItpChecker::new(expr::tt(), expr::tt(), solver.clone()),
        ItpRefToExplPrec,
    );
    let abstractor = Abstractor::new(builder).with_search_strategy(search);
    let mut checker = CegarChecker::new(abstractor, refiner)
        .with_solver(solver)
        .with_prune_strategy(prune);
    checker.verify(ExplPrec::empty(), &ResourceLimits::default()).verdict()
}

fn verify_pred(cfa: &Cfa, coverage: CoverageMode) -> Verdict {
    let solver: Rc<dyn SolverFactory> = Rc::new(BddSolverFactory::default());
    let builder = cfa::arg_builder(cfa, pred::analysis(solver.clone(), expr::tt()));
    let refiner = SingleExprTraceRefiner::new(
        ExprTraceSeqItpChecker::new(expr::tt(), expr::tt(), solver.clone()),
        ItpRefToPredPrec,
    );
    let abstractor = Abstractor::new(builder).with_coverage(coverage);
    let mut checker = CegarChecker::new(abstractor, refiner).with_solver(solver);
    checker.verify(PredPrec::empty(), &ResourceLimits::default()).verdict()
}

fn bench_expl_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("expl_search");
    group.sample_size(10);

    let cfa = counter(6);
    for (name, search) in [
        ("bfs", SearchStrategy::Bfs),
        ("dfs", SearchStrategy::Dfs),
        ("random", SearchStrategy::Random { seed: 42 }),
    ] {
        group.bench_with_input(BenchmarkId::new("counter6", name), &search, |b, &search| {
            b.iter(|| verify_expl(&cfa, search, PruneStrategy::Lazy));
        });
    }

    group.finish();
}

fn bench_prune(c: &mut Criterion) {
    let mut group = c.benchmark_group("prune");
    group.sample_size(10);

    for limit in [2, 4, 8] {
        let cfa = counter(limit);
        group.bench_with_input(BenchmarkId::new("lazy", limit), &cfa, |b, cfa| {
            b.iter(|| verify_expl(cfa, SearchStrategy::Bfs, PruneStrategy::Lazy));
        });
        group.bench_with_input(BenchmarkId::new("full", limit), &cfa, |b, cfa| {
            b.iter(|| verify_expl(cfa, SearchStrategy::Bfs, PruneStrategy::Full));
        });
    }

    group.finish();
}

fn bench_pred_coverage(c: &mut Criterion) {
    let mut group = c.benchmark_group("pred_coverage");
    group.sample_size(10);

    let cfa = counter(4);
    for (name, coverage) in [("single", CoverageMode::Single), ("join", CoverageMode::Join)] {
        group.bench_with_input(BenchmarkId::new("counter4", name), &coverage, |b, &coverage| {
            b.iter(|| verify_pred(&cfa, coverage));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_expl_search, bench_prune, bench_pred_coverage);
criterion_main!(benches);
