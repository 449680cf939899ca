//! Verify a bounded counter loop.
//!
//! ```text
//! i := 0
//! while i < limit { i := i + 1 }
//! ```
//!
//! The error location is reached when `i == bad` at the loop head, so the
//! program is unsafe iff `0 <= bad <= limit`.
//!
//! Run with:
//! ```bash
//! cargo run --example counter -- --limit 5 --bad 7 --domain pred
//! ```

use std::rc::Rc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use color_eyre::Result;
use log::info;

use cegar_rs::abstractor::{Abstractor, CoverageMode};
use cegar_rs::cegar::{CegarChecker, PruneStrategy, ResourceLimits};
use cegar_rs::cfa::{self, Cfa, CfaBuilder, Stmt};
use cegar_rs::domain::expl::{self, ExplPrec};
use cegar_rs::domain::pred::{self, PredPrec};
use cegar_rs::expr::{self, VarDecl};
use cegar_rs::portfolio::{self, Summary, Task};
use cegar_rs::refiner::checker::ExprTraceSeqItpChecker;
use cegar_rs::refiner::prec::{ItpRefToExplPrec, ItpRefToPredPrec};
use cegar_rs::refiner::SingleExprTraceRefiner;
use cegar_rs::solver::finite::BddSolverFactory;
use cegar_rs::solver::SolverFactory;
use cegar_rs::types::Type;
use cegar_rs::waitlist::SearchStrategy;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Domain {
    Expl,
    Pred,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Search {
    Bfs,
    Dfs,
    Random,
}

#[derive(Debug, Clone, Copy, Parser)]
#[command(author, version)]
struct Cli {
    /// Loop bound.
    #[arg(long, value_name = "INT", default_value = "5")]
    limit: i64,

    /// Value of `i` that leads to the error location.
    #[arg(long, value_name = "INT", default_value = "7")]
    bad: i64,

    /// Abstract domain.
    #[arg(long, value_enum, default_value = "expl")]
    domain: Domain,

    /// Search strategy of the abstractor.
    #[arg(long, value_enum, default_value = "bfs")]
    search: Search,

    /// Seed for the random search strategy.
    #[arg(long, value_name = "INT", default_value = "42")]
    seed: u64,

    /// Rebuild the whole ARG after each refinement.
    #[arg(long)]
    full_prune: bool,

    /// Maximum number of CEGAR iterations.
    #[arg(long, value_name = "INT")]
    max_iterations: Option<usize>,

    /// Timeout in seconds.
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Run both domains in parallel instead.
    #[arg(long)]
    portfolio: bool,
}

impl Cli {
    fn search_strategy(&self) -> SearchStrategy {
        match self.search {
            Search::Bfs => SearchStrategy::Bfs,
            Search::Dfs => SearchStrategy::Dfs,
            Search::Random => SearchStrategy::Random { seed: self.seed },
        }
    }

    fn prune_strategy(&self) -> PruneStrategy {
        if self.full_prune {
            PruneStrategy::Full
        } else {
            PruneStrategy::Lazy
        }
    }

    fn limits(&self) -> ResourceLimits {
        let mut limits = ResourceLimits::default();
        if let Some(n) = self.max_iterations {
            limits = limits.with_max_iterations(n);
        }
        if let Some(secs) = self.timeout {
            limits = limits.with_timeout(Duration::from_secs(secs));
        }
        limits
    }
}

fn counter(limit: i64, bad: i64) -> Result<Cfa> {
    let i = VarDecl::new("i", Type::Int);
    let mut builder = CfaBuilder::new("start");
    let start = builder.init_loc();
    let head = builder.create_loc("head");
    let end = builder.create_loc("end");
    let err = builder.create_loc("err");
    builder.set_error_loc(err);

    builder.create_edge(start, head, vec![Stmt::Assign(i.clone(), expr::int(0))])?;
    builder.create_edge(
        head,
        head,
        vec![
            Stmt::Assume(expr::lt(i.expr(), expr::int(limit))?),
            Stmt::Assign(i.clone(), expr::add(vec![i.expr(), expr::int(1)])?),
        ],
    )?;
    builder.create_edge(head, end, vec![Stmt::Assume(expr::geq(i.expr(), expr::int(limit))?)])?;
    builder.create_edge(head, err, vec![Stmt::Assume(expr::eq(i.expr(), expr::int(bad))?)])?;
    Ok(builder.build()?)
}

fn run(args: Cli, domain: Domain) -> Result<Summary> {
    let cfa = counter(args.limit, args.bad)?;
    let solver: Rc<dyn SolverFactory> = Rc::new(BddSolverFactory::default());
    let checker = ExprTraceSeqItpChecker::new(expr::tt(), expr::tt(), solver.clone());
    let limits = args.limits();

    let summary = match domain {
        Domain::Expl => {
            let builder = cfa::arg_builder(&cfa, expl::analysis(solver.clone(), expr::tt(), None));
            let abstractor = Abstractor::new(builder)
                .with_search_strategy(args.search_strategy())
                .with_coverage(CoverageMode::Join);
            let mut cegar = CegarChecker::new(abstractor, SingleExprTraceRefiner::new(checker, ItpRefToExplPrec))
                .with_solver(solver)
                .with_prune_strategy(args.prune_strategy());
            let res = cegar.verify(ExplPrec::empty(), &limits);
            if let Some(cex) = res.cex() {
                println!("counterexample:\n{}", cex);
            }
            if let Some(prec) = res.prec() {
                println!("precision: {}", prec);
            }
            Summary::from(&res)
        }
        Domain::Pred => {
            let builder = cfa::arg_builder(&cfa, pred::analysis(solver.clone(), expr::tt()));
            let abstractor = Abstractor::new(builder)
                .with_search_strategy(args.search_strategy())
                .with_coverage(CoverageMode::Join);
            let mut cegar = CegarChecker::new(abstractor, SingleExprTraceRefiner::new(checker, ItpRefToPredPrec))
                .with_solver(solver)
                .with_prune_strategy(args.prune_strategy());
            let res = cegar.verify(PredPrec::empty(), &limits);
            if let Some(cex) = res.cex() {
                println!("counterexample:\n{}", cex);
            }
            if let Some(prec) = res.prec() {
                println!("precision: {}", prec);
            }
            Summary::from(&res)
        }
    };
    Ok(summary)
}

fn main() -> Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let args = Cli::parse();
    println!("args = {:?}", args);

    if args.portfolio {
        let tasks: Vec<Task<Result<Summary>>> = [Domain::Expl, Domain::Pred]
            .into_iter()
            .map(|domain| Box::new(move || run(args, domain)) as Task<Result<Summary>>)
            .collect();
        for (domain, summary) in [Domain::Expl, Domain::Pred].iter().zip(portfolio::verify_all(tasks)) {
            let summary = summary?;
            println!("{:?}: {} ({})", domain, summary.verdict, summary.stats);
        }
        return Ok(());
    }

    let summary = run(args, args.domain)?;
    info!("statistics: {}", summary.stats);
    match summary.reason {
        Some(reason) => println!("{}: {}", summary.verdict, reason),
        None => println!("{}", summary.verdict),
    }
    Ok(())
}
