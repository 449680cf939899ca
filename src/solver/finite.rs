//! Finite-domain solver backend on top of the BDD manager.
//!
//! Decides quantifier-free formulas over booleans, bounded integers and
//! small bitvectors by compiling them into BDDs (see
//! [`encoding`][crate::solver::encoding]). Interpolants are *strongest*
//! interpolants, `∃(local symbols of A). A`, so sequence interpolants
//! computed from prefixes are inductive along the sequence.
//!
//! Integers live in configured ranges. An UNSAT answer is confirmed over
//! ranges widened by [`range_margin`][BddSolverConfig::range_margin] and
//! stretched over the literals of the query; a solution found there means
//! the configured ranges cut off a real solution, and the answer becomes
//! `UNKNOWN` instead.
//!
//! ```
//! use cegar_rs::expr::{self, VarDecl};
//! use cegar_rs::solver::finite::BddSolverFactory;
//! use cegar_rs::solver::{SessionTheme, SolverFactory, SolverStatus};
//! use cegar_rs::types::Type;
//!
//! let x = VarDecl::new("x", Type::Int);
//! let factory = BddSolverFactory::default();
//! let mut solver = factory.open_session(SessionTheme::plain());
//! solver.add(&expr::lt(x.expr(), expr::int(3)).unwrap()).unwrap();
//! solver.add(&expr::gt(x.expr(), expr::int(1)).unwrap()).unwrap();
//! assert_eq!(solver.check(), SolverStatus::Sat);
//! assert_eq!(solver.model().unwrap().get_var(&x), Some(&cegar_rs::eval::Value::Int(2)));
//! ```

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;

use crate::error::{FormulaError, SolverError};
use crate::eval::Valuation;
use crate::expr::{Expr, Symbol};
use crate::reference::Ref;
use crate::solver::encoding::{has_int_symbols, int_literal_bounds, Encoder};
use crate::solver::{ItpMarker, SessionTheme, Solver, SolverFactory, SolverStats, SolverStatus, UnknownCause};
use crate::types::Type;

#[derive(Debug, Clone)]
pub struct BddSolverConfig {
    /// Maximum number of BDD nodes per session.
    pub node_limit: usize,
    /// Computed table size is `2^cache_bits`.
    pub cache_bits: usize,
    /// Wall-clock limit per `check`.
    pub timeout: Option<Duration>,
    /// Range of integer symbols without an explicit range.
    pub default_int_range: (i64, i64),
    /// Per-variable integer ranges, by variable name.
    pub int_ranges: BTreeMap<String, (i64, i64)>,
    /// Widening of the integer ranges when confirming UNSAT. Zero trusts
    /// the configured ranges.
    pub range_margin: i64,
    pub max_bv_width: u32,
    /// Maximum number of symbol assignments enumerated for one atom.
    pub max_atom_assignments: u64,
    /// Maximum number of BDD paths decoded into an interpolant.
    pub max_paths: usize,
}

impl Default for BddSolverConfig {
    fn default() -> Self {
        Self {
            node_limit: 1 << 22,
            cache_bits: 16,
            timeout: None,
            default_int_range: (-16, 16),
            int_ranges: BTreeMap::new(),
            range_margin: 16,
            max_bv_width: 12,
            max_atom_assignments: 1 << 16,
            max_paths: 4096,
        }
    }
}

impl BddSolverConfig {
    pub fn with_node_limit(mut self, node_limit: usize) -> Self {
        self.node_limit = node_limit;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Range `lo..=hi` of integer symbols. An empty range is clamped to
    /// `lo..=lo`.
    pub fn with_default_int_range(mut self, lo: i64, hi: i64) -> Self {
        self.default_int_range = (lo, hi.max(lo));
        self
    }

    /// Range of the integer variable `var`, clamped like
    /// [`with_default_int_range`][Self::with_default_int_range].
    pub fn with_int_range(mut self, var: impl Into<String>, lo: i64, hi: i64) -> Self {
        self.int_ranges.insert(var.into(), (lo, hi.max(lo)));
        self
    }

    pub fn with_range_margin(mut self, margin: i64) -> Self {
        self.range_margin = margin.max(0);
        self
    }

    pub fn with_max_atom_assignments(mut self, n: u64) -> Self {
        self.max_atom_assignments = n;
        self
    }

    pub fn int_range(&self, var: &str) -> (i64, i64) {
        self.int_ranges
            .get(var)
            .copied()
            .unwrap_or(self.default_int_range)
    }

    /// Every range grown by the margin, after stretching it over `lits`.
    fn widened(&self, lits: Option<(i64, i64)>) -> Self {
        let widen = |(lo, hi): (i64, i64)| {
            let (lo, hi) = match lits {
                Some((a, b)) => (lo.min(a), hi.max(b)),
                None => (lo, hi),
            };
            (
                lo.saturating_sub(self.range_margin),
                hi.saturating_add(self.range_margin),
            )
        };
        let mut res = self.clone();
        res.default_int_range = widen(self.default_int_range);
        for range in res.int_ranges.values_mut() {
            *range = widen(*range);
        }
        res
    }
}

fn conjoin_all(enc: &mut Encoder, exprs: &[Expr]) -> Result<Ref, UnknownCause> {
    let mut res = enc.bdd.one;
    for e in exprs {
        let f = enc.encode(e)?;
        let valid = enc.domain_constraint(e)?;
        res = enc.bdd.apply_and(res, enc.bdd.apply_and(f, valid));
    }
    enc.check_exhausted()?;
    Ok(res)
}

/// Opens [`BddSolver`] sessions and counts their checks.
#[derive(Debug, Clone, Default)]
pub struct BddSolverFactory {
    config: Arc<BddSolverConfig>,
    stats: Rc<Cell<SolverStats>>,
}

impl BddSolverFactory {
    pub fn new(config: BddSolverConfig) -> Self {
        Self {
            config: Arc::new(config),
            stats: Rc::new(Cell::new(SolverStats::default())),
        }
    }

    pub fn config(&self) -> &BddSolverConfig {
        &self.config
    }
}

impl SolverFactory for BddSolverFactory {
    fn open_session(&self, theme: SessionTheme) -> Box<dyn Solver> {
        let mut stats = self.stats.get();
        stats.sessions += 1;
        self.stats.set(stats);
        Box::new(BddSolver::new(self.config.clone(), theme, self.stats.clone()))
    }

    fn stats(&self) -> SolverStats {
        self.stats.get()
    }
}

struct Assertion {
    expr: Expr,
    bdd: Result<Ref, UnknownCause>,
    tracked: bool,
    marker: Option<ItpMarker>,
}

pub struct BddSolver {
    config: Arc<BddSolverConfig>,
    enc: Encoder,
    theme: SessionTheme,
    frames: Vec<Vec<Assertion>>,
    markers: usize,
    status: Option<SolverStatus>,
    conj: Ref,
    timeout: Option<Duration>,
    stats: Rc<Cell<SolverStats>>,
}

impl BddSolver {
    fn new(config: Arc<BddSolverConfig>, theme: SessionTheme, stats: Rc<Cell<SolverStats>>) -> Self {
        let timeout = config.timeout;
        let enc = Encoder::new(config.clone());
        let conj = enc.bdd.one;
        Self {
            config,
            enc,
            theme,
            frames: vec![Vec::new()],
            markers: 0,
            status: None,
            conj,
            timeout,
            stats,
        }
    }

    fn live(&self) -> impl Iterator<Item = &Assertion> {
        self.frames.iter().flatten()
    }

    fn assert_impl(
        &mut self,
        e: &Expr,
        tracked: bool,
        marker: Option<ItpMarker>,
    ) -> Result<(), SolverError> {
        if e.ty() != &Type::Bool {
            return Err(FormulaError::TypeMismatch {
                op: "assert",
                expected: Type::Bool.to_string(),
                found: e.ty().clone(),
            }
            .into());
        }
        let bdd = self.enc.encode(e).and_then(|f| {
            let valid = self.enc.domain_constraint(e)?;
            let res = self.enc.bdd.apply_and(f, valid);
            self.enc.check_exhausted()?;
            Ok(res)
        });
        if let Err(cause) = &bdd {
            debug!("cannot encode {}: {}", e, cause);
        }
        self.status = None;
        if let Some(frame) = self.frames.last_mut() {
            frame.push(Assertion {
                expr: e.clone(),
                bdd,
                tracked,
                marker,
            });
        }
        Ok(())
    }

    fn record(&mut self, status: SolverStatus) -> SolverStatus {
        let mut stats = self.stats.get();
        if let SolverStatus::Unknown(_) = status {
            stats.unknowns += 1;
        }
        self.stats.set(stats);
        self.status = Some(status.clone());
        status
    }

    fn last_status(&self) -> String {
        match &self.status {
            Some(s) => s.to_string(),
            None => "unchecked".to_string(),
        }
    }

    fn symbols_where(&self, pred: impl Fn(&Assertion) -> bool) -> BTreeSet<Symbol> {
        self.live()
            .filter(|a| pred(*a))
            .flat_map(|a| a.expr.symbols())
            .collect()
    }

    /// Encoder over widened integer ranges for `exprs`, unless they have no
    /// integer symbols or the margin is zero.
    fn widened(&self, exprs: &[Expr], deadline: Option<Instant>) -> Option<Encoder> {
        if self.config.range_margin == 0 || !exprs.iter().any(has_int_symbols) {
            return None;
        }
        let config = self.config.widened(int_literal_bounds(exprs));
        let wide = Encoder::new(Arc::new(config));
        wide.bdd.set_deadline(deadline);
        Some(wide)
    }

    /// Whether `exprs`, unsat over the configured ranges, have a solution
    /// over the widened ones.
    fn escapes_range(&self, exprs: &[Expr], deadline: Option<Instant>) -> Result<bool, UnknownCause> {
        match self.widened(exprs, deadline) {
            Some(mut wide) => {
                let f = conjoin_all(&mut wide, exprs)?;
                Ok(!wide.bdd.is_zero(f))
            }
            None => Ok(false),
        }
    }

    fn confirm_unsat(&self, deadline: Option<Instant>) -> SolverStatus {
        let exprs: Vec<Expr> = self.live().map(|a| a.expr.clone()).collect();
        match self.escapes_range(&exprs, deadline) {
            Ok(false) => SolverStatus::Unsat,
            Ok(true) => {
                debug!("unsat only within the integer ranges");
                SolverStatus::Unknown(UnknownCause::Unsupported("integer range".to_string()))
            }
            Err(cause) => SolverStatus::Unknown(cause),
        }
    }

    fn conjoin_where(&self, pred: impl Fn(&Assertion) -> bool) -> Result<Ref, UnknownCause> {
        let mut res = self.enc.bdd.one;
        for a in self.live().filter(|a| pred(*a)) {
            let f = a.bdd.clone()?;
            res = self.enc.bdd.apply_and(res, f);
        }
        self.enc.check_exhausted()?;
        Ok(res)
    }
}

impl Solver for BddSolver {
    fn add(&mut self, assertion: &Expr) -> Result<(), SolverError> {
        self.assert_impl(assertion, false, None)
    }

    fn track(&mut self, assertion: &Expr) -> Result<(), SolverError> {
        self.assert_impl(assertion, true, None)
    }

    fn push(&mut self) {
        self.frames.push(Vec::new());
    }

    fn pop(&mut self) -> Result<(), SolverError> {
        if self.frames.len() <= 1 {
            return Err(SolverError::StackUnderflow);
        }
        self.frames.pop();
        self.status = None;
        Ok(())
    }

    fn check(&mut self) -> SolverStatus {
        let mut stats = self.stats.get();
        stats.checks += 1;
        self.stats.set(stats);

        if let Some(status) = &self.status {
            return status.clone();
        }

        let deadline = self.timeout.map(|t| Instant::now() + t);
        self.enc.bdd.set_deadline(deadline);
        let status = match self.conjoin_where(|_| true) {
            Ok(conj) => {
                self.conj = conj;
                if self.enc.bdd.is_zero(conj) {
                    self.confirm_unsat(deadline)
                } else {
                    SolverStatus::Sat
                }
            }
            Err(cause) => SolverStatus::Unknown(cause),
        };
        let status = match self.enc.check_exhausted() {
            Err(cause) => SolverStatus::Unknown(cause),
            Ok(()) => status,
        };
        self.enc.bdd.set_deadline(None);
        debug!(
            "check: {} ({} BDD nodes, cache {})",
            status,
            self.enc.bdd.num_nodes(),
            self.enc.bdd.cache_stats()
        );
        self.record(status)
    }

    fn status(&self) -> Option<SolverStatus> {
        self.status.clone()
    }

    fn model(&self) -> Result<Valuation, SolverError> {
        if self.status != Some(SolverStatus::Sat) {
            return Err(SolverError::NoModel(self.last_status()));
        }
        let path = self
            .enc
            .bdd
            .one_sat(self.conj)
            .ok_or_else(|| SolverError::NoModel(self.last_status()))?;
        let symbols = self.symbols_where(|_| true);
        Ok(self.enc.decode_model(&path, &symbols))
    }

    fn unsat_core(&mut self) -> Result<Vec<Expr>, SolverError> {
        if self.status != Some(SolverStatus::Unsat) {
            return Err(SolverError::NoUnsatCore(self.last_status()));
        }
        let base = self
            .conjoin_where(|a| !a.tracked)
            .map_err(SolverError::Incomplete)?;
        let untracked: Vec<Expr> = self
            .live()
            .filter(|a| !a.tracked)
            .map(|a| a.expr.clone())
            .collect();
        let mut core: Vec<(Expr, Ref)> = Vec::new();
        for a in self.live().filter(|a| a.tracked) {
            let f = a.bdd.clone().map_err(SolverError::Incomplete)?;
            core.push((a.expr.clone(), f));
        }
        // Deletion-based minimization. A deletion must keep the rest unsat
        // over the widened ranges too.
        let mut i = 0;
        while i < core.len() {
            let bdd = &self.enc.bdd;
            let rest = core
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .fold(base, |acc, (_, (_, f))| bdd.apply_and(acc, *f));
            if bdd.exhausted().is_some() {
                break;
            }
            let removable = bdd.is_zero(rest) && {
                let exprs: Vec<Expr> = untracked
                    .iter()
                    .cloned()
                    .chain(core.iter().enumerate().filter(|&(j, _)| j != i).map(|(_, (e, _))| e.clone()))
                    .collect();
                matches!(self.escapes_range(&exprs, None), Ok(false))
            };
            if removable {
                core.remove(i);
            } else {
                i += 1;
            }
        }
        Ok(core.into_iter().map(|(e, _)| e).collect())
    }

    fn assertions(&self) -> Vec<Expr> {
        self.live().map(|a| a.expr.clone()).collect()
    }

    fn create_marker(&mut self) -> Result<ItpMarker, SolverError> {
        if !self.theme.interpolating {
            return Err(SolverError::NotInterpolating);
        }
        self.markers += 1;
        Ok(ItpMarker(self.markers - 1))
    }

    fn add_to(&mut self, marker: ItpMarker, assertion: &Expr) -> Result<(), SolverError> {
        if !self.theme.interpolating {
            return Err(SolverError::NotInterpolating);
        }
        if marker.0 >= self.markers {
            return Err(SolverError::UnknownMarker(marker.0));
        }
        self.assert_impl(assertion, false, Some(marker))
    }

    fn interpolant(&mut self, a: &[ItpMarker]) -> Result<Expr, SolverError> {
        if !self.theme.interpolating {
            return Err(SolverError::NotInterpolating);
        }
        if let Some(m) = a.iter().find(|m| m.0 >= self.markers) {
            return Err(SolverError::UnknownMarker(m.0));
        }
        if self.status != Some(SolverStatus::Unsat) {
            return Err(SolverError::NoInterpolant);
        }
        let in_a = |x: &Assertion| x.marker.is_some_and(|m| a.contains(&m));
        let a_symbols = self.symbols_where(in_a);
        let b_symbols = self.symbols_where(|x| !in_a(x));
        let local: Vec<&Symbol> = a_symbols.difference(&b_symbols).collect();

        // Over the widened ranges the interpolant keeps the values that A
        // reaches just outside the configured ones.
        let exprs: Vec<Expr> = self.live().map(|x| x.expr.clone()).collect();
        let a_exprs: Vec<Expr> = self.live().filter(|x| in_a(x)).map(|x| x.expr.clone()).collect();
        let wide_itp = self.widened(&exprs, None).map(|mut wide| -> Result<Expr, UnknownCause> {
            let a_bdd = conjoin_all(&mut wide, &a_exprs)?;
            let local_bits: HashSet<u32> = wide.bits_of(local.iter().copied()).into_iter().collect();
            let itp = wide.bdd.exists(a_bdd, &local_bits);
            wide.check_exhausted()?;
            wide.decode(itp)
        });
        let itp = match wide_itp {
            Some(Ok(itp)) => itp,
            wide_itp => {
                if let Some(Err(cause)) = wide_itp {
                    debug!("no interpolant over widened ranges: {}", cause);
                }
                let local_bits: HashSet<u32> = self.enc.bits_of(local.iter().copied()).into_iter().collect();
                let a_bdd = self.conjoin_where(in_a).map_err(SolverError::Incomplete)?;
                let itp = self.enc.bdd.exists(a_bdd, &local_bits);
                self.enc.check_exhausted().map_err(SolverError::Incomplete)?;
                self.enc.decode(itp).map_err(SolverError::Incomplete)?
            }
        };
        debug!("interpolant: {}", itp);
        Ok(itp)
    }
}
