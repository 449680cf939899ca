//! Zone abstraction for clocks.
//!
//! A zone is a conjunction of difference constraints `x - y ≺ c` over the
//! tracked clocks, stored as a difference bound matrix (DBM) in canonical
//! form. Row and column `0` stand for the constant zero.
//!
//! Clock constraints are handled here exactly and do not take part in the
//! logical encoding of states and actions.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use crate::analysis::{Analysis, Domain, ExprState, InitFunc, Prec, TransFunc};
use crate::error::Result;
use crate::expr::{self, Expr, VarDecl};

/// Bound `≺ c` encoded as `c << 1 | (≺ is ≤)`, so that the integer order
/// is the order of bounds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DbmBound(i64);

impl DbmBound {
    pub const INF: DbmBound = DbmBound(i64::MAX);
    pub const LE_ZERO: DbmBound = DbmBound(1);

    pub fn leq(c: i64) -> Self {
        DbmBound((c << 1) | 1)
    }

    pub fn lt(c: i64) -> Self {
        DbmBound(c << 1)
    }

    pub fn new(c: i64, strict: bool) -> Self {
        if strict {
            Self::lt(c)
        } else {
            Self::leq(c)
        }
    }

    pub fn is_inf(self) -> bool {
        self == Self::INF
    }

    pub fn constant(self) -> i64 {
        self.0 >> 1
    }

    pub fn is_strict(self) -> bool {
        self.0 & 1 == 0
    }

    pub fn add(self, other: DbmBound) -> DbmBound {
        if self.is_inf() || other.is_inf() {
            return Self::INF;
        }
        DbmBound(((self.constant() + other.constant()) << 1) | (self.0 & other.0 & 1))
    }
}

impl Display for DbmBound {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_inf() {
            write!(f, "< inf")
        } else if self.is_strict() {
            write!(f, "< {}", self.constant())
        } else {
            write!(f, "<= {}", self.constant())
        }
    }
}

/// `left - right ≺ bound`, where a missing side is the constant zero.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClockConstraint {
    pub left: Option<VarDecl>,
    pub right: Option<VarDecl>,
    pub bound: i64,
    pub strict: bool,
}

impl ClockConstraint {
    pub fn leq(x: &VarDecl, c: i64) -> Self {
        Self {
            left: Some(x.clone()),
            right: None,
            bound: c,
            strict: false,
        }
    }

    pub fn lt(x: &VarDecl, c: i64) -> Self {
        Self {
            strict: true,
            ..Self::leq(x, c)
        }
    }

    pub fn geq(x: &VarDecl, c: i64) -> Self {
        Self {
            left: None,
            right: Some(x.clone()),
            bound: -c,
            strict: false,
        }
    }

    pub fn gt(x: &VarDecl, c: i64) -> Self {
        Self {
            strict: true,
            ..Self::geq(x, c)
        }
    }

    /// `x - y ≤ c`.
    pub fn diff_leq(x: &VarDecl, y: &VarDecl, c: i64) -> Self {
        Self {
            left: Some(x.clone()),
            right: Some(y.clone()),
            bound: c,
            strict: false,
        }
    }

    fn dbm_bound(&self) -> DbmBound {
        DbmBound::new(self.bound, self.strict)
    }

    pub fn clocks(&self) -> impl Iterator<Item = &VarDecl> {
        self.left.iter().chain(self.right.iter())
    }
}

impl Display for ClockConstraint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let op = if self.strict { "<" } else { "<=" };
        match (&self.left, &self.right) {
            (Some(x), Some(y)) => write!(f, "{} - {} {} {}", x, y, op, self.bound),
            (Some(x), None) => write!(f, "{} {} {}", x, op, self.bound),
            (None, Some(y)) => {
                let op = if self.strict { ">" } else { ">=" };
                write!(f, "{} {} {}", y, op, -self.bound)
            }
            (None, None) => write!(f, "0 {} {}", op, self.bound),
        }
    }
}

/// What an action does to the clocks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClockOp {
    Guard(ClockConstraint),
    Reset(VarDecl, i64),
    /// Let time elapse.
    Delay,
    Invariant(ClockConstraint),
}

impl Display for ClockOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ClockOp::Guard(c) => write!(f, "[{}]", c),
            ClockOp::Reset(x, v) => write!(f, "{} := {}", x, v),
            ClockOp::Delay => write!(f, "delay"),
            ClockOp::Invariant(c) => write!(f, "inv {}", c),
        }
    }
}

/// Actions with an effect on clocks.
pub trait ClockAction {
    fn clock_ops(&self) -> Vec<ClockOp>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dbm {
    clocks: Vec<VarDecl>,
    dim: usize,
    m: Vec<DbmBound>,
}

impl Dbm {
    fn init(clocks: &BTreeSet<VarDecl>, fill: DbmBound) -> Self {
        let clocks: Vec<VarDecl> = clocks.iter().cloned().collect();
        let dim = clocks.len() + 1;
        let mut m = vec![fill; dim * dim];
        for i in 0..dim {
            m[i * dim + i] = DbmBound::LE_ZERO;
            m[i] = DbmBound::LE_ZERO;
        }
        Self { clocks, dim, m }
    }

    /// All clocks are zero.
    pub fn zero(clocks: &BTreeSet<VarDecl>) -> Self {
        Self::init(clocks, DbmBound::LE_ZERO)
    }

    /// All clocks are non-negative.
    pub fn top(clocks: &BTreeSet<VarDecl>) -> Self {
        Self::init(clocks, DbmBound::INF)
    }

    pub fn clocks(&self) -> &[VarDecl] {
        &self.clocks
    }

    pub fn get(&self, i: usize, j: usize) -> DbmBound {
        self.m[i * self.dim + j]
    }

    fn set(&mut self, i: usize, j: usize, b: DbmBound) {
        self.m[i * self.dim + j] = b;
    }

    fn index_of(&self, clock: &VarDecl) -> Option<usize> {
        self.clocks.iter().position(|c| c == clock).map(|i| i + 1)
    }

    /// Floyd-Warshall closure.
    pub fn canonize(&mut self) {
        let n = self.dim;
        for k in 0..n {
            for i in 0..n {
                let ik = self.get(i, k);
                if ik.is_inf() {
                    continue;
                }
                for j in 0..n {
                    let via = ik.add(self.get(k, j));
                    if via < self.get(i, j) {
                        self.set(i, j, via);
                    }
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        (0..self.dim).any(|i| self.get(i, i) < DbmBound::LE_ZERO)
    }

    pub fn up(&mut self) {
        for i in 1..self.dim {
            self.set(i, 0, DbmBound::INF);
        }
    }

    pub fn reset(&mut self, clock: &VarDecl, value: i64) {
        let Some(k) = self.index_of(clock) else {
            return;
        };
        for j in 0..self.dim {
            self.set(k, j, DbmBound::leq(value).add(self.get(0, j)));
            self.set(j, k, self.get(j, 0).add(DbmBound::leq(-value)));
        }
        self.set(k, k, DbmBound::LE_ZERO);
    }

    /// Conjoin a constraint. Constraints over untracked clocks are ignored.
    pub fn constrain(&mut self, c: &ClockConstraint) {
        let index = |side: &Option<VarDecl>| match side {
            None => Some(0),
            Some(x) => self.index_of(x),
        };
        if let (Some(i), Some(j)) = (index(&c.left), index(&c.right)) {
            let b = c.dbm_bound();
            if b < self.get(i, j) {
                self.set(i, j, b);
            }
        }
    }

    /// Inclusion. Both matrices must be canonical.
    pub fn is_leq(&self, other: &Dbm) -> bool {
        if self.is_empty() {
            return true;
        }
        self.clocks == other.clocks && self.m.iter().zip(&other.m).all(|(a, b)| a <= b)
    }

    /// Maximal-constant extrapolation. Clocks without a bound are not
    /// extrapolated.
    pub fn extrapolate(&mut self, max: &BTreeMap<VarDecl, i64>) {
        let k: Vec<Option<i64>> = std::iter::once(Some(0))
            .chain(self.clocks.iter().map(|c| max.get(c).copied()))
            .collect();
        for i in 0..self.dim {
            for j in 0..self.dim {
                if i == j {
                    continue;
                }
                let b = self.get(i, j);
                if b.is_inf() {
                    continue;
                }
                if let Some(ki) = k[i] {
                    if i != 0 && b > DbmBound::leq(ki) {
                        self.set(i, j, DbmBound::INF);
                        continue;
                    }
                }
                if let Some(kj) = k[j] {
                    if j != 0 && b < DbmBound::lt(-kj) {
                        self.set(i, j, DbmBound::lt(-kj));
                    }
                }
            }
        }
        self.canonize();
    }

    pub fn apply(&mut self, op: &ClockOp) {
        match op {
            ClockOp::Guard(c) | ClockOp::Invariant(c) => self.constrain(c),
            ClockOp::Reset(x, v) => self.reset(x, *v),
            ClockOp::Delay => self.up(),
        }
        self.canonize();
    }
}

impl Display for Dbm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = |i: usize| {
            if i == 0 {
                "0".to_string()
            } else {
                self.clocks[i - 1].to_string()
            }
        };
        let mut first = true;
        write!(f, "[")?;
        for i in 0..self.dim {
            for j in 0..self.dim {
                let b = self.get(i, j);
                if i == j || b.is_inf() || (i == 0 && b == DbmBound::LE_ZERO) {
                    continue;
                }
                if !first {
                    write!(f, ", ")?;
                }
                first = false;
                if j == 0 {
                    write!(f, "{} {}", name(i), b)?;
                } else {
                    write!(f, "{} - {} {}", name(i), name(j), b)?;
                }
            }
        }
        write!(f, "]")
    }
}

/// Tracked clocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ZonePrec {
    clocks: BTreeSet<VarDecl>,
}

impl ZonePrec {
    pub fn new(clocks: impl IntoIterator<Item = VarDecl>) -> Self {
        Self {
            clocks: clocks.into_iter().collect(),
        }
    }

    pub fn clocks(&self) -> &BTreeSet<VarDecl> {
        &self.clocks
    }
}

impl Prec for ZonePrec {
    fn join(&self, other: &Self) -> Self {
        Self {
            clocks: self.clocks.union(&other.clocks).cloned().collect(),
        }
    }

    fn size(&self) -> usize {
        self.clocks.len()
    }
}

impl Display for ZonePrec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let clocks: Vec<String> = self.clocks.iter().map(|c| c.to_string()).collect();
        write!(f, "{{{}}}", clocks.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ZoneState {
    Bottom,
    Zone(Dbm),
}

impl ZoneState {
    fn of(dbm: Dbm) -> Self {
        if dbm.is_empty() {
            ZoneState::Bottom
        } else {
            ZoneState::Zone(dbm)
        }
    }

    pub fn dbm(&self) -> Option<&Dbm> {
        match self {
            ZoneState::Bottom => None,
            ZoneState::Zone(dbm) => Some(dbm),
        }
    }
}

impl ExprState for ZoneState {
    fn to_expr(&self) -> Expr {
        match self {
            ZoneState::Bottom => expr::ff(),
            ZoneState::Zone(_) => expr::tt(),
        }
    }
}

impl Display for ZoneState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ZoneState::Bottom => write!(f, "⊥"),
            ZoneState::Zone(dbm) => write!(f, "{}", dbm),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ZoneDomain;

impl Domain<ZoneState, ZonePrec> for ZoneDomain {
    fn top(&self, prec: &ZonePrec) -> ZoneState {
        ZoneState::Zone(Dbm::top(&prec.clocks))
    }

    fn is_bottom(&self, state: &ZoneState) -> bool {
        matches!(state, ZoneState::Bottom)
    }

    fn is_leq(&self, a: &ZoneState, b: &ZoneState, _prec: &ZonePrec) -> bool {
        match (a, b) {
            (ZoneState::Bottom, _) => true,
            (_, ZoneState::Bottom) => false,
            (ZoneState::Zone(a), ZoneState::Zone(b)) => a.is_leq(b),
        }
    }
}

/// All clocks start at zero, then time elapses within `invariants`.
#[derive(Debug, Clone, Default)]
pub struct ZoneInitFunc {
    invariants: Vec<ClockConstraint>,
}

impl ZoneInitFunc {
    pub fn new(invariants: Vec<ClockConstraint>) -> Self {
        Self { invariants }
    }
}

impl InitFunc<ZoneState, ZonePrec> for ZoneInitFunc {
    fn init_states(&self, prec: &ZonePrec) -> Result<Vec<ZoneState>> {
        let mut dbm = Dbm::zero(&prec.clocks);
        for c in &self.invariants {
            dbm.apply(&ClockOp::Invariant(c.clone()));
        }
        dbm.apply(&ClockOp::Delay);
        for c in &self.invariants {
            dbm.apply(&ClockOp::Invariant(c.clone()));
        }
        Ok(match ZoneState::of(dbm) {
            ZoneState::Bottom => vec![],
            s => vec![s],
        })
    }
}

/// Applies the clock operations of an action, then extrapolates with the
/// maximal constant of each clock.
#[derive(Debug, Clone, Default)]
pub struct ZoneTransFunc {
    max_consts: BTreeMap<VarDecl, i64>,
}

impl ZoneTransFunc {
    pub fn new(max_consts: BTreeMap<VarDecl, i64>) -> Self {
        Self { max_consts }
    }

    /// Maximal constants read off a set of constraints.
    pub fn from_constraints<'a>(constraints: impl IntoIterator<Item = &'a ClockConstraint>) -> Self {
        let mut max_consts: BTreeMap<VarDecl, i64> = BTreeMap::new();
        for c in constraints {
            for clock in c.clocks() {
                let k = max_consts.entry(clock.clone()).or_insert(0);
                *k = (*k).max(c.bound.abs());
            }
        }
        Self { max_consts }
    }
}

impl<A: ClockAction> TransFunc<ZoneState, A, ZonePrec> for ZoneTransFunc {
    fn succ_states(&self, state: &ZoneState, action: &A, _prec: &ZonePrec) -> Result<Vec<ZoneState>> {
        let ZoneState::Zone(dbm) = state else {
            return Ok(vec![]);
        };
        let mut dbm = dbm.clone();
        for op in action.clock_ops() {
            dbm.apply(&op);
            if dbm.is_empty() {
                return Ok(vec![]);
            }
        }
        dbm.extrapolate(&self.max_consts);
        Ok(vec![ZoneState::of(dbm)])
    }
}

/// Zone analysis over the clocks of the precision.
pub fn analysis<A: ClockAction + 'static>(
    init_invariants: Vec<ClockConstraint>,
    max_consts: BTreeMap<VarDecl, i64>,
) -> Analysis<ZoneState, A, ZonePrec> {
    Analysis::new(
        ZoneDomain,
        ZoneInitFunc::new(init_invariants),
        ZoneTransFunc::new(max_consts),
    )
}
