//! Bit-level encoding of finite-domain symbols into BDD variables.
//!
//! Every symbol gets a block of BDD variables holding the binary offset of
//! its value in the symbol's domain:
//!
//! - `Bool`: one variable.
//! - `Int`: a configured range `lo..=hi`, offset `value - lo`.
//! - `BitVec(w)`: `w` variables (up to a configured width).
//!
//! Boolean connectives map to BDD operations directly. Every other atom is
//! compiled by enumerating the values of its symbols and evaluating it.
//! Rationals and arrays have no finite encoding and make the query
//! inconclusive.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use log::debug;

use crate::bdd::{Bdd, Exhaustion};
use crate::eval::{eval_bool, Valuation, Value};
use crate::expr::{self, Expr, ExprKind, Symbol};
use crate::reference::Ref;
use crate::solver::finite::BddSolverConfig;
use crate::solver::UnknownCause;
use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Domain {
    Bool,
    Int { lo: i64 },
    BitVec { width: u32 },
}

#[derive(Debug, Clone)]
struct SymbolEncoding {
    domain: Domain,
    /// BDD variables of the offset, least significant bit first.
    bits: Vec<u32>,
    /// Number of values in the domain.
    size: u64,
    /// Constraint `offset < size`.
    valid: Ref,
}

impl SymbolEncoding {
    fn value(&self, offset: u64) -> Value {
        match self.domain {
            Domain::Bool => Value::Bool(offset != 0),
            Domain::Int { lo } => Value::Int(lo + offset as i64),
            Domain::BitVec { width } => Value::BitVec {
                value: offset,
                width,
            },
        }
    }
}

pub(crate) struct Encoder {
    pub(crate) bdd: Bdd,
    config: Arc<BddSolverConfig>,
    symbols: HashMap<Symbol, SymbolEncoding>,
    owners: HashMap<u32, Symbol>,
    next_var: u32,
}

fn cause(exhaustion: Exhaustion) -> UnknownCause {
    match exhaustion {
        Exhaustion::NodeLimit => UnknownCause::ResourceLimit,
        Exhaustion::Deadline => UnknownCause::Timeout,
    }
}

impl Encoder {
    pub(crate) fn new(config: Arc<BddSolverConfig>) -> Self {
        let bdd = Bdd::new(config.cache_bits, config.node_limit);
        Self {
            bdd,
            config,
            symbols: HashMap::new(),
            owners: HashMap::new(),
            next_var: 1,
        }
    }

    pub(crate) fn check_exhausted(&self) -> Result<(), UnknownCause> {
        match self.bdd.exhausted() {
            Some(e) => Err(cause(e)),
            None => Ok(()),
        }
    }

    fn encoding(&mut self, symbol: &Symbol) -> Result<&SymbolEncoding, UnknownCause> {
        if !self.symbols.contains_key(symbol) {
            let enc = self.new_encoding(symbol)?;
            for &b in &enc.bits {
                self.owners.insert(b, symbol.clone());
            }
            debug!("encoding {} with {} bit(s)", symbol, enc.bits.len());
            self.symbols.insert(symbol.clone(), enc);
        }
        self.symbols
            .get(symbol)
            .ok_or_else(|| UnknownCause::Unavailable(format!("no encoding for {}", symbol)))
    }

    fn new_encoding(&mut self, symbol: &Symbol) -> Result<SymbolEncoding, UnknownCause> {
        let (domain, size) = match symbol.ty() {
            Type::Bool => (Domain::Bool, 2),
            Type::Int => {
                let (lo, hi) = self.config.int_range(symbol.decl.name());
                let size = hi.saturating_sub(lo).saturating_add(1).max(1) as u64;
                (Domain::Int { lo }, size)
            }
            &Type::BitVec(width) if width <= self.config.max_bv_width => {
                (Domain::BitVec { width }, 1u64 << width)
            }
            ty => {
                return Err(UnknownCause::Unsupported(format!(
                    "symbol {} of type {}",
                    symbol, ty
                )))
            }
        };
        let nbits = 64 - (size - 1).leading_zeros();
        let bits: Vec<u32> = (0..nbits).map(|i| self.next_var + i).collect();
        self.next_var += nbits;
        let valid = self.lt_const(&bits, size);
        Ok(SymbolEncoding {
            domain,
            bits,
            size,
            valid,
        })
    }

    /// Unsigned `bits < c`.
    fn lt_const(&self, bits: &[u32], c: u64) -> Ref {
        if bits.len() >= 64 || c >= 1u64 << bits.len() {
            return self.bdd.one;
        }
        let mut lt = self.bdd.zero;
        for (i, &b) in bits.iter().enumerate() {
            let x = self.bdd.mk_var(b);
            lt = if (c >> i) & 1 == 1 {
                self.bdd.apply_or(-x, lt)
            } else {
                self.bdd.apply_and(-x, lt)
            };
        }
        lt
    }

    fn offset_cube(&self, enc: &SymbolEncoding, offset: u64) -> Ref {
        self.bdd.cube(enc.bits.iter().enumerate().map(|(i, &b)| {
            if (offset >> i) & 1 == 1 {
                b as i32
            } else {
                -(b as i32)
            }
        }))
    }

    /// Domain constraints of all symbols of `e`.
    pub(crate) fn domain_constraint(&mut self, e: &Expr) -> Result<Ref, UnknownCause> {
        let mut res = self.bdd.one;
        for s in e.symbols() {
            let valid = self.encoding(&s)?.valid;
            res = self.bdd.apply_and(res, valid);
        }
        Ok(res)
    }

    /// Encode a boolean expression.
    pub(crate) fn encode(&mut self, e: &Expr) -> Result<Ref, UnknownCause> {
        use ExprKind::*;
        let res = match e.kind() {
            Lit(Value::Bool(b)) => {
                if *b {
                    self.bdd.one
                } else {
                    self.bdd.zero
                }
            }
            Sym(s) if s.ty().is_bool() => {
                let b = self.encoding(s)?.bits[0];
                self.bdd.mk_var(b)
            }
            Not(a) => -self.encode(a)?,
            And(xs) => {
                let mut res = self.bdd.one;
                for x in xs {
                    let r = self.encode(x)?;
                    res = self.bdd.apply_and(res, r);
                }
                res
            }
            Or(xs) => {
                let mut res = self.bdd.zero;
                for x in xs {
                    let r = self.encode(x)?;
                    res = self.bdd.apply_or(res, r);
                }
                res
            }
            Imply(a, b) => {
                let (a, b) = (self.encode(a)?, self.encode(b)?);
                self.bdd.apply_imply(a, b)
            }
            Iff(a, b) => {
                let (a, b) = (self.encode(a)?, self.encode(b)?);
                self.bdd.apply_eq(a, b)
            }
            Eq(a, b) if a.ty().is_bool() => {
                let (a, b) = (self.encode(a)?, self.encode(b)?);
                self.bdd.apply_eq(a, b)
            }
            Neq(a, b) if a.ty().is_bool() => {
                let (a, b) = (self.encode(a)?, self.encode(b)?);
                self.bdd.apply_xor(a, b)
            }
            Ite(c, t, f) if t.ty().is_bool() => {
                let (c, t, f) = (self.encode(c)?, self.encode(t)?, self.encode(f)?);
                self.bdd.apply_ite(c, t, f)
            }
            _ => self.encode_atom(e)?,
        };
        self.check_exhausted()?;
        Ok(res)
    }

    fn encode_atom(&mut self, e: &Expr) -> Result<Ref, UnknownCause> {
        if e.has_prime() {
            return Err(UnknownCause::Unsupported(format!(
                "primed expression {}",
                e
            )));
        }
        let symbols: Vec<Symbol> = e.symbols().into_iter().collect();
        let mut encodings = Vec::with_capacity(symbols.len());
        let mut assignments: u64 = 1;
        for s in &symbols {
            let enc = self.encoding(s)?.clone();
            assignments = assignments.saturating_mul(enc.size);
            encodings.push(enc);
        }
        if assignments > self.config.max_atom_assignments {
            debug!("atom {} needs {} assignments", e, assignments);
            return Err(UnknownCause::ResourceLimit);
        }
        let mut val = Valuation::new();
        Ok(self.enumerate(e, &symbols, &encodings, 0, &mut val))
    }

    fn enumerate(
        &self,
        e: &Expr,
        symbols: &[Symbol],
        encodings: &[SymbolEncoding],
        i: usize,
        val: &mut Valuation,
    ) -> Ref {
        if i == symbols.len() {
            return match eval_bool(e, val) {
                Some(true) => self.bdd.one,
                _ => self.bdd.zero,
            };
        }
        let enc = &encodings[i];
        let mut res = self.bdd.zero;
        for offset in 0..enc.size {
            val.insert(symbols[i].clone(), enc.value(offset));
            let rest = self.enumerate(e, symbols, encodings, i + 1, val);
            if self.bdd.is_zero(rest) {
                continue;
            }
            let cube = self.offset_cube(enc, offset);
            res = self.bdd.apply_or(res, self.bdd.apply_and(cube, rest));
        }
        val.remove(&symbols[i]);
        res
    }

    /// BDD variables encoding the given symbols.
    pub(crate) fn bits_of<'a>(&self, symbols: impl IntoIterator<Item = &'a Symbol>) -> Vec<u32> {
        symbols
            .into_iter()
            .filter_map(|s| self.symbols.get(s))
            .flat_map(|enc| enc.bits.iter().copied())
            .collect()
    }

    /// Decode a satisfying path into values of the given symbols.
    ///
    /// Bits not on the path are taken as zero; every completion of a path
    /// satisfies the BDD it was taken from.
    pub(crate) fn decode_model(&self, path: &[i32], symbols: &BTreeSet<Symbol>) -> Valuation {
        let positive: HashSet<u32> = path
            .iter()
            .filter(|&&l| l > 0)
            .map(|&l| l as u32)
            .collect();
        symbols
            .iter()
            .filter_map(|s| {
                let enc = self.symbols.get(s)?;
                let offset = enc
                    .bits
                    .iter()
                    .enumerate()
                    .filter(|(_, b)| positive.contains(*b))
                    .fold(0u64, |acc, (i, _)| acc | (1 << i));
                Some((s.clone(), enc.value(offset)))
            })
            .collect()
    }

    /// Express a BDD over encoded symbols as an expression.
    pub(crate) fn decode(&self, f: Ref) -> Result<Expr, UnknownCause> {
        let paths = self
            .bdd
            .paths(f, self.config.max_paths)
            .ok_or(UnknownCause::ResourceLimit)?;
        let mut disjuncts = Vec::with_capacity(paths.len());
        for path in paths {
            let mut fixed: BTreeMap<&Symbol, Vec<i32>> = BTreeMap::new();
            for &lit in &path {
                let owner = self.owners.get(&lit.unsigned_abs()).ok_or_else(|| {
                    UnknownCause::Unavailable(format!("unowned BDD variable {}", lit))
                })?;
                fixed.entry(owner).or_default().push(lit);
            }
            let mut conjuncts = Vec::new();
            for (s, lits) in fixed {
                if let Some(c) = self.decode_symbol(s, &lits)? {
                    conjuncts.push(c);
                }
            }
            let conj = expr::and(conjuncts).map_err(|e| UnknownCause::Unavailable(e.to_string()))?;
            if conj.is_true() {
                return Ok(expr::tt());
            }
            disjuncts.push(conj);
        }
        expr::or(disjuncts).map_err(|e| UnknownCause::Unavailable(e.to_string()))
    }

    /// Constraint on `s` expressing the partial assignment `lits` of its bits.
    fn decode_symbol(&self, s: &Symbol, lits: &[i32]) -> Result<Option<Expr>, UnknownCause> {
        let enc = self
            .symbols
            .get(s)
            .ok_or_else(|| UnknownCause::Unavailable(format!("no encoding for {}", s)))?;
        if enc.size > self.config.max_atom_assignments {
            return Err(UnknownCause::ResourceLimit);
        }
        let position = |b: u32| enc.bits.iter().position(|&x| x == b);
        let mut mask = 0u64;
        let mut ones = 0u64;
        for &lit in lits {
            if let Some(i) = position(lit.unsigned_abs()) {
                mask |= 1 << i;
                if lit > 0 {
                    ones |= 1 << i;
                }
            }
        }
        let offsets: Vec<u64> = (0..enc.size).filter(|o| o & mask == ones).collect();
        if offsets.len() as u64 == enc.size {
            return Ok(None);
        }
        let x = s.to_expr();
        let err = |e: crate::error::FormulaError| UnknownCause::Unavailable(e.to_string());
        if enc.domain == Domain::Bool {
            return match offsets.as_slice() {
                [1] => Ok(Some(x)),
                [0] => Ok(Some(expr::not(x).map_err(err)?)),
                _ => Ok(Some(expr::ff())),
            };
        }
        // Group consecutive offsets into ranges.
        let mut ranges: Vec<(u64, u64)> = Vec::new();
        for o in offsets {
            match ranges.last_mut() {
                Some((_, hi)) if *hi + 1 == o => *hi = o,
                _ => ranges.push((o, o)),
            }
        }
        let mut parts = Vec::with_capacity(ranges.len());
        for (lo, hi) in ranges {
            let part = if lo == hi {
                expr::eq(x.clone(), expr::lit(enc.value(lo))).map_err(err)?
            } else if let Domain::Int { .. } = enc.domain {
                // Ranges touching the end of the domain stay open on that side.
                let mut bounds = Vec::with_capacity(2);
                if lo > 0 {
                    bounds.push(expr::leq(expr::lit(enc.value(lo)), x.clone()).map_err(err)?);
                }
                if hi + 1 < enc.size {
                    bounds.push(expr::leq(x.clone(), expr::lit(enc.value(hi))).map_err(err)?);
                }
                expr::and(bounds).map_err(err)?
            } else {
                let eqs = (lo..=hi)
                    .map(|o| expr::eq(x.clone(), expr::lit(enc.value(o))))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(err)?;
                expr::or(eqs).map_err(err)?
            };
            parts.push(part);
        }
        Ok(Some(expr::or(parts).map_err(err)?))
    }
}

/// Smallest and largest integer literal in `exprs`.
pub(crate) fn int_literal_bounds<'a>(exprs: impl IntoIterator<Item = &'a Expr>) -> Option<(i64, i64)> {
    let mut bounds: Option<(i64, i64)> = None;
    let mut stack: Vec<&Expr> = exprs.into_iter().collect();
    while let Some(e) = stack.pop() {
        if let Some(&Value::Int(i)) = e.as_lit() {
            bounds = Some(match bounds {
                Some((lo, hi)) => (lo.min(i), hi.max(i)),
                None => (i, i),
            });
        }
        stack.extend(e.children());
    }
    bounds
}

pub(crate) fn has_int_symbols(e: &Expr) -> bool {
    e.symbols().iter().any(|s| s.ty() == &Type::Int)
}
