//! Values, valuations and evaluation of expressions.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Debug, Display, Formatter};

use crate::error::FormulaError;
use crate::expr::{self, Expr, ExprKind, Symbol, VarDecl};
use crate::types::Type;

/// Normalized rational number: `den > 0` and `gcd(num, den) == 1`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rational {
    num: i64,
    den: i64,
}

fn gcd(mut a: i128, mut b: i128) -> i128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a.abs()
}

impl Rational {
    /// Returns `None` for a zero denominator.
    pub fn new(num: i64, den: i64) -> Option<Self> {
        Self::from_i128(num as i128, den as i128)
    }

    fn from_i128(num: i128, den: i128) -> Option<Self> {
        if den == 0 {
            return None;
        }
        let g = gcd(num, den).max(1);
        let (mut num, mut den) = (num / g, den / g);
        if den < 0 {
            num = -num;
            den = -den;
        }
        Some(Self {
            num: i64::try_from(num).ok()?,
            den: i64::try_from(den).ok()?,
        })
    }

    pub fn integer(value: i64) -> Self {
        Self { num: value, den: 1 }
    }

    pub fn num(&self) -> i64 {
        self.num
    }

    pub fn den(&self) -> i64 {
        self.den
    }

    pub fn is_zero(&self) -> bool {
        self.num == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        let (a, b) = (self.num as i128, self.den as i128);
        let (c, d) = (other.num as i128, other.den as i128);
        Self::from_i128(a * d + c * b, b * d)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.checked_add(other.neg())
    }

    pub fn checked_mul(self, other: Self) -> Option<Self> {
        let (a, b) = (self.num as i128, self.den as i128);
        let (c, d) = (other.num as i128, other.den as i128);
        Self::from_i128(a * c, b * d)
    }

    /// Division by zero yields zero.
    pub fn checked_div(self, other: Self) -> Option<Self> {
        if other.is_zero() {
            return Some(Self::integer(0));
        }
        let (a, b) = (self.num as i128, self.den as i128);
        let (c, d) = (other.num as i128, other.den as i128);
        Self::from_i128(a * d, b * c)
    }

    pub fn neg(self) -> Self {
        Self {
            num: -self.num,
            den: self.den,
        }
    }

    /// Numeric comparison (the derived `Ord` is only structural).
    pub fn compare(&self, other: &Self) -> Ordering {
        let lhs = self.num as i128 * other.den as i128;
        let rhs = other.num as i128 * self.den as i128;
        lhs.cmp(&rhs)
    }
}

impl Display for Rational {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

/// Array value: a default element plus explicitly stored entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArrayValue {
    ty: Type,
    default: Box<Value>,
    entries: BTreeMap<Value, Value>,
}

impl ArrayValue {
    pub fn constant(index: Type, default: Value) -> Self {
        let ty = Type::array(index, default.ty());
        Self {
            ty,
            default: Box::new(default),
            entries: BTreeMap::new(),
        }
    }

    pub fn get(&self, index: &Value) -> Value {
        self.entries
            .get(index)
            .cloned()
            .unwrap_or_else(|| (*self.default).clone())
    }

    pub fn set(&self, index: Value, value: Value) -> Self {
        let mut res = self.clone();
        if value == *res.default {
            res.entries.remove(&index);
        } else {
            res.entries.insert(index, value);
        }
        res
    }
}

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Rat(Rational),
    BitVec { value: u64, width: u32 },
    Array(ArrayValue),
}

fn bv_mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

impl Value {
    pub fn bitvec(value: u64, width: u32) -> Result<Self, FormulaError> {
        if width == 0 || width > 64 {
            return Err(FormulaError::BitVecWidth(width));
        }
        Ok(Value::BitVec {
            value: value & bv_mask(width),
            width,
        })
    }

    pub fn ty(&self) -> Type {
        match self {
            Value::Bool(_) => Type::Bool,
            Value::Int(_) => Type::Int,
            Value::Rat(_) => Type::Rat,
            Value::BitVec { width, .. } => Type::BitVec(*width),
            Value::Array(a) => a.ty.clone(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Rat(a), Value::Rat(b)) => Some(a.compare(b)),
            _ => None,
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Rat(r) => write!(f, "{}", r),
            Value::BitVec { value, width } => write!(f, "{}bv{}", value, width),
            Value::Array(a) => {
                write!(f, "(array")?;
                for (i, v) in &a.entries {
                    write!(f, " {}<-{}", i, v)?;
                }
                write!(f, " default<-{})", a.default)
            }
        }
    }
}

/// Assignment of values to symbols.
///
/// Explicit states use unindexed symbols; solver models use indexed ones.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Valuation {
    map: BTreeMap<Symbol, Value>,
}

impl Valuation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: &Symbol) -> Option<&Value> {
        self.map.get(symbol)
    }

    /// Value of the unindexed variable.
    pub fn get_var(&self, decl: &VarDecl) -> Option<&Value> {
        self.map.get(&Symbol::var(decl.clone()))
    }

    pub fn insert(&mut self, symbol: Symbol, value: Value) -> Option<Value> {
        self.map.insert(symbol, value)
    }

    pub fn put_var(&mut self, decl: &VarDecl, value: Value) -> Option<Value> {
        self.insert(Symbol::var(decl.clone()), value)
    }

    pub fn remove(&mut self, symbol: &Symbol) -> Option<Value> {
        self.map.remove(symbol)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, &Value)> {
        self.map.iter()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.map.keys()
    }

    /// Keep only the given (unindexed) variables.
    pub fn project(&self, vars: &BTreeSet<VarDecl>) -> Self {
        Self {
            map: self
                .map
                .iter()
                .filter(|(s, _)| s.index.is_none() && vars.contains(&s.decl))
                .map(|(s, v)| (s.clone(), v.clone()))
                .collect(),
        }
    }

    /// Conjunction of `symbol == value` equalities.
    pub fn to_expr(&self) -> Expr {
        let eqs: Vec<Expr> = self
            .map
            .iter()
            .map(|(s, v)| eq_value(s, v))
            .collect();
        expr::and(eqs).unwrap_or_else(|_| expr::tt())
    }
}

/// `symbol == value`, well-typed by construction of valuations.
pub(crate) fn eq_value(symbol: &Symbol, value: &Value) -> Expr {
    match value {
        Value::Bool(true) => symbol.to_expr(),
        Value::Bool(false) => expr::not(symbol.to_expr()).unwrap_or_else(|_| expr::ff()),
        _ => expr::eq(symbol.to_expr(), expr::lit(value.clone())).unwrap_or_else(|_| expr::ff()),
    }
}

impl FromIterator<(Symbol, Value)> for Valuation {
    fn from_iter<T: IntoIterator<Item = (Symbol, Value)>>(iter: T) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}

impl Debug for Valuation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl Display for Valuation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (s, v)) in self.map.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} = {}", s, v)?;
        }
        write!(f, "}}")
    }
}

fn arith(op: &ExprKind, a: &Value, b: &Value) -> Option<Value> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => Some(Value::Int(match op {
            ExprKind::Add(_) => a.checked_add(*b)?,
            ExprKind::Sub(..) => a.checked_sub(*b)?,
            ExprKind::Mul(_) => a.checked_mul(*b)?,
            ExprKind::Div(..) if *b == 0 => 0,
            ExprKind::Div(..) => a.checked_div_euclid(*b)?,
            ExprKind::Mod(..) if *b == 0 => *a,
            ExprKind::Mod(..) => a.checked_rem_euclid(*b)?,
            _ => return None,
        })),
        (Value::Rat(a), Value::Rat(b)) => Some(Value::Rat(match op {
            ExprKind::Add(_) => a.checked_add(*b)?,
            ExprKind::Sub(..) => a.checked_sub(*b)?,
            ExprKind::Mul(_) => a.checked_mul(*b)?,
            ExprKind::Div(..) => a.checked_div(*b)?,
            _ => return None,
        })),
        _ => None,
    }
}

fn bv_op(op: &ExprKind, a: &Value, b: &Value) -> Option<Value> {
    let (Value::BitVec { value: a, width }, Value::BitVec { value: b, .. }) = (a, b) else {
        return None;
    };
    let value = match op {
        ExprKind::BvAnd(..) => a & b,
        ExprKind::BvOr(..) => a | b,
        ExprKind::BvXor(..) => a ^ b,
        ExprKind::BvAdd(..) => a.wrapping_add(*b),
        ExprKind::BvUlt(..) => return Some(Value::Bool(a < b)),
        _ => return None,
    };
    Some(Value::BitVec {
        value: value & bv_mask(*width),
        width: *width,
    })
}

/// Evaluate `e` under `val`.
///
/// Returns `None` when the value depends on an unassigned symbol, on a
/// primed subterm, or when integer arithmetic overflows. Connectives
/// short-circuit, so `false ∧ y` evaluates even if `y` is unassigned.
pub fn eval(e: &Expr, val: &Valuation) -> Option<Value> {
    use ExprKind::*;
    let ev = |x: &Expr| eval(x, val);
    let ev_bool = |x: &Expr| eval(x, val).and_then(|v| v.as_bool());
    match e.kind() {
        Lit(v) => Some(v.clone()),
        Sym(s) => val.get(s).cloned(),
        Prime(_) => None,
        Not(a) => Some(Value::Bool(!ev_bool(a)?)),
        And(xs) => {
            let mut unknown = false;
            for x in xs {
                match ev_bool(x) {
                    Some(false) => return Some(Value::Bool(false)),
                    Some(true) => {}
                    None => unknown = true,
                }
            }
            (!unknown).then_some(Value::Bool(true))
        }
        Or(xs) => {
            let mut unknown = false;
            for x in xs {
                match ev_bool(x) {
                    Some(true) => return Some(Value::Bool(true)),
                    Some(false) => {}
                    None => unknown = true,
                }
            }
            (!unknown).then_some(Value::Bool(false))
        }
        Imply(a, b) => match (ev_bool(a), ev_bool(b)) {
            (Some(false), _) | (_, Some(true)) => Some(Value::Bool(true)),
            (Some(true), Some(false)) => Some(Value::Bool(false)),
            _ => None,
        },
        Iff(a, b) => Some(Value::Bool(ev_bool(a)? == ev_bool(b)?)),
        Eq(a, b) => Some(Value::Bool(ev(a)? == ev(b)?)),
        Neq(a, b) => Some(Value::Bool(ev(a)? != ev(b)?)),
        Lt(a, b) => Some(Value::Bool(ev(a)?.compare(&ev(b)?)? == Ordering::Less)),
        Leq(a, b) => Some(Value::Bool(ev(a)?.compare(&ev(b)?)? != Ordering::Greater)),
        Gt(a, b) => Some(Value::Bool(ev(a)?.compare(&ev(b)?)? == Ordering::Greater)),
        Geq(a, b) => Some(Value::Bool(ev(a)?.compare(&ev(b)?)? != Ordering::Less)),
        Add(xs) | Mul(xs) => {
            let mut acc = ev(&xs[0])?;
            for x in &xs[1..] {
                acc = arith(e.kind(), &acc, &ev(x)?)?;
            }
            Some(acc)
        }
        Sub(a, b) | Div(a, b) | Mod(a, b) => arith(e.kind(), &ev(a)?, &ev(b)?),
        Neg(a) => match ev(a)? {
            Value::Int(i) => Some(Value::Int(i.checked_neg()?)),
            Value::Rat(r) => Some(Value::Rat(r.neg())),
            _ => None,
        },
        Ite(c, t, f) => match ev_bool(c) {
            Some(true) => ev(t),
            Some(false) => ev(f),
            None => {
                let (t, f) = (ev(t)?, ev(f)?);
                (t == f).then_some(t)
            }
        },
        Read(a, i) => match ev(a)? {
            Value::Array(arr) => Some(arr.get(&ev(i)?)),
            _ => None,
        },
        Write(a, i, v) => match ev(a)? {
            Value::Array(arr) => Some(Value::Array(arr.set(ev(i)?, ev(v)?))),
            _ => None,
        },
        BvNot(a) => match ev(a)? {
            Value::BitVec { value, width } => Some(Value::BitVec {
                value: !value & bv_mask(width),
                width,
            }),
            _ => None,
        },
        BvAnd(a, b) | BvOr(a, b) | BvXor(a, b) | BvAdd(a, b) | BvUlt(a, b) => {
            bv_op(e.kind(), &ev(a)?, &ev(b)?)
        }
    }
}

/// Evaluate a boolean expression; `None` if undetermined.
pub fn eval_bool(e: &Expr, val: &Valuation) -> Option<bool> {
    eval(e, val).and_then(|v| v.as_bool())
}

/// Substitute assigned symbols and fold constants.
pub fn simplify(e: &Expr, val: &Valuation) -> Expr {
    let empty = Valuation::new();
    e.rewrite(&mut |node: &Expr| {
        if let ExprKind::Sym(s) = node.kind() {
            return val.get(s).map(|v| expr::lit(v.clone()));
        }
        if let Some(v) = eval(node, &empty) {
            return Some(expr::lit(v));
        }
        match node.kind() {
            ExprKind::And(xs) => {
                let kept: Vec<Expr> = xs.iter().filter(|x| !x.is_true()).cloned().collect();
                (kept.len() != xs.len()).then(|| expr::and(kept).ok()).flatten()
            }
            ExprKind::Or(xs) => {
                let kept: Vec<Expr> = xs.iter().filter(|x| !x.is_false()).cloned().collect();
                (kept.len() != xs.len()).then(|| expr::or(kept).ok()).flatten()
            }
            _ => None,
        }
    })
}
