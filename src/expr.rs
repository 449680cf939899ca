//! Immutable, typed, structurally shared expressions.
//!
//! An [`Expr`] is a reference-counted node. Equal subtrees compare equal
//! (structurally), and every node carries a precomputed hash, so expressions
//! can be used as keys of hash maps and ordered sets cheaply.
//!
//! All constructors are type-checked: building an ill-typed expression
//! returns a [`FormulaError`] instead of an expression.
//!
//! ```
//! use cegar_rs::expr::{self, VarDecl};
//! use cegar_rs::types::Type;
//!
//! let x = VarDecl::new("x", Type::Int);
//! let e = expr::lt(x.expr(), expr::int(5)).unwrap();
//! assert_eq!(e.to_string(), "(< x 5)");
//! assert!(expr::and(vec![e, expr::int(1)]).is_err());
//! ```

use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::FormulaError;
use crate::eval::Value;
use crate::types::Type;

/// Declaration of a state variable.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarDecl {
    name: Arc<str>,
    ty: Type,
}

impl VarDecl {
    pub fn new(name: impl AsRef<str>, ty: Type) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            ty,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// The variable as an (unindexed) expression.
    pub fn expr(&self) -> Expr {
        Expr::new(ExprKind::Sym(Symbol::var(self.clone())), self.ty.clone())
    }

    /// The variable at time step `index`.
    pub fn indexed(&self, index: u32) -> Expr {
        Expr::new(
            ExprKind::Sym(Symbol::indexed(self.clone(), index)),
            self.ty.clone(),
        )
    }

    /// Next-state value of the variable, i.e. `x'`.
    pub fn primed(&self) -> Expr {
        let x = self.expr();
        Expr::new(ExprKind::Prime(x), self.ty.clone())
    }
}

impl Debug for VarDecl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.ty)
    }
}

impl Display for VarDecl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A symbolic leaf: a variable, optionally at a fixed time step.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol {
    pub decl: VarDecl,
    pub index: Option<u32>,
}

impl Symbol {
    pub fn var(decl: VarDecl) -> Self {
        Self { decl, index: None }
    }

    pub fn indexed(decl: VarDecl, index: u32) -> Self {
        Self {
            decl,
            index: Some(index),
        }
    }

    pub fn ty(&self) -> &Type {
        self.decl.ty()
    }

    pub fn to_expr(&self) -> Expr {
        match self.index {
            None => self.decl.expr(),
            Some(k) => self.decl.indexed(k),
        }
    }
}

impl Debug for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.index {
            None => write!(f, "{}", self.decl.name),
            Some(k) => write!(f, "{}@{}", self.decl.name, k),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExprKind {
    Lit(Value),
    Sym(Symbol),
    Prime(Expr),

    Not(Expr),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Imply(Expr, Expr),
    Iff(Expr, Expr),

    Eq(Expr, Expr),
    Neq(Expr, Expr),
    Lt(Expr, Expr),
    Leq(Expr, Expr),
    Gt(Expr, Expr),
    Geq(Expr, Expr),

    Add(Vec<Expr>),
    Sub(Expr, Expr),
    Mul(Vec<Expr>),
    Div(Expr, Expr),
    Mod(Expr, Expr),
    Neg(Expr),

    Ite(Expr, Expr, Expr),

    Read(Expr, Expr),
    Write(Expr, Expr, Expr),

    BvAnd(Expr, Expr),
    BvOr(Expr, Expr),
    BvXor(Expr, Expr),
    BvNot(Expr),
    BvAdd(Expr, Expr),
    BvUlt(Expr, Expr),
}

struct ExprNode {
    kind: ExprKind,
    ty: Type,
    hash: u64,
}

/// Shared handle to an immutable expression node.
#[derive(Clone)]
pub struct Expr(Arc<ExprNode>);

impl Expr {
    fn new(kind: ExprKind, ty: Type) -> Self {
        let mut hasher = DefaultHasher::new();
        kind.hash(&mut hasher);
        ty.hash(&mut hasher);
        let hash = hasher.finish();
        Expr(Arc::new(ExprNode { kind, ty, hash }))
    }

    pub fn kind(&self) -> &ExprKind {
        &self.0.kind
    }

    pub fn ty(&self) -> &Type {
        &self.0.ty
    }

    pub fn is_true(&self) -> bool {
        matches!(self.kind(), ExprKind::Lit(Value::Bool(true)))
    }

    pub fn is_false(&self) -> bool {
        matches!(self.kind(), ExprKind::Lit(Value::Bool(false)))
    }

    pub fn as_lit(&self) -> Option<&Value> {
        match self.kind() {
            ExprKind::Lit(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self.kind() {
            ExprKind::Sym(s) => Some(s),
            _ => None,
        }
    }

    pub fn children(&self) -> Vec<&Expr> {
        use ExprKind::*;
        match self.kind() {
            Lit(_) | Sym(_) => vec![],
            Prime(a) | Not(a) | Neg(a) | BvNot(a) => vec![a],
            And(xs) | Or(xs) | Add(xs) | Mul(xs) => xs.iter().collect(),
            Imply(a, b) | Iff(a, b) | Eq(a, b) | Neq(a, b) | Lt(a, b) | Leq(a, b) | Gt(a, b)
            | Geq(a, b) | Sub(a, b) | Div(a, b) | Mod(a, b) | Read(a, b) | BvAnd(a, b)
            | BvOr(a, b) | BvXor(a, b) | BvAdd(a, b) | BvUlt(a, b) => vec![a, b],
            Ite(a, b, c) | Write(a, b, c) => vec![a, b, c],
        }
    }

    /// Rebuild the same operator over new children.
    ///
    /// The children must have the types of the ones they replace, so the
    /// result keeps the type of `self`.
    pub(crate) fn with_children(&self, children: Vec<Expr>) -> Expr {
        use ExprKind::*;
        let mut it = children.into_iter();
        let mut next = || it.next().unwrap_or_else(|| unreachable!("arity is preserved"));
        let kind = match self.kind() {
            Lit(_) | Sym(_) => return self.clone(),
            Prime(_) => Prime(next()),
            Not(_) => Not(next()),
            Neg(_) => Neg(next()),
            BvNot(_) => BvNot(next()),
            And(xs) => And((0..xs.len()).map(|_| next()).collect()),
            Or(xs) => Or((0..xs.len()).map(|_| next()).collect()),
            Add(xs) => Add((0..xs.len()).map(|_| next()).collect()),
            Mul(xs) => Mul((0..xs.len()).map(|_| next()).collect()),
            Imply(..) => Imply(next(), next()),
            Iff(..) => Iff(next(), next()),
            Eq(..) => Eq(next(), next()),
            Neq(..) => Neq(next(), next()),
            Lt(..) => Lt(next(), next()),
            Leq(..) => Leq(next(), next()),
            Gt(..) => Gt(next(), next()),
            Geq(..) => Geq(next(), next()),
            Sub(..) => Sub(next(), next()),
            Div(..) => Div(next(), next()),
            Mod(..) => Mod(next(), next()),
            Read(..) => Read(next(), next()),
            BvAnd(..) => BvAnd(next(), next()),
            BvOr(..) => BvOr(next(), next()),
            BvXor(..) => BvXor(next(), next()),
            BvAdd(..) => BvAdd(next(), next()),
            BvUlt(..) => BvUlt(next(), next()),
            Ite(..) => Ite(next(), next(), next()),
            Write(..) => Write(next(), next(), next()),
        };
        Expr::new(kind, self.ty().clone())
    }

    /// Bottom-up rewrite: `f` is applied to every node after its children
    /// were rewritten. Returning `None` keeps the (rebuilt) node.
    pub fn rewrite(&self, f: &mut impl FnMut(&Expr) -> Option<Expr>) -> Expr {
        let children = self.children();
        let node = if children.is_empty() {
            self.clone()
        } else {
            let new_children: Vec<Expr> = children.iter().map(|c| c.rewrite(f)).collect();
            if new_children.iter().zip(&children).all(|(a, b)| a.ptr_eq(b)) {
                self.clone()
            } else {
                self.with_children(new_children)
            }
        };
        f(&node).unwrap_or(node)
    }

    fn ptr_eq(&self, other: &Expr) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Free symbols of the expression.
    pub fn symbols(&self) -> BTreeSet<Symbol> {
        let mut res = BTreeSet::new();
        self.collect_symbols(&mut res);
        res
    }

    fn collect_symbols(&self, res: &mut BTreeSet<Symbol>) {
        if let ExprKind::Sym(s) = self.kind() {
            res.insert(s.clone());
        }
        for c in self.children() {
            c.collect_symbols(res);
        }
    }

    /// Declarations of all variables occurring in the expression.
    pub fn vars(&self) -> BTreeSet<VarDecl> {
        self.symbols().into_iter().map(|s| s.decl).collect()
    }

    /// Boolean atoms: maximal boolean subterms that are not built with
    /// boolean connectives. Literals `true`/`false` are not atoms.
    pub fn atoms(&self) -> BTreeSet<Expr> {
        let mut res = BTreeSet::new();
        self.collect_atoms(&mut res);
        res
    }

    fn collect_atoms(&self, res: &mut BTreeSet<Expr>) {
        use ExprKind::*;
        match self.kind() {
            Lit(_) => {}
            Not(_) | And(_) | Or(_) | Imply(..) | Iff(..) => {
                for c in self.children() {
                    c.collect_atoms(res);
                }
            }
            Eq(a, b) | Neq(a, b) if a.ty().is_bool() => {
                a.collect_atoms(res);
                b.collect_atoms(res);
            }
            Ite(c, t, e) if t.ty().is_bool() => {
                c.collect_atoms(res);
                t.collect_atoms(res);
                e.collect_atoms(res);
            }
            Neq(a, b) => {
                // `a != b` is the negation of the atom `a == b`.
                res.insert(Expr::new(Eq(a.clone(), b.clone()), Type::Bool));
            }
            _ => {
                res.insert(self.clone());
            }
        }
    }

    /// Top-level conjuncts (flattening nested conjunctions).
    pub fn conjuncts(&self) -> Vec<Expr> {
        match self.kind() {
            ExprKind::And(xs) => xs.iter().flat_map(|x| x.conjuncts()).collect(),
            _ if self.is_true() => vec![],
            _ => vec![self.clone()],
        }
    }

    /// Strip a top-level negation.
    pub fn ponate(&self) -> Expr {
        match self.kind() {
            ExprKind::Not(a) => a.ponate(),
            _ => self.clone(),
        }
    }

    /// Whether the expression contains `prime`.
    pub fn has_prime(&self) -> bool {
        matches!(self.kind(), ExprKind::Prime(_)) || self.children().iter().any(|c| c.has_prime())
    }

    /// Whether any symbol carries a time index.
    pub fn is_indexed(&self) -> bool {
        self.symbols().iter().any(|s| s.index.is_some())
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
            || (self.0.hash == other.0.hash && self.0.ty == other.0.ty && self.0.kind == other.0.kind)
    }
}

impl Eq for Expr {}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash);
    }
}

impl PartialOrd for Expr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Expr {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.ptr_eq(other) {
            return Ordering::Equal;
        }
        self.0
            .kind
            .cmp(&other.0.kind)
            .then_with(|| self.0.ty.cmp(&other.0.ty))
    }
}

impl Debug for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use ExprKind::*;
        let (op, args): (&str, Vec<&Expr>) = match self.kind() {
            Lit(v) => return write!(f, "{}", v),
            Sym(s) => return write!(f, "{}", s),
            Prime(a) if matches!(a.kind(), Sym(_) | Prime(_)) => return write!(f, "{}'", a),
            Prime(a) => ("prime", vec![a]),
            Not(a) => ("not", vec![a]),
            And(xs) => ("and", xs.iter().collect()),
            Or(xs) => ("or", xs.iter().collect()),
            Imply(a, b) => ("=>", vec![a, b]),
            Iff(a, b) => ("iff", vec![a, b]),
            Eq(a, b) => ("=", vec![a, b]),
            Neq(a, b) => ("/=", vec![a, b]),
            Lt(a, b) => ("<", vec![a, b]),
            Leq(a, b) => ("<=", vec![a, b]),
            Gt(a, b) => (">", vec![a, b]),
            Geq(a, b) => (">=", vec![a, b]),
            Add(xs) => ("+", xs.iter().collect()),
            Sub(a, b) => ("-", vec![a, b]),
            Mul(xs) => ("*", xs.iter().collect()),
            Div(a, b) => ("div", vec![a, b]),
            Mod(a, b) => ("mod", vec![a, b]),
            Neg(a) => ("-", vec![a]),
            Ite(c, t, e) => ("ite", vec![c, t, e]),
            Read(a, i) => ("read", vec![a, i]),
            Write(a, i, v) => ("write", vec![a, i, v]),
            BvAnd(a, b) => ("bvand", vec![a, b]),
            BvOr(a, b) => ("bvor", vec![a, b]),
            BvXor(a, b) => ("bvxor", vec![a, b]),
            BvNot(a) => ("bvnot", vec![a]),
            BvAdd(a, b) => ("bvadd", vec![a, b]),
            BvUlt(a, b) => ("bvult", vec![a, b]),
        };
        write!(f, "({}", op)?;
        for a in args {
            write!(f, " {}", a)?;
        }
        write!(f, ")")
    }
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

fn expect_type(op: &'static str, e: &Expr, expected: &Type) -> Result<(), FormulaError> {
    if e.ty() == expected {
        Ok(())
    } else {
        Err(FormulaError::TypeMismatch {
            op,
            expected: expected.to_string(),
            found: e.ty().clone(),
        })
    }
}

fn expect_numeric(op: &'static str, e: &Expr) -> Result<(), FormulaError> {
    if e.ty().is_numeric() {
        Ok(())
    } else {
        Err(FormulaError::TypeMismatch {
            op,
            expected: "Int or Rat".to_string(),
            found: e.ty().clone(),
        })
    }
}

fn expect_bitvec(op: &'static str, e: &Expr) -> Result<(), FormulaError> {
    if e.ty().is_bitvec() {
        Ok(())
    } else {
        Err(FormulaError::TypeMismatch {
            op,
            expected: "BitVec".to_string(),
            found: e.ty().clone(),
        })
    }
}

fn same_type(op: &'static str, a: &Expr, b: &Expr) -> Result<(), FormulaError> {
    expect_type(op, b, a.ty())
}

pub fn lit(value: Value) -> Expr {
    let ty = value.ty();
    Expr::new(ExprKind::Lit(value), ty)
}

pub fn bool_lit(b: bool) -> Expr {
    lit(Value::Bool(b))
}

pub fn tt() -> Expr {
    bool_lit(true)
}

pub fn ff() -> Expr {
    bool_lit(false)
}

pub fn int(value: i64) -> Expr {
    lit(Value::Int(value))
}

pub fn rat(num: i64, den: i64) -> Result<Expr, FormulaError> {
    let r = crate::eval::Rational::new(num, den).ok_or(FormulaError::TypeMismatch {
        op: "rat",
        expected: "non-zero denominator".to_string(),
        found: Type::Rat,
    })?;
    Ok(lit(Value::Rat(r)))
}

pub fn bv(value: u64, width: u32) -> Result<Expr, FormulaError> {
    Ok(lit(Value::bitvec(value, width)?))
}

/// `prime(e)`: the value of `e` in the next state.
pub fn prime(e: Expr) -> Result<Expr, FormulaError> {
    if let Some(s) = e.symbols().into_iter().find(|s| s.index.is_some()) {
        return Err(FormulaError::PrimedIndexedSymbol(s.to_string()));
    }
    let ty = e.ty().clone();
    Ok(Expr::new(ExprKind::Prime(e), ty))
}

/// `prime` applied `n` times.
pub fn prime_n(e: Expr, n: u32) -> Result<Expr, FormulaError> {
    (0..n).try_fold(e, |acc, _| prime(acc))
}

pub fn not(a: Expr) -> Result<Expr, FormulaError> {
    expect_type("not", &a, &Type::Bool)?;
    Ok(Expr::new(ExprKind::Not(a), Type::Bool))
}

/// N-ary conjunction. `and([])` is `true` and `and([a])` is `a`.
pub fn and(ops: Vec<Expr>) -> Result<Expr, FormulaError> {
    for a in &ops {
        expect_type("and", a, &Type::Bool)?;
    }
    Ok(match ops.len() {
        0 => tt(),
        1 => ops.into_iter().next().unwrap_or_else(tt),
        _ => Expr::new(ExprKind::And(ops), Type::Bool),
    })
}

/// N-ary disjunction. `or([])` is `false` and `or([a])` is `a`.
pub fn or(ops: Vec<Expr>) -> Result<Expr, FormulaError> {
    for a in &ops {
        expect_type("or", a, &Type::Bool)?;
    }
    Ok(match ops.len() {
        0 => ff(),
        1 => ops.into_iter().next().unwrap_or_else(ff),
        _ => Expr::new(ExprKind::Or(ops), Type::Bool),
    })
}

pub fn imply(a: Expr, b: Expr) -> Result<Expr, FormulaError> {
    expect_type("=>", &a, &Type::Bool)?;
    expect_type("=>", &b, &Type::Bool)?;
    Ok(Expr::new(ExprKind::Imply(a, b), Type::Bool))
}

pub fn iff(a: Expr, b: Expr) -> Result<Expr, FormulaError> {
    expect_type("iff", &a, &Type::Bool)?;
    expect_type("iff", &b, &Type::Bool)?;
    Ok(Expr::new(ExprKind::Iff(a, b), Type::Bool))
}

pub fn eq(a: Expr, b: Expr) -> Result<Expr, FormulaError> {
    same_type("=", &a, &b)?;
    Ok(Expr::new(ExprKind::Eq(a, b), Type::Bool))
}

pub fn neq(a: Expr, b: Expr) -> Result<Expr, FormulaError> {
    same_type("/=", &a, &b)?;
    Ok(Expr::new(ExprKind::Neq(a, b), Type::Bool))
}

fn comparison(
    op: &'static str,
    a: Expr,
    b: Expr,
    mk: fn(Expr, Expr) -> ExprKind,
) -> Result<Expr, FormulaError> {
    expect_numeric(op, &a)?;
    same_type(op, &a, &b)?;
    Ok(Expr::new(mk(a, b), Type::Bool))
}

pub fn lt(a: Expr, b: Expr) -> Result<Expr, FormulaError> {
    comparison("<", a, b, ExprKind::Lt)
}

pub fn leq(a: Expr, b: Expr) -> Result<Expr, FormulaError> {
    comparison("<=", a, b, ExprKind::Leq)
}

pub fn gt(a: Expr, b: Expr) -> Result<Expr, FormulaError> {
    comparison(">", a, b, ExprKind::Gt)
}

pub fn geq(a: Expr, b: Expr) -> Result<Expr, FormulaError> {
    comparison(">=", a, b, ExprKind::Geq)
}

fn nary_arith(
    op: &'static str,
    ops: Vec<Expr>,
    mk: fn(Vec<Expr>) -> ExprKind,
) -> Result<Expr, FormulaError> {
    let Some(first) = ops.first() else {
        return Err(FormulaError::Arity {
            op,
            expected: "at least 1",
            found: 0,
        });
    };
    expect_numeric(op, first)?;
    let ty = first.ty().clone();
    for a in &ops[1..] {
        expect_type(op, a, &ty)?;
    }
    if ops.len() == 1 {
        return Ok(ops[0].clone());
    }
    Ok(Expr::new(mk(ops), ty))
}

pub fn add(ops: Vec<Expr>) -> Result<Expr, FormulaError> {
    nary_arith("+", ops, ExprKind::Add)
}

pub fn mul(ops: Vec<Expr>) -> Result<Expr, FormulaError> {
    nary_arith("*", ops, ExprKind::Mul)
}

pub fn sub(a: Expr, b: Expr) -> Result<Expr, FormulaError> {
    expect_numeric("-", &a)?;
    same_type("-", &a, &b)?;
    let ty = a.ty().clone();
    Ok(Expr::new(ExprKind::Sub(a, b), ty))
}

/// Division: Euclidean on Int, exact on Rat. Division by zero yields zero.
pub fn div(a: Expr, b: Expr) -> Result<Expr, FormulaError> {
    expect_numeric("div", &a)?;
    same_type("div", &a, &b)?;
    let ty = a.ty().clone();
    Ok(Expr::new(ExprKind::Div(a, b), ty))
}

/// Euclidean remainder on Int. Modulo zero yields the dividend.
pub fn modulo(a: Expr, b: Expr) -> Result<Expr, FormulaError> {
    expect_type("mod", &a, &Type::Int)?;
    expect_type("mod", &b, &Type::Int)?;
    Ok(Expr::new(ExprKind::Mod(a, b), Type::Int))
}

pub fn neg(a: Expr) -> Result<Expr, FormulaError> {
    expect_numeric("-", &a)?;
    let ty = a.ty().clone();
    Ok(Expr::new(ExprKind::Neg(a), ty))
}

pub fn ite(cond: Expr, then: Expr, els: Expr) -> Result<Expr, FormulaError> {
    expect_type("ite", &cond, &Type::Bool)?;
    same_type("ite", &then, &els)?;
    let ty = then.ty().clone();
    Ok(Expr::new(ExprKind::Ite(cond, then, els), ty))
}

pub fn read(array: Expr, index: Expr) -> Result<Expr, FormulaError> {
    let Type::Array(it, et) = array.ty().clone() else {
        return Err(FormulaError::TypeMismatch {
            op: "read",
            expected: "Array".to_string(),
            found: array.ty().clone(),
        });
    };
    expect_type("read", &index, &it)?;
    Ok(Expr::new(ExprKind::Read(array, index), (*et).clone()))
}

pub fn write(array: Expr, index: Expr, value: Expr) -> Result<Expr, FormulaError> {
    let Type::Array(it, et) = array.ty().clone() else {
        return Err(FormulaError::TypeMismatch {
            op: "write",
            expected: "Array".to_string(),
            found: array.ty().clone(),
        });
    };
    expect_type("write", &index, &it)?;
    expect_type("write", &value, &et)?;
    let ty = array.ty().clone();
    Ok(Expr::new(ExprKind::Write(array, index, value), ty))
}

fn bv_binary(
    op: &'static str,
    a: Expr,
    b: Expr,
    mk: fn(Expr, Expr) -> ExprKind,
) -> Result<Expr, FormulaError> {
    expect_bitvec(op, &a)?;
    same_type(op, &a, &b)?;
    let ty = a.ty().clone();
    Ok(Expr::new(mk(a, b), ty))
}

pub fn bv_and(a: Expr, b: Expr) -> Result<Expr, FormulaError> {
    bv_binary("bvand", a, b, ExprKind::BvAnd)
}

pub fn bv_or(a: Expr, b: Expr) -> Result<Expr, FormulaError> {
    bv_binary("bvor", a, b, ExprKind::BvOr)
}

pub fn bv_xor(a: Expr, b: Expr) -> Result<Expr, FormulaError> {
    bv_binary("bvxor", a, b, ExprKind::BvXor)
}

pub fn bv_add(a: Expr, b: Expr) -> Result<Expr, FormulaError> {
    bv_binary("bvadd", a, b, ExprKind::BvAdd)
}

pub fn bv_not(a: Expr) -> Result<Expr, FormulaError> {
    expect_bitvec("bvnot", &a)?;
    let ty = a.ty().clone();
    Ok(Expr::new(ExprKind::BvNot(a), ty))
}

pub fn bv_ult(a: Expr, b: Expr) -> Result<Expr, FormulaError> {
    expect_bitvec("bvult", &a)?;
    same_type("bvult", &a, &b)?;
    Ok(Expr::new(ExprKind::BvUlt(a, b), Type::Bool))
}
