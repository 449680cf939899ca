//! Sorts of expressions.

use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Type of an [`Expr`][crate::expr::Expr].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    Bool,
    Int,
    Rat,
    /// Fixed-width unsigned bitvector (width in `1..=64`).
    BitVec(u32),
    Array(Arc<Type>, Arc<Type>),
}

impl Type {
    pub fn array(index: Type, elem: Type) -> Self {
        Type::Array(Arc::new(index), Arc::new(elem))
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Type::Bool)
    }

    /// Int and Rat support arithmetic and ordering.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Rat)
    }

    pub fn is_bitvec(&self) -> bool {
        matches!(self, Type::BitVec(_))
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Bool => write!(f, "Bool"),
            Type::Int => write!(f, "Int"),
            Type::Rat => write!(f, "Rat"),
            Type::BitVec(w) => write!(f, "BitVec[{}]", w),
            Type::Array(i, e) => write!(f, "Array[{} -> {}]", i, e),
        }
    }
}
