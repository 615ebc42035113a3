use crate::catalog::Attribute;
use crate::types::TupleValue;

/// Comparison operator of a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessThanOrEqual,
    GreaterThanOrEqual,
}

impl CompareOp {
    /// The operator with its sides swapped: `a < b` is `b > a`.
    pub fn mirrored(&self) -> CompareOp {
        match self {
            CompareOp::Equal => CompareOp::Equal,
            CompareOp::NotEqual => CompareOp::NotEqual,
            CompareOp::LessThan => CompareOp::GreaterThan,
            CompareOp::GreaterThan => CompareOp::LessThan,
            CompareOp::LessThanOrEqual => CompareOp::GreaterThanOrEqual,
            CompareOp::GreaterThanOrEqual => CompareOp::LessThanOrEqual,
        }
    }

    pub fn matches(&self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CompareOp::Equal => ordering == Equal,
            CompareOp::NotEqual => ordering != Equal,
            CompareOp::LessThan => ordering == Less,
            CompareOp::GreaterThan => ordering == Greater,
            CompareOp::LessThanOrEqual => ordering != Greater,
            CompareOp::GreaterThanOrEqual => ordering != Less,
        }
    }
}

/// Right-hand side of a predicate: a literal or another column.
#[derive(Debug, Clone, PartialEq)]
pub enum CondRhs {
    Value(TupleValue),
    Attr(Attribute),
}

/// Whether a condition filters one table or connects two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionKind {
    Select,
    Join,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub lhs: Attribute,
    pub op: CompareOp,
    pub rhs: CondRhs,
    pub kind: ConditionKind,
}

impl Condition {
    pub fn select(lhs: Attribute, op: CompareOp, rhs: CondRhs) -> Condition {
        Condition {
            lhs,
            op,
            rhs,
            kind: ConditionKind::Select,
        }
    }

    pub fn join(lhs: Attribute, op: CompareOp, rhs: Attribute) -> Condition {
        Condition {
            lhs,
            op,
            rhs: CondRhs::Attr(rhs),
            kind: ConditionKind::Join,
        }
    }

    /// The attribute on the right side; only meaningful for join conditions.
    pub fn rhs_attr(&self) -> &Attribute {
        match &self.rhs {
            CondRhs::Attr(attr) => attr,
            CondRhs::Value(_) => panic!("rhs_attr on a literal condition"),
        }
    }

    /// Swaps the two sides and mirrors the operator, preserving semantics.
    /// Used by the commutativity rewrite; literal conditions keep their
    /// shape since only attribute-attribute predicates get commuted.
    pub fn flip(&mut self) {
        if let CondRhs::Attr(rhs) = &mut self.rhs {
            std::mem::swap(&mut self.lhs, rhs);
            self.op = self.op.mirrored();
        }
    }
}

/// The logical query description produced by the parser; read-only input
/// to the plan builder.
#[derive(Debug, Clone)]
pub struct SqlQuery {
    /// Tables in declaration order.
    pub from: Vec<String>,
    /// Single-table filters.
    pub selections: Vec<Condition>,
    /// Two-table join predicates; index in this list is the stable join
    /// node-index used by the randomized rewrites.
    pub joins: Vec<Condition>,
    /// Empty means keep all columns.
    pub projections: Vec<Attribute>,
    pub group_by: Vec<Attribute>,
    pub distinct: bool,
    pub limit: Option<u64>,
    pub offset: u64,
}

impl SqlQuery {
    pub fn num_joins(&self) -> usize {
        self.joins.len()
    }
}
