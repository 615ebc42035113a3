use std::fmt::Display;

use crate::catalog::{Attribute, Schema};
use crate::error::QpError;
use crate::query::Condition;

/// Physical join strategy tag carried by a Join node. The optimizer picks
/// and re-picks these; the executor materializes the matching operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMethod {
    NestedLoop,
    BlockNested,
    SortMerge,
}

impl JoinMethod {
    pub const ALL: [JoinMethod; 3] = [
        JoinMethod::NestedLoop,
        JoinMethod::BlockNested,
        JoinMethod::SortMerge,
    ];

    /// Methods admissible for `conditions`. Sort-merge computes an
    /// equi-join, so it is only offered when every predicate is an
    /// equality.
    pub fn candidates(conditions: &[Condition]) -> &'static [JoinMethod] {
        if conditions.iter().all(|c| c.op == crate::query::CompareOp::Equal) {
            &JoinMethod::ALL
        } else {
            &JoinMethod::ALL[..2]
        }
    }
}

impl Display for JoinMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinMethod::NestedLoop => write!(f, "NESTED"),
            JoinMethod::BlockNested => write!(f, "BLOCKNESTED"),
            JoinMethod::SortMerge => write!(f, "SORTMERGE"),
        }
    }
}

/// One node of the plan tree. Every node owns its schema (recomputed, never
/// shared, when children change); limit and offset are only meaningful at
/// the root. Clone is a full deep copy — node identities are fresh, join
/// node-indices are preserved — which is what the search relies on when it
/// mutates candidate copies.
#[derive(Debug, Clone)]
pub struct PlanNode {
    pub kind: PlanKind,
    pub schema: Schema,
    pub limit: Option<u64>,
    pub offset: u64,
}

#[derive(Debug, Clone)]
pub enum PlanKind {
    Scan {
        table: String,
    },
    Select {
        base: Box<PlanNode>,
        condition: Condition,
    },
    Project {
        base: Box<PlanNode>,
        attributes: Vec<Attribute>,
    },
    Join {
        left: Box<PlanNode>,
        right: Box<PlanNode>,
        conditions: Vec<Condition>,
        method: JoinMethod,
        /// Stable identifier of this logical join edge; survives every
        /// rewrite so the neighbor generator can address the node no
        /// matter where rotations have moved it.
        node_index: usize,
    },
    Distinct {
        base: Box<PlanNode>,
        attributes: Vec<Attribute>,
    },
    GroupBy {
        base: Box<PlanNode>,
        attributes: Vec<Attribute>,
    },
}

impl PlanNode {
    pub fn new(kind: PlanKind, schema: Schema) -> PlanNode {
        PlanNode {
            kind,
            schema,
            limit: None,
            offset: 0,
        }
    }

    /// Throwaway node used to take ownership during tree restructuring.
    pub(crate) fn placeholder() -> PlanNode {
        PlanNode::new(PlanKind::Scan { table: String::new() }, Schema::new(Vec::new()))
    }

    pub fn num_joins(&self) -> usize {
        match &self.kind {
            PlanKind::Scan { .. } => 0,
            PlanKind::Select { base, .. }
            | PlanKind::Project { base, .. }
            | PlanKind::Distinct { base, .. }
            | PlanKind::GroupBy { base, .. } => base.num_joins(),
            PlanKind::Join { left, right, .. } => 1 + left.num_joins() + right.num_joins(),
        }
    }

    /// The join node carrying `index`, if any.
    pub fn find_join(&self, index: usize) -> Option<&PlanNode> {
        match &self.kind {
            PlanKind::Scan { .. } => None,
            PlanKind::Select { base, .. }
            | PlanKind::Project { base, .. }
            | PlanKind::Distinct { base, .. }
            | PlanKind::GroupBy { base, .. } => base.find_join(index),
            PlanKind::Join { left, right, node_index, .. } => {
                if *node_index == index {
                    Some(self)
                } else {
                    left.find_join(index).or_else(|| right.find_join(index))
                }
            }
        }
    }

    pub fn find_join_mut(&mut self, index: usize) -> Option<&mut PlanNode> {
        if matches!(&self.kind, PlanKind::Join { node_index, .. } if *node_index == index) {
            return Some(self);
        }
        match &mut self.kind {
            PlanKind::Scan { .. } => None,
            PlanKind::Select { base, .. }
            | PlanKind::Project { base, .. }
            | PlanKind::Distinct { base, .. }
            | PlanKind::GroupBy { base, .. } => base.find_join_mut(index),
            PlanKind::Join { left, right, .. } => {
                left.find_join_mut(index).or_else(|| right.find_join_mut(index))
            }
        }
    }

    /// Recomputes every derived schema bottom-up. Required after any
    /// rewrite that swaps children or conditions, since cached schemas
    /// anywhere above the touched node are stale afterwards.
    pub fn refresh_schema(&mut self) -> Result<(), QpError> {
        match &mut self.kind {
            PlanKind::Scan { .. } => Ok(()),
            PlanKind::Select { base, .. } => {
                base.refresh_schema()?;
                self.schema = base.schema.clone();
                Ok(())
            }
            PlanKind::Project { base, attributes } => {
                base.refresh_schema()?;
                self.schema = base.schema.sub_schema(attributes)?;
                Ok(())
            }
            PlanKind::Join { left, right, .. } => {
                left.refresh_schema()?;
                right.refresh_schema()?;
                self.schema = left.schema.join_with(&right.schema);
                Ok(())
            }
            PlanKind::Distinct { base, .. } | PlanKind::GroupBy { base, .. } => {
                base.refresh_schema()?;
                self.schema = base.schema.clone();
                Ok(())
            }
        }
    }
}

impl Display for PlanNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            PlanKind::Scan { table } => write!(f, "SCAN({})", table),
            PlanKind::Select { base, condition } => {
                write!(f, "SELECT({} on {})", base, condition.lhs)
            }
            PlanKind::Project { base, .. } => write!(f, "PROJECT({})", base),
            PlanKind::Join { left, right, method, node_index, .. } => {
                write!(f, "JOIN#{}[{}]({}, {})", node_index, method, left, right)
            }
            PlanKind::Distinct { base, .. } => write!(f, "DISTINCT({})", base),
            PlanKind::GroupBy { base, .. } => write!(f, "GROUPBY({})", base),
        }
    }
}
