/*
    Pull-based execution. Operators implement open/next/close, pass batches
    of at most one page of tuples upward, and never yield an empty batch;
    end of stream is Ok(None). open() after close() restarts the operator
    from the beginning, which the nested-loop joins rely on to re-scan
    their inner input.
 */

use crate::access::tuple::Batch;
use crate::catalog::Schema;
use crate::config::QpConfig;
use crate::error::QpError;
use crate::plan::{JoinMethod, PlanKind, PlanNode};

pub mod block_nested;
pub mod distinct;
pub mod group_by;
pub mod nested_join;
pub mod project;
pub mod scan;
pub mod select;
pub mod sort;
pub mod sort_merge;

pub use sort::ExternalSort;

pub trait Operator {
    fn open(&mut self) -> Result<(), QpError>;
    fn next(&mut self) -> Result<Option<Batch>, QpError>;
    fn close(&mut self) -> Result<(), QpError>;
    fn schema(&self) -> &Schema;
}

/// Materializes the physical operator tree for a finished plan. Sort-merge
/// joins get their inputs wrapped in external sorts on the join keys here;
/// limit and offset stay with the result writer, not the operators.
pub fn build_exec_plan(
    config: &QpConfig,
    plan: &PlanNode,
) -> Result<Box<dyn Operator>, QpError> {
    let buffers = config.buffers_per_join(plan.num_joins());
    build(config, plan, buffers)
}

fn build(
    config: &QpConfig,
    node: &PlanNode,
    buffers: usize,
) -> Result<Box<dyn Operator>, QpError> {
    match &node.kind {
        PlanKind::Scan { table } => Ok(Box::new(scan::Scan::new(
            config.table_path(table, "tbl"),
            node.schema.clone(),
            config.page_size,
        ))),
        PlanKind::Select { base, condition } => {
            let base = build(config, base, buffers)?;
            Ok(Box::new(select::Select::new(base, condition.clone())?))
        }
        PlanKind::Project { base, .. } => {
            let base = build(config, base, buffers)?;
            Ok(Box::new(project::Project::new(
                base,
                node.schema.clone(),
                config.page_size,
            )?))
        }
        PlanKind::Join { left, right, conditions, method, .. } => {
            let left_op = build(config, left, buffers)?;
            let right_op = build(config, right, buffers)?;
            match method {
                JoinMethod::NestedLoop => Ok(Box::new(nested_join::NestedJoin::new(
                    left_op,
                    right_op,
                    conditions.clone(),
                    node.schema.clone(),
                    config.page_size,
                )?)),
                JoinMethod::BlockNested => Ok(Box::new(block_nested::BlockNestedJoin::new(
                    left_op,
                    right_op,
                    conditions.clone(),
                    node.schema.clone(),
                    config.page_size,
                    buffers,
                )?)),
                JoinMethod::SortMerge => {
                    let left_keys: Vec<_> =
                        conditions.iter().map(|c| c.lhs.clone()).collect();
                    let right_keys: Vec<_> =
                        conditions.iter().map(|c| c.rhs_attr().clone()).collect();
                    let sorted_left = Box::new(ExternalSort::new(
                        left_op,
                        &left_keys,
                        buffers,
                        config.page_size,
                    )?);
                    let sorted_right = Box::new(ExternalSort::new(
                        right_op,
                        &right_keys,
                        buffers,
                        config.page_size,
                    )?);
                    Ok(Box::new(sort_merge::SortMergeJoin::new(
                        sorted_left,
                        sorted_right,
                        conditions.clone(),
                        node.schema.clone(),
                        config.page_size,
                    )?))
                }
            }
        }
        PlanKind::Distinct { base, attributes } => {
            let base = build(config, base, buffers)?;
            let sorted = Box::new(ExternalSort::new(
                base,
                attributes,
                buffers,
                config.page_size,
            )?);
            Ok(Box::new(distinct::Distinct::new(sorted, attributes)?))
        }
        PlanKind::GroupBy { base, attributes } => {
            let base = build(config, base, buffers)?;
            let sorted = Box::new(ExternalSort::new(
                base,
                attributes,
                buffers,
                config.page_size,
            )?);
            Ok(Box::new(group_by::GroupBy::new(sorted, attributes)?))
        }
    }
}
