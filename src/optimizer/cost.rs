/*
    Page-I/O cost model. One estimator instance walks a plan bottom-up
    exactly once, seeding a per-column distinct-count table from each
    Scan's persisted statistics and rescaling it through selections and
    joins. Only Scan, Join and the sort-based operators contribute cost;
    Select and Project are evaluated on the fly and considered free.
 */

use std::collections::HashMap;

use crate::access::tuple::Batch;
use crate::catalog::stats::TableStats;
use crate::catalog::{Attribute, Schema};
use crate::config::QpConfig;
use crate::error::QpError;
use crate::plan::{JoinMethod, PlanKind, PlanNode};

/// Sentinel cost of a plan that cannot run within the buffer budget.
/// Infeasibility is an ordinary search outcome, not an error.
pub const INFINITE_COST: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanEstimate {
    pub cardinality: u64,
    pub cost: u64,
    pub feasible: bool,
}

pub struct PlanCost<'a> {
    config: &'a QpConfig,
    buffers_per_join: usize,
    cost: u64,
    feasible: bool,
    distinct: HashMap<Attribute, u64>,
}

/// Estimated total cost of `plan`, `INFINITE_COST` if it is infeasible.
/// Statistics files are re-read per call; a missing or malformed file
/// is fatal.
pub fn cost_of(config: &QpConfig, plan: &PlanNode) -> Result<u64, QpError> {
    Ok(estimate(config, plan)?.cost)
}

pub fn estimate(config: &QpConfig, plan: &PlanNode) -> Result<PlanEstimate, QpError> {
    let mut estimator = PlanCost {
        config,
        buffers_per_join: config.buffers_per_join(plan.num_joins()),
        cost: 0,
        feasible: true,
        distinct: HashMap::new(),
    };
    let cardinality = estimator.calculate(plan)?;
    Ok(PlanEstimate {
        cardinality,
        cost: if estimator.feasible { estimator.cost } else { INFINITE_COST },
        feasible: estimator.feasible,
    })
}

impl PlanCost<'_> {
    /// Returns the estimated output cardinality of `node`, accumulating
    /// page costs into `self.cost` along the way.
    fn calculate(&mut self, node: &PlanNode) -> Result<u64, QpError> {
        match &node.kind {
            PlanKind::Scan { table } => self.scan_statistics(table, &node.schema),
            PlanKind::Select { base, condition } => {
                let in_tuples = self.calculate(base)?;
                let attr = &condition.lhs;
                let num_distinct = self.lookup_distinct(attr)?.max(1);
                let out_tuples = match condition.op {
                    crate::query::CompareOp::Equal => div_ceil(in_tuples, num_distinct),
                    crate::query::CompareOp::NotEqual => {
                        in_tuples - div_ceil(in_tuples, num_distinct).min(in_tuples)
                    }
                    _ => div_ceil(in_tuples, 2),
                };
                // Rescale every column's distinct estimate by the
                // selectivity, clamped to the new cardinality.
                let in_tuples = in_tuples.max(1);
                for column in node.schema.columns() {
                    if let Some(old) = self.distinct.get_mut(&column.attribute) {
                        let scaled = div_ceil((*old).saturating_mul(out_tuples), in_tuples);
                        *old = scaled.min(out_tuples);
                    }
                }
                Ok(out_tuples)
            }
            PlanKind::Project { base, .. } => self.calculate(base),
            PlanKind::Join { left, right, conditions, method, .. } => {
                let left_tuples = self.calculate(left)?;
                let right_tuples = self.calculate(right)?;
                if !self.feasible {
                    return Ok(0);
                }
                let mut tuples = left_tuples.saturating_mul(right_tuples);
                for condition in conditions {
                    let left_distinct = self.lookup_distinct(&condition.lhs)?;
                    let right_distinct = self.lookup_distinct(condition.rhs_attr())?;
                    tuples /= left_distinct.max(right_distinct).max(1);
                    let merged = left_distinct.min(right_distinct);
                    self.distinct.insert(condition.lhs.clone(), merged);
                    self.distinct.insert(condition.rhs_attr().clone(), merged);
                }
                let left_pages = self.pages(left_tuples, &left.schema);
                let right_pages = self.pages(right_tuples, &right.schema);
                let buffers = self.buffers_per_join as u64;
                if buffers < 3 {
                    self.feasible = false;
                    return Ok(0);
                }
                let join_cost = match method {
                    JoinMethod::NestedLoop => left_pages.saturating_mul(right_pages),
                    JoinMethod::BlockNested => {
                        div_ceil(left_pages, buffers - 2).saturating_mul(right_pages)
                    }
                    JoinMethod::SortMerge => {
                        let left_sort =
                            2 * left_pages.saturating_mul(sort_passes(left_pages, buffers));
                        let right_sort =
                            2 * left_pages.saturating_mul(sort_passes(right_pages, buffers));
                        left_sort.saturating_add(right_sort).saturating_add(right_pages)
                    }
                };
                self.cost = self.cost.saturating_add(join_cost);
                Ok(tuples)
            }
            PlanKind::Distinct { base, .. } | PlanKind::GroupBy { base, .. } => {
                let in_tuples = self.calculate(base)?;
                let pages = self.pages(in_tuples, &base.schema);
                let buffers = self.buffers_per_join as u64;
                if buffers < 3 {
                    self.feasible = false;
                    return Ok(in_tuples);
                }
                self.cost = self
                    .cost
                    .saturating_add(2 * pages.saturating_mul(sort_passes(pages, buffers)));
                // Deduplication's cardinality reduction is not modeled.
                Ok(in_tuples)
            }
        }
    }

    /// Seeds the distinct table from the persisted statistics and charges
    /// one sequential read of the table.
    fn scan_statistics(&mut self, table: &str, schema: &Schema) -> Result<u64, QpError> {
        let stats = TableStats::load(self.config.data_dir(), table, schema)?;
        for (column, count) in schema.columns().iter().zip(stats.distinct.iter()) {
            self.distinct.insert(column.attribute.clone(), *count);
        }
        self.cost = self.cost.saturating_add(self.pages(stats.num_tuples, schema));
        Ok(stats.num_tuples)
    }

    fn pages(&self, tuples: u64, schema: &Schema) -> u64 {
        let capacity = Batch::capacity_for(self.config.page_size, schema.tuple_size()) as u64;
        div_ceil(tuples, capacity)
    }

    fn lookup_distinct(&self, attribute: &Attribute) -> Result<u64, QpError> {
        self.distinct.get(attribute).copied().ok_or_else(|| {
            QpError::Plan(format!("no distinct-count estimate for {}", attribute))
        })
    }
}

fn div_ceil(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

/// Number of passes external sort needs for `pages` pages with `buffers`
/// buffers: one run-producing pass plus ceil(log_{B-1} runs) merge passes.
fn sort_passes(pages: u64, buffers: u64) -> u64 {
    let runs = div_ceil(pages, buffers);
    if runs <= 1 {
        return 1;
    }
    if buffers < 3 {
        // fan-in 1 never converges; callers mark such plans infeasible
        return INFINITE_COST;
    }
    let merge = ((runs as f64).ln() / ((buffers - 1) as f64).ln()).ceil() as u64;
    merge.saturating_add(1)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::catalog::{save_schema, Column, ColumnType};
    use crate::plan::PlanKind;
    use crate::query::{CompareOp, CondRhs, Condition};
    use crate::types::TupleValue;
    use std::path::Path;

    fn int_schema(table: &str, columns: &[&str]) -> Schema {
        Schema::new(
            columns
                .iter()
                .map(|c| Column::new(Attribute::new(table, *c), ColumnType::Int))
                .collect(),
        )
    }

    fn seed_table(dir: &Path, table: &str, schema: &Schema, rows: u64, distinct: &[u64]) {
        save_schema(dir, table, schema).unwrap();
        TableStats::save(
            dir,
            table,
            &TableStats { num_tuples: rows, distinct: distinct.to_vec() },
        )
        .unwrap();
    }

    fn scan(table: &str, schema: Schema) -> PlanNode {
        PlanNode::new(PlanKind::Scan { table: table.to_string() }, schema)
    }

    #[test]
    fn test_scan_cost_is_page_count() {
        let dir = tempfile::tempdir().unwrap();
        let schema = int_schema("emp", &["id"]);
        // tuple size 5, page 500 => 100 tuples per page
        seed_table(dir.path(), "emp", &schema, 10_000, &[100]);
        let config = QpConfig::new(dir.path(), 500, 10);
        let plan = scan("emp", schema);
        let estimate = estimate(&config, &plan).unwrap();
        assert_eq!(estimate.cost, 100);
        assert_eq!(estimate.cardinality, 10_000);
        assert!(estimate.feasible);
    }

    #[test]
    fn test_dedup_charges_sort_but_keeps_input_cardinality() {
        let dir = tempfile::tempdir().unwrap();
        let schema = int_schema("emp", &["id"]);
        seed_table(dir.path(), "emp", &schema, 10_000, &[100]);
        let config = QpConfig::new(dir.path(), 500, 10);
        let base = scan("emp", schema.clone());
        let attributes: Vec<Attribute> = schema.attributes().cloned().collect();
        let plan = PlanNode::new(
            PlanKind::Distinct { base: Box::new(base), attributes },
            schema,
        );
        let estimate = estimate(&config, &plan).unwrap();
        assert!(estimate.cost > 100);
        // Estimated cardinality passes through undeduplicated.
        assert_eq!(estimate.cardinality, 10_000);
    }

    #[test]
    fn test_dedup_below_sort_minimum_is_sentinel_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let schema = int_schema("emp", &["id"]);
        seed_table(dir.path(), "emp", &schema, 10_000, &[100]);
        let config = QpConfig::new(dir.path(), 500, 2);
        let base = scan("emp", schema.clone());
        let attributes: Vec<Attribute> = schema.attributes().cloned().collect();
        let plan = PlanNode::new(
            PlanKind::Distinct { base: Box::new(base), attributes },
            schema,
        );
        let estimate = estimate(&config, &plan).unwrap();
        assert!(!estimate.feasible);
        assert_eq!(cost_of(&config, &plan).unwrap(), INFINITE_COST);
    }

    #[test]
    fn test_equality_selection_divides_by_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let schema = int_schema("emp", &["id"]);
        seed_table(dir.path(), "emp", &schema, 10_000, &[1_000]);
        let config = QpConfig::new(dir.path(), 500, 10);
        let base = scan("emp", schema.clone());
        let plan = PlanNode::new(
            PlanKind::Select {
                base: Box::new(base),
                condition: Condition::select(
                    Attribute::new("emp", "id"),
                    CompareOp::Equal,
                    CondRhs::Value(TupleValue::Int(42)),
                ),
            },
            schema,
        );
        let estimate = estimate(&config, &plan).unwrap();
        assert_eq!(estimate.cardinality, 10);
    }

    #[test]
    fn test_join_cardinality_and_distinct_merge() {
        let dir = tempfile::tempdir().unwrap();
        let left_schema = int_schema("emp", &["deptid"]);
        let right_schema = int_schema("dept", &["id"]);
        seed_table(dir.path(), "emp", &left_schema, 100, &[10]);
        seed_table(dir.path(), "dept", &right_schema, 50, &[5]);
        let config = QpConfig::new(dir.path(), 500, 10);
        let left = scan("emp", left_schema.clone());
        let right = scan("dept", right_schema.clone());
        let plan = PlanNode::new(
            PlanKind::Join {
                left: Box::new(left),
                right: Box::new(right),
                conditions: vec![Condition::join(
                    Attribute::new("emp", "deptid"),
                    CompareOp::Equal,
                    Attribute::new("dept", "id"),
                )],
                method: JoinMethod::NestedLoop,
                node_index: 0,
            },
            left_schema.join_with(&right_schema),
        );
        // 100 * 50 / max(10, 5) = 500
        let joined = estimate(&config, &plan).unwrap();
        assert_eq!(joined.cardinality, 500);
        assert!(joined.feasible);

        // both join attributes now carry the merged distinct count of 5:
        // an equality selection above the join divides by 5, not 10
        let schema = plan.schema.clone();
        let selected = PlanNode::new(
            PlanKind::Select {
                base: Box::new(plan),
                condition: Condition::select(
                    Attribute::new("emp", "deptid"),
                    CompareOp::Equal,
                    CondRhs::Value(TupleValue::Int(1)),
                ),
            },
            schema,
        );
        assert_eq!(estimate(&config, &selected).unwrap().cardinality, 100);
    }

    #[test]
    fn test_infeasible_buffer_budget_is_sentinel_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let left_schema = int_schema("emp", &["deptid"]);
        let right_schema = int_schema("dept", &["id"]);
        seed_table(dir.path(), "emp", &left_schema, 100, &[10]);
        seed_table(dir.path(), "dept", &right_schema, 50, &[5]);
        // 2 buffers for the single join is below the minimum of 3
        let config = QpConfig::new(dir.path(), 500, 2);
        let left = scan("emp", left_schema.clone());
        let right = scan("dept", right_schema.clone());
        let plan = PlanNode::new(
            PlanKind::Join {
                left: Box::new(left),
                right: Box::new(right),
                conditions: vec![Condition::join(
                    Attribute::new("emp", "deptid"),
                    CompareOp::Equal,
                    Attribute::new("dept", "id"),
                )],
                method: JoinMethod::BlockNested,
                node_index: 0,
            },
            left_schema.join_with(&right_schema),
        );
        let estimate = estimate(&config, &plan).unwrap();
        assert!(!estimate.feasible);
        assert_eq!(estimate.cost, INFINITE_COST);
    }

    #[test]
    fn test_deep_copy_estimates_identically() {
        let dir = tempfile::tempdir().unwrap();
        let schema = int_schema("emp", &["id"]);
        seed_table(dir.path(), "emp", &schema, 12_345, &[321]);
        let config = QpConfig::new(dir.path(), 500, 10);
        let plan = scan("emp", schema);
        let copy = plan.clone();
        assert_eq!(
            estimate(&config, &plan).unwrap(),
            estimate(&config, &copy).unwrap()
        );
    }

    #[test]
    fn test_missing_statistics_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = QpConfig::new(dir.path(), 500, 10);
        let plan = scan("ghost", int_schema("ghost", &["id"]));
        assert!(estimate(&config, &plan).is_err());
    }
}
