/*
    Random initial plan construction: scans for every from-table, selections
    wrapped around the owning subtree, then the join edges incorporated in a
    uniformly random order with uniformly random method tags. Projection,
    grouping and distinct go on top, and the root carries limit/offset.
 */

use std::collections::HashMap;

use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::catalog::load_schema;
use crate::config::QpConfig;
use crate::error::QpError;
use crate::plan::{JoinMethod, PlanKind, PlanNode};
use crate::query::SqlQuery;

pub struct InitialPlanBuilder<'a> {
    config: &'a QpConfig,
    query: &'a SqlQuery,
}

impl<'a> InitialPlanBuilder<'a> {
    pub fn new(config: &'a QpConfig, query: &'a SqlQuery) -> InitialPlanBuilder<'a> {
        InitialPlanBuilder { config, query }
    }

    pub fn num_joins(&self) -> usize {
        self.query.num_joins()
    }

    /// Builds one random member of the plan space. Each call re-randomizes
    /// the join order and method tags; everything else is deterministic.
    pub fn build(&self, rng: &mut StdRng) -> Result<PlanNode, QpError> {
        // Arena of in-progress subtrees plus a table-name map pointing at
        // the slot currently holding each table's subtree. Joins merge two
        // slots into a fresh one.
        let mut arena: Vec<Option<PlanNode>> = Vec::new();
        let mut table_slot: HashMap<String, usize> = HashMap::new();

        for table in &self.query.from {
            let schema = load_schema(self.config.data_dir(), table)?;
            arena.push(Some(PlanNode::new(
                PlanKind::Scan { table: table.clone() },
                schema,
            )));
            table_slot.insert(table.clone(), arena.len() - 1);
        }

        for condition in &self.query.selections {
            let slot = *table_slot.get(&condition.lhs.table).ok_or_else(|| {
                QpError::Plan(format!(
                    "selection references unknown table {}",
                    condition.lhs.table
                ))
            })?;
            let base = arena[slot].take().ok_or_else(|| {
                QpError::Plan(format!("empty plan slot for table {}", condition.lhs.table))
            })?;
            let schema = base.schema.clone();
            arena[slot] = Some(PlanNode::new(
                PlanKind::Select {
                    base: Box::new(base),
                    condition: condition.clone(),
                },
                schema,
            ));
        }

        let mut order: Vec<usize> = (0..self.query.joins.len()).collect();
        order.shuffle(rng);
        for node_index in order {
            let condition = &self.query.joins[node_index];
            let left_slot = *table_slot.get(&condition.lhs.table).ok_or_else(|| {
                QpError::Plan(format!(
                    "join references unknown table {}",
                    condition.lhs.table
                ))
            })?;
            let right_slot = *table_slot.get(&condition.rhs_attr().table).ok_or_else(|| {
                QpError::Plan(format!(
                    "join references unknown table {}",
                    condition.rhs_attr().table
                ))
            })?;
            if left_slot == right_slot {
                return Err(QpError::Plan(format!(
                    "join graph contains a cycle through {} and {}",
                    condition.lhs.table,
                    condition.rhs_attr().table
                )));
            }
            let left = arena[left_slot].take().ok_or_else(|| {
                QpError::Plan("join operand slot already consumed".to_string())
            })?;
            let right = arena[right_slot].take().ok_or_else(|| {
                QpError::Plan("join operand slot already consumed".to_string())
            })?;
            let candidates = JoinMethod::candidates(std::slice::from_ref(condition));
            let method = candidates[rng.gen_range(0..candidates.len())];
            debug!(
                "initial plan: join {} ({}) on {}",
                node_index, method, condition.lhs
            );
            let schema = left.schema.join_with(&right.schema);
            arena.push(Some(PlanNode::new(
                PlanKind::Join {
                    left: Box::new(left),
                    right: Box::new(right),
                    conditions: vec![condition.clone()],
                    method,
                    node_index,
                },
                schema,
            )));
            let merged_slot = arena.len() - 1;
            for slot in table_slot.values_mut() {
                if *slot == left_slot || *slot == right_slot {
                    *slot = merged_slot;
                }
            }
        }

        let mut live = arena.into_iter().flatten();
        let mut root = live
            .next()
            .ok_or_else(|| QpError::Plan("query has no from-tables".to_string()))?;
        if live.next().is_some() {
            return Err(QpError::Plan(
                "join graph does not connect all from-tables".to_string(),
            ));
        }

        if !self.query.projections.is_empty() {
            let schema = root.schema.sub_schema(&self.query.projections)?;
            root = PlanNode::new(
                PlanKind::Project {
                    base: Box::new(root),
                    attributes: self.query.projections.clone(),
                },
                schema,
            );
        }

        if !self.query.group_by.is_empty() {
            let schema = root.schema.clone();
            root = PlanNode::new(
                PlanKind::GroupBy {
                    base: Box::new(root),
                    attributes: self.query.group_by.clone(),
                },
                schema,
            );
        }

        if self.query.distinct {
            let attributes = if self.query.projections.is_empty() {
                root.schema.attributes().cloned().collect()
            } else {
                self.query.projections.clone()
            };
            let schema = root.schema.clone();
            root = PlanNode::new(
                PlanKind::Distinct {
                    base: Box::new(root),
                    attributes,
                },
                schema,
            );
        }

        root.limit = self.query.limit;
        root.offset = self.query.offset;
        Ok(root)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::catalog::{save_schema, Attribute, Column, ColumnType, Schema};
    use crate::query::{CompareOp, CondRhs, Condition};
    use crate::types::TupleValue;
    use rand::SeedableRng;
    use std::path::Path;

    fn seed_schema(dir: &Path, table: &str, columns: &[&str]) {
        let schema = Schema::new(
            columns
                .iter()
                .map(|c| Column::new(Attribute::new(table, *c), ColumnType::Int))
                .collect(),
        );
        save_schema(dir, table, &schema).unwrap();
    }

    fn empty_query(from: &[&str]) -> SqlQuery {
        SqlQuery {
            from: from.iter().map(|t| t.to_string()).collect(),
            selections: Vec::new(),
            joins: Vec::new(),
            projections: Vec::new(),
            group_by: Vec::new(),
            distinct: false,
            limit: None,
            offset: 0,
        }
    }

    #[test]
    fn test_single_table_plan_is_scan() {
        let dir = tempfile::tempdir().unwrap();
        seed_schema(dir.path(), "emp", &["id"]);
        let config = QpConfig::new(dir.path(), 500, 10);
        let query = empty_query(&["emp"]);
        let mut rng = StdRng::seed_from_u64(1);
        let plan = InitialPlanBuilder::new(&config, &query).build(&mut rng).unwrap();
        assert!(matches!(plan.kind, PlanKind::Scan { .. }));
        assert_eq!(plan.num_joins(), 0);
    }

    #[test]
    fn test_selection_wraps_scan_and_limit_lands_on_root() {
        let dir = tempfile::tempdir().unwrap();
        seed_schema(dir.path(), "emp", &["id", "salary"]);
        let config = QpConfig::new(dir.path(), 500, 10);
        let mut query = empty_query(&["emp"]);
        query.selections.push(Condition::select(
            Attribute::new("emp", "salary"),
            CompareOp::GreaterThan,
            CondRhs::Value(TupleValue::Int(100)),
        ));
        query.limit = Some(5);
        query.offset = 2;
        let mut rng = StdRng::seed_from_u64(1);
        let plan = InitialPlanBuilder::new(&config, &query).build(&mut rng).unwrap();
        assert!(matches!(plan.kind, PlanKind::Select { .. }));
        assert_eq!(plan.limit, Some(5));
        assert_eq!(plan.offset, 2);
    }

    #[test]
    fn test_joins_take_condition_index_as_node_index() {
        let dir = tempfile::tempdir().unwrap();
        seed_schema(dir.path(), "emp", &["deptid"]);
        seed_schema(dir.path(), "dept", &["id", "locid"]);
        seed_schema(dir.path(), "loc", &["id"]);
        let config = QpConfig::new(dir.path(), 500, 30);
        let mut query = empty_query(&["emp", "dept", "loc"]);
        query.joins.push(Condition::join(
            Attribute::new("emp", "deptid"),
            CompareOp::Equal,
            Attribute::new("dept", "id"),
        ));
        query.joins.push(Condition::join(
            Attribute::new("dept", "locid"),
            CompareOp::Equal,
            Attribute::new("loc", "id"),
        ));
        // many seeds, every built plan carries both stable indices
        for seed in 0..10 {
            let mut rng = StdRng::seed_from_u64(seed);
            let plan = InitialPlanBuilder::new(&config, &query).build(&mut rng).unwrap();
            assert_eq!(plan.num_joins(), 2);
            assert!(plan.find_join(0).is_some());
            assert!(plan.find_join(1).is_some());
            assert_eq!(plan.schema.len(), 4);
        }
    }

    #[test]
    fn test_distinct_over_empty_projection_covers_all_columns() {
        let dir = tempfile::tempdir().unwrap();
        seed_schema(dir.path(), "emp", &["id", "salary"]);
        let config = QpConfig::new(dir.path(), 500, 10);
        let mut query = empty_query(&["emp"]);
        query.distinct = true;
        let mut rng = StdRng::seed_from_u64(1);
        let plan = InitialPlanBuilder::new(&config, &query).build(&mut rng).unwrap();
        match plan.kind {
            PlanKind::Distinct { attributes, .. } => assert_eq!(attributes.len(), 2),
            _ => panic!("expected distinct at root"),
        }
    }

    #[test]
    fn test_missing_metadata_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = QpConfig::new(dir.path(), 500, 10);
        let query = empty_query(&["ghost"]);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(InitialPlanBuilder::new(&config, &query).build(&mut rng).is_err());
    }

    #[test]
    fn test_disconnected_join_graph_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        seed_schema(dir.path(), "a", &["x"]);
        seed_schema(dir.path(), "b", &["y"]);
        let config = QpConfig::new(dir.path(), 500, 10);
        let query = empty_query(&["a", "b"]);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(InitialPlanBuilder::new(&config, &query).build(&mut rng).is_err());
    }
}
