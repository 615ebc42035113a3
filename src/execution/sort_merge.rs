use std::cmp::Ordering;

use crate::access::tuple::{Batch, Tuple};
use crate::catalog::Schema;
use crate::error::QpError;
use crate::query::{CompareOp, Condition};

use super::nested_join::join_indices;
use super::Operator;

/// Merge join over two inputs pre-sorted on the join keys (the plan
/// builder wraps both children in external sorts). The right side is
/// materialized one key-partition at a time so runs of equal left keys
/// can replay it.
pub struct SortMergeJoin {
    left: Box<dyn Operator>,
    right: Box<dyn Operator>,
    schema: Schema,
    left_indices: Vec<usize>,
    right_indices: Vec<usize>,
    batch_size: usize,

    left_batch: Option<Batch>,
    right_batch: Option<Batch>,
    left_pos: usize,
    right_pos: usize,
    left_tuple: Option<Tuple>,
    right_partition: Vec<Tuple>,
    partition_pos: usize,
    lookahead_right: Option<Tuple>,
    started: bool,
    finished: bool,
}

impl SortMergeJoin {
    pub fn new(
        left: Box<dyn Operator>,
        right: Box<dyn Operator>,
        conditions: Vec<Condition>,
        schema: Schema,
        page_size: usize,
    ) -> Result<SortMergeJoin, QpError> {
        if let Some(condition) = conditions.iter().find(|c| c.op != CompareOp::Equal) {
            return Err(QpError::Plan(format!(
                "sort-merge join requires equality predicates, got {:?} on {}",
                condition.op, condition.lhs
            )));
        }
        let (left_indices, right_indices) =
            join_indices(left.schema(), right.schema(), &conditions)?;
        let batch_size = Batch::capacity_for(page_size, schema.tuple_size());
        Ok(SortMergeJoin {
            left,
            right,
            schema,
            left_indices,
            right_indices,
            batch_size,
            left_batch: None,
            right_batch: None,
            left_pos: 0,
            right_pos: 0,
            left_tuple: None,
            right_partition: Vec::new(),
            partition_pos: 0,
            lookahead_right: None,
            started: false,
            finished: false,
        })
    }

    fn next_left_tuple(&mut self) -> Result<Option<Tuple>, QpError> {
        loop {
            let batch = match self.left_batch.as_ref() {
                Some(batch) if self.left_pos < batch.len() => batch,
                _ => {
                    match self.left.next()? {
                        Some(batch) => {
                            self.left_batch = Some(batch);
                            self.left_pos = 0;
                            continue;
                        }
                        None => {
                            self.left_batch = None;
                            return Ok(None);
                        }
                    }
                }
            };
            let tuple = batch.get(self.left_pos).clone();
            self.left_pos += 1;
            return Ok(Some(tuple));
        }
    }

    fn next_right_tuple(&mut self) -> Result<Option<Tuple>, QpError> {
        loop {
            let batch = match self.right_batch.as_ref() {
                Some(batch) if self.right_pos < batch.len() => batch,
                _ => {
                    match self.right.next()? {
                        Some(batch) => {
                            self.right_batch = Some(batch);
                            self.right_pos = 0;
                            continue;
                        }
                        None => {
                            self.right_batch = None;
                            return Ok(None);
                        }
                    }
                }
            };
            let tuple = batch.get(self.right_pos).clone();
            self.right_pos += 1;
            return Ok(Some(tuple));
        }
    }

    /// Collects the next maximal run of right tuples sharing one key.
    fn next_right_partition(&mut self) -> Result<(), QpError> {
        self.right_partition.clear();
        self.partition_pos = 0;
        if self.lookahead_right.is_none() {
            self.lookahead_right = self.next_right_tuple()?;
        }
        let first = match self.lookahead_right.take() {
            Some(tuple) => tuple,
            None => return Ok(()),
        };
        self.right_partition.push(first);
        loop {
            let candidate = match self.next_right_tuple()? {
                Some(tuple) => tuple,
                None => return Ok(()),
            };
            let same_key = self.right_partition[0]
                .compare_on(&candidate, &self.right_indices, &self.right_indices)
                == Ordering::Equal;
            if same_key {
                self.right_partition.push(candidate);
            } else {
                self.lookahead_right = Some(candidate);
                return Ok(());
            }
        }
    }

    fn compare_keys(&self, left: &Tuple, right: &Tuple) -> Ordering {
        left.compare_on(right, &self.left_indices, &self.right_indices)
    }
}

impl Operator for SortMergeJoin {
    fn open(&mut self) -> Result<(), QpError> {
        self.left.open()?;
        self.right.open()?;
        self.left_batch = None;
        self.right_batch = None;
        self.left_pos = 0;
        self.right_pos = 0;
        self.left_tuple = None;
        self.right_partition.clear();
        self.partition_pos = 0;
        self.lookahead_right = None;
        self.started = false;
        self.finished = false;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Batch>, QpError> {
        if self.finished {
            return Ok(None);
        }
        if !self.started {
            self.started = true;
            self.left_tuple = self.next_left_tuple()?;
            self.next_right_partition()?;
            if self.left_tuple.is_none() || self.right_partition.is_empty() {
                self.finished = true;
                return Ok(None);
            }
        }

        let mut output = Batch::new(self.batch_size);
        while !output.is_full() && !self.finished {
            let left_tuple = match self.left_tuple.clone() {
                Some(tuple) => tuple,
                None => {
                    self.finished = true;
                    break;
                }
            };
            if self.right_partition.is_empty() {
                self.finished = true;
                break;
            }
            match self.compare_keys(&left_tuple, &self.right_partition[0]) {
                Ordering::Equal => {
                    let right_tuple = &self.right_partition[self.partition_pos];
                    output.push(left_tuple.join_with(right_tuple));
                    if self.partition_pos + 1 < self.right_partition.len() {
                        self.partition_pos += 1;
                    } else {
                        // left run exhausted against this partition; replay
                        // it when the next left tuple carries the same key
                        let next_left = self.next_left_tuple()?;
                        match next_left {
                            Some(next) => {
                                let same_key = left_tuple.compare_on(
                                    &next,
                                    &self.left_indices,
                                    &self.left_indices,
                                ) == Ordering::Equal;
                                self.left_tuple = Some(next);
                                if same_key {
                                    self.partition_pos = 0;
                                } else {
                                    self.next_right_partition()?;
                                    if self.right_partition.is_empty() {
                                        self.finished = true;
                                    }
                                }
                            }
                            None => {
                                self.left_tuple = None;
                                self.finished = true;
                            }
                        }
                    }
                }
                Ordering::Greater => {
                    self.next_right_partition()?;
                    if self.right_partition.is_empty() {
                        self.finished = true;
                    }
                }
                Ordering::Less => {
                    self.left_tuple = self.next_left_tuple()?;
                    if self.left_tuple.is_none() {
                        self.finished = true;
                    }
                }
            }
        }
        if output.is_empty() {
            Ok(None)
        } else {
            Ok(Some(output))
        }
    }

    fn close(&mut self) -> Result<(), QpError> {
        self.right.close()?;
        self.left.close()
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::catalog::{Attribute, Column, ColumnType};
    use crate::execution::mock::{collect, MockSource};
    use crate::execution::nested_join::NestedJoin;
    use crate::query::CompareOp;
    use crate::types::TupleValue;

    fn emp_schema() -> Schema {
        Schema::new(vec![
            Column::new(Attribute::new("emp", "id"), ColumnType::Int),
            Column::new(Attribute::new("emp", "deptid"), ColumnType::Int),
        ])
    }

    fn dept_schema() -> Schema {
        Schema::new(vec![
            Column::new(Attribute::new("dept", "id"), ColumnType::Int),
            Column::new(Attribute::new("dept", "locid"), ColumnType::Int),
        ])
    }

    fn emp(id: i32, deptid: i32) -> Tuple {
        Tuple::new(vec![
            Some(TupleValue::Int(id)),
            Some(TupleValue::Int(deptid)),
        ])
    }

    fn dept(id: i32, locid: i32) -> Tuple {
        Tuple::new(vec![
            Some(TupleValue::Int(id)),
            Some(TupleValue::Int(locid)),
        ])
    }

    fn join_condition() -> Condition {
        Condition::join(
            Attribute::new("emp", "deptid"),
            CompareOp::Equal,
            Attribute::new("dept", "id"),
        )
    }

    #[test]
    fn test_sort_merge_handles_duplicate_keys_on_both_sides() {
        // pre-sorted on the join keys
        let emps = vec![emp(1, 10), emp(2, 10), emp(3, 20), emp(4, 30)];
        let depts = vec![dept(10, 1), dept(10, 2), dept(20, 1), dept(40, 9)];
        let mut join = SortMergeJoin::new(
            Box::new(MockSource::new(emp_schema(), emps, 2)),
            Box::new(MockSource::new(dept_schema(), depts, 3)),
            vec![join_condition()],
            emp_schema().join_with(&dept_schema()),
            200,
        )
        .unwrap();
        let mut out = collect(&mut join).unwrap();
        let key = |a: &Tuple, b: &Tuple| a.compare_on(b, &[0, 3], &[0, 3]);
        out.sort_by(key);
        assert_eq!(
            out,
            vec![
                emp(1, 10).join_with(&dept(10, 1)),
                emp(1, 10).join_with(&dept(10, 2)),
                emp(2, 10).join_with(&dept(10, 1)),
                emp(2, 10).join_with(&dept(10, 2)),
                emp(3, 20).join_with(&dept(20, 1)),
            ]
        );
    }

    #[test]
    fn test_sort_merge_matches_nested_join_multiset() {
        let emps_sorted: Vec<Tuple> = (0..30).map(|i| emp(i, (i * 7 % 5) * 10)).collect();
        let mut emps_by_key = emps_sorted.clone();
        emps_by_key.sort_by(|a, b| a.compare_at(b, 1, 1));
        let depts_sorted: Vec<Tuple> = (0..5).map(|i| dept(i * 10, i)).collect();

        let mut merge_join = SortMergeJoin::new(
            Box::new(MockSource::new(emp_schema(), emps_by_key, 4)),
            Box::new(MockSource::new(dept_schema(), depts_sorted.clone(), 4)),
            vec![join_condition()],
            emp_schema().join_with(&dept_schema()),
            200,
        )
        .unwrap();
        let mut nested = NestedJoin::new(
            Box::new(MockSource::new(emp_schema(), emps_sorted, 4)),
            Box::new(MockSource::new(dept_schema(), depts_sorted, 4)),
            vec![join_condition()],
            emp_schema().join_with(&dept_schema()),
            200,
        )
        .unwrap();

        let mut merge_out = collect(&mut merge_join).unwrap();
        let mut nested_out = collect(&mut nested).unwrap();
        let key = |a: &Tuple, b: &Tuple| a.compare_on(b, &[0, 1, 2, 3], &[0, 1, 2, 3]);
        merge_out.sort_by(key);
        nested_out.sort_by(key);
        assert_eq!(merge_out, nested_out);
    }

    #[test]
    fn test_non_equality_condition_rejected() {
        let condition = Condition::join(
            Attribute::new("emp", "deptid"),
            CompareOp::GreaterThan,
            Attribute::new("dept", "id"),
        );
        assert!(SortMergeJoin::new(
            Box::new(MockSource::new(emp_schema(), Vec::new(), 2)),
            Box::new(MockSource::new(dept_schema(), Vec::new(), 2)),
            vec![condition],
            emp_schema().join_with(&dept_schema()),
            200,
        )
        .is_err());
    }

    #[test]
    fn test_sort_merge_empty_side_yields_nothing() {
        let mut join = SortMergeJoin::new(
            Box::new(MockSource::new(emp_schema(), vec![emp(1, 10)], 2)),
            Box::new(MockSource::new(dept_schema(), Vec::new(), 2)),
            vec![join_condition()],
            emp_schema().join_with(&dept_schema()),
            200,
        )
        .unwrap();
        assert!(collect(&mut join).unwrap().is_empty());
    }
}
