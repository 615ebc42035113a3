use crate::access::tuple::{Batch, Tuple};
use crate::catalog::Schema;
use crate::error::QpError;
use crate::query::Condition;

use super::Operator;

/// Page-oriented nested loops: the inner (right) input is reopened and
/// fully re-scanned once per outer (left) page.
pub struct NestedJoin {
    left: Box<dyn Operator>,
    right: Box<dyn Operator>,
    schema: Schema,
    left_indices: Vec<usize>,
    right_indices: Vec<usize>,
    conditions: Vec<Condition>,
    batch_size: usize,

    left_batch: Option<Batch>,
    right_batch: Option<Batch>,
    left_pos: usize,
    right_pos: usize,
    end_of_left: bool,
}

pub(super) fn join_indices(
    left_schema: &Schema,
    right_schema: &Schema,
    conditions: &[Condition],
) -> Result<(Vec<usize>, Vec<usize>), QpError> {
    let mut left_indices = Vec::with_capacity(conditions.len());
    let mut right_indices = Vec::with_capacity(conditions.len());
    for condition in conditions {
        left_indices.push(left_schema.index_of(&condition.lhs).ok_or_else(|| {
            QpError::Plan(format!("join column {} not in left input", condition.lhs))
        })?);
        right_indices.push(right_schema.index_of(condition.rhs_attr()).ok_or_else(
            || {
                QpError::Plan(format!(
                    "join column {} not in right input",
                    condition.rhs_attr()
                ))
            },
        )?);
    }
    Ok((left_indices, right_indices))
}

pub(super) fn matches(
    left: &Tuple,
    right: &Tuple,
    left_indices: &[usize],
    right_indices: &[usize],
    conditions: &[Condition],
) -> bool {
    conditions.iter().enumerate().all(|(i, condition)| {
        condition
            .op
            .matches(left.compare_at(right, left_indices[i], right_indices[i]))
    })
}

impl NestedJoin {
    pub fn new(
        left: Box<dyn Operator>,
        right: Box<dyn Operator>,
        conditions: Vec<Condition>,
        schema: Schema,
        page_size: usize,
    ) -> Result<NestedJoin, QpError> {
        let (left_indices, right_indices) =
            join_indices(left.schema(), right.schema(), &conditions)?;
        let batch_size = Batch::capacity_for(page_size, schema.tuple_size());
        Ok(NestedJoin {
            left,
            right,
            schema,
            left_indices,
            right_indices,
            conditions,
            batch_size,
            left_batch: None,
            right_batch: None,
            left_pos: 0,
            right_pos: 0,
            end_of_left: false,
        })
    }

    fn advance_left_page(&mut self) -> Result<bool, QpError> {
        loop {
            match self.left.next()? {
                Some(batch) if !batch.is_empty() => {
                    self.left_batch = Some(batch);
                    self.left_pos = 0;
                    self.right_pos = 0;
                    self.right_batch = None;
                    self.right.open()?;
                    return Ok(true);
                }
                Some(_) => continue,
                None => {
                    self.end_of_left = true;
                    return Ok(false);
                }
            }
        }
    }
}

impl Operator for NestedJoin {
    fn open(&mut self) -> Result<(), QpError> {
        self.left_batch = None;
        self.right_batch = None;
        self.left_pos = 0;
        self.right_pos = 0;
        self.end_of_left = false;
        self.left.open()
    }

    fn next(&mut self) -> Result<Option<Batch>, QpError> {
        if self.end_of_left {
            return Ok(None);
        }
        let mut output = Batch::new(self.batch_size);
        while !output.is_full() {
            if self.left_batch.is_none() && !self.advance_left_page()? {
                break;
            }
            if self.right_batch.is_none() {
                match self.right.next()? {
                    Some(batch) if !batch.is_empty() => {
                        self.right_batch = Some(batch);
                        self.right_pos = 0;
                        self.left_pos = 0;
                    }
                    Some(_) => continue,
                    None => {
                        // inner exhausted for this outer page
                        self.right.close()?;
                        self.left_batch = None;
                        continue;
                    }
                }
            }

            let left_batch = self.left_batch.as_ref().unwrap();
            let right_batch = self.right_batch.as_ref().unwrap();
            let left_tuple = left_batch.get(self.left_pos);
            let right_tuple = right_batch.get(self.right_pos);
            if matches(
                left_tuple,
                right_tuple,
                &self.left_indices,
                &self.right_indices,
                &self.conditions,
            ) {
                output.push(left_tuple.join_with(right_tuple));
            }

            self.left_pos += 1;
            if self.left_pos == left_batch.len() {
                self.left_pos = 0;
                self.right_pos += 1;
                if self.right_pos == right_batch.len() {
                    self.right_batch = None;
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
    use crate::query::CompareOp;
    use crate::types::TupleValue;

    pub(crate) fn emp_schema() -> Schema {
        Schema::new(vec![
            Column::new(Attribute::new("emp", "id"), ColumnType::Int),
            Column::new(Attribute::new("emp", "deptid"), ColumnType::Int),
        ])
    }

    pub(crate) fn dept_schema() -> Schema {
        Schema::new(vec![Column::new(
            Attribute::new("dept", "id"),
            ColumnType::Int,
        )])
    }

    fn emp(id: i32, deptid: i32) -> Tuple {
        Tuple::new(vec![
            Some(TupleValue::Int(id)),
            Some(TupleValue::Int(deptid)),
        ])
    }

    fn dept(id: i32) -> Tuple {
        Tuple::new(vec![Some(TupleValue::Int(id))])
    }

    fn join_condition() -> Condition {
        Condition::join(
            Attribute::new("emp", "deptid"),
            CompareOp::Equal,
            Attribute::new("dept", "id"),
        )
    }

    #[test]
    fn test_nested_join_emits_all_matches() {
        let left = MockSource::new(
            emp_schema(),
            vec![emp(1, 10), emp(2, 20), emp(3, 10), emp(4, 30)],
            2,
        );
        let right = MockSource::new(dept_schema(), vec![dept(10), dept(20)], 2);
        let mut join = NestedJoin::new(
            Box::new(left),
            Box::new(right),
            vec![join_condition()],
            emp_schema().join_with(&dept_schema()),
            100,
        )
        .unwrap();
        let mut out = collect(&mut join).unwrap();
        out.sort_by(|a, b| a.compare_at(b, 0, 0));
        assert_eq!(
            out,
            vec![
                emp(1, 10).join_with(&dept(10)),
                emp(2, 20).join_with(&dept(20)),
                emp(3, 10).join_with(&dept(10)),
            ]
        );
    }

    #[test]
    fn test_nested_join_empty_inner_yields_nothing() {
        let left = MockSource::new(emp_schema(), vec![emp(1, 10)], 2);
        let right = MockSource::new(dept_schema(), Vec::new(), 2);
        let mut join = NestedJoin::new(
            Box::new(left),
            Box::new(right),
            vec![join_condition()],
            emp_schema().join_with(&dept_schema()),
            100,
        )
        .unwrap();
        assert!(collect(&mut join).unwrap().is_empty());
    }
}
