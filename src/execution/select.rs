use crate::access::tuple::{Batch, Tuple};
use crate::catalog::Schema;
use crate::error::QpError;
use crate::query::{CondRhs, Condition};
use crate::types::{compare_values, TupleValue};

use super::Operator;

/// Filters the base stream by a single condition, one batch at a time.
/// Nothing is materialized; an input page that filters down to nothing is
/// skipped rather than forwarded empty.
pub struct Select {
    base: Box<dyn Operator>,
    condition: Condition,
    lhs_index: usize,
    rhs: SelectRhs,
}

enum SelectRhs {
    Literal(Option<TupleValue>),
    Column(usize),
}

impl Select {
    pub fn new(base: Box<dyn Operator>, condition: Condition) -> Result<Select, QpError> {
        let schema = base.schema();
        let lhs_index = schema.index_of(&condition.lhs).ok_or_else(|| {
            QpError::Plan(format!("selection column {} not in input", condition.lhs))
        })?;
        let rhs = match &condition.rhs {
            CondRhs::Value(value) => SelectRhs::Literal(Some(value.clone())),
            CondRhs::Attr(attr) => SelectRhs::Column(schema.index_of(attr).ok_or_else(
                || QpError::Plan(format!("selection column {} not in input", attr)),
            )?),
        };
        Ok(Select { base, condition, lhs_index, rhs })
    }

    fn matches(&self, tuple: &Tuple) -> bool {
        let lhs = &tuple.values[self.lhs_index];
        let ordering = match &self.rhs {
            SelectRhs::Literal(value) => compare_values(lhs, value),
            SelectRhs::Column(index) => compare_values(lhs, &tuple.values[*index]),
        };
        self.condition.op.matches(ordering)
    }
}

impl Operator for Select {
    fn open(&mut self) -> Result<(), QpError> {
        self.base.open()
    }

    fn next(&mut self) -> Result<Option<Batch>, QpError> {
        while let Some(input) = self.base.next()? {
            let mut output = Batch::new(input.capacity());
            for tuple in input.into_tuples() {
                if self.matches(&tuple) {
                    output.push(tuple);
                }
            }
            if !output.is_empty() {
                return Ok(Some(output));
            }
        }
        Ok(None)
    }

    fn close(&mut self) -> Result<(), QpError> {
        self.base.close()
    }

    fn schema(&self) -> &Schema {
        self.base.schema()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::catalog::{Attribute, Column, ColumnType};
    use crate::execution::mock::{collect, MockSource};
    use crate::query::CompareOp;

    fn two_col_schema() -> Schema {
        Schema::new(vec![
            Column::new(Attribute::new("emp", "id"), ColumnType::Int),
            Column::new(Attribute::new("emp", "salary"), ColumnType::Int),
        ])
    }

    fn tuple(id: i32, salary: Option<i32>) -> Tuple {
        Tuple::new(vec![
            Some(TupleValue::Int(id)),
            salary.map(TupleValue::Int),
        ])
    }

    #[test]
    fn test_select_filters_by_literal() {
        let source = MockSource::new(
            two_col_schema(),
            vec![tuple(1, Some(50)), tuple(2, Some(150)), tuple(3, Some(250))],
            2,
        );
        let condition = Condition::select(
            Attribute::new("emp", "salary"),
            CompareOp::GreaterThan,
            CondRhs::Value(TupleValue::Int(100)),
        );
        let mut select = Select::new(Box::new(source), condition).unwrap();
        let out = collect(&mut select).unwrap();
        assert_eq!(out, vec![tuple(2, Some(150)), tuple(3, Some(250))]);
    }

    #[test]
    fn test_select_compares_two_columns() {
        let source = MockSource::new(
            two_col_schema(),
            vec![tuple(100, Some(50)), tuple(10, Some(50))],
            4,
        );
        let condition = Condition::select(
            Attribute::new("emp", "id"),
            CompareOp::LessThan,
            CondRhs::Attr(Attribute::new("emp", "salary")),
        );
        let mut select = Select::new(Box::new(source), condition).unwrap();
        let out = collect(&mut select).unwrap();
        assert_eq!(out, vec![tuple(10, Some(50))]);
    }

    #[test]
    fn test_unknown_column_is_rejected_at_build() {
        let source = MockSource::new(two_col_schema(), Vec::new(), 4);
        let condition = Condition::select(
            Attribute::new("emp", "ghost"),
            CompareOp::Equal,
            CondRhs::Value(TupleValue::Int(1)),
        );
        assert!(Select::new(Box::new(source), condition).is_err());
    }
}
