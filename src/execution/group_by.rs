use std::cmp::Ordering;

use crate::access::tuple::{Batch, Tuple};
use crate::catalog::{Attribute, Schema};
use crate::error::QpError;

use super::distinct::dedup_indices;
use super::Operator;

/// Keeps one representative tuple per group of a stream sorted on the
/// grouping attributes. No aggregate values are computed; aggregate columns
/// carry the representative's field.
pub struct GroupBy {
    base: Box<dyn Operator>,
    indices: Vec<usize>,
    current_group: Option<Tuple>,
}

impl GroupBy {
    pub fn new(
        base: Box<dyn Operator>,
        attributes: &[Attribute],
    ) -> Result<GroupBy, QpError> {
        let indices = dedup_indices(base.schema(), attributes)?;
        Ok(GroupBy {
            base,
            indices,
            current_group: None,
        })
    }
}

impl Operator for GroupBy {
    fn open(&mut self) -> Result<(), QpError> {
        self.current_group = None;
        self.base.open()
    }

    fn next(&mut self) -> Result<Option<Batch>, QpError> {
        loop {
            let input = match self.base.next()? {
                Some(batch) => batch,
                None => return Ok(None),
            };
            let mut output = Batch::new(input.capacity());
            for tuple in input.iter() {
                let same_group = self.current_group.as_ref().map_or(false, |group| {
                    group.compare_on(tuple, &self.indices, &self.indices) == Ordering::Equal
                });
                if !same_group {
                    output.push(tuple.clone());
                    self.current_group = Some(tuple.clone());
                }
            }
            if !output.is_empty() {
                return Ok(Some(output));
            }
        }
    }

    fn close(&mut self) -> Result<(), QpError> {
        self.current_group = None;
        self.base.close()
    }

    fn schema(&self) -> &Schema {
        self.base.schema()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::catalog::{Column, ColumnType};
    use crate::execution::mock::{collect, MockSource};
    use crate::types::TupleValue;

    fn schema() -> Schema {
        Schema::new(vec![
            Column::new(Attribute::new("t", "grp"), ColumnType::Int),
            Column::new(Attribute::new("t", "val"), ColumnType::Int),
        ])
    }

    fn row(grp: i32, val: i32) -> Tuple {
        Tuple::new(vec![
            Some(TupleValue::Int(grp)),
            Some(TupleValue::Int(val)),
        ])
    }

    #[test]
    fn test_group_by_keeps_first_tuple_of_each_group() {
        let rows = vec![row(1, 7), row(1, 8), row(2, 1), row(2, 2), row(3, 5)];
        let mut group_by = GroupBy::new(
            Box::new(MockSource::new(schema(), rows, 2)),
            &[Attribute::new("t", "grp")],
        )
        .unwrap();
        assert_eq!(
            collect(&mut group_by).unwrap(),
            vec![row(1, 7), row(2, 1), row(3, 5)]
        );
    }

    #[test]
    fn test_group_by_reopen_resets_group_state() {
        let rows = vec![row(1, 7), row(1, 8)];
        let mut group_by = GroupBy::new(
            Box::new(MockSource::new(schema(), rows, 2)),
            &[Attribute::new("t", "grp")],
        )
        .unwrap();
        assert_eq!(collect(&mut group_by).unwrap(), vec![row(1, 7)]);
        assert_eq!(collect(&mut group_by).unwrap(), vec![row(1, 7)]);
    }
}
