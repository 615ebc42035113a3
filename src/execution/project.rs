use crate::access::tuple::{Batch, Tuple};
use crate::catalog::Schema;
use crate::error::QpError;

use super::Operator;

/// Narrows each tuple to the projected columns. Aggregate-tagged columns
/// pass their raw value through; rendering the aggregate label is the
/// result writer's concern.
pub struct Project {
    base: Box<dyn Operator>,
    schema: Schema,
    indices: Vec<usize>,
    batch_size: usize,
}

impl Project {
    pub fn new(
        base: Box<dyn Operator>,
        schema: Schema,
        page_size: usize,
    ) -> Result<Project, QpError> {
        let indices = schema
            .attributes()
            .map(|attr| {
                base.schema().index_of(attr).ok_or_else(|| {
                    QpError::Plan(format!("projected column {} not in input", attr))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let batch_size = Batch::capacity_for(page_size, schema.tuple_size());
        Ok(Project { base, schema, indices, batch_size })
    }
}

impl Operator for Project {
    fn open(&mut self) -> Result<(), QpError> {
        self.base.open()
    }

    fn next(&mut self) -> Result<Option<Batch>, QpError> {
        let input = match self.base.next()? {
            Some(batch) => batch,
            None => return Ok(None),
        };
        let mut output = Batch::new(self.batch_size.max(input.len()));
        for tuple in input.into_tuples() {
            let values = self
                .indices
                .iter()
                .map(|&i| tuple.values[i].clone())
                .collect();
            output.push(Tuple::new(values));
        }
        Ok(Some(output))
    }

    fn close(&mut self) -> Result<(), QpError> {
        self.base.close()
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }
}
