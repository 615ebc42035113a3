use std::cmp::Ordering;

use crate::access::tuple::{Batch, Tuple};
use crate::catalog::{Attribute, Schema};
use crate::error::QpError;

use super::Operator;

/// Drops consecutive duplicates of a sorted stream. The plan builder sorts
/// the input on the compared attributes, so equal tuples arrive adjacent.
pub struct Distinct {
    base: Box<dyn Operator>,
    indices: Vec<usize>,
    last: Option<Tuple>,
}

impl Distinct {
    pub fn new(
        base: Box<dyn Operator>,
        attributes: &[Attribute],
    ) -> Result<Distinct, QpError> {
        let indices = dedup_indices(base.schema(), attributes)?;
        Ok(Distinct {
            base,
            indices,
            last: None,
        })
    }
}

pub(super) fn dedup_indices(
    schema: &Schema,
    attributes: &[Attribute],
) -> Result<Vec<usize>, QpError> {
    attributes
        .iter()
        .map(|attribute| {
            schema.index_of(attribute).ok_or_else(|| {
                QpError::Plan(format!("unknown attribute {} in duplicate elimination", attribute))
            })
        })
        .collect()
}

impl Operator for Distinct {
    fn open(&mut self) -> Result<(), QpError> {
        self.last = None;
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
                let duplicate = self.last.as_ref().map_or(false, |last| {
                    last.compare_on(tuple, &self.indices, &self.indices) == Ordering::Equal
                });
                if !duplicate {
                    output.push(tuple.clone());
                    self.last = Some(tuple.clone());
                }
            }
            if !output.is_empty() {
                return Ok(Some(output));
            }
        }
    }

    fn close(&mut self) -> Result<(), QpError> {
        self.last = None;
        self.base.close()
    }

    fn schema(&self) -> &Schema {
        self.base.schema()
    }
}
