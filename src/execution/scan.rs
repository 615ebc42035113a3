use std::path::PathBuf;

use crate::access::tuple::Batch;
use crate::access::TupleFileReader;
use crate::catalog::Schema;
use crate::error::QpError;

use super::Operator;

/// Reads a table's page file in storage order.
pub struct Scan {
    path: PathBuf,
    schema: Schema,
    batch_size: usize,
    reader: Option<TupleFileReader>,
}

impl Scan {
    pub fn new(path: PathBuf, schema: Schema, page_size: usize) -> Scan {
        let batch_size = Batch::capacity_for(page_size, schema.tuple_size());
        Scan { path, schema, batch_size, reader: None }
    }
}

impl Operator for Scan {
    fn open(&mut self) -> Result<(), QpError> {
        self.reader = Some(TupleFileReader::open(&self.path, &self.schema)?);
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Batch>, QpError> {
        let reader = match self.reader.as_mut() {
            Some(reader) => reader,
            None => return Ok(None),
        };
        let mut batch = Batch::new(self.batch_size);
        while !batch.is_full() {
            match reader.next_tuple()? {
                Some(tuple) => batch.push(tuple),
                None => break,
            }
        }
        if batch.is_empty() {
            self.reader = None;
            Ok(None)
        } else {
            Ok(Some(batch))
        }
    }

    fn close(&mut self) -> Result<(), QpError> {
        self.reader = None;
        Ok(())
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }
}
