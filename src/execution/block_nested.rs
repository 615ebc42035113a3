use crate::access::tuple::{Batch, Tuple};
use crate::catalog::Schema;
use crate::error::QpError;
use crate::query::Condition;

use super::nested_join::{join_indices, matches};
use super::Operator;

/// Block nested loops: holds `B - 2` pages of the left input in memory and
/// scans the right input once per block instead of once per page.
pub struct BlockNestedJoin {
    left: Box<dyn Operator>,
    right: Box<dyn Operator>,
    schema: Schema,
    left_indices: Vec<usize>,
    right_indices: Vec<usize>,
    conditions: Vec<Condition>,
    batch_size: usize,
    block_pages: usize,

    block: Vec<Tuple>,
    right_batch: Option<Batch>,
    block_pos: usize,
    right_pos: usize,
    end_of_left: bool,
}

impl BlockNestedJoin {
    pub fn new(
        left: Box<dyn Operator>,
        right: Box<dyn Operator>,
        conditions: Vec<Condition>,
        schema: Schema,
        page_size: usize,
        num_buffers: usize,
    ) -> Result<BlockNestedJoin, QpError> {
        if num_buffers < 3 {
            return Err(QpError::Config(format!(
                "block nested join needs at least 3 buffer pages, got {}",
                num_buffers
            )));
        }
        let (left_indices, right_indices) =
            join_indices(left.schema(), right.schema(), &conditions)?;
        let batch_size = Batch::capacity_for(page_size, schema.tuple_size());
        Ok(BlockNestedJoin {
            left,
            right,
            schema,
            left_indices,
            right_indices,
            conditions,
            batch_size,
            block_pages: num_buffers - 2,
            block: Vec::new(),
            right_batch: None,
            block_pos: 0,
            right_pos: 0,
            end_of_left: false,
        })
    }

    /// Loads the next block of left pages; false when the left input is
    /// exhausted.
    fn load_block(&mut self) -> Result<bool, QpError> {
        self.block.clear();
        for _ in 0..self.block_pages {
            match self.left.next()? {
                Some(batch) => self.block.extend(batch.into_tuples()),
                None => break,
            }
        }
        if self.block.is_empty() {
            self.end_of_left = true;
            return Ok(false);
        }
        self.block_pos = 0;
        self.right_pos = 0;
        self.right_batch = None;
        self.right.open()?;
        Ok(true)
    }
}

impl Operator for BlockNestedJoin {
    fn open(&mut self) -> Result<(), QpError> {
        self.block.clear();
        self.right_batch = None;
        self.block_pos = 0;
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
            if self.block.is_empty() && !self.load_block()? {
                break;
            }
            if self.right_batch.is_none() {
                match self.right.next()? {
                    Some(batch) if !batch.is_empty() => {
                        self.right_batch = Some(batch);
                        self.right_pos = 0;
                        self.block_pos = 0;
                    }
                    Some(_) => continue,
                    None => {
                        self.right.close()?;
                        self.block.clear();
                        continue;
                    }
                }
            }

            let right_batch = self.right_batch.as_ref().unwrap();
            let left_tuple = &self.block[self.block_pos];
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

            self.block_pos += 1;
            if self.block_pos == self.block.len() {
                self.block_pos = 0;
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
