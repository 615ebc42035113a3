use std::fs;
use std::path::PathBuf;

use log::debug;
use tempfile::TempDir;

use crate::access::tuple::{Batch, Tuple};
use crate::access::{TupleFileReader, TupleFileWriter};
use crate::catalog::{Attribute, Schema};
use crate::error::QpError;

use super::Operator;

/// Two-phase external sort. open() drains the base input into sorted runs
/// of `num_buffers` pages, then merges them `num_buffers - 1` at a time
/// until one run remains; next() streams that run back page by page.
/// Run files live in a directory owned by this instance and disappear
/// when it closes.
pub struct ExternalSort {
    base: Box<dyn Operator>,
    schema: Schema,
    sort_indices: Vec<usize>,
    num_buffers: usize,
    batch_size: usize,

    temp_dir: Option<TempDir>,
    result: Option<TupleFileReader>,
    done: bool,
}

impl ExternalSort {
    pub fn new(
        base: Box<dyn Operator>,
        sort_attrs: &[Attribute],
        num_buffers: usize,
        page_size: usize,
    ) -> Result<ExternalSort, QpError> {
        if num_buffers < 3 {
            // a merge with fan-in 1 never reduces the run count
            return Err(QpError::Config(format!(
                "external sort needs at least 3 buffer pages, got {}",
                num_buffers
            )));
        }
        let schema = base.schema().clone();
        let sort_indices = sort_attrs
            .iter()
            .map(|attr| {
                schema.index_of(attr).ok_or_else(|| {
                    QpError::Plan(format!("sort column {} not in input", attr))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let batch_size = Batch::capacity_for(page_size, schema.tuple_size());
        Ok(ExternalSort {
            base,
            schema,
            sort_indices,
            num_buffers,
            batch_size,
            temp_dir: None,
            result: None,
            done: false,
        })
    }

    fn run_path(&self, pass: usize, run: usize) -> PathBuf {
        self.temp_dir
            .as_ref()
            .expect("sort opened")
            .path()
            .join(format!("sort-{}-{}", pass, run))
    }

    /// Phase one: read up to `num_buffers` pages at a time, sort them in
    /// memory, spill each run to disk. Returns the run count.
    fn create_sorted_runs(&mut self) -> Result<usize, QpError> {
        let mut num_runs = 0;
        let mut pending = self.base.next()?;
        while let Some(first) = pending.take() {
            let mut tuples: Vec<Tuple> = first.into_tuples();
            for _ in 1..self.num_buffers {
                match self.base.next()? {
                    Some(batch) => tuples.extend(batch.into_tuples()),
                    None => break,
                }
            }
            tuples
                .sort_by(|a, b| a.compare_on(b, &self.sort_indices, &self.sort_indices));
            let path = self.run_path(0, num_runs);
            let mut writer = TupleFileWriter::create(&path, &self.schema)?;
            for tuple in &tuples {
                writer.write_tuple(tuple)?;
            }
            writer.finish()?;
            num_runs += 1;
            pending = self.base.next()?;
        }
        Ok(num_runs)
    }

    /// Phase two: repeatedly merge groups of runs into the next pass until
    /// a single run remains; prior-pass files are removed as soon as their
    /// pass is fully merged.
    fn merge_sorted_runs(&mut self, mut num_runs: usize) -> Result<usize, QpError> {
        let fan_in = self.num_buffers - 1;
        let mut pass = 0;
        while num_runs > 1 {
            let mut output_runs = 0;
            let mut start = 0;
            while start < num_runs {
                let end = (start + fan_in).min(num_runs);
                self.merge_group(pass, start, end, output_runs)?;
                output_runs += 1;
                start = end;
            }
            for run in 0..num_runs {
                fs::remove_file(self.run_path(pass, run))?;
            }
            debug!("sort pass {}: {} runs -> {}", pass, num_runs, output_runs);
            num_runs = output_runs;
            pass += 1;
        }
        Ok(pass)
    }

    /// Merges runs `[start, end)` of `pass` into run `out_run` of the next
    /// pass by always emitting the smallest head among the open runs.
    fn merge_group(
        &mut self,
        pass: usize,
        start: usize,
        end: usize,
        out_run: usize,
    ) -> Result<(), QpError> {
        let mut readers = Vec::with_capacity(end - start);
        for run in start..end {
            readers.push(TupleFileReader::open(&self.run_path(pass, run), &self.schema)?);
        }
        let mut heads: Vec<Option<Tuple>> = Vec::with_capacity(readers.len());
        for reader in readers.iter_mut() {
            heads.push(reader.next_tuple()?);
        }

        let mut writer =
            TupleFileWriter::create(&self.run_path(pass + 1, out_run), &self.schema)?;
        loop {
            let mut min_index: Option<usize> = None;
            for (i, head) in heads.iter().enumerate() {
                let head = match head {
                    Some(tuple) => tuple,
                    None => continue,
                };
                let smaller = match min_index {
                    Some(m) => head
                        .compare_on(
                            heads[m].as_ref().expect("min head present"),
                            &self.sort_indices,
                            &self.sort_indices,
                        )
                        .is_lt(),
                    None => true,
                };
                if smaller {
                    min_index = Some(i);
                }
            }
            let min_index = match min_index {
                Some(i) => i,
                None => break,
            };
            let tuple = heads[min_index].take().expect("selected head present");
            writer.write_tuple(&tuple)?;
            heads[min_index] = readers[min_index].next_tuple()?;
        }
        writer.finish()
    }
}

impl Operator for ExternalSort {
    fn open(&mut self) -> Result<(), QpError> {
        self.base.open()?;
        self.temp_dir = Some(TempDir::new().map_err(QpError::Io)?);
        self.done = false;

        let num_runs = self.create_sorted_runs()?;
        self.base.close()?;
        if num_runs == 0 {
            self.result = None;
            self.done = true;
            return Ok(());
        }
        let final_pass = self.merge_sorted_runs(num_runs)?;
        self.result = Some(TupleFileReader::open(
            &self.run_path(final_pass, 0),
            &self.schema,
        )?);
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Batch>, QpError> {
        if self.done {
            return Ok(None);
        }
        let reader = match self.result.as_mut() {
            Some(reader) => reader,
            None => return Ok(None),
        };
        let mut batch = Batch::new(self.batch_size);
        while !batch.is_full() {
            match reader.next_tuple()? {
                Some(tuple) => batch.push(tuple),
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        if batch.is_empty() {
            Ok(None)
        } else {
            Ok(Some(batch))
        }
    }

    fn close(&mut self) -> Result<(), QpError> {
        self.result = None;
        self.temp_dir = None;
        self.done = true;
        Ok(())
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }
}
