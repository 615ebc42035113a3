use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use itertools::Itertools;

use crate::error::QpError;
use crate::execution::Operator;

/// Drains an operator tree into a tab-separated text file. The first line
/// names the output columns; nulls print as NULL. Offset and limit are
/// applied here, counted over the operator's output order.
pub struct ResultWriter {
    limit: Option<u64>,
    offset: u64,
}

impl ResultWriter {
    pub fn new(limit: Option<u64>, offset: u64) -> ResultWriter {
        ResultWriter { limit, offset }
    }

    pub fn write_file(&self, path: &Path, root: &mut dyn Operator) -> Result<u64, QpError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let written = self.write(&mut writer, root)?;
        writer.flush()?;
        Ok(written)
    }

    /// Returns the number of result rows written, header excluded.
    pub fn write<W: Write>(
        &self,
        out: &mut W,
        root: &mut dyn Operator,
    ) -> Result<u64, QpError> {
        let header = root.schema().attributes().join("\t");
        writeln!(out, "{}", header)?;

        root.open()?;
        let mut to_skip = self.offset;
        let mut written = 0u64;
        'drain: while let Some(batch) = root.next()? {
            for tuple in batch.iter() {
                if to_skip > 0 {
                    to_skip -= 1;
                    continue;
                }
                if let Some(limit) = self.limit {
                    if written >= limit {
                        break 'drain;
                    }
                }
                let line = tuple
                    .values
                    .iter()
                    .map(|value| match value {
                        Some(value) => value.to_string(),
                        None => "NULL".to_string(),
                    })
                    .join("\t");
                writeln!(out, "{}", line)?;
                written += 1;
            }
        }
        root.close()?;
        Ok(written)
    }
}
