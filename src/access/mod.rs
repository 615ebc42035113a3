pub mod tuple;

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};

use crate::access::tuple::Tuple;
use crate::catalog::Schema;
use crate::error::QpError;

/*
Tuple files (table data files and sort-run files) share one format: a 4-byte
magic, a 2-byte big-endian format version, then fixed-width encoded tuples
back to back. The version is bumped whenever the tuple encoding changes.
*/
const TUPLE_FILE_MAGIC: [u8; 4] = *b"RQTF";
const TUPLE_FILE_VERSION: u16 = 1;

pub struct TupleFileWriter {
    writer: BufWriter<File>,
    schema: Schema,
    record: Vec<u8>,
}

impl TupleFileWriter {
    pub fn create(path: &Path, schema: &Schema) -> Result<TupleFileWriter, QpError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let mut header = [0u8; 6];
        header[..4].copy_from_slice(&TUPLE_FILE_MAGIC);
        BigEndian::write_u16(&mut header[4..], TUPLE_FILE_VERSION);
        writer.write_all(&header)?;
        Ok(TupleFileWriter {
            writer,
            record: vec![0u8; schema.tuple_size()],
            schema: schema.clone(),
        })
    }

    pub fn write_tuple(&mut self, tuple: &Tuple) -> Result<(), QpError> {
        tuple.write_binary(&self.schema, &mut self.record);
        self.writer.write_all(&self.record)?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<(), QpError> {
        self.writer.flush()?;
        Ok(())
    }
}

pub struct TupleFileReader {
    reader: BufReader<File>,
    schema: Schema,
    record: Vec<u8>,
}

impl TupleFileReader {
    pub fn open(path: &Path, schema: &Schema) -> Result<TupleFileReader, QpError> {
        let file = File::open(path).map_err(|e| {
            QpError::Io(std::io::Error::new(
                e.kind(),
                format!("cannot open tuple file {}: {}", path.display(), e),
            ))
        })?;
        let mut reader = BufReader::new(file);
        let mut header = [0u8; 6];
        reader.read_exact(&mut header)?;
        if header[..4] != TUPLE_FILE_MAGIC {
            return Err(QpError::Catalog(format!(
                "{} is not a tuple file",
                path.display()
            )));
        }
        let version = BigEndian::read_u16(&header[4..]);
        if version != TUPLE_FILE_VERSION {
            return Err(QpError::Catalog(format!(
                "{}: unsupported tuple file version {}",
                path.display(),
                version
            )));
        }
        Ok(TupleFileReader {
            reader,
            record: vec![0u8; schema.tuple_size()],
            schema: schema.clone(),
        })
    }

    /// Next tuple in file order, or None at end of file. A truncated
    /// trailing record is an I/O error, not end of stream.
    pub fn next_tuple(&mut self) -> Result<Option<Tuple>, QpError> {
        match self.reader.read_exact(&mut self.record) {
            Ok(()) => Ok(Some(Tuple::parse_binary(&self.schema, &self.record)?)),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Writes a complete tuple file in one go. Table setup and tests use this;
/// the sort operator streams through TupleFileWriter instead.
pub fn write_tuple_file(path: &Path, schema: &Schema, tuples: &[Tuple]) -> Result<(), QpError> {
    let mut writer = TupleFileWriter::create(path, schema)?;
    for tuple in tuples {
        writer.write_tuple(tuple)?;
    }
    writer.finish()
}
