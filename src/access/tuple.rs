use std::cmp::Ordering;

use byteorder::{BigEndian, ByteOrder};

use crate::catalog::{num_null_bytes, ColumnType, Schema};
use crate::error::QpError;
use crate::types::{compare_values, TupleValue};

/*
Tuples are encoded fixed-width so every tuple of a schema occupies exactly
schema.tuple_size() bytes: a null bitmap of len/8+1 bytes (bit i set means
column i is null, first column in the high bit of the first byte), then one
slot per column in schema order. Int and Float take 4 big-endian bytes; a
TEXT(n) slot is a 2-byte length followed by the payload zero-padded to n.
Null slots are written as zeros and skipped on read. The same encoding backs
table data files and sort-run files.
*/
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    pub values: Vec<Option<TupleValue>>,
}

impl Tuple {
    #[inline]
    pub fn new(values: Vec<Option<TupleValue>>) -> Tuple {
        Tuple { values }
    }

    /// Concatenation with `other`, the output of a join match. The result's
    /// schema is the join of the operand schemas.
    pub fn join_with(&self, other: &Tuple) -> Tuple {
        let mut values = Vec::with_capacity(self.values.len() + other.values.len());
        values.extend(self.values.iter().cloned());
        values.extend(other.values.iter().cloned());
        Tuple { values }
    }

    /// Compares column `index` of `self` against column `other_index` of
    /// `other` under the total value order.
    pub fn compare_at(&self, other: &Tuple, index: usize, other_index: usize) -> Ordering {
        compare_values(&self.values[index], &other.values[other_index])
    }

    /// Lexicographic comparison over parallel index lists, left to right.
    pub fn compare_on(&self, other: &Tuple, indices: &[usize], other_indices: &[usize]) -> Ordering {
        for (&i, &j) in indices.iter().zip(other_indices) {
            let result = self.compare_at(other, i, j);
            if result != Ordering::Equal {
                return result;
            }
        }
        Ordering::Equal
    }

    pub fn write_binary(&self, schema: &Schema, buffer: &mut [u8]) {
        debug_assert_eq!(self.values.len(), schema.len());
        debug_assert_eq!(buffer.len(), schema.tuple_size());
        buffer.fill(0);
        let mut offset = num_null_bytes(schema.len());
        for (i, (value, column)) in self.values.iter().zip(schema.columns()).enumerate() {
            let width = column.ty.width();
            match value {
                Some(TupleValue::Int(v)) => {
                    BigEndian::write_i32(&mut buffer[offset..offset + 4], *v)
                }
                Some(TupleValue::Float(v)) => {
                    BigEndian::write_f32(&mut buffer[offset..offset + 4], *v)
                }
                Some(TupleValue::String(s)) => {
                    let declared = match column.ty {
                        ColumnType::Text(len) => len as usize,
                        _ => unreachable!(),
                    };
                    // over-width text is cut at a char boundary so the
                    // stored bytes stay valid utf-8
                    let mut cut = s.len().min(declared);
                    while !s.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    let payload = &s.as_bytes()[..cut];
                    BigEndian::write_u16(&mut buffer[offset..offset + 2], payload.len() as u16);
                    buffer[offset + 2..offset + 2 + payload.len()].copy_from_slice(payload);
                }
                None => {
                    // the slot stays zeroed
                    buffer[i / 8] |= 1 << (7 - (i % 8));
                }
            }
            offset += width;
        }
    }

    pub fn parse_binary(schema: &Schema, src: &[u8]) -> Result<Tuple, QpError> {
        let mut offset = num_null_bytes(schema.len());
        let mut values = Vec::with_capacity(schema.len());
        for (i, column) in schema.columns().iter().enumerate() {
            let is_null = src[i / 8] & (1 << (7 - (i % 8))) != 0;
            if is_null {
                values.push(None);
            } else {
                let value = match column.ty {
                    ColumnType::Int => TupleValue::Int(BigEndian::read_i32(&src[offset..offset + 4])),
                    ColumnType::Float => {
                        TupleValue::Float(BigEndian::read_f32(&src[offset..offset + 4]))
                    }
                    ColumnType::Text(_) => {
                        let len = BigEndian::read_u16(&src[offset..offset + 2]) as usize;
                        let bytes = &src[offset + 2..offset + 2 + len];
                        let text = std::str::from_utf8(bytes)
                            .map_err(|_| {
                                QpError::Catalog("invalid utf-8 in text column".to_string())
                            })?
                            .to_string();
                        TupleValue::String(text)
                    }
                };
                values.push(Some(value));
            }
            offset += column.ty.width();
        }
        Ok(Tuple { values })
    }
}

/// A page worth of tuples: the unit of transfer between operators and the
/// unit of disk I/O for sort runs.
#[derive(Debug, Clone)]
pub struct Batch {
    tuples: Vec<Tuple>,
    capacity: usize,
}

impl Batch {
    pub fn new(capacity: usize) -> Batch {
        Batch {
            tuples: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Tuples per page for the given tuple size, at least 1.
    pub fn capacity_for(page_size: usize, tuple_size: usize) -> usize {
        (page_size / tuple_size).max(1)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tuples.len() >= self.capacity
    }

    pub fn push(&mut self, tuple: Tuple) {
        debug_assert!(!self.is_full());
        self.tuples.push(tuple);
    }

    pub fn get(&self, index: usize) -> &Tuple {
        &self.tuples[index]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tuple> {
        self.tuples.iter()
    }

    pub fn into_tuples(self) -> Vec<Tuple> {
        self.tuples
    }
}
