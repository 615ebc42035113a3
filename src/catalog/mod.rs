pub mod stats;

use std::fmt::Display;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::Path;

use crate::error::QpError;

/// Aggregate tag carried by projection attributes. The core does not compute
/// aggregates (grouping only dedups); the tag survives so the result writer
/// can render the column header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggKind {
    Max,
    Min,
    Sum,
    Count,
    Avg,
}

impl Display for AggKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggKind::Max => write!(f, "MAX"),
            AggKind::Min => write!(f, "MIN"),
            AggKind::Sum => write!(f, "SUM"),
            AggKind::Count => write!(f, "COUNT"),
            AggKind::Avg => write!(f, "AVG"),
        }
    }
}

/// A column reference: table plus column name, optionally wrapped in an
/// aggregate. Identity is structural over table and column only — two
/// references to the same column are equal regardless of aggregate tag,
/// which is what the statistics table and schema lookups rely on.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub table: String,
    pub column: String,
    pub agg: Option<AggKind>,
}

impl Attribute {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Attribute {
        Attribute {
            table: table.into(),
            column: column.into(),
            agg: None,
        }
    }

    pub fn with_agg(table: impl Into<String>, column: impl Into<String>, agg: AggKind) -> Attribute {
        Attribute {
            table: table.into(),
            column: column.into(),
            agg: Some(agg),
        }
    }
}

impl PartialEq for Attribute {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table && self.column == other.column
    }
}

impl Eq for Attribute {}

impl Hash for Attribute {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.table.hash(state);
        self.column.hash(state);
    }
}

impl Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.agg {
            Some(agg) => write!(f, "{}({}.{})", agg, self.table, self.column),
            None => write!(f, "{}.{}", self.table, self.column),
        }
    }
}

/// Fixed width storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Float,
    /// Text padded to the declared byte length on disk.
    Text(u16),
}

impl ColumnType {
    /// On-disk width of one value of this type (excluding the null bitmap).
    pub fn width(&self) -> usize {
        match self {
            ColumnType::Int => 4,
            ColumnType::Float => 4,
            // 2 length bytes plus the padded payload
            ColumnType::Text(len) => 2 + *len as usize,
        }
    }
}

impl Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnType::Int => write!(f, "INT"),
            ColumnType::Float => write!(f, "FLOAT"),
            ColumnType::Text(len) => write!(f, "TEXT({})", len),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub attribute: Attribute,
    pub ty: ColumnType,
}

impl Column {
    pub fn new(attribute: Attribute, ty: ColumnType) -> Column {
        Column { attribute, ty }
    }
}

/// Ordered list of columns; column positions are addressed by index.
/// Each plan node owns its schema and recomputes it when children change,
/// schemas are never shared between nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    columns: Vec<Column>,
    tuple_size: usize,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Schema {
        let tuple_size = num_null_bytes(columns.len())
            + columns.iter().map(|c| c.ty.width()).sum::<usize>();
        Schema {
            columns,
            tuple_size,
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Byte size of one encoded tuple of this schema, null bitmap included.
    pub fn tuple_size(&self) -> usize {
        self.tuple_size
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> &Column {
        &self.columns[index]
    }

    pub fn index_of(&self, attribute: &Attribute) -> Option<usize> {
        self.columns.iter().position(|c| &c.attribute == attribute)
    }

    pub fn contains(&self, attribute: &Attribute) -> bool {
        self.index_of(attribute).is_some()
    }

    /// Schema of the concatenation of a tuple of `self` with a tuple of
    /// `other`, used by the join operators.
    pub fn join_with(&self, other: &Schema) -> Schema {
        let mut columns = self.columns.clone();
        columns.extend(other.columns.iter().cloned());
        Schema::new(columns)
    }

    /// Projected schema: the requested attributes (aggregate tags kept) in
    /// request order, typed from this schema.
    pub fn sub_schema(&self, attributes: &[Attribute]) -> Result<Schema, QpError> {
        let mut columns = Vec::with_capacity(attributes.len());
        for attribute in attributes {
            let index = self.index_of(attribute).ok_or_else(|| {
                QpError::Plan(format!("unknown attribute {} in projection", attribute))
            })?;
            columns.push(Column::new(attribute.clone(), self.columns[index].ty));
        }
        Ok(Schema::new(columns))
    }

    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.columns.iter().map(|c| &c.attribute)
    }
}

/// Null bitmap prefix size for a tuple with `num_columns` fields.
pub fn num_null_bytes(num_columns: usize) -> usize {
    num_columns / 8 + 1
}

/// Reads the schema of `table` from `<dir>/<table>.md`: one line per column,
/// `<name> <type>`, in column order. Missing or malformed metadata is fatal.
pub fn load_schema(dir: &Path, table: &str) -> Result<Schema, QpError> {
    let path = dir.join(format!("{}.md", table));
    let content = fs::read_to_string(&path).map_err(|e| {
        QpError::Catalog(format!("cannot read table metadata {}: {}", path.display(), e))
    })?;
    let mut columns = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let name = parts.next().ok_or_else(|| {
            QpError::Catalog(format!("{}:{}: missing column name", path.display(), lineno + 1))
        })?;
        let ty = match parts.next() {
            Some("INT") => ColumnType::Int,
            Some("FLOAT") => ColumnType::Float,
            Some(text) if text.starts_with("TEXT(") && text.ends_with(')') => {
                let len = text["TEXT(".len()..text.len() - 1].parse::<u16>().map_err(|_| {
                    QpError::Catalog(format!(
                        "{}:{}: bad TEXT length in '{}'",
                        path.display(),
                        lineno + 1,
                        text
                    ))
                })?;
                ColumnType::Text(len)
            }
            other => {
                return Err(QpError::Catalog(format!(
                    "{}:{}: unknown column type {:?}",
                    path.display(),
                    lineno + 1,
                    other
                )))
            }
        };
        columns.push(Column::new(Attribute::new(table, name), ty));
    }
    if columns.is_empty() {
        return Err(QpError::Catalog(format!(
            "table metadata {} declares no columns",
            path.display()
        )));
    }
    Ok(Schema::new(columns))
}

/// Writes `<dir>/<table>.md` in the format `load_schema` reads.
pub fn save_schema(dir: &Path, table: &str, schema: &Schema) -> Result<(), QpError> {
    let path = dir.join(format!("{}.md", table));
    let mut file = fs::File::create(&path)?;
    for column in schema.columns() {
        writeln!(file, "{} {}", column.attribute.column, column.ty)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn employee_schema() -> Schema {
        Schema::new(vec![
            Column::new(Attribute::new("emp", "id"), ColumnType::Int),
            Column::new(Attribute::new("emp", "name"), ColumnType::Text(16)),
            Column::new(Attribute::new("emp", "rate"), ColumnType::Float),
        ])
    }

    #[test]
    fn test_attribute_identity_ignores_agg() {
        let plain = Attribute::new("emp", "id");
        let agg = Attribute::with_agg("emp", "id", AggKind::Max);
        assert_eq!(plain, agg);
        let other = Attribute::new("emp", "name");
        assert_ne!(plain, other);
    }

    #[test]
    fn test_tuple_size() {
        // 1 null byte + 4 + (2 + 16) + 4
        assert_eq!(employee_schema().tuple_size(), 27);
    }

    #[test]
    fn test_index_of_and_contains() {
        let schema = employee_schema();
        assert_eq!(schema.index_of(&Attribute::new("emp", "rate")), Some(2));
        assert_eq!(schema.index_of(&Attribute::new("emp", "missing")), None);
        assert!(schema.contains(&Attribute::new("emp", "name")));
        assert!(!schema.contains(&Attribute::new("dept", "name")));
    }

    #[test]
    fn test_join_with_concatenates_in_order() {
        let left = employee_schema();
        let right = Schema::new(vec![
            Column::new(Attribute::new("dept", "id"), ColumnType::Int),
        ]);
        let joined = left.join_with(&right);
        assert_eq!(joined.len(), 4);
        assert_eq!(joined.index_of(&Attribute::new("dept", "id")), Some(3));
    }

    #[test]
    fn test_sub_schema_keeps_request_order_and_agg() {
        let schema = employee_schema();
        let projected = schema
            .sub_schema(&[
                Attribute::with_agg("emp", "rate", AggKind::Avg),
                Attribute::new("emp", "id"),
            ])
            .unwrap();
        assert_eq!(projected.len(), 2);
        assert_eq!(projected.column(0).ty, ColumnType::Float);
        assert_eq!(projected.column(0).attribute.agg, Some(AggKind::Avg));
        assert_eq!(projected.column(1).attribute.column, "id");
        assert!(schema.sub_schema(&[Attribute::new("emp", "nope")]).is_err());
    }

    #[test]
    fn test_schema_metadata_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let schema = employee_schema();
        save_schema(dir.path(), "emp", &schema).unwrap();
        let loaded = load_schema(dir.path(), "emp").unwrap();
        assert_eq!(loaded, schema);
    }

    #[test]
    fn test_missing_metadata_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_schema(dir.path(), "nope").is_err());
    }
}
