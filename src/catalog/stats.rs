use std::fs;
use std::path::Path;

use crate::catalog::Schema;
use crate::error::QpError;

/// Persisted per-table statistics, read from `<table>.stat`: line one is the
/// row count, line two one distinct-value count per column in schema order.
/// The estimator seeds its in-pass statistics table from this.
#[derive(Debug, Clone)]
pub struct TableStats {
    pub num_tuples: u64,
    pub distinct: Vec<u64>,
}

impl TableStats {
    pub fn load(dir: &Path, table: &str, schema: &Schema) -> Result<TableStats, QpError> {
        let path = dir.join(format!("{}.stat", table));
        let content = fs::read_to_string(&path).map_err(|e| {
            QpError::Stats(format!("cannot read statistics file {}: {}", path.display(), e))
        })?;
        let mut lines = content.lines();
        let first = lines
            .next()
            .ok_or_else(|| QpError::Stats(format!("{}: empty statistics file", path.display())))?;
        let num_tuples = parse_count(first, &path)?;
        let second = lines.next().ok_or_else(|| {
            QpError::Stats(format!("{}: missing distinct-value line", path.display()))
        })?;
        let distinct = second
            .split_whitespace()
            .map(|tok| parse_count(tok, &path))
            .collect::<Result<Vec<u64>, QpError>>()?;
        if distinct.len() != schema.len() {
            return Err(QpError::Stats(format!(
                "{}: expected {} distinct-value counts, found {}",
                path.display(),
                schema.len(),
                distinct.len()
            )));
        }
        Ok(TableStats { num_tuples, distinct })
    }

    pub fn save(dir: &Path, table: &str, stats: &TableStats) -> Result<(), QpError> {
        let path = dir.join(format!("{}.stat", table));
        let distinct = stats
            .distinct
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        fs::write(&path, format!("{}\n{}\n", stats.num_tuples, distinct))?;
        Ok(())
    }
}

fn parse_count(token: &str, path: &Path) -> Result<u64, QpError> {
    token.trim().parse::<u64>().map_err(|_| {
        QpError::Stats(format!("{}: malformed count '{}'", path.display(), token))
    })
}
