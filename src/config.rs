use std::path::{Path, PathBuf};

use crate::error::QpError;

/// Process wide configuration, fixed before plan construction and threaded
/// through the planner, estimator and executor by reference. Nothing in the
/// core mutates it after startup.
#[derive(Debug, Clone)]
pub struct QpConfig {
    /// Directory holding `<table>.md`, `<table>.stat` and `<table>.tbl` files.
    pub data_dir: PathBuf,
    /// Page size in bytes; also the batch byte budget between operators.
    pub page_size: usize,
    /// Total buffer pages available to the whole plan.
    pub num_buffers: usize,
}

impl QpConfig {
    pub fn new(data_dir: impl Into<PathBuf>, page_size: usize, num_buffers: usize) -> QpConfig {
        QpConfig {
            data_dir: data_dir.into(),
            page_size,
            num_buffers,
        }
    }

    /// Buffer pages available to each join operator: the total split evenly
    /// across all joins, or everything when the plan has no join (a lone
    /// external sort for DISTINCT then gets the full budget).
    pub fn buffers_per_join(&self, num_joins: usize) -> usize {
        if num_joins == 0 {
            self.num_buffers
        } else {
            self.num_buffers / num_joins
        }
    }

    /// Fatal setup check: every join operator needs at least 3 pages
    /// (one output page plus one page per input side), and a sorting
    /// query (DISTINCT or GROUPBY) needs 3 pages even without joins.
    pub fn check_buffers(&self, num_joins: usize, uses_sort: bool) -> Result<(), QpError> {
        if num_joins > 0 && self.buffers_per_join(num_joins) < 3 {
            return Err(QpError::Config(format!(
                "minimum 3 buffer pages required per join operator, got {} for {} joins",
                self.buffers_per_join(num_joins),
                num_joins
            )));
        }
        if uses_sort && self.num_buffers < 3 {
            return Err(QpError::Config(format!(
                "minimum 3 buffer pages required for sorting, got {}",
                self.num_buffers
            )));
        }
        Ok(())
    }

    pub fn table_path(&self, table: &str, extension: &str) -> PathBuf {
        self.data_dir.join(format!("{}.{}", table, extension))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
