use std::error::Error;
use std::fmt::Display;

/// Crate wide error type. Setup problems (missing metadata/statistics,
/// bad configuration) and execution time I/O failures all end up here;
/// an infeasible plan is NOT an error but the INFINITE_COST sentinel
/// handled inside the optimizer.
#[derive(Debug)]
pub enum QpError {
    Io(std::io::Error),
    Catalog(String),
    Stats(String),
    Config(String),
    Parse(String),
    Plan(String),
}

impl From<std::io::Error> for QpError {
    fn from(io_error: std::io::Error) -> Self {
        QpError::Io(io_error)
    }
}

impl Display for QpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QpError::Io(e) => write!(f, "i/o error: {}", e),
            QpError::Catalog(msg) => write!(f, "catalog error: {}", msg),
            QpError::Stats(msg) => write!(f, "statistics error: {}", msg),
            QpError::Config(msg) => write!(f, "config error: {}", msg),
            QpError::Parse(msg) => write!(f, "parse error: {}", msg),
            QpError::Plan(msg) => write!(f, "plan error: {}", msg),
        }
    }
}

impl Error for QpError {}
