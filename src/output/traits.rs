//! Result writer trait and error types

use crate::crawler::Product;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize product: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Unknown output field '{0}'")]
    UnknownField(String),

    #[error("Invalid output mode '{0}' (expected 'template' or 'dump')")]
    InvalidMode(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// A strategy that turns products into one CSV file
pub trait ResultWriter {
    /// Short strategy name used in logs
    fn name(&self) -> &'static str;

    /// Writes `products` to `path` in order, returning the number of rows
    fn write(&self, products: &[Product], path: &Path) -> OutputResult<usize>;
}
