//! Output module for writing harvested products
//!
//! This module handles:
//! - Template column mappings with injected constants
//! - Generic field dumps
//! - A last-resort writer when the configured strategy fails
//! - Artifact naming and placement

mod columns;
mod traits;
mod writers;

pub use columns::{
    is_known_field, Column, ColumnMapping, FieldSource, OutputMode, DEFAULT_PRICE, ITEM_TYPE,
    MARKUP, SPEC_PREFIX,
};
pub use traits::{OutputError, OutputResult, ResultWriter};
pub use writers::{
    artifact_file_name, write_results, Artifact, DumpWriter, LastResortWriter, TemplateWriter,
    WriteRequest,
};
