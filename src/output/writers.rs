//! CSV writing strategies

use super::columns::{ColumnMapping, OutputMode, SPEC_PREFIX};
use super::traits::{OutputResult, ResultWriter};
use crate::crawler::Product;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Canonical dump columns, in output order
const DUMP_FIELDS: [&str; 13] = [
    "url",
    "item_id",
    "sku",
    "title",
    "brand",
    "price",
    "currency",
    "description",
    "images",
    "rating",
    "ratings_total",
    "model_number",
    "upc",
];

/// Separator for list values in dump output
const LIST_SEPARATOR: &str = " | ";

/// Fixed column mapping with injected constants
#[derive(Debug, Clone)]
pub struct TemplateWriter {
    mapping: ColumnMapping,
    supplier: String,
}

impl TemplateWriter {
    pub fn new(mapping: ColumnMapping, supplier: impl Into<String>) -> Self {
        Self {
            mapping,
            supplier: supplier.into(),
        }
    }
}

impl ResultWriter for TemplateWriter {
    fn name(&self) -> &'static str {
        "template"
    }

    fn write(&self, products: &[Product], path: &Path) -> OutputResult<usize> {
        let sources = self.mapping.resolve()?;
        let mut writer = csv::Writer::from_path(path)?;

        writer.write_record(self.mapping.headers())?;
        for product in products {
            writer.write_record(sources.iter().map(|s| s.render(product, &self.supplier)))?;
        }
        writer.flush()?;

        Ok(products.len())
    }
}

/// Every flattened product field
#[derive(Debug, Clone, Copy, Default)]
pub struct DumpWriter;

impl DumpWriter {
    fn flatten(product: &Product) -> Vec<(String, String)> {
        let mut record: Vec<(String, String)> = DUMP_FIELDS
            .iter()
            .map(|field| (field.to_string(), Self::field(product, field)))
            .collect();

        record.extend(
            product
                .specifications
                .iter()
                .map(|s| (format!("{}{}", SPEC_PREFIX, s.name), s.value.clone())),
        );
        record
    }

    fn field(product: &Product, field: &str) -> String {
        match field {
            "url" => product.url.clone(),
            "item_id" => product.item_id.clone(),
            "sku" => product.sku.clone(),
            "title" => product.title.clone(),
            "brand" => product.brand.clone(),
            "price" => product.price.clone(),
            "currency" => product.currency.clone(),
            "description" => product.description.clone(),
            "images" => product.images.join(LIST_SEPARATOR),
            "rating" => product.rating.clone(),
            "ratings_total" => product.ratings_total.clone(),
            "model_number" => product.model_number.clone(),
            "upc" => product.upc.clone(),
            _ => String::new(),
        }
    }
}

impl ResultWriter for DumpWriter {
    fn name(&self) -> &'static str {
        "dump"
    }

    fn write(&self, products: &[Product], path: &Path) -> OutputResult<usize> {
        let records: Vec<Vec<(String, String)>> = products.iter().map(Self::flatten).collect();

        let mut columns: Vec<String> = Vec::new();
        for (key, _) in records.iter().flatten() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }

        write_rows(path, &columns, &records)?;
        Ok(records.len())
    }
}

/// Serializes each product and writes the sorted union of keys
///
/// Only used when the configured strategy fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastResortWriter;

impl LastResortWriter {
    fn flatten(product: &Product) -> OutputResult<Vec<(String, String)>> {
        let value = serde_json::to_value(product)?;
        let record = match value {
            Value::Object(map) => map
                .into_iter()
                .map(|(key, value)| {
                    let text = match value {
                        Value::String(s) => s,
                        Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    (key, text)
                })
                .collect(),
            _ => Vec::new(),
        };
        Ok(record)
    }
}

impl ResultWriter for LastResortWriter {
    fn name(&self) -> &'static str {
        "last-resort"
    }

    fn write(&self, products: &[Product], path: &Path) -> OutputResult<usize> {
        let records = products
            .iter()
            .map(Self::flatten)
            .collect::<OutputResult<Vec<_>>>()?;

        let columns: Vec<String> = records
            .iter()
            .flatten()
            .map(|(key, _)| key.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        write_rows(path, &columns, &records)?;
        Ok(records.len())
    }
}

fn write_rows(path: &Path, columns: &[String], records: &[Vec<(String, String)>]) -> OutputResult<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(columns)?;

    for record in records {
        let row = columns.iter().map(|column| {
            record
                .iter()
                .find(|(key, _)| key == column)
                .map(|(_, value)| value.as_str())
                .unwrap_or("")
        });
        writer.write_record(row)?;
    }

    writer.flush()?;
    Ok(())
}

/// Everything needed to write one job's results
#[derive(Debug, Clone)]
pub struct WriteRequest<'a> {
    /// Directory the artifact is written into (created if missing)
    pub directory: &'a Path,

    /// Artifact name prefix (e.g. `homedepot`)
    pub prefix: &'a str,

    pub mode: OutputMode,
    pub mapping: &'a ColumnMapping,

    /// Supplier label for template output
    pub supplier: &'a str,

    pub timestamp: DateTime<Utc>,
}

/// A written results file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// File name within the results directory
    pub name: String,
    pub path: PathBuf,
    pub rows: usize,

    /// Strategy that produced the file
    pub strategy: &'static str,
}

/// Builds `<prefix>_results_<YYYYmmdd_HHMMSS>.csv`
pub fn artifact_file_name(prefix: &str, timestamp: &DateTime<Utc>) -> String {
    format!("{}_results_{}.csv", prefix, timestamp.format("%Y%m%d_%H%M%S"))
}

/// Writes products with the configured strategy, falling back to the last-resort writer
pub fn write_results(products: &[Product], request: &WriteRequest<'_>) -> OutputResult<Artifact> {
    std::fs::create_dir_all(request.directory)?;

    let name = artifact_file_name(request.prefix, &request.timestamp);
    let path = request.directory.join(&name);

    let primary: Box<dyn ResultWriter> = match request.mode {
        OutputMode::Template => Box::new(TemplateWriter::new(
            request.mapping.clone(),
            request.supplier,
        )),
        OutputMode::Dump => Box::new(DumpWriter),
    };

    let (rows, strategy) = match primary.write(products, &path) {
        Ok(rows) => (rows, primary.name()),
        Err(e) => {
            tracing::warn!(
                "{} writer failed ({}), falling back to last-resort writer",
                primary.name(),
                e
            );
            let fallback = LastResortWriter;
            (fallback.write(products, &path)?, fallback.name())
        }
    };

    tracing::info!("Wrote {} products to {}", rows, path.display());

    Ok(Artifact {
        name,
        path,
        rows,
        strategy,
    })
}
