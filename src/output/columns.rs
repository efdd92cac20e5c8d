//! Template column mapping and field resolution

use super::traits::{OutputError, OutputResult};
use crate::crawler::Product;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Constant markup written to template output
pub const MARKUP: &str = "43%";

/// Constant item type written to template output
pub const ITEM_TYPE: &str = "Cost of Goods Sold";

/// Price rendered when a product has none
pub const DEFAULT_PRICE: &str = "0.00";

/// Prefix selecting a specification value by name
pub const SPEC_PREFIX: &str = "spec:";

const DEFAULT_TEMPLATE: [(&str, &str); 11] = [
    ("purchase_price", "Purchase Price"),
    ("sku", "SKU"),
    ("image", "Image"),
    ("manufacturer", "Manufacturer"),
    ("url", "URL"),
    ("sale_price", "Sale Price"),
    ("price", "Price"),
    ("description", "Description"),
    ("markup", "Markup"),
    ("item_type", "Item Type"),
    ("item_name", "Item Name"),
];

/// Which CSV layout a job produces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Fixed column mapping with injected constants
    #[default]
    Template,
    /// Every flattened product field
    Dump,
}

impl OutputMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Template => "template",
            Self::Dump => "dump",
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputMode {
    type Err = OutputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "template" => Ok(Self::Template),
            "dump" => Ok(Self::Dump),
            other => Err(OutputError::InvalidMode(other.to_string())),
        }
    }
}

/// Where a template column takes its value from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSource {
    Url,
    ItemId,
    Sku,
    Title,
    Brand,
    Price,
    Currency,
    Description,
    Image,
    Rating,
    RatingsTotal,
    ModelNumber,
    Upc,
    Markup,
    ItemType,
    Supplier,
    Spec(String),
}

impl FieldSource {
    /// Resolves a canonical field name
    pub fn parse(field: &str) -> OutputResult<Self> {
        let field = field.trim();
        if let Some(name) = field.strip_prefix(SPEC_PREFIX) {
            let name = name.trim();
            if name.is_empty() {
                return Err(OutputError::UnknownField(field.to_string()));
            }
            return Ok(Self::Spec(name.to_string()));
        }

        let source = match field {
            "url" => Self::Url,
            "item_id" => Self::ItemId,
            "sku" => Self::Sku,
            "title" | "item_name" => Self::Title,
            "brand" | "manufacturer" => Self::Brand,
            "price" | "purchase_price" | "sale_price" => Self::Price,
            "currency" => Self::Currency,
            "description" => Self::Description,
            "image" | "images" => Self::Image,
            "rating" => Self::Rating,
            "ratings_total" => Self::RatingsTotal,
            "model_number" => Self::ModelNumber,
            "upc" => Self::Upc,
            "markup" => Self::Markup,
            "item_type" => Self::ItemType,
            "supplier" => Self::Supplier,
            other => return Err(OutputError::UnknownField(other.to_string())),
        };
        Ok(source)
    }

    /// Renders this field for one product
    pub fn render<'a>(&'a self, product: &'a Product, supplier: &'a str) -> &'a str {
        match self {
            Self::Url => &product.url,
            Self::ItemId => &product.item_id,
            Self::Sku => &product.sku,
            Self::Title => &product.title,
            Self::Brand => &product.brand,
            Self::Price if product.price.is_empty() => DEFAULT_PRICE,
            Self::Price => &product.price,
            Self::Currency => &product.currency,
            Self::Description => &product.description,
            Self::Image => product.first_image(),
            Self::Rating => &product.rating,
            Self::RatingsTotal => &product.ratings_total,
            Self::ModelNumber => &product.model_number,
            Self::Upc => &product.upc,
            Self::Markup => MARKUP,
            Self::ItemType => ITEM_TYPE,
            Self::Supplier => supplier,
            Self::Spec(name) => product.specification(name).unwrap_or(""),
        }
    }
}

/// Returns true when `field` names a known template field
pub fn is_known_field(field: &str) -> bool {
    FieldSource::parse(field).is_ok()
}

/// One template column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub field: String,
    pub header: String,
}

/// Ordered canonical field → display header mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMapping {
    columns: Vec<Column>,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self::default_template()
    }
}

impl ColumnMapping {
    /// Builds a mapping from `(field, header)` pairs; empty means the default template
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        if pairs.is_empty() {
            return Self::default_template();
        }
        Self {
            columns: pairs
                .into_iter()
                .map(|(field, header)| Column { field, header })
                .collect(),
        }
    }

    pub fn default_template() -> Self {
        Self {
            columns: DEFAULT_TEMPLATE
                .iter()
                .map(|(field, header)| Column {
                    field: field.to_string(),
                    header: header.to_string(),
                })
                .collect(),
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.header.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Resolves every column's source, failing on the first unknown field
    pub fn resolve(&self) -> OutputResult<Vec<FieldSource>> {
        self.columns
            .iter()
            .map(|c| FieldSource::parse(&c.field))
            .collect()
    }
}
