//! Retailer profiles
//!
//! Both supported retailers sit behind the same aggregator API contract and
//! differ only in endpoint, product URL layout, and a few field names. A
//! [`RetailerProfile`] captures those differences so that a single generic
//! client, crawler, and fetcher serve every retailer.

mod categories;

pub use categories::{find_category, resolve_category, HOME_DEPOT_CATEGORIES};

use crate::url::{canonicalize, last_path_segment};
use crate::{ConfigError, UrlError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Product identifier fields, in priority order, used to populate the SKU
pub const SKU_FIELDS: &[&str] = &[
    "store_sku",
    "sku",
    "item_id",
    "model_id",
    "model_number",
    "product_id",
];

/// Description fields, in priority order
pub const DESCRIPTION_FIELDS: &[&str] = &[
    "description",
    "long_description",
    "short_description",
    "details",
    "product_description",
];

/// Supported retailer backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Retailer {
    HomeDepot,
    Lowes,
}

impl Retailer {
    pub const ALL: [Retailer; 2] = [Retailer::HomeDepot, Retailer::Lowes];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HomeDepot => "home-depot",
            Self::Lowes => "lowes",
        }
    }

    /// Returns the built-in profile for this retailer
    pub fn profile(&self) -> RetailerProfile {
        match self {
            Self::HomeDepot => RetailerProfile::home_depot(),
            Self::Lowes => RetailerProfile::lowes(),
        }
    }
}

impl fmt::Display for Retailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Retailer {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "home-depot" | "homedepot" | "hd" => Ok(Self::HomeDepot),
            "lowes" | "lowe's" => Ok(Self::Lowes),
            other => Err(ConfigError::UnknownRetailer(other.to_string())),
        }
    }
}

/// How a category browse is expressed against the vendor API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryMode {
    /// `type=category&category_id=<id>`
    Native,
    /// `type=search&search_term=*&category=<id>`
    SearchFilter,
}

/// Everything that differs between retailer backends
#[derive(Debug, Clone)]
pub struct RetailerProfile {
    pub retailer: Retailer,

    /// Aggregator API endpoint
    pub endpoint: String,

    /// Storefront base, used to resolve relative links
    pub base_url: &'static str,

    /// Path prefix every product page shares (e.g. `/p/`)
    pub product_path_prefix: &'static str,

    pub category_mode: CategoryMode,

    /// Fields searched, in order, for the SKU
    pub sku_fields: &'static [&'static str],

    /// Fields searched, in order, for the description
    pub description_fields: &'static [&'static str],

    /// Prefix for artifact file names
    pub artifact_prefix: &'static str,

    /// Supplier label injected into template output
    pub supplier_label: &'static str,
}

impl RetailerProfile {
    pub fn home_depot() -> Self {
        Self {
            retailer: Retailer::HomeDepot,
            endpoint: "https://api.bigboxapi.com/request".to_string(),
            base_url: "https://www.homedepot.com",
            product_path_prefix: "/p/",
            category_mode: CategoryMode::Native,
            sku_fields: SKU_FIELDS,
            description_fields: DESCRIPTION_FIELDS,
            artifact_prefix: "homedepot",
            supplier_label: "HD",
        }
    }

    pub fn lowes() -> Self {
        Self {
            retailer: Retailer::Lowes,
            endpoint: "https://api.backyardapi.com/request".to_string(),
            base_url: "https://www.lowes.com",
            product_path_prefix: "/pd/",
            category_mode: CategoryMode::SearchFilter,
            sku_fields: SKU_FIELDS,
            description_fields: DESCRIPTION_FIELDS,
            artifact_prefix: "lowes",
            supplier_label: "Lowes",
        }
    }

    /// Returns a copy of this profile pointed at another endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Canonicalizes a listing link and checks that it is a product page
    pub fn product_url(&self, raw: &str) -> Result<Url, UrlError> {
        let base = Url::parse(self.base_url).map_err(|e| UrlError::Parse(e.to_string()))?;
        let url = canonicalize(raw, Some(&base))?;
        if !url.path().starts_with(self.product_path_prefix) {
            return Err(UrlError::NotAProduct {
                retailer: self.retailer.to_string(),
                url: url.to_string(),
            });
        }
        Ok(url)
    }

    /// Builds a product URL from an item id when a listing carries no link
    pub fn url_for_item(&self, item_id: &str, title: Option<&str>) -> Result<Url, UrlError> {
        let slug = slugify(title.unwrap_or("product"));
        let slug = if slug.is_empty() { "product".to_string() } else { slug };
        let path = format!("{}{}/{}", self.product_path_prefix, slug, item_id.trim());
        self.product_url(&path)
    }

    /// Extracts the item id from a product URL
    pub fn item_id(&self, url: &Url) -> Option<String> {
        last_path_segment(url)
    }
}

/// Lowercases a title and keeps only alphanumerics and hyphens
fn slugify(title: &str) -> String {
    title
        .trim()
        .to_lowercase()
        .replace(' ', "-")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect()
}
