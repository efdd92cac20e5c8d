//! Search and category payload decoding
//!
//! The aggregator returns listings in several shapes depending on retailer
//! and call type. Each page is decoded once into a [`ListingPage`] so the
//! crawler never inspects raw JSON.

use serde::Deserialize;
use serde_json::Value;

/// One listing entry, before URL canonicalization
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub link: Option<String>,
    pub item_id: Option<String>,
    pub title: Option<String>,
}

/// What pagination metadata says about the next page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageHint {
    More,
    Last,
    Unknown,
}

/// A decoded search or category page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingPage {
    /// `search_results: [ {product: {...}} ]`
    Flat { listings: Vec<Listing>, hint: PageHint },

    /// `search_results: {results: [...], pagination: {...}}`
    Nested { listings: Vec<Listing>, hint: PageHint },

    /// `category: {products: [...]}` or top-level `products: [...]`
    Category { listings: Vec<Listing>, hint: PageHint },

    /// None of the known shapes; carries the top-level keys for logging
    Unrecognized { keys: Vec<String> },
}

impl ListingPage {
    pub fn listings(&self) -> &[Listing] {
        match self {
            Self::Flat { listings, .. }
            | Self::Nested { listings, .. }
            | Self::Category { listings, .. } => listings,
            Self::Unrecognized { .. } => &[],
        }
    }

    pub fn hint(&self) -> PageHint {
        match self {
            Self::Flat { hint, .. } | Self::Nested { hint, .. } | Self::Category { hint, .. } => {
                *hint
            }
            Self::Unrecognized { .. } => PageHint::Unknown,
        }
    }

    pub fn shape_name(&self) -> &'static str {
        match self {
            Self::Flat { .. } => "flat",
            Self::Nested { .. } => "nested",
            Self::Category { .. } => "category",
            Self::Unrecognized { .. } => "unrecognized",
        }
    }
}

/// Reads one listing entry field by field
///
/// Flat entries wrap the fields in `product`; others carry them directly.
/// Entries that are not objects yield `None`; fields of an unexpected type
/// are treated as absent.
fn listing_from_value(entry: &Value) -> Option<Listing> {
    let fields = entry.as_object()?;
    if let Some(inner) = fields.get("product").filter(|p| p.is_object()) {
        return listing_from_value(inner);
    }

    let text = |key: &str| fields.get(key).and_then(value_text);
    Some(Listing {
        link: text("link").or_else(|| text("url")),
        item_id: text("item_id"),
        title: text("title"),
    })
}

#[derive(Debug, Default, Deserialize)]
struct RawPagination {
    #[serde(default)]
    next_page_token: Option<String>,
    #[serde(default)]
    total_pages: Option<u32>,
    #[serde(default)]
    current_page: Option<u32>,
    #[serde(default)]
    current: Option<CurrentPage>,
    #[serde(default)]
    next: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct CurrentPage {
    #[serde(default)]
    page: Option<u32>,
}

impl RawPagination {
    fn hint(&self, requested_page: u32) -> PageHint {
        if let Some(total) = self.total_pages.filter(|t| *t > 0) {
            let current = self
                .current_page
                .or_else(|| self.current.as_ref().and_then(|c| c.page))
                .unwrap_or(requested_page);
            return if current >= total {
                PageHint::Last
            } else {
                PageHint::More
            };
        }

        match self.next_page_token.as_deref() {
            Some(token) if !token.is_empty() => return PageHint::More,
            Some(_) => return PageHint::Last,
            None => {}
        }

        match &self.next {
            Some(next) if !next.is_null() => PageHint::More,
            _ => PageHint::Unknown,
        }
    }

    /// Nested results paginate by token only; no token means no next page
    fn token_hint(&self) -> PageHint {
        match self.next_page_token.as_deref() {
            Some(token) if !token.is_empty() => PageHint::More,
            _ => PageHint::Last,
        }
    }
}

#[derive(Debug, Deserialize)]
struct NestedResults {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    pagination: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CategoryBlock {
    #[serde(default)]
    products: Vec<Value>,
    #[serde(default)]
    pagination: Option<Value>,
}

/// Malformed entries are dropped without affecting their neighbours
fn listings(raw: &[Value]) -> Vec<Listing> {
    raw.iter().filter_map(listing_from_value).collect()
}

fn pagination(value: Option<&Value>) -> Option<RawPagination> {
    value
        .filter(|p| p.is_object())
        .and_then(|p| serde_json::from_value(p.clone()).ok())
}

fn top_level_hint(body: &Value, requested_page: u32) -> PageHint {
    pagination(body.get("pagination"))
        .map(|p| p.hint(requested_page))
        .unwrap_or(PageHint::Unknown)
}

/// Decodes a search or category response body
///
/// `requested_page` fills in for the current page when pagination metadata
/// reports a total but not the current position.
pub fn decode_listing_page(body: &Value, requested_page: u32) -> ListingPage {
    if let Some(results) = body.get("search_results") {
        if let Some(entries) = results.as_array() {
            return ListingPage::Flat {
                listings: listings(entries),
                hint: top_level_hint(body, requested_page),
            };
        }
        if let Ok(nested) = serde_json::from_value::<NestedResults>(results.clone()) {
            let hint = match pagination(nested.pagination.as_ref()) {
                Some(p) => p.token_hint(),
                None => top_level_hint(body, requested_page),
            };
            return ListingPage::Nested {
                listings: listings(&nested.results),
                hint,
            };
        }
    }

    if let Some(category) = body.get("category").filter(|c| c.get("products").is_some()) {
        if let Ok(block) = serde_json::from_value::<CategoryBlock>(category.clone()) {
            let hint = match pagination(block.pagination.as_ref()) {
                Some(p) => p.hint(requested_page),
                None => top_level_hint(body, requested_page),
            };
            return ListingPage::Category {
                listings: listings(&block.products),
                hint,
            };
        }
    }

    if let Some(products) = body.get("products").and_then(Value::as_array) {
        return ListingPage::Category {
            listings: listings(products),
            hint: top_level_hint(body, requested_page),
        };
    }

    ListingPage::Unrecognized {
        keys: body
            .as_object()
            .map(|obj| obj.keys().cloned().collect())
            .unwrap_or_default(),
    }
}

/// Renders a scalar JSON value as text; null, empty, and containers give `None`
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
