//! Product records and detail payload mapping

use crate::api::value_text;
use crate::retailer::RetailerProfile;
use serde::Serialize;
use serde_json::{Map, Value};
use url::Url;

/// One named specification value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Specification {
    pub name: String,
    pub value: String,
}

/// A product with every field rendered as text
///
/// Absent vendor fields become empty strings, never nulls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Product {
    pub url: String,
    pub item_id: String,
    pub sku: String,
    pub title: String,
    pub brand: String,
    pub price: String,
    pub currency: String,
    pub description: String,
    pub specifications: Vec<Specification>,
    pub images: Vec<String>,
    pub rating: String,
    pub ratings_total: String,
    pub model_number: String,
    pub upc: String,
}

impl Product {
    /// Maps a detail payload's `product` object
    ///
    /// `url` is the canonical URL the detail was requested for.
    pub fn from_payload(url: &Url, product: &Map<String, Value>, profile: &RetailerProfile) -> Self {
        let item_id = text(product, "item_id")
            .or_else(|| profile.item_id(url))
            .unwrap_or_default();

        let description = first_text(product, profile.description_fields)
            .or_else(|| feature_bullets(product))
            .unwrap_or_default();

        Self {
            url: url.to_string(),
            item_id,
            sku: first_text(product, profile.sku_fields).unwrap_or_default(),
            title: text(product, "title").unwrap_or_default(),
            brand: named_text(product, "brand").unwrap_or_default(),
            price: price(product).unwrap_or_default(),
            currency: currency(product).unwrap_or_default(),
            description,
            specifications: specifications(product),
            images: images(product),
            rating: text(product, "rating").unwrap_or_default(),
            ratings_total: text(product, "ratings_total").unwrap_or_default(),
            model_number: text(product, "model_number").unwrap_or_default(),
            upc: text(product, "upc").unwrap_or_default(),
        }
    }

    /// Returns the value of the named specification, case-insensitively
    pub fn specification(&self, name: &str) -> Option<&str> {
        self.specifications
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .map(|s| s.value.as_str())
    }

    pub fn first_image(&self) -> &str {
        self.images.first().map(String::as_str).unwrap_or("")
    }
}

fn text(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(value_text)
}

fn first_text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| text(obj, key))
}

/// Reads a field that is either a scalar or an object with a `name`
fn named_text(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::Object(inner) => text(inner, "name"),
        other => value_text(other),
    }
}

fn price(product: &Map<String, Value>) -> Option<String> {
    product
        .get("buybox_winner")
        .and_then(Value::as_object)
        .and_then(|buybox| text(buybox, "price"))
        .or_else(|| text(product, "price"))
        .or_else(|| {
            product
                .get("offers")
                .and_then(|o| o.get("primary"))
                .and_then(Value::as_object)
                .and_then(|primary| text(primary, "price"))
        })
}

fn currency(product: &Map<String, Value>) -> Option<String> {
    product
        .get("buybox_winner")
        .and_then(Value::as_object)
        .and_then(|buybox| text(buybox, "currency"))
        .or_else(|| text(product, "currency"))
}

fn feature_bullets(product: &Map<String, Value>) -> Option<String> {
    let bullets: Vec<String> = product
        .get("feature_bullets")?
        .as_array()?
        .iter()
        .filter_map(value_text)
        .collect();
    (!bullets.is_empty()).then(|| bullets.join(" "))
}

/// Accepts `[{name, value}]` or `{name: value}`
fn specifications(product: &Map<String, Value>) -> Vec<Specification> {
    match product.get("specifications") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|item| {
                Some(Specification {
                    name: text(item, "name")?,
                    value: text(item, "value").unwrap_or_default(),
                })
            })
            .collect(),
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(name, value)| {
                Some(Specification {
                    name: name.trim().to_string(),
                    value: value_text(value)?,
                })
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Images may be plain strings or objects with a `link`
fn images(product: &Map<String, Value>) -> Vec<String> {
    let link = |v: &Value| match v {
        Value::Object(inner) => text(inner, "link"),
        other => value_text(other),
    };

    let mut found: Vec<String> = product
        .get("images")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(link).collect())
        .unwrap_or_default();

    if found.is_empty() {
        if let Some(main) = product.get("main_image").and_then(link) {
            found.push(main);
        }
    }
    found
}
