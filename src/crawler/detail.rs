//! Sequential product detail fetching

use super::archive::RawArchive;
use super::pacing::pause;
use super::product::Product;
use crate::api::{ApiClient, ApiError, ApiRequest};
use crate::url::ProductUrlSet;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Outcome of one fetch pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchSummary {
    /// URLs a request was made for
    pub attempted: usize,
    pub fetched: usize,
    pub failed: usize,

    /// True when a stop request or the progress callback ended the loop
    pub stopped: bool,
}

/// Why a single product could not be fetched
#[derive(Debug)]
enum ItemFailure {
    Api(ApiError),
    MissingProduct(Vec<String>),
}

impl std::fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Api(e) => write!(f, "{}", e),
            Self::MissingProduct(keys) => {
                write!(f, "no product data in response (keys: {})", keys.join(", "))
            }
        }
    }
}

/// Fetches product details one URL at a time
#[derive(Debug, Clone)]
pub struct DetailFetcher<'a> {
    client: &'a ApiClient,
    item_delay: Duration,
    archive: Option<&'a RawArchive>,
}

impl<'a> DetailFetcher<'a> {
    pub fn new(client: &'a ApiClient, item_delay: Duration) -> Self {
        Self {
            client,
            item_delay,
            archive: None,
        }
    }

    pub fn with_archive(mut self, archive: Option<&'a RawArchive>) -> Self {
        self.archive = archive;
        self
    }

    /// Fetches every URL in `urls`, appending each parsed product to `products`
    ///
    /// `progress(current, total, message)` runs after each item and may
    /// return `ControlFlow::Break` to end the loop. Products appended before a
    /// stop stay in `products`.
    pub async fn fetch<F>(
        &self,
        urls: &ProductUrlSet,
        products: &mut Vec<Product>,
        stop: &CancellationToken,
        mut progress: F,
    ) -> FetchSummary
    where
        F: FnMut(usize, usize, &str) -> ControlFlow<()>,
    {
        let targets = urls.to_vec();
        let total = targets.len();
        let mut summary = FetchSummary::default();

        for (index, url) in targets.iter().enumerate() {
            if stop.is_cancelled() {
                summary.stopped = true;
                break;
            }
            if index > 0 && !pause(self.item_delay, stop).await {
                summary.stopped = true;
                break;
            }

            summary.attempted += 1;
            let message = match self.fetch_one(url).await {
                Ok(product) => {
                    summary.fetched += 1;
                    let message = format!("Fetched {}", url);
                    products.push(product);
                    message
                }
                Err(failure) => {
                    summary.failed += 1;
                    tracing::warn!("Skipping {}: {}", url, failure);
                    format!("Failed {}: {}", url, failure)
                }
            };

            if progress(index + 1, total, &message).is_break() {
                summary.stopped = true;
                break;
            }
        }

        summary
    }

    async fn fetch_one(&self, url: &Url) -> Result<Product, ItemFailure> {
        let request = ApiRequest::Product {
            url: url.to_string(),
        };
        let response = self.client.request(&request).await.map_err(ItemFailure::Api)?;

        let profile = self.client.profile();
        let product = response
            .product()
            .map(|payload| Product::from_payload(url, payload, profile))
            .ok_or_else(|| ItemFailure::MissingProduct(response.keys()))?;

        if let Some(archive) = self.archive {
            let id = if product.item_id.is_empty() {
                url.path().trim_matches('/').replace('/', "_")
            } else {
                product.item_id.clone()
            };
            if let Err(e) = archive.save_product(&id, &response.body) {
                tracing::warn!("Failed to archive product {}: {}", id, e);
            }
        }

        Ok(product)
    }
}
