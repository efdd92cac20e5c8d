//! Crawler module for listing pagination and detail fetching
//!
//! This module contains the per-job crawling logic, including:
//! - Paginated search and category crawls into a deduplicated URL set
//! - Sequential product detail fetching with progress reporting
//! - Stop-aware pacing between requests
//! - Raw payload archiving

mod archive;
mod detail;
mod pacing;
mod pagination;
mod product;

pub use archive::RawArchive;
pub use detail::{DetailFetcher, FetchSummary};
pub use pacing::pause;
pub use pagination::{CrawlReport, ListingSource, PageEvent, PaginationCrawler, StopReason};
pub use product::{Product, Specification};

use crate::retailer::RetailerProfile;
use crate::url::ProductUrlSet;

/// Seeds `urls` from a caller-supplied list, bypassing pagination
///
/// Invalid or non-product URLs are skipped and returned with the reason.
/// At most `limit` URLs are inserted when a limit is given.
pub fn seed_from_list(
    profile: &RetailerProfile,
    raw_urls: &[String],
    limit: Option<usize>,
    urls: &mut ProductUrlSet,
) -> Vec<(String, String)> {
    let mut rejected = Vec::new();

    for raw in raw_urls {
        if limit.is_some_and(|l| urls.len() >= l) {
            break;
        }
        match profile.product_url(raw).and_then(|url| urls.insert_url(&url)) {
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Skipping URL '{}': {}", raw, e);
                rejected.push((raw.clone(), e.to_string()));
            }
        }
    }

    rejected
}
