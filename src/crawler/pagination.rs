//! Paginated listing crawl
//!
//! Walks search or category pages for one input, collecting deduplicated
//! product URLs until a limit, an empty page, or the last page.

use super::archive::RawArchive;
use super::pacing::pause;
use crate::api::{decode_listing_page, ApiClient, ApiRequest, Listing, ListingPage, PageHint};
use crate::retailer::RetailerProfile;
use crate::url::ProductUrlSet;
use crate::UrlError;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// One crawl input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingSource {
    Search(String),
    Category(String),
}

impl ListingSource {
    pub fn request(&self, page: u32, sort_by: Option<&str>) -> ApiRequest {
        let sort_by = sort_by.map(str::to_string);
        match self {
            Self::Search(term) => ApiRequest::Search {
                term: term.clone(),
                page,
                sort_by,
            },
            Self::Category(id) => ApiRequest::Category {
                category_id: id.clone(),
                page,
                sort_by,
            },
        }
    }
}

impl fmt::Display for ListingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Search(term) => write!(f, "search '{}'", term),
            Self::Category(id) => write!(f, "category {}", id),
        }
    }
}

/// Why a crawl ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// URLs added by this crawl reached the budget
    BudgetReached,
    /// A page returned zero listings
    EmptyPage,
    /// Pagination metadata reported no further pages
    LastPage,
    /// The page limit was reached
    MaxPages,
    /// The payload matched no known shape
    UnrecognizedShape(Vec<String>),
    /// An API call failed; only this input is abandoned
    Failed(String),
    /// A stop was requested
    Stopped,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BudgetReached => f.write_str("product limit reached"),
            Self::EmptyPage => f.write_str("no more results"),
            Self::LastPage => f.write_str("last page"),
            Self::MaxPages => f.write_str("page limit reached"),
            Self::UnrecognizedShape(keys) => {
                write!(f, "unrecognized response (keys: {})", keys.join(", "))
            }
            Self::Failed(message) => write!(f, "request failed: {}", message),
            Self::Stopped => f.write_str("stop requested"),
        }
    }
}

/// Outcome of one crawl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlReport {
    pub pages_fetched: u32,

    /// URLs this crawl added to the set
    pub added: usize,

    /// Listings without a usable product URL
    pub skipped: usize,

    pub stop_reason: StopReason,
}

/// Per-page notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageEvent {
    pub page: u32,
    pub listings: usize,
    pub added: usize,
}

/// Crawls listing pages for one retailer
#[derive(Debug, Clone)]
pub struct PaginationCrawler<'a> {
    client: &'a ApiClient,
    page_delay: Duration,
    sort_by: Option<String>,
    archive: Option<&'a RawArchive>,
}

impl<'a> PaginationCrawler<'a> {
    pub fn new(client: &'a ApiClient, page_delay: Duration) -> Self {
        Self {
            client,
            page_delay,
            sort_by: None,
            archive: None,
        }
    }

    pub fn with_sort(mut self, sort_by: Option<String>) -> Self {
        self.sort_by = sort_by;
        self
    }

    pub fn with_archive(mut self, archive: Option<&'a RawArchive>) -> Self {
        self.archive = archive;
        self
    }

    /// Crawls up to `max_pages` pages of `source` into `urls`
    ///
    /// `budget` bounds the URLs this crawl may add; `None` is unlimited.
    /// `on_page` runs after every decoded page.
    pub async fn crawl<F>(
        &self,
        source: &ListingSource,
        max_pages: u32,
        budget: Option<usize>,
        urls: &mut ProductUrlSet,
        stop: &CancellationToken,
        mut on_page: F,
    ) -> CrawlReport
    where
        F: FnMut(PageEvent),
    {
        let mut report = CrawlReport {
            pages_fetched: 0,
            added: 0,
            skipped: 0,
            stop_reason: StopReason::MaxPages,
        };

        if budget == Some(0) {
            report.stop_reason = StopReason::BudgetReached;
            return report;
        }

        for page in 1..=max_pages {
            if stop.is_cancelled() {
                report.stop_reason = StopReason::Stopped;
                return report;
            }
            if page > 1 && !pause(self.page_delay, stop).await {
                report.stop_reason = StopReason::Stopped;
                return report;
            }

            let request = source.request(page, self.sort_by.as_deref());
            let response = match self.client.request(&request).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!("{} page {} failed: {}", source, page, e);
                    report.stop_reason = StopReason::Failed(e.to_string());
                    return report;
                }
            };
            report.pages_fetched += 1;
            self.archive_page(source, page, &response.body);

            let decoded = decode_listing_page(&response.body, page);
            if let ListingPage::Unrecognized { keys } = decoded {
                tracing::warn!(
                    "No data for {} page {}: unrecognized response keys {:?}",
                    source,
                    page,
                    keys
                );
                report.stop_reason = StopReason::UnrecognizedShape(keys);
                return report;
            }

            let listings = decoded.listings();
            if listings.is_empty() {
                tracing::info!("{} page {} returned no results", source, page);
                report.stop_reason = StopReason::EmptyPage;
                return report;
            }

            let before = report.added;
            let mut exhausted = false;
            for listing in listings {
                let inserted = self
                    .listing_url(listing)
                    .and_then(|url| urls.insert_url(&url));
                let inserted = match inserted {
                    Ok(inserted) => inserted,
                    Err(e) => {
                        tracing::debug!("Skipping listing on {} page {}: {}", source, page, e);
                        report.skipped += 1;
                        continue;
                    }
                };

                if inserted {
                    report.added += 1;
                    if budget.is_some_and(|b| report.added >= b) {
                        exhausted = true;
                        break;
                    }
                }
            }

            tracing::debug!(
                "{} page {}: {} listings, {} new URLs ({} shape)",
                source,
                page,
                listings.len(),
                report.added - before,
                decoded.shape_name()
            );
            on_page(PageEvent {
                page,
                listings: listings.len(),
                added: report.added - before,
            });

            if exhausted {
                report.stop_reason = StopReason::BudgetReached;
                return report;
            }
            if decoded.hint() == PageHint::Last {
                report.stop_reason = StopReason::LastPage;
                return report;
            }
        }

        report
    }

    /// Resolves a listing to a canonical product URL
    fn listing_url(&self, listing: &Listing) -> Result<Url, UrlError> {
        let profile: &RetailerProfile = self.client.profile();
        match (&listing.link, &listing.item_id) {
            (Some(link), _) => profile.product_url(link),
            (None, Some(item_id)) => profile.url_for_item(item_id, listing.title.as_deref()),
            (None, None) => Err(UrlError::Parse("listing has no link or item id".to_string())),
        }
    }

    fn archive_page(&self, source: &ListingSource, page: u32, body: &serde_json::Value) {
        let Some(archive) = self.archive else {
            return;
        };
        let saved = match source {
            ListingSource::Search(term) => archive.save_search(term, page, body),
            ListingSource::Category(id) => archive.save_category(id, page, body),
        };
        if let Err(e) = saved {
            tracing::warn!("Failed to archive {} page {}: {}", source, page, e);
        }
    }
}
