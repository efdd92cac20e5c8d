//! Aggregator API access
//!
//! This module handles every outbound call to the catalog aggregator:
//! - Building request parameters for product, search, and category calls
//! - Bounded retry with increasing backoff for transient statuses
//! - Envelope inspection (success flag, vendor message, remaining credits)
//! - Decoding search/category payloads into a tagged union at the boundary

mod client;
mod envelope;
mod payload;

pub use client::{ApiClient, ApiRequest, RetryPolicy, MAX_BACKOFF, TRANSIENT_STATUSES};
pub use envelope::{ApiResponse, Envelope};
pub use payload::{decode_listing_page, value_text, Listing, ListingPage, PageHint};

use thiserror::Error;

/// Errors returned by the API client
///
/// Transient statuses never surface here unless the retry budget is spent.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API key authentication failed: {message}")]
    Unauthorized { message: String },

    #[error("API request rejected: {message}")]
    Rejected { message: String },

    #[error("HTTP {status} from {request}: {message}")]
    Status {
        request: String,
        status: u16,
        message: String,
    },

    #[error("HTTP {status} from {request} after {attempts} attempts")]
    RetriesExhausted {
        request: String,
        status: u16,
        attempts: u32,
    },

    #[error("Request timeout for {request}")]
    Timeout { request: String },

    #[error("Network error for {request}: {source}")]
    Network {
        request: String,
        source: reqwest::Error,
    },

    #[error("Malformed response for {request}: {message}")]
    Decode { request: String, message: String },
}

impl ApiError {
    /// Returns true when the vendor answered but refused the call
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. } | Self::Unauthorized { .. })
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;
