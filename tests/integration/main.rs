//! Integration tests for Aisle-Sweep
//!
//! These tests use wiremock to stand in for the aggregator API and drive
//! the client, crawler, and job controller end-to-end.

mod api_tests;
mod common;
mod job_tests;
