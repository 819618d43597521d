//! Pipeline E2E test suite.
//!
//! Drives webhooks and operator requests through the HTTP layer, runs scans
//! with a shell-script detector and checks what lands on a mock GitHub API.
//! Uses the in-memory store, so no database is needed.
//!
//! Run with: cargo test --test pipeline_e2e

mod mock_github;
mod test_helpers;

mod test_access;
mod test_operator_api;
mod test_recovery;
mod test_webhook_flow;
