//! License pre-validation server library.
//!
//! Receives pull-request webhooks, scans the changed files with an external
//! license detector, classifies the findings against the organization's
//! license catalog and reports the verdict back to the pull request.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod middleware;
pub mod migration;
pub mod models;
pub mod services;
