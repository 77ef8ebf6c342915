//! Bulk Email Verification Jobs
//!
//! This library provides the core of the bulk-verify service: credit-gated
//! admission of bulk email verification jobs, batched processing against a
//! verification service, progress tracking, statistics, and billing
//! reconciliation on completion.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
