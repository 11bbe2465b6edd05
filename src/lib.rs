//! patchpilot: automated pull/merge request reviewer (library crate).
//!
//! Re-exports public modules for integration tests and external use.

pub mod config;
pub mod constants;
pub mod eligibility;
pub mod env;
pub mod gateway;
pub mod models;
pub mod notify;
pub mod orchestrator;
pub mod platform;
pub mod webhook;
