//! # maintq
//!
//! Live state-synchronization core for a shared maintenance work queue:
//! per-collection change-feed mirrors over an authoritative Postgres
//! store, the request lifecycle state machine, request intake, and
//! derived equipment risk analytics.

pub mod analytics;
pub mod auth;
pub mod config;
pub mod error;
pub mod event;
pub mod intake;
pub mod lifecycle;
pub mod mirror;
pub mod model;
pub mod store;
pub mod telemetry;
