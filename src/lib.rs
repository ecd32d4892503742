//! Kitchen FIFO library
//!
//! Allocation and freshness engine for perishable ingredient batches: expiry estimation,
//! freshness and urgency classification, first-expired-first-out picking, compliance
//! scoring and the periodic freshness sweep.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod circuit_breaker;
pub mod config;
pub mod errors;
pub mod events;
pub mod metrics;
pub mod ml;
pub mod models;
pub mod repositories;
pub mod services;

pub use errors::ServiceError;
pub use models::batch::{Batch, Category, FreshnessStatus, NewBatch, StorageClass, WriteOffReason};
pub use services::inventory::InventoryService;
