//! Prosthetics Store
//!
//! Catalog and warehouse backend for a prosthetics and orthopedic goods
//! retailer.
//!
//! ## Features
//! - Product catalog with variants, categories and manufacturers
//! - Characteristic groups, values and reusable templates
//! - Region / city / warehouse / zone / section hierarchy
//! - Stock ledger with receive, ship, adjust and transfer operations
//! - Warehouse efficiency analytics
//! - Media object registry

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod limiter;

pub use config::Config;
pub use error::{AppError, AppResult};
