#![forbid(unsafe_code)]

//! Core domain model and conversion logic for the infusion-rate calculator.
//!
//! This crate provides:
//! - Domain types (concentration ratios, drug records, sessions)
//! - The drug registry and its built-in table
//! - Dose-rate ↔ infusion-rate conversion and range classification
//! - Bag preparation arithmetic
//! - Shareable URL encoding and decoding
//! - Live configuration refresh with validation

pub mod types;
pub mod error;
pub mod document;
pub mod registry;
pub mod config;
pub mod logging;
pub mod conversion;
pub mod prep;
pub mod session;
pub mod codec;
pub mod debounce;
pub mod loader;
pub mod render;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use registry::{build_default_registry, get_default_registry};
pub use config::Config;
pub use conversion::{classify, Conversion};
pub use prep::PrepOutputs;
pub use session::Reconciled;
pub use codec::{decode, encode, hydrate, share_url};
pub use debounce::UrlDebouncer;
pub use loader::{ConfigLoader, ConfigSource, FileSource, HttpSource, LoadStatus, StatusReport};
pub use render::{recalc, Recalc};
