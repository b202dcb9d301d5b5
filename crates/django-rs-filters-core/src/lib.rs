//! # django-rs-filters-core
//!
//! Core types for the django-rs filtering engine: the error taxonomy, the
//! fixed and user-configurable settings, settings loading, and logging setup.
//!
//! ## Modules
//!
//! - [`error`] - Error types, the nested validation error dict, result alias
//! - [`settings`] - Filter settings, database features, and the global holder
//! - [`settings_loader`] - TOML/JSON/environment loading
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use error::{ErrorDict, FilterError, FilterResult, ValidationError};
pub use settings::{
    DatabaseFeatures, DatabaseVendor, FilterSettings, Settings, LOOKUP_SEP, SETTINGS,
};
