//! # django-rs-filters
//!
//! Advanced filtering for django-rs style filter sets: nested `and`/`or`/`not`
//! filter trees, filters that follow relations into other filter sets, and
//! PostgreSQL full-text search and trigram filters.
//!
//! This is the meta-crate that re-exports all sub-crates for convenient access.
//! You can depend on `django-rs-filters` to get everything, or depend on
//! individual crates for finer-grained control.

/// Error types, settings, and logging setup.
pub use django_rs_filters_core as core;

/// The query-builder capability: values, models, lookups, `Q` objects, and
/// the in-memory `QuerySet`.
pub use django_rs_filters_db as db;

/// The filter-tree engine: filter sets, schema generation, resolution, and
/// composition.
pub use django_rs_filters_engine as engine;

/// Re-export of `serde_json` for building filter trees.
pub use serde_json;

/// Re-export of `tracing` for instrumenting code that applies filters.
pub use tracing;

/// Commonly used types, for glob import.
pub mod prelude {
    pub use django_rs_filters_core::{FilterError, FilterResult, FilterSettings, Settings, SETTINGS};
    pub use django_rs_filters_db::{ModelMeta, ModelRegistry, QueryBuilder, QuerySet, Q};
    pub use django_rs_filters_engine::{
        apply, get_argument_descriptor, AdvancedFilterConnectionField, AdvancedFilterSet, Filter,
        FilterSetDef, FilterSetRegistry, RelatedFilter, SchemaTypes, ValueTree,
    };
}
