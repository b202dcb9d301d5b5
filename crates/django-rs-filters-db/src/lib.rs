//! # django-rs-filters-db
//!
//! The query-builder capability used by the filtering engine. Provides the
//! backend-agnostic [`Value`](value::Value), model introspection
//! ([`ModelRegistry`](model::ModelRegistry)), the lookup and transform registry,
//! [`Q`](query::lookups::Q) objects, full-text search expressions, and an
//! in-memory [`QuerySet`](query::queryset::QuerySet) implementing
//! [`QueryBuilder`](query::queryset::QueryBuilder).
//!
//! ## Module Overview
//!
//! - [`model`] - [`ModelMeta`](model::ModelMeta) and the model registry
//! - [`fields`] - Field definitions ([`FieldDef`](fields::FieldDef)) and types
//! - [`value`] - The backend-agnostic [`Value`](value::Value) enum
//! - [`query`] - Lookups, transforms, expressions, and query sets

// These clippy lints are intentionally allowed for the query crate:
// - cast_precision_loss: i64-to-f64 casts are acceptable for numeric comparisons
// - result_large_err: FilterError is the shared error type and should be used consistently
// - doc_markdown: backtick requirements for documentation items are too strict
// - return_self_not_must_use: builder pattern methods are self-documenting
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::result_large_err)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::match_same_arms)]

pub mod fields;
pub mod model;
pub mod query;
pub mod value;

pub use fields::{FieldDef, FieldType};
pub use model::{ModelMeta, ModelRegistry};
pub use query::custom_lookups::{LookupClass, LookupRegistry, RegisteredLookup, Transform};
pub use query::expressions::Expression;
pub use query::lookups::{Lookup, Q};
pub use query::queryset::{QueryBuilder, QuerySet, Record};
pub use value::Value;
