//! # django-rs-filters-engine
//!
//! Nested AND/OR/NOT filtering over filter sets. A filter set declares the
//! filters of a model; this crate turns it into a recursive input type and
//! evaluates request trees of that shape into a single query condition.
//!
//! ## Module Overview
//!
//! - [`lookups`] - Enumeration of the lookups a field supports, through transforms
//! - [`filters`] - [`Filter`](filters::Filter) predicates, including full-text search kinds
//! - [`related`] - [`RelatedFilter`](related::RelatedFilter) declarations across relations
//! - [`filterset`] - Filter set declarations and the [`FilterSetRegistry`](filterset::FilterSetRegistry)
//! - [`tree`] - Filter paths as prefix trees
//! - [`schema`] - Input type generation from filter trees
//! - [`input_types`] - The fixed input types of the full-text search filters
//! - [`resolver`] - Value-tree resolution into per-level filter data
//! - [`forms`] - Validation of resolved data
//! - [`proxy`] - The query set / condition pair threaded through evaluation
//! - [`composer`] - [`AdvancedFilterSet`](composer::AdvancedFilterSet) and condition composition
//! - [`connection_field`] - Schema arguments and request resolution for a node type
//! - [`factories`] - Filter set synthesis for connection fields
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use django_rs_filters_core::Settings;
//! use django_rs_filters_db::{FieldDef, FieldType, ModelMeta, ModelRegistry, QuerySet, Record, Value};
//! use django_rs_filters_engine::filterset::{FilterSetDef, FilterSetRegistry};
//! use serde_json::json;
//!
//! let mut models = ModelRegistry::new();
//! models
//!     .register(
//!         ModelMeta::new("shop", "Product")
//!             .field(FieldDef::new("id", FieldType::AutoField).primary_key())
//!             .field(FieldDef::new("name", FieldType::CharField)),
//!     )
//!     .unwrap();
//!
//! let mut registry = FilterSetRegistry::with_settings(models, Arc::new(Settings::default()));
//! registry
//!     .register(FilterSetDef::new("ProductFilterSet", "shop.Product").field_lookups("name", ["exact", "istartswith"]))
//!     .unwrap();
//!
//! let products = QuerySet::new(vec![
//!     Record::new().set("id", Value::Int(1)).set("name", Value::from("Apple")),
//!     Record::new().set("id", Value::Int(2)).set("name", Value::from("Banana")),
//! ]);
//! let filtered = django_rs_filters_engine::apply(
//!     &registry,
//!     "ProductFilterSet",
//!     products,
//!     &json!({"or": [{"name": {"exact": "Apple"}}, {"name": {"istartswith": "ban"}}]}),
//! )
//! .unwrap();
//! assert_eq!(filtered.count().unwrap(), 2);
//! ```

// These clippy lints are intentionally allowed for the engine crate:
// - result_large_err: FilterError is the shared error type and should be used consistently
// - doc_markdown: backtick requirements for documentation items are too strict
// - return_self_not_must_use: builder pattern methods are self-documenting
// - too_many_lines: the resolver and schema walks read best as one function per level
#![allow(clippy::result_large_err)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::cast_possible_truncation)]

pub mod composer;
pub mod connection_field;
pub mod factories;
pub mod filters;
pub mod filterset;
pub mod forms;
pub mod input_types;
pub mod lookups;
pub mod proxy;
pub mod related;
pub mod resolver;
pub mod schema;
pub mod tree;

pub use composer::AdvancedFilterSet;
pub use connection_field::AdvancedFilterConnectionField;
pub use filters::{Filter, FilterKind, FilterValue, SpecialKind};
pub use filterset::{FieldLookups, FilterSetDef, FilterSetRegistry, MetaFields};
pub use related::RelatedFilter;
pub use resolver::{FilterData, ValueTree};
pub use schema::{FilterArgumentsFactory, InputObjectType, SchemaTypes};

use django_rs_filters_core::{FilterError, FilterResult};
use django_rs_filters_db::QueryBuilder;

/// Filters `queryset` with a JSON filter tree.
///
/// The tree is decoded, resolved against the filter set, validated and
/// composed. Invalid data is a [`FilterError::Validation`].
pub fn apply<B: QueryBuilder>(
    registry: &FilterSetRegistry,
    filterset: &str,
    queryset: B,
    tree: &serde_json::Value,
) -> FilterResult<B> {
    let tree = ValueTree::from_json(tree, &registry.settings().filters)?;
    AdvancedFilterSet::from_tree(registry, filterset, &tree)?.qs(queryset)
}

/// Returns the root input type of a filter set's `filter` argument, building
/// it into `types` on first use.
///
/// Types are named after `prefix`, and a type that exists already is reused.
pub fn get_argument_descriptor(
    registry: &FilterSetRegistry,
    filterset: &str,
    prefix: &str,
    types: &mut SchemaTypes,
) -> FilterResult<InputObjectType> {
    let name = FilterArgumentsFactory::new(registry, filterset, prefix).build(types)?;
    types
        .input(&name)
        .cloned()
        .ok_or_else(|| FilterError::ImproperlyConfigured(format!("Input type `{name}` is not defined")))
}
