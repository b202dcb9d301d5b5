//! Query building: lookups, `Q` objects, annotation expressions and the
//! query-builder capability.

pub mod custom_lookups;
pub mod expressions;
pub mod lookups;
pub mod queryset;

pub use django_rs_filters_core::LOOKUP_SEP;
