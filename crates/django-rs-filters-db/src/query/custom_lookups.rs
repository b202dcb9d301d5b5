//! Lookup and transform registry.
//!
//! Every field belongs to a [`LookupClass`]. For each class the registry keeps
//! an *ordered* map of the names usable after the field in a filter path:
//!
//! - **Lookups** are terminal comparisons (`exact`, `icontains`, `gt`, ...).
//! - **Transforms** modify the field value before a lookup is applied
//!   (`lower`, `year`, `length`, ...). A transform declares the class of its
//!   output, which decides the names usable after it.
//!
//! Transforms can be chained: `name__lower__contains` applies `lower` and then
//! the `contains` lookup.
//!
//! # Examples
//!
//! ```
//! use django_rs_filters_db::query::custom_lookups::*;
//!
//! let mut registry = LookupRegistry::with_defaults();
//! registry.register_transform(
//!     LookupClass::Text,
//!     Transform::new("trim", TransformKind::Trim, TransformOutput::SameAsInput),
//! );
//!
//! let chain = registry.resolve_chain(LookupClass::Text, &["trim", "iexact"]).unwrap();
//! assert_eq!(chain.lookup, "iexact");
//! assert_eq!(chain.transforms.len(), 1);
//! ```

use std::sync::Arc;

use chrono::{Datelike, Timelike};
use django_rs_filters_core::{FilterError, FilterResult, LOOKUP_SEP};
use indexmap::IndexMap;
use once_cell::sync::Lazy;

use crate::value::Value;

/// The terminal lookups every text field supports.
pub const TEXT_LOOKUPS: [&str; 17] = [
    "exact",
    "iexact",
    "contains",
    "icontains",
    "in",
    "gt",
    "gte",
    "lt",
    "lte",
    "startswith",
    "istartswith",
    "endswith",
    "iendswith",
    "range",
    "isnull",
    "regex",
    "iregex",
];

const ORDERED_LOOKUPS: [&str; 8] = ["exact", "in", "gt", "gte", "lt", "lte", "range", "isnull"];

const RELATION_LOOKUPS: [&str; 7] = ["exact", "in", "gt", "gte", "lt", "lte", "isnull"];

/// The class of a field for lookup registration purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupClass {
    /// Character and text fields.
    Text,
    /// Integer fields and primary keys.
    Integer,
    /// Float and decimal fields.
    Float,
    /// Boolean fields.
    Boolean,
    /// Date fields.
    Date,
    /// Date-time fields.
    DateTime,
    /// Time fields.
    Time,
    /// UUID fields.
    Uuid,
    /// JSON fields.
    Json,
    /// Relations (compared by the related primary key).
    Relation,
}

/// The output type of a transform, used to determine which lookups are
/// valid after the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformOutput {
    /// The transform produces a string value.
    Text,
    /// The transform produces an integer value.
    Integer,
    /// The transform produces a float value.
    Float,
    /// The transform produces a date value.
    Date,
    /// The transform produces a time value.
    Time,
    /// The transform output type matches the input type.
    SameAsInput,
}

impl TransformOutput {
    /// Returns the lookup class of the transform output for a given input class.
    pub const fn resolve(self, input: LookupClass) -> LookupClass {
        match self {
            Self::Text => LookupClass::Text,
            Self::Integer => LookupClass::Integer,
            Self::Float => LookupClass::Float,
            Self::Date => LookupClass::Date,
            Self::Time => LookupClass::Time,
            Self::SameAsInput => input,
        }
    }
}

/// How a transform changes a value.
#[derive(Debug, Clone, Copy)]
pub enum TransformKind {
    /// Lower-cases text.
    Lower,
    /// Upper-cases text.
    Upper,
    /// Trims surrounding whitespace.
    Trim,
    /// Character length of text.
    Length,
    /// Absolute value of a number.
    Abs,
    /// Year of a date or date-time.
    Year,
    /// Month of a date or date-time.
    Month,
    /// Day of a date or date-time.
    Day,
    /// Hour of a date-time or time.
    Hour,
    /// Minute of a date-time or time.
    Minute,
    /// Date part of a date-time.
    Date,
    /// A user-supplied function.
    Custom(fn(&Value) -> Value),
}

/// A transform registered under a name.
#[derive(Debug, Clone)]
pub struct Transform {
    /// The name used in filter paths (e.g. "lower", "year").
    pub name: String,
    /// The operation applied to values.
    pub kind: TransformKind,
    /// The output type of this transform.
    pub output: TransformOutput,
}

impl Transform {
    /// Creates a new transform.
    pub fn new(name: impl Into<String>, kind: TransformKind, output: TransformOutput) -> Self {
        Self {
            name: name.into(),
            kind,
            output,
        }
    }

    /// Applies this transform to a value. Inapplicable inputs yield `Null`.
    #[allow(clippy::cast_possible_wrap)]
    pub fn apply(&self, value: &Value) -> Value {
        match (self.kind, value) {
            (_, Value::Null) => Value::Null,
            (TransformKind::Custom(func), v) => func(v),
            (TransformKind::Lower, v) => v.text().map_or(Value::Null, |s| Value::String(s.to_lowercase())),
            (TransformKind::Upper, v) => v.text().map_or(Value::Null, |s| Value::String(s.to_uppercase())),
            (TransformKind::Trim, v) => v.text().map_or(Value::Null, |s| Value::String(s.trim().to_string())),
            (TransformKind::Length, v) => v
                .text()
                .map_or(Value::Null, |s| Value::Int(s.chars().count() as i64)),
            (TransformKind::Abs, Value::Int(i)) => Value::Int(i.abs()),
            (TransformKind::Abs, Value::Float(f)) => Value::Float(f.abs()),
            (TransformKind::Year, Value::Date(d)) => Value::Int(i64::from(d.year())),
            (TransformKind::Year, Value::DateTime(dt)) => Value::Int(i64::from(dt.year())),
            (TransformKind::Month, Value::Date(d)) => Value::Int(i64::from(d.month())),
            (TransformKind::Month, Value::DateTime(dt)) => Value::Int(i64::from(dt.month())),
            (TransformKind::Day, Value::Date(d)) => Value::Int(i64::from(d.day())),
            (TransformKind::Day, Value::DateTime(dt)) => Value::Int(i64::from(dt.day())),
            (TransformKind::Hour, Value::DateTime(dt)) => Value::Int(i64::from(dt.hour())),
            (TransformKind::Hour, Value::Time(t)) => Value::Int(i64::from(t.hour())),
            (TransformKind::Minute, Value::DateTime(dt)) => Value::Int(i64::from(dt.minute())),
            (TransformKind::Minute, Value::Time(t)) => Value::Int(i64::from(t.minute())),
            (TransformKind::Date, Value::DateTime(dt)) => Value::Date(dt.date()),
            (TransformKind::Date, Value::Date(d)) => Value::Date(*d),
            _ => Value::Null,
        }
    }

    /// Returns `true` if both transforms perform the same operation.
    ///
    /// Custom transforms are identified by name.
    pub fn same_kind(&self, other: &Self) -> bool {
        match (self.kind, other.kind) {
            (TransformKind::Custom(_), TransformKind::Custom(_)) => self.name == other.name,
            (a, b) => std::mem::discriminant(&a) == std::mem::discriminant(&b),
        }
    }
}

/// An entry in the registry: a terminal lookup or a transform.
#[derive(Debug, Clone)]
pub enum RegisteredLookup {
    /// A terminal comparison.
    Lookup,
    /// A value transform with further lookups.
    Transform(Transform),
}

/// The result of resolving a `transform__...__lookup` chain.
#[derive(Debug, Clone)]
pub struct LookupChain<'a> {
    /// Transforms in application order.
    pub transforms: Vec<&'a Transform>,
    /// The terminal lookup name (`exact` when the chain ends in a transform).
    pub lookup: String,
    /// The lookup class the terminal lookup applies to.
    pub class: LookupClass,
}

/// Ordered registry of lookups and transforms per [`LookupClass`].
#[derive(Debug, Clone, Default)]
pub struct LookupRegistry {
    classes: IndexMap<LookupClass, IndexMap<String, RegisteredLookup>>,
}

impl LookupRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-populated with the builtin lookups and transforms.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        for name in TEXT_LOOKUPS {
            registry.register_lookup(LookupClass::Text, name);
        }
        registry.register_transform(
            LookupClass::Text,
            Transform::new("lower", TransformKind::Lower, TransformOutput::SameAsInput),
        );
        registry.register_transform(
            LookupClass::Text,
            Transform::new("length", TransformKind::Length, TransformOutput::Integer),
        );

        for class in [
            LookupClass::Integer,
            LookupClass::Float,
            LookupClass::Date,
            LookupClass::DateTime,
            LookupClass::Time,
        ] {
            for name in ORDERED_LOOKUPS {
                registry.register_lookup(class, name);
            }
        }
        for class in [LookupClass::Integer, LookupClass::Float] {
            registry.register_transform(
                class,
                Transform::new("abs", TransformKind::Abs, TransformOutput::SameAsInput),
            );
        }

        for class in [LookupClass::Date, LookupClass::DateTime] {
            for (name, kind) in [
                ("year", TransformKind::Year),
                ("month", TransformKind::Month),
                ("day", TransformKind::Day),
            ] {
                registry.register_transform(class, Transform::new(name, kind, TransformOutput::Integer));
            }
        }
        registry.register_transform(
            LookupClass::DateTime,
            Transform::new("date", TransformKind::Date, TransformOutput::Date),
        );
        for class in [LookupClass::DateTime, LookupClass::Time] {
            registry.register_transform(
                class,
                Transform::new("hour", TransformKind::Hour, TransformOutput::Integer),
            );
            registry.register_transform(
                class,
                Transform::new("minute", TransformKind::Minute, TransformOutput::Integer),
            );
        }

        for name in ["exact", "in", "isnull"] {
            registry.register_lookup(LookupClass::Boolean, name);
            registry.register_lookup(LookupClass::Uuid, name);
        }
        for name in ["exact", "isnull"] {
            registry.register_lookup(LookupClass::Json, name);
        }
        for name in RELATION_LOOKUPS {
            registry.register_lookup(LookupClass::Relation, name);
        }

        registry
    }

    /// Registers a terminal lookup for a class.
    pub fn register_lookup(&mut self, class: LookupClass, name: impl Into<String>) {
        self.classes
            .entry(class)
            .or_default()
            .insert(name.into(), RegisteredLookup::Lookup);
    }

    /// Registers a transform for a class.
    pub fn register_transform(&mut self, class: LookupClass, transform: Transform) {
        self.classes
            .entry(class)
            .or_default()
            .insert(transform.name.clone(), RegisteredLookup::Transform(transform));
    }

    /// Unregisters a lookup or transform by name.
    pub fn unregister(&mut self, class: LookupClass, name: &str) -> Option<RegisteredLookup> {
        self.classes.get_mut(&class)?.shift_remove(name)
    }

    /// Returns the lookups and transforms registered for a class, in
    /// registration order.
    pub fn get_lookups(&self, class: LookupClass) -> impl Iterator<Item = (&str, &RegisteredLookup)> {
        self.classes
            .get(&class)
            .into_iter()
            .flat_map(|entries| entries.iter().map(|(name, entry)| (name.as_str(), entry)))
    }

    /// Returns a registered lookup or transform.
    pub fn get(&self, class: LookupClass, name: &str) -> Option<&RegisteredLookup> {
        self.classes.get(&class)?.get(name)
    }

    /// Returns true if a terminal lookup with the given name is registered.
    pub fn has_lookup(&self, class: LookupClass, name: &str) -> bool {
        matches!(self.get(class, name), Some(RegisteredLookup::Lookup))
    }

    /// Returns the transform registered under `name` for `class`.
    pub fn get_transform(&self, class: LookupClass, name: &str) -> Option<&Transform> {
        match self.get(class, name) {
            Some(RegisteredLookup::Transform(t)) => Some(t),
            _ => None,
        }
    }

    /// Returns the first transform registered under `name` in any class.
    pub fn find_transform(&self, name: &str) -> Option<&Transform> {
        self.classes.values().find_map(|entries| match entries.get(name) {
            Some(RegisteredLookup::Transform(t)) => Some(t),
            _ => None,
        })
    }

    /// Resolves a chain of transforms and a final lookup from the path
    /// segments after a field name.
    ///
    /// A chain that ends in a transform gets the implicit `exact` lookup. An
    /// unregistered segment is an [`FilterError::UnknownLookup`].
    pub fn resolve_chain<'a>(
        &'a self,
        class: LookupClass,
        segments: &[&str],
    ) -> FilterResult<LookupChain<'a>> {
        let mut transforms = Vec::new();
        let mut class = class;

        for (i, segment) in segments.iter().enumerate() {
            match self.get(class, segment) {
                Some(RegisteredLookup::Transform(t)) => {
                    transforms.push(t);
                    class = t.output.resolve(class);
                }
                Some(RegisteredLookup::Lookup) if i + 1 == segments.len() => {
                    return Ok(LookupChain {
                        transforms,
                        lookup: (*segment).to_string(),
                        class,
                    });
                }
                _ => {
                    return Err(FilterError::UnknownLookup {
                        lookup: segments.join(LOOKUP_SEP),
                        target: format!("{class:?}"),
                    })
                }
            }
        }

        if self.has_lookup(class, "exact") {
            Ok(LookupChain {
                transforms,
                lookup: "exact".to_string(),
                class,
            })
        } else {
            Err(FilterError::UnknownLookup {
                lookup: segments.join(LOOKUP_SEP),
                target: format!("{class:?}"),
            })
        }
    }
}

/// The shared default registry.
pub static DEFAULT_LOOKUPS: Lazy<Arc<LookupRegistry>> =
    Lazy::new(|| Arc::new(LookupRegistry::with_defaults()));

#[cfg(test)]
mod tests {
    use super::*;

    fn names(registry: &LookupRegistry, class: LookupClass) -> Vec<&str> {
        registry.get_lookups(class).map(|(name, _)| name).collect()
    }

    #[test]
    fn test_default_text_lookups_in_order() {
        let registry = LookupRegistry::with_defaults();
        let text = names(&registry, LookupClass::Text);
        assert_eq!(&text[..3], &["exact", "iexact", "contains"]);
        assert_eq!(text.len(), 19);
        assert!(text.contains(&"lower"));
    }

    #[test]
    fn test_relation_lookups() {
        let registry = LookupRegistry::with_defaults();
        assert_eq!(
            names(&registry, LookupClass::Relation),
            vec!["exact", "in", "gt", "gte", "lt", "lte", "isnull"]
        );
    }

    #[test]
    fn test_resolve_chain_with_transform() {
        let registry = LookupRegistry::with_defaults();
        let chain = registry
            .resolve_chain(LookupClass::DateTime, &["date", "year", "gte"])
            .unwrap();
        assert_eq!(chain.transforms.len(), 2);
        assert_eq!(chain.lookup, "gte");
        assert_eq!(chain.class, LookupClass::Integer);
    }

    #[test]
    fn test_resolve_chain_trailing_transform_defaults_to_exact() {
        let registry = LookupRegistry::with_defaults();
        let chain = registry.resolve_chain(LookupClass::Date, &["year"]).unwrap();
        assert_eq!(chain.lookup, "exact");
        assert_eq!(chain.class, LookupClass::Integer);
    }

    #[test]
    fn test_resolve_chain_unknown() {
        let registry = LookupRegistry::with_defaults();
        let err = registry
            .resolve_chain(LookupClass::Boolean, &["icontains"])
            .unwrap_err();
        assert!(matches!(err, FilterError::UnknownLookup { .. }));
        assert!(registry.resolve_chain(LookupClass::Text, &["exact", "lower"]).is_err());
    }

    #[test]
    fn test_transform_apply() {
        let lower = Transform::new("lower", TransformKind::Lower, TransformOutput::SameAsInput);
        assert_eq!(lower.apply(&Value::from("MiXeD")), Value::from("mixed"));
        assert_eq!(lower.apply(&Value::Null), Value::Null);

        let year = Transform::new("year", TransformKind::Year, TransformOutput::Integer);
        let d = chrono::NaiveDate::from_ymd_opt(2021, 3, 4).unwrap();
        assert_eq!(year.apply(&Value::Date(d)), Value::Int(2021));
        assert_eq!(year.apply(&Value::from("x")), Value::Null);
    }

    #[test]
    fn test_custom_transform() {
        fn reverse(v: &Value) -> Value {
            v.text()
                .map_or(Value::Null, |s| Value::String(s.chars().rev().collect()))
        }
        let mut registry = LookupRegistry::new();
        registry.register_transform(
            LookupClass::Text,
            Transform::new("reverse", TransformKind::Custom(reverse), TransformOutput::Text),
        );
        let t = registry.find_transform("reverse").unwrap();
        assert_eq!(t.apply(&Value::from("abc")), Value::from("cba"));
    }

    #[test]
    fn test_same_kind() {
        let a = Transform::new("lower", TransformKind::Lower, TransformOutput::SameAsInput);
        let b = Transform::new("lc", TransformKind::Lower, TransformOutput::SameAsInput);
        let c = Transform::new("upper", TransformKind::Upper, TransformOutput::SameAsInput);
        assert!(a.same_kind(&b));
        assert!(!a.same_kind(&c));
    }

    #[test]
    fn test_unregister() {
        let mut registry = LookupRegistry::with_defaults();
        assert!(registry.unregister(LookupClass::Text, "regex").is_some());
        assert!(!registry.has_lookup(LookupClass::Text, "regex"));
    }
}
