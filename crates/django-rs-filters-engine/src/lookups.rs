//! Lookup enumeration.
//!
//! Expands the lookups registered for a field into the complete list of
//! lookup expressions a filter set may declare with `"__all__"`. Terminal
//! lookups are listed as-is; transforms contribute one expression per lookup
//! of their output class, prefixed by the transform name (`lower__exact`,
//! `length__gt`, ...).
//!
//! A transform is never expanded directly below a transform of the same kind,
//! so `lower__lower__exact` is not produced. Longer cycles (two custom
//! transforms registered on each other's output class) are not detected and
//! must be avoided when registering transforms.

use django_rs_filters_core::LOOKUP_SEP;
use django_rs_filters_db::{FieldDef, LookupClass, LookupRegistry, ModelRegistry, RegisteredLookup, Transform};

/// Returns every lookup expression valid for `field`, in registration order.
///
/// # Examples
///
/// ```
/// use django_rs_filters_db::{FieldDef, FieldType, ModelRegistry};
/// use django_rs_filters_engine::lookups::lookups_for_field;
///
/// let models = ModelRegistry::new();
/// let lookups = lookups_for_field(&models, &FieldDef::new("title", FieldType::CharField));
/// assert_eq!(lookups[0], "exact");
/// assert!(lookups.contains(&"lower__icontains".to_string()));
/// assert!(lookups.contains(&"length__gt".to_string()));
/// assert!(!lookups.iter().any(|l| l.starts_with("lower__lower")));
/// ```
pub fn lookups_for_field(models: &ModelRegistry, field: &FieldDef) -> Vec<String> {
    lookups_for_class(models.lookups(), field.field_type.lookup_class())
}

/// Returns every lookup expression valid for values of `class`.
pub fn lookups_for_class(registry: &LookupRegistry, class: LookupClass) -> Vec<String> {
    let mut lookups = Vec::new();
    for (name, entry) in registry.get_lookups(class) {
        match entry {
            RegisteredLookup::Lookup => lookups.push(name.to_string()),
            RegisteredLookup::Transform(transform) => {
                for sub in lookups_for_transform(registry, transform, class) {
                    lookups.push(format!("{name}{LOOKUP_SEP}{sub}"));
                }
            }
        }
    }
    lookups
}

/// Returns the lookup expressions available after applying `transform` to a
/// value of class `input`, without the transform's own name as prefix.
pub fn lookups_for_transform(
    registry: &LookupRegistry,
    transform: &Transform,
    input: LookupClass,
) -> Vec<String> {
    let output = transform.output.resolve(input);
    let mut lookups = Vec::new();

    for (name, entry) in registry.get_lookups(output) {
        match entry {
            RegisteredLookup::Lookup => lookups.push(name.to_string()),
            RegisteredLookup::Transform(next) => {
                if next.same_kind(transform) {
                    continue;
                }
                for sub in lookups_for_transform(registry, next, output) {
                    lookups.push(format!("{name}{LOOKUP_SEP}{sub}"));
                }
            }
        }
    }
    lookups
}
