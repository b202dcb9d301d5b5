//! Related filter declarations.
//!
//! A [`RelatedFilter`] exposes the filters of another filter set across a
//! relation: declaring `manager` → `PersonFilterSet` on a department filter
//! set makes every filter of `PersonFilterSet` available as `manager__<name>`.
//!
//! The target is named by path and resolved when the registry is wired, so
//! filter sets may refer to each other in any order, cyclically included.

use django_rs_filters_core::{FilterError, FilterResult};

use crate::filterset::FieldLookups;

/// Reference to the filter set a related filter delegates to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterSetRef {
    /// A dotted path (`module.FilterSet`) or a name in the declaring module.
    Path(String),
    /// The qualified name of a registered filter set.
    Resolved(String),
}

impl FilterSetRef {
    /// The qualified name, if resolved.
    pub fn resolved(&self) -> Option<&str> {
        match self {
            Self::Resolved(name) => Some(name),
            Self::Path(_) => None,
        }
    }

    /// The path or name as written.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Path(path) | Self::Resolved(path) => path,
        }
    }
}

/// A filter on a relation that delegates to another filter set.
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedFilter {
    filterset: FilterSetRef,
    field_name: Option<String>,
    lookups: Option<FieldLookups>,
    label: Option<String>,
}

impl RelatedFilter {
    /// Declares a related filter whose target is resolved at wiring time.
    ///
    /// ```
    /// use django_rs_filters_engine::related::RelatedFilter;
    ///
    /// let manager = RelatedFilter::new("hr.PersonFilterSet")
    ///     .field_name("head")
    ///     .lookups(["in", "isnull"]);
    /// assert_eq!(manager.get_field_name("manager"), "head");
    /// assert!(manager.filterset().resolved().is_none());
    /// ```
    pub fn new(filterset: impl Into<String>) -> Self {
        Self {
            filterset: FilterSetRef::Path(filterset.into()),
            field_name: None,
            lookups: None,
            label: None,
        }
    }

    /// Declares a related filter on an already known filter set.
    pub fn to_filterset(qualified_name: impl Into<String>) -> Self {
        Self {
            filterset: FilterSetRef::Resolved(qualified_name.into()),
            ..Self::new(String::new())
        }
    }

    /// The model field of the relation. Defaults to the declaration name.
    #[must_use]
    pub fn field_name(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = Some(field_name.into());
        self
    }

    /// Lookups generated for the relation itself besides `exact`.
    #[must_use]
    pub fn lookups<I, S>(mut self, lookups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lookups = Some(FieldLookups::Lookups(lookups.into_iter().map(Into::into).collect()));
        self
    }

    /// Generates every lookup of the relation field.
    #[must_use]
    pub fn all_lookups(mut self) -> Self {
        self.lookups = Some(FieldLookups::All);
        self
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub const fn filterset(&self) -> &FilterSetRef {
        &self.filterset
    }

    /// The relation field, given the name the filter is declared under.
    pub fn get_field_name<'a>(&'a self, declared_name: &'a str) -> &'a str {
        self.field_name.as_deref().unwrap_or(declared_name)
    }

    pub const fn get_lookups(&self) -> Option<&FieldLookups> {
        self.lookups.as_ref()
    }

    pub fn get_label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Resolves the target against the qualified names of registered filter
    /// sets.
    ///
    /// A path is tried as a qualified name first and then relative to the
    /// declaring module.
    pub(crate) fn resolve<'a, I>(&self, module: Option<&str>, known: I) -> FilterResult<String>
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        let path = self.filterset.as_str();
        let mut candidates = vec![path.to_string()];
        if let Some(module) = module {
            candidates.push(format!("{module}.{path}"));
        }
        candidates
            .into_iter()
            .find(|candidate| known.clone().into_iter().any(|k| k == candidate.as_str()))
            .ok_or_else(|| {
                FilterError::ImportError(format!(
                    "Cannot resolve filter set `{path}`{}",
                    module.map_or_else(String::new, |m| format!(" from module `{m}`"))
                ))
            })
    }

    pub(crate) fn set_resolved(&mut self, qualified_name: String) {
        self.filterset = FilterSetRef::Resolved(qualified_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN: [&str; 2] = ["hr.PersonFilterSet", "hr.TeamFilterSet"];

    #[test]
    fn test_resolve_absolute_path() {
        let related = RelatedFilter::new("hr.TeamFilterSet");
        assert_eq!(related.resolve(None, KNOWN).unwrap(), "hr.TeamFilterSet");
    }

    #[test]
    fn test_resolve_same_module_name() {
        let related = RelatedFilter::new("PersonFilterSet");
        assert_eq!(related.resolve(Some("hr"), KNOWN).unwrap(), "hr.PersonFilterSet");
    }

    #[test]
    fn test_unresolvable_is_import_error() {
        let related = RelatedFilter::new("PersonFilterSet");
        let err = related.resolve(Some("sales"), KNOWN).unwrap_err();
        assert!(matches!(err, FilterError::ImportError(_)));
    }

    #[test]
    fn test_field_name_defaults_to_declaration() {
        let related = RelatedFilter::to_filterset("hr.TeamFilterSet");
        assert_eq!(related.get_field_name("team"), "team");
        assert_eq!(related.filterset().resolved(), Some("hr.TeamFilterSet"));
    }
}
