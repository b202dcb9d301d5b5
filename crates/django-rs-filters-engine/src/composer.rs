//! Boolean expression composition.
//!
//! [`AdvancedFilterSet`] binds request data to a filter set, validates it with
//! a [`TreeForm`] and folds the cleaned tree into a single [`Q`]:
//!
//! 1. every cleaned value of a level contributes its filter's condition;
//! 2. `and` forms are evaluated from the running state and AND-ed;
//! 3. `or` forms are evaluated from the running state and OR-ed, the group
//!    being one more AND-ed condition; a form without conditions drops out;
//! 4. the `not` form is evaluated from the state the level started from and
//!    its negation is AND-ed.
//!
//! Filters may annotate the query set while they are evaluated; the query
//! set is threaded through the walk and returned with the condition.

use std::sync::Arc;

use django_rs_filters_core::logging::filterset_span;
use django_rs_filters_core::{ErrorDict, FilterError, FilterResult, FilterSettings, LOOKUP_SEP};
use django_rs_filters_db::{QueryBuilder, Q};
use indexmap::IndexMap;
use once_cell::unsync::OnceCell;

use crate::filters::Filter;
use crate::filterset::FilterSetRegistry;
use crate::forms::TreeForm;
use crate::proxy::QuerySetProxy;
use crate::resolver::{resolve, FilterData, ValueTree};

/// Finds the filter a data key refers to.
///
/// Data keys may omit the default lookup, and filter sets may declare filters
/// under names that do not follow the `field__lookup` convention, so the key
/// is tried as:
///
/// 1. the canonical filter name (`field` for the default lookup, the key
///    itself otherwise);
/// 2. a filter with the same field name and lookup expression;
/// 3. a filter whose path, with default lookup segments removed, spells the
///    key (`name__lower` for `name` + `lower__exact`).
///
/// ```
/// use django_rs_filters_core::FilterSettings;
/// use django_rs_filters_engine::composer::find_filter;
/// use django_rs_filters_engine::filters::Filter;
/// use indexmap::IndexMap;
///
/// let mut filters = IndexMap::new();
/// filters.insert("title".to_string(), Filter::new("title", "exact"));
/// filters.insert("by_author".to_string(), Filter::new("author", "icontains"));
/// let settings = FilterSettings::default();
///
/// assert_eq!(find_filter(&filters, "title__exact", &settings).unwrap().0, "title");
/// assert_eq!(find_filter(&filters, "author__icontains", &settings).unwrap().0, "by_author");
/// assert!(find_filter(&filters, "author", &settings).is_none());
/// ```
pub fn find_filter<'a>(
    filters: &'a IndexMap<String, Filter>,
    data_key: &str,
    settings: &FilterSettings,
) -> Option<(&'a str, &'a Filter)> {
    let default = settings.default_lookup_expr.as_str();
    let (field_name, lookup_expr) = data_key.rsplit_once(LOOKUP_SEP).unwrap_or((data_key, default));
    let key = if lookup_expr == default { field_name } else { data_key };

    if let Some((name, filter)) = filters.get_key_value(key) {
        return Some((name.as_str(), filter));
    }
    let by_parts = filters
        .iter()
        .find(|(_, f)| f.field_name() == field_name && f.lookup_expr() == lookup_expr);
    if let Some((name, filter)) = by_parts {
        return Some((name.as_str(), filter));
    }
    filters
        .iter()
        .find(|(_, f)| {
            let segments: Vec<&str> = f.path().into_iter().filter(|s| *s != default).collect();
            segments.join(LOOKUP_SEP) == data_key
        })
        .map(|(name, filter)| (name.as_str(), filter))
}

/// A filter set bound to request data.
///
/// The filters are copied from the registry per instance, so the counters
/// used for annotation names start fresh for every request.
#[derive(Debug)]
pub struct AdvancedFilterSet<'r> {
    registry: &'r FilterSetRegistry,
    name: String,
    filters: IndexMap<String, Filter>,
    data: FilterData,
    form: OnceCell<TreeForm>,
}

impl<'r> AdvancedFilterSet<'r> {
    /// Binds resolved data to the filter set `name`.
    pub fn new(registry: &'r FilterSetRegistry, name: &str, data: FilterData) -> FilterResult<Self> {
        Ok(Self {
            registry,
            name: name.to_string(),
            filters: registry.get_filters(name)?,
            data,
            form: OnceCell::new(),
        })
    }

    /// Resolves a value tree and binds the result.
    pub fn from_tree(registry: &'r FilterSetRegistry, name: &str, tree: &ValueTree) -> FilterResult<Self> {
        let data = resolve(registry, name, tree)?;
        Self::new(registry, name, data)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn filters(&self) -> &IndexMap<String, Filter> {
        &self.filters
    }

    pub const fn data(&self) -> &FilterData {
        &self.data
    }

    /// The validated form of the bound data, built on first access.
    pub fn form(&self) -> &TreeForm {
        self.form.get_or_init(|| {
            TreeForm::new(&self.filters, &self.data, Arc::clone(self.registry.settings()))
        })
    }

    pub fn is_valid(&self) -> bool {
        self.form().is_valid()
    }

    pub fn errors(&self) -> ErrorDict {
        self.form().errors()
    }

    /// Finds the filter of a data key. See [`find_filter`].
    pub fn find_filter(&self, data_key: &str) -> Option<&Filter> {
        find_filter(&self.filters, data_key, &self.registry.settings().filters).map(|(_, f)| f)
    }

    /// Evaluates a form level against `queryset`.
    pub fn queryset_proxy_for_form<B: QueryBuilder>(
        &self,
        queryset: B,
        form: &TreeForm,
    ) -> FilterResult<QuerySetProxy<B>> {
        let mut proxy = QuerySetProxy::new(queryset.clone());
        for (key, value) in form.cleaned_data() {
            let filter = self.find_filter(key).ok_or_else(|| {
                FilterError::FieldDoesNotExist(format!("{} has no filter for `{key}`", self.name))
            })?;
            proxy = filter.filter(proxy, value)?;
        }
        let (mut qs, q) = proxy.into_parts();

        let mut and_q = Q::identity();
        for and_form in form.and_forms() {
            let (next, branch_q) = self.queryset_proxy_for_form(qs, and_form)?.into_parts();
            qs = next;
            and_q = and_q & branch_q;
        }

        let mut or_q = Q::identity();
        for or_form in form.or_forms() {
            let (next, branch_q) = self.queryset_proxy_for_form(qs, or_form)?.into_parts();
            qs = next;
            or_q = or_q | branch_q;
        }

        let not_q = match form.not_form() {
            Some(not_form) => {
                let (not_qs, branch_q) = self.queryset_proxy_for_form(queryset, not_form)?.into_parts();
                qs = qs.merge_annotations(&not_qs);
                !branch_q
            }
            None => Q::identity(),
        };

        Ok(QuerySetProxy::with_q(
            qs,
            q & and_q & or_q & not_q,
        ))
    }

    /// Validates the data and returns the query set and the composed
    /// condition, without applying it.
    pub fn evaluate<B: QueryBuilder>(&self, queryset: B) -> FilterResult<(B, Q)> {
        let _span = filterset_span(&self.name).entered();
        let form = self.form();
        if !form.is_valid() {
            let errors = form.errors();
            tracing::debug!(errors = %errors.as_json(), "Filter data is invalid");
            return Err(FilterError::Validation(errors));
        }
        let (qs, q) = self.queryset_proxy_for_form(queryset, form)?.into_parts();
        tracing::debug!(conditions = q.leaf_count(), "Composed filter condition");
        Ok((qs, q))
    }

    /// Filters `queryset` with the composed condition.
    pub fn filter_queryset<B: QueryBuilder>(&self, queryset: B) -> FilterResult<B> {
        let (qs, q) = self.evaluate(queryset)?;
        Ok(qs.filter(q))
    }

    /// Filters `queryset` and requests de-duplication, since relation
    /// lookups may match a row more than once.
    pub fn qs<B: QueryBuilder>(&self, queryset: B) -> FilterResult<B> {
        Ok(self.filter_queryset(queryset)?.distinct())
    }
}
