//! Filter set declarations and the filter registry.
//!
//! A [`FilterSetDef`] declares, for one model, which filters are exposed:
//! filters generated from `Meta.fields`, explicitly declared filters and
//! [`RelatedFilter`]s. The [`FilterSetRegistry`] owns all declarations and
//! builds the flat `name → Filter` map of each:
//!
//! 1. base filters: generated per `(field, lookup)` pair, then declared
//!    filters (which win), then the relation filter of every related
//!    declaration with its per-lookup variants;
//! 2. related expansion: every filter of a related filter set, re-keyed as
//!    `declaration__name` and re-based onto the relation field;
//! 3. full-text search filters, when the database supports them.
//!
//! Builds thread an in-progress set through the recursion. A filter set met
//! again while it is being built contributes its base filters only, which
//! terminates cyclic declarations.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use django_rs_filters_core::logging::filterset_span;
use django_rs_filters_core::{FilterError, FilterResult, FilterSettings, Settings, LOOKUP_SEP, SETTINGS};
use django_rs_filters_db::{FieldDef, FieldType, ModelMeta, ModelRegistry};
use indexmap::IndexMap;

use crate::filters::{is_full_text_search_lookup, Filter, FilterKind, SpecialKind};
use crate::forms::FormFieldType;
use crate::lookups::lookups_for_field;
use crate::related::RelatedFilter;

/// The marker for "every lookup of the field".
pub const ALL_LOOKUPS: &str = "__all__";

// ── Declarations ────────────────────────────────────────────────────────

/// The lookups requested for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldLookups {
    /// Every enumerated lookup (`"__all__"`).
    All,
    /// The listed lookups.
    Lookups(Vec<String>),
}

/// The `Meta.fields` of a filter set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MetaFields {
    /// No generated filters.
    #[default]
    Unset,
    /// Every concrete field and forward relation with the default lookup.
    All,
    /// The listed fields with the default lookup.
    List(Vec<String>),
    /// Fields with their lookups.
    Map(IndexMap<String, FieldLookups>),
}

/// A filter set declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSetDef {
    name: String,
    module: Option<String>,
    model: String,
    fields: MetaFields,
    declared: IndexMap<String, Filter>,
    related: IndexMap<String, RelatedFilter>,
}

impl FilterSetDef {
    /// Declares a filter set for the model with label `model` (`app.Model`).
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module: None,
            model: model.into(),
            fields: MetaFields::Unset,
            declared: IndexMap::new(),
            related: IndexMap::new(),
        }
    }

    /// The module the filter set lives in. Related filters may name other
    /// filter sets of the same module without qualification.
    #[must_use]
    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Generates default-lookup filters for the listed fields.
    #[must_use]
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = MetaFields::List(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Replaces the `Meta.fields` declaration.
    #[must_use]
    pub fn with_fields(mut self, fields: MetaFields) -> Self {
        self.fields = fields;
        self
    }

    /// Generates a default-lookup filter for every field.
    #[must_use]
    pub fn all_fields(mut self) -> Self {
        self.fields = MetaFields::All;
        self
    }

    /// Generates filters for `field` with the given lookups. `"__all__"`
    /// alone requests every lookup; `"full_text_search"` marks the field for
    /// full-text search.
    #[must_use]
    pub fn field_lookups<I, S>(mut self, field: impl Into<String>, lookups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lookups: Vec<String> = lookups.into_iter().map(Into::into).collect();
        let lookups = if lookups.len() == 1 && lookups[0] == ALL_LOOKUPS {
            FieldLookups::All
        } else {
            FieldLookups::Lookups(lookups)
        };
        self.insert_field(field.into(), lookups);
        self
    }

    /// Generates filters for every lookup of `field`.
    #[must_use]
    pub fn all_lookups(mut self, field: impl Into<String>) -> Self {
        self.insert_field(field.into(), FieldLookups::All);
        self
    }

    fn insert_field(&mut self, field: String, lookups: FieldLookups) {
        let mut map = match std::mem::take(&mut self.fields) {
            MetaFields::Map(map) => map,
            MetaFields::List(names) => names
                .into_iter()
                .map(|name| (name, FieldLookups::Lookups(Vec::new())))
                .collect(),
            MetaFields::Unset | MetaFields::All => IndexMap::new(),
        };
        map.insert(field, lookups);
        self.fields = MetaFields::Map(map);
    }

    /// Declares a filter. Declared filters replace generated ones of the
    /// same name.
    #[must_use]
    pub fn declare(mut self, name: impl Into<String>, filter: Filter) -> Self {
        self.declared.insert(name.into(), filter);
        self
    }

    /// Declares a related filter.
    #[must_use]
    pub fn related(mut self, name: impl Into<String>, related: RelatedFilter) -> Self {
        self.related.insert(name.into(), related);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn get_module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    pub const fn meta_fields(&self) -> &MetaFields {
        &self.fields
    }

    pub const fn declared_filters(&self) -> &IndexMap<String, Filter> {
        &self.declared
    }

    pub const fn related_filters(&self) -> &IndexMap<String, RelatedFilter> {
        &self.related
    }

    /// `module.Name`, or the bare name without a module.
    pub fn qualified(&self) -> String {
        self.module
            .as_ref()
            .map_or_else(|| self.name.clone(), |module| format!("{module}.{}", self.name))
    }

    /// The fields with their regular lookups (`full_text_search` removed).
    fn regular_fields(&self, model: &ModelMeta) -> Vec<(String, FieldLookups)> {
        let default = || FieldLookups::Lookups(Vec::new());
        match &self.fields {
            MetaFields::Unset => Vec::new(),
            MetaFields::All => model
                .fields
                .iter()
                .filter(|f| !matches!(f.field_type, FieldType::ManyToOneRel { .. }))
                .map(|f| (f.name.clone(), default()))
                .collect(),
            MetaFields::List(names) => names.iter().map(|n| (n.clone(), default())).collect(),
            MetaFields::Map(map) => map
                .iter()
                .filter_map(|(name, lookups)| match lookups {
                    FieldLookups::All => Some((name.clone(), FieldLookups::All)),
                    FieldLookups::Lookups(list) => {
                        let regular: Vec<String> = list
                            .iter()
                            .filter(|l| !is_full_text_search_lookup(l))
                            .cloned()
                            .collect();
                        // A field listed with the marker only has no regular filters.
                        if regular.is_empty() && !list.is_empty() {
                            None
                        } else {
                            Some((name.clone(), FieldLookups::Lookups(regular)))
                        }
                    }
                })
                .collect(),
        }
    }

    /// Fields marked with the `full_text_search` lookup.
    fn own_search_fields(&self) -> Vec<String> {
        match &self.fields {
            MetaFields::Map(map) => map
                .iter()
                .filter(|(_, lookups)| {
                    matches!(lookups, FieldLookups::Lookups(list) if list.iter().any(|l| is_full_text_search_lookup(l)))
                })
                .map(|(name, _)| name.clone())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Builds the registry name of a filter: `field__lookup`, with a trailing
/// default lookup elided.
///
/// ```
/// use django_rs_filters_core::FilterSettings;
/// use django_rs_filters_engine::filterset::get_filter_name;
///
/// let settings = FilterSettings::default();
/// assert_eq!(get_filter_name(&settings, "name", "exact"), "name");
/// assert_eq!(get_filter_name(&settings, "name", "icontains"), "name__icontains");
/// assert_eq!(get_filter_name(&settings, "name", "lower__exact"), "name__lower");
/// ```
pub fn get_filter_name(settings: &FilterSettings, field_name: &str, lookup_expr: &str) -> String {
    let name = format!("{field_name}{LOOKUP_SEP}{lookup_expr}");
    settings.elide_default_lookup(&name).to_string()
}

// ── Registry ────────────────────────────────────────────────────────────

/// The built filters of a filter set.
#[derive(Debug, Clone, Default)]
pub struct BuiltFilterSet {
    filters: IndexMap<String, Filter>,
    full_text_search_fields: Vec<String>,
    warnings: Vec<String>,
}

impl BuiltFilterSet {
    pub const fn filters(&self) -> &IndexMap<String, Filter> {
        &self.filters
    }

    /// Field paths usable in search vectors.
    pub fn full_text_search_fields(&self) -> &[String] {
        &self.full_text_search_fields
    }

    /// Capability warnings emitted while building.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

/// All filter set declarations of an application.
#[derive(Debug)]
pub struct FilterSetRegistry {
    models: Arc<ModelRegistry>,
    settings: Arc<Settings>,
    filtersets: IndexMap<String, FilterSetDef>,
    cache: RwLock<HashMap<String, Arc<BuiltFilterSet>>>,
}

impl FilterSetRegistry {
    /// Creates a registry using the global settings.
    pub fn new(models: ModelRegistry) -> Self {
        Self::with_settings(models, SETTINGS.get())
    }

    pub fn with_settings(models: ModelRegistry, settings: Arc<Settings>) -> Self {
        Self {
            models: Arc::new(models),
            settings,
            filtersets: IndexMap::new(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub const fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    /// Registers a declaration. Its model must be registered and its
    /// qualified name unused.
    pub fn register(&mut self, def: FilterSetDef) -> FilterResult<()> {
        self.models.get_model(&def.model)?;
        let qualified = def.qualified();
        if self.filtersets.contains_key(&qualified) {
            return Err(FilterError::ImproperlyConfigured(format!(
                "Filter set `{qualified}` is already registered"
            )));
        }
        tracing::trace!(filterset = %qualified, model = %def.model, "Registered filter set");
        self.filtersets.insert(qualified, def);
        Ok(())
    }

    /// Resolves every related filter reference.
    ///
    /// Must be called once all filter sets are registered. An unresolvable
    /// reference is an [`FilterError::ImportError`].
    pub fn wire(&mut self) -> FilterResult<()> {
        let known: Vec<String> = self.filtersets.keys().cloned().collect();
        for def in self.filtersets.values_mut() {
            let module = def.module.clone();
            for related in def.related.values_mut() {
                let target = match related.filterset().resolved() {
                    Some(name) if known.iter().any(|k| k == name) => continue,
                    _ => related.resolve(module.as_deref(), known.iter().map(String::as_str))?,
                };
                related.set_resolved(target);
            }
        }
        tracing::debug!(filtersets = known.len(), "Wired filter sets");
        Ok(())
    }

    /// Returns `true` if a filter set with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.definition(name).is_ok()
    }

    /// Looks a declaration up by qualified name, or by bare name when that
    /// is unambiguous.
    pub fn definition(&self, name: &str) -> FilterResult<&FilterSetDef> {
        if let Some(def) = self.filtersets.get(name) {
            return Ok(def);
        }
        let mut matches = self.filtersets.values().filter(|def| def.name == name);
        match (matches.next(), matches.next()) {
            (Some(def), None) => Ok(def),
            (Some(_), Some(_)) => Err(FilterError::ImproperlyConfigured(format!(
                "Filter set name `{name}` is ambiguous; use the qualified name"
            ))),
            (None, _) => Err(FilterError::ImportError(format!("Filter set `{name}` is not registered"))),
        }
    }

    /// Returns the built filter set, building and caching it on first use.
    pub fn built(&self, name: &str) -> FilterResult<Arc<BuiltFilterSet>> {
        let qualified = self.definition(name)?.qualified();
        if let Some(built) = self
            .cache
            .read()
            .expect("filter set cache lock poisoned")
            .get(&qualified)
        {
            tracing::trace!(filterset = %qualified, "Filter set cache hit");
            return Ok(Arc::clone(built));
        }

        let built = Arc::new(self.build(&qualified)?);
        let mut cache = self.cache.write().expect("filter set cache lock poisoned");
        Ok(Arc::clone(cache.entry(qualified).or_insert(built)))
    }

    /// Returns a copy of the filters of a filter set.
    pub fn get_filters(&self, name: &str) -> FilterResult<IndexMap<String, Filter>> {
        Ok(self.built(name)?.filters.clone())
    }

    pub fn full_text_search_fields(&self, name: &str) -> FilterResult<Vec<String>> {
        Ok(self.built(name)?.full_text_search_fields.clone())
    }

    pub fn warnings(&self, name: &str) -> FilterResult<Vec<String>> {
        Ok(self.built(name)?.warnings.clone())
    }

    // ── Building ─────────────────────────────────────────────────────

    fn build(&self, qualified: &str) -> FilterResult<BuiltFilterSet> {
        let def = self.definition(qualified)?;
        let _span = filterset_span(qualified).entered();

        let mut filters = self.expanded_filters(qualified, &mut HashSet::new())?;
        let full_text_search_fields = self.search_fields(def, &mut HashSet::new())?;
        let mut warnings = Vec::new();
        self.add_search_filters(&mut filters, &full_text_search_fields, &mut warnings);

        tracing::debug!(filters = filters.len(), "Built filter set");
        Ok(BuiltFilterSet {
            filters,
            full_text_search_fields,
            warnings,
        })
    }

    /// Base filters plus the filters of related filter sets, keyed under
    /// the declared relation name. Search filters are added by the top-level
    /// build only.
    fn expanded_filters(
        &self,
        qualified: &str,
        in_progress: &mut HashSet<String>,
    ) -> FilterResult<IndexMap<String, Filter>> {
        let def = self.definition(qualified)?;
        if in_progress.contains(qualified) {
            tracing::debug!(filterset = %qualified, "Filter set is being built; using its base filters");
            return self.base_filters(def);
        }

        in_progress.insert(qualified.to_string());
        let result = self.expand_related(def, in_progress);
        in_progress.remove(qualified);
        result
    }

    fn expand_related(
        &self,
        def: &FilterSetDef,
        in_progress: &mut HashSet<String>,
    ) -> FilterResult<IndexMap<String, Filter>> {
        let model = self.models.get_model(&def.model)?;
        let mut filters = self.base_filters(def)?;

        for (declared_name, related) in &def.related {
            let field_name = related.get_field_name(declared_name);
            if let Err(e) = self.models.get_field(&model.label(), field_name) {
                tracing::warn!(filter = %declared_name, error = %e, "Skipping related filter on a missing field");
                continue;
            }
            let target = self.related_target(def, related)?;
            for (name, filter) in self.expanded_filters(&target, in_progress)? {
                if filter.is_annotated() {
                    continue;
                }
                let key = format!("{declared_name}{LOOKUP_SEP}{name}");
                if !filters.contains_key(&key) {
                    filters.insert(key, filter.rebase(field_name));
                }
            }
        }
        Ok(filters)
    }

    /// Generated, declared and relation filters, without expansion.
    fn base_filters(&self, def: &FilterSetDef) -> FilterResult<IndexMap<String, Filter>> {
        let settings = &self.settings.filters;
        let model = self.models.get_model(&def.model)?;
        let label = model.label();
        let mut filters = IndexMap::new();

        let mut unknown = Vec::new();
        for (field_name, lookups) in def.regular_fields(model) {
            let Ok((_, field)) = self.models.get_field(&label, &field_name) else {
                unknown.push(field_name);
                continue;
            };
            for lookup in self.expand_lookups(field, &lookups) {
                let name = get_filter_name(settings, &field_name, &lookup);
                filters.insert(name, Filter::for_field(&self.models, &field_name, &lookup, field)?);
            }
        }
        if !unknown.is_empty() {
            return Err(FilterError::ImproperlyConfigured(format!(
                "'Meta.fields' must not contain non-model field names: {}",
                unknown.join(", ")
            )));
        }

        for (name, filter) in &def.declared {
            let mut filter = filter.clone();
            if filter.get_form_field().is_none() && matches!(filter.kind(), FilterKind::Field) {
                if let Ok((_, field)) = self.models.get_field(&label, filter.field_name()) {
                    filter.set_form_field(FormFieldType::for_lookup(&self.models, field, filter.lookup_expr())?);
                }
            }
            filters.insert(name.clone(), filter);
        }

        for (declared_name, related) in &def.related {
            let field_name = related.get_field_name(declared_name);
            let Ok((_, field)) = self.models.get_field(&label, field_name) else {
                continue;
            };
            let target = self.related_target(def, related)?;
            let mut relation = Filter::related(field_name, target)
                .form_field(FormFieldType::for_field(&self.models, field)?);
            if let Some(label) = related.get_label() {
                relation = relation.label(label);
            }
            if !def.declared.contains_key(declared_name) {
                filters.insert(declared_name.clone(), relation);
            }

            let lookups = related
                .get_lookups()
                .map(|lookups| self.expand_lookups(field, lookups))
                .unwrap_or_default();
            for lookup in lookups {
                if lookup == settings.default_lookup_expr {
                    continue;
                }
                let name = get_filter_name(settings, field_name, &lookup).replacen(field_name, declared_name, 1);
                if !def.declared.contains_key(&name) && !filters.contains_key(&name) {
                    filters.insert(name, Filter::for_field(&self.models, field_name, &lookup, field)?);
                }
            }
        }

        Ok(filters)
    }

    fn expand_lookups(&self, field: &FieldDef, lookups: &FieldLookups) -> Vec<String> {
        match lookups {
            FieldLookups::All => lookups_for_field(&self.models, field),
            FieldLookups::Lookups(list) if list.is_empty() => vec![self.settings.filters.default_lookup_expr.clone()],
            FieldLookups::Lookups(list) => list.clone(),
        }
    }

    fn related_target(&self, def: &FilterSetDef, related: &RelatedFilter) -> FilterResult<String> {
        match related.filterset().resolved() {
            Some(name) => Ok(self.definition(name)?.qualified()),
            None => related.resolve(def.get_module(), self.filtersets.keys().map(String::as_str)),
        }
    }

    /// Own search fields plus those of related filter sets, prefixed with
    /// the relation field.
    fn search_fields(&self, def: &FilterSetDef, visiting: &mut HashSet<String>) -> FilterResult<Vec<String>> {
        let qualified = def.qualified();
        if !visiting.insert(qualified.clone()) {
            return Ok(Vec::new());
        }
        let mut fields = def.own_search_fields();
        for (declared_name, related) in &def.related {
            let target = self.related_target(def, related)?;
            let field_name = related.get_field_name(declared_name);
            for field in self.search_fields(self.definition(&target)?, visiting)? {
                let path = format!("{field_name}{LOOKUP_SEP}{field}");
                if !fields.contains(&path) {
                    fields.push(path);
                }
            }
        }
        visiting.remove(&qualified);
        Ok(fields)
    }

    fn add_search_filters(
        &self,
        filters: &mut IndexMap<String, Filter>,
        search_fields: &[String],
        warnings: &mut Vec<String>,
    ) {
        if search_fields.is_empty() {
            return;
        }
        let database = &self.settings.database;
        if !database.is_postgresql() {
            let message = format!(
                "Full text search is not available because the {} vendor is used instead of the postgresql vendor.",
                database.vendor
            );
            tracing::warn!("{message}");
            warnings.push(message);
            return;
        }

        for kind in [SpecialKind::SearchQuery, SpecialKind::SearchRank] {
            self.add_special_filters(filters, kind, kind.postfix());
        }

        if !database.supports_trigram() {
            let message =
                "Trigram search is not available because the `pg_trgm` extension is not installed.".to_string();
            tracing::warn!("{message}");
            warnings.push(message);
            return;
        }
        for field in search_fields {
            let field_name = format!("{field}{LOOKUP_SEP}{}", SpecialKind::Trigram.postfix());
            self.add_special_filters(filters, SpecialKind::Trigram, &field_name);
        }
    }

    fn add_special_filters(&self, filters: &mut IndexMap<String, Filter>, kind: SpecialKind, field_name: &str) {
        for lookup in kind.lookups() {
            let name = get_filter_name(&self.settings.filters, field_name, lookup);
            if !filters.contains_key(&name) {
                filters.insert(name, Filter::annotated(field_name, *lookup, kind));
            }
        }
    }
}
