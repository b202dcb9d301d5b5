//! Filters: the predicates a filter set exposes.
//!
//! A [`Filter`] binds a field path, a lookup expression and an evaluation
//! strategy ([`FilterKind`]):
//!
//! - [`FilterKind::Field`] applies the lookup to the field directly.
//! - [`FilterKind::Related`] is the model-choice filter on a relation declared
//!   with a [`RelatedFilter`](crate::related::RelatedFilter).
//! - [`FilterKind::Annotated`] first adds a computed column (a search vector,
//!   a search rank or a trigram similarity/distance) and then compares the
//!   column. Its value is a prepared [`FilterValue::Annotated`].
//!
//! Filters never touch the query directly; they contribute conditions to a
//! [`QuerySetProxy`].

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use django_rs_filters_core::{FilterError, FilterResult, ValidationError, LOOKUP_SEP};
use django_rs_filters_db::query::expressions::search::SearchQuery;
use django_rs_filters_db::{Expression, FieldDef, Lookup, ModelRegistry, QueryBuilder, Value, Q};

use crate::forms::FormFieldType;
use crate::proxy::QuerySetProxy;

/// Global declaration counter, used to keep annotation names unique across
/// filters.
static CREATION_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// The lookup name that marks a field as a full-text search candidate.
pub const FULL_TEXT_SEARCH_MARKER: &str = "full_text_search";

/// Returns `true` if a lookup expression is the full-text search marker.
pub fn is_full_text_search_lookup(lookup_expr: &str) -> bool {
    lookup_expr.rsplit(LOOKUP_SEP).next() == Some(FULL_TEXT_SEARCH_MARKER)
}

// ── Special kinds ───────────────────────────────────────────────────────

const SEARCH_QUERY_LOOKUPS: &[&str] = &["exact"];
const NUMERIC_LOOKUPS: &[&str] = &["exact", "gt", "gte", "lt", "lte"];

/// The full-text search filter kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialKind {
    /// Match of a search vector against a search query.
    SearchQuery,
    /// Numeric comparison of a search rank.
    SearchRank,
    /// Numeric comparison of a trigram similarity or distance.
    Trigram,
}

impl SpecialKind {
    /// Every special kind.
    pub const ALL: [Self; 3] = [Self::SearchQuery, Self::SearchRank, Self::Trigram];

    /// The path segment identifying the kind.
    pub const fn postfix(self) -> &'static str {
        match self {
            Self::SearchQuery => "search_query",
            Self::SearchRank => "search_rank",
            Self::Trigram => "trigram",
        }
    }

    /// The lookups generated for the kind.
    pub const fn lookups(self) -> &'static [&'static str] {
        match self {
            Self::SearchQuery => SEARCH_QUERY_LOOKUPS,
            Self::SearchRank | Self::Trigram => NUMERIC_LOOKUPS,
        }
    }

    /// Looks up the kind identified by a path segment.
    pub fn from_postfix(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.postfix() == segment)
    }
}

impl fmt::Display for SpecialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.postfix())
    }
}

// ── Values ──────────────────────────────────────────────────────────────

/// The comparison operand of an annotated filter.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchValue {
    /// A search query, matched against a search vector column.
    Query(SearchQuery),
    /// A number, compared against a rank or trigram column.
    Number(f64),
}

/// A cleaned filter value.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// A scalar (or list) value for a field lookup.
    Plain(Value),
    /// A computed column and the operand to compare it with.
    Annotated {
        /// The expression stored under the generated annotation name.
        annotation: Expression,
        /// The operand of the filter's lookup.
        search_value: SearchValue,
    },
}

impl FilterValue {
    /// Returns `true` for values that make a filter a no-op (Django's
    /// `EMPTY_VALUES`).
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Plain(Value::Null) => true,
            Self::Plain(Value::String(s)) => s.is_empty(),
            Self::Plain(Value::List(items)) => items.is_empty(),
            Self::Plain(Value::Json(json)) => match json {
                serde_json::Value::Object(map) => map.is_empty(),
                serde_json::Value::Array(items) => items.is_empty(),
                serde_json::Value::Null => true,
                _ => false,
            },
            Self::Plain(_) | Self::Annotated { .. } => false,
        }
    }
}

impl From<Value> for FilterValue {
    fn from(value: Value) -> Self {
        Self::Plain(value)
    }
}

// ── Filter ──────────────────────────────────────────────────────────────

/// How a filter is evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterKind {
    /// A lookup on a model field.
    Field,
    /// The model-choice filter of a related filter declaration.
    Related {
        /// Name of the filter set the relation is filtered with.
        filterset: String,
    },
    /// A lookup on a computed full-text search column.
    Annotated(SpecialKind),
}

/// A single predicate.
#[derive(Debug)]
pub struct Filter {
    field_name: String,
    lookup_expr: String,
    kind: FilterKind,
    label: Option<String>,
    form_field: Option<FormFieldType>,
    exclude: bool,
    distinct: bool,
    required: bool,
    creation_counter: usize,
    filter_counter: AtomicUsize,
}

impl Clone for Filter {
    fn clone(&self) -> Self {
        Self {
            field_name: self.field_name.clone(),
            lookup_expr: self.lookup_expr.clone(),
            kind: self.kind.clone(),
            label: self.label.clone(),
            form_field: self.form_field.clone(),
            exclude: self.exclude,
            distinct: self.distinct,
            required: self.required,
            creation_counter: self.creation_counter,
            filter_counter: AtomicUsize::new(self.filter_counter.load(Ordering::Relaxed)),
        }
    }
}

impl PartialEq for Filter {
    fn eq(&self, other: &Self) -> bool {
        self.field_name == other.field_name
            && self.lookup_expr == other.lookup_expr
            && self.kind == other.kind
            && self.label == other.label
            && self.form_field == other.form_field
            && self.exclude == other.exclude
            && self.distinct == other.distinct
            && self.required == other.required
    }
}

impl Filter {
    /// Creates a field filter.
    ///
    /// # Examples
    ///
    /// ```
    /// use django_rs_filters_engine::filters::Filter;
    /// use django_rs_filters_engine::forms::FormFieldType;
    ///
    /// let filter = Filter::new("title", "icontains")
    ///     .label("Title contains")
    ///     .form_field(FormFieldType::Char);
    /// assert_eq!(filter.path(), vec!["title", "icontains"]);
    /// ```
    pub fn new(field_name: impl Into<String>, lookup_expr: impl Into<String>) -> Self {
        Self::with_kind(field_name.into(), lookup_expr.into(), FilterKind::Field)
    }

    /// Creates a full-text search filter. Its form field accepts prepared
    /// values only.
    pub fn annotated(
        field_name: impl Into<String>,
        lookup_expr: impl Into<String>,
        kind: SpecialKind,
    ) -> Self {
        let mut filter =
            Self::with_kind(field_name.into(), lookup_expr.into(), FilterKind::Annotated(kind));
        filter.form_field = Some(FormFieldType::Prepared);
        filter
    }

    /// Creates the model-choice filter of a related declaration.
    pub(crate) fn related(field_name: impl Into<String>, filterset: impl Into<String>) -> Self {
        Self::with_kind(
            field_name.into(),
            "exact".to_string(),
            FilterKind::Related {
                filterset: filterset.into(),
            },
        )
    }

    /// Generates the filter for `field_name__lookup_expr` on a model field.
    ///
    /// The form field follows the class the lookup chain ends on, so
    /// `title__length__gt` takes an integer, `in` takes a list and `isnull`
    /// a boolean.
    pub fn for_field(
        models: &ModelRegistry,
        field_name: &str,
        lookup_expr: &str,
        field: &FieldDef,
    ) -> FilterResult<Self> {
        let form_field = FormFieldType::for_lookup(models, field, lookup_expr)?;
        Ok(Self::new(field_name, lookup_expr).form_field(form_field))
    }

    fn with_kind(field_name: String, lookup_expr: String, kind: FilterKind) -> Self {
        Self {
            field_name,
            lookup_expr,
            kind,
            label: None,
            form_field: None,
            exclude: false,
            distinct: false,
            required: false,
            creation_counter: CREATION_COUNTER.fetch_add(1, Ordering::Relaxed),
            filter_counter: AtomicUsize::new(0),
        }
    }

    // ── Builders ─────────────────────────────────────────────────────

    /// Sets the human-readable label, used as the argument description.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Sets the form field used to clean values.
    #[must_use]
    pub fn form_field(mut self, form_field: FormFieldType) -> Self {
        self.form_field = Some(form_field);
        self
    }

    /// Makes the filter exclude matching rows instead of keeping them.
    #[must_use]
    pub fn exclude(mut self, exclude: bool) -> Self {
        self.exclude = exclude;
        self
    }

    /// Requests `distinct()` whenever the filter is applied.
    #[must_use]
    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    /// Makes a value mandatory at the root of a filter tree.
    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    // ── Accessors ────────────────────────────────────────────────────

    /// The `__`-separated field path.
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// The lookup expression, possibly including transforms.
    pub fn lookup_expr(&self) -> &str {
        &self.lookup_expr
    }

    /// The evaluation strategy.
    pub const fn kind(&self) -> &FilterKind {
        &self.kind
    }

    /// The special kind of an annotated filter.
    pub const fn special_kind(&self) -> Option<SpecialKind> {
        match self.kind {
            FilterKind::Annotated(kind) => Some(kind),
            _ => None,
        }
    }

    /// Returns `true` for full-text search filters.
    pub const fn is_annotated(&self) -> bool {
        matches!(self.kind, FilterKind::Annotated(_))
    }

    /// The label, if one was set.
    pub fn get_label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The form field, if known.
    pub const fn get_form_field(&self) -> Option<&FormFieldType> {
        self.form_field.as_ref()
    }

    /// Whether matching rows are excluded.
    pub const fn is_exclude(&self) -> bool {
        self.exclude
    }

    /// Whether a value is mandatory.
    pub const fn is_required(&self) -> bool {
        self.required
    }

    /// The declaration order of this filter.
    pub const fn creation_counter(&self) -> usize {
        self.creation_counter
    }

    /// The path segments of the field followed by those of the lookup.
    pub fn path(&self) -> Vec<&str> {
        self.field_name
            .split(LOOKUP_SEP)
            .chain(self.lookup_expr.split(LOOKUP_SEP))
            .collect()
    }

    /// Returns a copy whose field path starts at the relation `prefix`.
    pub(crate) fn rebase(&self, prefix: &str) -> Self {
        let mut filter = self.clone();
        filter.field_name = format!("{prefix}{LOOKUP_SEP}{}", self.field_name);
        filter
    }

    pub(crate) fn set_form_field(&mut self, form_field: FormFieldType) {
        self.form_field = Some(form_field);
    }

    /// Returns the next annotation name and advances the counter.
    ///
    /// Names combine the field path, the special kind, the declaration counter
    /// and the per-instance evaluation counter, so a filter evaluated on both
    /// sides of an `and`/`or` never reuses a column name.
    fn next_annotation_name(&self, kind: SpecialKind) -> String {
        let count = self.filter_counter.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}_{}_{}_{count}",
            self.field_name.replace(LOOKUP_SEP, "_"),
            kind.postfix(),
            self.creation_counter
        )
    }

    // ── Evaluation ───────────────────────────────────────────────────

    /// Contributes this filter's condition for `value` to `proxy`.
    ///
    /// Empty values leave the proxy unchanged.
    pub fn filter<B: QueryBuilder>(
        &self,
        proxy: QuerySetProxy<B>,
        value: &FilterValue,
    ) -> FilterResult<QuerySetProxy<B>> {
        if value.is_empty() {
            return Ok(proxy);
        }
        let proxy = if self.distinct { proxy.distinct() } else { proxy };

        match (&self.kind, value) {
            (FilterKind::Annotated(kind), FilterValue::Annotated { annotation, search_value }) => {
                let mut name = self.next_annotation_name(*kind);
                while proxy.queryset().has_annotation(&name) {
                    name = self.next_annotation_name(*kind);
                }
                let lookup = self.search_lookup(search_value)?;
                tracing::trace!(annotation = %name, lookup = %self.lookup_expr, "Applying annotated filter");
                Ok(proxy
                    .annotate(&name, annotation.clone())
                    .and_with(Q::filter(name, lookup)))
            }
            (FilterKind::Annotated(kind), FilterValue::Plain(_)) => Err(FilterError::InvalidValue(
                ValidationError::new(
                    format!("The `{kind}` filter expects a structured value."),
                    "invalid",
                ),
            )),
            (_, FilterValue::Plain(value)) => {
                let q = self.condition(value.clone())?;
                Ok(if self.exclude {
                    proxy.negate_and_with(q)
                } else {
                    proxy.and_with(q)
                })
            }
            (_, FilterValue::Annotated { .. }) => Err(FilterError::InvalidValue(
                ValidationError::new(
                    format!("'{}' does not accept a search value.", self.field_name),
                    "invalid",
                ),
            )),
        }
    }

    /// Builds the `Q` for a plain value: transforms of the lookup expression
    /// extend the field path, the final segment is the comparison.
    fn condition(&self, value: Value) -> FilterResult<Q> {
        let segments: Vec<&str> = self.lookup_expr.split(LOOKUP_SEP).collect();
        let (transforms, terminal) = match segments.split_last() {
            Some((last, rest)) if Lookup::is_terminal_name(last) => (rest, *last),
            _ => (segments.as_slice(), "exact"),
        };
        let mut path = self.field_name.clone();
        for transform in transforms {
            path.push_str(LOOKUP_SEP);
            path.push_str(transform);
        }
        Ok(Q::filter(path, Lookup::from_parts(terminal, value)?))
    }

    fn search_lookup(&self, search_value: &SearchValue) -> FilterResult<Lookup> {
        match search_value {
            SearchValue::Query(query) if self.lookup_expr == "exact" => Ok(Lookup::Search(query.clone())),
            SearchValue::Query(_) => Err(FilterError::UnknownLookup {
                lookup: self.lookup_expr.clone(),
                target: "search query".to_string(),
            }),
            SearchValue::Number(number) => Lookup::from_parts(&self.lookup_expr, Value::Float(*number)),
        }
    }
}
