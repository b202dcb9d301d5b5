//! Lazy query sets over in-memory records.
//!
//! [`QueryBuilder`] is the capability the filter engine drives: it only needs
//! to add conditions, annotate computed columns and request de-duplication.
//! [`QuerySet`] implements it over a vector of [`Record`]s, which makes the
//! whole filtering pipeline executable without a database.
//!
//! Like Django's `QuerySet`, every builder method consumes `self` and returns
//! the modified query set; nothing is evaluated until [`QuerySet::evaluate`]
//! (or [`QuerySet::count`]) is called.
//!
//! ## Evaluation rules
//!
//! - A path segment naming a relation descends into the related records. A
//!   condition on a to-many relation holds if it holds for *any* related
//!   record. A path ending on a relation yields the related primary keys.
//! - An empty relation yields a single `NULL`, so only `isnull` / `exact None`
//!   match it.
//! - Trailing segments that are not fields are transforms (`name__lower`).
//! - Missing fields read as `NULL`.
//! - Annotations are computed in declaration order before filtering, so a
//!   condition may refer to any annotation.
//!
//! ## Example
//!
//! ```
//! use django_rs_filters_db::query::lookups::{Lookup, Q};
//! use django_rs_filters_db::query::queryset::{QueryBuilder, QuerySet, Record};
//! use django_rs_filters_db::value::Value;
//!
//! let qs = QuerySet::new(vec![
//!     Record::new().set("id", 1).set("name", "Alice"),
//!     Record::new().set("id", 2).set("name", "Bob"),
//! ]);
//!
//! let found = qs
//!     .filter(Q::filter("name__lower", Lookup::StartsWith("al".into())))
//!     .evaluate()
//!     .unwrap();
//! assert_eq!(found.len(), 1);
//! assert_eq!(found[0].get("id"), Some(&Value::Int(1)));
//! ```

use std::sync::Arc;

use django_rs_filters_core::{FilterError, FilterResult, LOOKUP_SEP};
use indexmap::IndexMap;

use crate::query::custom_lookups::{LookupRegistry, DEFAULT_LOOKUPS};
use crate::query::expressions::Expression;
use crate::query::lookups::Q;
use crate::value::Value;

/// The query-builder capability used by filters.
///
/// Implementations are cheap to clone: the filter engine keeps the original
/// state around while evaluating `not` branches.
pub trait QueryBuilder: Clone {
    /// Adds a condition (`filter(q)`).
    #[must_use]
    fn filter(self, q: Q) -> Self;

    /// Adds a named computed column.
    #[must_use]
    fn annotate(self, name: &str, expression: Expression) -> Self;

    /// Requests de-duplication of the results.
    #[must_use]
    fn distinct(self) -> Self;

    /// Returns `true` if an annotation with this name exists.
    fn has_annotation(&self, name: &str) -> bool;

    /// Copies the annotations of `other` that this builder lacks.
    ///
    /// Used to carry computed columns of a branch that was built from an
    /// earlier state back into the running state.
    #[must_use]
    fn merge_annotations(self, other: &Self) -> Self;
}

/// A row: concrete field values plus related rows keyed by relation name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: IndexMap<String, Value>,
    related: IndexMap<String, Vec<Record>>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field value.
    #[must_use]
    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Sets the related records of a to-many relation.
    #[must_use]
    pub fn relate(mut self, name: impl Into<String>, records: Vec<Self>) -> Self {
        self.related.insert(name.into(), records);
        self
    }

    /// Sets the related record of a to-one relation (`None` for a null
    /// foreign key).
    #[must_use]
    pub fn relate_one(self, name: impl Into<String>, record: Option<Self>) -> Self {
        self.relate(name, record.into_iter().collect())
    }

    /// Returns a field value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns the related records of a relation.
    pub fn related(&self, name: &str) -> &[Self] {
        self.related.get(name).map_or(&[], Vec::as_slice)
    }

    /// Returns the primary key: the `pk` field, else the `id` field.
    pub fn pk(&self) -> Value {
        self.fields
            .get("pk")
            .or_else(|| self.fields.get("id"))
            .cloned()
            .unwrap_or(Value::Null)
    }
}

/// A lazy, chainable query over in-memory records.
#[derive(Debug, Clone)]
pub struct QuerySet {
    records: Arc<Vec<Record>>,
    annotations: IndexMap<String, Expression>,
    where_clause: Q,
    distinct: bool,
    lookups: Arc<LookupRegistry>,
}

impl QuerySet {
    /// Creates a query set over `records` using the builtin transforms.
    pub fn new(records: Vec<Record>) -> Self {
        Self::with_lookups(records, Arc::clone(&DEFAULT_LOOKUPS))
    }

    /// Creates a query set that resolves transforms through `lookups`.
    pub fn with_lookups(records: Vec<Record>, lookups: Arc<LookupRegistry>) -> Self {
        Self {
            records: Arc::new(records),
            annotations: IndexMap::new(),
            where_clause: Q::identity(),
            distinct: false,
            lookups,
        }
    }

    /// Returns the accumulated condition.
    pub const fn where_clause(&self) -> &Q {
        &self.where_clause
    }

    /// Returns the annotations in declaration order.
    pub const fn annotations(&self) -> &IndexMap<String, Expression> {
        &self.annotations
    }

    /// Returns `true` if `distinct()` was requested.
    pub const fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// Evaluates the query, returning the matching records with their
    /// annotations materialized as fields.
    pub fn evaluate(&self) -> FilterResult<Vec<Record>> {
        let mut results: Vec<Record> = Vec::new();
        for record in self.records.iter() {
            let mut row = record.clone();
            for (name, expression) in &self.annotations {
                let value = self.evaluate_expression(&row, expression)?;
                row.fields.insert(name.clone(), value);
            }
            if self.matches(&row, &self.where_clause)? {
                if self.distinct && results.contains(&row) {
                    continue;
                }
                results.push(row);
            }
        }
        tracing::trace!(
            total = self.records.len(),
            matched = results.len(),
            "Evaluated query set"
        );
        Ok(results)
    }

    /// Returns the number of matching records.
    pub fn count(&self) -> FilterResult<usize> {
        Ok(self.evaluate()?.len())
    }

    /// Returns the value of `field` for each matching record.
    pub fn values_list(&self, field: &str) -> FilterResult<Vec<Value>> {
        Ok(self
            .evaluate()?
            .iter()
            .map(|r| r.get(field).cloned().unwrap_or(Value::Null))
            .collect())
    }

    // ── Evaluation helpers ───────────────────────────────────────────

    fn matches(&self, record: &Record, q: &Q) -> FilterResult<bool> {
        match q {
            Q::Filter { field, lookup } => Ok(self
                .values_at(record, field)?
                .iter()
                .any(|value| lookup.matches(value))),
            Q::And(children) => {
                for child in children {
                    if !self.matches(record, child)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Q::Or(children) => {
                if children.is_empty() {
                    return Ok(true);
                }
                for child in children {
                    if self.matches(record, child)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Q::Not(inner) => Ok(!self.matches(record, inner)?),
        }
    }

    fn values_at(&self, record: &Record, path: &str) -> FilterResult<Vec<Value>> {
        let segments: Vec<&str> = path.split(LOOKUP_SEP).collect();
        self.collect(record, &segments)
    }

    fn collect(&self, record: &Record, segments: &[&str]) -> FilterResult<Vec<Value>> {
        let Some((head, rest)) = segments.split_first() else {
            return Ok(vec![Value::Null]);
        };

        if let Some(related) = record.related.get(*head) {
            if related.is_empty() {
                return Ok(vec![self.apply_transforms(Value::Null, rest)?]);
            }
            if rest.is_empty() {
                return Ok(related.iter().map(Record::pk).collect());
            }
            let mut values = Vec::new();
            for child in related {
                values.extend(self.collect(child, rest)?);
            }
            return Ok(values);
        }

        let value = record.fields.get(*head).cloned().unwrap_or(Value::Null);
        Ok(vec![self.apply_transforms(value, rest)?])
    }

    fn apply_transforms(&self, value: Value, names: &[&str]) -> FilterResult<Value> {
        names.iter().try_fold(value, |value, name| {
            let transform =
                self.lookups
                    .find_transform(name)
                    .ok_or_else(|| FilterError::UnknownLookup {
                        lookup: (*name).to_string(),
                        target: "value".to_string(),
                    })?;
            Ok(transform.apply(&value))
        })
    }

    fn column_text(&self, record: &Record, column: &str) -> FilterResult<Option<String>> {
        let texts: Vec<String> = self
            .values_at(record, column)?
            .iter()
            .filter_map(Value::text)
            .collect();
        Ok((!texts.is_empty()).then(|| texts.join(" ")))
    }

    fn document(&self, record: &Record, columns: &[String]) -> FilterResult<String> {
        let mut parts = Vec::new();
        for column in columns {
            if let Some(text) = self.column_text(record, column)? {
                parts.push(text);
            }
        }
        Ok(parts.join(" "))
    }

    fn evaluate_expression(&self, record: &Record, expression: &Expression) -> FilterResult<Value> {
        Ok(match expression {
            Expression::Col(path) => self
                .values_at(record, path)?
                .into_iter()
                .next()
                .unwrap_or(Value::Null),
            Expression::Value(value) => value.clone(),
            Expression::SearchVector(vector) => {
                Value::String(self.document(record, vector.columns())?)
            }
            Expression::SearchRank(rank) => {
                let document = self.document(record, rank.vector().columns())?;
                Value::Float(rank.score(&document))
            }
            Expression::TrigramSimilarity(sim) => self
                .column_text(record, sim.column())?
                .map_or(Value::Null, |text| Value::Float(sim.score(&text))),
            Expression::TrigramDistance(dist) => self
                .column_text(record, dist.column())?
                .map_or(Value::Null, |text| Value::Float(dist.score(&text))),
        })
    }
}

impl QueryBuilder for QuerySet {
    fn filter(mut self, q: Q) -> Self {
        self.where_clause = std::mem::take(&mut self.where_clause) & q;
        self
    }

    fn annotate(mut self, name: &str, expression: Expression) -> Self {
        if self.annotations.insert(name.to_string(), expression).is_some() {
            tracing::debug!(annotation = name, "Replaced existing annotation");
        }
        self
    }

    fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    fn has_annotation(&self, name: &str) -> bool {
        self.annotations.contains_key(name)
    }

    fn merge_annotations(mut self, other: &Self) -> Self {
        for (name, expression) in &other.annotations {
            if !self.annotations.contains_key(name) {
                self.annotations.insert(name.clone(), expression.clone());
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::expressions::search::{
        SearchQuery, SearchRank, SearchVector, TrigramSimilarity,
    };
    use crate::query::lookups::Lookup;

    fn people() -> QuerySet {
        let acme = Record::new().set("id", 10).set("name", "Acme");
        let globex = Record::new().set("id", 20).set("name", "Globex");
        QuerySet::new(vec![
            Record::new()
                .set("id", 1)
                .set("name", "Alice")
                .relate_one("company", Some(acme.clone()))
                .relate("tags", vec![Record::new().set("id", 1).set("label", "admin")]),
            Record::new()
                .set("id", 2)
                .set("name", "bob")
                .relate_one("company", Some(globex))
                .relate("tags", vec![]),
            Record::new()
                .set("id", 3)
                .set("name", "Carol")
                .relate_one("company", None)
                .relate(
                    "tags",
                    vec![
                        Record::new().set("id", 2).set("label", "staff"),
                        Record::new().set("id", 1).set("label", "admin"),
                    ],
                ),
        ])
    }

    fn ids(qs: &QuerySet) -> Vec<Value> {
        qs.values_list("id").unwrap()
    }

    #[test]
    fn test_identity_returns_everything() {
        assert_eq!(people().count().unwrap(), 3);
        assert!(people().where_clause().is_identity());
    }

    #[test]
    fn test_filter_and_negated_filter() {
        let qs = people().filter(Q::filter("name", Lookup::IStartsWith("b".into())));
        assert_eq!(ids(&qs), vec![Value::Int(2)]);

        let qs = people().filter(!Q::filter("name", Lookup::Exact(Value::from("Alice"))));
        assert_eq!(ids(&qs), vec![Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn test_relation_traversal() {
        let qs = people().filter(Q::filter("company__name", Lookup::Exact("Acme".into())));
        assert_eq!(ids(&qs), vec![Value::Int(1)]);

        let qs = people().filter(Q::filter("company", Lookup::Exact(Value::Int(20))));
        assert_eq!(ids(&qs), vec![Value::Int(2)]);

        let qs = people().filter(Q::filter("company", Lookup::IsNull(true)));
        assert_eq!(ids(&qs), vec![Value::Int(3)]);
    }

    #[test]
    fn test_to_many_any_match() {
        let qs = people().filter(Q::filter("tags__label", Lookup::Exact("staff".into())));
        assert_eq!(ids(&qs), vec![Value::Int(3)]);

        let qs = people().filter(Q::filter("tags", Lookup::In(vec![Value::Int(1)])));
        assert_eq!(ids(&qs), vec![Value::Int(1), Value::Int(3)]);

        let qs = people().filter(Q::filter("tags__label", Lookup::IsNull(true)));
        assert_eq!(ids(&qs), vec![Value::Int(2)]);
    }

    #[test]
    fn test_transforms() {
        let qs = people().filter(Q::filter("name__lower", Lookup::Exact("bob".into())));
        assert_eq!(ids(&qs), vec![Value::Int(2)]);

        let qs = people().filter(Q::filter("name__length", Lookup::Gt(Value::Int(3))));
        assert_eq!(ids(&qs), vec![Value::Int(1), Value::Int(3)]);
    }

    #[test]
    fn test_unknown_transform_is_an_error() {
        let qs = people().filter(Q::filter("name__shout", Lookup::Exact("BOB".into())));
        assert!(matches!(qs.evaluate(), Err(FilterError::UnknownLookup { .. })));
    }

    #[test]
    fn test_or_and_not() {
        let q = Q::filter("id", Lookup::Exact(Value::Int(1)))
            | Q::filter("company__name", Lookup::Exact("Globex".into()));
        assert_eq!(ids(&people().filter(q.clone())), vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(ids(&people().filter(!q)), vec![Value::Int(3)]);
    }

    #[test]
    fn test_annotations() {
        let qs = people()
            .annotate(
                "rank",
                SearchRank::new(SearchVector::new(["name"]), SearchQuery::new("carol")).into(),
            )
            .annotate("sim", TrigramSimilarity::new("company__name", "acme").into())
            .filter(Q::filter("rank", Lookup::Gt(Value::Float(0.0))));
        assert!(qs.has_annotation("sim"));
        let rows = qs.evaluate().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("sim"), Some(&Value::Null));

        let qs = people()
            .annotate("sim", TrigramSimilarity::new("company__name", "acme").into())
            .filter(Q::filter("sim", Lookup::Gte(Value::Float(1.0))));
        assert_eq!(ids(&qs), vec![Value::Int(1)]);
    }

    #[test]
    fn test_search_on_vector_annotation() {
        let qs = people()
            .annotate("doc", SearchVector::new(["name", "tags__label"]).into())
            .filter(Q::filter("doc", Lookup::Search(SearchQuery::new("admin"))));
        assert_eq!(ids(&qs), vec![Value::Int(1), Value::Int(3)]);
    }

    #[test]
    fn test_merge_annotations_keeps_existing() {
        let base = people().annotate("a", SearchVector::new(["name"]).into());
        let other = people()
            .annotate("a", SearchVector::new(["company__name"]).into())
            .annotate("b", SearchVector::new(["name"]).into());
        let merged = base.merge_annotations(&other);
        assert_eq!(
            merged.annotations().keys().collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(merged.annotations()["a"].columns(), vec!["name"]);
    }

    #[test]
    fn test_distinct() {
        let row = Record::new().set("id", 1);
        let qs = QuerySet::new(vec![row.clone(), row]);
        assert_eq!(qs.clone().count().unwrap(), 2);
        let qs = qs.distinct();
        assert!(qs.is_distinct());
        assert_eq!(qs.count().unwrap(), 1);
    }
}
