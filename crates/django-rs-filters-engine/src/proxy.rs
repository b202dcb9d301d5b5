//! An adapter that accumulates conditions instead of applying them.
//!
//! Filters are written against a [`QuerySetProxy`]: conditions they add are
//! collected into a [`Q`] rather than applied to the query set, so the
//! composer can combine the conditions of one tree level with AND, OR and NOT
//! before anything reaches the query. Annotations and `distinct()` are not
//! conditions and go straight to the wrapped query set.

use django_rs_filters_db::{Expression, QueryBuilder, Q};

/// A query set paired with the condition accumulated for it.
#[derive(Debug, Clone)]
pub struct QuerySetProxy<B> {
    queryset: B,
    q: Q,
}

impl<B: QueryBuilder> QuerySetProxy<B> {
    /// Wraps a query set with the always-true condition.
    pub fn new(queryset: B) -> Self {
        Self::with_q(queryset, Q::identity())
    }

    /// Wraps a query set with an existing condition.
    pub const fn with_q(queryset: B, q: Q) -> Self {
        Self { queryset, q }
    }

    /// ANDs `q` into the accumulated condition.
    #[must_use]
    pub fn and_with(self, q: Q) -> Self {
        Self {
            queryset: self.queryset,
            q: self.q & q,
        }
    }

    /// ANDs the negation of `q` into the accumulated condition.
    #[must_use]
    pub fn negate_and_with(self, q: Q) -> Self {
        if q.is_identity() {
            return self;
        }
        Self {
            queryset: self.queryset,
            q: self.q & !q,
        }
    }

    /// Adds a computed column to the wrapped query set.
    #[must_use]
    pub fn annotate(self, name: &str, expression: Expression) -> Self {
        Self {
            queryset: self.queryset.annotate(name, expression),
            q: self.q,
        }
    }

    /// Requests de-duplication on the wrapped query set.
    #[must_use]
    pub fn distinct(self) -> Self {
        Self {
            queryset: self.queryset.distinct(),
            q: self.q,
        }
    }

    /// The wrapped query set.
    pub const fn queryset(&self) -> &B {
        &self.queryset
    }

    /// The accumulated condition.
    pub const fn q(&self) -> &Q {
        &self.q
    }

    /// Splits the proxy into the query set and the accumulated condition.
    pub fn into_parts(self) -> (B, Q) {
        (self.queryset, self.q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use django_rs_filters_db::query::expressions::search::SearchVector;
    use django_rs_filters_db::{Lookup, QuerySet, Record, Value};

    fn exact(field: &str, value: i64) -> Q {
        Q::filter(field, Lookup::Exact(Value::Int(value)))
    }

    #[test]
    fn test_conditions_are_accumulated_not_applied() {
        let qs = QuerySet::new(vec![Record::new().set("id", 1)]);
        let proxy = QuerySetProxy::new(qs)
            .and_with(exact("id", 1))
            .negate_and_with(exact("id", 2));
        assert_eq!(proxy.q(), &(exact("id", 1) & !exact("id", 2)));
        assert!(proxy.queryset().where_clause().is_identity());
    }

    #[test]
    fn test_annotate_and_distinct_pass_through() {
        let qs = QuerySet::new(Vec::new());
        let (qs, q) = QuerySetProxy::new(qs)
            .annotate("doc", SearchVector::new(["title"]).into())
            .distinct()
            .into_parts();
        assert!(qs.has_annotation("doc"));
        assert!(qs.is_distinct());
        assert!(q.is_identity());
    }

    #[test]
    fn test_negating_identity_is_noop() {
        let proxy = QuerySetProxy::new(QuerySet::new(Vec::new())).negate_and_with(Q::identity());
        assert!(proxy.q().is_identity());
    }
}
