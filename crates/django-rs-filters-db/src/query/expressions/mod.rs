//! Annotation expressions.
//!
//! An [`Expression`] is the right-hand side of an `annotate()` call: a computed
//! column added to every row of a query set so it can be filtered like a
//! regular field.

pub mod search;

use crate::value::Value;

use self::search::{SearchRank, SearchVector, TrigramDistance, TrigramSimilarity};

/// An expression that can be attached to a query set as a named annotation.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A reference to a field path (Django's `F()`).
    Col(String),
    /// A constant value.
    Value(Value),
    /// A full-text search document.
    SearchVector(SearchVector),
    /// A full-text search relevance score.
    SearchRank(SearchRank),
    /// Trigram similarity with a literal string.
    TrigramSimilarity(TrigramSimilarity),
    /// Trigram distance from a literal string.
    TrigramDistance(TrigramDistance),
}

impl Expression {
    /// Returns the field paths this expression reads.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Self::Col(path) => vec![path.as_str()],
            Self::Value(_) => Vec::new(),
            Self::SearchVector(vector) => vector.columns().iter().map(String::as_str).collect(),
            Self::SearchRank(rank) => rank.vector().columns().iter().map(String::as_str).collect(),
            Self::TrigramSimilarity(sim) => vec![sim.column()],
            Self::TrigramDistance(dist) => vec![dist.column()],
        }
    }
}

impl From<SearchVector> for Expression {
    fn from(v: SearchVector) -> Self {
        Self::SearchVector(v)
    }
}

impl From<SearchRank> for Expression {
    fn from(v: SearchRank) -> Self {
        Self::SearchRank(v)
    }
}

impl From<TrigramSimilarity> for Expression {
    fn from(v: TrigramSimilarity) -> Self {
        Self::TrigramSimilarity(v)
    }
}

impl From<TrigramDistance> for Expression {
    fn from(v: TrigramDistance) -> Self {
        Self::TrigramDistance(v)
    }
}
