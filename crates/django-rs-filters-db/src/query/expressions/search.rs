//! Full-text search expressions.
//!
//! This module provides the PostgreSQL-style search types used by the
//! full-text search filters:
//!
//! - [`SearchVector`] wraps one or more columns as a searchable document
//! - [`SearchQuery`] is a composable (`&`, `|`, `!`) query over the document
//! - [`SearchRank`] computes relevance of a vector against a query
//! - [`TrigramSimilarity`] / [`TrigramDistance`] compare a column with a string
//!
//! Besides describing the expression, each type can evaluate itself against
//! plain text so the in-memory query set can execute them. The evaluation
//! follows the PostgreSQL functions closely enough for filtering but does no
//! stemming or stop-word removal.

use std::collections::HashSet;
use std::ops;

use serde::{Deserialize, Serialize};

/// A text search configuration, either a literal (e.g. "english") or the name
/// of a field holding the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// The configuration name or field name.
    pub value: String,
    /// Whether `value` names a field.
    pub is_field: bool,
}

impl SearchConfig {
    /// A literal configuration name.
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            is_field: false,
        }
    }

    /// A configuration read from a field.
    pub fn field(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            is_field: true,
        }
    }
}

/// Weight label of a search vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchWeight {
    /// Highest weight.
    A,
    /// Second weight.
    B,
    /// Third weight.
    C,
    /// Lowest weight, the default.
    D,
}

impl SearchWeight {
    /// Parses a weight label.
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            "C" => Some(Self::C),
            "D" => Some(Self::D),
            _ => None,
        }
    }

    /// Index of this weight in a `[D, C, B, A]` weights array.
    pub const fn index(self) -> usize {
        match self {
            Self::D => 0,
            Self::C => 1,
            Self::B => 2,
            Self::A => 3,
        }
    }
}

/// A `tsvector`-like document built from one or more model columns.
///
/// # Example
///
/// ```
/// use django_rs_filters_db::query::expressions::search::{SearchVector, SearchWeight};
///
/// let sv = SearchVector::new(["title", "body"]).weight(SearchWeight::A);
/// assert_eq!(sv.columns(), &["title".to_string(), "body".to_string()]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchVector {
    columns: Vec<String>,
    config: Option<SearchConfig>,
    weight: Option<SearchWeight>,
}

impl SearchVector {
    /// Creates a new `SearchVector` from the given columns.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            config: None,
            weight: None,
        }
    }

    /// Sets the text search configuration.
    #[must_use]
    pub fn config(mut self, config: SearchConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the weight for ranking.
    #[must_use]
    pub fn weight(mut self, weight: SearchWeight) -> Self {
        self.weight = Some(weight);
        self
    }

    /// The column paths of this vector.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The configuration, if any.
    pub const fn search_config(&self) -> Option<&SearchConfig> {
        self.config.as_ref()
    }

    /// The weight label, `D` when unset.
    pub fn search_weight(&self) -> SearchWeight {
        self.weight.unwrap_or(SearchWeight::D)
    }
}

/// The parser used for a query term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchQueryType {
    /// `plainto_tsquery`: every word must be present.
    #[default]
    Plain,
    /// `phraseto_tsquery`: the words must be adjacent and in order.
    Phrase,
    /// `to_tsquery`: `&`, `|`, `!` operators and `:*` prefixes.
    Raw,
    /// `websearch_to_tsquery`: quoted phrases, `or`, and `-word`.
    Websearch,
}

impl SearchQueryType {
    /// Parses the lowercase type name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "plain" => Some(Self::Plain),
            "phrase" => Some(Self::Phrase),
            "raw" => Some(Self::Raw),
            "websearch" => Some(Self::Websearch),
            _ => None,
        }
    }
}

/// A composable `tsquery`-like search query.
///
/// ```
/// use django_rs_filters_db::query::expressions::search::SearchQuery;
///
/// let q = SearchQuery::new("rust") & !SearchQuery::new("python");
/// assert!(q.matches("Rust is fast"));
/// assert!(!q.matches("rust and python"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchQuery {
    /// A single query value.
    Term {
        /// The query text.
        value: String,
        /// The text search configuration.
        config: Option<SearchConfig>,
        /// How `value` is parsed.
        search_type: SearchQueryType,
    },
    /// Both queries must match.
    And(Box<SearchQuery>, Box<SearchQuery>),
    /// Either query must match.
    Or(Box<SearchQuery>, Box<SearchQuery>),
    /// The query must not match.
    Not(Box<SearchQuery>),
}

impl SearchQuery {
    /// Creates a plain query term.
    pub fn new(value: impl Into<String>) -> Self {
        Self::Term {
            value: value.into(),
            config: None,
            search_type: SearchQueryType::Plain,
        }
    }

    /// Sets the configuration of a term. Composite queries are unchanged.
    #[must_use]
    pub fn config(mut self, new_config: SearchConfig) -> Self {
        if let Self::Term { config, .. } = &mut self {
            *config = Some(new_config);
        }
        self
    }

    /// Sets the parser of a term. Composite queries are unchanged.
    #[must_use]
    pub fn search_type(mut self, new_type: SearchQueryType) -> Self {
        if let Self::Term { search_type, .. } = &mut self {
            *search_type = new_type;
        }
        self
    }

    /// Returns `true` if `document` satisfies this query.
    pub fn matches(&self, document: &str) -> bool {
        let tokens = tokenize(document);
        self.matches_tokens(&tokens)
    }

    fn matches_tokens(&self, tokens: &[String]) -> bool {
        match self {
            Self::Term {
                value, search_type, ..
            } => match search_type {
                SearchQueryType::Plain => {
                    let words = tokenize(value);
                    !words.is_empty() && words.iter().all(|w| tokens.contains(w))
                }
                SearchQueryType::Phrase => contains_phrase(tokens, &tokenize(value)),
                SearchQueryType::Raw => raw_matches(value, tokens),
                SearchQueryType::Websearch => websearch_matches(value, tokens),
            },
            Self::And(a, b) => a.matches_tokens(tokens) && b.matches_tokens(tokens),
            Self::Or(a, b) => a.matches_tokens(tokens) || b.matches_tokens(tokens),
            Self::Not(inner) => !inner.matches_tokens(tokens),
        }
    }

    /// The words that contribute positively to a match, used for ranking.
    pub fn positive_terms(&self) -> Vec<String> {
        match self {
            Self::Term { value, .. } => tokenize(value)
                .into_iter()
                .filter(|w| w != "or" && !w.is_empty())
                .collect(),
            Self::And(a, b) | Self::Or(a, b) => {
                let mut terms = a.positive_terms();
                terms.extend(b.positive_terms());
                terms
            }
            Self::Not(_) => Vec::new(),
        }
    }
}

impl ops::BitAnd for SearchQuery {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self::And(Box::new(self), Box::new(rhs))
    }
}

impl ops::BitOr for SearchQuery {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self::Or(Box::new(self), Box::new(rhs))
    }
}

impl ops::Not for SearchQuery {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }
}

/// Default rank weights for `[D, C, B, A]`.
pub const DEFAULT_RANK_WEIGHTS: [f32; 4] = [0.1, 0.2, 0.4, 1.0];

/// Computes the relevance ranking of a vector against a query.
///
/// `normalization` follows the `ts_rank` bit mask: `1` divides by
/// `1 + ln(length)`, `2` divides by the length, `32` maps the rank to
/// `rank / (rank + 1)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRank {
    vector: SearchVector,
    query: SearchQuery,
    weights: Option<[f32; 4]>,
    normalization: Option<i32>,
    cover_density: bool,
}

impl SearchRank {
    /// Creates a new `SearchRank`.
    pub fn new(vector: SearchVector, query: SearchQuery) -> Self {
        Self {
            vector,
            query,
            weights: None,
            normalization: None,
            cover_density: false,
        }
    }

    /// Sets custom weights for the four weight classes (D, C, B, A).
    #[must_use]
    pub fn weights(mut self, weights: [f32; 4]) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Sets the normalization bit mask.
    #[must_use]
    pub fn normalization(mut self, normalization: i32) -> Self {
        self.normalization = Some(normalization);
        self
    }

    /// Uses cover density ranking (`ts_rank_cd` instead of `ts_rank`).
    #[must_use]
    pub fn cover_density(mut self, cover_density: bool) -> Self {
        self.cover_density = cover_density;
        self
    }

    /// The ranked vector.
    pub const fn vector(&self) -> &SearchVector {
        &self.vector
    }

    /// The ranked query.
    pub const fn query(&self) -> &SearchQuery {
        &self.query
    }

    /// Ranks a document. Documents that do not match the query rank `0.0`.
    #[allow(clippy::cast_precision_loss)]
    pub fn score(&self, document: &str) -> f64 {
        let tokens = tokenize(document);
        if tokens.is_empty() || !self.query.matches_tokens(&tokens) {
            return 0.0;
        }
        let terms = self.query.positive_terms();
        if terms.is_empty() {
            return 0.0;
        }
        let weights = self.weights.unwrap_or(DEFAULT_RANK_WEIGHTS);
        let weight = f64::from(weights[self.vector.search_weight().index()]);

        let mut rank = if self.cover_density {
            let distinct: HashSet<&String> = terms.iter().collect();
            let covered = distinct.iter().filter(|t| tokens.contains(**t)).count();
            weight * covered as f64 / distinct.len() as f64
        } else {
            let hits = tokens.iter().filter(|t| terms.contains(*t)).count();
            weight * hits as f64 / terms.len() as f64
        };

        let normalization = self.normalization.unwrap_or(0);
        let length = tokens.len() as f64;
        if normalization & 1 != 0 {
            rank /= 1.0 + length.ln();
        }
        if normalization & 2 != 0 {
            rank /= length;
        }
        if normalization & 32 != 0 {
            rank /= rank + 1.0;
        }
        rank
    }
}

/// Trigram similarity between a column and a string (`pg_trgm`'s `similarity`).
///
/// ```
/// use django_rs_filters_db::query::expressions::search::TrigramSimilarity;
///
/// let sim = TrigramSimilarity::new("name", "word");
/// assert!((sim.score("word") - 1.0).abs() < f64::EPSILON);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrigramSimilarity {
    column: String,
    string: String,
}

impl TrigramSimilarity {
    /// Creates a new `TrigramSimilarity`.
    pub fn new(column: impl Into<String>, string: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            string: string.into(),
        }
    }

    /// The compared column path.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Similarity of `text` with the literal string, in `[0, 1]`.
    pub fn score(&self, text: &str) -> f64 {
        similarity(text, &self.string)
    }
}

/// Trigram distance between a column and a string (`1 - similarity`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrigramDistance {
    column: String,
    string: String,
}

impl TrigramDistance {
    /// Creates a new `TrigramDistance`.
    pub fn new(column: impl Into<String>, string: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            string: string.into(),
        }
    }

    /// The compared column path.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Distance of `text` from the literal string, in `[0, 1]`.
    pub fn score(&self, text: &str) -> f64 {
        1.0 - similarity(text, &self.string)
    }
}

// ── Text helpers ─────────────────────────────────────────────────────

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn contains_phrase(tokens: &[String], phrase: &[String]) -> bool {
    !phrase.is_empty() && tokens.windows(phrase.len()).any(|window| window == phrase)
}

fn term_present(term: &str, tokens: &[String]) -> bool {
    let term = term.trim();
    if let Some(prefix) = term.strip_suffix(":*") {
        let prefix = prefix.to_lowercase();
        tokens.iter().any(|t| t.starts_with(&prefix))
    } else {
        let words = tokenize(term);
        !words.is_empty() && words.iter().all(|w| tokens.contains(w))
    }
}

/// `a & b | !c` with `&` binding tighter than `|`; parentheses are ignored.
fn raw_matches(query: &str, tokens: &[String]) -> bool {
    let cleaned: String = query.chars().filter(|c| *c != '(' && *c != ')').collect();
    cleaned.split('|').any(|alternative| {
        alternative.split('&').all(|part| {
            let part = part.trim();
            part.strip_prefix('!')
                .map_or_else(|| term_present(part, tokens), |negated| !term_present(negated, tokens))
        })
    })
}

/// Web search syntax: `"quoted phrase"`, `or` between alternatives, `-word`.
fn websearch_matches(query: &str, tokens: &[String]) -> bool {
    let mut alternatives: Vec<Vec<(bool, Vec<String>)>> = vec![Vec::new()];
    let mut rest = query.trim();
    while !rest.is_empty() {
        let (negated, body) = rest
            .strip_prefix('-')
            .map_or((false, rest), |stripped| (true, stripped));
        let (chunk, remaining) = if let Some(quoted) = body.strip_prefix('"') {
            quoted.split_once('"').unwrap_or((quoted, ""))
        } else {
            body.split_once(char::is_whitespace).unwrap_or((body, ""))
        };
        rest = remaining.trim_start();

        if !negated && chunk.eq_ignore_ascii_case("or") {
            alternatives.push(Vec::new());
            continue;
        }
        let words = tokenize(chunk);
        if !words.is_empty() {
            if let Some(current) = alternatives.last_mut() {
                current.push((negated, words));
            }
        }
    }

    alternatives
        .iter()
        .filter(|group| !group.is_empty())
        .any(|group| {
            group.iter().all(|(negated, words)| {
                let present = if words.len() > 1 {
                    contains_phrase(tokens, words)
                } else {
                    tokens.contains(&words[0])
                };
                present != *negated
            })
        })
}

/// The `pg_trgm` trigram set of a string: words are lower-cased and padded
/// with two leading spaces and one trailing space.
fn trigrams(text: &str) -> HashSet<String> {
    let mut set = HashSet::new();
    for word in tokenize(text) {
        let padded: Vec<char> = format!("  {word} ").chars().collect();
        for window in padded.windows(3) {
            set.insert(window.iter().collect());
        }
    }
    set
}

#[allow(clippy::cast_precision_loss)]
fn similarity(a: &str, b: &str) -> f64 {
    let left = trigrams(a);
    let right = trigrams(b);
    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    left.intersection(&right).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_query() {
        let q = SearchQuery::new("quick fox");
        assert!(q.matches("The quick brown fox"));
        assert!(!q.matches("The quick brown dog"));
        assert!(!SearchQuery::new("").matches("anything"));
    }

    #[test]
    fn test_phrase_query() {
        let q = SearchQuery::new("brown fox").search_type(SearchQueryType::Phrase);
        assert!(q.matches("quick brown fox"));
        assert!(!q.matches("brown quick fox"));
    }

    #[test]
    fn test_raw_query() {
        let q = SearchQuery::new("rust & !python | go").search_type(SearchQueryType::Raw);
        assert!(q.matches("rust only"));
        assert!(!q.matches("rust python"));
        assert!(q.matches("go python"));

        let prefix = SearchQuery::new("prog:*").search_type(SearchQueryType::Raw);
        assert!(prefix.matches("programming in rust"));
    }

    #[test]
    fn test_websearch_query() {
        let q = SearchQuery::new("\"sad cat\" or fat -rat").search_type(SearchQueryType::Websearch);
        assert!(q.matches("a sad cat"));
        assert!(q.matches("a fat cat"));
        assert!(!q.matches("a fat rat"));
        assert!(!q.matches("cat sad"));
    }

    #[test]
    fn test_composed_query() {
        let q = (SearchQuery::new("a") | SearchQuery::new("b")) & !SearchQuery::new("c");
        assert!(q.matches("a"));
        assert!(q.matches("b d"));
        assert!(!q.matches("a c"));
        assert_eq!(!!SearchQuery::new("x"), SearchQuery::new("x"));
    }

    #[test]
    fn test_rank_weights_and_cover_density() {
        let vector = SearchVector::new(["body"]);
        let rank = SearchRank::new(vector.clone(), SearchQuery::new("rust"));
        let low = rank.score("rust is nice");
        assert!((low - 0.1).abs() < 1e-6);

        let weighted = SearchRank::new(vector.weight(SearchWeight::A), SearchQuery::new("rust"));
        assert!((weighted.score("rust rust") - 2.0).abs() < 1e-6);

        let dense = weighted.clone().cover_density(true);
        assert!((dense.score("rust rust") - 1.0).abs() < 1e-6);

        assert!(rank.score("python").abs() < f64::EPSILON);
    }

    #[test]
    fn test_rank_normalization() {
        let rank = SearchRank::new(
            SearchVector::new(["body"]).weight(SearchWeight::A),
            SearchQuery::new("rust"),
        )
        .normalization(32);
        assert!((rank.score("rust") - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_trigram_similarity() {
        let sim = TrigramSimilarity::new("name", "word");
        assert!((sim.score("word") - 1.0).abs() < 1e-9);
        // "word" vs "two words": 4 shared trigrams out of 11 distinct.
        assert!((sim.score("two words") - 4.0 / 11.0).abs() < 1e-9);
        assert!(sim.score("xyz").abs() < f64::EPSILON);

        let dist = TrigramDistance::new("name", "word");
        assert!(dist.score("word").abs() < 1e-9);
        assert_eq!(dist.column(), "name");
    }

    #[test]
    fn test_weight_index() {
        assert_eq!(SearchWeight::parse("A").map(SearchWeight::index), Some(3));
        assert_eq!(SearchWeight::parse("E"), None);
        assert_eq!(SearchVector::new(["a"]).search_weight(), SearchWeight::D);
    }
}
