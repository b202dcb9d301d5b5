//! Query lookups and Q objects for building complex filters.
//!
//! This module provides the [`Lookup`] enum for field-level comparisons and
//! the [`Q`] enum for combining filters with AND, OR, and NOT operators.
//! Together they mirror Django's `Q` objects and lookup expressions.
//!
//! The empty AND (`Q::identity()`) is the always-true condition. Combining it
//! with another condition yields that condition, and negating it leaves it
//! unchanged, as Django does for an empty `Q()`.
//!
//! # Examples
//!
//! ```
//! use django_rs_filters_db::query::lookups::{Q, Lookup};
//! use django_rs_filters_db::value::Value;
//!
//! // Simple filter: name = "Alice"
//! let q = Q::filter("name", Lookup::Exact(Value::from("Alice")));
//!
//! // Combining with AND: name = "Alice" AND age > 25
//! let combined = q & Q::filter("age", Lookup::Gt(Value::from(25)));
//!
//! // The identity disappears when combined.
//! let same = Q::identity() & combined.clone();
//! assert_eq!(same, combined);
//! ```

use std::cmp::Ordering;
use std::ops;

use django_rs_filters_core::{FilterError, FilterResult, ValidationError};

use crate::query::expressions::search::SearchQuery;
use crate::value::Value;

/// A field-level lookup operation.
///
/// Each variant corresponds to a Django lookup type (e.g., `exact`, `contains`,
/// `gt`, etc.). [`Lookup::Search`] is the full-text match of a search vector
/// against a [`SearchQuery`].
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Exact match (`field = value`).
    Exact(Value),
    /// Case-insensitive exact match.
    IExact(Value),
    /// Substring match.
    Contains(String),
    /// Case-insensitive substring match.
    IContains(String),
    /// Membership test (`field IN (values...)`).
    In(Vec<Value>),
    /// Greater than.
    Gt(Value),
    /// Greater than or equal.
    Gte(Value),
    /// Less than.
    Lt(Value),
    /// Less than or equal.
    Lte(Value),
    /// Starts with.
    StartsWith(String),
    /// Case-insensitive starts with.
    IStartsWith(String),
    /// Ends with.
    EndsWith(String),
    /// Case-insensitive ends with.
    IEndsWith(String),
    /// Range test (`field BETWEEN low AND high`).
    Range(Value, Value),
    /// NULL test.
    IsNull(bool),
    /// Regular expression match.
    Regex(String),
    /// Case-insensitive regular expression match.
    IRegex(String),
    /// Full-text match of a search vector (`@@`).
    Search(SearchQuery),
}

impl Lookup {
    /// Returns `true` if `name` is a terminal lookup name.
    pub fn is_terminal_name(name: &str) -> bool {
        matches!(
            name,
            "exact"
                | "iexact"
                | "contains"
                | "icontains"
                | "in"
                | "gt"
                | "gte"
                | "lt"
                | "lte"
                | "startswith"
                | "istartswith"
                | "endswith"
                | "iendswith"
                | "range"
                | "isnull"
                | "regex"
                | "iregex"
        )
    }

    /// Builds a lookup from its name and value.
    ///
    /// `in` accepts a list (a scalar is treated as a one-element list),
    /// `range` requires a list of two bounds, and `isnull` requires a boolean.
    pub fn from_parts(name: &str, value: Value) -> FilterResult<Self> {
        let text = |value: Value| {
            value.text().ok_or_else(|| {
                FilterError::InvalidValue(
                    ValidationError::new(format!("The '{name}' lookup needs a value."), "required")
                        .with_param("lookup", name),
                )
            })
        };

        Ok(match name {
            "exact" => Self::Exact(value),
            "iexact" => Self::IExact(value),
            "contains" => Self::Contains(text(value)?),
            "icontains" => Self::IContains(text(value)?),
            "startswith" => Self::StartsWith(text(value)?),
            "istartswith" => Self::IStartsWith(text(value)?),
            "endswith" => Self::EndsWith(text(value)?),
            "iendswith" => Self::IEndsWith(text(value)?),
            "gt" => Self::Gt(value),
            "gte" => Self::Gte(value),
            "lt" => Self::Lt(value),
            "lte" => Self::Lte(value),
            "in" => match value {
                Value::List(items) => Self::In(items),
                other => Self::In(vec![other]),
            },
            "range" => match value {
                Value::List(mut items) if items.len() == 2 => {
                    let high = items.pop().unwrap_or(Value::Null);
                    let low = items.pop().unwrap_or(Value::Null);
                    Self::Range(low, high)
                }
                _ => {
                    return Err(FilterError::InvalidValue(ValidationError::new(
                        "A range needs exactly two values.",
                        "invalid",
                    )))
                }
            },
            "isnull" => match value {
                Value::Bool(b) => Self::IsNull(b),
                _ => {
                    return Err(FilterError::InvalidValue(ValidationError::new(
                        "'isnull' needs a boolean.",
                        "invalid",
                    )))
                }
            },
            "regex" | "iregex" => {
                let pattern = text(value)?;
                regex::Regex::new(&pattern).map_err(|e| {
                    FilterError::InvalidValue(ValidationError::new(
                        format!("Invalid regular expression: {e}"),
                        "invalid",
                    ))
                })?;
                if name == "regex" {
                    Self::Regex(pattern)
                } else {
                    Self::IRegex(pattern)
                }
            }
            other => {
                return Err(FilterError::UnknownLookup {
                    lookup: other.to_string(),
                    target: "value".to_string(),
                })
            }
        })
    }

    /// The lookup name as used in filter paths.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Exact(_) | Self::Search(_) => "exact",
            Self::IExact(_) => "iexact",
            Self::Contains(_) => "contains",
            Self::IContains(_) => "icontains",
            Self::In(_) => "in",
            Self::Gt(_) => "gt",
            Self::Gte(_) => "gte",
            Self::Lt(_) => "lt",
            Self::Lte(_) => "lte",
            Self::StartsWith(_) => "startswith",
            Self::IStartsWith(_) => "istartswith",
            Self::EndsWith(_) => "endswith",
            Self::IEndsWith(_) => "iendswith",
            Self::Range(_, _) => "range",
            Self::IsNull(_) => "isnull",
            Self::Regex(_) => "regex",
            Self::IRegex(_) => "iregex",
        }
    }

    /// Evaluates this lookup against a single value.
    ///
    /// `exact` with a `Null` operand is an `isnull` test, as in Django.
    pub fn matches(&self, value: &Value) -> bool {
        let ordered = |rhs: &Value, accept: fn(Ordering) -> bool| {
            value.compare(rhs).is_some_and(accept)
        };
        let text = || value.text();

        match self {
            Self::Exact(Value::Null) => value.is_null(),
            Self::Exact(rhs) => value.loose_eq(rhs),
            Self::IExact(rhs) => match (text(), rhs.text()) {
                (Some(a), Some(b)) => a.to_lowercase() == b.to_lowercase(),
                _ => false,
            },
            Self::Contains(s) => text().is_some_and(|t| t.contains(s.as_str())),
            Self::IContains(s) => text().is_some_and(|t| t.to_lowercase().contains(&s.to_lowercase())),
            Self::In(items) => items.iter().any(|item| value.loose_eq(item)),
            Self::Gt(rhs) => ordered(rhs, Ordering::is_gt),
            Self::Gte(rhs) => ordered(rhs, Ordering::is_ge),
            Self::Lt(rhs) => ordered(rhs, Ordering::is_lt),
            Self::Lte(rhs) => ordered(rhs, Ordering::is_le),
            Self::StartsWith(s) => text().is_some_and(|t| t.starts_with(s.as_str())),
            Self::IStartsWith(s) => {
                text().is_some_and(|t| t.to_lowercase().starts_with(&s.to_lowercase()))
            }
            Self::EndsWith(s) => text().is_some_and(|t| t.ends_with(s.as_str())),
            Self::IEndsWith(s) => text().is_some_and(|t| t.to_lowercase().ends_with(&s.to_lowercase())),
            Self::Range(low, high) => ordered(low, Ordering::is_ge) && ordered(high, Ordering::is_le),
            Self::IsNull(expected) => value.is_null() == *expected,
            Self::Regex(pattern) => regex_match(pattern, value, false),
            Self::IRegex(pattern) => regex_match(pattern, value, true),
            Self::Search(query) => text().is_some_and(|t| query.matches(&t)),
        }
    }
}

fn regex_match(pattern: &str, value: &Value, case_insensitive: bool) -> bool {
    let Some(text) = value.text() else {
        return false;
    };
    let pattern = if case_insensitive {
        format!("(?i){pattern}")
    } else {
        pattern.to_string()
    };
    regex::Regex::new(&pattern).is_ok_and(|re| re.is_match(&text))
}

/// A composable query filter, equivalent to Django's `Q` object.
///
/// `Q` objects can be combined using `&` (AND), `|` (OR), and `!` (NOT)
/// operators to build arbitrarily complex conditions.
#[derive(Debug, Clone, PartialEq)]
pub enum Q {
    /// A single field lookup.
    Filter {
        /// The field path (may use `__` notation for related fields and transforms).
        field: String,
        /// The lookup operation.
        lookup: Lookup,
    },
    /// Logical AND of multiple conditions.
    And(Vec<Q>),
    /// Logical OR of multiple conditions.
    Or(Vec<Q>),
    /// Logical negation of a condition.
    Not(Box<Q>),
}

impl Default for Q {
    fn default() -> Self {
        Self::identity()
    }
}

impl Q {
    /// Creates a new filter Q object.
    pub fn filter(field: impl Into<String>, lookup: Lookup) -> Self {
        Self::Filter {
            field: field.into(),
            lookup,
        }
    }

    /// The always-true condition (an empty AND).
    pub const fn identity() -> Self {
        Self::And(Vec::new())
    }

    /// Returns `true` if this is an empty AND or OR.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::And(children) | Self::Or(children) => children.is_empty(),
            _ => false,
        }
    }

    /// Returns `true` if this is the always-true condition.
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::And(children) if children.is_empty())
    }

    /// Returns the number of `Filter` leaves in this condition.
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Filter { .. } => 1,
            Self::And(children) | Self::Or(children) => children.iter().map(Self::leaf_count).sum(),
            Self::Not(inner) => inner.leaf_count(),
        }
    }
}

impl ops::BitAnd for Q {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        if self.is_identity() {
            return rhs;
        }
        if rhs.is_identity() {
            return self;
        }
        match (self, rhs) {
            // Flatten nested ANDs
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), other) => {
                left.push(other);
                Self::And(left)
            }
            (other, Self::And(mut right)) => {
                right.insert(0, other);
                Self::And(right)
            }
            (left, right) => Self::And(vec![left, right]),
        }
    }
}

impl ops::BitOr for Q {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        if self.is_identity() {
            return rhs;
        }
        if rhs.is_identity() {
            return self;
        }
        match (self, rhs) {
            // Flatten nested ORs
            (Self::Or(mut left), Self::Or(right)) => {
                left.extend(right);
                Self::Or(left)
            }
            (Self::Or(mut left), other) => {
                left.push(other);
                Self::Or(left)
            }
            (other, Self::Or(mut right)) => {
                right.insert(0, other);
                Self::Or(right)
            }
            (left, right) => Self::Or(vec![left, right]),
        }
    }
}

impl ops::Not for Q {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            // Double negation cancellation
            Self::Not(inner) => *inner,
            identity if identity.is_identity() => identity,
            other => Self::Not(Box::new(other)),
        }
    }
}
