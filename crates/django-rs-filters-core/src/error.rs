//! Error types for the filtering engine.
//!
//! [`FilterError`] follows the taxonomy used throughout the engine:
//!
//! - declaration errors (`ImproperlyConfigured`, `ImportError`, `FieldDoesNotExist`,
//!   `UnknownLookup`) are fatal and surface at wiring time or on first use;
//! - validation errors (`Validation`, `InvalidValue`) are aggregated per request and
//!   returned to the caller instead of being raised per leaf;
//! - configuration and I/O errors come from settings loading.
//!
//! Capability degradation (full-text search on an unsupported database) is never an
//! error; it is reported through `tracing` and recorded on the built registry.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// A single validation failure with a message and a machine-readable code.
///
/// # Examples
///
/// ```
/// use django_rs_filters_core::error::ValidationError;
///
/// let err = ValidationError::new("Enter a number.", "invalid").with_param("value", "abc");
/// assert_eq!(err.to_string(), "Enter a number.");
/// assert_eq!(err.params.get("value").unwrap(), "abc");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The human-readable error message.
    pub message: String,
    /// A short code identifying the failure (e.g. "required", "invalid").
    pub code: String,
    /// Additional parameters providing context for the message.
    pub params: HashMap<String, String>,
}

impl ValidationError {
    /// Creates a new `ValidationError` with a message and code.
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            params: HashMap::new(),
        }
    }

    /// Adds a parameter to this validation error.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ValidationError {}

/// A recursive, ordered collection of validation errors for one level of a
/// filter tree.
///
/// `fields` holds the errors of the leaves at this level, keyed by data key.
/// `nested` holds the errors of combinator subtrees: the `and`/`or` entries map
/// to a dict keyed `and_<index>` / `or_<index>`, and the `not` entry maps directly
/// to the negated subtree's errors.
///
/// Serializes to the same shape a Django `ErrorDict` produces with `as_json()`:
///
/// ```
/// use django_rs_filters_core::error::ErrorDict;
///
/// let mut inner = ErrorDict::new();
/// inner.add("age", "Enter a whole number.");
/// let mut errors = ErrorDict::new();
/// errors.add("name", "This field is required.");
/// errors.nest("not", inner);
///
/// let json = serde_json::to_value(&errors).unwrap();
/// assert_eq!(json["name"][0], "This field is required.");
/// assert_eq!(json["not"]["age"][0], "Enter a whole number.");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorDict {
    /// Leaf errors at this level.
    pub fields: IndexMap<String, Vec<String>>,
    /// Errors of nested subtrees.
    pub nested: IndexMap<String, ErrorDict>,
}

impl ErrorDict {
    /// Creates an empty error dict.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an error message for a leaf key.
    pub fn add(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.fields.entry(key.into()).or_default().push(message.into());
    }

    /// Records every message in `messages` for a leaf key.
    pub fn extend(&mut self, key: impl Into<String>, messages: Vec<String>) {
        self.fields.entry(key.into()).or_default().extend(messages);
    }

    /// Attaches the errors of a nested subtree. Empty dicts are ignored.
    pub fn nest(&mut self, key: impl Into<String>, errors: Self) {
        if !errors.is_empty() {
            self.nested.insert(key.into(), errors);
        }
    }

    /// Returns `true` if neither this level nor any nested level has errors.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.nested.values().all(Self::is_empty)
    }

    /// Returns the total number of error messages, including nested ones.
    pub fn len(&self) -> usize {
        self.fields.values().map(Vec::len).sum::<usize>()
            + self.nested.values().map(Self::len).sum::<usize>()
    }

    /// Renders the errors as a JSON string.
    pub fn as_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl Serialize for ErrorDict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + self.nested.len()))?;
        for (key, messages) in &self.fields {
            map.serialize_entry(key, messages)?;
        }
        for (key, nested) in &self.nested {
            map.serialize_entry(key, nested)?;
        }
        map.end()
    }
}

impl fmt::Display for ErrorDict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_json())
    }
}

/// The primary error type for django-rs-filters.
#[derive(Error, Debug)]
pub enum FilterError {
    // ── Declaration errors ───────────────────────────────────────────

    /// A filter-set declaration is malformed.
    #[error("Improperly configured: {0}")]
    ImproperlyConfigured(String),

    /// A related filter-set reference could not be resolved.
    #[error("Import error: {0}")]
    ImportError(String),

    /// A field path does not exist on the model.
    #[error("Field does not exist: {0}")]
    FieldDoesNotExist(String),

    /// A lookup is not registered for the field it is applied to.
    #[error("Unsupported lookup '{lookup}' for {target}")]
    UnknownLookup {
        /// The lookup expression.
        lookup: String,
        /// The field or transform the lookup was applied to.
        target: String,
    },

    // ── Validation ───────────────────────────────────────────────────

    /// One or more values of a filter tree failed validation.
    #[error("Validation error: {0}")]
    Validation(ErrorDict),

    /// A single input value is malformed.
    #[error("Invalid value: {0}")]
    InvalidValue(ValidationError),

    // ── Configuration ────────────────────────────────────────────────

    /// A settings value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    // ── Serialization / IO ───────────────────────────────────────────

    /// An error occurred during serialization or deserialization.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl FilterError {
    /// Returns `true` for errors caused by client input rather than by
    /// declarations or configuration.
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidValue(_))
    }

    /// Converts a single-value error into an error dict keyed by `key`.
    ///
    /// Other variants are returned unchanged in the `Err` position.
    pub fn into_error_dict(self, key: &str) -> Result<ErrorDict, Self> {
        match self {
            Self::Validation(dict) => Ok(dict),
            Self::InvalidValue(err) => {
                let mut dict = ErrorDict::new();
                dict.add(key, err.message);
                Ok(dict)
            }
            other => Err(other),
        }
    }
}

impl From<ValidationError> for FilterError {
    fn from(err: ValidationError) -> Self {
        Self::InvalidValue(err)
    }
}

impl From<serde_json::Error> for FilterError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// A convenience type alias for `Result<T, FilterError>`.
pub type FilterResult<T> = Result<T, FilterError>;
