//! Loading [`FilterSettings`] from configuration files and the environment.
//!
//! ## Loading Order
//!
//! 1. Start with the default settings.
//! 2. Load from a TOML or JSON file (overriding defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! Files may contain the keys at the top level or under a
//! `[django_graphene_filters]` table. Unknown keys are rejected.
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `DJANGO_GRAPHENE_FILTERS_FILTER_KEY` | `filter_key` |
//! | `DJANGO_GRAPHENE_FILTERS_AND_KEY` | `and_key` |
//! | `DJANGO_GRAPHENE_FILTERS_OR_KEY` | `or_key` |
//! | `DJANGO_GRAPHENE_FILTERS_NOT_KEY` | `not_key` |
//! | `DJANGO_GRAPHENE_FILTERS_DEFAULT_LOOKUP_EXPR` | `default_lookup_expr` |
//! | `DJANGO_GRAPHENE_FILTERS_MERGE_FLAT_ARGUMENTS` | `merge_flat_arguments` |
//! | `DJANGO_GRAPHENE_FILTERS_DEBUG` | `debug` |
//! | `DJANGO_GRAPHENE_FILTERS_LOG_LEVEL` | `log_level` |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use django_rs_filters_core::settings_loader;
//!
//! let settings = settings_loader::from_toml_file_with_env("config/filters.toml").unwrap();
//! assert!(!settings.and_key.is_empty());
//! ```

use std::path::Path;

use crate::error::{FilterError, FilterResult};
use crate::settings::FilterSettings;

/// Prefix of the environment variables read by [`apply_env_overrides`].
pub const ENV_PREFIX: &str = "DJANGO_GRAPHENE_FILTERS_";

/// The table name accepted as a wrapper around the settings keys.
pub const SETTINGS_TABLE: &str = "django_graphene_filters";

/// Loads settings from a TOML string.
pub fn from_toml_str(toml_str: &str) -> FilterResult<FilterSettings> {
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| FilterError::ConfigurationError(format!("Failed to parse TOML: {e}")))?;
    from_json_value(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
pub fn from_toml_file(path: impl AsRef<Path>) -> FilterResult<FilterSettings> {
    from_toml_str(&read(path.as_ref(), "TOML")?)
}

/// Loads settings from a TOML file and then applies environment variable overrides.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> FilterResult<FilterSettings> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings)?;
    Ok(settings)
}

/// Loads settings from a JSON string.
pub fn from_json_str(json_str: &str) -> FilterResult<FilterSettings> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| FilterError::ConfigurationError(format!("Failed to parse JSON: {e}")))?;
    from_json_value(json_value, "JSON")
}

/// Loads settings from a JSON file.
pub fn from_json_file(path: impl AsRef<Path>) -> FilterResult<FilterSettings> {
    from_json_str(&read(path.as_ref(), "JSON")?)
}

/// Loads settings from a JSON file and then applies environment variable overrides.
pub fn from_json_file_with_env(path: impl AsRef<Path>) -> FilterResult<FilterSettings> {
    let mut settings = from_json_file(path)?;
    apply_env_overrides(&mut settings)?;
    Ok(settings)
}

/// Loads settings from just environment variables (starting from defaults).
pub fn from_env() -> FilterResult<FilterSettings> {
    let mut settings = FilterSettings::default();
    apply_env_overrides(&mut settings)?;
    Ok(settings)
}

/// Applies `DJANGO_GRAPHENE_FILTERS_*` environment variable overrides.
///
/// Boolean variables accept "true"/"1"/"yes" (case-insensitive) as true and
/// anything else as false. The result is validated.
pub fn apply_env_overrides(settings: &mut FilterSettings) -> FilterResult<()> {
    apply_overrides(settings, |key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
}

fn apply_overrides(
    settings: &mut FilterSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> FilterResult<()> {
    let strings: [(&str, &mut String); 6] = [
        ("FILTER_KEY", &mut settings.filter_key),
        ("AND_KEY", &mut settings.and_key),
        ("OR_KEY", &mut settings.or_key),
        ("NOT_KEY", &mut settings.not_key),
        ("DEFAULT_LOOKUP_EXPR", &mut settings.default_lookup_expr),
        ("LOG_LEVEL", &mut settings.log_level),
    ];
    for (key, slot) in strings {
        if let Some(val) = lookup(key) {
            *slot = val;
        }
    }

    if let Some(val) = lookup("MERGE_FLAT_ARGUMENTS") {
        settings.merge_flat_arguments = parse_bool(&val);
    }
    if let Some(val) = lookup("DEBUG") {
        settings.debug = parse_bool(&val);
    }

    settings.validate()
}

fn parse_bool(val: &str) -> bool {
    matches!(val.to_lowercase().as_str(), "true" | "1" | "yes")
}

// ============================================================
// Helpers
// ============================================================

fn read(path: &Path, format: &str) -> FilterResult<String> {
    std::fs::read_to_string(path).map_err(|e| {
        FilterError::ConfigurationError(format!(
            "Failed to read {format} file '{}': {e}",
            path.display()
        ))
    })
}

fn from_json_value(value: serde_json::Value, format: &str) -> FilterResult<FilterSettings> {
    let value = match value {
        serde_json::Value::Object(mut map) if map.contains_key(SETTINGS_TABLE) => map
            .remove(SETTINGS_TABLE)
            .unwrap_or(serde_json::Value::Null),
        other => other,
    };

    let default_json = serde_json::to_value(FilterSettings::default()).map_err(|e| {
        FilterError::ConfigurationError(format!("Failed to serialize default settings: {e}"))
    })?;

    let merged = merge_json(default_json, value);
    let settings: FilterSettings = serde_json::from_value(merged).map_err(|e| {
        FilterError::ConfigurationError(format!("Failed to deserialize settings from {format}: {e}"))
    })?;
    settings.validate()?;
    Ok(settings)
}

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => serde_json::Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Shallow merge of `override_val` over `base`; settings are flat.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            base_map.extend(override_map);
            serde_json::Value::Object(base_map)
        }
        (base, serde_json::Value::Null) => base,
        (_, override_val) => override_val,
    }
}
