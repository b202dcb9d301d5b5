//! Settings for the filtering engine.
//!
//! Settings are split into two groups, following the `DJANGO_GRAPHENE_FILTERS`
//! convention of fixed and user-configurable keys:
//!
//! - [`FilterSettings`] holds the user-configurable keys (reserved argument and
//!   combinator names, default lookup, flat-argument policy, logging). They
//!   can be loaded from TOML/JSON files and environment variables through
//!   [`settings_loader`](crate::settings_loader).
//! - [`DatabaseFeatures`] holds the fixed keys derived from the database
//!   connection (vendor and trigram extension availability). They are never read
//!   from user configuration.
//!
//! [`SETTINGS`] is the process-global holder. Unlike a one-shot `OnceLock`, it can
//! be reloaded when the user settings change; filter-set registries that were
//! already built keep the settings they were built with.

use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{FilterError, FilterResult};

/// Separator between path segments and lookups (Django's `LOOKUP_SEP`).
pub const LOOKUP_SEP: &str = "__";

/// The user-configurable settings.
///
/// # Examples
///
/// ```
/// use django_rs_filters_core::settings::FilterSettings;
///
/// let settings = FilterSettings::default();
/// assert_eq!(settings.filter_key, "filter");
/// assert_eq!(settings.and_key, "and");
/// assert_eq!(settings.default_lookup_expr, "exact");
/// assert!(!settings.merge_flat_arguments);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterSettings {
    // ── Reserved keys ────────────────────────────────────────────────

    /// Name of the nested filter argument on a connection field.
    pub filter_key: String,
    /// Name of the AND combinator in filter trees.
    pub and_key: String,
    /// Name of the OR combinator in filter trees.
    pub or_key: String,
    /// Name of the NOT combinator in filter trees.
    pub not_key: String,

    // ── Lookups ──────────────────────────────────────────────────────

    /// The lookup whose suffix is elided from filter names.
    pub default_lookup_expr: String,

    // ── Arguments ────────────────────────────────────────────────────

    /// Whether flat per-filter arguments are exposed and merged with the
    /// nested filter argument.
    pub merge_flat_arguments: bool,

    // ── Logging ──────────────────────────────────────────────────────

    /// Whether debug mode is enabled (pretty log output).
    pub debug: bool,
    /// The log level directive (e.g. "info", "django_rs_filters_engine=debug").
    pub log_level: String,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            filter_key: "filter".to_string(),
            and_key: "and".to_string(),
            or_key: "or".to_string(),
            not_key: "not".to_string(),
            default_lookup_expr: "exact".to_string(),
            merge_flat_arguments: false,
            debug: false,
            log_level: "info".to_string(),
        }
    }
}

impl FilterSettings {
    /// Returns `true` if `key` is one of the three combinator keys.
    pub fn is_combinator(&self, key: &str) -> bool {
        key == self.and_key || key == self.or_key || key == self.not_key
    }

    /// Removes a trailing `<sep><default lookup>` suffix from `key`.
    ///
    /// Only the final segment is considered, so a field that merely contains the
    /// default lookup name somewhere in its path is left untouched.
    pub fn elide_default_lookup<'a>(&self, key: &'a str) -> &'a str {
        let suffix = format!("{LOOKUP_SEP}{}", self.default_lookup_expr);
        key.strip_suffix(suffix.as_str()).unwrap_or(key)
    }

    /// Checks that the reserved keys are usable.
    pub fn validate(&self) -> FilterResult<()> {
        let required = [
            ("filter_key", &self.filter_key),
            ("and_key", &self.and_key),
            ("or_key", &self.or_key),
            ("not_key", &self.not_key),
            ("default_lookup_expr", &self.default_lookup_expr),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(FilterError::ConfigurationError(format!(
                    "'{name}' must not be empty"
                )));
            }
        }
        if self.and_key == self.or_key
            || self.and_key == self.not_key
            || self.or_key == self.not_key
        {
            return Err(FilterError::ConfigurationError(format!(
                "combinator keys must be distinct, got and='{}', or='{}', not='{}'",
                self.and_key, self.or_key, self.not_key
            )));
        }
        Ok(())
    }
}

/// The database vendor behind the query builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseVendor {
    /// PostgreSQL, the only vendor with full-text search support.
    PostgreSQL,
    /// SQLite.
    SQLite,
    /// MySQL / MariaDB.
    MySQL,
}

impl DatabaseVendor {
    /// Detects the vendor from a backend engine path such as
    /// `django_rs.db.backends.postgresql`.
    pub fn from_engine(engine: &str) -> Option<Self> {
        let name = engine.rsplit('.').next().unwrap_or(engine).to_lowercase();
        match name.as_str() {
            "postgresql" | "postgres" | "postgresql_psycopg2" => Some(Self::PostgreSQL),
            "sqlite3" | "sqlite" => Some(Self::SQLite),
            "mysql" | "mariadb" => Some(Self::MySQL),
            _ => None,
        }
    }
}

impl fmt::Display for DatabaseVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PostgreSQL => "postgresql",
            Self::SQLite => "sqlite",
            Self::MySQL => "mysql",
        };
        write!(f, "{name}")
    }
}

/// Fixed settings describing the capabilities of the database connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseFeatures {
    /// The database vendor.
    pub vendor: DatabaseVendor,
    /// Whether the `pg_trgm` extension is installed.
    pub has_trigram_extension: bool,
}

impl Default for DatabaseFeatures {
    fn default() -> Self {
        Self {
            vendor: DatabaseVendor::SQLite,
            has_trigram_extension: false,
        }
    }
}

impl DatabaseFeatures {
    /// Features of a PostgreSQL connection.
    pub const fn postgresql(has_trigram_extension: bool) -> Self {
        Self {
            vendor: DatabaseVendor::PostgreSQL,
            has_trigram_extension,
        }
    }

    /// Features of a connection that has no search extensions.
    pub const fn plain(vendor: DatabaseVendor) -> Self {
        Self {
            vendor,
            has_trigram_extension: false,
        }
    }

    /// Returns `true` on PostgreSQL.
    pub fn is_postgresql(&self) -> bool {
        self.vendor == DatabaseVendor::PostgreSQL
    }

    /// Returns `true` when trigram similarity functions are available.
    pub fn supports_trigram(&self) -> bool {
        self.is_postgresql() && self.has_trigram_extension
    }
}

/// The complete settings: user-configurable keys plus fixed database features.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// User-configurable keys.
    pub filters: FilterSettings,
    /// Fixed database features.
    pub database: DatabaseFeatures,
}

impl Settings {
    /// Creates settings from both groups.
    pub const fn new(filters: FilterSettings, database: DatabaseFeatures) -> Self {
        Self { filters, database }
    }
}

/// A reloadable, globally-accessible settings container.
///
/// Readers receive an `Arc` snapshot, so a reload never changes settings under
/// a computation that is already running.
pub struct GlobalSettings {
    inner: RwLock<Option<Arc<Settings>>>,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalSettings {
    /// Creates a new, unconfigured holder.
    pub const fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    /// Installs `settings`, replacing any previous configuration.
    pub fn configure(&self, settings: Settings) -> FilterResult<()> {
        settings.filters.validate()?;
        let mut inner = self.inner.write().expect("settings lock poisoned");
        *inner = Some(Arc::new(settings));
        Ok(())
    }

    /// Returns a snapshot of the current settings, or the defaults when
    /// nothing has been configured.
    pub fn get(&self) -> Arc<Settings> {
        self.inner
            .read()
            .expect("settings lock poisoned")
            .clone()
            .unwrap_or_default()
    }

    /// Replaces the user-configurable keys and keeps the fixed ones.
    ///
    /// This is the hook to call when user settings change at runtime.
    pub fn reload(&self, filters: FilterSettings) -> FilterResult<()> {
        filters.validate()?;
        let mut inner = self.inner.write().expect("settings lock poisoned");
        let database = inner.as_ref().map(|s| s.database).unwrap_or_default();
        *inner = Some(Arc::new(Settings::new(filters, database)));
        tracing::debug!("filter settings reloaded");
        Ok(())
    }

    /// Returns `true` if settings have been configured.
    pub fn is_configured(&self) -> bool {
        self.inner.read().expect("settings lock poisoned").is_some()
    }
}

/// The global settings instance.
pub static SETTINGS: GlobalSettings = GlobalSettings::new();
