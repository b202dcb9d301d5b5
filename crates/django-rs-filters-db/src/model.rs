//! Model metadata and introspection.
//!
//! [`ModelMeta`] is the equivalent of a Django model's `_meta`: the label and
//! the ordered field definitions. [`ModelRegistry`] plays the role of the app
//! registry: models are registered once at startup and looked up by their
//! `app_label.model_name` label. It also owns the [`LookupRegistry`] so that
//! filters can ask which lookups a field supports.
//!
//! ## Example
//!
//! ```
//! use django_rs_filters_db::fields::{FieldDef, FieldType};
//! use django_rs_filters_db::model::{ModelMeta, ModelRegistry};
//!
//! let mut models = ModelRegistry::new();
//! models
//!     .register(
//!         ModelMeta::new("tasks", "User")
//!             .field(FieldDef::new("id", FieldType::AutoField).primary_key())
//!             .field(FieldDef::new("username", FieldType::CharField)),
//!     )
//!     .unwrap();
//! models
//!     .register(
//!         ModelMeta::new("tasks", "Task")
//!             .field(FieldDef::new("id", FieldType::AutoField).primary_key())
//!             .field(FieldDef::new("owner", FieldType::ForeignKey { to: "tasks.user".into() })),
//!     )
//!     .unwrap();
//!
//! let (model, field) = models.get_field("tasks.task", "owner__username").unwrap();
//! assert_eq!(model.label(), "tasks.user");
//! assert_eq!(field.name, "username");
//! ```

use django_rs_filters_core::{FilterError, FilterResult, LOOKUP_SEP};
use indexmap::IndexMap;

use crate::fields::FieldDef;
use crate::query::custom_lookups::{LookupRegistry, RegisteredLookup};

/// Metadata about a model, equivalent to Django's `Model._meta`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMeta {
    /// The application label (e.g., "auth", "blog").
    pub app_label: String,
    /// The class name of the model (e.g., "Task").
    pub object_name: String,
    /// The model name in lowercase (e.g., "task").
    pub model_name: String,
    /// Human-readable singular name.
    pub verbose_name: String,
    /// Field definitions for this model, in declaration order.
    pub fields: Vec<FieldDef>,
}

impl ModelMeta {
    /// Creates metadata for a model without fields.
    pub fn new(app_label: impl Into<String>, object_name: impl Into<String>) -> Self {
        let object_name = object_name.into();
        let model_name = object_name.to_lowercase();
        Self {
            app_label: app_label.into(),
            verbose_name: model_name.clone(),
            model_name,
            object_name,
            fields: Vec::new(),
        }
    }

    /// Appends a field definition.
    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Returns the `app_label.model_name` label.
    pub fn label(&self) -> String {
        format!("{}.{}", self.app_label, self.model_name)
    }

    /// Returns a field by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the primary key field.
    pub fn pk_field(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.primary_key)
    }

    /// Returns the name of the primary key field, `"id"` when none is declared.
    pub fn pk_name(&self) -> &str {
        self.pk_field().map_or("id", |f| f.name.as_str())
    }
}

/// The set of registered models plus the lookups their fields support.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelMeta>,
    lookups: LookupRegistry,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    /// Creates an empty registry using the builtin lookups.
    pub fn new() -> Self {
        Self::with_lookups(LookupRegistry::with_defaults())
    }

    /// Creates an empty registry using a custom lookup registry.
    pub fn with_lookups(lookups: LookupRegistry) -> Self {
        Self {
            models: IndexMap::new(),
            lookups,
        }
    }

    /// Registers a model. Registering the same label twice is an error.
    pub fn register(&mut self, meta: ModelMeta) -> FilterResult<()> {
        let label = meta.label();
        if self.models.contains_key(&label) {
            return Err(FilterError::ImproperlyConfigured(format!(
                "Model '{label}' is already registered"
            )));
        }
        tracing::trace!(model = %label, fields = meta.fields.len(), "Registered model");
        self.models.insert(label, meta);
        Ok(())
    }

    /// Returns the model registered under `label` (case-insensitive).
    pub fn get_model(&self, label: &str) -> FilterResult<&ModelMeta> {
        self.models
            .get(&label.to_lowercase())
            .ok_or_else(|| FilterError::ImproperlyConfigured(format!("Model '{label}' is not registered")))
    }

    /// Returns all registered models in registration order.
    pub fn models(&self) -> impl Iterator<Item = &ModelMeta> {
        self.models.values()
    }

    /// Returns the fields of a model (the `fields_of` capability).
    pub fn fields_of(&self, label: &str) -> FilterResult<&[FieldDef]> {
        Ok(&self.get_model(label)?.fields)
    }

    /// Returns the model a relational field points to (the `related_model_of`
    /// capability). `None` for concrete fields.
    pub fn related_model_of(&self, field: &FieldDef) -> FilterResult<Option<&ModelMeta>> {
        field
            .field_type
            .related_model()
            .map(|label| self.get_model(label))
            .transpose()
    }

    /// Returns the lookups and transforms registered for a field, in
    /// registration order (the `lookups_of` capability).
    pub fn lookups_of<'a>(
        &'a self,
        field: &FieldDef,
    ) -> impl Iterator<Item = (&'a str, &'a RegisteredLookup)> {
        self.lookups.get_lookups(field.field_type.lookup_class())
    }

    /// Returns the lookup registry.
    pub const fn lookups(&self) -> &LookupRegistry {
        &self.lookups
    }

    /// Resolves a `__`-separated field path starting at `label`.
    ///
    /// Every segment but the last must be a relation. Returns the model owning
    /// the final field together with the field.
    pub fn get_field(&self, label: &str, path: &str) -> FilterResult<(&ModelMeta, &FieldDef)> {
        let mut model = self.get_model(label)?;
        let segments: Vec<&str> = path.split(LOOKUP_SEP).collect();

        for (i, segment) in segments.iter().enumerate() {
            let field = model.get_field(segment).ok_or_else(|| {
                FilterError::FieldDoesNotExist(format!(
                    "{} has no field named '{segment}'",
                    model.object_name
                ))
            })?;
            if i + 1 == segments.len() {
                return Ok((model, field));
            }
            model = self.related_model_of(field)?.ok_or_else(|| {
                FilterError::FieldDoesNotExist(format!(
                    "'{segment}' on {} is not a relation, cannot resolve '{path}'",
                    model.object_name
                ))
            })?;
        }

        Err(FilterError::FieldDoesNotExist(format!(
            "Empty field path on '{label}'"
        )))
    }

    /// Checks that every relation points to a registered model.
    pub fn check(&self) -> FilterResult<()> {
        for model in self.models.values() {
            for field in &model.fields {
                if let Some(target) = field.field_type.related_model() {
                    if !self.models.contains_key(&target.to_lowercase()) {
                        return Err(FilterError::ImproperlyConfigured(format!(
                            "Field '{}.{}' points to unregistered model '{target}'",
                            model.label(),
                            field.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldType;

    fn registry() -> ModelRegistry {
        let mut models = ModelRegistry::new();
        models
            .register(
                ModelMeta::new("shop", "Category")
                    .field(FieldDef::new("id", FieldType::AutoField).primary_key())
                    .field(FieldDef::new("name", FieldType::CharField))
                    .field(FieldDef::new(
                        "parent",
                        FieldType::ForeignKey {
                            to: "shop.category".into(),
                        },
                    )),
            )
            .unwrap();
        models
            .register(
                ModelMeta::new("shop", "Product")
                    .field(FieldDef::new("sku", FieldType::CharField).primary_key())
                    .field(FieldDef::new(
                        "category",
                        FieldType::ForeignKey {
                            to: "shop.category".into(),
                        },
                    )),
            )
            .unwrap();
        models
    }

    #[test]
    fn test_label_and_pk() {
        let models = registry();
        let product = models.get_model("Shop.Product").unwrap();
        assert_eq!(product.label(), "shop.product");
        assert_eq!(product.pk_name(), "sku");
        assert_eq!(ModelMeta::new("a", "B").pk_name(), "id");
    }

    #[test]
    fn test_duplicate_registration() {
        let mut models = registry();
        let err = models.register(ModelMeta::new("shop", "Category")).unwrap_err();
        assert!(matches!(err, FilterError::ImproperlyConfigured(_)));
    }

    #[test]
    fn test_get_field_traverses_relations() {
        let models = registry();
        let (model, field) = models
            .get_field("shop.product", "category__parent__name")
            .unwrap();
        assert_eq!(model.object_name, "Category");
        assert_eq!(field.name, "name");
    }

    #[test]
    fn test_get_field_errors() {
        let models = registry();
        assert!(matches!(
            models.get_field("shop.product", "price"),
            Err(FilterError::FieldDoesNotExist(_))
        ));
        assert!(matches!(
            models.get_field("shop.product", "sku__name"),
            Err(FilterError::FieldDoesNotExist(_))
        ));
        assert!(models.get_field("shop.order", "id").is_err());
    }

    #[test]
    fn test_lookups_of() {
        let models = registry();
        let (_, field) = models.get_field("shop.product", "category").unwrap();
        let names: Vec<&str> = models.lookups_of(field).map(|(name, _)| name).collect();
        assert_eq!(names[0], "exact");
        assert!(names.contains(&"isnull"));
    }

    #[test]
    fn test_check_unregistered_target() {
        let mut models = ModelRegistry::new();
        models
            .register(ModelMeta::new("a", "X").field(FieldDef::new(
                "y",
                FieldType::ForeignKey { to: "a.y".into() },
            )))
            .unwrap();
        assert!(models.check().is_err());
        assert!(registry().check().is_ok());
    }
}
