//! The connection field that exposes a filter set to the schema.
//!
//! An [`AdvancedFilterConnectionField`] pairs a node type with a filter set.
//! It contributes the `filter` argument (and, with `merge_flat_arguments`,
//! one flat argument per filter) and resolves requests against a query set.

use django_rs_filters_core::FilterResult;
use django_rs_filters_db::QueryBuilder;
use indexmap::IndexMap;
use serde_json::{Map, Value as Json};

use crate::composer::AdvancedFilterSet;
use crate::factories::get_filterset_class;
use crate::filterset::{FilterSetRegistry, MetaFields};
use crate::resolver::{ValueNode, ValueTree};
use crate::schema::{to_camel_case, Argument, FilterArgumentsFactory, SchemaTypes};

/// A connection field filtered by an advanced filter set.
#[derive(Debug)]
pub struct AdvancedFilterConnectionField<'r> {
    registry: &'r FilterSetRegistry,
    node_type: String,
    filterset: String,
    provided: bool,
    input_type_prefix: Option<String>,
}

impl<'r> AdvancedFilterConnectionField<'r> {
    /// Creates a field filtered by an explicitly provided filter set.
    ///
    /// Without `input_type_prefix`, two fields over the same filter set
    /// would generate input types with the same name, so a warning is
    /// logged.
    pub fn new(
        registry: &'r FilterSetRegistry,
        node_type: impl Into<String>,
        filterset: &str,
        input_type_prefix: Option<&str>,
    ) -> FilterResult<Self> {
        let node_type = node_type.into();
        let filterset = registry.definition(filterset)?.qualified();
        if input_type_prefix.is_none() {
            tracing::warn!(
                node_type = %node_type,
                filterset = %filterset,
                "The filter set argument without an input type prefix can result in different types with the same name in the schema"
            );
        }
        Ok(Self {
            registry,
            node_type,
            filterset,
            provided: true,
            input_type_prefix: input_type_prefix.map(str::to_string),
        })
    }

    /// Creates a field whose filter set is synthesised for `model`.
    pub fn for_model(
        registry: &'r mut FilterSetRegistry,
        node_type: impl Into<String>,
        model: &str,
        fields: MetaFields,
        input_type_prefix: Option<&str>,
    ) -> FilterResult<Self> {
        let filterset = get_filterset_class(registry, None, model, fields)?;
        Ok(Self {
            registry,
            node_type: node_type.into(),
            filterset,
            provided: false,
            input_type_prefix: input_type_prefix.map(str::to_string),
        })
    }

    pub fn filterset(&self) -> &str {
        &self.filterset
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    /// The prefix of the generated input type names.
    ///
    /// Defaults to the node type name without `Type`, followed by the
    /// filter set name when the filter set was provided explicitly.
    pub fn filter_input_type_prefix(&self) -> FilterResult<String> {
        if let Some(prefix) = &self.input_type_prefix {
            return Ok(prefix.clone());
        }
        let node = self.node_type.replace("Type", "");
        if self.provided {
            Ok(format!("{node}{}", self.registry.definition(&self.filterset)?.name()))
        } else {
            Ok(node)
        }
    }

    /// The field arguments, keyed by their schema name.
    ///
    /// Flat arguments are keyed by the camel-cased filter name and carry the
    /// filter name as [`Argument::name`]. The advanced argument wins on a
    /// name collision.
    pub fn filtering_args(&self, types: &mut SchemaTypes) -> FilterResult<IndexMap<String, Argument>> {
        let factory = FilterArgumentsFactory::new(self.registry, &self.filterset, self.filter_input_type_prefix()?);
        let mut arguments = IndexMap::new();
        if self.registry.settings().filters.merge_flat_arguments {
            for (name, argument) in factory.flat_arguments()? {
                arguments.insert(to_camel_case(&name), argument);
            }
        }
        arguments.extend(factory.arguments(types)?);
        Ok(arguments)
    }

    /// Maps flat schema arguments back to filter names. Arguments that are
    /// not flat filter arguments are dropped.
    pub fn map_arguments_to_filters(
        args: &Map<String, Json>,
        filtering_args: &IndexMap<String, Argument>,
        filter_key: &str,
    ) -> IndexMap<String, Json> {
        args.iter()
            .filter(|(name, _)| name.as_str() != filter_key)
            .filter_map(|(name, value)| {
                filtering_args
                    .get(name)
                    .map(|argument| (argument.name.clone(), value.clone()))
            })
            .collect()
    }

    /// Filters `queryset` with the request arguments.
    ///
    /// Flat arguments are merged into the root of the `filter` tree and win
    /// over tree entries with the same key. The result is de-duplicated.
    pub fn resolve_queryset<B: QueryBuilder>(
        &self,
        queryset: B,
        args: &Map<String, Json>,
        filtering_args: &IndexMap<String, Argument>,
    ) -> FilterResult<B> {
        let settings = &self.registry.settings().filters;
        let filter_arg = args.get(&settings.filter_key).unwrap_or(&Json::Null);
        let mut tree = ValueTree::from_json(filter_arg, settings)?;
        for (name, value) in Self::map_arguments_to_filters(args, filtering_args, &settings.filter_key) {
            tree.entries.insert(name, ValueNode::Leaf(value));
        }

        let filterset = AdvancedFilterSet::from_tree(self.registry, &self.filterset, &tree)?;
        filterset.qs(queryset)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::filterset::FilterSetDef;
    use django_rs_filters_core::{DatabaseFeatures, FilterSettings, Settings};
    use django_rs_filters_db::{FieldDef, FieldType, ModelMeta, ModelRegistry};
    use serde_json::json;

    fn registry(merge_flat_arguments: bool) -> FilterSetRegistry {
        let mut models = ModelRegistry::new();
        models
            .register(
                ModelMeta::new("recipes", "ConnModel")
                    .field(FieldDef::new("id", FieldType::AutoField).primary_key())
                    .field(FieldDef::new("name", FieldType::CharField)),
            )
            .unwrap();
        let filters = FilterSettings {
            merge_flat_arguments,
            ..FilterSettings::default()
        };
        let mut registry =
            FilterSetRegistry::with_settings(models, Arc::new(Settings::new(filters, DatabaseFeatures::default())));
        registry
            .register(FilterSetDef::new("ConnFilterSet", "recipes.ConnModel").field_lookups("name", ["exact", "icontains"]))
            .unwrap();
        registry
    }

    #[test]
    fn test_custom_prefix() {
        let registry = registry(false);
        let field = AdvancedFilterConnectionField::new(&registry, "ConnNode", "ConnFilterSet", Some("Custom")).unwrap();
        assert_eq!(field.filter_input_type_prefix().unwrap(), "Custom");
    }

    #[test]
    fn test_default_prefix_with_provided_filterset() {
        let registry = registry(false);
        let field = AdvancedFilterConnectionField::new(&registry, "ConnType", "ConnFilterSet", None).unwrap();
        assert_eq!(field.filter_input_type_prefix().unwrap(), "ConnConnFilterSet");
    }

    #[test]
    fn test_default_prefix_for_model() {
        let mut registry = registry(false);
        let field =
            AdvancedFilterConnectionField::for_model(&mut registry, "ConnNode", "recipes.ConnModel", MetaFields::All, None)
                .unwrap();
        assert_eq!(field.filter_input_type_prefix().unwrap(), "ConnNode");
        assert_eq!(field.filterset(), "ConnModelFilterSet");
    }

    #[test]
    fn test_filtering_args_without_flat_arguments() {
        let registry = registry(false);
        let field = AdvancedFilterConnectionField::new(&registry, "ConnNode", "ConnFilterSet", Some("Conn")).unwrap();
        let mut types = SchemaTypes::new();
        let args = field.filtering_args(&mut types).unwrap();
        assert_eq!(args.keys().collect::<Vec<_>>(), vec!["filter"]);
        assert!(types.is_defined("ConnFilterInputType"));
    }

    #[test]
    fn test_filtering_args_with_flat_arguments() {
        let registry = registry(true);
        let field = AdvancedFilterConnectionField::new(&registry, "ConnNode", "ConnFilterSet", Some("Conn")).unwrap();
        let args = field.filtering_args(&mut SchemaTypes::new()).unwrap();
        assert_eq!(args.keys().collect::<Vec<_>>(), vec!["name", "name_Icontains", "filter"]);
        assert_eq!(args["name_Icontains"].name, "name__icontains");
    }

    #[test]
    fn test_map_arguments_to_filters() {
        let registry = registry(true);
        let field = AdvancedFilterConnectionField::new(&registry, "ConnNode", "ConnFilterSet", Some("Conn")).unwrap();
        let filtering_args = field.filtering_args(&mut SchemaTypes::new()).unwrap();
        let args = json!({"name_Icontains": "foo", "unknown": "bar", "filter": {"name": {"exact": "x"}}});
        let mapped = AdvancedFilterConnectionField::map_arguments_to_filters(
            args.as_object().unwrap(),
            &filtering_args,
            "filter",
        );
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped["name__icontains"], json!("foo"));
    }
}
