//! Schema input types for filter trees.
//!
//! [`SchemaTypes`] is a small registry of named GraphQL input object and enum
//! types. Types are created in two phases: a name is first reserved, fields
//! are then built (and may reference the reserved name, which is how the
//! `and`/`or`/`not` fields point back at their own type), and finally the
//! type is defined under the reserved name.
//!
//! [`FilterArgumentsFactory`] converts the filter registry of a filter set
//! into the nested `filter` argument: one input type per branch of the filter
//! path trees, named after the caller-supplied prefix.

use std::fmt;

use convert_case::{Case, Casing};
use django_rs_filters_core::{FilterError, FilterResult, LOOKUP_SEP};
use indexmap::IndexMap;

use crate::filters::{Filter, SpecialKind};
use crate::filterset::FilterSetRegistry;
use crate::forms::FormFieldType;
use crate::input_types::{register_special_types, special_input_field};
use crate::tree::{filterset_to_trees, FilterTreeNode};

// ── Type references ─────────────────────────────────────────────────────

/// The built-in scalar types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    String,
    Int,
    Float,
    Boolean,
    Id,
    Date,
    DateTime,
    Time,
    Uuid,
    JsonString,
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "String",
            Self::Int => "Int",
            Self::Float => "Float",
            Self::Boolean => "Boolean",
            Self::Id => "ID",
            Self::Date => "Date",
            Self::DateTime => "DateTime",
            Self::Time => "Time",
            Self::Uuid => "UUID",
            Self::JsonString => "JSONString",
        };
        f.write_str(name)
    }
}

/// A reference to a type, as written in a field definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Scalar(ScalarType),
    Enum(String),
    Input(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    /// `[inner]`
    pub fn list(inner: Self) -> Self {
        Self::List(Box::new(inner))
    }

    /// `inner!`
    pub fn non_null(inner: Self) -> Self {
        Self::NonNull(Box::new(inner))
    }

    /// The named type at the bottom of any list/non-null wrappers.
    pub fn named(&self) -> &Self {
        match self {
            Self::List(inner) | Self::NonNull(inner) => inner.named(),
            other => other,
        }
    }

    /// The scalar type of a form field. `in` and `range` values become lists.
    pub fn for_form_field(form_field: Option<&FormFieldType>) -> Self {
        let Some(form_field) = form_field else {
            return Self::Scalar(ScalarType::String);
        };
        match form_field {
            FormFieldType::Char | FormFieldType::Choice { .. } | FormFieldType::Prepared => {
                Self::Scalar(ScalarType::String)
            }
            FormFieldType::Integer => Self::Scalar(ScalarType::Int),
            FormFieldType::Float => Self::Scalar(ScalarType::Float),
            FormFieldType::Boolean | FormFieldType::NullBoolean => Self::Scalar(ScalarType::Boolean),
            FormFieldType::Date => Self::Scalar(ScalarType::Date),
            FormFieldType::DateTime => Self::Scalar(ScalarType::DateTime),
            FormFieldType::Time => Self::Scalar(ScalarType::Time),
            FormFieldType::Uuid => Self::Scalar(ScalarType::Uuid),
            FormFieldType::Json => Self::Scalar(ScalarType::JsonString),
            FormFieldType::ModelChoice { .. } => Self::Scalar(ScalarType::Id),
            FormFieldType::List(inner) | FormFieldType::Range(inner) => {
                Self::list(Self::for_form_field(Some(inner)))
            }
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(scalar) => write!(f, "{scalar}"),
            Self::Enum(name) | Self::Input(name) => f.write_str(name),
            Self::List(inner) => write!(f, "[{inner}]"),
            Self::NonNull(inner) => write!(f, "{inner}!"),
        }
    }
}

// ── Fields and types ────────────────────────────────────────────────────

/// Converts a snake_case name to the camelCase name exposed in the schema.
///
/// Empty components produced by double underscores are kept as `_`, so
/// `name__icontains` becomes `name_Icontains`.
///
/// ```
/// use django_rs_filters_engine::schema::to_camel_case;
///
/// assert_eq!(to_camel_case("cover_density"), "coverDensity");
/// assert_eq!(to_camel_case("name__icontains"), "name_Icontains");
/// assert_eq!(to_camel_case("A"), "A");
/// ```
pub fn to_camel_case(name: &str) -> String {
    let mut components = name.split('_');
    let mut camel = components.next().unwrap_or_default().to_string();
    for component in components {
        if component.is_empty() {
            camel.push('_');
            continue;
        }
        let mut chars = component.chars();
        if let Some(first) = chars.next() {
            camel.extend(first.to_uppercase());
            camel.push_str(&chars.as_str().to_lowercase());
        }
    }
    camel
}

/// Converts a name to PascalCase for type names and descriptions.
pub fn to_pascal_case(name: &str) -> String {
    name.to_case(Case::Pascal)
}

/// A field of an input object type.
#[derive(Debug, Clone, PartialEq)]
pub struct InputField {
    /// The field name as used in value trees.
    pub name: String,
    pub type_ref: TypeRef,
    pub description: Option<String>,
    pub default_value: Option<serde_json::Value>,
}

impl InputField {
    pub fn new(name: impl Into<String>, type_ref: TypeRef) -> Self {
        Self {
            name: name.into(),
            type_ref,
            description: None,
            default_value: None,
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: serde_json::Value) -> Self {
        self.default_value = Some(value);
        self
    }

    /// The camelCase name exposed in the schema.
    pub fn graphql_name(&self) -> String {
        to_camel_case(&self.name)
    }
}

/// An input object type.
#[derive(Debug, Clone, PartialEq)]
pub struct InputObjectType {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, InputField>,
}

impl InputObjectType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn field(mut self, field: InputField) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&InputField> {
        self.fields.get(name)
    }
}

/// An enum type. Values are listed by their schema names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    pub name: String,
    pub description: Option<String>,
    pub values: Vec<String>,
}

impl EnumType {
    pub fn new<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            description: None,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone)]
enum TypeSlot {
    Reserved,
    Input(InputObjectType),
    Enum(EnumType),
}

/// The named types of a schema.
#[derive(Debug, Clone, Default)]
pub struct SchemaTypes {
    slots: IndexMap<String, TypeSlot>,
}

impl SchemaTypes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `name` is reserved or defined.
    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Returns `true` if `name` has been defined (not merely reserved).
    pub fn is_defined(&self, name: &str) -> bool {
        matches!(self.slots.get(name), Some(TypeSlot::Input(_) | TypeSlot::Enum(_)))
    }

    /// Reserves `name`. Returns `false` if the name is already taken.
    pub fn reserve(&mut self, name: &str) -> bool {
        if self.slots.contains_key(name) {
            return false;
        }
        self.slots.insert(name.to_string(), TypeSlot::Reserved);
        true
    }

    /// Drops a reservation that was never filled.
    pub fn release(&mut self, name: &str) {
        if matches!(self.slots.get(name), Some(TypeSlot::Reserved)) {
            self.slots.shift_remove(name);
        }
    }

    /// Defines an input type under a reserved or free name.
    pub fn define_input(&mut self, input: InputObjectType) -> FilterResult<()> {
        self.fill(input.name.clone(), TypeSlot::Input(input))
    }

    /// Defines an enum type under a reserved or free name.
    pub fn define_enum(&mut self, enum_type: EnumType) -> FilterResult<()> {
        self.fill(enum_type.name.clone(), TypeSlot::Enum(enum_type))
    }

    fn fill(&mut self, name: String, slot: TypeSlot) -> FilterResult<()> {
        match self.slots.get(&name) {
            None | Some(TypeSlot::Reserved) => {
                self.slots.insert(name, slot);
                Ok(())
            }
            Some(_) => Err(FilterError::ImproperlyConfigured(format!(
                "Type `{name}` is already defined."
            ))),
        }
    }

    pub fn input(&self, name: &str) -> Option<&InputObjectType> {
        match self.slots.get(name) {
            Some(TypeSlot::Input(input)) => Some(input),
            _ => None,
        }
    }

    pub fn enum_type(&self, name: &str) -> Option<&EnumType> {
        match self.slots.get(name) {
            Some(TypeSlot::Enum(enum_type)) => Some(enum_type),
            _ => None,
        }
    }

    /// Names of all reserved or defined types, in creation order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Verifies that no reservation is left open and that every field
    /// references a defined type of the right kind.
    pub fn check(&self) -> FilterResult<()> {
        for (name, slot) in &self.slots {
            match slot {
                TypeSlot::Reserved => {
                    return Err(FilterError::ImproperlyConfigured(format!(
                        "Type `{name}` was reserved but never defined."
                    )));
                }
                TypeSlot::Input(input) => {
                    for field in input.fields.values() {
                        let ok = match field.type_ref.named() {
                            TypeRef::Input(target) => self.input(target).is_some(),
                            TypeRef::Enum(target) => self.enum_type(target).is_some(),
                            _ => true,
                        };
                        if !ok {
                            return Err(FilterError::ImproperlyConfigured(format!(
                                "Field `{}.{}` references unknown type `{}`.",
                                name, field.name, field.type_ref
                            )));
                        }
                    }
                }
                TypeSlot::Enum(_) => {}
            }
        }
        Ok(())
    }
}

/// A field argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: String,
    pub type_ref: TypeRef,
    pub description: Option<String>,
}

// ── Filter arguments ────────────────────────────────────────────────────

/// Builds the `filter` argument of a filter set.
#[derive(Debug)]
pub struct FilterArgumentsFactory<'r> {
    registry: &'r FilterSetRegistry,
    filterset: String,
    prefix: String,
}

impl<'r> FilterArgumentsFactory<'r> {
    pub fn new(
        registry: &'r FilterSetRegistry,
        filterset: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            filterset: filterset.into(),
            prefix: prefix.into(),
        }
    }

    /// Name of the root input type: `{prefix}FilterInputType`.
    pub fn input_type_name(&self) -> String {
        format!("{}FilterInputType", self.prefix)
    }

    /// Returns the advanced filter argument, building its input types into
    /// `types` unless a type with the root name exists already.
    pub fn arguments(&self, types: &mut SchemaTypes) -> FilterResult<IndexMap<String, Argument>> {
        let root = self.build(types)?;
        let filter_key = self.registry.settings().filters.filter_key.clone();
        let mut arguments = IndexMap::new();
        arguments.insert(
            filter_key.clone(),
            Argument {
                name: filter_key,
                type_ref: TypeRef::Input(root),
                description: Some("Advanced filter field".to_string()),
            },
        );
        Ok(arguments)
    }

    /// One argument per filter, for flat (non-tree) filtering.
    ///
    /// Full-text search filters take structured values and are not exposed
    /// as flat arguments.
    pub fn flat_arguments(&self) -> FilterResult<IndexMap<String, Argument>> {
        let filters = self.registry.get_filters(&self.filterset)?;
        Ok(filters
            .iter()
            .filter(|(_, filter)| !filter.is_annotated())
            .map(|(name, filter)| {
                (
                    name.clone(),
                    Argument {
                        name: name.clone(),
                        type_ref: TypeRef::for_form_field(filter.get_form_field()),
                        description: Some(leaf_description(filter)),
                    },
                )
            })
            .collect())
    }

    /// Builds the input types and returns the root type name.
    pub fn build(&self, types: &mut SchemaTypes) -> FilterResult<String> {
        let name = self.input_type_name();
        if types.contains(&name) {
            tracing::trace!(input_type = %name, "Reusing filter input type");
            return Ok(name);
        }

        let filters = self.registry.get_filters(&self.filterset)?;
        if filters.values().any(Filter::is_annotated) {
            register_special_types(types, &self.registry.settings().filters)?;
        }
        let trees = filterset_to_trees(&filters);

        types.reserve(&name);
        let result = self.root_type(types, &name, &trees, &filters);
        match result {
            Ok(input) => {
                types.define_input(input)?;
                tracing::debug!(input_type = %name, filterset = %self.filterset, "Built filter input type");
                Ok(name)
            }
            Err(e) => {
                types.release(&name);
                Err(e)
            }
        }
    }

    fn root_type(
        &self,
        types: &mut SchemaTypes,
        name: &str,
        trees: &[FilterTreeNode],
        filters: &IndexMap<String, Filter>,
    ) -> FilterResult<InputObjectType> {
        let mut input = InputObjectType::new(name);
        for root in trees {
            let description = format!("`{}` field", to_pascal_case(&root.name));
            let field = self.subfield(types, root, &[], &self.prefix, description, filters)?;
            input = input.field(field);
        }
        Ok(self.with_logic_fields(input, name))
    }

    fn with_logic_fields(&self, input: InputObjectType, self_name: &str) -> InputObjectType {
        let keys = &self.registry.settings().filters;
        let self_ref = TypeRef::Input(self_name.to_string());
        input
            .field(
                InputField::new(keys.and_key.clone(), TypeRef::list(self_ref.clone()))
                    .description("`And` field"),
            )
            .field(
                InputField::new(keys.or_key.clone(), TypeRef::list(self_ref.clone()))
                    .description("`Or` field"),
            )
            .field(InputField::new(keys.not_key.clone(), self_ref).description("`Not` field"))
    }

    /// Converts a branch node into an input field whose type holds the
    /// node's children.
    fn subfield(
        &self,
        types: &mut SchemaTypes,
        node: &FilterTreeNode,
        parents: &[&str],
        prefix: &str,
        description: String,
        filters: &IndexMap<String, Filter>,
    ) -> FilterResult<InputField> {
        if let Some(kind) = SpecialKind::from_postfix(&node.name) {
            if filters.values().any(|f| f.special_kind() == Some(kind)) {
                return Ok(special_input_field(kind, &node.name));
            }
        }

        let mut path: Vec<&str> = parents.to_vec();
        path.push(&node.name);
        let type_name = format!("{prefix}{}FilterInputType", to_pascal_case(&node.name));

        if types.contains(&type_name) {
            return Ok(InputField::new(node.name.clone(), TypeRef::Input(type_name)).description(description));
        }
        types.reserve(&type_name);

        let built = self.branch_type(types, node, &path, prefix, &type_name, filters);

        match built {
            Ok(input) => {
                types.define_input(input)?;
                Ok(InputField::new(node.name.clone(), TypeRef::Input(type_name)).description(description))
            }
            Err(e) => {
                types.release(&type_name);
                Err(e)
            }
        }
    }

    fn branch_type(
        &self,
        types: &mut SchemaTypes,
        node: &FilterTreeNode,
        path: &[&str],
        prefix: &str,
        type_name: &str,
        filters: &IndexMap<String, Filter>,
    ) -> FilterResult<InputObjectType> {
        let mut input = InputObjectType::new(type_name);
        let child_prefix = format!("{prefix}{}", to_pascal_case(&node.name));
        for child in &node.children {
            let field = if child.is_leaf() {
                let mut leaf_path = path.to_vec();
                leaf_path.push(&child.name);
                self.leaf_field(&child.name, &leaf_path, filters)?
            } else {
                let description = format!("`{}` subfield", to_pascal_case(&child.name));
                self.subfield(types, child, path, &child_prefix, description, filters)?
            };
            input = input.field(field);
        }
        Ok(self.with_logic_fields(input, type_name))
    }

    fn leaf_field(
        &self,
        name: &str,
        path: &[&str],
        filters: &IndexMap<String, Filter>,
    ) -> FilterResult<InputField> {
        let default_lookup = &self.registry.settings().filters.default_lookup_expr;
        let filter_name = path
            .iter()
            .filter(|segment| **segment != default_lookup.as_str())
            .copied()
            .collect::<Vec<_>>()
            .join(LOOKUP_SEP);

        let filter = filters
            .get(&filter_name)
            .or_else(|| filters.values().find(|f| f.path() == path))
            .ok_or_else(|| {
                FilterError::ImproperlyConfigured(format!(
                    "No filter matches the path `{}`.",
                    path.join(LOOKUP_SEP)
                ))
            })?;

        Ok(InputField::new(name, TypeRef::for_form_field(filter.get_form_field()))
            .description(leaf_description(filter)))
    }
}

fn leaf_description(filter: &Filter) -> String {
    filter.get_label().map_or_else(
        || format!("`{}` lookup", to_pascal_case(filter.lookup_expr())),
        ToString::to_string,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_case() {
        assert_eq!(to_camel_case("is_field"), "isField");
        assert_eq!(to_camel_case("name"), "name");
        assert_eq!(to_camel_case("search_rank__gte"), "searchRank_Gte");
    }

    #[test]
    fn test_pascal_case() {
        assert_eq!(to_pascal_case("manager"), "Manager");
        assert_eq!(to_pascal_case("search_query"), "SearchQuery");
    }

    #[test]
    fn test_type_ref_display() {
        let t = TypeRef::list(TypeRef::non_null(TypeRef::Scalar(ScalarType::String)));
        assert_eq!(t.to_string(), "[String!]");
        assert_eq!(t.named(), &TypeRef::Scalar(ScalarType::String));
    }

    #[test]
    fn test_type_for_form_field() {
        assert_eq!(
            TypeRef::for_form_field(Some(&FormFieldType::List(Box::new(FormFieldType::Integer)))),
            TypeRef::list(TypeRef::Scalar(ScalarType::Int))
        );
        assert_eq!(
            TypeRef::for_form_field(Some(&FormFieldType::ModelChoice {
                pk: Box::new(FormFieldType::Integer)
            })),
            TypeRef::Scalar(ScalarType::Id)
        );
        assert_eq!(TypeRef::for_form_field(None), TypeRef::Scalar(ScalarType::String));
    }

    #[test]
    fn test_two_phase_definition() {
        let mut types = SchemaTypes::new();
        assert!(types.reserve("NodeFilterInputType"));
        assert!(!types.reserve("NodeFilterInputType"));
        assert!(types.check().is_err());

        let node = InputObjectType::new("NodeFilterInputType").field(InputField::new(
            "not",
            TypeRef::Input("NodeFilterInputType".to_string()),
        ));
        types.define_input(node.clone()).unwrap();
        assert!(types.check().is_ok());
        assert!(types.define_input(node).is_err());
    }

    #[test]
    fn test_check_rejects_dangling_reference() {
        let mut types = SchemaTypes::new();
        types
            .define_input(
                InputObjectType::new("A").field(InputField::new("b", TypeRef::Input("B".to_string()))),
            )
            .unwrap();
        assert!(types.check().is_err());
    }

    #[test]
    fn test_release_only_drops_reservations() {
        let mut types = SchemaTypes::new();
        types.define_enum(EnumType::new("Kind", ["A"])).unwrap();
        types.release("Kind");
        assert!(types.is_defined("Kind"));
        types.reserve("Open");
        types.release("Open");
        assert!(!types.contains("Open"));
    }
}
