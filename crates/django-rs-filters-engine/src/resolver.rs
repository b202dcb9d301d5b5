//! Value-tree resolution.
//!
//! A client submits a [`ValueTree`] shaped like the filter input type: field
//! branches, lookup leaves and `and`/`or`/`not` combinators at any level.
//! [`resolve`] flattens each level into `data key → value` pairs
//! ([`FilterData`]) while keeping the combinator structure, which is what the
//! tree form validates and the composer evaluates.
//!
//! Branches named after a special filter kind are not flattened: their value
//! is handed to a data factory that builds the search vector, query, rank or
//! trigram expression the full-text search filter compares against.

use django_rs_filters_core::{ErrorDict, FilterError, FilterResult, FilterSettings, ValidationError, LOOKUP_SEP};
use django_rs_filters_db::query::expressions::search::{
    SearchConfig, SearchQuery, SearchRank, SearchVector, TrigramDistance, TrigramSimilarity,
};
use django_rs_filters_db::Expression;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value as Json;

use crate::composer::find_filter;
use crate::filters::{Filter, FilterValue, SearchValue, SpecialKind};
use crate::filterset::FilterSetRegistry;
use crate::input_types::{
    FloatLookupsInput, SearchConfigInput, SearchQueryTermInput, SearchRankWeightsInput, SearchVectorInput,
    TrigramSearchKind,
};

// ── Value trees ─────────────────────────────────────────────────────────

/// One entry of a value tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueNode {
    /// A scalar or list value.
    Leaf(Json),
    /// A nested object: a field branch, a lookup group or a special kind.
    Branch(ValueTree),
}

/// A decoded filter argument.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueTree {
    pub entries: IndexMap<String, ValueNode>,
    pub and: Vec<ValueTree>,
    pub or: Vec<ValueTree>,
    pub not: Option<Box<ValueTree>>,
}

fn invalid(message: impl Into<String>) -> FilterError {
    FilterError::InvalidValue(ValidationError::new(message, "invalid"))
}

impl ValueTree {
    /// Decodes a JSON filter argument. `null` is the empty tree.
    ///
    /// ```
    /// use django_rs_filters_core::FilterSettings;
    /// use django_rs_filters_engine::resolver::ValueTree;
    /// use serde_json::json;
    ///
    /// let settings = FilterSettings::default();
    /// let tree = ValueTree::from_json(
    ///     &json!({"name": {"exact": "X"}, "or": [{"id": 1}, {"id": 2}]}),
    ///     &settings,
    /// )
    /// .unwrap();
    /// assert_eq!(tree.or.len(), 2);
    /// assert!(ValueTree::from_json(&json!({"and": {}}), &settings).is_err());
    /// ```
    pub fn from_json(json: &Json, settings: &FilterSettings) -> FilterResult<Self> {
        let object = match json {
            Json::Null => return Ok(Self::default()),
            Json::Object(object) => object,
            other => return Err(invalid(format!("Expected a filter object, got `{other}`."))),
        };

        let mut tree = Self::default();
        for (key, value) in object {
            if *key == settings.and_key || *key == settings.or_key {
                let Json::Array(items) = value else {
                    return Err(invalid(format!("`{key}` expects a list of filter objects.")));
                };
                let subtrees = items
                    .iter()
                    .map(|item| Self::from_json(item, settings))
                    .collect::<FilterResult<Vec<_>>>()?;
                if *key == settings.and_key {
                    tree.and = subtrees;
                } else {
                    tree.or = subtrees;
                }
            } else if *key == settings.not_key {
                if !value.is_object() {
                    return Err(invalid(format!("`{key}` expects a filter object.")));
                }
                tree.not = Some(Box::new(Self::from_json(value, settings)?));
            } else if value.is_object() {
                tree.entries
                    .insert(key.clone(), ValueNode::Branch(Self::from_json(value, settings)?));
            } else {
                tree.entries.insert(key.clone(), ValueNode::Leaf(value.clone()));
            }
        }
        Ok(tree)
    }

    /// Encodes the tree back to JSON.
    pub fn to_json(&self, settings: &FilterSettings) -> Json {
        let mut object = serde_json::Map::new();
        for (key, node) in &self.entries {
            let value = match node {
                ValueNode::Leaf(value) => value.clone(),
                ValueNode::Branch(tree) => tree.to_json(settings),
            };
            object.insert(key.clone(), value);
        }
        if !self.and.is_empty() {
            let items = self.and.iter().map(|t| t.to_json(settings)).collect();
            object.insert(settings.and_key.clone(), Json::Array(items));
        }
        if !self.or.is_empty() {
            let items = self.or.iter().map(|t| t.to_json(settings)).collect();
            object.insert(settings.or_key.clone(), Json::Array(items));
        }
        if let Some(not) = &self.not {
            object.insert(settings.not_key.clone(), not.to_json(settings));
        }
        Json::Object(object)
    }

    /// Returns `true` if the tree has no entries and no combinators.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.and.is_empty() && self.or.is_empty() && self.not.is_none()
    }
}

// ── Filter data ─────────────────────────────────────────────────────────

/// A value bound to a data key.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    /// A request value, validated by the filter's form field.
    Raw(Json),
    /// A value built by a full-text search data factory.
    Prepared(FilterValue),
}

/// One resolved level of a value tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterData {
    pub values: IndexMap<String, DataValue>,
    pub and: Vec<FilterData>,
    pub or: Vec<FilterData>,
    pub not: Option<Box<FilterData>>,
}

impl FilterData {
    /// Returns `true` if nothing was resolved at any level.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
            && self.and.iter().all(Self::is_empty)
            && self.or.iter().all(Self::is_empty)
            && self.not.as_deref().map_or(true, Self::is_empty)
    }

    fn has_combinators(&self) -> bool {
        !self.and.is_empty() || !self.or.is_empty() || self.not.is_some()
    }
}

// ── Resolution ──────────────────────────────────────────────────────────

/// Resolves a value tree against the filters of `filterset`.
///
/// Leaf keys are the joined branch path with a trailing default lookup
/// elided, canonicalised to the registered filter name when one matches.
/// Combinators below the root keep their branch prefix and are folded into
/// the enclosing level's `and` list. Errors of the full-text search factories
/// are collected and returned together as a validation error.
pub fn resolve(registry: &FilterSetRegistry, filterset: &str, tree: &ValueTree) -> FilterResult<FilterData> {
    let filters = registry.get_filters(filterset)?;
    let resolver = Resolver {
        settings: &registry.settings().filters,
        filters: &filters,
        search_fields: registry.full_text_search_fields(filterset)?,
    };
    let mut errors = ErrorDict::new();
    let data = resolver.level(tree, "", &mut errors);
    if errors.is_empty() {
        tracing::trace!(filterset, keys = data.values.len(), "Resolved value tree");
        Ok(data)
    } else {
        Err(FilterError::Validation(errors))
    }
}

struct Resolver<'a> {
    settings: &'a FilterSettings,
    filters: &'a IndexMap<String, Filter>,
    search_fields: Vec<String>,
}

impl Resolver<'_> {
    fn level(&self, tree: &ValueTree, prefix: &str, errors: &mut ErrorDict) -> FilterData {
        let mut data = FilterData::default();
        self.entries(tree, prefix, &mut data, errors);
        self.combinators(tree, prefix, &mut data, errors);
        data
    }

    fn entries(&self, tree: &ValueTree, prefix: &str, data: &mut FilterData, errors: &mut ErrorDict) {
        for (key, node) in &tree.entries {
            let joined = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}{LOOKUP_SEP}{key}")
            };
            let data_key = self.settings.elide_default_lookup(&joined).to_string();

            match node {
                ValueNode::Leaf(value) => {
                    data.values.insert(self.canonical(&data_key), DataValue::Raw(value.clone()));
                }
                ValueNode::Branch(subtree) => {
                    let last = data_key.rsplit(LOOKUP_SEP).next().unwrap_or_default();
                    match SpecialKind::from_postfix(last) {
                        Some(kind) => match self.special_data(kind, &subtree.to_json(self.settings), &data_key) {
                            Ok(values) => {
                                for (name, value) in values {
                                    data.values.insert(name, DataValue::Prepared(value));
                                }
                            }
                            Err(message) => errors.add(data_key, message),
                        },
                        None => {
                            let mut nested = FilterData::default();
                            self.entries(subtree, &data_key, data, errors);
                            self.combinators(subtree, &data_key, &mut nested, errors);
                            if nested.has_combinators() {
                                data.and.push(nested);
                            }
                        }
                    }
                }
            }
        }
    }

    fn combinators(&self, tree: &ValueTree, prefix: &str, data: &mut FilterData, errors: &mut ErrorDict) {
        for (key, subtrees, target) in [
            (&self.settings.and_key, &tree.and, &mut data.and),
            (&self.settings.or_key, &tree.or, &mut data.or),
        ] {
            let mut nested_errors = ErrorDict::new();
            for (i, subtree) in subtrees.iter().enumerate() {
                let mut sub_errors = ErrorDict::new();
                target.push(self.level(subtree, prefix, &mut sub_errors));
                nested_errors.nest(format!("{key}_{i}"), sub_errors);
            }
            errors.nest(key.clone(), nested_errors);
        }
        if let Some(not) = &tree.not {
            let mut sub_errors = ErrorDict::new();
            data.not = Some(Box::new(self.level(not, prefix, &mut sub_errors)));
            errors.nest(self.settings.not_key.clone(), sub_errors);
        }
    }

    fn canonical(&self, data_key: &str) -> String {
        find_filter(self.filters, data_key, self.settings)
            .map_or_else(|| data_key.to_string(), |(name, _)| name.to_string())
    }

    // ── Data factories ───────────────────────────────────────────────

    fn special_data(&self, kind: SpecialKind, value: &Json, key: &str) -> Result<Vec<(String, FilterValue)>, String> {
        match kind {
            SpecialKind::SearchQuery => self.search_query_data(value, key),
            SpecialKind::SearchRank => self.search_rank_data(value, key),
            SpecialKind::Trigram => self.trigram_data(value, key),
        }
    }

    fn search_query_data(&self, value: &Json, key: &str) -> Result<Vec<(String, FilterValue)>, String> {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct Input {
            vector: SearchVectorInput,
            query: Json,
        }
        let input: Input = decode(value)?;
        Ok(vec![(
            self.canonical(key),
            FilterValue::Annotated {
                annotation: self.search_vector(&input.vector)?.into(),
                search_value: SearchValue::Query(self.search_query(&input.query)?),
            },
        )])
    }

    fn search_rank_data(&self, value: &Json, key: &str) -> Result<Vec<(String, FilterValue)>, String> {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct Input {
            vector: SearchVectorInput,
            query: Json,
            lookups: FloatLookupsInput,
            #[serde(default)]
            weights: Option<SearchRankWeightsInput>,
            #[serde(default, alias = "coverDensity")]
            cover_density: bool,
            #[serde(default)]
            normalization: Option<i32>,
        }
        let input: Input = decode(value)?;
        let vector = self.search_vector(&input.vector)?;
        let query = self.search_query(&input.query)?;

        let mut rank = SearchRank::new(vector, query).cover_density(input.cover_density);
        if let Some(weights) = input.weights {
            rank = rank.weights(weights.to_array());
        }
        if let Some(normalization) = input.normalization.filter(|n| *n != 0) {
            rank = rank.normalization(normalization);
        }

        Ok(input
            .lookups
            .entries()
            .into_iter()
            .map(|(lookup, number)| {
                (
                    self.lookup_key(key, lookup),
                    FilterValue::Annotated {
                        annotation: rank.clone().into(),
                        search_value: SearchValue::Number(number),
                    },
                )
            })
            .collect())
    }

    fn trigram_data(&self, value: &Json, key: &str) -> Result<Vec<(String, FilterValue)>, String> {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct Input {
            #[serde(default)]
            kind: TrigramSearchKind,
            lookups: FloatLookupsInput,
            value: String,
        }
        let input: Input = decode(value)?;
        let column = key
            .rsplit_once(LOOKUP_SEP)
            .map_or("", |(column, _)| column)
            .to_string();
        let annotation: Expression = match input.kind {
            TrigramSearchKind::Similarity => TrigramSimilarity::new(column, input.value).into(),
            TrigramSearchKind::Distance => TrigramDistance::new(column, input.value).into(),
        };

        Ok(input
            .lookups
            .entries()
            .into_iter()
            .map(|(lookup, number)| {
                (
                    self.lookup_key(key, lookup),
                    FilterValue::Annotated {
                        annotation: annotation.clone(),
                        search_value: SearchValue::Number(number),
                    },
                )
            })
            .collect())
    }

    fn lookup_key(&self, key: &str, lookup: &str) -> String {
        let joined = format!("{key}{LOOKUP_SEP}{lookup}");
        self.canonical(self.settings.elide_default_lookup(&joined))
    }

    fn search_vector(&self, input: &SearchVectorInput) -> Result<SearchVector, String> {
        for field in &input.fields {
            if !self.search_fields.contains(field) {
                return Err(format!("The `{field}` field is not included in full text search fields"));
            }
        }
        let mut vector = SearchVector::new(input.fields.iter().cloned());
        if let Some(config) = &input.config {
            vector = vector.config(search_config(config));
        }
        if let Some(weight) = input.weight {
            vector = vector.weight(weight);
        }
        Ok(vector)
    }

    /// Builds a search query: the term, AND-ed with the AND of the `and`
    /// queries, the OR of the `or` queries and the negation of `not`.
    fn search_query(&self, value: &Json) -> Result<SearchQuery, String> {
        let Json::Object(object) = value else {
            return Err("Enter a valid search query.".to_string());
        };
        let keys = self.settings;
        let required_missing = ["value", keys.and_key.as_str(), keys.or_key.as_str(), keys.not_key.as_str()]
            .iter()
            .all(|k| !object.contains_key(*k));
        let missing_message = || {
            format!(
                "The search query must contains at least one required field such as `value`, `{}`, `{}`, `{}`.",
                keys.and_key, keys.or_key, keys.not_key
            )
        };
        if required_missing {
            return Err(missing_message());
        }

        let term: SearchQueryTermInput = decode(value)?;
        let mut parts: Vec<SearchQuery> = Vec::new();
        if let Some(text) = term.value.filter(|t| !t.is_empty()) {
            let mut query = SearchQuery::new(text);
            if let Some(config) = &term.config {
                query = query.config(search_config(config));
            }
            if let Some(search_type) = term.search_type {
                query = query.search_type(search_type.into());
            }
            parts.push(query);
        }

        if let Some(and) = self.sub_queries(object.get(&keys.and_key))? {
            parts.extend(and.into_iter().reduce(|a, b| a & b));
        }
        if let Some(or) = self.sub_queries(object.get(&keys.or_key))? {
            parts.extend(or.into_iter().reduce(|a, b| a | b));
        }
        if let Some(not) = self.sub_queries(object.get(&keys.not_key))? {
            parts.extend(not.into_iter().map(|q| !q));
        }

        parts.into_iter().reduce(|a, b| a & b).ok_or_else(missing_message)
    }

    fn sub_queries(&self, value: Option<&Json>) -> Result<Option<Vec<SearchQuery>>, String> {
        match value {
            None | Some(Json::Null) => Ok(None),
            Some(Json::Array(items)) => items.iter().map(|item| self.search_query(item)).collect::<Result<_, _>>().map(Some),
            Some(single) => self.search_query(single).map(|q| Some(vec![q])),
        }
    }
}

fn search_config(input: &SearchConfigInput) -> SearchConfig {
    if input.is_field {
        SearchConfig::field(input.value.clone())
    } else {
        SearchConfig::literal(input.value.clone())
    }
}

fn decode<T: for<'de> Deserialize<'de>>(value: &Json) -> Result<T, String> {
    T::deserialize(value).map_err(|e| format!("Enter a valid value: {e}."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings() -> FilterSettings {
        FilterSettings::default()
    }

    #[test]
    fn test_from_json_shapes() {
        let tree = ValueTree::from_json(
            &json!({
                "name": {"exact": "X", "in": ["a", "b"]},
                "and": [{"id": 1}],
                "not": {"id": 2}
            }),
            &settings(),
        )
        .unwrap();
        let ValueNode::Branch(name) = &tree.entries["name"] else {
            panic!("expected a branch");
        };
        assert_eq!(name.entries["in"], ValueNode::Leaf(json!(["a", "b"])));
        assert_eq!(tree.and.len(), 1);
        assert!(tree.not.is_some());
    }

    #[test]
    fn test_from_json_rejects_bad_combinators() {
        assert!(ValueTree::from_json(&json!({"or": {"id": 1}}), &settings()).is_err());
        assert!(ValueTree::from_json(&json!({"not": [1]}), &settings()).is_err());
        assert!(ValueTree::from_json(&json!([1, 2]), &settings()).is_err());
    }

    #[test]
    fn test_null_is_empty() {
        let tree = ValueTree::from_json(&Json::Null, &settings()).unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn test_filter_data_with_only_empty_groups_is_empty() {
        let data = FilterData {
            and: vec![FilterData::default()],
            or: vec![FilterData::default(), FilterData::default()],
            not: Some(Box::default()),
            ..FilterData::default()
        };
        assert!(data.is_empty());

        let mut value = FilterData::default();
        value.values.insert("id".to_string(), DataValue::Raw(json!(1)));
        let data = FilterData {
            or: vec![FilterData::default(), value],
            ..FilterData::default()
        };
        assert!(!data.is_empty());
    }

    #[test]
    fn test_json_round_trip() {
        let value = json!({"a": {"b": {"gt": 3}}, "or": [{"c": true}], "not": {"d": "x"}});
        let tree = ValueTree::from_json(&value, &settings()).unwrap();
        assert_eq!(tree.to_json(&settings()), value);
    }

    #[test]
    fn test_custom_combinator_keys() {
        let settings = FilterSettings {
            and_key: "all".to_string(),
            or_key: "any".to_string(),
            not_key: "none".to_string(),
            ..FilterSettings::default()
        };
        let tree = ValueTree::from_json(&json!({"any": [{"a": 1}], "and": 5}), &settings).unwrap();
        assert_eq!(tree.or.len(), 1);
        assert_eq!(tree.entries["and"], ValueNode::Leaf(json!(5)));
    }
}
