//! Input types of the full-text search filters.
//!
//! Each special filter kind takes a structured value instead of a scalar.
//! This module defines both sides of that value: the schema types exposed to
//! clients ([`register_special_types`]) and the serde structures the value
//! trees are decoded into by the data factories.

use django_rs_filters_core::{FilterResult, FilterSettings};
use django_rs_filters_db::query::expressions::search::{
    SearchQueryType, SearchWeight, DEFAULT_RANK_WEIGHTS,
};
use serde::Deserialize;
use serde_json::json;

use crate::filters::SpecialKind;
use crate::schema::{EnumType, InputField, InputObjectType, ScalarType, SchemaTypes, TypeRef};

pub const SEARCH_CONFIG_INPUT_TYPE: &str = "SearchConfigInputType";
pub const SEARCH_VECTOR_WEIGHT: &str = "SearchVectorWeight";
pub const SEARCH_VECTOR_INPUT_TYPE: &str = "SearchVectorInputType";
pub const SEARCH_QUERY_TYPE: &str = "SearchQueryType";
pub const SEARCH_QUERY_INPUT_TYPE: &str = "SearchQueryInputType";
pub const SEARCH_QUERY_FILTER_INPUT_TYPE: &str = "SearchQueryFilterInputType";
pub const FLOAT_LOOKUPS_INPUT_TYPE: &str = "FloatLookupsInputType";
pub const SEARCH_RANK_WEIGHTS_INPUT_TYPE: &str = "SearchRankWeightsInputType";
pub const SEARCH_RANK_FILTER_INPUT_TYPE: &str = "SearchRankFilterInputType";
pub const TRIGRAM_SEARCH_KIND: &str = "TrigramSearchKind";
pub const TRIGRAM_FILTER_INPUT_TYPE: &str = "TrigramFilterInputType";

// ── Decoded values ──────────────────────────────────────────────────────

/// Configuration of a search vector or query.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfigInput {
    pub value: String,
    /// Read the configuration from a column instead of using the literal.
    #[serde(default, alias = "isField")]
    pub is_field: bool,
}

/// A search vector over full-text search fields.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchVectorInput {
    pub fields: Vec<String>,
    #[serde(default)]
    pub config: Option<SearchConfigInput>,
    #[serde(default)]
    pub weight: Option<SearchWeight>,
}

/// How a search query value is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum SearchQueryTypeInput {
    #[default]
    #[serde(rename = "plain", alias = "PLAIN")]
    Plain,
    #[serde(rename = "phrase", alias = "PHRASE")]
    Phrase,
    #[serde(rename = "raw", alias = "RAW")]
    Raw,
    #[serde(rename = "websearch", alias = "WEBSEARCH")]
    Websearch,
}

impl From<SearchQueryTypeInput> for SearchQueryType {
    fn from(input: SearchQueryTypeInput) -> Self {
        match input {
            SearchQueryTypeInput::Plain => Self::Plain,
            SearchQueryTypeInput::Phrase => Self::Phrase,
            SearchQueryTypeInput::Raw => Self::Raw,
            SearchQueryTypeInput::Websearch => Self::Websearch,
        }
    }
}

/// A search query term with optional `and`/`or`/`not` sub-queries.
///
/// The combinator keys are configurable, so they are decoded by the data
/// factory rather than by serde.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct SearchQueryTermInput {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub config: Option<SearchConfigInput>,
    #[serde(default, alias = "searchType")]
    pub search_type: Option<SearchQueryTypeInput>,
}

/// Numeric comparisons of a rank or trigram column.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FloatLookupsInput {
    pub exact: Option<f64>,
    pub gt: Option<f64>,
    pub gte: Option<f64>,
    pub lt: Option<f64>,
    pub lte: Option<f64>,
}

impl FloatLookupsInput {
    /// The provided comparisons, in declaration order.
    pub fn entries(&self) -> Vec<(&'static str, f64)> {
        [
            ("exact", self.exact),
            ("gt", self.gt),
            ("gte", self.gte),
            ("lt", self.lt),
            ("lte", self.lte),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
        .collect()
    }
}

/// Weights of the `A`–`D` labels of a search rank.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
#[allow(non_snake_case)]
pub struct SearchRankWeightsInput {
    #[serde(default = "default_weight_d")]
    pub D: f32,
    #[serde(default = "default_weight_c")]
    pub C: f32,
    #[serde(default = "default_weight_b")]
    pub B: f32,
    #[serde(default = "default_weight_a")]
    pub A: f32,
}

const fn default_weight_d() -> f32 {
    DEFAULT_RANK_WEIGHTS[0]
}
const fn default_weight_c() -> f32 {
    DEFAULT_RANK_WEIGHTS[1]
}
const fn default_weight_b() -> f32 {
    DEFAULT_RANK_WEIGHTS[2]
}
const fn default_weight_a() -> f32 {
    DEFAULT_RANK_WEIGHTS[3]
}

impl Default for SearchRankWeightsInput {
    fn default() -> Self {
        let [d, c, b, a] = DEFAULT_RANK_WEIGHTS;
        Self { D: d, C: c, B: b, A: a }
    }
}

impl SearchRankWeightsInput {
    /// The weights in `[D, C, B, A]` order.
    pub const fn to_array(self) -> [f32; 4] {
        [self.D, self.C, self.B, self.A]
    }
}

/// Which trigram measure a trigram filter compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum TrigramSearchKind {
    #[default]
    #[serde(rename = "similarity", alias = "SIMILARITY")]
    Similarity,
    #[serde(rename = "distance", alias = "DISTANCE")]
    Distance,
}

// ── Schema types ────────────────────────────────────────────────────────

fn scalar(scalar: ScalarType) -> TypeRef {
    TypeRef::Scalar(scalar)
}

fn input(name: &str) -> TypeRef {
    TypeRef::Input(name.to_string())
}

fn required(type_ref: TypeRef) -> TypeRef {
    TypeRef::non_null(type_ref)
}

/// Defines the input types used by the full-text search filters.
///
/// Types that exist already are left untouched, so this may be called once
/// per filter set.
pub fn register_special_types(types: &mut SchemaTypes, settings: &FilterSettings) -> FilterResult<()> {
    if types.contains(TRIGRAM_FILTER_INPUT_TYPE) {
        return Ok(());
    }

    types.define_input(
        InputObjectType::new(SEARCH_CONFIG_INPUT_TYPE)
            .description("Input type for the `SearchVector` or `SearchQuery` object config.")
            .field(
                InputField::new("value", required(scalar(ScalarType::String)))
                    .description("The configuration value for `SearchVector` or `SearchQuery`"),
            )
            .field(
                InputField::new("is_field", scalar(ScalarType::Boolean))
                    .description("Flag to indicate if the value should be read from a column")
                    .default_value(json!(false)),
            ),
    )?;

    types.define_enum(
        EnumType::new(SEARCH_VECTOR_WEIGHT, ["A", "B", "C", "D"])
            .description("Weight of a `SearchVector` object."),
    )?;

    types.define_input(
        InputObjectType::new(SEARCH_VECTOR_INPUT_TYPE)
            .description("Input type for creating a `SearchVector` object.")
            .field(
                InputField::new(
                    "fields",
                    required(TypeRef::list(required(scalar(ScalarType::String)))),
                )
                .description("The field names to be used in the vector"),
            )
            .field(
                InputField::new("config", input(SEARCH_CONFIG_INPUT_TYPE))
                    .description("Configuration settings for the vector"),
            )
            .field(
                InputField::new("weight", TypeRef::Enum(SEARCH_VECTOR_WEIGHT.to_string()))
                    .description("The weight to be applied to the vector"),
            ),
    )?;

    types.define_enum(
        EnumType::new(SEARCH_QUERY_TYPE, ["PLAIN", "PHRASE", "RAW", "WEBSEARCH"])
            .description("Type of a `SearchQuery` object."),
    )?;

    // The query type references itself through the combinator fields.
    types.reserve(SEARCH_QUERY_INPUT_TYPE);
    types.define_input(
        InputObjectType::new(SEARCH_QUERY_INPUT_TYPE)
            .description("Input type for creating a `SearchQuery` object.")
            .field(InputField::new("value", scalar(ScalarType::String)).description("The search query value"))
            .field(
                InputField::new("config", input(SEARCH_CONFIG_INPUT_TYPE))
                    .description("Configuration settings for the query"),
            )
            .field(
                InputField::new("search_type", TypeRef::Enum(SEARCH_QUERY_TYPE.to_string()))
                    .description("How the query value is parsed")
                    .default_value(json!("plain")),
            )
            .field(
                InputField::new(
                    settings.and_key.clone(),
                    TypeRef::list(required(input(SEARCH_QUERY_INPUT_TYPE))),
                )
                .description("`And` field"),
            )
            .field(
                InputField::new(
                    settings.or_key.clone(),
                    TypeRef::list(required(input(SEARCH_QUERY_INPUT_TYPE))),
                )
                .description("`Or` field"),
            )
            .field(
                InputField::new(settings.not_key.clone(), input(SEARCH_QUERY_INPUT_TYPE))
                    .description("`Not` field"),
            ),
    )?;

    types.define_input(
        InputObjectType::new(SEARCH_QUERY_FILTER_INPUT_TYPE)
            .description("Input type for the full text search using the `SearchVector` and `SearchQuery` objects.")
            .field(
                InputField::new("vector", required(input(SEARCH_VECTOR_INPUT_TYPE)))
                    .description("The search vector to be used"),
            )
            .field(
                InputField::new("query", required(input(SEARCH_QUERY_INPUT_TYPE)))
                    .description("The search query to be used"),
            ),
    )?;

    let mut float_lookups = InputObjectType::new(FLOAT_LOOKUPS_INPUT_TYPE)
        .description("Input type for floating-point number lookups.");
    for (name, description) in [
        ("exact", "Exact match value"),
        ("gt", "Greater than value"),
        ("gte", "Greater than or equal to value"),
        ("lt", "Less than value"),
        ("lte", "Less than or equal to value"),
    ] {
        float_lookups =
            float_lookups.field(InputField::new(name, scalar(ScalarType::Float)).description(description));
    }
    types.define_input(float_lookups)?;

    let mut weights = InputObjectType::new(SEARCH_RANK_WEIGHTS_INPUT_TYPE)
        .description("`SearchRank` object weights.");
    for (label, default) in ["D", "C", "B", "A"].into_iter().zip(DEFAULT_RANK_WEIGHTS) {
        weights = weights.field(
            InputField::new(label, scalar(ScalarType::Float))
                .description(format!("Weight for {label} letter"))
                .default_value(json!(default)),
        );
    }
    types.define_input(weights)?;

    types.define_input(
        InputObjectType::new(SEARCH_RANK_FILTER_INPUT_TYPE)
            .description("Input type for the full text search using the `SearchRank` object.")
            .field(
                InputField::new("vector", required(input(SEARCH_VECTOR_INPUT_TYPE)))
                    .description("Vector used for ranking"),
            )
            .field(
                InputField::new("query", required(input(SEARCH_QUERY_INPUT_TYPE)))
                    .description("Query used for ranking"),
            )
            .field(
                InputField::new("lookups", required(input(FLOAT_LOOKUPS_INPUT_TYPE)))
                    .description("Lookup options for floating-point values"),
            )
            .field(
                InputField::new("weights", input(SEARCH_RANK_WEIGHTS_INPUT_TYPE))
                    .description("Search rank weights"),
            )
            .field(
                InputField::new("cover_density", scalar(ScalarType::Boolean))
                    .description("Whether to include coverage density in ranking")
                    .default_value(json!(false)),
            )
            .field(
                InputField::new("normalization", scalar(ScalarType::Int))
                    .description("Search normalization used in ranking"),
            ),
    )?;

    types.define_enum(
        EnumType::new(TRIGRAM_SEARCH_KIND, ["SIMILARITY", "DISTANCE"])
            .description("Kind of trigram search: similarity or distance."),
    )?;

    types.define_input(
        InputObjectType::new(TRIGRAM_FILTER_INPUT_TYPE)
            .description("Input type for the full text search using similarity or distance of trigram.")
            .field(
                InputField::new("kind", TypeRef::Enum(TRIGRAM_SEARCH_KIND.to_string()))
                    .description("Type of trigram search")
                    .default_value(json!("similarity")),
            )
            .field(
                InputField::new("lookups", required(input(FLOAT_LOOKUPS_INPUT_TYPE)))
                    .description("Available lookups"),
            )
            .field(
                InputField::new("value", required(scalar(ScalarType::String)))
                    .description("Value used in trigram search"),
            ),
    )?;

    tracing::trace!("Registered full text search input types");
    Ok(())
}

/// The input field that replaces a special kind's subtree in a filter type.
pub fn special_input_field(kind: SpecialKind, name: &str) -> InputField {
    let (type_name, description) = match kind {
        SpecialKind::SearchQuery => (
            SEARCH_QUERY_FILTER_INPUT_TYPE,
            "Field for the full-text search using `SearchVector` and `SearchQuery` objects.",
        ),
        SpecialKind::SearchRank => (
            SEARCH_RANK_FILTER_INPUT_TYPE,
            "Field for the full-text search using the `SearchRank` object.",
        ),
        SpecialKind::Trigram => (
            TRIGRAM_FILTER_INPUT_TYPE,
            "Field for the full-text search using trigram similarity or trigram distance.",
        ),
    };
    InputField::new(name, input(type_name)).description(description)
}
