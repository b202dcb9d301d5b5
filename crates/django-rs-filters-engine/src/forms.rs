//! Value validation for filter trees.
//!
//! [`FormFieldType`] describes how one filter's raw value is validated and
//! coerced, in the manner of Django form fields. [`clean_value`] applies it to
//! a decoded request value and either returns a typed [`Value`] or the list of
//! error messages.
//!
//! [`TreeForm`] validates a whole [`FilterData`] tree: every level cleans its
//! own values and recursively owns one form per `and`/`or` entry and one for
//! `not`. Errors of nested forms are reported under `and` → `and_<i>`,
//! `or` → `or_<i>` and `not`.

use std::sync::Arc;

use django_rs_filters_core::{ErrorDict, FilterResult, Settings, LOOKUP_SEP};
use django_rs_filters_db::{FieldDef, LookupClass, ModelRegistry, Value};
use indexmap::IndexMap;

use crate::composer::find_filter;
use crate::filters::{Filter, FilterValue};
use crate::resolver::{DataValue, FilterData};

const REQUIRED: &str = "This field is required.";

/// The validation behaviour of a filter value.
#[derive(Debug, Clone, PartialEq)]
pub enum FormFieldType {
    /// Text.
    Char,
    /// A whole number.
    Integer,
    /// A floating-point number.
    Float,
    /// A boolean.
    Boolean,
    /// A boolean that may be unknown.
    NullBoolean,
    /// A date (`YYYY-MM-DD`).
    Date,
    /// A date and time.
    DateTime,
    /// A time of day.
    Time,
    /// A UUID.
    Uuid,
    /// Any JSON value.
    Json,
    /// One of a fixed set of values.
    Choice {
        /// Allowed values with their labels.
        choices: Vec<(Value, String)>,
    },
    /// The primary key of a related row.
    ModelChoice {
        /// Validation of the related primary key.
        pk: Box<FormFieldType>,
    },
    /// A list of values (the `in` lookup).
    List(Box<FormFieldType>),
    /// A pair of bounds (the `range` lookup).
    Range(Box<FormFieldType>),
    /// A value prepared by a full-text search data factory.
    Prepared,
}

impl FormFieldType {
    /// The form field for values of a lookup class.
    pub fn for_class(class: LookupClass) -> Self {
        match class {
            LookupClass::Text => Self::Char,
            LookupClass::Integer => Self::Integer,
            LookupClass::Float => Self::Float,
            LookupClass::Boolean => Self::NullBoolean,
            LookupClass::Date => Self::Date,
            LookupClass::DateTime => Self::DateTime,
            LookupClass::Time => Self::Time,
            LookupClass::Uuid => Self::Uuid,
            LookupClass::Json => Self::Json,
            LookupClass::Relation => Self::ModelChoice {
                pk: Box::new(Self::Integer),
            },
        }
    }

    /// The form field for a model field. Relations validate the primary key
    /// of the related model.
    pub fn for_field(models: &ModelRegistry, field: &FieldDef) -> FilterResult<Self> {
        match models.related_model_of(field)? {
            Some(target) => {
                let pk = match target.pk_field() {
                    Some(pk) if !pk.is_relation() => Self::for_field(models, pk)?,
                    _ => Self::Integer,
                };
                Ok(Self::ModelChoice { pk: Box::new(pk) })
            }
            None => Ok(Self::for_class(field.field_type.lookup_class())),
        }
    }

    /// The form field for `lookup_expr` applied to a model field.
    ///
    /// Transforms change the value class (`length` compares integers), `in`
    /// takes a list, `range` a pair and `isnull` a boolean. Fields with
    /// choices use a choice field for `exact` only.
    pub fn for_lookup(models: &ModelRegistry, field: &FieldDef, lookup_expr: &str) -> FilterResult<Self> {
        let segments: Vec<&str> = lookup_expr.split(LOOKUP_SEP).collect();
        let chain = models
            .lookups()
            .resolve_chain(field.field_type.lookup_class(), &segments)?;

        let base = if !chain.transforms.is_empty() {
            Self::for_class(chain.class)
        } else if let (Some(choices), "exact") = (&field.choices, chain.lookup.as_str()) {
            Self::Choice {
                choices: choices.clone(),
            }
        } else {
            Self::for_field(models, field)?
        };

        Ok(match chain.lookup.as_str() {
            "in" => Self::List(Box::new(base)),
            "range" => Self::Range(Box::new(base)),
            "isnull" => Self::NullBoolean,
            _ => base,
        })
    }
}

/// Cleans (validates and coerces) a decoded request value.
///
/// `null` and the empty string clean to `Null`, which makes the filter a
/// no-op.
///
/// # Examples
///
/// ```
/// use django_rs_filters_db::Value;
/// use django_rs_filters_engine::forms::{clean_value, FormFieldType};
/// use serde_json::json;
///
/// assert_eq!(clean_value(&FormFieldType::Integer, &json!("42")), Ok(Value::Int(42)));
/// assert_eq!(
///     clean_value(&FormFieldType::Integer, &json!("x")),
///     Err(vec!["Enter a whole number.".to_string()])
/// );
/// ```
pub fn clean_value(field_type: &FormFieldType, raw: &serde_json::Value) -> Result<Value, Vec<String>> {
    use serde_json::Value as Json;

    if raw.is_null() || raw.as_str() == Some("") {
        return Ok(Value::Null);
    }
    let invalid = |message: &str| -> Result<Value, Vec<String>> { Err(vec![message.to_string()]) };

    match field_type {
        FormFieldType::Char => match raw {
            Json::String(s) => Ok(Value::String(s.clone())),
            Json::Number(n) => Ok(Value::String(n.to_string())),
            Json::Bool(b) => Ok(Value::String(b.to_string())),
            _ => invalid("Enter a valid value."),
        },

        FormFieldType::Integer => {
            let parsed = match raw {
                Json::Number(n) => n.as_i64(),
                Json::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            };
            parsed.map_or_else(|| invalid("Enter a whole number."), |n| Ok(Value::Int(n)))
        }

        FormFieldType::Float => {
            let parsed = match raw {
                Json::Number(n) => n.as_f64(),
                Json::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            parsed.map_or_else(|| invalid("Enter a number."), |n| Ok(Value::Float(n)))
        }

        FormFieldType::Boolean => match raw {
            Json::Bool(b) => Ok(Value::Bool(*b)),
            Json::String(s) => Ok(Value::Bool(matches!(
                s.to_lowercase().as_str(),
                "true" | "1" | "yes" | "on"
            ))),
            _ => invalid("Enter a valid boolean."),
        },

        FormFieldType::NullBoolean => match raw {
            Json::Bool(b) => Ok(Value::Bool(*b)),
            Json::String(s) => match s.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(Value::Bool(true)),
                "false" | "0" | "no" | "off" => Ok(Value::Bool(false)),
                "null" | "none" | "unknown" => Ok(Value::Null),
                _ => invalid("Select a valid choice."),
            },
            _ => invalid("Select a valid choice."),
        },

        FormFieldType::Date => raw
            .as_str()
            .and_then(|s| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .map_or_else(|| invalid("Enter a valid date (YYYY-MM-DD)."), |d| Ok(Value::Date(d))),

        FormFieldType::DateTime => raw
            .as_str()
            .and_then(parse_datetime)
            .map_or_else(|| invalid("Enter a valid date/time."), |dt| Ok(Value::DateTime(dt))),

        FormFieldType::Time => raw
            .as_str()
            .and_then(|s| {
                chrono::NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
                    .or_else(|_| chrono::NaiveTime::parse_from_str(s, "%H:%M"))
                    .ok()
            })
            .map_or_else(
                || invalid("Enter a valid time (HH:MM or HH:MM:SS)."),
                |t| Ok(Value::Time(t)),
            ),

        FormFieldType::Uuid => raw
            .as_str()
            .and_then(|s| uuid::Uuid::parse_str(s).ok())
            .map_or_else(|| invalid("Enter a valid UUID."), |u| Ok(Value::Uuid(u))),

        FormFieldType::Json => Ok(Value::Json(raw.clone())),

        FormFieldType::Choice { choices } => {
            let candidate = Value::from_json(raw);
            choices
                .iter()
                .find(|(value, _)| value.loose_eq(&candidate) || value.text() == candidate.text())
                .map(|(value, _)| value.clone())
                .ok_or_else(|| {
                    let shown = raw.as_str().map_or_else(|| raw.to_string(), str::to_string);
                    vec![format!(
                        "Select a valid choice. {shown} is not one of the available choices."
                    )]
                })
        }

        FormFieldType::ModelChoice { pk } => clean_value(pk, raw).map_err(|_| {
            vec!["Select a valid choice. That choice is not one of the available choices.".to_string()]
        }),

        FormFieldType::List(inner) => {
            let mut values = Vec::new();
            let mut errors = Vec::new();
            for item in split_items(raw) {
                match clean_value(inner, &item) {
                    Ok(value) => values.push(value),
                    Err(messages) => errors.extend(messages),
                }
            }
            if errors.is_empty() {
                Ok(Value::List(values))
            } else {
                errors.dedup();
                Err(errors)
            }
        }

        FormFieldType::Range(inner) => {
            let items = split_items(raw);
            if items.len() != 2 {
                return invalid("Range query expects two values.");
            }
            let mut bounds = Vec::with_capacity(2);
            for item in &items {
                bounds.push(clean_value(inner, item)?);
            }
            Ok(Value::List(bounds))
        }

        FormFieldType::Prepared => invalid("Enter a structured value."),
    }
}

fn parse_datetime(s: &str) -> Option<chrono::NaiveDateTime> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.naive_utc())
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M"))
        .ok()
}

/// Lists arrive as arrays, or as comma-separated strings from flat arguments.
fn split_items(raw: &serde_json::Value) -> Vec<serde_json::Value> {
    match raw {
        serde_json::Value::Array(items) => items.clone(),
        serde_json::Value::String(s) => s
            .split(',')
            .map(|part| serde_json::Value::String(part.trim().to_string()))
            .collect(),
        other => vec![other.clone()],
    }
}

// ── Tree form ───────────────────────────────────────────────────────────

/// The validated counterpart of a [`FilterData`] tree.
#[derive(Debug, Clone)]
pub struct TreeForm {
    settings: Arc<Settings>,
    cleaned_data: IndexMap<String, FilterValue>,
    errors: ErrorDict,
    and_forms: Vec<TreeForm>,
    or_forms: Vec<TreeForm>,
    not_form: Option<Box<TreeForm>>,
}

impl TreeForm {
    /// Validates `data` against `filters`.
    ///
    /// Keys are matched to filters the same way the composer matches them.
    /// Filters marked `required` must have a non-empty value at the root.
    pub fn new(filters: &IndexMap<String, Filter>, data: &FilterData, settings: Arc<Settings>) -> Self {
        let mut form = Self::build(filters, data, &settings);
        for (name, filter) in filters {
            let missing = form
                .cleaned_data
                .get(name)
                .map_or(true, FilterValue::is_empty);
            if filter.is_required() && missing && !form.errors.fields.contains_key(name) {
                form.errors.add(name.clone(), REQUIRED);
            }
        }
        form
    }

    fn build(filters: &IndexMap<String, Filter>, data: &FilterData, settings: &Arc<Settings>) -> Self {
        let mut cleaned_data = IndexMap::new();
        let mut errors = ErrorDict::new();

        for (key, value) in &data.values {
            let Some((_, filter)) = find_filter(filters, key, &settings.filters) else {
                errors.add(key.clone(), format!("Unknown filter `{key}`."));
                continue;
            };
            match clean_data_value(filter, value) {
                Ok(cleaned) => {
                    cleaned_data.insert(key.clone(), cleaned);
                }
                Err(messages) => errors.extend(key.clone(), messages),
            }
        }

        Self {
            settings: Arc::clone(settings),
            cleaned_data,
            errors,
            and_forms: data.and.iter().map(|d| Self::build(filters, d, settings)).collect(),
            or_forms: data.or.iter().map(|d| Self::build(filters, d, settings)).collect(),
            not_form: data
                .not
                .as_deref()
                .map(|d| Box::new(Self::build(filters, d, settings))),
        }
    }

    /// The cleaned values of this level, in request order.
    pub const fn cleaned_data(&self) -> &IndexMap<String, FilterValue> {
        &self.cleaned_data
    }

    /// The forms of the `and` entries.
    pub fn and_forms(&self) -> &[Self] {
        &self.and_forms
    }

    /// The forms of the `or` entries.
    pub fn or_forms(&self) -> &[Self] {
        &self.or_forms
    }

    /// The form of the `not` entry.
    pub fn not_form(&self) -> Option<&Self> {
        self.not_form.as_deref()
    }

    /// All errors of this level and the nested forms.
    pub fn errors(&self) -> ErrorDict {
        let keys = &self.settings.filters;
        let mut errors = self.errors.clone();

        for (key, forms) in [(&keys.and_key, &self.and_forms), (&keys.or_key, &self.or_forms)] {
            let mut nested = ErrorDict::new();
            for (i, form) in forms.iter().enumerate() {
                nested.nest(format!("{key}_{i}"), form.errors());
            }
            errors.nest(key.clone(), nested);
        }
        if let Some(not_form) = &self.not_form {
            errors.nest(keys.not_key.clone(), not_form.errors());
        }
        errors
    }

    /// Returns `true` if no level of the tree has errors.
    pub fn is_valid(&self) -> bool {
        self.errors().is_empty()
    }
}

fn clean_data_value(filter: &Filter, value: &DataValue) -> Result<FilterValue, Vec<String>> {
    match value {
        DataValue::Prepared(prepared) if filter.is_annotated() => Ok(prepared.clone()),
        DataValue::Prepared(_) => Err(vec!["Enter a valid value.".to_string()]),
        DataValue::Raw(raw) => match filter.get_form_field() {
            Some(field_type) => clean_value(field_type, raw).map(FilterValue::Plain),
            None => Ok(FilterValue::Plain(Value::from_json(raw))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use django_rs_filters_db::{FieldType, ModelMeta};
    use serde_json::json;

    fn models() -> ModelRegistry {
        let mut models = ModelRegistry::new();
        models
            .register(
                ModelMeta::new("hr", "Team")
                    .field(FieldDef::new("code", FieldType::UuidField).primary_key()),
            )
            .unwrap();
        models
            .register(
                ModelMeta::new("hr", "Person")
                    .field(FieldDef::new("id", FieldType::AutoField).primary_key())
                    .field(FieldDef::new("name", FieldType::CharField))
                    .field(FieldDef::new("level", FieldType::IntegerField).choices(vec![
                        (Value::Int(1), "Junior".into()),
                        (Value::Int(2), "Senior".into()),
                    ]))
                    .field(FieldDef::new("team", FieldType::ForeignKey { to: "hr.team".into() })),
            )
            .unwrap();
        models
    }

    fn field_type(path: &str, lookup: &str) -> FormFieldType {
        let models = models();
        let (_, field) = models.get_field("hr.person", path).unwrap();
        FormFieldType::for_lookup(&models, field, lookup).unwrap()
    }

    #[test]
    fn test_form_field_for_lookup() {
        assert_eq!(field_type("name", "icontains"), FormFieldType::Char);
        assert_eq!(field_type("name", "length__gt"), FormFieldType::Integer);
        assert_eq!(field_type("name", "isnull"), FormFieldType::NullBoolean);
        assert_eq!(
            field_type("name", "in"),
            FormFieldType::List(Box::new(FormFieldType::Char))
        );
        assert!(matches!(field_type("level", "exact"), FormFieldType::Choice { .. }));
        assert_eq!(field_type("level", "gt"), FormFieldType::Integer);
        assert_eq!(
            field_type("team", "exact"),
            FormFieldType::ModelChoice {
                pk: Box::new(FormFieldType::Uuid)
            }
        );
    }

    #[test]
    fn test_unknown_lookup_is_rejected() {
        let models = models();
        let (_, field) = models.get_field("hr.person", "name").unwrap();
        assert!(FormFieldType::for_lookup(&models, field, "year").is_err());
    }

    #[test]
    fn test_clean_scalars() {
        assert_eq!(clean_value(&FormFieldType::Float, &json!(1.5)), Ok(Value::Float(1.5)));
        assert_eq!(clean_value(&FormFieldType::Char, &json!(7)), Ok(Value::from("7")));
        assert_eq!(clean_value(&FormFieldType::Integer, &json!("")), Ok(Value::Null));
        assert_eq!(
            clean_value(&FormFieldType::NullBoolean, &json!("no")),
            Ok(Value::Bool(false))
        );
        assert!(clean_value(&FormFieldType::Date, &json!("2024-02-30")).is_err());
        assert!(matches!(
            clean_value(&FormFieldType::DateTime, &json!("2024-01-02T03:04:05Z")),
            Ok(Value::DateTime(_))
        ));
        assert!(matches!(
            clean_value(&FormFieldType::Time, &json!("10:30")),
            Ok(Value::Time(_))
        ));
    }

    #[test]
    fn test_clean_choice() {
        let choice = FormFieldType::Choice {
            choices: vec![(Value::Int(1), "One".into())],
        };
        assert_eq!(clean_value(&choice, &json!("1")), Ok(Value::Int(1)));
        assert_eq!(
            clean_value(&choice, &json!(3)),
            Err(vec!["Select a valid choice. 3 is not one of the available choices.".to_string()])
        );
    }

    #[test]
    fn test_clean_list_and_range() {
        let list = FormFieldType::List(Box::new(FormFieldType::Integer));
        assert_eq!(
            clean_value(&list, &json!([1, "2"])),
            Ok(Value::List(vec![Value::Int(1), Value::Int(2)]))
        );
        assert_eq!(
            clean_value(&list, &json!("3, 4")),
            Ok(Value::List(vec![Value::Int(3), Value::Int(4)]))
        );
        assert_eq!(
            clean_value(&list, &json!(["a", "b"])),
            Err(vec!["Enter a whole number.".to_string()])
        );

        let range = FormFieldType::Range(Box::new(FormFieldType::Integer));
        assert_eq!(
            clean_value(&range, &json!([1, 5])),
            Ok(Value::List(vec![Value::Int(1), Value::Int(5)]))
        );
        assert!(clean_value(&range, &json!([1])).is_err());
    }

    #[test]
    fn test_model_choice_message() {
        let field = FormFieldType::ModelChoice {
            pk: Box::new(FormFieldType::Uuid),
        };
        assert_eq!(
            clean_value(&field, &json!("nope")),
            Err(vec![
                "Select a valid choice. That choice is not one of the available choices.".to_string()
            ])
        );
    }

    fn filters() -> IndexMap<String, Filter> {
        let mut filters = IndexMap::new();
        filters.insert(
            "name".to_string(),
            Filter::new("name", "exact").form_field(FormFieldType::Char),
        );
        filters.insert(
            "age__gt".to_string(),
            Filter::new("age", "gt").form_field(FormFieldType::Integer),
        );
        filters
    }

    fn raw(pairs: &[(&str, serde_json::Value)]) -> FilterData {
        FilterData {
            values: pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), DataValue::Raw(v.clone())))
                .collect(),
            ..FilterData::default()
        }
    }

    #[test]
    fn test_tree_form_cleans_every_level() {
        let mut data = raw(&[("name", json!("Ann"))]);
        data.or = vec![raw(&[("age__gt", json!("30"))]), raw(&[("name__exact", json!("Bo"))])];
        let form = TreeForm::new(&filters(), &data, Arc::new(Settings::default()));
        assert!(form.is_valid());
        assert_eq!(form.cleaned_data()["name"], FilterValue::Plain(Value::from("Ann")));
        assert_eq!(
            form.or_forms()[0].cleaned_data()["age__gt"],
            FilterValue::Plain(Value::Int(30))
        );
        assert_eq!(
            form.or_forms()[1].cleaned_data()["name__exact"],
            FilterValue::Plain(Value::from("Bo"))
        );
    }

    #[test]
    fn test_tree_form_error_structure() {
        let mut data = raw(&[("age__gt", json!("old"))]);
        data.and = vec![raw(&[]), raw(&[("age__gt", json!("x"))])];
        data.not = Some(Box::new(raw(&[("height", json!(2))])));
        let form = TreeForm::new(&filters(), &data, Arc::new(Settings::default()));
        assert!(!form.is_valid());

        let json: serde_json::Value = serde_json::from_str(&form.errors().as_json()).unwrap();
        assert_eq!(
            json,
            json!({
                "age__gt": ["Enter a whole number."],
                "and": {"and_1": {"age__gt": ["Enter a whole number."]}},
                "not": {"height": ["Unknown filter `height`."]}
            })
        );
    }

    #[test]
    fn test_required_filter() {
        let mut filters = filters();
        filters.insert(
            "team".to_string(),
            Filter::new("team", "exact").required(true),
        );
        let form = TreeForm::new(&filters, &raw(&[("name", json!("Ann"))]), Arc::new(Settings::default()));
        assert_eq!(form.errors().fields["team"], vec![REQUIRED.to_string()]);

        let form = TreeForm::new(&filters, &raw(&[("team", json!(1))]), Arc::new(Settings::default()));
        assert!(form.is_valid());
        assert_eq!(form.cleaned_data()["team"], FilterValue::Plain(Value::Int(1)));
    }
}
