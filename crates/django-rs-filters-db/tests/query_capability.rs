//! Integration tests for the query-builder capability.
//!
//! These tests exercise model introspection and the in-memory query set
//! together, covering:
//! 1. Every enumerated lookup of every field class is accepted by the query set
//! 2. Relation traversal through registered models
//! 3. Full-text search and trigram annotations

use django_rs_filters_db::fields::{FieldDef, FieldType};
use django_rs_filters_db::model::{ModelMeta, ModelRegistry};
use django_rs_filters_db::query::custom_lookups::RegisteredLookup;
use django_rs_filters_db::query::expressions::search::{
    SearchQuery, SearchQueryType, SearchRank, SearchVector, TrigramDistance,
};
use django_rs_filters_db::query::lookups::{Lookup, Q};
use django_rs_filters_db::query::queryset::{QueryBuilder, QuerySet, Record};
use django_rs_filters_db::value::Value;

// ============================================================================
// Shared helpers
// ============================================================================

fn models() -> ModelRegistry {
    let mut models = ModelRegistry::new();
    models
        .register(
            ModelMeta::new("library", "Author")
                .field(FieldDef::new("id", FieldType::AutoField).primary_key())
                .field(FieldDef::new("name", FieldType::CharField).max_length(100))
                .field(FieldDef::new("born", FieldType::DateField).nullable()),
        )
        .unwrap();
    models
        .register(
            ModelMeta::new("library", "Book")
                .field(FieldDef::new("id", FieldType::AutoField).primary_key())
                .field(FieldDef::new("title", FieldType::CharField))
                .field(FieldDef::new("summary", FieldType::TextField))
                .field(FieldDef::new("pages", FieldType::IntegerField))
                .field(FieldDef::new("in_print", FieldType::BooleanField))
                .field(FieldDef::new(
                    "author",
                    FieldType::ForeignKey {
                        to: "library.author".into(),
                    },
                )),
        )
        .unwrap();
    models.check().unwrap();
    models
}

fn books() -> QuerySet {
    let tolkien = Record::new()
        .set("id", 1)
        .set("name", "J. R. R. Tolkien")
        .set("born", chrono::NaiveDate::from_ymd_opt(1892, 1, 3).unwrap());
    let le_guin = Record::new().set("id", 2).set("name", "Ursula K. Le Guin");
    QuerySet::new(vec![
        Record::new()
            .set("id", 1)
            .set("title", "The Hobbit")
            .set("summary", "A hobbit goes on an unexpected journey")
            .set("pages", 310)
            .set("in_print", true)
            .relate_one("author", Some(tolkien.clone())),
        Record::new()
            .set("id", 2)
            .set("title", "The Silmarillion")
            .set("summary", "The elder days of Middle-earth")
            .set("pages", 365)
            .set("in_print", false)
            .relate_one("author", Some(tolkien)),
        Record::new()
            .set("id", 3)
            .set("title", "A Wizard of Earthsea")
            .set("summary", "A young wizard journey across the archipelago")
            .set("pages", 183)
            .set("in_print", true)
            .relate_one("author", Some(le_guin)),
    ])
}

fn sample_value(field: &FieldType, lookup: &str) -> Value {
    let scalar = match field {
        FieldType::CharField | FieldType::TextField => Value::from("a"),
        FieldType::DateField => Value::Date(chrono::NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()),
        FieldType::BooleanField => Value::Bool(true),
        _ => Value::Int(1),
    };
    match lookup {
        "isnull" => Value::Bool(false),
        "in" => Value::List(vec![scalar]),
        "range" => Value::List(vec![scalar.clone(), scalar]),
        _ => scalar,
    }
}

// ============================================================================
// 1. Registered lookups are executable
// ============================================================================

#[test]
fn test_every_registered_lookup_is_executable() {
    let models = models();
    let model = models.get_model("library.book").unwrap();
    for field in &model.fields {
        for (name, entry) in models.lookups_of(field) {
            if matches!(entry, RegisteredLookup::Transform(_)) {
                continue;
            }
            let value = sample_value(&field.field_type, name);
            let lookup = Lookup::from_parts(name, value)
                .unwrap_or_else(|e| panic!("{}__{name}: {e}", field.name));
            let qs = books().filter(Q::filter(field.name.clone(), lookup));
            assert!(qs.evaluate().is_ok(), "{}__{name} failed", field.name);
        }
    }
}

#[test]
fn test_transform_chain_from_registry() {
    let models = models();
    let (_, field) = models.get_field("library.book", "author__born").unwrap();
    let chain = models
        .lookups()
        .resolve_chain(field.field_type.lookup_class(), &["year", "lt"])
        .unwrap();
    assert_eq!(chain.lookup, "lt");

    let qs = books().filter(Q::filter("author__born__year", Lookup::Lt(Value::Int(1900))));
    assert_eq!(qs.count().unwrap(), 2);
}

// ============================================================================
// 2. Relation traversal
// ============================================================================

#[test]
fn test_filter_across_relation() {
    let qs = books()
        .filter(Q::filter("author__name", Lookup::IContains("tolkien".into())))
        .filter(Q::filter("in_print", Lookup::Exact(Value::Bool(true))));
    assert_eq!(qs.values_list("title").unwrap(), vec![Value::from("The Hobbit")]);
}

#[test]
fn test_negated_filter_across_relation() {
    let qs = books().filter(!Q::filter("author", Lookup::Exact(Value::Int(1))));
    assert_eq!(qs.values_list("id").unwrap(), vec![Value::Int(3)]);
}

// ============================================================================
// 3. Search annotations
// ============================================================================

#[test]
fn test_search_rank_orders_relevance() {
    let rank = SearchRank::new(
        SearchVector::new(["title", "summary"]),
        SearchQuery::new("journey").search_type(SearchQueryType::Plain),
    );
    let rows = books()
        .annotate("rank", rank.into())
        .filter(Q::filter("rank", Lookup::Gt(Value::Float(0.0))))
        .evaluate()
        .unwrap();
    let ids: Vec<_> = rows.iter().map(Record::pk).collect();
    assert_eq!(ids, vec![Value::Int(1), Value::Int(3)]);
}

#[test]
fn test_trigram_distance() {
    let qs = books()
        .annotate("distance", TrigramDistance::new("title", "The Hobit").into())
        .filter(Q::filter("distance", Lookup::Lt(Value::Float(0.5))));
    assert_eq!(qs.values_list("id").unwrap(), vec![Value::Int(1)]);
}
