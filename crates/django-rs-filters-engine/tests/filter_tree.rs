//! Integration tests for the filter-tree engine.
//!
//! These tests declare filter sets over a small company schema and exercise
//! the registry, schema generation, resolution and composition together,
//! covering:
//! 1. Filter naming with the default lookup elided
//! 2. Related expansion, re-keying and cyclic declarations
//! 3. AND / OR / NOT composition, empty branches included, against a query set
//! 4. Full-text search capability gating, emitted warnings and annotation naming
//! 5. Schema / resolver round trip
//! 6. Empty trees, not-only trees and evaluation idempotence
//! 7. Validation errors

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use django_rs_filters_core::{DatabaseFeatures, FilterError, FilterSettings, Settings};
use django_rs_filters_db::query::lookups::Lookup;
use django_rs_filters_db::{
    FieldDef, FieldType, ModelMeta, ModelRegistry, QueryBuilder, QuerySet, Record, Value, Q,
};
use django_rs_filters_engine::resolver::resolve;
use django_rs_filters_engine::schema::TypeRef;
use django_rs_filters_engine::{
    apply, get_argument_descriptor, AdvancedFilterConnectionField, AdvancedFilterSet, FilterSetDef,
    FilterSetRegistry, RelatedFilter, SchemaTypes, ValueTree,
};
use serde_json::{json, Value as Json};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

// ============================================================================
// Shared helpers
// ============================================================================

fn models() -> ModelRegistry {
    let mut models = ModelRegistry::new();
    models
        .register(
            ModelMeta::new("company", "Person")
                .field(FieldDef::new("id", FieldType::AutoField).primary_key())
                .field(FieldDef::new("name", FieldType::CharField).max_length(100))
                .field(FieldDef::new("age", FieldType::IntegerField))
                .field(
                    FieldDef::new(
                        "department",
                        FieldType::ForeignKey {
                            to: "company.department".into(),
                        },
                    )
                    .nullable(),
                ),
        )
        .unwrap();
    models
        .register(
            ModelMeta::new("company", "Department")
                .field(FieldDef::new("id", FieldType::AutoField).primary_key())
                .field(FieldDef::new("title", FieldType::CharField))
                .field(
                    FieldDef::new(
                        "manager",
                        FieldType::ForeignKey {
                            to: "company.person".into(),
                        },
                    )
                    .nullable(),
                ),
        )
        .unwrap();
    models
        .register(
            ModelMeta::new("company", "Project")
                .field(FieldDef::new("id", FieldType::AutoField).primary_key())
                .field(FieldDef::new("name", FieldType::CharField))
                .field(FieldDef::new(
                    "lead",
                    FieldType::ForeignKey {
                        to: "company.person".into(),
                    },
                )),
        )
        .unwrap();
    models
        .register(
            ModelMeta::new("stats", "Pair")
                .field(FieldDef::new("id", FieldType::AutoField).primary_key())
                .field(FieldDef::new("a", FieldType::IntegerField))
                .field(FieldDef::new("b", FieldType::IntegerField)),
        )
        .unwrap();
    models.check().unwrap();
    models
}

fn registry_with(database: DatabaseFeatures) -> FilterSetRegistry {
    let settings = Arc::new(Settings::new(FilterSettings::default(), database));
    let mut registry = FilterSetRegistry::with_settings(models(), settings);
    registry
        .register(
            FilterSetDef::new("PersonFilterSet", "company.Person")
                .module("company")
                .field_lookups("name", ["exact", "icontains", "full_text_search"])
                .field_lookups("age", ["exact", "gt"])
                .related("department", RelatedFilter::new("DepartmentFilterSet")),
        )
        .unwrap();
    registry
        .register(
            FilterSetDef::new("DepartmentFilterSet", "company.Department")
                .module("company")
                .fields(["title"])
                .related("manager", RelatedFilter::new("PersonFilterSet")),
        )
        .unwrap();
    registry
        .register(
            FilterSetDef::new("ProjectFilterSet", "company.Project")
                .module("company")
                .fields(["name"])
                .related("lead", RelatedFilter::new("company.PersonFilterSet")),
        )
        .unwrap();
    registry
        .register(FilterSetDef::new("PairFilterSet", "stats.Pair").module("stats").fields(["a", "b"]))
        .unwrap();
    registry.wire().unwrap();
    registry
}

fn registry() -> FilterSetRegistry {
    registry_with(DatabaseFeatures::default())
}

fn people() -> QuerySet {
    let research = Record::new().set("id", 1).set("title", "Research");
    let sales = Record::new().set("id", 2).set("title", "Sales");
    QuerySet::new(vec![
        Record::new()
            .set("id", 1)
            .set("name", "X")
            .set("age", 30)
            .relate_one("department", Some(research)),
        Record::new()
            .set("id", 2)
            .set("name", "X-Y-ish")
            .set("age", 41)
            .relate_one("department", Some(sales)),
        Record::new()
            .set("id", 3)
            .set("name", "Zed")
            .set("age", 25)
            .relate_one("department", None),
    ])
}

fn ids(qs: &QuerySet) -> Vec<Value> {
    qs.values_list("id").unwrap()
}

fn evaluate(registry: &FilterSetRegistry, filterset: &str, tree: &Json) -> (QuerySet, Q) {
    let tree = ValueTree::from_json(tree, &registry.settings().filters).unwrap();
    AdvancedFilterSet::from_tree(registry, filterset, &tree)
        .unwrap()
        .evaluate(people())
        .unwrap()
}

fn name_q(lookup: Lookup) -> Q {
    Q::filter("name", lookup)
}

/// Nests `value` under `path` inside `target`, merging with existing branches.
fn insert_path(target: &mut serde_json::Map<String, Json>, path: &[&str], value: Json) {
    let (first, rest) = path.split_first().unwrap();
    if rest.is_empty() {
        target.insert((*first).to_string(), value);
        return;
    }
    let branch = target
        .entry((*first).to_string())
        .or_insert_with(|| Json::Object(serde_json::Map::new()));
    insert_path(branch.as_object_mut().unwrap(), rest, value);
}

/// Counts the WARN events emitted while it is the active subscriber.
#[derive(Clone, Default)]
struct WarnCounter(Arc<AtomicUsize>);

impl WarnCounter {
    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl<S: tracing::Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// ============================================================================
// 1. Filter naming
// ============================================================================

#[test]
fn test_default_lookup_is_elided_from_names() {
    let registry = registry();
    let filters = registry.get_filters("PersonFilterSet").unwrap();
    let own: Vec<&str> = filters
        .keys()
        .map(String::as_str)
        .filter(|k| k.starts_with("name"))
        .collect();
    assert_eq!(own, vec!["name", "name__icontains"]);
    assert_eq!(filters["name"].lookup_expr(), "exact");
    assert_eq!(filters["name__icontains"].lookup_expr(), "icontains");
}

// ============================================================================
// 2. Related expansion
// ============================================================================

#[test]
fn test_related_filters_are_rebased() {
    let registry = registry();
    let filters = registry.get_filters("DepartmentFilterSet").unwrap();
    let manager_name = &filters["manager__name"];
    assert_eq!(manager_name.field_name().split("__").collect::<Vec<_>>(), vec!["manager", "name"]);
    assert_eq!(manager_name.lookup_expr(), "exact");
}

#[test]
fn test_related_expansion_covers_every_target_filter() {
    let registry = registry();
    let person = registry.get_filters("PersonFilterSet").unwrap();
    let project = registry.get_filters("ProjectFilterSet").unwrap();
    for (name, filter) in person.iter().filter(|(_, f)| !f.is_annotated()) {
        let expanded = &project[&format!("lead__{name}")];
        assert_eq!(expanded.field_name(), format!("lead__{}", filter.field_name()));
        assert_eq!(expanded.lookup_expr(), filter.lookup_expr());
    }
}

#[test]
fn test_cyclic_declarations_terminate() {
    let registry = registry();
    let filters = registry.get_filters("PersonFilterSet").unwrap();
    assert!(filters.contains_key("department__title"));
    assert!(filters.contains_key("department__manager__name"));
    assert!(filters.contains_key("department__manager__department"));
    assert!(!filters.contains_key("department__manager__department__title"));

    let again = registry.get_filters("company.PersonFilterSet").unwrap();
    assert_eq!(filters.keys().collect::<Vec<_>>(), again.keys().collect::<Vec<_>>());
}

// ============================================================================
// 3. Composition
// ============================================================================

#[test]
fn test_and_group() {
    let registry = registry();
    let (_, q) = evaluate(
        &registry,
        "PersonFilterSet",
        &json!({"and": [{"name": {"exact": "X"}}, {"name": {"icontains": "Y"}}]}),
    );
    assert_eq!(
        q,
        Q::And(vec![
            name_q(Lookup::Exact(Value::from("X"))),
            name_q(Lookup::IContains("Y".into())),
        ])
    );
    let filtered = people().filter(q);
    assert!(ids(&filtered).is_empty());
}

#[test]
fn test_or_group() {
    let registry = registry();
    let tree = ValueTree::from_json(&json!({"or": [{"a": 1}, {"b": 2}]}), &registry.settings().filters).unwrap();
    let (_, q) = AdvancedFilterSet::from_tree(&registry, "PairFilterSet", &tree)
        .unwrap()
        .evaluate(QuerySet::new(Vec::new()))
        .unwrap();
    assert_eq!(
        q,
        Q::Or(vec![
            Q::filter("a", Lookup::Exact(Value::Int(1))),
            Q::filter("b", Lookup::Exact(Value::Int(2))),
        ])
    );
}

#[test]
fn test_or_group_ignores_empty_branches() {
    let registry = registry();
    let two_people = || {
        QuerySet::new(vec![
            Record::new().set("id", 1).set("name", "Apple"),
            Record::new().set("id", 2).set("name", "Banana"),
        ])
    };
    for tree in [
        json!({"or": [{}, {"name": {"exact": "Apple"}}]}),
        json!({"or": [{"name": {"exact": ""}}, {"name": {"exact": "Apple"}}]}),
        json!({"or": [{"name": {"exact": "Apple"}}, {}]}),
    ] {
        let filtered = apply(&registry, "PersonFilterSet", two_people(), &tree).unwrap();
        assert_eq!(ids(&filtered), vec![Value::Int(1)], "tree: {tree}");
    }

    let filtered = apply(&registry, "PersonFilterSet", two_people(), &json!({"or": [{}, {}]})).unwrap();
    assert_eq!(ids(&filtered), vec![Value::Int(1), Value::Int(2)]);
}

#[test]
fn test_apply_filters_records() {
    let registry = registry();
    let filtered = apply(
        &registry,
        "PersonFilterSet",
        people(),
        &json!({
            "age": {"gt": 26},
            "or": [
                {"department": {"title": {"exact": "Research"}}},
                {"name": {"icontains": "y-ish"}}
            ],
            "not": {"name": {"exact": "Zed"}}
        }),
    )
    .unwrap();
    assert_eq!(ids(&filtered), vec![Value::Int(1), Value::Int(2)]);
    assert!(filtered.is_distinct());
}

#[test]
fn test_branch_level_combinators() {
    let registry = registry();
    let filtered = apply(
        &registry,
        "PersonFilterSet",
        people(),
        &json!({"name": {"or": [{"exact": "X"}, {"exact": "Zed"}]}}),
    )
    .unwrap();
    assert_eq!(ids(&filtered), vec![Value::Int(1), Value::Int(3)]);
}

// ============================================================================
// 4. Full-text search
// ============================================================================

#[test]
fn test_trigram_requires_extension() {
    let registry = registry_with(DatabaseFeatures::postgresql(false));
    let built = registry.built("PersonFilterSet").unwrap();
    assert!(built.filters().contains_key("search_query"));
    assert!(built.filters().contains_key("search_rank__gte"));
    assert!(!built.filters().keys().any(|k| k.contains("trigram")));
    assert_eq!(built.warnings().len(), 1);
    assert!(built.warnings()[0].contains("pg_trgm"));
}

#[test]
fn test_full_text_search_requires_postgresql() {
    let registry = registry();
    let built = registry.built("PersonFilterSet").unwrap();
    assert!(!built.filters().values().any(|f| f.is_annotated()));
    assert_eq!(built.warnings().len(), 1);
}

#[test]
fn test_capability_warning_is_emitted_once_per_build() {
    for database in [DatabaseFeatures::default(), DatabaseFeatures::postgresql(false)] {
        let registry = registry_with(database);
        let counter = WarnCounter::default();
        let subscriber = tracing_subscriber::registry().with(counter.clone());
        let built = tracing::subscriber::with_default(subscriber, || {
            registry.built("DepartmentFilterSet").unwrap();
            registry.built("PersonFilterSet").unwrap()
        });
        assert_eq!(built.warnings().len(), 1);
        assert_eq!(counter.count(), 2, "one warning for each of the two builds");
    }
}

#[test]
fn test_sibling_annotations_do_not_collide() {
    let registry = registry_with(DatabaseFeatures::postgresql(true));
    let rank = |gt: f64| {
        json!({"search_rank": {
            "vector": {"fields": ["name"]},
            "query": {"value": "x"},
            "lookups": {"gt": gt}
        }})
    };
    let (qs, q) = evaluate(&registry, "PersonFilterSet", &json!({"and": [rank(0.0), rank(0.1)]}));
    let names: BTreeSet<&String> = qs.annotations().keys().collect();
    assert_eq!(names.len(), 2);
    let Q::And(children) = &q else {
        panic!("expected an AND of both rank conditions");
    };
    let fields: BTreeSet<&String> = children
        .iter()
        .filter_map(|child| match child {
            Q::Filter { field, .. } => Some(field),
            _ => None,
        })
        .collect();
    assert_eq!(fields, names);
}

#[test]
fn test_trigram_filter_annotates_the_column() {
    let registry = registry_with(DatabaseFeatures::postgresql(true));
    let (qs, q) = evaluate(
        &registry,
        "PersonFilterSet",
        &json!({"name": {"trigram": {"value": "zedd", "lookups": {"gt": 0.3}}}}),
    );
    assert_eq!(qs.annotations().len(), 1);
    assert_eq!(q.leaf_count(), 1);
}

#[test]
fn test_search_vector_must_use_search_fields() {
    let registry = registry_with(DatabaseFeatures::postgresql(true));
    let tree = ValueTree::from_json(
        &json!({"search_query": {"vector": {"fields": ["age"]}, "query": {"value": "x"}}}),
        &registry.settings().filters,
    )
    .unwrap();
    let err = resolve(&registry, "PersonFilterSet", &tree).unwrap_err();
    assert!(err.is_validation());
    assert!(err.to_string().contains("full text search fields"));
}

// ============================================================================
// 5. Schema / resolver round trip
// ============================================================================

#[test]
fn test_schema_and_resolver_agree() {
    let registry = registry();
    let mut types = SchemaTypes::new();
    let root = get_argument_descriptor(&registry, "DepartmentFilterSet", "Dept", &mut types).unwrap();
    assert_eq!(root.name, "DeptFilterInputType");
    types.check().unwrap();

    let filters = registry.get_filters("DepartmentFilterSet").unwrap();
    let mut request = serde_json::Map::new();
    for filter in filters.values() {
        let path = filter.path();
        let mut input = &root;
        for segment in &path[..path.len() - 1] {
            let field = input.get_field(segment).unwrap();
            let TypeRef::Input(name) = &field.type_ref else {
                panic!("`{segment}` is not a branch");
            };
            input = types.input(name).unwrap();
        }
        assert!(input.get_field(path[path.len() - 1]).is_some());
        insert_path(&mut request, &path, json!("1"));
    }

    let tree = ValueTree::from_json(&Json::Object(request), &registry.settings().filters).unwrap();
    let data = resolve(&registry, "DepartmentFilterSet", &tree).unwrap();
    let resolved: BTreeSet<&String> = data.values.keys().collect();
    let expected: BTreeSet<&String> = filters.keys().collect();
    assert_eq!(resolved, expected);
}

#[test]
fn test_descriptor_is_cached_by_name() {
    let registry = registry();
    let mut types = SchemaTypes::new();
    get_argument_descriptor(&registry, "PersonFilterSet", "Person", &mut types).unwrap();
    let count = types.len();
    get_argument_descriptor(&registry, "PersonFilterSet", "Person", &mut types).unwrap();
    assert_eq!(types.len(), count);
}

// ============================================================================
// 6. Boundaries and idempotence
// ============================================================================

#[test]
fn test_empty_tree_is_identity() {
    let registry = registry();
    let (qs, q) = evaluate(&registry, "PersonFilterSet", &json!({}));
    assert!(q.is_identity());
    assert!(qs.annotations().is_empty());
    assert!(qs.where_clause().is_identity());
}

#[test]
fn test_not_only_tree() {
    let registry = registry();
    let (_, q) = evaluate(&registry, "PersonFilterSet", &json!({"not": {"name": {"exact": "X"}}}));
    assert_eq!(q, !name_q(Lookup::Exact(Value::from("X"))));
}

#[test]
fn test_evaluation_is_idempotent() {
    let registry = registry();
    let tree = json!({
        "age": {"gt": 20},
        "or": [{"name": {"exact": "X"}}, {"department": {"title": {"exact": "Sales"}}}],
        "not": {"name": {"icontains": "zed"}}
    });
    let (_, first) = evaluate(&registry, "PersonFilterSet", &tree);
    let (_, second) = evaluate(&registry, "PersonFilterSet", &tree);
    assert_eq!(first, second);
}

// ============================================================================
// 7. Validation and connection fields
// ============================================================================

#[test]
fn test_invalid_value_is_a_validation_error() {
    let registry = registry();
    let err = apply(&registry, "PersonFilterSet", people(), &json!({"age": {"gt": "old"}})).unwrap_err();
    let FilterError::Validation(errors) = err else {
        panic!("expected a validation error");
    };
    assert!(errors.as_json().contains("age__gt"));
}

#[test]
fn test_connection_field_merges_flat_arguments() {
    let models = models();
    let filters = FilterSettings {
        merge_flat_arguments: true,
        ..FilterSettings::default()
    };
    let mut registry =
        FilterSetRegistry::with_settings(models, Arc::new(Settings::new(filters, DatabaseFeatures::default())));
    registry
        .register(FilterSetDef::new("PersonFilterSet", "company.Person").field_lookups("name", ["exact", "icontains"]))
        .unwrap();

    let field = AdvancedFilterConnectionField::new(&registry, "PersonType", "PersonFilterSet", Some("People")).unwrap();
    let filtering_args = field.filtering_args(&mut SchemaTypes::new()).unwrap();
    let args = json!({"name_Icontains": "x", "filter": {"name": {"exact": "Zed"}}});
    let filtered = field
        .resolve_queryset(people(), args.as_object().unwrap(), &filtering_args)
        .unwrap();
    assert!(ids(&filtered).is_empty());

    let args = json!({"name_Icontains": "x", "filter": {"not": {"name": {"exact": "X"}}}});
    let filtered = field
        .resolve_queryset(people(), args.as_object().unwrap(), &filtering_args)
        .unwrap();
    assert_eq!(ids(&filtered), vec![Value::Int(2)]);
}
