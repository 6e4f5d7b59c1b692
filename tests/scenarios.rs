//! End-to-end scenarios against an in-memory SQLite database.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;

use common::{database, init_tracing, session};
use quarry::query::diagnostics::{EventId, MemorySink};
use quarry::query::error::{ErrorCategory, ErrorCode};
use quarry::query::metadata::{ModelBuilder, Navigation, Relationship};
use quarry::query::types::{ClientEvaluationBehavior, IncludeStrategy};
use quarry::query::value::{Value, ValueKind};
use quarry::query::{Expression, Query, QueryOptions};

fn reversed_customer_is(value: &str) -> Expression {
    Expression::member("o", "Customer")
        .call("string", "reverse", vec![])
        .equal(value)
}

#[test]
fn include_collection_loads_every_line_once_per_order() {
    init_tracing();
    for strategy in [IncludeStrategy::Correlated, IncludeStrategy::PreJoined] {
        let executor = database();
        let session = session(&executor).with_options(QueryOptions::new().include_strategy(strategy));
        let query = Query::from("Order", "o")
            .filter(Expression::member("o", "Id").equal(1))
            .include(&["Lines"]);

        let first = session.to_list(query.clone()).unwrap();
        assert_eq!(first.len(), 1, "{:?}", strategy);
        let order = first[0].as_entity().unwrap();
        let lines = order.collection("Lines").unwrap();
        assert_eq!(lines.len(), 3, "{:?}", strategy);
        assert_eq!(
            lines.iter().map(|l| l.get("Id")).collect::<Vec<_>>(),
            vec![Value::Int(10), Value::Int(11), Value::Int(12)]
        );

        let second = session.to_list(query).unwrap();
        assert!(Arc::ptr_eq(order, second[0].as_entity().unwrap()), "{:?}", strategy);
        assert_eq!(session.unit_of_work().len(), 4, "{:?}", strategy);
    }
}

#[test]
fn strict_mode_fails_before_any_command() {
    let executor = database();
    let session = session(&executor)
        .with_options(QueryOptions::new().client_evaluation(ClientEvaluationBehavior::Throw));

    let err = session
        .query(Query::from("Order", "o").filter(reversed_customer_is("dyc")))
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::ClientEvaluationDisallowed);
    assert_eq!(err.category(), ErrorCategory::Translation);
    assert_eq!(executor.count(), 0);
}

#[test]
fn permissive_mode_warns_and_filters_in_process() {
    let executor = database();
    let sink = Arc::new(MemorySink::new());
    let session = session(&executor).with_sink(sink.clone());

    let items = session
        .to_list(Query::from("Order", "o").filter(reversed_customer_is("dyc")))
        .unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].as_entity().unwrap().get("Customer"), Value::from("cyd"));
    assert_eq!(sink.count(EventId::ClientEvaluation), 1);
    assert!(sink.events()[0].get("expression").is_some());
    assert_eq!(executor.count(), 1);
}

#[test]
fn single_valued_navigation_is_not_a_collection() {
    let model = ModelBuilder::new()
        .entity("Person", |e| e.table("people").property("Id", ValueKind::Int).key(&["Id"]))
        .entity("Blog", |e| {
            e.table("blogs")
                .property("Id", ValueKind::Int)
                .property("AuthorId", ValueKind::Int)
                .key(&["Id"])
        })
        .relationship(
            Relationship::new("Person", "Blog")
                .foreign_key(&["AuthorId"])
                .with_one("Author")
                .with_many("Blogs"),
        )
        .build()
        .unwrap();
    let blog = model.entity_type("Blog").unwrap();
    let person = model.entity_type("Person").unwrap();
    let author = model.find_runtime_property("Blog", "Author");

    let compatible =
        Navigation::is_compatible(&model, "Author", author, blog, person, Some(true), false).unwrap();
    assert!(!compatible);

    let err = Navigation::is_compatible(&model, "Author", author, blog, person, Some(true), true).unwrap_err();
    assert!(err.is_compatibility_error());
    assert_eq!(err.code, ErrorCode::IncompatibleNavigation);
}
