//! Query shapes executed against SQLite.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use futures::TryStreamExt;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use common::{database, session};
use quarry::query::diagnostics::{EventId, MemorySink};
use quarry::query::types::IncludeStrategy;
use quarry::query::value::Value;
use quarry::query::{Expression, Projection, Query, QueryItem, QueryOptions};

fn ids(items: &[QueryItem]) -> Vec<Value> {
    items.iter().map(|i| i.as_entity().unwrap().get("Id")).collect()
}

#[test]
fn order_skip_take_runs_on_the_server() {
    let executor = database();
    let session = session(&executor);

    let items = session
        .to_list(
            Query::from("Order", "o")
                .order_by_desc(Expression::member("o", "Id"))
                .skip(1)
                .take(1),
        )
        .unwrap();

    assert_eq!(ids(&items), vec![Value::Int(2)]);
}

#[test]
fn sqlite_translators_keep_evaluation_on_the_server() {
    let executor = database();
    let sink = Arc::new(MemorySink::new());
    let session = session(&executor).with_sink(sink.clone());
    let query = Query::from("Order", "o").filter(
        Expression::member("o", "Customer")
            .call("string", "to_upper", vec![])
            .equal("BOB"),
    );

    let compiled = session.compile(query.clone()).unwrap();
    assert!(compiled.sql().contains("upper(\"o\".\"customer\")"));
    assert!(!compiled.has_client_evaluation());

    assert_eq!(ids(&session.to_list(query).unwrap()), vec![Value::Int(2)]);
    assert_eq!(sink.count(EventId::ClientEvaluation), 0);
}

#[test]
fn like_translation_escapes_wildcards() {
    let executor = database();
    executor_insert(&executor);
    let session = session(&executor);

    let items = session
        .to_list(
            Query::from("Order", "o").filter(
                Expression::member("o", "Customer").call("string", "contains", vec!["5%".into()]),
            ),
        )
        .unwrap();

    assert_eq!(ids(&items), vec![Value::Int(4)]);
}

fn executor_insert(executor: &common::CountingExecutor) {
    use quarry::query::executor::CommandExecutor;
    use quarry::query::sql::BoundCommand;

    let insert = BoundCommand {
        sql: "INSERT INTO orders VALUES (?, ?), (?, ?)".to_string(),
        parameters: vec![Value::Int(4), Value::from("ate 5%"), Value::Int(5), Value::from("ate 50")],
    };
    executor.execute(&insert).unwrap().for_each(drop);
}

#[test]
fn like_parameter_wildcards_match_literally() {
    let executor = database();
    executor_insert(&executor);
    let session = session(&executor);
    let query = Query::from("Order", "o").filter(Expression::member("o", "Customer").call(
        "string",
        "starts_with",
        vec![Expression::parameter("prefix")],
    ));
    assert!(!session.compile(query.clone()).unwrap().has_client_evaluation());

    for (prefix, expected) in [("%", vec![]), ("ate 5%", vec![Value::Int(4)]), ("a_e", vec![])] {
        let params = HashMap::from([("prefix".into(), Value::from(prefix))]);
        let items: Vec<QueryItem> = session.query_with(query.clone(), params).unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(ids(&items), expected, "prefix {:?}", prefix);
    }
}

#[test]
fn parameters_are_bound_per_execution() {
    let executor = database();
    let session = session(&executor);
    let query = Query::from("Order", "o").filter(Expression::member("o", "Customer").equal(Expression::parameter("name")));

    for (name, expected) in [("ada", 1), ("cyd", 3)] {
        let params = HashMap::from([("name".into(), Value::from(name))]);
        let items: Vec<QueryItem> = session.query_with(query.clone(), params).unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(ids(&items), vec![Value::Int(expected)]);
    }
}

#[test]
fn group_join_yields_every_outer_entity() {
    let executor = database();
    let session = session(&executor);

    let items = session
        .to_list(Query::from("Order", "o").group_join(
            Query::from("OrderLine", "l"),
            Expression::member("o", "Id"),
            Expression::member("l", "OrderId"),
        ))
        .unwrap();

    let shape: Vec<(Value, usize)> = items
        .iter()
        .map(|item| match item {
            QueryItem::Grouping { key, elements } => (key.get("Id"), elements.len()),
            other => panic!("unexpected item {:?}", other),
        })
        .collect();
    assert_eq!(shape, vec![(Value::Int(1), 3), (Value::Int(2), 1), (Value::Int(3), 0)]);
}

#[test]
fn join_projects_a_record() {
    let executor = database();
    let session = session(&executor);

    let items = session
        .to_list(
            Query::from("Order", "o")
                .join(
                    Query::from("OrderLine", "l"),
                    Expression::member("o", "Id"),
                    Expression::member("l", "OrderId"),
                )
                .filter(Expression::member("o", "Id").equal(2))
                .select(Projection::Record(vec![
                    ("customer".into(), Projection::Scalar(Expression::member("o", "Customer"))),
                    ("product".into(), Projection::Scalar(Expression::member("l", "Product"))),
                ])),
        )
        .unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].field("customer").and_then(QueryItem::as_scalar), Some(&Value::from("bob")));
    assert_eq!(items[0].field("product").and_then(QueryItem::as_scalar), Some(&Value::from("cup")));
}

#[test]
fn pre_joined_include_paginates_whole_orders() {
    let executor = database();
    let session =
        session(&executor).with_options(QueryOptions::new().include_strategy(IncludeStrategy::PreJoined));

    let items = session
        .to_list(Query::from("Order", "o").include(&["Lines"]).take(2))
        .unwrap();

    assert_eq!(ids(&items), vec![Value::Int(1), Value::Int(2)]);
    assert_eq!(items[0].as_entity().unwrap().collection("Lines").unwrap().len(), 3);
    assert_eq!(items[1].as_entity().unwrap().collection("Lines").unwrap().len(), 1);
    assert_eq!(executor.count(), 1);
}

#[test]
fn correlated_include_runs_one_command_per_order() {
    let executor = database();
    let session = session(&executor);

    let items = session.to_list(Query::from("Order", "o").include(&["Lines"])).unwrap();

    assert_eq!(items.len(), 3);
    assert!(items[2].as_entity().unwrap().collection("Lines").unwrap().is_empty());
    assert_eq!(executor.count(), 4);
}

#[test]
fn reference_include_links_both_ways() {
    let executor = database();
    let session = session(&executor);

    let items = session
        .to_list(
            Query::from("OrderLine", "l")
                .filter(Expression::member("l", "OrderId").equal(1))
                .include(&["Order"]),
        )
        .unwrap();

    assert_eq!(items.len(), 3);
    let order = items[0].as_entity().unwrap().reference("Order").unwrap();
    for item in &items {
        assert!(Arc::ptr_eq(&item.as_entity().unwrap().reference("Order").unwrap(), &order));
    }
    assert_eq!(order.collection("Lines").unwrap().len(), 3);
}

#[test]
fn no_tracking_materializes_fresh_instances() {
    let executor = database();
    let session = session(&executor);
    let query = Query::from("Order", "o").filter(Expression::member("o", "Id").equal(1)).as_no_tracking();

    let a = session.to_list(query.clone()).unwrap();
    let b = session.to_list(query).unwrap();

    assert!(!Arc::ptr_eq(a[0].as_entity().unwrap(), b[0].as_entity().unwrap()));
    assert!(session.unit_of_work().is_empty());
    assert_eq!(a[0].as_entity().unwrap().to_json(), serde_json::json!({"Id": 1, "Customer": "ada"}));
}

#[tokio::test]
async fn async_stream_with_include() {
    let executor = database();
    let session = session(&executor);

    let items: Vec<QueryItem> = session
        .query_async(
            Query::from("Order", "o").include(&["Lines"]),
            HashMap::new(),
            CancellationToken::new(),
        )
        .unwrap()
        .into_stream()
        .try_collect()
        .await
        .unwrap();

    assert_eq!(ids(&items), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    assert_eq!(items[0].as_entity().unwrap().collection("Lines").unwrap().len(), 3);
    assert_eq!(executor.count(), 4);
}

#[tokio::test]
async fn async_cancellation_stops_before_the_store() {
    let executor = database();
    let session = session(&executor);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = session
        .to_list_async(Query::from("Order", "o"), cancel)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(executor.count(), 0);
}
