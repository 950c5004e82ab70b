mod common;

use async_trait::async_trait;
use common::{config, repository, router};
use restful_models::client::{HttpRequest, HttpResponse};
use restful_models::{Page, RemoteSource, Repository, RouterTransport, Transport};
use serde_json::{json, Map, Value};
use std::sync::Arc;

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

/// A server backed by memory, and a client repository that reaches it through the router.
fn pair() -> (Repository, Repository) {
    let server = repository();
    let transport = Arc::new(RouterTransport::new(router(server.clone())));
    let client = Repository::from_config(&config(), Arc::new(RemoteSource::new("", transport))).unwrap();
    (server, client)
}

async fn seed(client: &Repository) {
    let mut widgets = client.bulk("widget").unwrap();
    for name in ["a", "b", "c"] {
        widgets.add(object(json!({"name": name}))).unwrap();
    }
    widgets.create().await.unwrap();
    assert!(widgets.records.is_empty());
}

#[tokio::test]
async fn create_assigns_ids() {
    let (server, client) = pair();

    let mut widget = client.create("widget", object(json!({"name": "x"}))).unwrap();
    widget.create().await.unwrap();
    assert_eq!(widget.records[0].get("id"), &json!(1));

    let mut stored = server.one("widget").unwrap().filter("id", 1i64);
    stored.retrieve(true).await.unwrap();
    assert_eq!(stored.records[0].get("name"), &json!("x"));
    assert_eq!(stored.records[0].get("status"), &json!("good"));
}

#[tokio::test]
async fn create_with_children() {
    let (server, client) = pair();

    let mut kind = client.create("kind", object(json!({"name": "people"}))).unwrap();
    kind.child(0, "widget")
        .unwrap()
        .add(object(json!({"name": "w"})))
        .unwrap();
    kind.create().await.unwrap();

    let mut widgets = server.many("widget").unwrap().filter("kind_id", 1i64);
    assert_eq!(widgets.count().await.unwrap(), 1);
}

#[tokio::test]
async fn retrieve_and_count() {
    let (_, client) = pair();
    seed(&client).await;

    let mut one = client.one("widget").unwrap().filter("name", "b");
    assert!(one.retrieve(true).await.unwrap());
    assert_eq!(one.records[0].get("id"), &json!(2));

    let mut many = client.many("widget").unwrap().sort(vec!["-name".into()]);
    many.retrieve(true).await.unwrap();
    assert_eq!(many.ids(), vec![json!(3), json!(2), json!(1)]);
    assert!(!many.overflow);

    let mut paged = client.many("widget").unwrap().limit(Page::new(2, 0));
    paged.retrieve(true).await.unwrap();
    assert_eq!(paged.records.len(), 2);
    assert!(paged.overflow);

    let mut counted = client.many("widget").unwrap().filter_in("name", vec![json!("a"), json!("c")]);
    assert_eq!(counted.count().await.unwrap(), 2);
}

#[tokio::test]
async fn missing_record_errors() {
    let (_, client) = pair();

    let mut none = client.one("widget").unwrap().filter("id", 7i64);
    let err = none.retrieve(true).await.unwrap_err();
    assert_eq!(err.to_string(), "widget: none retrieved");

    let mut quiet = client.one("widget").unwrap().filter("id", 7i64);
    assert!(!quiet.retrieve(false).await.unwrap());
}

#[tokio::test]
async fn update_mass_and_per_record() {
    let (server, client) = pair();
    seed(&client).await;

    let mut mass = client.many("widget").unwrap().filter("name", "a");
    mass.set(object(json!({"status": "bad"}))).unwrap();
    assert_eq!(mass.update().await.unwrap(), 1);

    let mut one = client.one("widget").unwrap().filter("name", "b");
    one.retrieve(true).await.unwrap();
    one.set(object(json!({"name": "bee"}))).unwrap();
    assert_eq!(one.update().await.unwrap(), 1);

    let mut untouched = client.many("widget").unwrap().filter("name", "c");
    assert_eq!(untouched.update().await.unwrap(), 0);
    let mut anonymous = client.many("gadget").unwrap();
    let err = anonymous.update().await.unwrap_err();
    assert_eq!(err.to_string(), "gadget: nothing to update from");

    let mut stored = server.many("widget").unwrap().filter("status", "bad");
    assert_eq!(stored.count().await.unwrap(), 1);
    let mut renamed = server.many("widget").unwrap().filter("name", "bee");
    assert_eq!(renamed.count().await.unwrap(), 1);
}

#[tokio::test]
async fn delete_mass_and_retrieved() {
    let (server, client) = pair();
    seed(&client).await;

    let mut some = client.many("widget").unwrap().filter_in("name", vec![json!("a"), json!("b")]);
    some.retrieve(true).await.unwrap();
    assert_eq!(some.delete().await.unwrap(), 2);

    let mut rest = client.many("widget").unwrap().filter("name", "c");
    assert_eq!(rest.delete().await.unwrap(), 1);

    let mut left = server.many("widget").unwrap();
    assert_eq!(left.count().await.unwrap(), 0);
}

#[tokio::test]
async fn records_without_identity_cannot_be_deleted() {
    let (_, client) = pair();
    let mut gadgets = client
        .create_many("gadget", vec![object(json!({"name": "g"}))])
        .unwrap();
    gadgets.create().await.unwrap();

    let err = gadgets.delete().await.unwrap_err();
    assert_eq!(err.to_string(), "gadget: nothing to delete from");
}

#[tokio::test]
async fn labels_through_the_api() {
    let (_, client) = pair();
    let mut kinds = client.bulk("kind").unwrap();
    for name in ["people", "stuff", "things"] {
        kinds.add(object(json!({"name": name}))).unwrap();
    }
    kinds.create().await.unwrap();

    let labels = client
        .many("kind")
        .unwrap()
        .limit(Page::new(2, 0))
        .labels()
        .await
        .unwrap();
    assert_eq!(labels.ids, vec![json!(1), json!(2)]);
    assert_eq!(labels.labels["2"], json!(["stuff"]));
    assert!(labels.overflow);
}

struct Failing(Result<HttpResponse, String>);

#[async_trait]
impl Transport for Failing {
    async fn send(&self, _base: &str, _request: HttpRequest) -> Result<HttpResponse, String> {
        self.0.clone()
    }
}

fn failing(outcome: Result<HttpResponse, String>) -> Repository {
    Repository::from_config(&config(), Arc::new(RemoteSource::new("http://nowhere", Arc::new(Failing(outcome))))).unwrap()
}

#[tokio::test]
async fn transport_and_server_errors() {
    let repo = failing(Err("connection refused".into()));
    let err = repo.many("widget").unwrap().count().await.unwrap_err();
    assert_eq!(err.to_string(), "widget: connection refused");

    let repo = failing(Ok(HttpResponse { status: 500, body: Value::Null }));
    let err = repo.many("widget").unwrap().count().await.unwrap_err();
    assert_eq!(err.to_string(), "widget: API Error");

    let repo = failing(Ok(HttpResponse {
        status: 500,
        body: json!({"message": "widget: broken query"}),
    }));
    let err = repo.many("widget").unwrap().retrieve(true).await.unwrap_err();
    assert_eq!(err.to_string(), "widget: broken query");
}
