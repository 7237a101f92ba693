use archive_server::routes::api_routes;
use archive_server::store::InMemoryStore;
use archive_server::test_support::{TestRocketBuilder, message};
use rocket::http::Status;
use serde_json::Value;

const LIST: &str = "<dev.example.org>";

/// root -> a -> a1, root -> b
fn seeded_store() -> InMemoryStore {
    InMemoryStore::with_messages(vec![
        message("root", None, 1, LIST),
        message("a", Some("root"), 2, LIST),
        message("b", Some("root"), 3, LIST),
        message("a1", Some("a"), 4, LIST),
    ])
}

fn client_with(store: &InMemoryStore) -> rocket::local::blocking::Client {
    TestRocketBuilder::new()
        .with_store(store.clone())
        .mount_api_routes(api_routes())
        .blocking_client()
}

fn ids(values: &Value) -> Vec<String> {
    values
        .as_array()
        .expect("array")
        .iter()
        .map(|v| v["id"].as_str().expect("id").to_string())
        .collect()
}

#[test]
fn thread_resolves_root_and_replies_from_any_member() {
    let client = client_with(&seeded_store());

    let response = client.get("/api/v1/thread/a1").dispatch();
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().expect("valid JSON payload");

    assert_eq!(body["thread"]["id"], "root");
    assert_eq!(ids(&body["emails"]), vec!["root", "a", "a1", "b"]);
    assert_eq!(ids(&body["children"]), vec!["a", "b"]);
    assert_eq!(ids(&body["children"][0]["children"]), vec!["a1"]);
    // Full mode carries complete, anonymized records.
    assert_eq!(body["children"][0]["body"], "Reach me at us..@example.org");
}

#[test]
fn short_thread_returns_summaries() {
    let client = client_with(&seeded_store());

    let response = client.get("/api/v1/thread/root?short=true").dispatch();
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().expect("valid JSON payload");

    let first = &body["children"][0];
    assert_eq!(first["id"], "a");
    assert!(first.get("body").is_none());
    assert_eq!(first["in_reply_to"], "<root@example.org>");
}

#[test]
fn unknown_thread_is_not_found() {
    let client = client_with(&seeded_store());
    let response = client.get("/api/v1/thread/missing").dispatch();
    assert_eq!(response.status(), Status::NotFound);
}

#[test]
fn hidden_replies_are_left_out() {
    let store = seeded_store();
    let mut hidden = message("h", Some("root"), 5, LIST);
    hidden.private = true;
    store.insert_message(hidden);
    let client = client_with(&store);

    let body: Value = client
        .get("/api/v1/thread/root")
        .dispatch()
        .into_json()
        .expect("valid JSON payload");
    assert!(!ids(&body["emails"]).contains(&"h".to_string()));
}
