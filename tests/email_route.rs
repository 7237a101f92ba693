use archive_server::models::MessageRecord;
use archive_server::routes::api_routes;
use archive_server::store::InMemoryStore;
use archive_server::test_support::{TestRocketBuilder, message};
use rocket::http::Status;
use serde_json::Value;

const LIST: &str = "<dev.example.org>";

fn client_with(store: &InMemoryStore) -> rocket::local::blocking::Client {
    TestRocketBuilder::new()
        .with_store(store.clone())
        .with_private_lists(&["secret@example.org"])
        .mount_api_routes(api_routes())
        .blocking_client()
}

#[test]
fn anonymous_viewer_gets_anonymized_email() {
    let store = InMemoryStore::with_messages(vec![message("42", None, 100, LIST)]);
    let client = client_with(&store);

    let response = client.get("/api/v1/email/42").dispatch();
    assert_eq!(response.status(), Status::Ok);
    assert!(
        response.cookies().get("archive_session").is_some(),
        "a fresh viewer receives a session cookie"
    );

    let email: MessageRecord = response.into_json().expect("valid JSON payload");
    assert_eq!(email.id, "42");
    assert_eq!(email.from, "User 42 <us..@example.org>");
    assert_eq!(email.body.as_deref(), Some("Reach me at us..@example.org"));
    assert_eq!(
        email.fingerprint,
        Some(format!("{:x}", md5::compute("user42@example.org")))
    );
}

#[test]
fn private_and_missing_emails_are_not_found() {
    let mut flagged = message("p", None, 1, LIST);
    flagged.private = true;
    let store = InMemoryStore::with_messages(vec![flagged, message("s", None, 2, "<secret.example.org>")]);
    let client = client_with(&store);

    for path in ["/api/v1/email/p", "/api/v1/email/s", "/api/v1/email/nope"] {
        let response = client.get(path).dispatch();
        assert_eq!(response.status(), Status::NotFound, "{}", path);
        let body: Value = response.into_json().expect("error payload");
        assert_eq!(body["error"], "NotFound");
    }
}

#[test]
fn malformed_id_is_bad_request() {
    let client = client_with(&InMemoryStore::new());

    let response = client.get("/api/v1/email/has%20space").dispatch();
    assert_eq!(response.status(), Status::BadRequest);
    let body: Value = response.into_json().expect("error payload");
    assert_eq!(body["error"], "BadRequest");
}

#[test]
fn backend_failure_is_service_unavailable() {
    let store = InMemoryStore::with_messages(vec![message("1", None, 1, LIST)]);
    store.set_unavailable(true);
    let client = client_with(&store);

    let response = client.get("/api/v1/email/1").dispatch();
    assert_eq!(response.status(), Status::ServiceUnavailable);
    let body: Value = response.into_json().expect("error payload");
    assert_eq!(body["error"], "Unavailable");
}
