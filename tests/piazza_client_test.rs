//! Tests for the JSON-RPC forum client against a mock HTTP server.

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use piazza_reader::forum::{Course, ForumClient, ForumError, PiazzaClient};
use piazza_reader::thread::{AnswerKind, NodeKind};

const API_PATH: &str = "/logic/api";

fn rpc_ok(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "result": result, "error": null }))
}

fn rpc_error(message: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "result": null, "error": message }))
}

fn course() -> Course {
    Course {
        nid: "net1".to_string(),
        name: "CS 101".to_string(),
        term: "Fall 2024".to_string(),
    }
}

async fn logged_in_client(server: &MockServer) -> PiazzaClient {
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .and(query_param("method", "user.login"))
        .respond_with(rpc_ok(json!("OK")).insert_header("set-cookie", "session_id=tok123; Path=/"))
        .expect(1)
        .mount(server)
        .await;

    let client = PiazzaClient::new(&format!("{}{API_PATH}", server.uri())).unwrap();
    client.login("student@example.edu", "hunter2").await.unwrap();
    client
}

#[tokio::test]
async fn test_login_sends_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .and(body_partial_json(json!({
            "method": "user.login",
            "params": { "email": "student@example.edu", "pass": "hunter2" }
        })))
        .respond_with(rpc_ok(json!("OK")))
        .expect(1)
        .mount(&server)
        .await;

    let client = PiazzaClient::new(&format!("{}{API_PATH}", server.uri())).unwrap();
    client.login("student@example.edu", "hunter2").await.unwrap();
}

#[tokio::test]
async fn test_rejected_login_is_an_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .respond_with(rpc_error("Email or password incorrect"))
        .mount(&server)
        .await;

    let client = PiazzaClient::new(&format!("{}{API_PATH}", server.uri())).unwrap();
    let err = client.login("student@example.edu", "wrong").await.unwrap_err();
    match err {
        ForumError::Api { method, message } => {
            assert_eq!(method, "user.login");
            assert_eq!(message, "Email or password incorrect");
        }
        other => panic!("expected an API error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_calls_before_login_are_refused() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(rpc_ok(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let client = PiazzaClient::new(&format!("{}{API_PATH}", server.uri())).unwrap();
    assert!(matches!(
        client.list_courses().await,
        Err(ForumError::NotLoggedIn)
    ));
    assert!(matches!(
        client.get_page(&course(), 10, 0).await,
        Err(ForumError::NotLoggedIn)
    ));
}

#[tokio::test]
async fn test_list_courses_sends_session_token() {
    let server = MockServer::start().await;
    let client = logged_in_client(&server).await;

    Mock::given(method("POST"))
        .and(query_param("method", "user.status"))
        .and(header("CSRF-Token", "tok123"))
        .respond_with(rpc_ok(json!({
            "networks": [
                { "id": "net1", "name": "CS 101", "term": "Fall 2024", "status": "active" },
                { "id": "net2", "name": "MATH 200" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let courses = client.list_courses().await.unwrap();
    assert_eq!(courses.len(), 2);
    assert_eq!(courses[0], course());
    assert_eq!(courses[1].term, "");
}

#[tokio::test]
async fn test_get_page_requests_window_and_maps_posts() {
    let server = MockServer::start().await;
    let client = logged_in_client(&server).await;

    Mock::given(method("POST"))
        .and(query_param("method", "network.get_my_feed"))
        .and(body_partial_json(json!({
            "params": { "nid": "net1", "limit": 2, "offset": 4 }
        })))
        .respond_with(rpc_ok(json!({
            "feed": [
                { "id": "a1", "nr": 12, "subject": "Exam room", "content_snipet": "Which <b>room</b>?" },
                { "id": "a2", "nr": 11, "subject": "HW late policy" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let posts = client.get_page(&course(), 2, 4).await.unwrap();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].nr, 12);
    assert_eq!(posts[0].id, "a1");
    assert_eq!(posts[0].preview, "Which <b>room</b>?");
    assert_eq!(posts[1].preview, "");
}

#[tokio::test]
async fn test_http_failure_is_a_status_error() {
    let server = MockServer::start().await;
    let client = logged_in_client(&server).await;

    Mock::given(method("POST"))
        .and(query_param("method", "network.get_my_feed"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client.get_page(&course(), 10, 0).await.unwrap_err();
    assert!(matches!(err, ForumError::Status(status) if status.as_u16() == 503));
}

#[tokio::test]
async fn test_malformed_body_is_a_decode_error() {
    let server = MockServer::start().await;
    let client = logged_in_client(&server).await;

    Mock::given(method("POST"))
        .and(query_param("method", "network.get_my_feed"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = client.get_page(&course(), 10, 0).await.unwrap_err();
    assert!(matches!(err, ForumError::Decode { .. }));
}

#[tokio::test]
async fn test_get_post_tree_builds_discussion() {
    let server = MockServer::start().await;
    let client = logged_in_client(&server).await;

    Mock::given(method("POST"))
        .and(query_param("method", "content.get"))
        .and(body_partial_json(json!({ "params": { "cid": "7", "nid": "net1" } })))
        .respond_with(rpc_ok(json!({
            "id": "c7",
            "type": "question",
            "history": [
                { "subject": "Midterm scope", "content": "<p>Does it cover ch. 5?</p>", "created": "2024-10-01T12:00:00Z" }
            ],
            "children": [
                {
                    "type": "i_answer",
                    "history": [{ "subject": "", "content": "Yes, through 5.3." }]
                },
                {
                    "type": "followup",
                    "subject": "What about 5.4?",
                    "children": [
                        { "type": "feedback", "subject": "Not covered." }
                    ]
                }
            ]
        })))
        .mount(&server)
        .await;

    let root = client.get_post_tree(&course(), 7).await.unwrap();
    assert_eq!(root.kind, NodeKind::OriginalPost);
    assert_eq!(root.subject, "Midterm scope");
    assert!(root.created.is_some());
    assert_eq!(root.children.len(), 2);
    assert_eq!(
        root.children[0].kind,
        NodeKind::Answer(AnswerKind::Instructor)
    );
    assert_eq!(root.children[1].kind, NodeKind::Followup);
    assert_eq!(root.children[1].children[0].kind, NodeKind::Comment);
}

#[tokio::test]
async fn test_post_reply_creates_followup_on_content_id() {
    let server = MockServer::start().await;
    let client = logged_in_client(&server).await;

    Mock::given(method("POST"))
        .and(query_param("method", "content.get"))
        .respond_with(rpc_ok(json!({ "id": "c7", "type": "question", "history": [] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(query_param("method", "content.create"))
        .and(body_partial_json(json!({
            "params": {
                "cid": "c7",
                "nid": "net1",
                "type": "followup",
                "subject": "Thanks!",
                "anonymous": "no"
            }
        })))
        .respond_with(rpc_ok(json!({ "id": "f1" })))
        .expect(1)
        .mount(&server)
        .await;

    client.post_reply(&course(), 7, "Thanks!").await.unwrap();
}
