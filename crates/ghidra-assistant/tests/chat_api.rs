use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use ghidra_assistant::backend::HttpToolBackend;
use ghidra_assistant::core::RetryPolicy;
use ghidra_assistant::{AssistantBuilder, server};
use ghidra_assistant_model::ModelMessage;
use ghidra_assistant_test_model::{
    PresetEvent, PresetResponse, TestModelProvider,
};
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn app(provider: TestModelProvider, backend_uri: &str) -> axum::Router {
    app_with_retry_policy(
        provider,
        backend_uri,
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(10),
        },
    )
}

fn app_with_retry_policy(
    provider: TestModelProvider,
    backend_uri: &str,
    retry_policy: RetryPolicy,
) -> axum::Router {
    let backend =
        HttpToolBackend::new(backend_uri, Duration::from_secs(5)).unwrap();
    let assistant = AssistantBuilder::new(provider, backend)
        .with_retry_policy(retry_policy)
        .build();
    server::router(assistant)
}

fn chat_request(body: Value) -> Request<Body> {
    Request::post("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json_of(resp: Response) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Collects the JSON payload of every `data:` frame.
async fn sse_events(resp: Response) -> Vec<Value> {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    text.split("\n\n")
        .filter_map(|frame| frame.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect()
}

#[tokio::test]
async fn test_chat_requires_message_and_job_id() {
    let provider = TestModelProvider::default();
    let app = app(provider.clone(), "http://localhost:9090");

    let bodies = [
        json!({ "message": "hi" }),
        json!({ "job_id": "abc" }),
        json!({ "message": "", "job_id": "abc" }),
        json!({ "message": "hi", "job_id": "" }),
    ];
    for body in bodies {
        let resp = app.clone().oneshot(chat_request(body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json_of(resp).await,
            json!({ "error": "Message and job_id are required" })
        );
    }

    let resp = app
        .oneshot(
            Request::post("/chat")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Nothing reached the model.
    assert!(provider.requests().is_empty());
}

#[tokio::test]
async fn test_chat_streams_tool_calls_and_answer() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tools/list_functions"))
        .and(body_json(json!({ "job_id": "abc" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "functions": ["main", "init"] })),
        )
        .expect(1)
        .mount(&backend)
        .await;

    let mut provider = TestModelProvider::default();
    provider.add_response_step(PresetResponse::with_events([
        PresetEvent::tool_call("call_1", "list_functions", "{}"),
    ]));
    provider.add_response_step(PresetResponse::with_text(["Two functions."]));
    provider.add_response_step(PresetResponse::with_text([
        "The binary has ",
        "`main` and `init`.",
    ]));

    let resp = app(provider.clone(), &backend.uri())
        .oneshot(chat_request(json!({
            "message": "list the functions",
            "job_id": "abc"
        })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );

    let events = sse_events(resp).await;
    assert_eq!(
        events,
        [
            json!({ "type": "tool_call", "description": "Listing functions..." }),
            json!({ "type": "token", "content": "The binary has " }),
            json!({ "type": "token", "content": "`main` and `init`." }),
        ]
    );

    let requests = provider.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].tools.len(), 7);
    assert!(matches!(
        &requests[0].messages[0],
        ModelMessage::System(prompt) if prompt.contains("reverse engineering")
    ));
    let ModelMessage::Tool(result) = &requests[1].messages[3] else {
        panic!("expected a tool result");
    };
    assert_eq!(
        serde_json::from_str::<Value>(&result.content).unwrap(),
        json!({ "functions": ["main", "init"] })
    );
}

#[tokio::test]
async fn test_chat_backend_failure_goes_back_to_model() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tools/decompile_function"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&backend)
        .await;

    let mut provider = TestModelProvider::default();
    provider.add_response_step(PresetResponse::with_events([
        PresetEvent::tool_call(
            "call_1",
            "decompile_function",
            r#"{"addr": "0x401000"}"#,
        ),
    ]));
    provider.add_response_step(PresetResponse::with_text(["Backend is down."]));
    provider.add_response_step(PresetResponse::with_text(["Try again later."]));

    let resp = app(provider.clone(), &backend.uri())
        .oneshot(chat_request(json!({ "message": "decompile", "job_id": "abc" })))
        .await
        .unwrap();
    let events = sse_events(resp).await;
    assert_eq!(
        events,
        [
            json!({ "type": "tool_call", "description": "Decompiling function..." }),
            json!({ "type": "token", "content": "Try again later." }),
        ]
    );

    let ModelMessage::Tool(result) = &provider.requests()[1].messages[3]
    else {
        panic!("expected a tool result");
    };
    let content: Value = serde_json::from_str(&result.content).unwrap();
    assert!(content["error"].as_str().unwrap().contains("503"));
}

#[tokio::test]
async fn test_chat_reports_model_failure_as_one_error_event() {
    let mut provider = TestModelProvider::default();
    provider.add_response_step(
        PresetResponse::with_text(["never"]).with_failures(0),
    );

    let resp = app(provider.clone(), "http://localhost:9090")
        .oneshot(chat_request(json!({ "message": "hi", "job_id": "abc" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let events = sse_events(resp).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "error");
    assert_eq!(provider.requests().len(), 3);
}

#[tokio::test]
async fn test_chat_cancelled_when_client_disconnects_mid_request() {
    // The model keeps refusing, so the run sits in the retry loop without
    // emitting anything.
    let mut provider = TestModelProvider::default();
    provider.add_response_step(
        PresetResponse::with_text(["never sent"]).with_failures(0),
    );
    let app = app_with_retry_policy(
        provider.clone(),
        "http://localhost:9090",
        RetryPolicy {
            max_attempts: 100,
            delay: Duration::from_millis(20),
        },
    );

    let resp = app
        .oneshot(chat_request(json!({ "message": "hi", "job_id": "abc" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!provider.requests().is_empty());

    drop(resp);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let attempts = provider.requests().len();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(provider.requests().len(), attempts);
    assert!(attempts < 100);
}

#[tokio::test]
async fn test_status_passthrough() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status/abc"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "job_id": "abc", "status": "done" })),
        )
        .mount(&backend)
        .await;
    let app = app(TestModelProvider::default(), &backend.uri());

    let resp = app
        .clone()
        .oneshot(Request::get("/status/abc").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        body_json_of(resp).await,
        json!({ "job_id": "abc", "status": "done" })
    );

    let resp = app
        .oneshot(Request::get("/status/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json_of(resp).await;
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .starts_with("Failed to get status: ")
    );
}
