use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use bill_burner_agent_runtime::{
    AgentInvocation, AgentRuntime, AgentRuntimeConfig, AgentRuntimeError, HttpAgentRuntime,
    SESSION_ID_HEADER,
};
use serde_json::{json, Value};
use url::Url;

#[derive(Debug, Default, Clone)]
struct Recorded {
    calls: Arc<Mutex<Vec<(HeaderMap, Value, Option<String>)>>>,
}

#[derive(serde::Deserialize)]
struct Qualifier {
    qualifier: Option<String>,
}

async fn spawn_stub(router: Router) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub");
    let addr = listener.local_addr().expect("stub addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("stub server");
    });
    Url::parse(&format!("http://{addr}/")).expect("stub url")
}

fn runtime_for(endpoint: Url, token: Option<&str>) -> HttpAgentRuntime {
    let mut config = AgentRuntimeConfig::new("burner-runtime");
    config.endpoint = Some(endpoint);
    config.bearer_token = token.map(str::to_string);
    HttpAgentRuntime::new(config).expect("runtime")
}

#[tokio::test]
async fn forwards_payload_with_session_header() {
    let recorded = Recorded::default();
    let router = Router::new()
        .route(
            "/runtimes/burner-runtime/invocations",
            post(
                |State(recorded): State<Recorded>,
                 Query(query): Query<Qualifier>,
                 headers: HeaderMap,
                 Json(body): Json<Value>| async move {
                    recorded
                        .calls
                        .lock()
                        .unwrap()
                        .push((headers, body, query.qualifier));
                    Json(json!({ "total_amount": "$1000", "roast": "nice" }))
                },
            ),
        )
        .with_state(recorded.clone());
    let runtime = runtime_for(spawn_stub(router).await, Some("runtime-token"));

    let invocation = AgentInvocation::new(json!({ "prompt": "burn", "amount": "$1000" }));
    let session_id = invocation.session_id.clone();
    let response = runtime.invoke(invocation).await.expect("invoke");
    assert_eq!(response, json!({ "total_amount": "$1000", "roast": "nice" }));

    let calls = recorded.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (headers, body, qualifier) = &calls[0];
    assert_eq!(
        headers.get(SESSION_ID_HEADER).unwrap().to_str().unwrap(),
        session_id
    );
    assert_eq!(
        headers.get("authorization").unwrap().to_str().unwrap(),
        "Bearer runtime-token"
    );
    assert_eq!(body, &json!({ "prompt": "burn", "amount": "$1000" }));
    assert_eq!(qualifier.as_deref(), Some("DEFAULT"));
}

#[tokio::test]
async fn throttling_maps_to_rate_limited() {
    let router = Router::new().route(
        "/runtimes/burner-runtime/invocations",
        post(|| async { (StatusCode::TOO_MANY_REQUESTS, [("retry-after", "7")], "slow down").into_response() }),
    );
    let runtime = runtime_for(spawn_stub(router).await, None);

    let err = runtime
        .invoke(AgentInvocation::new(json!({})))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AgentRuntimeError::RateLimited {
            retry_after: Some(7)
        }
    ));
}

#[tokio::test]
async fn server_errors_keep_status_and_body() {
    let router = Router::new().route(
        "/runtimes/burner-runtime/invocations",
        post(|| async { (StatusCode::BAD_GATEWAY, "runtime unavailable") }),
    );
    let runtime = runtime_for(spawn_stub(router).await, None);

    let err = runtime
        .invoke(AgentInvocation::new(json!({})))
        .await
        .unwrap_err();
    match err {
        AgentRuntimeError::Status { status, body } => {
            assert_eq!(status, 502);
            assert_eq!(body, "runtime unavailable");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_endpoint_is_a_connection_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    let runtime = runtime_for(Url::parse(&format!("http://{addr}/")).unwrap(), None);

    let err = runtime
        .invoke(AgentInvocation::new(json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentRuntimeError::Connection(_)), "{err:?}");
}
