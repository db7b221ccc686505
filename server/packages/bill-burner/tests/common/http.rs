use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bill_burner::router::{build_router, default_cors_layer, AppState};
use bill_burner_agent_runtime::{AgentInvocation, AgentRuntime, AgentRuntimeError};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;

/// Agent runtime double: answers every call with the same result and keeps
/// the invocations it saw.
#[derive(Debug)]
struct FakeAgent {
    response: Result<Value, String>,
    throttled: Option<Option<u64>>,
    calls: Mutex<Vec<AgentInvocation>>,
}

#[allow(dead_code)]
impl FakeAgent {
    fn answering(response: Value) -> Arc<Self> {
        Arc::new(Self {
            response: Ok(response),
            throttled: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            response: Err(message.to_string()),
            throttled: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn throttling(retry_after: Option<u64>) -> Arc<Self> {
        Arc::new(Self {
            response: Err("throttled".to_string()),
            throttled: Some(retry_after),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<AgentInvocation> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl AgentRuntime for FakeAgent {
    async fn invoke(&self, invocation: AgentInvocation) -> Result<Value, AgentRuntimeError> {
        self.calls.lock().expect("calls lock").push(invocation);
        if let Some(retry_after) = self.throttled {
            return Err(AgentRuntimeError::RateLimited { retry_after });
        }
        match &self.response {
            Ok(value) => Ok(value.clone()),
            Err(message) => Err(AgentRuntimeError::Connection(message.clone())),
        }
    }
}

struct TestApp {
    app: Router,
}

#[allow(dead_code)]
impl TestApp {
    fn new() -> Self {
        Self::with_state(AppState::unconfigured())
    }

    fn with_agent(agent: Arc<FakeAgent>) -> Self {
        Self::with_state(AppState::with_agent(agent))
    }

    fn with_state(state: AppState) -> Self {
        Self {
            app: build_router(state).layer(default_cors_layer()),
        }
    }
}

#[allow(dead_code)]
fn sample_analysis() -> Value {
    json!({
        "total_amount": "$5000",
        "timeline_days": 30,
        "efficiency_level": "Very stupid",
        "architecture_type": "kubernetes",
        "burning_style": "horizontal",
        "services_deployed": [
            {
                "service_name": "EKS",
                "instance_type": "p4d.24xlarge",
                "quantity": 3,
                "unit_cost": 32.77,
                "total_cost": 4200.0,
                "start_day": 0,
                "end_day": -1,
                "duration_used": 30,
                "usage_pattern": "idle",
                "waste_factor": "97%"
            },
            {
                "service_name": "NAT Gateway",
                "quantity": 12,
                "unit_cost": 0.045,
                "total_cost": 750.0,
                "start_day": 0,
                "end_day": 30,
                "duration_used": "30 days"
            }
        ],
        "total_calculated_cost": 4950.0,
        "deployment_scenario": "A GPU cluster serving a static landing page",
        "key_mistakes": ["GPU nodes for nginx"],
        "recommendations": ["Use S3 static hosting"],
        "roast": "Your cluster has more GPUs than visitors."
    })
}

#[allow(dead_code)]
fn identity_token(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.signature")
}

#[allow(dead_code)]
async fn send_request(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("request handled");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    (status, headers, bytes)
}

#[allow(dead_code)]
async fn send_json(
    app: &Router,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    let body = if let Some(body) = body {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(body.to_string())
    } else {
        Body::empty()
    };
    let request = builder.body(body).expect("request");
    let (status, _headers, bytes) = send_request(app, request).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or(Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };
    (status, value)
}

/// Serves `router` on an ephemeral local port and returns its base URL.
#[allow(dead_code)]
async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test server");
    let addr = listener.local_addr().expect("test server addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server");
    });
    format!("http://{addr}")
}
