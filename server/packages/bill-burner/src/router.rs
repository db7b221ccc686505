use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bill_burner_agent_runtime::{
    AgentInvocation, AgentRuntime, AgentRuntimeError, BurnPlanParameters,
};
use bill_burner_error::{BurnerError, ErrorEnvelope, ErrorType};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;
use utoipa::{IntoParams, Modify, OpenApi, ToSchema};

use crate::burn_plan::{
    BurnPlanAnalysis, BurnPlanEnvelope, BurnPlanRequest, PdfInvoice, RecentBurnPlan,
    RecentBurnPlanSummary, ServiceDeployment, DEFAULT_RECENT_LIMIT,
};
use crate::jwt::decode_payload;
use crate::recent::RecentPlans;

const UNKNOWN_CLAIM: &str = "unknown";

#[derive(Debug)]
pub struct AppState {
    agent: Option<Arc<dyn AgentRuntime>>,
    recent: RecentPlans,
}

impl AppState {
    pub fn new(agent: Option<Arc<dyn AgentRuntime>>) -> Self {
        Self {
            agent,
            recent: RecentPlans::default(),
        }
    }

    /// No agent runtime: burn-plan requests answer with a configuration error.
    pub fn unconfigured() -> Self {
        Self::new(None)
    }

    pub fn with_agent(agent: Arc<dyn AgentRuntime>) -> Self {
        Self::new(Some(agent))
    }

    pub fn agent_configured(&self) -> bool {
        self.agent.is_some()
    }

    pub fn recent(&self) -> &RecentPlans {
        &self.recent
    }
}

pub fn build_router(state: AppState) -> Router {
    build_router_with_state(Arc::new(state)).0
}

pub fn build_router_with_state(shared: Arc<AppState>) -> (Router, Arc<AppState>) {
    let burn_plan = post(create_burn_plan).fallback(method_not_allowed);
    let recent = get(list_recent_plans).fallback(method_not_allowed);

    let mut router = Router::new()
        .route("/", get(get_root).fallback(method_not_allowed))
        .route("/health", get(get_health).fallback(method_not_allowed))
        .route("/hello", get(get_hello).fallback(method_not_allowed))
        .route("/burn-plan", burn_plan.clone())
        .route("/api/burn-plan", burn_plan)
        .route("/burn-plan/recent", recent.clone())
        .route("/api/burn-plan/recent", recent)
        .fallback(not_found)
        .with_state(shared.clone());

    if http_logging_enabled() {
        let with_headers = std::env::var_os("BILL_BURNER_LOG_HTTP_HEADERS").is_some();
        router = router.layer(
            TraceLayer::new_for_http()
                .make_span_with(move |req: &Request<_>| request_span(req, with_headers))
                .on_request(|_req: &Request<_>, span: &Span| {
                    tracing::info!(parent: span, "request");
                })
                .on_response(|res: &Response<_>, latency: Duration, span: &Span| {
                    tracing::info!(
                        parent: span,
                        status = %res.status(),
                        latency_ms = latency.as_millis() as u64,
                        "response"
                    );
                }),
        );
    }

    (router, shared)
}

/// Request logging is on unless `BILL_BURNER_LOG_HTTP` is `0` or `false`.
fn http_logging_enabled() -> bool {
    std::env::var("BILL_BURNER_LOG_HTTP")
        .map(|value| value != "0" && !value.eq_ignore_ascii_case("false"))
        .unwrap_or(true)
}

fn request_span<B>(req: &Request<B>, with_headers: bool) -> Span {
    if with_headers {
        tracing::info_span!(
            "http.request",
            method = %req.method(),
            uri = %req.uri(),
            headers = ?loggable_headers(req.headers())
        )
    } else {
        tracing::info_span!("http.request", method = %req.method(), uri = %req.uri())
    }
}

/// Header pairs for the request span. Bearer tokens never reach the log.
fn loggable_headers(headers: &HeaderMap) -> Vec<(&str, &str)> {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if *name == header::AUTHORIZATION {
                "<redacted>"
            } else {
                value.to_str().unwrap_or("<binary>")
            };
            (name.as_str(), shown)
        })
        .collect()
}

/// Any origin, the methods the API serves, and the two headers browsers send.
pub fn default_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

#[derive(OpenApi)]
#[openapi(
    paths(get_root, get_health, get_hello, create_burn_plan, list_recent_plans),
    components(
        schemas(
            ServiceInfo,
            HealthResponse,
            HelloResponse,
            HelloUser,
            BurnPlanRequest,
            BurnPlanEnvelope,
            BurnPlanAnalysis,
            ServiceDeployment,
            PdfInvoice,
            RecentBurnPlan,
            RecentBurnPlanSummary,
            ErrorEnvelope,
            ErrorType
        )
    ),
    tags(
        (name = "meta", description = "Service metadata"),
        (name = "burn-plan", description = "Burn plan generation")
    ),
    modifiers(&ServerAddon)
)]
pub struct ApiDoc;

struct ServerAddon;

impl Modify for ServerAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        openapi.servers = Some(vec![utoipa::openapi::Server::new("http://localhost:8787")]);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Burner(#[from] BurnerError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError::Burner(err) = &self;
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(err.to_envelope())).into_response();
        if let Some(seconds) = err.retry_after() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }
        response
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct HealthResponse {
    pub status: String,
    pub agentcore_configured: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct HelloUser {
    pub email: String,
    pub sub: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct HelloResponse {
    pub message: String,
    pub timestamp: String,
    pub user: HelloUser,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams, JsonSchema)]
#[into_params(parameter_in = Query)]
pub struct RecentPlansQuery {
    /// Number of plans to return, newest first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct ServiceInfo {
    pub message: String,
    pub version: String,
    pub endpoints: BTreeMap<String, String>,
}

impl ServiceInfo {
    fn current() -> Self {
        let endpoints = [
            ("health", "/health"),
            ("hello", "/hello"),
            ("burn_plan", "/burn-plan (POST)"),
            ("burn_plan_recent", "/burn-plan/recent (GET)"),
        ]
        .into_iter()
        .map(|(name, path)| (name.to_string(), path.to_string()))
        .collect();
        Self {
            message: "AWS Bill Burner API".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            endpoints,
        }
    }
}

#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Service name, version and endpoints", body = ServiceInfo)),
    tag = "meta"
)]
/// Service Info
async fn get_root() -> Json<ServiceInfo> {
    Json(ServiceInfo::current())
}

async fn not_found(uri: Uri) -> ApiError {
    BurnerError::NotFound {
        path: uri.path().to_string(),
    }
    .into()
}

async fn method_not_allowed() -> ApiError {
    BurnerError::MethodNotAllowed.into()
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Server is healthy", body = HealthResponse)),
    tag = "meta"
)]
/// Health Check
///
/// Reports whether an agent runtime is wired up.
async fn get_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        agentcore_configured: state.agent_configured(),
    })
}

#[utoipa::path(
    get,
    path = "/hello",
    responses((status = 200, description = "Greeting with the caller's claims", body = HelloResponse)),
    tag = "meta"
)]
/// Hello
///
/// Echoes the `email` and `sub` claims of the bearer identity token. The
/// gateway in front of this service verifies the token; claims are only read
/// here.
async fn get_hello(headers: HeaderMap) -> Json<HelloResponse> {
    let claims = extract_token(&headers)
        .and_then(|token| decode_payload(&token).ok())
        .unwrap_or_default();
    let claim = |key: &str| {
        claims
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .unwrap_or(UNKNOWN_CLAIM)
            .to_string()
    };
    Json(HelloResponse {
        message: "Hello World!".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        user: HelloUser {
            email: claim("email"),
            sub: claim("sub"),
        },
    })
}

#[utoipa::path(
    post,
    path = "/burn-plan",
    request_body = BurnPlanRequest,
    responses(
        (status = 200, description = "Agent analysis of the burn", body = BurnPlanEnvelope),
        (status = 400, description = "Missing or malformed fields", body = ErrorEnvelope),
        (status = 405, description = "Method not allowed", body = ErrorEnvelope),
        (status = 500, description = "Agent runtime missing or failed", body = ErrorEnvelope)
    ),
    tag = "burn-plan"
)]
/// Create Burn Plan
///
/// Forwards the request to the agent runtime under a fresh session id and
/// relays its analysis. The body may be flat or wrapped in `config`.
async fn create_burn_plan(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<BurnPlanEnvelope>, ApiError> {
    let request = parse_burn_plan_request(&body)?;
    let parameters = burn_plan_parameters(request)?;

    let agent = state.agent.as_ref().ok_or_else(|| BurnerError::NotConfigured {
        setting: "AGENTCORE_AGENT_RUNTIME_ARN".to_string(),
    })?;

    let invocation = AgentInvocation::new(parameters.payload());
    tracing::info!(
        session_id = %invocation.session_id,
        amount = %parameters.amount,
        timeline = parameters.timeline,
        stupidity = %parameters.stupidity,
        "invoking agent runtime"
    );
    let analysis = agent.invoke(invocation).await.map_err(|err| {
        let retry_after = match &err {
            AgentRuntimeError::RateLimited { retry_after } => *retry_after,
            _ => None,
        };
        tracing::error!(error = %err, retry_after_secs = ?retry_after, "agent invocation failed");
        BurnerError::Agent {
            message: err.to_string(),
            retry_after,
        }
    })?;

    match BurnPlanAnalysis::from_agent_response(&analysis) {
        Some(plan) => {
            state.recent.record(&plan).await;
        }
        None => tracing::debug!("agent response is not a burn plan analysis; not recorded"),
    }

    Ok(Json(BurnPlanEnvelope {
        status: "success".to_string(),
        analysis,
    }))
}

#[utoipa::path(
    get,
    path = "/burn-plan/recent",
    params(RecentPlansQuery),
    responses(
        (status = 200, description = "Recent plans, newest first", body = [RecentBurnPlan]),
        (status = 400, description = "Unreadable query string", body = ErrorEnvelope)
    ),
    tag = "burn-plan"
)]
/// Recent Burn Plans
async fn list_recent_plans(
    State(state): State<Arc<AppState>>,
    query: Result<Query<RecentPlansQuery>, QueryRejection>,
) -> Result<Json<Vec<RecentBurnPlan>>, ApiError> {
    let Query(query) = query.map_err(|rejection| BurnerError::InvalidRequest {
        message: rejection.body_text(),
    })?;
    let limit = query.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    Ok(Json(state.recent.latest(limit).await))
}

fn parse_burn_plan_request(body: &[u8]) -> Result<BurnPlanRequest, BurnerError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(BurnPlanRequest::default());
    }
    let value: Value = serde_json::from_slice(body).map_err(|err| BurnerError::InvalidRequest {
        message: format!("body is not valid JSON: {err}"),
    })?;
    BurnPlanRequest::from_body(value).map_err(|err| BurnerError::InvalidRequest {
        message: err.to_string(),
    })
}

/// Required fields must be present and non-empty; a zero timeline counts as
/// missing.
fn burn_plan_parameters(request: BurnPlanRequest) -> Result<BurnPlanParameters, BurnerError> {
    let amount = request.amount.filter(|amount| !amount.is_empty());
    let timeline = request.timeline.filter(|days| *days > 0);
    let stupidity = request
        .stupidity
        .filter(|stupidity| !stupidity.trim().is_empty());
    let (Some(amount), Some(timeline), Some(stupidity)) = (amount, timeline, stupidity) else {
        return Err(BurnerError::missing_burn_plan_fields());
    };
    Ok(BurnPlanParameters::new(amount, timeline, stupidity)
        .with_architecture(request.architecture)
        .with_burning_style(request.burning_style)
        .with_model_id(request.model_id))
}

fn extract_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, rest) = value.split_once(' ')?;
    match scheme.to_ascii_lowercase().as_str() {
        "bearer" | "token" => Some(rest.trim().to_string()),
        _ => None,
    }
}
