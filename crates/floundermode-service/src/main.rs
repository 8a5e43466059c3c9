use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use floundermode_api::{ApiError, BackendConfig, DefinitionData, DictionaryApi, VoteRequest};
use floundermode_core::VoteType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

const OPENAPI_YAML: &str = include_str!("../../../openapi/openapi.yaml");

#[derive(Clone)]
struct ServiceState {
    api: DictionaryApi,
}

#[derive(Debug, Clone, Serialize)]
struct ListResponse<T>
where
    T: Serialize,
{
    success: bool,
    count: usize,
    data: Vec<T>,
}

#[derive(Debug, Clone, Serialize)]
struct ActionResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    #[serde(skip)]
    status: StatusCode,
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    fallback: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TermsQuery {
    slug: Option<String>,
    search: Option<String>,
    health: Option<String>,
}

#[derive(Debug, Parser)]
#[command(name = "floundermode-service")]
#[command(about = "HTTP proxy between the dictionary pages and the term backend")]
struct Args {
    #[arg(long, default_value = "127.0.0.1:4010")]
    bind: SocketAddr,
    /// Static terms directory served when the backend is unreachable.
    #[arg(long)]
    fallback: Option<PathBuf>,
    /// SQLite database for the local backend's votes and submissions.
    #[arg(long)]
    votes_db: Option<PathBuf>,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl ServiceError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            success: false,
            error: message.into(),
            fallback: status == StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<ApiError> for ServiceError {
    fn from(err: ApiError) -> Self {
        let status = match &err {
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Configuration(_)
            | ApiError::Upstream { .. }
            | ApiError::Timeout(_)
            | ApiError::Network(_)
            | ApiError::Decode(_)
            | ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %err, "request failed");
        }
        Self::new(status, err.to_string())
    }
}

fn list<T: Serialize>(data: Vec<T>) -> Json<ListResponse<T>> {
    Json(ListResponse { success: true, count: data.len(), data })
}

/// The client may sleep in the rate limiter, so calls leave the async executor.
async fn call_api<T, F>(state: &ServiceState, call: F) -> Result<T, ServiceError>
where
    T: Send + 'static,
    F: FnOnce(&DictionaryApi) -> Result<T, ApiError> + Send + 'static,
{
    let api = state.api.clone();
    tokio::task::spawn_blocking(move || call(&api))
        .await
        .map_err(|err| ServiceError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?
        .map_err(ServiceError::from)
}

fn app(state: ServiceState) -> Router {
    Router::new()
        .route(
            "/terms",
            get(terms_get).post(terms_post).options(preflight).fallback(method_not_allowed),
        )
        .route("/openapi", get(openapi))
        .layer(axum::middleware::map_response(allow_any_origin))
        .with_state(state)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let config = BackendConfig::from_env()?;
    let api = DictionaryApi::from_config(&config, args.fallback.as_deref(), args.votes_db.as_deref())?;
    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    tracing::info!(bind = %args.bind, backend = api.client().backend_name(), "listening");
    axum::serve(listener, app(ServiceState { api })).await?;
    Ok(())
}

async fn allow_any_origin(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert("access-control-allow-methods", HeaderValue::from_static("GET, POST, OPTIONS"));
    headers.insert("access-control-allow-headers", HeaderValue::from_static("Content-Type"));
    response
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn method_not_allowed(method: Method) -> ServiceError {
    ServiceError::new(StatusCode::METHOD_NOT_ALLOWED, format!("method {method} not allowed"))
}

async fn openapi() -> impl IntoResponse {
    (StatusCode::OK, [("content-type", "application/yaml; charset=utf-8")], OPENAPI_YAML)
}

async fn terms_get(
    State(state): State<ServiceState>,
    Query(query): Query<TermsQuery>,
) -> Result<Response, ServiceError> {
    if query.health.as_deref() == Some("true") {
        let report = call_api(&state, |api| Ok(api.health())).await?;
        return Ok(Json(report).into_response());
    }
    if let Some(slug) = query.slug.filter(|slug| !slug.trim().is_empty()) {
        let definitions = call_api(&state, move |api| api.definitions(&slug)).await?;
        return Ok(list(definitions).into_response());
    }
    if let Some(search) = query.search {
        let results = call_api(&state, move |api| api.search(&search)).await?;
        return Ok(list(results).into_response());
    }
    let terms = call_api(&state, DictionaryApi::list_terms).await?;
    Ok(list(terms).into_response())
}

fn required_str<'a>(body: &'a Value, field: &str) -> Result<&'a str, ServiceError> {
    body.get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ServiceError::bad_request(format!("missing required field: {field}")))
}

async fn terms_post(
    State(state): State<ServiceState>,
    body: Bytes,
) -> Result<Json<ActionResponse>, ServiceError> {
    let body: Value = serde_json::from_slice(&body)
        .map_err(|err| ServiceError::bad_request(format!("invalid JSON body: {err}")))?;

    match required_str(&body, "action")? {
        "vote" => {
            let vote_type = VoteType::parse(required_str(&body, "voteType")?)
                .map_err(|err| ServiceError::bad_request(err.to_string()))?;
            let request = VoteRequest {
                definition_id: required_str(&body, "definitionId")?.to_string(),
                vote_type,
                user_id: required_str(&body, "userId")?.to_string(),
            };
            let transition = call_api(&state, move |api| api.vote(&request)).await?;
            tracing::debug!(delta = transition.delta, "vote recorded");
            Ok(Json(ActionResponse { success: true, id: None }))
        }
        "submit_definition" => {
            let term_name = required_str(&body, "termName")?.to_string();
            let data = body
                .get("definitionData")
                .cloned()
                .ok_or_else(|| ServiceError::bad_request("missing required field: definitionData"))?;
            let data: DefinitionData = serde_json::from_value(data)
                .map_err(|err| ServiceError::bad_request(format!("invalid definitionData: {err}")))?;
            let receipt =
                call_api(&state, move |api| api.submit_definition(&term_name, &data)).await?;
            Ok(Json(ActionResponse { success: true, id: Some(receipt.id) }))
        }
        other => Err(ServiceError::bad_request(format!("unknown action: {other}"))),
    }
}
