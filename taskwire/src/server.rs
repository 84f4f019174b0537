//! Gateway router: the authenticated HTTP + WebSocket surface.
//!
//! Every inbound unit of work passes credential verification before it can
//! reach the engine or the subscription sessions; verified claims travel in
//! request extensions, never trusted from the client. A per-identity
//! request ceiling is applied after authentication, independent of the
//! business logic behind it.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{FromRequestParts, Path, Query, State, WebSocketUpgrade},
    http::{Request, StatusCode, header, request::Parts},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use uuid::Uuid;

use taskwire_proto::error::ErrorKind;
use taskwire_proto::notification::{Notification, NotificationId};
use taskwire_proto::task::{CreateTaskInput, Task, TaskFilter, TaskId, TaskPatch};

use crate::auth::{Claims, TokenVerifier, bearer_token};
use crate::bus::EventBus;
use crate::engine::{TaskEngine, TaskError};
use crate::ratelimit::RateLimiter;
use crate::sessions;

/// Shared state for the gateway router.
#[derive(Clone)]
pub struct AppState {
    /// The task mutation engine.
    pub engine: Arc<TaskEngine>,
    /// The event bus, handed to subscription sessions.
    pub bus: Arc<EventBus>,
    /// Startup-loaded credential verifier.
    pub verifier: Arc<TokenVerifier>,
    /// Per-identity request ceiling.
    pub limiter: RateLimiter,
}

/// A user-visible error: stable kind plus human-readable message.
#[derive(Debug)]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
}

impl ApiError {
    /// Creates an error from a kind and message.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

/// Maps an error kind to its HTTP status.
#[must_use]
pub const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidInput => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorKind,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.kind);
        let body = ErrorBody {
            error: self.kind,
            message: self.message,
        };
        (status, Json(body)).into_response()
    }
}

/// Extractor for the verified claims injected by the auth middleware.
impl<S> FromRequestParts<S> for Claims
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Self>().cloned().ok_or_else(|| {
            ApiError::new(ErrorKind::Unauthenticated, "missing authentication context")
        })
    }
}

/// Pulls the bearer token out of a request: the `Authorization` header,
/// with a `token` query parameter fallback for WebSocket upgrades
/// (browsers cannot set headers on those).
fn token_from_request(request: &Request<Body>) -> Option<String> {
    if let Some(header_value) = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        && let Some(token) = bearer_token(header_value)
    {
        return Some(token.to_string());
    }
    token_from_query(request.uri().query().unwrap_or_default())
}

/// Finds a `token=` pair in a raw query string. JWTs are URL-safe, so no
/// percent-decoding is needed.
fn token_from_query(query: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        pair.strip_prefix("token=")
            .filter(|t| !t.is_empty())
            .map(String::from)
    })
}

/// Authentication middleware: verify the bearer token and attach the
/// decoded claims to the request.
async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = token_from_request(&request) else {
        tracing::debug!(path = %request.uri().path(), "request without bearer token");
        return ApiError::new(ErrorKind::Unauthenticated, "missing bearer token")
            .into_response();
    };

    match state.verifier.verify(&token) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!(path = %request.uri().path(), error = %e, "token rejected");
            ApiError::new(e.kind(), e.to_string()).into_response()
        }
    }
}

/// Rate-limit middleware: one fixed-window bucket per verified identity.
/// Runs after authentication so the bucket key is the token subject.
async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let identity = request
        .extensions()
        .get::<Claims>()
        .map_or_else(|| "anonymous".to_string(), |claims| claims.sub.clone());

    if !state.limiter.check(&identity) {
        tracing::warn!(identity = %identity, "request ceiling exceeded");
        return ApiError::new(ErrorKind::RateLimited, "request ceiling exceeded")
            .into_response();
    }
    next.run(request).await
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

async fn healthz() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn list_tasks(
    State(state): State<AppState>,
    Query(filter): Query<TaskFilter>,
) -> Json<Vec<Task>> {
    Json(state.engine.list_tasks(&filter).await)
}

async fn create_task(
    State(state): State<AppState>,
    claims: Claims,
    Json(input): Json<CreateTaskInput>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let task = state.engine.create_task(input, &claims.sub).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, ApiError> {
    let id = TaskId::from_uuid(id);
    state
        .engine
        .get_task(id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::new(ErrorKind::NotFound, format!("task not found: {id}")))
}

async fn update_task(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<Uuid>,
    Json(patch): Json<TaskPatch>,
) -> Result<Json<Task>, ApiError> {
    let task = state
        .engine
        .update_task(TaskId::from_uuid(id), patch, &claims.sub)
        .await?;
    Ok(Json(task))
}

#[derive(Serialize)]
struct DeleteOutcome {
    deleted: bool,
}

async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Json<DeleteOutcome> {
    let deleted = state.engine.delete_task(TaskId::from_uuid(id)).await;
    Json(DeleteOutcome { deleted })
}

async fn list_notifications(
    State(state): State<AppState>,
    claims: Claims,
) -> Json<Vec<Notification>> {
    Json(state.engine.list_notifications(&claims.sub).await)
}

#[derive(Serialize)]
struct ReadOutcome {
    updated: bool,
}

async fn mark_notification_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Json<ReadOutcome> {
    let updated = state
        .engine
        .mark_notification_read(NotificationId::from_uuid(id))
        .await;
    Json(ReadOutcome { updated })
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    claims: Claims,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| sessions::handle_socket(socket, claims, state.bus))
}

// ---------------------------------------------------------------------------
// Router assembly and startup
// ---------------------------------------------------------------------------

/// Builds the gateway router over the given state.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/{id}",
            get(get_task).patch(update_task).delete(delete_task),
        )
        .route("/notifications", get(list_notifications))
        .route("/notifications/{id}/read", post(mark_notification_read))
        .route("/ws", get(ws_handler))
        // Layer order: auth runs first (outermost), then the rate limiter.
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/healthz", get(healthz))
        .merge(protected)
        .with_state(state)
}

/// Starts the gateway server on the given address and returns the bound
/// address and a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
    state: AppState,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "gateway server error");
        }
    });

    Ok((bound_addr, handle))
}
