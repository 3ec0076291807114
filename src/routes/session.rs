use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::session::{
        CreateSessionRequest, CreateSessionResponse, JoinSessionRequest, JoinSessionResponse,
        SessionInfo,
    },
    error::AppError,
    services::session_service,
    state::SharedState,
};

/// Routes handling hosted session bootstrap operations.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/join", post(join_session))
        .route("/sessions/{code}", get(get_session))
}

/// Create a hosted session and return its public join code.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "session",
    request_body = CreateSessionRequest,
    responses(
        (status = 200, description = "Session created", body = CreateSessionResponse),
        (status = 500, description = "No unique session code could be generated")
    )
)]
pub async fn create_session(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateSessionRequest>>,
) -> Result<Json<CreateSessionResponse>, AppError> {
    let created = session_service::create_session(&state, payload).await?;
    Ok(Json(created))
}

/// Join (or rejoin) a session by its public code.
#[utoipa::path(
    post,
    path = "/sessions/join",
    tag = "session",
    request_body = JoinSessionRequest,
    responses(
        (status = 200, description = "Joined the session", body = JoinSessionResponse),
        (status = 404, description = "Invalid session code or session has ended"),
        (status = 409, description = "Session is full")
    )
)]
pub async fn join_session(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<JoinSessionRequest>>,
) -> Result<Json<JoinSessionResponse>, AppError> {
    let joined = session_service::join_session(&state, payload).await?;
    Ok(Json(joined))
}

/// Resolve a session code into its public metadata.
#[utoipa::path(
    get,
    path = "/sessions/{code}",
    tag = "session",
    params(("code" = String, Path, description = "Public 6-digit session code")),
    responses(
        (status = 200, description = "Session metadata", body = SessionInfo),
        (status = 404, description = "Invalid session code or session has ended")
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<SessionInfo>, AppError> {
    let info = session_service::get_session(&state, &code).await?;
    Ok(Json(info))
}
