use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the live quiz backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::session::create_session,
        crate::routes::session::join_session,
        crate::routes::session::get_session,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::session::CreateSessionRequest,
            crate::dto::session::CreateSessionResponse,
            crate::dto::session::JoinSessionRequest,
            crate::dto::session::JoinSessionResponse,
            crate::dto::session::SessionInfo,
            crate::dto::session::ParticipantSummary,
            crate::dto::session::LeaderboardEntry,
            crate::dto::session::QuestionInput,
            crate::dto::session::QuestionPublic,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::ServerMessage,
            crate::dto::ws::AnswerRejectReason,
            crate::dao::models::QuestionKind,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "session", description = "Hosted session creation and join operations"),
        (name = "room", description = "WebSocket room protocol for live sessions"),
    )
)]
pub struct ApiDoc;
