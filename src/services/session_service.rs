//! Session creation and join boundary consumed by the REST routes.

use std::time::SystemTime;

use rand::Rng;
use tracing::info;
use uuid::Uuid;

use crate::{
    dao::models::{HostedSessionEntity, ParticipantEntity},
    dto::session::{
        CreateSessionRequest, CreateSessionResponse, JoinSessionRequest, JoinSessionResponse,
        SessionInfo,
    },
    dto::format_system_time,
    error::ServiceError,
    state::SharedState,
};

/// Create a hosted session, allocating a unique 6-digit code and seeding the
/// question bank with the host's question list.
pub async fn create_session(
    state: &SharedState,
    request: CreateSessionRequest,
) -> Result<CreateSessionResponse, ServiceError> {
    let storage = state.require_storage().await?;

    if request.session_name.trim().is_empty() {
        return Err(ServiceError::InvalidInput(
            "session name must not be empty".into(),
        ));
    }

    let code = generate_unique_code(state).await?;

    let questions: Vec<_> = request
        .questions
        .into_iter()
        .map(|input| input.into_entity())
        .collect();
    let question_ids: Vec<Uuid> = questions.iter().map(|q| q.id).collect();
    storage.questions.insert_questions(questions).await?;

    let session = HostedSessionEntity {
        id: Uuid::new_v4(),
        code: code.clone(),
        owner_id: request.owner_id,
        name: request.session_name,
        max_participants: request
            .max_participants
            .unwrap_or_else(|| state.config().default_max_participants()),
        category_id: request.category_id,
        is_active: true,
        current_question_index: 0,
        question_ids,
        created_at: SystemTime::now(),
        started_at: None,
        ended_at: None,
    };
    storage.sessions.save_session(session.clone()).await?;

    info!(code = %session.code, session_id = %session.id, "hosted session created");

    Ok(CreateSessionResponse {
        id: session.id,
        session_name: session.name,
        session_code: session.code,
        max_participants: session.max_participants,
        question_count: session.question_ids.len(),
        created_at: format_system_time(session.created_at),
    })
}

/// Join (or rejoin) a session by its public code.
///
/// Identity resolution matches the authenticated `user_id` first and falls
/// back to the display name for anonymous players. A match reuses the
/// existing participant record: the connection flag flips, the score stays.
pub async fn join_session(
    state: &SharedState,
    request: JoinSessionRequest,
) -> Result<JoinSessionResponse, ServiceError> {
    let storage = state.require_storage().await?;

    let session = find_active_session(state, &request.session_code).await?;

    let roster = storage.sessions.list_participants(session.id).await?;
    let existing = roster.iter().find(|p| match request.user_id {
        Some(user_id) => p.user_id == Some(user_id),
        None => p.display_name == request.participant_name,
    });

    if let Some(participant) = existing {
        let mut rejoined = participant.clone();
        rejoined.is_connected = true;
        // Keep the record current in case the display name changed.
        rejoined.display_name = request.participant_name;
        storage.sessions.save_participant(rejoined.clone()).await?;

        info!(
            code = %session.code,
            participant_id = %rejoined.id,
            "participant rejoined"
        );

        return Ok(JoinSessionResponse {
            participant_id: rejoined.id,
            session_name: session.name,
            current_score: rejoined.score,
            rejoined: true,
        });
    }

    if roster.len() as u32 >= session.max_participants {
        return Err(ServiceError::SessionFull {
            max: session.max_participants,
        });
    }

    let participant = ParticipantEntity {
        id: Uuid::new_v4(),
        session_id: session.id,
        user_id: request.user_id,
        display_name: request.participant_name,
        score: 0,
        is_connected: true,
        joined_at: SystemTime::now(),
    };
    storage.sessions.save_participant(participant.clone()).await?;

    info!(
        code = %session.code,
        participant_id = %participant.id,
        "participant joined"
    );

    Ok(JoinSessionResponse {
        participant_id: participant.id,
        session_name: session.name,
        current_score: 0,
        rejoined: false,
    })
}

/// Resolve a session code into its public metadata. Only active sessions
/// resolve; ended or unknown codes report not-found.
pub async fn get_session(state: &SharedState, code: &str) -> Result<SessionInfo, ServiceError> {
    let session = find_active_session(state, code).await?;
    Ok(session.into())
}

/// Fetch a session by code, requiring it to still be active.
pub async fn find_active_session(
    state: &SharedState,
    code: &str,
) -> Result<HostedSessionEntity, ServiceError> {
    let storage = state.require_storage().await?;
    let session = storage
        .sessions
        .find_session_by_code(code.to_owned())
        .await?;

    match session {
        Some(session) if session.is_active => Ok(session),
        _ => Err(ServiceError::NotFound(
            "invalid session code or session has ended".into(),
        )),
    }
}

/// Draw random codes until one is free, bounded by the configured attempt
/// count. Exhaustion fails the create operation; it affects nothing else.
async fn generate_unique_code(state: &SharedState) -> Result<String, ServiceError> {
    let storage = state.require_storage().await?;
    let attempts = state.config().session_code_attempts();

    for _ in 0..attempts {
        let code = {
            let mut rng = rand::rng();
            rng.random_range(100_000..=999_999).to_string()
        };

        if storage
            .sessions
            .find_session_by_code(code.clone())
            .await?
            .is_none()
        {
            return Ok(code);
        }
    }

    Err(ServiceError::CodeGenerationExhausted { attempts })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{models::QuestionKind, session_store::memory::MemoryStore},
        dto::session::QuestionInput,
        state::{AppState, Storage},
    };

    async fn test_state() -> SharedState {
        let state = AppState::new(AppConfig::default());
        let store = MemoryStore::new();
        state
            .install_storage(Storage {
                sessions: Arc::new(store.clone()),
                questions: Arc::new(store),
            })
            .await;
        state
    }

    fn create_request(max_participants: Option<u32>) -> CreateSessionRequest {
        CreateSessionRequest {
            owner_id: Uuid::new_v4(),
            session_name: "Friday music night".into(),
            max_participants,
            category_id: None,
            questions: vec![QuestionInput {
                kind: QuestionKind::MultipleChoice,
                prompt: "Which band recorded Bohemian Rhapsody?".into(),
                options: vec!["Queen".into(), "The Beatles".into()],
                audio_url: None,
                correct_answer: "Queen".into(),
                explanation: None,
                points: 10,
                time_limit_secs: 30,
            }],
        }
    }

    fn join_request(code: &str, name: &str) -> JoinSessionRequest {
        JoinSessionRequest {
            session_code: code.into(),
            participant_name: name.into(),
            user_id: None,
        }
    }

    #[tokio::test]
    async fn created_session_gets_a_six_digit_code() {
        let state = test_state().await;
        let created = create_session(&state, create_request(None)).await.unwrap();

        assert_eq!(created.session_code.len(), 6);
        assert!(created.session_code.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(created.max_participants, 50);
        assert_eq!(created.question_count, 1);

        let info = get_session(&state, &created.session_code).await.unwrap();
        assert_eq!(info.session_code, created.session_code);
        assert!(info.is_active);
    }

    #[tokio::test]
    async fn rejoin_by_name_reuses_the_participant_record() {
        let state = test_state().await;
        let created = create_session(&state, create_request(None)).await.unwrap();

        let first = join_session(&state, join_request(&created.session_code, "Alex"))
            .await
            .unwrap();
        assert!(!first.rejoined);

        let second = join_session(&state, join_request(&created.session_code, "Alex"))
            .await
            .unwrap();
        assert!(second.rejoined);
        assert_eq!(second.participant_id, first.participant_id);
        assert_eq!(second.current_score, first.current_score);
    }

    #[tokio::test]
    async fn rejoin_by_identity_wins_over_display_name() {
        let state = test_state().await;
        let created = create_session(&state, create_request(None)).await.unwrap();
        let user_id = Uuid::new_v4();

        let mut request = join_request(&created.session_code, "Alex");
        request.user_id = Some(user_id);
        let first = join_session(&state, request).await.unwrap();

        // Same identity, new display name: still the same record.
        let mut request = join_request(&created.session_code, "Alexandra");
        request.user_id = Some(user_id);
        let second = join_session(&state, request).await.unwrap();
        assert!(second.rejoined);
        assert_eq!(second.participant_id, first.participant_id);
    }

    #[tokio::test]
    async fn full_session_rejects_new_participants_but_allows_rejoin() {
        let state = test_state().await;
        let created = create_session(&state, create_request(Some(1))).await.unwrap();

        join_session(&state, join_request(&created.session_code, "Alex"))
            .await
            .unwrap();

        let err = join_session(&state, join_request(&created.session_code, "Sam"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::SessionFull { max: 1 }));

        // The existing participant still gets back in at capacity.
        let rejoined = join_session(&state, join_request(&created.session_code, "Alex"))
            .await
            .unwrap();
        assert!(rejoined.rejoined);
    }

    #[tokio::test]
    async fn unknown_code_reports_not_found() {
        let state = test_state().await;
        let err = join_session(&state, join_request("000000", "Alex"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
