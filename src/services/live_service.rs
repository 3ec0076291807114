//! Command handlers for live rooms: host controls, participant answers,
//! snapshot pushes, and the per-question auto-reveal timer.
//!
//! Every handler locks the target room's command gate for its full duration,
//! so transitions, store writes and broadcasts of one room are totally
//! ordered while distinct rooms proceed in parallel.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::time::sleep;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dao::{
        models::{AnswerRecordEntity, QuestionEntity},
        session_store::AnswerWriteOutcome,
    },
    dto::{
        session::QuestionPublic,
        unix_millis,
        ws::{AnswerRejectReason, ServerMessage},
    },
    error::ServiceError,
    services::{scoring, session_service},
    state::{
        QuestionPhase, QuestionRuntime, RevealTimer, RevealTrigger, Room, RoomConnection,
        SessionEvent, SessionPhase, SharedState,
    },
};

/// Subscribe a connection to a session's room and push the roster snapshot.
///
/// Joining twice is a no-op on membership but re-triggers the snapshot, so a
/// reconnecting client is consistent without waiting for the next broadcast.
pub async fn join_room(
    state: &SharedState,
    code: &str,
    connection: RoomConnection,
) -> Result<(), ServiceError> {
    let room = state.registry().room(code);
    let _gate = room.lock_commands().await;

    let connection_id = connection.id;
    room.join(connection);
    room.send_to(
        connection_id,
        &ServerMessage::JoinedSession {
            session_code: code.to_owned(),
        },
    );

    // Point-to-point roster snapshot when the store already knows the session.
    let Some(storage) = state.storage().await else {
        return Ok(());
    };
    let Some(session) = storage.sessions.find_session_by_code(code.to_owned()).await? else {
        return Ok(());
    };
    let participants = storage.sessions.list_participants(session.id).await?;
    room.send_to(
        connection_id,
        &ServerMessage::SessionParticipants {
            participants: participants.into_iter().map(Into::into).collect(),
        },
    );

    Ok(())
}

/// Remove a connection from the room. Transport-level only: the durable
/// connection flag changes through [`participant_leave`] instead.
pub async fn leave_room(state: &SharedState, code: &str, connection_id: Uuid) {
    let Some(room) = state.registry().get(code) else {
        return;
    };
    room.leave(connection_id);
    collect_room(state, &room).await;
}

/// Mark a participant connected and announce them to the room.
pub async fn participant_join(
    state: &SharedState,
    code: &str,
    participant_id: Uuid,
    participant_name: String,
) -> Result<(), ServiceError> {
    let room = state.registry().room(code);
    let _gate = room.lock_commands().await;

    let storage = state.require_storage().await?;
    let session = session_service::find_active_session(state, code).await?;

    let Some(participant) = storage
        .sessions
        .find_participant(session.id, participant_id)
        .await?
    else {
        return Err(ServiceError::NotFound(format!(
            "participant `{participant_id}` has not joined session `{code}`"
        )));
    };

    let mut updated = participant;
    updated.is_connected = true;
    storage.sessions.save_participant(updated).await?;

    room.broadcast(&ServerMessage::ParticipantJoined {
        participant_id,
        participant_name,
        timestamp: unix_millis(SystemTime::now()),
    });

    Ok(())
}

/// Mark a participant disconnected and announce their departure.
pub async fn participant_leave(
    state: &SharedState,
    code: &str,
    participant_id: Uuid,
    participant_name: String,
) -> Result<(), ServiceError> {
    let room = state.registry().room(code);
    let _gate = room.lock_commands().await;

    let storage = state.require_storage().await?;
    // A leave may arrive after the session ended; resolve without the
    // active-only filter so the flag still lands.
    let Some(session) = storage.sessions.find_session_by_code(code.to_owned()).await? else {
        return Err(ServiceError::NotFound(format!("session `{code}` not found")));
    };

    if let Some(participant) = storage
        .sessions
        .find_participant(session.id, participant_id)
        .await?
    {
        let mut updated = participant;
        updated.is_connected = false;
        storage.sessions.save_participant(updated).await?;
    }

    room.broadcast(&ServerMessage::ParticipantLeft {
        participant_id,
        participant_name,
        timestamp: unix_millis(SystemTime::now()),
    });

    Ok(())
}

/// Start the live run: stamp the session, announce it, and when a question
/// list is configured put question 0 live immediately.
pub async fn start_session(
    state: &SharedState,
    code: &str,
    session_name: String,
) -> Result<(), ServiceError> {
    let room = state.registry().room(code);
    let _gate = room.lock_commands().await;

    let storage = state.require_storage().await?;
    let session = session_service::find_active_session(state, code).await?;
    let has_questions = !session.question_ids.is_empty();
    let first_question_id = session.question_ids.first().copied();

    let (first_question, _next) = room
        .run_transition(SessionEvent::Start { has_questions }, || {
            let storage = storage.clone();
            let mut session = session.clone();
            async move {
                let question = match first_question_id {
                    Some(id) => Some(storage.questions.find_question(id).await?.ok_or_else(
                        || ServiceError::NotFound(format!("question `{id}` not found")),
                    )?),
                    None => None,
                };
                session.started_at = Some(SystemTime::now());
                session.current_question_index = 0;
                storage.sessions.save_session(session).await?;
                Ok(question)
            }
        })
        .await?;

    info!(code, "session started");
    room.broadcast(&ServerMessage::SessionStarted {
        session_code: code.to_owned(),
        session_name,
    });

    if let Some(question) = first_question {
        begin_question(state, &room, 0, question).await;
    }

    Ok(())
}

/// Advance to the next configured question after a reveal or leaderboard.
pub async fn advance_question(state: &SharedState, code: &str) -> Result<(), ServiceError> {
    let room = state.registry().room(code);
    let _gate = room.lock_commands().await;

    let storage = state.require_storage().await?;
    let session = session_service::find_active_session(state, code).await?;

    if !session.has_next_question() {
        return Err(ServiceError::InvalidState(
            "no next question to advance to".into(),
        ));
    }
    let next_index = session.current_question_index + 1;
    let question_id = session.question_ids[next_index];

    let (question, _next) = room
        .run_transition(SessionEvent::AdvanceQuestion, || {
            let storage = storage.clone();
            let mut session = session.clone();
            async move {
                let question = storage
                    .questions
                    .find_question(question_id)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("question `{question_id}` not found"))
                    })?;
                session.current_question_index = next_index;
                storage.sessions.save_session(session).await?;
                Ok(question)
            }
        })
        .await?;

    room.cancel_reveal_timer().await;
    begin_question(state, &room, next_index, question).await;

    Ok(())
}

/// Close answer collection and expose the correct answer to the whole room.
///
/// `expected_index` is set by the auto-reveal timer; when the room has moved
/// past that question the call is a no-op so a stale timer can never close a
/// later question. Participants who never answered are finalized with a
/// zero-point record before the broadcast, so scoring is settled for
/// everyone, not just respondents.
pub async fn reveal_results(
    state: &SharedState,
    code: &str,
    trigger: RevealTrigger,
    expected_index: Option<usize>,
) -> Result<(), ServiceError> {
    let room = state.registry().room(code);
    let _gate = room.lock_commands().await;

    let Some(runtime) = room.question_runtime().await else {
        return match trigger {
            RevealTrigger::Timeout => Ok(()),
            RevealTrigger::Host => Err(ServiceError::InvalidState("no question is live".into())),
        };
    };
    if let Some(expected) = expected_index
        && runtime.index != expected
    {
        return Ok(());
    }

    let storage = state.require_storage().await?;
    let session = session_service::find_active_session(state, code).await?;

    let (finalized, _next) = room
        .run_transition(SessionEvent::Reveal(trigger), || {
            let storage = storage.clone();
            let runtime = runtime.clone();
            let session_id = session.id;
            async move {
                let roster = storage.sessions.list_participants(session_id).await?;
                let mut finalized = Vec::new();
                for participant in roster {
                    if runtime.answered.contains(&participant.id) {
                        continue;
                    }
                    storage
                        .sessions
                        .record_answer(AnswerRecordEntity {
                            id: Uuid::new_v4(),
                            session_id,
                            participant_id: participant.id,
                            question_id: runtime.question.id,
                            submitted_answer: String::new(),
                            is_correct: false,
                            points_earned: 0,
                            answered_at: SystemTime::now(),
                        })
                        .await?;
                    finalized.push(participant.id);
                }
                Ok(finalized)
            }
        })
        .await?;

    for participant_id in finalized {
        room.mark_answered(participant_id).await;
    }
    match trigger {
        RevealTrigger::Host => room.cancel_reveal_timer().await,
        RevealTrigger::Timeout => room.clear_reveal_timer().await,
    }

    room.broadcast(&ServerMessage::QuestionResults {
        correct_answer: runtime.question.correct_answer.clone(),
        explanation: runtime.question.explanation.clone(),
    });

    Ok(())
}

/// Compute the ranked standings from the store and broadcast them.
pub async fn show_leaderboard(state: &SharedState, code: &str) -> Result<(), ServiceError> {
    let room = state.registry().room(code);
    let _gate = room.lock_commands().await;

    let storage = state.require_storage().await?;
    let session = session_service::find_active_session(state, code).await?;

    let (roster, _next) = room
        .run_transition(SessionEvent::ShowLeaderboard, || {
            let storage = storage.clone();
            let session_id = session.id;
            async move { Ok(storage.sessions.list_participants(session_id).await?) }
        })
        .await?;

    room.broadcast(&ServerMessage::LeaderboardUpdated {
        leaderboard: scoring::rank(&roster),
    });

    Ok(())
}

/// Terminate the session. Terminal: the `session-ended` broadcast happens at
/// most once, and later commands fail against the ended state machine.
pub async fn end_session(state: &SharedState, code: &str) -> Result<(), ServiceError> {
    let room = state.registry().room(code);
    let _gate = room.lock_commands().await;

    let storage = state.require_storage().await?;
    let session = session_service::find_active_session(state, code).await?;

    room.run_transition(SessionEvent::End, || {
        let storage = storage.clone();
        let mut session = session.clone();
        async move {
            session.is_active = false;
            session.ended_at = Some(SystemTime::now());
            storage.sessions.save_session(session).await?;
            Ok(())
        }
    })
    .await?;

    room.cancel_reveal_timer().await;
    info!(code, "session ended");
    room.broadcast(&ServerMessage::SessionEnded {
        session_code: code.to_owned(),
    });

    Ok(())
}

/// Score and persist a participant's answer, relay it to the rest of the
/// room, and acknowledge the submitter either way.
///
/// Submissions outside the collecting phase, for the wrong question, or
/// repeated for an already-answered question are acknowledged as rejected
/// with a machine-readable reason instead of being silently dropped.
pub async fn submit_answer(
    state: &SharedState,
    code: &str,
    connection_id: Uuid,
    participant_id: Uuid,
    question_id: Uuid,
    answer: String,
) -> Result<(), ServiceError> {
    let room = state.registry().room(code);
    let _gate = room.lock_commands().await;

    match room.phase().await {
        SessionPhase::Active(QuestionPhase::Collecting) => {}
        SessionPhase::Ended => {
            room.send_to(
                connection_id,
                &ServerMessage::answer_rejected(question_id, AnswerRejectReason::SessionEnded),
            );
            return Ok(());
        }
        _ => {
            room.send_to(
                connection_id,
                &ServerMessage::answer_rejected(question_id, AnswerRejectReason::Late),
            );
            return Ok(());
        }
    }

    let Some(runtime) = room.question_runtime().await else {
        room.send_to(
            connection_id,
            &ServerMessage::answer_rejected(question_id, AnswerRejectReason::Late),
        );
        return Ok(());
    };
    if runtime.question.id != question_id {
        room.send_to(
            connection_id,
            &ServerMessage::answer_rejected(question_id, AnswerRejectReason::QuestionMismatch),
        );
        return Ok(());
    }
    if runtime.answered.contains(&participant_id) {
        room.send_to(
            connection_id,
            &ServerMessage::answer_rejected(question_id, AnswerRejectReason::Duplicate),
        );
        return Ok(());
    }

    let storage = state.require_storage().await?;
    let session = session_service::find_active_session(state, code).await?;
    if storage
        .sessions
        .find_participant(session.id, participant_id)
        .await?
        .is_none()
    {
        return Err(ServiceError::NotFound(format!(
            "participant `{participant_id}` has not joined session `{code}`"
        )));
    }

    let scored = scoring::score_answer(&runtime.question, &answer);
    let outcome = storage
        .sessions
        .record_answer(AnswerRecordEntity {
            id: Uuid::new_v4(),
            session_id: session.id,
            participant_id,
            question_id,
            submitted_answer: answer.clone(),
            is_correct: scored.is_correct,
            points_earned: scored.points_earned,
            answered_at: SystemTime::now(),
        })
        .await?;

    // The store is the authority on the one-answer invariant; whatever it
    // decided, the room's answered set follows.
    room.mark_answered(participant_id).await;

    if outcome == AnswerWriteOutcome::Duplicate {
        room.send_to(
            connection_id,
            &ServerMessage::answer_rejected(question_id, AnswerRejectReason::Duplicate),
        );
        return Ok(());
    }

    room.relay(
        connection_id,
        &ServerMessage::ParticipantAnswered {
            participant_id,
            question_id,
            answer,
            is_correct: scored.is_correct,
            points_earned: scored.points_earned,
            timestamp: unix_millis(SystemTime::now()),
        },
    );
    room.send_to(
        connection_id,
        &ServerMessage::answer_accepted(question_id, scored.is_correct, scored.points_earned),
    );

    Ok(())
}

/// Put a question live: replace the runtime, broadcast it (without the
/// correct answer), and arm the auto-reveal countdown.
async fn begin_question(
    state: &SharedState,
    room: &Arc<Room>,
    index: usize,
    question: QuestionEntity,
) {
    let started_at_ms = unix_millis(SystemTime::now());
    let time_limit = question.time_limit_secs;
    let public = QuestionPublic::from(&question);

    room.set_question(QuestionRuntime::new(index, question, started_at_ms))
        .await;
    room.broadcast(&ServerMessage::QuestionStarted {
        question: public,
        time_limit,
        start_time: started_at_ms,
    });
    arm_auto_reveal(state, room, index, Duration::from_secs(time_limit)).await;
}

/// Schedule the timeout reveal for the question at `index`. The task re-checks
/// the live index under the room gate before acting, so a countdown that lost
/// the race against an explicit reveal or an advance is inert.
async fn arm_auto_reveal(state: &SharedState, room: &Arc<Room>, index: usize, after: Duration) {
    let task_state = state.clone();
    let code = room.code().to_owned();
    let handle = tokio::spawn(async move {
        sleep(after).await;
        if let Err(err) =
            reveal_results(&task_state, &code, RevealTrigger::Timeout, Some(index)).await
        {
            debug!(code = %code, question_index = index, error = %err, "auto-reveal skipped");
        }
    });

    room.arm_reveal_timer(RevealTimer {
        question_index: index,
        handle,
    })
    .await;
}

/// Drop the room once it is empty and its session is gone or ended.
async fn collect_room(state: &SharedState, room: &Arc<Room>) {
    if !room.is_empty() {
        return;
    }

    let ended = match state.storage().await {
        Some(storage) => match storage
            .sessions
            .find_session_by_code(room.code().to_owned())
            .await
        {
            Ok(Some(session)) => !session.is_active,
            Ok(None) => true,
            Err(_) => false,
        },
        None => false,
    };

    if ended {
        room.cancel_reveal_timer().await;
        state.registry().remove_if_empty(room.code());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::ws::Message;
    use serde_json::Value;
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{models::QuestionKind, session_store::memory::MemoryStore},
        dto::session::{CreateSessionRequest, JoinSessionRequest, QuestionInput},
        state::{AppState, Storage},
    };

    fn question(prompt: &str, correct: &str, points: u32, time_limit_secs: u64) -> QuestionInput {
        QuestionInput {
            kind: QuestionKind::MultipleChoice,
            prompt: prompt.into(),
            options: vec![correct.into(), "Other".into()],
            audio_url: None,
            correct_answer: correct.into(),
            explanation: Some("Trivia night classic.".into()),
            points,
            time_limit_secs,
        }
    }

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

    async fn create_session_with_questions(
        state: &SharedState,
        questions: Vec<QuestionInput>,
    ) -> String {
        crate::services::session_service::create_session(
            state,
            CreateSessionRequest {
                owner_id: Uuid::new_v4(),
                session_name: "Live test".into(),
                max_participants: None,
                category_id: None,
                questions,
            },
        )
        .await
        .unwrap()
        .session_code
    }

    async fn join_participant(state: &SharedState, code: &str, name: &str) -> Uuid {
        crate::services::session_service::join_session(
            state,
            JoinSessionRequest {
                session_code: code.into(),
                participant_name: name.into(),
                user_id: None,
            },
        )
        .await
        .unwrap()
        .participant_id
    }

    struct TestClient {
        id: Uuid,
        rx: mpsc::UnboundedReceiver<Message>,
    }

    impl TestClient {
        async fn connect(state: &SharedState, code: &str) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let id = Uuid::new_v4();
            join_room(state, code, RoomConnection { id, tx })
                .await
                .unwrap();
            Self { id, rx }
        }

        fn next(&mut self) -> Value {
            let message = self.rx.try_recv().expect("expected a pending message");
            match message {
                Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
                other => panic!("expected text frame, got {other:?}"),
            }
        }

        fn drain(&mut self) -> Vec<Value> {
            let mut out = Vec::new();
            while let Ok(message) = self.rx.try_recv() {
                if let Message::Text(text) = message {
                    out.push(serde_json::from_str(text.as_str()).unwrap());
                }
            }
            out
        }

        fn assert_empty(&mut self) {
            assert!(self.rx.try_recv().is_err(), "expected no pending message");
        }
    }

    #[tokio::test]
    async fn join_pushes_snapshot_to_the_joining_connection_only() {
        let state = test_state().await;
        let code = create_session_with_questions(&state, vec![question("Q1", "Queen", 10, 30)])
            .await;
        join_participant(&state, &code, "Alex").await;

        let mut first = TestClient::connect(&state, &code).await;
        assert_eq!(first.next()["type"], "joined-session");
        let snapshot = first.next();
        assert_eq!(snapshot["type"], "session-participants");
        assert_eq!(snapshot["participants"][0]["participant_name"], "Alex");

        // A later connection gets its own snapshot; the first sees nothing new.
        let mut second = TestClient::connect(&state, &code).await;
        assert_eq!(second.next()["type"], "joined-session");
        assert_eq!(second.next()["type"], "session-participants");
        first.assert_empty();
    }

    #[tokio::test]
    async fn start_broadcasts_session_started_then_question_without_answer() {
        let state = test_state().await;
        let code = create_session_with_questions(&state, vec![question("Q1", "Queen", 10, 30)])
            .await;
        let mut client = TestClient::connect(&state, &code).await;
        client.drain();

        start_session(&state, &code, "Live test".into()).await.unwrap();

        let started = client.next();
        assert_eq!(started["type"], "session-started");
        let question_started = client.next();
        assert_eq!(question_started["type"], "question-started");
        assert_eq!(question_started["time_limit"], 30);
        assert!(question_started["start_time"].as_u64().unwrap() > 0);
        assert!(question_started["question"].get("correct_answer").is_none());
        assert!(question_started["question"].get("explanation").is_none());

        assert_eq!(
            state.registry().room(&code).phase().await,
            SessionPhase::Active(QuestionPhase::Collecting)
        );
    }

    #[tokio::test]
    async fn answers_are_scored_relayed_and_acked() {
        let state = test_state().await;
        let code = create_session_with_questions(&state, vec![question("Q1", "Queen", 10, 30)])
            .await;
        let p1 = join_participant(&state, &code, "Alex").await;
        let p2 = join_participant(&state, &code, "Sam").await;

        let mut host = TestClient::connect(&state, &code).await;
        let mut submitter = TestClient::connect(&state, &code).await;
        start_session(&state, &code, "Live test".into()).await.unwrap();
        host.drain();
        submitter.drain();

        let question_id = state
            .registry()
            .room(&code)
            .question_runtime()
            .await
            .unwrap()
            .question
            .id;

        submit_answer(&state, &code, submitter.id, p1, question_id, "Queen".into())
            .await
            .unwrap();

        // Relay reaches the host, not the submitter.
        let relayed = host.next();
        assert_eq!(relayed["type"], "participant-answered");
        assert_eq!(relayed["is_correct"], true);
        assert_eq!(relayed["points_earned"], 10);

        let ack = submitter.next();
        assert_eq!(ack["type"], "answer-ack");
        assert_eq!(ack["accepted"], true);
        assert_eq!(ack["is_correct"], true);
        submitter.assert_empty();

        submit_answer(&state, &code, submitter.id, p2, question_id, "Beatles".into())
            .await
            .unwrap();
        let wrong_ack = submitter.next();
        assert_eq!(wrong_ack["accepted"], true);
        assert_eq!(wrong_ack["is_correct"], false);
        assert_eq!(wrong_ack["points_earned"], 0);

        // Duplicate submission is rejected without another relay.
        host.drain();
        submit_answer(&state, &code, submitter.id, p1, question_id, "Queen".into())
            .await
            .unwrap();
        let duplicate = submitter.next();
        assert_eq!(duplicate["accepted"], false);
        assert_eq!(duplicate["reason"], "duplicate");
        host.assert_empty();

        let storage = state.storage().await.unwrap();
        let session = storage
            .sessions
            .find_session_by_code(code.clone())
            .await
            .unwrap()
            .unwrap();
        let scores: Vec<u64> = storage
            .sessions
            .list_participants(session.id)
            .await
            .unwrap()
            .iter()
            .map(|p| p.score as u64)
            .collect();
        assert_eq!(scores, [10, 0]);
    }

    #[tokio::test]
    async fn reveal_finalizes_non_respondents_and_leaderboard_ranks_them() {
        let state = test_state().await;
        let code = create_session_with_questions(&state, vec![question("Q1", "Queen", 10, 30)])
            .await;
        let p1 = join_participant(&state, &code, "Alex").await;
        let _p2 = join_participant(&state, &code, "Sam").await;

        let mut client = TestClient::connect(&state, &code).await;
        start_session(&state, &code, "Live test".into()).await.unwrap();
        client.drain();

        let question_id = state
            .registry()
            .room(&code)
            .question_runtime()
            .await
            .unwrap()
            .question
            .id;
        submit_answer(&state, &code, client.id, p1, question_id, "queen".into())
            .await
            .unwrap();
        client.drain();

        // Host reveals before Sam answers: Sam is closed out at zero points.
        reveal_results(&state, &code, RevealTrigger::Host, None)
            .await
            .unwrap();
        let results = client.next();
        assert_eq!(results["type"], "question-results");
        assert_eq!(results["correct_answer"], "Queen");
        assert_eq!(results["explanation"], "Trivia night classic.");

        // A submission after the reveal is acknowledged as late.
        submit_answer(&state, &code, client.id, p1, question_id, "Queen".into())
            .await
            .unwrap();
        let late = client.next();
        assert_eq!(late["accepted"], false);
        assert_eq!(late["reason"], "late");

        show_leaderboard(&state, &code).await.unwrap();
        let leaderboard = client.next();
        assert_eq!(leaderboard["type"], "leaderboard-updated");
        let entries = leaderboard["leaderboard"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["participant_name"], "Alex");
        assert_eq!(entries[0]["score"], 10);
        assert_eq!(entries[0]["rank"], 1);
        assert_eq!(entries[1]["participant_name"], "Sam");
        assert_eq!(entries[1]["score"], 0);
        assert_eq!(entries[1]["rank"], 2);
    }

    #[tokio::test]
    async fn rejoin_after_scoring_keeps_the_earned_score() {
        let state = test_state().await;
        let code = create_session_with_questions(&state, vec![question("Q1", "Queen", 10, 30)])
            .await;
        let p1 = join_participant(&state, &code, "Alex").await;

        let mut client = TestClient::connect(&state, &code).await;
        start_session(&state, &code, "Live test".into()).await.unwrap();
        client.drain();
        let question_id = state
            .registry()
            .room(&code)
            .question_runtime()
            .await
            .unwrap()
            .question
            .id;
        submit_answer(&state, &code, client.id, p1, question_id, "Queen".into())
            .await
            .unwrap();

        // Network drop and rejoin by the same name: same record, score intact.
        let rejoined = crate::services::session_service::join_session(
            &state,
            JoinSessionRequest {
                session_code: code.clone(),
                participant_name: "Alex".into(),
                user_id: None,
            },
        )
        .await
        .unwrap();
        assert!(rejoined.rejoined);
        assert_eq!(rejoined.participant_id, p1);
        assert_eq!(rejoined.current_score, 10);
    }

    #[tokio::test]
    async fn tied_scores_rank_by_join_order() {
        let state = test_state().await;
        let code = create_session_with_questions(&state, vec![question("Q1", "Queen", 10, 30)])
            .await;
        let p1 = join_participant(&state, &code, "Alex").await;
        let p2 = join_participant(&state, &code, "Sam").await;

        let mut client = TestClient::connect(&state, &code).await;
        start_session(&state, &code, "Live test".into()).await.unwrap();
        client.drain();

        let question_id = state
            .registry()
            .room(&code)
            .question_runtime()
            .await
            .unwrap()
            .question
            .id;
        submit_answer(&state, &code, client.id, p2, question_id, "Queen".into())
            .await
            .unwrap();
        submit_answer(&state, &code, client.id, p1, question_id, "Queen".into())
            .await
            .unwrap();
        reveal_results(&state, &code, RevealTrigger::Host, None)
            .await
            .unwrap();
        client.drain();

        show_leaderboard(&state, &code).await.unwrap();
        let leaderboard = client.next();
        let entries = leaderboard["leaderboard"].as_array().unwrap();
        // Both scored 10; Alex joined first and therefore ranks first.
        assert_eq!(entries[0]["participant_name"], "Alex");
        assert_eq!(entries[1]["participant_name"], "Sam");
    }

    #[tokio::test]
    async fn end_session_is_terminal_and_broadcast_once() {
        let state = test_state().await;
        let code = create_session_with_questions(&state, vec![question("Q1", "Queen", 10, 30)])
            .await;
        let p1 = join_participant(&state, &code, "Alex").await;

        let mut client = TestClient::connect(&state, &code).await;
        start_session(&state, &code, "Live test".into()).await.unwrap();
        client.drain();
        let question_id = state
            .registry()
            .room(&code)
            .question_runtime()
            .await
            .unwrap()
            .question
            .id;

        end_session(&state, &code).await.unwrap();
        let ended = client.next();
        assert_eq!(ended["type"], "session-ended");

        // Ending again fails against the ended session; nothing rebroadcast.
        assert!(end_session(&state, &code).await.is_err());
        client.assert_empty();

        submit_answer(&state, &code, client.id, p1, question_id, "Queen".into())
            .await
            .unwrap();
        let rejected = client.next();
        assert_eq!(rejected["accepted"], false);
        assert_eq!(rejected["reason"], "session-ended");

        assert_eq!(
            state.registry().room(&code).phase().await,
            SessionPhase::Ended
        );
    }

    #[tokio::test]
    async fn stale_timer_reveal_is_a_no_op_after_advance() {
        let state = test_state().await;
        let code = create_session_with_questions(
            &state,
            vec![
                question("Q1", "Queen", 10, 30),
                question("Q2", "ABBA", 10, 30),
            ],
        )
        .await;
        join_participant(&state, &code, "Alex").await;

        let mut client = TestClient::connect(&state, &code).await;
        start_session(&state, &code, "Live test".into()).await.unwrap();
        reveal_results(&state, &code, RevealTrigger::Host, None)
            .await
            .unwrap();
        advance_question(&state, &code).await.unwrap();
        client.drain();

        // A countdown armed for question 0 fires after the room moved to 1.
        reveal_results(&state, &code, RevealTrigger::Timeout, Some(0))
            .await
            .unwrap();
        client.assert_empty();
        assert_eq!(
            state.registry().room(&code).phase().await,
            SessionPhase::Active(QuestionPhase::Collecting)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_expiry_auto_reveals_the_question() {
        let state = test_state().await;
        let code = create_session_with_questions(&state, vec![question("Q1", "Queen", 10, 5)])
            .await;
        join_participant(&state, &code, "Alex").await;

        let mut client = TestClient::connect(&state, &code).await;
        start_session(&state, &code, "Live test".into()).await.unwrap();
        client.drain();

        // Paused time auto-advances through the armed countdown.
        sleep(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;

        assert_eq!(
            state.registry().room(&code).phase().await,
            SessionPhase::Active(QuestionPhase::Revealed)
        );
        let results = client.next();
        assert_eq!(results["type"], "question-results");
        assert_eq!(results["correct_answer"], "Queen");
    }
}
