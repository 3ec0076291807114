use std::collections::HashSet;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientMessage, ServerMessage},
    services::live_service,
    state::{RevealTrigger, RoomConnection, SharedState},
};

/// Handle the full lifecycle for one room WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we
    // await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let connection_id = Uuid::new_v4();
    let mut joined_rooms: HashSet<String> = HashSet::new();

    info!(connection = %connection_id, "room client connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match ClientMessage::from_json_str(&text) {
                Ok(command) => {
                    handle_command(
                        &state,
                        connection_id,
                        &outbound_tx,
                        &mut joined_rooms,
                        command,
                    )
                    .await;
                }
                Err(err) => {
                    warn!(connection = %connection_id, error = %err, "failed to parse room message");
                    send_message_to_websocket(
                        &outbound_tx,
                        &ServerMessage::Error {
                            message: "malformed message".into(),
                        },
                        "parse error notice",
                    );
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(connection = %connection_id, "room client closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(connection = %connection_id, error = %err, "websocket error");
                break;
            }
        }
    }

    // Transport-level cleanup only: the connection leaves every room it
    // joined so broadcasts stop targeting it, but durable presence flags are
    // the business of the explicit participant-leave command.
    for code in joined_rooms {
        live_service::leave_room(&state, &code, connection_id).await;
    }

    info!(connection = %connection_id, "room client disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Dispatch one parsed command into the live service. Command failures are
/// answered point-to-point and never tear down the connection or the room.
async fn handle_command(
    state: &SharedState,
    connection_id: Uuid,
    outbound_tx: &mpsc::UnboundedSender<Message>,
    joined_rooms: &mut HashSet<String>,
    command: ClientMessage,
) {
    let code = command.session_code().to_owned();

    let result = match command {
        ClientMessage::JoinSession { session_code } => {
            let joined = live_service::join_room(
                state,
                &session_code,
                RoomConnection {
                    id: connection_id,
                    tx: outbound_tx.clone(),
                },
            )
            .await;
            if joined.is_ok() {
                joined_rooms.insert(session_code);
            }
            joined
        }
        ClientMessage::LeaveSession { session_code } => {
            joined_rooms.remove(&session_code);
            live_service::leave_room(state, &session_code, connection_id).await;
            Ok(())
        }
        ClientMessage::HostStartSession {
            session_code,
            session_name,
        } => live_service::start_session(state, &session_code, session_name).await,
        ClientMessage::HostNextQuestion { session_code } => {
            live_service::advance_question(state, &session_code).await
        }
        ClientMessage::HostShowResults { session_code } => {
            live_service::reveal_results(state, &session_code, RevealTrigger::Host, None).await
        }
        ClientMessage::HostShowLeaderboard { session_code } => {
            live_service::show_leaderboard(state, &session_code).await
        }
        ClientMessage::HostEndSession { session_code } => {
            live_service::end_session(state, &session_code).await
        }
        ClientMessage::ParticipantJoin {
            session_code,
            participant_id,
            participant_name,
        } => {
            live_service::participant_join(state, &session_code, participant_id, participant_name)
                .await
        }
        ClientMessage::ParticipantAnswer {
            session_code,
            participant_id,
            question_id,
            answer,
        } => {
            live_service::submit_answer(
                state,
                &session_code,
                connection_id,
                participant_id,
                question_id,
                answer,
            )
            .await
        }
        ClientMessage::ParticipantLeave {
            session_code,
            participant_id,
            participant_name,
        } => {
            live_service::participant_leave(state, &session_code, participant_id, participant_name)
                .await
        }
    };

    if let Err(err) = result {
        warn!(
            connection = %connection_id,
            code = %code,
            error = %err,
            "room command failed"
        );
        send_message_to_websocket(
            outbound_tx,
            &ServerMessage::Error {
                message: err.to_string(),
            },
            "command error notice",
        );
    }
}

/// Serialize a payload and push it onto the provided WebSocket sender.
/// Serialization failure is a permanent error (bug in code) and is only
/// logged; a closed writer means the connection is already going away.
pub fn send_message_to_websocket<T>(
    tx: &mpsc::UnboundedSender<Message>,
    value: &T,
    context: &str,
) where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, context, "failed to serialize message `{value:?}`");
            return;
        }
    };

    if tx.send(Message::Text(payload.into())).is_err() {
        warn!(context, "writer channel closed before message could be sent");
    }
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
