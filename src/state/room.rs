use std::collections::HashSet;
use std::time::Duration;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::{Mutex, MutexGuard, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dao::models::QuestionEntity,
    dto::ws::ServerMessage,
    error::ServiceError,
    state::state_machine::{Plan, SessionEvent, SessionPhase, SessionStateMachine},
};

/// Handle used to push messages to one connected client.
#[derive(Clone)]
pub struct RoomConnection {
    /// Connection identifier allocated at socket accept time.
    pub id: Uuid,
    /// Outbound channel drained by the connection's writer task.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Transient state of the question currently live in a room.
#[derive(Debug, Clone)]
pub struct QuestionRuntime {
    /// Zero-based index of the question within the session's list.
    pub index: usize,
    /// Full question definition; the correct answer never leaves the server
    /// before the reveal.
    pub question: QuestionEntity,
    /// Server-side start instant, in unix milliseconds.
    pub started_at_ms: u64,
    /// Participants that already have an accepted (or finalized) answer.
    pub answered: HashSet<Uuid>,
}

impl QuestionRuntime {
    /// Fresh runtime for a newly started question.
    pub fn new(index: usize, question: QuestionEntity, started_at_ms: u64) -> Self {
        Self {
            index,
            question,
            started_at_ms,
            answered: HashSet::new(),
        }
    }
}

/// Armed auto-reveal countdown, tagged with the question index it was
/// scheduled for so a stale timer can never close a later question.
pub struct RevealTimer {
    /// Index of the question this timer guards.
    pub question_index: usize,
    /// Handle of the sleeping task; aborted on cancellation.
    pub handle: JoinHandle<()>,
}

/// One broadcast room: the live connections subscribed to a session code,
/// the session's state machine, and the runtime of the current question.
///
/// Every command against a room runs under [`lock_commands`](Self::lock_commands)
/// so transitions, store writes and broadcasts of one room are totally
/// ordered while distinct rooms proceed in parallel.
pub struct Room {
    code: String,
    connections: DashMap<Uuid, RoomConnection>,
    machine: Mutex<SessionStateMachine>,
    runtime: Mutex<Option<QuestionRuntime>>,
    reveal_timer: Mutex<Option<RevealTimer>>,
    command_gate: Mutex<()>,
    transition_timeout: Option<Duration>,
}

impl Room {
    /// Create an empty room for the given session code.
    pub fn new(code: String, transition_timeout: Option<Duration>) -> Self {
        Self {
            code,
            connections: DashMap::new(),
            machine: Mutex::new(SessionStateMachine::new()),
            runtime: Mutex::new(None),
            reveal_timer: Mutex::new(None),
            command_gate: Mutex::new(()),
            transition_timeout,
        }
    }

    /// Session code this room serves.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Add a connection to the room. Joining twice is a no-op on membership.
    /// Returns `true` when the connection was not yet a member.
    pub fn join(&self, connection: RoomConnection) -> bool {
        self.connections.insert(connection.id, connection).is_none()
    }

    /// Remove a connection from room membership. Durable participant state is
    /// untouched; only the explicit participant-leave command changes it.
    pub fn leave(&self, connection_id: Uuid) {
        self.connections.remove(&connection_id);
    }

    /// Whether no connection is currently subscribed.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Serialize the guard over this room's command processing. Held for the
    /// full span of a command (transition, store writes, broadcasts).
    pub async fn lock_commands(&self) -> MutexGuard<'_, ()> {
        self.command_gate.lock().await
    }

    /// Deliver an event to every connection currently joined, including the
    /// sender. Dead connections discovered while sending are evicted.
    pub fn broadcast(&self, message: &ServerMessage) {
        let Some(frame) = encode(message) else {
            return;
        };
        self.fan_out(frame, None);
    }

    /// Deliver an event to every connection except `source`. Used so raw
    /// per-participant answers reach the host view without echoing back to
    /// the submitter.
    pub fn relay(&self, source: Uuid, message: &ServerMessage) {
        let Some(frame) = encode(message) else {
            return;
        };
        self.fan_out(frame, Some(source));
    }

    /// Deliver an event to a single connection. Returns `false` when the
    /// connection is unknown or its channel is closed.
    pub fn send_to(&self, connection_id: Uuid, message: &ServerMessage) -> bool {
        let Some(frame) = encode(message) else {
            return false;
        };
        let Some(connection) = self.connections.get(&connection_id) else {
            return false;
        };
        let delivered = connection.tx.send(frame).is_ok();
        drop(connection);

        if !delivered {
            self.connections.remove(&connection_id);
        }
        delivered
    }

    fn fan_out(&self, frame: Message, skip: Option<Uuid>) {
        let mut dead = Vec::new();
        for entry in self.connections.iter() {
            if Some(*entry.key()) == skip {
                continue;
            }
            if entry.value().tx.send(frame.clone()).is_err() {
                dead.push(*entry.key());
            }
        }
        for id in dead {
            self.connections.remove(&id);
        }
    }

    /// Snapshot the current phase of this room's state machine.
    pub async fn phase(&self) -> SessionPhase {
        self.machine.lock().await.phase()
    }

    /// Run a planned transition: validate and reserve it, execute the durable
    /// `work`, then commit. The reservation is aborted when the work fails or
    /// exceeds the transition timeout, leaving the phase untouched.
    ///
    /// The caller must hold the command gate.
    pub async fn run_transition<F, Fut, T>(
        &self,
        event: SessionEvent,
        work: F,
    ) -> Result<(T, SessionPhase), ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, ServiceError>>,
    {
        let Plan { id: plan_id, .. } = {
            let mut machine = self.machine.lock().await;
            machine.plan(event.clone())?
        };

        let work_future = work();
        let outcome = if let Some(limit) = self.transition_timeout {
            match timeout(limit, work_future).await {
                Ok(result) => result,
                Err(_) => {
                    self.abort_plan(plan_id, &event, "timeout").await;
                    return Err(ServiceError::Timeout);
                }
            }
        } else {
            work_future.await
        };

        match outcome {
            Ok(value) => {
                let next = {
                    let mut machine = self.machine.lock().await;
                    machine.apply(plan_id)?
                };
                Ok((value, next))
            }
            Err(err) => {
                self.abort_plan(plan_id, &event, "work error").await;
                Err(err)
            }
        }
    }

    async fn abort_plan(&self, plan_id: Uuid, event: &SessionEvent, cause: &str) {
        let mut machine = self.machine.lock().await;
        if let Err(abort_err) = machine.abort(plan_id) {
            warn!(
                code = %self.code,
                event = ?event,
                plan_id = %plan_id,
                error = ?abort_err,
                "failed to abort transition after {cause}"
            );
        }
    }

    /// Replace the live question runtime wholesale.
    pub async fn set_question(&self, runtime: QuestionRuntime) {
        let mut slot = self.runtime.lock().await;
        *slot = Some(runtime);
    }

    /// Clone of the current question runtime, if a question is live.
    pub async fn question_runtime(&self) -> Option<QuestionRuntime> {
        self.runtime.lock().await.clone()
    }

    /// Record that a participant has an answer for the current question.
    pub async fn mark_answered(&self, participant_id: Uuid) {
        if let Some(runtime) = self.runtime.lock().await.as_mut() {
            runtime.answered.insert(participant_id);
        }
    }

    /// Whether the participant already answered the current question.
    pub async fn has_answered(&self, participant_id: Uuid) -> bool {
        self.runtime
            .lock()
            .await
            .as_ref()
            .is_some_and(|runtime| runtime.answered.contains(&participant_id))
    }

    /// Arm the auto-reveal countdown, replacing (and aborting) any previous one.
    pub async fn arm_reveal_timer(&self, timer: RevealTimer) {
        let mut slot = self.reveal_timer.lock().await;
        if let Some(previous) = slot.replace(timer) {
            previous.handle.abort();
        }
    }

    /// Cancel the armed countdown, if any.
    pub async fn cancel_reveal_timer(&self) {
        let mut slot = self.reveal_timer.lock().await;
        if let Some(timer) = slot.take() {
            timer.handle.abort();
        }
    }

    /// Drop the countdown slot without aborting the task. Used by the
    /// countdown itself once it has fired; aborting would cancel the caller.
    pub async fn clear_reveal_timer(&self) {
        let mut slot = self.reveal_timer.lock().await;
        slot.take();
    }
}

/// Serialize a payload into a WebSocket text frame. Serialization failure is a
/// permanent error (bug in code); it is logged and the frame dropped.
fn encode(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(payload) => Some(Message::Text(payload.into())),
        Err(err) => {
            warn!(error = %err, "failed to serialize server message `{message:?}`");
            None
        }
    }
}
