use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// Kind of quiz question. The kind only drives what the participant UI
/// renders as selectable options; scoring compares answer strings regardless.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    /// Prompt with a fixed list of options, one of which is correct.
    MultipleChoice,
    /// Two-option prompt ("true" / "false").
    TrueFalse,
    /// An audio clip is played and the participant names what they heard.
    AudioRecognition,
}

/// Question definition held by the question bank. Carries the correct answer
/// and must therefore never be serialized to participants as-is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionEntity {
    /// Stable identifier for the question.
    pub id: Uuid,
    /// Rendering kind (multiple choice, true/false, audio recognition).
    pub kind: QuestionKind,
    /// Prompt text shown to every participant.
    pub prompt: String,
    /// Selectable options for multiple-choice rendering; empty otherwise.
    pub options: Vec<String>,
    /// Media URL for audio-recognition questions.
    pub audio_url: Option<String>,
    /// Canonical correct answer, compared case-insensitively after trimming.
    pub correct_answer: String,
    /// Optional explanation revealed together with the correct answer.
    pub explanation: Option<String>,
    /// Points awarded for a correct answer.
    pub points: u32,
    /// Seconds participants have to answer once the question goes live.
    pub time_limit_secs: u64,
}

/// Durable record of a hosted live session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostedSessionEntity {
    /// Primary key of the session.
    pub id: Uuid,
    /// Public 6-digit code participants use to join.
    pub code: String,
    /// Identifier of the host that created (and exclusively owns) the session.
    pub owner_id: Uuid,
    /// Display name of the session.
    pub name: String,
    /// Maximum number of participants admitted through the join operation.
    pub max_participants: u32,
    /// Optional category the question list was drawn from.
    pub category_id: Option<Uuid>,
    /// False once the session has ended; inactive sessions cannot be joined.
    pub is_active: bool,
    /// Index of the question currently (or last) played; advances monotonically.
    pub current_question_index: usize,
    /// Ordered question list configured for this session.
    pub question_ids: Vec<Uuid>,
    /// Creation timestamp for auditing/debugging.
    pub created_at: SystemTime,
    /// Stamped when the host starts the live run.
    pub started_at: Option<SystemTime>,
    /// Stamped when the session reaches its terminal state.
    pub ended_at: Option<SystemTime>,
}

impl HostedSessionEntity {
    /// Whether a question exists after the current index.
    pub fn has_next_question(&self) -> bool {
        self.current_question_index + 1 < self.question_ids.len()
    }
}

/// Participant enrolled in a hosted session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantEntity {
    /// Stable identifier; survives reconnects.
    pub id: Uuid,
    /// Session this participant belongs to.
    pub session_id: Uuid,
    /// Authenticated identity when available; anonymous players have none.
    pub user_id: Option<Uuid>,
    /// Display name; unique per session for anonymous players.
    pub display_name: String,
    /// Running score, monotonically non-decreasing within a session.
    pub score: u32,
    /// Connection flag toggled by explicit join/leave commands.
    pub is_connected: bool,
    /// First-join timestamp; used as the leaderboard tie-break.
    pub joined_at: SystemTime,
}

/// Append-only audit record of one answer submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerRecordEntity {
    /// Primary key of the record.
    pub id: Uuid,
    /// Session the answer was submitted in.
    pub session_id: Uuid,
    /// Participant who submitted (or was finalized with) this answer.
    pub participant_id: Uuid,
    /// Question the answer applies to.
    pub question_id: Uuid,
    /// Raw submitted text; empty for timeout finalizations.
    pub submitted_answer: String,
    /// Whether the submission matched the correct answer.
    pub is_correct: bool,
    /// Points credited to the participant for this answer.
    pub points_earned: u32,
    /// Submission (or finalization) timestamp.
    pub answered_at: SystemTime,
}
