use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::session::{LeaderboardEntry, ParticipantSummary, QuestionPublic};

/// Commands accepted from room WebSocket clients.
///
/// Host commands carry only the session code; question payloads, timings and
/// leaderboards are derived server-side and never echoed from a client.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Subscribe this connection to a session's broadcast room.
    JoinSession { session_code: String },
    /// Unsubscribe this connection from the room.
    LeaveSession { session_code: String },
    /// Host starts the live run.
    HostStartSession {
        session_code: String,
        session_name: String,
    },
    /// Host advances to the next configured question.
    HostNextQuestion { session_code: String },
    /// Host closes collection and reveals the correct answer.
    HostShowResults { session_code: String },
    /// Host broadcasts the ranked standings.
    HostShowLeaderboard { session_code: String },
    /// Host terminates the session.
    HostEndSession { session_code: String },
    /// Participant announces presence after joining over HTTP.
    ParticipantJoin {
        session_code: String,
        participant_id: Uuid,
        participant_name: String,
    },
    /// Participant submits an answer for the live question.
    ParticipantAnswer {
        session_code: String,
        participant_id: Uuid,
        question_id: Uuid,
        answer: String,
    },
    /// Participant leaves the session explicitly.
    ParticipantLeave {
        session_code: String,
        participant_id: Uuid,
        participant_name: String,
    },
}

impl ClientMessage {
    /// Parse and minimally sanity-check a message from its JSON encoding.
    pub fn from_json_str(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Session code the command targets.
    pub fn session_code(&self) -> &str {
        match self {
            Self::JoinSession { session_code }
            | Self::LeaveSession { session_code }
            | Self::HostStartSession { session_code, .. }
            | Self::HostNextQuestion { session_code }
            | Self::HostShowResults { session_code }
            | Self::HostShowLeaderboard { session_code }
            | Self::HostEndSession { session_code }
            | Self::ParticipantJoin { session_code, .. }
            | Self::ParticipantAnswer { session_code, .. }
            | Self::ParticipantLeave { session_code, .. } => session_code,
        }
    }
}

/// Reason an answer submission was not scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum AnswerRejectReason {
    /// Submission arrived outside the collecting phase.
    Late,
    /// The participant already answered this question.
    Duplicate,
    /// The session has ended.
    SessionEnded,
    /// Submission referenced a question other than the live one.
    QuestionMismatch,
}

/// Events pushed to room WebSocket clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Point-to-point confirmation that the connection joined the room.
    JoinedSession { session_code: String },
    /// Point-to-point roster snapshot pushed to a newly joined connection.
    SessionParticipants {
        participants: Vec<ParticipantSummary>,
    },
    /// The host started the live run.
    SessionStarted {
        session_code: String,
        session_name: String,
    },
    /// A question went live; the payload never contains the correct answer.
    QuestionStarted {
        question: QuestionPublic,
        /// Seconds participants have to answer.
        time_limit: u64,
        /// Server-side start instant, unix milliseconds.
        start_time: u64,
    },
    /// Collection closed; correct answer and explanation now public.
    QuestionResults {
        correct_answer: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        explanation: Option<String>,
    },
    /// Ranked standings for the whole room.
    LeaderboardUpdated { leaderboard: Vec<LeaderboardEntry> },
    /// A participant joined (or rejoined) the session.
    ParticipantJoined {
        participant_id: Uuid,
        participant_name: String,
        timestamp: u64,
    },
    /// A participant left explicitly.
    ParticipantLeft {
        participant_id: Uuid,
        participant_name: String,
        timestamp: u64,
    },
    /// Relayed to everyone but the submitter while collection is open.
    ParticipantAnswered {
        participant_id: Uuid,
        question_id: Uuid,
        answer: String,
        is_correct: bool,
        points_earned: u32,
        timestamp: u64,
    },
    /// The session reached its terminal state.
    SessionEnded { session_code: String },
    /// Point-to-point acknowledgement of an answer submission.
    AnswerAck {
        question_id: Uuid,
        accepted: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<AnswerRejectReason>,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_correct: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        points_earned: Option<u32>,
    },
    /// Point-to-point error notice for a command that could not be handled.
    Error { message: String },
}

impl ServerMessage {
    /// Ack for an accepted submission.
    pub fn answer_accepted(question_id: Uuid, is_correct: bool, points_earned: u32) -> Self {
        Self::AnswerAck {
            question_id,
            accepted: true,
            reason: None,
            is_correct: Some(is_correct),
            points_earned: Some(points_earned),
        }
    }

    /// Ack for a rejected submission.
    pub fn answer_rejected(question_id: Uuid, reason: AnswerRejectReason) -> Self {
        Self::AnswerAck {
            question_id,
            accepted: false,
            reason: Some(reason),
            is_correct: None,
            points_earned: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_use_kebab_case_tags() {
        let message = ClientMessage::from_json_str(
            r#"{"type":"participant-answer","session_code":"483920",
               "participant_id":"8f9f1c5e-2b74-4f43-9d55-1d4c7a35f7a1",
               "question_id":"0d4e4f1a-91be-4cbb-9940-4fd8f68c4f8e",
               "answer":"Queen"}"#,
        )
        .unwrap();
        assert!(matches!(message, ClientMessage::ParticipantAnswer { .. }));
        assert_eq!(message.session_code(), "483920");
    }

    #[test]
    fn unknown_message_type_fails_to_parse() {
        assert!(ClientMessage::from_json_str(r#"{"type":"host-reboot"}"#).is_err());
    }

    #[test]
    fn answer_ack_serializes_reason_only_when_rejected() {
        let question_id = Uuid::new_v4();

        let accepted =
            serde_json::to_value(ServerMessage::answer_accepted(question_id, true, 10)).unwrap();
        assert_eq!(accepted["type"], "answer-ack");
        assert_eq!(accepted["accepted"], true);
        assert!(accepted.get("reason").is_none());

        let rejected = serde_json::to_value(ServerMessage::answer_rejected(
            question_id,
            AnswerRejectReason::Late,
        ))
        .unwrap();
        assert_eq!(rejected["accepted"], false);
        assert_eq!(rejected["reason"], "late");
    }
}
