use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{HostedSessionEntity, ParticipantEntity, QuestionEntity, QuestionKind},
    dto::{format_system_time, validation::validate_session_code},
};

/// Default point value when a question omits one.
fn default_points() -> u32 {
    10
}

/// Default answering window when a question omits one.
fn default_time_limit() -> u64 {
    30
}

/// Payload used to create a new hosted session.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateSessionRequest {
    /// Identity of the host creating (and owning) the session.
    pub owner_id: Uuid,
    #[validate(length(min = 1, max = 120))]
    pub session_name: String,
    /// Participant cap; the configured default applies when omitted.
    #[serde(default)]
    #[validate(range(min = 1, max = 500))]
    pub max_participants: Option<u32>,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    /// Ordered question list played during the live run.
    #[validate(nested)]
    pub questions: Vec<QuestionInput>,
}

/// Incoming question definition for the session bootstrap.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct QuestionInput {
    pub kind: QuestionKind,
    #[validate(length(min = 1))]
    pub prompt: String,
    /// Options rendered for multiple-choice questions.
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    #[validate(url)]
    pub audio_url: Option<String>,
    #[validate(length(min = 1))]
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default = "default_points")]
    #[validate(range(min = 1))]
    pub points: u32,
    #[serde(default = "default_time_limit")]
    #[validate(range(min = 5, max = 300))]
    pub time_limit_secs: u64,
}

impl QuestionInput {
    /// Materialise the input as a bank entity with a fresh identifier.
    pub fn into_entity(self) -> QuestionEntity {
        QuestionEntity {
            id: Uuid::new_v4(),
            kind: self.kind,
            prompt: self.prompt,
            options: self.options,
            audio_url: self.audio_url,
            correct_answer: self.correct_answer,
            explanation: self.explanation,
            points: self.points,
            time_limit_secs: self.time_limit_secs,
        }
    }
}

/// Summary returned once a session has been created.
#[derive(Debug, Serialize, ToSchema)]
pub struct CreateSessionResponse {
    pub id: Uuid,
    pub session_name: String,
    /// Public 6-digit code participants join with.
    pub session_code: String,
    pub max_participants: u32,
    pub question_count: usize,
    pub created_at: String,
}

/// Payload used to join a session by its public code.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinSessionRequest {
    #[validate(custom(function = validate_session_code))]
    pub session_code: String,
    #[validate(length(min = 1, max = 60))]
    pub participant_name: String,
    /// Authenticated identity, when the participant has one. Anonymous
    /// players are matched by display name instead.
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

/// Result of a join operation; `rejoined` distinguishes a returning
/// participant (same record, score kept) from a brand-new one.
#[derive(Debug, Serialize, ToSchema)]
pub struct JoinSessionResponse {
    pub participant_id: Uuid,
    pub session_name: String,
    pub current_score: u32,
    pub rejoined: bool,
}

/// Public projection of a session exposed on the lookup route.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionInfo {
    pub id: Uuid,
    pub session_name: String,
    pub session_code: String,
    pub max_participants: u32,
    pub is_active: bool,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
}

impl From<HostedSessionEntity> for SessionInfo {
    fn from(value: HostedSessionEntity) -> Self {
        Self {
            id: value.id,
            session_name: value.name,
            session_code: value.code,
            max_participants: value.max_participants,
            is_active: value.is_active,
            created_at: format_system_time(value.created_at),
            started_at: value.started_at.map(format_system_time),
        }
    }
}

/// Public projection of a participant carried in snapshots and join events.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ParticipantSummary {
    pub participant_id: Uuid,
    pub participant_name: String,
    pub score: u32,
    pub is_connected: bool,
}

impl From<ParticipantEntity> for ParticipantSummary {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            participant_id: value.id,
            participant_name: value.display_name,
            score: value.score,
            is_connected: value.is_connected,
        }
    }
}

/// One row of the ranked standings broadcast to a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LeaderboardEntry {
    /// Dense 1-based rank; ties are broken by earliest join.
    pub rank: u32,
    pub participant_id: Uuid,
    pub participant_name: String,
    pub score: u32,
}

/// Question payload broadcast to participants: the definition stripped of the
/// correct answer and explanation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuestionPublic {
    pub id: Uuid,
    pub kind: QuestionKind,
    pub prompt: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    pub points: u32,
}

impl From<&QuestionEntity> for QuestionPublic {
    fn from(value: &QuestionEntity) -> Self {
        Self {
            id: value.id,
            kind: value.kind,
            prompt: value.prompt.clone(),
            options: value.options.clone(),
            audio_url: value.audio_url.clone(),
            points: value.points,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_question_omits_the_answer() {
        let entity = QuestionEntity {
            id: Uuid::new_v4(),
            kind: QuestionKind::MultipleChoice,
            prompt: "Which band recorded Bohemian Rhapsody?".into(),
            options: vec!["Queen".into(), "ABBA".into()],
            audio_url: None,
            correct_answer: "Queen".into(),
            explanation: Some("Released in 1975.".into()),
            points: 10,
            time_limit_secs: 30,
        };

        let public = QuestionPublic::from(&entity);
        let json = serde_json::to_value(&public).unwrap();
        assert!(json.get("correct_answer").is_none());
        assert!(json.get("explanation").is_none());
        assert_eq!(json["prompt"], entity.prompt);
    }
}
