use mongodb::bson::{Binary, DateTime, Document, doc, spec::BinarySubtype};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{
    AnswerRecordEntity, HostedSessionEntity, ParticipantEntity, QuestionEntity, QuestionKind,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    code: String,
    owner_id: Uuid,
    name: String,
    max_participants: u32,
    category_id: Option<Uuid>,
    is_active: bool,
    current_question_index: usize,
    question_ids: Vec<Uuid>,
    created_at: DateTime,
    started_at: Option<DateTime>,
    ended_at: Option<DateTime>,
}

impl From<HostedSessionEntity> for MongoSessionDocument {
    fn from(value: HostedSessionEntity) -> Self {
        Self {
            id: value.id,
            code: value.code,
            owner_id: value.owner_id,
            name: value.name,
            max_participants: value.max_participants,
            category_id: value.category_id,
            is_active: value.is_active,
            current_question_index: value.current_question_index,
            question_ids: value.question_ids,
            created_at: DateTime::from_system_time(value.created_at),
            started_at: value.started_at.map(DateTime::from_system_time),
            ended_at: value.ended_at.map(DateTime::from_system_time),
        }
    }
}

impl From<MongoSessionDocument> for HostedSessionEntity {
    fn from(value: MongoSessionDocument) -> Self {
        Self {
            id: value.id,
            code: value.code,
            owner_id: value.owner_id,
            name: value.name,
            max_participants: value.max_participants,
            category_id: value.category_id,
            is_active: value.is_active,
            current_question_index: value.current_question_index,
            question_ids: value.question_ids,
            created_at: value.created_at.to_system_time(),
            started_at: value.started_at.map(|ts| ts.to_system_time()),
            ended_at: value.ended_at.map(|ts| ts.to_system_time()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoParticipantDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    session_id: Uuid,
    user_id: Option<Uuid>,
    display_name: String,
    score: u32,
    is_connected: bool,
    joined_at: DateTime,
}

impl From<ParticipantEntity> for MongoParticipantDocument {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            id: value.id,
            session_id: value.session_id,
            user_id: value.user_id,
            display_name: value.display_name,
            score: value.score,
            is_connected: value.is_connected,
            joined_at: DateTime::from_system_time(value.joined_at),
        }
    }
}

impl From<MongoParticipantDocument> for ParticipantEntity {
    fn from(value: MongoParticipantDocument) -> Self {
        Self {
            id: value.id,
            session_id: value.session_id,
            user_id: value.user_id,
            display_name: value.display_name,
            score: value.score,
            is_connected: value.is_connected,
            joined_at: value.joined_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoAnswerDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    session_id: Uuid,
    participant_id: Uuid,
    question_id: Uuid,
    submitted_answer: String,
    is_correct: bool,
    points_earned: u32,
    answered_at: DateTime,
}

impl From<AnswerRecordEntity> for MongoAnswerDocument {
    fn from(value: AnswerRecordEntity) -> Self {
        Self {
            id: value.id,
            session_id: value.session_id,
            participant_id: value.participant_id,
            question_id: value.question_id,
            submitted_answer: value.submitted_answer,
            is_correct: value.is_correct,
            points_earned: value.points_earned,
            answered_at: DateTime::from_system_time(value.answered_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoQuestionDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    kind: QuestionKind,
    prompt: String,
    options: Vec<String>,
    audio_url: Option<String>,
    correct_answer: String,
    explanation: Option<String>,
    points: u32,
    time_limit_secs: u64,
}

impl From<QuestionEntity> for MongoQuestionDocument {
    fn from(value: QuestionEntity) -> Self {
        Self {
            id: value.id,
            kind: value.kind,
            prompt: value.prompt,
            options: value.options,
            audio_url: value.audio_url,
            correct_answer: value.correct_answer,
            explanation: value.explanation,
            points: value.points,
            time_limit_secs: value.time_limit_secs,
        }
    }
}

impl From<MongoQuestionDocument> for QuestionEntity {
    fn from(value: MongoQuestionDocument) -> Self {
        Self {
            id: value.id,
            kind: value.kind,
            prompt: value.prompt,
            options: value.options,
            audio_url: value.audio_url,
            correct_answer: value.correct_answer,
            explanation: value.explanation,
            points: value.points,
            time_limit_secs: value.time_limit_secs,
        }
    }
}

pub fn uuid_as_binary(id: Uuid) -> Binary {
    Binary {
        subtype: BinarySubtype::Uuid,
        bytes: id.into_bytes().to_vec(),
    }
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": uuid_as_binary(id)}
}
