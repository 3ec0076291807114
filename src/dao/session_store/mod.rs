pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{
    AnswerRecordEntity, HostedSessionEntity, ParticipantEntity, QuestionEntity,
};
use crate::dao::storage::StorageResult;

/// Outcome of recording an answer submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerWriteOutcome {
    /// The answer was appended and the participant's score credited.
    Recorded,
    /// The participant already has an answer for this question; nothing written.
    Duplicate,
}

/// Abstraction over the persistence layer for hosted sessions, participants
/// and the append-only answer log.
pub trait SessionStore: Send + Sync {
    fn save_session(&self, session: HostedSessionEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_session(&self, id: Uuid)
    -> BoxFuture<'static, StorageResult<Option<HostedSessionEntity>>>;
    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<HostedSessionEntity>>>;
    fn save_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn find_participant(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>>;
    /// Participants of a session ordered by `joined_at` (earliest first).
    fn list_participants(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>>;
    /// Append an answer record and credit `points_earned` to the participant's
    /// running score as one logical operation. Returns
    /// [`AnswerWriteOutcome::Duplicate`] without writing when the participant
    /// already answered this question.
    fn record_answer(
        &self,
        answer: AnswerRecordEntity,
    ) -> BoxFuture<'static, StorageResult<AnswerWriteOutcome>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Read-mostly lookup service for question definitions. Seeded once per
/// session at creation time; the scoring engine only ever reads from it.
pub trait QuestionBank: Send + Sync {
    fn insert_questions(
        &self,
        questions: Vec<QuestionEntity>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn find_question(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>>;
}
