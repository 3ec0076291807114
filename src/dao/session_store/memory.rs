//! In-process storage backend. The default when no database is configured and
//! the backend every test runs against.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use uuid::Uuid;

use crate::dao::{
    models::{AnswerRecordEntity, HostedSessionEntity, ParticipantEntity, QuestionEntity},
    session_store::{AnswerWriteOutcome, QuestionBank, SessionStore},
    storage::StorageResult,
};

/// Storage backend keeping every entity in process-local maps.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    sessions: DashMap<Uuid, HostedSessionEntity>,
    /// Session code -> session id index for join-by-code lookups.
    codes: DashMap<String, Uuid>,
    /// Participants per session; IndexMap keeps insertion (= join) order.
    participants: DashMap<Uuid, IndexMap<Uuid, ParticipantEntity>>,
    answers: DashMap<Uuid, Vec<AnswerRecordEntity>>,
    questions: DashMap<Uuid, QuestionEntity>,
}

impl MemoryStore {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn save_session_sync(&self, session: HostedSessionEntity) {
        self.inner.codes.insert(session.code.clone(), session.id);
        self.inner.sessions.insert(session.id, session);
    }

    fn record_answer_sync(&self, answer: AnswerRecordEntity) -> AnswerWriteOutcome {
        let mut log = self.inner.answers.entry(answer.session_id).or_default();
        let already_answered = log
            .iter()
            .any(|a| a.participant_id == answer.participant_id && a.question_id == answer.question_id);
        if already_answered {
            return AnswerWriteOutcome::Duplicate;
        }

        if answer.points_earned > 0
            && let Some(mut roster) = self.inner.participants.get_mut(&answer.session_id)
            && let Some(participant) = roster.get_mut(&answer.participant_id)
        {
            participant.score += answer.points_earned;
        }

        log.push(answer);
        AnswerWriteOutcome::Recorded
    }
}

impl SessionStore for MemoryStore {
    fn save_session(&self, session: HostedSessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.save_session_sync(session);
            Ok(())
        })
    }

    fn find_session(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<HostedSessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.sessions.get(&id).map(|s| s.value().clone())) })
    }

    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<HostedSessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let Some(id) = store.inner.codes.get(&code).map(|entry| *entry.value()) else {
                return Ok(None);
            };
            Ok(store.inner.sessions.get(&id).map(|s| s.value().clone()))
        })
    }

    fn save_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .inner
                .participants
                .entry(participant.session_id)
                .or_default()
                .insert(participant.id, participant);
            Ok(())
        })
    }

    fn find_participant(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .inner
                .participants
                .get(&session_id)
                .and_then(|roster| roster.get(&participant_id).cloned()))
        })
    }

    fn list_participants(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .inner
                .participants
                .get(&session_id)
                .map(|roster| roster.values().cloned().collect())
                .unwrap_or_default())
        })
    }

    fn record_answer(
        &self,
        answer: AnswerRecordEntity,
    ) -> BoxFuture<'static, StorageResult<AnswerWriteOutcome>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.record_answer_sync(answer)) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

impl QuestionBank for MemoryStore {
    fn insert_questions(
        &self,
        questions: Vec<QuestionEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            for question in questions {
                store.inner.questions.insert(question.id, question);
            }
            Ok(())
        })
    }

    fn find_question(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.questions.get(&id).map(|q| q.value().clone())) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    fn answer(session: Uuid, participant: Uuid, question: Uuid, points: u32) -> AnswerRecordEntity {
        AnswerRecordEntity {
            id: Uuid::new_v4(),
            session_id: session,
            participant_id: participant,
            question_id: question,
            submitted_answer: "Queen".into(),
            is_correct: points > 0,
            points_earned: points,
            answered_at: SystemTime::now(),
        }
    }

    fn participant(session: Uuid, name: &str) -> ParticipantEntity {
        ParticipantEntity {
            id: Uuid::new_v4(),
            session_id: session,
            user_id: None,
            display_name: name.into(),
            score: 0,
            is_connected: true,
            joined_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn record_answer_credits_score_once() {
        let store = MemoryStore::new();
        let session = Uuid::new_v4();
        let p = participant(session, "Alex");
        let pid = p.id;
        store.save_participant(p).await.unwrap();

        let question = Uuid::new_v4();
        let first = store.record_answer(answer(session, pid, question, 10)).await.unwrap();
        assert_eq!(first, AnswerWriteOutcome::Recorded);

        let second = store.record_answer(answer(session, pid, question, 10)).await.unwrap();
        assert_eq!(second, AnswerWriteOutcome::Duplicate);

        let stored = store.find_participant(session, pid).await.unwrap().unwrap();
        assert_eq!(stored.score, 10);
    }

    #[tokio::test]
    async fn participants_listed_in_join_order() {
        let store = MemoryStore::new();
        let session = Uuid::new_v4();
        for name in ["first", "second", "third"] {
            store.save_participant(participant(session, name)).await.unwrap();
        }

        let names: Vec<String> = store
            .list_participants(session)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.display_name)
            .collect();
        assert_eq!(names, ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn session_resolvable_by_code() {
        let store = MemoryStore::new();
        let session = HostedSessionEntity {
            id: Uuid::new_v4(),
            code: "483920".into(),
            owner_id: Uuid::new_v4(),
            name: "Friday night".into(),
            max_participants: 50,
            category_id: None,
            is_active: true,
            current_question_index: 0,
            question_ids: Vec::new(),
            created_at: SystemTime::now(),
            started_at: None,
            ended_at: None,
        };
        let id = session.id;
        store.save_session(session).await.unwrap();

        let found = store.find_session_by_code("483920".into()).await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert!(store.find_session_by_code("000000".into()).await.unwrap().is_none());
    }
}
