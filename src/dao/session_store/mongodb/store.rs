use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database,
    bson::doc,
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoAnswerDocument, MongoParticipantDocument, MongoQuestionDocument,
        MongoSessionDocument, doc_id, uuid_as_binary,
    },
};
use crate::dao::{
    models::{AnswerRecordEntity, HostedSessionEntity, ParticipantEntity, QuestionEntity},
    session_store::{AnswerWriteOutcome, QuestionBank, SessionStore},
    storage::StorageResult,
};

const SESSION_COLLECTION_NAME: &str = "sessions";
const PARTICIPANT_COLLECTION_NAME: &str = "participants";
const ANSWER_COLLECTION_NAME: &str = "answers";
const QUESTION_COLLECTION_NAME: &str = "questions";

/// Duplicate-key error code returned when a unique index rejects an insert.
const DUPLICATE_KEY_CODE: i32 = 11000;

/// MongoDB-backed [`SessionStore`] and [`QuestionBank`].
#[derive(Clone)]
pub struct MongoSessionStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoSessionStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        let sessions = database.collection::<mongodb::bson::Document>(SESSION_COLLECTION_NAME);
        let code_index = mongodb::IndexModel::builder()
            .keys(doc! {"code": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("session_code_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        sessions
            .create_index(code_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: SESSION_COLLECTION_NAME,
                index: "code",
                source,
            })?;

        let participants =
            database.collection::<mongodb::bson::Document>(PARTICIPANT_COLLECTION_NAME);
        let roster_index = mongodb::IndexModel::builder()
            .keys(doc! {"session_id": 1, "joined_at": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("participant_session_idx".to_owned()))
                    .build(),
            )
            .build();
        participants
            .create_index(roster_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PARTICIPANT_COLLECTION_NAME,
                index: "session_id,joined_at",
                source,
            })?;

        // The one-answer-per-question invariant is enforced here rather than in
        // application code so concurrent submissions cannot both land.
        let answers = database.collection::<mongodb::bson::Document>(ANSWER_COLLECTION_NAME);
        let answer_index = mongodb::IndexModel::builder()
            .keys(doc! {"session_id": 1, "participant_id": 1, "question_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("answer_unique_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        answers
            .create_index(answer_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: ANSWER_COLLECTION_NAME,
                index: "session_id,participant_id,question_id",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn session_collection(&self) -> Collection<MongoSessionDocument> {
        self.database()
            .await
            .collection::<MongoSessionDocument>(SESSION_COLLECTION_NAME)
    }

    async fn participant_collection(&self) -> Collection<MongoParticipantDocument> {
        self.database()
            .await
            .collection::<MongoParticipantDocument>(PARTICIPANT_COLLECTION_NAME)
    }

    async fn answer_collection(&self) -> Collection<MongoAnswerDocument> {
        self.database()
            .await
            .collection::<MongoAnswerDocument>(ANSWER_COLLECTION_NAME)
    }

    async fn question_collection(&self) -> Collection<MongoQuestionDocument> {
        self.database()
            .await
            .collection::<MongoQuestionDocument>(QUESTION_COLLECTION_NAME)
    }

    async fn save_session(&self, session: HostedSessionEntity) -> MongoResult<()> {
        let id = session.id;
        let document: MongoSessionDocument = session.into();
        self.session_collection()
            .await
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveSession { id, source })?;
        Ok(())
    }

    async fn find_session(&self, id: Uuid) -> MongoResult<Option<HostedSessionEntity>> {
        let document = self
            .session_collection()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadSession { source })?;
        Ok(document.map(Into::into))
    }

    async fn find_session_by_code(&self, code: &str) -> MongoResult<Option<HostedSessionEntity>> {
        let document = self
            .session_collection()
            .await
            .find_one(doc! {"code": code})
            .await
            .map_err(|source| MongoDaoError::LoadSession { source })?;
        Ok(document.map(Into::into))
    }

    async fn save_participant(&self, participant: ParticipantEntity) -> MongoResult<()> {
        let id = participant.id;
        let document: MongoParticipantDocument = participant.into();
        self.participant_collection()
            .await
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveParticipant { id, source })?;
        Ok(())
    }

    async fn find_participant(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> MongoResult<Option<ParticipantEntity>> {
        let document = self
            .participant_collection()
            .await
            .find_one(doc! {
                "_id": uuid_as_binary(participant_id),
                "session_id": uuid_as_binary(session_id),
            })
            .await
            .map_err(|source| MongoDaoError::LoadParticipants { session_id, source })?;
        Ok(document.map(Into::into))
    }

    async fn list_participants(&self, session_id: Uuid) -> MongoResult<Vec<ParticipantEntity>> {
        let documents: Vec<MongoParticipantDocument> = self
            .participant_collection()
            .await
            .find(doc! {"session_id": uuid_as_binary(session_id)})
            .sort(doc! {"joined_at": 1})
            .await
            .map_err(|source| MongoDaoError::LoadParticipants { session_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadParticipants { session_id, source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn record_answer(&self, answer: AnswerRecordEntity) -> MongoResult<AnswerWriteOutcome> {
        let participant_id = answer.participant_id;
        let points = answer.points_earned;
        let document: MongoAnswerDocument = answer.into();

        match self.answer_collection().await.insert_one(&document).await {
            Ok(_) => {}
            Err(err) if is_duplicate_key(&err) => return Ok(AnswerWriteOutcome::Duplicate),
            Err(source) => {
                return Err(MongoDaoError::RecordAnswer {
                    participant_id,
                    source,
                });
            }
        }

        if points > 0 {
            self.participant_collection()
                .await
                .update_one(
                    doc_id(participant_id),
                    doc! {"$inc": {"score": points as i64}},
                )
                .await
                .map_err(|source| MongoDaoError::RecordAnswer {
                    participant_id,
                    source,
                })?;
        }

        Ok(AnswerWriteOutcome::Recorded)
    }

    async fn insert_questions(&self, questions: Vec<QuestionEntity>) -> MongoResult<()> {
        if questions.is_empty() {
            return Ok(());
        }

        let documents: Vec<MongoQuestionDocument> =
            questions.into_iter().map(Into::into).collect();
        self.question_collection()
            .await
            .insert_many(&documents)
            .await
            .map_err(|source| MongoDaoError::SaveQuestions { source })?;
        Ok(())
    }

    async fn find_question(&self, id: Uuid) -> MongoResult<Option<QuestionEntity>> {
        let document = self
            .question_collection()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadQuestion { id, source })?;
        Ok(document.map(Into::into))
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}

impl SessionStore for MongoSessionStore {
    fn save_session(&self, session: HostedSessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_session(session).await.map_err(Into::into) })
    }

    fn find_session(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<HostedSessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_session(id).await.map_err(Into::into) })
    }

    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<HostedSessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_session_by_code(&code).await.map_err(Into::into) })
    }

    fn save_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_participant(participant).await.map_err(Into::into) })
    }

    fn find_participant(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_participant(session_id, participant_id)
                .await
                .map_err(Into::into)
        })
    }

    fn list_participants(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_participants(session_id).await.map_err(Into::into) })
    }

    fn record_answer(
        &self,
        answer: AnswerRecordEntity,
    ) -> BoxFuture<'static, StorageResult<AnswerWriteOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.record_answer(answer).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}

impl QuestionBank for MongoSessionStore {
    fn insert_questions(
        &self,
        questions: Vec<QuestionEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_questions(questions).await.map_err(Into::into) })
    }

    fn find_question(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_question(id).await.map_err(Into::into) })
    }
}
