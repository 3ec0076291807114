use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Errors raised by the MongoDB session store.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to save session `{id}`")]
    SaveSession {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load session")]
    LoadSession {
        #[source]
        source: MongoError,
    },
    #[error("failed to save participant `{id}`")]
    SaveParticipant {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load participants for session `{session_id}`")]
    LoadParticipants {
        session_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to record answer for participant `{participant_id}`")]
    RecordAnswer {
        participant_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to save questions")]
    SaveQuestions {
        #[source]
        source: MongoError,
    },
    #[error("failed to load question `{id}`")]
    LoadQuestion {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("environment variable `{var}` is not set")]
    MissingEnvVar { var: &'static str },
}
