pub mod registry;
pub mod room;
pub mod state_machine;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::session_store::{QuestionBank, SessionStore},
    error::ServiceError,
};

pub use self::registry::SessionRegistry;
pub use self::room::{QuestionRuntime, RevealTimer, Room, RoomConnection};
pub use self::state_machine::{
    AbortError, ApplyError, Plan, PlanError, PlanId, QuestionPhase, RevealTrigger, SessionEvent,
    SessionPhase, Snapshot,
};

/// Shared handle to the application state.
pub type SharedState = Arc<AppState>;

/// Installed persistence backends: the durable session store and the
/// read-mostly question bank. Usually one object implementing both traits.
#[derive(Clone)]
pub struct Storage {
    /// Durable sessions, participants and the answer log.
    pub sessions: Arc<dyn SessionStore>,
    /// Question lookup used by the scoring engine.
    pub questions: Arc<dyn QuestionBank>,
}

/// Central application state: the room registry, the storage slot, and the
/// degraded-mode flag.
pub struct AppState {
    config: AppConfig,
    storage: RwLock<Option<Storage>>,
    registry: SessionRegistry,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned
    /// cheaply. The application starts in degraded mode until a storage
    /// backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let transition_timeout = config.transition_timeout();
        Arc::new(Self {
            config,
            storage: RwLock::new(None),
            registry: SessionRegistry::new(transition_timeout),
            degraded: degraded_tx,
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Registry mapping session codes to live rooms.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Obtain the installed storage backends, if any.
    pub async fn storage(&self) -> Option<Storage> {
        let guard = self.storage.read().await;
        guard.clone()
    }

    /// Storage backends or a degraded-mode error for the caller to surface.
    pub async fn require_storage(&self) -> Result<Storage, ServiceError> {
        self.storage().await.ok_or(ServiceError::Degraded)
    }

    /// Install storage backends and leave degraded mode.
    pub async fn install_storage(&self, storage: Storage) {
        {
            let mut guard = self.storage.write().await;
            *guard = Some(storage);
        }
        self.update_degraded(false).await;
    }

    /// Remove the storage backends and enter degraded mode.
    pub async fn clear_storage(&self) {
        {
            let mut guard = self.storage.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.storage.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        if *self.degraded.borrow() == value {
            return;
        }

        let _ = self.degraded.send(value);
    }
}
