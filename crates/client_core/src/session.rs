use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::domain::{Principal, UserRole};
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

use crate::{
    api::BackendApi,
    http::HttpBackend,
    sync::{SyncClient, SyncEvent},
};

const EVENT_CAPACITY: usize = 256;

/// Opens a backend for an identity, or for an anonymous caller.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, principal: Option<&Principal>) -> Result<Connection>;
}

pub struct Connection {
    pub api: Arc<dyn BackendApi>,
    /// Role reported when the session was issued, if the backend returns one.
    pub role: Option<UserRole>,
}

pub struct HttpConnector {
    server_url: String,
}

impl HttpConnector {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
        }
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(&self, principal: Option<&Principal>) -> Result<Connection> {
        let backend = HttpBackend::new(&self.server_url)?;
        let Some(principal) = principal else {
            return Ok(Connection {
                api: Arc::new(backend),
                role: None,
            });
        };
        let login = backend.login(principal).await?;
        Ok(Connection {
            api: Arc::new(backend.with_token(login.token)),
            role: Some(login.role),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginStatus {
    Idle,
    LoggingIn,
    Success,
    LoginError(String),
}

struct SessionState {
    status: LoginStatus,
    identity: Option<Principal>,
    sync: Arc<SyncClient>,
}

/// Authentication context: who the caller is and the sync client bound to
/// that identity. Every identity change swaps in a fresh cache.
pub struct SessionContext {
    connector: Arc<dyn Connector>,
    events: broadcast::Sender<SyncEvent>,
    state: RwLock<SessionState>,
}

impl SessionContext {
    /// Resolves the anonymous identity and returns a ready context.
    pub async fn init(connector: Arc<dyn Connector>) -> Result<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let connection = connector.connect(None).await?;
        let sync = Arc::new(SyncClient::with_events(connection.api, events.clone()));
        Ok(Self {
            connector,
            events,
            state: RwLock::new(SessionState {
                status: LoginStatus::Idle,
                identity: None,
                sync,
            }),
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub async fn status(&self) -> LoginStatus {
        self.state.read().await.status.clone()
    }

    pub async fn identity(&self) -> Option<Principal> {
        self.state.read().await.identity.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.identity.is_some()
    }

    pub async fn sync(&self) -> Arc<SyncClient> {
        Arc::clone(&self.state.read().await.sync)
    }

    /// Signs in as `principal`. An existing identity is logged out first.
    pub async fn login(&self, principal: Principal) -> Result<()> {
        if principal.as_str().trim().is_empty() {
            return Err(anyhow!("principal cannot be empty"));
        }
        if self.is_authenticated().await {
            warn!("login requested while already authenticated; logging out first");
            self.logout().await?;
        }
        {
            let mut state = self.state.write().await;
            if state.status == LoginStatus::LoggingIn {
                return Err(anyhow!("a login is already in progress"));
            }
            state.status = LoginStatus::LoggingIn;
        }

        match self.connector.connect(Some(&principal)).await {
            Ok(connection) => {
                let sync = Arc::new(SyncClient::with_events(connection.api, self.events.clone()));
                let mut state = self.state.write().await;
                state.sync.cache().clear().await;
                state.sync = sync;
                state.identity = Some(principal.clone());
                state.status = LoginStatus::Success;
                info!(principal = %principal, role = ?connection.role, "logged in");
                Ok(())
            }
            Err(err) => {
                let mut state = self.state.write().await;
                state.status = LoginStatus::LoginError(format!("{err:#}"));
                Err(err)
            }
        }
    }

    /// Drops the identity and every cached query.
    pub async fn logout(&self) -> Result<()> {
        let connection = self.connector.connect(None).await?;
        let mut state = self.state.write().await;
        state.sync.cache().clear().await;
        state.sync = Arc::new(SyncClient::with_events(connection.api, self.events.clone()));
        if let Some(principal) = state.identity.take() {
            info!(principal = %principal, "logged out");
        }
        state.status = LoginStatus::Idle;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
