//! Session lifecycle management
//!
//! Instances are opened from profile snapshots, driven through connect
//! and disconnect, and updated from gateway events. All status writes go
//! through the shared [`StatusTable`].

pub mod instance;

pub use instance::{InstanceInfo, SessionInstance};

use crate::config::Profile;
use crate::error::{AppError, AppResult};
use crate::gateway::{ConnectParams, EventKind, GatewayEvent, TransportGateway};
use crate::logging::{self, LogLevel, LogSubsystem};
use crate::status::{self, ConnectionState, ConnectionStatus, StatusTable};
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Result of a connect request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Negotiation completed; the Connected event follows on the channel
    Started,
    /// Password auth with no cached password; supply_credentials resumes
    CredentialsRequired,
    /// The instance already has a live or in-flight connection
    AlreadyActive,
}

/// Owns the set of open session instances and drives their lifecycle
pub struct SessionManager {
    gateway: Arc<dyn TransportGateway>,
    status: Arc<StatusTable>,
    sessions: DashMap<String, Arc<SessionInstance>>,
}

impl SessionManager {
    pub fn new(gateway: Arc<dyn TransportGateway>, status: Arc<StatusTable>) -> Self {
        Self {
            gateway,
            status,
            sessions: DashMap::new(),
        }
    }

    /// Open a new instance from a profile snapshot
    pub fn open(&self, profile: &Profile) -> Arc<SessionInstance> {
        self.register(&profile.id, &profile.name, profile.connect_params())
    }

    /// Open another instance with the same snapshot as an existing one
    pub fn duplicate(&self, instance_id: &str) -> AppResult<Arc<SessionInstance>> {
        let existing = self.get(instance_id)?;
        Ok(self.register(
            &existing.profile_id,
            &existing.profile_name,
            existing.params.clone(),
        ))
    }

    fn register(
        &self,
        profile_id: &str,
        profile_name: &str,
        params: ConnectParams,
    ) -> Arc<SessionInstance> {
        // First instance takes the profile id; later ones get a suffix and
        // a timestamped label so tabs stay distinguishable
        let (id, label) = if self.sessions.contains_key(profile_id) {
            let mut id = new_instance_id(profile_id);
            while self.sessions.contains_key(&id) {
                id = new_instance_id(profile_id);
            }
            let label = format!("{} ({})", profile_name, chrono::Utc::now().format("%H:%M:%S"));
            (id, label)
        } else {
            (profile_id.to_string(), profile_name.to_string())
        };

        let instance = Arc::new(SessionInstance::new(
            id.clone(),
            profile_id.to_string(),
            profile_name.to_string(),
            label,
            params,
        ));
        self.sessions.insert(id.clone(), instance.clone());
        self.status
            .set(&id, ConnectionStatus::connecting(0, "Initializing connection..."));

        logging::log_session(
            LogLevel::Info,
            LogSubsystem::Session,
            &id,
            format!("Opened session for profile {}", profile_id),
        );
        tracing::info!("Opened session {} (profile {})", id, profile_id);
        instance
    }

    pub fn get(&self, instance_id: &str) -> AppResult<Arc<SessionInstance>> {
        self.sessions
            .get(instance_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| AppError::SessionNotFound(instance_id.to_string()))
    }

    fn get_opt(&self, instance_id: &str) -> Option<Arc<SessionInstance>> {
        self.sessions.get(instance_id).map(|entry| entry.clone())
    }

    pub fn contains(&self, instance_id: &str) -> bool {
        self.sessions.contains_key(instance_id)
    }

    pub fn list(&self) -> Vec<InstanceInfo> {
        self.sessions.iter().map(|entry| entry.info()).collect()
    }

    /// Start (or resume) connecting an instance. Password sessions without
    /// a cached password park in AwaitingCredentials instead of failing.
    pub async fn connect(&self, instance_id: &str) -> AppResult<ConnectOutcome> {
        let instance = self.get(instance_id)?;

        if self.status.get(instance_id).state == ConnectionState::Connected {
            return Ok(ConnectOutcome::AlreadyActive);
        }

        let auth = match instance.auth_request() {
            Some(auth) => auth,
            None => {
                self.status
                    .set(instance_id, ConnectionStatus::awaiting_credentials());
                tracing::info!("Waiting for credentials (session {})", instance_id);
                return Ok(ConnectOutcome::CredentialsRequired);
            }
        };

        let params = instance.params.clone();
        if !params.protocol.is_supported() {
            let reason = format!("{} support is not implemented", params.protocol.label());
            self.status.set(instance_id, ConnectionStatus::error(reason.clone()));
            return Err(AppError::Connection(reason));
        }

        if !instance.begin_connect() {
            return Ok(ConnectOutcome::AlreadyActive);
        }

        self.status
            .set(instance_id, ConnectionStatus::connecting(0, "Initializing connection..."));

        let result = self.gateway.connect(instance_id, params, auth).await;
        instance.end_connect();

        if let Err(e) = result {
            let reason = logging::sanitize(&e.to_string());
            self.status.set(instance_id, ConnectionStatus::error(reason.clone()));
            logging::log_session(
                LogLevel::Error,
                LogSubsystem::Session,
                instance_id,
                format!("Connect failed: {}", reason),
            );
            tracing::warn!("Connect failed (session {}): {}", instance_id, reason);

            if instance.is_close_pending() {
                self.finalize_close(instance_id, false).await;
            }
            return Err(AppError::Connection(reason));
        }

        Ok(ConnectOutcome::Started)
    }

    /// Cache a password for the instance and resume connecting
    pub async fn supply_credentials(
        &self,
        instance_id: &str,
        password: String,
    ) -> AppResult<ConnectOutcome> {
        let instance = self.get(instance_id)?;
        instance.set_password(password);
        self.connect(instance_id).await
    }

    /// Tear down an instance's connection. Teardown failures are logged,
    /// never surfaced; the session always reads Disconnected afterwards.
    pub async fn disconnect(&self, instance_id: &str) -> AppResult<()> {
        self.get(instance_id)?;

        if let Err(e) = self.gateway.disconnect(instance_id).await {
            tracing::warn!("Teardown error (session {}): {}", instance_id, e);
            logging::log_session(
                LogLevel::Warn,
                LogSubsystem::Session,
                instance_id,
                format!("Teardown error: {}", e),
            );
        }

        self.status
            .set(instance_id, ConnectionStatus::disconnected(None));
        Ok(())
    }

    /// Close an instance. Live connections are torn down first; an
    /// instance mid-connect is marked and reconciled when the attempt
    /// resolves.
    pub async fn close(&self, instance_id: &str) -> AppResult<()> {
        let instance = self.get(instance_id)?;

        match self.status.get(instance_id).state {
            ConnectionState::Connected => {
                self.disconnect(instance_id).await?;
                self.destroy(instance_id);
            }
            ConnectionState::Connecting if instance.is_connecting() => {
                instance.mark_close_pending();
                tracing::info!("Close pending until connect resolves (session {})", instance_id);
            }
            _ => {
                // A remote drop leaves transport state behind; purge it
                if self.gateway.disconnect(instance_id).await.is_ok() {
                    tracing::debug!("Purged stale transport state (session {})", instance_id);
                }
                self.destroy(instance_id);
            }
        }
        Ok(())
    }

    /// Apply a gateway event to the instance it belongs to. Output chunks
    /// are routed by the tab manager and ignored here.
    pub async fn apply_event(&self, event: GatewayEvent) {
        let instance_id = event.instance_id;
        match event.kind {
            EventKind::Progress { step: _, message } => self.apply_progress(&instance_id, &message),
            EventKind::Connected => self.apply_connected(&instance_id).await,
            EventKind::Disconnected { message } => self.apply_disconnected(&instance_id, message),
            EventKind::OutputChunk(_) => {}
        }
    }

    fn apply_progress(&self, instance_id: &str, message: &str) {
        if self.get_opt(instance_id).is_none() {
            return;
        }

        let current = self.status.get(instance_id);
        if current.state != ConnectionState::Connecting {
            tracing::debug!(
                "Ignoring progress in state {:?} (session {})",
                current.state,
                instance_id
            );
            return;
        }

        // The checklist index only ever moves forward within an attempt
        let derived = status::match_step(message);
        let step = match (current.step, derived) {
            (Some(current_step), Some(new_step)) => Some(current_step.max(new_step)),
            (None, Some(new_step)) => Some(new_step),
            (current_step, None) => current_step,
        };

        self.status.set(
            instance_id,
            ConnectionStatus {
                state: ConnectionState::Connecting,
                message: Some(message.to_string()),
                step,
            },
        );
    }

    async fn apply_connected(&self, instance_id: &str) {
        let instance = match self.get_opt(instance_id) {
            Some(instance) => instance,
            None => return,
        };

        self.status.set(instance_id, ConnectionStatus::connected());
        logging::log_session(LogLevel::Info, LogSubsystem::Session, instance_id, "Connected");

        // A close requested mid-connect resolves now
        if instance.is_close_pending() {
            self.finalize_close(instance_id, true).await;
        }
    }

    fn apply_disconnected(&self, instance_id: &str, message: Option<String>) {
        let instance = match self.get_opt(instance_id) {
            Some(instance) => instance,
            None => return,
        };

        self.status
            .set(instance_id, ConnectionStatus::disconnected(message));

        if instance.is_close_pending() {
            self.destroy(instance_id);
        }
    }

    async fn finalize_close(&self, instance_id: &str, teardown: bool) {
        if teardown {
            if let Err(e) = self.gateway.disconnect(instance_id).await {
                tracing::warn!("Teardown error (session {}): {}", instance_id, e);
            }
        }
        self.destroy(instance_id);
    }

    fn destroy(&self, instance_id: &str) {
        self.sessions.remove(instance_id);
        self.status.remove(instance_id);
        logging::log_session(LogLevel::Info, LogSubsystem::Session, instance_id, "Session closed");
        tracing::info!("Session closed ({})", instance_id);
    }
}

fn new_instance_id(profile_id: &str) -> String {
    let token = Uuid::new_v4().simple().to_string();
    format!("{}#{}", profile_id, &token[..8])
}
