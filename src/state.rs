use crate::config::{AppSettings, ProfileManager};
use crate::error::{AppError, AppResult};
use crate::files::FileAdapter;
use crate::gateway::ssh::SshGateway;
use crate::gateway::{EventKind, EventReceiver, TransportGateway};
use crate::session::{ConnectOutcome, InstanceInfo, SessionManager};
use crate::status::StatusTable;
use crate::tabs::TabManager;
use parking_lot::RwLock;
use std::sync::Arc;

/// Global application state
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub tabs: Arc<TabManager>,
    pub files: Arc<FileAdapter>,
    pub status: Arc<StatusTable>,
    pub profiles: Arc<RwLock<ProfileManager>>,
    pub settings: Arc<RwLock<AppSettings>>,
}

impl AppState {
    /// Load config from disk and wire everything to the SSH gateway.
    /// Needs a running tokio runtime for the event dispatch task.
    pub fn new() -> AppResult<Arc<Self>> {
        let config_dir = crate::config::get_config_dir()?;

        // Load settings
        let settings = AppSettings::load(&config_dir)?;

        // Load profiles
        let profiles = ProfileManager::load(&config_dir)?;

        let (event_tx, event_rx) = tokio::sync::mpsc::unbounded_channel();
        let gateway = Arc::new(SshGateway::new(
            settings.ssh.clone(),
            settings.terminal.clone(),
            event_tx,
        ));

        Ok(Self::with_gateway(gateway, event_rx, profiles, settings))
    }

    /// Assemble the managers around an arbitrary gateway implementation
    pub fn with_gateway(
        gateway: Arc<dyn TransportGateway>,
        events: EventReceiver,
        profiles: ProfileManager,
        settings: AppSettings,
    ) -> Arc<Self> {
        let status = Arc::new(StatusTable::new());
        let sessions = Arc::new(SessionManager::new(gateway.clone(), status.clone()));
        let tabs = Arc::new(TabManager::new(
            gateway.clone(),
            sessions.clone(),
            status.clone(),
        ));
        let files = Arc::new(FileAdapter::new(gateway, sessions.clone(), status.clone()));

        let state = Arc::new(Self {
            sessions,
            tabs,
            files,
            status,
            profiles: Arc::new(RwLock::new(profiles)),
            settings: Arc::new(RwLock::new(settings)),
        });

        tokio::spawn(dispatch_events(state.clone(), events));
        state
    }

    /// Open a new session instance for a profile and give it a tab
    pub fn open_profile(&self, profile_id: &str) -> AppResult<InstanceInfo> {
        let profile = self
            .profiles
            .read()
            .get(profile_id)
            .ok_or_else(|| AppError::ProfileNotFound(profile_id.to_string()))?;

        let instance = self.sessions.open(&profile);

        // Last-used is bookkeeping; an unwritable config dir should not
        // block the session
        if let Err(e) = self.profiles.write().touch(profile_id) {
            tracing::warn!("Failed to record profile use for {}: {}", profile_id, e);
        }

        self.tabs.open_tab(&instance.id);
        Ok(instance.info())
    }

    pub async fn connect(&self, instance_id: &str) -> AppResult<ConnectOutcome> {
        self.sessions.connect(instance_id).await
    }

    pub async fn supply_credentials(
        &self,
        instance_id: &str,
        password: String,
    ) -> AppResult<ConnectOutcome> {
        self.sessions.supply_credentials(instance_id, password).await
    }

    pub async fn close_tab(&self, instance_id: &str) -> AppResult<()> {
        self.tabs.close_tab(instance_id).await
    }

    /// Tear down every open session. Called once on application exit.
    pub async fn shutdown(&self) -> AppResult<()> {
        self.tabs.close_all().await
    }
}

/// Pump gateway events into the managers until the channel closes
async fn dispatch_events(state: Arc<AppState>, mut events: EventReceiver) {
    while let Some(event) = events.recv().await {
        match event.kind {
            EventKind::OutputChunk(data) => {
                state.tabs.route_output(&event.instance_id, data);
            }
            _ => state.sessions.apply_event(event).await,
        }
    }
    tracing::debug!("Gateway event channel closed");
}
