use crate::gateway::{AuthMethod, AuthRequest, ConnectParams, Protocol};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Session instance summary for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub id: String,
    pub profile_id: String,
    pub label: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub protocol: Protocol,
    pub opened_at: i64,
}

/// One open connection instance, created from a profile snapshot.
/// Later edits or deletion of the profile never affect it.
pub struct SessionInstance {
    pub id: String,
    pub profile_id: String,
    pub profile_name: String,
    pub label: String,
    pub params: ConnectParams,
    pub opened_at: i64,
    state: RwLock<InstanceState>,
}

#[derive(Default)]
struct InstanceState {
    password: Option<String>,
    connecting: bool,
    close_pending: bool,
}

impl SessionInstance {
    pub(crate) fn new(
        id: String,
        profile_id: String,
        profile_name: String,
        label: String,
        params: ConnectParams,
    ) -> Self {
        Self {
            id,
            profile_id,
            profile_name,
            label,
            params,
            opened_at: chrono::Utc::now().timestamp(),
            state: RwLock::new(InstanceState::default()),
        }
    }

    pub fn info(&self) -> InstanceInfo {
        InstanceInfo {
            id: self.id.clone(),
            profile_id: self.profile_id.clone(),
            label: self.label.clone(),
            host: self.params.host.clone(),
            port: self.params.port,
            username: self.params.username.clone(),
            protocol: self.params.protocol,
            opened_at: self.opened_at,
        }
    }

    /// Password supplied for this instance, held in memory only
    pub fn cached_password(&self) -> Option<String> {
        self.state.read().password.clone()
    }

    pub(crate) fn set_password(&self, password: String) {
        self.state.write().password = Some(password);
    }

    /// Credentials for a connect attempt. None when password auth has no
    /// cached password yet.
    pub fn auth_request(&self) -> Option<AuthRequest> {
        match &self.params.auth_method {
            AuthMethod::Password => self
                .cached_password()
                .map(|password| AuthRequest::Password { password }),
            AuthMethod::PrivateKey { path } => Some(AuthRequest::PrivateKey { path: path.clone() }),
            AuthMethod::Agent => Some(AuthRequest::Agent),
        }
    }

    /// Claim the single connect slot. Returns false if an attempt is
    /// already in flight.
    pub(crate) fn begin_connect(&self) -> bool {
        let mut state = self.state.write();
        if state.connecting {
            false
        } else {
            state.connecting = true;
            true
        }
    }

    pub(crate) fn end_connect(&self) {
        self.state.write().connecting = false;
    }

    pub(crate) fn is_connecting(&self) -> bool {
        self.state.read().connecting
    }

    pub(crate) fn mark_close_pending(&self) {
        self.state.write().close_pending = true;
    }

    pub(crate) fn is_close_pending(&self) -> bool {
        self.state.read().close_pending
    }
}
