//! Connection status tracking
//!
//! One entry per open session instance. Absence of an entry reads as
//! Disconnected, so observers never need to special-case unknown ids.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;

/// Lifecycle state of a session instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    AwaitingCredentials,
    Connecting,
    Connected,
    Disconnected,
    Error,
}

/// Status entry for one session instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<usize>,
}

impl ConnectionStatus {
    pub fn idle() -> Self {
        Self {
            state: ConnectionState::Idle,
            message: None,
            step: None,
        }
    }

    pub fn awaiting_credentials() -> Self {
        Self {
            state: ConnectionState::AwaitingCredentials,
            message: Some("Waiting for credentials".to_string()),
            step: None,
        }
    }

    pub fn connecting(step: usize, message: impl Into<String>) -> Self {
        Self {
            state: ConnectionState::Connecting,
            message: Some(message.into()),
            step: Some(step),
        }
    }

    pub fn connected() -> Self {
        Self {
            state: ConnectionState::Connected,
            message: Some("Connection established".to_string()),
            step: Some(FINAL_PROGRESS_STEP),
        }
    }

    pub fn disconnected(message: Option<String>) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            message,
            step: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            state: ConnectionState::Error,
            message: Some(message.into()),
            step: None,
        }
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::disconnected(None)
    }
}

/// One step of the connection progress checklist
#[derive(Debug, Clone, Copy)]
pub struct ProgressStep {
    pub label: &'static str,
    marker: &'static str,
}

/// Ordered checklist shown while a session is Connecting. Progress
/// messages map to a step by case-insensitive substring match, and the
/// resulting index never goes backwards.
pub const PROGRESS_STEPS: [ProgressStep; 9] = [
    ProgressStep {
        label: "Opening TCP connection",
        marker: "connecting to",
    },
    ProgressStep {
        label: "Creating session",
        marker: "creating ssh session",
    },
    ProgressStep {
        label: "SSH handshake",
        marker: "handshake",
    },
    ProgressStep {
        label: "Authenticating",
        marker: "authenticating",
    },
    ProgressStep {
        label: "Authentication successful",
        marker: "authentication successful",
    },
    ProgressStep {
        label: "Opening remote session",
        marker: "opening remote session",
    },
    ProgressStep {
        label: "Starting shell",
        marker: "starting shell",
    },
    ProgressStep {
        label: "Setting up terminal I/O",
        marker: "terminal i/o",
    },
    ProgressStep {
        label: "Connection established",
        marker: "connection established",
    },
];

pub const FINAL_PROGRESS_STEP: usize = PROGRESS_STEPS.len() - 1;

/// Highest checklist step whose marker appears in the message
pub fn match_step(message: &str) -> Option<usize> {
    let message = message.to_lowercase();
    PROGRESS_STEPS
        .iter()
        .enumerate()
        .rev()
        .find(|(_, step)| message.contains(step.marker))
        .map(|(idx, _)| idx)
}

/// Change notification payload
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub instance_id: String,
    pub status: ConnectionStatus,
}

/// Observable table of per-instance connection status
pub struct StatusTable {
    entries: RwLock<HashMap<String, ConnectionStatus>>,
    change_tx: broadcast::Sender<StatusChange>,
}

impl StatusTable {
    pub fn new() -> Self {
        let (change_tx, _) = broadcast::channel(256);
        Self {
            entries: RwLock::new(HashMap::new()),
            change_tx,
        }
    }

    /// Status for an instance. Unknown ids read as Disconnected.
    pub fn get(&self, instance_id: &str) -> ConnectionStatus {
        self.entries
            .read()
            .get(instance_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set(&self, instance_id: &str, status: ConnectionStatus) {
        self.entries
            .write()
            .insert(instance_id.to_string(), status.clone());
        let _ = self.change_tx.send(StatusChange {
            instance_id: instance_id.to_string(),
            status,
        });
    }

    /// Insert an Idle entry if the instance has none yet
    pub fn ensure(&self, instance_id: &str) {
        let inserted = {
            let mut entries = self.entries.write();
            if entries.contains_key(instance_id) {
                false
            } else {
                entries.insert(instance_id.to_string(), ConnectionStatus::idle());
                true
            }
        };
        if inserted {
            let _ = self.change_tx.send(StatusChange {
                instance_id: instance_id.to_string(),
                status: ConnectionStatus::idle(),
            });
        }
    }

    /// Drop the entry for a destroyed instance. Reads fall back to
    /// Disconnected afterwards.
    pub fn remove(&self, instance_id: &str) {
        let removed = self.entries.write().remove(instance_id).is_some();
        if removed {
            let _ = self.change_tx.send(StatusChange {
                instance_id: instance_id.to_string(),
                status: ConnectionStatus::default(),
            });
        }
    }

    pub fn contains(&self, instance_id: &str) -> bool {
        self.entries.read().contains_key(instance_id)
    }

    /// Snapshot of all entries
    pub fn entries(&self) -> Vec<(String, ConnectionStatus)> {
        self.entries
            .read()
            .iter()
            .map(|(id, status)| (id.clone(), status.clone()))
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.change_tx.subscribe()
    }
}

impl Default for StatusTable {
    fn default() -> Self {
        Self::new()
    }
}
