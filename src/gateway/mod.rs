pub mod ssh;

use crate::error::AppResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Wire protocol for a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Ssh,
    Sftp,
    Rdp,
    Vnc,
    Telnet,
}

impl Protocol {
    /// Protocols the transport layer can actually drive
    pub fn is_supported(&self) -> bool {
        matches!(self, Protocol::Ssh | Protocol::Sftp)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Protocol::Ssh => "SSH",
            Protocol::Sftp => "SFTP",
            Protocol::Rdp => "RDP",
            Protocol::Vnc => "VNC",
            Protocol::Telnet => "Telnet",
        }
    }
}

/// Authentication method stored on a profile. Holds no secret material,
/// passwords are supplied per connection and kept in session memory only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuthMethod {
    #[serde(rename = "password")]
    Password,
    #[serde(rename = "private_key")]
    PrivateKey { path: String },
    #[serde(rename = "agent")]
    Agent,
}

impl Default for AuthMethod {
    fn default() -> Self {
        AuthMethod::Agent
    }
}

/// Credentials attached to a single connect or file request
#[derive(Clone, Deserialize)]
#[serde(tag = "type")]
pub enum AuthRequest {
    #[serde(rename = "password")]
    Password { password: String },
    #[serde(rename = "private_key")]
    PrivateKey { path: String },
    #[serde(rename = "agent")]
    Agent,
}

impl std::fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthRequest::Password { .. } => f.write_str("AuthRequest::Password([REDACTED])"),
            AuthRequest::PrivateKey { path } => write!(f, "AuthRequest::PrivateKey({})", path),
            AuthRequest::Agent => f.write_str("AuthRequest::Agent"),
        }
    }
}

/// Connection parameters snapshotted from a profile when an instance opens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub protocol: Protocol,
    pub auth_method: AuthMethod,
}

/// Remote file or directory entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<i64>,
    pub permissions: String,
}

/// Event kinds delivered on the gateway event channel
#[derive(Debug, Clone)]
pub enum EventKind {
    Progress { step: usize, message: String },
    Connected,
    Disconnected { message: Option<String> },
    OutputChunk(Vec<u8>),
}

/// An asynchronous event from the transport layer, tagged with the
/// session instance it belongs to
#[derive(Debug, Clone)]
pub struct GatewayEvent {
    pub instance_id: String,
    pub kind: EventKind,
}

impl GatewayEvent {
    pub fn progress(instance_id: impl Into<String>, step: usize, message: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            kind: EventKind::Progress {
                step,
                message: message.into(),
            },
        }
    }

    pub fn connected(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            kind: EventKind::Connected,
        }
    }

    pub fn disconnected(instance_id: impl Into<String>, message: Option<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            kind: EventKind::Disconnected { message },
        }
    }

    pub fn output(instance_id: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            instance_id: instance_id.into(),
            kind: EventKind::OutputChunk(data),
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<GatewayEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<GatewayEvent>;

/// Boundary to the transport layer. Connection negotiation and shell I/O
/// happen behind this trait; results come back either as return values or
/// as [`GatewayEvent`]s on the channel handed out at construction.
///
/// File operations are stateless: each call opens a fresh connection with
/// the credentials passed in and retains nothing afterwards.
#[async_trait]
pub trait TransportGateway: Send + Sync {
    /// Negotiate a connection for the given instance. Progress and the
    /// final `Connected` notification arrive on the event channel.
    async fn connect(&self, instance_id: &str, params: ConnectParams, auth: AuthRequest) -> AppResult<()>;

    /// Queue input bytes for the remote shell
    fn send_input(&self, instance_id: &str, data: &[u8]) -> AppResult<()>;

    /// Queue a terminal resize for the remote shell
    fn resize(&self, instance_id: &str, cols: u32, rows: u32) -> AppResult<()>;

    /// Tear down the connection for the given instance
    async fn disconnect(&self, instance_id: &str) -> AppResult<()>;

    async fn list_directory(
        &self,
        instance_id: &str,
        path: &str,
        password: Option<&str>,
    ) -> AppResult<Vec<FileEntry>>;

    async fn download(
        &self,
        instance_id: &str,
        remote_path: &str,
        local_path: &str,
        password: Option<&str>,
    ) -> AppResult<()>;

    async fn upload(
        &self,
        instance_id: &str,
        local_path: &str,
        remote_path: &str,
        password: Option<&str>,
    ) -> AppResult<()>;

    async fn delete_remote(
        &self,
        instance_id: &str,
        remote_path: &str,
        password: Option<&str>,
    ) -> AppResult<()>;
}
