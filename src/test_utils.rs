//! Shared test doubles and helpers

use crate::config::Profile;
use crate::error::{AppError, AppResult};
use crate::gateway::{
    AuthMethod, AuthRequest, ConnectParams, EventReceiver, EventSender, FileEntry, GatewayEvent,
    TransportGateway,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// One recorded call against the mock gateway, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Connect(String),
    SendInput(String, Vec<u8>),
    Resize(String, u32, u32),
    Disconnect(String),
    /// instance, path, password supplied
    ListDirectory(String, String, bool),
    Download(String, String, String),
    Upload(String, String, String),
    DeleteRemote(String, String),
}

/// Scriptable in-memory gateway. Records every call; connect and
/// disconnect outcomes are configurable, and a gated variant parks
/// connect calls until released so mid-connect races can be staged.
pub struct MockGateway {
    events: EventSender,
    calls: Mutex<Vec<GatewayCall>>,
    connect_error: Mutex<Option<String>>,
    disconnect_error: Mutex<Option<String>>,
    list_result: Mutex<Vec<FileEntry>>,
    connect_gate: Option<Notify>,
}

impl MockGateway {
    pub fn new() -> (Arc<Self>, EventReceiver) {
        Self::build(false)
    }

    /// Like [`MockGateway::new`], but connect blocks until [`release`] is
    /// called
    ///
    /// [`release`]: MockGateway::release
    pub fn gated() -> (Arc<Self>, EventReceiver) {
        Self::build(true)
    }

    fn build(gated: bool) -> (Arc<Self>, EventReceiver) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let gateway = Arc::new(Self {
            events: tx,
            calls: Mutex::new(Vec::new()),
            connect_error: Mutex::new(None),
            disconnect_error: Mutex::new(None),
            list_result: Mutex::new(Vec::new()),
            connect_gate: gated.then(Notify::new),
        });
        (gateway, rx)
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().clone()
    }

    pub fn fail_connects_with(&self, message: &str) {
        *self.connect_error.lock() = Some(message.to_string());
    }

    pub fn fail_disconnects_with(&self, message: &str) {
        *self.disconnect_error.lock() = Some(message.to_string());
    }

    pub fn set_list_result(&self, entries: Vec<FileEntry>) {
        *self.list_result.lock() = entries;
    }

    /// Let one parked connect call proceed
    pub fn release(&self) {
        if let Some(gate) = &self.connect_gate {
            gate.notify_one();
        }
    }

    /// Push an event as the transport would
    pub fn emit(&self, event: GatewayEvent) {
        let _ = self.events.send(event);
    }

    fn record(&self, call: GatewayCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl TransportGateway for MockGateway {
    async fn connect(
        &self,
        instance_id: &str,
        _params: ConnectParams,
        _auth: AuthRequest,
    ) -> AppResult<()> {
        self.record(GatewayCall::Connect(instance_id.to_string()));
        if let Some(gate) = &self.connect_gate {
            gate.notified().await;
        }
        match self.connect_error.lock().clone() {
            Some(message) => Err(AppError::Connection(message)),
            None => Ok(()),
        }
    }

    fn send_input(&self, instance_id: &str, data: &[u8]) -> AppResult<()> {
        self.record(GatewayCall::SendInput(instance_id.to_string(), data.to_vec()));
        Ok(())
    }

    fn resize(&self, instance_id: &str, cols: u32, rows: u32) -> AppResult<()> {
        self.record(GatewayCall::Resize(instance_id.to_string(), cols, rows));
        Ok(())
    }

    async fn disconnect(&self, instance_id: &str) -> AppResult<()> {
        self.record(GatewayCall::Disconnect(instance_id.to_string()));
        match self.disconnect_error.lock().clone() {
            Some(message) => Err(AppError::Teardown(message)),
            None => Ok(()),
        }
    }

    async fn list_directory(
        &self,
        instance_id: &str,
        path: &str,
        password: Option<&str>,
    ) -> AppResult<Vec<FileEntry>> {
        self.record(GatewayCall::ListDirectory(
            instance_id.to_string(),
            path.to_string(),
            password.is_some(),
        ));
        Ok(self.list_result.lock().clone())
    }

    async fn download(
        &self,
        instance_id: &str,
        remote_path: &str,
        local_path: &str,
        _password: Option<&str>,
    ) -> AppResult<()> {
        self.record(GatewayCall::Download(
            instance_id.to_string(),
            remote_path.to_string(),
            local_path.to_string(),
        ));
        Ok(())
    }

    async fn upload(
        &self,
        instance_id: &str,
        local_path: &str,
        remote_path: &str,
        _password: Option<&str>,
    ) -> AppResult<()> {
        self.record(GatewayCall::Upload(
            instance_id.to_string(),
            local_path.to_string(),
            remote_path.to_string(),
        ));
        Ok(())
    }

    async fn delete_remote(
        &self,
        instance_id: &str,
        remote_path: &str,
        _password: Option<&str>,
    ) -> AppResult<()> {
        self.record(GatewayCall::DeleteRemote(
            instance_id.to_string(),
            remote_path.to_string(),
        ));
        Ok(())
    }
}

/// Profile with a fixed id so test assertions stay readable
pub fn test_profile(id: &str, auth_method: AuthMethod) -> Profile {
    let mut profile = Profile::new(
        id.to_string(),
        format!("{}.example.com", id),
        "admin".to_string(),
    );
    profile.id = id.to_string();
    profile.auth_method = auth_method;
    profile
}

/// Poll a condition until it holds or the timeout elapses
pub async fn wait_for<F>(mut condition: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
