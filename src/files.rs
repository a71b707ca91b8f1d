//! Remote file browsing over a connected session
//!
//! Every operation opens its own short-lived file connection on the
//! gateway side, so nothing here holds transport state. Credentials are
//! taken from the caller on each call and are never cached.

use crate::error::{AppError, AppResult};
use crate::gateway::{AuthMethod, FileEntry, TransportGateway};
use crate::logging::{self, LogLevel, LogSubsystem};
use crate::session::SessionManager;
use crate::status::{ConnectionState, StatusTable};
use std::sync::Arc;

pub struct FileAdapter {
    gateway: Arc<dyn TransportGateway>,
    sessions: Arc<SessionManager>,
    status: Arc<StatusTable>,
}

impl FileAdapter {
    pub fn new(
        gateway: Arc<dyn TransportGateway>,
        sessions: Arc<SessionManager>,
        status: Arc<StatusTable>,
    ) -> Self {
        Self {
            gateway,
            sessions,
            status,
        }
    }

    /// List a remote directory. Entries come back sorted with directories
    /// first and a ".." parent entry prepended when one exists.
    pub async fn list(
        &self,
        instance_id: &str,
        path: &str,
        password: Option<&str>,
    ) -> AppResult<Vec<FileEntry>> {
        self.check(instance_id, password)?;
        let result = self.gateway.list_directory(instance_id, path, password).await;
        if let Err(e) = &result {
            logging::log_session(
                LogLevel::Warn,
                LogSubsystem::Files,
                instance_id,
                format!("Listing {} failed: {}", path, e),
            );
        }
        result
    }

    pub async fn download(
        &self,
        instance_id: &str,
        remote_path: &str,
        local_path: &str,
        password: Option<&str>,
    ) -> AppResult<()> {
        self.check(instance_id, password)?;
        let result = self
            .gateway
            .download(instance_id, remote_path, local_path, password)
            .await;
        match &result {
            Ok(()) => logging::log_session(
                LogLevel::Info,
                LogSubsystem::Files,
                instance_id,
                format!("Downloaded {}", remote_path),
            ),
            Err(e) => logging::log_session(
                LogLevel::Warn,
                LogSubsystem::Files,
                instance_id,
                format!("Download of {} failed: {}", remote_path, e),
            ),
        }
        result
    }

    pub async fn upload(
        &self,
        instance_id: &str,
        local_path: &str,
        remote_path: &str,
        password: Option<&str>,
    ) -> AppResult<()> {
        self.check(instance_id, password)?;
        let result = self
            .gateway
            .upload(instance_id, local_path, remote_path, password)
            .await;
        match &result {
            Ok(()) => logging::log_session(
                LogLevel::Info,
                LogSubsystem::Files,
                instance_id,
                format!("Uploaded to {}", remote_path),
            ),
            Err(e) => logging::log_session(
                LogLevel::Warn,
                LogSubsystem::Files,
                instance_id,
                format!("Upload to {} failed: {}", remote_path, e),
            ),
        }
        result
    }

    pub async fn delete(
        &self,
        instance_id: &str,
        remote_path: &str,
        password: Option<&str>,
    ) -> AppResult<()> {
        self.check(instance_id, password)?;
        let result = self
            .gateway
            .delete_remote(instance_id, remote_path, password)
            .await;
        match &result {
            Ok(()) => logging::log_session(
                LogLevel::Info,
                LogSubsystem::Files,
                instance_id,
                format!("Deleted {}", remote_path),
            ),
            Err(e) => logging::log_session(
                LogLevel::Warn,
                LogSubsystem::Files,
                instance_id,
                format!("Delete of {} failed: {}", remote_path, e),
            ),
        }
        result
    }

    /// File operations need a session that is currently Connected, and
    /// password-auth sessions need the password passed in per call
    fn check(&self, instance_id: &str, password: Option<&str>) -> AppResult<()> {
        let instance = self.sessions.get(instance_id)?;

        if self.status.get(instance_id).state != ConnectionState::Connected {
            return Err(AppError::Connection(format!(
                "Session {} is not connected",
                instance_id
            )));
        }

        if matches!(instance.params.auth_method, AuthMethod::Password) && password.is_none() {
            return Err(AppError::MissingCredential(instance_id.to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayEvent;
    use crate::test_utils::{test_profile, GatewayCall, MockGateway};

    async fn setup_connected(
        auth_method: AuthMethod,
    ) -> (Arc<MockGateway>, Arc<SessionManager>, FileAdapter, String) {
        let (gateway, _events) = MockGateway::new();
        let status = Arc::new(StatusTable::new());
        let sessions = Arc::new(SessionManager::new(gateway.clone(), status.clone()));
        let files = FileAdapter::new(gateway.clone(), sessions.clone(), status);

        let profile = test_profile("web", auth_method);
        let instance = sessions.open(&profile);
        sessions.connect(&instance.id).await.unwrap();
        sessions.apply_event(GatewayEvent::connected(&instance.id)).await;
        (gateway, sessions, files, instance.id.clone())
    }

    #[tokio::test]
    async fn test_list_requires_known_session() {
        let (gateway, _events) = MockGateway::new();
        let status = Arc::new(StatusTable::new());
        let sessions = Arc::new(SessionManager::new(gateway.clone(), status.clone()));
        let files = FileAdapter::new(gateway, sessions, status);

        assert!(matches!(
            files.list("ghost", "/", None).await,
            Err(AppError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_requires_connected_state() {
        let (gateway, _events) = MockGateway::new();
        let status = Arc::new(StatusTable::new());
        let sessions = Arc::new(SessionManager::new(gateway.clone(), status.clone()));
        let files = FileAdapter::new(gateway.clone(), sessions.clone(), status);

        // Opened but never connected
        let profile = test_profile("web", AuthMethod::Agent);
        let instance = sessions.open(&profile);

        assert!(matches!(
            files.list(&instance.id, "/", None).await,
            Err(AppError::Connection(_))
        ));
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_password_sessions_need_password_each_call() {
        let (gateway, sessions, files, id) = setup_connected(AuthMethod::Password).await;

        // A password cached for the terminal connection is never reused here
        sessions
            .supply_credentials(&id, "hunter2".to_string())
            .await
            .unwrap();
        assert!(matches!(
            files.list(&id, "/home", None).await,
            Err(AppError::MissingCredential(_))
        ));

        files.list(&id, "/home", Some("hunter2")).await.unwrap();
        let calls = gateway.calls();
        assert!(calls.contains(&GatewayCall::ListDirectory(id.clone(), "/home".to_string(), true)));
    }

    #[tokio::test]
    async fn test_key_sessions_need_no_password() {
        let (gateway, _sessions, files, id) = setup_connected(AuthMethod::Agent).await;
        gateway.set_list_result(vec![FileEntry {
            name: "hosts".to_string(),
            path: "/etc/hosts".to_string(),
            is_dir: false,
            size: 220,
            modified: Some(1_700_000_000),
            permissions: "-rw-r--r--".to_string(),
        }]);

        let entries = files.list(&id, "/etc", None).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "hosts");
        assert!(gateway
            .calls()
            .contains(&GatewayCall::ListDirectory(id.clone(), "/etc".to_string(), false)));
    }

    #[tokio::test]
    async fn test_transfer_ops_land_in_log_buffer() {
        let (_gateway, _sessions, files, id) = setup_connected(AuthMethod::Agent).await;
        logging::init_log_manager();

        files
            .download(&id, "/var/log/syslog", "/tmp/syslog", None)
            .await
            .unwrap();

        let manager = logging::get_log_manager().unwrap();
        let filter = logging::LogFilter {
            session_id: Some(id.clone()),
            subsystem: Some(LogSubsystem::Files),
            search: Some("/var/log/syslog".to_string()),
            ..Default::default()
        };
        let logs = manager.get_recent_logs(50, Some(filter));
        assert!(!logs.is_empty());
        assert_eq!(logs[0].session_id.as_deref(), Some(id.as_str()));
        assert_eq!(logs[0].level, LogLevel::Info);
    }

    #[tokio::test]
    async fn test_transfer_ops_pass_through() {
        let (gateway, _sessions, files, id) = setup_connected(AuthMethod::Agent).await;

        files
            .download(&id, "/var/log/syslog", "/tmp/syslog", None)
            .await
            .unwrap();
        files.upload(&id, "/tmp/notes", "/home/admin/notes", None).await.unwrap();
        files.delete(&id, "/tmp/stale", None).await.unwrap();

        let calls = gateway.calls();
        assert!(calls.contains(&GatewayCall::Download(
            id.clone(),
            "/var/log/syslog".to_string(),
            "/tmp/syslog".to_string(),
        )));
        assert!(calls.contains(&GatewayCall::Upload(
            id.clone(),
            "/tmp/notes".to_string(),
            "/home/admin/notes".to_string(),
        )));
        assert!(calls.contains(&GatewayCall::DeleteRemote(id.clone(), "/tmp/stale".to_string())));
    }
}
