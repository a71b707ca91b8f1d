//! SSH transport implementation
//!
//! Interactive sessions negotiate on a blocking task and then hand their
//! channel to a dedicated I/O thread. File operations run on separate
//! short-lived connections so transfers never block terminal I/O.

use crate::config::{SshSettings, TerminalSettings};
use crate::error::{AppError, AppResult};
use crate::logging::{self, LogLevel, LogSubsystem};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use ssh2::{Channel, FileStat, Session as Ssh2Session, Sftp};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

use super::{
    AuthMethod, AuthRequest, ConnectParams, EventSender, FileEntry, GatewayEvent, TransportGateway,
};

const MAX_PENDING_BYTES: usize = 256 * 1024; // 256KB write buffer
const WRITE_CHUNK_BYTES: usize = 8 * 1024; // limit each write call
const COMMAND_QUEUE_DEPTH: usize = 1024;

enum ShellCommand {
    Write(Vec<u8>),
    Resize(u32, u32),
    Close,
}

/// Registry entry for an instance with a live or pending shell
struct ActiveSession {
    params: ConnectParams,
    cmd_tx: RwLock<Option<mpsc::Sender<ShellCommand>>>,
}

/// Negotiated connection ready for the I/O loop
struct Established {
    session: Ssh2Session,
    channel: Channel,
}

/// SSH implementation of the transport gateway
pub struct SshGateway {
    ssh: SshSettings,
    terminal: TerminalSettings,
    events: EventSender,
    sessions: DashMap<String, Arc<ActiveSession>>,
}

impl SshGateway {
    pub fn new(ssh: SshSettings, terminal: TerminalSettings, events: EventSender) -> Self {
        Self {
            ssh,
            terminal,
            events,
            sessions: DashMap::new(),
        }
    }

    fn active(&self, instance_id: &str) -> AppResult<Arc<ActiveSession>> {
        self.sessions
            .get(instance_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| AppError::SessionNotFound(instance_id.to_string()))
    }
}

#[async_trait]
impl TransportGateway for SshGateway {
    async fn connect(&self, instance_id: &str, params: ConnectParams, auth: AuthRequest) -> AppResult<()> {
        let active = Arc::new(ActiveSession {
            params: params.clone(),
            cmd_tx: RwLock::new(None),
        });
        self.sessions.insert(instance_id.to_string(), active.clone());

        let id = instance_id.to_string();
        let ssh = self.ssh.clone();
        let terminal = self.terminal.clone();
        let events = self.events.clone();

        let negotiated =
            match tokio::task::spawn_blocking(move || negotiate(&id, &params, &auth, &ssh, &terminal, &events))
                .await
            {
                Ok(result) => result,
                Err(e) => Err(AppError::Connection(format!("Connect task failed: {}", e))),
            };

        let established = match negotiated {
            Ok(established) => established,
            Err(err) => {
                self.sessions.remove(instance_id);
                logging::log_session(
                    LogLevel::Error,
                    LogSubsystem::Ssh,
                    instance_id,
                    format!("Connection failed: {}", err),
                );
                return Err(err);
            }
        };

        let (cmd_tx, cmd_rx) = mpsc::channel::<ShellCommand>(COMMAND_QUEUE_DEPTH);
        *active.cmd_tx.write() = Some(cmd_tx);

        let _ = self.events.send(GatewayEvent::connected(instance_id));
        tracing::info!("SSH connected successfully (session {})", instance_id);
        logging::log_session(
            LogLevel::Info,
            LogSubsystem::Ssh,
            instance_id,
            format!("Connected to {}@{}:{}", active.params.username, active.params.host, active.params.port),
        );

        let id = instance_id.to_string();
        let events = self.events.clone();
        let keepalive = self.ssh.keepalive_interval;
        thread::spawn(move || run_io_loop(&id, established, cmd_rx, keepalive, &events));

        Ok(())
    }

    fn send_input(&self, instance_id: &str, data: &[u8]) -> AppResult<()> {
        let active = self.active(instance_id)?;
        let guard = active.cmd_tx.read();
        if let Some(tx) = guard.as_ref() {
            match tx.try_send(ShellCommand::Write(data.to_vec())) {
                Ok(_) => Ok(()),
                Err(TrySendError::Full(_)) => Err(AppError::Ssh("Input queue full".to_string())),
                Err(_) => Err(AppError::Ssh("Session closed".to_string())),
            }
        } else {
            Err(AppError::Ssh("Session closed".to_string()))
        }
    }

    fn resize(&self, instance_id: &str, cols: u32, rows: u32) -> AppResult<()> {
        let active = self.active(instance_id)?;
        let guard = active.cmd_tx.read();
        if let Some(tx) = guard.as_ref() {
            tx.try_send(ShellCommand::Resize(cols, rows))
                .map_err(|_| AppError::Ssh("Session closed".to_string()))?;
        }
        Ok(())
    }

    async fn disconnect(&self, instance_id: &str) -> AppResult<()> {
        let (_, active) = self.sessions.remove(instance_id).ok_or_else(|| {
            AppError::Teardown(format!("No active connection for session {}", instance_id))
        })?;

        // Dropping the sender also stops the I/O loop if the queue is full
        if let Some(tx) = active.cmd_tx.write().take() {
            tx.try_send(ShellCommand::Close)
                .map_err(|e| AppError::Teardown(format!("Failed to signal close: {}", e)))?;
        }

        tracing::info!("Disconnect requested (session {})", instance_id);
        logging::log_session(LogLevel::Info, LogSubsystem::Ssh, instance_id, "Disconnect requested");
        Ok(())
    }

    async fn list_directory(
        &self,
        instance_id: &str,
        path: &str,
        password: Option<&str>,
    ) -> AppResult<Vec<FileEntry>> {
        let active = self.active(instance_id)?;
        let params = active.params.clone();
        let auth = per_call_auth(instance_id, &params, password)?;
        let ssh = self.ssh.clone();
        let path = path.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = FileConnection::connect(&params, &auth, &ssh)?;
            conn.list_dir(&path)
        })
        .await
        .map_err(|e| AppError::Ssh(format!("File task failed: {}", e)))?
    }

    async fn download(
        &self,
        instance_id: &str,
        remote_path: &str,
        local_path: &str,
        password: Option<&str>,
    ) -> AppResult<()> {
        let active = self.active(instance_id)?;
        let params = active.params.clone();
        let auth = per_call_auth(instance_id, &params, password)?;
        let ssh = self.ssh.clone();
        let remote_path = remote_path.to_string();
        let local_path = local_path.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = FileConnection::connect(&params, &auth, &ssh)?;
            conn.download(&remote_path, &local_path)
        })
        .await
        .map_err(|e| AppError::Ssh(format!("File task failed: {}", e)))?
    }

    async fn upload(
        &self,
        instance_id: &str,
        local_path: &str,
        remote_path: &str,
        password: Option<&str>,
    ) -> AppResult<()> {
        let active = self.active(instance_id)?;
        let params = active.params.clone();
        let auth = per_call_auth(instance_id, &params, password)?;
        let ssh = self.ssh.clone();
        let remote_path = remote_path.to_string();
        let local_path = local_path.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = FileConnection::connect(&params, &auth, &ssh)?;
            conn.upload(&local_path, &remote_path)
        })
        .await
        .map_err(|e| AppError::Ssh(format!("File task failed: {}", e)))?
    }

    async fn delete_remote(
        &self,
        instance_id: &str,
        remote_path: &str,
        password: Option<&str>,
    ) -> AppResult<()> {
        let active = self.active(instance_id)?;
        let params = active.params.clone();
        let auth = per_call_auth(instance_id, &params, password)?;
        let ssh = self.ssh.clone();
        let remote_path = remote_path.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = FileConnection::connect(&params, &auth, &ssh)?;
            conn.delete(&remote_path)
        })
        .await
        .map_err(|e| AppError::Ssh(format!("File task failed: {}", e)))?
    }
}

/// Build the per-operation credentials for a stateless file connection.
/// Password sessions pass a password on every call; nothing is retained.
fn per_call_auth(
    instance_id: &str,
    params: &ConnectParams,
    password: Option<&str>,
) -> AppResult<AuthRequest> {
    match &params.auth_method {
        AuthMethod::Password => {
            let password =
                password.ok_or_else(|| AppError::MissingCredential(instance_id.to_string()))?;
            Ok(AuthRequest::Password {
                password: password.to_string(),
            })
        }
        AuthMethod::PrivateKey { path } => Ok(AuthRequest::PrivateKey { path: path.clone() }),
        AuthMethod::Agent => Ok(AuthRequest::Agent),
    }
}

/// Blocking connection negotiation (runs on a blocking task)
fn negotiate(
    instance_id: &str,
    params: &ConnectParams,
    auth: &AuthRequest,
    ssh: &SshSettings,
    terminal: &TerminalSettings,
    events: &EventSender,
) -> AppResult<Established> {
    let progress = |step: usize, message: String| {
        let _ = events.send(GatewayEvent::progress(instance_id, step, message));
    };

    progress(
        0,
        format!("Connecting to {}@{}:{}", params.username, params.host, params.port),
    );
    tracing::info!(
        "Connecting to {}@{}:{} (session {})",
        params.username,
        params.host,
        params.port,
        instance_id
    );

    let addr = format!("{}:{}", params.host, params.port);
    let tcp = TcpStream::connect_timeout(
        &addr
            .parse()
            .map_err(|e| AppError::Connection(format!("Invalid address: {}", e)))?,
        Duration::from_secs(ssh.connect_timeout_secs),
    )
    .map_err(|e| AppError::Connection(format!("TCP connect failed: {}", e)))?;
    tcp.set_nodelay(true)?;
    tcp.set_write_timeout(Some(Duration::from_secs(ssh.connect_timeout_secs)))?;

    progress(1, "Creating SSH session".to_string());
    let mut session = Ssh2Session::new()
        .map_err(|e| AppError::Ssh(format!("Failed to create SSH session: {}", e)))?;
    session.set_tcp_stream(tcp);
    session.set_timeout((ssh.connect_timeout_secs * 1000) as u32);
    session.set_keepalive(true, ssh.keepalive_interval);

    progress(2, "Performing SSH handshake".to_string());
    session
        .handshake()
        .map_err(|e| AppError::Ssh(format!("SSH handshake failed: {}", e)))?;

    progress(3, format!("Authenticating as {}", params.username));
    authenticate(&session, &params.username, auth)?;
    progress(4, "Authentication successful".to_string());

    progress(5, "Opening remote session".to_string());
    let channel = open_shell_channel(instance_id, &session, terminal, &progress)?;

    progress(7, "Setting up terminal I/O".to_string());
    session.set_blocking(false);

    progress(8, "Connection established".to_string());
    Ok(Established { session, channel })
}

/// Open a PTY channel and start a shell, falling back to exec
fn open_shell_channel(
    instance_id: &str,
    session: &Ssh2Session,
    terminal: &TerminalSettings,
    progress: &impl Fn(usize, String),
) -> AppResult<Channel> {
    let open_channel = |label: &str| -> AppResult<Channel> {
        tracing::debug!("Opening channel [{}] (session {})", label, instance_id);
        let mut ch = session
            .channel_session()
            .map_err(|e| AppError::Ssh(format!("Failed to open channel [{}]: {}", label, e)))?;
        ch.handle_extended_data(ssh2::ExtendedData::Merge)
            .map_err(|e| AppError::Ssh(format!("Failed to merge stderr [{}]: {}", label, e)))?;
        ch.request_pty(
            "xterm-256color",
            None,
            Some((terminal.default_cols, terminal.default_rows, 0, 0)),
        )
        .map_err(|e| AppError::Ssh(format!("Failed to request PTY [{}]: {}", label, e)))?;
        Ok(ch)
    };

    progress(6, "Starting shell".to_string());

    // Primary: shell()
    if let Ok(mut ch) = open_channel("primary") {
        match ch.shell() {
            Ok(_) => {
                tracing::debug!("Shell started (session {})", instance_id);
                return Ok(ch);
            }
            Err(e) => {
                tracing::debug!("shell() failed (session {}): {}", instance_id, e);
                let _ = ch.close();
            }
        }
    }

    // Fallback: exec a login shell
    for cmd in ["bash -l", "sh -l"] {
        if let Ok(mut ch) = open_channel("fallback_exec") {
            match ch.exec(cmd) {
                Ok(_) => {
                    tracing::debug!("Exec shell started with '{}' (session {})", cmd, instance_id);
                    return Ok(ch);
                }
                Err(e) => {
                    tracing::debug!("exec '{}' failed (session {}): {}", cmd, instance_id, e);
                    let _ = ch.close();
                }
            }
        }
    }

    Err(AppError::Ssh("Failed to start interactive shell".to_string()))
}

/// Authenticate against the server with the supplied credentials
fn authenticate(session: &Ssh2Session, username: &str, auth: &AuthRequest) -> AppResult<()> {
    match auth {
        AuthRequest::Password { password } => {
            session
                .userauth_password(username, password)
                .map_err(|_| AppError::Auth("Password authentication failed".to_string()))?;
        }
        AuthRequest::PrivateKey { path } => {
            session
                .userauth_pubkey_file(username, None, Path::new(path), None)
                .map_err(|e| {
                    let msg = e.to_string().to_lowercase();
                    if msg.contains("passphrase") || msg.contains("decrypt") || msg.contains("parse") {
                        AppError::Auth(
                            "Invalid key format. Ensure the key is in PEM or OpenSSH format."
                                .to_string(),
                        )
                    } else if msg.contains("denied") || msg.contains("auth") {
                        AppError::Auth("Private key not accepted by server".to_string())
                    } else {
                        AppError::Auth("Private key authentication failed".to_string())
                    }
                })?;
        }
        AuthRequest::Agent => {
            let mut agent = session.agent().map_err(|_| {
                AppError::Auth("SSH agent not available. Make sure ssh-agent is running.".to_string())
            })?;

            agent
                .connect()
                .map_err(|_| AppError::Auth("Failed to connect to SSH agent. Is it running?".to_string()))?;

            agent
                .list_identities()
                .map_err(|_| AppError::Auth("Failed to list SSH agent identities".to_string()))?;

            let identities: Vec<_> = agent.identities().unwrap_or_default();

            if identities.is_empty() {
                return Err(AppError::Auth(
                    "No identities found in SSH agent. Add keys with ssh-add.".to_string(),
                ));
            }

            let mut auth_success = false;
            for identity in identities {
                if agent.userauth(username, &identity).is_ok() {
                    auth_success = true;
                    break;
                }
            }

            if !auth_success {
                return Err(AppError::Auth(
                    "SSH agent authentication failed. No matching key accepted.".to_string(),
                ));
            }
        }
    }

    if !session.authenticated() {
        return Err(AppError::Auth("Authentication failed".to_string()));
    }

    Ok(())
}

/// Main I/O loop. Reads shell output into events, drains queued commands,
/// and sends keepalives until the channel closes.
fn run_io_loop(
    instance_id: &str,
    established: Established,
    mut cmd_rx: mpsc::Receiver<ShellCommand>,
    keepalive_interval: u32,
    events: &EventSender,
) {
    let Established { session, mut channel } = established;
    let mut read_buf = [0u8; 32768]; // 32KB read buffer
    let mut last_keepalive = std::time::Instant::now();
    let keepalive_every = Duration::from_secs(keepalive_interval as u64);
    let mut pending: Vec<u8> = Vec::new();
    let mut close_reason: Option<String> = None;

    'main: loop {
        // Send SSH keepalive periodically
        if last_keepalive.elapsed() >= keepalive_every {
            session.set_blocking(true);
            if let Err(e) = session.keepalive_send() {
                tracing::warn!("Keepalive send failed (session {}): {}", instance_id, e);
            }
            session.set_blocking(false);
            last_keepalive = std::time::Instant::now();
        }

        // Drain commands quickly
        for _ in 0..32 {
            match cmd_rx.try_recv() {
                Ok(ShellCommand::Write(data)) => {
                    if pending.len() + data.len() > MAX_PENDING_BYTES {
                        tracing::warn!(
                            "Write buffer full, dropping {} bytes (session {})",
                            data.len(),
                            instance_id
                        );
                        continue;
                    }
                    pending.extend_from_slice(&data);
                }
                Ok(ShellCommand::Resize(cols, rows)) => {
                    session.set_blocking(true);
                    if let Err(e) = channel.request_pty_size(cols, rows, None, None) {
                        tracing::warn!("Failed to resize PTY (session {}): {}", instance_id, e);
                    }
                    session.set_blocking(false);
                }
                Ok(ShellCommand::Close) => {
                    tracing::info!("Close command received (session {})", instance_id);
                    break 'main;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::info!("Command channel dropped (session {})", instance_id);
                    break 'main;
                }
            }
        }

        // Reads first: drain until the socket would block
        loop {
            match channel.stream(0).read(&mut read_buf) {
                Ok(0) => break,
                Ok(n) => {
                    let _ = events.send(GatewayEvent::output(instance_id, read_buf[..n].to_vec()));
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    if is_recoverable_error(&e.to_string().to_lowercase()) {
                        break;
                    }
                    if channel.eof() {
                        break;
                    }
                    tracing::warn!("Read error (session {}): {}", instance_id, e);
                    close_reason = Some(format!("Read failed: {}", e));
                    break 'main;
                }
            }
        }

        // Writes in chunks with partial handling
        if !pending.is_empty() {
            session.set_blocking(true);
            while !pending.is_empty() {
                let write_len = pending.len().min(WRITE_CHUNK_BYTES);
                match channel.write(&pending[..write_len]) {
                    Ok(0) => thread::sleep(Duration::from_millis(4)),
                    Ok(n) => {
                        pending.drain(..n);
                    }
                    Err(e) => {
                        if is_recoverable_error(&e.to_string().to_lowercase()) {
                            thread::sleep(Duration::from_millis(4));
                            continue;
                        }
                        tracing::error!("Write error (session {}): {}", instance_id, e);
                        close_reason = Some(format!("Write failed: {}", e));
                        pending.clear();
                        break;
                    }
                }
            }
            let _ = channel.flush();
            session.set_blocking(false);
            if close_reason.is_some() {
                break 'main;
            }
        }

        if channel.eof() {
            tracing::info!("SSH channel closed (session {})", instance_id);
            close_reason = Some("Connection closed by remote host".to_string());
            break;
        }

        // small sleep to avoid busy spin
        thread::sleep(Duration::from_millis(2));
    }

    let _ = channel.wait_close();
    tracing::info!("I/O loop exited (session {})", instance_id);
    logging::log_session(
        LogLevel::Info,
        LogSubsystem::Ssh,
        instance_id,
        close_reason.clone().unwrap_or_else(|| "Session ended".to_string()),
    );
    let _ = events.send(GatewayEvent::disconnected(instance_id, close_reason));
}

/// Check if an error message indicates a transient condition
fn is_recoverable_error(err_str: &str) -> bool {
    err_str.contains("would block")
        || err_str.contains("wouldblock")
        || err_str.contains("eagain")
        || err_str.contains("try again")
        || err_str.contains("temporarily")
        || err_str.contains("timeout")
        || err_str.contains("timed out")
        || err_str.contains("-37") // libssh2 EAGAIN code
}

/// A short-lived SFTP connection for a single file operation
struct FileConnection {
    sftp: Sftp,
    #[allow(dead_code)]
    session: Ssh2Session,
}

impl FileConnection {
    fn connect(params: &ConnectParams, auth: &AuthRequest, ssh: &SshSettings) -> AppResult<Self> {
        let addr = format!("{}:{}", params.host, params.port);
        let tcp = TcpStream::connect_timeout(
            &addr
                .parse()
                .map_err(|e| AppError::Connection(format!("Invalid address: {}", e)))?,
            Duration::from_secs(ssh.connect_timeout_secs),
        )
        .map_err(|e| AppError::Connection(format!("TCP connect failed: {}", e)))?;
        tcp.set_read_timeout(Some(Duration::from_secs(60)))?;
        tcp.set_write_timeout(Some(Duration::from_secs(60)))?;

        let mut session = Ssh2Session::new()
            .map_err(|e| AppError::Ssh(format!("Failed to create session: {}", e)))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| AppError::Ssh(format!("SSH handshake failed: {}", e)))?;

        authenticate(&session, &params.username, auth)?;

        let sftp = session
            .sftp()
            .map_err(|e| AppError::Ssh(format!("Failed to open SFTP: {}", e)))?;

        Ok(Self { sftp, session })
    }

    /// List directory contents with a navigable parent entry
    fn list_dir(&self, path: &str) -> AppResult<Vec<FileEntry>> {
        let path = if path.is_empty() { "." } else { path };

        let entries = self
            .sftp
            .readdir(Path::new(path))
            .map_err(|e| AppError::Ssh(format!("Failed to list directory: {}", e)))?;

        let mut result = Vec::new();
        for (file_path, stat) in entries {
            let name = file_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            // Servers may include . and .. themselves
            if name == "." || name == ".." {
                continue;
            }

            result.push(entry_from_stat(name, file_path.to_string_lossy().to_string(), &stat));
        }

        sort_entries(&mut result);

        if let Some(parent) = parent_path(path) {
            let entry = match self.sftp.stat(Path::new(&parent)) {
                Ok(stat) => entry_from_stat("..".to_string(), parent, &stat),
                Err(_) => FileEntry {
                    name: "..".to_string(),
                    path: parent,
                    is_dir: true,
                    size: 0,
                    modified: None,
                    permissions: String::new(),
                },
            };
            result.insert(0, entry);
        }

        Ok(result)
    }

    fn download(&self, remote_path: &str, local_path: &str) -> AppResult<()> {
        let mut file = self
            .sftp
            .open(Path::new(remote_path))
            .map_err(|e| AppError::Ssh(format!("Failed to open remote file: {}", e)))?;

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .map_err(|e| AppError::Ssh(format!("Failed to read remote file: {}", e)))?;

        std::fs::write(local_path, contents)?;
        Ok(())
    }

    fn upload(&self, local_path: &str, remote_path: &str) -> AppResult<()> {
        let contents = std::fs::read(local_path)?;

        let mut file = self
            .sftp
            .create(Path::new(remote_path))
            .map_err(|e| AppError::Ssh(format!("Failed to create remote file: {}", e)))?;

        file.write_all(&contents)
            .map_err(|e| AppError::Ssh(format!("Failed to write remote file: {}", e)))?;

        Ok(())
    }

    /// Delete a remote file or (empty) directory
    fn delete(&self, path: &str) -> AppResult<()> {
        let stat = self
            .sftp
            .stat(Path::new(path))
            .map_err(|e| AppError::Ssh(format!("Failed to stat: {}", e)))?;

        if stat.is_dir() {
            self.sftp
                .rmdir(Path::new(path))
                .map_err(|e| AppError::Ssh(format!("Failed to delete directory: {}", e)))?;
        } else {
            self.sftp
                .unlink(Path::new(path))
                .map_err(|e| AppError::Ssh(format!("Failed to delete file: {}", e)))?;
        }

        Ok(())
    }
}

fn entry_from_stat(name: String, path: String, stat: &FileStat) -> FileEntry {
    FileEntry {
        name,
        path,
        is_dir: stat.is_dir(),
        size: stat.size.unwrap_or(0),
        modified: stat.mtime.map(|t| t as i64),
        permissions: format_permissions(stat),
    }
}

/// Sort: directories first, then case-insensitive by name
fn sort_entries(entries: &mut [FileEntry]) {
    entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
        (true, false) => std::cmp::Ordering::Less,
        (false, true) => std::cmp::Ordering::Greater,
        _ => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
    });
}

/// Parent of a listing path, or None at the root
fn parent_path(path: &str) -> Option<String> {
    if path == "/" || path == "." || path.is_empty() {
        return None;
    }
    let parent = Path::new(path).parent()?;
    let parent = parent.to_string_lossy();
    if parent.is_empty() {
        None
    } else {
        Some(parent.to_string())
    }
}

/// Format file permissions as a string like "rwxr-xr-x"
fn format_permissions(stat: &FileStat) -> String {
    let perms = stat.perm.unwrap_or(0);

    let mut s = String::with_capacity(10);

    // File type
    if stat.is_dir() {
        s.push('d');
    } else if stat.file_type().is_symlink() {
        s.push('l');
    } else {
        s.push('-');
    }

    // Owner permissions
    s.push(if perms & 0o400 != 0 { 'r' } else { '-' });
    s.push(if perms & 0o200 != 0 { 'w' } else { '-' });
    s.push(if perms & 0o100 != 0 { 'x' } else { '-' });

    // Group permissions
    s.push(if perms & 0o040 != 0 { 'r' } else { '-' });
    s.push(if perms & 0o020 != 0 { 'w' } else { '-' });
    s.push(if perms & 0o010 != 0 { 'x' } else { '-' });

    // Other permissions
    s.push(if perms & 0o004 != 0 { 'r' } else { '-' });
    s.push(if perms & 0o002 != 0 { 'w' } else { '-' });
    s.push(if perms & 0o001 != 0 { 'x' } else { '-' });

    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Protocol;

    fn stat_with_perm(perm: u32, size: u64) -> FileStat {
        FileStat {
            size: Some(size),
            uid: None,
            gid: None,
            perm: Some(perm),
            atime: None,
            mtime: Some(1_700_000_000),
        }
    }

    fn params(auth_method: AuthMethod) -> ConnectParams {
        ConnectParams {
            host: "example.com".to_string(),
            port: 22,
            username: "admin".to_string(),
            protocol: Protocol::Ssh,
            auth_method,
        }
    }

    #[test]
    fn test_format_permissions() {
        let file = stat_with_perm(0o100644, 10);
        assert_eq!(format_permissions(&file), "-rw-r--r--");

        let dir = stat_with_perm(0o040755, 0);
        assert_eq!(format_permissions(&dir), "drwxr-xr-x");
    }

    #[test]
    fn test_sort_entries_dirs_first() {
        let mut entries = vec![
            entry_from_stat("zz.txt".into(), "/zz.txt".into(), &stat_with_perm(0o100644, 1)),
            entry_from_stat("Beta".into(), "/Beta".into(), &stat_with_perm(0o040755, 0)),
            entry_from_stat("alpha.txt".into(), "/alpha.txt".into(), &stat_with_perm(0o100644, 1)),
            entry_from_stat("attic".into(), "/attic".into(), &stat_with_perm(0o040755, 0)),
        ];
        sort_entries(&mut entries);
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["attic", "Beta", "alpha.txt", "zz.txt"]);
    }

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path("/"), None);
        assert_eq!(parent_path("."), None);
        assert_eq!(parent_path("/var"), Some("/".to_string()));
        assert_eq!(parent_path("/var/log"), Some("/var".to_string()));
    }

    #[test]
    fn test_per_call_auth_requires_password() {
        let params = params(AuthMethod::Password);
        let err = per_call_auth("inst-1", &params, None).unwrap_err();
        assert!(matches!(err, AppError::MissingCredential(ref id) if id == "inst-1"));

        let ok = per_call_auth("inst-1", &params, Some("pw")).unwrap();
        assert!(matches!(ok, AuthRequest::Password { .. }));
    }

    #[test]
    fn test_per_call_auth_key_and_agent() {
        let key_params = params(AuthMethod::PrivateKey {
            path: "/home/u/.ssh/id_ed25519".to_string(),
        });
        let auth = per_call_auth("inst-1", &key_params, None).unwrap();
        assert!(matches!(auth, AuthRequest::PrivateKey { ref path } if path.ends_with("id_ed25519")));

        let agent_params = params(AuthMethod::Agent);
        let auth = per_call_auth("inst-1", &agent_params, None).unwrap();
        assert!(matches!(auth, AuthRequest::Agent));
    }
}
