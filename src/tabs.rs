//! Tab ordering, focus, and output routing
//!
//! Each open session instance owns one tab. Input and resize requests go
//! to the focused tab only; output chunks are routed to whichever surface
//! is bound to the originating instance.

use crate::error::{AppError, AppResult};
use crate::gateway::TransportGateway;
use crate::session::SessionManager;
use crate::status::StatusTable;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Default)]
struct TabState {
    order: Vec<String>,
    focused: Option<String>,
}

/// Tracks tab order and focus, and fans session output out to bound
/// terminal surfaces
pub struct TabManager {
    gateway: Arc<dyn TransportGateway>,
    sessions: Arc<SessionManager>,
    status: Arc<StatusTable>,
    tabs: RwLock<TabState>,
    sinks: RwLock<HashMap<String, mpsc::UnboundedSender<Vec<u8>>>>,
}

impl TabManager {
    pub fn new(
        gateway: Arc<dyn TransportGateway>,
        sessions: Arc<SessionManager>,
        status: Arc<StatusTable>,
    ) -> Self {
        Self {
            gateway,
            sessions,
            status,
            tabs: RwLock::new(TabState::default()),
            sinks: RwLock::new(HashMap::new()),
        }
    }

    /// Append a tab for the instance and focus it
    pub fn open_tab(&self, instance_id: &str) {
        let mut tabs = self.tabs.write();
        if !tabs.order.iter().any(|id| id == instance_id) {
            tabs.order.push(instance_id.to_string());
        }
        tabs.focused = Some(instance_id.to_string());
        self.status.ensure(instance_id);
    }

    /// Close a tab. The session is torn down before the tab disappears so
    /// a failed teardown never leaves an orphaned connection.
    pub async fn close_tab(&self, instance_id: &str) -> AppResult<()> {
        match self.sessions.close(instance_id).await {
            Ok(()) => {}
            Err(AppError::SessionNotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let mut tabs = self.tabs.write();
        if let Some(pos) = tabs.order.iter().position(|id| id == instance_id) {
            tabs.order.remove(pos);
            if tabs.focused.as_deref() == Some(instance_id) {
                // Focus moves to the left neighbor, or the first survivor
                tabs.focused = if pos > 0 {
                    Some(tabs.order[pos - 1].clone())
                } else {
                    tabs.order.first().cloned()
                };
            }
        }
        drop(tabs);

        self.sinks.write().remove(instance_id);
        Ok(())
    }

    /// Close every tab, front to back
    pub async fn close_all(&self) -> AppResult<()> {
        let order = self.tabs.read().order.clone();
        for instance_id in order {
            self.close_tab(&instance_id).await?;
        }
        Ok(())
    }

    /// Focus an open tab. Ids not in the order are ignored.
    pub fn focus(&self, instance_id: &str) {
        let mut tabs = self.tabs.write();
        if tabs.order.iter().any(|id| id == instance_id) {
            tabs.focused = Some(instance_id.to_string());
        }
    }

    /// Cycle focus forward
    pub fn next_tab(&self) {
        self.cycle(1);
    }

    /// Cycle focus backward
    pub fn prev_tab(&self) {
        self.cycle(-1);
    }

    fn cycle(&self, direction: isize) {
        let mut tabs = self.tabs.write();
        let len = tabs.order.len();
        if len < 2 {
            return;
        }
        let current = tabs
            .focused
            .as_ref()
            .and_then(|id| tabs.order.iter().position(|other| other == id))
            .unwrap_or(0);
        let next = (current as isize + direction + len as isize) as usize % len;
        tabs.focused = Some(tabs.order[next].clone());
    }

    /// Bind a terminal surface to an instance, replacing any previous
    /// binding. Output chunks for the instance flow to the returned
    /// receiver.
    pub fn bind_surface(&self, instance_id: &str) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sinks.write().insert(instance_id.to_string(), tx);
        rx
    }

    pub fn unbind_surface(&self, instance_id: &str) {
        self.sinks.write().remove(instance_id);
    }

    /// Deliver an output chunk to the instance's bound surface. Chunks for
    /// unbound instances are dropped.
    pub fn route_output(&self, instance_id: &str, data: Vec<u8>) {
        let mut stale = false;
        if let Some(sink) = self.sinks.read().get(instance_id) {
            stale = sink.send(data).is_err();
        }
        if stale {
            self.sinks.write().remove(instance_id);
        }
    }

    /// Send input bytes to the focused tab's session
    pub fn write_input(&self, data: &[u8]) -> AppResult<()> {
        let focused = self.focused_or_err()?;
        self.gateway.send_input(&focused, data)
    }

    /// Resize the focused tab's remote terminal
    pub fn resize_focused(&self, cols: u32, rows: u32) -> AppResult<()> {
        let focused = self.focused_or_err()?;
        self.gateway.resize(&focused, cols, rows)
    }

    fn focused_or_err(&self) -> AppResult<String> {
        self.tabs
            .read()
            .focused
            .clone()
            .ok_or_else(|| AppError::SessionNotFound("no focused session".to_string()))
    }

    pub fn order(&self) -> Vec<String> {
        self.tabs.read().order.clone()
    }

    pub fn focused(&self) -> Option<String> {
        self.tabs.read().focused.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::AuthMethod;
    use crate::test_utils::{test_profile, GatewayCall, MockGateway};

    fn setup() -> (Arc<MockGateway>, Arc<SessionManager>, TabManager) {
        let (gateway, _events) = MockGateway::new();
        let status = Arc::new(StatusTable::new());
        let sessions = Arc::new(SessionManager::new(gateway.clone(), status.clone()));
        let tabs = TabManager::new(gateway.clone(), sessions.clone(), status);
        (gateway, sessions, tabs)
    }

    fn open_instances(sessions: &SessionManager, tabs: &TabManager, count: usize) -> Vec<String> {
        let profile = test_profile("web", AuthMethod::Agent);
        (0..count)
            .map(|_| {
                let instance = sessions.open(&profile);
                tabs.open_tab(&instance.id);
                instance.id.clone()
            })
            .collect()
    }

    #[test]
    fn test_open_tab_is_idempotent_and_focuses() {
        let (_gateway, sessions, tabs) = setup();
        let ids = open_instances(&sessions, &tabs, 2);

        tabs.open_tab(&ids[0]);
        assert_eq!(tabs.order(), ids);
        assert_eq!(tabs.focused().as_deref(), Some(ids[0].as_str()));

        // Unknown ids never steal focus
        tabs.focus("ghost");
        assert_eq!(tabs.focused().as_deref(), Some(ids[0].as_str()));
    }

    #[tokio::test]
    async fn test_close_focused_tab_moves_focus_left() {
        let (_gateway, sessions, tabs) = setup();
        let ids = open_instances(&sessions, &tabs, 3);

        tabs.focus(&ids[1]);
        tabs.close_tab(&ids[1]).await.unwrap();
        assert_eq!(tabs.focused().as_deref(), Some(ids[0].as_str()));

        tabs.close_tab(&ids[0]).await.unwrap();
        assert_eq!(tabs.focused().as_deref(), Some(ids[2].as_str()));

        tabs.close_tab(&ids[2]).await.unwrap();
        assert_eq!(tabs.focused(), None);
        assert!(tabs.order().is_empty());
    }

    #[tokio::test]
    async fn test_close_unfocused_tab_keeps_focus() {
        let (_gateway, sessions, tabs) = setup();
        let ids = open_instances(&sessions, &tabs, 3);

        tabs.focus(&ids[2]);
        tabs.close_tab(&ids[0]).await.unwrap();
        assert_eq!(tabs.focused().as_deref(), Some(ids[2].as_str()));
        assert_eq!(tabs.order(), vec![ids[1].clone(), ids[2].clone()]);
    }

    #[tokio::test]
    async fn test_close_tab_tears_down_connected_session_first() {
        let (gateway, sessions, tabs) = setup();
        let ids = open_instances(&sessions, &tabs, 1);
        sessions.connect(&ids[0]).await.unwrap();
        sessions
            .apply_event(crate::gateway::GatewayEvent::connected(&ids[0]))
            .await;

        tabs.close_tab(&ids[0]).await.unwrap();

        assert!(gateway.calls().contains(&GatewayCall::Disconnect(ids[0].clone())));
        assert!(!sessions.contains(&ids[0]));
        assert!(tabs.order().is_empty());
    }

    #[tokio::test]
    async fn test_close_all_empties_everything() {
        let (_gateway, sessions, tabs) = setup();
        let ids = open_instances(&sessions, &tabs, 3);

        tabs.close_all().await.unwrap();

        assert!(tabs.order().is_empty());
        assert_eq!(tabs.focused(), None);
        for id in ids {
            assert!(!sessions.contains(&id));
        }
    }

    #[test]
    fn test_cycle_wraps_both_directions() {
        let (_gateway, sessions, tabs) = setup();
        let ids = open_instances(&sessions, &tabs, 3);

        tabs.focus(&ids[2]);
        tabs.next_tab();
        assert_eq!(tabs.focused().as_deref(), Some(ids[0].as_str()));

        tabs.prev_tab();
        assert_eq!(tabs.focused().as_deref(), Some(ids[2].as_str()));
    }

    #[test]
    fn test_cycle_single_tab_is_noop() {
        let (_gateway, sessions, tabs) = setup();
        let ids = open_instances(&sessions, &tabs, 1);

        tabs.next_tab();
        assert_eq!(tabs.focused().as_deref(), Some(ids[0].as_str()));
        tabs.prev_tab();
        assert_eq!(tabs.focused().as_deref(), Some(ids[0].as_str()));
    }

    #[test]
    fn test_route_output_delivers_to_bound_surface() {
        let (_gateway, sessions, tabs) = setup();
        let ids = open_instances(&sessions, &tabs, 1);

        let mut rx = tabs.bind_surface(&ids[0]);
        tabs.route_output(&ids[0], b"hello".to_vec());
        assert_eq!(rx.try_recv().unwrap(), b"hello".to_vec());

        // Unbound instances drop silently
        tabs.route_output("ghost", b"lost".to_vec());

        // A dropped receiver clears the binding instead of erroring
        drop(rx);
        tabs.route_output(&ids[0], b"late".to_vec());
        tabs.route_output(&ids[0], b"later".to_vec());
    }

    #[test]
    fn test_input_requires_focus() {
        let (gateway, sessions, tabs) = setup();

        assert!(matches!(
            tabs.write_input(b"ls\n"),
            Err(AppError::SessionNotFound(_))
        ));

        let ids = open_instances(&sessions, &tabs, 1);
        tabs.write_input(b"ls\n").unwrap();
        tabs.resize_focused(120, 40).unwrap();

        let calls = gateway.calls();
        assert!(calls.contains(&GatewayCall::SendInput(ids[0].clone(), b"ls\n".to_vec())));
        assert!(calls.contains(&GatewayCall::Resize(ids[0].clone(), 120, 40)));
    }
}
