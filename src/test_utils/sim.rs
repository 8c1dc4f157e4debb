//! In-memory coordination service with real one-shot watch semantics.
//!
//! [`SimHub`] holds the node tree, per-path watch registrations, and fault
//! injection switches shared by every session it hands out. Sessions created
//! through [`SimConnector`] push raw events into the sink the client
//! registered, so the whole watch/reconnect protocol can be exercised
//! without a server.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::Acl;
use crate::ClientOptions;
use crate::ConnectivityError;
use crate::CreateMode;
use crate::Error;
use crate::EventSink;
use crate::KeeperConnector;
use crate::KeeperSession;
use crate::KeeperState;
use crate::NodeError;
use crate::RawEvent;
use crate::RawEventKind;
use crate::Result;
use crate::Stat;

#[derive(Debug, Clone)]
struct SimNode {
    data: Vec<u8>,
    version: i32,
    ephemeral_owner: i64,
}

struct SimSessionState {
    sink: EventSink,
    alive: bool,
}

#[derive(Default)]
struct HubState {
    nodes: BTreeMap<String, SimNode>,
    data_watches: HashMap<String, HashSet<i64>>,
    child_watches: HashMap<String, HashSet<i64>>,
    sessions: HashMap<i64, SimSessionState>,
    injected_failures: VecDeque<Error>,
    connected: bool,
    next_session_id: i64,
    next_sequence: u64,
}

/// Shared fake service instance. Tests poke it to simulate connection drops,
/// session expiry, and per-operation failures.
pub struct SimHub {
    state: Mutex<HubState>,
}

impl SimHub {
    pub fn new() -> Arc<Self> {
        let mut state = HubState {
            connected: true,
            next_session_id: 1,
            ..Default::default()
        };
        state.nodes.insert(
            "/".to_string(),
            SimNode {
                data: Vec::new(),
                version: 0,
                ephemeral_owner: 0,
            },
        );
        Arc::new(Self {
            state: Mutex::new(state),
        })
    }

    /// Sever the link: subsequent operations fail with connection loss and
    /// every live session observes `Disconnected`.
    pub fn drop_connection(&self) {
        let mut state = self.state.lock();
        state.connected = false;
        broadcast(&state, KeeperState::Disconnected);
    }

    pub fn restore_connection(&self) {
        let mut state = self.state.lock();
        state.connected = true;
        broadcast(&state, KeeperState::SyncConnected);
    }

    /// Kill every live session the way the server would: ephemerals go,
    /// watchers hear about it, and the session observes `Expired`.
    pub fn expire_sessions(&self) {
        let mut state = self.state.lock();
        let ids: Vec<i64> = state
            .sessions
            .iter()
            .filter(|(_, s)| s.alive)
            .map(|(id, _)| *id)
            .collect();
        broadcast(&state, KeeperState::Expired);
        for id in ids {
            if let Some(session) = state.sessions.get_mut(&id) {
                session.alive = false;
            }
            remove_ephemerals(&mut state, id);
        }
    }

    /// Queue an error returned by the next operation, ahead of any
    /// connectivity checks.
    pub fn fail_next(&self, error: Error) {
        self.state.lock().injected_failures.push_back(error);
    }

    pub fn has_node(&self, path: &str) -> bool {
        self.state.lock().nodes.contains_key(path)
    }

    pub fn node_data(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().nodes.get(path).map(|n| n.data.clone())
    }

    pub fn live_session_count(&self) -> usize {
        self.state
            .lock()
            .sessions
            .values()
            .filter(|s| s.alive)
            .count()
    }

    fn register_session(&self, sink: EventSink) -> i64 {
        let mut state = self.state.lock();
        let id = state.next_session_id;
        state.next_session_id += 1;
        state.connected = true;
        state.sessions.insert(
            id,
            SimSessionState {
                sink: sink.clone(),
                alive: true,
            },
        );
        let _ = sink.send(RawEvent::state_change(KeeperState::SyncConnected));
        id
    }
}

fn current_state(state: &HubState) -> KeeperState {
    if state.connected {
        KeeperState::SyncConnected
    } else {
        KeeperState::Disconnected
    }
}

fn broadcast(state: &HubState, keeper_state: KeeperState) {
    for session in state.sessions.values().filter(|s| s.alive) {
        let _ = session.sink.send(RawEvent::state_change(keeper_state));
    }
}

/// One-shot semantics: firing drains the registration set.
fn fire_data_watch(state: &mut HubState, path: &str, kind: RawEventKind) {
    let keeper_state = current_state(state);
    if let Some(watchers) = state.data_watches.remove(path) {
        for id in watchers {
            if let Some(session) = state.sessions.get(&id).filter(|s| s.alive) {
                let _ = session.sink.send(RawEvent::node(path, kind, keeper_state));
            }
        }
    }
}

fn fire_child_watch(state: &mut HubState, path: &str, kind: RawEventKind) {
    let keeper_state = current_state(state);
    if let Some(watchers) = state.child_watches.remove(path) {
        for id in watchers {
            if let Some(session) = state.sessions.get(&id).filter(|s| s.alive) {
                let _ = session.sink.send(RawEvent::node(path, kind, keeper_state));
            }
        }
    }
}

fn parent_of(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

fn children_of(state: &HubState, path: &str) -> Vec<String> {
    let prefix = if path == "/" {
        "/".to_string()
    } else {
        format!("{path}/")
    };
    state
        .nodes
        .keys()
        .filter(|p| *p != "/" && p.starts_with(&prefix))
        .filter(|p| !p[prefix.len()..].contains('/'))
        .map(|p| p[prefix.len()..].to_string())
        .collect()
}

fn delete_node(state: &mut HubState, path: &str) {
    state.nodes.remove(path);

    // A session watching the node through both its data and child watch
    // hears about the deletion once, as the real service suppresses the
    // duplicate delivery.
    let keeper_state = current_state(state);
    let mut watchers: HashSet<i64> = state.data_watches.remove(path).unwrap_or_default();
    watchers.extend(state.child_watches.remove(path).unwrap_or_default());
    for id in watchers {
        if let Some(session) = state.sessions.get(&id).filter(|s| s.alive) {
            let _ = session
                .sink
                .send(RawEvent::node(path, RawEventKind::NodeDeleted, keeper_state));
        }
    }

    if let Some(parent) = parent_of(path) {
        let parent = parent.to_string();
        fire_child_watch(state, &parent, RawEventKind::NodeChildrenChanged);
    }
}

fn remove_ephemerals(state: &mut HubState, session_id: i64) {
    let owned: Vec<String> = state
        .nodes
        .iter()
        .filter(|(_, n)| n.ephemeral_owner == session_id)
        .map(|(p, _)| p.clone())
        .collect();
    for path in owned {
        delete_node(state, &path);
    }
}

/// Connector handing out sessions bound to one [`SimHub`].
pub struct SimConnector {
    hub: Arc<SimHub>,
}

impl SimConnector {
    pub fn new(hub: Arc<SimHub>) -> Arc<Self> {
        Arc::new(Self { hub })
    }
}

#[async_trait]
impl KeeperConnector for SimConnector {
    async fn connect(
        &self,
        _options: &ClientOptions,
        events: EventSink,
    ) -> Result<Arc<dyn KeeperSession>> {
        let id = self.hub.register_session(events);
        Ok(Arc::new(SimSession {
            hub: self.hub.clone(),
            id,
        }))
    }
}

pub struct SimSession {
    hub: Arc<SimHub>,
    id: i64,
}

impl SimSession {
    /// Injected failures dominate, then session liveness, then the link.
    fn check_usable(&self, state: &mut HubState) -> Result<()> {
        if let Some(error) = state.injected_failures.pop_front() {
            return Err(error);
        }
        if !state.sessions.get(&self.id).map(|s| s.alive).unwrap_or(false) {
            return Err(ConnectivityError::SessionExpired.into());
        }
        if !state.connected {
            return Err(ConnectivityError::ConnectionLoss.into());
        }
        Ok(())
    }
}

#[async_trait]
impl KeeperSession for SimSession {
    async fn get_data(&self, path: &str, watch: bool) -> Result<Vec<u8>> {
        let mut state = self.hub.state.lock();
        self.check_usable(&mut state)?;
        let Some(node) = state.nodes.get(path).cloned() else {
            return Err(NodeError::NotFound(path.to_string()).into());
        };
        if watch {
            state
                .data_watches
                .entry(path.to_string())
                .or_default()
                .insert(self.id);
        }
        Ok(node.data)
    }

    async fn get_children(&self, path: &str, watch: bool) -> Result<Vec<String>> {
        let mut state = self.hub.state.lock();
        self.check_usable(&mut state)?;
        if !state.nodes.contains_key(path) {
            return Err(NodeError::NotFound(path.to_string()).into());
        }
        if watch {
            state
                .child_watches
                .entry(path.to_string())
                .or_default()
                .insert(self.id);
        }
        Ok(children_of(&state, path))
    }

    async fn exists(&self, path: &str, watch: bool) -> Result<bool> {
        let mut state = self.hub.state.lock();
        self.check_usable(&mut state)?;
        // An existence watch registers whether or not the node is there.
        if watch {
            state
                .data_watches
                .entry(path.to_string())
                .or_default()
                .insert(self.id);
        }
        Ok(state.nodes.contains_key(path))
    }

    async fn create(
        &self,
        path: &str,
        data: &[u8],
        _acls: &[Acl],
        mode: CreateMode,
    ) -> Result<String> {
        let mut state = self.hub.state.lock();
        self.check_usable(&mut state)?;

        let created = match mode {
            CreateMode::PersistentSequential | CreateMode::EphemeralSequential => {
                let seq = state.next_sequence;
                state.next_sequence += 1;
                format!("{path}{seq:010}")
            }
            _ => path.to_string(),
        };

        if state.nodes.contains_key(&created) {
            return Err(NodeError::AlreadyExists(created).into());
        }
        let parent_exists = match parent_of(&created) {
            Some(parent) => state.nodes.contains_key(parent),
            None => false,
        };
        if !parent_exists {
            return Err(NodeError::NotFound(created).into());
        }

        state.nodes.insert(
            created.clone(),
            SimNode {
                data: data.to_vec(),
                version: 0,
                ephemeral_owner: if mode.is_ephemeral() { self.id } else { 0 },
            },
        );

        fire_data_watch(&mut state, &created, RawEventKind::NodeCreated);
        if let Some(parent) = parent_of(&created).map(str::to_string) {
            fire_child_watch(&mut state, &parent, RawEventKind::NodeChildrenChanged);
        }
        Ok(created)
    }

    async fn set_data(&self, path: &str, data: &[u8], version: i32) -> Result<Stat> {
        let mut state = self.hub.state.lock();
        self.check_usable(&mut state)?;
        let Some(node) = state.nodes.get_mut(path) else {
            return Err(NodeError::NotFound(path.to_string()).into());
        };
        if version >= 0 && version != node.version {
            return Err(NodeError::BadVersion {
                path: path.to_string(),
                expected: node.version,
            }
            .into());
        }
        node.data = data.to_vec();
        node.version += 1;
        let stat = Stat {
            version: node.version,
            data_length: node.data.len() as i32,
            ..Stat::default()
        };
        fire_data_watch(&mut state, path, RawEventKind::NodeDataChanged);
        Ok(stat)
    }

    async fn delete(&self, path: &str, version: i32) -> Result<()> {
        let mut state = self.hub.state.lock();
        self.check_usable(&mut state)?;
        let Some(node) = state.nodes.get(path) else {
            return Err(NodeError::NotFound(path.to_string()).into());
        };
        if version >= 0 && version != node.version {
            return Err(NodeError::BadVersion {
                path: path.to_string(),
                expected: node.version,
            }
            .into());
        }
        if !children_of(&state, path).is_empty() {
            return Err(NodeError::NotEmpty(path.to_string()).into());
        }
        delete_node(&mut state, path);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.hub.state.lock();
        if let Some(session) = state.sessions.get_mut(&self.id) {
            if session.alive {
                session.alive = false;
                remove_ephemerals(&mut state, self.id);
            }
        }
        Ok(())
    }

    fn session_id(&self) -> i64 {
        self.id
    }

    fn session_password(&self) -> Vec<u8> {
        b"sim".to_vec()
    }
}
