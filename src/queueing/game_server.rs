//! GameServer aggregate and its registry.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use log::info;
use serde::{Deserialize, Serialize};

use super::queue::PlayerQueue;
use crate::probe::ServerInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl FromStr for ProcessingState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Idle" => Ok(Self::Idle),
            "Running" => Ok(Self::Running),
            "Stopping" => Ok(Self::Stopping),
            "Stopped" => Ok(Self::Stopped),
            _ => Err(()),
        }
    }
}

/// One remote game server with its waiting queue. Mutable fields sit behind
/// one mutex; the owning processing loop and in-band request handlers are
/// the only writers.
pub struct GameServer {
    pub addr: SocketAddr,
    pub queue: PlayerQueue,
    spawn_unix_secs: u64,
    inner: Mutex<ServerInner>,
}

struct ServerInner {
    instance_id: String,
    joining_count: usize,
    last_server_info: Option<ServerInfo>,
    last_successful_ping_at: Option<Instant>,
    actual_players: HashSet<String>,
    processing: ProcessingState,
    stop_requested: bool,
}

impl GameServer {
    pub fn new(addr: SocketAddr, instance_id: &str) -> Self {
        Self {
            addr,
            queue: PlayerQueue::new(),
            spawn_unix_secs: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            inner: Mutex::new(ServerInner {
                instance_id: instance_id.to_string(),
                joining_count: 0,
                last_server_info: None,
                last_successful_ping_at: None,
                actual_players: HashSet::new(),
                processing: ProcessingState::Idle,
                stop_requested: false,
            }),
        }
    }

    pub fn spawn_unix_secs(&self) -> u64 {
        self.spawn_unix_secs
    }

    pub fn instance_id(&self) -> String {
        self.inner.lock().unwrap().instance_id.clone()
    }

    /// A server first seen through matchmaking carries no instance id; the
    /// first JoinQueue that names one fills it in.
    pub fn backfill_instance_id(&self, instance_id: &str) {
        if instance_id.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.instance_id.is_empty() {
            inner.instance_id = instance_id.to_string();
        }
    }

    pub fn joining_count(&self) -> usize {
        self.inner.lock().unwrap().joining_count
    }

    pub fn inc_joining(&self) {
        self.inner.lock().unwrap().joining_count += 1;
    }

    pub fn dec_joining(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.joining_count = inner.joining_count.saturating_sub(1);
    }

    pub fn record_probe(&self, server_info: ServerInfo) {
        let mut inner = self.inner.lock().unwrap();
        inner.last_server_info = Some(server_info);
        inner.last_successful_ping_at = Some(Instant::now());
    }

    pub fn clear_probe(&self) {
        self.inner.lock().unwrap().last_server_info = None;
    }

    pub fn last_info(&self) -> Option<ServerInfo> {
        self.inner.lock().unwrap().last_server_info.clone()
    }

    pub fn set_actual_players(&self, names: HashSet<String>) {
        self.inner.lock().unwrap().actual_players = names;
    }

    pub fn actual_players(&self) -> HashSet<String> {
        self.inner.lock().unwrap().actual_players.clone()
    }

    pub fn processing_state(&self) -> ProcessingState {
        self.inner.lock().unwrap().processing
    }

    /// Claims the processing slot. Only one loop runs per server; a second
    /// caller sees `false` and leaves the incumbent alone.
    pub fn try_start_processing(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.processing {
            ProcessingState::Idle | ProcessingState::Stopped => {
                inner.processing = ProcessingState::Running;
                inner.stop_requested = false;
                true
            }
            ProcessingState::Running | ProcessingState::Stopping => false,
        }
    }

    pub fn request_stop(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.processing == ProcessingState::Running {
            inner.processing = ProcessingState::Stopping;
        }
        inner.stop_requested = true;
    }

    pub fn stop_requested(&self) -> bool {
        self.inner.lock().unwrap().stop_requested
    }

    pub fn mark_stopped(&self) {
        self.inner.lock().unwrap().processing = ProcessingState::Stopped;
    }
}

/// Thread-safe map of `(ip, port)` to the canonical GameServer instance.
pub struct GameServerRegistry {
    servers: Mutex<HashMap<SocketAddr, Arc<GameServer>>>,
}

impl GameServerRegistry {
    pub fn new() -> Self {
        Self {
            servers: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_or_create(&self, addr: SocketAddr, instance_id: &str) -> Arc<GameServer> {
        let mut servers = self.servers.lock().unwrap();
        if let Some(existing) = servers.get(&addr) {
            existing.backfill_instance_id(instance_id);
            return Arc::clone(existing);
        }
        info!("[Queue] Tracking new game server {}", addr);
        let server = Arc::new(GameServer::new(addr, instance_id));
        servers.insert(addr, Arc::clone(&server));
        server
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<Arc<GameServer>> {
        self.servers.lock().unwrap().get(addr).cloned()
    }

    pub fn all(&self) -> Vec<Arc<GameServer>> {
        self.servers.lock().unwrap().values().cloned().collect()
    }

    /// Drops a record, but only once its queue is empty and its loop has
    /// fully stopped.
    pub fn try_remove(&self, addr: &SocketAddr) -> bool {
        let mut servers = self.servers.lock().unwrap();
        let removable = servers
            .get(addr)
            .map(|s| s.queue.is_empty() && s.processing_state() == ProcessingState::Stopped)
            .unwrap_or(false);
        if removable {
            servers.remove(addr);
        }
        removable
    }
}

impl Default for GameServerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
