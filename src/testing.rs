//! Scripted collaborators shared by the unit and scenario tests: a
//! recording client channel, a canned probe and a canned web-front.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::LocalBoxFuture;
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::players::channel::{ChannelError, ClientChannel};
use crate::players::types::{DequeueReason, Player};
use crate::probe::{InfoProbe, ServerInfo};
use crate::webfront::{InstanceServerStatus, InstanceStatusSource, StatusPlayer};

/// What a scripted channel should answer to the next join instruction.
#[derive(Debug, Clone, Copy)]
pub enum JoinScript {
    Accept,
    Fail,
    /// Never resolve; the caller's deadline decides.
    Ignore,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Push {
    Join { ip: String, port: u16 },
    Position { position: usize, length: usize },
    Removed(DequeueReason),
    MatchFound { ip: String, port: u16 },
    MatchmakingFailed(String),
}

#[derive(Default)]
pub struct RecordingChannel {
    pushes: Mutex<Vec<Push>>,
    join_script: Mutex<VecDeque<JoinScript>>,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script_join(&self, script: JoinScript) {
        self.join_script.lock().unwrap().push_back(script);
    }

    pub fn pushes(&self) -> Vec<Push> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn positions(&self) -> Vec<(usize, usize)> {
        self.pushes()
            .into_iter()
            .filter_map(|p| match p {
                Push::Position { position, length } => Some((position, length)),
                _ => None,
            })
            .collect()
    }

    pub fn removed_reasons(&self) -> Vec<DequeueReason> {
        self.pushes()
            .into_iter()
            .filter_map(|p| match p {
                Push::Removed(reason) => Some(reason),
                _ => None,
            })
            .collect()
    }

    pub fn join_pushes(&self) -> usize {
        self.pushes()
            .into_iter()
            .filter(|p| matches!(p, Push::Join { .. }))
            .count()
    }
}

impl ClientChannel for RecordingChannel {
    fn notify_join(
        &self,
        ip: String,
        port: u16,
    ) -> LocalBoxFuture<'static, Result<bool, ChannelError>> {
        self.pushes.lock().unwrap().push(Push::Join { ip, port });
        let script = self
            .join_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(JoinScript::Accept);
        match script {
            JoinScript::Accept => Box::pin(async { Ok(true) }),
            JoinScript::Fail => Box::pin(async { Ok(false) }),
            JoinScript::Ignore => Box::pin(futures_util::future::pending()),
            JoinScript::Error => Box::pin(async { Err(ChannelError::Closed) }),
        }
    }

    fn queue_position_changed(&self, position: usize, length: usize) -> Result<(), ChannelError> {
        self.pushes
            .lock()
            .unwrap()
            .push(Push::Position { position, length });
        Ok(())
    }

    fn removed_from_queue(&self, reason: DequeueReason) {
        self.pushes.lock().unwrap().push(Push::Removed(reason));
    }

    fn match_found(&self, ip: String, port: u16) {
        self.pushes.lock().unwrap().push(Push::MatchFound { ip, port });
    }

    fn matchmaking_failed(&self, reason: String) {
        self.pushes
            .lock()
            .unwrap()
            .push(Push::MatchmakingFailed(reason));
    }
}

pub fn null_channel() -> Arc<dyn ClientChannel> {
    RecordingChannel::new()
}

pub fn player_named(name: &str) -> Arc<Player> {
    Arc::new(Player::new(
        format!("id:{}", name),
        name.to_string(),
        Uuid::new_v4(),
        null_channel(),
    ))
}

pub fn player_with_channel(name: &str) -> (Arc<Player>, Arc<RecordingChannel>) {
    let channel = RecordingChannel::new();
    let player = Arc::new(Player::new(
        format!("id:{}", name),
        name.to_string(),
        Uuid::new_v4(),
        Arc::clone(&channel) as Arc<dyn ClientChannel>,
    ));
    (player, channel)
}

/// Probe stub. `queue_reply` entries are consumed first, one per request;
/// after that, per-target canned infos answer, and unknown targets get `None`.
#[derive(Default)]
pub struct ScriptedProbe {
    sequence: Mutex<VecDeque<Option<ServerInfo>>>,
    by_target: Mutex<HashMap<SocketAddr, ServerInfo>>,
}

impl ScriptedProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn queue_reply(&self, reply: Option<ServerInfo>) {
        self.sequence.lock().unwrap().push_back(reply);
    }

    pub fn set_info(&self, target: SocketAddr, server_info: ServerInfo) {
        self.by_target.lock().unwrap().insert(target, server_info);
    }

    fn next_reply(&self, target: SocketAddr) -> Option<ServerInfo> {
        if let Some(scripted) = self.sequence.lock().unwrap().pop_front() {
            return scripted;
        }
        self.by_target.lock().unwrap().get(&target).cloned()
    }
}

impl InfoProbe for ScriptedProbe {
    fn request_info(
        &self,
        target: SocketAddr,
        _timeout: Duration,
    ) -> LocalBoxFuture<'static, Option<ServerInfo>> {
        let reply = self.next_reply(target);
        Box::pin(async move { reply })
    }

    fn start_batch(
        &self,
        targets: Vec<SocketAddr>,
        _timeout: Duration,
        mut on_reply: Box<dyn FnMut(SocketAddr, ServerInfo)>,
    ) {
        for target in targets {
            if let Some(server_info) = self.next_reply(target) {
                on_reply(target, server_info);
            }
        }
    }
}

/// Web-front stub answering from a scripted response queue; empty once the
/// script runs out.
#[derive(Default)]
pub struct ScriptedWebfront {
    responses: Mutex<VecDeque<Vec<InstanceServerStatus>>>,
}

impl ScriptedWebfront {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn queue_response(&self, statuses: Vec<InstanceServerStatus>) {
        self.responses.lock().unwrap().push_back(statuses);
    }
}

impl InstanceStatusSource for ScriptedWebfront {
    fn instance_status(
        &self,
        _instance_id: &str,
    ) -> LocalBoxFuture<'static, Vec<InstanceServerStatus>> {
        let statuses = self.responses.lock().unwrap().pop_front().unwrap_or_default();
        Box::pin(async move { statuses })
    }
}

pub fn server_info(clients: u32, bots: u32, max_clients: u32) -> ServerInfo {
    ServerInfo {
        host_name: "scripted".to_string(),
        map_name: "mp_test".to_string(),
        game_type: "war".to_string(),
        current_players: clients,
        bots,
        max_clients,
        is_private: false,
        ping_ms: 30,
        challenge_echo: String::new(),
    }
}

pub fn status_entry(addr: SocketAddr, names: &[&str]) -> InstanceServerStatus {
    InstanceServerStatus {
        listen_address: addr.ip().to_string(),
        listen_port: addr.port(),
        players: names
            .iter()
            .map(|n| StatusPlayer { name: n.to_string() })
            .collect(),
    }
}

/// Queue tunables shrunk so scenario tests settle in milliseconds.
pub fn test_queue_config() -> QueueConfig {
    QueueConfig {
        hard_cap: 20,
        pacing: Duration::from_millis(10),
        empty_queue_sleep: Duration::from_millis(5),
        probe_timeout: Duration::from_millis(50),
        total_join_time_limit: Duration::from_millis(90),
        max_join_attempts: 3,
        clear_attempts_when_server_full: false,
        confirm_joins_with_webfront: false,
    }
}
