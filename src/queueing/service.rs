//! Queueing service: join dispatch, timeout enforcement, dequeue accounting
//! and the per-server processing loops.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};

use super::game_server::{GameServer, GameServerRegistry};
use super::queue::{EnqueueOutcome, QueueNode};
use crate::config::QueueConfig;
use crate::players::types::{DequeueReason, Player, PlayerState};
use crate::probe::InfoProbe;
use crate::webfront::{InstanceServerStatus, InstanceStatusSource};

pub struct QueueService {
    servers: Arc<GameServerRegistry>,
    probe: Arc<dyn InfoProbe>,
    webfront: Option<Arc<dyn InstanceStatusSource>>,
    config: QueueConfig,
}

impl QueueService {
    pub fn new(
        servers: Arc<GameServerRegistry>,
        probe: Arc<dyn InfoProbe>,
        webfront: Option<Arc<dyn InstanceStatusSource>>,
        config: QueueConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            servers,
            probe,
            webfront,
            config,
        })
    }

    pub fn servers(&self) -> &GameServerRegistry {
        &self.servers
    }

    /// Puts `player` at the back of the target server's queue and makes sure
    /// the server has a running processing loop. Refused when the player is
    /// in the wrong state, already waiting there, or the queue is at its cap.
    pub fn join_queue(
        self: &Arc<Self>,
        player: &Arc<Player>,
        addr: SocketAddr,
        instance_id: &str,
    ) -> bool {
        let server = self.servers.get_or_create(addr, instance_id);
        if server.queue.contains(player) {
            debug!(
                "[Queue] {} is already waiting on {}",
                player.display_name, addr
            );
            return false;
        }
        let previous = match player.try_begin_queue(addr) {
            Some(previous) => previous,
            None => {
                debug!(
                    "[Queue] {} cannot queue from state {:?}",
                    player.display_name,
                    player.state()
                );
                return false;
            }
        };
        match server.queue.enqueue(Arc::clone(player), self.config.hard_cap) {
            EnqueueOutcome::Added { position, length } => {
                info!(
                    "[Queue] {} queued on {} at position {}/{}",
                    player.display_name, addr, position, length
                );
                self.ensure_processing(&server);
                self.broadcast_positions(&server);
                true
            }
            EnqueueOutcome::AlreadyQueued => {
                player.revert_queue_claim(previous);
                false
            }
            EnqueueOutcome::CapReached => {
                warn!(
                    "[Queue] Queue of {} is at its cap of {}, refusing {}",
                    addr, self.config.hard_cap, player.display_name
                );
                player.revert_queue_claim(previous);
                false
            }
        }
    }

    /// Voluntary leave. The leaver gets no notification.
    pub fn leave_queue(&self, player: &Arc<Player>) {
        if matches!(player.state(), PlayerState::Queued | PlayerState::Joining) {
            if let Some(server) = player.server().and_then(|a| self.servers.get(&a)) {
                self.dequeue(&server, player, DequeueReason::UserLeave);
            }
        }
    }

    /// Client's answer to a join instruction it acted upon.
    pub fn on_join_ack(&self, player: &Arc<Player>, success: bool) {
        if player.state() != PlayerState::Joining {
            warn!(
                "[Queue] Ignoring join ack from {} in state {:?}",
                player.display_name,
                player.state()
            );
            return;
        }
        let server = match player.server().and_then(|a| self.servers.get(&a)) {
            Some(server) => server,
            None => return,
        };
        if success {
            self.dequeue(&server, player, DequeueReason::Joined);
        } else {
            self.on_join_failed(&server, player);
        }
    }

    /// Transport-level disconnect. Removes the player's enqueued presence
    /// synchronously; the disconnected side gets nothing.
    pub fn handle_disconnect(&self, player: &Arc<Player>) {
        if matches!(player.state(), PlayerState::Queued | PlayerState::Joining) {
            if let Some(server) = player.server().and_then(|a| self.servers.get(&a)) {
                self.dequeue(&server, player, DequeueReason::Disconnect);
            }
        }
        player.set_disconnected();
    }

    /// Asks every running processing loop to wind down.
    pub fn cancel_all(&self) {
        for server in self.servers.all() {
            server.request_stop();
        }
    }

    fn ensure_processing(self: &Arc<Self>, server: &Arc<GameServer>) {
        if server.try_start_processing() {
            info!("[Queue] Starting processing loop for {}", server.addr);
            let service = Arc::clone(self);
            let server = Arc::clone(server);
            actix_rt::spawn(async move {
                service.process_server(server).await;
            });
        }
    }

    async fn process_server(self: Arc<Self>, server: Arc<GameServer>) {
        while !server.stop_requested() {
            if server.queue.is_empty() {
                tokio::time::sleep(self.config.empty_queue_sleep).await;
                continue;
            }
            let pacing_deadline = tokio::time::Instant::now() + self.config.pacing;
            self.run_iteration(&server).await;
            tokio::time::sleep_until(pacing_deadline).await;
        }
        server.mark_stopped();
        info!("[Queue] Processing loop for {} stopped", server.addr);
    }

    /// One loop iteration: web-front confirmation, live probe, then join
    /// dispatch and timeout enforcement. Tests drive this directly.
    pub(crate) async fn run_iteration(&self, server: &Arc<GameServer>) {
        if self.config.confirm_joins_with_webfront && server.joining_count() > 0 {
            if let Some(webfront) = &self.webfront {
                let statuses = webfront.instance_status(&server.instance_id()).await;
                self.confirm_joining_players(server, statuses);
            }
        }

        // Every waiting player is already mid-join; nothing to dispatch.
        if server.joining_count() == server.queue.len() {
            return;
        }

        match self
            .probe
            .request_info(server.addr, self.config.probe_timeout)
            .await
        {
            Some(server_info) => server.record_probe(server_info),
            None => server.clear_probe(),
        }

        self.dispatch(server).await;
    }

    /// Settles Joining players against the web-front player list. When the
    /// lookup returns no data for this server, every Joining player is
    /// assumed to have made it.
    fn confirm_joining_players(
        &self,
        server: &Arc<GameServer>,
        statuses: Vec<InstanceServerStatus>,
    ) {
        let names = actual_player_names(server.addr, &statuses);
        server.set_actual_players(names.clone().unwrap_or_default());
        for node in server.queue.snapshot() {
            if node.player.state() != PlayerState::Joining {
                continue;
            }
            let confirmed = names
                .as_ref()
                .map_or(true, |set| set.contains(&node.player.display_name));
            if confirmed {
                debug!(
                    "[Queue] {} confirmed on {} via web-front",
                    node.player.display_name, server.addr
                );
                self.dequeue_node(server, &node, DequeueReason::Joined);
            }
        }
    }

    async fn dispatch(&self, server: &Arc<GameServer>) {
        let now = Instant::now();
        let free_slots = server
            .last_info()
            .map(|i| i.free_slots() as usize)
            .unwrap_or(0);
        let mut budget = free_slots.saturating_sub(server.joining_count());

        for node in server.queue.snapshot() {
            if !node.is_linked() {
                continue;
            }
            let player = Arc::clone(&node.player);
            match player.state() {
                PlayerState::Joining => {
                    let expired = player.first_attempt_at().map_or(false, |first| {
                        now.duration_since(first) > self.config.total_join_time_limit
                    });
                    if expired {
                        self.dequeue_node(server, &node, DequeueReason::JoinTimeout);
                    }
                }
                PlayerState::Queued if budget > 0 => {
                    budget -= 1;
                    self.attempt_join(server, &player).await;
                }
                _ => {}
            }
        }
    }

    async fn attempt_join(&self, server: &Arc<GameServer>, player: &Arc<Player>) {
        player.record_attempt(Instant::now());
        debug!(
            "[Queue] Join attempt {} for {} on {}",
            player.attempt_count(),
            player.display_name,
            server.addr
        );
        let push = player
            .channel
            .notify_join(server.addr.ip().to_string(), server.addr.port());
        match tokio::time::timeout(self.config.join_attempt_timeout(), push).await {
            Ok(Ok(true)) => {
                if player.mark_joining(server.addr) {
                    server.inc_joining();
                }
            }
            Ok(Ok(false)) => self.on_join_failed(server, player),
            Ok(Err(e)) => {
                warn!(
                    "[Queue] Join push to {} failed: {}",
                    player.display_name, e
                );
                self.dequeue(server, player, DequeueReason::Unknown);
            }
            Err(_) => self.dequeue(server, player, DequeueReason::JoinTimeout),
        }
    }

    /// Late-failure policy: a report that arrives after the join instruction
    /// was already accepted, or a synchronous delivery failure.
    fn on_join_failed(&self, server: &Arc<GameServer>, player: &Arc<Player>) {
        if player.attempt_count() >= self.config.max_join_attempts {
            self.dequeue(server, player, DequeueReason::MaxJoinAttemptsReached);
            return;
        }
        let server_filled = server
            .last_info()
            .map(|i| i.free_slots() == 0)
            .unwrap_or(false);
        if server_filled {
            // The server filled ahead of us; keep the player for another try.
            if player.revert_to_queued() {
                server.dec_joining();
            }
            if self.config.clear_attempts_when_server_full {
                player.clear_attempts();
            }
            debug!(
                "[Queue] {} kept in queue of {}, server filled ahead",
                player.display_name, server.addr
            );
            return;
        }
        self.dequeue(server, player, DequeueReason::JoinFailed);
    }

    fn dequeue(&self, server: &Arc<GameServer>, player: &Arc<Player>, reason: DequeueReason) {
        if !server.queue.try_remove(player) {
            return;
        }
        self.settle_dequeue(server, player, reason);
    }

    /// Removal through a snapshot handle; loses the race gracefully if the
    /// player was dequeued through another route in the meantime.
    fn dequeue_node(&self, server: &Arc<GameServer>, node: &Arc<QueueNode>, reason: DequeueReason) {
        if !server.queue.try_remove_node(node) {
            return;
        }
        self.settle_dequeue(server, &node.player, reason);
    }

    fn settle_dequeue(&self, server: &Arc<GameServer>, player: &Arc<Player>, reason: DequeueReason) {
        let was_joining = player.complete_dequeue(reason);
        if was_joining {
            server.dec_joining();
        }
        if reason.notifies_player() {
            player.channel.removed_from_queue(reason);
        }
        info!(
            "[Queue] {} removed from queue of {} ({:?})",
            player.display_name, server.addr, reason
        );
        self.broadcast_positions(server);
    }

    fn broadcast_positions(&self, server: &Arc<GameServer>) {
        let snapshot = server.queue.snapshot();
        let length = snapshot.len();
        for (idx, node) in snapshot.iter().enumerate() {
            if let Err(e) = node.player.channel.queue_position_changed(idx + 1, length) {
                warn!(
                    "[Queue] Position push to {} failed: {}",
                    node.player.display_name, e
                );
            }
        }
    }
}

/// Display names the web-front reports for this exact server, or `None`
/// when the response carries no usable data for it.
fn actual_player_names(
    addr: SocketAddr,
    statuses: &[InstanceServerStatus],
) -> Option<HashSet<String>> {
    let entry = statuses.iter().find(|s| {
        s.listen_port == addr.port()
            && s.listen_address
                .parse::<IpAddr>()
                .map_or(false, |ip| ip == addr.ip())
    })?;
    Some(entry.players.iter().map(|p| p.name.clone()).collect())
}
