//! Matchmaking service: search sessions and the periodic tick that turns
//! them into queue joins.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use log::{debug, info};

use super::types::{MatchSearchCriteria, ServerEndpoint, ServerPing};
use crate::config::MatchmakingConfig;
use crate::players::types::{Player, PlayerState};
use crate::probe::{InfoProbe, ServerInfo};
use crate::queueing::service::QueueService;

struct SearchSession {
    player: Arc<Player>,
    criteria: MatchSearchCriteria,
    /// Candidate servers, in the order the client supplied them.
    endpoints: Vec<SocketAddr>,
    /// Client-measured pings; probe pings fill the gaps.
    pings: HashMap<SocketAddr, u32>,
    started_at: Instant,
}

pub struct MatchmakingService {
    queueing: Arc<QueueService>,
    probe: Arc<dyn InfoProbe>,
    config: MatchmakingConfig,
    sessions: Mutex<HashMap<String, SearchSession>>,
    stopping: AtomicBool,
}

impl MatchmakingService {
    pub fn new(
        queueing: Arc<QueueService>,
        probe: Arc<dyn InfoProbe>,
        config: MatchmakingConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            queueing,
            probe,
            config,
            sessions: Mutex::new(HashMap::new()),
            stopping: AtomicBool::new(false),
        })
    }

    /// Spawns the global tick loop.
    pub fn start(self: &Arc<Self>) {
        let service = Arc::clone(self);
        actix_rt::spawn(async move {
            info!("[Matchmaking] Tick loop started");
            while !service.stopping.load(Ordering::Acquire) {
                tokio::time::sleep(service.config.tick_interval).await;
                service.run_tick().await;
            }
            info!("[Matchmaking] Tick loop stopped");
        });
    }

    pub fn stop(&self) {
        self.stopping.store(true, Ordering::Release);
    }

    /// Opens a search session. Valid only for a Connected player.
    pub fn enter_matchmaking(
        &self,
        player: &Arc<Player>,
        criteria: MatchSearchCriteria,
        preferred_servers: &[ServerEndpoint],
    ) -> bool {
        if !player.try_begin_matchmaking() {
            debug!(
                "[Matchmaking] {} cannot search from state {:?}",
                player.display_name,
                player.state()
            );
            return false;
        }
        let mut seen = HashSet::new();
        let endpoints: Vec<SocketAddr> = preferred_servers
            .iter()
            .filter_map(ServerEndpoint::socket_addr)
            .filter(|a| seen.insert(*a))
            .collect();
        info!(
            "[Matchmaking] {} searching across {} servers",
            player.display_name,
            endpoints.len()
        );
        self.sessions.lock().unwrap().insert(
            player.stable_id.clone(),
            SearchSession {
                player: Arc::clone(player),
                criteria,
                endpoints,
                pings: HashMap::new(),
                started_at: Instant::now(),
            },
        );
        true
    }

    /// Replaces the criteria and ping list of an in-flight session.
    pub fn update_search(
        &self,
        player: &Arc<Player>,
        criteria: MatchSearchCriteria,
        server_pings: &[ServerPing],
    ) -> bool {
        if player.state() != PlayerState::Matchmaking {
            return false;
        }
        let mut sessions = self.sessions.lock().unwrap();
        let session = match sessions.get_mut(&player.stable_id) {
            Some(session) => session,
            None => return false,
        };
        session.criteria = criteria;
        for ping in server_pings {
            if let Some(addr) = ping.socket_addr() {
                session.pings.insert(addr, ping.ping_ms);
                if !session.endpoints.contains(&addr) {
                    session.endpoints.push(addr);
                }
            }
        }
        true
    }

    /// Only valid from Matchmaking; reverts the player to Connected.
    pub fn leave_matchmaking(&self, player: &Arc<Player>) {
        self.sessions.lock().unwrap().remove(&player.stable_id);
        player.leave_matchmaking();
    }

    pub fn handle_disconnect(&self, player: &Arc<Player>) {
        self.sessions.lock().unwrap().remove(&player.stable_id);
    }

    /// One evaluation pass over every search session.
    pub(crate) async fn run_tick(&self) {
        struct Work {
            stable_id: String,
            player: Arc<Player>,
            criteria: MatchSearchCriteria,
            endpoints: Vec<SocketAddr>,
            pings: HashMap<SocketAddr, u32>,
            started_at: Instant,
        }

        let work: Vec<Work> = {
            let mut sessions = self.sessions.lock().unwrap();
            // Sessions of players that queued directly or disconnected in the
            // meantime are dead weight; drop them here.
            sessions.retain(|_, s| s.player.state() == PlayerState::Matchmaking);
            sessions
                .iter()
                .map(|(stable_id, s)| Work {
                    stable_id: stable_id.clone(),
                    player: Arc::clone(&s.player),
                    criteria: s.criteria.clone(),
                    endpoints: s.endpoints.clone(),
                    pings: s.pings.clone(),
                    started_at: s.started_at,
                })
                .collect()
        };
        if work.is_empty() {
            return;
        }

        let mut targets: Vec<SocketAddr> = Vec::new();
        let mut seen = HashSet::new();
        for w in &work {
            for addr in &w.endpoints {
                if seen.insert(*addr) {
                    targets.push(*addr);
                }
            }
        }
        let infos = self.probe_all(targets).await;

        for w in work {
            if w.player.state() != PlayerState::Matchmaking {
                continue;
            }
            if w.started_at.elapsed() >= self.config.search_timeout {
                info!(
                    "[Matchmaking] {} found no server within the time limit",
                    w.player.display_name
                );
                self.sessions.lock().unwrap().remove(&w.stable_id);
                if w.player.leave_matchmaking() {
                    w.player
                        .channel
                        .matchmaking_failed("no suitable server found".to_string());
                }
                continue;
            }
            let best = match pick_server(&w.criteria, &w.endpoints, &w.pings, &infos) {
                Some(best) => best,
                None => continue,
            };
            if self.queueing.join_queue(&w.player, best, "") {
                info!(
                    "[Matchmaking] Matched {} onto {}",
                    w.player.display_name, best
                );
                self.sessions.lock().unwrap().remove(&w.stable_id);
                w.player.channel.match_found(best.ip().to_string(), best.port());
            }
        }
    }

    async fn probe_all(&self, targets: Vec<SocketAddr>) -> HashMap<SocketAddr, ServerInfo> {
        if targets.is_empty() {
            return HashMap::new();
        }
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        self.probe.start_batch(
            targets,
            self.config.probe_timeout,
            Box::new(move |target, server_info| {
                let _ = tx.send((target, server_info));
            }),
        );
        let mut infos = HashMap::new();
        while let Some((target, server_info)) = rx.recv().await {
            infos.insert(target, server_info);
        }
        infos
    }
}

/// Ranks passing candidates: emptier games first when the player asked for
/// fresh ones, fuller games first otherwise, ping as the tiebreak.
fn pick_server(
    criteria: &MatchSearchCriteria,
    endpoints: &[SocketAddr],
    pings: &HashMap<SocketAddr, u32>,
    infos: &HashMap<SocketAddr, ServerInfo>,
) -> Option<SocketAddr> {
    let mut candidates: Vec<(SocketAddr, u32, u64)> = endpoints
        .iter()
        .filter_map(|addr| {
            let server_info = infos.get(addr)?;
            let ping = pings
                .get(addr)
                .map(|&p| u64::from(p))
                .unwrap_or(server_info.ping_ms);
            criteria
                .matches(server_info, ping)
                .then(|| (*addr, server_info.real_players(), ping))
        })
        .collect();
    candidates.sort_by(|a, b| {
        let by_population = if criteria.try_fresh_games_first {
            a.1.cmp(&b.1)
        } else {
            b.1.cmp(&a.1)
        };
        by_population.then(a.2.cmp(&b.2))
    });
    candidates.first().map(|&(addr, _, _)| addr)
}
