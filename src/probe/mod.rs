//! Live game server probe.
//!
//! One UDP socket serves every outstanding getinfo request; replies are
//! routed back to their callers by the random challenge token each request
//! carries. The probe never fails loudly: timeouts, send errors and
//! malformed replies all come back as `None`.

pub mod info;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::future::LocalBoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use log::{debug, warn};
use tokio::net::UdpSocket;
use tokio::sync::oneshot;

pub use info::ServerInfo;

/// Probe capability the services depend on; scenario tests script it.
pub trait InfoProbe: Send + Sync {
    /// Sends one probe and resolves to the matched reply, or `None` once the
    /// deadline passes. Never blocks other probes.
    fn request_info(
        &self,
        target: SocketAddr,
        timeout: Duration,
    ) -> LocalBoxFuture<'static, Option<ServerInfo>>;

    /// Fires probes for many targets, invoking `on_reply` per matched reply.
    /// Callback ordering is unspecified.
    fn start_batch(
        &self,
        targets: Vec<SocketAddr>,
        timeout: Duration,
        on_reply: Box<dyn FnMut(SocketAddr, ServerInfo)>,
    );
}

struct PendingProbe {
    target: SocketAddr,
    sent_at: Instant,
    reply_tx: oneshot::Sender<ServerInfo>,
}

pub struct ProbeClient {
    socket: Arc<UdpSocket>,
    pending: Arc<Mutex<HashMap<String, PendingProbe>>>,
}

impl ProbeClient {
    /// Binds an ephemeral UDP port and starts the reply receiver.
    pub async fn bind() -> std::io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(("0.0.0.0", 0)).await?);
        let pending: Arc<Mutex<HashMap<String, PendingProbe>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let recv_socket = Arc::clone(&socket);
        let recv_pending = Arc::clone(&pending);
        actix_rt::spawn(async move {
            let mut buffer = [0u8; 2048];
            loop {
                let (len, src) = match recv_socket.recv_from(&mut buffer).await {
                    Ok(received) => received,
                    Err(e) => {
                        warn!("[Probe] recv error: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        continue;
                    }
                };
                let payload = match info::parse_info_response(&buffer[..len]) {
                    Some(payload) => payload,
                    None => {
                        debug!("[Probe] Discarding malformed datagram from {}", src);
                        continue;
                    }
                };
                let entry = recv_pending.lock().unwrap().remove(&payload.challenge);
                match entry {
                    Some(probe) => {
                        if probe.target != src {
                            debug!(
                                "[Probe] Reply for {} arrived from {} (challenge {})",
                                probe.target, src, payload.challenge
                            );
                        }
                        let ping_ms = probe.sent_at.elapsed().as_millis() as u64;
                        let _ = probe.reply_tx.send(payload.into_server_info(ping_ms));
                    }
                    None => {
                        debug!(
                            "[Probe] Discarding reply from {} with unknown challenge {}",
                            src, payload.challenge
                        );
                    }
                }
            }
        });

        Ok(Self { socket, pending })
    }

    pub fn request_info(
        &self,
        target: SocketAddr,
        timeout: Duration,
    ) -> LocalBoxFuture<'static, Option<ServerInfo>> {
        let socket = Arc::clone(&self.socket);
        let pending = Arc::clone(&self.pending);
        Box::pin(async move {
            let challenge = format!("{:016x}", rand::random::<u64>());
            let (reply_tx, reply_rx) = oneshot::channel();
            pending.lock().unwrap().insert(
                challenge.clone(),
                PendingProbe {
                    target,
                    sent_at: Instant::now(),
                    reply_tx,
                },
            );

            let datagram = info::build_getinfo(&challenge);
            if let Err(e) = socket.send_to(&datagram, target).await {
                warn!("[Probe] Send to {} failed: {}", target, e);
                pending.lock().unwrap().remove(&challenge);
                return None;
            }

            match tokio::time::timeout(timeout, reply_rx).await {
                Ok(Ok(server_info)) => Some(server_info),
                Ok(Err(_)) => None,
                Err(_) => {
                    pending.lock().unwrap().remove(&challenge);
                    None
                }
            }
        })
    }

    pub fn start_batch(
        &self,
        targets: Vec<SocketAddr>,
        timeout: Duration,
        mut on_reply: Box<dyn FnMut(SocketAddr, ServerInfo)>,
    ) {
        let mut probes = FuturesUnordered::new();
        for target in targets {
            let request = self.request_info(target, timeout);
            probes.push(async move { (target, request.await) });
        }
        actix_rt::spawn(async move {
            while let Some((target, reply)) = probes.next().await {
                if let Some(server_info) = reply {
                    on_reply(target, server_info);
                }
            }
        });
    }
}

impl InfoProbe for ProbeClient {
    fn request_info(
        &self,
        target: SocketAddr,
        timeout: Duration,
    ) -> LocalBoxFuture<'static, Option<ServerInfo>> {
        ProbeClient::request_info(self, target, timeout)
    }

    fn start_batch(
        &self,
        targets: Vec<SocketAddr>,
        timeout: Duration,
        on_reply: Box<dyn FnMut(SocketAddr, ServerInfo)>,
    ) {
        ProbeClient::start_batch(self, targets, timeout, on_reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Canned game server: answers every getinfo with the given kv body,
    /// echoing the request challenge unless a fixed one is forced.
    async fn spawn_responder(body: &'static str, forced_challenge: Option<&'static str>) -> SocketAddr {
        let socket = UdpSocket::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = socket.local_addr().unwrap();
        actix_rt::spawn(async move {
            let mut buffer = [0u8; 2048];
            loop {
                let (len, src) = match socket.recv_from(&mut buffer).await {
                    Ok(received) => received,
                    Err(_) => return,
                };
                let request = String::from_utf8_lossy(&buffer[4..len]).to_string();
                let challenge = forced_challenge
                    .map(str::to_string)
                    .unwrap_or_else(|| {
                        request
                            .trim_end()
                            .strip_prefix("getinfo ")
                            .unwrap_or_default()
                            .to_string()
                    });
                let mut reply = info::OOB_PREFIX.to_vec();
                reply.extend_from_slice(
                    format!("infoResponse\n{}\\challenge\\{}\n", body, challenge).as_bytes(),
                );
                let _ = socket.send_to(&reply, src).await;
            }
        });
        addr
    }

    #[actix_rt::test]
    async fn round_trip_returns_parsed_info() {
        let target = spawn_responder(
            "\\hostname\\srv\\mapname\\mp_dock\\gametype\\war\\clients\\6\\bots\\1\\sv_maxclients\\12\\sv_privateClients\\0",
            None,
        )
        .await;
        let probe = ProbeClient::bind().await.unwrap();

        let server_info = probe
            .request_info(target, Duration::from_secs(2))
            .await
            .expect("reply expected");
        assert_eq!(server_info.host_name, "srv");
        assert_eq!(server_info.real_players(), 5);
        assert_eq!(server_info.free_slots(), 6);
    }

    #[actix_rt::test]
    async fn mismatched_challenge_is_discarded() {
        let target = spawn_responder("\\clients\\1\\sv_maxclients\\2", Some("0000000000000000")).await;
        let probe = ProbeClient::bind().await.unwrap();

        let reply = probe.request_info(target, Duration::from_millis(200)).await;
        assert!(reply.is_none());
    }

    #[actix_rt::test]
    async fn dead_target_times_out_to_none() {
        // Bind-and-drop leaves a port nobody answers on.
        let target = {
            let socket = UdpSocket::bind(("127.0.0.1", 0)).await.unwrap();
            socket.local_addr().unwrap()
        };
        let probe = ProbeClient::bind().await.unwrap();

        let reply = probe.request_info(target, Duration::from_millis(100)).await;
        assert!(reply.is_none());
        assert!(probe.pending.lock().unwrap().is_empty());
    }

    #[actix_rt::test]
    async fn batch_reports_each_reachable_target() {
        let a = spawn_responder("\\hostname\\a\\clients\\1\\sv_maxclients\\8", None).await;
        let b = spawn_responder("\\hostname\\b\\clients\\2\\sv_maxclients\\8", None).await;
        let probe = ProbeClient::bind().await.unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        probe.start_batch(
            vec![a, b],
            Duration::from_secs(2),
            Box::new(move |target, server_info| {
                let _ = tx.send((target, server_info.host_name));
            }),
        );

        let mut seen = Vec::new();
        while let Some(reply) = rx.recv().await {
            seen.push(reply);
        }
        seen.sort_by_key(|(_, name)| name.clone());
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (a, "a".to_string()));
        assert_eq!(seen[1], (b, "b".to_string()));
    }
}
