//! Read-only operator view of the queues.

use std::str::FromStr;
use std::sync::Arc;

use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::players::types::PlayerState;
use crate::probe::ServerInfo;
use crate::queueing::game_server::{GameServer, ProcessingState};
use crate::server::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueReport {
    pub ip: String,
    pub port: u16,
    pub instance_id: String,
    pub processing_state: ProcessingState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_server_info: Option<ServerInfo>,
    pub spawn_date: u64,
    pub players: Vec<QueuedPlayerReport>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedPlayerReport {
    pub name: String,
    pub state: PlayerState,
    pub join_attempts: usize,
    pub queue_time_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct QueueFilter {
    pub state: Option<String>,
}

fn build_report(server: &Arc<GameServer>) -> QueueReport {
    let players = server
        .queue
        .snapshot()
        .iter()
        .map(|node| {
            let (state, join_attempts, queue_time) = node.player.queue_view();
            QueuedPlayerReport {
                name: node.player.display_name.clone(),
                state,
                join_attempts,
                queue_time_secs: queue_time.map(|d| d.as_secs()).unwrap_or(0),
            }
        })
        .collect();
    QueueReport {
        ip: server.addr.ip().to_string(),
        port: server.addr.port(),
        instance_id: server.instance_id(),
        processing_state: server.processing_state(),
        last_server_info: server.last_info(),
        spawn_date: server.spawn_unix_secs(),
        players,
    }
}

/// `GET /queues[?state=Idle|Running|Stopping|Stopped]`
pub async fn list_queues(
    data: web::Data<AppState>,
    query: web::Query<QueueFilter>,
) -> impl Responder {
    let filter = match query.state.as_deref() {
        Some(raw) => match ProcessingState::from_str(raw) {
            Ok(state) => Some(state),
            Err(()) => {
                return HttpResponse::BadRequest().json(json!({
                    "error": { "code": "INVALID_FILTER", "message": "unknown processing state" }
                }));
            }
        },
        None => None,
    };

    let reports: Vec<QueueReport> = data
        .queueing
        .servers()
        .all()
        .iter()
        .filter(|s| filter.map_or(true, |f| s.processing_state() == f))
        .map(build_report)
        .collect();
    HttpResponse::Ok().json(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use crate::testing::{player_named, server_info};

    #[test]
    fn report_reflects_queue_contents() {
        let addr: SocketAddr = "10.0.0.1:28960".parse().unwrap();
        let server = Arc::new(GameServer::new(addr, "iw4"));
        server.record_probe(server_info(10, 2, 18));

        let alice = player_named("alice");
        alice.try_begin_queue(addr).unwrap();
        assert!(matches!(
            server.queue.enqueue(alice, 20),
            crate::queueing::queue::EnqueueOutcome::Added { .. }
        ));

        let report = build_report(&server);
        assert_eq!(report.ip, "10.0.0.1");
        assert_eq!(report.port, 28960);
        assert_eq!(report.instance_id, "iw4");
        assert_eq!(report.processing_state, ProcessingState::Idle);
        assert_eq!(report.players.len(), 1);
        assert_eq!(report.players[0].name, "alice");
        assert_eq!(report.players[0].state, PlayerState::Queued);
        assert_eq!(report.players[0].join_attempts, 0);

        let body = serde_json::to_value(&report).unwrap();
        assert_eq!(body["instanceId"], "iw4");
        assert_eq!(body["processingState"], "Idle");
        assert_eq!(body["lastServerInfo"]["maxClients"], 18);
        assert_eq!(body["players"][0]["state"], "Queued");
    }

    #[test]
    fn missing_probe_data_is_omitted() {
        let addr: SocketAddr = "10.0.0.1:28960".parse().unwrap();
        let server = Arc::new(GameServer::new(addr, "iw4"));
        let body = serde_json::to_value(build_report(&server)).unwrap();
        assert!(body.get("lastServerInfo").is_none());
    }

    #[test]
    fn state_filter_parses_the_four_states() {
        for (raw, expected) in [
            ("Idle", ProcessingState::Idle),
            ("Running", ProcessingState::Running),
            ("Stopping", ProcessingState::Stopping),
            ("Stopped", ProcessingState::Stopped),
        ] {
            assert_eq!(ProcessingState::from_str(raw), Ok(expected));
        }
        assert!(ProcessingState::from_str("running").is_err());
    }
}
