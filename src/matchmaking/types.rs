use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::probe::ServerInfo;

/// Client-side search preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSearchCriteria {
    pub max_ping: u32,
    pub min_players: u32,
    /// Carried for the wire protocol; `-1` disables it. The probe reply
    /// exposes no score to filter on.
    pub max_score: i32,
    /// `-1` disables the upper bound.
    pub max_players_on_server: i32,
    pub try_fresh_games_first: bool,
}

impl MatchSearchCriteria {
    /// Whether a server with this probe snapshot and ping passes.
    pub fn matches(&self, server_info: &ServerInfo, ping_ms: u64) -> bool {
        if ping_ms > u64::from(self.max_ping) {
            return false;
        }
        if server_info.real_players() < self.min_players {
            return false;
        }
        if self.max_players_on_server >= 0
            && server_info.real_players() > self.max_players_on_server as u32
        {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerEndpoint {
    pub ip: String,
    pub port: u16,
}

impl ServerEndpoint {
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.ip
            .parse::<IpAddr>()
            .ok()
            .map(|ip| SocketAddr::new(ip, self.port))
    }
}

/// Client-measured latency to one server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerPing {
    pub ip: String,
    pub port: u16,
    pub ping_ms: u32,
}

impl ServerPing {
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.ip
            .parse::<IpAddr>()
            .ok()
            .map(|ip| SocketAddr::new(ip, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::server_info;

    fn criteria() -> MatchSearchCriteria {
        MatchSearchCriteria {
            max_ping: 80,
            min_players: 2,
            max_score: -1,
            max_players_on_server: 10,
            try_fresh_games_first: false,
        }
    }

    #[test]
    fn ping_bound_is_inclusive() {
        let info = server_info(4, 0, 12);
        assert!(criteria().matches(&info, 80));
        assert!(!criteria().matches(&info, 81));
    }

    #[test]
    fn bots_do_not_count_toward_min_players() {
        // 4 clients but 3 bots: only one real player.
        let info = server_info(4, 3, 12);
        assert!(!criteria().matches(&info, 10));
    }

    #[test]
    fn player_cap_can_be_disabled() {
        let mut c = criteria();
        let crowded = server_info(11, 0, 18);
        assert!(!c.matches(&crowded, 10));
        c.max_players_on_server = -1;
        assert!(c.matches(&crowded, 10));
    }

    #[test]
    fn endpoint_parsing() {
        let endpoint = ServerEndpoint {
            ip: "10.0.0.1".to_string(),
            port: 28960,
        };
        assert_eq!(
            endpoint.socket_addr(),
            Some("10.0.0.1:28960".parse().unwrap())
        );
        let bad = ServerEndpoint {
            ip: "not-an-ip".to_string(),
            port: 28960,
        };
        assert_eq!(bad.socket_addr(), None);
    }
}
