//! Wire codec for the out-of-band getinfo exchange.
//!
//! Request:  `FF FF FF FF` + `getinfo <challenge>\n`
//! Response: `FF FF FF FF` + `infoResponse\n` + `\key\value...\challenge\<echo>`
//!
//! Responses terminated by a newline or plain EOF are both accepted.

use std::collections::HashMap;

use serde::Serialize;

pub const OOB_PREFIX: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];
const INFO_RESPONSE: &[u8] = b"infoResponse";

/// Snapshot of one successful probe reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub host_name: String,
    pub map_name: String,
    pub game_type: String,
    /// Connected clients, bots included.
    pub current_players: u32,
    pub bots: u32,
    pub max_clients: u32,
    pub is_private: bool,
    pub ping_ms: u64,
    #[serde(skip)]
    pub challenge_echo: String,
}

impl ServerInfo {
    pub fn real_players(&self) -> u32 {
        self.current_players.saturating_sub(self.bots)
    }

    pub fn free_slots(&self) -> u32 {
        self.max_clients.saturating_sub(self.current_players)
    }
}

pub fn build_getinfo(challenge: &str) -> Vec<u8> {
    let mut datagram = Vec::with_capacity(OOB_PREFIX.len() + 8 + challenge.len() + 1);
    datagram.extend_from_slice(&OOB_PREFIX);
    datagram.extend_from_slice(b"getinfo ");
    datagram.extend_from_slice(challenge.as_bytes());
    datagram.push(b'\n');
    datagram
}

/// Parsed infoResponse payload, still keyed by the raw field names.
#[derive(Debug)]
pub struct InfoPayload {
    pub challenge: String,
    fields: HashMap<String, String>,
}

impl InfoPayload {
    fn get_u32(&self, key: &str) -> u32 {
        self.fields
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    fn get_str(&self, key: &str) -> String {
        self.fields.get(key).cloned().unwrap_or_default()
    }

    pub fn into_server_info(self, ping_ms: u64) -> ServerInfo {
        ServerInfo {
            host_name: self.get_str("hostname"),
            map_name: self.get_str("mapname"),
            game_type: self.get_str("gametype"),
            current_players: self.get_u32("clients"),
            bots: self.get_u32("bots"),
            max_clients: self.get_u32("sv_maxclients"),
            is_private: self.get_u32("sv_privateClients") > 0,
            ping_ms,
            challenge_echo: self.challenge.clone(),
        }
    }
}

/// Parses an inbound datagram into an info payload. Anything that is not a
/// well-formed infoResponse yields `None`.
pub fn parse_info_response(datagram: &[u8]) -> Option<InfoPayload> {
    let body = datagram.strip_prefix(&OOB_PREFIX[..])?;
    let body = body.strip_prefix(INFO_RESPONSE)?;
    let body = body.strip_prefix(b"\n").unwrap_or(body);
    let text = std::str::from_utf8(body).ok()?;
    let text = text.strip_suffix('\n').unwrap_or(text);

    let mut fields = HashMap::new();
    let mut parts = text.split('\\');
    // A well-formed key/value list starts with a separator.
    if !parts.next()?.is_empty() {
        return None;
    }
    loop {
        match (parts.next(), parts.next()) {
            (Some(key), Some(value)) => {
                fields.insert(key.to_string(), value.to_string());
            }
            (Some(_), None) | (None, _) => break,
        }
    }

    let challenge = fields.get("challenge")?.clone();
    Some(InfoPayload { challenge, fields })
}
