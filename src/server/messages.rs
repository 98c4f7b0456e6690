use actix::prelude::*;
use serde::{Deserialize, Serialize};

use crate::matchmaking::types::{MatchSearchCriteria, ServerEndpoint, ServerPing};
use crate::players::types::DequeueReason;

/// Commands a launcher client may send.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all_fields = "camelCase")]
pub enum ClientWsMessage {
    JoinQueue {
        ip: String,
        port: u16,
        instance_id: String,
    },
    LeaveQueue,
    JoinAck {
        success: bool,
    },
    SearchMatch {
        criteria: MatchSearchCriteria,
        preferred_servers: Vec<ServerEndpoint>,
    },
    UpdateSearchSession {
        criteria: MatchSearchCriteria,
        server_pings: Vec<ServerPing>,
    },
}

// Server -> client pushes.
#[derive(Message, Debug, Clone, Serialize, Deserialize)]
#[rtype(result = "()")]
#[serde(tag = "action", content = "data", rename_all_fields = "camelCase")]
pub enum ServerWsMessage {
    NotifyJoin { ip: String, port: u16 },
    QueuePositionChanged { position: usize, length: usize },
    RemovedFromQueue { reason: DequeueReason },
    MatchFound { ip: String, port: u16 },
    MatchmakingFailed { reason: String },
    JoinQueueResult { accepted: bool },
    SearchMatchResult { accepted: bool },
    UpdateSearchResult { accepted: bool },
    Error { code: String, message: String },
}

impl ServerWsMessage {
    pub fn error(code: &str, message: &str) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

/// Join instruction that needs a delivery verdict back from the session
/// actor, unlike the fire-and-forget pushes above.
#[derive(Message, Debug, Clone)]
#[rtype(result = "bool")]
pub struct PushJoin {
    pub ip: String,
    pub port: u16,
}
