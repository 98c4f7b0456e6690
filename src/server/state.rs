use std::sync::Arc;

use crate::matchmaking::service::MatchmakingService;
use crate::players::registry::PlayerRegistry;
use crate::queueing::service::QueueService;

pub struct AppState {
    pub players: Arc<PlayerRegistry>,
    pub queueing: Arc<QueueService>,
    pub matchmaking: Arc<MatchmakingService>,
}

impl AppState {
    pub fn new(
        players: Arc<PlayerRegistry>,
        queueing: Arc<QueueService>,
        matchmaking: Arc<MatchmakingService>,
    ) -> Self {
        AppState {
            players,
            queueing,
            matchmaking,
        }
    }
}
