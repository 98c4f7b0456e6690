use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::warn;
use thiserror::Error;
use uuid::Uuid;

use super::channel::ClientChannel;
use super::types::Player;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("another session is already connected for this identity")]
    DuplicateSession,
}

/// Thread-safe map of authenticated identities to Player records. One record
/// per stable id; the first connection wins, later ones are aborted.
pub struct PlayerRegistry {
    players: Mutex<HashMap<String, Arc<Player>>>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self {
            players: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the existing record for `stable_id` or creates one bound to
    /// the given channel. A second session on the same identity is rejected,
    /// leaving the incumbent untouched.
    pub fn get_or_add(
        &self,
        stable_id: &str,
        display_name: &str,
        channel_id: Uuid,
        channel: Arc<dyn ClientChannel>,
    ) -> Result<Arc<Player>, RegistryError> {
        let mut players = self.players.lock().unwrap();
        if let Some(existing) = players.get(stable_id) {
            if existing.channel_id == channel_id {
                return Ok(Arc::clone(existing));
            }
            warn!(
                "[Players] Rejected duplicate session for stable_id={} (incumbent channel={})",
                stable_id, existing.channel_id
            );
            return Err(RegistryError::DuplicateSession);
        }
        let player = Arc::new(Player::new(
            stable_id.to_string(),
            display_name.to_string(),
            channel_id,
            channel,
        ));
        players.insert(stable_id.to_string(), Arc::clone(&player));
        Ok(player)
    }

    pub fn get(&self, stable_id: &str) -> Option<Arc<Player>> {
        self.players.lock().unwrap().get(stable_id).cloned()
    }

    /// Removes the record only if it still belongs to `channel_id`, so a
    /// rejected duplicate going away cannot evict the incumbent.
    pub fn try_remove(&self, stable_id: &str, channel_id: Uuid) -> bool {
        let mut players = self.players.lock().unwrap();
        match players.get(stable_id) {
            Some(p) if p.channel_id == channel_id => {
                players.remove(stable_id);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.players.lock().unwrap().len()
    }
}

impl Default for PlayerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::players::channel::ChannelError;
    use crate::players::types::DequeueReason;
    use futures_util::future::LocalBoxFuture;

    struct NullChannel;

    impl ClientChannel for NullChannel {
        fn notify_join(
            &self,
            _ip: String,
            _port: u16,
        ) -> LocalBoxFuture<'static, Result<bool, ChannelError>> {
            Box::pin(async { Ok(true) })
        }
        fn queue_position_changed(&self, _position: usize, _length: usize) -> Result<(), ChannelError> {
            Ok(())
        }
        fn removed_from_queue(&self, _reason: DequeueReason) {}
        fn match_found(&self, _ip: String, _port: u16) {}
        fn matchmaking_failed(&self, _reason: String) {}
    }

    #[test]
    fn second_session_on_same_identity_is_rejected() {
        let registry = PlayerRegistry::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        let incumbent = registry
            .get_or_add("steam:1", "alice", first, Arc::new(NullChannel))
            .unwrap();
        let rejected = registry.get_or_add("steam:1", "alice", second, Arc::new(NullChannel));
        assert!(rejected.is_err());

        // Incumbent record untouched.
        let current = registry.get("steam:1").unwrap();
        assert_eq!(current.channel_id, incumbent.channel_id);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_requires_matching_channel() {
        let registry = PlayerRegistry::new();
        let channel_id = Uuid::new_v4();
        registry
            .get_or_add("steam:1", "alice", channel_id, Arc::new(NullChannel))
            .unwrap();

        assert!(!registry.try_remove("steam:1", Uuid::new_v4()));
        assert!(registry.get("steam:1").is_some());
        assert!(registry.try_remove("steam:1", channel_id));
        assert!(registry.get("steam:1").is_none());
    }
}
