use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::channel::ClientChannel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerState {
    Connected,
    Matchmaking,
    Queued,
    Joining,
    Joined,
    Disconnected,
}

/// Why a player left a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DequeueReason {
    UserLeave,
    Disconnect,
    JoinFailed,
    JoinTimeout,
    MaxJoinAttemptsReached,
    Joined,
    Unknown,
}

impl DequeueReason {
    /// Reasons the removed player is told about. Leaving on purpose, being
    /// disconnected, joining and a plain join failure stay silent.
    pub fn notifies_player(self) -> bool {
        matches!(
            self,
            Self::JoinTimeout | Self::MaxJoinAttemptsReached | Self::Unknown
        )
    }
}

/// One connected identity. Immutable identity fields plus a mutable core
/// guarded by a mutex; transitions of enqueued players are driven by the
/// owning server's processing loop.
pub struct Player {
    pub stable_id: String,
    pub display_name: String,
    pub channel_id: Uuid,
    pub channel: Arc<dyn ClientChannel>,
    inner: Mutex<PlayerInner>,
}

struct PlayerInner {
    state: PlayerState,
    server: Option<SocketAddr>,
    queued_at: Option<Instant>,
    join_attempts: Vec<Instant>,
}

impl Player {
    pub fn new(
        stable_id: String,
        display_name: String,
        channel_id: Uuid,
        channel: Arc<dyn ClientChannel>,
    ) -> Self {
        Self {
            stable_id,
            display_name,
            channel_id,
            channel,
            inner: Mutex::new(PlayerInner {
                state: PlayerState::Connected,
                server: None,
                queued_at: None,
                join_attempts: Vec::new(),
            }),
        }
    }

    pub fn state(&self) -> PlayerState {
        self.inner.lock().unwrap().state
    }

    /// Server the player is queued on, if any.
    pub fn server(&self) -> Option<SocketAddr> {
        self.inner.lock().unwrap().server
    }

    pub fn attempt_count(&self) -> usize {
        self.inner.lock().unwrap().join_attempts.len()
    }

    pub fn first_attempt_at(&self) -> Option<Instant> {
        self.inner.lock().unwrap().join_attempts.first().copied()
    }

    pub fn record_attempt(&self, at: Instant) {
        self.inner.lock().unwrap().join_attempts.push(at);
    }

    pub fn clear_attempts(&self) {
        self.inner.lock().unwrap().join_attempts.clear();
    }

    /// One row of the introspection report: state, attempt count, wait time.
    pub fn queue_view(&self) -> (PlayerState, usize, Option<Duration>) {
        let inner = self.inner.lock().unwrap();
        (
            inner.state,
            inner.join_attempts.len(),
            inner.queued_at.map(|t| t.elapsed()),
        )
    }

    /// Claims the player for a queue. Succeeds only from Connected or
    /// Matchmaking; returns the previous state so a failed enqueue can be
    /// rolled back with [`Player::revert_queue_claim`].
    pub fn try_begin_queue(&self, server: SocketAddr) -> Option<PlayerState> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            PlayerState::Connected | PlayerState::Matchmaking => {
                let previous = inner.state;
                inner.state = PlayerState::Queued;
                inner.server = Some(server);
                inner.queued_at = Some(Instant::now());
                inner.join_attempts.clear();
                Some(previous)
            }
            _ => None,
        }
    }

    pub fn revert_queue_claim(&self, previous: PlayerState) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = previous;
        inner.server = None;
        inner.queued_at = None;
    }

    /// Queued -> Joining, only while still claimed by `server`.
    pub fn mark_joining(&self, server: SocketAddr) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == PlayerState::Queued && inner.server == Some(server) {
            inner.state = PlayerState::Joining;
            true
        } else {
            false
        }
    }

    /// Joining -> Queued after a "server filled ahead of us" late failure.
    /// Returns whether the player actually was Joining.
    pub fn revert_to_queued(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == PlayerState::Joining {
            inner.state = PlayerState::Queued;
            true
        } else {
            false
        }
    }

    /// Finalizes a dequeue: clears the server back-reference and moves the
    /// state to where the reason leads. Returns whether the player was
    /// Joining, so the caller can settle the reserved slot.
    pub fn complete_dequeue(&self, reason: DequeueReason) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let was_joining = inner.state == PlayerState::Joining;
        inner.state = match reason {
            DequeueReason::Joined => PlayerState::Joined,
            DequeueReason::Disconnect => PlayerState::Disconnected,
            _ => PlayerState::Connected,
        };
        inner.server = None;
        inner.queued_at = None;
        was_joining
    }

    /// Connected -> Matchmaking.
    pub fn try_begin_matchmaking(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == PlayerState::Connected {
            inner.state = PlayerState::Matchmaking;
            true
        } else {
            false
        }
    }

    /// Matchmaking -> Connected.
    pub fn leave_matchmaking(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == PlayerState::Matchmaking {
            inner.state = PlayerState::Connected;
            true
        } else {
            false
        }
    }

    pub fn set_disconnected(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = PlayerState::Disconnected;
        inner.server = None;
        inner.queued_at = None;
    }
}
