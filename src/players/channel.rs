//! The client channel capability set.
//!
//! Every message the core pushes to a client goes through this trait, so the
//! transport stays exchangeable: the production implementation wraps a ws
//! session actor, tests substitute a recording stub.

use futures_util::future::LocalBoxFuture;
use thiserror::Error;

use super::types::DequeueReason;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("client channel is closed")]
    Closed,
}

pub trait ClientChannel: Send + Sync {
    /// Instructs the client to connect to the given game server now.
    ///
    /// Resolves to the channel's delivery verdict: `Ok(true)` means the
    /// instruction was delivered and accepted, `Ok(false)` means the channel
    /// reported a delivery failure. The caller owns the deadline.
    fn notify_join(&self, ip: String, port: u16) -> LocalBoxFuture<'static, Result<bool, ChannelError>>;

    /// 1-indexed position update for a queued player.
    fn queue_position_changed(&self, position: usize, length: usize) -> Result<(), ChannelError>;

    fn removed_from_queue(&self, reason: DequeueReason);

    fn match_found(&self, ip: String, port: u16);

    fn matchmaking_failed(&self, reason: String);
}
