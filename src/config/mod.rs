//! Main configuration module.
//!
//! Re-exports the per-concern constant modules and defines the explicit
//! configuration record the host passes in at startup. The core itself
//! reads no files and no environment variables.

pub mod anti_spam;
pub mod matchmaking;
pub mod queueing;

use std::time::Duration;

/// Top-level configuration record, built by the host in `main`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub bind_port: u16,
    /// Base URL of the web-front status API. `None` disables the client.
    pub webfront_base_url: Option<String>,
    pub queueing: QueueConfig,
    pub matchmaking: MatchmakingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            bind_port: 8080,
            webfront_base_url: None,
            queueing: QueueConfig::default(),
            matchmaking: MatchmakingConfig::default(),
        }
    }
}

/// Tunables of the queueing service. Tests inject shortened durations here.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Hard cap on the number of players waiting on one server.
    pub hard_cap: usize,
    /// Delay between two iterations of a per-server processing loop.
    pub pacing: Duration,
    /// Sleep between polls while a queue is empty.
    pub empty_queue_sleep: Duration,
    /// Deadline for one getinfo round trip.
    pub probe_timeout: Duration,
    /// Total time a player may spend in Joining across all attempts.
    pub total_join_time_limit: Duration,
    /// Join attempts before a player is dropped from the queue.
    pub max_join_attempts: usize,
    /// Whether a "server filled ahead of us" late failure resets the
    /// attempt history of the reverted player.
    pub clear_attempts_when_server_full: bool,
    /// Cross-check Joining players against the web-front player list.
    pub confirm_joins_with_webfront: bool,
}

impl QueueConfig {
    /// Deadline for delivering a single join instruction to the client.
    pub fn join_attempt_timeout(&self) -> Duration {
        self.total_join_time_limit / self.max_join_attempts.max(1) as u32
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            hard_cap: queueing::QUEUE_HARD_CAP,
            pacing: Duration::from_millis(queueing::PACING_MS),
            empty_queue_sleep: Duration::from_millis(queueing::EMPTY_QUEUE_SLEEP_MS),
            probe_timeout: Duration::from_secs(queueing::PROBE_TIMEOUT_SECS),
            total_join_time_limit: Duration::from_secs(queueing::TOTAL_JOIN_TIME_LIMIT_SECS),
            max_join_attempts: queueing::MAX_JOIN_ATTEMPTS,
            clear_attempts_when_server_full: false,
            confirm_joins_with_webfront: false,
        }
    }
}

/// Tunables of the matchmaking service.
#[derive(Debug, Clone)]
pub struct MatchmakingConfig {
    /// Interval of the global matchmaking tick.
    pub tick_interval: Duration,
    /// How long a search session may run before the client is told it failed.
    pub search_timeout: Duration,
    /// Probe deadline used by the tick; shorter than the queue loop's so one
    /// dead server cannot stall a whole tick.
    pub probe_timeout: Duration,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(matchmaking::TICK_INTERVAL_MS),
            search_timeout: Duration::from_secs(matchmaking::SEARCH_TIMEOUT_SECS),
            probe_timeout: Duration::from_secs(matchmaking::PROBE_TIMEOUT_SECS),
        }
    }
}
