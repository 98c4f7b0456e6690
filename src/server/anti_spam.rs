use std::time::{Duration, Instant};

use log::warn;

use crate::config::anti_spam::{COOLDOWN_SECONDS, MAX_COMMANDS_PER_SECOND};

/// Per-connection command throttle with duplicate-error suppression.
pub struct CommandLimiter {
    // Timestamp of last counter reset
    last_tick: Instant,
    commands_this_tick: u32,
    cooldown_until: Option<Instant>,
    // Last error code sent (for suppression)
    last_error_code: Option<String>,
}

impl CommandLimiter {
    pub fn new() -> Self {
        Self {
            last_tick: Instant::now(),
            commands_this_tick: 0,
            cooldown_until: None,
            last_error_code: None,
        }
    }

    /// Call for every inbound command. Returns true if the command must be
    /// dropped.
    pub fn record_command(&mut self, who: &str) -> bool {
        self.tick();
        if self.on_cooldown() {
            return true;
        }
        self.commands_this_tick += 1;
        if self.commands_this_tick > MAX_COMMANDS_PER_SECOND {
            let until = Instant::now() + Duration::from_secs(COOLDOWN_SECONDS);
            self.cooldown_until = Some(until);
            warn!(
                "[AntiSpam] {} exceeded {} commands/s, cooling down for {}s",
                who, MAX_COMMANDS_PER_SECOND, COOLDOWN_SECONDS
            );
            return true;
        }
        false
    }

    pub fn on_cooldown(&self) -> bool {
        self.cooldown_until
            .map(|until| Instant::now() < until)
            .unwrap_or(false)
    }

    /// Call when sending an error. Returns true if the error should be sent
    /// (not a repeat of the previous one).
    pub fn should_send_error(&mut self, error_code: &str, who: &str) -> bool {
        if self.last_error_code.as_deref() == Some(error_code) {
            warn!("[AntiSpam] Suppressed duplicate error '{}' for {}", error_code, who);
            return false;
        }
        self.last_error_code = Some(error_code.to_string());
        true
    }

    /// Call when a command was handled successfully.
    pub fn reset_error_suppression(&mut self) {
        self.last_error_code = None;
    }

    /// Reset the per-second counter once a new second has started.
    fn tick(&mut self) {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= Duration::from_secs(1) {
            self.last_tick = now;
            self.commands_this_tick = 0;
        }
    }
}

impl Default for CommandLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flood_triggers_the_cooldown() {
        let mut limiter = CommandLimiter::new();
        for _ in 0..MAX_COMMANDS_PER_SECOND {
            assert!(!limiter.record_command("steam:1"));
        }
        assert!(limiter.record_command("steam:1"));
        assert!(limiter.on_cooldown());
        // Everything is dropped while cooling down.
        assert!(limiter.record_command("steam:1"));
    }

    #[test]
    fn duplicate_errors_are_suppressed_until_reset() {
        let mut limiter = CommandLimiter::new();
        assert!(limiter.should_send_error("INVALID_COMMAND", "steam:1"));
        assert!(!limiter.should_send_error("INVALID_COMMAND", "steam:1"));
        assert!(limiter.should_send_error("DUPLICATE_SESSION", "steam:1"));
        limiter.reset_error_suppression();
        assert!(limiter.should_send_error("DUPLICATE_SESSION", "steam:1"));
    }
}
