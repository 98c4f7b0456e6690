pub const TICK_INTERVAL_MS: u64 = 500;
pub const SEARCH_TIMEOUT_SECS: u64 = 60; // seconds
pub const PROBE_TIMEOUT_SECS: u64 = 2;
