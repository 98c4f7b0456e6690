pub const MAX_COMMANDS_PER_SECOND: u32 = 10;
pub const COOLDOWN_SECONDS: u64 = 5; // seconds
