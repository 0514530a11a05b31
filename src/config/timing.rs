/// Simulated broker round-trip for connect/disconnect and one-shot queries
pub const SIMULATOR_LATENCY_MS: u64 = 100;

/// Interval between synthetic ticks for a simulator subscription
pub const SIMULATOR_TICK_INTERVAL_MS: u64 = 1_000;

/// How often the run loop drains console commands
pub const COMMAND_POLL_INTERVAL_MS: u64 = 16;
