//! Centralized tuning constants shared by the server and relay paths

// Read buffer per copy direction (bytes)
pub const COPY_BUF_SIZE: usize = 16 * 1024;

// Upper bound on a single dial attempt (ms); never retried
pub const CONNECT_MS: u64 = 5_000;

// Chunks buffered per mirror; a mirror whose queue fills is cut off
pub const MIRROR_QUEUE_DEPTH: usize = 256;

// Grace period for flushing queued chunks to mirrors at teardown (ms)
pub const MIRROR_FLUSH_MS: u64 = 1_000;
