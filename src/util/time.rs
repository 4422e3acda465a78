//! Wall-clock helpers shared by the simulation and the socket boundary

use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Microseconds since the UNIX epoch. All match timestamps use this unit.
pub type Micros = u64;

pub const MICROS_PER_SECOND: f32 = 1_000_000.0;

/// Get current Unix timestamp in microseconds (for high precision)
pub fn unix_micros() -> Micros {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_micros() as u64
}

/// Signed seconds from `from` to `to`, negative if `to` precedes `from`
pub fn seconds_between(from: Micros, to: Micros) -> f32 {
    if to >= from {
        (to - from) as f32 / MICROS_PER_SECOND
    } else {
        -((from - to) as f32 / MICROS_PER_SECOND)
    }
}

/// Server start time for uptime tracking
static SERVER_START: OnceLock<Instant> = OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}
