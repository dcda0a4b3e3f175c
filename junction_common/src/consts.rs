//! Shared constants for the junction controller workspace.

use static_assertions::const_assert;

/// Maximum size of a single pipe frame in either direction, in bytes.
///
/// One message per `write`; producers drop oversized payloads with an
/// error log rather than splitting them across frames.
pub const FRAME_CAPACITY: usize = 128;

/// Child poll interval between non-blocking pipe reads [µs].
pub const CHILD_POLL_SLEEP_US: u64 = 1_000;

/// Seconds before a scheduled phase end at which the yellow cue fires.
pub const TRANSITION_CUE_SECS: u64 = 5;

/// Half-period of the standby flashing-yellow pattern [ms].
pub const STANDBY_FLASH_INTERVAL_MS: u64 = 500;

/// Settle time between leaving standby and de-energizing the board [ms].
pub const STANDBY_SETTLE_MS: u64 = 200;

/// Channel count of the relay board (single 16-channel bank).
pub const RELAY_CHANNEL_COUNT: usize = 16;

/// Relay board telnet port.
pub const RELAY_PORT: u16 = 23;

/// Default standby duration when the config omits `standbyDuration` [ms].
pub const DEFAULT_STANDBY_DURATION_MS: u64 = 60_000;

/// Default cycle report endpoint when the config omits `httpUrl`.
pub const DEFAULT_HTTP_URL: &str = "https://55qdnlqk-5234.asse.devtunnels.ms";

/// Default pre-shared report key when the config omits `tSecretKey`.
pub const DEFAULT_SECRET_KEY: &str = "TrafficEz-001-002-003-004";

// The channel bank must fit the u16 bitmap commands.
const_assert!(RELAY_CHANNEL_COUNT <= u16::BITS as usize);
// The longest phase tag plus NUL must fit a frame.
const_assert!(FRAME_CAPACITY >= 16);
