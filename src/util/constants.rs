// pg-startup-profiler - util/constants.rs
//
// Single source of truth for named constants, limits, and defaults.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "pg-startup-profiler";

/// Application identifier used for config directories.
pub const APP_ID: &str = "pg-startup-profiler";

/// Current application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Rules limits
// =============================================================================

/// Maximum size of an operator-supplied rules TOML file in bytes.
pub const MAX_RULES_FILE_SIZE: u64 = 256 * 1024; // 256 KB

/// Maximum regex pattern length to prevent ReDoS.
pub const MAX_REGEX_PATTERN_LENGTH: usize = 4_096;

/// Maximum number of patterns in one rules document.
pub const MAX_PATTERNS: usize = 512;

/// Occurrence threshold applied when a pattern omits `occurrence`.
pub const DEFAULT_OCCURRENCE: u32 = 1;

// =============================================================================
// Well-known event and capture names
// =============================================================================

/// Event name whose `extension` capture feeds the extension load table.
pub const EVENT_EXTENSION_LOAD: &str = "extension_load";

/// Capture name carrying the extension name.
pub const CAPTURE_EXTENSION: &str = "extension";

/// Event name marking the start of an init / migration script.
pub const EVENT_MIGRATION_FILE: &str = "migration_file";

/// Capture name carrying the script path.
pub const CAPTURE_FILE: &str = "file";

/// Event name marking a background worker start.
pub const EVENT_BGWORKER_START: &str = "bgworker_start";

/// Capture name carrying the background worker name.
pub const CAPTURE_WORKER: &str = "worker";

/// Synthetic event recorded when a session observes the process starting.
pub const EVENT_PROCESS_START: &str = "process_start";

/// Name of the single catch-all phase.
pub const PHASE_TOTAL: &str = "Total";

/// Name of the implicit leading phase when phase boundaries are configured.
pub const PHASE_STARTUP: &str = "Startup";

// =============================================================================
// Session limits
// =============================================================================

/// Capacity of the bounded line queue between the reader and the classifier.
pub const LINE_QUEUE_CAPACITY: usize = 100;

/// Default deadline for a profiling session to observe readiness (seconds).
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Minimum user-configurable session timeout (seconds).
pub const MIN_TIMEOUT_SECS: u64 = 1;

/// Maximum user-configurable session timeout (seconds).
pub const MAX_TIMEOUT_SECS: u64 = 3_600;

/// How often the consumer wakes to check the cancel flag and deadline (ms).
pub const SESSION_POLL_INTERVAL_MS: u64 = 100;

/// Held leading lines in replay mode past which a warning is logged. Lines
/// stay held until the first line timestamp or end of input.
pub const REPLAY_PENDING_LIMIT: usize = 10_000;

// =============================================================================
// Logging
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Maximum length of a log line included in debug output.
pub const DEBUG_MAX_LINE_PREVIEW: usize = 200;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Operator rules override file name looked up in the config directory.
pub const RULES_FILE_NAME: &str = "rules.toml";
