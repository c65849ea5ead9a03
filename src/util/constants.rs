// MedScan - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "MedScan";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "MedScan";

/// Current application version (updated by release script).
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Cooldown (admission control)
// =============================================================================

/// Seconds during which scan-initiating actions are rejected after a session
/// reaches a terminal state.
pub const DEFAULT_COOLDOWN_WINDOW_SECS: u64 = 60;

/// Minimum user-configurable cooldown window (seconds).
pub const MIN_COOLDOWN_WINDOW_SECS: u64 = 1;

/// Maximum user-configurable cooldown window (seconds).
pub const MAX_COOLDOWN_WINDOW_SECS: u64 = 3_600;

/// Cadence of the live cooldown counter (ms).
pub const COOLDOWN_TICK_INTERVAL_MS: u64 = 1_000;

/// Durable-store key holding the cooldown deadline (epoch milliseconds).
pub const COOLDOWN_DEADLINE_KEY: &str = "scan_cooldown_deadline";

// =============================================================================
// Image preprocessing
// =============================================================================

/// Larger output dimension after resizing (pixels).
pub const DEFAULT_MAX_IMAGE_DIMENSION: u32 = 1_024;

/// Smallest accepted `max_dimension` setting.
pub const MIN_MAX_IMAGE_DIMENSION: u32 = 64;

/// Largest accepted `max_dimension` setting.
pub const ABSOLUTE_MAX_IMAGE_DIMENSION: u32 = 8_192;

/// JPEG re-encode quality (1-100). Roughly 0.9 on a unit scale.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Largest raw input file accepted before decoding is attempted.
pub const DEFAULT_MAX_INPUT_BYTES: u64 = 25 * 1024 * 1024; // 25 MiB

/// Hard upper bound on `max_input_bytes`.
pub const ABSOLUTE_MAX_INPUT_BYTES: u64 = 200 * 1024 * 1024; // 200 MiB

/// MIME type of every preprocessed payload.
pub const PAYLOAD_MIME_TYPE: &str = "image/jpeg";

// =============================================================================
// Analysis pipeline
// =============================================================================

/// Default progress stages as `(title, minimum dwell ms)`.
///
/// The last stage is only entered once the remote call has resolved.
pub const DEFAULT_ANALYSIS_STAGES: &[(&str, u64)] = &[
    ("Uploading image", 800),
    ("Reading imprint and markings", 1_500),
    ("Comparing against reference data", 1_500),
    ("Checking published sources", 1_200),
    ("Preparing verdict", 700),
];

/// Upper bound on a single stage's configured dwell time (ms).
pub const MAX_STAGE_DWELL_MS: u64 = 60_000;

/// Maximum number of configured stages.
pub const MAX_ANALYSIS_STAGES: usize = 16;

// =============================================================================
// Result reconciliation
// =============================================================================

/// Imprint text used when the remote response carries none.
pub const FALLBACK_IMPRINT: &str = "Not detected";

/// Comparison status used when a per-feature comparison is missing.
pub const FALLBACK_COMPARISON_STATUS: &str = "omission";

/// Comparison reason used when a per-feature comparison is missing.
pub const FALLBACK_COMPARISON_REASON: &str = "AI response missing data.";

/// Upper bound of the forensic score scale.
pub const MAX_SCORE: u32 = 100;

// =============================================================================
// Session history
// =============================================================================

/// Maximum number of terminal sessions retained in memory.
pub const MAX_HISTORY: usize = 200;

// =============================================================================
// Remote service
// =============================================================================

/// Environment variable holding the bearer token for the analysis service.
pub const DEFAULT_API_KEY_ENV: &str = "MEDSCAN_API_KEY";

/// Longest configurable request timeout (seconds).
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 600;

/// Maximum characters of an error response body kept for diagnostics.
pub const MAX_ERROR_BODY_PREVIEW: usize = 300;

// =============================================================================
// Logging
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Durable key-value store file name (stored in the platform data directory).
pub const STORE_FILE_NAME: &str = "state.json";
