//! Fixed protocol constants that should NOT be changed.
//!
//! These values are part of the wire contract with clients and the audio
//! engine. Tunable values live in [`crate::state::Config`] instead.

// ─────────────────────────────────────────────────────────────────────────────
// Procedure Surface
// ─────────────────────────────────────────────────────────────────────────────

/// Default page size for `queue` and `history` reads.
pub const DEFAULT_ENTRIES_PER_PAGE: usize = 50;

/// Upper bound on a single page request.
///
/// Larger requests are rejected as invalid.
pub const MAX_ENTRIES_PER_PAGE: usize = 500;

// ─────────────────────────────────────────────────────────────────────────────
// Audio Engine
// ─────────────────────────────────────────────────────────────────────────────

/// Retry delays for transient engine failures (exponential backoff).
pub const ENGINE_RETRY_DELAYS_MS: [u64; 3] = [200, 500, 1000];

/// Maximum size of an inbound engine notification body (bytes).
pub const MAX_ENGINE_EVENT_BODY_SIZE: usize = 64 * 1024;

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket
// ─────────────────────────────────────────────────────────────────────────────

/// Interval between WebSocket heartbeat checks (seconds).
pub const WS_HEARTBEAT_CHECK_INTERVAL_SECS: u64 = 5;

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Application name used in logs and the health endpoint.
pub const APP_NAME: &str = "Ari";

/// Service identifier reported by `/health`.
///
/// Clients query `/health` and expect this exact string to identify
/// an Ari orchestrator.
pub const SERVICE_ID: &str = "ari";
