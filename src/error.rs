//! Error Types and Handling
//!
//! Defines the error types used throughout the connector. Construction-time
//! faults, transport faults, and caller-facing faults are kept as distinct
//! variants so the Supervisor and `ConnectorHandle` can each pattern-match
//! on what they actually need to react to.

use thiserror::Error;

/// Errors surfaced by the connector.
///
/// Configuration faults (`MissingHost`, `BadName`, `BadConfig`) are fatal to
/// handle construction. `Transport` and `HeartbeatTimeout` are faults: the
/// Supervisor catches them, tears the session down, and rebuilds while the
/// handle is still running. `FetchLimitExceeded` is surfaced synchronously
/// to the caller from `get()`; the session continues.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// No broker host was provided at construction time.
    #[error("a broker host must be specified")]
    MissingHost,

    /// A queue or exchange name violated the `.q` / `.e` suffix convention.
    #[error("invalid name '{name}': {reason}")]
    BadName { name: String, reason: &'static str },

    /// Some other construction-time configuration fault.
    #[error("invalid configuration: {0}")]
    BadConfig(String),

    /// A fault from the AMQP transport (connect failure, socket error,
    /// broker-side protocol error). Caught by the Supervisor; never
    /// propagated past the Transfer Loop to a caller.
    #[error("AMQP transport error: {0}")]
    Transport(#[from] lapin::Error),

    /// The application-level keepalive round-trip went silent longer than
    /// `keepalive_timeout`. Modeled as a distinct fault class, handled
    /// identically to a transport fault by the Supervisor.
    #[error("heartbeat timeout: no keepalive received within the configured window")]
    HeartbeatTimeout,

    /// `get()` was called after the session's `session_fetch_limit` had
    /// already been reached. Surfaced synchronously to the caller; the
    /// session keeps running (it has simply stopped fetching from the
    /// broker).
    #[error("fetch limit exceeded: this session has already fetched its configured maximum")]
    FetchLimitExceeded,
}

impl ConnectorError {
    /// True for faults the Supervisor should restart the session over.
    ///
    /// Mirrors the teacher's `McpError::is_retryable` distinction between
    /// errors that warrant a reconnect and errors that are simply reported.
    pub fn is_fault(&self) -> bool {
        matches!(self, ConnectorError::Transport(_) | ConnectorError::HeartbeatTimeout)
    }
}

pub type Result<T> = std::result::Result<T, ConnectorError>;
