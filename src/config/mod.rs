//! Session Configuration
//!
//! Immutable configuration for a session's lifetime (spec.md §3). Holds
//! every knob the Broker Session, Heartbeat Controller, and Transfer Loop
//! read, plus the construction-time validation that turns a malformed
//! queue/exchange name or missing host into a fatal `ConnectorError` before
//! any connection is attempted.

mod tls;

pub use tls::TlsOptions;

use crate::error::{ConnectorError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which side of the master/worker pair this session plays.
///
/// The master dispatches tasks and receives responses; workers do the
/// inverse. Master and worker share identical session logic - only the
/// publish target, consume source, and declared/bound queue differ
/// (spec.md §9, "Symmetric queues, asymmetric roles").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Master,
    Worker,
}

/// One-in-flight polling vs. broker-pushed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// `basic_get` polling, at most one task in flight at a time.
    Synchronous,
    /// Broker-pushed deliveries via a registered consumer callback.
    Asynchronous,
}

/// Immutable configuration for a session's lifetime.
///
/// Build with [`SessionConfig::builder`]; construction validates the
/// `.q`/`.e` naming convention and the presence of a host, matching
/// `original_source`'s `assert consumer_queue.endswith(".q")` checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    pub virtual_host: String,
    pub tls: Option<TlsOptions>,

    pub role: Role,
    pub mode: Mode,

    pub task_queue: String,
    pub response_queue: String,
    pub task_exchange: String,
    pub response_exchange: String,
    pub exchange_type: String,

    pub durable: bool,
    pub flush_queues: bool,
    pub prefetch: u16,
    pub session_fetch_limit: Option<u64>,
    pub poll_rate: Duration,

    pub heartbeat: u16,
    pub keepalive_interval: Duration,
    pub keepalive_timeout: Duration,
    pub socket_timeout: Duration,
    pub ack_rx: bool,
}

impl SessionConfig {
    pub fn builder(host: impl Into<String>) -> SessionConfigBuilder {
        SessionConfigBuilder::new(host)
    }

    /// The queue this session consumes from: the response queue for a
    /// master, the task queue for a worker.
    pub fn consume_queue(&self) -> &str {
        match self.role {
            Role::Master => &self.response_queue,
            Role::Worker => &self.task_queue,
        }
    }

    /// The queue this session publishes to: the task queue for a master,
    /// the response queue for a worker.
    pub fn publish_queue(&self) -> &str {
        match self.role {
            Role::Master => &self.task_queue,
            Role::Worker => &self.response_queue,
        }
    }

    /// The exchange this session publishes to.
    pub fn publish_exchange(&self) -> &str {
        match self.role {
            Role::Master => &self.task_exchange,
            Role::Worker => &self.response_exchange,
        }
    }

    /// `host:port`, with the port patched in from the TLS flag when the
    /// caller didn't specify one (spec.md §3, §8 boundary behavior).
    pub fn host_with_port(&self) -> String {
        if self.host.contains(':') {
            self.host.clone()
        } else if self.tls.is_some() {
            format!("{}:5671", self.host)
        } else {
            format!("{}:5672", self.host)
        }
    }

    /// Routing key derived from a queue name: the substring preceding the
    /// first `.` (spec.md §6).
    pub fn routing_key_for(queue: &str) -> &str {
        queue.split('.').next().unwrap_or(queue)
    }

    /// A unique name for the private keepalive exchange, suffixed with a
    /// process-unique id so concurrent sessions never collide.
    pub fn keepalive_exchange_name(&self) -> String {
        format!("nak-{}.e", uuid::Uuid::new_v4())
    }

    /// Deserialize a `SessionConfig` from a JSON string.
    ///
    /// Loading configuration end-to-end from a settings file is an
    /// external-collaborator concern (spec.md §1); this is the thin,
    /// serde-backed convenience the ambient config layer still owes callers.
    pub fn from_json_str(s: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Reads and deserializes a `SessionConfig` from a JSON settings file.
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConnectorError::BadConfig(format!("failed to read config file: {e}")))?;
        Self::from_json_str(&contents)
            .map_err(|e| ConnectorError::BadConfig(format!("failed to parse config file: {e}")))
    }
}

/// Builder for [`SessionConfig`], applying the caller-facing defaults from
/// spec.md §6 and performing construction-time validation.
pub struct SessionConfigBuilder {
    host: String,
    user: String,
    password: String,
    virtual_host: String,
    tls: Option<TlsOptions>,
    role: Role,
    mode: Mode,
    task_queue: String,
    response_queue: String,
    task_exchange: String,
    response_exchange: String,
    exchange_type: String,
    durable: bool,
    flush_queues: bool,
    prefetch: u16,
    session_fetch_limit: Option<u64>,
    poll_rate: Duration,
    heartbeat: u16,
    keepalive_interval: Duration,
    keepalive_timeout: Duration,
    socket_timeout: Duration,
    ack_rx: bool,
}

impl SessionConfigBuilder {
    fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: "guest".to_string(),
            password: "guest".to_string(),
            virtual_host: "/".to_string(),
            tls: None,
            role: Role::Worker,
            mode: Mode::Synchronous,
            task_queue: "task.q".to_string(),
            response_queue: "response.q".to_string(),
            task_exchange: "tasks.e".to_string(),
            response_exchange: "resps.e".to_string(),
            exchange_type: "direct".to_string(),
            durable: false,
            flush_queues: false,
            prefetch: 1,
            session_fetch_limit: None,
            poll_rate: Duration::from_secs_f64(0.25),
            heartbeat: 120,
            keepalive_interval: Duration::from_secs(10),
            keepalive_timeout: Duration::from_secs(120),
            socket_timeout: Duration::from_secs(10),
            ack_rx: true,
        }
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn virtual_host(mut self, vhost: impl Into<String>) -> Self {
        self.virtual_host = vhost.into();
        self
    }

    pub fn tls(mut self, tls: TlsOptions) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn master(mut self) -> Self {
        self.role = Role::Master;
        self
    }

    pub fn worker(mut self) -> Self {
        self.role = Role::Worker;
        self
    }

    pub fn asynchronous(mut self) -> Self {
        self.mode = Mode::Asynchronous;
        self
    }

    pub fn synchronous(mut self) -> Self {
        self.mode = Mode::Synchronous;
        self
    }

    pub fn task_queue(mut self, name: impl Into<String>) -> Self {
        self.task_queue = name.into();
        self
    }

    pub fn response_queue(mut self, name: impl Into<String>) -> Self {
        self.response_queue = name.into();
        self
    }

    pub fn task_exchange(mut self, name: impl Into<String>) -> Self {
        self.task_exchange = name.into();
        self
    }

    pub fn response_exchange(mut self, name: impl Into<String>) -> Self {
        self.response_exchange = name.into();
        self
    }

    pub fn exchange_type(mut self, kind: impl Into<String>) -> Self {
        self.exchange_type = kind.into();
        self
    }

    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    pub fn flush_queues(mut self, flush: bool) -> Self {
        self.flush_queues = flush;
        self
    }

    pub fn prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// `0` is treated as unbounded, matching spec.md §8's boundary
    /// behavior ("only non-zero values constrain").
    pub fn session_fetch_limit(mut self, limit: u64) -> Self {
        self.session_fetch_limit = if limit == 0 { None } else { Some(limit) };
        self
    }

    pub fn poll_rate(mut self, poll_rate: Duration) -> Self {
        self.poll_rate = poll_rate;
        self
    }

    pub fn heartbeat(mut self, heartbeat: u16) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    pub fn keepalive_timeout(mut self, timeout: Duration) -> Self {
        self.keepalive_timeout = timeout;
        self
    }

    pub fn socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = timeout;
        self
    }

    pub fn ack_rx(mut self, ack_rx: bool) -> Self {
        self.ack_rx = ack_rx;
        self
    }

    /// Validate and produce the immutable `SessionConfig`.
    ///
    /// # Errors
    /// `MissingHost` if the host is empty; `BadName` if a queue/exchange
    /// name violates the `.q`/`.e` suffix convention (spec.md §3 invariant 2).
    pub fn build(self) -> Result<SessionConfig> {
        if self.host.trim().is_empty() {
            return Err(ConnectorError::MissingHost);
        }

        check_suffix(&self.task_queue, ".q")?;
        check_suffix(&self.response_queue, ".q")?;
        check_suffix(&self.task_exchange, ".e")?;
        check_suffix(&self.response_exchange, ".e")?;

        if self.prefetch == 0 {
            return Err(ConnectorError::BadConfig(
                "prefetch must be at least 1".to_string(),
            ));
        }

        Ok(SessionConfig {
            host: self.host,
            user: self.user,
            password: self.password,
            virtual_host: self.virtual_host,
            tls: self.tls,
            role: self.role,
            mode: self.mode,
            task_queue: self.task_queue,
            response_queue: self.response_queue,
            task_exchange: self.task_exchange,
            response_exchange: self.response_exchange,
            exchange_type: self.exchange_type,
            durable: self.durable,
            flush_queues: self.flush_queues,
            prefetch: self.prefetch,
            session_fetch_limit: self.session_fetch_limit,
            poll_rate: self.poll_rate,
            heartbeat: self.heartbeat,
            keepalive_interval: self.keepalive_interval,
            keepalive_timeout: self.keepalive_timeout,
            socket_timeout: self.socket_timeout,
            ack_rx: self.ack_rx,
        })
    }
}

fn check_suffix(name: &str, suffix: &'static str) -> Result<()> {
    if name.ends_with(suffix) {
        Ok(())
    } else {
        Err(ConnectorError::BadName {
            name: name.to_string(),
            reason: if suffix == ".q" {
                "queue names must end with '.q'"
            } else {
                "exchange names must end with '.e'"
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let cfg = SessionConfig::builder("broker.example.com").build().unwrap();
        assert_eq!(cfg.user, "guest");
        assert_eq!(cfg.password, "guest");
        assert_eq!(cfg.virtual_host, "/");
        assert_eq!(cfg.task_queue, "task.q");
        assert_eq!(cfg.response_queue, "response.q");
        assert_eq!(cfg.task_exchange, "tasks.e");
        assert_eq!(cfg.response_exchange, "resps.e");
        assert_eq!(cfg.exchange_type, "direct");
        assert_eq!(cfg.role, Role::Worker);
        assert_eq!(cfg.mode, Mode::Synchronous);
        assert!(!cfg.flush_queues);
        assert_eq!(cfg.heartbeat, 120);
        assert_eq!(cfg.poll_rate, Duration::from_secs_f64(0.25));
        assert_eq!(cfg.prefetch, 1);
        assert!(cfg.session_fetch_limit.is_none());
        assert!(cfg.ack_rx);
    }

    #[test]
    fn missing_host_is_rejected() {
        let err = SessionConfig::builder("").build().unwrap_err();
        assert!(matches!(err, ConnectorError::MissingHost));
    }

    #[test]
    fn bad_queue_name_is_rejected() {
        let err = SessionConfig::builder("h")
            .task_queue("task")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConnectorError::BadName { .. }));
    }

    #[test]
    fn bad_exchange_name_is_rejected() {
        let err = SessionConfig::builder("h")
            .task_exchange("tasks")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConnectorError::BadName { .. }));
    }

    #[test]
    fn zero_fetch_limit_is_unbounded() {
        let cfg = SessionConfig::builder("h").session_fetch_limit(0).build().unwrap();
        assert!(cfg.session_fetch_limit.is_none());
    }

    #[test]
    fn nonzero_fetch_limit_is_kept() {
        let cfg = SessionConfig::builder("h").session_fetch_limit(3).build().unwrap();
        assert_eq!(cfg.session_fetch_limit, Some(3));
    }

    #[test]
    fn host_without_port_gets_cleartext_port_appended() {
        let cfg = SessionConfig::builder("h").build().unwrap();
        assert_eq!(cfg.host_with_port(), "h:5672");
    }

    #[test]
    fn host_without_port_gets_tls_port_appended() {
        let cfg = SessionConfig::builder("h")
            .tls(TlsOptions::default())
            .build()
            .unwrap();
        assert_eq!(cfg.host_with_port(), "h:5671");
    }

    #[test]
    fn host_with_port_is_left_alone() {
        let cfg = SessionConfig::builder("h:1234").build().unwrap();
        assert_eq!(cfg.host_with_port(), "h:1234");
    }

    #[test]
    fn master_swaps_consume_and_publish_queues() {
        let cfg = SessionConfig::builder("h").master().build().unwrap();
        assert_eq!(cfg.consume_queue(), "response.q");
        assert_eq!(cfg.publish_queue(), "task.q");

        let cfg = SessionConfig::builder("h").worker().build().unwrap();
        assert_eq!(cfg.consume_queue(), "task.q");
        assert_eq!(cfg.publish_queue(), "response.q");
    }

    #[test]
    fn routing_key_is_prefix_before_first_dot() {
        assert_eq!(SessionConfig::routing_key_for("task.q"), "task");
        assert_eq!(SessionConfig::routing_key_for("response.q"), "response");
        assert_eq!(SessionConfig::routing_key_for("a.b.c.q"), "a");
    }

    #[test]
    fn zero_prefetch_is_bad_config() {
        let err = SessionConfig::builder("h").prefetch(0).build().unwrap_err();
        assert!(matches!(err, ConnectorError::BadConfig(_)));
    }

    #[test]
    fn round_trips_through_json() {
        let cfg = SessionConfig::builder("h").master().durable(true).build().unwrap();
        let json = serde_json::to_string(&cfg).unwrap();
        let back = SessionConfig::from_json_str(&json).unwrap();
        assert_eq!(back.host, cfg.host);
        assert_eq!(back.role, cfg.role);
        assert_eq!(back.durable, cfg.durable);
    }

    #[test]
    fn loads_from_json_file() {
        let cfg = SessionConfig::builder("h").worker().build().unwrap();
        let json = serde_json::to_string(&cfg).unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, json.as_bytes()).unwrap();

        let back = SessionConfig::from_json_file(file.path()).unwrap();
        assert_eq!(back.host, cfg.host);
        assert_eq!(back.task_queue, cfg.task_queue);
    }

    #[test]
    fn missing_json_file_is_bad_config() {
        let err = SessionConfig::from_json_file("/nonexistent/path/settings.json").unwrap_err();
        assert!(matches!(err, ConnectorError::BadConfig(_)));
    }
}
