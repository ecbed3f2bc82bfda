//! AMQP Connector Library
//!
//! A client-side connector bridging an in-process producer/consumer API to
//! a remote AMQP 0-9-1 broker, for master/worker task-distribution systems.
//! See [`ConnectorHandle`] for the caller-facing surface; everything else
//! in this crate is the supervised session machinery underneath it.

pub mod config;
pub mod counters;
pub mod error;
pub mod handle;
pub mod queues;
pub mod runstate;
pub mod session;
pub mod supervisor;
pub mod transport;

pub use config::{Mode, Role, SessionConfig, SessionConfigBuilder, TlsOptions};
pub use error::ConnectorError;
pub use handle::ConnectorHandle;
