//! TLS option bundle.
//!
//! Passed through opaquely to the transport layer (spec.md §1: TLS socket
//! option bundling is an external collaborator). The connector never
//! inspects these fields beyond using their presence to pick the TLS
//! default port (5671) in [`super::SessionConfig::host_with_port`].

use serde::{Deserialize, Serialize};

/// Opaque TLS configuration, forwarded verbatim to the AMQP transport.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsOptions {
    /// Path to a CA certificate bundle used to verify the broker's
    /// certificate, if not the system trust store.
    pub ca_cert_path: Option<String>,
    /// Path to a client certificate, for mutual TLS.
    pub client_cert_path: Option<String>,
    /// Path to the client certificate's private key.
    pub client_key_path: Option<String>,
    /// Skip hostname verification. Only ever useful against test brokers.
    pub danger_accept_invalid_certs: bool,
}
