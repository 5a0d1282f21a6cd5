//! TLS client configuration for secure channels.

use tonic::transport::ClientTlsConfig;

/// TLS config backed by the system root certificate store.
pub(crate) fn client_tls() -> ClientTlsConfig {
    ClientTlsConfig::new().with_native_roots()
}
