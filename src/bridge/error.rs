//! Broker link error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors opening or driving a broker link.
///
/// All of them are recoverable: they feed the reconnect cycle.
#[derive(Error, Debug)]
pub enum LinkError {
    /// TLS trust bundle, certificate or key could not be read
    #[error("Failed to read TLS material {path:?}: {source}")]
    Credentials {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The MQTT client rejected a request
    #[error("MQTT client error: {0}")]
    Client(String),

    /// The link has already been torn down
    #[error("Link closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LinkError::Credentials {
            path: PathBuf::from("/certs/ca.crt"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert_eq!(
            err.to_string(),
            "Failed to read TLS material \"/certs/ca.crt\": missing"
        );
        assert_eq!(LinkError::Closed.to_string(), "Link closed");
    }
}
