//! Error types for the acmegate DNS challenge server.

use thiserror::Error;

/// Errors that can occur in acmegate-srv operations.
#[derive(Error, Debug)]
pub enum AcmeSrvError {
    /// Configuration is invalid or missing required fields.
    #[error("config error: {0}")]
    Config(String),

    /// No records have ever been staged for the requested zone.
    #[error("no records were found for zone {0}")]
    RecordsNotFound(String),

    /// A DNS name could not be constructed or parsed.
    #[error("zone error: {0}")]
    Zone(String),

    /// DNS server failed to bind or serve.
    #[error("dns server error: {0}")]
    Server(String),

    /// Leader-election campaign failed.
    #[error("election error: {0}")]
    Election(String),

    /// Certificate issuance, renewal, or revocation failed.
    #[error("issuance failed for zone {zone}: {message}")]
    Issuance {
        /// Zone the certificate operation was scoped to.
        zone: String,
        /// Error reported by the certificate manager.
        message: String,
    },

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
