//! Error types for the Kerberos realm module.

use thiserror::Error;

/// Per-request negotiation failures.
///
/// None of these are fatal to the host; each one maps to an authentication
/// denial for the request that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    /// The credential header does not carry the negotiation scheme or its
    /// payload is not valid base64.
    #[error("malformed negotiation header: {0}")]
    MalformedHeader(String),

    /// The acceptor identity or its key material could not be used.
    #[error("acceptor credential failure: {0}")]
    CredentialFailure(String),

    /// The peer token was rejected (malformed, expired, replayed).
    #[error("negotiation token rejected: {0}")]
    TokenFailure(String),

    /// The context was established but its source name is unavailable.
    #[error("could not extract principal: {0}")]
    PrincipalExtractionFailure(String),
}

/// A directory query failed.
///
/// Callers inside the realm treat this as an empty result for the entry that
/// was being resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// Connecting or binding to the directory failed.
    #[error("directory connection failed: {0}")]
    Connection(String),

    /// The search itself failed or returned a non-success result code.
    #[error("directory query failed: {0}")]
    Query(String),
}

/// Errors returned by [`crate::KerberosRealmClient`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KerberosRealmError {
    /// Authentication was denied.
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}
