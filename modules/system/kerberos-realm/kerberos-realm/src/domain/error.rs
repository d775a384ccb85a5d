//! Domain errors for the Kerberos realm.

use std::fmt::Display;
use std::path::Path;

use kerberos_realm_sdk::{DirectoryError, KerberosRealmError, NegotiationError};

/// Internal domain errors.
#[derive(thiserror::Error, Debug)]
pub enum DomainError {
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("role mapping load failed for {path}: {reason}")]
    MappingLoad { path: String, reason: String },

    #[error("watch registration failed for {path}: {reason}")]
    WatchRegistration { path: String, reason: String },
}

impl DomainError {
    #[must_use]
    pub fn mapping_load(path: &Path, reason: &dyn Display) -> Self {
        Self::MappingLoad {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<DomainError> for KerberosRealmError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::Negotiation(inner) => Self::Negotiation(inner),
            DomainError::Directory(inner) => Self::Internal(inner.to_string()),
            e @ (DomainError::MappingLoad { .. } | DomainError::WatchRegistration { .. }) => {
                Self::Internal(e.to_string())
            }
        }
    }
}
