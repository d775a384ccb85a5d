//! Local (in-process) client for the Kerberos realm.

use std::sync::Arc;

use async_trait::async_trait;
use kerberos_realm_sdk::{
    AuthenticatedUser, AuthenticationToken, KerberosRealmClient, KerberosRealmError,
    NegotiationOutcome,
};

use super::{DomainError, Service};

/// Local client wrapping the service.
///
/// Handed to the host by [`crate::module::KerberosRealm::client`].
pub struct KerberosRealmLocalClient {
    svc: Arc<Service>,
}

impl KerberosRealmLocalClient {
    #[must_use]
    pub fn new(svc: Arc<Service>) -> Self {
        Self { svc }
    }
}

fn log_and_convert(op: &str, e: DomainError) -> KerberosRealmError {
    match &e {
        DomainError::Negotiation(reason) => {
            tracing::info!(operation = op, error = %reason, "kerberos_realm denied request");
        }
        _ => tracing::error!(operation = op, error = ?e, "kerberos_realm call failed"),
    }
    e.into()
}

#[async_trait]
impl KerberosRealmClient for KerberosRealmLocalClient {
    async fn negotiate(
        &self,
        authorization_header: Option<&str>,
    ) -> Result<NegotiationOutcome, KerberosRealmError> {
        self.svc
            .negotiate(authorization_header)
            .await
            .map_err(|e| log_and_convert("negotiate", e))
    }

    async fn authenticate(
        &self,
        token: &AuthenticationToken,
    ) -> Result<AuthenticatedUser, KerberosRealmError> {
        self.svc
            .authenticate(token)
            .map_err(|e| log_and_convert("authenticate", e))
    }
}
