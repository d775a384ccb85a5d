//! Public API trait for the Kerberos realm.
//!
//! The host authentication framework drives a request through two steps:
//! [`KerberosRealmClient::negotiate`] turns the raw credential header into a
//! negotiation outcome, and [`KerberosRealmClient::authenticate`] turns an
//! established identity into an [`AuthenticatedUser`] with application roles.

use async_trait::async_trait;

use crate::error::KerberosRealmError;
use crate::models::{AuthenticatedUser, AuthenticationToken, NegotiationOutcome};

/// Public API trait for the Kerberos realm.
///
/// ```ignore
/// let outcome = realm.negotiate(request_header).await?;
/// if let NegotiationOutcome::Authenticated(identity) = outcome {
///     let user = realm.authenticate(&AuthenticationToken::Negotiated(identity)).await?;
/// }
/// ```
#[async_trait]
pub trait KerberosRealmClient: Send + Sync {
    /// Run one SPNEGO round for the given `Authorization` header value.
    ///
    /// `None` yields [`NegotiationOutcome::Absent`].
    ///
    /// # Errors
    ///
    /// - `Negotiation(MalformedHeader)` if the header is not a negotiation header
    /// - `Negotiation(CredentialFailure)` if the acceptor identity is unusable
    /// - `Negotiation(TokenFailure)` if the peer token is rejected
    /// - `Negotiation(PrincipalExtractionFailure)` if no principal name is available
    async fn negotiate(
        &self,
        authorization_header: Option<&str>,
    ) -> Result<NegotiationOutcome, KerberosRealmError>;

    /// Resolve the roles for an authenticated token.
    ///
    /// A principal without any mapped role is returned with an empty role
    /// set; the host decides whether that means denial.
    ///
    /// # Errors
    ///
    /// - `Negotiation(PrincipalExtractionFailure)` if the token carries an empty principal
    async fn authenticate(
        &self,
        token: &AuthenticationToken,
    ) -> Result<AuthenticatedUser, KerberosRealmError>;
}
