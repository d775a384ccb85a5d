//! Realm service: negotiation, authentication and role lookups.

use std::sync::Arc;

use kerberos_realm_sdk::{
    AuthenticatedUser, AuthenticationToken, DirectoryClient, NegotiationError, NegotiationOutcome,
};
use tracing::debug;

use super::authorization::AuthorizationResolver;
use super::error::DomainError;
use super::negotiation::NegotiationEngine;
use super::principal::strip_realm;
use super::role_mapping::{RoleMapping, RoleMappingCache};

/// Ties the negotiation engine to the role mapping cache.
pub struct Service {
    engine: NegotiationEngine,
    cache: Arc<RoleMappingCache>,
    authorization: AuthorizationResolver,
    directory: Arc<dyn DirectoryClient>,
    strip_realm: bool,
}

impl Service {
    #[must_use]
    pub fn new(
        engine: NegotiationEngine,
        cache: Arc<RoleMappingCache>,
        directory: Arc<dyn DirectoryClient>,
        strip_realm: bool,
    ) -> Self {
        Self {
            engine,
            authorization: AuthorizationResolver::new(Arc::clone(&cache)),
            cache,
            directory,
            strip_realm,
        }
    }

    /// # Errors
    ///
    /// The [`NegotiationError`] that denied the request.
    pub async fn negotiate(
        &self,
        header: Option<&str>,
    ) -> Result<NegotiationOutcome, DomainError> {
        Ok(self.engine.negotiate(header).await?)
    }

    /// Principal and roles for an authenticated token.
    ///
    /// # Errors
    ///
    /// `PrincipalExtractionFailure` when a negotiated identity has an empty principal.
    pub fn authenticate(
        &self,
        token: &AuthenticationToken,
    ) -> Result<AuthenticatedUser, DomainError> {
        let identity = match token {
            AuthenticationToken::Liveness => return Ok(AuthenticatedUser::system()),
            AuthenticationToken::Negotiated(identity) => identity,
        };
        if identity.principal.as_str().is_empty() {
            return Err(NegotiationError::PrincipalExtractionFailure(
                "authentication token carries no principal".to_owned(),
            )
            .into());
        }

        let roles = self
            .authorization
            .resolve(&identity.principal, &identity.direct_groups);
        debug!(principal = %identity.principal, roles = roles.len(), "principal authenticated");
        Ok(AuthenticatedUser {
            principal: identity.principal.clone(),
            roles,
        })
    }

    /// Whether `principal` belongs to `group_dn` through any chain of nested groups.
    ///
    /// # Errors
    ///
    /// `Directory` when the directory cannot answer.
    pub async fn is_member_of(
        &self,
        principal: &str,
        group_dn: &str,
    ) -> Result<bool, DomainError> {
        let account = strip_realm(principal, self.strip_realm);
        Ok(self.directory.is_member_transitive(group_dn, account).await?)
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<RoleMapping> {
        self.cache.current_snapshot()
    }

    /// # Errors
    ///
    /// `MappingLoad` when the mapping file cannot be read or parsed.
    pub async fn rebuild(&self) -> Result<Arc<RoleMapping>, DomainError> {
        self.cache.rebuild().await
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<RoleMappingCache> {
        &self.cache
    }
}
