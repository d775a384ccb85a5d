//! SPNEGO negotiation engine.
//!
//! Every call opens its own security context through an
//! [`AcceptorMechanism`], drives one accept step and disposes the context
//! before returning. Directory lookups for the principal's groups happen
//! after the context is gone.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use kerberos_realm_sdk::{
    AuthenticatedPrincipal, DirectoryClient, NegotiatedIdentity, NegotiationError,
    NegotiationOutcome, NegotiationToken,
};
use tracing::{debug, warn};

use super::principal::strip_realm;

const SCHEME: &str = "negotiate";
const MOCK_FINAL_SCHEME: &str = "negotiate_c";

pub const MOCK_PRINCIPAL: &str = "mock_principal";
pub const MOCK_FINAL_TOKEN: &str = "finaly negotiate token";
pub const MOCK_CONTINUE_TOKEN: &str = "mocked non _c negotiate";

/// Result of feeding one peer token into a security context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptStep {
    /// The context needs another round; send this token to the peer.
    Continue(Vec<u8>),
    /// The context is established, optionally with a final token.
    Established(Option<Vec<u8>>),
}

/// Per-attempt acceptor state.
pub trait SecurityContext: Send {
    /// Consume one token from the peer.
    ///
    /// # Errors
    ///
    /// `TokenFailure` when the token is rejected.
    fn accept(&mut self, token: &[u8]) -> Result<AcceptStep, NegotiationError>;

    /// Name of the authenticated peer, once established.
    ///
    /// # Errors
    ///
    /// `PrincipalExtractionFailure` when the mechanism cannot report it.
    fn source_name(&mut self) -> Result<Option<String>, NegotiationError>;

    /// Release mechanism resources.
    ///
    /// # Errors
    ///
    /// Any mechanism error; callers log and discard it.
    fn dispose(&mut self) -> Result<(), NegotiationError>;
}

/// Opens security contexts bound to the acceptor identity.
pub trait AcceptorMechanism: Send + Sync {
    /// # Errors
    ///
    /// `CredentialFailure` when the acceptor identity or key material is unusable.
    fn open_context(&self) -> Result<Box<dyn SecurityContext>, NegotiationError>;
}

/// Disposes the wrapped context on every exit path.
struct ContextGuard(Box<dyn SecurityContext>);

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Err(e) = self.0.dispose() {
            warn!(error = %e, "failed to dispose security context");
        }
    }
}

/// How tokens are validated.
#[derive(Clone)]
pub enum NegotiationMode {
    /// Fixed two-round protocol keyed on the `negotiate`/`negotiate_c` scheme.
    Mock,
    Acceptor(Arc<dyn AcceptorMechanism>),
}

impl std::fmt::Debug for NegotiationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mock => f.write_str("Mock"),
            Self::Acceptor(_) => f.write_str("Acceptor"),
        }
    }
}

enum Established {
    Continue(Vec<u8>),
    Done {
        name: String,
        out_token: Option<Vec<u8>>,
    },
}

/// Drives SPNEGO exchanges and resolves the principal's direct groups.
pub struct NegotiationEngine {
    mode: NegotiationMode,
    strip_realm: bool,
    directory: Arc<dyn DirectoryClient>,
}

impl NegotiationEngine {
    #[must_use]
    pub fn new(
        mode: NegotiationMode,
        strip_realm: bool,
        directory: Arc<dyn DirectoryClient>,
    ) -> Self {
        Self {
            mode,
            strip_realm,
            directory,
        }
    }

    #[must_use]
    pub fn is_mock(&self) -> bool {
        matches!(self.mode, NegotiationMode::Mock)
    }

    /// Run one negotiation round for a raw `Authorization` header value.
    ///
    /// # Errors
    ///
    /// Returns the [`NegotiationError`] that denied the request.
    #[tracing::instrument(skip_all, fields(mock = self.is_mock()))]
    pub async fn negotiate(
        &self,
        header: Option<&str>,
    ) -> Result<NegotiationOutcome, NegotiationError> {
        let Some(header) = header else {
            return Ok(NegotiationOutcome::Absent);
        };

        match &self.mode {
            NegotiationMode::Mock => mock_negotiate(header),
            NegotiationMode::Acceptor(mechanism) => {
                let token = decode_header(header)?;
                match establish(mechanism.as_ref(), &token)? {
                    Established::Continue(out) => {
                        debug!(out_len = out.len(), "negotiation needs another round");
                        Ok(NegotiationOutcome::Continue {
                            out_token: NegotiationToken::new(out),
                        })
                    }
                    Established::Done { name, out_token } => {
                        let principal = strip_realm(&name, self.strip_realm);
                        let direct_groups = self.direct_groups(principal).await;
                        debug!(%principal, groups = direct_groups.len(), "negotiation complete");
                        Ok(NegotiationOutcome::Authenticated(NegotiatedIdentity {
                            principal: AuthenticatedPrincipal::new(principal),
                            out_token: out_token.map(NegotiationToken::new),
                            direct_groups,
                        }))
                    }
                }
            }
        }
    }

    async fn direct_groups(&self, principal: &str) -> Vec<String> {
        match self.directory.user_groups(principal).await {
            Ok(groups) => groups,
            Err(e) => {
                warn!(%principal, error = %e, "could not read group memberships");
                Vec::new()
            }
        }
    }
}

fn establish(
    mechanism: &dyn AcceptorMechanism,
    token: &[u8],
) -> Result<Established, NegotiationError> {
    let mut context = ContextGuard(mechanism.open_context()?);
    match context.0.accept(token)? {
        AcceptStep::Continue(out) => Ok(Established::Continue(out)),
        AcceptStep::Established(out_token) => {
            let name = context
                .0
                .source_name()?
                .filter(|name| !name.is_empty())
                .ok_or_else(|| {
                    NegotiationError::PrincipalExtractionFailure(
                        "security context has no source name".to_owned(),
                    )
                })?;
            Ok(Established::Done { name, out_token })
        }
    }
}

/// Extract the binary token from `Negotiate <base64>`.
fn decode_header(header: &str) -> Result<Vec<u8>, NegotiationError> {
    let trimmed = header.trim();
    let payload = trimmed
        .get(..SCHEME.len() + 1)
        .filter(|prefix| prefix.eq_ignore_ascii_case("negotiate "))
        .and_then(|_| trimmed.get(SCHEME.len() + 1..))
        .ok_or_else(|| NegotiationError::MalformedHeader("expected 'Negotiate <token>'".to_owned()))?
        .trim();

    if payload.is_empty() {
        return Err(NegotiationError::MalformedHeader(
            "empty negotiation token".to_owned(),
        ));
    }
    STANDARD
        .decode(payload)
        .map_err(|e| NegotiationError::MalformedHeader(format!("token is not base64: {e}")))
}

fn mock_negotiate(header: &str) -> Result<NegotiationOutcome, NegotiationError> {
    let scheme = header.trim().to_lowercase();
    if !scheme.starts_with(SCHEME) {
        return Err(NegotiationError::MalformedHeader(
            "expected a negotiate scheme".to_owned(),
        ));
    }
    if scheme.starts_with(MOCK_FINAL_SCHEME) {
        return Ok(NegotiationOutcome::Authenticated(NegotiatedIdentity {
            principal: AuthenticatedPrincipal::new(MOCK_PRINCIPAL),
            out_token: Some(NegotiationToken::plain_text(MOCK_FINAL_TOKEN)),
            direct_groups: Vec::new(),
        }));
    }
    Ok(NegotiationOutcome::Continue {
        out_token: NegotiationToken::plain_text(MOCK_CONTINUE_TOKEN),
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use kerberos_realm_sdk::KERBEROS_OUT_TOKEN_HEADER;
    use tracing_test::traced_test;

    use super::*;
    use crate::testing::{InMemoryDirectory, ScriptedMechanism, ScriptedStep};

    fn mock_engine() -> NegotiationEngine {
        NegotiationEngine::new(
            NegotiationMode::Mock,
            true,
            Arc::new(InMemoryDirectory::new()),
        )
    }

    fn engine_with(mechanism: &Arc<ScriptedMechanism>, directory: InMemoryDirectory) -> NegotiationEngine {
        NegotiationEngine::new(
            NegotiationMode::Acceptor(mechanism.clone()),
            true,
            Arc::new(directory),
        )
    }

    fn header_for(token: &[u8]) -> String {
        format!("Negotiate {}", STANDARD.encode(token))
    }

    #[tokio::test]
    async fn missing_header_is_absent() {
        let outcome = mock_engine().negotiate(None).await.unwrap();
        assert_eq!(outcome, NegotiationOutcome::Absent);
    }

    #[tokio::test]
    async fn mock_rejects_bearer_header() {
        let err = mock_engine().negotiate(Some("Bearer abc")).await.unwrap_err();
        assert!(matches!(err, NegotiationError::MalformedHeader(_)));
    }

    #[tokio::test]
    async fn mock_first_round_continues() {
        let outcome = mock_engine()
            .negotiate(Some("Negotiate YIIFJgYG"))
            .await
            .unwrap();

        let headers = outcome.response_headers();
        assert_eq!(
            headers.get(KERBEROS_OUT_TOKEN_HEADER).unwrap(),
            MOCK_CONTINUE_TOKEN
        );
        assert!(matches!(outcome, NegotiationOutcome::Continue { .. }));
    }

    #[tokio::test]
    async fn mock_final_round_authenticates() {
        let outcome = mock_engine()
            .negotiate(Some("  Negotiate_c YIIFJgYG"))
            .await
            .unwrap();

        let NegotiationOutcome::Authenticated(identity) = outcome else {
            panic!("expected authenticated outcome, got {outcome:?}");
        };
        assert_eq!(identity.principal.as_str(), MOCK_PRINCIPAL);
        assert_eq!(
            identity.out_token.unwrap().as_bytes(),
            MOCK_FINAL_TOKEN.as_bytes()
        );
    }

    #[tokio::test]
    async fn established_context_yields_stripped_principal_and_groups() {
        let mechanism = Arc::new(ScriptedMechanism::new(ScriptedStep::Established {
            name: Some("alice@EXAMPLE.COM".to_owned()),
            out_token: Some(b"mutual".to_vec()),
        }));
        let directory =
            InMemoryDirectory::new().with_user_groups("alice", &["cn=staff,dc=example,dc=com"]);

        let outcome = engine_with(&mechanism, directory)
            .negotiate(Some(&header_for(b"ticket")))
            .await
            .unwrap();

        let NegotiationOutcome::Authenticated(identity) = outcome else {
            panic!("expected authenticated outcome, got {outcome:?}");
        };
        assert_eq!(identity.principal.as_str(), "alice");
        assert_eq!(identity.direct_groups, vec!["cn=staff,dc=example,dc=com"]);
        assert_eq!(identity.out_token.unwrap().as_bytes(), b"mutual");
        assert_eq!(mechanism.received(), vec![b"ticket".to_vec()]);
        assert_eq!(mechanism.disposed(), 1);
    }

    #[tokio::test]
    async fn incomplete_context_continues_and_is_disposed() {
        let mechanism = Arc::new(ScriptedMechanism::new(ScriptedStep::Continue(
            b"round-two".to_vec(),
        )));

        let outcome = engine_with(&mechanism, InMemoryDirectory::new())
            .negotiate(Some(&header_for(b"round-one")))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            NegotiationOutcome::Continue {
                out_token: NegotiationToken::new(b"round-two".to_vec())
            }
        );
        assert_eq!(mechanism.disposed(), 1);
    }

    #[tokio::test]
    async fn rejected_token_is_token_failure_and_disposed() {
        let mechanism = Arc::new(ScriptedMechanism::new(ScriptedStep::Reject(
            NegotiationError::TokenFailure("replayed".to_owned()),
        )));

        let err = engine_with(&mechanism, InMemoryDirectory::new())
            .negotiate(Some(&header_for(b"stale")))
            .await
            .unwrap_err();

        assert_eq!(err, NegotiationError::TokenFailure("replayed".to_owned()));
        assert_eq!(mechanism.disposed(), 1);
    }

    #[tokio::test]
    async fn missing_source_name_is_extraction_failure() {
        let mechanism = Arc::new(ScriptedMechanism::new(ScriptedStep::Established {
            name: None,
            out_token: None,
        }));

        let err = engine_with(&mechanism, InMemoryDirectory::new())
            .negotiate(Some(&header_for(b"ticket")))
            .await
            .unwrap_err();

        assert!(matches!(err, NegotiationError::PrincipalExtractionFailure(_)));
        assert_eq!(mechanism.disposed(), 1);
    }

    #[tokio::test]
    async fn credential_failure_opens_no_context() {
        let mechanism = Arc::new(ScriptedMechanism::failing_credentials());

        let err = engine_with(&mechanism, InMemoryDirectory::new())
            .negotiate(Some(&header_for(b"ticket")))
            .await
            .unwrap_err();

        assert!(matches!(err, NegotiationError::CredentialFailure(_)));
        assert_eq!(mechanism.disposed(), 0);
    }

    #[tokio::test]
    async fn real_mode_requires_space_separated_scheme() {
        let mechanism = Arc::new(ScriptedMechanism::new(ScriptedStep::Continue(Vec::new())));
        let engine = engine_with(&mechanism, InMemoryDirectory::new());

        for header in ["Negotiate_c abc", "Bearer abc", "Negotiate", "Negotiate ***"] {
            let err = engine.negotiate(Some(header)).await.unwrap_err();
            assert!(
                matches!(err, NegotiationError::MalformedHeader(_)),
                "{header}: {err:?}"
            );
        }
        assert!(mechanism.received().is_empty());
    }

    #[tokio::test]
    async fn scheme_is_case_insensitive() {
        let mechanism = Arc::new(ScriptedMechanism::new(ScriptedStep::Continue(b"x".to_vec())));

        let outcome = engine_with(&mechanism, InMemoryDirectory::new())
            .negotiate(Some(&format!("  nEgOtIaTe {}  ", STANDARD.encode(b"t"))))
            .await
            .unwrap();

        assert!(matches!(outcome, NegotiationOutcome::Continue { .. }));
    }

    #[tokio::test]
    #[traced_test]
    async fn dispose_failure_is_logged_not_returned() {
        let mechanism = Arc::new(
            ScriptedMechanism::new(ScriptedStep::Established {
                name: Some("bob".to_owned()),
                out_token: None,
            })
            .with_failing_dispose(),
        );

        let outcome = engine_with(&mechanism, InMemoryDirectory::new())
            .negotiate(Some(&header_for(b"ticket")))
            .await
            .unwrap();

        assert!(matches!(outcome, NegotiationOutcome::Authenticated(_)));
        assert!(logs_contain("failed to dispose security context"));
    }

    #[tokio::test]
    #[traced_test]
    async fn directory_failure_yields_no_groups() {
        let mechanism = Arc::new(ScriptedMechanism::new(ScriptedStep::Established {
            name: Some("carol@EXAMPLE.COM".to_owned()),
            out_token: None,
        }));
        let directory = InMemoryDirectory::new().failing_on("carol");

        let outcome = engine_with(&mechanism, directory)
            .negotiate(Some(&header_for(b"ticket")))
            .await
            .unwrap();

        let NegotiationOutcome::Authenticated(identity) = outcome else {
            panic!("expected authenticated outcome, got {outcome:?}");
        };
        assert!(identity.direct_groups.is_empty());
        assert!(logs_contain("could not read group memberships"));
    }
}
