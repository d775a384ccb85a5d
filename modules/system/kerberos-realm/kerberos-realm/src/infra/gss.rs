//! Kerberos acceptor backed by the platform GSSAPI through `cross-krb5`.
//!
//! GSSAPI finds key material through `KRB5_KTNAME`; the realm refuses to
//! start when it does not name the configured keytab.

use cross_krb5::{AcceptFlags, K5ServerCtx, PendingServerCtx, ServerCtx, Step};
use kerberos_realm_sdk::NegotiationError;
use tracing::debug;

use crate::domain::{AcceptStep, AcceptorMechanism, SecurityContext};

/// Accepts SPNEGO tokens for one service principal.
pub struct KerberosAcceptor {
    spn: String,
}

impl KerberosAcceptor {
    #[must_use]
    pub fn new(spn: impl Into<String>) -> Self {
        Self { spn: spn.into() }
    }
}

impl AcceptorMechanism for KerberosAcceptor {
    fn open_context(&self) -> Result<Box<dyn SecurityContext>, NegotiationError> {
        let pending = ServerCtx::new(AcceptFlags::NEGOTIATE_TOKEN, Some(self.spn.as_str()))
            .map_err(|e| NegotiationError::CredentialFailure(e.to_string()))?;
        debug!(spn = %self.spn, "opened acceptor context");
        Ok(Box::new(KerberosContext::Pending(pending)))
    }
}

enum KerberosContext {
    Pending(PendingServerCtx),
    Established(ServerCtx),
    Spent,
}

impl SecurityContext for KerberosContext {
    fn accept(&mut self, token: &[u8]) -> Result<AcceptStep, NegotiationError> {
        let Self::Pending(pending) = std::mem::replace(self, Self::Spent) else {
            return Err(NegotiationError::TokenFailure(
                "context is not awaiting a token".to_owned(),
            ));
        };
        match pending
            .step(token)
            .map_err(|e| NegotiationError::TokenFailure(e.to_string()))?
        {
            Step::Finished((ctx, out)) => {
                let out = out.map(|buf| buf.to_vec());
                *self = Self::Established(ctx);
                Ok(AcceptStep::Established(out))
            }
            Step::Continue((pending, out)) => {
                let out = out.to_vec();
                *self = Self::Pending(pending);
                Ok(AcceptStep::Continue(out))
            }
        }
    }

    fn source_name(&mut self) -> Result<Option<String>, NegotiationError> {
        match self {
            Self::Established(ctx) => ctx
                .client()
                .map(Some)
                .map_err(|e| NegotiationError::PrincipalExtractionFailure(e.to_string())),
            Self::Pending(_) | Self::Spent => Ok(None),
        }
    }

    fn dispose(&mut self) -> Result<(), NegotiationError> {
        // Dropping the context releases the GSSAPI handles.
        *self = Self::Spent;
        Ok(())
    }
}
