//! Domain models for the Kerberos realm module.

use std::collections::{BTreeSet, btree_set};
use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use http::header::{HeaderMap, HeaderName, HeaderValue, WWW_AUTHENTICATE};
use serde::Serialize;

/// Response header carrying an outbound negotiation token to the peer.
pub const KERBEROS_OUT_TOKEN_HEADER: &str = "kerberos_out_token";

/// Opaque bytes exchanged during one SPNEGO round.
#[derive(Clone, PartialEq, Eq)]
pub struct NegotiationToken {
    bytes: Vec<u8>,
    plain_text: bool,
}

impl NegotiationToken {
    /// Binary token produced by an acceptor; always relayed base64-encoded.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            plain_text: false,
        }
    }

    /// Readable token relayed as-is in `kerberos_out_token` (mock mode).
    #[must_use]
    pub fn plain_text(text: impl Into<String>) -> Self {
        Self {
            bytes: text.into().into_bytes(),
            plain_text: true,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn is_plain_text(&self) -> bool {
        self.plain_text
    }

    /// Standard base64 rendering, as carried in `Negotiate <token>`.
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// Value for the `kerberos_out_token` header.
    ///
    /// Plain-text tokens go out verbatim when they form a valid header value;
    /// everything else is base64.
    fn out_token_header(&self) -> HeaderValue {
        self.plain_text
            .then(|| HeaderValue::from_bytes(&self.bytes).ok())
            .flatten()
            .unwrap_or_else(|| base64_header(&self.to_base64()))
    }
}

impl fmt::Debug for NegotiationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NegotiationToken({} bytes)", self.bytes.len())
    }
}

/// Base64 output only contains visible ASCII, which is always a valid value.
fn base64_header(encoded: &str) -> HeaderValue {
    HeaderValue::from_str(encoded).unwrap_or_else(|_| HeaderValue::from_static(""))
}

/// Normalized principal name produced by a completed negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct AuthenticatedPrincipal(String);

impl AuthenticatedPrincipal {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthenticatedPrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Attributes of one directory object, as read by a base-scope lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub distinguished_name: String,
    pub object_class: Vec<String>,
    pub user_principal_name: Option<String>,
    pub member_of: Vec<String>,
    /// Binary `objectSid` as stored by the directory.
    pub object_sid: Option<Vec<u8>>,
}

impl DirectoryEntry {
    /// Whether `objectClass` includes `group`.
    #[must_use]
    pub fn is_group(&self) -> bool {
        self.object_class
            .iter()
            .any(|class| class.eq_ignore_ascii_case("group"))
    }
}

/// Identity established by a completed negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedIdentity {
    pub principal: AuthenticatedPrincipal,
    /// Final token for mutual authentication, if the mechanism produced one.
    pub out_token: Option<NegotiationToken>,
    /// Direct group memberships of the principal, lowercased.
    pub direct_groups: Vec<String>,
}

/// Result of one call into the negotiation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationOutcome {
    /// No credential header was presented.
    Absent,
    /// Another round is required; relay `out_token` to the peer.
    Continue { out_token: NegotiationToken },
    /// The security context is established.
    Authenticated(NegotiatedIdentity),
}

impl NegotiationOutcome {
    /// Headers the host should attach to its response for this outcome.
    ///
    /// Any outbound token is present in both headers. `kerberos_out_token`
    /// carries it base64-encoded, or verbatim for plain-text mock tokens;
    /// `WWW-Authenticate` always carries it base64-encoded.
    #[must_use]
    pub fn response_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let token = match self {
            Self::Absent => {
                headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static("Negotiate"));
                return headers;
            }
            Self::Continue { out_token } => Some(out_token),
            Self::Authenticated(identity) => identity.out_token.as_ref(),
        };

        if let Some(token) = token {
            headers.insert(
                HeaderName::from_static(KERBEROS_OUT_TOKEN_HEADER),
                token.out_token_header(),
            );
            headers.insert(
                WWW_AUTHENTICATE,
                base64_header(&format!("Negotiate {}", token.to_base64())),
            );
        }
        headers
    }
}

/// Credential handed to [`crate::KerberosRealmClient::authenticate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationToken {
    /// Internal health probe; bypasses negotiation.
    Liveness,
    Negotiated(NegotiatedIdentity),
}

/// Case-normalized, de-duplicated set of application roles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RoleSet(BTreeSet<String>);

impl RoleSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a role, lowercased. Returns `false` if it was already present.
    pub fn insert(&mut self, role: &str) -> bool {
        self.0.insert(role.to_lowercase())
    }

    #[must_use]
    pub fn contains(&self, role: &str) -> bool {
        self.0.contains(&role.to_lowercase())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn iter(&self) -> btree_set::Iter<'_, String> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a RoleSet {
    type Item = &'a String;
    type IntoIter = btree_set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<'a> FromIterator<&'a str> for RoleSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut set = Self::new();
        for role in iter {
            set.insert(role);
        }
        set
    }
}

/// Authenticated principal together with its resolved roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedUser {
    pub principal: AuthenticatedPrincipal,
    pub roles: RoleSet,
}

impl AuthenticatedUser {
    /// Principal name used for liveness probes.
    pub const SYSTEM_PRINCIPAL: &'static str = "_system";
    /// Role granted to the liveness identity.
    pub const SYSTEM_ROLE: &'static str = "superuser";

    /// Fixed identity answered for [`AuthenticationToken::Liveness`].
    #[must_use]
    pub fn system() -> Self {
        Self {
            principal: AuthenticatedPrincipal::new(Self::SYSTEM_PRINCIPAL),
            roles: std::iter::once(Self::SYSTEM_ROLE).collect(),
        }
    }
}

/// Source of a role mapping rebuild request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    Timer,
    FileChange,
}
