//! Kerberos Realm SDK
//!
//! This crate provides the public API for the `kerberos_realm` module:
//!
//! - [`KerberosRealmClient`] - Public API trait for consumers
//! - [`DirectoryClient`] - Directory port consumed by group and role resolution
//! - [`NegotiationOutcome`] - Result of one SPNEGO round
//! - [`AuthenticatedUser`] - Principal plus resolved application roles
//! - [`KerberosRealmError`], [`NegotiationError`], [`DirectoryError`] - Error types
//!
//! ## Usage
//!
//! ```ignore
//! use kerberos_realm_sdk::{AuthenticationToken, KerberosRealmClient, NegotiationOutcome};
//!
//! let outcome = realm.negotiate(Some("Negotiate YIIFJgYG...")).await?;
//! match outcome {
//!     NegotiationOutcome::Authenticated(identity) => {
//!         let user = realm
//!             .authenticate(&AuthenticationToken::Negotiated(identity))
//!             .await?;
//!         println!("{} has roles {:?}", user.principal, user.roles);
//!     }
//!     NegotiationOutcome::Continue { .. } => {
//!         // relay `outcome.response_headers()` to the peer
//!     }
//!     NegotiationOutcome::Absent => {}
//! }
//! ```

pub mod api;
pub mod directory_api;
pub mod error;
pub mod models;

// Re-export main types at crate root
pub use api::KerberosRealmClient;
pub use directory_api::DirectoryClient;
pub use error::{DirectoryError, KerberosRealmError, NegotiationError};
pub use models::{
    AuthenticatedPrincipal, AuthenticatedUser, AuthenticationToken, DirectoryEntry,
    KERBEROS_OUT_TOKEN_HEADER, NegotiatedIdentity, NegotiationOutcome, NegotiationToken,
    RefreshTrigger, RoleSet,
};
