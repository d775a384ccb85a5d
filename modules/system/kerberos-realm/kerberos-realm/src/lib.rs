//! Kerberos Realm Module
//!
//! Authenticates SPNEGO `Negotiate` requests and maps the resulting principal
//! to application roles. Roles come from a YAML mapping file whose group
//! entries are expanded through nested directory groups; the expanded
//! mapping is rebuilt on a timer and whenever the file changes.
//!
//! Start the realm with [`module::KerberosRealm::start`] and hand
//! [`module::KerberosRealm::client`] to the host.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod config;
#[doc(hidden)]
pub mod domain;
#[doc(hidden)]
pub mod infra;
pub mod module;
pub mod testing;

pub use config::{KerberosRealmConfig, LdapConfig};
pub use module::{KerberosRealm, RealmOverrides};
