#[cfg(feature = "gssapi")]
pub mod gss;
pub mod ldap;
