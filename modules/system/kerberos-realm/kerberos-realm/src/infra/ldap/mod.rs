mod client;
pub mod filter;

pub use client::LdapDirectoryClient;
