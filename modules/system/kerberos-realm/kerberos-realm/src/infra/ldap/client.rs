//! `ldap3`-backed [`DirectoryClient`].
//!
//! Each query opens its own connection, binds, runs one search and unbinds.
//! Trust settings stay inside this type.

use std::time::Duration;

use async_trait::async_trait;
use kerberos_realm_sdk::{DirectoryClient, DirectoryEntry, DirectoryError};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry, SearchResult};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use super::filter;
use crate::config::LdapConfig;

/// `noSuchObject`
const RC_NO_SUCH_OBJECT: u32 = 32;

const OBJECT_ATTRIBUTES: [&str; 5] = [
    "objectClass",
    "userPrincipalName",
    "memberOf",
    "objectSid",
    "distinguishedName",
];

/// Directory client for Active Directory over LDAP.
pub struct LdapDirectoryClient {
    url: String,
    search_base: String,
    bind_dn: Option<String>,
    bind_password: Option<SecretString>,
    verify_certificates: bool,
    timeout: Duration,
}

impl LdapDirectoryClient {
    #[must_use]
    pub fn new(cfg: &LdapConfig) -> Self {
        if !cfg.verify_certificates {
            warn!(url = %cfg.url, "directory certificate verification is disabled");
        }
        Self {
            url: cfg.url.clone(),
            search_base: filter::search_base(&cfg.domain),
            bind_dn: cfg.bind_dn.clone(),
            bind_password: cfg.bind_password.clone(),
            verify_certificates: cfg.verify_certificates,
            timeout: cfg.timeout,
        }
    }

    async fn connect(&self) -> Result<Ldap, DirectoryError> {
        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.timeout)
            .set_no_tls_verify(!self.verify_certificates);
        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &self.url)
            .await
            .map_err(|e| DirectoryError::Connection(format!("{}: {e}", self.url)))?;
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "directory connection error");
            }
        });

        let (bind_dn, password) = match (&self.bind_dn, &self.bind_password) {
            (Some(dn), Some(password)) => (dn.as_str(), password.expose_secret()),
            _ => ("", ""),
        };
        ldap.with_timeout(self.timeout)
            .simple_bind(bind_dn, password)
            .await
            .map_err(|e| DirectoryError::Connection(format!("bind failed: {e}")))?
            .success()
            .map_err(|e| DirectoryError::Connection(format!("bind rejected: {e}")))?;
        Ok(ldap)
    }

    /// Run one search on a fresh connection and always unbind afterwards.
    async fn search(
        &self,
        base: &str,
        scope: Scope,
        filter: &str,
        attrs: &[&str],
    ) -> Result<SearchResult, DirectoryError> {
        let mut ldap = self.connect().await?;
        debug!(%base, %filter, "directory search");
        let result = ldap
            .with_timeout(self.timeout)
            .search(base, scope, filter, attrs.to_vec())
            .await
            .map_err(|e| DirectoryError::Query(e.to_string()));
        if let Err(e) = ldap.unbind().await {
            debug!(error = %e, "directory unbind failed");
        }
        result
    }

    async fn subtree(
        &self,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<SearchEntry>, DirectoryError> {
        let (entries, _) = self
            .search(&self.search_base, Scope::Subtree, filter, attrs)
            .await?
            .success()
            .map_err(|e| DirectoryError::Query(e.to_string()))?;
        Ok(entries.into_iter().map(SearchEntry::construct).collect())
    }
}

#[async_trait]
impl DirectoryClient for LdapDirectoryClient {
    async fn object_attributes(&self, dn: &str) -> Result<Option<DirectoryEntry>, DirectoryError> {
        let SearchResult(entries, result) = self
            .search(dn, Scope::Base, "(objectClass=*)", &OBJECT_ATTRIBUTES)
            .await?;
        if result.rc == RC_NO_SUCH_OBJECT {
            return Ok(None);
        }
        let (entries, _) = SearchResult(entries, result)
            .success()
            .map_err(|e| DirectoryError::Query(e.to_string()))?;
        Ok(entries
            .into_iter()
            .next()
            .map(|entry| to_directory_entry(&SearchEntry::construct(entry))))
    }

    async fn member_groups(&self, group_dn: &str) -> Result<Vec<String>, DirectoryError> {
        let entries = self
            .subtree(&filter::member_groups(group_dn), &["distinguishedName"])
            .await?;
        Ok(entries.iter().map(distinguished_name).collect())
    }

    async fn user_groups(&self, account: &str) -> Result<Vec<String>, DirectoryError> {
        let entries = self
            .subtree(&filter::user_account(account), &["memberOf"])
            .await?;
        let Some(user) = entries.first() else {
            debug!(%account, "no directory account found");
            return Ok(Vec::new());
        };

        let mut groups: Vec<String> = Vec::new();
        for group in values(user, "memberOf") {
            let group = group.to_lowercase();
            if !groups.contains(&group) {
                groups.push(group);
            }
        }
        Ok(groups)
    }

    async fn is_member_transitive(
        &self,
        group_dn: &str,
        account: &str,
    ) -> Result<bool, DirectoryError> {
        let entries = self
            .subtree(&filter::transitive_membership(group_dn, account), &["1.1"])
            .await?;
        Ok(!entries.is_empty())
    }
}

/// Attribute values, matched case-insensitively on the attribute name.
fn values<'a>(entry: &'a SearchEntry, name: &str) -> &'a [String] {
    entry
        .attrs
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, values)| values.as_slice())
        .unwrap_or_default()
}

fn first_value<'a>(entry: &'a SearchEntry, name: &str) -> Option<&'a str> {
    values(entry, name).first().map(String::as_str)
}

/// `objectSid` lands in `bin_attrs` unless its bytes happen to be valid UTF-8.
fn binary_value(entry: &SearchEntry, name: &str) -> Option<Vec<u8>> {
    entry
        .bin_attrs
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, values)| values.first().cloned())
        .or_else(|| first_value(entry, name).map(|text| text.as_bytes().to_vec()))
}

/// `distinguishedName` attribute, or the entry DN when it was not returned.
fn distinguished_name(entry: &SearchEntry) -> String {
    first_value(entry, "distinguishedName").map_or_else(|| entry.dn.clone(), str::to_owned)
}

fn to_directory_entry(entry: &SearchEntry) -> DirectoryEntry {
    DirectoryEntry {
        distinguished_name: distinguished_name(entry),
        object_class: values(entry, "objectClass").to_vec(),
        user_principal_name: first_value(entry, "userPrincipalName").map(str::to_owned),
        member_of: values(entry, "memberOf").to_vec(),
        object_sid: binary_value(entry, "objectSid"),
    }
}
