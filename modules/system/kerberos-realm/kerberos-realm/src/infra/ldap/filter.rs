//! Search bases and filters for Active Directory queries.

use ldap3::ldap_escape;

/// AD matching rule that follows `memberOf` chains (`LDAP_MATCHING_RULE_IN_CHAIN`).
const IN_CHAIN_RULE: &str = "1.2.840.113556.1.4.1941";

/// `corp.example.com` becomes `DC=corp,DC=example,DC=com`.
#[must_use]
pub fn search_base(domain: &str) -> String {
    domain
        .split('.')
        .filter(|label| !label.is_empty())
        .map(|label| format!("DC={label}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Groups whose `memberOf` lists `group_dn`.
#[must_use]
pub fn member_groups(group_dn: &str) -> String {
    format!("(&(objectClass=group)(memberOf={}))", ldap_escape(group_dn))
}

/// The user with the given `sAMAccountName`.
#[must_use]
pub fn user_account(account: &str) -> String {
    format!("(&(objectClass=user)(sAMAccountName={}))", ldap_escape(account))
}

/// The user with the given `sAMAccountName`, if it is in `group_dn` through any chain.
#[must_use]
pub fn transitive_membership(group_dn: &str, account: &str) -> String {
    format!(
        "(&(objectClass=user)(sAMAccountName={})(memberOf:{IN_CHAIN_RULE}:={}))",
        ldap_escape(account),
        ldap_escape(group_dn)
    )
}
