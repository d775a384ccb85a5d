//! Directory port used by nested-group and role resolution.
//!
//! Implementations own the wire protocol and trust configuration; callers
//! only see entries and distinguished names.

use async_trait::async_trait;

use crate::error::DirectoryError;
use crate::models::DirectoryEntry;

/// Read-only view of an LDAP/AD directory.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Read the object stored at `dn`.
    ///
    /// Returns `Ok(None)` when the directory has no such object.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the query cannot be completed.
    async fn object_attributes(&self, dn: &str) -> Result<Option<DirectoryEntry>, DirectoryError>;

    /// Distinguished names of the groups that list `group_dn` in `memberOf`.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the query cannot be completed.
    async fn member_groups(&self, group_dn: &str) -> Result<Vec<String>, DirectoryError>;

    /// Direct group memberships of the user account, lowercased.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the query cannot be completed.
    async fn user_groups(&self, account: &str) -> Result<Vec<String>, DirectoryError>;

    /// Whether `account` is a member of `group_dn`, directly or through any
    /// chain of nested groups.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the query cannot be completed.
    async fn is_member_transitive(
        &self,
        group_dn: &str,
        account: &str,
    ) -> Result<bool, DirectoryError>;
}
