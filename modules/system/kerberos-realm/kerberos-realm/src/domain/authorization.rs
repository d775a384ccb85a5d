//! Role resolution for authenticated principals.

use std::sync::Arc;

use kerberos_realm_sdk::{AuthenticatedPrincipal, RoleSet};
use tracing::debug;

use super::role_mapping::RoleMappingCache;

/// Combines principal and group role entries from the current snapshot.
#[derive(Clone)]
pub struct AuthorizationResolver {
    cache: Arc<RoleMappingCache>,
}

impl AuthorizationResolver {
    #[must_use]
    pub fn new(cache: Arc<RoleMappingCache>) -> Self {
        Self { cache }
    }

    /// Roles of `principal` unioned with the roles of each direct group.
    ///
    /// One snapshot serves the whole call. An empty set is a valid answer.
    #[must_use]
    pub fn resolve(
        &self,
        principal: &AuthenticatedPrincipal,
        direct_groups: &[String],
    ) -> RoleSet {
        let snapshot = self.cache.current_snapshot();

        let mut roles: RoleSet = snapshot
            .principal_roles(principal.as_str())
            .iter()
            .map(String::as_str)
            .collect();
        for group in direct_groups {
            for role in snapshot.group_roles(group) {
                if roles.insert(role) {
                    debug!(%principal, %group, %role, "role granted by group");
                }
            }
        }
        roles
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::io::Write as _;

    use super::*;
    use crate::domain::role_mapping::RoleMappingSettings;
    use crate::testing::InMemoryDirectory;

    async fn resolver_for(
        mapping: &str,
        directory: InMemoryDirectory,
    ) -> (AuthorizationResolver, tempfile::NamedTempFile) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(mapping.as_bytes()).unwrap();
        let cache = Arc::new(RoleMappingCache::new(
            Arc::new(directory),
            RoleMappingSettings {
                path: file.path().to_path_buf(),
                strip_realm: true,
                max_nested_group_depth: 15,
                max_nested_group_workers: 4,
            },
        ));
        cache.rebuild().await.unwrap();
        (AuthorizationResolver::new(cache), file)
    }

    fn directory() -> InMemoryDirectory {
        InMemoryDirectory::new()
            .with_group("CN=Admins,DC=example,DC=com")
            .with_group("CN=Ops,DC=example,DC=com")
            .with_user("CN=Dave,DC=example,DC=com", "dave@EXAMPLE.COM")
    }

    #[tokio::test]
    async fn principal_and_group_roles_are_unioned() {
        let (resolver, _file) = resolver_for(
            "admin: [\"CN=Admins,DC=example,DC=com\", \"CN=Dave,DC=example,DC=com\"]\nops: [\"CN=Ops,DC=example,DC=com\"]\n",
            directory(),
        )
        .await;

        let roles = resolver.resolve(
            &AuthenticatedPrincipal::new("dave"),
            &[
                "cn=admins,dc=example,dc=com".to_owned(),
                "cn=ops,dc=example,dc=com".to_owned(),
            ],
        );

        assert_eq!(roles.iter().collect::<Vec<_>>(), ["admin", "ops"]);
    }

    #[tokio::test]
    async fn group_lookup_ignores_case() {
        let (resolver, _file) =
            resolver_for("ops: [\"CN=Ops,DC=example,DC=com\"]\n", directory()).await;

        let roles = resolver.resolve(
            &AuthenticatedPrincipal::new("erin"),
            &["CN=OPS,DC=EXAMPLE,DC=COM".to_owned()],
        );

        assert!(roles.contains("ops"));
    }

    #[tokio::test]
    async fn unmapped_principal_is_roleless() {
        let (resolver, _file) =
            resolver_for("ops: [\"CN=Ops,DC=example,DC=com\"]\n", directory()).await;

        let roles = resolver.resolve(
            &AuthenticatedPrincipal::new("mallory"),
            &["cn=unrelated".to_owned()],
        );

        assert!(roles.is_empty());
    }

    #[tokio::test]
    async fn resolution_does_not_mutate_the_snapshot() {
        let (resolver, _file) = resolver_for(
            "admin: [\"CN=Dave,DC=example,DC=com\"]\nops: [\"CN=Ops,DC=example,DC=com\"]\n",
            directory(),
        )
        .await;
        let principal = AuthenticatedPrincipal::new("dave");

        let first = resolver.resolve(&principal, &["cn=ops,dc=example,dc=com".to_owned()]);
        let second = resolver.resolve(&principal, &[]);

        assert_eq!(first.len(), 2);
        assert_eq!(second.iter().collect::<Vec<_>>(), ["admin"]);
    }
}
