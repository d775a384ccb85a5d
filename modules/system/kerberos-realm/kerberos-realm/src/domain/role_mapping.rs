//! Role mapping snapshots and the cache that rebuilds them.
//!
//! A rebuild reads the mapping file, resolves every listed identity against
//! the directory and publishes the result with one pointer swap. Readers
//! never block and never see a partially built mapping. Overlapping
//! rebuilds are allowed; the one that finishes last wins.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use kerberos_realm_sdk::{DirectoryClient, RefreshTrigger};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::error::DomainError;
use super::nested_groups::NestedGroupResolver;
use super::principal::strip_realm;
use super::sid::decode_sid;

/// Immutable principal and group lookup tables.
///
/// Group keys are lowercased. Roles are lowercased and unique per key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoleMapping {
    principal_roles: BTreeMap<String, Vec<String>>,
    group_roles: BTreeMap<String, Vec<String>>,
}

impl RoleMapping {
    #[must_use]
    pub fn principal_roles(&self, principal: &str) -> &[String] {
        self.principal_roles
            .get(principal)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn group_roles(&self, group: &str) -> &[String] {
        self.group_roles
            .get(&group.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn principals(&self) -> &BTreeMap<String, Vec<String>> {
        &self.principal_roles
    }

    #[must_use]
    pub fn groups(&self) -> &BTreeMap<String, Vec<String>> {
        &self.group_roles
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.principal_roles.is_empty() && self.group_roles.is_empty()
    }

    fn add_principal(&mut self, principal: &str, role: &str) {
        push_unique(self.principal_roles.entry(principal.to_owned()).or_default(), role);
    }

    fn add_group(&mut self, group: &str, role: &str) {
        push_unique(self.group_roles.entry(group.to_lowercase()).or_default(), role);
    }
}

fn push_unique(roles: &mut Vec<String>, role: &str) {
    if !roles.iter().any(|r| r == role) {
        roles.push(role.to_owned());
    }
}

/// Settings a rebuild needs besides the directory.
#[derive(Debug, Clone)]
pub struct RoleMappingSettings {
    pub path: PathBuf,
    pub strip_realm: bool,
    pub max_nested_group_depth: usize,
    pub max_nested_group_workers: usize,
}

/// Owner of the current [`RoleMapping`] snapshot.
pub struct RoleMappingCache {
    current: ArcSwap<RoleMapping>,
    directory: Arc<dyn DirectoryClient>,
    resolver: NestedGroupResolver,
    settings: RoleMappingSettings,
}

impl RoleMappingCache {
    /// Create a cache holding an empty snapshot.
    #[must_use]
    pub fn new(directory: Arc<dyn DirectoryClient>, settings: RoleMappingSettings) -> Self {
        Self {
            current: ArcSwap::from_pointee(RoleMapping::default()),
            resolver: NestedGroupResolver::new(Arc::clone(&directory)),
            directory,
            settings,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.settings.path
    }

    /// Last successfully built snapshot (empty until the first rebuild succeeds).
    #[must_use]
    pub fn current_snapshot(&self) -> Arc<RoleMapping> {
        self.current.load_full()
    }

    /// Rebuild from the mapping file and publish the result.
    ///
    /// Entries the directory cannot find or answer for are skipped with a
    /// warning; they never fail the rebuild.
    ///
    /// # Errors
    ///
    /// `MappingLoad` when the file cannot be read or parsed. The previous
    /// snapshot stays current.
    #[tracing::instrument(skip(self), fields(path = %self.settings.path.display()))]
    pub async fn rebuild(&self) -> Result<Arc<RoleMapping>, DomainError> {
        let path = &self.settings.path;
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DomainError::mapping_load(path, &e))?;
        let definitions = parse_definitions(path, &raw)?;

        let mut next = RoleMapping::default();
        for (role, identities) in &definitions {
            let role = role.to_lowercase();
            for identity in identities.iter().flatten() {
                let identity = clean_identity(identity);
                if identity.is_empty() {
                    continue;
                }
                self.map_identity(&mut next, &role, identity).await;
            }
        }

        let next = Arc::new(next);
        self.current.store(Arc::clone(&next));
        info!(
            principals = next.principal_roles.len(),
            groups = next.group_roles.len(),
            "role mapping published"
        );
        Ok(next)
    }

    /// Rebuild on behalf of a trigger, logging instead of returning failures.
    pub async fn refresh(&self, trigger: RefreshTrigger) {
        debug!(?trigger, "role mapping refresh requested");
        if let Err(e) = self.rebuild().await {
            warn!(?trigger, error = %e, "role mapping refresh failed, keeping previous snapshot");
        }
    }

    async fn map_identity(&self, next: &mut RoleMapping, role: &str, identity: &str) {
        let entry = match self.directory.object_attributes(identity).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                warn!(%identity, %role, "role mapping could not find directory object");
                return;
            }
            Err(e) => {
                warn!(%identity, %role, error = %e, "directory lookup failed, skipping entry");
                return;
            }
        };

        if entry.is_group() {
            next.add_group(identity, role);
            let nested = self
                .resolver
                .resolve(
                    identity,
                    self.settings.max_nested_group_depth,
                    self.settings.max_nested_group_workers,
                )
                .await;
            for group in &nested {
                next.add_group(group, role);
            }
            let sid = entry.object_sid.as_deref().and_then(decode_sid);
            debug!(group = %identity, sid = ?sid, nested = nested.len(), %role, "mapped group");
        } else if let Some(upn) = entry.user_principal_name.as_deref() {
            let principal = strip_realm(upn, self.settings.strip_realm);
            next.add_principal(principal, role);
            debug!(%principal, %role, "mapped principal");
        } else {
            warn!(%identity, %role, "directory object has no userPrincipalName, skipping");
        }
    }
}

/// `role: [identity, ...]`. An empty document is an empty mapping.
type Definitions = BTreeMap<String, Option<Vec<String>>>;

fn parse_definitions(path: &Path, raw: &str) -> Result<Definitions, DomainError> {
    if raw.trim().is_empty() {
        return Ok(Definitions::new());
    }
    serde_saphyr::from_str(raw).map_err(|e| DomainError::mapping_load(path, &e))
}

fn clean_identity(identity: &str) -> &str {
    identity.trim().trim_matches(|c| c == '"' || c == '\'').trim()
}
