//! Kerberos realm lifecycle.

use std::sync::Arc;

use anyhow::Context as _;
use kerberos_realm_sdk::{
    AuthenticatedUser, AuthenticationToken, DirectoryClient, KerberosRealmClient,
    KerberosRealmError,
};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::config::KerberosRealmConfig;
use crate::domain::{
    AcceptorMechanism, CacheRefreshScheduler, KerberosRealmLocalClient, MappingFileWatcher,
    NegotiationEngine, NegotiationMode, RoleMappingCache, RoleMappingSettings, Service,
};
use crate::infra::ldap::LdapDirectoryClient;

/// Collaborators supplied by the host instead of the configured defaults.
#[derive(Default, Clone)]
pub struct RealmOverrides {
    /// Used instead of the LDAP client built from `ldap`.
    pub directory: Option<Arc<dyn DirectoryClient>>,
    /// Used instead of the GSSAPI acceptor; ignored in mock mode.
    pub mechanism: Option<Arc<dyn AcceptorMechanism>>,
}

/// A running realm: the service plus its two refresh loops.
///
/// ```ignore
/// let realm = KerberosRealm::start(cfg, RealmOverrides::default()).await?;
/// let client = realm.client();
/// // ...
/// realm.stop().await;
/// ```
pub struct KerberosRealm {
    service: Arc<Service>,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl KerberosRealm {
    /// Validate `cfg`, load the role mapping once and start the refresh loops.
    ///
    /// A failed initial load is logged; the realm starts with an empty mapping
    /// and picks the file up on the next refresh.
    ///
    /// # Errors
    ///
    /// Invalid configuration, or no acceptor mechanism outside mock mode.
    #[tracing::instrument(skip_all, fields(mock = cfg.mock_mode))]
    pub async fn start(
        cfg: KerberosRealmConfig,
        overrides: RealmOverrides,
    ) -> anyhow::Result<Self> {
        cfg.validate().context("invalid kerberos realm configuration")?;
        info!(
            mapping = %cfg.role_mapping_path.display(),
            ldap = %cfg.ldap.url,
            "Initializing kerberos_realm"
        );

        let directory: Arc<dyn DirectoryClient> = match overrides.directory {
            Some(directory) => directory,
            None => Arc::new(LdapDirectoryClient::new(&cfg.ldap)),
        };
        let mode = negotiation_mode(&cfg, overrides.mechanism)?;

        let cache = Arc::new(RoleMappingCache::new(
            Arc::clone(&directory),
            RoleMappingSettings {
                path: cfg.role_mapping_path.clone(),
                strip_realm: cfg.strip_realm_from_principal,
                max_nested_group_depth: cfg.max_nested_group_depth,
                max_nested_group_workers: cfg.max_nested_group_workers,
            },
        ));
        if let Err(e) = cache.rebuild().await {
            warn!(error = %e, "initial role mapping load failed, starting with an empty mapping");
        }

        let engine = NegotiationEngine::new(
            mode,
            cfg.strip_realm_from_principal,
            Arc::clone(&directory),
        );
        let service = Arc::new(Service::new(
            engine,
            Arc::clone(&cache),
            directory,
            cfg.strip_realm_from_principal,
        ));

        let cancel = CancellationToken::new();
        let tasks = TaskTracker::new();
        tasks.spawn(
            CacheRefreshScheduler::new(Arc::clone(&cache), cfg.cache_refresh_interval)
                .run(cancel.child_token()),
        );
        tasks.spawn(MappingFileWatcher::new(cache).run(cancel.child_token()));
        tasks.close();

        info!("kerberos_realm started");
        Ok(Self {
            service,
            cancel,
            tasks,
        })
    }

    /// Cancel both refresh loops and wait for them to finish.
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.tasks.wait().await;
        info!("kerberos_realm stopped");
    }

    /// Client handed to the host authentication framework.
    #[must_use]
    pub fn client(&self) -> Arc<dyn KerberosRealmClient> {
        Arc::new(KerberosRealmLocalClient::new(Arc::clone(&self.service)))
    }

    #[must_use]
    pub fn service(&self) -> &Arc<Service> {
        &self.service
    }

    /// # Errors
    ///
    /// See [`KerberosRealmClient::authenticate`].
    pub fn authenticate(
        &self,
        token: &AuthenticationToken,
    ) -> Result<AuthenticatedUser, KerberosRealmError> {
        Ok(self.service.authenticate(token)?)
    }
}

impl Drop for KerberosRealm {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn negotiation_mode(
    cfg: &KerberosRealmConfig,
    mechanism: Option<Arc<dyn AcceptorMechanism>>,
) -> anyhow::Result<NegotiationMode> {
    if cfg.mock_mode {
        warn!(
            "kerberos_realm is in mock mode: any 'Negotiate_c' header authenticates. \
             NEVER use in production!"
        );
        return Ok(NegotiationMode::Mock);
    }
    let mechanism = match mechanism {
        Some(mechanism) => mechanism,
        None => default_mechanism(cfg)?,
    };
    Ok(NegotiationMode::Acceptor(mechanism))
}

#[cfg(feature = "gssapi")]
fn default_mechanism(cfg: &KerberosRealmConfig) -> anyhow::Result<Arc<dyn AcceptorMechanism>> {
    let spn = cfg
        .acceptor_principal
        .clone()
        .context("acceptor_principal is required outside mock mode")?;
    cfg.check_keytab_env(std::env::var_os(crate::config::KEYTAB_ENV).as_deref())?;
    Ok(Arc::new(crate::infra::gss::KerberosAcceptor::new(spn)))
}

#[cfg(not(feature = "gssapi"))]
fn default_mechanism(_cfg: &KerberosRealmConfig) -> anyhow::Result<Arc<dyn AcceptorMechanism>> {
    anyhow::bail!(
        "no acceptor mechanism: build with the `gssapi` feature or supply one in RealmOverrides"
    )
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::time::Duration;

    use tracing_test::traced_test;

    use super::*;
    use crate::testing::InMemoryDirectory;

    fn mock_config(dir: &tempfile::TempDir) -> KerberosRealmConfig {
        KerberosRealmConfig {
            mock_mode: true,
            role_mapping_path: dir.path().join("role_mapping.yml"),
            ..KerberosRealmConfig::default()
        }
    }

    fn in_memory() -> RealmOverrides {
        RealmOverrides {
            directory: Some(Arc::new(InMemoryDirectory::new().with_group("CN=Ops"))),
            mechanism: None,
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn missing_mapping_file_still_starts() {
        let dir = tempfile::tempdir().unwrap();
        let realm = KerberosRealm::start(mock_config(&dir), in_memory())
            .await
            .unwrap();

        assert!(realm.service().snapshot().is_empty());
        assert!(logs_contain("initial role mapping load failed"));
        assert!(logs_contain("mock mode"));

        tokio::time::timeout(Duration::from_secs(5), realm.stop())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn initial_load_is_published() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = mock_config(&dir);
        std::fs::write(&cfg.role_mapping_path, "ops: [\"CN=Ops\"]\n").unwrap();

        let realm = KerberosRealm::start(cfg, in_memory()).await.unwrap();

        assert_eq!(realm.service().snapshot().group_roles("cn=ops"), ["ops"]);
        realm.stop().await;
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = KerberosRealmConfig {
            max_nested_group_workers: 0,
            ..mock_config(&dir)
        };

        assert!(KerberosRealm::start(cfg, in_memory()).await.is_err());
    }

    #[cfg(not(feature = "gssapi"))]
    #[tokio::test]
    async fn real_mode_without_mechanism_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let keytab = dir.path().join("http.keytab");
        std::fs::write(&keytab, b"\x05\x02").unwrap();
        let cfg = KerberosRealmConfig {
            mock_mode: false,
            acceptor_principal: Some("HTTP/host.example.com".to_owned()),
            acceptor_keytab_path: Some(keytab),
            ..mock_config(&dir)
        };

        let err = KerberosRealm::start(cfg, in_memory()).await.err().unwrap();
        assert!(err.to_string().contains("no acceptor mechanism"));
    }

    #[tokio::test]
    async fn liveness_authenticates_as_system() {
        let dir = tempfile::tempdir().unwrap();
        let realm = KerberosRealm::start(mock_config(&dir), in_memory())
            .await
            .unwrap();

        let user = realm.authenticate(&AuthenticationToken::Liveness).unwrap();
        assert_eq!(user, AuthenticatedUser::system());
        realm.stop().await;
    }
}
