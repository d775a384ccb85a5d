//! Subcommand implementations.

use std::sync::Arc;

use anyhow::Context as _;
use kerberos_realm::domain::{RoleMappingCache, RoleMappingSettings};
use kerberos_realm::infra::ldap::LdapDirectoryClient;
use kerberos_realm::{KerberosRealm, KerberosRealmConfig, RealmOverrides};
use kerberos_realm_sdk::{AuthenticationToken, DirectoryClient, NegotiationOutcome};
use tracing::info;

/// One negotiation round, followed by role resolution when it completes.
pub async fn negotiate(cfg: KerberosRealmConfig, header: Option<&str>) -> anyhow::Result<()> {
    let realm = KerberosRealm::start(cfg, RealmOverrides::default()).await?;
    let client = realm.client();
    let result = async {
        let outcome = client.negotiate(header).await?;
        for (name, value) in &outcome.response_headers() {
            println!("{name}: {}", value.to_str().unwrap_or("<binary>"));
        }
        match outcome {
            NegotiationOutcome::Authenticated(identity) => {
                let user = client
                    .authenticate(&AuthenticationToken::Negotiated(identity))
                    .await?;
                println!("{}", serde_json::to_string_pretty(&user)?);
            }
            NegotiationOutcome::Continue { .. } => info!("negotiation needs another round"),
            NegotiationOutcome::Absent => info!("no authorization header supplied"),
        }
        anyhow::Ok(())
    }
    .await;
    realm.stop().await;
    result
}

/// Build the role mapping once and print it.
pub async fn mapping(cfg: &KerberosRealmConfig) -> anyhow::Result<()> {
    let cache = RoleMappingCache::new(
        directory(cfg),
        RoleMappingSettings {
            path: cfg.role_mapping_path.clone(),
            strip_realm: cfg.strip_realm_from_principal,
            max_nested_group_depth: cfg.max_nested_group_depth,
            max_nested_group_workers: cfg.max_nested_group_workers,
        },
    );
    let snapshot = cache.rebuild().await?;
    println!("{}", serde_json::to_string_pretty(&*snapshot)?);
    Ok(())
}

/// Transitive membership check through the realm service.
pub async fn is_member(
    cfg: KerberosRealmConfig,
    principal: &str,
    group: &str,
) -> anyhow::Result<bool> {
    let realm = KerberosRealm::start(cfg, RealmOverrides::default()).await?;
    let result = realm
        .service()
        .is_member_of(principal, group)
        .await
        .with_context(|| format!("membership check for {principal} failed"));
    realm.stop().await;
    let member = result?;
    println!("{member}");
    Ok(member)
}

/// Keep the mapping fresh until Ctrl-C.
pub async fn run(cfg: KerberosRealmConfig) -> anyhow::Result<()> {
    let realm = KerberosRealm::start(cfg, RealmOverrides::default()).await?;
    info!("running, press Ctrl-C to stop");
    let signal = tokio::signal::ctrl_c().await;
    realm.stop().await;
    signal.context("failed to listen for Ctrl-C")
}

fn directory(cfg: &KerberosRealmConfig) -> Arc<dyn DirectoryClient> {
    Arc::new(LdapDirectoryClient::new(&cfg.ldap))
}
