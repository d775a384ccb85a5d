//! Configuration loading: YAML file overlaid with `KERBEROS_REALM__*` variables.

use std::path::Path;

use anyhow::Context as _;
use figment::Figment;
use figment::providers::{Env, Format as _, Yaml};
use kerberos_realm::KerberosRealmConfig;

const ENV_PREFIX: &str = "KERBEROS_REALM__";

/// Load the realm configuration.
///
/// A missing file is not an error; defaults and environment variables still
/// apply. Nested keys use `__`, e.g. `KERBEROS_REALM__LDAP__URL`.
///
/// # Errors
///
/// Unparseable YAML or values of the wrong shape.
pub fn load(path: &Path) -> anyhow::Result<KerberosRealmConfig> {
    figment(path)
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

fn figment(path: &Path) -> Figment {
    if path.exists() {
        Figment::new().merge(Yaml::file(path))
    } else {
        tracing::warn!(path = %path.display(), "configuration file not found, using defaults");
        Figment::new()
    }
}
