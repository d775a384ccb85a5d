//! Configuration for the Kerberos realm.

use std::borrow::Cow;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

/// Environment variable GSSAPI reads the acceptor keytab location from.
pub const KEYTAB_ENV: &str = "KRB5_KTNAME";

/// Realm configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KerberosRealmConfig {
    /// Service principal used to accept tokens, e.g. `HTTP/host.corp.example.com`.
    pub acceptor_principal: Option<String>,

    /// Keytab holding the acceptor key material.
    pub acceptor_keytab_path: Option<PathBuf>,

    /// Replace real negotiation with the fixed two-round mock protocol.
    pub mock_mode: bool,

    /// Drop the `@REALM` suffix from negotiated and mapped principal names.
    pub strip_realm_from_principal: bool,

    /// Directory connection.
    pub ldap: LdapConfig,

    /// Interval between timer-triggered role mapping rebuilds.
    #[serde(with = "humantime_duration")]
    pub cache_refresh_interval: Duration,

    /// Depth bound for nested-group discovery; the seed group is depth 1.
    pub max_nested_group_depth: usize,

    /// Concurrent directory queries per nested-group resolution.
    pub max_nested_group_workers: usize,

    /// YAML file mapping role names to directory identities.
    pub role_mapping_path: PathBuf,
}

impl Default for KerberosRealmConfig {
    fn default() -> Self {
        Self {
            acceptor_principal: None,
            acceptor_keytab_path: None,
            mock_mode: false,
            strip_realm_from_principal: true,
            ldap: LdapConfig::default(),
            cache_refresh_interval: Duration::from_secs(60 * 60),
            max_nested_group_depth: 15,
            max_nested_group_workers: 50,
            role_mapping_path: PathBuf::from("config/role_mapping.yml"),
        }
    }
}

/// Directory connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LdapConfig {
    /// Connection URL, e.g. `ldaps://dc01.corp.example.com:636`.
    pub url: String,

    /// DNS domain of the directory; searches are rooted at its `DC=` base.
    pub domain: String,

    /// Bind DN for simple bind. Anonymous bind when absent.
    pub bind_dn: Option<String>,

    pub bind_password: Option<SecretString>,

    /// Verify the directory server certificate on TLS connections.
    pub verify_certificates: bool,

    /// Connection and per-operation timeout.
    #[serde(with = "humantime_duration")]
    pub timeout: Duration,
}

impl Default for LdapConfig {
    fn default() -> Self {
        Self {
            url: "ldap://localhost:389".to_owned(),
            domain: String::new(),
            bind_dn: None,
            bind_password: None,
            verify_certificates: true,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Invalid combination of configuration values.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unconfigured (but required) property: {0}")]
    Missing(&'static str),

    #[error("keytab {path} is not readable: {reason}")]
    UnreadableKeytab { path: String, reason: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("KRB5_KTNAME ({exported}) does not point at acceptor_keytab_path {path}")]
    KeytabNotExported { path: String, exported: String },
}

impl KerberosRealmConfig {
    /// Check the configuration before the realm is started.
    ///
    /// The acceptor principal and keytab are only required outside mock mode.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.mock_mode {
            if self
                .acceptor_principal
                .as_deref()
                .is_none_or(|p| p.trim().is_empty())
            {
                return Err(ConfigError::Missing("acceptor_principal"));
            }
            let keytab = self
                .acceptor_keytab_path
                .as_ref()
                .ok_or(ConfigError::Missing("acceptor_keytab_path"))?;
            std::fs::File::open(keytab).map_err(|e| ConfigError::UnreadableKeytab {
                path: keytab.display().to_string(),
                reason: e.to_string(),
            })?;
        }
        if self.max_nested_group_depth == 0 {
            return Err(ConfigError::Zero("max_nested_group_depth"));
        }
        if self.max_nested_group_workers == 0 {
            return Err(ConfigError::Zero("max_nested_group_workers"));
        }
        if self.cache_refresh_interval.is_zero() {
            return Err(ConfigError::Zero("cache_refresh_interval"));
        }
        if self.role_mapping_path.as_os_str().is_empty() {
            return Err(ConfigError::Missing("role_mapping_path"));
        }
        Ok(())
    }

    /// Check that `exported`, the value of [`KEYTAB_ENV`], names the
    /// configured keytab. A `FILE:` prefix is accepted.
    ///
    /// GSSAPI only reads the keytab location from the environment, so a
    /// configured keytab it cannot see would otherwise be ignored.
    ///
    /// # Errors
    ///
    /// [`ConfigError::KeytabNotExported`] when the variable is unset or names
    /// another file.
    pub fn check_keytab_env(&self, exported: Option<&OsStr>) -> Result<(), ConfigError> {
        let Some(keytab) = self.acceptor_keytab_path.as_deref() else {
            return Ok(());
        };
        let exported = exported.map(OsStr::to_string_lossy);
        let matches = exported.as_deref().is_some_and(|value| {
            Path::new(value.strip_prefix("FILE:").unwrap_or(value)) == keytab
        });
        if matches {
            return Ok(());
        }
        Err(ConfigError::KeytabNotExported {
            path: keytab.display().to_string(),
            exported: exported.map_or_else(|| "unset".to_owned(), Cow::into_owned),
        })
    }
}

/// `"90s"`, `"60m"`, `"1h 30m"` style durations.
mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn mock_config() -> KerberosRealmConfig {
        KerberosRealmConfig {
            mock_mode: true,
            ..KerberosRealmConfig::default()
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = KerberosRealmConfig::default();

        assert!(!cfg.mock_mode);
        assert!(cfg.strip_realm_from_principal);
        assert_eq!(cfg.cache_refresh_interval, Duration::from_secs(3600));
        assert_eq!(cfg.max_nested_group_depth, 15);
        assert_eq!(cfg.max_nested_group_workers, 50);
        assert!(cfg.ldap.verify_certificates);
    }

    #[test]
    fn parses_yaml_with_humantime_durations() {
        let yaml = r"
acceptor_principal: HTTP/web.corp.example.com
acceptor_keytab_path: /etc/krb5.keytab
cache_refresh_interval: 15m
max_nested_group_depth: 4
ldap:
  url: ldaps://dc01.corp.example.com
  domain: corp.example.com
  bind_dn: CN=svc,DC=corp,DC=example,DC=com
  bind_password: hunter2
  timeout: 3s
";
        let cfg: KerberosRealmConfig = serde_saphyr::from_str(yaml).unwrap();

        assert_eq!(cfg.cache_refresh_interval, Duration::from_secs(15 * 60));
        assert_eq!(cfg.max_nested_group_depth, 4);
        assert_eq!(cfg.max_nested_group_workers, 50);
        assert_eq!(cfg.ldap.timeout, Duration::from_secs(3));
        assert_eq!(cfg.ldap.domain, "corp.example.com");
        assert!(cfg.ldap.bind_password.is_some());
    }

    #[test]
    fn rejects_unknown_fields() {
        let result: Result<KerberosRealmConfig, _> = serde_saphyr::from_str("mock: true\n");
        assert!(result.is_err());
    }

    #[test]
    fn mock_mode_does_not_need_acceptor() {
        assert_eq!(mock_config().validate(), Ok(()));
    }

    #[test]
    fn real_mode_requires_acceptor_principal() {
        let cfg = KerberosRealmConfig::default();
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::Missing("acceptor_principal"))
        );
    }

    #[test]
    fn real_mode_requires_readable_keytab() {
        let cfg = KerberosRealmConfig {
            acceptor_principal: Some("HTTP/web".to_owned()),
            acceptor_keytab_path: Some(PathBuf::from("/nonexistent/krb5.keytab")),
            ..KerberosRealmConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::UnreadableKeytab { .. })
        ));
    }

    #[test]
    fn real_mode_accepts_readable_keytab() {
        let keytab = tempfile::NamedTempFile::new().unwrap();
        let cfg = KerberosRealmConfig {
            acceptor_principal: Some("HTTP/web".to_owned()),
            acceptor_keytab_path: Some(keytab.path().to_path_buf()),
            ..KerberosRealmConfig::default()
        };
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn keytab_must_be_exported_to_gssapi() {
        let cfg = KerberosRealmConfig {
            acceptor_keytab_path: Some(PathBuf::from("/etc/realm/http.keytab")),
            ..KerberosRealmConfig::default()
        };

        assert_eq!(
            cfg.check_keytab_env(Some(OsStr::new("/etc/realm/http.keytab"))),
            Ok(())
        );
        assert_eq!(
            cfg.check_keytab_env(Some(OsStr::new("FILE:/etc/realm/http.keytab"))),
            Ok(())
        );
        assert_eq!(
            cfg.check_keytab_env(Some(OsStr::new("/etc/krb5.keytab"))),
            Err(ConfigError::KeytabNotExported {
                path: "/etc/realm/http.keytab".to_owned(),
                exported: "/etc/krb5.keytab".to_owned(),
            })
        );
        assert!(matches!(
            cfg.check_keytab_env(None),
            Err(ConfigError::KeytabNotExported { ref exported, .. }) if exported == "unset"
        ));
    }

    #[test]
    fn unconfigured_keytab_skips_env_check() {
        assert_eq!(KerberosRealmConfig::default().check_keytab_env(None), Ok(()));
    }

    #[test]
    fn zero_bounds_are_rejected() {
        let cfg = KerberosRealmConfig {
            max_nested_group_workers: 0,
            ..mock_config()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::Zero("max_nested_group_workers"))
        );

        let cfg = KerberosRealmConfig {
            max_nested_group_depth: 0,
            ..mock_config()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::Zero("max_nested_group_depth"))
        );
    }
}
