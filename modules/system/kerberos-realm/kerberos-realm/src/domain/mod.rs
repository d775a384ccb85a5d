//! Domain layer for the Kerberos realm.

pub mod authorization;
pub mod error;
pub mod local_client;
pub mod negotiation;
pub mod nested_groups;
pub mod principal;
pub mod refresh;
pub mod role_mapping;
pub mod service;
pub mod sid;
pub mod watcher;

pub use authorization::AuthorizationResolver;
pub use error::DomainError;
pub use local_client::KerberosRealmLocalClient;
pub use negotiation::{
    AcceptStep, AcceptorMechanism, NegotiationEngine, NegotiationMode, SecurityContext,
};
pub use nested_groups::NestedGroupResolver;
pub use refresh::CacheRefreshScheduler;
pub use role_mapping::{RoleMapping, RoleMappingCache, RoleMappingSettings};
pub use service::Service;
pub use watcher::MappingFileWatcher;
