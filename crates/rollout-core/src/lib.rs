//! Core types and configuration for rollout.
//!
//! This crate defines the `rollout.toml` schema ([`RolloutConfig`]), the
//! mapping of configuration onto build environment entries ([`resolve`]),
//! secret references that never carry secret values ([`SecretRef`]), and the
//! exactly-once bootstrap trigger ([`BootstrapController`]).

pub mod config;
pub mod error;
pub mod resolver;
pub mod secret;
pub mod trigger;

pub use config::{
    AdminConfig, AppConfig, BootstrapAction, BootstrapConfig, DatastoreConfig, InstanceConfig,
    PipelineBuildConfig, PipelineConfig, RemovalPolicy, RolloutConfig, SearchConfig, SourceConfig,
    WebConfig,
};
pub use error::{ConfigError, Error, Result};
pub use resolver::{ConfigEntry, ConfigValue, ResolvedEnv, resolve};
pub use secret::{
    GrantError, GrantOutcome, Principal, SecretAccess, SecretGrants, SecretRef, SecretRefError,
};
pub use trigger::{
    BootstrapController, BootstrapFireError, BootstrapHandler, BootstrapProperties, Completion,
    FireStatus, Notified, ResourceHandle, ResourceKind, TriggerRecord, TriggerState,
    TriggerStoreError,
};
