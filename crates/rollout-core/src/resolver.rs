//! Flattens [`RolloutConfig`] into build environment entries.
//!
//! Literal values are safe to log. Credentials only ever appear as
//! [`SecretRef`]s, resolved by the build executor at build time.

use std::collections::HashSet;

use crate::config::{RolloutConfig, required};
use crate::error::ConfigError;
use crate::secret::SecretRef;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    Literal(String),
    SecretField(SecretRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub key: String,
    pub value: ConfigValue,
}

/// Build environment split into literal variables and secret references.
///
/// Keys are unique across both halves; insertion order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedEnv {
    vars: Vec<(String, String)>,
    secrets: Vec<(String, SecretRef)>,
    keys: HashSet<String>,
}

impl ResolvedEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_literal(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), ConfigError> {
        let key = self.claim(key.into())?;
        self.vars.push((key, value.into()));
        Ok(())
    }

    pub fn insert_secret(
        &mut self,
        key: impl Into<String>,
        secret: SecretRef,
    ) -> Result<(), ConfigError> {
        let key = self.claim(key.into())?;
        self.secrets.push((key, secret));
        Ok(())
    }

    fn claim(&mut self, key: String) -> Result<String, ConfigError> {
        if !self.keys.insert(key.clone()) {
            return Err(ConfigError::DuplicateKey(key));
        }
        Ok(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| ConfigValue::Literal(v.clone()))
            .or_else(|| {
                self.secrets
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, s)| ConfigValue::SecretField(s.clone()))
            })
    }

    /// Literal `(key, value)` pairs.
    pub fn vars(&self) -> &[(String, String)] {
        &self.vars
    }

    /// `(key, secret)` pairs.
    pub fn secrets(&self) -> &[(String, SecretRef)] {
        &self.secrets
    }

    /// Every entry, literals first.
    pub fn entries(&self) -> Vec<ConfigEntry> {
        self.vars
            .iter()
            .map(|(k, v)| ConfigEntry {
                key: k.clone(),
                value: ConfigValue::Literal(v.clone()),
            })
            .chain(self.secrets.iter().map(|(k, s)| ConfigEntry {
                key: k.clone(),
                value: ConfigValue::SecretField(s.clone()),
            }))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Resolve the web application's build environment.
///
/// Every required field is checked before anything is emitted; the first
/// missing one is reported as [`ConfigError::MissingField`].
pub fn resolve(config: &RolloutConfig) -> Result<ResolvedEnv, ConfigError> {
    let web = &config.web;
    let admin = &web.admin;
    let db = &config.datastore;
    let search = &config.search;

    let admin_url_path = required("web.admin", "url_path", &admin.url_path)?;
    let admin_first_name = required("web.admin", "first_name", &admin.first_name)?;
    let admin_last_name = required("web.admin", "last_name", &admin.last_name)?;
    let admin_email = required("web.admin", "email", &admin.email)?;
    let admin_secret = required("web", "admin_secret_id", &web.admin_secret_id)?;
    let mp_secret = required("web", "mp_secret_id", &web.mp_secret_id)?;
    let db_host = required("datastore", "host", &db.host)?;
    let db_name = required("datastore", "name", &db.name)?;
    let db_secret = required("datastore", "secret_id", &db.secret_id)?;
    let es_host = required("search", "host", &search.host)?;
    let es_secret = required("search", "secret_id", &search.secret_id)?;

    let mut env = ResolvedEnv::new();

    env.insert_literal("ADMIN_URL_PATH", admin_url_path)?;
    env.insert_literal("ADMIN_FIRSTNAME", admin_first_name)?;
    env.insert_literal("ADMIN_LASTNAME", admin_last_name)?;
    env.insert_literal("ADMIN_EMAIL", admin_email)?;
    env.insert_literal("DB_HOST", db_host)?;
    env.insert_literal("DB_NAME", db_name)?;
    env.insert_literal("ES_HOST", es_host)?;

    env.insert_secret(
        "ADMIN_USERNAME",
        field("web", "admin_secret_id", admin_secret, "username")?,
    )?;
    env.insert_secret(
        "ADMIN_PASSWORD",
        field("web", "admin_secret_id", admin_secret, "password")?,
    )?;
    env.insert_secret("DB_USERNAME", field("datastore", "secret_id", db_secret, "username")?)?;
    env.insert_secret("DB_PASSWORD", field("datastore", "secret_id", db_secret, "password")?)?;
    env.insert_secret("ES_USERNAME", field("search", "secret_id", es_secret, "username")?)?;
    env.insert_secret("ES_PASSWORD", field("search", "secret_id", es_secret, "password")?)?;
    env.insert_secret("MP_USERNAME", field("web", "mp_secret_id", mp_secret, "username")?)?;
    env.insert_secret("MP_PASSWORD", field("web", "mp_secret_id", mp_secret, "password")?)?;

    for (key, value) in &web.env {
        env.insert_literal(key, value)?;
    }

    tracing::debug!(
        vars = env.vars().len(),
        secrets = env.secrets().len(),
        "resolved build environment"
    );
    Ok(env)
}

fn field(
    component: &'static str,
    config_field: &'static str,
    secret_id: &str,
    name: &str,
) -> Result<SecretRef, ConfigError> {
    SecretRef::new(secret_id, name).map_err(|e| ConfigError::InvalidField {
        component,
        field: config_field,
        reason: e.to_string(),
    })
}
