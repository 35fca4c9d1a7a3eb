//! References to fields of secrets held by an external secret store.
//!
//! A [`SecretRef`] names a field (`dbsec:username`); it never holds the value.
//! The build executor resolves the reference at build time with its own
//! principal, which is why the only capability exposed here is granting that
//! principal read access.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// A `<secretId>:<fieldName>` pointer into the secret store.
///
/// # Examples
///
/// ```
/// use rollout_core::SecretRef;
///
/// let secret = SecretRef::new("prod/db", "password").unwrap();
/// assert_eq!(secret.reference(), "prod/db:password");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SecretRef {
    secret_id: String,
    field: String,
}

impl SecretRef {
    pub fn new(
        secret_id: impl Into<String>,
        field: impl Into<String>,
    ) -> Result<Self, SecretRefError> {
        let secret_id = secret_id.into();
        let field = field.into();

        if secret_id.is_empty() {
            return Err(SecretRefError::EmptySecretId);
        }
        if !secret_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '-'))
        {
            return Err(SecretRefError::InvalidSecretId(secret_id));
        }
        if field.is_empty() {
            return Err(SecretRefError::EmptyField);
        }
        if !field.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(SecretRefError::InvalidField(field));
        }

        Ok(Self { secret_id, field })
    }

    /// Parse a `<secretId>:<fieldName>` reference string.
    pub fn parse(reference: &str) -> Result<Self, SecretRefError> {
        let (secret_id, field) = reference
            .split_once(':')
            .ok_or_else(|| SecretRefError::MissingSeparator(reference.to_owned()))?;
        Self::new(secret_id, field)
    }

    pub fn secret_id(&self) -> &str {
        &self.secret_id
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// The identifier handed to the build executor.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.secret_id, self.field)
    }

    /// Grant `principal` read access to the secret this field lives in.
    ///
    /// Granting twice is a no-op.
    pub async fn grant_read<S: SecretAccess>(
        &self,
        grants: &SecretGrants<S>,
        principal: &Principal,
    ) -> Result<GrantOutcome, GrantError> {
        grants.grant(&self.secret_id, principal).await
    }
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.secret_id, self.field)
    }
}

impl FromStr for SecretRef {
    type Err = SecretRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SecretRef {
    type Error = SecretRefError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SecretRef> for String {
    fn from(value: SecretRef) -> Self {
        value.reference()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecretRefError {
    #[error("secret id is empty")]
    EmptySecretId,

    #[error("secret id {0:?} may only contain letters, digits, '/', '_' and '-'")]
    InvalidSecretId(String),

    #[error("secret field is empty")]
    EmptyField,

    #[error("secret field {0:?} may only contain letters")]
    InvalidField(String),

    #[error("secret reference {0:?} is not of the form <secretId>:<fieldName>")]
    MissingSeparator(String),
}

/// The execution identity a grant is issued to (an IAM role name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Principal(String);

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Access-policy side of the external secret store.
#[allow(async_fn_in_trait)]
pub trait SecretAccess: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Allow `principal` to read `secret_id`.
    async fn grant_read(&self, secret_id: &str, principal: &Principal) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    Granted,
    AlreadyGranted,
}

#[derive(Debug, thiserror::Error)]
#[error("failed to grant {principal} read access to secret {secret_id}")]
pub struct GrantError {
    pub secret_id: String,
    pub principal: Principal,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

type GrantKey = (String, Principal);

/// Set-union ledger of read grants in front of a [`SecretAccess`] store.
///
/// Each `(secret, principal)` pair reaches the store at most once, including
/// when several stage builders grant concurrently. Callers for one pair queue
/// on that pair's slot; other pairs proceed in parallel. A failed store call
/// leaves the pair ungranted so a later attempt can retry it.
pub struct SecretGrants<S> {
    store: S,
    slots: Mutex<HashMap<GrantKey, Arc<Mutex<bool>>>>,
}

impl<S: SecretAccess> SecretGrants<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn grant(
        &self,
        secret_id: &str,
        principal: &Principal,
    ) -> Result<GrantOutcome, GrantError> {
        let key = (secret_id.to_owned(), principal.clone());
        let slot = Arc::clone(self.slots.lock().await.entry(key).or_default());

        // Held across the store call: a second caller for the same pair must
        // observe the first caller's result.
        let mut granted = slot.lock().await;
        if *granted {
            tracing::debug!(secret_id, %principal, "read grant already present");
            return Ok(GrantOutcome::AlreadyGranted);
        }

        self.store
            .grant_read(secret_id, principal)
            .await
            .map_err(|e| GrantError {
                secret_id: secret_id.to_owned(),
                principal: principal.clone(),
                source: Box::new(e),
            })?;

        tracing::info!(secret_id, %principal, "granted secret read access");
        *granted = true;
        Ok(GrantOutcome::Granted)
    }

    /// Snapshot of every grant issued so far, sorted.
    pub async fn granted(&self) -> Vec<(String, Principal)> {
        let slots: Vec<_> = self
            .slots
            .lock()
            .await
            .iter()
            .map(|(key, slot)| (key.clone(), Arc::clone(slot)))
            .collect();

        let mut all = Vec::new();
        for (key, slot) in slots {
            if *slot.lock().await {
                all.push(key);
            }
        }
        all.sort();
        all
    }
}
