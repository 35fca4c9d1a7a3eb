use std::sync::Arc;

use rollout_core::{Principal, SecretAccess};

use crate::client::{AwsClient, SecretError};
use crate::executor::{AwsExecutor, RealExecutor};

/// Secrets Manager access policy backed by IAM inline role policies.
///
/// The principal is an IAM role name. Each secret gets its own policy on the
/// role, so re-granting overwrites rather than accumulates.
pub struct SecretsManager<E: AwsExecutor = RealExecutor> {
    client: Arc<AwsClient<E>>,
}

impl<E: AwsExecutor> SecretsManager<E> {
    pub fn new(client: Arc<AwsClient<E>>) -> Self {
        Self { client }
    }
}

impl<E: AwsExecutor> SecretAccess for SecretsManager<E> {
    type Error = SecretError;

    async fn grant_read(&self, secret_id: &str, principal: &Principal) -> Result<(), SecretError> {
        self.client
            .grant_secret_read(secret_id, principal.as_str())
            .await
    }
}
