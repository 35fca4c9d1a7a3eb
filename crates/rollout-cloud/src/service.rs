//! The long-running App Runner service the pipeline deploys to.
//!
//! A [`ServiceTarget`] is shared between the release wiring, which reads its
//! endpoint for `BASE_URL`, and the bootstrap handler, which points it at the
//! built image. The endpoint is assigned at creation and never changes;
//! image updates replace instances behind it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Value, json};

use crate::client::{AwsClient, DeployError, ServiceDescription};
use crate::executor::{AwsExecutor, RealExecutor};
use crate::retry::Backoff;

const RUNNING: &str = "RUNNING";
const OPERATION_IN_PROGRESS: &str = "OPERATION_IN_PROGRESS";
const FAILED_STATES: &[&str] = &["CREATE_FAILED", "DELETE_FAILED", "DELETED", "PAUSED"];
const PUBLIC_REGISTRY: &str = "public.ecr.aws/";

/// Creation spec of a [`ServiceTarget`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub image_ref: String,
    pub port: String,
    pub auto_deploy: bool,
    pub cpu: Option<String>,
    pub memory: Option<String>,
    /// Role App Runner assumes to pull from a private repository
    pub access_role_arn: Option<String>,
}

impl ServiceSpec {
    pub fn new(image_ref: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            image_ref: image_ref.into(),
            port: port.into(),
            auto_deploy: true,
            cpu: None,
            memory: None,
            access_role_arn: None,
        }
    }

    pub fn with_auto_deploy(mut self, auto_deploy: bool) -> Self {
        self.auto_deploy = auto_deploy;
        self
    }

    pub fn with_instance(mut self, cpu: Option<String>, memory: Option<String>) -> Self {
        self.cpu = cpu;
        self.memory = memory;
        self
    }

    pub fn with_access_role(mut self, arn: impl Into<String>) -> Self {
        self.access_role_arn = Some(arn.into());
        self
    }

    /// App Runner `SourceConfiguration` serving `image_ref`.
    ///
    /// Public images can neither auto-deploy nor take an access role.
    pub fn source_configuration(&self, image_ref: &str) -> Value {
        let public = image_ref.starts_with(PUBLIC_REGISTRY);
        let mut source = json!({
            "ImageRepository": {
                "ImageIdentifier": image_ref,
                "ImageRepositoryType": if public { "ECR_PUBLIC" } else { "ECR" },
                "ImageConfiguration": { "Port": self.port },
            },
            "AutoDeploymentsEnabled": self.auto_deploy && !public,
        });
        if let (false, Some(arn)) = (public, &self.access_role_arn) {
            source["AuthenticationConfiguration"] = json!({ "AccessRoleArn": arn });
        }
        source
    }

    fn create_input(&self, name: &str) -> Value {
        let mut input = json!({
            "ServiceName": name,
            "SourceConfiguration": self.source_configuration(&self.image_ref),
        });
        let mut instance = serde_json::Map::new();
        if let Some(cpu) = &self.cpu {
            instance.insert("Cpu".to_owned(), json!(cpu));
        }
        if let Some(memory) = &self.memory {
            instance.insert("Memory".to_owned(), json!(memory));
        }
        if !instance.is_empty() {
            input["InstanceConfiguration"] = Value::Object(instance);
        }
        input
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateAck {
    /// Already serving the requested image.
    Unchanged,
    /// A rolling replace to the new image has started.
    RolloutStarted,
}

#[derive(Debug)]
struct ServiceState {
    arn: String,
    endpoint: Option<String>,
    image_ref: String,
    status: String,
    in_flight: bool,
}

pub struct ServiceTarget<E: AwsExecutor = RealExecutor> {
    client: Arc<AwsClient<E>>,
    name: String,
    spec: ServiceSpec,
    state: Mutex<ServiceState>,
}

impl<E: AwsExecutor> ServiceTarget<E> {
    /// Attach to the service named `name`, creating it from `spec` if absent.
    pub async fn create(
        client: Arc<AwsClient<E>>,
        name: impl Into<String>,
        spec: ServiceSpec,
    ) -> Result<Self, DeployError> {
        let name = name.into();
        if let Some(existing) =
            Self::attach(Arc::clone(&client), name.clone(), spec.clone()).await?
        {
            return Ok(existing);
        }

        let created = client.create_service(&spec.create_input(&name)).await?;
        tracing::info!(service = %name, arn = %created.service_arn, "service created");
        Ok(Self::from_description(client, name, spec, created))
    }

    /// Attach to an existing service; `None` when there is no service named `name`.
    pub async fn attach(
        client: Arc<AwsClient<E>>,
        name: impl Into<String>,
        spec: ServiceSpec,
    ) -> Result<Option<Self>, DeployError> {
        let name = name.into();
        let Some(summary) = client.find_service(&name).await? else {
            return Ok(None);
        };

        let described = client.describe_service(&summary.service_arn).await?;
        tracing::debug!(
            service = %name,
            status = %described.status,
            "attached to existing service"
        );
        Ok(Some(Self::from_description(client, name, spec, described)))
    }

    fn from_description(
        client: Arc<AwsClient<E>>,
        name: String,
        spec: ServiceSpec,
        described: ServiceDescription,
    ) -> Self {
        let image_ref = described
            .image_identifier()
            .unwrap_or(&spec.image_ref)
            .to_owned();
        let endpoint = (described.status == RUNNING)
            .then(|| described.service_url.clone())
            .flatten();
        Self {
            client,
            name,
            spec,
            state: Mutex::new(ServiceState {
                arn: described.service_arn,
                endpoint,
                image_ref,
                status: described.status,
                in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &ServiceSpec {
        &self.spec
    }

    pub fn arn(&self) -> String {
        self.state().arn.clone()
    }

    pub fn image_ref(&self) -> String {
        self.state().image_ref.clone()
    }

    /// Last observed service status.
    pub fn status(&self) -> String {
        self.state().status.clone()
    }

    /// Public host name, available once the service has been seen running.
    pub fn endpoint(&self) -> Result<String, NotReadyError> {
        let state = self.state();
        state.endpoint.clone().ok_or_else(|| NotReadyError {
            service: self.name.clone(),
            status: state.status.clone(),
        })
    }

    /// Poll until the service is running and return its endpoint.
    pub async fn wait_until_ready(&self, poll: &Backoff) -> Result<String, DeployError> {
        let mut attempt = 1;
        loop {
            let described = self.refresh().await?;
            let ready = self.state().endpoint.clone();
            if let Some(endpoint) = ready {
                return Ok(endpoint);
            }
            if FAILED_STATES.contains(&described.status.as_str()) {
                return Err(DeployError::ServiceFailed {
                    service: self.name.clone(),
                    status: described.status,
                });
            }
            if attempt >= poll.max_attempts {
                return Err(DeployError::Timeout {
                    service: self.name.clone(),
                    status: described.status,
                    attempts: attempt,
                });
            }

            tracing::debug!(
                service = %self.name,
                status = %described.status,
                attempt,
                "waiting for service"
            );
            tokio::time::sleep(poll.delay_for_attempt(attempt)).await;
            attempt += 1;
        }
    }

    /// Re-read the service and record its status.
    pub async fn refresh(&self) -> Result<ServiceDescription, DeployError> {
        let arn = self.arn();
        let described = self.client.describe_service(&arn).await?;

        let mut state = self.state();
        state.status = described.status.clone();
        if described.status == RUNNING && state.endpoint.is_none() {
            state.endpoint = described.service_url.clone();
        }
        Ok(described)
    }

    /// Point the service at `new_ref`. Last write wins.
    ///
    /// At most one update is in flight: a concurrent call, or a service still
    /// applying a previous operation, yields [`UpdateError::Conflict`].
    pub async fn update_image(&self, new_ref: &str) -> Result<UpdateAck, UpdateError> {
        let arn = {
            let mut state = self.state();
            if state.image_ref == new_ref {
                return Ok(UpdateAck::Unchanged);
            }
            if state.in_flight {
                return Err(self.conflict());
            }
            state.in_flight = true;
            state.arn.clone()
        };
        let _in_flight = InFlight(&self.state);

        let current = self.client.describe_service(&arn).await?;
        self.state().status = current.status.clone();
        if current.status == OPERATION_IN_PROGRESS {
            return Err(self.conflict());
        }

        let input = json!({
            "ServiceArn": arn,
            "SourceConfiguration": self.spec.source_configuration(new_ref),
        });
        let updated = self.client.update_service(&input).await?;

        let mut state = self.state();
        tracing::info!(
            service = %self.name,
            from = %state.image_ref,
            to = %new_ref,
            "image update started"
        );
        state.image_ref = new_ref.to_owned();
        state.status = updated.status;
        Ok(UpdateAck::RolloutStarted)
    }

    /// [`update_image`](Self::update_image), retrying conflicts per `backoff`.
    pub async fn update_image_with_retry(
        &self,
        new_ref: &str,
        backoff: &Backoff,
    ) -> Result<UpdateAck, UpdateError> {
        let mut attempt = 1;
        loop {
            match self.update_image(new_ref).await {
                Err(UpdateError::Conflict { .. }) if attempt < backoff.max_attempts => {
                    let delay = backoff.delay_for_attempt(attempt);
                    tracing::debug!(
                        service = %self.name,
                        attempt,
                        ?delay,
                        "update conflict, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn conflict(&self) -> UpdateError {
        UpdateError::Conflict {
            service: self.name.clone(),
        }
    }

    fn state(&self) -> MutexGuard<'_, ServiceState> {
        lock(&self.state)
    }
}

fn lock(state: &Mutex<ServiceState>) -> MutexGuard<'_, ServiceState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the in-flight flag when an update ends, including by cancellation.
struct InFlight<'a>(&'a Mutex<ServiceState>);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock(self.0).in_flight = false;
    }
}

#[derive(Debug, thiserror::Error)]
#[error("service {service} has no endpoint yet (status {status})")]
pub struct NotReadyError {
    pub service: String,
    pub status: String,
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("service {service}: another update is in progress")]
    Conflict { service: String },

    #[error(transparent)]
    Deploy(#[from] DeployError),
}
