//! Release orchestration: validate, converge resources, wire the pipeline,
//! then hand the pipeline handle to the one-shot bootstrap trigger.
//!
//! ```text
//! rollout deploy
//!   1. Resolve      ── rollout.toml → ResolvedEnv (no AWS calls)
//!   2. Preflight    ── aws --version, sts get-caller-identity
//!   3. Validate     ── source spec, image target vs existing repository
//!   4. Converge     ── S3 bucket, ECR repository, IAM roles
//!   5. Service      ── App Runner create/attach, wait for endpoint → BASE_URL
//!   6. Build stage  ── secret read grants for the build role
//!   7. Project      ── CodeBuild project with rendered buildspec
//!   8. Pipeline     ── CodePipeline create/update (+ restart on update)
//!   9. Bootstrap    ── notify trigger: pipeline created → fire once
//! ```
//!
//! Steps 1 to 3 only read. Any error there aborts with nothing created.

use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rollout_build::{
    BuildspecGenerator, ExistingRepository, ImageRepoHandle, ImageTargetSpec,
    PipelineStageBuilder, SourceSpec, Stage, StageBuildError,
};
use rollout_core::{
    BootstrapAction, BootstrapController, BootstrapFireError, BootstrapHandler,
    BootstrapProperties, Completion, ConfigError, Principal, RemovalPolicy, ResolvedEnv,
    ResourceHandle, ResourceKind, RolloutConfig, SecretAccess, SecretGrants, TriggerRecord,
    TriggerState, TriggerStoreError, resolve,
};
use serde_json::{Value, json};

use crate::bootstrap::{PipelineStart, ReleaseBootstrap, SeedBootstrap};
use crate::client::{
    AwsClient, BuildProjectSpec, DeployError, PreflightError, PutOutcome, ServiceSummary,
    StageStatus,
};
use crate::executor::{AwsExecutor, RealExecutor};
use crate::pipeline::PipelineDefinition;
use crate::retry::Backoff;
use crate::secret::SecretsManager;
use crate::service::{ServiceSpec, ServiceTarget};

const BASE_URL: &str = "BASE_URL";
const ACCOUNT_PLACEHOLDER: &str = "<account-id>";
const SEED_ARCHIVE: &str = ".rollout/src.zip";

/// Names of every resource the release owns, derived from `[app] name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseNames {
    pub app: String,
    pub pipeline: String,
    pub service: String,
    pub build_project: String,
    pub build_role: String,
    pub pipeline_role: String,
    pub access_role: String,
    pub repository: String,
}

impl ReleaseNames {
    pub fn from_config(config: &RolloutConfig) -> Result<Self, ConfigError> {
        let app = config.app_name()?.to_owned();
        let repository = config.repo_name()?.to_owned();
        let pipeline = format!("{app}-pipeline");
        let stages = PipelineStageBuilder::new(pipeline.clone());

        Ok(Self {
            service: format!("{app}-web"),
            build_project: stages.build_project(),
            build_role: stages.build_principal().to_string(),
            pipeline_role: format!("{pipeline}-role"),
            access_role: format!("{app}-image-pull-role"),
            pipeline,
            repository,
            app,
        })
    }
}

/// What `deploy` would build, computed without touching AWS.
#[derive(Debug, Clone)]
pub struct ReleasePlan {
    pub names: ReleaseNames,
    pub source_bucket: String,
    pub stages: Vec<Stage>,
    /// Build environment, without the service-derived `BASE_URL`
    pub env: ResolvedEnv,
    /// Secret read grants the build role would receive
    pub grants: Vec<(String, Principal)>,
    pub bootstrap: BootstrapAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseOutputs {
    pub pipeline_name: String,
    pub service_endpoint: String,
    pub image_repo_uri: String,
    /// Bootstrap trigger state after this run
    pub bootstrap: TriggerState,
}

#[derive(Debug, Clone)]
pub struct ReleaseStatus {
    pub names: ReleaseNames,
    /// `None` when the pipeline does not exist
    pub pipeline: Option<Vec<StageStatus>>,
    pub service: Option<ServiceSummary>,
    pub trigger: Option<TriggerRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestroyReport {
    pub deleted: Vec<ResourceHandle>,
    pub retained: Vec<ResourceHandle>,
}

pub struct ReleaseOrchestrator<E: AwsExecutor = RealExecutor> {
    client: Arc<AwsClient<E>>,
    config: RolloutConfig,
    project_dir: PathBuf,
    poll: Backoff,
    retry: Backoff,
    build_poll: Backoff,
}

impl ReleaseOrchestrator<RealExecutor> {
    pub fn new(config: RolloutConfig, project_dir: impl Into<PathBuf>) -> Self {
        let client = Arc::new(AwsClient::new(config.app.region.clone()));
        Self::with_client(client, config, project_dir)
    }
}

impl<E: AwsExecutor> ReleaseOrchestrator<E> {
    pub fn with_client(
        client: Arc<AwsClient<E>>,
        config: RolloutConfig,
        project_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            config,
            project_dir: project_dir.into(),
            poll: Backoff::default(),
            retry: Backoff::exponential(
                std::time::Duration::from_secs(5),
                std::time::Duration::from_secs(60),
                8,
            ),
            build_poll: Backoff::fixed(std::time::Duration::from_secs(15), 120),
        }
    }

    /// Service status polling schedule.
    pub fn with_poll(mut self, poll: Backoff) -> Self {
        self.poll = poll;
        self
    }

    /// Retry schedule for conflicting service updates.
    pub fn with_retry(mut self, retry: Backoff) -> Self {
        self.retry = retry;
        self
    }

    /// Polling schedule while a bootstrap-started execution runs.
    pub fn with_build_poll(mut self, poll: Backoff) -> Self {
        self.build_poll = poll;
        self
    }

    pub fn config(&self) -> &RolloutConfig {
        &self.config
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    // ── Plan ──

    pub async fn plan(&self) -> Result<ReleasePlan, ReleaseError> {
        let env = resolve(&self.config)?;
        let names = ReleaseNames::from_config(&self.config)?;
        let bucket = self.source_bucket(&names, None);

        let mut builder = PipelineStageBuilder::new(names.pipeline.clone());
        let source = builder.build_source_stage(&self.source_spec(&bucket))?;
        let grants = SecretGrants::new(PlannedGrants);
        builder
            .build_build_stage(&source.artifact, env.clone(), &self.image_target(&names), &grants)
            .await?;
        let stages = builder.finish()?;

        Ok(ReleasePlan {
            names,
            source_bucket: bucket,
            stages,
            env,
            grants: grants.granted().await,
            bootstrap: self.config.bootstrap.action,
        })
    }

    // ── Deploy ──

    pub async fn deploy(&self, rearm: bool) -> Result<ReleaseOutputs, ReleaseError> {
        let mut env = resolve(&self.config)?;
        let names = ReleaseNames::from_config(&self.config)?;
        let preflight = self.client.check_prerequisites().await?;
        tracing::info!(
            account = %preflight.account_id,
            region = %preflight.region,
            "deploying {}",
            names.app
        );

        let bucket = self.source_bucket(&names, Some(&preflight.account_id));
        let mut builder = PipelineStageBuilder::new(names.pipeline.clone());
        let source = builder.build_source_stage(&self.source_spec(&bucket))?;
        let target = self.image_target(&names);
        if let Some(existing) = self.client.describe_repository(&names.repository).await? {
            builder = builder.with_existing_repository(ExistingRepository {
                name: existing.name,
                immutable_tags: existing.immutable_tags,
            });
        }
        builder.check_image_target(&target)?;

        // Nothing above has created anything.
        self.client.ensure_bucket(&bucket).await?;
        let repository = self.client.ensure_image_repository(&names.repository).await?;
        let build_role_arn = self
            .client
            .ensure_service_role(
                &names.build_role,
                "codebuild.amazonaws.com",
                &build_role_policy(&bucket, &repository.arn),
            )
            .await?;
        let pipeline_role_arn = self
            .client
            .ensure_service_role(
                &names.pipeline_role,
                "codepipeline.amazonaws.com",
                &pipeline_role_policy(&bucket),
            )
            .await?;
        let access_role_arn = self
            .client
            .ensure_service_role(
                &names.access_role,
                "build.apprunner.amazonaws.com",
                &image_pull_policy(&repository.arn),
            )
            .await?;

        let service = Arc::new(
            ServiceTarget::create(
                Arc::clone(&self.client),
                names.service.clone(),
                self.service_spec(access_role_arn),
            )
            .await?,
        );
        let endpoint = service.wait_until_ready(&self.poll).await?;
        env.insert_literal(BASE_URL, format!("https://{endpoint}"))?;

        let grants = SecretGrants::new(SecretsManager::new(Arc::clone(&self.client)));
        let build = builder
            .build_build_stage(&source.artifact, env, &target, &grants)
            .await?;
        let stages = builder.finish()?;
        let action = build
            .stage
            .image_build()
            .ok_or(StageBuildError::MissingBuildStage)?;

        self.client
            .put_build_project(&BuildProjectSpec {
                name: action.project.clone(),
                buildspec: BuildspecGenerator::new(action, &self.config.pipeline.build).render(),
                image: self.config.pipeline.build.image.clone(),
                compute_type: self.config.pipeline.build.compute_type.clone(),
                service_role_arn: build_role_arn,
                repository_uri: repository.uri.clone(),
            })
            .await?;

        let pipeline = ResourceHandle::pipeline(names.pipeline.clone());
        let mut trigger = self.open_trigger(rearm, &pipeline)?;

        let definition = PipelineDefinition::new(
            names.pipeline.clone(),
            pipeline_role_arn,
            bucket.clone(),
            stages,
        );
        match self.client.put_pipeline(&definition).await {
            Ok(outcome) => {
                if outcome == PutOutcome::Updated && definition.restart_execution_on_update {
                    self.client
                        .start_pipeline_execution(&definition.name)
                        .await?;
                }
                // Registered after the put: an already armed record fires at once.
                if let Trigger::Open(controller) = &mut trigger {
                    controller.notify(Completion::Created(pipeline)).await?;
                    let handler =
                        self.bootstrap_handler(&service, &build.image_repo, &repository.uri);
                    let properties =
                        self.bootstrap_properties(&names, &service, &repository.uri, &bucket);
                    controller.fire(handler, properties).await?;
                }
            }
            Err(e) => {
                if let Trigger::Open(controller) = &mut trigger {
                    let failed = Completion::CreateFailed {
                        resource: pipeline,
                        reason: e.to_string(),
                    };
                    if let Err(trigger_err) = controller.notify(failed).await {
                        tracing::warn!(error = %trigger_err, "bootstrap trigger marked failed");
                    }
                }
                return Err(e.into());
            }
        }

        Ok(ReleaseOutputs {
            pipeline_name: definition.name,
            service_endpoint: endpoint,
            image_repo_uri: repository.uri,
            bootstrap: trigger.state(),
        })
    }

    // ── Bootstrap ──

    /// Run the bootstrap trigger against resources an earlier deploy created.
    pub async fn bootstrap(&self, rearm: bool) -> Result<TriggerState, ReleaseError> {
        let names = ReleaseNames::from_config(&self.config)?;
        let preflight = self.client.check_prerequisites().await?;
        let bucket = self.source_bucket(&names, Some(&preflight.account_id));

        let repository = self
            .client
            .describe_repository(&names.repository)
            .await?
            .ok_or_else(|| {
                ReleaseError::Missing(ResourceHandle::new(
                    ResourceKind::ImageRepository,
                    names.repository.clone(),
                ))
            })?;
        let pipeline = ResourceHandle::pipeline(names.pipeline.clone());
        if self.client.pipeline_state(&names.pipeline).await?.is_none() {
            return Err(ReleaseError::Missing(pipeline));
        }
        let access_role_arn = self
            .client
            .ensure_service_role(
                &names.access_role,
                "build.apprunner.amazonaws.com",
                &image_pull_policy(&repository.arn),
            )
            .await?;
        let service = ServiceTarget::attach(
            Arc::clone(&self.client),
            names.service.clone(),
            self.service_spec(access_role_arn),
        )
        .await?
        .ok_or_else(|| {
            ReleaseError::Missing(ResourceHandle::new(
                ResourceKind::Service,
                names.service.clone(),
            ))
        })?;
        let service = Arc::new(service);

        let mut trigger = self.open_trigger(rearm, &pipeline)?;
        if let Trigger::Open(controller) = &mut trigger {
            controller.notify(Completion::Created(pipeline)).await?;
            let image = self.image_repo(&names);
            let handler = self.bootstrap_handler(&service, &image, &repository.uri);
            let properties = self.bootstrap_properties(&names, &service, &repository.uri, &bucket);
            controller.fire(handler, properties).await?;
        }
        Ok(trigger.state())
    }

    // ── Status ──

    pub async fn status(&self) -> Result<ReleaseStatus, ReleaseError> {
        let names = ReleaseNames::from_config(&self.config)?;
        let pipeline = self.client.pipeline_state(&names.pipeline).await?;
        let service = self.client.find_service(&names.service).await?;
        let trigger = TriggerRecord::load(&self.project_dir)?;

        Ok(ReleaseStatus {
            names,
            pipeline,
            service,
            trigger,
        })
    }

    // ── Destroy ──

    /// Delete the pipeline, build project, service and roles. The image
    /// repository and source bucket go only when their removal flag opts in.
    pub async fn destroy(&self) -> Result<DestroyReport, ReleaseError> {
        let names = ReleaseNames::from_config(&self.config)?;
        let mut report = DestroyReport::default();

        let pipeline = ResourceHandle::pipeline(names.pipeline.clone());
        if self.client.delete_pipeline(&names.pipeline).await? {
            report.deleted.push(pipeline);
        }

        if self.client.delete_build_project(&names.build_project).await? {
            report.deleted.push(ResourceHandle::new(
                ResourceKind::BuildProject,
                names.build_project.clone(),
            ));
        }

        if let Some(service) = self.client.find_service(&names.service).await? {
            self.client.delete_service(&service.service_arn).await?;
            report.deleted.push(ResourceHandle::new(
                ResourceKind::Service,
                names.service.clone(),
            ));
        }

        for role in [&names.build_role, &names.pipeline_role, &names.access_role] {
            if self.client.delete_role(role).await? {
                tracing::info!(role = %role, "role deleted");
            }
        }

        let repository =
            ResourceHandle::new(ResourceKind::ImageRepository, names.repository.clone());
        match RemovalPolicy::from_delete_with_app(self.config.web.delete_image_repo_with_app) {
            RemovalPolicy::Destroy => {
                if self.client.delete_image_repository(&names.repository).await? {
                    report.deleted.push(repository);
                }
            }
            RemovalPolicy::Retain => report.retained.push(repository),
        }

        match RemovalPolicy::from_delete_with_app(self.config.pipeline.source.delete_with_app) {
            RemovalPolicy::Destroy => {
                let account = match &self.config.pipeline.source.bucket {
                    Some(_) => None,
                    None => Some(self.client.check_prerequisites().await?.account_id),
                };
                let bucket = self.source_bucket(&names, account.as_deref());
                if self.client.delete_bucket(&bucket).await? {
                    report
                        .deleted
                        .push(ResourceHandle::new(ResourceKind::SourceBucket, bucket));
                }
            }
            RemovalPolicy::Retain => report.retained.push(ResourceHandle::new(
                ResourceKind::SourceBucket,
                self.source_bucket(&names, None),
            )),
        }

        let state = TriggerRecord::path(&self.project_dir);
        if state.exists() {
            std::fs::remove_file(&state).map_err(|e| ReleaseError::StateCleanup {
                path: state.clone(),
                source: e,
            })?;
        }

        Ok(report)
    }

    // ── Helpers ──

    /// Configured bucket, or `<app>-source-<account>`.
    fn source_bucket(&self, names: &ReleaseNames, account: Option<&str>) -> String {
        match &self.config.pipeline.source.bucket {
            Some(bucket) => bucket.clone(),
            None => format!(
                "{}-source-{}",
                names.app,
                account.unwrap_or(ACCOUNT_PLACEHOLDER)
            ),
        }
    }

    fn source_spec(&self, bucket: &str) -> SourceSpec {
        SourceSpec {
            kind: self.config.pipeline.source.kind.clone(),
            bucket: bucket.to_owned(),
            key: self.config.pipeline.source.key.clone(),
        }
    }

    fn image_target(&self, names: &ReleaseNames) -> ImageTargetSpec {
        ImageTargetSpec::new(names.repository.clone())
            .with_tag(self.config.pipeline.build.tag.clone())
    }

    fn image_repo(&self, names: &ReleaseNames) -> ImageRepoHandle {
        ImageRepoHandle {
            name: names.repository.clone(),
            tag: self.config.pipeline.build.tag.clone(),
        }
    }

    fn service_spec(&self, access_role_arn: String) -> ServiceSpec {
        let web = &self.config.web;
        ServiceSpec::new(web.base_image.clone(), web.port.clone())
            .with_auto_deploy(web.auto_deploy)
            .with_instance(web.instance.cpu.clone(), web.instance.memory.clone())
            .with_access_role(access_role_arn)
    }

    fn open_trigger(
        &self,
        rearm: bool,
        pipeline: &ResourceHandle,
    ) -> Result<Trigger<ReleaseBootstrap<E>>, ReleaseError> {
        let record = match TriggerRecord::load(&self.project_dir)? {
            Some(record) if rearm => record.rearm(),
            Some(record) => record,
            None => TriggerRecord::new(),
        };

        if record.fired() || record.state().is_terminal() {
            tracing::info!(
                generation = record.generation(),
                state = %record.state(),
                "bootstrap already ran; pass --rearm to run it again"
            );
            return Ok(Trigger::Done(record));
        }

        let mut controller =
            BootstrapController::new(record).with_state_dir(self.project_dir.clone());
        if controller.record().dependencies().is_none() {
            controller.arm([pipeline.clone()])?;
        }
        Ok(Trigger::Open(controller))
    }

    fn bootstrap_handler(
        &self,
        service: &Arc<ServiceTarget<E>>,
        image: &ImageRepoHandle,
        repository_uri: &str,
    ) -> ReleaseBootstrap<E> {
        match self.config.bootstrap.action {
            BootstrapAction::Seed => ReleaseBootstrap::Seed(
                SeedBootstrap::new(
                    Arc::clone(&self.client),
                    Arc::clone(service),
                    image.clone(),
                    self.project_dir.clone(),
                    self.project_dir.join(SEED_ARCHIVE),
                )
                .with_retry(self.retry),
            ),
            BootstrapAction::StartPipeline => ReleaseBootstrap::StartPipeline(
                PipelineStart::new(
                    Arc::clone(&self.client),
                    Arc::clone(service),
                    image.image_ref(repository_uri),
                )
                .with_poll(self.build_poll)
                .with_retry(self.retry),
            ),
        }
    }

    fn bootstrap_properties(
        &self,
        names: &ReleaseNames,
        service: &ServiceTarget<E>,
        image_repo: &str,
        bucket: &str,
    ) -> BootstrapProperties {
        match self.config.bootstrap.action {
            BootstrapAction::Seed => BootstrapProperties::Seed {
                service_arn: service.arn(),
                image_repo: image_repo.to_owned(),
                src_bucket: bucket.to_owned(),
                src_key: self.config.pipeline.source.key.clone(),
            },
            BootstrapAction::StartPipeline => BootstrapProperties::StartPipeline {
                pipeline_name: names.pipeline.clone(),
            },
        }
    }
}

/// The bootstrap trigger for this run: open, or already spent.
enum Trigger<H> {
    Open(BootstrapController<H>),
    Done(TriggerRecord),
}

impl<H: BootstrapHandler> Trigger<H> {
    fn state(&self) -> TriggerState {
        match self {
            Self::Open(controller) => controller.record().state().clone(),
            Self::Done(record) => record.state().clone(),
        }
    }
}

/// Grant store for `plan`: records grants without issuing them.
struct PlannedGrants;

impl SecretAccess for PlannedGrants {
    type Error = Infallible;

    async fn grant_read(&self, _secret_id: &str, _principal: &Principal) -> Result<(), Infallible> {
        Ok(())
    }
}

// ── Role policies ──

fn build_role_policy(bucket: &str, repository_arn: &str) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Action": ["logs:CreateLogGroup", "logs:CreateLogStream", "logs:PutLogEvents"],
                "Resource": "*",
            },
            {
                "Effect": "Allow",
                "Action": ["s3:GetObject", "s3:GetObjectVersion", "s3:PutObject"],
                "Resource": format!("arn:aws:s3:::{bucket}/*"),
            },
            {
                "Effect": "Allow",
                "Action": ["ecr:GetAuthorizationToken"],
                "Resource": "*",
            },
            {
                "Effect": "Allow",
                "Action": [
                    "ecr:BatchCheckLayerAvailability",
                    "ecr:BatchGetImage",
                    "ecr:CompleteLayerUpload",
                    "ecr:GetDownloadUrlForLayer",
                    "ecr:InitiateLayerUpload",
                    "ecr:PutImage",
                    "ecr:UploadLayerPart",
                ],
                "Resource": repository_arn,
            },
        ],
    })
}

fn pipeline_role_policy(bucket: &str) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Action": [
                    "s3:GetBucketVersioning",
                    "s3:GetObject",
                    "s3:GetObjectVersion",
                    "s3:PutObject",
                ],
                "Resource": [format!("arn:aws:s3:::{bucket}"), format!("arn:aws:s3:::{bucket}/*")],
            },
            {
                "Effect": "Allow",
                "Action": ["codebuild:BatchGetBuilds", "codebuild:StartBuild"],
                "Resource": "*",
            },
        ],
    })
}

fn image_pull_policy(repository_arn: &str) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Action": ["ecr:GetAuthorizationToken"],
                "Resource": "*",
            },
            {
                "Effect": "Allow",
                "Action": [
                    "ecr:BatchCheckLayerAvailability",
                    "ecr:BatchGetImage",
                    "ecr:DescribeImages",
                    "ecr:GetDownloadUrlForLayer",
                ],
                "Resource": repository_arn,
            },
        ],
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ReleaseError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Preflight(#[from] PreflightError),

    #[error(transparent)]
    Stage(#[from] StageBuildError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapFireError),

    #[error(transparent)]
    Trigger(#[from] TriggerStoreError),

    #[error("{0} does not exist, run `rollout deploy` first")]
    Missing(ResourceHandle),

    #[error("failed to remove {path}")]
    StateCleanup {
        path: PathBuf,
        source: std::io::Error,
    },
}
