use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::aws::AwsError;
use crate::executor::{AwsExecutor, RealExecutor};
use crate::pipeline::PipelineDefinition;

/// AWS operations client, parameterized over the executor for testability.
pub struct AwsClient<E: AwsExecutor = RealExecutor> {
    executor: E,
    region: String,
}

impl AwsClient<RealExecutor> {
    pub fn new(region: impl Into<String>) -> Self {
        Self::with_executor(RealExecutor, region)
    }
}

impl<E: AwsExecutor> AwsClient<E> {
    pub fn with_executor(executor: E, region: impl Into<String>) -> Self {
        Self {
            executor,
            region: region.into(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    // ── Preflight ──

    pub async fn check_prerequisites(&self) -> Result<PreflightReport, PreflightError> {
        // 1. aws CLI available: "aws-cli/2.15.0 Python/3.11.6 Linux/6.1 exe/x86_64"
        let version = match self.executor.exec(&args(["--version"])).await {
            Ok(v) => v
                .split_whitespace()
                .next()
                .and_then(|tool| tool.strip_prefix("aws-cli/"))
                .unwrap_or(v.trim())
                .to_owned(),
            Err(e) => return Err(PreflightError::AwsNotInstalled { source: e }),
        };

        // 2. Credentials resolve to an account
        let identity: CallerIdentity = match self
            .call_json(self.regional(["sts", "get-caller-identity"]))
            .await
        {
            Ok(identity) => identity,
            Err(e) => return Err(PreflightError::NotAuthenticated { source: e }),
        };

        tracing::debug!(account = %identity.account, arn = %identity.arn, "aws identity");

        Ok(PreflightReport {
            cli_version: version,
            account_id: identity.account,
            caller_arn: identity.arn,
            region: self.region.clone(),
        })
    }

    // ── ECR ──

    /// Look up an image repository; `None` when it does not exist.
    pub async fn describe_repository(
        &self,
        name: &str,
    ) -> Result<Option<RepositoryInfo>, DeployError> {
        let found: Option<EcrRepositories> = absent(
            self.call_json(self.regional([
                "ecr",
                "describe-repositories",
                "--repository-names",
                name,
            ]))
            .await,
        )
        .map_err(failed("ecr describe-repositories"))?;

        Ok(found.and_then(|r| r.repositories.into_iter().next().map(EcrRepository::into_info)))
    }

    /// Ensure the ECR repository exists, creating it if needed.
    pub async fn ensure_image_repository(&self, name: &str) -> Result<RepositoryInfo, DeployError> {
        if let Some(existing) = self.describe_repository(name).await? {
            return Ok(existing);
        }

        let created: EcrRepositoryEnvelope = self
            .call_json(self.regional(["ecr", "create-repository", "--repository-name", name]))
            .await
            .map_err(failed("ecr create-repository"))?;

        tracing::info!(repository = %name, "image repository created");
        Ok(created.repository.into_info())
    }

    /// Delete an ECR repository and its images. Returns `false` if it was already gone.
    pub async fn delete_image_repository(&self, name: &str) -> Result<bool, DeployError> {
        let deleted = absent(
            self.executor
                .exec(&self.regional([
                    "ecr",
                    "delete-repository",
                    "--repository-name",
                    name,
                    "--force",
                ]))
                .await,
        )
        .map_err(failed("ecr delete-repository"))?;

        Ok(deleted.is_some())
    }

    // ── S3 ──

    /// Ensure the source bucket exists with versioning enabled, which the
    /// pipeline's S3 source requires. Returns `true` if it was created.
    pub async fn ensure_bucket(&self, bucket: &str) -> Result<bool, DeployError> {
        let exists = absent(
            self.executor
                .exec(&self.regional(["s3api", "head-bucket", "--bucket", bucket]))
                .await,
        )
        .map_err(failed("s3api head-bucket"))?
        .is_some();

        if exists {
            return Ok(false);
        }

        let constraint = format!("LocationConstraint={}", self.region);
        let mut create = self.regional(["s3api", "create-bucket", "--bucket", bucket]);
        // us-east-1 rejects an explicit location constraint
        if self.region != "us-east-1" {
            create.extend(args(["--create-bucket-configuration", &constraint]));
        }
        self.executor
            .exec(&create)
            .await
            .map_err(failed("s3api create-bucket"))?;

        self.executor
            .exec(&self.regional([
                "s3api",
                "put-bucket-versioning",
                "--bucket",
                bucket,
                "--versioning-configuration",
                "Status=Enabled",
            ]))
            .await
            .map_err(failed("s3api put-bucket-versioning"))?;

        tracing::info!(bucket = %bucket, "source bucket created");
        Ok(true)
    }

    pub async fn upload_object(
        &self,
        path: &Path,
        bucket: &str,
        key: &str,
    ) -> Result<(), DeployError> {
        let local = path
            .to_str()
            .ok_or_else(|| DeployError::InvalidPath(path.to_path_buf()))?;
        let target = format!("s3://{bucket}/{key}");

        self.executor
            .exec(&self.regional(["s3", "cp", local, &target]))
            .await
            .map_err(failed("s3 cp"))?;

        tracing::info!(target = %target, "object uploaded");
        Ok(())
    }

    /// Delete a bucket and everything in it. Returns `false` if it was already gone.
    pub async fn delete_bucket(&self, bucket: &str) -> Result<bool, DeployError> {
        let target = format!("s3://{bucket}");
        let deleted = absent(
            self.executor
                .exec(&self.regional(["s3", "rb", &target, "--force"]))
                .await,
        )
        .map_err(failed("s3 rb"))?;

        Ok(deleted.is_some())
    }

    // ── IAM ──

    /// Ensure a role assumable by `service_principal` exists and carries
    /// `policy` as its inline `rollout` policy. Returns the role ARN.
    pub async fn ensure_service_role(
        &self,
        role: &str,
        service_principal: &str,
        policy: &Value,
    ) -> Result<String, DeployError> {
        let existing: Option<IamRoleEnvelope> = absent(
            self.call_json(self.regional(["iam", "get-role", "--role-name", role]))
                .await,
        )
        .map_err(failed("iam get-role"))?;

        let arn = match existing {
            Some(found) => found.role.arn,
            None => {
                let trust = json!({
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Effect": "Allow",
                        "Principal": { "Service": service_principal },
                        "Action": "sts:AssumeRole",
                    }],
                })
                .to_string();
                let created: IamRoleEnvelope = self
                    .call_json(self.regional([
                        "iam",
                        "create-role",
                        "--role-name",
                        role,
                        "--assume-role-policy-document",
                        &trust,
                    ]))
                    .await
                    .map_err(failed("iam create-role"))?;
                tracing::info!(role = %role, "service role created");
                created.role.arn
            }
        };

        self.put_role_policy(role, ROLE_POLICY_NAME, policy)
            .await
            .map_err(failed("iam put-role-policy"))?;

        Ok(arn)
    }

    pub async fn put_role_policy(
        &self,
        role: &str,
        policy_name: &str,
        document: &Value,
    ) -> Result<(), AwsError> {
        let document = document.to_string();
        self.executor
            .exec(&self.regional([
                "iam",
                "put-role-policy",
                "--role-name",
                role,
                "--policy-name",
                policy_name,
                "--policy-document",
                &document,
            ]))
            .await?;
        Ok(())
    }

    /// Delete a role with all its inline policies. Returns `false` if it was already gone.
    pub async fn delete_role(&self, role: &str) -> Result<bool, DeployError> {
        let policies: Option<RolePolicies> = absent(
            self.call_json(self.regional(["iam", "list-role-policies", "--role-name", role]))
                .await,
        )
        .map_err(failed("iam list-role-policies"))?;

        let Some(policies) = policies else {
            return Ok(false);
        };

        for policy in &policies.policy_names {
            self.executor
                .exec(&self.regional([
                    "iam",
                    "delete-role-policy",
                    "--role-name",
                    role,
                    "--policy-name",
                    policy,
                ]))
                .await
                .map_err(failed("iam delete-role-policy"))?;
        }

        self.executor
            .exec(&self.regional(["iam", "delete-role", "--role-name", role]))
            .await
            .map_err(failed("iam delete-role"))?;
        Ok(true)
    }

    // ── Secrets Manager ──

    pub async fn secret_arn(&self, secret_id: &str) -> Result<String, SecretError> {
        let described: SecretDescription = self
            .call_json(self.regional([
                "secretsmanager",
                "describe-secret",
                "--secret-id",
                secret_id,
            ]))
            .await
            .map_err(|e| SecretError::Describe {
                secret_id: secret_id.to_owned(),
                source: e,
            })?;
        Ok(described.arn)
    }

    /// Create or overwrite a secret value.
    ///
    /// The value travels on stdin inside the request document, never in the
    /// process arguments.
    pub async fn set_secret(
        &self,
        secret_id: &str,
        value: &SecretString,
    ) -> Result<SecretWrite, SecretError> {
        let exists = absent(
            self.executor
                .exec(&self.regional([
                    "secretsmanager",
                    "describe-secret",
                    "--secret-id",
                    secret_id,
                ]))
                .await,
        )
        .map_err(|e| SecretError::Describe {
            secret_id: secret_id.to_owned(),
            source: e,
        })?
        .is_some();

        let (operation, request, outcome) = if exists {
            (
                "put-secret-value",
                json!({ "SecretId": secret_id, "SecretString": value.expose_secret() }),
                SecretWrite::Updated,
            )
        } else {
            (
                "create-secret",
                json!({ "Name": secret_id, "SecretString": value.expose_secret() }),
                SecretWrite::Created,
            )
        };

        self.executor
            .exec_with_stdin(
                &self.regional([
                    "secretsmanager",
                    operation,
                    "--cli-input-json",
                    STDIN_JSON,
                ]),
                request.to_string().as_bytes(),
            )
            .await
            .map_err(|e| SecretError::Write {
                secret_id: secret_id.to_owned(),
                source: e,
            })?;

        Ok(outcome)
    }

    /// Allow `role` to read one secret, through an inline policy named after it.
    pub async fn grant_secret_read(&self, secret_id: &str, role: &str) -> Result<(), SecretError> {
        let arn = self.secret_arn(secret_id).await?;
        let policy = json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Action": ["secretsmanager:GetSecretValue"],
                "Resource": arn,
            }],
        });

        self.put_role_policy(role, &secret_policy_name(secret_id), &policy)
            .await
            .map_err(|e| SecretError::GrantAccess {
                secret_id: secret_id.to_owned(),
                source: e,
            })?;

        tracing::info!(secret = %secret_id, role = %role, "secret read access granted");
        Ok(())
    }

    // ── CodeBuild ──

    pub async fn put_build_project(
        &self,
        spec: &BuildProjectSpec,
    ) -> Result<PutOutcome, DeployError> {
        let found: BuildProjects = self
            .call_json(self.regional(["codebuild", "batch-get-projects", "--names", &spec.name]))
            .await
            .map_err(failed("codebuild batch-get-projects"))?;

        let (operation, outcome) = if found.projects.is_empty() {
            ("create-project", PutOutcome::Created)
        } else {
            ("update-project", PutOutcome::Updated)
        };
        let input = spec.to_input_json().to_string();

        self.executor
            .exec(&self.regional(["codebuild", operation, "--cli-input-json", &input]))
            .await
            .map_err(failed("codebuild put-project"))?;

        tracing::info!(project = %spec.name, ?outcome, "build project saved");
        Ok(outcome)
    }

    /// Returns `false` if the project was already gone.
    pub async fn delete_build_project(&self, name: &str) -> Result<bool, DeployError> {
        let deleted = absent(
            self.executor
                .exec(&self.regional(["codebuild", "delete-project", "--name", name]))
                .await,
        )
        .map_err(failed("codebuild delete-project"))?;
        Ok(deleted.is_some())
    }

    // ── CodePipeline ──

    pub async fn put_pipeline(
        &self,
        definition: &PipelineDefinition,
    ) -> Result<PutOutcome, DeployError> {
        let exists = absent(
            self.executor
                .exec(&self.regional(["codepipeline", "get-pipeline", "--name", &definition.name]))
                .await,
        )
        .map_err(failed("codepipeline get-pipeline"))?
        .is_some();

        let (operation, outcome) = if exists {
            ("update-pipeline", PutOutcome::Updated)
        } else {
            ("create-pipeline", PutOutcome::Created)
        };
        let input = definition.to_input_json().to_string();

        self.executor
            .exec(&self.regional(["codepipeline", operation, "--cli-input-json", &input]))
            .await
            .map_err(failed("codepipeline put-pipeline"))?;

        tracing::info!(pipeline = %definition.name, ?outcome, "pipeline saved");
        Ok(outcome)
    }

    /// Start one pipeline execution and return its id.
    pub async fn start_pipeline_execution(&self, name: &str) -> Result<String, DeployError> {
        let started: PipelineExecution = self
            .call_json(self.regional(["codepipeline", "start-pipeline-execution", "--name", name]))
            .await
            .map_err(failed("codepipeline start-pipeline-execution"))?;

        tracing::info!(
            pipeline = %name,
            execution = %started.pipeline_execution_id,
            "pipeline execution started"
        );
        Ok(started.pipeline_execution_id)
    }

    /// Status of one execution (`InProgress`, `Succeeded`, `Failed`, ...).
    pub async fn pipeline_execution_status(
        &self,
        name: &str,
        execution_id: &str,
    ) -> Result<String, DeployError> {
        let execution: PipelineExecutionEnvelope = self
            .call_json(self.regional([
                "codepipeline",
                "get-pipeline-execution",
                "--pipeline-name",
                name,
                "--pipeline-execution-id",
                execution_id,
            ]))
            .await
            .map_err(failed("codepipeline get-pipeline-execution"))?;
        Ok(execution.pipeline_execution.status)
    }

    /// Latest execution status per stage; `None` when the pipeline does not exist.
    pub async fn pipeline_state(
        &self,
        name: &str,
    ) -> Result<Option<Vec<StageStatus>>, DeployError> {
        let state: Option<PipelineState> = absent(
            self.call_json(self.regional(["codepipeline", "get-pipeline-state", "--name", name]))
                .await,
        )
        .map_err(failed("codepipeline get-pipeline-state"))?;

        Ok(state.map(|s| {
            s.stage_states
                .into_iter()
                .map(|stage| StageStatus {
                    name: stage.stage_name,
                    status: stage.latest_execution.map(|e| e.status),
                })
                .collect()
        }))
    }

    /// Returns `false` if the pipeline was already gone.
    pub async fn delete_pipeline(&self, name: &str) -> Result<bool, DeployError> {
        let exists = absent(
            self.executor
                .exec(&self.regional(["codepipeline", "get-pipeline", "--name", name]))
                .await,
        )
        .map_err(failed("codepipeline get-pipeline"))?
        .is_some();
        if !exists {
            return Ok(false);
        }

        self.executor
            .exec(&self.regional(["codepipeline", "delete-pipeline", "--name", name]))
            .await
            .map_err(failed("codepipeline delete-pipeline"))?;
        Ok(true)
    }

    // ── App Runner ──

    pub async fn find_service(&self, name: &str) -> Result<Option<ServiceSummary>, DeployError> {
        let listed: ServiceList = self
            .call_json(self.regional(["apprunner", "list-services"]))
            .await
            .map_err(failed("apprunner list-services"))?;

        Ok(listed
            .service_summary_list
            .into_iter()
            .find(|s| s.service_name == name))
    }

    pub async fn describe_service(&self, arn: &str) -> Result<ServiceDescription, DeployError> {
        let described: ServiceEnvelope = self
            .call_json(self.regional(["apprunner", "describe-service", "--service-arn", arn]))
            .await
            .map_err(failed("apprunner describe-service"))?;
        Ok(described.service)
    }

    /// `input` is a complete `CreateService` request document.
    pub async fn create_service(&self, input: &Value) -> Result<ServiceDescription, DeployError> {
        let input = input.to_string();
        let created: ServiceEnvelope = self
            .call_json(self.regional(["apprunner", "create-service", "--cli-input-json", &input]))
            .await
            .map_err(failed("apprunner create-service"))?;
        Ok(created.service)
    }

    /// `input` is a complete `UpdateService` request document.
    pub async fn update_service(&self, input: &Value) -> Result<ServiceDescription, DeployError> {
        let input = input.to_string();
        let updated: ServiceEnvelope = self
            .call_json(self.regional(["apprunner", "update-service", "--cli-input-json", &input]))
            .await
            .map_err(failed("apprunner update-service"))?;
        Ok(updated.service)
    }

    pub async fn delete_service(&self, arn: &str) -> Result<(), DeployError> {
        self.executor
            .exec(&self.regional(["apprunner", "delete-service", "--service-arn", arn]))
            .await
            .map_err(failed("apprunner delete-service"))?;
        Ok(())
    }

    // ── Helpers ──

    /// Command arguments pinned to the client's region with JSON output.
    fn regional<const N: usize>(&self, a: [&str; N]) -> Vec<String> {
        let mut out = args(a);
        out.extend(args(["--region", &self.region, "--output", "json"]));
        out
    }

    async fn call_json<T: DeserializeOwned>(&self, args: Vec<String>) -> Result<T, AwsError> {
        let output = self.executor.exec(&args).await?;
        serde_json::from_str(&output).map_err(|e| AwsError::InvalidOutput {
            command: args.iter().take(2).cloned().collect::<Vec<_>>().join(" "),
            source: e,
        })
    }
}

const ROLE_POLICY_NAME: &str = "rollout";
const STDIN_JSON: &str = "file:///dev/stdin";

fn args<const N: usize>(a: [&str; N]) -> Vec<String> {
    a.iter().map(|s| (*s).to_owned()).collect()
}

/// Map a not-found failure to `None`.
fn absent<T>(result: Result<T, AwsError>) -> Result<Option<T>, AwsError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

fn failed(operation: &'static str) -> impl FnOnce(AwsError) -> DeployError {
    move |source| DeployError::Aws { operation, source }
}

/// IAM policy names allow `[A-Za-z0-9+=,.@_-]`; secret ids may contain `/`.
pub fn secret_policy_name(secret_id: &str) -> String {
    let sanitized: String = secret_id
        .chars()
        .map(|c| if c == '/' { '.' } else { c })
        .collect();
    format!("read-secret-{sanitized}")
}

// ── Request types ──

/// CodeBuild project backing the pipeline's build action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildProjectSpec {
    pub name: String,
    pub buildspec: String,
    pub image: String,
    pub compute_type: String,
    pub service_role_arn: String,
    /// Exposed to the build as `REPO_URI`
    pub repository_uri: String,
}

impl BuildProjectSpec {
    pub fn to_input_json(&self) -> Value {
        json!({
            "name": self.name,
            "source": { "type": "CODEPIPELINE", "buildspec": self.buildspec },
            "artifacts": { "type": "CODEPIPELINE" },
            "environment": {
                "type": "LINUX_CONTAINER",
                "image": self.image,
                "computeType": self.compute_type,
                "privilegedMode": true,
                "environmentVariables": [{
                    "name": rollout_build::buildspec::REPO_URI_VAR,
                    "value": self.repository_uri,
                    "type": "PLAINTEXT",
                }],
            },
            "serviceRole": self.service_role_arn,
        })
    }
}

// ── Response types ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightReport {
    pub cli_version: String,
    pub account_id: String,
    pub caller_arn: String,
    pub region: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretWrite {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryInfo {
    pub name: String,
    pub uri: String,
    pub arn: String,
    pub immutable_tags: bool,
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageStatus {
    pub name: String,
    /// `None` until the stage has run once
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceSummary {
    pub service_name: String,
    pub service_arn: String,
    pub service_url: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceDescription {
    pub service_arn: String,
    pub service_url: Option<String>,
    pub status: String,
    #[serde(default)]
    pub source_configuration: Option<ServiceSource>,
}

impl ServiceDescription {
    pub fn image_identifier(&self) -> Option<&str> {
        self.source_configuration
            .as_ref()
            .and_then(|s| s.image_repository.as_ref())
            .map(|r| r.image_identifier.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceSource {
    pub image_repository: Option<ServiceImage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceImage {
    pub image_identifier: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CallerIdentity {
    account: String,
    arn: String,
}

#[derive(Deserialize)]
struct EcrRepositories {
    repositories: Vec<EcrRepository>,
}

#[derive(Deserialize)]
struct EcrRepositoryEnvelope {
    repository: EcrRepository,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EcrRepository {
    repository_name: String,
    repository_uri: String,
    repository_arn: String,
    image_tag_mutability: Option<String>,
}

impl EcrRepository {
    fn into_info(self) -> RepositoryInfo {
        RepositoryInfo {
            immutable_tags: self.image_tag_mutability.as_deref() == Some("IMMUTABLE"),
            name: self.repository_name,
            uri: self.repository_uri,
            arn: self.repository_arn,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IamRoleEnvelope {
    role: IamRole,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IamRole {
    arn: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RolePolicies {
    policy_names: Vec<String>,
}

#[derive(Deserialize)]
struct SecretDescription {
    #[serde(rename = "ARN")]
    arn: String,
}

#[derive(Deserialize)]
struct BuildProjects {
    #[serde(default)]
    projects: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PipelineExecution {
    pipeline_execution_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PipelineExecutionEnvelope {
    pipeline_execution: PipelineExecutionStatus,
}

#[derive(Deserialize)]
struct PipelineExecutionStatus {
    status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PipelineState {
    #[serde(default)]
    stage_states: Vec<PipelineStageState>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PipelineStageState {
    stage_name: String,
    latest_execution: Option<PipelineStageExecution>,
}

#[derive(Deserialize)]
struct PipelineStageExecution {
    status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceList {
    #[serde(default)]
    service_summary_list: Vec<ServiceSummary>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceEnvelope {
    service: ServiceDescription,
}

// ── Error types ──

#[derive(Debug, thiserror::Error)]
pub enum PreflightError {
    #[error("aws CLI not installed, see https://docs.aws.amazon.com/cli/latest/userguide/getting-started-install.html")]
    AwsNotInstalled { source: AwsError },

    #[error("no usable AWS credentials, run: aws configure (or set AWS_PROFILE)")]
    NotAuthenticated { source: AwsError },
}

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("{operation} failed")]
    Aws {
        operation: &'static str,
        source: AwsError,
    },

    #[error("path is not valid UTF-8: {0}")]
    InvalidPath(PathBuf),

    #[error("service {service} entered status {status}")]
    ServiceFailed { service: String, status: String },

    #[error("service {service} still {status} after {attempts} checks")]
    Timeout {
        service: String,
        status: String,
        attempts: u32,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("failed to describe secret {secret_id}")]
    Describe { secret_id: String, source: AwsError },

    #[error("failed to write secret {secret_id}")]
    Write { secret_id: String, source: AwsError },

    #[error("failed to grant read access to secret {secret_id}")]
    GrantAccess { secret_id: String, source: AwsError },
}
