use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// rollout.toml configuration
///
/// Endpoints and secret ids of the datastore and search cluster come from the
/// infrastructure that provisioned them; rollout only consumes them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RolloutConfig {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub datastore: DatastoreConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name, used to derive pipeline, build project and service names
    #[serde(default)]
    pub name: String,
    /// AWS region (defaults to us-east-1)
    #[serde(default = "default_region")]
    pub region: String,
}

/// Connection details of the externally provisioned database cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatastoreConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub name: String,
    /// Secrets Manager id holding `username` and `password`
    #[serde(default)]
    pub secret_id: String,
}

/// Connection details of the externally provisioned search cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub host: String,
    /// Secrets Manager id holding `username` and `password`
    #[serde(default)]
    pub secret_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default)]
    pub admin: AdminConfig,
    /// Secrets Manager id holding the admin `username` and `password`
    #[serde(default)]
    pub admin_secret_id: String,
    /// Secrets Manager id holding the package platform `username` and `password`
    #[serde(default)]
    pub mp_secret_id: String,
    /// ECR repository receiving built images
    #[serde(default)]
    pub repo_name: String,
    /// Image the service starts from before the first build lands
    #[serde(default = "default_base_image")]
    pub base_image: String,
    /// Port the application listens on
    #[serde(default = "default_port")]
    pub port: String,
    /// Redeploy the service automatically when the image repository changes
    #[serde(default = "default_true")]
    pub auto_deploy: bool,
    /// Delete the image repository on `rollout destroy` (retained by default)
    #[serde(default)]
    pub delete_image_repo_with_app: bool,
    #[serde(default)]
    pub instance: InstanceConfig,
    /// Additional literal build-time environment variables
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default)]
    pub url_path: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
}

/// Compute sizing of the service, e.g. `cpu = "1 vCPU"`, `memory = "2 GB"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub cpu: Option<String>,
    pub memory: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub build: PipelineBuildConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source provider; only `s3` is supported
    #[serde(default = "default_source_kind")]
    pub kind: String,
    /// Source bucket (defaults to `<app>-source-<account>`)
    pub bucket: Option<String>,
    /// Object key of the source archive
    #[serde(default = "default_source_key")]
    pub key: String,
    /// Delete the source bucket on `rollout destroy` (retained by default)
    #[serde(default)]
    pub delete_with_app: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineBuildConfig {
    /// CodeBuild environment image
    #[serde(default = "default_build_image")]
    pub image: String,
    /// CodeBuild compute type
    #[serde(default = "default_compute_type")]
    pub compute_type: String,
    /// Dockerfile path inside the source archive
    #[serde(default = "default_dockerfile")]
    pub dockerfile: String,
    /// Tag pushed on every build
    #[serde(default = "default_image_tag")]
    pub tag: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub action: BootstrapAction,
}

/// What the one-shot bootstrap does once the pipeline exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BootstrapAction {
    /// Point the service at the built image and upload the seed source archive.
    #[default]
    Seed,
    /// Start one pipeline execution.
    StartPipeline,
}

/// Whether a resource survives `rollout destroy`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RemovalPolicy {
    #[default]
    Retain,
    Destroy,
}

impl RemovalPolicy {
    /// Destroy-on-teardown is opt-in.
    pub fn from_delete_with_app(delete_with_app: bool) -> Self {
        if delete_with_app {
            Self::Destroy
        } else {
            Self::Retain
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            region: default_region(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            admin: AdminConfig::default(),
            admin_secret_id: String::new(),
            mp_secret_id: String::new(),
            repo_name: String::new(),
            base_image: default_base_image(),
            port: default_port(),
            auto_deploy: true,
            delete_image_repo_with_app: false,
            instance: InstanceConfig::default(),
            env: BTreeMap::new(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: default_source_kind(),
            bucket: None,
            key: default_source_key(),
            delete_with_app: false,
        }
    }
}

impl Default for PipelineBuildConfig {
    fn default() -> Self {
        Self {
            image: default_build_image(),
            compute_type: default_compute_type(),
            dockerfile: default_dockerfile(),
            tag: default_image_tag(),
        }
    }
}

impl RolloutConfig {
    /// Load from rollout.toml at the given path, or return defaults if not found.
    pub fn load(project_dir: &std::path::Path) -> crate::Result<Self> {
        let config_path = project_dir.join("rollout.toml");
        if config_path.exists() {
            let content =
                std::fs::read_to_string(&config_path).map_err(|e| crate::Error::ConfigLoad {
                    path: config_path.clone(),
                    source: e,
                })?;
            toml::from_str(&content).map_err(|e| crate::Error::ConfigParse {
                path: config_path,
                source: e,
            })
        } else {
            Ok(Self::default())
        }
    }

    /// Application name, required for every derived resource name.
    pub fn app_name(&self) -> Result<&str, ConfigError> {
        required("app", "name", &self.app.name)
    }

    /// Image repository name, required for the build stage.
    pub fn repo_name(&self) -> Result<&str, ConfigError> {
        required("web", "repo_name", &self.web.repo_name)
    }
}

/// Returns the trimmed value, or [`ConfigError::MissingField`] when it is blank.
pub fn required<'a>(
    component: &'static str,
    field: &'static str,
    value: &'a str,
) -> Result<&'a str, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ConfigError::MissingField { component, field })
    } else {
        Ok(trimmed)
    }
}

fn default_region() -> String {
    "us-east-1".to_owned()
}

fn default_base_image() -> String {
    "public.ecr.aws/docker/library/php:7.4-apache".to_owned()
}

fn default_port() -> String {
    "80".to_owned()
}

fn default_true() -> bool {
    true
}

fn default_source_kind() -> String {
    "s3".to_owned()
}

fn default_source_key() -> String {
    "src.zip".to_owned()
}

fn default_build_image() -> String {
    "aws/codebuild/standard:5.0".to_owned()
}

fn default_compute_type() -> String {
    "BUILD_GENERAL1_SMALL".to_owned()
}

fn default_dockerfile() -> String {
    "Dockerfile".to_owned()
}

fn default_image_tag() -> String {
    "latest".to_owned()
}
