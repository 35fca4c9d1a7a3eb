use rollout_core::PipelineBuildConfig;

use crate::stage::{BuildParameter, ImageBuild};

/// Project environment variable holding the image repository URI.
/// Set on the build project, not in the buildspec.
pub const REPO_URI_VAR: &str = "REPO_URI";

/// Renders the CodeBuild buildspec for an image build action.
///
/// Literal parameters land under `env.variables`, secret parameters under
/// `env.secrets-manager` as `<secretId>:<fieldName>`. Every key reaches
/// `docker build` as `--build-arg KEY`, which reads the value from the build
/// environment, so no value is ever part of a command line.
pub struct BuildspecGenerator<'a> {
    action: &'a ImageBuild,
    config: &'a PipelineBuildConfig,
}

impl<'a> BuildspecGenerator<'a> {
    pub fn new(action: &'a ImageBuild, config: &'a PipelineBuildConfig) -> Self {
        Self { action, config }
    }

    pub fn render(&self) -> String {
        let parameters = self.action.parameters();
        let mut out = String::from("version: 0.2\n");

        let variables: Vec<_> = parameters
            .iter()
            .filter_map(|p| match p {
                BuildParameter::Literal { key, value } => Some((key.as_str(), value.as_str())),
                BuildParameter::Secret { .. } => None,
            })
            .collect();
        let secrets: Vec<_> = parameters
            .iter()
            .filter_map(|p| match p {
                BuildParameter::Secret { key, reference } => {
                    Some((key.as_str(), reference.as_str()))
                }
                BuildParameter::Literal { .. } => None,
            })
            .collect();

        if !variables.is_empty() || !secrets.is_empty() {
            out.push_str("\nenv:\n");
            push_section(&mut out, "variables", &variables);
            push_section(&mut out, "secrets-manager", &secrets);
        }

        let image = format!("${REPO_URI_VAR}:{}", self.action.image.tag);
        let build_args: String = parameters
            .iter()
            .map(|p| format!(" --build-arg {}", p.key()))
            .collect();

        out.push_str("\nphases:\n");
        push_phase(
            &mut out,
            "pre_build",
            &format!(
                "aws ecr get-login-password --region $AWS_DEFAULT_REGION | docker login --username AWS --password-stdin ${{{REPO_URI_VAR}%%/*}}"
            ),
        );
        push_phase(
            &mut out,
            "build",
            &format!(
                "docker build -f {dockerfile}{build_args} -t {image} .",
                dockerfile = self.config.dockerfile,
            ),
        );
        push_phase(&mut out, "post_build", &format!("docker push {image}"));

        out
    }
}

fn push_section(out: &mut String, name: &str, pairs: &[(&str, &str)]) {
    if pairs.is_empty() {
        return;
    }
    out.push_str(&format!("  {name}:\n"));
    for (key, value) in pairs {
        out.push_str(&format!("    {key}: {}\n", quote(value)));
    }
}

fn push_phase(out: &mut String, phase: &str, command: &str) {
    out.push_str(&format!("  {phase}:\n    commands:\n      - {}\n", quote(command)));
}

/// JSON strings are valid YAML double-quoted scalars.
fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_owned()).to_string()
}
