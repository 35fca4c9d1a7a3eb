use rollout_build::{Action, Stage};
use serde_json::{Value, json};

/// A CodePipeline pipeline assembled from built stages.
#[derive(Debug, Clone)]
pub struct PipelineDefinition {
    pub name: String,
    pub role_arn: String,
    /// Bucket holding the artifacts passed between stages
    pub artifact_bucket: String,
    pub stages: Vec<Stage>,
    /// Start a fresh execution after an existing definition is updated, so no
    /// run keeps going on the stale one.
    pub restart_execution_on_update: bool,
}

impl PipelineDefinition {
    pub fn new(
        name: impl Into<String>,
        role_arn: impl Into<String>,
        artifact_bucket: impl Into<String>,
        stages: Vec<Stage>,
    ) -> Self {
        Self {
            name: name.into(),
            role_arn: role_arn.into(),
            artifact_bucket: artifact_bucket.into(),
            stages,
            restart_execution_on_update: true,
        }
    }

    /// `create-pipeline` / `update-pipeline` request document.
    pub fn to_input_json(&self) -> Value {
        let stages: Vec<Value> = self.stages.iter().map(stage_json).collect();
        json!({
            "pipeline": {
                "name": self.name,
                "roleArn": self.role_arn,
                "artifactStore": { "type": "S3", "location": self.artifact_bucket },
                "stages": stages,
            }
        })
    }
}

fn stage_json(stage: &Stage) -> Value {
    let actions: Vec<Value> = stage
        .actions
        .iter()
        .map(|action| match action {
            Action::SourceFetch(fetch) => json!({
                "name": fetch.name,
                "actionTypeId": {
                    "category": "Source",
                    "owner": "AWS",
                    "provider": "S3",
                    "version": "1",
                },
                "configuration": {
                    "S3Bucket": fetch.storage.bucket,
                    "S3ObjectKey": fetch.storage.key,
                    "PollForSourceChanges": "true",
                },
                "outputArtifacts": [{ "name": fetch.output.name() }],
                "runOrder": 1,
            }),
            Action::ImageBuild(build) => json!({
                "name": build.name,
                "actionTypeId": {
                    "category": "Build",
                    "owner": "AWS",
                    "provider": "CodeBuild",
                    "version": "1",
                },
                "configuration": { "ProjectName": build.project },
                "inputArtifacts": [{ "name": build.input.name() }],
                "runOrder": 1,
            }),
        })
        .collect();

    json!({ "name": stage.name, "actions": actions })
}
