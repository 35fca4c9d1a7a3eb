use std::sync::Mutex;

use rollout_build::{
    Action, BuildParameter, ExistingRepository, ImageTargetSpec, PipelineStageBuilder, SourceSpec,
    StageBuildError,
};
use rollout_core::{ConfigValue, Principal, ResolvedEnv, SecretAccess, SecretGrants, SecretRef};

#[derive(Debug, thiserror::Error)]
#[error("access denied")]
struct Denied;

/// Records every grant issued against it.
#[derive(Default)]
struct RecordingStore {
    grants: Mutex<Vec<(String, String)>>,
    deny: bool,
}

impl SecretAccess for RecordingStore {
    type Error = Denied;

    async fn grant_read(&self, secret_id: &str, principal: &Principal) -> Result<(), Denied> {
        if self.deny {
            return Err(Denied);
        }
        self.grants
            .lock()
            .unwrap()
            .push((secret_id.to_owned(), principal.to_string()));
        Ok(())
    }
}

fn scenario_env() -> ResolvedEnv {
    let mut env = ResolvedEnv::new();
    env.insert_literal("DB_HOST", "h").unwrap();
    env.insert_literal("DB_NAME", "n").unwrap();
    env.insert_secret("DB_USERNAME", SecretRef::parse("dbsec:username").unwrap())
        .unwrap();
    env
}

// ── End-to-end layout ──

#[tokio::test]
async fn source_then_build_with_secret_reference() {
    let grants = SecretGrants::new(RecordingStore::default());
    let mut builder = PipelineStageBuilder::new("shop-pipeline");

    let source = builder
        .build_source_stage(&SourceSpec::s3("b", "src.zip"))
        .unwrap();
    let build = builder
        .build_build_stage(
            &source.artifact,
            scenario_env(),
            &ImageTargetSpec::new("r"),
            &grants,
        )
        .await
        .unwrap();
    let stages = builder.finish().unwrap();

    let names: Vec<_> = stages.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Source", "Build"]);

    let action = stages[1].image_build().unwrap();
    assert_eq!(action.input, source.artifact);
    assert_eq!(action.env.len(), 3);
    assert_eq!(
        action.env.get("DB_USERNAME"),
        Some(ConfigValue::SecretField(
            SecretRef::parse("dbsec:username").unwrap()
        ))
    );
    assert_eq!(
        action.env.get("DB_HOST"),
        Some(ConfigValue::Literal("h".to_owned()))
    );

    assert_eq!(build.image_repo.name, "r");
    assert_eq!(build.image_repo.tag, "latest");
    assert_eq!(build.principal.as_str(), "shop-pipeline-build-role");
    assert_eq!(
        *grants.store().grants.lock().unwrap(),
        vec![("dbsec".to_owned(), "shop-pipeline-build-role".to_owned())]
    );
}

#[tokio::test]
async fn build_parameters_list_literals_then_references() {
    let grants = SecretGrants::new(RecordingStore::default());
    let mut builder = PipelineStageBuilder::new("shop-pipeline");
    let source = builder
        .build_source_stage(&SourceSpec::s3("b", "src.zip"))
        .unwrap();
    let build = builder
        .build_build_stage(
            &source.artifact,
            scenario_env(),
            &ImageTargetSpec::new("r"),
            &grants,
        )
        .await
        .unwrap();

    let parameters = build.stage.image_build().unwrap().parameters();
    assert_eq!(
        parameters,
        vec![
            BuildParameter::Literal {
                key: "DB_HOST".to_owned(),
                value: "h".to_owned()
            },
            BuildParameter::Literal {
                key: "DB_NAME".to_owned(),
                value: "n".to_owned()
            },
            BuildParameter::Secret {
                key: "DB_USERNAME".to_owned(),
                reference: "dbsec:username".to_owned()
            },
        ]
    );
}

#[test]
fn source_stage_exposes_storage_and_artifact() {
    let mut builder = PipelineStageBuilder::new("shop-pipeline");
    let source = builder
        .build_source_stage(&SourceSpec::s3("shop-src", "app.zip"))
        .unwrap();

    assert_eq!(source.storage.bucket, "shop-src");
    assert_eq!(source.storage.key, "app.zip");
    assert_eq!(source.artifact.name(), "SourceOutput");
    assert!(matches!(
        source.stage.actions.as_slice(),
        [Action::SourceFetch(_)]
    ));
}

#[test]
fn additional_source_stages_get_distinct_names() {
    let mut builder = PipelineStageBuilder::new("shop-pipeline");
    builder
        .build_source_stage(&SourceSpec::s3("b", "src.zip"))
        .unwrap();
    let second = builder
        .build_source_stage(&SourceSpec::s3("b", "theme.zip"))
        .unwrap();

    assert_eq!(second.stage.name, "Source2");
    assert_eq!(second.artifact.name(), "Source2Output");
}

// ── Source validation ──

#[test]
fn rejects_unsupported_source_type() {
    let mut builder = PipelineStageBuilder::new("p");
    let spec = SourceSpec {
        kind: "github".to_owned(),
        ..SourceSpec::s3("b", "src.zip")
    };

    let err = builder.build_source_stage(&spec).unwrap_err();
    assert!(matches!(err, StageBuildError::UnsupportedSource(_)));
    assert!(err.to_string().starts_with("source stage:"));
}

#[test]
fn rejects_empty_bucket_and_key() {
    let mut builder = PipelineStageBuilder::new("p");

    assert!(matches!(
        builder.build_source_stage(&SourceSpec::s3("", "src.zip")),
        Err(StageBuildError::MissingSourceField("bucket"))
    ));
    assert!(matches!(
        builder.build_source_stage(&SourceSpec::s3("b", " ")),
        Err(StageBuildError::MissingSourceField("key"))
    ));
    assert!(builder.stages().is_empty());
}

#[test]
fn rejects_non_zip_key() {
    let mut builder = PipelineStageBuilder::new("p");
    let err = builder
        .build_source_stage(&SourceSpec::s3("b", "src.tar.gz"))
        .unwrap_err();
    assert!(matches!(err, StageBuildError::NotZip(_)));
}

// ── Build validation ──

#[tokio::test]
async fn build_without_source_stage_is_rejected() {
    let grants = SecretGrants::new(RecordingStore::default());
    let mut other = PipelineStageBuilder::new("other");
    let foreign = other
        .build_source_stage(&SourceSpec::s3("b", "src.zip"))
        .unwrap()
        .artifact;

    let mut builder = PipelineStageBuilder::new("p");
    let err = builder
        .build_build_stage(&foreign, scenario_env(), &ImageTargetSpec::new("r"), &grants)
        .await
        .unwrap_err();

    assert!(matches!(err, StageBuildError::MissingSourceStage));
    assert!(err.to_string().starts_with("build stage:"));
    assert!(grants.store().grants.lock().unwrap().is_empty());
}

#[tokio::test]
async fn build_rejects_artifact_from_another_pipeline() {
    let grants = SecretGrants::new(RecordingStore::default());
    let mut other = PipelineStageBuilder::new("other");
    other
        .build_source_stage(&SourceSpec::s3("b", "src.zip"))
        .unwrap();
    let foreign = other
        .build_source_stage(&SourceSpec::s3("b", "more.zip"))
        .unwrap()
        .artifact;

    let mut builder = PipelineStageBuilder::new("p");
    builder
        .build_source_stage(&SourceSpec::s3("b", "src.zip"))
        .unwrap();
    let err = builder
        .build_build_stage(&foreign, scenario_env(), &ImageTargetSpec::new("r"), &grants)
        .await
        .unwrap_err();

    assert!(matches!(err, StageBuildError::UnknownArtifact(_)));
}

#[tokio::test]
async fn second_build_stage_is_rejected() {
    let grants = SecretGrants::new(RecordingStore::default());
    let mut builder = PipelineStageBuilder::new("p");
    let source = builder
        .build_source_stage(&SourceSpec::s3("b", "src.zip"))
        .unwrap();
    builder
        .build_build_stage(&source.artifact, scenario_env(), &ImageTargetSpec::new("r"), &grants)
        .await
        .unwrap();

    let err = builder
        .build_build_stage(&source.artifact, scenario_env(), &ImageTargetSpec::new("r"), &grants)
        .await
        .unwrap_err();
    assert!(matches!(err, StageBuildError::DuplicateBuildStage));

    let late = builder
        .build_source_stage(&SourceSpec::s3("b", "late.zip"))
        .unwrap_err();
    assert!(matches!(late, StageBuildError::SourceAfterBuild));
}

#[tokio::test]
async fn invalid_repository_name_fails_before_grants() {
    let grants = SecretGrants::new(RecordingStore::default());
    let mut builder = PipelineStageBuilder::new("p");
    let source = builder
        .build_source_stage(&SourceSpec::s3("b", "src.zip"))
        .unwrap();

    let err = builder
        .build_build_stage(
            &source.artifact,
            scenario_env(),
            &ImageTargetSpec::new("Shop Web"),
            &grants,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, StageBuildError::InvalidRepository { .. }));
    assert!(grants.store().grants.lock().unwrap().is_empty());
}

#[test]
fn repository_name_length_bounds() {
    let builder = PipelineStageBuilder::new("p");

    assert!(builder.check_image_target(&ImageTargetSpec::new("r")).is_ok());
    assert!(matches!(
        builder.check_image_target(&ImageTargetSpec::new("")),
        Err(StageBuildError::InvalidRepository { .. })
    ));
    assert!(matches!(
        builder.check_image_target(&ImageTargetSpec::new("r".repeat(257))),
        Err(StageBuildError::InvalidRepository { .. })
    ));
}

#[test]
fn immutable_existing_repository_is_rejected() {
    let builder = PipelineStageBuilder::new("p").with_existing_repository(ExistingRepository {
        name: "shop-web".to_owned(),
        immutable_tags: true,
    });

    let err = builder
        .check_image_target(&ImageTargetSpec::new("shop-web"))
        .unwrap_err();
    assert!(matches!(err, StageBuildError::ImmutableRepository { .. }));
    assert!(err.to_string().contains("immutable tags"));
}

#[test]
fn mutable_existing_repository_is_accepted() {
    let builder = PipelineStageBuilder::new("p").with_existing_repository(ExistingRepository {
        name: "shop-web".to_owned(),
        immutable_tags: false,
    });
    assert!(
        builder
            .check_image_target(&ImageTargetSpec::new("shop-web"))
            .is_ok()
    );
}

#[test]
fn empty_image_tag_is_rejected() {
    let builder = PipelineStageBuilder::new("p");
    let err = builder
        .check_image_target(&ImageTargetSpec::new("shop-web").with_tag(""))
        .unwrap_err();
    assert!(matches!(err, StageBuildError::MissingImageTag));
}

#[tokio::test]
async fn invalid_env_key_is_rejected() {
    let grants = SecretGrants::new(RecordingStore::default());
    let mut builder = PipelineStageBuilder::new("p");
    let source = builder
        .build_source_stage(&SourceSpec::s3("b", "src.zip"))
        .unwrap();
    let mut env = scenario_env();
    env.insert_literal("PHP-MEMORY", "2G").unwrap();

    let err = builder
        .build_build_stage(&source.artifact, env, &ImageTargetSpec::new("r"), &grants)
        .await
        .unwrap_err();
    assert!(matches!(err, StageBuildError::InvalidEnvKey(key) if key == "PHP-MEMORY"));
}

#[tokio::test]
async fn failed_grant_surfaces_as_build_stage_error() {
    let grants = SecretGrants::new(RecordingStore {
        deny: true,
        ..Default::default()
    });
    let mut builder = PipelineStageBuilder::new("p");
    let source = builder
        .build_source_stage(&SourceSpec::s3("b", "src.zip"))
        .unwrap();

    let err = builder
        .build_build_stage(&source.artifact, scenario_env(), &ImageTargetSpec::new("r"), &grants)
        .await
        .unwrap_err();
    assert!(matches!(err, StageBuildError::Grant(_)));
    assert!(builder.finish().is_err());
}

// ── Finish ──

#[test]
fn finish_requires_source_and_build() {
    assert!(matches!(
        PipelineStageBuilder::new("p").finish(),
        Err(StageBuildError::MissingSourceStage)
    ));

    let mut builder = PipelineStageBuilder::new("p");
    builder
        .build_source_stage(&SourceSpec::s3("b", "src.zip"))
        .unwrap();
    let err = builder.finish().unwrap_err();
    assert!(matches!(err, StageBuildError::MissingBuildStage));
    assert_eq!(err.to_string(), "pipeline: missing build stage");
}
