use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rollout_core::{
    BootstrapController, BootstrapFireError, BootstrapHandler, BootstrapProperties, Completion,
    FireStatus, Notified, ResourceHandle, ResourceKind, TriggerRecord, TriggerState,
};
use tempfile::TempDir;

#[derive(Debug, thiserror::Error)]
#[error("upload failed")]
struct UploadFailed;

/// Records every invocation; fails when `fail` is set.
#[derive(Clone, Default)]
struct RecordingHandler {
    calls: Arc<AtomicUsize>,
    seen: Arc<std::sync::Mutex<Vec<BootstrapProperties>>>,
    fail: bool,
}

impl BootstrapHandler for RecordingHandler {
    type Error = UploadFailed;

    async fn handle(&self, properties: &BootstrapProperties) -> Result<(), UploadFailed> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(properties.clone());
        if self.fail { Err(UploadFailed) } else { Ok(()) }
    }
}

fn seed_properties() -> BootstrapProperties {
    BootstrapProperties::Seed {
        service_arn: "arn:aws:apprunner:us-east-1:123:service/shop/abc".to_owned(),
        image_repo: "123.dkr.ecr.us-east-1.amazonaws.com/shop-web".to_owned(),
        src_bucket: "shop-src".to_owned(),
        src_key: "src.zip".to_owned(),
    }
}

fn pipeline() -> ResourceHandle {
    ResourceHandle::pipeline("shop-pipeline")
}

#[tokio::test]
async fn fires_once_when_pipeline_is_created() {
    let handler = RecordingHandler::default();
    let mut controller = BootstrapController::new(TriggerRecord::new());

    controller.arm([pipeline()]).unwrap();
    let status = controller
        .fire(handler.clone(), seed_properties())
        .await
        .unwrap();
    assert_eq!(status, FireStatus::Deferred { remaining: 1 });
    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);

    let first = controller
        .notify(Completion::Created(pipeline()))
        .await
        .unwrap();
    assert_eq!(first, Notified::Fired);

    // A duplicate creation event must not fire again.
    let second = controller
        .notify(Completion::Created(pipeline()))
        .await
        .unwrap();
    assert_eq!(second, Notified::AlreadyFired);

    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    assert_eq!(handler.seen.lock().unwrap()[0], seed_properties());
    assert_eq!(controller.record().state(), &TriggerState::Succeeded);
    assert!(controller.record().fired());
}

#[tokio::test]
async fn waits_for_every_dependency() {
    let handler = RecordingHandler::default();
    let service = ResourceHandle::new(ResourceKind::Service, "shop");
    let mut controller = BootstrapController::new(TriggerRecord::new());

    controller.arm([pipeline(), service.clone()]).unwrap();
    controller
        .fire(handler.clone(), seed_properties())
        .await
        .unwrap();

    let waiting = controller
        .notify(Completion::Created(service))
        .await
        .unwrap();
    assert_eq!(waiting, Notified::Waiting { remaining: 1 });
    assert_eq!(controller.record().state(), &TriggerState::Pending);

    let fired = controller
        .notify(Completion::Created(pipeline()))
        .await
        .unwrap();
    assert_eq!(fired, Notified::Fired);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fires_immediately_when_already_armed() {
    let handler = RecordingHandler::default();
    let mut controller = BootstrapController::new(TriggerRecord::new());

    controller.arm([pipeline()]).unwrap();
    let armed = controller
        .notify(Completion::Created(pipeline()))
        .await
        .unwrap();
    assert_eq!(armed, Notified::Armed);

    let status = controller
        .fire(
            handler.clone(),
            BootstrapProperties::StartPipeline {
                pipeline_name: "shop-pipeline".to_owned(),
            },
        )
        .await
        .unwrap();
    assert_eq!(status, FireStatus::Succeeded);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unrelated_events_are_ignored() {
    let mut controller: BootstrapController<RecordingHandler> =
        BootstrapController::new(TriggerRecord::new());
    controller.arm([pipeline()]).unwrap();

    let outcome = controller
        .notify(Completion::Created(ResourceHandle::pipeline("other")))
        .await
        .unwrap();
    assert_eq!(outcome, Notified::Ignored);
    assert_eq!(controller.record().state(), &TriggerState::Pending);
}

#[tokio::test]
async fn second_fire_is_rejected_after_success() {
    let handler = RecordingHandler::default();
    let mut controller = BootstrapController::new(TriggerRecord::new());
    controller.arm([]).unwrap();

    controller
        .fire(handler.clone(), seed_properties())
        .await
        .unwrap();
    let err = controller
        .fire(handler.clone(), seed_properties())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BootstrapFireError::AlreadyFired { generation: 1 }
    ));
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn second_fire_is_rejected_after_failure() {
    let handler = RecordingHandler {
        fail: true,
        ..Default::default()
    };
    let mut controller = BootstrapController::new(TriggerRecord::new());
    controller.arm([]).unwrap();

    let err = controller
        .fire(handler.clone(), seed_properties())
        .await
        .unwrap_err();
    assert!(matches!(err, BootstrapFireError::Handler { .. }));
    assert_eq!(
        controller.record().state(),
        &TriggerState::Failed {
            reason: "upload failed".to_owned()
        }
    );

    let again = controller
        .fire(handler.clone(), seed_properties())
        .await
        .unwrap_err();
    assert!(matches!(again, BootstrapFireError::AlreadyFired { .. }));
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn second_registration_before_arming_is_rejected() {
    let handler = RecordingHandler::default();
    let mut controller = BootstrapController::new(TriggerRecord::new());
    controller.arm([pipeline()]).unwrap();

    controller
        .fire(handler.clone(), seed_properties())
        .await
        .unwrap();
    let err = controller
        .fire(handler.clone(), seed_properties())
        .await
        .unwrap_err();
    assert!(matches!(err, BootstrapFireError::AlreadyFired { .. }));
}

#[tokio::test]
async fn failed_dependency_never_fires() {
    let handler = RecordingHandler::default();
    let mut controller = BootstrapController::new(TriggerRecord::new());
    controller.arm([pipeline()]).unwrap();
    controller
        .fire(handler.clone(), seed_properties())
        .await
        .unwrap();

    let err = controller
        .notify(Completion::CreateFailed {
            resource: pipeline(),
            reason: "AccessDenied".to_owned(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, BootstrapFireError::DependencyFailed { .. }));

    let late = controller
        .notify(Completion::Created(pipeline()))
        .await
        .unwrap();
    assert!(matches!(late, Notified::Waiting { .. }));
    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    assert!(controller.record().state().is_terminal());
}

#[test]
fn arming_twice_is_rejected() {
    let mut controller: BootstrapController<RecordingHandler> =
        BootstrapController::new(TriggerRecord::new());
    controller.arm([pipeline()]).unwrap();

    assert!(matches!(
        controller.arm([pipeline()]),
        Err(BootstrapFireError::AlreadyArmed { .. })
    ));
}

#[test]
fn rearm_starts_a_new_generation() {
    let record = TriggerRecord::new();
    let next = record.rearm();

    assert_eq!(next.generation(), 2);
    assert_eq!(next.state(), &TriggerState::Pending);
    assert!(!next.fired());
    assert!(next.dependencies().is_none());
}

#[tokio::test]
async fn transitions_are_persisted() {
    let tmp = TempDir::new().unwrap();
    let handler = RecordingHandler::default();
    let mut controller =
        BootstrapController::new(TriggerRecord::new()).with_state_dir(tmp.path());

    controller.arm([pipeline()]).unwrap();
    controller
        .fire(handler.clone(), seed_properties())
        .await
        .unwrap();
    controller
        .notify(Completion::Created(pipeline()))
        .await
        .unwrap();

    let saved = TriggerRecord::load(tmp.path()).unwrap().unwrap();
    assert_eq!(saved.state(), &TriggerState::Succeeded);
    assert!(saved.fired());
    assert_eq!(saved.properties(), Some(&seed_properties()));

    // A reloaded, already-fired record cannot fire again.
    let mut reloaded = BootstrapController::new(saved);
    let err = reloaded
        .fire(handler.clone(), seed_properties())
        .await
        .unwrap_err();
    assert!(matches!(err, BootstrapFireError::AlreadyFired { .. }));
}

#[test]
fn load_returns_none_without_state_file() {
    let tmp = TempDir::new().unwrap();
    assert!(TriggerRecord::load(tmp.path()).unwrap().is_none());
}

#[test]
fn property_bags_serialize_camel_case() {
    let seed = serde_json::to_value(seed_properties()).unwrap();
    assert_eq!(seed["serviceArn"], "arn:aws:apprunner:us-east-1:123:service/shop/abc");
    assert_eq!(seed["srcKey"], "src.zip");

    let start = serde_json::to_value(BootstrapProperties::StartPipeline {
        pipeline_name: "shop-pipeline".to_owned(),
    })
    .unwrap();
    assert_eq!(start, serde_json::json!({ "pipelineName": "shop-pipeline" }));
}
