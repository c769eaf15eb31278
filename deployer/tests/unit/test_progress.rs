//! Progress poller tests

use std::time::Duration;

use chrono::{Duration as Elapsed, Utc};
use tokio_util::sync::CancellationToken;

use wlsdeployer::deploy::progress::{poll, sample, PollOptions, TerminalState};
use wlsdeployer::errors::DeployerError;
use wlsdeployer::mgmt::channel::{MBeanValue, ObjectName};
use wlsdeployer::models::deployment::ProgressHandle;

use crate::fake::{text, FakeChannel, FakeDomain, VirtualClock, DEPLOYMENT_MANAGER};

const PROGRESS: &str = "domainRuntime/deploymentManager/deploymentProgressObjects/foo";
const RELEASE: &str = "invoke domainRuntime/deploymentManager#removeDeploymentProgressObject";

fn handle() -> ProgressHandle {
    ProgressHandle {
        object: ObjectName::new(PROGRESS),
        deployment_manager: ObjectName::new(DEPLOYMENT_MANAGER),
        application: "foo".to_string(),
        submitted_at: Utc::now(),
    }
}

fn states(domain: &FakeDomain, states: &[&str]) {
    domain.set_sequence(PROGRESS, "State", states.iter().map(|s| text(s)).collect());
    domain.on_invoke(
        DEPLOYMENT_MANAGER,
        "removeDeploymentProgressObject",
        Ok(MBeanValue::Null),
    );
}

fn state_reads(domain: &FakeDomain) -> usize {
    let read = format!("get {}#State", PROGRESS);
    domain.calls().iter().filter(|call| **call == read).count()
}

#[tokio::test]
async fn test_sample_until_completed() {
    let domain = FakeDomain::new();
    states(&domain, &["STATE_INITIALIZED", "STATE_RUNNING", "STATE_COMPLETED"]);
    let channel = FakeChannel(domain.clone());
    let clock = VirtualClock::default();
    let sleep = clock.sleep_fn();

    let state = sample(
        &channel,
        &handle(),
        &PollOptions::default(),
        |d| sleep(d),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(state, TerminalState::Completed);
    assert_eq!(clock.elapsed(), Duration::from_secs(2));
    assert_eq!(state_reads(&domain), 3);
}

#[tokio::test]
async fn test_exhausted_wait_is_unknown_not_an_error() {
    let domain = FakeDomain::new();
    states(&domain, &["STATE_RUNNING"]);
    let channel = FakeChannel(domain.clone());
    let clock = VirtualClock::default();
    let sleep = clock.sleep_fn();

    let state = poll(
        &channel,
        &handle(),
        &PollOptions::with_max_wait(Duration::from_secs(5)),
        |d| sleep(d),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(state, TerminalState::Unknown);
    assert_eq!(clock.elapsed(), Duration::from_secs(5));
    assert_eq!(state_reads(&domain), 6);
    assert!(domain.called(RELEASE));
}

#[tokio::test]
async fn test_unsupported_state_reads_as_running() {
    let domain = FakeDomain::new();
    domain.set(PROGRESS, "State", MBeanValue::Null);
    let channel = FakeChannel(domain.clone());
    let clock = VirtualClock::default();
    let sleep = clock.sleep_fn();

    let state = sample(
        &channel,
        &handle(),
        &PollOptions::with_max_wait(Duration::from_secs(3)),
        |d| sleep(d),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(state, TerminalState::Unknown);
}

#[tokio::test]
async fn test_failure_carries_first_failed_target() {
    let domain = FakeDomain::new();
    states(&domain, &["STATE_FAILED"]);
    domain.set(
        PROGRESS,
        "FailedTargets",
        MBeanValue::Texts(vec!["server1".to_string(), "server2".to_string()]),
    );
    domain.on_invoke(
        PROGRESS,
        "getExceptions",
        Ok(text("java.lang.OutOfMemoryError: Java heap space")),
    );
    let channel = FakeChannel(domain.clone());
    let clock = VirtualClock::default();
    let sleep = clock.sleep_fn();

    let err = poll(
        &channel,
        &handle(),
        &PollOptions::default(),
        |d| sleep(d),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    match err {
        DeployerError::DeploymentFailed { target, detail } => {
            assert_eq!(target, "server1");
            assert!(detail.contains("OutOfMemoryError"));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(domain.called(RELEASE));
    assert_eq!(clock.elapsed(), Duration::ZERO);
}

#[tokio::test]
async fn test_failure_without_failed_targets() {
    let domain = FakeDomain::new();
    states(&domain, &["STATE_FAILED"]);
    domain.set(PROGRESS, "FailedTargets", MBeanValue::Null);
    let channel = FakeChannel(domain.clone());
    let clock = VirtualClock::default();
    let sleep = clock.sleep_fn();

    let err = poll(
        &channel,
        &handle(),
        &PollOptions::default(),
        |d| sleep(d),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DeployerError::DeploymentFailed { ref target, .. } if target == "unknown"));
}

#[tokio::test]
async fn test_release_failure_does_not_mask_result() {
    let domain = FakeDomain::new();
    domain.set(PROGRESS, "State", text("STATE_COMPLETED"));
    domain.on_invoke(
        DEPLOYMENT_MANAGER,
        "removeDeploymentProgressObject",
        Err("progress object already removed".to_string()),
    );
    let channel = FakeChannel(domain.clone());
    let clock = VirtualClock::default();
    let sleep = clock.sleep_fn();

    let state = poll(
        &channel,
        &handle(),
        &PollOptions::default(),
        |d| sleep(d),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(state, TerminalState::Completed);
    assert!(domain.called(RELEASE));
}

#[tokio::test]
async fn test_cancelled_poll_still_releases() {
    let domain = FakeDomain::new();
    states(&domain, &["STATE_RUNNING"]);
    let channel = FakeChannel(domain.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = poll(
        &channel,
        &handle(),
        &PollOptions::default(),
        |_| std::future::pending::<()>(),
        &cancel,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DeployerError::Cancelled));
    assert!(domain.called(RELEASE));
}

#[test]
fn test_handle_measures_time_since_submission() {
    let mut handle = handle();
    handle.submitted_at = Utc::now() - Elapsed::seconds(90);

    let elapsed = handle.elapsed();
    assert!(elapsed >= Elapsed::seconds(90));
    assert!(elapsed < Elapsed::seconds(120));
}
