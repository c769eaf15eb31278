//! Orchestrator tests

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use wlsdeployer::app::options::Configuration;
use wlsdeployer::deploy::orchestrator::{tokio_sleep, Deployer, SleepFn};
use wlsdeployer::deploy::progress::PollOptions;
use wlsdeployer::errors::{DeployerError, FailurePhase};
use wlsdeployer::mgmt::channel::MBeanValue;
use wlsdeployer::models::deployment::{DeploymentRequest, EndpointInfo, Servlet};
use wlsdeployer::security::context::{SecurityContext, TrustMode};
use wlsdeployer::security::guard::{TrustEnv, TrustGuard};
use wlsdeployer::storage::settings::SubmissionStrategy;

use crate::fake::{
    reference, rest_config, text, FakeConnector, FakeDomain, MemoryEnv, VirtualClock,
    DEPLOYMENT_MANAGER,
};

const RELEASE: &str = "invoke domainRuntime/deploymentManager#removeDeploymentProgressObject";

struct Harness {
    domain: Arc<FakeDomain>,
    clock: VirtualClock,
    env: Arc<MemoryEnv>,
    deployer: Deployer,
    _artifacts: TempDir,
    artifact: PathBuf,
}

async fn harness_with(config: Configuration, max_wait: u64) -> Harness {
    let domain = FakeDomain::new();
    let clock = VirtualClock::default();
    let env = MemoryEnv::with_location("/etc/original.pem");
    let deployer = Deployer::new(Arc::new(config), FakeConnector::new(Arc::clone(&domain)))
        .with_guard(Arc::new(TrustGuard::new(env.clone())))
        .with_sleep_fn(clock.sleep_fn())
        .with_poll_options(PollOptions::with_max_wait(Duration::from_secs(max_wait)));

    let artifacts = tempfile::tempdir().unwrap();
    let artifact = artifacts.path().join("foo.war");
    std::fs::write(&artifact, b"war").unwrap();

    Harness {
        domain,
        clock,
        env,
        deployer,
        _artifacts: artifacts,
        artifact,
    }
}

async fn harness(max_wait: u64) -> Harness {
    harness_with(rest_config().await, max_wait).await
}

impl Harness {
    async fn request(&self, target: &str) -> DeploymentRequest {
        DeploymentRequest::from_artifact(&self.artifact, target).await.unwrap()
    }

    /// foo on a running AdminServer at 10.0.0.5:7001 with one servlet
    fn admin_server_with_foo(&self) {
        let runtime = self
            .domain
            .add_server("AdminServer", "RUNNING", "http://10.0.0.5:7001");
        self.domain
            .add_deployment("foo", &["domainConfig/servers/AdminServer"]);
        self.domain.add_web_app(&runtime, "foo", &[("MyServlet", "/")]);
    }
}

#[tokio::test]
async fn test_deploy_resolves_endpoint_on_admin_server() {
    let h = harness(200).await;
    h.admin_server_with_foo();
    h.domain.on_deploy("foo", &["STATE_RUNNING", "STATE_COMPLETED"]);

    let endpoint = h.deployer.deploy(&h.request("AdminServer").await).await.unwrap();

    assert_eq!(
        endpoint,
        EndpointInfo {
            host: "10.0.0.5".to_string(),
            port: 7001,
            servlets: vec![Servlet::new("MyServlet", "/")],
        }
    );
    assert_eq!(h.clock.elapsed(), Duration::from_secs(1));
    assert!(h.domain.called(RELEASE));
    assert_eq!(h.domain.closes(), 1);
}

#[tokio::test]
async fn test_failed_deploy_skips_resolution() {
    let h = harness(200).await;
    h.admin_server_with_foo();
    let progress = h.domain.on_deploy("foo", &["STATE_RUNNING", "STATE_FAILED"]);
    h.domain.set(
        &progress,
        "FailedTargets",
        MBeanValue::Texts(vec!["server1".to_string()]),
    );
    h.domain.on_invoke(
        &progress,
        "getExceptions",
        Ok(MBeanValue::Texts(vec!["java.lang.OutOfMemoryError".to_string()])),
    );

    let err = h
        .deployer
        .deploy(&h.request("AdminServer").await)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployerError::DeploymentFailed { .. }));
    assert_eq!(err.phase(), FailurePhase::ConfirmedFailure);
    let message = err.to_string();
    assert!(message.contains("server1"), "{}", message);
    assert!(message.contains("OutOfMemoryError"), "{}", message);

    assert!(!h.domain.called("get #DomainConfiguration"));
    assert!(h.domain.called(RELEASE));
    assert_eq!(h.domain.closes(), 1);
}

#[tokio::test]
async fn test_unknown_progress_still_resolves() {
    let h = harness(5).await;
    h.admin_server_with_foo();
    h.domain.on_deploy("foo", &["STATE_RUNNING"]);

    let endpoint = h.deployer.deploy(&h.request("AdminServer").await).await.unwrap();

    assert_eq!(endpoint.port, 7001);
    assert_eq!(h.clock.elapsed(), Duration::from_secs(5));
    assert!(h.domain.called("get #DomainConfiguration"));
    assert!(h.domain.called(RELEASE));
}

#[tokio::test]
async fn test_unknown_progress_without_deployment_is_a_verification_failure() {
    let h = harness(5).await;
    h.domain.add_server("AdminServer", "RUNNING", "http://10.0.0.5:7001");
    h.domain.on_deploy("foo", &["STATE_RUNNING"]);

    let err = h
        .deployer
        .deploy(&h.request("AdminServer").await)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployerError::DeploymentNotFound(ref name) if name == "foo"));
    assert_eq!(err.phase(), FailurePhase::Verification);
}

#[tokio::test]
async fn test_cluster_without_running_members_is_not_running() {
    let h = harness(200).await;
    h.domain.add_server("server1", "SHUTDOWN", "http://10.0.0.6:7003");
    h.domain.add_server("server2", "ADMIN", "http://10.0.0.7:7003");
    let cluster = h.domain.add_cluster("cluster1", &["server1", "server2"]);
    h.domain.add_deployment("foo", &[cluster.as_str()]);
    h.domain.on_deploy("foo", &["STATE_COMPLETED"]);

    let err = h
        .deployer
        .deploy(&h.request("cluster1").await)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployerError::TargetNotRunning(ref target) if target == "cluster1"));
    assert_eq!(h.domain.closes(), 1);
}

#[tokio::test]
async fn test_cluster_resolves_through_first_running_member() {
    let h = harness(200).await;
    h.domain.add_server("server1", "SHUTDOWN", "http://10.0.0.6:7003");
    let running = h.domain.add_server("server2", "RUNNING", "http://10.0.0.7:7003");
    let cluster = h.domain.add_cluster("cluster1", &["server1", "server2"]);
    h.domain.add_deployment("foo", &[cluster.as_str()]);
    h.domain.add_web_app(&running, "foo", &[("MyServlet", "/foo")]);
    h.domain.on_deploy("foo", &["STATE_COMPLETED"]);

    let endpoint = h.deployer.deploy(&h.request("cluster1").await).await.unwrap();

    assert_eq!(endpoint.host, "10.0.0.7");
    assert_eq!(endpoint.port, 7003);
    assert_eq!(endpoint.servlets, vec![Servlet::new("MyServlet", "/foo")]);
}

#[tokio::test]
async fn test_undeploy_of_absent_deployment_succeeds() {
    let h = harness(200).await;
    h.domain.add_server("AdminServer", "RUNNING", "http://10.0.0.5:7001");

    h.deployer.undeploy("foo", "AdminServer").await.unwrap();

    assert!(!h
        .domain
        .calls()
        .iter()
        .any(|call| call.ends_with("#undeploy")));
    assert_eq!(h.domain.closes(), 1);
}

#[tokio::test]
async fn test_undeploy_submits_and_confirms_absence() {
    let h = harness(200).await;
    let runtime = format!("{}/appDeploymentRuntimes/foo", DEPLOYMENT_MANAGER);
    let progress = format!("{}/deploymentProgressObjects/foo", DEPLOYMENT_MANAGER);
    h.domain
        .push_ref(DEPLOYMENT_MANAGER, "AppDeploymentRuntimes", &runtime);
    h.domain.set(&runtime, "Name", text("foo"));
    h.domain.on_invoke(&runtime, "undeploy", Ok(reference(&progress)));
    h.domain.set(&progress, "State", text("STATE_COMPLETED"));
    h.domain.on_invoke(
        DEPLOYMENT_MANAGER,
        "removeDeploymentProgressObject",
        Ok(MBeanValue::Null),
    );

    h.deployer.undeploy("foo", "AdminServer").await.unwrap();

    assert!(h.domain.called(&format!("invoke {}#undeploy", runtime)));
    assert!(h.domain.called(RELEASE));
}

#[tokio::test]
async fn test_undeploy_fails_when_deployment_remains() {
    let h = harness(200).await;
    h.admin_server_with_foo();

    let err = h.deployer.undeploy("foo", "AdminServer").await.unwrap_err();

    assert!(matches!(err, DeployerError::UndeployVerification(ref name) if name == "foo"));
    assert_eq!(err.phase(), FailurePhase::Verification);
}

fn custom_trust() -> SecurityContext {
    SecurityContext {
        mode: TrustMode::Custom,
        location: Some(PathBuf::from("/etc/domain.pem")),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_trust_settings_restored_after_connect_failure() {
    let mut config = rest_config().await;
    config.security = custom_trust();
    let domain = FakeDomain::new();
    let env = MemoryEnv::with_location("/etc/original.pem");
    let connector = Arc::new(FakeConnector {
        domain: Arc::clone(&domain),
        refuse: true,
    });
    let deployer = Deployer::new(Arc::new(config), connector)
        .with_guard(Arc::new(TrustGuard::new(env.clone())));

    let err = deployer.undeploy("foo", "AdminServer").await.unwrap_err();

    assert!(matches!(err, DeployerError::ConnectError(_)));
    assert_eq!(err.phase(), FailurePhase::Connection);
    assert_eq!(env.read().location.as_deref(), Some("/etc/original.pem"));
    assert_eq!(domain.closes(), 0);
}

#[tokio::test]
async fn test_trust_settings_restored_after_deploy() {
    let mut config = rest_config().await;
    config.security = custom_trust();
    let h = harness_with(config, 200).await;
    h.admin_server_with_foo();
    h.domain.on_deploy("foo", &["STATE_COMPLETED"]);

    h.deployer.deploy(&h.request("AdminServer").await).await.unwrap();

    assert_eq!(h.env.read().location.as_deref(), Some("/etc/original.pem"));
}

#[tokio::test]
async fn test_status_reports_servers_and_target() {
    let h = harness(200).await;
    h.domain.add_server("AdminServer", "RUNNING", "http://10.0.0.5:7001");
    h.domain.add_server("server1", "SHUTDOWN", "http://10.0.0.6:7003");
    h.domain.add_cluster("cluster1", &["server1"]);

    let servers = h.deployer.status().await.unwrap();
    assert_eq!(servers.len(), 2);
    assert!(servers[0].is_running());
    assert!(!servers[1].is_running());

    assert!(h.deployer.is_target_running("AdminServer").await.unwrap());
    assert!(!h.deployer.is_target_running("cluster1").await.unwrap());
    assert!(!h.deployer.is_target_running("nowhere").await.unwrap());
    assert_eq!(h.domain.closes(), 4);
}

#[tokio::test]
async fn test_cancel_while_polling_releases_progress_object() {
    let mut config = rest_config().await;
    config.security = custom_trust();
    let mut h = harness_with(config, 200).await;
    h.admin_server_with_foo();
    h.domain.on_deploy("foo", &["STATE_RUNNING"]);

    // The first wait between samples cancels the call and never wakes.
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let sleep_fn: SleepFn = Arc::new(move |_| {
        trigger.cancel();
        Box::pin(std::future::pending())
    });
    h.deployer = h.deployer.with_cancel_token(cancel).with_sleep_fn(sleep_fn);

    let err = h
        .deployer
        .deploy(&h.request("AdminServer").await)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployerError::Cancelled));
    assert!(h.domain.called(RELEASE));
    assert!(!h.domain.called("get #DomainConfiguration"));
    assert_eq!(h.domain.closes(), 1);
    assert_eq!(h.env.read().location.as_deref(), Some("/etc/original.pem"));
}

#[tokio::test]
async fn test_cancel_from_another_task_releases_progress_object() {
    let mut h = harness(200).await;
    h.admin_server_with_foo();
    h.domain.on_deploy("foo", &["STATE_RUNNING"]);
    h.deployer = h
        .deployer
        .with_sleep_fn(tokio_sleep())
        .with_poll_options(PollOptions {
            interval: Duration::from_millis(5),
            max_wait: Duration::from_secs(60),
        });
    let request = h.request("AdminServer").await;
    let cancel = h.deployer.cancel_token();

    let (result, _) = tokio::join!(h.deployer.deploy(&request), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
    });

    assert!(matches!(result, Err(DeployerError::Cancelled)));
    assert!(h.domain.called(RELEASE));
    assert_eq!(h.domain.closes(), 1);
}

/// Configuration whose tool is a shell script recording its arguments and
/// trust environment in `dir`, then exiting with `code`
#[cfg(unix)]
async fn tool_config(dir: &std::path::Path, code: i32) -> Configuration {
    use std::os::unix::fs::PermissionsExt;

    let script = dir.join("java");
    let body = format!(
        "#!/bin/sh\necho \"$@\" > {dir}/args.txt\necho \"$SSL_CERT_FILE\" > {dir}/trust.txt\nexit {code}\n",
        dir = dir.display(),
        code = code
    );
    std::fs::write(&script, body).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let mut config = rest_config().await;
    config.submission_strategy = SubmissionStrategy::Process;
    config.tool.java_executable = script;
    config
}

#[cfg(unix)]
fn recorded(dir: &std::path::Path, file: &str) -> String {
    std::fs::read_to_string(dir.join(file)).unwrap()
}

#[cfg(unix)]
#[tokio::test]
async fn test_tool_failure_is_advisory_when_deployment_is_present() {
    let tool = tempfile::tempdir().unwrap();
    let h = harness_with(tool_config(tool.path(), 1).await, 200).await;
    h.admin_server_with_foo();

    let endpoint = h.deployer.deploy(&h.request("AdminServer").await).await.unwrap();

    assert_eq!(endpoint.host, "10.0.0.5");
    assert_eq!(endpoint.port, 7001);
    let args = recorded(tool.path(), "args.txt");
    assert!(args.contains("-deploy"), "{}", args);
    assert!(args.contains(&h.artifact.display().to_string()), "{}", args);
    assert!(!h.domain.called(RELEASE));
    assert!(!h.domain.called(&format!("invoke {}#deploy", DEPLOYMENT_MANAGER)));
    assert_eq!(h.domain.closes(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn test_tool_success_without_deployment_is_a_verification_failure() {
    let tool = tempfile::tempdir().unwrap();
    let h = harness_with(tool_config(tool.path(), 0).await, 200).await;
    h.domain.add_server("AdminServer", "RUNNING", "http://10.0.0.5:7001");

    let err = h
        .deployer
        .deploy(&h.request("AdminServer").await)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployerError::DeploymentNotFound(ref name) if name == "foo"));
    assert_eq!(err.phase(), FailurePhase::Verification);
    assert_eq!(h.domain.closes(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn test_tool_undeploy_of_absent_deployment_succeeds() {
    let tool = tempfile::tempdir().unwrap();
    let h = harness_with(tool_config(tool.path(), 0).await, 200).await;

    h.deployer.undeploy("foo", "AdminServer").await.unwrap();

    let args = recorded(tool.path(), "args.txt");
    assert!(args.contains("-undeploy -name foo -targets AdminServer"), "{}", args);
    assert!(!args.contains("-source"), "{}", args);
}

#[cfg(unix)]
#[tokio::test]
async fn test_tool_receives_trust_store_through_its_environment() {
    let tool = tempfile::tempdir().unwrap();
    let mut config = tool_config(tool.path(), 0).await;
    config.security = custom_trust();
    let h = harness_with(config, 200).await;

    h.deployer.undeploy("foo", "AdminServer").await.unwrap();

    assert_eq!(recorded(tool.path(), "trust.txt").trim(), "/etc/domain.pem");
    assert_eq!(h.env.read().location.as_deref(), Some("/etc/original.pem"));
    assert_ne!(
        std::env::var("SSL_CERT_FILE").ok().as_deref(),
        Some("/etc/domain.pem")
    );
}
