use crate::collectors::process::is_running;
use crate::collectors::ProcessTable;
use crate::report::{ServiceResults, ServiceStatus};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task;
use tracing::{debug, warn};

#[cfg(any(target_os = "linux", windows))]
use std::io::ErrorKind;
#[cfg(any(target_os = "linux", windows))]
use std::process::{Output, Stdio};
#[cfg(any(target_os = "linux", windows))]
use tokio::{process::Command, time};

#[cfg(target_os = "linux")]
const DEFAULT_MANAGER: &str = "systemctl";
#[cfg(windows)]
const DEFAULT_MANAGER: &str = "sc";
#[cfg(not(any(target_os = "linux", windows)))]
const DEFAULT_MANAGER: &str = "";

#[cfg(windows)]
const ERROR_SERVICE_DOES_NOT_EXIST: i32 = 1060;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("no such service")]
    NoSuchService,
    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait ServiceResolver: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<ServiceStatus, LookupError>;
}

/// The platform service manager: systemd on Linux, the SCM on Windows.
/// Elsewhere every lookup reports `NoSuchService`.
#[derive(Debug, Clone)]
pub struct NativeServiceManager {
    program: String,
    timeout: Duration,
}

impl NativeServiceManager {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn platform_default(timeout: Duration) -> Self {
        Self::new(DEFAULT_MANAGER, timeout)
    }
}

#[async_trait]
impl ServiceResolver for NativeServiceManager {
    async fn resolve(&self, name: &str) -> Result<ServiceStatus, LookupError> {
        if name.starts_with('-') {
            return Err(LookupError::Other(format!("invalid service name '{name}'")));
        }

        query_native(&self.program, name, self.timeout).await
    }
}

/// Runs the manager with a deadline. The child is killed when the deadline
/// passes.
#[cfg(any(target_os = "linux", windows))]
async fn run_manager(program: &str, args: &[&str], timeout: Duration) -> Result<Output, LookupError> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();
    match time::timeout(timeout, output).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(err)) if err.kind() == ErrorKind::NotFound => Err(LookupError::NoSuchService),
        Ok(Err(err)) => Err(LookupError::Other(err.to_string())),
        Err(_elapsed) => Err(LookupError::Other(format!(
            "{program} did not answer within {}",
            humantime::format_duration(timeout)
        ))),
    }
}

#[cfg(target_os = "linux")]
async fn query_native(program: &str, name: &str, timeout: Duration) -> Result<ServiceStatus, LookupError> {
    let output = run_manager(
        program,
        &["show", name, "--property=LoadState,ActiveState", "--no-pager"],
        timeout,
    )
    .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        // systemctl is installed but systemd is not PID 1 (containers, WSL1).
        if stderr.contains("not been booted with systemd") || stderr.contains("Failed to connect to bus") {
            return Err(LookupError::NoSuchService);
        }
        return Err(LookupError::Other(stderr.trim().to_string()));
    }

    parse_systemctl_show(&String::from_utf8_lossy(&output.stdout))
}

#[cfg(windows)]
async fn query_native(program: &str, name: &str, timeout: Duration) -> Result<ServiceStatus, LookupError> {
    let output = run_manager(program, &["query", name], timeout).await?;

    if output.status.code() == Some(ERROR_SERVICE_DOES_NOT_EXIST) {
        return Err(LookupError::NoSuchService);
    }
    if !output.status.success() {
        return Err(LookupError::Other(format!("sc query exited with {}", output.status)));
    }

    parse_sc_query(&String::from_utf8_lossy(&output.stdout))
}

#[cfg(not(any(target_os = "linux", windows)))]
async fn query_native(_program: &str, _name: &str, _timeout: Duration) -> Result<ServiceStatus, LookupError> {
    Err(LookupError::NoSuchService)
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_systemctl_show(stdout: &str) -> Result<ServiceStatus, LookupError> {
    let mut load_state = None;
    let mut active_state = None;
    for line in stdout.lines() {
        if let Some(v) = line.strip_prefix("LoadState=") {
            load_state = Some(v.trim());
        } else if let Some(v) = line.strip_prefix("ActiveState=") {
            active_state = Some(v.trim());
        }
    }

    match (load_state, active_state) {
        (Some("not-found"), _) => Err(LookupError::NoSuchService),
        (Some(_), Some("active" | "reloading")) => Ok(ServiceStatus::Running),
        (Some(_), Some("inactive" | "failed")) => Ok(ServiceStatus::Stopped),
        (Some(_), Some(_)) => Ok(ServiceStatus::Unknown),
        _ => Err(LookupError::Other(format!(
            "unexpected systemctl output: {}",
            stdout.trim()
        ))),
    }
}

/// Reads the numeric state code, which is not localized, e.g.
/// `STATE              : 4  RUNNING`.
#[cfg_attr(not(windows), allow(dead_code))]
fn parse_sc_query(stdout: &str) -> Result<ServiceStatus, LookupError> {
    let code = stdout
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("STATE"))
        .and_then(|line| line.split_once(':'))
        .and_then(|(_, rest)| rest.split_whitespace().next())
        .and_then(|code| code.parse::<u32>().ok());

    match code {
        Some(4) => Ok(ServiceStatus::Running),
        Some(1) => Ok(ServiceStatus::Stopped),
        Some(_) => Ok(ServiceStatus::Unknown),
        None => Err(LookupError::Other(format!(
            "unexpected sc output: {}",
            stdout.trim()
        ))),
    }
}

/// Treats a live process with the same name as a running service. This only
/// confirms the process, not the service state.
pub struct ProcessTableFallback {
    table: Arc<dyn ProcessTable>,
}

impl ProcessTableFallback {
    pub fn new(table: Arc<dyn ProcessTable>) -> Self {
        Self { table }
    }
}

#[async_trait]
impl ServiceResolver for ProcessTableFallback {
    async fn resolve(&self, name: &str) -> Result<ServiceStatus, LookupError> {
        let table = self.table.clone();
        let name = name.to_string();
        let scan = task::spawn_blocking(move || is_running(table.as_ref(), &name))
            .await
            .map_err(|err| LookupError::Other(err.to_string()))?;
        match scan {
            Ok(true) => Ok(ServiceStatus::Running),
            Ok(false) => Ok(ServiceStatus::NotFound),
            Err(err) => Err(LookupError::Other(err.to_string())),
        }
    }
}

pub struct ServiceProbe {
    native: Box<dyn ServiceResolver>,
    fallback: Box<dyn ServiceResolver>,
}

impl ServiceProbe {
    pub fn new(native: Box<dyn ServiceResolver>, fallback: Box<dyn ServiceResolver>) -> Self {
        Self { native, fallback }
    }

    pub fn for_platform(table: Arc<dyn ProcessTable>, lookup_timeout: Duration) -> Self {
        Self::new(
            Box::new(NativeServiceManager::platform_default(lookup_timeout)),
            Box::new(ProcessTableFallback::new(table)),
        )
    }

    pub async fn resolve_service(&self, name: &str) -> ServiceStatus {
        match self.native.resolve(name).await {
            Ok(status) => status,
            Err(LookupError::NoSuchService) => {
                debug!(service = %name, "no native service, checking process table");
                match self.fallback.resolve(name).await {
                    Ok(status) => status,
                    Err(LookupError::NoSuchService) => ServiceStatus::NotFound,
                    Err(LookupError::Other(err)) => {
                        warn!(service = %name, error = %err, "service fallback failed");
                        ServiceStatus::Unknown
                    }
                }
            }
            Err(LookupError::Other(err)) => {
                warn!(service = %name, error = %err, "service lookup failed");
                ServiceStatus::Unknown
            }
        }
    }
}

/// Looks up every service concurrently. Keys follow the order of `names`.
pub async fn run_service_checks(probe: &ServiceProbe, names: &[String]) -> ServiceResults {
    let lookups = names.iter().map(|name| async move {
        (name.clone(), probe.resolve_service(name).await)
    });
    join_all(lookups).await.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::testing::FakeProcessTable;
    #[cfg(target_os = "linux")]
    use crate::collectors::testing::sleeping_script;
    use std::collections::HashMap;

    struct StubResolver(HashMap<&'static str, Result<ServiceStatus, LookupError>>);

    #[async_trait]
    impl ServiceResolver for StubResolver {
        async fn resolve(&self, name: &str) -> Result<ServiceStatus, LookupError> {
            self.0
                .get(name)
                .cloned()
                .unwrap_or(Err(LookupError::NoSuchService))
        }
    }

    fn probe(
        native: Vec<(&'static str, Result<ServiceStatus, LookupError>)>,
        processes: Option<Vec<&'static str>>,
    ) -> ServiceProbe {
        ServiceProbe::new(
            Box::new(StubResolver(native.into_iter().collect())),
            Box::new(ProcessTableFallback::new(Arc::new(FakeProcessTable(processes)))),
        )
    }

    #[tokio::test]
    async fn native_status_is_used_verbatim() {
        let probe = probe(
            vec![
                ("running_svc", Ok(ServiceStatus::Running)),
                ("stopped_svc", Ok(ServiceStatus::Stopped)),
            ],
            None,
        );
        assert_eq!(probe.resolve_service("running_svc").await, ServiceStatus::Running);
        assert_eq!(probe.resolve_service("stopped_svc").await, ServiceStatus::Stopped);
    }

    #[tokio::test]
    async fn missing_service_falls_back_to_process_table() {
        let probe = probe(vec![], Some(vec!["nginx"]));
        assert_eq!(probe.resolve_service("nginx").await, ServiceStatus::Running);
        assert_eq!(probe.resolve_service("redis").await, ServiceStatus::NotFound);
    }

    #[tokio::test]
    async fn other_native_error_is_unknown() {
        let probe = probe(
            vec![("nginx", Err(LookupError::Other("access denied".to_string())))],
            Some(vec!["nginx"]),
        );
        assert_eq!(probe.resolve_service("nginx").await, ServiceStatus::Unknown);
    }

    #[tokio::test]
    async fn failing_fallback_is_unknown() {
        let probe = probe(vec![], None);
        assert_eq!(probe.resolve_service("nginx").await, ServiceStatus::Unknown);
    }

    #[tokio::test]
    async fn every_service_is_checked_in_order() {
        let probe = probe(
            vec![
                ("a", Err(LookupError::Other("boom".to_string()))),
                ("c", Ok(ServiceStatus::Stopped)),
            ],
            Some(vec!["b"]),
        );
        let names: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let results = run_service_checks(&probe, &names).await;

        let got: Vec<(&str, ServiceStatus)> =
            results.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        assert_eq!(
            got,
            [
                ("a", ServiceStatus::Unknown),
                ("b", ServiceStatus::Running),
                ("c", ServiceStatus::Stopped),
                ("d", ServiceStatus::NotFound),
            ]
        );
    }

    #[test]
    fn systemctl_output_is_mapped() {
        assert_eq!(
            parse_systemctl_show("LoadState=loaded\nActiveState=active\n"),
            Ok(ServiceStatus::Running)
        );
        assert_eq!(
            parse_systemctl_show("LoadState=loaded\nActiveState=failed\n"),
            Ok(ServiceStatus::Stopped)
        );
        assert_eq!(
            parse_systemctl_show("LoadState=loaded\nActiveState=activating\n"),
            Ok(ServiceStatus::Unknown)
        );
        assert_eq!(
            parse_systemctl_show("LoadState=not-found\nActiveState=inactive\n"),
            Err(LookupError::NoSuchService)
        );
        assert!(matches!(
            parse_systemctl_show(""),
            Err(LookupError::Other(_))
        ));
    }

    #[test]
    fn sc_output_is_mapped() {
        let running = "SERVICE_NAME: Spooler\n        TYPE               : 110  WIN32_OWN_PROCESS\n        STATE              : 4  RUNNING\n";
        let stopped = "SERVICE_NAME: Spooler\n        STATE              : 1  STOPPED\n";
        let pending = "SERVICE_NAME: Spooler\n        STATE              : 2  START_PENDING\n";
        assert_eq!(parse_sc_query(running), Ok(ServiceStatus::Running));
        assert_eq!(parse_sc_query(stopped), Ok(ServiceStatus::Stopped));
        assert_eq!(parse_sc_query(pending), Ok(ServiceStatus::Unknown));
        assert!(matches!(parse_sc_query("garbage"), Err(LookupError::Other(_))));
    }

    #[tokio::test]
    async fn option_like_name_is_rejected() {
        let manager = NativeServiceManager::platform_default(Duration::from_secs(1));
        assert!(matches!(
            manager.resolve("--all").await,
            Err(LookupError::Other(_))
        ));
    }

    #[cfg(any(target_os = "linux", windows))]
    #[tokio::test]
    async fn missing_manager_binary_means_no_such_service() {
        let manager =
            NativeServiceManager::new("hostcheck-no-such-service-manager", Duration::from_secs(1));
        assert_eq!(manager.resolve("sshd").await, Err(LookupError::NoSuchService));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn hung_manager_is_killed_and_reported_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let manager = NativeServiceManager::new(
            sleeping_script(dir.path(), "fake-systemctl").to_string_lossy(),
            Duration::from_millis(200),
        );
        let probe = ServiceProbe::new(
            Box::new(manager),
            Box::new(ProcessTableFallback::new(Arc::new(FakeProcessTable(Some(vec!["nginx"]))))),
        );

        let start = time::Instant::now();
        let status = probe.resolve_service("nginx").await;

        assert_eq!(status, ServiceStatus::Unknown);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
