use crate::collectors::network::{run_network_checks, SystemNetwork};
use crate::collectors::process::{find_process, SysinfoProcessTable};
use crate::collectors::services::{run_service_checks, ServiceProbe};
use crate::collectors::system::{check_disks, sample_cpu, sample_memory, SysinfoHost};
use crate::collectors::{HostMetrics, NetworkProber, ProbeError, ProcessTable};
use crate::config::Config;
use crate::report::{CategoryOutcome, HealthReport};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::task::{self, JoinError};
use tracing::{info, warn};

pub struct CheckOrchestrator {
    config: Arc<Config>,
    host: Arc<dyn HostMetrics>,
    processes: Arc<dyn ProcessTable>,
    prober: Arc<dyn NetworkProber>,
    services: Arc<ServiceProbe>,
}

impl CheckOrchestrator {
    pub fn new(
        config: Arc<Config>,
        host: Arc<dyn HostMetrics>,
        processes: Arc<dyn ProcessTable>,
        prober: Arc<dyn NetworkProber>,
        services: Arc<ServiceProbe>,
    ) -> Self {
        Self {
            config,
            host,
            processes,
            prober,
            services,
        }
    }

    pub fn system(config: Arc<Config>) -> Self {
        let processes: Arc<dyn ProcessTable> = Arc::new(SysinfoProcessTable);
        let services = Arc::new(ServiceProbe::for_platform(
            processes.clone(),
            config.service_check.lookup_timeout(),
        ));
        let prober = Arc::new(SystemNetwork::from_config(&config.network_check));
        Self::new(config, Arc::new(SysinfoHost), processes, prober, services)
    }

    /// Runs every category concurrently and waits for all of them. A category
    /// that errors or panics is reported as unavailable; the others are not
    /// affected.
    pub async fn run_all(&self) -> HealthReport {
        let cpu = {
            let host = self.host.clone();
            let window = self.config.cpu_check.sample_interval();
            task::spawn_blocking(move || sample_cpu(host.as_ref(), window))
        };
        let memory = {
            let host = self.host.clone();
            task::spawn_blocking(move || sample_memory(host.as_ref()))
        };
        let disk = {
            let host = self.host.clone();
            let threshold = self.config.disk_check.threshold_percent;
            task::spawn_blocking(move || check_disks(host.as_ref(), threshold))
        };
        let process = {
            let processes = self.processes.clone();
            let config = self.config.clone();
            task::spawn_blocking(move || {
                find_process(processes.as_ref(), &config.process_check.process_name)
            })
        };
        let services = {
            let probe = self.services.clone();
            let config = self.config.clone();
            task::spawn(async move {
                let result =
                    run_service_checks(&probe, &config.service_check.services_to_check).await;
                Ok::<_, ProbeError>(result)
            })
        };
        let network = {
            let prober = self.prober.clone();
            let config = self.config.clone();
            task::spawn(async move {
                let result = run_network_checks(
                    prober.as_ref(),
                    &config.network_check.hosts_to_ping,
                    &config.network_check.ports_to_check,
                    config.max_concurrency,
                )
                .await;
                Ok::<_, ProbeError>(result)
            })
        };

        let (cpu, memory, disk, process, network, services) =
            tokio::join!(cpu, memory, disk, process, network, services);

        let report = HealthReport {
            generated_at: humantime::format_rfc3339_seconds(SystemTime::now()).to_string(),
            cpu: settle("cpu", cpu),
            memory: settle("memory", memory),
            disk: settle("disk", disk),
            process: settle("process", process),
            network: settle("network", network),
            services: settle("services", services),
        };
        info!(generated_at = %report.generated_at, "health report assembled");
        report
    }
}

fn settle<T>(
    category: &'static str,
    joined: Result<Result<T, ProbeError>, JoinError>,
) -> CategoryOutcome<T> {
    let result = joined.unwrap_or_else(|err| Err(ProbeError::Task(err.to_string())));
    if let Err(err) = &result {
        warn!(category, error = %err, "category unavailable");
    }
    result.into()
}
