use crate::report::OrderedMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub disk_check: DiskCheckConfig,
    pub process_check: ProcessCheckConfig,
    pub network_check: NetworkCheckConfig,
    pub service_check: ServiceCheckConfig,
    #[serde(default)]
    pub cpu_check: CpuCheckConfig,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiskCheckConfig {
    pub threshold_percent: u8,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessCheckConfig {
    pub process_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkCheckConfig {
    pub hosts_to_ping: Vec<String>,
    pub ports_to_check: OrderedMap<String, Vec<u16>>,
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,
    #[serde(default = "default_port_timeout_ms")]
    pub port_timeout_ms: u64,
    #[serde(default = "default_ping_command")]
    pub ping_command: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceCheckConfig {
    pub services_to_check: Vec<String>,
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CpuCheckConfig {
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
}

impl Default for CpuCheckConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval_ms(),
        }
    }
}

impl NetworkCheckConfig {
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn port_timeout(&self) -> Duration {
        Duration::from_millis(self.port_timeout_ms)
    }
}

impl ServiceCheckConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

impl CpuCheckConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("не удалось прочитать файл конфигурации {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("не удалось разобрать YAML в {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("ошибка валидации конфигурации: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        Self::from_yaml_str(&text, &path_display)
    }

    pub fn from_yaml_str(text: &str, origin: &str) -> Result<Self, ConfigError> {
        let cfg: Config = serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.disk_check.threshold_percent > 100 {
            return Err(ConfigError::Validation(
                "disk_check.threshold_percent должно быть в диапазоне 0..100".to_string(),
            ));
        }
        if self.process_check.process_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "process_check.process_name не должен быть пустым".to_string(),
            ));
        }
        if self.cpu_check.sample_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "cpu_check.sample_interval_ms должно быть > 0".to_string(),
            ));
        }
        if self.max_concurrency < 1 {
            return Err(ConfigError::Validation(
                "max_concurrency должно быть >= 1".to_string(),
            ));
        }

        validate_network_check(&self.network_check)?;
        validate_service_check(&self.service_check)?;

        Ok(())
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn validate_network_check(cfg: &NetworkCheckConfig) -> Result<(), ConfigError> {
    let mut hosts = HashSet::new();
    for host in &cfg.hosts_to_ping {
        if host.trim().is_empty() {
            return Err(ConfigError::Validation(
                "network_check.hosts_to_ping[*] не должен быть пустым".to_string(),
            ));
        }
        if !hosts.insert(host.as_str()) {
            return Err(ConfigError::Validation(format!(
                "хост '{}' в network_check.hosts_to_ping должен быть уникальным",
                host
            )));
        }
    }

    for (host, ports) in cfg.ports_to_check.iter() {
        if host.trim().is_empty() {
            return Err(ConfigError::Validation(
                "network_check.ports_to_check: имя хоста не должно быть пустым".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for port in ports {
            if *port == 0 {
                return Err(ConfigError::Validation(format!(
                    "network_check.ports_to_check '{}': порт должен быть в диапазоне 1..65535",
                    host
                )));
            }
            if !seen.insert(*port) {
                return Err(ConfigError::Validation(format!(
                    "network_check.ports_to_check '{}': порт {} указан дважды",
                    host, port
                )));
            }
        }
    }

    if cfg.ping_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "network_check.ping_timeout_ms должно быть > 0".to_string(),
        ));
    }
    if cfg.port_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "network_check.port_timeout_ms должно быть > 0".to_string(),
        ));
    }
    if cfg.ping_command.trim().is_empty() {
        return Err(ConfigError::Validation(
            "network_check.ping_command не должен быть пустым".to_string(),
        ));
    }
    Ok(())
}

fn validate_service_check(cfg: &ServiceCheckConfig) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for name in &cfg.services_to_check {
        if name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "service_check.services_to_check[*] не должен быть пустым".to_string(),
            ));
        }
        if !names.insert(name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "сервис '{}' в service_check.services_to_check должен быть уникальным",
                name
            )));
        }
    }
    if cfg.lookup_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "service_check.lookup_timeout_ms должно быть > 0".to_string(),
        ));
    }
    Ok(())
}

const fn default_max_concurrency() -> usize {
    16
}

const fn default_ping_timeout_ms() -> u64 {
    5000
}

const fn default_port_timeout_ms() -> u64 {
    2000
}

const fn default_lookup_timeout_ms() -> u64 {
    5000
}

const fn default_sample_interval_ms() -> u64 {
    1000
}

fn default_ping_command() -> String {
    "ping".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config::from_yaml_str(
            r#"
disk_check:
  threshold_percent: 80
process_check:
  process_name: sshd
network_check:
  hosts_to_ping: ["8.8.8.8"]
  ports_to_check:
    example.com: [443, 80]
service_check:
  services_to_check: [sshd, cron]
"#,
            "test",
        )
        .expect("валидная конфигурация")
    }

    #[test]
    fn example_config_is_valid() {
        Config::from_yaml_str(Config::example_yaml(), "config.yaml.example")
            .expect("пример конфигурации должен проходить валидацию");
    }

    #[test]
    fn omitted_knobs_take_defaults() {
        let cfg = valid_config();
        assert_eq!(cfg.cpu_check.sample_interval(), Duration::from_secs(1));
        assert_eq!(cfg.network_check.port_timeout(), Duration::from_secs(2));
        assert_eq!(cfg.network_check.ping_command, "ping");
        assert_eq!(cfg.service_check.lookup_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.max_concurrency, 16);
    }

    #[test]
    fn json_config_is_accepted() {
        let cfg = Config::from_yaml_str(
            r#"{
  "disk_check": {"threshold_percent": 90},
  "process_check": {"process_name": "nginx"},
  "network_check": {"hosts_to_ping": [], "ports_to_check": {"h1": [443]}},
  "service_check": {"services_to_check": []}
}"#,
            "config.json",
        )
        .expect("JSON является корректным YAML");
        assert_eq!(cfg.disk_check.threshold_percent, 90);
        assert_eq!(cfg.network_check.ports_to_check.get("h1"), Some(&vec![443]));
    }

    #[test]
    fn threshold_above_hundred_is_rejected() {
        let mut cfg = valid_config();
        cfg.disk_check.threshold_percent = 101;
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut cfg = valid_config();
        cfg.network_check
            .ports_to_check
            .insert("example.com".to_string(), vec![0]);
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn duplicate_ping_host_is_rejected() {
        let mut cfg = valid_config();
        cfg.network_check.hosts_to_ping = vec!["h1".to_string(), "h1".to_string()];
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn empty_process_name_is_rejected() {
        let mut cfg = valid_config();
        cfg.process_check.process_name = "  ".to_string();
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn zero_lookup_timeout_is_rejected() {
        let mut cfg = valid_config();
        cfg.service_check.lookup_timeout_ms = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn missing_section_is_a_parse_error() {
        let err = Config::from_yaml_str("disk_check:\n  threshold_percent: 80\n", "test")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
