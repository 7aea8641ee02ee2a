mod collectors;
mod config;
mod orchestrator;
mod render;
mod report;

use clap::Parser;
use config::Config;
use orchestrator::CheckOrchestrator;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hostcheck")]
#[command(version)]
#[command(about = "Проверка состояния хоста: CPU, память, диски, процесс, сеть, сервисы")]
struct Cli {
    #[arg(long, default_value = "./config.yaml")]
    config: String,
    /// Сохранить отчёт в JSON-файл вместо вывода таблиц
    #[arg(long, value_name = "FILENAME")]
    json: Option<PathBuf>,
    #[arg(long)]
    print_default_config: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = match Config::load_from_file(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "не удалось загрузить конфигурацию");
            std::process::exit(1);
        }
    };

    info!(
        config = %cli.config,
        hosts = cfg.network_check.hosts_to_ping.len(),
        services = cfg.service_check.services_to_check.len(),
        "запуск проверок"
    );

    let orchestrator = CheckOrchestrator::system(Arc::new(cfg));
    let report = orchestrator.run_all().await;

    if let Some(path) = cli.json {
        if let Err(err) = render::export_json(&report, &path) {
            error!(error = %err, "не удалось сохранить отчёт");
            std::process::exit(1);
        }
        println!("Отчёт сохранён в {}", path.display());
        return;
    }

    print!("{}", render::render_report(&report));
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
