use crate::report::{CategoryOutcome, HealthReport};
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("не удалось сериализовать отчёт: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("не удалось записать отчёт в {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

pub fn export_json(report: &HealthReport, path: &Path) -> Result<(), ExportError> {
    let text = serde_json::to_string_pretty(report)?;
    fs::write(path, text).map_err(|source| ExportError::Write {
        path: path.display().to_string(),
        source,
    })
}

pub fn render_report(report: &HealthReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Отчёт о состоянии системы: {}", report.generated_at);
    out.push('\n');

    let mut system = table(&["Метрика", "Значение"]);
    system.add_row(vec![
        "Загрузка CPU".to_string(),
        outcome_text(&report.cpu, |cpu| format!("{:.2}%", cpu.percent)),
    ]);
    system.add_row(vec![
        "Использование памяти".to_string(),
        outcome_text(&report.memory, |mem| format!("{:.2}%", mem.percent)),
    ]);
    match &report.process {
        CategoryOutcome::Checked(process) => system.add_row(vec![
            format!("Процесс '{}'", process.name),
            process.status.as_str().to_string(),
        ]),
        CategoryOutcome::Unavailable { error } => {
            system.add_row(vec!["Процесс".to_string(), unavailable(error)])
        }
    };
    section(&mut out, "Состояние системы", &system);

    let mut disks = table(&["Точка монтирования", "Занято", "Статус"]);
    match &report.disk {
        CategoryOutcome::Checked(entries) => {
            for d in entries {
                let status = if d.over_threshold { "ПРЕВЫШЕН ПОРОГ" } else { "ok" };
                disks.add_row(vec![d.mountpoint.clone(), format!("{:.2}%", d.percent), status.to_string()]);
            }
        }
        CategoryOutcome::Unavailable { error } => {
            disks.add_row(vec!["-".to_string(), "-".to_string(), unavailable(error)]);
        }
    }
    section(&mut out, "Использование дисков", &disks);

    let mut services = table(&["Сервис", "Статус"]);
    match &report.services {
        CategoryOutcome::Checked(statuses) => {
            for (name, status) in statuses {
                services.add_row(vec![name.clone(), status.as_str().to_string()]);
            }
        }
        CategoryOutcome::Unavailable { error } => {
            services.add_row(vec!["-".to_string(), unavailable(error)]);
        }
    }
    section(&mut out, "Состояние сервисов", &services);

    let mut network = table(&["Проверка", "Цель", "Статус"]);
    match &report.network {
        CategoryOutcome::Checked(result) => {
            for (host, up) in &result.ping_results {
                let status = if *up { "успешно" } else { "нет ответа" };
                network.add_row(vec!["Ping".to_string(), host.clone(), status.to_string()]);
            }
            for (host, ports) in &result.port_results {
                for (port, open) in ports {
                    let status = if *open { "открыт" } else { "закрыт" };
                    network.add_row(vec!["Порт".to_string(), format!("{host}:{port}"), status.to_string()]);
                }
            }
        }
        CategoryOutcome::Unavailable { error } => {
            network.add_row(vec!["-".to_string(), "-".to_string(), unavailable(error)]);
        }
    }
    section(&mut out, "Сетевые проверки", &network);

    out
}

fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(header.to_vec());
    table
}

fn section(out: &mut String, title: &str, table: &Table) {
    let _ = writeln!(out, "{title}");
    let _ = writeln!(out, "{table}");
    out.push('\n');
}

fn outcome_text<T>(outcome: &CategoryOutcome<T>, f: impl FnOnce(&T) -> String) -> String {
    match outcome {
        CategoryOutcome::Checked(value) => f(value),
        CategoryOutcome::Unavailable { error } => unavailable(error),
    }
}

fn unavailable(error: &str) -> String {
    format!("недоступно: {error}")
}
