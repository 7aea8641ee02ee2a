use crate::collectors::{ensure_supported, ProbeError, ProcessTable};
use crate::report::{ProcessResult, ProcessStatus};
use std::path::Path;
use sysinfo::{ProcessExt, System, SystemExt};

// Linux keeps at most 15 bytes of the name in /proc/<pid>/stat.
const TRUNCATED_NAME_LEN: usize = 15;

#[derive(Debug, Clone, Copy, Default)]
pub struct SysinfoProcessTable;

impl ProcessTable for SysinfoProcessTable {
    fn process_names(&self) -> Result<Vec<String>, ProbeError> {
        ensure_supported("processes")?;
        let mut system = System::new();
        system.refresh_processes();
        let mut names = Vec::with_capacity(system.processes().len());
        for process in system.processes().values() {
            names.push(process.name().to_string());
            if let Some(full) = untruncated_name(process.name(), process.exe(), process.cmd()) {
                names.push(full);
            }
        }
        Ok(names)
    }
}

/// Full name of a process whose kernel name was cut short, taken from the
/// executable path or argv[0].
fn untruncated_name(name: &str, exe: &Path, cmd: &[String]) -> Option<String> {
    if name.len() != TRUNCATED_NAME_LEN {
        return None;
    }
    let argv0 = cmd.first().map(|arg| Path::new(arg.as_str()));
    [Some(exe), argv0]
        .into_iter()
        .flatten()
        .filter_map(|path| path.file_name()?.to_str())
        .find(|candidate| candidate.len() > name.len() && candidate.starts_with(name))
        .map(str::to_string)
}

/// Exact, case-sensitive match; the scan stops at the first hit.
pub fn is_running(table: &dyn ProcessTable, name: &str) -> Result<bool, ProbeError> {
    Ok(table.process_names()?.iter().any(|n| n == name))
}

pub fn find_process(table: &dyn ProcessTable, name: &str) -> Result<ProcessResult, ProbeError> {
    let status = if is_running(table, name)? {
        ProcessStatus::Running
    } else {
        ProcessStatus::NotFound
    };
    Ok(ProcessResult {
        name: name.to_string(),
        status,
    })
}
