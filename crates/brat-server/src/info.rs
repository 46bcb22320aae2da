//! Informational payload returned when a request carries no text.

use serde::Serialize;

pub const AUTHOR: &str = "XBotzLauncher";
pub const REPOSITORY: &str = "https://github.com/XBotzLauncher/brat-api";
pub const MISSING_TEXT_MESSAGE: &str = "Parameter `text` diperlukan";

#[derive(Debug, Clone, Serialize)]
pub struct Repository {
    pub github: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeInfo {
    pub os: String,
    pub platform: String,
    pub architecture: String,
    pub cpu_count: usize,
    pub uptime: String,
    pub memory_usage: String,
}

impl RuntimeInfo {
    pub fn collect() -> Self {
        let uptime = match system_uptime_secs() {
            Some(secs) => format!("{secs} seconds"),
            None => "unknown".to_string(),
        };
        let memory_usage = match memory_mb() {
            Some((used, total)) => format!("{used} MB used of {total} MB"),
            None => "unknown".to_string(),
        };
        Self {
            os: os_type().to_string(),
            platform: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            uptime,
            memory_usage,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub author: String,
    pub repository: Repository,
    pub hit: u64,
    pub message: String,
    pub runtime: RuntimeInfo,
}

impl ServiceInfo {
    pub fn new(hit: u64) -> Self {
        Self {
            author: AUTHOR.to_string(),
            repository: Repository {
                github: REPOSITORY.to_string(),
            },
            hit,
            message: MISSING_TEXT_MESSAGE.to_string(),
            runtime: RuntimeInfo::collect(),
        }
    }
}

/// Kernel name in the form `uname -s` reports it.
fn os_type() -> &'static str {
    match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "Darwin",
        "windows" => "Windows_NT",
        "freebsd" => "FreeBSD",
        other => other,
    }
}

#[cfg(target_os = "linux")]
fn system_uptime_secs() -> Option<f64> {
    let raw = std::fs::read_to_string("/proc/uptime").ok()?;
    parse_uptime(&raw)
}

#[cfg(not(target_os = "linux"))]
fn system_uptime_secs() -> Option<f64> {
    None
}

#[cfg(target_os = "linux")]
fn memory_mb() -> Option<(u64, u64)> {
    let raw = std::fs::read_to_string("/proc/meminfo").ok()?;
    parse_meminfo(&raw)
}

#[cfg(not(target_os = "linux"))]
fn memory_mb() -> Option<(u64, u64)> {
    None
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_uptime(raw: &str) -> Option<f64> {
    raw.split_whitespace().next()?.parse().ok()
}

/// `(used, total)` in MiB from `/proc/meminfo`, treating `MemAvailable` as free.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_meminfo(raw: &str) -> Option<(u64, u64)> {
    let field = |name: &str| -> Option<u64> {
        raw.lines()
            .find(|l| l.starts_with(name))?
            .split_whitespace()
            .nth(1)?
            .parse()
            .ok()
    };
    let total_kb = field("MemTotal:")?;
    let free_kb = field("MemAvailable:").or_else(|| field("MemFree:"))?;
    let used = total_kb.saturating_sub(free_kb) as f64 / 1024.0;
    let total = total_kb as f64 / 1024.0;
    Some((used.round() as u64, total.round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let value = serde_json::to_value(ServiceInfo::new(7)).unwrap();
        assert_eq!(value["author"], AUTHOR);
        assert_eq!(value["repository"]["github"], REPOSITORY);
        assert_eq!(value["hit"], 7);
        assert_eq!(value["message"], MISSING_TEXT_MESSAGE);
        let runtime = &value["runtime"];
        for key in ["os", "platform", "architecture", "cpuCount", "uptime", "memoryUsage"] {
            assert!(!runtime[key].is_null(), "missing runtime.{key}");
        }
        assert!(runtime["cpuCount"].as_u64().unwrap() >= 1);
    }

    #[test]
    fn test_parse_uptime() {
        assert_eq!(parse_uptime("12345.67 54321.00\n"), Some(12345.67));
        assert_eq!(parse_uptime(""), None);
    }

    #[test]
    fn test_parse_meminfo() {
        let raw = "MemTotal:       16384000 kB\nMemFree:         1024000 kB\nMemAvailable:    8192000 kB\n";
        assert_eq!(parse_meminfo(raw), Some((8000, 16000)));

        let no_available = "MemTotal: 2048 kB\nMemFree: 1024 kB\n";
        assert_eq!(parse_meminfo(no_available), Some((1, 2)));

        assert_eq!(parse_meminfo("garbage"), None);
    }
}
