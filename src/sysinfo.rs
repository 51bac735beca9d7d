/*!
 * Host system information snapshot
 *
 * Every probe is best-effort: a probe that fails is rendered as a
 * placeholder and logged, and never aborts the run.
 */

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::types::Probe;

const BYTES_PER_GIB: f64 = (1024u64 * 1024 * 1024) as f64;

/// Physical memory totals in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryInfo {
    pub total: u64,
    pub available: u64,
}

/// Capacity of one volume in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveSpace {
    pub total: u64,
    pub free: u64,
}

/// One mounted volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveInfo {
    /// Volume root (`C:\` or `/`)
    pub root: String,
    pub space: Probe<DriveSpace>,
}

/// Snapshot of the acquiring host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInfo {
    pub os: String,
    pub os_version: Probe<String>,
    pub architecture: String,
    pub hostname: Probe<String>,
    pub processor: Probe<String>,
    pub tool_version: String,
    pub ram: Probe<MemoryInfo>,
    pub drives: Probe<Vec<DriveInfo>>,
}

impl SystemInfo {
    /// Probe the current host
    pub fn gather() -> Self {
        let info = Self {
            os: std::env::consts::OS.to_string(),
            os_version: os_version(),
            architecture: std::env::consts::ARCH.to_string(),
            hostname: match hostname::get() {
                Ok(name) => Probe::Value(name.to_string_lossy().to_string()),
                Err(e) => Probe::degraded(e.to_string()),
            },
            processor: processor(),
            tool_version: format!("{} {}", env!("CARGO_PKG_NAME"), crate::VERSION),
            ram: memory(),
            drives: drives(),
        };

        for (name, reason) in info.degraded_probes() {
            tracing::warn!(probe = name, reason = %reason, "system information probe failed");
        }
        info
    }

    /// Names and reasons of every probe that fell back to its placeholder
    pub fn degraded_probes(&self) -> Vec<(&'static str, &str)> {
        [
            ("os version", reason_of(&self.os_version)),
            ("hostname", reason_of(&self.hostname)),
            ("processor", reason_of(&self.processor)),
            ("ram", reason_of(&self.ram)),
            ("drives", reason_of(&self.drives)),
        ]
        .into_iter()
        .filter_map(|(name, reason)| reason.map(|reason| (name, reason)))
        .collect()
    }

    /// Plain-text rendering used for `system_info.txt` and the manifest
    pub fn render(&self) -> String {
        let mut out = String::new();
        let version = match &self.os_version {
            Probe::Value(version) => format!(" {}", version),
            Probe::Degraded { .. } => String::new(),
        };
        let _ = writeln!(out, "System: {}{}", self.os, version);
        let _ = writeln!(out, "Machine: {}", self.architecture);
        let _ = writeln!(out, "Hostname: {}", show(&self.hostname, |h| h.clone()));
        let _ = writeln!(out, "Processor: {}", show(&self.processor, |p| p.clone()));
        let _ = writeln!(out, "Tool Version: {}", self.tool_version);
        let _ = writeln!(
            out,
            "RAM: {}",
            show(&self.ram, |m| format!(
                "{:.2} GB total, {:.2} GB available",
                gib(m.total),
                gib(m.available)
            ))
        );

        match &self.drives {
            Probe::Value(drives) => {
                let _ = writeln!(out, "Drives:");
                for drive in drives {
                    let line = match &drive.space {
                        Probe::Value(space) => format!(
                            "Total: {:.2} GB, Free: {:.2} GB",
                            gib(space.total),
                            gib(space.free)
                        ),
                        Probe::Degraded { .. } => "Unable to get space information".to_string(),
                    };
                    let _ = writeln!(out, "  Drive {} - {}", drive.root, line);
                }
            }
            Probe::Degraded { placeholder, .. } => {
                let _ = writeln!(out, "Drives: {}", placeholder);
            }
        }
        out
    }
}

/// Write the rendered snapshot to `path`
pub fn write_system_info(info: &SystemInfo, path: &Path) -> Result<()> {
    fs::write(path, info.render())?;
    tracing::info!(path = %path.display(), "system information written");
    Ok(())
}

fn show<T>(probe: &Probe<T>, render: impl Fn(&T) -> String) -> String {
    match probe {
        Probe::Value(value) => render(value),
        Probe::Degraded { placeholder, .. } => placeholder.clone(),
    }
}

fn reason_of<T>(probe: &Probe<T>) -> Option<&str> {
    match probe {
        Probe::Value(_) => None,
        Probe::Degraded { reason, .. } => Some(reason),
    }
}

fn gib(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_GIB
}

#[cfg(windows)]
fn os_version() -> Probe<String> {
    match std::process::Command::new("cmd").args(["/C", "ver"]).output() {
        Ok(output) if output.status.success() => {
            let text = String::from_utf8_lossy(&output.stdout);
            match text.lines().map(str::trim).find(|line| !line.is_empty()) {
                Some(line) => Probe::Value(line.to_string()),
                None => Probe::degraded("ver printed nothing"),
            }
        }
        Ok(output) => Probe::degraded(format!("ver exited with {}", output.status)),
        Err(e) => Probe::degraded(e.to_string()),
    }
}

#[cfg(unix)]
fn os_version() -> Probe<String> {
    match fs::read_to_string("/proc/sys/kernel/osrelease") {
        Ok(release) => Probe::Value(release.trim().to_string()),
        Err(e) => Probe::degraded(e.to_string()),
    }
}

#[cfg(not(any(windows, unix)))]
fn os_version() -> Probe<String> {
    Probe::degraded("unsupported platform")
}

#[cfg(windows)]
fn processor() -> Probe<String> {
    match std::env::var("PROCESSOR_IDENTIFIER") {
        Ok(id) if !id.trim().is_empty() => Probe::Value(id.trim().to_string()),
        Ok(_) => Probe::degraded("PROCESSOR_IDENTIFIER is empty"),
        Err(e) => Probe::degraded(e.to_string()),
    }
}

#[cfg(not(windows))]
fn processor() -> Probe<String> {
    match fs::read_to_string("/proc/cpuinfo") {
        Ok(text) => match parse_cpu_model(&text) {
            Some(model) => Probe::Value(model),
            None => Probe::degraded("no model name in /proc/cpuinfo"),
        },
        Err(e) => Probe::degraded(e.to_string()),
    }
}

#[cfg(windows)]
fn memory() -> Probe<MemoryInfo> {
    use windows::Win32::System::SystemInformation::{GlobalMemoryStatusEx, MEMORYSTATUSEX};

    let mut status = MEMORYSTATUSEX {
        dwLength: std::mem::size_of::<MEMORYSTATUSEX>() as u32,
        ..Default::default()
    };
    match unsafe { GlobalMemoryStatusEx(&mut status) } {
        Ok(()) => Probe::Value(MemoryInfo {
            total: status.ullTotalPhys,
            available: status.ullAvailPhys,
        }),
        Err(e) => Probe::degraded(e.to_string()),
    }
}

#[cfg(not(windows))]
fn memory() -> Probe<MemoryInfo> {
    match fs::read_to_string("/proc/meminfo") {
        Ok(text) => match parse_meminfo(&text) {
            Some(info) => Probe::Value(info),
            None => Probe::degraded("MemTotal missing from /proc/meminfo"),
        },
        Err(e) => Probe::degraded(e.to_string()),
    }
}

#[cfg(windows)]
fn drives() -> Probe<Vec<DriveInfo>> {
    let letters = crate::container::logical_drive_letters();
    if letters.is_empty() {
        return Probe::degraded("GetLogicalDrives reported no drives");
    }
    Probe::Value(
        letters
            .into_iter()
            .map(|letter| {
                let root = format!("{}:\\", letter);
                let space = drive_space(&root);
                DriveInfo { root, space }
            })
            .collect(),
    )
}

#[cfg(windows)]
fn drive_space(root: &str) -> Probe<DriveSpace> {
    use windows::core::PCWSTR;
    use windows::Win32::Storage::FileSystem::GetDiskFreeSpaceExW;

    let wide = wide(root);
    let mut free = 0u64;
    let mut total = 0u64;
    let mut total_free = 0u64;
    let result = unsafe {
        GetDiskFreeSpaceExW(
            PCWSTR(wide.as_ptr()),
            Some(&mut free as *mut u64),
            Some(&mut total as *mut u64),
            Some(&mut total_free as *mut u64),
        )
    };
    match result {
        Ok(()) => Probe::Value(DriveSpace { total, free }),
        Err(e) => Probe::degraded(e.to_string()),
    }
}

#[cfg(windows)]
fn wide(s: &str) -> Vec<u16> {
    use std::os::windows::prelude::*;
    std::ffi::OsStr::new(s)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

#[cfg(unix)]
fn drives() -> Probe<Vec<DriveInfo>> {
    use std::ffi::CString;
    use std::mem::MaybeUninit;

    let root = "/";
    let c_path = match CString::new(root) {
        Ok(path) => path,
        Err(e) => return Probe::degraded(e.to_string()),
    };
    let mut stats = MaybeUninit::<libc::statvfs>::zeroed();
    let result = unsafe { libc::statvfs(c_path.as_ptr(), stats.as_mut_ptr()) };
    let space = if result != 0 {
        Probe::degraded(std::io::Error::last_os_error().to_string())
    } else {
        let stats = unsafe { stats.assume_init() };
        let frsize = stats.f_frsize as u64;
        Probe::Value(DriveSpace {
            total: (stats.f_blocks as u64).saturating_mul(frsize),
            free: (stats.f_bavail as u64).saturating_mul(frsize),
        })
    };
    Probe::Value(vec![DriveInfo {
        root: root.to_string(),
        space,
    }])
}

#[cfg(not(any(windows, unix)))]
fn drives() -> Probe<Vec<DriveInfo>> {
    Probe::degraded("unsupported platform")
}

/// Total and available memory from `/proc/meminfo` text
#[cfg_attr(windows, allow(dead_code))]
fn parse_meminfo(text: &str) -> Option<MemoryInfo> {
    let field = |name: &str| -> Option<u64> {
        text.lines()
            .find_map(|line| line.strip_prefix(name))
            .and_then(|rest| rest.trim_start_matches(':').split_whitespace().next())
            .and_then(|kb| kb.parse::<u64>().ok())
            .map(|kb| kb * 1024)
    };
    let total = field("MemTotal")?;
    let available = field("MemAvailable").or_else(|| field("MemFree")).unwrap_or(0);
    Some(MemoryInfo { total, available })
}

/// First `model name` entry of `/proc/cpuinfo` text
#[cfg_attr(windows, allow(dead_code))]
fn parse_cpu_model(text: &str) -> Option<String> {
    text.lines()
        .filter(|line| line.starts_with("model name"))
        .find_map(|line| line.split_once(':'))
        .map(|(_, model)| model.trim().to_string())
        .filter(|model| !model.is_empty())
}
