/*!
 * Acquisition manifest written into the container root
 */

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::error::Result;
use crate::types::CopyRecord;
use crate::utils::format_file_size;

/// File name of the manifest inside the container
pub const MANIFEST_FILE: &str = "manifest.txt";

/// Describes what an acquisition put into its container
#[derive(Debug, Clone)]
pub struct Manifest<'a> {
    /// When the acquisition ran (local time)
    pub created: NaiveDateTime,
    /// Backing file of the container
    pub container: &'a Path,
    /// Declared capacity in MB
    pub capacity_mb: u64,
    /// Root the items were copied under
    pub mount_point: &'a Path,
    /// Copied sources, in copy order
    pub items: &'a [CopyRecord],
    /// Rendered system information
    pub system_info: &'a str,
}

impl Manifest<'_> {
    /// Render the manifest text
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Acquisition created on: {}",
            self.created.format("%Y-%m-%d %H:%M:%S")
        );
        let _ = writeln!(out, "Container: {}", self.container.display());
        let _ = writeln!(out, "Capacity: {} MB", self.capacity_mb);
        let _ = writeln!(out, "Items:");

        for item in self.items {
            let relative = item
                .destination
                .strip_prefix(self.mount_point)
                .unwrap_or(&item.destination);
            let _ = writeln!(
                out,
                "  [{}] {} -> {} ({} files, {} directories, {}, {} warnings, {} skipped)",
                item.kind,
                item.source.display(),
                relative.display(),
                item.stats.files,
                item.stats.directories,
                format_file_size(item.stats.bytes),
                item.stats.warnings.len(),
                item.stats.skipped,
            );
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "System Information:");
        out.push_str(self.system_info);
        if !self.system_info.ends_with('\n') {
            out.push('\n');
        }
        out
    }

    /// Write the manifest to `<mount_point>/manifest.txt`. Never overwrites.
    pub fn write(&self) -> Result<PathBuf> {
        let path = self.mount_point.join(MANIFEST_FILE);
        let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        file.write_all(self.render().as_bytes())?;
        file.sync_all()?;
        tracing::info!(path = %path.display(), items = self.items.len(), "manifest written");
        Ok(path)
    }
}
