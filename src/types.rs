/*!
 * Core types and data structures for the vhdcollect application
 */

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use strum::Display;

use crate::error::{AcquireError, Result};
use crate::utils::strip_surrounding_quotes;

/// Kind of a top-level source path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A single regular file
    File,
    /// A directory tree
    Directory,
}

/// A validated path supplied by the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePath {
    /// Absolute path
    pub path: PathBuf,
    /// Kind determined at intake
    pub kind: SourceKind,
}

impl SourcePath {
    /// Validate an existing path and classify it
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = fs::metadata(path).map_err(|e| {
            AcquireError::validation(path.display().to_string(), format!("Path not found ({})", e))
        })?;

        let kind = if metadata.is_dir() {
            SourceKind::Directory
        } else if metadata.is_file() {
            SourceKind::File
        } else {
            return Err(AcquireError::validation(
                path.display().to_string(),
                "not a regular file or directory",
            ));
        };

        let path = fs::canonicalize(path)?;
        Ok(Self {
            path: strip_verbatim_prefix(path),
            kind,
        })
    }

    /// Validate a line typed by the operator, stripping surrounding quotes
    pub fn from_operator_input(input: &str) -> Result<Self> {
        let cleaned = strip_surrounding_quotes(input.trim());
        if cleaned.is_empty() {
            return Err(AcquireError::validation(input, "empty path"));
        }
        Self::new(cleaned)
    }

    /// Final path component, used as the name inside the container
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| root_name(&self.path))
    }
}

/// Name for a source that has no final component (a drive or filesystem root)
fn root_name(path: &Path) -> String {
    let cleaned: String = path
        .to_string_lossy()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    if cleaned.is_empty() {
        "root".to_string()
    } else {
        format!("{}_root", cleaned)
    }
}

/// Fully qualified form of an existing directory, without the `\\?\` prefix.
/// diskpart only accepts fully qualified backing file paths.
pub fn absolute_directory(path: &Path) -> Result<PathBuf> {
    let canonical = fs::canonicalize(path).map_err(|e| {
        AcquireError::validation(path.display().to_string(), format!("Directory not found ({})", e))
    })?;
    if !canonical.is_dir() {
        return Err(AcquireError::validation(
            path.display().to_string(),
            "destination is not a directory",
        ));
    }
    Ok(strip_verbatim_prefix(canonical))
}

/// `fs::canonicalize` on Windows yields `\\?\C:\...`; keep the familiar form
fn strip_verbatim_prefix(path: PathBuf) -> PathBuf {
    let text = path.to_string_lossy();
    match text.strip_prefix(r"\\?\") {
        Some(rest) if !rest.starts_with("UNC\\") => PathBuf::from(rest),
        _ => path,
    }
}

/// Size of one source path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathSize {
    /// Source path
    pub path: PathBuf,
    /// Source kind
    pub kind: SourceKind,
    /// Raw byte total of all regular files
    pub bytes: u64,
    /// Number of regular files counted
    pub files: u64,
    /// Capacity to provision for this path, in MB
    pub capacity_mb: u64,
}

/// Total capacity needed for a set of sources
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SizingResult {
    /// Per-path sizes, in input order
    pub items: Vec<PathSize>,
    /// Sum of per-path capacities, in MB
    pub total_mb: u64,
}

impl SizingResult {
    /// Raw byte total over all sources
    pub fn total_bytes(&self) -> u64 {
        self.items.iter().map(|item| item.bytes).sum()
    }

    /// File total over all sources
    pub fn total_files(&self) -> u64 {
        self.items.iter().map(|item| item.files).sum()
    }
}

/// Virtual disk file format, selected by the backing file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, clap::ValueEnum)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ContainerFormat {
    /// Legacy VHD, readable by every Windows release since 7
    Vhd,
    /// VHDX
    Vhdx,
}

impl ContainerFormat {
    /// Backing file extension
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Vhd => "vhd",
            Self::Vhdx => "vhdx",
        }
    }

    /// Largest capacity the format can declare, in MB
    pub fn limit_mb(&self) -> u64 {
        match self {
            Self::Vhd => 2040 * 1024,
            Self::Vhdx => 64 * 1024 * 1024,
        }
    }
}

/// Lifecycle of a container within one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    /// Backing file not yet created
    Uncreated,
    /// Created, attached and mounted
    Attached { mount_point: PathBuf },
    /// Detached; `forced` when reached through failure cleanup
    Detached { forced: bool },
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uncreated => write!(f, "uncreated"),
            Self::Attached { mount_point } => write!(f, "attached at {}", mount_point.display()),
            Self::Detached { forced: false } => write!(f, "detached"),
            Self::Detached { forced: true } => write!(f, "detached (forced)"),
        }
    }
}

/// The virtual disk artifact of one run
#[derive(Debug, Clone)]
pub struct Container {
    /// Backing file path; identifies the container
    pub backing_file: PathBuf,
    /// Declared maximum capacity in MB (thin-provisioned)
    pub capacity_mb: u64,
    /// Current lifecycle state
    state: ContainerState,
}

impl Container {
    /// A container that does not exist yet
    pub fn new(backing_file: impl Into<PathBuf>, capacity_mb: u64) -> Self {
        Self {
            backing_file: backing_file.into(),
            capacity_mb,
            state: ContainerState::Uncreated,
        }
    }

    /// Current state
    pub fn state(&self) -> &ContainerState {
        &self.state
    }

    /// Mount point while attached
    pub fn mount_point(&self) -> Option<&Path> {
        match &self.state {
            ContainerState::Attached { mount_point } => Some(mount_point),
            _ => None,
        }
    }

    /// `UNCREATED -> CREATED_ATTACHED`
    pub fn mark_attached(&mut self, mount_point: PathBuf) -> Result<()> {
        match self.state {
            ContainerState::Uncreated => {
                self.state = ContainerState::Attached { mount_point };
                Ok(())
            }
            _ => Err(AcquireError::InvalidState {
                operation: "attach",
                state: self.state.to_string(),
            }),
        }
    }

    /// Any state `-> DETACHED`. Returns false when already detached.
    pub fn mark_detached(&mut self, forced: bool) -> bool {
        if matches!(self.state, ContainerState::Detached { .. }) {
            return false;
        }
        self.state = ContainerState::Detached { forced };
        true
    }
}

/// Platform attribute flags of a file or directory.
///
/// On Windows these are the `FILE_ATTRIBUTE_*` bits; on Unix the
/// permission mode bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileAttributes(pub u32);

impl FileAttributes {
    /// Whether the entry is read-only
    pub fn is_readonly(&self) -> bool {
        if cfg!(windows) {
            self.0 & 0x1 != 0
        } else {
            self.0 & 0o222 == 0
        }
    }
}

impl fmt::Display for FileAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if cfg!(windows) {
            write!(f, "0x{:08x}", self.0)
        } else {
            write!(f, "{:o}", self.0)
        }
    }
}

/// Metadata captured from a source entry and reapplied to its copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadataSnapshot {
    /// Creation time, where the platform reports one
    pub created: Option<SystemTime>,
    /// Last access time
    pub accessed: SystemTime,
    /// Last modification time
    pub modified: SystemTime,
    /// Attribute flags
    pub attributes: FileAttributes,
}

/// Metadata replication step that can fail without aborting a copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MetadataStep {
    Snapshot,
    Timestamps,
    Attributes,
    Acl,
    Skipped,
}

/// A best-effort metadata step that did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataWarning {
    /// Affected path
    pub path: PathBuf,
    /// Step that failed
    pub step: MetadataStep,
    /// What went wrong
    pub message: String,
}

impl fmt::Display for MetadataWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.path.display(), self.step, self.message)
    }
}

/// Result of a best-effort probe: a value, or a placeholder to show instead
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    /// Probe succeeded
    Value(T),
    /// Probe failed; render `placeholder`
    Degraded { placeholder: String, reason: String },
}

impl<T> Probe<T> {
    /// Degraded probe with the standard placeholder
    pub fn degraded(reason: impl Into<String>) -> Self {
        Self::Degraded {
            placeholder: "Unable to determine".to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the probe fell back to its placeholder
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

/// Counters for one copied source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CopyStats {
    /// Regular files copied
    pub files: u64,
    /// Directories created
    pub directories: u64,
    /// Content bytes written
    pub bytes: u64,
    /// Entries not copied (directory links, special files)
    pub skipped: u64,
    /// Best-effort metadata failures
    pub warnings: Vec<MetadataWarning>,
}

impl CopyStats {
    /// Fold another set of counters into this one
    pub fn absorb(&mut self, other: CopyStats) {
        self.files += other.files;
        self.directories += other.directories;
        self.bytes += other.bytes;
        self.skipped += other.skipped;
        self.warnings.extend(other.warnings);
    }
}

/// Outcome of copying one top-level source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyRecord {
    /// Source path as validated at intake
    pub source: PathBuf,
    /// Source kind
    pub kind: SourceKind,
    /// Destination inside the container
    pub destination: PathBuf,
    /// Counters and warnings
    pub stats: CopyStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn source_path_classifies_kind() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("evidence.bin");
        fs::write(&file, b"abc").unwrap();

        assert_eq!(SourcePath::new(dir.path()).unwrap().kind, SourceKind::Directory);
        assert_eq!(SourcePath::new(&file).unwrap().kind, SourceKind::File);
        assert_eq!(SourcePath::new(&file).unwrap().file_name(), "evidence.bin");
    }

    #[test]
    fn destination_is_made_absolute() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("out")).unwrap();
        let relative = dir.path().join("out").join("..").join("out");

        let absolute = absolute_directory(&relative).unwrap();
        assert!(absolute.is_absolute());
        assert!(!absolute.to_string_lossy().starts_with(r"\\?\"));
        assert!(absolute.ends_with("out"));

        let file = dir.path().join("evidence.bin");
        fs::write(&file, b"abc").unwrap();
        assert!(matches!(absolute_directory(&file), Err(AcquireError::Validation { .. })));
        assert!(matches!(
            absolute_directory(&dir.path().join("missing")),
            Err(AcquireError::Validation { .. })
        ));
    }

    #[test]
    fn source_path_strips_operator_quotes() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("with space.txt");
        fs::write(&file, b"x").unwrap();

        let quoted = format!("  \"{}\"  ", file.display());
        let source = SourcePath::from_operator_input(&quoted).unwrap();
        assert_eq!(source.file_name(), "with space.txt");
    }

    #[test]
    fn source_path_rejects_missing() {
        let dir = tempdir().unwrap();
        let err = SourcePath::new(dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, AcquireError::Validation { .. }));

        let err = SourcePath::from_operator_input("\"\"").unwrap_err();
        assert!(matches!(err, AcquireError::Validation { .. }));
    }

    #[test]
    fn container_state_machine() {
        let mut container = Container::new("storage.vhd", 100);
        assert_eq!(container.state(), &ContainerState::Uncreated);
        assert!(container.mount_point().is_none());

        container.mark_attached(PathBuf::from("V:\\")).unwrap();
        assert_eq!(container.mount_point(), Some(Path::new("V:\\")));
        assert!(container.mark_attached(PathBuf::from("W:\\")).is_err());

        assert!(container.mark_detached(false));
        assert!(!container.mark_detached(true));
        assert_eq!(container.state(), &ContainerState::Detached { forced: false });
        assert!(container.mark_attached(PathBuf::from("V:\\")).is_err());
    }

    #[test]
    fn container_format_limits() {
        assert_eq!(ContainerFormat::Vhd.extension(), "vhd");
        assert_eq!(ContainerFormat::Vhd.limit_mb(), 2_088_960);
        assert!(ContainerFormat::Vhdx.limit_mb() > ContainerFormat::Vhd.limit_mb());
        assert_eq!(ContainerFormat::Vhdx.to_string(), "VHDX");
    }

    #[test]
    fn copy_stats_absorb() {
        let mut total = CopyStats {
            files: 1,
            bytes: 10,
            ..Default::default()
        };
        total.absorb(CopyStats {
            files: 2,
            directories: 1,
            bytes: 5,
            skipped: 1,
            warnings: vec![MetadataWarning {
                path: PathBuf::from("a"),
                step: MetadataStep::Acl,
                message: "denied".to_string(),
            }],
        });

        assert_eq!(total.files, 3);
        assert_eq!(total.directories, 1);
        assert_eq!(total.bytes, 15);
        assert_eq!(total.skipped, 1);
        assert_eq!(total.warnings.len(), 1);
        assert_eq!(total.warnings[0].to_string(), "a (acl): denied");
    }
}
