/*!
 * Metadata-preserving copy of files and directory trees
 */

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indicatif::ProgressBar;

use crate::error::{AcquireError, Result};
use crate::manifest::MANIFEST_FILE;
use crate::metadata::{self, Icacls};
use crate::types::{
    CopyRecord, CopyStats, FileMetadataSnapshot, MetadataStep, MetadataWarning, SourceKind,
    SourcePath,
};

/// Copies sources into a destination root, reproducing content and metadata
pub struct Copier {
    /// ACL replication, when enabled and supported
    acl: Option<Icacls>,
    /// Progress bar advanced once per copied file
    pub progress: Arc<ProgressBar>,
}

impl Copier {
    /// Create a new copier
    pub fn new(progress: Arc<ProgressBar>) -> Self {
        Self {
            acl: None,
            progress,
        }
    }

    /// Replicate ACLs of copied files with `icacls`
    pub fn with_acl(mut self, acl: Icacls) -> Self {
        self.acl = Some(acl);
        self
    }

    /// Copy one top-level source to `<dest_root>/<source name>`
    pub fn copy_source(&self, source: &SourcePath, dest_root: &Path) -> Result<CopyRecord> {
        let destination = unique_destination(dest_root, &source.file_name());
        tracing::info!(
            source = %source.path.display(),
            destination = %destination.display(),
            kind = %source.kind,
            "copying source"
        );

        let stats = match source.kind {
            SourceKind::File => self.copy_file(&source.path, &destination)?,
            SourceKind::Directory => self.copy_directory(&source.path, &destination)?,
        };

        tracing::info!(
            source = %source.path.display(),
            files = stats.files,
            directories = stats.directories,
            bytes = stats.bytes,
            warnings = stats.warnings.len(),
            "source copied"
        );

        Ok(CopyRecord {
            source: source.path.clone(),
            kind: source.kind,
            destination,
            stats,
        })
    }

    /// Copy one file's content, then reapply its timestamps, attribute flags
    /// and ACL. Only the content step can fail the copy.
    pub fn copy_file(&self, src: &Path, dst: &Path) -> Result<CopyStats> {
        let mut stats = CopyStats::default();
        self.show_current(src);

        let snapshot = self.snapshot(src, &mut stats.warnings);

        stats.bytes = copy_content(src, dst).map_err(|source| AcquireError::ContentCopy {
            from: src.to_path_buf(),
            to: dst.to_path_buf(),
            source,
        })?;
        stats.files = 1;
        tracing::debug!(src = %src.display(), dst = %dst.display(), bytes = stats.bytes, "copied file");

        if let Some(snapshot) = &snapshot {
            self.restore(dst, snapshot, &mut stats.warnings);
        }

        if let Some(acl) = &self.acl {
            if let Err(e) = acl.replicate(src, dst) {
                record(&mut stats.warnings, dst, MetadataStep::Acl, e.to_string());
            }
        }

        self.progress.inc(1);
        Ok(stats)
    }

    /// Mirror a directory tree depth-first: subdirectories, then files.
    pub fn copy_directory(&self, src: &Path, dst: &Path) -> Result<CopyStats> {
        let mut stats = CopyStats::default();
        let snapshot = self.snapshot(src, &mut stats.warnings);

        fs::create_dir_all(dst).map_err(|source| AcquireError::ContentCopy {
            from: src.to_path_buf(),
            to: dst.to_path_buf(),
            source,
        })?;
        stats.directories = 1;

        let (dirs, files) = self.list_children(src, dst, &mut stats)?;

        for name in dirs {
            let child = self.copy_directory(&src.join(&name), &dst.join(&name))?;
            stats.absorb(child);
        }

        for name in files {
            let child = self.copy_file(&src.join(&name), &dst.join(&name))?;
            stats.absorb(child);
        }

        // Reapplied last: writing children changes the directory's times, and
        // a read-only mode would have blocked creating them.
        if let Some(snapshot) = &snapshot {
            self.restore(dst, snapshot, &mut stats.warnings);
        }

        Ok(stats)
    }

    /// Split the entries of `src` into subdirectories and files, sorted by
    /// name. Links to directories and special files are skipped.
    fn list_children(
        &self,
        src: &Path,
        dst: &Path,
        stats: &mut CopyStats,
    ) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
        let read_error = |source: io::Error| AcquireError::ContentCopy {
            from: src.to_path_buf(),
            to: dst.to_path_buf(),
            source,
        };

        let mut entries = fs::read_dir(src)
            .map_err(read_error)?
            .collect::<io::Result<Vec<_>>>()
            .map_err(read_error)?;
        entries.sort_by_key(|entry| entry.file_name());

        let mut dirs = Vec::new();
        let mut files = Vec::new();

        for entry in entries {
            let name = PathBuf::from(entry.file_name());
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!(path = %path.display(), "entry vanished before copy");
                    continue;
                }
                Err(e) => return Err(read_error(e)),
            };

            if file_type.is_dir() {
                dirs.push(name);
            } else if file_type.is_file() {
                files.push(name);
            } else if file_type.is_symlink() {
                match fs::metadata(&path) {
                    Ok(target) if target.is_file() => files.push(name),
                    Ok(_) => self.skip(stats, &path, "link to a directory is not followed"),
                    Err(e) => self.skip(stats, &path, &format!("dangling link ({})", e)),
                }
            } else {
                self.skip(stats, &path, "not a regular file or directory");
            }
        }

        Ok((dirs, files))
    }

    fn snapshot(
        &self,
        path: &Path,
        warnings: &mut Vec<MetadataWarning>,
    ) -> Option<FileMetadataSnapshot> {
        match metadata::capture(path) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                record(warnings, path, MetadataStep::Snapshot, e.to_string());
                None
            }
        }
    }

    /// Timestamps first, then attributes: a read-only flag must not stand in
    /// the way of the timestamp update.
    fn restore(
        &self,
        dst: &Path,
        snapshot: &FileMetadataSnapshot,
        warnings: &mut Vec<MetadataWarning>,
    ) {
        if let Err(e) = metadata::apply_timestamps(dst, snapshot) {
            record(warnings, dst, MetadataStep::Timestamps, e.to_string());
        }
        if let Err(e) = metadata::apply_attributes(dst, snapshot.attributes) {
            record(warnings, dst, MetadataStep::Attributes, e.to_string());
        }
    }

    fn skip(&self, stats: &mut CopyStats, path: &Path, reason: &str) {
        stats.skipped += 1;
        record(&mut stats.warnings, path, MetadataStep::Skipped, reason.to_string());
    }

    fn show_current(&self, path: &Path) {
        let file_name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let count = file_name.chars().count();
        let display_name = if count > 40 {
            let tail: String = file_name.chars().skip(count - 37).collect();
            format!("...{}", tail)
        } else {
            file_name
        };
        self.progress
            .set_message(format!("Current file: {}", display_name));
    }
}

fn record(warnings: &mut Vec<MetadataWarning>, path: &Path, step: MetadataStep, message: String) {
    tracing::warn!(path = %path.display(), step = %step, "{}", message);
    warnings.push(MetadataWarning {
        path: path.to_path_buf(),
        step,
        message,
    });
}

/// Stream the bytes of `src` into a new file at `dst`
fn copy_content(src: &Path, dst: &Path) -> io::Result<u64> {
    let mut reader = File::open(src)?;
    let mut writer = OpenOptions::new().write(true).create_new(true).open(dst)?;
    let bytes = io::copy(&mut reader, &mut writer)?;
    writer.sync_all()?;
    Ok(bytes)
}

/// `<root>/<name>`, or `<root>/<stem>_<n><.ext>` when two sources share a
/// name. The manifest name is always taken, in any letter case.
fn unique_destination(root: &Path, name: &str) -> PathBuf {
    let taken = |path: &Path| {
        path.exists()
            || path
                .file_name()
                .is_some_and(|n| n.to_string_lossy().eq_ignore_ascii_case(MANIFEST_FILE))
    };

    let candidate = root.join(name);
    if !taken(&candidate) {
        return candidate;
    }

    let as_path = Path::new(name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| name.to_string());
    let ext = as_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (1..)
        .map(|n| root.join(format!("{}_{}{}", stem, n, ext)))
        .find(|path| !taken(path))
        .unwrap_or(candidate)
}
