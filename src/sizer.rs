/*!
 * Container capacity computation
 */

use std::fs;
use std::io;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::{AcquireError, Result};
use crate::types::{PathSize, SizingResult, SourceKind, SourcePath};
use crate::utils::BYTES_PER_MIB;

/// Floor applied to every source path individually, in MB
pub const MINIMUM_CAPACITY_MB: u64 = 100;

/// Filesystem overhead allowance: capacity = bytes * 6/5
const OVERHEAD_NUMERATOR: u128 = 6;
const OVERHEAD_DENOMINATOR: u128 = 5;

/// Capacity in MB for `bytes` of content: `ceil(bytes / MiB * 1.2)`, floored
/// at [`MINIMUM_CAPACITY_MB`].
pub fn capacity_for_bytes(bytes: u64) -> u64 {
    let scaled = bytes as u128 * OVERHEAD_NUMERATOR;
    let divisor = BYTES_PER_MIB as u128 * OVERHEAD_DENOMINATOR;
    let mb = scaled.div_ceil(divisor);
    u64::try_from(mb)
        .unwrap_or(u64::MAX)
        .max(MINIMUM_CAPACITY_MB)
}

/// Computes how large a container must be to hold a set of sources
#[derive(Debug, Clone, Default)]
pub struct Sizer;

impl Sizer {
    /// Create a new sizer
    pub fn new() -> Self {
        Self
    }

    /// Size every source and sum the per-path capacities
    pub fn size_all(&self, sources: &[SourcePath]) -> Result<SizingResult> {
        let items = sources
            .iter()
            .map(|source| self.size_path(source))
            .collect::<Result<Vec<_>>>()?;
        let total_mb = items.iter().map(|item| item.capacity_mb).sum();

        tracing::info!(sources = items.len(), total_mb, "sizing complete");
        Ok(SizingResult { items, total_mb })
    }

    /// Size a single source
    pub fn size_path(&self, source: &SourcePath) -> Result<PathSize> {
        let (bytes, files) = match source.kind {
            SourceKind::File => {
                let metadata = fs::metadata(&source.path).map_err(|e| {
                    AcquireError::validation(
                        source.path.display().to_string(),
                        format!("Path not found ({})", e),
                    )
                })?;
                (metadata.len(), 1)
            }
            SourceKind::Directory => directory_totals(&source.path),
        };

        let capacity_mb = capacity_for_bytes(bytes);
        tracing::debug!(
            path = %source.path.display(),
            kind = %source.kind,
            bytes,
            files,
            capacity_mb,
            "sized source"
        );

        Ok(PathSize {
            path: source.path.clone(),
            kind: source.kind,
            bytes,
            files,
            capacity_mb,
        })
    }
}

/// Byte and file totals over every regular file reachable below `dir`.
///
/// Entries that vanish between listing and the size query are skipped;
/// unreadable entries are skipped with a warning.
fn directory_totals(dir: &Path) -> (u64, u64) {
    let mut bytes = 0u64;
    let mut files = 0u64;

    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log_skipped(e.path().unwrap_or(dir), e.io_error());
                continue;
            }
        };

        let file_type = entry.file_type();
        let len = if file_type.is_file() {
            entry.metadata().map(|m| m.len()).map_err(io::Error::from)
        } else if file_type.is_symlink() {
            // Links to files are copied as content; links to directories are not followed.
            match fs::metadata(entry.path()) {
                Ok(m) if m.is_file() => Ok(m.len()),
                Ok(_) => continue,
                Err(e) => Err(e),
            }
        } else {
            continue;
        };

        match len {
            Ok(len) => {
                bytes = bytes.saturating_add(len);
                files += 1;
            }
            Err(e) => log_skipped(entry.path(), Some(&e)),
        }
    }

    (bytes, files)
}

fn log_skipped(path: &Path, error: Option<&io::Error>) {
    match error {
        Some(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "entry vanished during sizing");
        }
        Some(e) => {
            tracing::warn!(path = %path.display(), error = %e, "skipping unreadable entry during sizing");
        }
        None => {
            tracing::warn!(path = %path.display(), "skipping filesystem loop during sizing");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    const MIB: u64 = BYTES_PER_MIB;

    fn sparse_file(path: &Path, len: u64) {
        File::create(path).unwrap().set_len(len).unwrap();
    }

    #[test]
    fn capacity_formula() {
        assert_eq!(capacity_for_bytes(0), 100);
        assert_eq!(capacity_for_bytes(10 * MIB), 100);
        assert_eq!(capacity_for_bytes(500 * MIB), 600);
        // ceil, never floor
        assert_eq!(capacity_for_bytes(100 * MIB + 1), 121);
        assert_eq!(capacity_for_bytes(u64::MAX), 21_110_623_253_300);
    }

    #[test]
    fn capacity_never_below_raw_size() {
        for bytes in [1, MIB - 1, 83 * MIB + 7, 1000 * MIB, 4096 * MIB + 3] {
            let mb = capacity_for_bytes(bytes);
            assert!(mb * MIB >= bytes);
            assert!(mb >= (bytes * 6).div_ceil(5 * MIB));
            assert!(mb >= MINIMUM_CAPACITY_MB);
        }
    }

    #[test]
    fn single_small_file_is_floored() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("ten.bin");
        sparse_file(&file, 10 * MIB);

        let source = SourcePath::new(&file).unwrap();
        let size = Sizer::new().size_path(&source).unwrap();
        assert_eq!(size.bytes, 10 * MIB);
        assert_eq!(size.files, 1);
        assert_eq!(size.capacity_mb, 100);
    }

    #[test]
    fn file_removed_after_intake_is_a_validation_error() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("gone.bin");
        fs::write(&file, b"abc").unwrap();
        let source = SourcePath::new(&file).unwrap();
        fs::remove_file(&file).unwrap();

        match Sizer::new().size_path(&source) {
            Err(AcquireError::Validation { path, .. }) => assert!(path.ends_with("gone.bin")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn directory_is_summed_recursively() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        sparse_file(&dir.path().join("one.bin"), 200 * MIB);
        sparse_file(&dir.path().join("a/two.bin"), 200 * MIB);
        sparse_file(&dir.path().join("a/b/three.bin"), 100 * MIB);

        let source = SourcePath::new(dir.path()).unwrap();
        let size = Sizer::new().size_path(&source).unwrap();
        assert_eq!(size.bytes, 500 * MIB);
        assert_eq!(size.files, 3);
        assert_eq!(size.capacity_mb, 600);
    }

    #[test]
    fn sizes_are_additive_per_path() {
        let root = tempdir().unwrap();
        let file = root.path().join("ten.bin");
        sparse_file(&file, 10 * MIB);
        let tree = root.path().join("tree");
        fs::create_dir(&tree).unwrap();
        sparse_file(&tree.join("big.bin"), 500 * MIB);

        let sources = vec![SourcePath::new(&file).unwrap(), SourcePath::new(&tree).unwrap()];
        let result = Sizer::new().size_all(&sources).unwrap();
        assert_eq!(result.items.len(), 2);
        assert_eq!(result.total_mb, 700);
        assert_eq!(result.total_bytes(), 510 * MIB);
        assert_eq!(result.total_files(), 2);
    }

    #[test]
    fn two_tiny_paths_each_get_the_floor() {
        let root = tempdir().unwrap();
        let a = root.path().join("a.txt");
        let b = root.path().join("b.txt");
        fs::write(&a, b"a").unwrap();
        fs::write(&b, b"b").unwrap();

        let sources = vec![SourcePath::new(&a).unwrap(), SourcePath::new(&b).unwrap()];
        assert_eq!(Sizer::new().size_all(&sources).unwrap().total_mb, 200);
    }

    #[test]
    fn empty_directory_gets_the_floor() {
        let dir = tempdir().unwrap();
        let source = SourcePath::new(dir.path()).unwrap();
        let size = Sizer::new().size_path(&source).unwrap();
        assert_eq!(size.bytes, 0);
        assert_eq!(size.capacity_mb, MINIMUM_CAPACITY_MB);
    }

    #[cfg(unix)]
    #[test]
    fn dangling_links_are_skipped() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("real.txt"), b"12345").unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("dangling")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("alias")).unwrap();

        let (bytes, files) = directory_totals(dir.path());
        assert_eq!(bytes, 10);
        assert_eq!(files, 2);
    }
}
