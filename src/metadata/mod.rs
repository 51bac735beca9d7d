/*!
 * Capture and reapplication of file metadata
 *
 * Timestamps go through `filetime` on every platform; creation time and
 * attribute flags need the Windows API, and on Unix the attribute flags
 * are the permission bits.
 */

mod acl;

pub use acl::Icacls;

use std::fs;
use std::io;
use std::path::Path;

use filetime::FileTime;

use crate::types::{FileAttributes, FileMetadataSnapshot};

/// Snapshot the timestamps and attribute flags of `path`, following links
pub fn capture(path: &Path) -> io::Result<FileMetadataSnapshot> {
    let metadata = fs::metadata(path)?;

    Ok(FileMetadataSnapshot {
        created: metadata.created().ok(),
        accessed: metadata.accessed()?,
        modified: metadata.modified()?,
        attributes: attributes_of(&metadata),
    })
}

/// Set access, modification and (where supported) creation time of `path`
pub fn apply_timestamps(path: &Path, snapshot: &FileMetadataSnapshot) -> io::Result<()> {
    let atime = FileTime::from_system_time(snapshot.accessed);
    let mtime = FileTime::from_system_time(snapshot.modified);
    filetime::set_file_times(path, atime, mtime)?;

    if let Some(created) = snapshot.created {
        set_creation_time(path, created)?;
    }
    Ok(())
}

/// Set the attribute flags of `path`
pub fn apply_attributes(path: &Path, attributes: FileAttributes) -> io::Result<()> {
    set_attributes(path, attributes)
}

#[cfg(windows)]
fn attributes_of(metadata: &fs::Metadata) -> FileAttributes {
    use std::os::windows::fs::MetadataExt;
    FileAttributes(metadata.file_attributes())
}

#[cfg(unix)]
fn attributes_of(metadata: &fs::Metadata) -> FileAttributes {
    use std::os::unix::fs::PermissionsExt;
    FileAttributes(metadata.permissions().mode() & 0o7777)
}

#[cfg(not(any(windows, unix)))]
fn attributes_of(metadata: &fs::Metadata) -> FileAttributes {
    FileAttributes(metadata.permissions().readonly() as u32)
}

/// Attribute bits `SetFileAttributesW` accepts
#[cfg(windows)]
const SETTABLE_ATTRIBUTES: u32 = 0x0000_0001 // READONLY
    | 0x0000_0002 // HIDDEN
    | 0x0000_0004 // SYSTEM
    | 0x0000_0020 // ARCHIVE
    | 0x0000_0100 // TEMPORARY
    | 0x0000_1000 // OFFLINE
    | 0x0000_2000; // NOT_CONTENT_INDEXED

#[cfg(windows)]
fn set_attributes(path: &Path, attributes: FileAttributes) -> io::Result<()> {
    use std::os::windows::ffi::OsStrExt;
    use windows::core::PCWSTR;
    use windows::Win32::Storage::FileSystem::{
        SetFileAttributesW, FILE_ATTRIBUTE_NORMAL, FILE_FLAGS_AND_ATTRIBUTES,
    };

    let settable = attributes.0 & SETTABLE_ATTRIBUTES;
    let flags = if settable == 0 {
        FILE_ATTRIBUTE_NORMAL
    } else {
        FILE_FLAGS_AND_ATTRIBUTES(settable)
    };

    let wide: Vec<u16> = path
        .as_os_str()
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();
    unsafe { SetFileAttributesW(PCWSTR(wide.as_ptr()), flags) }
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
}

#[cfg(unix)]
fn set_attributes(path: &Path, attributes: FileAttributes) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(attributes.0))
}

#[cfg(not(any(windows, unix)))]
fn set_attributes(path: &Path, attributes: FileAttributes) -> io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_readonly(attributes.0 != 0);
    fs::set_permissions(path, permissions)
}

#[cfg(windows)]
fn set_creation_time(path: &Path, created: std::time::SystemTime) -> io::Result<()> {
    use std::fs::{FileTimes, OpenOptions};
    use std::os::windows::fs::{FileTimesExt, OpenOptionsExt};

    const FILE_WRITE_ATTRIBUTES: u32 = 0x0000_0100;
    // Needed to open directories.
    const FILE_FLAG_BACKUP_SEMANTICS: u32 = 0x0200_0000;

    let file = OpenOptions::new()
        .access_mode(FILE_WRITE_ATTRIBUTES)
        .custom_flags(FILE_FLAG_BACKUP_SEMANTICS)
        .open(path)?;
    file.set_times(FileTimes::new().set_created(created))
}

#[cfg(not(windows))]
fn set_creation_time(_path: &Path, _created: std::time::SystemTime) -> io::Result<()> {
    // Birth time cannot be set through the POSIX API.
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    #[test]
    fn timestamps_round_trip() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.txt");
        let dst = dir.path().join("dst.txt");
        fs::write(&src, b"source").unwrap();
        fs::write(&dst, b"destination").unwrap();

        let atime = FileTime::from_unix_time(1_500_000_000, 0);
        let mtime = FileTime::from_unix_time(1_400_000_000, 123_000_000);
        filetime::set_file_times(&src, atime, mtime).unwrap();

        let snapshot = capture(&src).unwrap();
        apply_timestamps(&dst, &snapshot).unwrap();

        let copied = capture(&dst).unwrap();
        assert_eq!(copied.modified, snapshot.modified);
        assert_eq!(copied.accessed, snapshot.accessed);
        assert_eq!(
            FileTime::from_system_time(copied.modified),
            FileTime::from_unix_time(1_400_000_000, 123_000_000)
        );
    }

    #[test]
    fn directory_timestamps_can_be_set() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();

        let snapshot = FileMetadataSnapshot {
            created: None,
            accessed: SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000_000),
            modified: SystemTime::UNIX_EPOCH + Duration::from_secs(900_000_000),
            attributes: capture(&sub).unwrap().attributes,
        };
        apply_timestamps(&sub, &snapshot).unwrap();
        assert_eq!(capture(&sub).unwrap().modified, snapshot.modified);
    }

    #[cfg(unix)]
    #[test]
    fn permission_bits_round_trip() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::write(&src, b"").unwrap();
        fs::write(&dst, b"").unwrap();

        apply_attributes(&src, FileAttributes(0o640)).unwrap();
        let snapshot = capture(&src).unwrap();
        assert_eq!(snapshot.attributes, FileAttributes(0o640));

        apply_attributes(&dst, snapshot.attributes).unwrap();
        assert_eq!(capture(&dst).unwrap().attributes, FileAttributes(0o640));

        apply_attributes(&dst, FileAttributes(0o444)).unwrap();
        assert!(capture(&dst).unwrap().attributes.is_readonly());
    }

    #[cfg(windows)]
    #[test]
    fn hidden_and_readonly_round_trip() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::write(&src, b"").unwrap();
        fs::write(&dst, b"").unwrap();

        apply_attributes(&src, FileAttributes(0x1 | 0x2)).unwrap();
        let snapshot = capture(&src).unwrap();
        apply_attributes(&dst, snapshot.attributes).unwrap();
        let copied = capture(&dst).unwrap().attributes;
        assert_eq!(copied.0 & 0x3, 0x3);
        assert!(copied.is_readonly());

        apply_attributes(&src, FileAttributes(0)).unwrap();
        apply_attributes(&dst, FileAttributes(0)).unwrap();
    }

    #[test]
    fn capture_of_missing_path_fails() {
        let dir = tempdir().unwrap();
        assert!(capture(&dir.path().join("missing")).is_err());
    }
}
