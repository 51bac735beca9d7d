/*!
 * Virtual disk container provisioning
 *
 * A container is created, partitioned, formatted and mounted through a
 * generated diskpart script, and later detached the same way. Scripts are
 * written to uniquely named temporary files that never outlive the call.
 */

mod runner;
mod script;

pub use runner::{run_script, Diskpart, ScriptRunner, UtilityOutput};
pub use script::{quote, Directive, DiskScript, Filesystem, ScriptError};

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDateTime;

use crate::error::{AcquireError, Result};
use crate::types::{Container, ContainerFormat, ContainerState};

/// Drive letter used unless the operator picks another
pub const DEFAULT_MOUNT_LETTER: char = 'V';

/// Volume label given to new containers
pub const DEFAULT_LABEL: &str = "VHD Storage";

/// How the mounted container's drive letter is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountLetter {
    /// Always use this letter
    Fixed(char),
    /// Use a letter no volume currently claims
    Auto,
}

impl Default for MountLetter {
    fn default() -> Self {
        Self::Fixed(DEFAULT_MOUNT_LETTER)
    }
}

impl FromStr for MountLetter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let value = s.trim().trim_end_matches(['\\', '/']).trim_end_matches(':');
        if value.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }

        let mut chars = value.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_alphabetic() => {
                let c = c.to_ascii_uppercase();
                if c < 'C' {
                    Err(format!("drive letter {}: is reserved for floppy drives", c))
                } else {
                    Ok(Self::Fixed(c))
                }
            }
            _ => Err(format!("expected a drive letter or 'auto', got '{}'", s)),
        }
    }
}

impl fmt::Display for MountLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(c) => write!(f, "{}:", c),
            Self::Auto => write!(f, "auto"),
        }
    }
}

/// Whether a detach is part of a normal finish or a failure cleanup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachMode {
    Normal,
    Cleanup,
}

/// Creates and detaches containers
pub trait Provisioner {
    /// Create, attach and mount `container`; returns the mount point
    fn create(&self, container: &mut Container) -> Result<PathBuf>;

    /// Detach `container`. Calling this on a container that was never
    /// attached, or was already detached, must not panic.
    fn detach(&self, container: &mut Container, mode: DetachMode) -> Result<()>;
}

/// Container provisioning through diskpart
pub struct ContainerManager<R: ScriptRunner = Diskpart> {
    runner: R,
    script_dir: PathBuf,
    filesystem: Filesystem,
    label: String,
    mount: MountLetter,
    drive_table: fn() -> Vec<char>,
}

impl<R: ScriptRunner> ContainerManager<R> {
    /// Manager using `runner`, writing scripts to the OS temp directory
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            script_dir: std::env::temp_dir(),
            filesystem: Filesystem::Ntfs,
            label: DEFAULT_LABEL.to_string(),
            mount: MountLetter::default(),
            drive_table: logical_drive_letters,
        }
    }

    /// Directory for temporary scripts
    pub fn with_script_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.script_dir = dir.into();
        self
    }

    /// Filesystem for new containers
    pub fn with_filesystem(mut self, filesystem: Filesystem) -> Self {
        self.filesystem = filesystem;
        self
    }

    /// Volume label for new containers
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Drive letter policy
    pub fn with_mount(mut self, mount: MountLetter) -> Self {
        self.mount = mount;
        self
    }

    /// Source of the letters currently in use
    pub fn with_drive_table(mut self, drive_table: fn() -> Vec<char>) -> Self {
        self.drive_table = drive_table;
        self
    }

    fn resolve_letter(&self) -> Result<char> {
        let in_use = (self.drive_table)();
        match self.mount {
            MountLetter::Fixed(letter) if in_use.contains(&letter) => Err(assign_failure(format!(
                "drive letter {}: is already in use by another volume",
                letter
            ))),
            MountLetter::Fixed(letter) => Ok(letter),
            MountLetter::Auto => choose_free_letter(&in_use)
                .ok_or_else(|| assign_failure("no free drive letter is available".to_string())),
        }
    }
}

impl<R: ScriptRunner> Provisioner for ContainerManager<R> {
    fn create(&self, container: &mut Container) -> Result<PathBuf> {
        if *container.state() != ContainerState::Uncreated {
            return Err(AcquireError::InvalidState {
                operation: "create",
                state: container.state().to_string(),
            });
        }

        let letter = self.resolve_letter()?;
        let script = DiskScript::create_container(
            &container.backing_file,
            container.capacity_mb,
            self.filesystem,
            &self.label,
            letter,
        )
        .render()?;

        tracing::info!(
            container = %container.backing_file.display(),
            capacity_mb = container.capacity_mb,
            letter = %letter,
            "creating container"
        );

        let output = run_script(&self.runner, &self.script_dir, "vhd_create_", &script)
            .map_err(|e| launch_failure("create container", e))?;
        check_output("create container", output)?;

        let mount_point = PathBuf::from(format!("{}:\\", letter));
        container.mark_attached(mount_point.clone())?;
        tracing::info!(mount_point = %mount_point.display(), "container created and mounted");
        Ok(mount_point)
    }

    fn detach(&self, container: &mut Container, mode: DetachMode) -> Result<()> {
        if let ContainerState::Detached { .. } = container.state() {
            tracing::debug!(container = %container.backing_file.display(), "container already detached");
            return Ok(());
        }

        let forced = mode == DetachMode::Cleanup;
        tracing::info!(
            container = %container.backing_file.display(),
            state = %container.state(),
            forced,
            "detaching container"
        );

        // The run relinquishes the container whether or not the utility agrees.
        container.mark_detached(forced);

        let detach_error = |reason: String| AcquireError::Detach {
            container: container.backing_file.clone(),
            reason,
        };

        let script = DiskScript::detach_container(&container.backing_file)
            .render()
            .map_err(|e| detach_error(e.to_string()))?;
        let output = run_script(&self.runner, &self.script_dir, "vhd_detach_", &script)
            .map_err(|e| detach_error(format!("could not launch disk utility: {}", e)))?;
        check_output("detach container", output).map_err(|e| detach_error(e.to_string()))?;

        tracing::info!(container = %container.backing_file.display(), "container detached");
        Ok(())
    }
}

fn check_output(operation: &str, output: UtilityOutput) -> Result<()> {
    if output.success() {
        tracing::debug!(operation, stdout = %output.stdout, stderr = %output.stderr, "disk utility succeeded");
        return Ok(());
    }

    tracing::error!(
        operation,
        exit_code = ?output.exit_code,
        stdout = %output.stdout,
        stderr = %output.stderr,
        "disk utility failed"
    );
    Err(AcquireError::Provisioning {
        operation: operation.to_string(),
        exit_code: output.exit_code,
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

fn launch_failure(operation: &str, error: std::io::Error) -> AcquireError {
    tracing::error!(operation, error = %error, "could not launch disk utility");
    AcquireError::Provisioning {
        operation: operation.to_string(),
        exit_code: None,
        stdout: String::new(),
        stderr: format!("could not launch disk utility: {}", error),
    }
}

fn assign_failure(reason: String) -> AcquireError {
    AcquireError::Provisioning {
        operation: "assign drive letter".to_string(),
        exit_code: None,
        stdout: String::new(),
        stderr: reason,
    }
}

/// Highest letter in `D..=Z` that no volume claims
pub fn choose_free_letter(in_use: &[char]) -> Option<char> {
    ('D'..='Z').rev().find(|letter| !in_use.contains(letter))
}

/// Backing file path `storage_<YYYYMMDD_HHMMSS>.<ext>` in `dir`, with a
/// `_N` suffix when that name is already taken.
pub fn backing_file_path(dir: &Path, timestamp: NaiveDateTime, format: ContainerFormat) -> PathBuf {
    let stem = format!("storage_{}", timestamp.format("%Y%m%d_%H%M%S"));
    let ext = format.extension();

    let mut candidate = dir.join(format!("{}.{}", stem, ext));
    let mut n = 1;
    while candidate.exists() {
        candidate = dir.join(format!("{}_{}.{}", stem, n, ext));
        n += 1;
    }
    candidate
}

/// Letters of all logical drives currently present
#[cfg(windows)]
pub fn logical_drive_letters() -> Vec<char> {
    use windows::Win32::Storage::FileSystem::GetLogicalDrives;

    let mask = unsafe { GetLogicalDrives() };
    ('A'..='Z')
        .enumerate()
        .filter(|(idx, _)| mask & (1u32 << idx) != 0)
        .map(|(_, letter)| letter)
        .collect()
}

/// Letters of all logical drives currently present
#[cfg(not(windows))]
pub fn logical_drive_letters() -> Vec<char> {
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::cell::RefCell;
    use std::fs;
    use std::io;
    use tempfile::tempdir;

    /// Records every script and answers with a canned result
    struct FakeDiskpart {
        scripts: RefCell<Vec<String>>,
        exit_code: Option<i32>,
        stdout: &'static str,
    }

    impl FakeDiskpart {
        fn answering(exit_code: Option<i32>, stdout: &'static str) -> Self {
            Self {
                scripts: RefCell::new(Vec::new()),
                exit_code,
                stdout,
            }
        }
    }

    impl ScriptRunner for &FakeDiskpart {
        fn run(&self, script: &Path) -> io::Result<UtilityOutput> {
            self.scripts.borrow_mut().push(fs::read_to_string(script)?);
            Ok(UtilityOutput {
                exit_code: self.exit_code,
                stdout: self.stdout.to_string(),
                stderr: String::new(),
            })
        }
    }

    fn no_drives() -> Vec<char> {
        Vec::new()
    }

    fn busy_drives() -> Vec<char> {
        vec!['C', 'D', 'V', 'Z']
    }

    #[test]
    fn create_attaches_and_reports_mount_point() {
        let scripts = tempdir().unwrap();
        let fake = FakeDiskpart::answering(Some(0), "DiskPart successfully assigned the drive letter");
        let manager = ContainerManager::new(&fake)
            .with_script_dir(scripts.path())
            .with_drive_table(no_drives);

        let mut container = Container::new(r"D:\out\storage_20240101_000000.vhd", 700);
        let mount = manager.create(&mut container).unwrap();

        assert_eq!(mount, PathBuf::from("V:\\"));
        assert_eq!(container.mount_point(), Some(Path::new("V:\\")));
        let seen = fake.scripts.borrow();
        assert!(seen[0].starts_with(
            "create vdisk file=\"D:\\out\\storage_20240101_000000.vhd\" maximum=700 type=expandable"
        ));
        assert!(seen[0].contains("assign letter=V"));
        assert_eq!(fs::read_dir(scripts.path()).unwrap().count(), 0);
    }

    #[test]
    fn create_failure_carries_utility_output() {
        let scripts = tempdir().unwrap();
        let fake = FakeDiskpart::answering(Some(-2147024713), "Virtual Disk Service error:\nThe file exists.");
        let manager = ContainerManager::new(&fake)
            .with_script_dir(scripts.path())
            .with_drive_table(no_drives);

        let mut container = Container::new("a.vhd", 100);
        let err = manager.create(&mut container).unwrap_err();

        match err {
            AcquireError::Provisioning {
                exit_code, stdout, ..
            } => {
                assert_eq!(exit_code, Some(-2147024713));
                assert!(stdout.contains("The file exists."));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(container.state(), &ContainerState::Uncreated);
        assert_eq!(fs::read_dir(scripts.path()).unwrap().count(), 0);
    }

    #[test]
    fn create_refuses_a_letter_in_use() {
        let fake = FakeDiskpart::answering(Some(0), "");
        let manager = ContainerManager::new(&fake).with_drive_table(busy_drives);

        let mut container = Container::new("a.vhd", 100);
        assert!(matches!(
            manager.create(&mut container),
            Err(AcquireError::Provisioning { .. })
        ));
        assert!(fake.scripts.borrow().is_empty());
    }

    #[test]
    fn auto_mount_picks_a_free_letter() {
        let scripts = tempdir().unwrap();
        let fake = FakeDiskpart::answering(Some(0), "");
        let manager = ContainerManager::new(&fake)
            .with_script_dir(scripts.path())
            .with_mount(MountLetter::Auto)
            .with_drive_table(busy_drives);

        let mut container = Container::new("a.vhd", 100);
        assert_eq!(manager.create(&mut container).unwrap(), PathBuf::from("Y:\\"));
        assert!(fake.scripts.borrow()[0].contains("assign letter=Y"));
    }

    #[test]
    fn create_twice_is_rejected() {
        let scripts = tempdir().unwrap();
        let fake = FakeDiskpart::answering(Some(0), "");
        let manager = ContainerManager::new(&fake)
            .with_script_dir(scripts.path())
            .with_drive_table(no_drives);

        let mut container = Container::new("a.vhd", 100);
        manager.create(&mut container).unwrap();
        assert!(matches!(
            manager.create(&mut container),
            Err(AcquireError::InvalidState { .. })
        ));
        assert_eq!(fake.scripts.borrow().len(), 1);
    }

    #[test]
    fn detach_runs_once_and_is_idempotent() {
        let scripts = tempdir().unwrap();
        let fake = FakeDiskpart::answering(Some(0), "");
        let manager = ContainerManager::new(&fake)
            .with_script_dir(scripts.path())
            .with_drive_table(no_drives);

        let mut container = Container::new(r"C:\out\a.vhd", 100);
        manager.create(&mut container).unwrap();
        manager.detach(&mut container, DetachMode::Normal).unwrap();
        manager.detach(&mut container, DetachMode::Cleanup).unwrap();

        let seen = fake.scripts.borrow();
        assert_eq!(seen.len(), 2);
        assert!(seen[1].starts_with("select vdisk file=\"C:\\out\\a.vhd\"\r\ndetach vdisk"));
        assert_eq!(container.state(), &ContainerState::Detached { forced: false });
    }

    #[test]
    fn detach_of_never_created_container_returns_error() {
        let scripts = tempdir().unwrap();
        let fake = FakeDiskpart::answering(Some(2), "There is no virtual disk selected.");
        let manager = ContainerManager::new(&fake).with_script_dir(scripts.path());

        let mut container = Container::new("a.vhd", 100);
        let err = manager.detach(&mut container, DetachMode::Cleanup).unwrap_err();
        assert!(matches!(err, AcquireError::Detach { .. }));
        assert!(err.to_string().contains("There is no virtual disk selected."));
        assert_eq!(container.state(), &ContainerState::Detached { forced: true });
        assert_eq!(fs::read_dir(scripts.path()).unwrap().count(), 0);
    }

    #[test]
    fn unquotable_backing_path_never_reaches_the_utility() {
        let fake = FakeDiskpart::answering(Some(0), "");
        let manager = ContainerManager::new(&fake).with_drive_table(no_drives);

        let mut container = Container::new("evil\".vhd", 100);
        assert!(matches!(
            manager.create(&mut container),
            Err(AcquireError::Script(ScriptError::Unquotable(_)))
        ));
        assert!(fake.scripts.borrow().is_empty());
    }

    #[test]
    fn mount_letter_parsing() {
        assert_eq!("v".parse::<MountLetter>(), Ok(MountLetter::Fixed('V')));
        assert_eq!("X:\\".parse::<MountLetter>(), Ok(MountLetter::Fixed('X')));
        assert_eq!("AUTO".parse::<MountLetter>(), Ok(MountLetter::Auto));
        assert!("A".parse::<MountLetter>().is_err());
        assert!("VW".parse::<MountLetter>().is_err());
        assert!("".parse::<MountLetter>().is_err());
        assert_eq!(MountLetter::default().to_string(), "V:");
    }

    #[test]
    fn free_letter_selection() {
        assert_eq!(choose_free_letter(&[]), Some('Z'));
        assert_eq!(choose_free_letter(&['Z', 'Y']), Some('X'));
        let all: Vec<char> = ('A'..='Z').collect();
        assert_eq!(choose_free_letter(&all), None);
    }

    #[test]
    fn backing_file_names_are_unique() {
        let dir = tempdir().unwrap();
        let ts = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(7, 5, 1)
            .unwrap();

        let first = backing_file_path(dir.path(), ts, ContainerFormat::Vhd);
        assert_eq!(first, dir.path().join("storage_20240309_070501.vhd"));
        fs::write(&first, b"").unwrap();

        let second = backing_file_path(dir.path(), ts, ContainerFormat::Vhd);
        assert_eq!(second, dir.path().join("storage_20240309_070501_1.vhd"));

        let vhdx = backing_file_path(dir.path(), ts, ContainerFormat::Vhdx);
        assert_eq!(vhdx, dir.path().join("storage_20240309_070501.vhdx"));
    }
}
