//! Invocation of the disk-management utility.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Captured result of one utility invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtilityOutput {
    /// Exit code, `None` when terminated without one
    pub exit_code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl UtilityOutput {
    /// Whether the utility reported success
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs a script file through the disk-management utility
pub trait ScriptRunner {
    /// Execute `script` non-interactively and capture its output
    fn run(&self, script: &Path) -> io::Result<UtilityOutput>;
}

/// `diskpart /s <script>`
#[derive(Debug, Clone)]
pub struct Diskpart {
    program: PathBuf,
}

impl Diskpart {
    /// Runner for a specific diskpart executable
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for Diskpart {
    fn default() -> Self {
        Self::new("diskpart")
    }
}

impl ScriptRunner for Diskpart {
    fn run(&self, script: &Path) -> io::Result<UtilityOutput> {
        let output = Command::new(&self.program).arg("/s").arg(script).output()?;

        Ok(UtilityOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Write `contents` to a uniquely named file in `dir`, run it, and remove
/// the file again whatever the outcome.
pub fn run_script<R: ScriptRunner + ?Sized>(
    runner: &R,
    dir: &Path,
    prefix: &str,
    contents: &str,
) -> io::Result<UtilityOutput> {
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".txt")
        .tempfile_in(dir)?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;

    // Close our handle so the utility can open the file on Windows.
    let path = file.into_temp_path();
    tracing::debug!(script = %path.display(), "running disk utility script");
    let result = runner.run(&path);

    let script = path.to_path_buf();
    if let Err(e) = path.close() {
        tracing::warn!(script = %script.display(), error = %e, "failed to remove temporary script");
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::fs;
    use tempfile::tempdir;

    struct Echo {
        seen: RefCell<Vec<(PathBuf, String)>>,
        fail: bool,
    }

    impl ScriptRunner for Echo {
        fn run(&self, script: &Path) -> io::Result<UtilityOutput> {
            let body = fs::read_to_string(script)?;
            self.seen.borrow_mut().push((script.to_path_buf(), body.clone()));
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::NotFound, "diskpart not found"));
            }
            Ok(UtilityOutput {
                exit_code: Some(0),
                stdout: body,
                stderr: String::new(),
            })
        }
    }

    #[test]
    fn script_is_written_run_and_removed() {
        let dir = tempdir().unwrap();
        let runner = Echo {
            seen: RefCell::new(Vec::new()),
            fail: false,
        };

        let output = run_script(&runner, dir.path(), "vhd_create_", "attach vdisk\r\n").unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "attach vdisk\r\n");

        let seen = runner.seen.borrow();
        let (path, _) = &seen[0];
        assert!(path.starts_with(dir.path()));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("vhd_create_"));
        assert!(name.ends_with(".txt"));
        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn script_is_removed_when_runner_fails() {
        let dir = tempdir().unwrap();
        let runner = Echo {
            seen: RefCell::new(Vec::new()),
            fail: true,
        };

        let err = run_script(&runner, dir.path(), "vhd_detach_", "exit\r\n").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn script_names_are_unique() {
        let dir = tempdir().unwrap();
        let runner = Echo {
            seen: RefCell::new(Vec::new()),
            fail: false,
        };

        run_script(&runner, dir.path(), "vhd_create_", "exit\r\n").unwrap();
        run_script(&runner, dir.path(), "vhd_create_", "exit\r\n").unwrap();
        let seen = runner.seen.borrow();
        assert_ne!(seen[0].0, seen[1].0);
    }

    #[test]
    fn missing_program_is_an_io_error() {
        let dir = tempdir().unwrap();
        let runner = Diskpart::new(dir.path().join("no-such-diskpart"));
        assert!(run_script(&runner, dir.path(), "vhd_", "exit\r\n").is_err());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
