//! Access-control list replication through `icacls`.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Copies discretionary ACLs with `icacls /save` and `icacls /restore`
#[derive(Debug, Clone)]
pub struct Icacls {
    program: PathBuf,
    scratch_dir: PathBuf,
}

impl Default for Icacls {
    fn default() -> Self {
        Self::new("icacls", std::env::temp_dir())
    }
}

impl Icacls {
    /// Use `program`, keeping saved ACL files in `scratch_dir`
    pub fn new(program: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Apply the ACL of `source` to `destination`.
    ///
    /// `icacls /restore` addresses entries by file name relative to a
    /// directory, so both paths must share their final component.
    pub fn replicate(&self, source: &Path, destination: &Path) -> io::Result<()> {
        let name = source.file_name();
        if name.is_none() || name != destination.file_name() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "source and destination names differ",
            ));
        }
        let parent = destination.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "destination has no parent directory")
        })?;

        let saved = tempfile::Builder::new()
            .prefix("acl_")
            .suffix(".txt")
            .tempfile_in(&self.scratch_dir)?
            .into_temp_path();

        let result = self
            .invoke(Command::new(&self.program).arg(source).arg("/save").arg(&*saved))
            .and_then(|_| {
                self.invoke(Command::new(&self.program).arg(parent).arg("/restore").arg(&*saved))
            });

        if let Err(e) = saved.close() {
            tracing::debug!(error = %e, "failed to remove saved ACL file");
        }
        result
    }

    fn invoke(&self, command: &mut Command) -> io::Result<()> {
        let Output {
            status,
            stdout,
            stderr,
        } = command.output()?;
        if status.success() {
            return Ok(());
        }

        let stdout = String::from_utf8_lossy(&stdout);
        let stderr = String::from_utf8_lossy(&stderr);
        let detail = stderr
            .lines()
            .chain(stdout.lines())
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("no output");
        Err(io::Error::new(
            io::ErrorKind::Other,
            format!("icacls exited with {}: {}", status, detail),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn names_must_match() {
        let dir = tempdir().unwrap();
        let icacls = Icacls::new("icacls", dir.path());
        let err = icacls
            .replicate(Path::new("a/one.txt"), Path::new("b/two.txt"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn missing_program_fails_and_cleans_up() {
        let dir = tempdir().unwrap();
        let scratch = dir.path().join("scratch");
        fs::create_dir(&scratch).unwrap();
        let icacls = Icacls::new(dir.path().join("no-such-icacls"), &scratch);

        assert!(icacls
            .replicate(&dir.path().join("x.txt"), &dir.path().join("out").join("x.txt"))
            .is_err());
        assert_eq!(fs::read_dir(&scratch).unwrap().count(), 0);
    }
}
