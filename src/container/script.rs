//! Serializer for the disk-management utility's script language.
//!
//! Every directive argument goes through [`quote`] or a typed field, so a
//! path can never smuggle an extra directive into the script.

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use strum::Display;
use thiserror::Error;

/// Errors raised while rendering a script
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// The argument contains a character the utility cannot quote
    #[error("argument {0:?} contains a quote, line break or NUL character")]
    Unquotable(String),

    /// The argument is not valid UTF-8
    #[error("argument {0:?} is not valid Unicode")]
    NotUnicode(PathBuf),

    /// Drive letters are single ASCII letters
    #[error("invalid drive letter '{0}'")]
    InvalidDriveLetter(char),

    /// Declared capacity must be positive
    #[error("container capacity must be greater than zero")]
    ZeroCapacity,
}

/// Journaling filesystem to format the container with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, ValueEnum)]
#[strum(serialize_all = "lowercase")]
pub enum Filesystem {
    Ntfs,
    Refs,
}

/// One line of a diskpart script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `create vdisk file="<path>" maximum=<MB> type=expandable`
    CreateVdisk { file: PathBuf, maximum_mb: u64 },
    /// `select vdisk file="<path>"`
    SelectVdisk { file: PathBuf },
    /// `attach vdisk`
    AttachVdisk,
    /// `detach vdisk`
    DetachVdisk,
    /// `create partition primary`
    CreatePartitionPrimary,
    /// `format fs=<fs> quick label="<label>"`
    Format { filesystem: Filesystem, label: String },
    /// `assign letter=<L>`
    AssignLetter(char),
    /// `exit`
    Exit,
}

impl Directive {
    /// Render this directive as a single script line
    pub fn render(&self) -> Result<String, ScriptError> {
        Ok(match self {
            Self::CreateVdisk { file, maximum_mb } => {
                if *maximum_mb == 0 {
                    return Err(ScriptError::ZeroCapacity);
                }
                format!(
                    "create vdisk file={} maximum={} type=expandable",
                    quote_path(file)?,
                    maximum_mb
                )
            }
            Self::SelectVdisk { file } => format!("select vdisk file={}", quote_path(file)?),
            Self::AttachVdisk => "attach vdisk".to_string(),
            Self::DetachVdisk => "detach vdisk".to_string(),
            Self::CreatePartitionPrimary => "create partition primary".to_string(),
            Self::Format { filesystem, label } => {
                format!("format fs={} quick label={}", filesystem, quote(label)?)
            }
            Self::AssignLetter(letter) => {
                format!("assign letter={}", validate_letter(*letter)?)
            }
            Self::Exit => "exit".to_string(),
        })
    }
}

/// An ordered list of directives
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskScript {
    directives: Vec<Directive>,
}

impl DiskScript {
    /// Empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a directive
    pub fn push(mut self, directive: Directive) -> Self {
        self.directives.push(directive);
        self
    }

    /// Create, attach, partition, format and mount a new expandable container
    pub fn create_container(
        file: &Path,
        maximum_mb: u64,
        filesystem: Filesystem,
        label: &str,
        letter: char,
    ) -> Self {
        Self::new()
            .push(Directive::CreateVdisk {
                file: file.to_path_buf(),
                maximum_mb,
            })
            .push(Directive::AttachVdisk)
            .push(Directive::CreatePartitionPrimary)
            .push(Directive::Format {
                filesystem,
                label: label.to_string(),
            })
            .push(Directive::AssignLetter(letter))
            .push(Directive::Exit)
    }

    /// Select a container by backing file and detach it
    pub fn detach_container(file: &Path) -> Self {
        Self::new()
            .push(Directive::SelectVdisk {
                file: file.to_path_buf(),
            })
            .push(Directive::DetachVdisk)
            .push(Directive::Exit)
    }

    /// Directives in order
    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    /// Render the whole script with Windows line endings
    pub fn render(&self) -> Result<String, ScriptError> {
        let mut out = String::new();
        for directive in &self.directives {
            out.push_str(&directive.render()?);
            out.push_str("\r\n");
        }
        Ok(out)
    }
}

/// Double-quote an argument.
///
/// The utility has no escape sequence, so values containing `"` or a line
/// break are rejected instead of escaped.
pub fn quote(value: &str) -> Result<String, ScriptError> {
    if value.contains(['"', '\r', '\n', '\0']) {
        return Err(ScriptError::Unquotable(value.to_string()));
    }
    Ok(format!("\"{}\"", value))
}

fn quote_path(path: &Path) -> Result<String, ScriptError> {
    let text = path
        .to_str()
        .ok_or_else(|| ScriptError::NotUnicode(path.to_path_buf()))?;
    quote(text)
}

fn validate_letter(letter: char) -> Result<char, ScriptError> {
    if letter.is_ascii_alphabetic() {
        Ok(letter.to_ascii_uppercase())
    } else {
        Err(ScriptError::InvalidDriveLetter(letter))
    }
}
