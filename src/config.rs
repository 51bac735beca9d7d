/*!
 * Configuration handling for vhdcollect
 */

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use clap_complete::Shell;

use crate::container::{Filesystem, MountLetter, DEFAULT_LABEL};
use crate::error::Result;
use crate::logging::{LogSettings, DEFAULT_LOG_FILE};
use crate::types::ContainerFormat;
use crate::{bail, ensure};

/// Longest volume label NTFS accepts
pub const MAX_LABEL_LEN: usize = 32;

/// Format of the final summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ReportStyle {
    /// Rounded console tables
    #[default]
    Table,
    /// JSON document on stdout
    Json,
}

/// Command-line arguments for vhdcollect
#[derive(Parser, Debug, Clone)]
#[clap(
    name = "vhdcollect",
    version = env!("CARGO_PKG_VERSION"),
    about = "Collect files and directories into a virtual disk container",
    long_about = "Copies operator-selected files and directory trees into a newly created VHD, preserving timestamps, attributes and ACLs, records a manifest inside the container and detaches it."
)]
pub struct Args {
    /// Source file or directory; repeat for several. Prompts when omitted.
    #[clap(long = "source", short = 's', value_name = "PATH")]
    pub sources: Vec<String>,

    /// Directory the container file is created in. Prompts when omitted.
    #[clap(long, short = 'd', value_name = "DIR")]
    pub destination: Option<String>,

    /// Log file
    #[clap(long, default_value = DEFAULT_LOG_FILE)]
    pub log_file: String,

    /// Log level (RUST_LOG overrides)
    #[clap(long, default_value = "info")]
    pub log_level: String,

    /// Where to write the system information snapshot
    #[clap(long, default_value = "system_info.txt")]
    pub system_info: String,

    /// Drive letter to mount the container at, or `auto`
    #[clap(long, value_name = "LETTER|auto", default_value_t = MountLetter::default())]
    pub mount_letter: MountLetter,

    /// Filesystem to format the container with
    #[clap(long, value_enum, default_value_t = Filesystem::Ntfs)]
    pub filesystem: Filesystem,

    /// Volume label of the container
    #[clap(long, default_value = DEFAULT_LABEL)]
    pub label: String,

    /// Container format
    #[clap(long, value_enum, default_value_t = ContainerFormat::Vhd)]
    pub format: ContainerFormat,

    /// Do not replicate ACLs
    #[clap(long)]
    pub no_acl: bool,

    /// Directory for temporary disk utility scripts
    #[clap(long, value_name = "DIR")]
    pub script_dir: Option<String>,

    /// Disk management utility to run
    #[clap(long, default_value = "diskpart")]
    pub diskpart: String,

    /// Do not ask for confirmation before creating the container
    #[clap(long, short = 'y')]
    pub yes: bool,

    /// Summary format
    #[clap(long, value_enum, default_value_t = ReportStyle::default())]
    pub report: ReportStyle,

    /// Generate shell completions
    #[clap(long = "generate", value_enum)]
    pub generate: Option<Shell>,
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// Sources given on the command line
    pub sources: Vec<String>,

    /// Container destination given on the command line
    pub destination: Option<PathBuf>,

    /// Logging
    pub log: LogSettings,

    /// System information output
    pub system_info_file: PathBuf,

    /// Drive letter policy
    pub mount_letter: MountLetter,

    /// Container filesystem
    pub filesystem: Filesystem,

    /// Container volume label
    pub label: String,

    /// Container format
    pub format: ContainerFormat,

    /// Whether to replicate ACLs
    pub replicate_acl: bool,

    /// Temporary script directory
    pub script_dir: PathBuf,

    /// Disk management utility
    pub diskpart: PathBuf,

    /// Skip the confirmation prompt
    pub assume_yes: bool,

    /// Summary format
    pub report: ReportStyle,
}

impl Config {
    /// Create configuration from command-line arguments
    pub fn from_args(args: Args) -> Self {
        Self {
            sources: args.sources,
            destination: args.destination.map(PathBuf::from),
            log: LogSettings {
                file: PathBuf::from(args.log_file),
                level: args.log_level,
            },
            system_info_file: PathBuf::from(args.system_info),
            mount_letter: args.mount_letter,
            filesystem: args.filesystem,
            label: args.label,
            format: args.format,
            replicate_acl: !args.no_acl,
            script_dir: args
                .script_dir
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            diskpart: PathBuf::from(args.diskpart),
            assume_yes: args.yes,
            report: args.report,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let label = self.label.trim();
        ensure!(!label.is_empty(), Config, "Volume label must not be empty");
        ensure!(
            label.chars().count() <= MAX_LABEL_LEN,
            Config,
            "Volume label is longer than {} characters: {}",
            MAX_LABEL_LEN,
            label
        );
        ensure!(
            !label.contains(['"', '\r', '\n']),
            Config,
            "Volume label must not contain quotes or line breaks"
        );

        if let MountLetter::Fixed(letter) = self.mount_letter {
            ensure!(
                ('C'..='Z').contains(&letter),
                Config,
                "Mount letter must be between C and Z, got {}",
                letter
            );
        }

        if let Some(destination) = &self.destination {
            if !destination.is_dir() {
                bail!(
                    Config,
                    "Destination directory not found: {}",
                    destination.display()
                );
            }
        }

        ensure!(
            self.script_dir.is_dir(),
            Config,
            "Script directory not found: {}",
            self.script_dir.display()
        );

        Ok(())
    }
}
