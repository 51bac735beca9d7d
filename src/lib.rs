/*!
 * vhdcollect - Collect files into a virtual disk container
 *
 * This library sizes a set of source paths, provisions a VHD through
 * diskpart, copies the sources into it while preserving timestamps,
 * attributes and ACLs, records a manifest and detaches the container.
 */

pub mod acquisition;
pub mod config;
pub mod container;
pub mod copier;
pub mod error;
pub mod intake;
pub mod logging;
pub mod manifest;
pub mod metadata;
pub mod privilege;
pub mod report;
pub mod sizer;
pub mod sysinfo;
pub mod types;
pub mod utils;


// Re-export main components for easier access
pub use acquisition::{Acquisition, AcquisitionPlan, AcquisitionReport};
pub use config::Config;
pub use container::{ContainerManager, DetachMode, Diskpart, MountLetter, Provisioner};
pub use copier::Copier;
pub use error::{AcquireError, Result};
pub use manifest::Manifest;
pub use report::{ReportFormat, Reporter};
pub use sizer::Sizer;
pub use sysinfo::SystemInfo;
pub use types::{Container, ContainerFormat, ContainerState, CopyRecord, SourceKind, SourcePath};
pub use utils::format_file_size;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
