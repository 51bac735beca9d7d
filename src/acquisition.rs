/*!
 * End-to-end acquisition: size, provision, copy, record, detach
 *
 * Once a run reaches container creation, exactly one detach attempt is
 * made before `execute` returns, whatever happens in between. A failed
 * cleanup detach is logged and never replaces the error that caused it.
 */

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime};
use serde::{Serialize, Serializer};

use crate::container::{backing_file_path, DetachMode, Provisioner};
use crate::copier::Copier;
use crate::error::{AcquireError, Result};
use crate::manifest::Manifest;
use crate::sizer::Sizer;
use crate::types::{
    absolute_directory, Container, ContainerFormat, CopyRecord, SizingResult, SourcePath,
};

/// Everything decided before anything is written
#[derive(Debug, Clone)]
pub struct AcquisitionPlan {
    /// Sources in copy order
    pub sources: Vec<SourcePath>,
    /// Per-source and total capacity
    pub sizing: SizingResult,
    /// Backing file to create
    pub backing_file: PathBuf,
    /// Container format
    pub format: ContainerFormat,
}

impl AcquisitionPlan {
    /// Capacity to declare for the container, in MB
    pub fn capacity_mb(&self) -> u64 {
        self.sizing.total_mb
    }
}

/// Outcome of a completed acquisition
#[derive(Debug, Clone, Serialize)]
pub struct AcquisitionReport {
    /// Backing file of the container
    pub container: PathBuf,
    /// Declared capacity in MB
    pub capacity_mb: u64,
    /// Where the container was mounted during the run
    pub mount_point: PathBuf,
    /// Manifest written inside the container
    pub manifest: PathBuf,
    /// One record per source, in copy order
    pub items: Vec<CopyRecord>,
    /// Wall time from provisioning to detach
    #[serde(rename = "duration_secs", serialize_with = "duration_secs")]
    pub duration: Duration,
    /// Whether the final detach succeeded
    pub detached: bool,
    /// Why the final detach failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detach_error: Option<String>,
}

impl AcquisitionReport {
    /// Total files copied over all items
    pub fn total_files(&self) -> u64 {
        self.items.iter().map(|item| item.stats.files).sum()
    }

    /// Total content bytes copied over all items
    pub fn total_bytes(&self) -> u64 {
        self.items.iter().map(|item| item.stats.bytes).sum()
    }

    /// Total metadata warnings over all items
    pub fn total_warnings(&self) -> usize {
        self.items.iter().map(|item| item.stats.warnings.len()).sum()
    }
}

fn duration_secs<S: Serializer>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Drives one acquisition run
pub struct Acquisition<P: Provisioner> {
    provisioner: P,
    copier: Copier,
    sizer: Sizer,
    format: ContainerFormat,
}

impl<P: Provisioner> Acquisition<P> {
    /// Create a new acquisition producing VHD containers
    pub fn new(provisioner: P, copier: Copier) -> Self {
        Self {
            provisioner,
            copier,
            sizer: Sizer::new(),
            format: ContainerFormat::Vhd,
        }
    }

    /// Container format to produce
    pub fn with_format(mut self, format: ContainerFormat) -> Self {
        self.format = format;
        self
    }

    /// The provisioner in use
    pub fn provisioner(&self) -> &P {
        &self.provisioner
    }

    /// Size the sources and pick the backing file. Writes nothing.
    pub fn plan(&self, sources: Vec<SourcePath>, destination: &Path) -> Result<AcquisitionPlan> {
        if sources.is_empty() {
            return Err(AcquireError::NoSources);
        }
        let destination = absolute_directory(destination)?;

        let sizing = self.sizer.size_all(&sources)?;
        let limit_mb = self.format.limit_mb();
        if sizing.total_mb > limit_mb {
            return Err(AcquireError::Capacity {
                required_mb: sizing.total_mb,
                limit_mb,
                format: self.format.to_string(),
            });
        }

        let backing_file = backing_file_path(&destination, Local::now().naive_local(), self.format);
        tracing::info!(
            sources = sources.len(),
            total_mb = sizing.total_mb,
            backing_file = %backing_file.display(),
            "acquisition planned"
        );

        Ok(AcquisitionPlan {
            sources,
            sizing,
            backing_file,
            format: self.format,
        })
    }

    /// Provision the container, copy every source in order, write the
    /// manifest and detach.
    pub fn execute(&self, plan: &AcquisitionPlan, system_info: &str) -> Result<AcquisitionReport> {
        let started = Instant::now();
        let created = Local::now().naive_local();
        let mut container = Container::new(plan.backing_file.clone(), plan.capacity_mb());

        let filled = self.fill(&mut container, plan, system_info, created);

        let (mount_point, items, manifest) = match filled {
            Ok(filled) => filled,
            Err(primary) => {
                tracing::error!(error = %primary, "acquisition failed, detaching container");
                if let Err(e) = self.provisioner.detach(&mut container, DetachMode::Cleanup) {
                    tracing::error!(error = %e, "cleanup detach failed");
                }
                return Err(primary);
            }
        };

        let detach_error = match self.provisioner.detach(&mut container, DetachMode::Normal) {
            Ok(()) => None,
            Err(e) => {
                tracing::error!(error = %e, "container could not be detached");
                Some(e.to_string())
            }
        };

        let report = AcquisitionReport {
            container: container.backing_file.clone(),
            capacity_mb: container.capacity_mb,
            mount_point,
            manifest,
            items,
            duration: started.elapsed(),
            detached: detach_error.is_none(),
            detach_error,
        };
        tracing::info!(
            container = %report.container.display(),
            files = report.total_files(),
            bytes = report.total_bytes(),
            warnings = report.total_warnings(),
            detached = report.detached,
            "acquisition finished"
        );
        Ok(report)
    }

    /// Everything between creation and detach
    fn fill(
        &self,
        container: &mut Container,
        plan: &AcquisitionPlan,
        system_info: &str,
        created: NaiveDateTime,
    ) -> Result<(PathBuf, Vec<CopyRecord>, PathBuf)> {
        let mount_point = self.provisioner.create(container)?;

        self.copier.progress.set_length(plan.sizing.total_files());
        let mut items = Vec::with_capacity(plan.sources.len());
        for source in &plan.sources {
            items.push(self.copier.copy_source(source, &mount_point)?);
        }
        self.copier.progress.finish_and_clear();

        let manifest = Manifest {
            created,
            container: &container.backing_file,
            capacity_mb: container.capacity_mb,
            mount_point: &mount_point,
            items: &items,
            system_info,
        }
        .write()?;

        Ok((mount_point, items, manifest))
    }
}
