/*!
 * Reporting functionality for vhdcollect
 *
 * Provides functionality for generating formatted reports of acquisition
 * results using the tabled library for clean, consistent table rendering.
 */

use tabled::{
    settings::{object::Columns, Alignment, Modify, Padding, Style},
    Table, Tabled,
};

use crate::acquisition::AcquisitionReport;
use crate::config::ReportStyle;
use crate::error::Result;
use crate::utils::format_file_size;

/// Warnings listed individually before the rest are summarized
const MAX_LISTED_WARNINGS: usize = 10;

/// Format of the report output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Console table output
    ConsoleTable,
    /// Pretty-printed JSON
    Json,
}

impl From<ReportStyle> for ReportFormat {
    fn from(style: ReportStyle) -> Self {
        match style {
            ReportStyle::Table => Self::ConsoleTable,
            ReportStyle::Json => Self::Json,
        }
    }
}

/// Report generator for acquisition results
pub struct Reporter {
    format: ReportFormat,
}

impl Reporter {
    /// Create a new reporter
    pub fn new(format: ReportFormat) -> Self {
        Self { format }
    }

    /// Format a number with human-readable units
    fn format_number(&self, num: u64) -> String {
        if num >= 1_000_000 {
            format!("{:.1}M", num as f64 / 1_000_000.0)
        } else if num >= 1_000 {
            format!("{:.1}K", num as f64 / 1_000.0)
        } else {
            num.to_string()
        }
    }

    /// Generate a report string for a finished acquisition
    pub fn generate_report(&self, report: &AcquisitionReport) -> Result<String> {
        match self.format {
            ReportFormat::ConsoleTable => Ok(self.generate_console_report(report)),
            ReportFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        }
    }

    /// Print the report to stdout
    pub fn print_report(&self, report: &AcquisitionReport) -> Result<()> {
        println!("\n{}", self.generate_report(report)?);
        Ok(())
    }

    // Keep the tail of long paths, which carries the meaningful part
    fn format_path(&self, path: &str, max_len: usize) -> String {
        let count = path.chars().count();
        if count <= max_len {
            return path.to_string();
        }
        let tail: String = path.chars().skip(count - (max_len - 3)).collect();
        format!("...{}", tail)
    }

    fn styled(&self, mut table: Table) -> String {
        table
            .with(Style::rounded())
            .with(Padding::new(1, 1, 0, 0))
            .with(Modify::new(Columns::new(..)).with(Alignment::left()));
        table.to_string()
    }

    fn create_summary_table(&self, report: &AcquisitionReport) -> String {
        #[derive(Tabled)]
        struct SummaryRow {
            #[tabled(rename = "Metric")]
            key: String,

            #[tabled(rename = "Value")]
            value: String,
        }

        let row = |key: &str, value: String| SummaryRow {
            key: key.to_string(),
            value,
        };

        let detach = match &report.detach_error {
            None => "Detached".to_string(),
            Some(reason) => format!("NOT DETACHED: {}", reason),
        };

        let rows = vec![
            row("💾 Container", report.container.display().to_string()),
            row("📐 Capacity", format!("{} MB", report.capacity_mb)),
            row("📂 Mounted At", report.mount_point.display().to_string()),
            row("📝 Manifest", report.manifest.display().to_string()),
            row("⏱️ Process Time", format!("{:.4?}", report.duration)),
            row("📄 Files Copied", self.format_number(report.total_files())),
            row("📦 Content Size", format_file_size(report.total_bytes())),
            row("⚠️ Warnings", report.total_warnings().to_string()),
            row("🔌 Container State", detach),
        ];

        self.styled(Table::new(rows))
    }

    fn create_items_table(&self, report: &AcquisitionReport) -> String {
        #[derive(Tabled)]
        struct ItemRow {
            #[tabled(rename = "Kind")]
            kind: String,

            #[tabled(rename = "Source")]
            source: String,

            #[tabled(rename = "Files")]
            files: String,

            #[tabled(rename = "Dirs")]
            directories: String,

            #[tabled(rename = "Size")]
            size: String,

            #[tabled(rename = "Warnings")]
            warnings: usize,

            #[tabled(rename = "Skipped")]
            skipped: u64,
        }

        let rows: Vec<ItemRow> = report
            .items
            .iter()
            .map(|item| ItemRow {
                kind: item.kind.to_string(),
                source: self.format_path(&item.source.display().to_string(), 60),
                files: self.format_number(item.stats.files),
                directories: self.format_number(item.stats.directories),
                size: format_file_size(item.stats.bytes),
                warnings: item.stats.warnings.len(),
                skipped: item.stats.skipped,
            })
            .collect();

        self.styled(Table::new(rows))
    }

    fn create_warnings_table(&self, report: &AcquisitionReport) -> String {
        #[derive(Tabled)]
        struct WarningRow {
            #[tabled(rename = "Path")]
            path: String,

            #[tabled(rename = "Step")]
            step: String,

            #[tabled(rename = "Problem")]
            message: String,
        }

        let rows: Vec<WarningRow> = report
            .items
            .iter()
            .flat_map(|item| item.stats.warnings.iter())
            .take(MAX_LISTED_WARNINGS)
            .map(|warning| WarningRow {
                path: self.format_path(&warning.path.display().to_string(), 50),
                step: warning.step.to_string(),
                message: warning.message.clone(),
            })
            .collect();

        self.styled(Table::new(rows))
    }

    // Generate a console table report
    fn generate_console_report(&self, report: &AcquisitionReport) -> String {
        let items_table = self.create_items_table(report);
        let summary_table = self.create_summary_table(report);

        let summary_title = if report.detached {
            "✅  ACQUISITION COMPLETE"
        } else {
            "⚠️  ACQUISITION COMPLETE, CONTAINER STILL ATTACHED"
        };

        let mut out = format!("📋  ACQUIRED ITEMS\n{}\n", items_table);

        let warnings = report.total_warnings();
        if warnings > 0 {
            let title = if warnings > MAX_LISTED_WARNINGS {
                format!(
                    "⚠️  FIRST {} OF {} METADATA WARNINGS (see log for all)",
                    MAX_LISTED_WARNINGS, warnings
                )
            } else {
                "⚠️  METADATA WARNINGS".to_string()
            };
            out.push_str(&format!("\n{}\n{}\n", title, self.create_warnings_table(report)));
        }

        out.push_str(&format!("\n{}\n{}", summary_title, summary_table));
        out
    }
}
