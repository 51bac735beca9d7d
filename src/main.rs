/*!
 * Command-line interface for vhdcollect
 */

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{CommandFactory, Parser};
use indicatif::{ProgressBar, ProgressStyle};

use vhdcollect::config::{Args, Config};
use vhdcollect::container::ContainerManager;
use vhdcollect::error::{AcquireError, Result};
use vhdcollect::intake::Intake;
use vhdcollect::metadata::Icacls;
use vhdcollect::report::Reporter;
use vhdcollect::sysinfo::{write_system_info, SystemInfo};
use vhdcollect::types::SourcePath;
use vhdcollect::{logging, privilege, Acquisition, Copier, Diskpart};

fn main() -> ExitCode {
    // Parse command line arguments
    let args = Args::parse();

    if let Some(shell) = args.generate {
        clap_complete::generate(shell, &mut Args::command(), "vhdcollect", &mut io::stdout());
        return ExitCode::SUCCESS;
    }

    // Create configuration
    let config = Config::from_args(args);

    // Validate configuration
    let dispatch = match config.validate().and_then(|_| logging::dispatch(&config.log)) {
        Ok(dispatch) => dispatch,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(e.exit_code());
        }
    };

    tracing::dispatcher::with_default(&dispatch, || match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, exit_code = e.exit_code(), "run failed");
            eprintln!("\nError: {}", e);
            eprintln!("See {} for details.", config.log.file.display());
            ExitCode::from(e.exit_code())
        }
    })
}

fn run(config: &Config) -> Result<()> {
    tracing::info!(version = vhdcollect::VERSION, "run started");
    privilege::ensure_elevated()?;

    println!("{}", "=".repeat(60));
    println!("vhdcollect {}", vhdcollect::VERSION);
    println!("{}", "=".repeat(60));

    println!("\nGathering system information...");
    let system_info = SystemInfo::gather();
    write_system_info(&system_info, &config.system_info_file)?;
    println!(
        "System information saved to {}",
        config.system_info_file.display()
    );

    let stdin = io::stdin();
    let mut intake = Intake::new(stdin.lock(), io::stdout());

    let sources = if config.sources.is_empty() {
        intake.collect_sources()?
    } else {
        config
            .sources
            .iter()
            .map(|source| SourcePath::from_operator_input(source))
            .collect::<Result<Vec<_>>>()?
    };
    let destination: PathBuf = match &config.destination {
        Some(destination) => destination.clone(),
        None => intake.collect_destination()?,
    };

    // Create progress bar
    let progress = ProgressBar::new(0);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix:.bold.cyan} {wide_msg:.dim.white} {pos}/{len} ({percent}%) ⏱️  Elapsed: {elapsed_precise}  Remaining: {eta_precise}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    progress.set_prefix("📊 Copying");

    let mut copier = Copier::new(Arc::new(progress.clone()));
    if config.replicate_acl && cfg!(windows) {
        copier = copier.with_acl(Icacls::new("icacls", &config.script_dir));
    }

    let manager = ContainerManager::new(Diskpart::new(&config.diskpart))
        .with_script_dir(&config.script_dir)
        .with_filesystem(config.filesystem)
        .with_label(config.label.trim())
        .with_mount(config.mount_letter);
    let acquisition = Acquisition::new(manager, copier).with_format(config.format);

    let plan = acquisition.plan(sources, &destination)?;
    for item in &plan.sizing.items {
        println!(
            "Calculated size: {} MB for {} {}",
            item.capacity_mb,
            item.kind,
            item.path.display()
        );
    }
    println!(
        "\nContainer: {} ({} MB, {})",
        plan.backing_file.display(),
        plan.capacity_mb(),
        plan.format
    );

    if !config.assume_yes && !intake.confirm("Create the container and copy the sources?")? {
        return Err(AcquireError::Aborted);
    }

    println!("\nCreating container. This may take a few minutes...");
    progress.enable_steady_tick(std::time::Duration::from_millis(100));
    let report = acquisition.execute(&plan, &system_info.render());
    progress.finish_and_clear();
    let report = report?;

    let reporter = Reporter::new(config.report.into());
    reporter.print_report(&report)?;

    if report.detached {
        println!(
            "\nContainer detached. Your data is now stored in: {}",
            report.container.display()
        );
        println!("To access it, right-click the file in File Explorer and select 'Mount'.");
    } else {
        eprintln!(
            "\nThe container could not be detached. Detach {} manually before moving it.",
            report.container.display()
        );
    }

    Ok(())
}
