//! kreplay CLI
//!
//! Replays one captured OpenCL kernel invocation and validates its outputs.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, bail};
use console::style;
use kreplay_capture::{AliasPlan, CaptureReader, ReaderOptions};
use kreplay_core::{ArgumentKind, NoticeLog};
use kreplay_replay::{Device, ReplayConfig, ReplayEngine, ReplayError, ReplaySummary, SimDevice};
use kreplay_validate::{ValidateConfig, ValidationReport, Validator};
use std::io::IsTerminal;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kreplay")]
#[command(about = "Replay and validate a captured OpenCL kernel invocation", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay the capture, optionally validating afterwards (default)
    Run(RunArgs),
    /// Compare replayed outputs with the captured snapshots
    Validate(ValidateArgs),
    /// Decode the capture and print what would be replayed
    Inspect {
        #[command(flatten)]
        dir: DirArgs,
    },
    /// List compute devices
    Devices,
}

#[derive(Args, Clone, Debug, Default)]
struct DirArgs {
    /// Capture directory
    #[arg(value_name = "DIR", conflicts_with = "dir")]
    path: Option<PathBuf>,

    /// Capture directory
    #[arg(long)]
    dir: Option<PathBuf>,
}

impl DirArgs {
    fn resolve(&self) -> PathBuf {
        self.dir
            .clone()
            .or_else(|| self.path.clone())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[derive(Args, Clone, Debug, Default)]
struct OutputDirs {
    /// Replayed output directory, relative to the capture directory
    #[arg(long, default_value = kreplay_capture::naming::TEST_DIR)]
    test_dir: PathBuf,

    /// Captured snapshot directory, relative to the capture directory
    #[arg(long, default_value = kreplay_capture::naming::POST_DIR)]
    post_dir: PathBuf,
}

#[derive(Args, Clone, Debug, Default)]
struct RunArgs {
    #[command(flatten)]
    dir: DirArgs,

    /// Number of back-to-back launches
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    repetitions: u32,

    /// Do not replay; validate existing outputs only
    #[arg(long)]
    skip_replay: bool,

    /// Validate after replaying
    #[arg(long)]
    validate: bool,

    /// Bind buffers as shared virtual memory
    #[arg(long)]
    svm: bool,

    /// Compute backend
    #[arg(long, value_enum, default_value_t = Backend::default())]
    backend: Backend,

    #[command(flatten)]
    outputs: OutputDirs,

    /// Print the validation report as JSON
    #[arg(long)]
    json: bool,
}

impl RunArgs {
    fn wants_validation(&self) -> bool {
        self.validate || self.skip_replay
    }
}

#[derive(Args, Clone, Debug)]
struct ValidateArgs {
    #[command(flatten)]
    dir: DirArgs,

    #[command(flatten)]
    outputs: OutputDirs,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Backend {
    /// Host-memory simulator; kernels run as no-ops
    Sim,
    /// First OpenCL device
    Opencl,
}

impl Default for Backend {
    fn default() -> Self {
        if cfg!(feature = "opencl") {
            Self::Opencl
        } else {
            Self::Sim
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let ansi_enabled = std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_ansi(ansi_enabled)
        .init();
}

fn open_device(backend: Backend) -> Result<Box<dyn Device>> {
    match backend {
        Backend::Sim => Ok(Box::new(SimDevice::new())),
        #[cfg(feature = "opencl")]
        Backend::Opencl => Ok(Box::new(
            kreplay_replay::OpenClDevice::first().wrap_err("Cannot open OpenCL device")?,
        )),
        #[cfg(not(feature = "opencl"))]
        Backend::Opencl => bail!("kreplay was built without OpenCL support; use --backend sim"),
    }
}

fn print_notices(notices: &NoticeLog) {
    for line in notices.lines() {
        println!("{}", style(line).yellow());
    }
}

fn print_report(report: &ValidationReport, json: bool) -> Result<()> {
    if !report.is_equal() {
        tracing::warn!(positions = ?report.mismatches(), "Outputs differ from the captured snapshots");
    }
    if json {
        println!("{}", report.to_json()?);
        return Ok(());
    }
    for check in &report.checks {
        let line = check.line();
        if check.equal {
            println!("{}", style(line).green());
        } else {
            println!("{}", style(line).red());
        }
    }
    println!();
    print_notices(&report.notices);
    if report.is_equal() {
        println!("{}", style(report.verdict).green().bold());
    } else {
        println!("{}", style(report.verdict).red().bold());
    }
    Ok(())
}

fn validate(root: PathBuf, outputs: &OutputDirs) -> Result<ValidationReport> {
    let config = ValidateConfig {
        test_dir: outputs.test_dir.clone(),
        post_dir: outputs.post_dir.clone(),
    };
    let report = Validator::new(&root)
        .with_config(config)
        .validate()
        .wrap_err_with(|| format!("Validation of {} failed", root.display()))?;
    Ok(report)
}

fn replay(args: &RunArgs, root: &std::path::Path) -> Result<ReplaySummary> {
    tracing::debug!(backend = ?args.backend, dir = %root.display(), "Starting replay");
    let mut device = open_device(args.backend)?;
    let config = ReplayConfig {
        repetitions: args.repetitions,
        force_svm: args.svm,
        write_outputs: true,
        test_dir: args.outputs.test_dir.clone(),
    };
    match ReplayEngine::new()
        .with_config(config)
        .run(device.as_mut(), root)
    {
        Ok(summary) => Ok(summary),
        Err(ReplayError::NoUsableBinary { attempts }) => {
            for notice in attempts.iter().filter_map(|a| a.notice()) {
                eprintln!("{}", style(notice).yellow());
            }
            bail!(ReplayError::NoUsableBinary { attempts });
        }
        Err(e) => Err(e).wrap_err_with(|| format!("Replay of {} failed", root.display())),
    }
}

/// Replay and validation results; with a report, its notices hold the
/// replay's notices followed by its own
struct RunOutcome {
    summary: Option<ReplaySummary>,
    report: Option<ValidationReport>,
}

fn execute(args: &RunArgs) -> Result<RunOutcome> {
    let root = args.dir.resolve();
    let summary = if args.skip_replay {
        None
    } else {
        Some(replay(args, &root)?)
    };

    let report = if args.wants_validation() {
        let mut report = validate(root, &args.outputs)?;
        let mut notices = summary
            .as_ref()
            .map(|s| s.notices.clone())
            .unwrap_or_default();
        notices.extend(report.notices);
        report.notices = notices;
        Some(report)
    } else {
        None
    };
    Ok(RunOutcome { summary, report })
}

fn run(args: &RunArgs) -> Result<()> {
    let outcome = execute(args)?;

    if let Some(summary) = &outcome.summary {
        let mut lines = summary.lines().into_iter();
        if let Some(headline) = lines.next() {
            println!("{}", style(headline).bold());
        }
        for line in lines.take(1 + summary.outputs.len()) {
            println!("{line}");
        }
    }

    match (&outcome.report, &outcome.summary) {
        (Some(report), _) => print_report(report, args.json)?,
        (None, Some(summary)) => print_notices(&summary.notices),
        (None, None) => {}
    }
    Ok(())
}

fn inspect(args: &DirArgs) -> Result<()> {
    let root = args.resolve();
    let capture = CaptureReader::new(&root)
        .with_options(ReaderOptions::default())
        .read()
        .wrap_err_with(|| format!("Cannot read capture in {}", root.display()))?;
    let invocation = &capture.invocation;

    println!("{}", style(format!("Enqueue {}", invocation.enqueue)).bold());
    println!("Kernel:   {}", invocation.kernel_name);
    println!("Options:  {}", invocation.options_string());
    println!("Geometry: {}", invocation.geometry);
    println!("Program:  {}", capture.program.tier());
    println!("SVM:      {}", capture.svm_active);
    println!("Outputs:  {:?}", capture.output_positions());
    println!();
    for record in capture.arguments.records() {
        let detail = match &record.kind {
            ArgumentKind::Scalar { bytes } => format!("{} bytes", bytes.len()),
            ArgumentKind::Buffer { pre_state, .. } => format!("{} bytes", pre_state.len()),
            ArgumentKind::Svm {
                pre_state, offset, ..
            } => format!("{} bytes at offset {}", pre_state.len(), offset),
            ArgumentKind::Image { descriptor, .. } => descriptor.to_string(),
            ArgumentKind::Sampler { descriptor } => descriptor.to_string(),
            ArgumentKind::Local { size } => format!("{size} bytes"),
        };
        println!("  [{}] {:<7} {detail}", record.position, record.kind.name());
    }

    let plan = AliasPlan::resolve(&capture.arguments);
    println!();
    println!("Allocations: {}", plan.allocation_count());
    let mut notices = capture.notices.clone();
    notices.extend(plan.notices);
    print_notices(&notices);
    Ok(())
}

fn devices() -> Result<()> {
    #[cfg(feature = "opencl")]
    {
        let found = kreplay_replay::opencl::list_devices()?;
        if found.is_empty() {
            println!("No OpenCL devices found");
        }
        for (index, info) in found.iter().enumerate() {
            println!("{index}: {info}");
        }
    }
    #[cfg(not(feature = "opencl"))]
    println!("OpenCL support not compiled in");
    println!("sim: {}", SimDevice::new().info());
    Ok(())
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Some(Commands::Run(args)) => run(&args),
        Some(Commands::Validate(args)) => {
            print_report(&validate(args.dir.resolve(), &args.outputs)?, args.json)
        }
        Some(Commands::Inspect { dir }) => inspect(&dir),
        Some(Commands::Devices) => devices(),
        None => run(&cli.run),
    }
}
