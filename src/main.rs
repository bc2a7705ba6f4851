use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::json;
use similar::{ChangeTag, TextDiff};
use std::io;
use std::path::{Path, PathBuf};
use tf_tap::delegate;
use tf_tap::tap::{self, apply_patches, ApplyError, OperationReport, Outcome, PatchSpec};
use tf_tap::terraform::{
    render_module, DirectoryLoader, FileSink, Module, OutputSink, PublishOutcome, StreamSink,
};
use tf_tap::workdir;
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tf-tap")]
#[command(about = "Patch Terraform resources declaratively before running terraform", long_about = None)]
#[command(version)]
struct Cli {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "TF_LOG", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the patched configuration
    Render {
        /// Root module directory
        #[arg(short = 'C', long, default_value = ".")]
        chdir: PathBuf,

        /// Publish to this file instead of printing
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Show a unified diff of the patch instead of the full text
        #[arg(short, long)]
        diff: bool,
    },

    /// Apply patches in memory and report every operation
    Check {
        /// Root module directory
        #[arg(short = 'C', long, default_value = ".")]
        chdir: PathBuf,

        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Stage the patched configuration and run terraform against it
    Exec {
        /// Downstream binary (defaults to terraform, then tofu, on PATH)
        #[arg(long, env = delegate::BIN_ENV)]
        tf_bin: Option<PathBuf>,

        /// Arguments passed to the downstream binary
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(cli.log_level.to_lowercase())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();

    match cli.command {
        Commands::Render {
            chdir,
            output,
            diff,
        } => cmd_render(&chdir, output, diff),

        Commands::Check { chdir, json } => cmd_check(&chdir, json),

        Commands::Exec { tf_bin, args } => cmd_exec(tf_bin, args),
    }
}

/// Helper: Load the merged module and the tap config of `dir`.
fn load(dir: &Path) -> Result<(Module, Option<PatchSpec>)> {
    let module = workdir::load_module(dir, &DirectoryLoader)
        .with_context(|| format!("failed to load terraform configuration in {}", dir.display()))?;
    let spec = tap::load_from_dir(dir)?;
    Ok((module, spec))
}

/// Helper: Show unified diff between unpatched and patched renderings
fn display_diff(name: &str, original: &str, modified: &str) {
    println!("{}", format!("--- {} (original)", name).dimmed());
    println!("{}", format!("+++ {} (patched)", name).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

fn cmd_render(dir: &Path, output: Option<PathBuf>, show_diff: bool) -> Result<()> {
    let (mut module, spec) = load(dir)?;
    let original = render_module(&module)?;

    match &spec {
        Some(spec) => {
            let reports = apply_patches(&mut module, spec)?;
            for report in reports.iter().filter(|r| r.outcome != Outcome::Applied) {
                eprintln!("{} {}", "⊙".yellow(), report);
            }
        }
        None => eprintln!(
            "{}",
            format!("No tap configuration in {}, rendering as-is", dir.display()).yellow()
        ),
    }
    let patched = render_module(&module)?;

    if show_diff {
        display_diff(workdir::OUTPUT_FILE, &original, &patched);
    }

    let outcome = match output {
        Some(path) => FileSink::new(path).publish(&patched)?,
        None if show_diff => return Ok(()),
        None => StreamSink::new(io::stdout().lock()).publish(&patched)?,
    };
    match outcome {
        PublishOutcome::Unchanged { path } => {
            println!("{} {}: unchanged", "⊙".yellow(), path.display());
        }
        PublishOutcome::Written { path, bytes } => {
            println!("{} {}: wrote {} bytes", "✓".green(), path.display(), bytes);
        }
        PublishOutcome::Streamed { bytes } => debug!(bytes, "rendered to stdout"),
    }

    Ok(())
}

fn cmd_check(dir: &Path, as_json: bool) -> Result<()> {
    let (mut module, spec) = load(dir)?;
    let Some(spec) = spec else {
        if as_json {
            println!("{}", json!({ "operations": [], "failure": null }));
        } else {
            println!("{}", format!("No tap configuration in {}", dir.display()).yellow());
        }
        return Ok(());
    };

    let (reports, failure) = match apply_patches(&mut module, &spec) {
        Ok(reports) => (reports, None),
        Err(err) => (err.completed.clone(), Some(err)),
    };

    if as_json {
        let failure = failure.as_ref().map(|err| {
            json!({
                "patch": err.patch,
                "mode": err.mode,
                "path": err.path,
                "resource": err.resource,
                "status": "failed",
                "reason": err.source.to_string(),
            })
        });
        let report = json!({ "operations": reports, "failure": failure });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_reports(&reports, failure.as_ref());
    }

    let skipped = reports
        .iter()
        .filter(|r| r.outcome != Outcome::Applied)
        .count();
    if failure.is_some() || skipped > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn print_reports(reports: &[OperationReport], failure: Option<&ApplyError>) {
    let mut applied = 0;
    let mut skipped = 0;

    for report in reports {
        match &report.outcome {
            Outcome::Applied => {
                println!("{} {}: {}", "✓".green(), report.patch, report);
                applied += 1;
            }
            Outcome::Skipped { .. } => {
                println!("{} {}: {}", "⊙".yellow(), report.patch, report);
                skipped += 1;
            }
        }
    }
    if let Some(err) = failure {
        eprintln!("{} {}: {}", "✗".red(), err.patch, err);
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} applied", format!("{}", applied).green());
    println!("  {} skipped", format!("{}", skipped).yellow());
    println!(
        "  {} failed",
        format!("{}", usize::from(failure.is_some())).red()
    );
}

fn cmd_exec(tf_bin: Option<PathBuf>, args: Vec<String>) -> Result<()> {
    let bin = delegate::find_binary(tf_bin.as_deref())?;
    let staged = workdir::setup(args, &DirectoryLoader)?;

    for report in staged
        .reports
        .iter()
        .filter(|r| r.outcome != Outcome::Applied)
    {
        eprintln!("{} {}", "⊙".yellow(), report);
    }

    if delegate::is_version_request(&staged.args) {
        println!("tf-tap v{}", env!("CARGO_PKG_VERSION"));
    }

    let code = delegate::run(&bin, &staged.args)?;
    std::process::exit(code);
}
