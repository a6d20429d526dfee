//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use frond_core::build::{build, build_all, inspect_file, sources_from_paths};
use frond_core::processors::stores_from_config;
use frond_core::{BuildContext, BuildReport, JobStatus, ProgressReporter};
use frond_shared::{BuildConfig, CliOverrides, init_config, load_config, load_config_from};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// frond: build source files through extension-dispatched processors.
#[derive(Parser)]
#[command(
    name = "frond",
    version,
    about = "Build source files through processors chosen by their extension chain.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Project root; `frond.toml` and relative paths resolve against it.
    #[arg(long, default_value = ".", global = true, env = "FROND_ROOT")]
    pub root: PathBuf,

    /// Config file to use instead of `<root>/frond.toml`.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Build every source file, or only the files given.
    Build {
        /// Files to build (relative to the root). Defaults to all sources.
        files: Vec<PathBuf>,

        /// Source directory, overriding `source_path`.
        #[arg(short, long)]
        source: Option<String>,

        /// Target directory, overriding `target_path`.
        #[arg(short, long)]
        target: Option<String>,
    },

    /// Show how a file would be dispatched and renamed.
    Inspect {
        /// File name or path to inspect.
        file: String,

        /// Print the inspection as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write a default `frond.toml` into the root.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Default filter directives: one per crate whose spans and events we emit.
fn log_filter(verbose: u8) -> String {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    format!("frond={level},frond_core={level},frond_shared={level}")
}

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_filter(cli.verbose)));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let root = cli.root;
    let config_path = cli.config;

    match cli.command {
        Command::Build {
            files,
            source,
            target,
        } => {
            let overrides = CliOverrides {
                source_path: source,
                target_path: target,
            };
            cmd_build(&root, config_path.as_deref(), &overrides, &files).await
        }
        Command::Inspect { file, json } => cmd_inspect(&root, config_path.as_deref(), &file, json),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(&root),
            ConfigAction::Show => cmd_config_show(&root, config_path.as_deref()),
        },
    }
}

fn resolve_config(root: &Path, config_path: Option<&Path>) -> Result<BuildConfig> {
    let config = match config_path {
        Some(path) => load_config_from(path)?,
        None => load_config(root)?,
    };
    Ok(config)
}

fn load_context(
    root: &Path,
    config_path: Option<&Path>,
    overrides: &CliOverrides,
) -> Result<BuildContext> {
    let config = resolve_config(root, config_path)?.with_overrides(overrides);
    config.validate()?;
    let (pre, post) = stores_from_config(&config)?;
    Ok(BuildContext::new(root, config, pre, post))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_build(
    root: &Path,
    config_path: Option<&Path>,
    overrides: &CliOverrides,
    files: &[PathBuf],
) -> Result<()> {
    let ctx = load_context(root, config_path, overrides)?;

    info!(
        source = %ctx.source_dir().display(),
        target = %ctx.target_dir().display(),
        files = files.len(),
        "starting build"
    );

    let reporter = CliProgress::new();
    let report = if files.is_empty() {
        build(&ctx, &reporter).await?
    } else {
        build_all(&ctx, sources_from_paths(&ctx, files), &reporter).await?
    };

    print_summary(&report);

    if report.is_success() {
        Ok(())
    } else {
        Err(eyre!("build failed with {} error(s)", report.errors.len()))
    }
}

fn print_summary(report: &BuildReport) {
    println!();
    for job in &report.jobs {
        match &job.status {
            JobStatus::Completed => {
                let output = job
                    .output_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                println!("  ok    {} -> {output}", job.source_path.display());
            }
            JobStatus::Terminated { stage } => {
                println!("  fail  {} (stage {stage})", job.source_path.display());
            }
            JobStatus::Failed { stage, .. } => {
                println!("  fail  {} ({stage})", job.source_path.display());
            }
        }
    }

    if !report.errors.is_empty() {
        println!();
        println!("  Errors:");
        for error in &report.errors {
            println!("    {}: {}", error.source_path.display(), error.message);
        }
    }

    println!();
    println!("  Files:  {}", report.jobs.len());
    println!("  Built:  {}", report.completed());
    println!("  Errors: {}", report.errors.len());
    println!("  Time:   {:.2}s", report.elapsed.as_secs_f64());
    println!();
}

fn cmd_inspect(root: &Path, config_path: Option<&Path>, file: &str, json: bool) -> Result<()> {
    let ctx = load_context(root, config_path, &CliOverrides::default())?;
    let inspection = inspect_file(&ctx, file)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&inspection)?);
        return Ok(());
    }

    let list = |items: &[String]| {
        if items.is_empty() {
            "(none)".to_string()
        } else {
            items.join(", ")
        }
    };

    println!("  File:            {}", inspection.filename);
    println!("  Extensions:      {}", list(&inspection.extension_chain));
    println!("  Pre-processors:  {}", list(&inspection.preprocessors));
    println!("  Post-processors: {}", list(&inspection.postprocessors));
    println!("  Stages:          {}", list(&inspection.stages));
    let mapped: Vec<String> = inspection
        .registered_extension_map
        .iter()
        .map(|(from, to)| format!("{from} -> {to}"))
        .collect();
    println!("  Renames:         {}", list(&mapped));
    println!("  Output:          {}", inspection.target_filename);
    println!("  Directives:      {}", if inspection.directive_eligible { "yes" } else { "no" });
    Ok(())
}

fn cmd_config_init(root: &Path) -> Result<()> {
    let path = init_config(root)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(root: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(root, config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn job_composed(&self, source: &Path, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Composing [{current}/{total}] {}", source.display()));
    }

    fn done(&self, _report: &BuildReport) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn build_accepts_files_and_overrides() {
        let cli = Cli::try_parse_from(["frond", "build", "a.js", "css/b.scss", "-s", "src", "-t", "dist"])
            .unwrap();
        match cli.command {
            Command::Build {
                files,
                source,
                target,
            } => {
                assert_eq!(files, vec![PathBuf::from("a.js"), PathBuf::from("css/b.scss")]);
                assert_eq!(source.as_deref(), Some("src"));
                assert_eq!(target.as_deref(), Some("dist"));
            }
            _ => panic!("expected build"),
        }
    }

    #[test]
    fn global_flags_work_after_subcommand() {
        let cli = Cli::try_parse_from(["frond", "inspect", "app.coffee", "--json", "--root", "/p", "-vv"])
            .unwrap();
        assert_eq!(cli.root, PathBuf::from("/p"));
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Command::Inspect { json: true, .. }));
    }

    #[test]
    fn log_filter_targets_workspace_crates() {
        assert_eq!(log_filter(0), "frond=info,frond_core=info,frond_shared=info");
        assert_eq!(log_filter(1), "frond=debug,frond_core=debug,frond_shared=debug");
        assert_eq!(log_filter(5), "frond=trace,frond_core=trace,frond_shared=trace");
    }

    #[test]
    fn log_filter_parses() {
        for verbose in 0..3 {
            assert!(tracing_subscriber::EnvFilter::try_new(log_filter(verbose)).is_ok());
        }
    }
}
