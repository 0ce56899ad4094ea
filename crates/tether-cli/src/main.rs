#![forbid(unsafe_code)]

mod backend;
mod cmd;
mod output;
mod record;

use clap::{CommandFactory, Parser, Subcommand};
use output::OutputMode;
use std::env;
use tether_core::config::{load_user_config, resolve_output};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "tether: optimistic autosave and fenced geocoding",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Output format (overrides --json, FORMAT and the user config).
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Derive the output mode from flags, environment and user config.
    fn output_mode(&self) -> OutputMode {
        if let Some(mode) = self.format {
            return mode;
        }
        let user = load_user_config().unwrap_or_else(|err| {
            warn!("ignoring unreadable user config: {err:#}");
            tether_core::config::UserConfig::default()
        });
        let env_format = env::var("FORMAT").ok();
        let resolved = resolve_output(self.json, user.output.as_deref(), env_format.as_deref());
        OutputMode::from_resolved(&resolved)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Development",
        about = "Run deterministic commit simulations",
        long_about = "Run or replay deterministic simulation campaigns that check the\n\
                      optimistic committer against a fault-injecting backend."
    )]
    Sim(cmd::sim::SimArgs),

    #[command(
        next_help_heading = "Records",
        about = "Resolve coordinates for an address",
        long_about = "Run the five-step lookup cascade for one address and accept the first\n\
                      candidate inside the configured fence.",
        after_help = "EXAMPLES:\n    # Full address\n    tether geocode --address-line \"12 Rizal St\" --barangay Poblacion --city Makati --province \"Metro Manila\"\n\n\
                      # City only, against a local Nominatim\n    tether geocode --city Cebu --endpoint http://localhost:8080\n\n\
                      # Machine-readable output\n    tether geocode --city Davao --json"
    )]
    Geocode(cmd::geocode::GeocodeArgs),

    #[command(
        next_help_heading = "Records",
        about = "Save a victim's case status",
        long_about = "Commit a case status through the debounced optimistic committer. On\n\
                      failure the field rolls back and the command exits with status 1.",
        after_help = "EXAMPLES:\n    # Mark record 42 solved\n    tether set-status --endpoint http://localhost:8000/api --id 42 --status solved\n\n\
                      # Rapid edits coalesce into one save of the last value\n    tether set-status --endpoint http://localhost:8000/api --id 42 --status solved --status unsolved"
    )]
    SetStatus(cmd::set_status::SetStatusArgs),

    #[command(
        next_help_heading = "Project Maintenance",
        about = "Inspect configuration",
        after_help = "EXAMPLES:\n    # Effective configuration\n    tether config show\n\n    # Raw project file\n    tether config show --project"
    )]
    Config(cmd::config::ConfigArgs),

    #[command(
        next_help_heading = "Project Maintenance",
        about = "Generate shell completion scripts",
        long_about = "Generate shell completion scripts for supported shells.",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    tether completions bash\n\n    # Generate zsh completions\n    tether completions zsh"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("TETHER_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "tether=debug,info"
        } else {
            "tether=info,warn"
        })
    });

    let format = env::var("TETHER_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let project_root = std::env::current_dir()?;
    let output = cli.output_mode();

    match cli.command {
        Commands::Sim(ref args) => cmd::sim::run_sim(args, output),
        Commands::Geocode(ref args) => cmd::geocode::run_geocode(args, output, &project_root),
        Commands::SetStatus(ref args) => {
            cmd::set_status::run_set_status(args, output, &project_root)
        }
        Commands::Config(ref args) => cmd::config::run_config(args, &project_root, output),
        Commands::Completions(ref args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    }
}
