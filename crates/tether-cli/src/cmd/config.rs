use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};
use tether_core::config::{EffectiveConfig, resolve_config};
use toml::Value;

use crate::output::OutputMode;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Show resolved or raw configuration
    Show(ShowArgs),
}

#[derive(Args, Debug)]
struct ShowArgs {
    /// Show raw project config only
    #[arg(long, conflicts_with = "user")]
    project: bool,

    /// Show raw user config only
    #[arg(long)]
    user: bool,
}

/// Execute `tether config`.
///
/// # Errors
///
/// Returns an error if a config file cannot be read, parsed or validated.
pub fn run_config(args: &ConfigArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    match &args.command {
        ConfigCommand::Show(show) => run_show(show, project_root, output),
    }
}

fn run_show(args: &ShowArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    if args.project {
        let value = load_toml_table(&project_config_path(project_root))?;
        print_toml_or_json(&value, output);
        return Ok(());
    }

    if args.user {
        let value = load_toml_table(&user_config_path()?)?;
        print_toml_or_json(&value, output);
        return Ok(());
    }

    let effective = resolve_config(project_root, output.is_json())?;
    print_effective(&effective, output)
}

fn load_toml_table(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Ok(Value::Table(toml::map::Map::new()));
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let value: Value =
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;

    if !value.is_table() {
        bail!("{} must contain a top-level TOML table", path.display());
    }

    Ok(value)
}

fn print_toml_or_json(value: &Value, output: OutputMode) {
    match output {
        OutputMode::Json => match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{json}"),
            Err(_) => println!("{{}}"),
        },
        OutputMode::Text | OutputMode::Pretty => {
            println!("{}", toml::to_string_pretty(value).unwrap_or_default());
        }
    }
}

/// `key=value` lines for every effective setting, in file order.
fn effective_lines(value: &EffectiveConfig) -> Vec<(String, String)> {
    let autosave = &value.project.autosave;
    let geocode = &value.project.geocode;
    let fence = &geocode.fence;
    let mut lines = vec![
        ("resolved_output".to_string(), value.resolved_output.clone()),
        ("autosave.quiet_ms".into(), autosave.quiet_ms.to_string()),
        (
            "autosave.saved_display_ms".into(),
            autosave.saved_display_ms.to_string(),
        ),
        ("geocode.quiet_ms".into(), geocode.quiet_ms.to_string()),
        ("geocode.endpoint".into(), geocode.endpoint.clone()),
        ("geocode.country".into(), geocode.country.clone()),
        ("geocode.country_codes".into(), geocode.country_codes.clone()),
        ("geocode.accept_language".into(), geocode.accept_language.clone()),
        ("geocode.user_agent".into(), geocode.user_agent.clone()),
        ("geocode.fence.south".into(), fence.south.to_string()),
        ("geocode.fence.west".into(), fence.west.to_string()),
        ("geocode.fence.north".into(), fence.north.to_string()),
        ("geocode.fence.east".into(), fence.east.to_string()),
    ];
    if let Some(out) = &value.user.output {
        lines.push(("user.output".into(), out.clone()));
    }
    lines
}

fn print_effective(value: &EffectiveConfig, output: OutputMode) -> Result<()> {
    match output {
        OutputMode::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputMode::Text => {
            for (key, val) in effective_lines(value) {
                println!("{key}={val}");
            }
        }
        OutputMode::Pretty => {
            println!("resolved_output = \"{}\"", value.resolved_output);
            println!();
            let project = toml::to_string_pretty(&value.project)
                .map_err(|err| anyhow!("failed to render project config: {err}"))?;
            println!("{}", project.trim_end());
            if let Some(out) = &value.user.output {
                println!();
                println!("[user]");
                println!("output = \"{out}\"");
            }
        }
    }

    Ok(())
}

fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".tether/config.toml")
}

fn user_config_path() -> Result<PathBuf> {
    let config_dir =
        dirs::config_dir().ok_or_else(|| anyhow!("Unable to resolve user config directory"))?;
    Ok(config_dir.join("tether/config.toml"))
}
