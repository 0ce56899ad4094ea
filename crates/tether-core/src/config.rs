use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::Path;

use crate::error::ErrorCode;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub autosave: AutosaveConfig,
    #[serde(default)]
    pub geocode: GeocodeConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutosaveConfig {
    #[serde(default = "default_autosave_quiet_ms")]
    pub quiet_ms: u64,
    #[serde(default = "default_saved_display_ms")]
    pub saved_display_ms: u64,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            quiet_ms: default_autosave_quiet_ms(),
            saved_display_ms: default_saved_display_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeConfig {
    #[serde(default = "default_geocode_quiet_ms")]
    pub quiet_ms: u64,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_country_codes")]
    pub country_codes: String,
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub fence: FenceConfig,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            quiet_ms: default_geocode_quiet_ms(),
            endpoint: default_endpoint(),
            country: default_country(),
            country_codes: default_country_codes(),
            accept_language: default_accept_language(),
            user_agent: default_user_agent(),
            fence: FenceConfig::default(),
        }
    }
}

/// Bounding box in degrees; edges are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FenceConfig {
    #[serde(default = "default_south")]
    pub south: f64,
    #[serde(default = "default_west")]
    pub west: f64,
    #[serde(default = "default_north")]
    pub north: f64,
    #[serde(default = "default_east")]
    pub east: f64,
}

impl Default for FenceConfig {
    fn default() -> Self {
        Self {
            south: default_south(),
            west: default_west(),
            north: default_north(),
            east: default_east(),
        }
    }
}

impl ProjectConfig {
    /// Reject values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error tagged with [`ErrorCode::InvalidConfig`] for a zero
    /// quiet window or a fence whose edges are inverted or not finite.
    pub fn validate(&self) -> Result<()> {
        let code = ErrorCode::InvalidConfig.code();
        ensure!(
            self.autosave.quiet_ms > 0,
            "{code}: autosave.quiet_ms must be greater than zero"
        );
        ensure!(
            self.geocode.quiet_ms > 0,
            "{code}: geocode.quiet_ms must be greater than zero"
        );
        let fence = &self.geocode.fence;
        ensure!(
            [fence.south, fence.west, fence.north, fence.east]
                .iter()
                .all(|edge| edge.is_finite()),
            "{code}: geocode.fence edges must be finite"
        );
        ensure!(
            fence.south < fence.north,
            "{code}: geocode.fence south ({}) must be below north ({})",
            fence.south,
            fence.north
        );
        ensure!(
            fence.west < fence.east,
            "{code}: geocode.fence west ({}) must be below east ({})",
            fence.west,
            fence.east
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

/// Load `.tether/config.toml` under `project_root`, or defaults when absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read, parsed or
/// validated.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_root.join(".tether/config.toml");
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let config = toml::from_str::<ProjectConfig>(&content).with_context(|| {
        format!(
            "{}: Failed to parse {}",
            ErrorCode::ConfigParseError.code(),
            path.display()
        )
    })?;
    config
        .validate()
        .with_context(|| format!("Invalid values in {}", path.display()))?;
    Ok(config)
}

/// Load `<config_dir>/tether/config.toml`, or defaults when absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };
    load_user_config_from(&config_dir.join("tether/config.toml"))
}

fn load_user_config_from(path: &Path) -> Result<UserConfig> {
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Merge project config, user config and environment into one view.
///
/// # Errors
///
/// Propagates load failures from either config file.
pub fn resolve_config(project_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;

    let env_format = env::var("FORMAT").ok();
    let resolved_output = resolve_output(cli_json, user.output.as_deref(), env_format.as_deref());

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
    })
}

/// Pick the output mode: `--json`, then `FORMAT`, then user config, then TTY
/// detection.
#[must_use]
pub fn resolve_output(
    cli_json: bool,
    user_output: Option<&str>,
    env_format: Option<&str>,
) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "table" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = user_output.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if std::io::stdout().is_terminal() {
        "pretty".to_string()
    } else {
        "text".to_string()
    }
}

const fn default_autosave_quiet_ms() -> u64 {
    600
}

const fn default_saved_display_ms() -> u64 {
    1000
}

const fn default_geocode_quiet_ms() -> u64 {
    700
}

fn default_endpoint() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_country() -> String {
    "Philippines".to_string()
}

fn default_country_codes() -> String {
    "ph".to_string()
}

fn default_accept_language() -> String {
    "en".to_string()
}

fn default_user_agent() -> String {
    format!("tether/{}", env!("CARGO_PKG_VERSION"))
}

const fn default_south() -> f64 {
    4.5
}

const fn default_west() -> f64 {
    116.0
}

const fn default_north() -> f64 {
    21.5
}

const fn default_east() -> f64 {
    127.0
}
