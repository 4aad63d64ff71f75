use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use crate::merge::{DEFAULT_EPSILON, Strategy};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EditorConfig {
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub save: SaveConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Length of an animated edit, in milliseconds. Zero disables transitions.
    #[serde(default = "default_transition_ms")]
    pub transition_ms: u64,
    /// Prepended to the saved-history and lock file names.
    #[serde(default)]
    pub storage_key_prefix: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            transition_ms: default_transition_ms(),
            storage_key_prefix: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeConfig {
    #[serde(default = "default_location_epsilon")]
    pub location_epsilon: f64,
    #[serde(default = "default_discard_tags")]
    pub discard_tags: Vec<String>,
    #[serde(default)]
    pub default_strategy: Strategy,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            location_epsilon: default_location_epsilon(),
            discard_tags: default_discard_tags(),
            default_strategy: Strategy::Safe,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveConfig {
    /// Version-conflict responses tolerated before a save gives up.
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: default_max_conflict_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
    /// Directory holding saved histories when none is given on the command line.
    #[serde(default)]
    pub history_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub editor: EditorConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

/// Load `<project_root>/.cartograph/config.toml`; a missing file yields defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<EditorConfig> {
    let path = project_root.join(".cartograph/config.toml");
    if !path.exists() {
        return Ok(EditorConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<EditorConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Load `<config_dir>/cartograph/config.toml`; a missing file yields defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("cartograph/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Project and user config plus the output mode, resolved as
/// `--json` > `CARTOGRAPH_FORMAT` > user `output` > terminal detection.
///
/// # Errors
///
/// Returns an error if either config file is unreadable or malformed.
pub fn resolve_config(project_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let editor = load_project_config(project_root)?;
    let user = load_user_config()?;

    let env_format = env::var("CARTOGRAPH_FORMAT").ok();
    let resolved_output = resolve_output(cli_json, user.output.as_deref(), env_format.as_deref());

    Ok(EffectiveConfig {
        editor,
        user,
        resolved_output,
    })
}

fn resolve_output(cli_json: bool, user_output: Option<&str>, env_format: Option<&str>) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "plain" => Some("text"),
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

const fn default_transition_ms() -> u64 {
    150
}

const fn default_location_epsilon() -> f64 {
    DEFAULT_EPSILON
}

fn default_discard_tags() -> Vec<String> {
    vec!["created_by".to_string()]
}

const fn default_max_conflict_retries() -> u32 {
    3
}
