//! Configuration management for the Unminimize daemon.
//!
//! Configuration is loaded from TOML files in the following locations (in order):
//! 1. `%APPDATA%/unminimize/config.toml` (Windows standard)
//! 2. `~/.config/unminimize/config.toml` (Unix-style, for WSL compatibility)
//! 3. `./config.toml` (current directory, for development)

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use unminimize_core::{AppRule, HotkeyError, KeyCombo, Modifiers, Scope, TrackerConfig};

/// Main configuration structure for Unminimize.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Behavior configuration.
    pub behavior: BehaviorConfig,
    /// Global restore shortcut.
    pub hotkey: HotkeyConfig,
    /// Applications whose windows are never tracked.
    #[serde(default)]
    pub ignore: Vec<IgnoreRule>,
}

/// Which windows the hotkey considers (wrapper for serialization).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScopeConfig {
    /// Most recently minimized window of any application.
    #[default]
    AnyApplication,
    /// Most recently minimized window of the frontmost application only.
    ActiveApplicationOnly,
}

impl From<ScopeConfig> for Scope {
    fn from(config: ScopeConfig) -> Self {
        match config {
            ScopeConfig::AnyApplication => Scope::AnyApplication,
            ScopeConfig::ActiveApplicationOnly => Scope::ActiveApplicationOnly,
        }
    }
}

impl From<Scope> for ScopeConfig {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::AnyApplication => ScopeConfig::AnyApplication,
            Scope::ActiveApplicationOnly => ScopeConfig::ActiveApplicationOnly,
        }
    }
}

/// Behavior-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Restore scope used by the hotkey.
    #[serde(default)]
    pub scope: ScopeConfig,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            scope: ScopeConfig::default(),
            log_level: default_log_level(),
        }
    }
}

/// Global hotkey configuration.
///
/// The shortcut is given either as a string or as a raw virtual-key code
/// plus modifier mask (`Alt = 1`, `Ctrl = 2`, `Shift = 4`, `Win = 8`).
/// The raw form wins when both are present.
///
/// ```toml
/// [hotkey]
/// shortcut = "Ctrl+Alt+M"
/// # key_code = 77
/// # modifiers = 3
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeyConfig {
    /// Whether the global hotkey is registered at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Shortcut string, e.g. `Ctrl+Alt+M`.
    #[serde(default = "default_shortcut")]
    pub shortcut: String,

    /// Raw virtual-key code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_code: Option<u32>,

    /// Raw modifier mask, used with `key_code`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifiers: Option<u32>,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            shortcut: default_shortcut(),
            key_code: None,
            modifiers: None,
        }
    }
}

impl HotkeyConfig {
    /// The configured key combination, or `None` when the hotkey is disabled.
    pub fn combo(&self) -> Result<Option<KeyCombo>, HotkeyError> {
        if !self.enabled {
            return Ok(None);
        }
        let combo = match self.key_code {
            Some(key_code) => KeyCombo::new(key_code, Modifiers::from_bits(self.modifiers.unwrap_or(0)))?,
            None => self.shortcut.parse()?,
        };
        Ok(Some(combo))
    }
}

/// An application that is never tracked.
///
/// All specified criteria must match. A rule without criteria matches nothing.
///
/// # Example Config
///
/// ```toml
/// [[ignore]]
/// match_app_id = '\\explorer\.exe$'
///
/// [[ignore]]
/// match_name = "^keepass"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IgnoreRule {
    /// Regex matched against the application id (lowercased executable path).
    #[serde(default)]
    pub match_app_id: Option<String>,

    /// Regex matched against the application display name.
    #[serde(default)]
    pub match_name: Option<String>,
}

impl IgnoreRule {
    /// Compile into a matcher.
    pub fn compile(&self) -> Result<AppRule, String> {
        AppRule::new(self.match_app_id.as_deref(), self.match_name.as_deref()).map_err(|e| e.to_string())
    }
}

/// A problem found while validating configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    /// Dotted path of the offending field.
    pub field: String,
    /// What was wrong and what was done about it.
    pub message: String,
}

impl ConfigWarning {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_shortcut() -> String {
    "Ctrl+Alt+M".to_string()
}

impl Config {
    /// Load configuration from standard locations.
    ///
    /// Returns default config if no file is found.
    pub fn load() -> Result<Self> {
        let paths = config_paths();

        for path in &paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Check values and fix up the ones that cannot be used.
    ///
    /// An unusable hotkey is disabled rather than rejected, so the daemon still
    /// tracks windows and can be driven from the CLI.
    pub fn validate(&mut self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        let level = self.behavior.log_level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            warnings.push(ConfigWarning::new(
                "behavior.log_level",
                format!("unknown level '{}', using 'info'", self.behavior.log_level),
            ));
            self.behavior.log_level = default_log_level();
        }

        if self.hotkey.modifiers.is_some() && self.hotkey.key_code.is_none() {
            warnings.push(ConfigWarning::new(
                "hotkey.modifiers",
                "ignored without hotkey.key_code",
            ));
        }

        if let Err(e) = self.hotkey.combo() {
            warnings.push(ConfigWarning::new("hotkey", format!("{}; hotkey disabled", e)));
            self.hotkey.enabled = false;
        }

        for (i, rule) in self.ignore.iter().enumerate() {
            if rule.match_app_id.is_none() && rule.match_name.is_none() {
                warnings.push(ConfigWarning::new(
                    format!("ignore[{}]", i),
                    "rule has no criteria and matches nothing",
                ));
            } else if let Err(e) = rule.compile() {
                warnings.push(ConfigWarning::new(
                    format!("ignore[{}]", i),
                    format!("invalid regex, rule skipped: {}", e),
                ));
            }
        }

        warnings
    }

    /// Ignore rules that compile. Invalid ones are reported by [`validate`](Self::validate).
    pub fn compiled_rules(&self) -> Vec<AppRule> {
        self.ignore.iter().filter_map(|rule| rule.compile().ok()).collect()
    }

    /// Settings handed to the tracker.
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            scope: self.behavior.scope.into(),
            ignore_rules: self.compiled_rules(),
        }
    }
}

/// Get all possible config file paths in priority order.
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // 1. Windows standard: %APPDATA%/unminimize/config.toml
    if let Some(proj_dirs) = ProjectDirs::from("com", "unminimize", "unminimize") {
        paths.push(proj_dirs.config_dir().join("config.toml"));
    }

    // 2. Unix-style: ~/.config/unminimize/config.toml
    if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
        paths.push(home.join(".config").join("unminimize").join("config.toml"));
    }

    // 3. Current directory: ./config.toml
    paths.push(PathBuf::from("config.toml"));

    paths
}

/// The file `Config::load` reads, or where a new one should be created.
pub fn preferred_config_path() -> Option<PathBuf> {
    let paths = config_paths();
    paths
        .iter()
        .find(|p| p.exists())
        .or_else(|| paths.first())
        .cloned()
}

/// Write the default configuration to `path`, creating parent directories.
pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
    }
    let content = toml::to_string_pretty(&Config::default()).context("Failed to serialize default config")?;
    fs::write(path, content).with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(())
}
