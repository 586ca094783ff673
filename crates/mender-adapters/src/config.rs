//! Configuration management for mender
//!
//! Two layers:
//! - `mender.toml` at the repository root: agent limits, tool commands, ignores
//! - `~/.config/mender/config.json`: per-user settings such as the oracle API key

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use url::Url;

pub const REPO_CONFIG_FILE: &str = "mender.toml";
pub const DEFAULT_ORACLE_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

/// Command lines for the external tool surface. `None` means "detect".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolCommands {
    pub linter: Option<String>,
    pub linter_fix: Option<String>,
    pub type_checker: Option<String>,
    pub outdated: Option<String>,
    pub audit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
    pub base_url: String,
    /// Model id overrides per tier
    pub speed_model: Option<String>,
    pub balanced_model: Option<String>,
    pub smart_model: Option<String>,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ORACLE_URL.to_string(),
            speed_model: None,
            balanced_model: None,
            smart_model: None,
        }
    }
}

/// Repository-level agent settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_issues_per_run: usize,
    pub max_retries: u32,
    pub budget_usd: f64,
    pub dry_run: bool,
    pub commit: bool,
    pub tool_timeout_secs: u64,
    pub oracle_timeout_secs: u64,
    pub skip_after_failures: u32,
    pub min_success_rate: f64,
    /// Path prefixes or `*`-globs excluded from scans
    pub ignore: Vec<String>,
    pub tools: ToolCommands,
    pub oracle: OracleSettings,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_issues_per_run: 5,
            max_retries: 3,
            budget_usd: 0.50,
            dry_run: false,
            commit: true,
            tool_timeout_secs: 180,
            oracle_timeout_secs: 90,
            skip_after_failures: 3,
            min_success_rate: 0.5,
            ignore: Vec::new(),
            tools: ToolCommands::default(),
            oracle: OracleSettings::default(),
        }
    }
}

impl AgentConfig {
    /// Read `mender.toml` (if present), then apply environment overrides.
    pub fn load(repo_root: &Path) -> Result<Self> {
        let mut config = Self::load_file(&repo_root.join(REPO_CONFIG_FILE))?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        config.sanitize();
        Ok(config)
    }

    /// `MENDER_BUDGET_USD`, `MENDER_MAX_ISSUES`, `MENDER_DRY_RUN`.
    /// Unparseable values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(budget) = lookup("MENDER_BUDGET_USD").and_then(|v| v.trim().parse::<f64>().ok())
        {
            self.budget_usd = budget;
        }
        if let Some(max) = lookup("MENDER_MAX_ISSUES").and_then(|v| v.trim().parse::<usize>().ok())
        {
            self.max_issues_per_run = max;
        }
        if let Some(flag) = lookup("MENDER_DRY_RUN").and_then(|v| parse_flag(&v)) {
            self.dry_run = flag;
        }
        self.sanitize();
    }

    fn sanitize(&mut self) {
        if !self.budget_usd.is_finite() || self.budget_usd < 0.0 {
            self.budget_usd = 0.0;
        }
        self.max_retries = self.max_retries.max(1);
        self.tool_timeout_secs = self.tool_timeout_secs.max(1);
        self.oracle_timeout_secs = self.oracle_timeout_secs.max(1);
        self.skip_after_failures = self.skip_after_failures.max(1);
        if !self.min_success_rate.is_finite() {
            self.min_success_rate = 0.5;
        }
        self.min_success_rate = self.min_success_rate.clamp(0.0, 1.0);
    }

    pub fn validate(&self) -> Result<()> {
        validate_oracle_url(&self.oracle.base_url)?;
        Ok(())
    }

    pub fn is_ignored(&self, relative: &Path) -> bool {
        let path = relative.to_string_lossy().replace('\\', "/");
        self.ignore.iter().any(|pattern| glob_match(pattern, &path))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// HTTPS only, except plain HTTP to a loopback host for local proxies.
pub fn validate_oracle_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("Invalid oracle URL '{}'", raw))?;
    let loopback = matches!(url.host_str(), Some("localhost") | Some("127.0.0.1") | Some("[::1]"));
    match url.scheme() {
        "https" => Ok(url),
        "http" if loopback => Ok(url),
        other => Err(anyhow!(
            "Oracle URL must use https (got '{}' in '{}')",
            other,
            raw
        )),
    }
}

/// A pattern without `*` matches as a path prefix; `*` matches any run of
/// characters (including `/`).
fn glob_match(pattern: &str, path: &str) -> bool {
    let pattern = pattern.trim().trim_start_matches("./");
    if pattern.is_empty() {
        return false;
    }
    if !pattern.contains('*') {
        let dir = pattern.trim_end_matches('/');
        return path == dir || path.starts_with(&format!("{}/", dir));
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let mut rest = path;
    for (idx, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if idx == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if idx == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

/// Per-user settings stored in the platform config dir.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub openrouter_api_key: Option<String>,
    /// Anonymous id forwarded to the oracle for abuse tracking
    pub openrouter_user_id: Option<String>,
}

impl UserConfig {
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("mender"))
    }

    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load config from disk, or return default
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// A corrupt file is moved aside and defaults are used.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str::<UserConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                preserve_corrupt_config(path, &content);
                tracing::warn!(
                    error = %err,
                    path = %path.display(),
                    "user config was corrupted; a backup was saved and defaults were loaded"
                );
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
        self.save_to(&dir.join("config.json"))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(e) = fs::set_permissions(dir, fs::Permissions::from_mode(0o700)) {
                    tracing::debug!(error = %e, "failed to set config directory permissions");
                }
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        write_config_atomic(path, &content)
    }

    /// Stored key first, then `OPENROUTER_API_KEY`.
    pub fn api_key(&self) -> Option<String> {
        self.api_key_with(|key| std::env::var(key).ok())
    }

    pub fn api_key_with<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.openrouter_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .or_else(|| lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty()))
    }

    /// Returns the anonymous user id, minting one on first use.
    pub fn ensure_user_id(&mut self) -> String {
        self.openrouter_user_id
            .get_or_insert_with(|| format!("mender-{}", uuid::Uuid::new_v4()))
            .clone()
    }

    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/mender/config.json".to_string())
    }
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

fn write_config_atomic(path: &Path, content: &str) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)
        .with_context(|| format!("Failed to open {}", tmp_path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = file.set_permissions(fs::Permissions::from_mode(0o600));
    }

    file.write_all(content.as_bytes())?;
    drop(file);

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    Ok(())
}
