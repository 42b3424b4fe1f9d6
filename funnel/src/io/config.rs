//! Funnel configuration stored in `funnel.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::handle::{DEFAULT_PROJECTS, ProjectCatalog};
use crate::core::selector::SpinSettings;

/// Default config file name, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "funnel.toml";

/// Environment variable that overrides `backend.base_url`.
pub const BASE_URL_ENV: &str = "FUNNEL_API_BASE_URL";

/// Funnel configuration (TOML).
///
/// Missing fields default to values that talk to a backend on localhost.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FunnelConfig {
    /// Closed set of project names a visitor can pick.
    pub projects: Vec<String>,

    pub backend: BackendConfig,

    pub spin: SpinConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the funnel backend, without the `/api/f4f` suffix.
    pub base_url: String,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SpinConfig {
    pub frames: u32,
    pub initial_delay_ms: u64,
    pub delay_step_ms: u64,
}

impl Default for SpinConfig {
    fn default() -> Self {
        let settings = SpinSettings::default();
        Self {
            frames: settings.frames,
            initial_delay_ms: settings.initial_delay.as_millis() as u64,
            delay_step_ms: settings.delay_step.as_millis() as u64,
        }
    }
}

impl Default for FunnelConfig {
    fn default() -> Self {
        Self {
            projects: DEFAULT_PROJECTS.iter().map(|p| p.to_string()).collect(),
            backend: BackendConfig::default(),
            spin: SpinConfig::default(),
        }
    }
}

impl FunnelConfig {
    pub fn validate(&self) -> Result<()> {
        let base_url = self.backend.base_url.trim();
        if base_url.is_empty() {
            return Err(anyhow!("backend.base_url must not be empty"));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(anyhow!("backend.base_url must be an http(s) url"));
        }
        if self.backend.timeout_secs == 0 {
            return Err(anyhow!("backend.timeout_secs must be > 0"));
        }
        if self.catalog().is_empty() {
            return Err(anyhow!("projects must list at least one project"));
        }
        if self.spin.frames == 0 {
            return Err(anyhow!("spin.frames must be > 0"));
        }
        Ok(())
    }

    /// Apply environment overrides through `lookup` (usually `std::env::var`).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(BASE_URL_ENV).filter(|u| !u.trim().is_empty()) {
            debug!(base_url = %url, "base url overridden from environment");
            self.backend.base_url = url.trim().to_string();
        }
    }

    pub fn catalog(&self) -> ProjectCatalog {
        ProjectCatalog::new(&self.projects)
    }

    pub fn spin_settings(&self) -> SpinSettings {
        SpinSettings {
            frames: self.spin.frames,
            initial_delay: Duration::from_millis(self.spin.initial_delay_ms),
            delay_step: Duration::from_millis(self.spin.delay_step_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `FunnelConfig::default()`.
pub fn load_config(path: &Path) -> Result<FunnelConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing, using defaults");
        let cfg = FunnelConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: FunnelConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &FunnelConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, FunnelConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("funnel.toml");
        let mut cfg = FunnelConfig::default();
        cfg.projects = vec!["Sign".to_string(), "Monad".to_string()];
        cfg.backend.timeout_secs = 3;
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("funnel.toml");
        fs::write(&path, "[backend]\nbase_url = \"https://api.example.org\"\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.backend.base_url, "https://api.example.org");
        assert_eq!(cfg.backend.timeout_secs, 15);
        assert_eq!(cfg.spin, SpinConfig::default());
        assert!(!cfg.projects.is_empty());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = FunnelConfig::default();
        cfg.projects = vec!["  ".to_string()];
        assert!(cfg.validate().is_err());

        let mut cfg = FunnelConfig::default();
        cfg.backend.base_url = "ftp://nope".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = FunnelConfig::default();
        cfg.spin.frames = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn env_override_replaces_base_url() {
        let mut cfg = FunnelConfig::default();
        cfg.apply_env(|key| (key == BASE_URL_ENV).then(|| " https://f4f.example ".to_string()));
        assert_eq!(cfg.backend.base_url, "https://f4f.example");

        let mut untouched = FunnelConfig::default();
        untouched.apply_env(|_| Some(String::new()));
        assert_eq!(untouched, FunnelConfig::default());
    }

    #[test]
    fn spin_settings_follow_config() {
        let mut cfg = FunnelConfig::default();
        cfg.spin.frames = 4;
        cfg.spin.initial_delay_ms = 20;
        let settings = cfg.spin_settings();
        assert_eq!(settings.frames, 4);
        assert_eq!(settings.initial_delay, Duration::from_millis(20));
    }
}
