//! Configuration for beeline paths and injected credentials.
//!
//! Sources (highest priority first):
//! 1. Environment variables (BEELINE_HOME, BEELINE_REGISTRY,
//!    BEELINE_OWNER, BEELINE_REGISTRY_TOKEN, BEELINE_ANALYSIS_URL,
//!    BEELINE_ANALYSIS_TOKEN)
//! 2. Config file (.beeline/config.yaml)
//! 3. Defaults (~/.beeline, ghcr.io, sonarcloud.io)
//!
//! Config file discovery searches the current directory and its parents.
//! Secrets only ever come from the environment; the file carries hosts
//! and the owner identifier, never tokens.

use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub registry: Option<RegistryConfig>,
    #[serde(default)]
    pub analysis: Option<AnalysisConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory (runs, reports)
    pub home: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    pub host: Option<String>,
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    pub base_url: Option<String>,
}

/// Resolved configuration handed into component constructors
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to beeline home (engine state)
    pub home: PathBuf,

    /// Registry host artifacts publish to
    pub registry_host: String,

    /// Repository owner/organization identifier (not normalized here)
    pub owner: String,

    /// Opaque registry credential (env only)
    pub registry_token: Option<String>,

    /// Analysis service base URL
    pub analysis_base_url: String,

    /// Opaque analysis service token (env only)
    pub analysis_token: Option<String>,

    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Directory holding recorded runs
    pub fn runs_dir(&self) -> PathBuf {
        self.home.join("runs")
    }
}

impl ConfigFile {
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse config YAML")
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".beeline").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Resolve configuration from an environment lookup and an optional
/// discovered config file. Split out so tests can drive it directly.
fn resolve_with(
    env: impl Fn(&str) -> Option<String>,
    file: Option<(PathBuf, ConfigFile)>,
) -> Result<ResolvedConfig> {
    let (config_path, config_file) = match file {
        Some((path, file)) => (Some(path), Some(file)),
        None => (None, None),
    };

    let file_home = config_file
        .as_ref()
        .and_then(|f| f.paths.home.clone())
        .map(|home| {
            // Paths in the file are relative to the file's parent directory.
            let base = config_path
                .as_ref()
                .and_then(|p| p.parent())
                .and_then(|p| p.parent())
                .map(PathBuf::from)
                .unwrap_or_default();
            base.join(home)
        });

    let home = env("BEELINE_HOME")
        .map(PathBuf::from)
        .or(file_home)
        .or_else(|| dirs::home_dir().map(|h| h.join(".beeline")))
        .context("Could not determine beeline home directory")?;

    let registry_host = env("BEELINE_REGISTRY")
        .or_else(|| {
            config_file
                .as_ref()
                .and_then(|f| f.registry.as_ref())
                .and_then(|r| r.host.clone())
        })
        .unwrap_or_else(|| "ghcr.io".to_string());

    let owner = env("BEELINE_OWNER")
        .or_else(|| {
            config_file
                .as_ref()
                .and_then(|f| f.registry.as_ref())
                .and_then(|r| r.owner.clone())
        })
        .unwrap_or_default();

    let analysis_base_url = env("BEELINE_ANALYSIS_URL")
        .or_else(|| {
            config_file
                .as_ref()
                .and_then(|f| f.analysis.as_ref())
                .and_then(|a| a.base_url.clone())
        })
        .unwrap_or_else(|| "https://sonarcloud.io".to_string());

    Ok(ResolvedConfig {
        home,
        registry_host,
        owner,
        registry_token: env("BEELINE_REGISTRY_TOKEN"),
        analysis_base_url,
        analysis_token: env("BEELINE_ANALYSIS_TOKEN"),
        config_file: config_path,
    })
}

fn resolve() -> Result<ResolvedConfig> {
    let file = match find_config_file() {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Some((path, ConfigFile::from_yaml(&content)?))
        }
        None => None,
    };

    resolve_with(|key| std::env::var(key).ok(), file)
}

/// Get the resolved configuration (cached after first call)
pub fn config() -> Result<ResolvedConfig> {
    let cached = CONFIG.get_or_init(|| resolve().map_err(|e| format!("{:#}", e)));

    match cached {
        Ok(cfg) => Ok(cfg.clone()),
        Err(msg) => anyhow::bail!("Configuration error: {}", msg),
    }
}

/// Directory holding recorded runs
pub fn runs_dir() -> Result<PathBuf> {
    Ok(config()?.runs_dir())
}
