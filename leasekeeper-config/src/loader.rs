use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, anyhow};
use leasekeeper_core::{FlowControl, LeaseTuning};
use serde::{Deserialize, Serialize};

pub const CONFIG_PATH_VAR: &str = "LEASER_CONFIG_PATH";
pub const CONFIG_JSON_VAR: &str = "LEASER_CONFIG_JSON";
pub const MAX_LEASE_DURATION_VAR: &str = "LEASER_MAX_LEASE_DURATION";

const DEFAULT_CONFIG_STEM: &str = "leaser";
const DEFAULT_CONFIG_DIRS: &[&str] = &["", "config"];

/// Serialization a config document is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Toml,
    Json,
    /// Unknown origin: TOML first, then JSON.
    Either,
}

impl ConfigFormat {
    fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::Json,
            Some("toml" | "tml") => Self::Toml,
            _ => Self::Either,
        }
    }
}

fn default_log_filter() -> String {
    "info,leaser::store=info,leaser::maintenance=info".into()
}

/// Source that produced the leaser configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LeaserConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

/// Everything needed to build a leaser for one subscriber session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LeaserConfig {
    /// Session limits. `max_lease_duration_secs` decides when a held message
    /// stops being renewed and is dropped instead.
    pub flow_control: FlowControl,
    /// Maintenance loop tuning: deadline percentile, snooze bounds and the
    /// diagnostics channel size.
    pub lease: LeaseTuning,
    /// Default `tracing` filter, used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for LeaserConfig {
    fn default() -> Self {
        Self {
            flow_control: FlowControl::default(),
            lease: LeaseTuning::default(),
            log_filter: default_log_filter(),
        }
    }
}

impl LeaserConfig {
    /// Load configuration from the process environment.
    /// Evaluation order:
    /// 1) `$LEASER_CONFIG_PATH` (TOML or JSON file),
    /// 2) `$LEASER_CONFIG_JSON` (inline JSON),
    /// 3) `leaser.toml`/`leaser.json` (also under `config/`),
    /// 4) defaults.
    ///
    /// `$LEASER_MAX_LEASE_DURATION` (e.g. `90m`) is applied on top.
    pub fn load_from_env() -> anyhow::Result<(Self, LeaserConfigSource)> {
        Self::load_with(|name| env::var(name).ok())
    }

    /// [`LeaserConfig::load_from_env`] with an explicit variable lookup.
    pub fn load_with<F>(lookup: F) -> anyhow::Result<(Self, LeaserConfigSource)>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (mut config, source) = Self::load_base(&lookup)?;
        config.apply_overrides(&lookup)?;
        config.validate()?;
        Ok((config, source))
    }

    fn load_base<F>(lookup: &F) -> anyhow::Result<(Self, LeaserConfigSource)>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path_str) = lookup(CONFIG_PATH_VAR)
            && !path_str.trim().is_empty()
        {
            let path = PathBuf::from(path_str);
            let config = Self::load_from_file(&path)?;
            return Ok((config, LeaserConfigSource::EnvPath(path)));
        }

        if let Some(raw) = lookup(CONFIG_JSON_VAR)
            && !raw.trim().is_empty()
        {
            let parsed = Self::parse_json(&raw)
                .with_context(|| format!("failed to parse {CONFIG_JSON_VAR}"))?;
            return Ok((parsed, LeaserConfigSource::EnvInline));
        }

        if let Some(path) = Self::find_default_file() {
            let config = Self::load_from_file(&path)?;
            return Ok((config, LeaserConfigSource::File(path)));
        }

        Ok((Self::default(), LeaserConfigSource::Default))
    }

    fn apply_overrides<F>(&mut self, lookup: &F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(MAX_LEASE_DURATION_VAR)
            && !raw.trim().is_empty()
        {
            let duration = humantime::parse_duration(raw.trim())
                .with_context(|| format!("invalid {MAX_LEASE_DURATION_VAR} value {raw:?}"))?;
            self.flow_control.max_lease_duration_secs = duration.as_secs();
            tracing::debug!(
                max_lease_duration_secs = duration.as_secs(),
                "max lease duration overridden from environment"
            );
        }
        Ok(())
    }

    /// Read a config file, choosing the format from its extension. Files
    /// without a known extension are tried as TOML, then JSON.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read leaser config from {}", path.display()))?;
        Self::parse(
            &contents,
            ConfigFormat::for_path(path),
            &path.display().to_string(),
        )
    }

    pub fn parse_from_str(contents: &str, origin: &str) -> anyhow::Result<Self> {
        Self::parse(contents, ConfigFormat::Either, origin)
    }

    pub fn parse_json(raw: &str) -> anyhow::Result<Self> {
        Self::parse(raw, ConfigFormat::Json, CONFIG_JSON_VAR)
    }

    fn parse(contents: &str, format: ConfigFormat, origin: &str) -> anyhow::Result<Self> {
        match format {
            ConfigFormat::Json => serde_json::from_str(contents)
                .with_context(|| format!("invalid leaser config json in {origin}")),
            ConfigFormat::Toml => toml::from_str(contents)
                .with_context(|| format!("invalid leaser config toml in {origin}")),
            ConfigFormat::Either => toml::from_str(contents).or_else(|toml_err| {
                serde_json::from_str(contents).map_err(|json_err| {
                    anyhow!(
                        "failed to parse leaser config {origin}: \
                         toml error: {toml_err}; json error: {json_err}"
                    )
                })
            }),
        }
    }

    /// First existing `leaser.{toml,json}` in the working directory, then
    /// under `config/`.
    fn find_default_file() -> Option<PathBuf> {
        DEFAULT_CONFIG_DIRS
            .iter()
            .flat_map(|dir| {
                ["toml", "json"]
                    .map(|ext| Path::new(dir).join(format!("{DEFAULT_CONFIG_STEM}.{ext}")))
            })
            .find(|path| path.is_file())
    }
}
