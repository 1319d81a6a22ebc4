use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub const DEFAULT_KEY_HEADER: &str = "X-Pantry-Key";
pub const DEFAULT_BASKET_REGEX: &str = r"([^/]+)/?$";
pub const DEFAULT_REPLACED_PATH_HEADER: &str = "X-Replaced-Path";

/// What to do when a request arrives without a Pantry ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingIdentifierPolicy {
    /// Forward under the `unknown` pantry and log a warning.
    Substitute,
    /// Answer 400 and never reach the next handler.
    #[default]
    Reject,
}

impl std::str::FromStr for MissingIdentifierPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "substitute" | "lenient" => Ok(Self::Substitute),
            "reject" | "strict" => Ok(Self::Reject),
            other => anyhow::bail!("unknown missing-identifier policy '{}'", other),
        }
    }
}

/// Rewriter configuration. Keys use the camelCase names of the Pantry plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PantryPathConfig {
    /// Header holding the Pantry ID. Consumed, never forwarded.
    pub key_header: String,
    /// Regex with one capture group selecting the basket name from the path.
    pub basket_regex: String,
    pub on_missing_identifier: MissingIdentifierPolicy,
    /// Percent-decode the rebuilt path and re-derive the request target from it.
    pub resync_raw_path: bool,
    /// Header receiving the original escaped path. `None` disables it.
    ///
    /// The value replaces any copy the client sent instead of being appended,
    /// so the backend only ever sees the path the rewriter started from.
    pub replaced_path_header: Option<String>,
}

impl Default for PantryPathConfig {
    fn default() -> Self {
        Self {
            key_header: DEFAULT_KEY_HEADER.to_string(),
            basket_regex: DEFAULT_BASKET_REGEX.to_string(),
            on_missing_identifier: MissingIdentifierPolicy::default(),
            resync_raw_path: true,
            replaced_path_header: Some(DEFAULT_REPLACED_PATH_HEADER.to_string()),
        }
    }
}

impl PantryPathConfig {
    /// The forgiving setup: substitute `unknown`, plain path assignment, no extra header.
    pub fn lenient() -> Self {
        Self {
            on_missing_identifier: MissingIdentifierPolicy::Substitute,
            resync_raw_path: false,
            replaced_path_header: None,
            ..Self::default()
        }
    }

    fn apply_env(&mut self) -> anyhow::Result<()> {
        if let Ok(v) = std::env::var("PANTRY_KEY_HEADER") {
            self.key_header = v;
        }
        if let Ok(v) = std::env::var("PANTRY_BASKET_REGEX") {
            self.basket_regex = v;
        }
        if let Ok(v) = std::env::var("PANTRY_ON_MISSING_ID") {
            self.on_missing_identifier = v.parse()?;
        }
        if let Ok(v) = std::env::var("PANTRY_RESYNC_RAW_PATH") {
            self.resync_raw_path = parse_bool(&v)
                .with_context(|| format!("PANTRY_RESYNC_RAW_PATH has invalid value '{}'", v))?;
        }
        if let Ok(v) = std::env::var("PANTRY_REPLACED_PATH_HEADER") {
            let v = v.trim();
            self.replaced_path_header = (!v.is_empty()).then(|| v.to_string());
        }
        Ok(())
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read a config file. `.json` goes through serde_json, anything else is YAML.
pub fn from_file(path: &Path) -> anyhow::Result<PantryPathConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;

    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let cfg = if is_json {
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid JSON config {}", path.display()))?
    } else {
        serde_yaml::from_str(&raw)
            .with_context(|| format!("invalid YAML config {}", path.display()))?
    };
    Ok(cfg)
}

/// Defaults, then the optional file, then `PANTRY_*` environment overrides.
///
/// Values are not validated here; building the rewriter does that.
pub fn load(path: Option<&Path>) -> anyhow::Result<PantryPathConfig> {
    dotenvy::dotenv().ok();

    let mut cfg = match path {
        Some(p) => from_file(p)?,
        None => PantryPathConfig::default(),
    };
    cfg.apply_env()?;

    tracing::debug!(
        key_header = %cfg.key_header,
        basket_regex = %cfg.basket_regex,
        policy = ?cfg.on_missing_identifier,
        resync_raw_path = cfg.resync_raw_path,
        "loaded pantry path config"
    );
    Ok(cfg)
}
