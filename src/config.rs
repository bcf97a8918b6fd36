//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.platewise.toml` files.

use crate::cli::OutputFormat;
use anyhow::{Context, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default config file name, looked up in the current directory.
pub const CONFIG_FILE: &str = ".platewise.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Event source settings.
    #[serde(default)]
    pub source: SourceConfig,

    /// History view settings.
    #[serde(default)]
    pub history: HistoryConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Report output file; empty writes to stdout.
    #[serde(default)]
    pub output: String,

    /// Report format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

/// Which adapter supplies history events.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Firestore REST API
    #[default]
    Firestore,
    /// Local JSON snapshot file
    Snapshot,
}

/// Event source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,

    /// Firestore project id.
    #[serde(default)]
    pub project_id: String,

    /// Firestore web API key.
    #[serde(default)]
    pub api_key: String,

    /// Firestore database name.
    #[serde(default = "default_database")]
    pub database: String,

    /// Firestore REST base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Snapshot file used by the snapshot source.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,

    /// Offset to show dates in. When empty, Firestore timestamps use the
    /// local zone and snapshot timestamps keep their stored offset.
    #[serde(default)]
    pub utc_offset: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            project_id: String::new(),
            api_key: String::new(),
            database: default_database(),
            base_url: default_base_url(),
            timeout_seconds: default_timeout(),
            snapshot_path: default_snapshot_path(),
            utc_offset: String::new(),
        }
    }
}

fn default_database() -> String {
    "(default)".to_string()
}

fn default_base_url() -> String {
    "https://firestore.googleapis.com/v1".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_snapshot_path() -> String {
    "platewise_snapshot.json".to_string()
}

impl SourceConfig {
    /// The configured display offset, if any.
    pub fn utc_offset(&self) -> Result<Option<FixedOffset>> {
        if self.utc_offset.trim().is_empty() {
            return Ok(None);
        }
        parse_utc_offset(&self.utc_offset)
            .map(Some)
            .with_context(|| format!("Invalid utc_offset in config: {:?}", self.utc_offset))
    }
}

/// History view settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Expand every day and meal.
    #[serde(default)]
    pub expand_all: bool,

    /// Fetch and show the latest meal.
    #[serde(default = "default_true")]
    pub show_latest: bool,

    /// Maximum characters in collapsed previews.
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            expand_all: false,
            show_latest: true,
            preview_chars: default_preview_chars(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_preview_chars() -> usize {
    60
}

/// Parse `+HH:MM`, `-HHMM`, `+HH`, `Z` or `UTC` into a fixed offset.
pub fn parse_utc_offset(s: &str) -> Option<FixedOffset> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match s.chars().next()? {
        '+' => (1, &s[1..]),
        '-' => (-1, &s[1..]),
        _ => return None,
    };

    if !rest.is_ascii() {
        return None;
    }
    let (hh, mm) = match rest.len() {
        2 => (rest, "00"),
        4 => (&rest[..2], &rest[2..]),
        5 if &rest[2..3] == ":" => (&rest[..2], &rest[3..]),
        _ => return None,
    };
    if !hh.chars().chain(mm.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }

    let hours: i32 = hh.parse().ok()?;
    let minutes: i32 = mm.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if let Some(format) = args.format {
            self.general.format = format;
        }

        if let Some(kind) = args.source {
            self.source.kind = kind;
        }
        // A snapshot path implies the snapshot source unless one was named
        if let Some(ref snapshot) = args.snapshot {
            self.source.snapshot_path = snapshot.display().to_string();
            if args.source.is_none() {
                self.source.kind = SourceKind::Snapshot;
            }
        }
        if let Some(ref project_id) = args.project_id {
            self.source.project_id = project_id.clone();
        }
        if let Some(ref api_key) = args.api_key {
            self.source.api_key = api_key.clone();
        }
        if let Some(timeout) = args.timeout {
            self.source.timeout_seconds = timeout;
        }
        if let Some(ref offset) = args.utc_offset {
            self.source.utc_offset = offset.clone();
        }

        // Flags always override
        if args.expand_all {
            self.history.expand_all = true;
        }
        if args.no_latest {
            self.history.show_latest = false;
        }
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
