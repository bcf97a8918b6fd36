//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::config::{parse_utc_offset, SourceKind};
use crate::history::ExpansionToggle;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Platewise - meal and recommendation history, grouped by day
///
/// Pulls a user's menu recommendations and logged meals from the
/// document store (or a local snapshot) and shows them per day and meal.
///
/// Examples:
///   platewise --user abc123 --project-id my-app
///   platewise --user abc123 --expand 2024-06-01,2024-06-01:lunch
///   platewise --user abc123 --source snapshot --snapshot history.json --format json
///   platewise --user abc123 --source snapshot --log-meal "Chicken salad"
///   platewise --user abc123 --watch 30
///   platewise --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// User id whose history to show
    #[arg(
        short,
        long,
        value_name = "UID",
        env = "PLATEWISE_USER",
        required_unless_present = "init_config"
    )]
    pub user: Option<String>,

    /// Where to read history from
    #[arg(long, value_name = "KIND")]
    pub source: Option<SourceKind>,

    /// Snapshot file (for --source snapshot)
    #[arg(long, value_name = "FILE")]
    pub snapshot: Option<PathBuf>,

    /// Firestore project id
    #[arg(long, value_name = "ID", env = "PLATEWISE_PROJECT_ID")]
    pub project_id: Option<String>,

    /// Firestore web API key
    #[arg(long, value_name = "KEY", env = "PLATEWISE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// ID token of the signed-in user, sent as a bearer token
    #[arg(long, value_name = "TOKEN", env = "PLATEWISE_ID_TOKEN", hide_env_values = true)]
    pub id_token: Option<String>,

    /// Output format (markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Write the report to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Days or meals to expand (comma-separated)
    ///
    /// Example: --expand 2024-06-01,2024-06-02:dinner
    #[arg(short, long, value_name = "KEYS", value_delimiter = ',')]
    pub expand: Vec<String>,

    /// Expand every day and meal
    #[arg(long)]
    pub expand_all: bool,

    /// Do not fetch the latest meal separately
    #[arg(long)]
    pub no_latest: bool,

    /// Re-fetch every SECS seconds and re-render on change
    #[arg(long, value_name = "SECS")]
    pub watch: Option<u64>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Offset to show dates in, e.g. +02:00
    ///
    /// By default each timestamp keeps the offset it was stored with.
    #[arg(long, value_name = "OFFSET", allow_hyphen_values = true)]
    pub utc_offset: Option<String>,

    /// Exit with code 2 if a stream was unavailable or events were skipped
    #[arg(long)]
    pub fail_on_errors: bool,

    /// Log a meal into the snapshot file and exit
    #[arg(long, value_name = "TEXT", conflicts_with = "log_recommendation")]
    pub log_meal: Option<String>,

    /// Log a recommendation into the snapshot file and exit
    #[arg(long, value_name = "TEXT", conflicts_with = "log_meal")]
    pub log_recommendation: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .platewise.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .platewise.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The user id; empty only when validation was skipped.
    pub fn user_id(&self) -> &str {
        self.user.as_deref().unwrap_or("")
    }

    /// Whether this run records a new event instead of showing history.
    pub fn is_logging(&self) -> bool {
        self.log_meal.is_some() || self.log_recommendation.is_some()
    }

    /// Parsed --expand toggles.
    pub fn expansion_toggles(&self) -> Result<Vec<ExpansionToggle>, String> {
        self.expand
            .iter()
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse::<ExpansionToggle>())
            .collect()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        let user = self.user.as_deref().unwrap_or("");
        if user.trim().is_empty() {
            return Err("User id must not be empty".to_string());
        }
        if user.contains('/') {
            return Err("User id must not contain '/'".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(watch) = self.watch {
            if watch == 0 {
                return Err("Watch interval must be at least 1 second".to_string());
            }
            if self.is_logging() {
                return Err("Cannot use --watch while logging an event".to_string());
            }
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(ref offset) = self.utc_offset {
            if parse_utc_offset(offset).is_none() {
                return Err(format!(
                    "Invalid UTC offset {:?}, expected e.g. +02:00 or -0530",
                    offset
                ));
            }
        }

        self.expansion_toggles()?;

        if self.is_logging() && self.source == Some(SourceKind::Firestore) {
            return Err("Logging events is only supported with --source snapshot".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `config_verbose` is the `[general].verbose` setting; `--quiet` wins
    /// over it.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            user: Some("abc123".to_string()),
            source: None,
            snapshot: None,
            project_id: None,
            api_key: None,
            id_token: None,
            format: None,
            output: None,
            expand: Vec::new(),
            expand_all: false,
            no_latest: false,
            watch: None,
            timeout: None,
            utc_offset: None,
            fail_on_errors: false,
            log_meal: None,
            log_recommendation: None,
            config: None,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    #[test]
    fn test_valid_defaults() {
        assert!(make_args().validate().is_ok());
    }

    #[test]
    fn test_validation_user() {
        let mut args = make_args();
        args.user = Some("  ".to_string());
        assert!(args.validate().is_err());

        args.user = Some("a/b".to_string());
        assert!(args.validate().is_err());

        args.user = None;
        args.init_config = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_expand_keys() {
        let mut args = make_args();
        args.expand = vec!["2024-06-01".to_string(), "2024-06-01:dinner".to_string()];
        assert_eq!(args.expansion_toggles().unwrap().len(), 2);
        assert!(args.validate().is_ok());

        args.expand.push("tomorrow".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_watch_and_offset() {
        let mut args = make_args();
        args.watch = Some(0);
        assert!(args.validate().is_err());

        args.watch = Some(10);
        args.log_meal = Some("Soup".to_string());
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.utc_offset = Some("+25:00".to_string());
        assert!(args.validate().is_err());
        args.utc_offset = Some("-05:30".to_string());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_logging_needs_snapshot() {
        let mut args = make_args();
        args.log_meal = Some("Soup".to_string());
        args.source = Some(SourceKind::Firestore);
        assert!(args.validate().is_err());

        args.source = Some(SourceKind::Snapshot);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(false), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(false), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(false), tracing::Level::ERROR);
    }

    #[test]
    fn test_log_level_from_config() {
        let mut args = make_args();
        assert_eq!(args.log_level(true), tracing::Level::DEBUG);

        args.quiet = true;
        assert_eq!(args.log_level(true), tracing::Level::ERROR);
    }

    #[test]
    fn test_parse_from_command_line() {
        let args = Args::try_parse_from([
            "platewise",
            "--user",
            "u1",
            "--source",
            "snapshot",
            "--expand",
            "2024-06-01,2024-06-02:lunch",
            "--utc-offset",
            "-03:00",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(args.user_id(), "u1");
        assert_eq!(args.source, Some(SourceKind::Snapshot));
        assert_eq!(args.expand.len(), 2);
        assert_eq!(args.utc_offset.as_deref(), Some("-03:00"));
        assert_eq!(args.format, Some(OutputFormat::Json));
    }
}
