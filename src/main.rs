//! Platewise - meal and recommendation history viewer
//!
//! A CLI tool that pulls a user's menu recommendations and logged meals
//! from the document store (or a local snapshot) and shows them grouped
//! by day and meal.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (bad config, unreadable snapshot, write failure, etc.)
//!   2 - A stream was unavailable or events were skipped, with --fail-on-errors

mod cli;
mod config;
mod error;
mod history;
mod models;
mod report;
mod source;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, FixedOffset, Local};
use cli::{Args, OutputFormat};
use config::{Config, SourceKind, CONFIG_FILE};
use history::{load_history, ExpansionState, HistoryView};
use indicatif::{ProgressBar, ProgressStyle};
use models::{MealTakenEvent, Payload, RecommendationEvent};
use source::{EventSource, SnapshotSource};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration before logging so [general].verbose applies
    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("\n❌ Error: {}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(&args, &config);

    info!("Platewise v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {}", e);
            eprintln!("\n❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .platewise.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to set the project id, source, and display options.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args, config: &Config) {
    let level = args.log_level(config.general.verbose);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the requested workflow. Returns the exit code (0 or 2).
async fn run(args: Args, config: Config) -> Result<i32> {
    debug!("Using {:?} source", config.source.kind);

    let user_id = args.user_id().to_string();

    // --log-meal / --log-recommendation: record and exit
    if args.is_logging() {
        return handle_log_event(&args, &config, &user_id).await;
    }

    let source = source::build_source(&config, args.id_token.clone())?;

    let mut expansion = ExpansionState::new();
    for toggle in args.expansion_toggles().map_err(anyhow::Error::msg)? {
        expansion.toggle(toggle);
    }

    let view = fetch_with_progress(source.as_ref(), &user_id, &config, args.quiet).await;
    if config.history.expand_all {
        expansion.expand_all(&view.days);
    }
    emit_report(&view, &expansion, &config)?;
    print_summary(&view, &config, args.quiet);

    let view = match args.watch {
        Some(secs) => watch(source.as_ref(), &user_id, &config, &mut expansion, view, secs).await?,
        None => view,
    };

    let code = exit_code(&view, args.fail_on_errors);
    if code == 2 {
        eprintln!(
            "\n⛔ {} unavailable stream(s), {} skipped event(s). Failing (exit code 2).",
            view.source_errors.len(),
            view.skipped.len()
        );
    }

    Ok(code)
}

/// 2 when --fail-on-errors is set and a stream failed or events were
/// skipped, 0 otherwise.
fn exit_code(view: &HistoryView, fail_on_errors: bool) -> i32 {
    if fail_on_errors && view.has_errors() {
        2
    } else {
        0
    }
}

/// Whether a refetched view needs to be rendered again.
fn view_changed(previous: &HistoryView, next: &HistoryView) -> bool {
    previous.days != next.days || previous.latest_meal != next.latest_meal
}

/// Load history with a spinner on stderr.
async fn fetch_with_progress(
    source: &dyn EventSource,
    user_id: &str,
    config: &Config,
    quiet: bool,
) -> HistoryView {
    let spinner = if quiet {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("Loading history for {} from {}...", user_id, source.name()));
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    };

    let view = load_history(source, user_id, config.history.show_latest).await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    view
}

/// Re-fetch every `secs` seconds until Ctrl-C, re-rendering when the
/// grouped days change. Returns the last view.
async fn watch(
    source: &dyn EventSource,
    user_id: &str,
    config: &Config,
    expansion: &mut ExpansionState,
    mut view: HistoryView,
    secs: u64,
) -> Result<HistoryView> {
    info!("Watching for changes every {}s (Ctrl-C to stop)", secs);

    let mut interval = tokio::time::interval(Duration::from_secs(secs));
    // The first tick completes immediately
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let next = load_history(source, user_id, config.history.show_latest).await;
                if !view_changed(&view, &next) {
                    debug!("No changes");
                    view = next;
                    continue;
                }

                info!("History changed, re-rendering");
                if config.history.expand_all {
                    expansion.expand_all(&next.days);
                }
                emit_report(&next, expansion, config)?;
                view = next;
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Stopped watching");
                return Ok(view);
            }
        }
    }
}

/// Render the view and write it to the configured output.
fn emit_report(view: &HistoryView, expansion: &ExpansionState, config: &Config) -> Result<()> {
    let output = match config.general.format {
        OutputFormat::Json => report::generate_json_report(view, expansion)?,
        OutputFormat::Markdown => {
            report::generate_markdown_report(view, expansion, config.history.preview_chars)
        }
    };

    if config.general.output.is_empty() {
        println!("{}", output);
    } else {
        std::fs::write(&config.general.output, &output)
            .with_context(|| format!("Failed to write report to {}", config.general.output))?;
        info!("Report saved to {}", config.general.output);
    }

    Ok(())
}

fn print_summary(view: &HistoryView, config: &Config, quiet: bool) {
    // Stdout already carries the report
    if quiet || config.general.output.is_empty() {
        return;
    }

    println!("\n📊 History Summary:");
    println!("   Days: {}", view.days.len());
    println!(
        "   Recommendations: {} | Meals logged: {}",
        view.recommendation_count, view.meal_count
    );
    if !view.skipped.is_empty() {
        println!("   ⚠️  Skipped events: {}", view.skipped.len());
    }
    for err in &view.source_errors {
        println!("   ⚠️  {}", err);
    }
    println!("\n✅ Report saved to: {}", config.general.output);
}

/// An event recorded by --log-meal or --log-recommendation.
#[derive(Debug)]
enum LoggedEvent {
    Meal(MealTakenEvent),
    Recommendation(RecommendationEvent),
}

/// Build the event to record, captured at `now`. The meal slot comes from
/// the hour of `now`.
fn build_logged_event(args: &Args, now: DateTime<FixedOffset>) -> Result<LoggedEvent> {
    let stamp = now.timestamp_millis();

    if let Some(ref text) = args.log_meal {
        let payload = entry_payload(text)?;
        Ok(LoggedEvent::Meal(MealTakenEvent::captured(
            format!("m-{}", stamp),
            payload,
            now,
        )))
    } else if let Some(ref text) = args.log_recommendation {
        let payload = entry_payload(text)?;
        Ok(LoggedEvent::Recommendation(RecommendationEvent::captured(
            format!("r-{}", stamp),
            payload,
            now,
        )))
    } else {
        bail!("Nothing to log")
    }
}

fn entry_payload(text: &str) -> Result<Payload> {
    let payload = Payload::from(text);
    if payload.is_absent() {
        bail!("Refusing to log an empty entry");
    }
    Ok(payload)
}

/// Handle --log-meal / --log-recommendation against the snapshot file.
async fn handle_log_event(args: &Args, config: &Config, user_id: &str) -> Result<i32> {
    if config.source.kind != SourceKind::Snapshot {
        bail!("Logging events is only supported with the snapshot source");
    }

    let source = SnapshotSource::new(
        PathBuf::from(&config.source.snapshot_path),
        config.source.utc_offset()?,
    );

    match build_logged_event(args, Local::now().fixed_offset())? {
        LoggedEvent::Meal(event) => {
            let meal_type = event.meal_type.clone().unwrap_or_default();
            source.record_meal(user_id, event).await?;
            println!("✅ Logged {} in {}", meal_type, source.path().display());
        }
        LoggedEvent::Recommendation(event) => {
            let meal_type = event.meal_type.clone().unwrap_or_default();
            source.record_recommendation(user_id, event).await?;
            println!(
                "✅ Logged {} recommendation in {}",
                meal_type,
                source.path().display()
            );
        }
    }

    Ok(0)
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is installed, so problems go to stderr directly.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Ok(Config::default()),
        Err(e) => {
            eprintln!("⚠️  Failed to load config: {:#}", e);
            Ok(Config::default())
        }
    }
}
