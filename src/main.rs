//! grindcard CLI - trial and membership entitlements
//!
//! A command-line front end for the entitlement engine:
//! - One-shot evaluation of what a user may do at a given instant
//! - Live sessions with a throttled countdown
//! - Configuration file support

use std::io::{stdout, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use grindcard_entitlements::cli::{create_formatter, AppConfig, Cli, CliOutputFormat, Commands};
use grindcard_entitlements::{
    EngineConfig, EntitlementEngine, EntitlementSession, ManualClock, ProfileTableFetcher,
    StaticSubscriptionFetcher, SubscriptionError, SubscriptionFetcher, SubscriptionState,
    SystemClock, UserIdentity,
};

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path_override = cli.config.clone();

    // Quiet by default - only show errors unless explicitly verbose
    let filter = if cli.verbose { "debug" } else { "error" };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path.clone()).with_env_overrides(),
        None => AppConfig::load(),
    };

    match cli.command {
        Commands::Status {
            signup,
            now,
            user,
            paid,
            fetch_fails,
            format,
            trial_days,
        } => {
            let lookup = if fetch_fails {
                Err(SubscriptionError::Unavailable("simulated failure".into()))
            } else if paid {
                Ok(SubscriptionState::PAID)
            } else {
                Ok(SubscriptionState::UNPAID)
            };
            handle_status(
                UserIdentity::new(user, signup),
                now.unwrap_or_else(Utc::now),
                lookup,
                format,
                trial_days,
                &config,
            )?;
        }

        Commands::Watch {
            signup,
            user,
            paid,
            profiles,
            latency_ms,
            upgrade_after,
            format,
            realtime,
        } => {
            let fetcher: Arc<dyn SubscriptionFetcher> = match profiles {
                Some(path) => Arc::new(ProfileTableFetcher::load(&path)?),
                None => {
                    let fetcher = if paid {
                        StaticSubscriptionFetcher::paid()
                    } else {
                        StaticSubscriptionFetcher::unpaid()
                    };
                    Arc::new(fetcher.with_latency(Duration::from_millis(latency_ms)))
                }
            };
            handle_watch(
                UserIdentity::new(user, signup),
                fetcher,
                upgrade_after.map(Duration::from_secs),
                format,
                realtime,
                &config,
            )
            .await?;
        }

        Commands::Config {
            get,
            set,
            list,
            reset,
            path,
        } => {
            handle_config(get, set, list, reset, path, config_path_override)?;
        }
    }

    Ok(())
}

fn engine_config(config: &AppConfig, trial_days: Option<u64>) -> anyhow::Result<EngineConfig> {
    let mut section = config.engine.clone();
    if let Some(days) = trial_days {
        section.trial_days = days;
    }
    let engine = section.to_engine_config();
    engine.validate()?;
    Ok(engine)
}

fn resolve_format(
    format: Option<CliOutputFormat>,
    config: &AppConfig,
) -> grindcard_entitlements::cli::OutputFormat {
    match format {
        Some(format) => format.into(),
        None => config.output.default_format.parse().unwrap_or_default(),
    }
}

// =============================================================================
// Command Handlers
// =============================================================================

fn handle_status(
    identity: UserIdentity,
    now: DateTime<Utc>,
    lookup: Result<SubscriptionState, SubscriptionError>,
    format: Option<CliOutputFormat>,
    trial_days: Option<u64>,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let engine_config = engine_config(config, trial_days)?;
    let clock = ManualClock::new(now);
    let mut engine = EntitlementEngine::new(&engine_config, Arc::new(clock))?;

    if let Some(ticket) = engine.set_identity(Some(identity)) {
        engine.apply_subscription(&ticket, lookup);
    }

    let formatter = create_formatter(resolve_format(format, config), config.output.show_capabilities);
    let mut out = stdout();
    formatter.format_snapshot(&engine.snapshot(), &mut out)?;
    out.flush()?;
    Ok(())
}

async fn handle_watch(
    identity: UserIdentity,
    fetcher: Arc<dyn SubscriptionFetcher>,
    upgrade_after: Option<Duration>,
    format: Option<CliOutputFormat>,
    realtime: bool,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let mut engine_config = engine_config(config, None)?;
    if realtime {
        engine_config.publish_interval = engine_config.tick_interval;
    }

    let session = EntitlementSession::new(engine_config, Arc::new(SystemClock), fetcher)?;
    let formatter = create_formatter(resolve_format(format, config), config.output.show_capabilities);
    let mut out = stdout();

    let mut updates = session.watch();
    session.start();
    session.set_identity(Some(identity));

    let upgrade = async move {
        match upgrade_after {
            Some(delay) => tokio::time::sleep(delay).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(upgrade);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut upgraded = false;

    formatter.format_status("Watching entitlements, Ctrl-C to stop", &mut out)?;
    loop {
        let snapshot = updates.borrow_and_update().clone();
        formatter.format_snapshot(&snapshot, &mut out)?;
        out.flush()?;

        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = &mut upgrade, if !upgraded => {
                upgraded = true;
                tracing::info!("Simulating membership upgrade");
                session.upgrade();
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    session.dispose();
    let stats = session.stats();
    tracing::debug!(
        "Session stopped: {} ticks, {} publishes, {} throttled, {} clock gaps",
        stats.ticks,
        stats.publishes,
        stats.throttled,
        stats.clock_gaps
    );
    Ok(())
}

fn handle_config(
    get: Option<String>,
    set: Option<String>,
    list: bool,
    reset: bool,
    path: bool,
    config_path_override: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config_path = config_path_override.unwrap_or_else(AppConfig::default_path);

    if path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if reset {
        AppConfig::default().save_to(config_path.clone())?;
        println!("Configuration reset to defaults.");
        println!("Saved to: {}", config_path.display());
        return Ok(());
    }

    let mut config = AppConfig::load_from(config_path.clone());

    if let Some(key) = get {
        match config.get(&key) {
            Some(value) => println!("{}", value),
            None => anyhow::bail!("Unknown configuration key: {}", key),
        }
        return Ok(());
    }

    if let Some(kv) = set {
        let Some((key, value)) = kv.split_once('=') else {
            anyhow::bail!("Invalid format. Use: --set key=value");
        };
        config.set(key, value)?;
        config.engine.to_engine_config().validate()?;
        config.save_to(config_path.clone())?;
        println!("Set {} = {}", key, value);
        return Ok(());
    }

    if list {
        println!("Current configuration:");
        println!();
        for (key, value) in config.list() {
            println!("  {} = {}", key, value);
        }
        println!();
        println!("Config file: {}", config_path.display());
        return Ok(());
    }

    println!("Configuration commands:");
    println!("  grindcard config --list            Show all settings");
    println!("  grindcard config --get <key>       Get a setting");
    println!("  grindcard config --set <key>=<val> Set a setting");
    println!("  grindcard config --reset           Reset to defaults");
    println!("  grindcard config --path            Show config file path");
    Ok(())
}
