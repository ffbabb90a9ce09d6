use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use daybook::api::ApiClient;
use daybook::clock::SystemClock;
use daybook::config::{default_config_path, ResolvedConfig};
use daybook::day::{logical_day_bounds, resolve_logical_day, today, LogicalDay};
use daybook::session::{HttpIdentitySource, IdentitySource, NullIdentitySource, SessionLoader};
use daybook::settings::{
    DayStartSettingCache, HttpSettingsRemote, JsonFileLocalStore, NullSettingsRemote,
    PropagationOutcome, SettingsRemote,
};

#[derive(Parser)]
#[command(name = "daybook")]
#[command(about = "Logical-day tools for the habit tracker")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print today's logical day
    Today,
    /// Print the logical day an RFC 3339 instant belongs to
    Resolve { instant: String },
    /// Print the UTC range covered by a logical day (YYYY-MM-DD)
    Bounds { day: String },
    /// Read or change the day start time
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Resolve the day start time and signed-in identity together
    Session,
    /// Show current configuration
    Config,
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Show the day start time and where it came from
    Get,
    /// Set the day start time (HH:MM)
    Set { value: String },
    /// Clear the local cache so the next read goes to the server
    Clear,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config_path = cli.config.unwrap_or_else(default_config_path);
    let ResolvedConfig {
        cache_file,
        base_url,
        token,
        refresh,
        day,
    } = ResolvedConfig::load_or_default(&config_path)?;

    let api = match &base_url {
        Some(base_url) => {
            let api = ApiClient::new(base_url.clone(), refresh.lookup_timeout)?;
            let api = match token {
                Some(token) => api.with_token(token),
                None => api,
            };
            Some(Arc::new(api))
        }
        None => None,
    };

    let remote: Arc<dyn SettingsRemote> = match &api {
        Some(api) => Arc::new(HttpSettingsRemote::new(api.clone())),
        None => Arc::new(NullSettingsRemote),
    };
    let identity: Arc<dyn IdentitySource> = match &api {
        Some(api) => Arc::new(HttpIdentitySource::new(api.clone())),
        None => Arc::new(NullIdentitySource),
    };

    let local = Arc::new(JsonFileLocalStore::with_path(&cache_file));
    let cache = Arc::new(
        DayStartSettingCache::new(local, remote)
            .with_staleness(refresh.setting_staleness)
            .with_default(day.default_start),
    );

    match cli.command {
        Command::Today => {
            let day_start = cache.get_day_start_time().await;
            println!("{}", today(&SystemClock, day_start));
        }
        Command::Resolve { instant } => {
            let instant: DateTime<Utc> = DateTime::parse_from_rfc3339(&instant)
                .with_context(|| format!("Invalid RFC 3339 instant: {instant}"))?
                .with_timezone(&Utc);
            let day_start = cache.get_day_start_time().await;
            println!("{}", resolve_logical_day(instant, day_start));
        }
        Command::Bounds { day } => {
            let day: LogicalDay = day.parse()?;
            let day_start = cache.get_day_start_time().await;
            let (start, end) = logical_day_bounds(day, day_start);
            println!("{} .. {}", start.to_rfc3339(), end.to_rfc3339());
        }
        Command::Settings { action } => match action {
            SettingsAction::Get => {
                let entry = cache.get_entry().await;
                println!("{} ({})", entry.value, entry.source.as_str());
            }
            SettingsAction::Set { value } => {
                let handle = cache.update_day_start_time_str(&value)?;
                let saved = cache.get_day_start_time().await;
                match handle.wait().await {
                    PropagationOutcome::Propagated | PropagationOutcome::Superseded => {
                        println!("Day start time set to {saved}");
                    }
                    PropagationOutcome::Failed(err) => {
                        println!("Day start time set to {saved} on this device");
                        eprintln!("Server update failed: {err}");
                    }
                }
            }
            SettingsAction::Clear => {
                cache.invalidate()?;
                println!("Local day start cache cleared");
            }
        },
        Command::Session => {
            let loader = SessionLoader::new(cache.clone(), identity)
                .with_identity_staleness(refresh.identity_staleness)
                .with_lookup_timeout(refresh.lookup_timeout);
            let snapshot = loader.load().await;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Command::Config => {
            println!("Config file: {}", config_path.display());
            println!("Cache file: {}", cache_file.display());
            println!("Remote: {}", base_url.as_deref().unwrap_or("(offline)"));
            println!("Default day start: {}", day.default_start);
        }
    }

    Ok(())
}
