use std::{sync::Arc, time::Duration};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode, Select};
use ohmyweather_core::{
    CityCache, CityEvent, CityList, Config, FileStore, RefreshStatus, WeatherRefreshService,
    config::REFRESH_INTERVALS_MINUTES, provider_from_config,
};
use tokio_util::sync::CancellationToken;

use crate::output;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "ohmyweather", version, about = "Track the weather in your cities")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Set the OpenWeather API key and refresh interval.
    Configure,

    /// Start tracking a city. The name must match the geocoder's exactly.
    Add {
        name: String,
    },

    /// Stop tracking a city.
    Remove {
        name: String,
    },

    /// List tracked cities, refreshing any that are due.
    List {
        /// Only show cities whose name contains this text.
        #[arg(long)]
        filter: Option<String>,
    },

    /// Show current conditions and the upcoming forecast for a city.
    Show {
        name: String,
    },

    /// Suggest places to add. Without a query, lists popular cities.
    Search {
        query: Option<String>,

        #[arg(long, default_value_t = 5)]
        limit: u8,
    },

    /// Refresh every tracked city that is due.
    Refresh {
        /// Ignore the refresh interval and fetch everything.
        #[arg(long)]
        force: bool,
    },

    /// Keep refreshing on the configured interval until Ctrl-C.
    Watch,
}

struct App {
    config: Config,
    service: Arc<WeatherRefreshService>,
}

impl App {
    fn open() -> anyhow::Result<Self> {
        let config = Config::load()?;
        let provider = provider_from_config(&config)?;

        let store_path = config.store_file_path()?;
        let store = FileStore::open(&store_path)
            .with_context(|| format!("Failed to open city cache: {}", store_path.display()))?;

        let service = Arc::new(WeatherRefreshService::new(
            provider,
            Arc::new(CityList::new()),
            CityCache::new(Box::new(store)),
        ));
        service.restore().context("Failed to restore cached cities")?;

        Ok(Self { config, service })
    }

    fn min_interval(&self) -> Duration {
        self.config.refresh_interval()
    }
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure()?,
            Command::Add { name } => {
                let ctx = App::open()?;
                let city = ctx.service.add_city(&name).await?;
                println!("Added {}", output::city_row(&city));
            }
            Command::Remove { name } => {
                let ctx = App::open()?;
                if ctx.service.remove_city(&name)? {
                    println!("Removed {name}");
                } else {
                    println!("{name} is not tracked");
                }
            }
            Command::List { filter } => {
                let ctx = App::open()?;
                refresh(&ctx.service, ctx.min_interval()).await;

                let cities = ctx.service.cities().filter(filter.as_deref().unwrap_or(""));
                if cities.is_empty() {
                    println!("No cities. Add one with `ohmyweather add <name>`.");
                }
                for city in cities {
                    println!("{}", output::city_row(&city));
                }
            }
            Command::Show { name } => {
                let ctx = App::open()?;
                let status = ctx.service.refresh_city(&name, ctx.min_interval(), Utc::now()).await;
                if let Err(err) = status {
                    eprintln!("warning: {}", err.user_message());
                }

                let city = ctx
                    .service
                    .cities()
                    .get(&name)
                    .ok_or_else(|| anyhow::anyhow!("{name} is not tracked. Add it with `ohmyweather add {name}`."))?;
                println!("{}", output::city_detail(&city, Utc::now()));
            }
            Command::Search { query, limit } => {
                let ctx = App::open()?;
                let query = query.unwrap_or_default();
                ctx.service.prefetch_suggestions().await;
                if let Err(err) = ctx.service.search(&query, limit).await {
                    eprintln!("warning: {}", err.user_message());
                }

                let suggestions = ctx.service.suggestions(&query);
                if suggestions.is_empty() {
                    println!("No places match {query:?}");
                }
                for suggestion in &suggestions {
                    println!("{}", output::suggestion_row(suggestion));
                }
            }
            Command::Refresh { force } => {
                let ctx = App::open()?;
                let min_interval = if force { Duration::ZERO } else { ctx.min_interval() };
                refresh(&ctx.service, min_interval).await;
                for city in ctx.service.cities().snapshot() {
                    println!("{}", output::city_row(&city));
                }
            }
            Command::Watch => watch().await?,
        }

        Ok(())
    }
}

/// Refresh everything that is due, reporting failures without aborting.
async fn refresh(service: &Arc<WeatherRefreshService>, min_interval: Duration) {
    for outcome in service.refresh_all(min_interval).await {
        match outcome.result {
            Ok(RefreshStatus::Refreshed(_)) | Ok(RefreshStatus::Skipped) => {}
            Ok(other) => tracing::debug!(city = %outcome.name, status = ?other, "not refreshed"),
            Err(err) => eprintln!("warning: {}: {}", outcome.name, err.user_message()),
        }
    }
}

async fn watch() -> anyhow::Result<()> {
    let ctx = App::open()?;
    let mut events = ctx.service.cities().subscribe();
    let cancel = CancellationToken::new();

    let interval = ctx.min_interval();
    let worker = tokio::spawn(Arc::clone(&ctx.service).run_periodic(interval, interval, cancel.clone()));

    println!(
        "Refreshing every {} minutes. Press Ctrl-C to stop.",
        ctx.config.refresh_interval_minutes
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(CityEvent::Updated(city)) | Ok(CityEvent::Added(city)) => {
                    println!("{}", output::city_row(&city));
                }
                Ok(CityEvent::Removed(name)) => println!("Removed {name}"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "display fell behind city updates");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    cancel.cancel();
    worker.await.context("Refresh worker failed")?;
    Ok(())
}

fn configure() -> anyhow::Result<()> {
    let path = Config::config_file_path()?;
    let mut config = Config::load()?;

    let api_key = Password::new("OpenWeather API key:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .with_help_message("Leave empty to keep the current key")
        .prompt()?;
    if !api_key.trim().is_empty() {
        config.set_api_key(api_key.trim().to_string());
    }

    let current = REFRESH_INTERVALS_MINUTES
        .iter()
        .position(|m| *m == config.refresh_interval_minutes)
        .unwrap_or(0);
    let minutes = Select::new("Refresh interval (minutes):", REFRESH_INTERVALS_MINUTES.to_vec())
        .with_starting_cursor(current)
        .prompt()?;
    config.set_refresh_interval_minutes(minutes)?;

    config.save()?;
    println!("Saved configuration to {}", path.display());
    Ok(())
}
