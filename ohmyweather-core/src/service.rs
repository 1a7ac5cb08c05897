//! Adding, removing and periodically refreshing tracked cities.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::{
    task::JoinSet,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    city_list::CityList,
    error::{AddCityError, FetchError, StoreError},
    inflight::FetchTracker,
    model::{City, Coordinates, GeoLookupResult, normalize_name},
    provider::WeatherProvider,
    store::CityCache,
    suggestions::SuggestionList,
};

/// Geocoding candidates requested when adding a city.
pub const ADD_CITY_GEOCODE_LIMIT: u8 = 1;

/// Slack allowed when deciding whether a city is due, so that a cycle landing
/// a moment early still refreshes.
pub const DUE_TOLERANCE: Duration = Duration::from_secs(1);

/// What happened to one city during a refresh.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshStatus {
    /// New data fetched and stored.
    Refreshed(City),
    /// Fetched recently enough; nothing done.
    Skipped,
    /// Another fetch for this city is still running.
    InFlight,
    /// A newer result was already applied, so this one was dropped.
    Superseded,
    /// The city is not (or no longer) tracked.
    NotTracked,
}

#[derive(Debug)]
pub struct CityRefresh {
    pub name: String,
    pub result: Result<RefreshStatus, FetchError>,
}

pub struct WeatherRefreshService {
    provider: Arc<dyn WeatherProvider>,
    cities: Arc<CityList>,
    cache: CityCache,
    tracker: FetchTracker,
    suggestions: SuggestionList,
}

impl WeatherRefreshService {
    pub fn new(provider: Arc<dyn WeatherProvider>, cities: Arc<CityList>, cache: CityCache) -> Self {
        Self {
            provider,
            cities,
            cache,
            tracker: FetchTracker::new(),
            suggestions: SuggestionList::new(),
        }
    }

    pub fn cities(&self) -> &Arc<CityList> {
        &self.cities
    }

    pub fn tracker(&self) -> &FetchTracker {
        &self.tracker
    }

    /// Load cached cities into the list with their last fetched weather.
    ///
    /// A city whose weather was not stored comes back as a placeholder and is
    /// due on the next refresh.
    pub fn restore(&self) -> Result<usize, StoreError> {
        let cached = self.cache.load()?;
        let count = cached.len();

        for entry in cached {
            let city = match entry.weather {
                Some(weather) => City { name: entry.name, coordinates: entry.coordinates, ..weather },
                None => City::placeholder(entry.name, entry.coordinates),
            };
            if let Some(at) = city.fetched_at {
                self.tracker.mark_cooling(&city.name, at);
            }
            self.cities.upsert(city);
        }

        tracing::info!(count, "restored cached cities");
        Ok(count)
    }

    /// Geocode `name`, fetch its weather and start tracking it.
    ///
    /// The geocoder's best match must have the same name as the query (case
    /// and surrounding whitespace aside). A nearby but differently named place
    /// is reported as not found.
    pub async fn add_city(&self, name: &str) -> Result<City, AddCityError> {
        let query = name.trim();
        if query.is_empty() {
            return Err(AddCityError::NotFound(name.to_string()));
        }

        let candidates = self.provider.geocode(query, ADD_CITY_GEOCODE_LIMIT).await?;
        let Some(best) = candidates.into_iter().next() else {
            tracing::debug!(query, "geocoding returned no results");
            return Err(AddCityError::NotFound(query.to_string()));
        };

        if normalize_name(&best.name) != normalize_name(query) {
            tracing::debug!(query, matched = %best.name, "geocoding match has a different name");
            return Err(AddCityError::NotFound(query.to_string()));
        }

        let was_tracked = self.cities.contains(&best.name);
        let ticket = self.tracker.begin_forced(&best.name);
        let now = Utc::now();

        let city = match self.fetch_city(&best.name, best.coordinates(), now).await {
            Ok(city) => city,
            Err(err) => {
                self.tracker.fail(ticket);
                if !was_tracked {
                    self.tracker.forget(&best.name);
                }
                tracing::warn!(city = %best.name, error = %err, "failed to fetch weather for new city");
                return Err(err.into());
            }
        };

        if let Err(err) = self.cache.save_city(&city) {
            self.tracker.fail(ticket);
            if !was_tracked {
                self.tracker.forget(&city.name);
            }
            return Err(err.into());
        }

        let applied = self.tracker.complete(ticket, now, || self.cities.upsert(city.clone()));
        if applied.is_none() {
            // Removed or refreshed again while we were fetching.
            return match self.cities.get(&city.name) {
                Some(current) => Ok(current),
                None => {
                    self.cache.remove_city(&city.name)?;
                    Err(AddCityError::NotFound(query.to_string()))
                }
            };
        }

        tracing::info!(city = %city.name, "city added");
        Ok(city)
    }

    /// Stop tracking a city. Returns whether it was tracked or cached.
    pub fn remove_city(&self, name: &str) -> Result<bool, StoreError> {
        let in_list = self.cities.remove(name).is_some();
        self.tracker.forget(name);
        let in_cache = self.cache.remove_city(name)?;

        if in_list || in_cache {
            tracing::info!(city = name, "city removed");
        }
        Ok(in_list || in_cache)
    }

    /// Geocode a partial name, without duplicate names. Results are also
    /// remembered as suggestions.
    pub async fn search(&self, query: &str, limit: u8) -> Result<Vec<GeoLookupResult>, FetchError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let mut seen = std::collections::HashSet::new();
        let results: Vec<GeoLookupResult> = self
            .provider
            .geocode(query, limit)
            .await?
            .into_iter()
            .filter(|r| seen.insert(normalize_name(&r.name)))
            .collect();

        self.suggestions.extend(results.iter().cloned());
        Ok(results)
    }

    /// Geocode the popular cities once so [`suggestions`](Self::suggestions)
    /// has something to offer before any search.
    pub async fn prefetch_suggestions(&self) -> usize {
        self.suggestions.prefetch(&self.provider).await
    }

    /// Prefetched and previously searched places whose name contains `query`.
    /// An empty query lists them all.
    pub fn suggestions(&self, query: &str) -> Vec<GeoLookupResult> {
        self.suggestions.filter(query)
    }

    /// Refresh one city unless it was fetched less than `min_interval` ago,
    /// give or take [`DUE_TOLERANCE`].
    pub async fn refresh_city(
        &self,
        name: &str,
        min_interval: Duration,
        now: DateTime<Utc>,
    ) -> Result<RefreshStatus, FetchError> {
        let Some(city) = self.cities.get(name) else {
            return Ok(RefreshStatus::NotTracked);
        };

        if let Some(at) = city.fetched_at {
            let min = TimeDelta::from_std(min_interval).unwrap_or(TimeDelta::MAX);
            let tolerance = TimeDelta::from_std(DUE_TOLERANCE).unwrap_or(TimeDelta::zero());
            let elapsed = now.signed_duration_since(at);
            if elapsed + tolerance < min {
                tracing::debug!(city = %city.name, elapsed_ms = elapsed.num_milliseconds(), "fetched recently, skipping");
                return Ok(RefreshStatus::Skipped);
            }
        }

        let Some(ticket) = self.tracker.try_begin(&city.name) else {
            tracing::debug!(city = %city.name, "fetch already in flight, skipping");
            return Ok(RefreshStatus::InFlight);
        };

        let fresh = match self.fetch_city(&city.name, city.coordinates, now).await {
            Ok(fresh) => fresh,
            Err(err) => {
                self.tracker.fail(ticket);
                tracing::warn!(city = %city.name, error = %err, "refresh failed");
                return Err(err);
            }
        };

        match self.tracker.complete(ticket, now, || self.cities.replace(fresh.clone())) {
            Some(true) => {
                match self.cache.record_fetch(&fresh) {
                    Ok(true) => {}
                    Ok(false) => tracing::debug!(city = %fresh.name, "removed before its refresh was stored"),
                    Err(err) => tracing::warn!(city = %fresh.name, error = %err, "failed to persist refresh"),
                }
                tracing::info!(city = %fresh.name, "city refreshed");
                Ok(RefreshStatus::Refreshed(fresh))
            }
            Some(false) => Ok(RefreshStatus::NotTracked),
            None => Ok(RefreshStatus::Superseded),
        }
    }

    /// Refresh every tracked city concurrently. Results come back in list
    /// order, one per city; a failing city does not affect the others.
    pub async fn refresh_all(self: &Arc<Self>, min_interval: Duration) -> Vec<CityRefresh> {
        self.refresh_all_at(min_interval, Utc::now()).await
    }

    pub async fn refresh_all_at(
        self: &Arc<Self>,
        min_interval: Duration,
        now: DateTime<Utc>,
    ) -> Vec<CityRefresh> {
        let mut tasks = JoinSet::new();

        for (idx, name) in self.cities.names().into_iter().enumerate() {
            let this = Arc::clone(self);
            tasks.spawn(async move {
                let result = this.refresh_city(&name, min_interval, now).await;
                (idx, CityRefresh { name, result })
            });
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => results.push(outcome),
                Err(err) => tracing::error!(error = %err, "refresh task failed to complete"),
            }
        }

        results.sort_by_key(|(idx, _)| *idx);
        results.into_iter().map(|(_, refresh)| refresh).collect()
    }

    /// Call [`refresh_all_at`](Self::refresh_all_at) every `cadence` until
    /// `cancel` fires. The first cycle runs immediately.
    ///
    /// Cycle times are measured on the runtime clock from a single wall-clock
    /// anchor, so consecutive cycles are exactly `cadence` apart and a city is
    /// due again on every tick when `cadence >= min_interval`.
    pub async fn run_periodic(
        self: Arc<Self>,
        cadence: Duration,
        min_interval: Duration,
        cancel: CancellationToken,
    ) {
        let anchor_utc = Utc::now();
        let anchor = Instant::now();
        let mut ticker = tokio::time::interval_at(anchor, cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(cadence_secs = cadence.as_secs(), "periodic refresh started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                tick = ticker.tick() => {
                    let since_anchor = TimeDelta::from_std(tick.duration_since(anchor)).unwrap_or(TimeDelta::zero());
                    let results = self.refresh_all_at(min_interval, anchor_utc + since_anchor).await;
                    let failed = results.iter().filter(|r| r.result.is_err()).count();
                    tracing::debug!(cities = results.len(), failed, "refresh cycle finished");
                }
            }
        }
        tracing::info!("periodic refresh stopped");
    }

    async fn fetch_city(
        &self,
        name: &str,
        coordinates: Coordinates,
        now: DateTime<Utc>,
    ) -> Result<City, FetchError> {
        let (current, forecast) = tokio::try_join!(
            self.provider.current(coordinates),
            self.provider.forecast(coordinates),
        )?;

        if current.utc_offset_secs != forecast.utc_offset_secs {
            tracing::debug!(
                city = name,
                current = current.utc_offset_secs,
                forecast = forecast.utc_offset_secs,
                "endpoints disagree on UTC offset, using current weather's"
            );
        }

        Ok(City::from_fetch(name, coordinates, current, forecast, now))
    }
}
