//! Place suggestions for the add flow.
//!
//! A handful of popular cities is geocoded up front. Every search result is
//! appended, and the whole list is filtered locally as the user types.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use parking_lot::RwLock;
use tokio::task::JoinSet;

use crate::{
    model::{GeoLookupResult, normalize_name},
    provider::WeatherProvider,
};

pub const POPULAR_CITIES: &[&str] = &["New York", "London", "Paris", "Tokyo", "Los Angeles"];

const PREFETCH_GEOCODE_LIMIT: u8 = 1;

#[derive(Debug, Default)]
pub struct SuggestionList {
    entries: RwLock<Vec<GeoLookupResult>>,
    prefetched: AtomicBool,
}

impl SuggestionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Geocode [`POPULAR_CITIES`] once and put them at the front of the list.
    ///
    /// A city that fails to resolve is left out. Returns how many places were
    /// added by this call.
    pub async fn prefetch(&self, provider: &Arc<dyn WeatherProvider>) -> usize {
        if self.prefetched.swap(true, Ordering::SeqCst) {
            return 0;
        }

        let mut tasks = JoinSet::new();
        for (idx, name) in POPULAR_CITIES.iter().copied().enumerate() {
            let provider = Arc::clone(provider);
            tasks.spawn(async move { (idx, name, provider.geocode(name, PREFETCH_GEOCODE_LIMIT).await) });
        }

        let mut resolved = Vec::with_capacity(POPULAR_CITIES.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, _, Ok(results))) => resolved.push((idx, results)),
                Ok((_, name, Err(err))) => {
                    tracing::warn!(city = name, error = %err, "failed to prefetch suggestion");
                }
                Err(err) => tracing::error!(error = %err, "prefetch task failed to complete"),
            }
        }
        resolved.sort_by_key(|(idx, _)| *idx);

        let fetched: Vec<GeoLookupResult> = resolved.into_iter().flat_map(|(_, r)| r).collect();
        let count = fetched.len();

        let mut entries = self.entries.write();
        let searched = std::mem::replace(&mut *entries, fetched);
        entries.extend(searched);

        tracing::debug!(count, "prefetched popular cities");
        count
    }

    /// Remember places returned by a search.
    pub fn extend(&self, results: impl IntoIterator<Item = GeoLookupResult>) {
        self.entries.write().extend(results);
    }

    /// Known places whose name contains `query`, case-insensitively, without
    /// repeated names. An empty query matches everything.
    pub fn filter(&self, query: &str) -> Vec<GeoLookupResult> {
        let needle = normalize_name(query);
        let mut seen = std::collections::HashSet::new();

        self.entries
            .read()
            .iter()
            .filter(|place| needle.is_empty() || place.name.to_lowercase().contains(&needle))
            .filter(|place| seen.insert(normalize_name(&place.name)))
            .cloned()
            .collect()
    }
}
