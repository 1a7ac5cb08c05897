//! Flat key-value persistence for tracked cities.
//!
//! Values are JSON strings. New keys may be added over time; readers treat
//! a missing key as empty and ignore keys they don't know.

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    error::StoreError,
    model::{City, Coordinates, normalize_name},
};

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: String) -> Result<(), StoreError>;
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// In-process store, used in tests and when persistence is disabled.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object on disk, rewritten on every change.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = if path.exists() {
            let contents = fs::read_to_string(&path)
                .map_err(|source| StoreError::Io { path: path.clone(), source })?;
            if contents.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&contents)?
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self { path, entries: Mutex::new(entries) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io { path: self.path.clone(), source };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        // Write-then-rename so a crash never leaves a half-written file.
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(entries)?;
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), value);
        self.flush(&entries)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}

pub const CITY_NAMES_KEY: &str = "cityNames";
pub const CITY_COORDINATES_KEY: &str = "cityCoordinates";
pub const CITY_LAST_FETCHED_KEY: &str = "cityLastFetched";
/// Last fetched weather per city, so a restart can skip fresh cities.
pub const CITY_WEATHER_KEY: &str = "cityWeather";

type Snapshots = HashMap<String, serde_json::Value>;

/// A city as persisted: enough to rebuild the list and skip fresh fetches.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedCity {
    pub name: String,
    pub coordinates: Coordinates,
    pub last_fetched: Option<DateTime<Utc>>,
    /// Weather from the last successful fetch, if it was stored and is readable.
    pub weather: Option<City>,
}

/// Typed view of the city keys in a [`KeyValueStore`].
pub struct CityCache {
    store: Box<dyn KeyValueStore>,
    // Serializes read-modify-write cycles across the city keys.
    write_lock: Mutex<()>,
}

impl CityCache {
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self { store, write_lock: Mutex::new(()) }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::new()))
    }

    fn read<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, StoreError> {
        match self.store.get(key)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(T::default()),
        }
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        self.store.set(key, serde_json::to_string(value)?)
    }

    pub fn city_names(&self) -> Result<Vec<String>, StoreError> {
        self.read(CITY_NAMES_KEY)
    }

    /// All persisted cities in insertion order. Names without coordinates are
    /// skipped since they cannot be fetched.
    pub fn load(&self) -> Result<Vec<CachedCity>, StoreError> {
        let names = self.city_names()?;
        let coordinates: HashMap<String, Coordinates> = self.read(CITY_COORDINATES_KEY)?;
        let fetched: HashMap<String, DateTime<Utc>> = self.read(CITY_LAST_FETCHED_KEY)?;
        let mut snapshots: Snapshots = self.read(CITY_WEATHER_KEY)?;

        Ok(names
            .into_iter()
            .filter_map(|name| {
                let Some(coords) = coordinates.get(&name).copied() else {
                    tracing::warn!(city = %name, "cached city has no coordinates, skipping");
                    return None;
                };
                let last_fetched = fetched.get(&name).copied();
                let weather = snapshots.remove(&name).and_then(|raw| {
                    serde_json::from_value::<City>(raw)
                        .inspect_err(|err| {
                            tracing::warn!(city = %name, error = %err, "unreadable cached weather, ignoring");
                        })
                        .ok()
                });
                Some(CachedCity { name, coordinates: coords, last_fetched, weather })
            })
            .collect())
    }

    /// Insert or update a city. A name that differs only in case replaces the
    /// old entry. Weather is stored when the city has any.
    pub fn save_city(&self, city: &City) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let key = city.key();

        let mut names = self.city_names()?;
        let mut coords: HashMap<String, Coordinates> = self.read(CITY_COORDINATES_KEY)?;
        let mut fetched: HashMap<String, DateTime<Utc>> = self.read(CITY_LAST_FETCHED_KEY)?;
        let mut snapshots: Snapshots = self.read(CITY_WEATHER_KEY)?;

        match names.iter().position(|n| normalize_name(n) == key) {
            Some(idx) => {
                let old = std::mem::replace(&mut names[idx], city.name.clone());
                coords.remove(&old);
                fetched.remove(&old);
                snapshots.remove(&old);
            }
            None => names.push(city.name.clone()),
        }

        coords.insert(city.name.clone(), city.coordinates);
        if let Some(at) = city.fetched_at {
            fetched.insert(city.name.clone(), at);
            snapshots.insert(city.name.clone(), serde_json::to_value(city)?);
        }

        self.write(CITY_NAMES_KEY, &names)?;
        self.write(CITY_COORDINATES_KEY, &coords)?;
        self.write(CITY_LAST_FETCHED_KEY, &fetched)?;
        self.write(CITY_WEATHER_KEY, &snapshots)
    }

    /// Store the result of a refresh. Does nothing, and returns `false`, when
    /// the city is no longer listed.
    pub fn record_fetch(&self, city: &City) -> Result<bool, StoreError> {
        let Some(at) = city.fetched_at else {
            return Ok(false);
        };

        let _guard = self.write_lock.lock();
        if !self.city_names()?.iter().any(|n| n == &city.name) {
            return Ok(false);
        }

        let mut fetched: HashMap<String, DateTime<Utc>> = self.read(CITY_LAST_FETCHED_KEY)?;
        let mut snapshots: Snapshots = self.read(CITY_WEATHER_KEY)?;
        fetched.insert(city.name.clone(), at);
        snapshots.insert(city.name.clone(), serde_json::to_value(city)?);

        self.write(CITY_LAST_FETCHED_KEY, &fetched)?;
        self.write(CITY_WEATHER_KEY, &snapshots)?;
        Ok(true)
    }

    /// Remove a city by name (case-insensitive). Returns whether it was cached.
    pub fn remove_city(&self, name: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock();
        let key = normalize_name(name);

        let mut names = self.city_names()?;
        let Some(idx) = names.iter().position(|n| normalize_name(n) == key) else {
            return Ok(false);
        };
        let stored = names.remove(idx);

        let mut coords: HashMap<String, Coordinates> = self.read(CITY_COORDINATES_KEY)?;
        let mut fetched: HashMap<String, DateTime<Utc>> = self.read(CITY_LAST_FETCHED_KEY)?;
        let mut snapshots: Snapshots = self.read(CITY_WEATHER_KEY)?;
        coords.remove(&stored);
        fetched.remove(&stored);
        snapshots.remove(&stored);

        self.write(CITY_NAMES_KEY, &names)?;
        self.write(CITY_COORDINATES_KEY, &coords)?;
        self.write(CITY_LAST_FETCHED_KEY, &fetched)?;
        self.write(CITY_WEATHER_KEY, &snapshots)?;
        Ok(true)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        self.store.delete(CITY_NAMES_KEY)?;
        self.store.delete(CITY_COORDINATES_KEY)?;
        self.store.delete(CITY_LAST_FETCHED_KEY)?;
        self.store.delete(CITY_WEATHER_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn paris() -> Coordinates {
        Coordinates { lat: 48.8566, lon: 2.3522 }
    }

    fn fetched(name: &str, coordinates: Coordinates, at: DateTime<Utc>) -> City {
        let mut city = City::placeholder(name, coordinates);
        city.fetched_at = Some(at);
        city.current_temperature_c = 21.5;
        city.weather_description = "clear sky".into();
        city.utc_offset_secs = 3600;
        city
    }

    #[test]
    fn memory_store_get_set_delete() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v".into()).unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        store.delete("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("cities.json");

        let store = FileStore::open(&path).unwrap();
        store.set("cityNames", r#"["Paris"]"#.into()).unwrap();
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("cityNames").unwrap().as_deref(), Some(r#"["Paris"]"#));
    }

    #[test]
    fn file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cities.json");
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(FileStore::open(&path), Err(StoreError::Serde(_))));
    }

    #[test]
    fn empty_cache_loads_nothing() {
        let cache = CityCache::in_memory();
        assert!(cache.load().unwrap().is_empty());
    }

    #[test]
    fn save_and_load_round_trip() {
        let cache = CityCache::in_memory();
        let at = Utc.with_ymd_and_hms(2024, 12, 6, 9, 0, 0).unwrap();
        let paris_city = fetched("Paris", paris(), at);

        cache.save_city(&paris_city).unwrap();
        cache.save_city(&City::placeholder("Tokyo", Coordinates { lat: 35.68, lon: 139.69 })).unwrap();

        let loaded = cache.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].name, "Paris");
        assert_eq!(loaded[0].coordinates, paris());
        assert_eq!(loaded[0].last_fetched, Some(at));
        assert_eq!(loaded[0].weather.as_ref(), Some(&paris_city));
        assert_eq!(loaded[1].name, "Tokyo");
        assert_eq!(loaded[1].last_fetched, None);
        assert_eq!(loaded[1].weather, None);
    }

    #[test]
    fn saving_same_name_in_other_case_replaces_entry() {
        let cache = CityCache::in_memory();
        cache.save_city(&City::placeholder("paris", paris())).unwrap();
        cache.save_city(&City::placeholder("Paris", paris())).unwrap();

        assert_eq!(cache.city_names().unwrap(), vec!["Paris".to_string()]);
        assert_eq!(cache.load().unwrap().len(), 1);
    }

    #[test]
    fn record_fetch_updates_listed_city() {
        let cache = CityCache::in_memory();
        cache.save_city(&City::placeholder("Paris", paris())).unwrap();

        let at = Utc.with_ymd_and_hms(2024, 12, 6, 9, 30, 0).unwrap();
        assert!(cache.record_fetch(&fetched("Paris", paris(), at)).unwrap());

        let loaded = cache.load().unwrap();
        assert_eq!(loaded[0].last_fetched, Some(at));
        assert_eq!(loaded[0].weather.as_ref().unwrap().weather_description, "clear sky");
    }

    #[test]
    fn record_fetch_after_removal_leaves_no_trace() {
        let cache = CityCache::in_memory();
        cache.save_city(&City::placeholder("Paris", paris())).unwrap();
        cache.remove_city("Paris").unwrap();

        let at = Utc.with_ymd_and_hms(2024, 12, 6, 9, 30, 0).unwrap();
        assert!(!cache.record_fetch(&fetched("Paris", paris(), at)).unwrap());

        let last_fetched: HashMap<String, DateTime<Utc>> = cache.read(CITY_LAST_FETCHED_KEY).unwrap();
        let snapshots: Snapshots = cache.read(CITY_WEATHER_KEY).unwrap();
        assert!(last_fetched.is_empty());
        assert!(snapshots.is_empty());
    }

    #[test]
    fn remove_city_is_case_insensitive() {
        let cache = CityCache::in_memory();
        let at = Utc.with_ymd_and_hms(2024, 12, 6, 9, 0, 0).unwrap();
        cache.save_city(&fetched("Paris", paris(), at)).unwrap();

        assert!(cache.remove_city("PARIS").unwrap());
        assert!(!cache.remove_city("Paris").unwrap());
        assert!(cache.load().unwrap().is_empty());
        let snapshots: Snapshots = cache.read(CITY_WEATHER_KEY).unwrap();
        assert!(snapshots.is_empty());
    }

    #[test]
    fn names_without_coordinates_are_skipped() {
        let store = MemoryStore::new();
        store.set(CITY_NAMES_KEY, r#"["Paris","Ghost"]"#.into()).unwrap();
        store
            .set(CITY_COORDINATES_KEY, r#"{"Paris":{"lat":48.85,"lon":2.35}}"#.into())
            .unwrap();

        let cache = CityCache::new(Box::new(store));
        let loaded = cache.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "Paris");
    }

    #[test]
    fn unreadable_weather_snapshot_is_dropped() {
        let store = MemoryStore::new();
        store.set(CITY_NAMES_KEY, r#"["Oslo"]"#.into()).unwrap();
        store
            .set(CITY_COORDINATES_KEY, r#"{"Oslo":{"lat":59.9,"lon":10.7}}"#.into())
            .unwrap();
        store.set(CITY_WEATHER_KEY, r#"{"Oslo":{"name":"Oslo"}}"#.into()).unwrap();

        let cache = CityCache::new(Box::new(store));
        let loaded = cache.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].weather, None);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let store = MemoryStore::new();
        store.set("refreshInterval", "15".into()).unwrap();
        store.set(CITY_NAMES_KEY, r#"["Oslo"]"#.into()).unwrap();
        store
            .set(CITY_COORDINATES_KEY, r#"{"Oslo":{"lat":59.9,"lon":10.7}}"#.into())
            .unwrap();

        let cache = CityCache::new(Box::new(store));
        assert_eq!(cache.load().unwrap().len(), 1);
    }

    #[test]
    fn clear_removes_everything() {
        let cache = CityCache::in_memory();
        cache.save_city(&City::placeholder("Paris", paris())).unwrap();
        cache.clear().unwrap();
        assert!(cache.city_names().unwrap().is_empty());
    }
}
