//! The in-memory list of tracked cities, with change notifications.
//!
//! One `CityList` is created by the application root and shared by
//! reference (`Arc`). Front ends call [`CityList::subscribe`] to learn about
//! changes instead of polling.

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::model::{City, normalize_name};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum CityEvent {
    Added(City),
    Updated(City),
    Removed(String),
}

#[derive(Debug)]
pub struct CityList {
    cities: RwLock<Vec<City>>,
    events: broadcast::Sender<CityEvent>,
}

impl Default for CityList {
    fn default() -> Self {
        Self::new()
    }
}

impl CityList {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { cities: RwLock::new(Vec::new()), events }
    }

    /// Receive every change made after this call. A slow receiver that falls
    /// more than the channel capacity behind gets `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<CityEvent> {
        self.events.subscribe()
    }

    fn notify(&self, event: CityEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Insert a city, or replace the one with the same normalized name while
    /// keeping its position.
    pub fn upsert(&self, city: City) {
        let key = city.key();
        let event = {
            let mut cities = self.cities.write();
            match cities.iter_mut().find(|c| c.key() == key) {
                Some(existing) => {
                    *existing = city.clone();
                    CityEvent::Updated(city)
                }
                None => {
                    cities.push(city.clone());
                    CityEvent::Added(city)
                }
            }
        };
        self.notify(event);
    }

    /// Replace an existing city wholesale. A city removed in the meantime is
    /// not brought back; returns whether the replacement happened.
    pub fn replace(&self, city: City) -> bool {
        let key = city.key();
        let replaced = {
            let mut cities = self.cities.write();
            match cities.iter_mut().find(|c| c.key() == key) {
                Some(existing) => {
                    *existing = city.clone();
                    true
                }
                None => false,
            }
        };
        if replaced {
            self.notify(CityEvent::Updated(city));
        }
        replaced
    }

    pub fn remove(&self, name: &str) -> Option<City> {
        let key = normalize_name(name);
        let removed = {
            let mut cities = self.cities.write();
            let idx = cities.iter().position(|c| c.key() == key)?;
            cities.remove(idx)
        };
        self.notify(CityEvent::Removed(removed.name.clone()));
        Some(removed)
    }

    pub fn get(&self, name: &str) -> Option<City> {
        let key = normalize_name(name);
        self.cities.read().iter().find(|c| c.key() == key).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn snapshot(&self) -> Vec<City> {
        self.cities.read().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.cities.read().iter().map(|c| c.name.clone()).collect()
    }

    /// Cities whose name contains `query`, ignoring case. An empty query
    /// matches everything.
    pub fn filter(&self, query: &str) -> Vec<City> {
        let needle = query.trim().to_lowercase();
        self.cities
            .read()
            .iter()
            .filter(|c| needle.is_empty() || c.name.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.cities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.read().is_empty()
    }
}
