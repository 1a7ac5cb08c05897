//! Core library for OhMyWeather.
//!
//! This crate defines:
//! - The city/forecast domain model and Kelvin conversion
//! - An abstraction over the weather HTTP API, with an OpenWeather client
//! - Local-time alignment of forecast entries
//! - A key-value city cache and an observable in-memory city list
//! - Popular-city suggestions for picking a place to add
//! - The refresh service that adds, removes and periodically refreshes cities
//!
//! It is used by `ohmyweather-cli`, but can also be embedded in other front ends.

pub mod city_list;
pub mod config;
pub mod error;
pub mod forecast;
pub mod inflight;
pub mod model;
pub mod provider;
pub mod service;
pub mod store;
pub mod suggestions;
pub mod time;

pub use city_list::{CityEvent, CityList};
pub use config::Config;
pub use error::{AddCityError, FetchError, StoreError};
pub use forecast::{current_forecast_for, upcoming_forecast};
pub use model::{City, Coordinates, ForecastEntry, GeoLookupResult, kelvin_to_celsius};
pub use provider::{WeatherProvider, provider_from_config};
pub use service::{CityRefresh, RefreshStatus, WeatherRefreshService};
pub use store::{CityCache, FileStore, KeyValueStore, MemoryStore};
pub use suggestions::SuggestionList;
