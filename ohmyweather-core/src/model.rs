use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Offset between the Kelvin and Celsius scales.
pub const KELVIN_OFFSET: f64 = 273.15;

/// Convert an API temperature (Kelvin) to Celsius.
///
/// Every Kelvin value the API hands us goes through here; nothing else in the
/// crate subtracts the offset on its own.
pub fn kelvin_to_celsius(kelvin: f64) -> f64 {
    kelvin - KELVIN_OFFSET
}

/// Canonical form of a city name used for identity comparisons.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// URL of the OpenWeather icon image for an icon id such as `"10d"`.
pub fn icon_url(icon_id: &str) -> String {
    format!("http://openweathermap.org/img/wn/{icon_id}.png")
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// One geocoding candidate. Only lives long enough to resolve coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLookupResult {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

impl GeoLookupResult {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates { lat: self.lat, lon: self.lon }
    }

    /// "Paris, Île-de-France, FR" style label for suggestion lists.
    pub fn label(&self) -> String {
        let mut parts = vec![self.name.as_str()];
        if let Some(state) = self.state.as_deref().filter(|s| !s.is_empty()) {
            parts.push(state);
        }
        if let Some(country) = self.country.as_deref().filter(|c| !c.is_empty()) {
            parts.push(country);
        }
        parts.join(", ")
    }
}

/// One time-stamped forecast record, as delivered by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastEntry {
    /// UTC wall-clock time, `YYYY-MM-DD HH:MM:SS`.
    pub utc_timestamp: String,
    pub temperature_kelvin: f64,
    pub description: String,
    pub icon_id: String,
}

impl ForecastEntry {
    pub fn temperature_c(&self) -> f64 {
        kelvin_to_celsius(self.temperature_kelvin)
    }
}

/// Current conditions for a location, already converted to Celsius.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentConditions {
    pub temperature_c: f64,
    pub description: String,
    pub icon_id: String,
    pub utc_offset_secs: i32,
}

/// Forecast list for a location plus the location's UTC offset.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastReport {
    pub utc_offset_secs: i32,
    pub entries: Vec<ForecastEntry>,
}

/// A tracked city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub name: String,
    pub coordinates: Coordinates,
    pub current_temperature_c: f64,
    pub weather_description: String,
    pub icon_id: String,
    /// Local wall-clock time (`HH:MM`) at the moment of the last fetch.
    pub local_time: String,
    /// Signed seconds to add to UTC to get the city's wall-clock time.
    pub utc_offset_secs: i32,
    pub forecast: Vec<ForecastEntry>,
    /// Last successful fetch. `None` until the city has weather to show.
    pub fetched_at: Option<DateTime<Utc>>,
}

impl City {
    /// A city known only by name and coordinates, e.g. restored from cache.
    pub fn placeholder(name: impl Into<String>, coordinates: Coordinates) -> Self {
        Self {
            name: name.into(),
            coordinates,
            current_temperature_c: 0.0,
            weather_description: "N/A".to_string(),
            icon_id: String::new(),
            local_time: "N/A".to_string(),
            utc_offset_secs: 0,
            forecast: Vec::new(),
            fetched_at: None,
        }
    }

    /// Build a fully populated city from freshly fetched data.
    pub fn from_fetch(
        name: impl Into<String>,
        coordinates: Coordinates,
        current: CurrentConditions,
        forecast: ForecastReport,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let local_time = crate::time::format_local_now(fetched_at, current.utc_offset_secs);
        Self {
            name: name.into(),
            coordinates,
            current_temperature_c: current.temperature_c,
            weather_description: current.description,
            icon_id: current.icon_id,
            local_time,
            utc_offset_secs: current.utc_offset_secs,
            forecast: forecast.entries,
            fetched_at: Some(fetched_at),
        }
    }

    pub fn key(&self) -> String {
        normalize_name(&self.name)
    }

    pub fn has_weather(&self) -> bool {
        self.fetched_at.is_some()
    }

    /// Wall-clock time in this city at the UTC instant `now_utc`.
    pub fn local_now(&self, now_utc: DateTime<Utc>) -> NaiveDateTime {
        crate::time::local_now(now_utc, self.utc_offset_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kelvin_converts_to_celsius() {
        assert!((kelvin_to_celsius(296.34) - 23.19).abs() < 0.01);
        assert!(kelvin_to_celsius(273.15).abs() < f64::EPSILON);
    }

    #[test]
    fn forecast_entry_temperature_uses_shared_conversion() {
        let entry = ForecastEntry {
            utc_timestamp: "2022-08-30 16:00:00".into(),
            temperature_kelvin: 296.34,
            description: "light rain".into(),
            icon_id: "10d".into(),
        };
        assert!((entry.temperature_c() - 23.19).abs() < 0.01);
    }

    #[test]
    fn names_normalize_case_and_whitespace() {
        assert_eq!(normalize_name("  PaRiS "), "paris");
        assert_eq!(normalize_name("New York"), normalize_name("new york"));
    }

    #[test]
    fn geo_label_skips_missing_parts() {
        let geo = GeoLookupResult {
            name: "Paris".into(),
            lat: 48.85,
            lon: 2.35,
            country: Some("FR".into()),
            state: None,
        };
        assert_eq!(geo.label(), "Paris, FR");
    }

    #[test]
    fn placeholder_has_no_weather() {
        let city = City::placeholder("Oslo", Coordinates { lat: 59.9, lon: 10.7 });
        assert!(!city.has_weather());
        assert!(city.forecast.is_empty());
        assert_eq!(city.key(), "oslo");
    }

    #[test]
    fn icon_url_points_at_openweather() {
        assert_eq!(icon_url("10d"), "http://openweathermap.org/img/wn/10d.png");
    }
}
