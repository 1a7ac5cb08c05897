use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};

use crate::{
    error::FetchError,
    model::{Coordinates, CurrentConditions, ForecastEntry, ForecastReport, GeoLookupResult, kelvin_to_celsius},
    provider::decode_envelope,
};

use super::WeatherProvider;

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

const GEOCODE_PATH: &str = "/geo/1.0/direct";
const CURRENT_PATH: &str = "/data/2.5/weather";
const FORECAST_PATH: &str = "/data/2.5/forecast";

/// OpenWeather client. All temperatures come back in Kelvin (no `units`
/// parameter is sent).
#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherProvider {
    /// Point the client at another host (a proxy or a mock server) and bound
    /// every request by `timeout`.
    pub fn with_options(
        api_key: String,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn get_body(
        &self,
        endpoint: &'static str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<(StatusCode, String), FetchError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(endpoint, %url, "requesting OpenWeather");

        let res = self
            .http
            .get(&url)
            .query(query)
            .query(&[("appid", self.api_key.as_str())])
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            tracing::debug!(endpoint, %status, "OpenWeather returned an error status");
        }

        Ok((status, body))
    }
}

/// Decode a response body. Error statuses usually still carry the
/// `{cod, message}` envelope; when they don't, the status is what gets
/// reported.
fn decode_response<T: DeserializeOwned>(
    endpoint: &'static str,
    status: StatusCode,
    body: &str,
) -> Result<T, FetchError> {
    match decode_envelope(endpoint, body) {
        Err(FetchError::Decode { body, .. }) if !status.is_success() => {
            Err(FetchError::Status { endpoint, status: status.as_u16(), body })
        }
        other => other,
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
    icon: String,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    main: OwMain,
    weather: Vec<OwWeather>,
    timezone: i32,
}

#[derive(Debug, Deserialize)]
struct OwForecastEntry {
    dt_txt: String,
    main: OwMain,
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwForecastCity {
    timezone: i32,
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    list: Vec<OwForecastEntry>,
    city: OwForecastCity,
}

fn describe(weather: &[OwWeather]) -> (String, String) {
    weather
        .first()
        .map(|w| (w.description.clone(), w.icon.clone()))
        .unwrap_or_else(|| ("N/A".to_string(), String::new()))
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn geocode(&self, query: &str, limit: u8) -> Result<Vec<GeoLookupResult>, FetchError> {
        let (status, body) = self
            .get_body(
                "geocoding",
                GEOCODE_PATH,
                &[("q", query.to_string()), ("limit", limit.to_string())],
            )
            .await?;

        decode_response("geocoding", status, &body)
    }

    async fn current(&self, coordinates: Coordinates) -> Result<CurrentConditions, FetchError> {
        let (status, body) = self
            .get_body(
                "current weather",
                CURRENT_PATH,
                &[("lat", coordinates.lat.to_string()), ("lon", coordinates.lon.to_string())],
            )
            .await?;

        let parsed: OwCurrentResponse = decode_response("current weather", status, &body)?;
        let (description, icon_id) = describe(&parsed.weather);

        Ok(CurrentConditions {
            temperature_c: kelvin_to_celsius(parsed.main.temp),
            description,
            icon_id,
            utc_offset_secs: parsed.timezone,
        })
    }

    async fn forecast(&self, coordinates: Coordinates) -> Result<ForecastReport, FetchError> {
        let (status, body) = self
            .get_body(
                "forecast",
                FORECAST_PATH,
                &[("lat", coordinates.lat.to_string()), ("lon", coordinates.lon.to_string())],
            )
            .await?;

        let parsed: OwForecastResponse = decode_response("forecast", status, &body)?;

        let entries = parsed
            .list
            .into_iter()
            .map(|entry| {
                let (description, icon_id) = describe(&entry.weather);
                ForecastEntry {
                    utc_timestamp: entry.dt_txt,
                    temperature_kelvin: entry.main.temp,
                    description,
                    icon_id,
                }
            })
            .collect();

        Ok(ForecastReport { utc_offset_secs: parsed.city.timezone, entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_response_decodes_from_full_payload() {
        let body = r#"{
            "coord": {"lon": 10.99, "lat": 44.34},
            "weather": [{"id": 501, "main": "Rain", "description": "moderate rain", "icon": "10d"}],
            "main": {"temp": 298.48, "feels_like": 298.74, "temp_min": 297.56, "temp_max": 300.05, "pressure": 1015, "humidity": 64},
            "visibility": 10000,
            "wind": {"speed": 0.62, "deg": 349, "gust": 1.18},
            "clouds": {"all": 100},
            "dt": 1661870592,
            "sys": {"country": "IT", "sunrise": 1661834187, "sunset": 1661882248},
            "timezone": 7200,
            "id": 3163858,
            "name": "Zocca",
            "cod": 200
        }"#;

        let parsed: OwCurrentResponse = decode_envelope("current weather", body).unwrap();
        assert_eq!(parsed.timezone, 7200);
        assert_eq!(describe(&parsed.weather).1, "10d");
    }

    #[test]
    fn undecodable_error_status_keeps_the_status() {
        let err = decode_response::<OwCurrentResponse>(
            "current weather",
            StatusCode::BAD_GATEWAY,
            "<html>Bad Gateway</html>",
        )
        .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 502, .. }), "{err:?}");

        let err = decode_response::<OwCurrentResponse>("current weather", StatusCode::OK, "<html>")
            .unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }), "{err:?}");
    }

    #[test]
    fn missing_weather_description_falls_back() {
        assert_eq!(describe(&[]), ("N/A".to_string(), String::new()));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let provider = OpenWeatherProvider::with_options(
            "KEY".into(),
            "http://localhost:1234/",
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(provider.base_url, "http://localhost:1234");
    }
}
