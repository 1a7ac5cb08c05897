use crate::{
    Config,
    error::FetchError,
    model::{Coordinates, CurrentConditions, ForecastReport, GeoLookupResult},
    provider::openweather::OpenWeatherProvider,
};
use async_trait::async_trait;
use serde::{Deserialize, de::DeserializeOwned};
use std::{fmt::Debug, sync::Arc, time::Duration};

pub mod openweather;

/// The HTTP collaborator behind the refresh service.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    /// Resolve a free-text place name, best match first.
    async fn geocode(&self, query: &str, limit: u8) -> Result<Vec<GeoLookupResult>, FetchError>;

    async fn current(&self, coordinates: Coordinates) -> Result<CurrentConditions, FetchError>;

    async fn forecast(&self, coordinates: Coordinates) -> Result<ForecastReport, FetchError>;
}

/// Construct the OpenWeather provider from config.
pub fn provider_from_config(config: &Config) -> anyhow::Result<Arc<dyn WeatherProvider>> {
    build_provider(config, config.api_key())
}

fn build_provider(
    config: &Config,
    api_key: Option<String>,
) -> anyhow::Result<Arc<dyn WeatherProvider>> {
    let api_key = api_key.ok_or_else(|| {
        anyhow::anyhow!(
            "No OpenWeather API key configured.\n\
                 Hint: run `ohmyweather configure` or set OPENWEATHER_API_KEY."
        )
    })?;

    let provider = OpenWeatherProvider::with_options(
        api_key,
        config.api_base_url(),
        Duration::from_secs(config.request_timeout_secs),
    )?;

    Ok(Arc::new(provider))
}

/// `cod` comes back as a string from some endpoints and a number from others.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Cod {
    Text(String),
    Number(i64),
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    cod: Cod,
    message: String,
}

/// Decode `body` as `T`, falling back to the API's error envelope.
///
/// If neither shape matches, the error from the first attempt is reported.
pub(crate) fn decode_envelope<T: DeserializeOwned>(
    endpoint: &'static str,
    body: &str,
) -> Result<T, FetchError> {
    let source = match serde_json::from_str::<T>(body) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let cod = match envelope.cod {
                Cod::Text(s) => s,
                Cod::Number(n) => n.to_string(),
            };
            Err(FetchError::Api { cod, message: envelope.message })
        }
        Err(_) => Err(FetchError::Decode { endpoint, source, body: truncate_body(body) }),
    }
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}
