//! Plain-text rendering of cities and forecasts.

use chrono::{DateTime, Utc};
use ohmyweather_core::{
    City, ForecastEntry, GeoLookupResult, current_forecast_for, model::icon_url,
    time::convert_utc_to_local, time::LOCAL_TIME_FORMAT, upcoming_forecast,
};

pub fn city_row(city: &City) -> String {
    if !city.has_weather() {
        return format!("{:<20} {:>8}  {}", city.name, "--", "no data yet");
    }
    format!(
        "{:<20} {:>6.1}°C  {:<24} Local Time: {}",
        city.name, city.current_temperature_c, city.weather_description, city.local_time
    )
}

fn forecast_line(entry: &ForecastEntry, utc_offset_secs: i32) -> String {
    let local = convert_utc_to_local(&entry.utc_timestamp, utc_offset_secs)
        .unwrap_or_else(|| "N/A".to_string());
    format!(
        "  Time: {local}  Temperature: {:.1}°C  Weather: {}",
        entry.temperature_c(),
        entry.description
    )
}

/// Detail view: local time, the entry closest to now, then what comes next.
pub fn city_detail(city: &City, now_utc: DateTime<Utc>) -> String {
    let now_local = city.local_now(now_utc);
    let mut out = Vec::new();

    out.push(format!("City: {}", city.name));
    out.push(format!("Current Local Time: {}", now_local.format(LOCAL_TIME_FORMAT)));
    if city.has_weather() && !city.icon_id.is_empty() {
        out.push(format!("Conditions: {} ({})", city.weather_description, icon_url(&city.icon_id)));
    }
    out.push(String::new());

    out.push("NOW".to_string());
    match current_forecast_for(city, now_local) {
        Some(current) => {
            out.push(format!("  Temperature: {:.1}°C", current.temperature_c()));
            out.push(format!("  Weather: {}", current.description));
        }
        None => out.push("  No current forecast available.".to_string()),
    }
    out.push(String::new());

    out.push("Forecast".to_string());
    let upcoming = upcoming_forecast(city, now_local);
    if upcoming.is_empty() {
        out.push("  No upcoming forecast.".to_string());
    }
    for entry in upcoming {
        out.push(forecast_line(entry, city.utc_offset_secs));
    }

    out.join("\n")
}

pub fn suggestion_row(result: &GeoLookupResult) -> String {
    format!("{:<40} ({:.4}, {:.4})", result.label(), result.lat, result.lon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ohmyweather_core::Coordinates;

    fn zocca() -> City {
        let mut city = City::placeholder("Zocca", Coordinates { lat: 44.34, lon: 10.99 });
        city.utc_offset_secs = 7200;
        city.icon_id = "10d".into();
        city.weather_description = "light rain".into();
        city.fetched_at = Some(Utc.with_ymd_and_hms(2022, 8, 30, 13, 0, 0).unwrap());
        city.forecast = ["2022-08-30 12:00:00", "2022-08-30 15:00:00", "2022-08-30 18:00:00"]
            .iter()
            .map(|ts| ForecastEntry {
                utc_timestamp: ts.to_string(),
                temperature_kelvin: 296.34,
                description: "light rain".into(),
                icon_id: "10d".into(),
            })
            .collect();
        city
    }

    #[test]
    fn placeholder_row_says_no_data() {
        let city = City::placeholder("Oslo", Coordinates { lat: 59.9, lon: 10.7 });
        assert!(city_row(&city).contains("no data yet"));
        assert!(!city_detail(&city, Utc::now()).contains("Conditions:"));
    }

    #[test]
    fn detail_shows_now_and_upcoming_in_local_time() {
        // 13:10 UTC is 15:10 in Zocca; the 12:00 UTC entry (14:00 local) is closest.
        let now = Utc.with_ymd_and_hms(2022, 8, 30, 13, 10, 0).unwrap();
        let detail = city_detail(&zocca(), now);

        assert!(detail.contains("Current Local Time: 15:10:00"));
        assert!(detail.contains("Conditions: light rain (http://openweathermap.org/img/wn/10d.png)"));
        assert!(detail.contains("Temperature: 23.2°C"));
        assert!(detail.contains("Time: 17:00:00"));
        assert!(detail.contains("Time: 20:00:00"));
        assert!(!detail.contains("Time: 14:00:00"));
    }
}
