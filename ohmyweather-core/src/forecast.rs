//! Aligning a city's forecast list with "now" in that city.

use chrono::NaiveDateTime;

use crate::model::{City, ForecastEntry};
use crate::time::utc_to_local;

/// Forecast entries paired with their local wall-clock time. Entries whose
/// timestamp does not parse are dropped.
fn localized(city: &City) -> impl Iterator<Item = (NaiveDateTime, &ForecastEntry)> {
    let offset = city.utc_offset_secs;
    city.forecast
        .iter()
        .filter_map(move |entry| utc_to_local(&entry.utc_timestamp, offset).map(|t| (t, entry)))
}

/// The forecast entry closest to `now_local`.
///
/// On an exact tie the first entry in list order wins. Forecast lists are
/// chronological, so this prefers the earlier timestamp.
pub fn current_forecast_for(city: &City, now_local: NaiveDateTime) -> Option<&ForecastEntry> {
    let mut best: Option<(i64, &ForecastEntry)> = None;

    for (local, entry) in localized(city) {
        let distance = (local - now_local).num_seconds().abs();
        match best {
            Some((smallest, _)) if distance >= smallest => {}
            _ => best = Some((distance, entry)),
        }
    }

    best.map(|(_, entry)| entry)
}

/// Entries strictly after `now_local`, in their original order.
pub fn upcoming_forecast(city: &City, now_local: NaiveDateTime) -> Vec<&ForecastEntry> {
    localized(city)
        .filter(|(local, _)| *local > now_local)
        .map(|(_, entry)| entry)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Coordinates;
    use chrono::NaiveDate;

    fn entry(ts: &str) -> ForecastEntry {
        ForecastEntry {
            utc_timestamp: ts.to_string(),
            temperature_kelvin: 290.0,
            description: "clear sky".into(),
            icon_id: "01d".into(),
        }
    }

    fn city_with(offset: i32, stamps: &[&str]) -> City {
        let mut city = City::placeholder("Zocca", Coordinates { lat: 44.34, lon: 10.99 });
        city.utc_offset_secs = offset;
        city.forecast = stamps.iter().map(|s| entry(s)).collect();
        city
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 8, 30)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn exact_tie_prefers_first_entry() {
        let city = city_with(0, &["2022-08-30 14:00:00", "2022-08-30 17:00:00"]);
        let current = current_forecast_for(&city, at(15, 30)).unwrap();
        assert_eq!(current.utc_timestamp, "2022-08-30 14:00:00");
    }

    #[test]
    fn closer_later_entry_wins() {
        let city = city_with(0, &["2022-08-30 14:00:00", "2022-08-30 16:00:00"]);
        let current = current_forecast_for(&city, at(15, 30)).unwrap();
        assert_eq!(current.utc_timestamp, "2022-08-30 16:00:00");
    }

    #[test]
    fn current_uses_city_offset() {
        // UTC 13:00 is 15:00 at +2h, the closest entry to a local 15:10.
        let city = city_with(7200, &["2022-08-30 10:00:00", "2022-08-30 13:00:00", "2022-08-30 16:00:00"]);
        let current = current_forecast_for(&city, at(15, 10)).unwrap();
        assert_eq!(current.utc_timestamp, "2022-08-30 13:00:00");
    }

    #[test]
    fn current_skips_unparsable_entries() {
        let city = city_with(0, &["garbage", "2022-08-30 21:00:00"]);
        let current = current_forecast_for(&city, at(12, 0)).unwrap();
        assert_eq!(current.utc_timestamp, "2022-08-30 21:00:00");
    }

    #[test]
    fn current_of_empty_forecast_is_none() {
        let city = city_with(0, &[]);
        assert!(current_forecast_for(&city, at(12, 0)).is_none());
    }

    #[test]
    fn upcoming_is_strictly_after_now_and_ordered() {
        let city = city_with(
            0,
            &[
                "2022-08-30 09:00:00",
                "2022-08-30 12:00:00",
                "2022-08-30 15:00:00",
                "2022-08-30 18:00:00",
            ],
        );
        let upcoming: Vec<_> = upcoming_forecast(&city, at(12, 0))
            .into_iter()
            .map(|e| e.utc_timestamp.as_str())
            .collect();
        assert_eq!(upcoming, vec!["2022-08-30 15:00:00", "2022-08-30 18:00:00"]);
    }

    #[test]
    fn upcoming_spans_midnight() {
        // 23:00 UTC at +3h is 02:00 the next day, which is after 22:00 today.
        let city = city_with(3 * 3600, &["2022-08-30 18:00:00", "2022-08-30 23:00:00"]);
        let upcoming = upcoming_forecast(&city, at(22, 0));
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].utc_timestamp, "2022-08-30 23:00:00");
    }
}
