mod city;
mod report;

pub use city::{CityList, CityListError};
pub use report::{ObservationParseError, WeatherReport};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One weather reading for a city, as persisted by the processor.
///
/// Observations are append-only: nothing updates or removes them once stored, and repeated
/// readings for the same city and local time are kept side by side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub localtime: String,
    pub city: String,
    pub country: String,
    pub temp_c: f64,
    pub condition: String,
}

impl WeatherObservation {
    /// Parses a queued weather API response body into an observation.
    pub fn from_message_body(body: &str) -> Result<Self, ObservationParseError> {
        let report: WeatherReport = serde_json::from_str(body)?;
        Ok(report.into())
    }
}

impl From<WeatherReport> for WeatherObservation {
    fn from(report: WeatherReport) -> Self {
        Self {
            localtime: report.location.localtime,
            city: report.location.name,
            country: report.location.country,
            temp_c: report.current.temp_c,
            condition: report.current.condition.text,
        }
    }
}

/// Per-city statistics derived at query time from the stored observations of one country.
#[derive(Debug, Clone, PartialEq, ToSchema, Serialize, Deserialize, sqlx::FromRow)]
#[schema(example = json!({"city": "Beer Sheva", "average_temp_c": 22.5, "lastest_condition_text": "Clear"}))]
pub struct CityAggregate {
    pub city: String,
    pub average_temp_c: f64,

    /// Condition of the city's most recently inserted observation. The wire name keeps the
    /// spelling existing clients depend on.
    #[serde(rename = "lastest_condition_text")]
    #[sqlx(rename = "lastest_condition_text")]
    pub latest_condition_text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::{assert_err, assert_ok};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_observation_from_message_body() {
        let body = json!({
            "location": {
                "name": "Beer Sheva",
                "region": "HaDarom",
                "country": "Israel",
                "localtime": "2024-08-21 14:05"
            },
            "current": {
                "temp_c": 33.2,
                "humidity": 40,
                "condition": { "text": "Sunny", "code": 1000 }
            }
        })
        .to_string();

        let actual = assert_ok!(WeatherObservation::from_message_body(&body));
        assert_eq!(
            actual,
            WeatherObservation {
                localtime: "2024-08-21 14:05".to_string(),
                city: "Beer Sheva".to_string(),
                country: "Israel".to_string(),
                temp_c: 33.2,
                condition: "Sunny".to_string(),
            }
        );
    }

    #[test]
    fn test_observation_requires_condition_text() {
        let body = json!({
            "location": { "name": "Haifa", "country": "Israel", "localtime": "2024-08-21 14:05" },
            "current": { "temp_c": 28.0, "condition": {} }
        })
        .to_string();

        assert_err!(WeatherObservation::from_message_body(&body));
    }

    #[test]
    fn test_observation_rejects_non_json_body() {
        let error = assert_err!(WeatherObservation::from_message_body("{'location': None}"));
        assert!(matches!(error, ObservationParseError::Json(_)));
    }

    #[test]
    fn test_city_aggregate_wire_format() {
        let aggregate = CityAggregate {
            city: "Michigan".to_string(),
            average_temp_c: 18.0,
            latest_condition_text: "Rainy".to_string(),
        };

        assert_eq!(
            assert_ok!(serde_json::to_value(&aggregate)),
            json!({"city": "Michigan", "average_temp_c": 18.0, "lastest_condition_text": "Rainy"})
        );
    }
}
