use serde::Deserialize;
use thiserror::Error;

/// The subset of a weatherapi.com `current.json` response the processor relies on. Unknown
/// fields are ignored; any missing field fails the parse.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WeatherReport {
    pub location: ReportLocation,
    pub current: ReportCurrent,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReportLocation {
    pub name: String,
    pub country: String,
    pub localtime: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReportCurrent {
    pub temp_c: f64,
    pub condition: ReportCondition,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReportCondition {
    pub text: String,
}

#[derive(Debug, Error)]
pub enum ObservationParseError {
    #[error("failed to parse weather report from message body: {0}")]
    Json(#[from] serde_json::Error),
}
