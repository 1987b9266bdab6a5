use serde::{Deserialize, Serialize};

/// One city's weather snapshot at fetch time.
///
/// `city` is the name exactly as it was requested, not the name the API
/// resolved it to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub city: String,
    pub temperature_celsius: f64,
    pub humidity_percent: f64,
    pub description: String,
}

/// Ordered observations produced by a single run.
pub type Dataset = Vec<WeatherObservation>;
