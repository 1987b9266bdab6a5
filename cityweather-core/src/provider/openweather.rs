use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::{FetchError, WeatherObservation};

use super::WeatherProvider;

pub const DEFAULT_BASE_URL: &str = "http://api.openweathermap.org/data/2.5/weather";

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(api_key: String, base_url: String, http: Client) -> Self {
        Self { api_key, base_url, http }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn fetch_current(&self, city: &str) -> Result<WeatherObservation, FetchError> {
        debug!(city, url = %self.base_url, "Requesting current weather");

        let res = self
            .http
            .get(&self.base_url)
            .query(&[("q", city), ("appid", self.api_key.as_str()), ("units", "metric")])
            .send()
            .await
            .map_err(|source| FetchError::Transport { city: city.to_owned(), source })?;

        let status = res.status();

        // Failure bodies are diagnostic only; an unreadable one is still a status failure.
        if status != StatusCode::OK {
            let body = res.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                city: city.to_owned(),
                status,
                body: truncate_body(&body),
            });
        }

        let body = res
            .text()
            .await
            .map_err(|source| FetchError::Transport { city: city.to_owned(), source })?;

        parse_current(city, &body)
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    main: OwMain,
    weather: Vec<OwWeather>,
}

fn parse_current(city: &str, body: &str) -> Result<WeatherObservation, FetchError> {
    let parsed: OwCurrentResponse = serde_json::from_str(body)
        .map_err(|source| FetchError::Decode { city: city.to_owned(), source })?;

    let description = parsed
        .weather
        .into_iter()
        .next()
        .map(|w| w.description)
        .ok_or_else(|| FetchError::MissingField {
            city: city.to_owned(),
            field: "weather[0].description",
        })?;

    Ok(WeatherObservation {
        city: city.to_owned(),
        temperature_celsius: parsed.main.temp,
        humidity_percent: parsed.main.humidity,
        description,
    })
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn current_weather(&self, city: &str) -> Result<WeatherObservation, FetchError> {
        self.fetch_current(city).await
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        return body.to_owned();
    }

    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
