use std::{fmt::Debug, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};

use crate::{Config, FetchError, WeatherObservation};

pub mod openweather;

pub use openweather::{DEFAULT_BASE_URL, OpenWeatherProvider};

#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    /// Current conditions for `city`, requested exactly as given.
    async fn current_weather(&self, city: &str) -> Result<WeatherObservation, FetchError>;
}

/// Build the HTTP client shared by every request of a run.
///
/// `None` leaves requests without a timeout, so a hung server stalls the
/// request until the transport gives up.
pub fn build_client(timeout: Option<Duration>) -> reqwest::Result<Client> {
    let mut builder =
        ClientBuilder::new().user_agent(format!("cityweather/{}", env!("CARGO_PKG_VERSION")));

    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }

    builder.build()
}

/// Construct the OpenWeatherMap provider described by `config`.
pub fn provider_from_config(config: &Config) -> anyhow::Result<OpenWeatherProvider> {
    let api_key = config.require_api_key()?;
    let http =
        build_client(config.fetch_options().timeout).context("Failed to build HTTP client")?;

    Ok(OpenWeatherProvider::new(api_key.to_owned(), config.base_url.clone(), http))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_client_without_timeout() {
        assert!(build_client(None).is_ok());
    }

    #[test]
    fn build_client_with_timeout() {
        assert!(build_client(Some(Duration::from_secs(5))).is_ok());
    }

    #[test]
    fn provider_from_config_errors_when_missing_api_key() {
        let cfg = Config::default();
        let err = provider_from_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("No API key configured"));
    }

    #[test]
    fn provider_from_config_uses_configured_base_url() {
        let cfg = Config {
            api_key: Some("KEY".into()),
            base_url: "http://localhost:9/weather".into(),
            ..Default::default()
        };

        let provider = provider_from_config(&cfg).expect("configured provider");
        assert_eq!(provider.base_url(), "http://localhost:9/weather");
    }
}
