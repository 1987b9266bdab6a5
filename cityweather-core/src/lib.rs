//! Core library for the `cityweather` CLI.
//!
//! This crate defines:
//! - Configuration handling
//! - The weather provider seam and its OpenWeatherMap implementation
//! - The per-city fetch loop and the CSV exporter
//!
//! It is used by `cityweather-cli`, but can also be reused by other binaries or services.

pub mod config;
pub mod error;
pub mod exporter;
pub mod fetcher;
pub mod model;
pub mod pipeline;
pub mod provider;

pub use config::Config;
pub use error::{ExportError, FetchError, RunError};
pub use exporter::{DEFAULT_FILENAME, export_csv, read_csv};
pub use fetcher::{
    CityOutcome, FetchOptions, FetchedDataset, TransportErrorPolicy, fetch_dataset,
    fetch_observations, fetch_observations_from_api, fetch_report,
};
pub use model::{Dataset, WeatherObservation};
pub use pipeline::{RunSummary, run};
pub use provider::{OpenWeatherProvider, WeatherProvider, provider_from_config};

pub use reqwest::StatusCode;
