use std::path::PathBuf;

use tracing::info;

use crate::{
    Config, Dataset, FetchError, RunError,
    exporter::{DEFAULT_FILENAME, export_csv},
    fetcher::fetch_dataset,
    provider::WeatherProvider,
};

/// What a completed run produced.
#[derive(Debug)]
pub struct RunSummary {
    pub requested: usize,
    pub observations: Dataset,
    /// Cities that were skipped, in city-list order.
    pub failures: Vec<FetchError>,
    pub path: PathBuf,
}

impl RunSummary {
    pub fn skipped(&self) -> usize {
        self.failures.len()
    }
}

/// Fetch every configured city through `provider`, then export the dataset.
///
/// Nothing is written when the fetch phase aborts.
pub async fn run<P>(provider: &P, config: &Config) -> Result<RunSummary, RunError>
where
    P: WeatherProvider + ?Sized,
{
    info!(cities = config.cities.len(), "Starting weather run");

    let fetched = fetch_dataset(provider, &config.cities, &config.fetch_options()).await?;
    let path = export_csv(&fetched.observations, &config.output_dir, DEFAULT_FILENAME)?;

    Ok(RunSummary {
        requested: config.cities.len(),
        observations: fetched.observations,
        failures: fetched.skipped,
        path,
    })
}
