//! Per-city fetch loop.
//!
//! Status-code failures skip the city with a warning. Hard failures
//! (transport, undecodable body, missing fields) abort the run unless the
//! caller opts into [`TransportErrorPolicy::Skip`].

use std::{num::NonZeroUsize, pin::pin, time::Duration};

use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    Dataset, FetchError, WeatherObservation,
    provider::{OpenWeatherProvider, WeatherProvider, build_client},
};

/// What to do with a city whose failure is not a plain HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorPolicy {
    /// Stop the run and surface the error.
    #[default]
    Abort,
    /// Log the error and drop the city, like a status failure.
    Skip,
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Maximum number of requests in flight. `1` is strictly sequential.
    pub concurrency: NonZeroUsize,
    /// Extra attempts for retryable failures.
    pub retries: u32,
    /// Delay before the first retry, doubled for every following one.
    pub retry_backoff: Duration,
    pub on_transport_error: TransportErrorPolicy,
    /// Whole-request timeout; `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            concurrency: NonZeroUsize::MIN,
            retries: 0,
            retry_backoff: Duration::from_millis(500),
            on_transport_error: TransportErrorPolicy::Abort,
            timeout: None,
        }
    }
}

/// Result of fetching one city, tagged with its position in the city list.
#[derive(Debug)]
pub struct CityOutcome {
    pub index: usize,
    pub city: String,
    pub result: Result<WeatherObservation, FetchError>,
}

/// Fetch every city against the OpenWeatherMap-compatible endpoint at `base_url`.
pub async fn fetch_observations_from_api(
    cities: &[String],
    api_key: &str,
    base_url: &str,
    options: &FetchOptions,
) -> Result<Dataset, FetchError> {
    let http = build_client(options.timeout).map_err(FetchError::Client)?;
    let provider = OpenWeatherProvider::new(api_key.to_owned(), base_url.to_owned(), http);

    fetch_observations(&provider, cities, options).await
}

/// Fetch every city and collect the successful observations in city-list order.
///
/// Returns the first hard failure when the policy is
/// [`TransportErrorPolicy::Abort`]; requests still in flight are dropped.
pub async fn fetch_observations<P>(
    provider: &P,
    cities: &[String],
    options: &FetchOptions,
) -> Result<Dataset, FetchError>
where
    P: WeatherProvider + ?Sized,
{
    fetch_dataset(provider, cities, options).await.map(|fetched| fetched.observations)
}

/// Observations of a run together with the failures skipped to produce them.
#[derive(Debug, Default)]
pub struct FetchedDataset {
    pub observations: Dataset,
    /// Skipped failures, in city-list order.
    pub skipped: Vec<FetchError>,
}

/// Like [`fetch_observations`], but also hands back every skipped failure so
/// callers can report them.
pub async fn fetch_dataset<P>(
    provider: &P,
    cities: &[String],
    options: &FetchOptions,
) -> Result<FetchedDataset, FetchError>
where
    P: WeatherProvider + ?Sized,
{
    let mut fetched = Vec::with_capacity(cities.len());
    let mut skipped = Vec::new();
    let mut outcomes = pin!(outcome_stream(provider, cities, options));

    while let Some(outcome) = outcomes.next().await {
        match outcome.result {
            Ok(observation) => fetched.push((outcome.index, observation)),
            Err(err) if err.is_soft() => {
                report_skipped(&err);
                skipped.push((outcome.index, err));
            }
            Err(err) => match options.on_transport_error {
                TransportErrorPolicy::Abort => return Err(err),
                TransportErrorPolicy::Skip => {
                    report_skipped(&err);
                    skipped.push((outcome.index, err));
                }
            },
        }
    }

    fetched.sort_by_key(|(index, _)| *index);
    skipped.sort_by_key(|(index, _)| *index);

    info!(
        requested = cities.len(),
        fetched = fetched.len(),
        skipped = skipped.len(),
        "Weather fetch finished"
    );

    Ok(FetchedDataset {
        observations: fetched.into_iter().map(|(_, observation)| observation).collect(),
        skipped: skipped.into_iter().map(|(_, err)| err).collect(),
    })
}

/// Fetch every city and return each outcome, successful or not, in city-list order.
///
/// Nothing is skipped or aborted here; the policy in `options` is ignored.
pub async fn fetch_report<P>(
    provider: &P,
    cities: &[String],
    options: &FetchOptions,
) -> Vec<CityOutcome>
where
    P: WeatherProvider + ?Sized,
{
    let mut outcomes: Vec<CityOutcome> =
        outcome_stream(provider, cities, options).collect().await;
    outcomes.sort_by_key(|outcome| outcome.index);
    outcomes
}

fn outcome_stream<'a, P>(
    provider: &'a P,
    cities: &'a [String],
    options: &'a FetchOptions,
) -> impl Stream<Item = CityOutcome> + 'a
where
    P: WeatherProvider + ?Sized,
{
    stream::iter(cities.iter().enumerate())
        .map(move |(index, city)| async move {
            let result = fetch_with_retry(provider, city, options).await;
            CityOutcome { index, city: city.clone(), result }
        })
        .buffer_unordered(options.concurrency.get())
}

async fn fetch_with_retry<P>(
    provider: &P,
    city: &str,
    options: &FetchOptions,
) -> Result<WeatherObservation, FetchError>
where
    P: WeatherProvider + ?Sized,
{
    let mut attempt = 0;
    loop {
        match provider.current_weather(city).await {
            Err(err) if err.is_retryable() && attempt < options.retries => {
                let delay = backoff_delay(options.retry_backoff, attempt);
                warn!(
                    city,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying weather request"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.min(16))
}

fn report_skipped(err: &FetchError) {
    let city = err.city().unwrap_or_default();
    match err {
        FetchError::Status { status, .. } => {
            warn!(city, status = status.as_u16(), "Failed to fetch data for {city}: {status}");
        }
        other => {
            warn!(city, error = %other, "Skipping {city} after unrecoverable error");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use async_trait::async_trait;
    use reqwest::StatusCode;
    use tracing_test::traced_test;

    use super::*;

    #[derive(Debug, Clone, Copy)]
    enum Reply {
        Ok(f64),
        Status(u16),
        BadBody,
    }

    /// Replies per city in order; the last reply repeats once the script runs out.
    #[derive(Debug, Default)]
    struct ScriptedProvider {
        script: Mutex<HashMap<String, Vec<Reply>>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn with(mut self, city: &str, replies: &[Reply]) -> Self {
            self.script.get_mut().unwrap().insert(city.to_owned(), replies.to_vec());
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WeatherProvider for ScriptedProvider {
        async fn current_weather(&self, city: &str) -> Result<WeatherObservation, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            let reply = {
                let mut script = self.script.lock().unwrap();
                let replies = script.get_mut(city).expect("city not scripted");
                if replies.len() > 1 { replies.remove(0) } else { replies[0] }
            };

            match reply {
                Reply::Ok(temp) => Ok(WeatherObservation {
                    city: city.to_owned(),
                    temperature_celsius: temp,
                    humidity_percent: 50.0,
                    description: "clear sky".to_owned(),
                }),
                Reply::Status(code) => Err(FetchError::Status {
                    city: city.to_owned(),
                    status: StatusCode::from_u16(code).unwrap(),
                    body: String::new(),
                }),
                Reply::BadBody => Err(FetchError::Decode {
                    city: city.to_owned(),
                    source: serde_json::from_str::<u8>("not json").unwrap_err(),
                }),
            }
        }
    }

    fn cities(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn fast_retries(retries: u32) -> FetchOptions {
        FetchOptions { retries, retry_backoff: Duration::from_millis(1), ..Default::default() }
    }

    #[tokio::test]
    async fn all_successful_cities_kept_in_order() {
        let provider = ScriptedProvider::default()
            .with("A", &[Reply::Ok(1.0)])
            .with("B", &[Reply::Ok(2.0)])
            .with("C", &[Reply::Ok(3.0)]);

        let rows = fetch_observations(&provider, &cities(&["C", "A", "B"]), &FetchOptions::default())
            .await
            .unwrap();

        let names: Vec<_> = rows.iter().map(|r| r.city.as_str()).collect();
        assert_eq!(names, ["C", "A", "B"]);
    }

    #[tokio::test]
    async fn status_failures_are_skipped() {
        let provider = ScriptedProvider::default()
            .with("A", &[Reply::Ok(1.0)])
            .with("B", &[Reply::Status(404)])
            .with("C", &[Reply::Ok(3.0)])
            .with("D", &[Reply::Status(401)]);

        let rows =
            fetch_observations(&provider, &cities(&["A", "B", "C", "D"]), &FetchOptions::default())
                .await
                .unwrap();

        let names: Vec<_> = rows.iter().map(|r| r.city.as_str()).collect();
        assert_eq!(names, ["A", "C"]);
    }

    #[tokio::test]
    async fn empty_city_list_yields_empty_dataset() {
        let provider = ScriptedProvider::default();
        let rows = fetch_observations(&provider, &[], &FetchOptions::default()).await.unwrap();

        assert!(rows.is_empty());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn duplicate_cities_produce_duplicate_rows() {
        let provider = ScriptedProvider::default().with("Paris", &[Reply::Ok(12.0)]);
        let rows =
            fetch_observations(&provider, &cities(&["Paris", "Paris"]), &FetchOptions::default())
                .await
                .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], rows[1]);
    }

    #[tokio::test]
    async fn hard_failure_aborts_by_default() {
        let provider = ScriptedProvider::default()
            .with("A", &[Reply::BadBody])
            .with("B", &[Reply::Ok(2.0)]);

        let err = fetch_observations(&provider, &cities(&["A", "B"]), &FetchOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Decode { .. }));
        assert_eq!(err.city(), Some("A"));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn hard_failure_skipped_when_configured() {
        let provider = ScriptedProvider::default()
            .with("A", &[Reply::BadBody])
            .with("B", &[Reply::Ok(2.0)]);
        let options = FetchOptions {
            on_transport_error: TransportErrorPolicy::Skip,
            ..Default::default()
        };

        let rows = fetch_observations(&provider, &cities(&["A", "B"]), &options).await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].city, "B");
    }

    #[tokio::test]
    #[traced_test]
    async fn diagnostics_use_sentence_case() {
        let provider = ScriptedProvider::default()
            .with("A", &[Reply::Status(503), Reply::Ok(1.0)])
            .with("B", &[Reply::Status(404)]);

        fetch_observations(&provider, &cities(&["A", "B"]), &fast_retries(1)).await.unwrap();

        assert!(logs_contain("Retrying weather request"));
        assert!(logs_contain("Failed to fetch data for B: 404 Not Found"));
        assert!(logs_contain("Weather fetch finished"));
    }

    #[tokio::test]
    async fn retries_server_errors_until_success() {
        let provider = ScriptedProvider::default()
            .with("A", &[Reply::Status(503), Reply::Status(500), Reply::Ok(4.0)]);

        let rows = fetch_observations(&provider, &cities(&["A"]), &fast_retries(2)).await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let provider = ScriptedProvider::default().with("A", &[Reply::Status(404)]);

        let rows = fetch_observations(&provider, &cities(&["A"]), &fast_retries(3)).await.unwrap();

        assert!(rows.is_empty());
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn concurrent_fetch_keeps_city_order() {
        let names: Vec<String> = (0..20).map(|i| format!("city-{i}")).collect();
        let provider = names.iter().enumerate().fold(ScriptedProvider::default(), |p, (i, c)| {
            p.with(c, &[Reply::Ok(i as f64)])
        });
        let options =
            FetchOptions { concurrency: NonZeroUsize::new(8).unwrap(), ..Default::default() };

        let rows = fetch_observations(&provider, &names, &options).await.unwrap();

        let fetched: Vec<_> = rows.iter().map(|r| r.city.clone()).collect();
        assert_eq!(fetched, names);
    }

    #[tokio::test]
    async fn skipped_failures_are_returned_in_city_order() {
        let names: Vec<String> = (0..10).map(|i| format!("city-{i}")).collect();
        let provider = names.iter().enumerate().fold(ScriptedProvider::default(), |p, (i, c)| {
            let reply = if i % 3 == 0 { Reply::Status(404) } else { Reply::Ok(i as f64) };
            p.with(c, &[reply])
        });
        let options =
            FetchOptions { concurrency: NonZeroUsize::new(4).unwrap(), ..Default::default() };

        let fetched = fetch_dataset(&provider, &names, &options).await.unwrap();

        let skipped: Vec<_> = fetched.skipped.iter().filter_map(FetchError::city).collect();
        assert_eq!(skipped, ["city-0", "city-3", "city-6", "city-9"]);
        assert_eq!(fetched.observations.len(), 6);
    }

    #[tokio::test]
    async fn report_contains_every_city() {
        let provider = ScriptedProvider::default()
            .with("A", &[Reply::Ok(1.0)])
            .with("B", &[Reply::Status(404)])
            .with("C", &[Reply::BadBody]);

        let report = fetch_report(&provider, &cities(&["A", "B", "C"]), &FetchOptions::default()).await;

        assert_eq!(report.len(), 3);
        assert!(report[0].result.is_ok());
        assert!(report[1].result.as_ref().is_err_and(FetchError::is_soft));
        assert!(report[2].result.as_ref().is_err_and(|e| !e.is_soft()));
        assert_eq!(report.iter().map(|o| o.index).collect::<Vec<_>>(), [0, 1, 2]);
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(800));
    }
}
