use std::{num::NonZeroUsize, path::PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use cityweather_core::{
    Config, DEFAULT_FILENAME, TransportErrorPolicy, provider_from_config, read_csv, run,
};
use inquire::{Password, PasswordDisplayMode, Text};

use crate::output::{render_failures, render_table};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "cityweather", version, about = "Export current city weather to CSV")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the API key, city list and output directory.
    Configure,

    /// Fetch current weather for every city and write the CSV file.
    Fetch(FetchArgs),

    /// Print a previously exported CSV file as a table.
    Show {
        /// CSV file to read; defaults to the configured output directory.
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// City to query; repeat for several. Replaces the configured list.
    #[arg(long = "city", value_name = "NAME")]
    cities: Vec<String>,

    /// OpenWeatherMap API key.
    #[arg(long, env = "OPENWEATHER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Weather endpoint URL.
    #[arg(long)]
    base_url: Option<String>,

    /// Directory the CSV file is written to.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Maximum number of requests in flight.
    #[arg(long)]
    concurrency: Option<NonZeroUsize>,

    /// Extra attempts for server errors and connection failures.
    #[arg(long)]
    retries: Option<u32>,

    /// Per-request timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Drop cities that fail with a connection or parse error instead of aborting.
    #[arg(long)]
    skip_transport_errors: bool,
}

impl FetchArgs {
    fn apply(self, config: &mut Config) {
        if !self.cities.is_empty() {
            config.cities = self.cities;
        }
        if let Some(api_key) = self.api_key {
            config.api_key = Some(api_key);
        }
        if let Some(base_url) = self.base_url {
            config.base_url = base_url;
        }
        if let Some(output_dir) = self.output_dir {
            config.output_dir = output_dir;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(retries) = self.retries {
            config.retries = retries;
        }
        if self.timeout_secs.is_some() {
            config.timeout_secs = self.timeout_secs;
        }
        if self.skip_transport_errors {
            config.on_transport_error = TransportErrorPolicy::Skip;
        }
    }
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Fetch(args) => {
                let mut config = Config::load()?;
                args.apply(&mut config);

                let provider = provider_from_config(&config)?;
                let summary = run(&provider, &config).await?;

                print!("{}", render_failures(&summary.failures));
                print!("{}", render_table(&summary.observations));
                println!("CSV file saved to: {}", summary.path.display());
                Ok(())
            }
            Command::Show { path } => {
                let path = match path {
                    Some(path) => path,
                    None => Config::load()?.output_dir.join(DEFAULT_FILENAME),
                };

                let rows = read_csv(&path)?;
                print!("{}", render_table(&rows));
                Ok(())
            }
        }
    }
}

fn configure() -> anyhow::Result<()> {
    let mut config = Config::load()?;

    let api_key = Password::new("OpenWeatherMap API key:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;

    let current_cities = config.cities.join("; ");
    let cities = Text::new("Cities (separated by ';'):")
        .with_default(&current_cities)
        .prompt()
        .context("Failed to read city list")?;

    let current_dir = config.output_dir.display().to_string();
    let output_dir = Text::new("Output directory:")
        .with_default(&current_dir)
        .prompt()
        .context("Failed to read output directory")?;

    config.api_key = Some(api_key.trim().to_owned());
    config.cities = parse_city_list(&cities);
    config.output_dir = PathBuf::from(output_dir.trim());

    let path = config.save()?;
    println!("Configuration saved to: {}", path.display());
    Ok(())
}

fn parse_city_list(input: &str) -> Vec<String> {
    input
        .split(';')
        .map(str::trim)
        .filter(|city| !city.is_empty())
        .map(str::to_owned)
        .collect()
}
