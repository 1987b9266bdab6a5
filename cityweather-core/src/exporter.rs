use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use serde::Deserialize;
use tempfile::NamedTempFile;
use tracing::info;

use crate::{ExportError, WeatherObservation};

pub const DEFAULT_FILENAME: &str = "weather_data.csv";

/// Column names, in file order.
pub const HEADERS: [&str; 4] = ["City", "Temperature (°C)", "Humidity (%)", "Weather"];

/// Write `rows` to `<output_dir>/<filename>`, replacing any existing file.
///
/// The data goes to a temporary file in `output_dir` first and is renamed
/// over the target once complete, so readers never see a truncated CSV. The
/// header row is written even when `rows` is empty.
pub fn export_csv(
    rows: &[WeatherObservation],
    output_dir: impl AsRef<Path>,
    filename: &str,
) -> Result<PathBuf, ExportError> {
    let output_dir = output_dir.as_ref();
    fs::create_dir_all(output_dir)
        .map_err(|e| ExportError::CreateDir(output_dir.to_path_buf(), e))?;

    let path = output_dir.join(filename);

    let tmp = temp_file_for(output_dir, &path)
        .map_err(|e| ExportError::TempFile(output_dir.to_path_buf(), e))?;

    let mut writer = csv::Writer::from_writer(tmp);
    write_rows(&mut writer, rows).map_err(|e| ExportError::Csv(path.clone(), e))?;

    let mut tmp = writer
        .into_inner()
        .map_err(|e| ExportError::Flush(path.clone(), e.into_error()))?;
    tmp.flush().map_err(|e| ExportError::Flush(path.clone(), e))?;
    tmp.as_file().sync_all().map_err(|e| ExportError::Flush(path.clone(), e))?;

    tmp.persist(&path).map_err(|e| ExportError::Persist(path.clone(), e.error))?;

    info!(path = %path.display(), rows = rows.len(), "CSV file saved");
    Ok(path)
}

/// Temporary file in `dir` carrying the permissions `target` will end up with:
/// those of the existing target, or the umask-derived default for a new file.
fn temp_file_for(dir: &Path, target: &Path) -> io::Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(".weather_data").suffix(".tmp");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }

    let tmp = builder.tempfile_in(dir)?;

    if let Ok(existing) = fs::metadata(target) {
        fs::set_permissions(tmp.path(), existing.permissions())?;
    }

    Ok(tmp)
}

fn write_rows<W: Write>(
    writer: &mut csv::Writer<W>,
    rows: &[WeatherObservation],
) -> Result<(), csv::Error> {
    writer.write_record(HEADERS)?;

    for row in rows {
        let temperature = row.temperature_celsius.to_string();
        let humidity = row.humidity_percent.to_string();

        writer.write_record([&row.city, &temperature, &humidity, &row.description])?;
    }

    writer.flush()?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "City")]
    city: String,
    #[serde(rename = "Temperature (°C)")]
    temperature_celsius: f64,
    #[serde(rename = "Humidity (%)")]
    humidity_percent: f64,
    #[serde(rename = "Weather")]
    description: String,
}

impl From<CsvRow> for WeatherObservation {
    fn from(row: CsvRow) -> Self {
        WeatherObservation {
            city: row.city,
            temperature_celsius: row.temperature_celsius,
            humidity_percent: row.humidity_percent,
            description: row.description,
        }
    }
}

/// Read back a file produced by [`export_csv`].
pub fn read_csv(path: impl AsRef<Path>) -> Result<Vec<WeatherObservation>, ExportError> {
    let path = path.as_ref();
    let mut reader =
        csv::Reader::from_path(path).map_err(|e| ExportError::Read(path.to_path_buf(), e))?;

    reader
        .deserialize::<CsvRow>()
        .map(|row| row.map(WeatherObservation::from))
        .collect::<Result<_, _>>()
        .map_err(|e| ExportError::Read(path.to_path_buf(), e))
}
