use cityweather_core::{FetchError, WeatherObservation, exporter::HEADERS};

/// Render observations as a left-aligned text table.
pub fn render_table(rows: &[WeatherObservation]) -> String {
    let cells: Vec<[String; 4]> = rows
        .iter()
        .map(|r| {
            [
                r.city.clone(),
                r.temperature_celsius.to_string(),
                r.humidity_percent.to_string(),
                r.description.clone(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_line(&mut out, &HEADERS, &widths);
    for row in &cells {
        push_line(&mut out, row, &widths);
    }
    out
}

/// One line per skipped city, naming the city and why it was skipped.
pub fn render_failures(failures: &[FetchError]) -> String {
    failures
        .iter()
        .map(|err| match err {
            FetchError::Status { city, status, .. } => {
                format!("Failed to fetch data for {city}: {}\n", status.as_u16())
            }
            other => format!("Skipped {}: {other}\n", other.city().unwrap_or_default()),
        })
        .collect()
}

fn push_line<S: AsRef<str>>(out: &mut String, cells: &[S], widths: &[usize; 4]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| {
            let cell = cell.as_ref();
            let pad = width - cell.chars().count();
            format!("{cell}{}", " ".repeat(pad))
        })
        .collect::<Vec<_>>()
        .join("  ");

    out.push_str(line.trim_end());
    out.push('\n');
}
