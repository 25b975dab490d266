use std::path::Path;

use ahash::AHashMap;
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use polars::prelude::*;
use tracing::warn;

use crate::bar::{Bar, BarSeries};

const REQUIRED_COLUMNS: [&str; 7] = ["symbol", "date", "open", "high", "low", "close", "volume"];

/// Load a multi-symbol daily bar CSV into per-symbol series, sorted by
/// symbol. Each series is sorted ascending by date; duplicate dates within a
/// symbol are an input-contract violation and fail the load. Rows with a
/// missing field are skipped with a warning rather than failing the batch.
pub fn load_bar_series(path: &Path) -> Result<Vec<BarSeries>> {
    let lazy = LazyCsvReader::new(path)
        .has_header(true)
        .with_try_parse_dates(true)
        .finish()
        .with_context(|| format!("Failed to initialize CSV reader for {}", path.display()))?;
    let frame = lazy
        .collect()
        .with_context(|| format!("Failed to collect bar data from {}", path.display()))?;

    for column in REQUIRED_COLUMNS {
        if frame.column(column).is_err() {
            return Err(anyhow!(
                "Missing required bar column '{column}' in {}",
                path.display()
            ));
        }
    }

    let symbols = frame
        .column("symbol")?
        .str()
        .context("Column 'symbol' must be text")?
        .clone();
    let dates = date_values(frame.column("date")?)?;
    let open = numeric_values(frame.column("open")?)?;
    let high = numeric_values(frame.column("high")?)?;
    let low = numeric_values(frame.column("low")?)?;
    let close = numeric_values(frame.column("close")?)?;
    let volume = numeric_values(frame.column("volume")?)?;

    let mut grouped: AHashMap<String, Vec<Bar>> = AHashMap::new();
    let mut skipped = 0usize;
    for row in 0..frame.height() {
        let (Some(symbol), Some(date)) = (symbols.get(row), dates[row]) else {
            skipped += 1;
            continue;
        };
        let fields = [open[row], high[row], low[row], close[row], volume[row]];
        if fields.iter().any(|v| !v.is_finite()) {
            skipped += 1;
            continue;
        }
        grouped.entry(symbol.to_string()).or_default().push(Bar {
            date,
            open: fields[0],
            high: fields[1],
            low: fields[2],
            close: fields[3],
            volume: fields[4],
        });
    }
    if skipped > 0 {
        warn!(skipped, path = %path.display(), "Skipped bar rows with missing fields");
    }

    let mut series: Vec<BarSeries> = grouped
        .into_iter()
        .map(|(symbol, bars)| BarSeries::new(symbol, bars))
        .collect::<Result<_>>()?;
    series.sort_by(|a, b| a.symbol().cmp(b.symbol()));
    Ok(series)
}

/// Interpret a numeric column as f64, mapping nulls to NaN.
fn numeric_values(series: &Series) -> Result<Vec<f64>> {
    let name = series.name().to_string();
    let casted = series
        .cast(&DataType::Float64)
        .with_context(|| format!("Column '{name}' is not numeric"))?;
    Ok(casted
        .f64()
        .with_context(|| format!("Failed to interpret '{name}' as f64"))?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

/// Extract calendar dates from a date, datetime, or text column.
fn date_values(series: &Series) -> Result<Vec<Option<NaiveDate>>> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch");
    match series.dtype() {
        DataType::Date => {
            let physical = series.cast(&DataType::Int32)?;
            Ok(physical
                .i32()
                .context("Failed to interpret date column")?
                .into_iter()
                .map(|days| days.map(|d| epoch + Duration::days(d as i64)))
                .collect())
        }
        DataType::Datetime(unit, _) => {
            let ca = series
                .datetime()
                .context("Failed to interpret datetime column")?;
            let mut out = Vec::with_capacity(ca.len());
            for opt_ts in ca.into_iter() {
                let Some(ts) = opt_ts else {
                    out.push(None);
                    continue;
                };
                let (secs, nsecs) = match unit {
                    TimeUnit::Nanoseconds => (ts / 1_000_000_000, (ts % 1_000_000_000) as u32),
                    TimeUnit::Microseconds => (ts / 1_000_000, (ts % 1_000_000) as u32 * 1_000),
                    TimeUnit::Milliseconds => (ts / 1_000, (ts % 1_000) as u32 * 1_000_000),
                };
                out.push(DateTime::<Utc>::from_timestamp(secs, nsecs).map(|dt| dt.date_naive()));
            }
            Ok(out)
        }
        DataType::String => {
            let ca = series.str().context("Failed to interpret date column")?;
            let mut out = Vec::with_capacity(ca.len());
            for opt_raw in ca.into_iter() {
                let Some(raw) = opt_raw else {
                    out.push(None);
                    continue;
                };
                let parsed = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .ok()
                    .or_else(|| {
                        DateTime::parse_from_rfc3339(raw)
                            .ok()
                            .map(|dt| dt.date_naive())
                    })
                    .with_context(|| format!("Unparseable date '{raw}'"))?;
                out.push(Some(parsed));
            }
            Ok(out)
        }
        other => Err(anyhow!("Unsupported dtype {other:?} for the date column")),
    }
}
