use std::fs::File;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use polars::prelude::*;
use rayon::prelude::*;
use tracing::info;

use crate::bar::BarSeries;
use crate::config::RunConfig;
use crate::data;
use crate::engine::{self, SymbolReport};
use crate::indicators;
use crate::storage::LevelStore;

const MA_WINDOW: usize = 15;
const RSI_PERIOD: usize = 15;
const VOLUME_WINDOW: usize = 64;
const PREVIOUS_DAYS: usize = 4;
const LAG_FIELDS: [&str; 5] = ["open", "high", "low", "close", "volume"];

/// Outcome counters for one batch run.
#[derive(Debug)]
pub struct RunSummary {
    pub symbols: usize,
    pub cache_hits: usize,
    pub levels: usize,
    pub daily_rows: usize,
}

/// Execute a full batch: load bars, compute (or reload) levels per symbol in
/// parallel, then write the enriched daily file and the level info file under
/// the output directory.
pub fn run(config: &RunConfig) -> Result<RunSummary> {
    let started = Instant::now();

    let mut series = data::load_bar_series(&config.input_csv)?;
    if !config.symbols.is_empty() {
        series.retain(|s| config.symbols.iter().any(|wanted| wanted == s.symbol()));
    }
    info!(
        symbols = series.len(),
        input = %config.input_csv.display(),
        "Loaded bar data"
    );

    let store = match &config.cache_dir {
        Some(dir) => Some(LevelStore::new(dir)?),
        None => None,
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.n_workers)
        .build()
        .context("Failed to build worker pool")?;

    let reports: Vec<SymbolReport> = pool.install(|| {
        series
            .par_iter()
            .map(|s| {
                let symbol_started = Instant::now();
                let report = engine::run_symbol_with_store(
                    s,
                    &config.engine,
                    store.as_ref(),
                    config.force_recompute,
                )?;
                if !config.quiet {
                    info!(
                        symbol = s.symbol(),
                        supports = report.supports.infos.len(),
                        resistances = report.resistances.infos.len(),
                        from_cache = report.from_cache,
                        elapsed_ms = symbol_started.elapsed().as_millis() as u64,
                        "Processed symbol"
                    );
                }
                Ok(report)
            })
            .collect::<Result<_>>()
    })?;

    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "Unable to create output directory {}",
            config.output_dir.display()
        )
    })?;

    let mut enriched = enriched_frame(&series, &reports, config.with_indicators)?;
    write_csv(
        &mut enriched,
        &config.output_dir.join("levels_daily.csv"),
    )?;
    let mut info = info_frame(&reports)?;
    write_csv(&mut info, &config.output_dir.join("levels_info.csv"))?;

    let summary = RunSummary {
        symbols: reports.len(),
        cache_hits: reports.iter().filter(|r| r.from_cache).count(),
        levels: reports
            .iter()
            .map(|r| r.supports.infos.len() + r.resistances.infos.len())
            .sum(),
        daily_rows: enriched.height(),
    };
    info!(
        symbols = summary.symbols,
        cache_hits = summary.cache_hits,
        levels = summary.levels,
        daily_rows = summary.daily_rows,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Batch run complete"
    );
    Ok(summary)
}

fn write_csv(frame: &mut DataFrame, path: &Path) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("Unable to create {}", path.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(frame)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// One row per symbol-day: the raw bar, the projected nearest-level columns,
/// and optionally the indicator transforms.
fn enriched_frame(
    series: &[BarSeries],
    reports: &[SymbolReport],
    with_indicators: bool,
) -> Result<DataFrame> {
    let total: usize = series.iter().map(|s| s.len()).sum();
    let mut symbol = Vec::with_capacity(total);
    let mut date = Vec::with_capacity(total);
    let mut open = Vec::with_capacity(total);
    let mut high = Vec::with_capacity(total);
    let mut low = Vec::with_capacity(total);
    let mut close = Vec::with_capacity(total);
    let mut volume = Vec::with_capacity(total);
    let mut sup_val = Vec::with_capacity(total);
    let mut sup_vol = Vec::with_capacity(total);
    let mut sup_age = Vec::with_capacity(total);
    let mut sup_close = Vec::with_capacity(total);
    let mut res_val = Vec::with_capacity(total);
    let mut res_vol = Vec::with_capacity(total);
    let mut res_age = Vec::with_capacity(total);
    let mut res_close = Vec::with_capacity(total);
    let mut ma = Vec::with_capacity(total);
    let mut rsi = Vec::with_capacity(total);
    let mut pivots = Vec::with_capacity(total);
    let mut r1 = Vec::with_capacity(total);
    let mut r2 = Vec::with_capacity(total);
    let mut s1 = Vec::with_capacity(total);
    let mut s2 = Vec::with_capacity(total);
    let mut volume_norm = Vec::with_capacity(total);
    // Prior-day OHLCV lags, grouped by lag: open-1 .. volume-4.
    let mut lagged: Vec<(String, Vec<f64>)> = Vec::new();
    if with_indicators {
        for lag in 1..=PREVIOUS_DAYS {
            for field in LAG_FIELDS {
                lagged.push((format!("{field}-{lag}"), Vec::with_capacity(total)));
            }
        }
    }

    for (s, report) in series.iter().zip(reports) {
        for (bar, levels) in s.bars().iter().zip(&report.daily) {
            symbol.push(s.symbol().to_string());
            date.push(bar.date.format("%Y-%m-%d").to_string());
            open.push(bar.open);
            high.push(bar.high);
            low.push(bar.low);
            close.push(bar.close);
            volume.push(bar.volume);
            sup_val.push(levels.sup_val);
            sup_vol.push(levels.sup_vol);
            sup_age.push(levels.sup_age);
            sup_close.push(levels.sup_close);
            res_val.push(levels.res_val);
            res_vol.push(levels.res_vol);
            res_age.push(levels.res_age);
            res_close.push(levels.res_close);
        }
        if with_indicators {
            let opens = s.column(crate::bar::PriceField::Open);
            let highs = s.column(crate::bar::PriceField::High);
            let lows = s.column(crate::bar::PriceField::Low);
            let closes = s.column(crate::bar::PriceField::Close);
            let volumes: Vec<f64> = s.bars().iter().map(|b| b.volume).collect();
            ma.extend(indicators::moving_average(&closes, MA_WINDOW));
            rsi.extend(indicators::rsi(&opens, &closes, RSI_PERIOD));
            let (p, pr1, pr2, ps1, ps2) = indicators::pivot_points(&highs, &lows, &closes);
            pivots.extend(p);
            r1.extend(pr1);
            r2.extend(pr2);
            s1.extend(ps1);
            s2.extend(ps2);
            volume_norm.extend(indicators::normalize_volume(&volumes, VOLUME_WINDOW));
            let mut slot = 0;
            for lag in 1..=PREVIOUS_DAYS {
                for column in [&opens, &highs, &lows, &closes, &volumes] {
                    lagged[slot].1.extend(indicators::shifted(column, lag));
                    slot += 1;
                }
            }
        }
    }

    let mut columns = vec![
        Series::new("symbol", symbol),
        Series::new("date", date),
        Series::new("open", open),
        Series::new("high", high),
        Series::new("low", low),
        Series::new("close", close),
        Series::new("volume", volume),
        Series::new("sup_val", sup_val),
        Series::new("sup_vol", sup_vol),
        Series::new("sup_age", sup_age),
        Series::new("sup_close", sup_close),
        Series::new("res_val", res_val),
        Series::new("res_vol", res_vol),
        Series::new("res_age", res_age),
        Series::new("res_close", res_close),
    ];
    if with_indicators {
        columns.extend([
            Series::new(&format!("ma{MA_WINDOW}"), ma),
            Series::new(&format!("rsi{RSI_PERIOD}"), rsi),
            Series::new("pivots", pivots),
            Series::new("r1", r1),
            Series::new("r2", r2),
            Series::new("s1", s1),
            Series::new("s2", s2),
            Series::new("volume_norm", volume_norm),
        ]);
        for (name, values) in lagged {
            columns.push(Series::new(&name, values));
        }
    }
    DataFrame::new(columns).context("Failed to build enriched frame")
}

/// One row per detected level across every symbol and both polarities.
fn info_frame(reports: &[SymbolReport]) -> Result<DataFrame> {
    let mut symbol = Vec::new();
    let mut polarity = Vec::new();
    let mut id = Vec::new();
    let mut date = Vec::new();
    let mut value = Vec::new();
    let mut volume = Vec::new();
    let mut age = Vec::new();
    let mut end_date = Vec::new();
    let mut ended = Vec::new();
    let mut original = Vec::new();
    let mut close_count = Vec::new();

    for report in reports {
        for table in [&report.supports, &report.resistances] {
            for info in &table.infos {
                symbol.push(report.symbol.clone());
                polarity.push(table.polarity.label().to_string());
                id.push(info.id.0);
                date.push(info.date.format("%Y-%m-%d").to_string());
                value.push(info.value);
                volume.push(info.volume);
                age.push(info.age as u32);
                end_date.push(info.end_date.map(|d| d.format("%Y-%m-%d").to_string()));
                ended.push(info.ended);
                original.push(info.original);
                close_count.push(info.close_count as u32);
            }
        }
    }

    DataFrame::new(vec![
        Series::new("symbol", symbol),
        Series::new("polarity", polarity),
        Series::new("id", id),
        Series::new("date", date),
        Series::new("value", value),
        Series::new("volume", volume),
        Series::new("age", age),
        Series::new("end_date", end_date),
        Series::new("ended", ended),
        Series::new("original", original),
        Series::new("close_count", close_count),
    ])
    .context("Failed to build info frame")
}
