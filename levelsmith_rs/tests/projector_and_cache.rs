use std::fs;
use std::path::Path;

use anyhow::Result;
use chrono::NaiveDate;
use levelsmith_rs::{
    Bar, BarSeries, EngineConfig, LevelStore, RunConfig, run, run_symbol, run_symbol_with_store,
};
use tempfile::tempdir;

fn day(n: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, n).unwrap()
}

fn series(symbol: &str, rows: &[(f64, f64, f64)]) -> BarSeries {
    let bars = rows
        .iter()
        .enumerate()
        .map(|(i, &(high, low, close))| Bar {
            date: day(i as u32 + 1),
            open: close,
            high,
            low,
            close,
            volume: (i + 1) as f64,
        })
        .collect();
    BarSeries::new(symbol, bars).unwrap()
}

fn fixture() -> BarSeries {
    series(
        "ACME",
        &[
            (106.0, 103.0, 105.0),
            (105.0, 100.0, 104.0),
            (104.5, 102.0, 103.0),
            (98.0, 96.5, 97.0),
            (103.0, 96.8, 102.0),
            (99.5, 97.0, 98.5),
            (100.0, 98.0, 99.0),
        ],
    )
}

#[test]
fn projection_picks_the_proportionally_nearest_live_level() {
    let report = run_symbol(&fixture(), &EngineConfig::default()).unwrap();

    // Day 3 (index 2): the only live support is 100, created the day before.
    let levels = &report.daily[2];
    assert_eq!(levels.sup_val, 100.0);
    assert_eq!(levels.sup_vol, 2.0);
    assert_eq!(levels.sup_age, 2);

    // Day 1 predates every level; both sides fall back to sentinels.
    let first = &report.daily[0];
    assert_eq!(first.sup_val, 0.0);
    assert_eq!(first.sup_vol, -1.0);
    assert_eq!(first.sup_age, 0);
    assert_eq!(first.sup_close, 0);
    assert_eq!(first.res_val, 2.0 * 105.0);
    assert_eq!(first.res_vol, -1.0);
}

#[test]
fn store_round_trips_both_tables_exactly() -> Result<()> {
    let dir = tempdir()?;
    let store = LevelStore::new(dir.path())?;
    let bars = fixture();
    let config = EngineConfig::default();

    let report = run_symbol(&bars, &config)?;
    store.save(&bars, &config, &report.supports, &report.resistances)?;

    let (supports, resistances) = store
        .load(&bars, &config)?
        .expect("complete entry loads back");
    assert_eq!(supports.infos, report.supports.infos);
    assert_eq!(supports.alive, report.supports.alive);
    assert_eq!(supports.close, report.supports.close);
    assert_eq!(resistances.infos, report.resistances.infos);
    assert_eq!(resistances.alive, report.resistances.alive);
    assert_eq!(resistances.close, report.resistances.close);
    Ok(())
}

#[test]
fn cache_misses_on_changed_bars_or_threshold() -> Result<()> {
    let dir = tempdir()?;
    let store = LevelStore::new(dir.path())?;
    let bars = fixture();
    let config = EngineConfig::default();

    let report = run_symbol(&bars, &config)?;
    store.save(&bars, &config, &report.supports, &report.resistances)?;

    // Same symbol, one close nudged: the fingerprint no longer matches.
    let mut rows: Vec<(f64, f64, f64)> = fixture()
        .bars()
        .iter()
        .map(|b| (b.high, b.low, b.close))
        .collect();
    rows[3].2 += 0.25;
    let changed = series("ACME", &rows);
    assert!(store.load(&changed, &config)?.is_none());

    // Same bars, different threshold: the manifest binding fails.
    assert!(store.load(&bars, &EngineConfig::with_threshold(0.02))?.is_none());

    // The original pairing still loads.
    assert!(store.load(&bars, &config)?.is_some());
    Ok(())
}

#[test]
fn missing_artifact_forces_recompute() -> Result<()> {
    let dir = tempdir()?;
    let store = LevelStore::new(dir.path())?;
    let bars = fixture();
    let config = EngineConfig::default();

    let report = run_symbol(&bars, &config)?;
    store.save(&bars, &config, &report.supports, &report.resistances)?;
    fs::remove_file(dir.path().join("ACME").join("resistance_alive.parquet"))?;

    assert!(store.load(&bars, &config)?.is_none());

    // The engine falls back to a full recomputation and repairs the entry.
    let recomputed = run_symbol_with_store(&bars, &config, Some(&store), false)?;
    assert!(!recomputed.from_cache);
    assert!(store.load(&bars, &config)?.is_some());
    Ok(())
}

#[test]
fn corrupt_artifact_forces_recompute() -> Result<()> {
    let dir = tempdir()?;
    let store = LevelStore::new(dir.path())?;
    let bars = fixture();
    let config = EngineConfig::default();

    let report = run_symbol(&bars, &config)?;
    store.save(&bars, &config, &report.supports, &report.resistances)?;
    fs::write(dir.path().join("ACME").join("support_info.parquet"), b"junk")?;

    let recomputed = run_symbol_with_store(&bars, &config, Some(&store), false)?;
    assert!(!recomputed.from_cache);
    assert_eq!(recomputed.supports.infos, report.supports.infos);
    Ok(())
}

#[test]
fn force_recompute_bypasses_a_valid_entry() -> Result<()> {
    let dir = tempdir()?;
    let store = LevelStore::new(dir.path())?;
    let bars = fixture();
    let config = EngineConfig::default();

    let first = run_symbol_with_store(&bars, &config, Some(&store), false)?;
    assert!(!first.from_cache);
    let second = run_symbol_with_store(&bars, &config, Some(&store), false)?;
    assert!(second.from_cache);
    let forced = run_symbol_with_store(&bars, &config, Some(&store), true)?;
    assert!(!forced.from_cache);
    assert_eq!(forced.supports.infos, second.supports.infos);
    Ok(())
}

fn write_csv(path: &Path, nudge: f64) -> Result<()> {
    let mut out = String::from("symbol,date,open,high,low,close,volume\n");
    for symbol in ["ACME", "BETA"] {
        let scale = if symbol == "ACME" { 1.0 } else { 2.0 };
        for (i, (high, low, close)) in [
            (106.0, 103.0, 105.0),
            (105.0, 100.0, 104.0),
            (104.5, 102.0, 103.0),
            (98.0, 96.5, 97.0 + nudge),
            (103.0, 96.8, 102.0),
            (99.5, 97.0, 98.5),
        ]
        .into_iter()
        .enumerate()
        {
            out.push_str(&format!(
                "{symbol},2024-03-{:02},{},{},{},{},{}\n",
                i + 1,
                close * scale,
                high * scale,
                low * scale,
                close * scale,
                (i + 1) as f64 * 100.0
            ));
        }
    }
    fs::write(path, out)?;
    Ok(())
}

#[test]
fn batch_run_is_cached_and_stable_across_reruns() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("bars.csv");
    write_csv(&input, 0.0)?;

    let config = RunConfig {
        input_csv: input.clone(),
        output_dir: dir.path().join("out"),
        cache_dir: Some(dir.path().join("cache")),
        engine: EngineConfig::default(),
        n_workers: 2,
        force_recompute: false,
        quiet: true,
        with_indicators: true,
        symbols: Vec::new(),
    };

    let first = run(&config)?;
    assert_eq!(first.symbols, 2);
    assert_eq!(first.cache_hits, 0);
    assert_eq!(first.daily_rows, 12);
    let daily_after_first = fs::read_to_string(config.output_dir.join("levels_daily.csv"))?;
    assert!(daily_after_first.contains("sup_val"));
    assert!(daily_after_first.contains("ma15"));
    assert!(daily_after_first.contains("open-1"));
    assert!(daily_after_first.contains("volume-4"));

    let second = run(&config)?;
    assert_eq!(second.cache_hits, 2);
    let daily_after_second = fs::read_to_string(config.output_dir.join("levels_daily.csv"))?;
    assert_eq!(daily_after_first, daily_after_second);

    // Editing the bars invalidates the fingerprint binding.
    write_csv(&input, 0.5)?;
    let third = run(&config)?;
    assert_eq!(third.cache_hits, 0);
    Ok(())
}

#[test]
fn symbol_filter_limits_the_batch() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("bars.csv");
    write_csv(&input, 0.0)?;

    let config = RunConfig {
        input_csv: input,
        output_dir: dir.path().join("out"),
        cache_dir: None,
        engine: EngineConfig::default(),
        n_workers: 1,
        force_recompute: false,
        quiet: true,
        with_indicators: false,
        symbols: vec!["BETA".to_string()],
    };

    let summary = run(&config)?;
    assert_eq!(summary.symbols, 1);
    let info = fs::read_to_string(config.output_dir.join("levels_info.csv"))?;
    assert!(!info.contains("ACME"));
    Ok(())
}
