use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::warn;

use crate::bar::{BarSeries, Polarity};
use crate::closecall;
use crate::config::EngineConfig;
use crate::detect::{self, ExtremumCandidate, ExtremumId, IdAllocator};
use crate::matrix::BoolMatrix;
use crate::project::{self, DailyLevels};
use crate::roleflip;
use crate::storage::LevelStore;
use crate::survival::{self, SurvivalOutcome, SurvivalRecord};

/// One row of the extremum info table: candidate identity plus its survival
/// and close-call outcome.
#[derive(Clone, Debug, PartialEq)]
pub struct LevelInfo {
    pub id: ExtremumId,
    /// Creation bar index within the series.
    pub day: usize,
    pub date: NaiveDate,
    pub value: f64,
    pub volume: f64,
    pub age: usize,
    pub end_date: Option<NaiveDate>,
    pub ended: bool,
    /// True for first-generation extrema, false for role-flip derivatives.
    pub original: bool,
    pub close_count: usize,
}

/// Merged two-generation result for one polarity: info rows sorted by date,
/// with the alive and close matrices row-aligned on the same ids.
#[derive(Clone, Debug)]
pub struct LevelTable {
    pub polarity: Polarity,
    pub infos: Vec<LevelInfo>,
    pub alive: BoolMatrix,
    pub close: BoolMatrix,
}

impl LevelTable {
    pub fn ids(&self) -> Vec<ExtremumId> {
        self.infos.iter().map(|info| info.id).collect()
    }
}

/// Full engine output for one symbol.
pub struct SymbolReport {
    pub symbol: String,
    pub supports: LevelTable,
    pub resistances: LevelTable,
    pub daily: Vec<DailyLevels>,
    /// True when the level tables came from the artifact cache.
    pub from_cache: bool,
}

/// Candidates of one polarity with their survival outcome, before close-call
/// enrichment.
struct Generation {
    candidates: Vec<ExtremumCandidate>,
    outcome: SurvivalOutcome,
}

/// Merge first- and second-generation rows of one polarity, sorted by date
/// (id as tie-break), and reorder the stacked alive matrix to match.
fn merge_generations(first: Generation, second: Generation) -> Result<(Vec<ExtremumCandidate>, Vec<SurvivalRecord>, BoolMatrix)> {
    let mut rows: Vec<(ExtremumCandidate, SurvivalRecord)> = first
        .candidates
        .into_iter()
        .zip(first.outcome.records)
        .chain(second.candidates.into_iter().zip(second.outcome.records))
        .collect();
    rows.sort_by_key(|(cand, _)| (cand.date, cand.id));

    let stacked = BoolMatrix::stack(&first.outcome.alive, &second.outcome.alive)?;
    let ids: Vec<ExtremumId> = rows.iter().map(|(cand, _)| cand.id).collect();
    let alive = stacked.reorder(&ids)?;

    let (candidates, records) = rows.into_iter().unzip();
    Ok((candidates, records, alive))
}

fn build_table(
    candidates: Vec<ExtremumCandidate>,
    records: Vec<SurvivalRecord>,
    alive: BoolMatrix,
    series: &BarSeries,
    polarity: Polarity,
    config: &EngineConfig,
) -> Result<LevelTable> {
    let (close, counts) = closecall::count(&candidates, &alive, series, polarity, config)?;
    let infos = candidates
        .into_iter()
        .zip(records)
        .zip(counts)
        .map(|((cand, record), close_count)| LevelInfo {
            id: cand.id,
            day: cand.day,
            date: cand.date,
            value: cand.value,
            volume: cand.volume,
            age: record.age,
            end_date: record.end_date,
            ended: record.ended,
            original: cand.original,
            close_count,
        })
        .collect();
    Ok(LevelTable {
        polarity,
        infos,
        alive,
        close,
    })
}

fn level_table(
    series: &BarSeries,
    polarity: Polarity,
    firsts: (Vec<ExtremumCandidate>, SurvivalOutcome),
    derived: Vec<ExtremumCandidate>,
    config: &EngineConfig,
) -> Result<LevelTable> {
    let second_outcome = survival::track(&derived, series, polarity, config);
    let (candidates, records, alive) = merge_generations(
        Generation {
            candidates: firsts.0,
            outcome: firsts.1,
        },
        Generation {
            candidates: derived,
            outcome: second_outcome,
        },
    )?;
    build_table(candidates, records, alive, series, polarity, config)
}

/// Run the full per-symbol chain: detect → survive → role-flip → survive →
/// merge → close-call count → daily projection.
pub fn run_symbol(series: &BarSeries, config: &EngineConfig) -> Result<SymbolReport> {
    let mut ids = IdAllocator::default();

    let supports = detect::detect(series, Polarity::Support, config, &mut ids);
    let resistances = detect::detect(series, Polarity::Resistance, config, &mut ids);

    let sup_outcome = survival::track(&supports, series, Polarity::Support, config);
    let res_outcome = survival::track(&resistances, series, Polarity::Resistance, config);

    // Breach days flip polarity: broken supports seed resistances and vice
    // versa, skipping days already occupied by an original of the target
    // polarity.
    let derived_resistances = roleflip::derive(
        &supports,
        &sup_outcome.records,
        &resistances,
        series,
        Polarity::Support,
        &mut ids,
    );
    let derived_supports = roleflip::derive(
        &resistances,
        &res_outcome.records,
        &supports,
        series,
        Polarity::Resistance,
        &mut ids,
    );

    let support_table = level_table(
        series,
        Polarity::Support,
        (supports, sup_outcome),
        derived_supports,
        config,
    )?;
    let resistance_table = level_table(
        series,
        Polarity::Resistance,
        (resistances, res_outcome),
        derived_resistances,
        config,
    )?;

    let daily = project::project(series, &support_table, &resistance_table);

    Ok(SymbolReport {
        symbol: series.symbol().to_string(),
        supports: support_table,
        resistances: resistance_table,
        daily,
        from_cache: false,
    })
}

/// Run one symbol through the optional artifact cache. A complete, matching
/// artifact set short-circuits everything after detection; any missing or
/// unreadable artifact forces a full recomputation, never a partial load.
/// Cache write failures are surfaced to the caller.
pub fn run_symbol_with_store(
    series: &BarSeries,
    config: &EngineConfig,
    store: Option<&LevelStore>,
    force_recompute: bool,
) -> Result<SymbolReport> {
    if let Some(store) = store {
        if !force_recompute {
            match store.load(series, config) {
                Ok(Some((supports, resistances))) => {
                    let daily = project::project(series, &supports, &resistances);
                    return Ok(SymbolReport {
                        symbol: series.symbol().to_string(),
                        supports,
                        resistances,
                        daily,
                        from_cache: true,
                    });
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(symbol = series.symbol(), ?error, "Cache read failed; recomputing");
                }
            }
        }
    }

    let report = run_symbol(series, config)?;
    if let Some(store) = store {
        store
            .save(series, config, &report.supports, &report.resistances)
            .with_context(|| format!("Failed to persist artifacts for '{}'", series.symbol()))?;
    }
    Ok(report)
}
