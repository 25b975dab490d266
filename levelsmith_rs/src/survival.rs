use chrono::NaiveDate;

use crate::bar::{BarSeries, Polarity};
use crate::config::EngineConfig;
use crate::detect::{ExtremumCandidate, ExtremumId};
use crate::matrix::BoolMatrix;
use crate::pairwise::PairwiseGrid;

/// Forward-time outcome for one extremum.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurvivalRecord {
    pub id: ExtremumId,
    /// Count of days the extremum remained unbroken, creation day included,
    /// breach day excluded. Row sum of the alive matrix.
    pub age: usize,
    /// Row index of the first breach bar, when one exists.
    pub end_day: Option<usize>,
    pub end_date: Option<NaiveDate>,
    pub ended: bool,
}

/// Alive matrix plus per-row survival records for one candidate set. Rows of
/// `alive` are in candidate order and carry the same ids.
pub struct SurvivalOutcome {
    pub alive: BoolMatrix,
    pub records: Vec<SurvivalRecord>,
}

/// Decide each extremum's full alive/dead trajectory and single breach day.
///
/// Per row this is a monotone one-way absorbing state machine: the running
/// AND over time of `!compatible || (distance < threshold)`, re-masked so a
/// bar is alive only at/after the creation day. Once the safe condition
/// fails on a compatible day the row is dead for good; no resurrection.
/// Rows are independent; several rows breaching on the same day each report
/// that day as their own `end_date`.
pub fn track(
    candidates: &[ExtremumCandidate],
    series: &BarSeries,
    polarity: Polarity,
    config: &EngineConfig,
) -> SurvivalOutcome {
    let grid = PairwiseGrid::build(candidates, series, polarity, config);
    let days = series.len();
    let mut alive = BoolMatrix::new(grid.ids().to_vec(), days);
    let mut records = Vec::with_capacity(candidates.len());

    for (row, candidate) in candidates.iter().enumerate() {
        let mut kept = true;
        let mut end_day = None;
        for j in 0..days {
            if kept && grid.compatible_at(row, j) {
                let safe = grid.distance_at(row, j) < config.threshold;
                if !safe {
                    kept = false;
                    end_day = Some(j);
                }
            }
            if kept && j >= candidate.day {
                alive.set(row, j, true);
            }
        }
        records.push(SurvivalRecord {
            id: candidate.id,
            age: alive.row_sum(row),
            end_day,
            end_date: end_day.map(|j| series.bars()[j].date),
            ended: end_day.is_some(),
        });
    }

    SurvivalOutcome { alive, records }
}
