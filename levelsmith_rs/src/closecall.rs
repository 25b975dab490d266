use crate::bar::{BarSeries, Polarity};
use crate::config::EngineConfig;
use crate::detect::{ExtremumCandidate, local_extrema_mask};
use crate::error::EngineError;
use crate::matrix::BoolMatrix;

/// Count, per extremum, the days it was tested but not broken.
///
/// A test day is itself a local extremum of the compare column with the
/// opposite polarity (a local high swinging down toward a support, a local
/// low swinging up toward a resistance) whose absolute normalized distance
/// to the reference value is below the threshold, on a day the extremum is
/// still alive. Returns the close matrix (same shape as `alive`, false
/// outside test-day columns) and the per-row counts.
///
/// The alive matrix must carry exactly the candidate table's row ids in the
/// same order; any drift is a caller contract violation, not a data issue.
pub fn count(
    candidates: &[ExtremumCandidate],
    alive: &BoolMatrix,
    series: &BarSeries,
    polarity: Polarity,
    config: &EngineConfig,
) -> Result<(BoolMatrix, Vec<usize>), EngineError> {
    let table_ids: Vec<_> = candidates.iter().map(|c| c.id).collect();
    if table_ids != alive.ids() || alive.days() != series.len() {
        return Err(EngineError::ContractViolation {
            symbol: series.symbol().to_string(),
            table_ids: table_ids.iter().map(|id| id.0).collect(),
            matrix_ids: alive.ids().iter().map(|id| id.0).collect(),
        });
    }

    let compare = series.column(config.compare);
    // Supports are tested by local highs of the compare column, resistances
    // by local lows.
    let test_days = local_extrema_mask(&compare, matches!(polarity, Polarity::Support));

    let mut close = BoolMatrix::new(table_ids, series.len());
    let mut counts = Vec::with_capacity(candidates.len());
    for (row, candidate) in candidates.iter().enumerate() {
        for (j, &cmp) in compare.iter().enumerate() {
            if !test_days[j] || !alive.get(row, j) {
                continue;
            }
            let near = if candidate.value == 0.0 {
                f64::NAN
            } else {
                (candidate.value - cmp).abs() / candidate.value.abs()
            };
            if near < config.threshold {
                close.set(row, j, true);
            }
        }
        counts.push(close.row_sum(row));
    }

    Ok((close, counts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bar::Bar;
    use crate::detect::{ExtremumId, IdAllocator, detect};
    use crate::survival;
    use chrono::NaiveDate;

    fn series_from_lows_closes(rows: &[(f64, f64)]) -> BarSeries {
        let bars = rows
            .iter()
            .enumerate()
            .map(|(i, &(low, close))| Bar {
                date: NaiveDate::from_ymd_opt(2024, 1, i as u32 + 1).unwrap(),
                open: close,
                high: close + 1.0,
                low,
                close,
                volume: 1.0,
            })
            .collect();
        BarSeries::new("ACME", bars).unwrap()
    }

    #[test]
    fn near_miss_on_a_local_high_is_a_close_call() {
        // Support at low 100 (day 2). Day 4 closes at 99.5, half a percent
        // away, inside the 1% threshold but not a breach, and is a local
        // high of the close column, so it counts as a test.
        let series = series_from_lows_closes(&[
            (103.0, 104.0),
            (100.0, 104.0),
            (101.0, 99.2),
            (99.4, 99.5),
            (99.2, 99.3),
        ]);
        let config = EngineConfig::default();
        let mut ids = IdAllocator::default();
        let supports = detect(&series, Polarity::Support, &config, &mut ids);
        assert_eq!(supports.len(), 1);

        let outcome = survival::track(&supports, &series, Polarity::Support, &config);
        assert!(
            !outcome.records[0].ended,
            "no close dipped a full percent below 100"
        );

        let (close, counts) =
            count(&supports, &outcome.alive, &series, Polarity::Support, &config).unwrap();
        // Day 4 (index 3) is the only local high of close within threshold.
        assert!(close.get(0, 3));
        assert_eq!(counts, vec![1]);
    }

    #[test]
    fn close_calls_stop_once_the_extremum_dies() {
        // The support breaks on day 4; a later near-miss local high must not
        // count because the row is already dead.
        let series = series_from_lows_closes(&[
            (103.0, 104.0),
            (100.0, 104.0),
            (101.0, 103.0),
            (98.9, 98.9),
            (98.7, 99.5),
            (98.6, 99.3),
        ]);
        let config = EngineConfig::default();
        let mut ids = IdAllocator::default();
        let supports = detect(&series, Polarity::Support, &config, &mut ids);
        let outcome = survival::track(&supports, &series, Polarity::Support, &config);
        assert!(outcome.records[0].ended);

        let (_, counts) =
            count(&supports, &outcome.alive, &series, Polarity::Support, &config).unwrap();
        assert_eq!(counts, vec![0]);
    }

    #[test]
    fn misaligned_rows_are_a_contract_violation() {
        let series = series_from_lows_closes(&[(103.0, 104.0), (100.0, 104.0), (101.0, 102.0)]);
        let config = EngineConfig::default();
        let mut ids = IdAllocator::default();
        let supports = detect(&series, Polarity::Support, &config, &mut ids);
        let wrong = BoolMatrix::new(vec![ExtremumId(42)], series.len());

        let err = count(&supports, &wrong, &series, Polarity::Support, &config).unwrap_err();
        match err {
            EngineError::ContractViolation {
                symbol,
                table_ids,
                matrix_ids,
            } => {
                assert_eq!(symbol, "ACME");
                assert_eq!(table_ids, vec![0]);
                assert_eq!(matrix_ids, vec![42]);
            }
        }
    }
}
