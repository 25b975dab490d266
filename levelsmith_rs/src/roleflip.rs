use std::collections::HashSet;

use chrono::NaiveDate;
use itertools::Itertools;

use crate::bar::{BarSeries, Polarity};
use crate::detect::{ExtremumCandidate, IdAllocator};
use crate::survival::SurvivalRecord;

/// Derive second-generation candidates from breach days: the market
/// convention that a broken support frequently becomes future resistance
/// (and vice versa).
///
/// When one day breaches several extrema of the same polarity, the most
/// extreme one wins (the lowest reference value among broken supports, the
/// highest among broken resistances), so each breach day yields at most one
/// derived candidate per polarity. Derived candidates whose day coincides
/// with an existing candidate of the target polarity are dropped: a bar
/// cannot be both an original resistance and a derived resistance.
///
/// Output candidates are tagged `original = false` and are meant to be fed
/// through the survival tracker exactly once; no third generation is derived
/// from them.
pub fn derive(
    broken: &[ExtremumCandidate],
    records: &[SurvivalRecord],
    existing_target: &[ExtremumCandidate],
    series: &BarSeries,
    source_polarity: Polarity,
    ids: &mut IdAllocator,
) -> Vec<ExtremumCandidate> {
    debug_assert_eq!(broken.len(), records.len());

    let taken_dates: HashSet<NaiveDate> =
        existing_target.iter().map(|cand| cand.date).collect();

    let breaches = broken
        .iter()
        .zip(records.iter())
        .filter_map(|(cand, rec)| rec.end_day.map(|day| (day, cand.value)))
        .into_group_map();

    breaches
        .into_iter()
        .sorted_by_key(|(day, _)| *day)
        .filter_map(|(day, values)| {
            let value = match source_polarity {
                // A broken support's low becomes the derived resistance's value.
                Polarity::Support => values.into_iter().fold(f64::INFINITY, f64::min),
                Polarity::Resistance => values.into_iter().fold(f64::NEG_INFINITY, f64::max),
            };
            let bar = &series.bars()[day];
            if taken_dates.contains(&bar.date) {
                return None;
            }
            Some(ExtremumCandidate {
                id: ids.alloc(),
                day,
                date: bar.date,
                value,
                volume: bar.volume,
                original: false,
            })
        })
        .collect()
}
