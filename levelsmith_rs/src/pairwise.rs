use crate::bar::{BarSeries, Polarity};
use crate::config::EngineConfig;
use crate::detect::{ExtremumCandidate, ExtremumId};

/// Sign-adjusted proportional distance between an extremum's reference value
/// and a compare price. Adverse movement is always the positive/large
/// direction, so "safe" is uniformly `distance < threshold`:
/// supports use `(ref - cmp) / ref`, resistances `(cmp - ref) / ref`.
///
/// A zero reference value makes the division undefined; the result is NaN,
/// which never satisfies a `< threshold` test. Such an extremum reads as
/// immediately broken and never close, a documented edge case rather than
/// a crash.
pub fn normalized_distance(reference: f64, compare: f64, polarity: Polarity) -> f64 {
    if reference == 0.0 {
        return f64::NAN;
    }
    match polarity {
        Polarity::Support => (reference - compare) / reference,
        Polarity::Resistance => (compare - reference) / reference,
    }
}

/// Dense extremum×day grid shared by the survival and close-call stages.
///
/// `compatible[i, j]` is true iff bar j is strictly later than row i's
/// creation day; an extremum can never breach itself on its own day. The
/// distance plane is the full O(rows × days) outer product; for the daily
/// series lengths this engine targets the memory trade is deliberate.
pub struct PairwiseGrid {
    ids: Vec<ExtremumId>,
    days: usize,
    compatible: Vec<bool>,
    distance: Vec<f64>,
}

impl PairwiseGrid {
    pub fn build(
        candidates: &[ExtremumCandidate],
        series: &BarSeries,
        polarity: Polarity,
        config: &EngineConfig,
    ) -> Self {
        let compare = series.column(config.compare);
        let days = series.len();
        let mut compatible = vec![false; candidates.len() * days];
        let mut distance = vec![f64::NAN; candidates.len() * days];

        for (row, candidate) in candidates.iter().enumerate() {
            let base = row * days;
            for (j, &cmp) in compare.iter().enumerate() {
                // Unique sorted dates mean index order is date order.
                compatible[base + j] = j > candidate.day;
                distance[base + j] = normalized_distance(candidate.value, cmp, polarity);
            }
        }

        Self {
            ids: candidates.iter().map(|c| c.id).collect(),
            days,
            compatible,
            distance,
        }
    }

    pub fn ids(&self) -> &[ExtremumId] {
        &self.ids
    }

    pub fn days(&self) -> usize {
        self.days
    }

    pub fn compatible_at(&self, row: usize, day: usize) -> bool {
        self.compatible[row * self.days + day]
    }

    pub fn distance_at(&self, row: usize, day: usize) -> f64 {
        self.distance[row * self.days + day]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bar::Bar;
    use crate::detect::IdAllocator;
    use chrono::NaiveDate;

    fn series_from_closes(closes: &[f64]) -> BarSeries {
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                date: NaiveDate::from_ymd_opt(2024, 1, i as u32 + 1).unwrap(),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
            })
            .collect();
        BarSeries::new("ACME", bars).unwrap()
    }

    fn candidate(day: usize, value: f64, series: &BarSeries) -> ExtremumCandidate {
        let mut ids = IdAllocator::default();
        ExtremumCandidate {
            id: ids.alloc(),
            day,
            date: series.bars()[day].date,
            value,
            volume: 1.0,
            original: true,
        }
    }

    #[test]
    fn compatibility_is_strictly_later() {
        let series = series_from_closes(&[1.0, 2.0, 3.0]);
        let cand = candidate(1, 2.0, &series);
        let grid = PairwiseGrid::build(&[cand], &series, Polarity::Support, &EngineConfig::default());
        assert!(!grid.compatible_at(0, 0));
        assert!(!grid.compatible_at(0, 1));
        assert!(grid.compatible_at(0, 2));
    }

    #[test]
    fn support_distance_grows_as_price_falls() {
        // Support at 100: close 98 is 2% adverse, close 102 is -2% (safe side).
        assert!((normalized_distance(100.0, 98.0, Polarity::Support) - 0.02).abs() < 1e-12);
        assert!((normalized_distance(100.0, 102.0, Polarity::Support) + 0.02).abs() < 1e-12);
    }

    #[test]
    fn resistance_distance_is_mirrored() {
        assert!((normalized_distance(100.0, 102.0, Polarity::Resistance) - 0.02).abs() < 1e-12);
        assert!((normalized_distance(100.0, 98.0, Polarity::Resistance) + 0.02).abs() < 1e-12);
    }

    #[test]
    fn zero_reference_is_nan_and_never_safe() {
        let distance = normalized_distance(0.0, 5.0, Polarity::Support);
        assert!(distance.is_nan());
        assert!(!(distance < 0.01));
    }
}
