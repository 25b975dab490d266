use chrono::NaiveDate;

use crate::bar::{BarSeries, Polarity};
use crate::config::EngineConfig;

/// Stable identifier of one extremum within a single symbol run. Info tables
/// and alive/close matrices are joined on this id, never on row position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExtremumId(pub u32);

/// Hands out ids for one symbol run, across both polarities and both
/// generations.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: u32,
}

impl IdAllocator {
    pub fn alloc(&mut self) -> ExtremumId {
        let id = ExtremumId(self.next);
        self.next += 1;
        id
    }
}

/// A bar flagged as a local extremum, or derived from a breach by the
/// role-flip stage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExtremumCandidate {
    pub id: ExtremumId,
    /// Row index of the creation bar within the series.
    pub day: usize,
    pub date: NaiveDate,
    /// Reference price: low for supports, high for resistances. Role-flip
    /// candidates inherit the broken extremum's value instead.
    pub value: f64,
    pub volume: f64,
    /// False for second-generation (role-flip) candidates.
    pub original: bool,
}

/// Boolean mask of bars that are strict local maxima (or minima) of `values`
/// over a 3-bar centered window. Ties never qualify, and the first and last
/// bar are never flagged because the window is undefined there.
pub(crate) fn local_extrema_mask(values: &[f64], maxima: bool) -> Vec<bool> {
    let mut mask = vec![false; values.len()];
    if values.len() < 3 {
        return mask;
    }
    for i in 1..values.len() - 1 {
        let (prev, mid, next) = (values[i - 1], values[i], values[i + 1]);
        mask[i] = if maxima {
            prev < mid && mid > next
        } else {
            prev > mid && mid < next
        };
    }
    mask
}

/// Scan a series for first-generation extremum candidates of one polarity.
///
/// Supports are strict local minima of the configured reference field
/// (`low[i-1] > low[i] < low[i+1]`); resistances mirror on highs. A series
/// shorter than 3 bars yields an empty set, which is not an error.
pub fn detect(
    series: &BarSeries,
    polarity: Polarity,
    config: &EngineConfig,
    ids: &mut IdAllocator,
) -> Vec<ExtremumCandidate> {
    let field = config.reference(polarity);
    let values = series.column(field);
    let mask = local_extrema_mask(&values, matches!(polarity, Polarity::Resistance));

    series
        .bars()
        .iter()
        .enumerate()
        .filter(|(i, _)| mask[*i])
        .map(|(i, bar)| ExtremumCandidate {
            id: ids.alloc(),
            day: i,
            date: bar.date,
            value: values[i],
            volume: bar.volume,
            original: true,
        })
        .collect()
}
