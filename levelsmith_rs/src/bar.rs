use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One trading day for one symbol. Prices are positive, volume non-negative;
/// the loader enforces presence, the engine tolerates degenerate values
/// (see `pairwise::normalized_distance`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Which price field a computation reads from a bar.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
}

impl PriceField {
    pub fn value(self, bar: &Bar) -> f64 {
        match self {
            PriceField::Open => bar.open,
            PriceField::High => bar.high,
            PriceField::Low => bar.low,
            PriceField::Close => bar.close,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PriceField::Open => "open",
            PriceField::High => "high",
            PriceField::Low => "low",
            PriceField::Close => "close",
        }
    }
}

/// Support (local price floor) or resistance (local price ceiling).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Support,
    Resistance,
}

impl Polarity {
    pub fn label(self) -> &'static str {
        match self {
            Polarity::Support => "support",
            Polarity::Resistance => "resistance",
        }
    }

    /// A broken support flips into a resistance and vice versa.
    pub fn flipped(self) -> Polarity {
        match self {
            Polarity::Support => Polarity::Resistance,
            Polarity::Resistance => Polarity::Support,
        }
    }
}

/// Time-ordered bars for a single symbol.
///
/// Construction sorts ascending by date and rejects duplicate dates; every
/// engine operation relies on both properties, and on row index order being
/// date order.
#[derive(Clone, Debug)]
pub struct BarSeries {
    symbol: String,
    bars: Vec<Bar>,
}

impl BarSeries {
    pub fn new(symbol: impl Into<String>, mut bars: Vec<Bar>) -> Result<Self> {
        let symbol = symbol.into();
        bars.sort_by_key(|bar| bar.date);
        if let Some(pair) = bars.windows(2).find(|pair| pair[0].date == pair[1].date) {
            return Err(anyhow!(
                "Duplicate date {} in series for symbol '{symbol}'",
                pair[0].date
            ));
        }
        Ok(Self { symbol, bars })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Extract one price field as a dense column.
    pub fn column(&self, field: PriceField) -> Vec<f64> {
        self.bars.iter().map(|bar| field.value(bar)).collect()
    }
}
