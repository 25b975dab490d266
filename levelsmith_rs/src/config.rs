use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::bar::{Polarity, PriceField};

/// Tunables for one engine run. These replace the per-function defaults the
/// engine grew up with: the threshold and column choices travel together and
/// are passed explicitly into every stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Proportional breach distance (0.01 = 1%). A support is broken once the
    /// compare price closes at least this fraction below its reference value;
    /// a resistance mirrors this above.
    pub threshold: f64,
    /// Price field that defines a support's reference value.
    pub support_reference: PriceField,
    /// Price field that defines a resistance's reference value.
    pub resistance_reference: PriceField,
    /// Price field compared against reference values for breach and
    /// close-call decisions.
    pub compare: PriceField,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threshold: 0.01,
            support_reference: PriceField::Low,
            resistance_reference: PriceField::High,
            compare: PriceField::Close,
        }
    }
}

impl EngineConfig {
    pub fn with_threshold(threshold: f64) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    pub fn reference(&self, polarity: Polarity) -> PriceField {
        match polarity {
            Polarity::Support => self.support_reference,
            Polarity::Resistance => self.resistance_reference,
        }
    }
}

/// Configuration for a batch run over a multi-symbol bar file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub input_csv: PathBuf,
    pub output_dir: PathBuf,
    /// When set, per-symbol artifacts are memoized under this directory and
    /// reused on later runs with an identical dataset and threshold.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    pub engine: EngineConfig,
    /// Worker threads for the per-symbol pool (0 = all logical cores).
    #[serde(default)]
    pub n_workers: usize,
    /// Ignore cached artifacts and recompute every symbol.
    #[serde(default)]
    pub force_recompute: bool,
    #[serde(default)]
    pub quiet: bool,
    /// Append the single-column indicator transforms (moving average, RSI,
    /// pivot points, normalized volume) to the enriched output.
    #[serde(default)]
    pub with_indicators: bool,
    /// Optional symbol filter; empty means all symbols in the input.
    #[serde(default)]
    pub symbols: Vec<String>,
}
