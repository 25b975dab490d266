//! Daily indicator transforms attached to the enriched output alongside the
//! projected level columns. Warmup positions are NaN so downstream consumers
//! can mask them out.

/// Simple moving average over a trailing window. The first `window - 1`
/// positions are NaN.
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }
    let mut sum: f64 = values[..window].iter().sum();
    out[window - 1] = sum / window as f64;
    for i in window..values.len() {
        sum += values[i] - values[i - window];
        out[i] = sum / window as f64;
    }
    out
}

/// Relative strength over open-to-close moves. Gains are close-over-open
/// advances, losses the mirror, each summed over the trailing period and
/// combined into the usual 0..100 scale. 100 when the loss sum is zero.
/// The orientation is deliberately the standard one (pure gains read 100,
/// pure losses 0), not the inverted ratio this formula has sometimes been
/// published with.
pub fn rsi(open: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    debug_assert_eq!(open.len(), close.len());
    let n = close.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < period {
        return out;
    }
    let gains: Vec<f64> = (0..n).map(|i| (close[i] - open[i]).max(0.0)).collect();
    let losses: Vec<f64> = (0..n).map(|i| (open[i] - close[i]).max(0.0)).collect();
    let mut gain_sum: f64 = gains[..period].iter().sum();
    let mut loss_sum: f64 = losses[..period].iter().sum();
    for i in (period - 1)..n {
        if i >= period {
            gain_sum += gains[i] - gains[i - period];
            loss_sum += losses[i] - losses[i - period];
        }
        out[i] = if loss_sum == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + gain_sum / loss_sum)
        };
    }
    out
}

/// Classic floor-trader pivot levels computed from the prior day's bar. Day
/// zero has no prior bar and stays NaN across all five outputs.
pub fn pivot_points(
    high: &[f64],
    low: &[f64],
    close: &[f64],
) -> (Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>) {
    let n = close.len();
    let mut pivot = vec![f64::NAN; n];
    let mut r1 = vec![f64::NAN; n];
    let mut r2 = vec![f64::NAN; n];
    let mut s1 = vec![f64::NAN; n];
    let mut s2 = vec![f64::NAN; n];
    for i in 1..n {
        let p = (high[i - 1] + low[i - 1] + close[i - 1]) / 3.0;
        pivot[i] = p;
        r1[i] = 2.0 * p - low[i - 1];
        s1[i] = 2.0 * p - high[i - 1];
        r2[i] = p + (high[i - 1] - low[i - 1]);
        s2[i] = p - (high[i - 1] - low[i - 1]);
    }
    (pivot, r1, r2, s1, s2)
}

/// Volume centered on its trailing-window mean: `(v - mean) / mean`, so a
/// day at exactly average volume reads 0 and a double-average day reads 1.
/// The first `window - 1` positions are NaN, same warmup as
/// `moving_average`.
pub fn normalize_volume(volume: &[f64], window: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; volume.len()];
    if window == 0 || volume.len() < window {
        return out;
    }
    let mut sum: f64 = volume[..window].iter().sum();
    let mut mean = sum / window as f64;
    out[window - 1] = (volume[window - 1] - mean) / mean;
    for i in window..volume.len() {
        sum += volume[i] - volume[i - window];
        mean = sum / window as f64;
        out[i] = (volume[i] - mean) / mean;
    }
    out
}

/// A column shifted back by `lag` bars with a NaN-filled leading gap, for
/// the prior-day OHLCV columns (`open-1` .. `volume-4`) on the enriched
/// output.
pub fn shifted(values: &[f64], lag: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if lag < values.len() {
        out[lag..].copy_from_slice(&values[..values.len() - lag]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moving_average_warms_up_then_slides() {
        let out = moving_average(&[1.0, 2.0, 3.0, 4.0], 2);
        assert!(out[0].is_nan());
        assert_eq!(out[1], 1.5);
        assert_eq!(out[2], 2.5);
        assert_eq!(out[3], 3.5);
    }

    #[test]
    fn rsi_is_100_on_pure_gains_and_0_on_pure_losses() {
        let open = [10.0, 10.0, 10.0];
        let up = [11.0, 12.0, 11.5];
        let down = [9.0, 8.0, 9.5];
        let rsi_up = rsi(&open, &up, 2);
        let rsi_down = rsi(&open, &down, 2);
        assert!(rsi_up[0].is_nan());
        assert_eq!(rsi_up[1], 100.0);
        assert_eq!(rsi_down[2], 0.0);
    }

    #[test]
    fn pivots_come_from_the_prior_bar() {
        let high = [12.0, 13.0];
        let low = [10.0, 11.0];
        let close = [11.0, 12.0];
        let (pivot, r1, r2, s1, s2) = pivot_points(&high, &low, &close);
        assert!(pivot[0].is_nan());
        assert_eq!(pivot[1], 11.0);
        assert_eq!(r1[1], 12.0);
        assert_eq!(s1[1], 10.0);
        assert_eq!(r2[1], 13.0);
        assert_eq!(s2[1], 9.0);
    }

    #[test]
    fn volume_normalizes_against_trailing_mean() {
        let out = normalize_volume(&[100.0, 300.0, 200.0], 2);
        assert!(out[0].is_nan());
        // Mean of [100, 300] is 200: (300 - 200) / 200.
        assert_eq!(out[1], 0.5);
        assert_eq!(out[2], -0.2);
    }

    #[test]
    fn shifted_lags_with_a_nan_gap() {
        let out = shifted(&[1.0, 2.0, 3.0], 1);
        assert!(out[0].is_nan());
        assert_eq!(out[1], 1.0);
        assert_eq!(out[2], 2.0);
        assert!(shifted(&[1.0, 2.0], 2).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn volume_stays_nan_until_the_window_fills() {
        let out = normalize_volume(&[100.0, 300.0], 64);
        assert!(out.iter().all(|v| v.is_nan()));
    }
}
