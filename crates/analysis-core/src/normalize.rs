//! Normalization and guarded arithmetic for sub-index scoring.
//!
//! Every function here is stateless and total: bad inputs (missing values,
//! zero denominators, non-positive growth bases) are converted into neutral or
//! bounded outputs instead of errors, so a gappy filing history can never turn
//! into NaN, infinity, or a six-digit growth percentage downstream.

use std::collections::BTreeMap;

/// Smallest magnitude accepted as the base of a ratio or growth computation.
pub const MIN_DENOMINATOR: f64 = 0.01;

/// Winsorization is skipped for fewer present values than this.
pub const MIN_WINSORIZE_SAMPLES: usize = 5;

/// Bounds applied to a growth rate computed against a floored denominator.
pub const GROWTH_GUARD_BOUNDS: (f64, f64) = (-95.0, 500.0);

/// Neutral score used when a component cannot be evaluated.
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Hard per-metric bounds, looked up by metric name.
pub const METRIC_BOUNDS: &[(&str, f64, f64)] = &[
    ("capex_growth", -95.0, 500.0),
    ("investment_gap", -100.0, 100.0),
    ("cash_cagr", -100.0, 200.0),
    ("revenue_growth", -95.0, 500.0),
    ("fcf_trend", -100.0, 200.0),
    ("asset_turnover", 0.0, 10.0),
    ("reinvestment_rate", 0.0, 300.0),
    ("capex_intensity", 0.0, 100.0),
    ("payout_ratio", 0.0, 300.0),
    ("debt_to_ebitda", 0.0, 50.0),
    ("debt_to_equity", 0.0, 50.0),
    ("earnings_quality", -10.0, 10.0),
    ("cash_tangible_ratio", 0.0, 1000.0),
    ("short_term_ratio", 0.0, 100.0),
    ("fundraising_conversion", 0.0, 1000.0),
    ("idle_cash_ratio", 0.0, 100.0),
    ("growth_investment_ratio", -10.0, 10.0),
    ("tangible_asset_efficiency", 0.0, 20.0),
    ("roe", -100.0, 100.0),
    ("roa", -100.0, 100.0),
    ("operating_margin", -100.0, 100.0),
];

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Mean of a data slice (0.0 when empty).
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Nearest-rank percentile value of `data` (`pct` on a 0-100 scale).
pub fn percentile_value(data: &[f64], pct: f64) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = ((pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Linear scale onto [0, 100].
///
/// `None` scores 0; a degenerate range (`max <= min`) scores a neutral 50.
pub fn min_max_normalize(value: Option<f64>, min: f64, max: f64) -> f64 {
    let Some(v) = finite(value) else {
        return 0.0;
    };
    if max <= min {
        return NEUTRAL_SCORE;
    }
    if v <= min {
        0.0
    } else if v >= max {
        100.0
    } else {
        (v - min) / (max - min) * 100.0
    }
}

/// Triangular score: 100 at `optimal`, falling linearly to 0 at `min` and at
/// `max`. Each side uses its own half-width, so asymmetric bounds are allowed.
/// Anything outside [min, max] scores 0 and `None` scores a neutral 50.
pub fn v_score_normalize(value: Option<f64>, optimal: f64, min: f64, max: f64) -> f64 {
    let Some(v) = finite(value) else {
        return NEUTRAL_SCORE;
    };
    if v < min || v > max {
        return 0.0;
    }
    if v == optimal {
        return 100.0;
    }
    let half_width = if v < optimal { optimal - min } else { max - optimal };
    if half_width <= 0.0 {
        return 0.0;
    }
    ((1.0 - (v - optimal).abs() / half_width) * 100.0).clamp(0.0, 100.0)
}

/// Inverted linear scale: lower values score higher.
pub fn inverse_normalize(value: Option<f64>, min: f64, max: f64) -> f64 {
    let Some(v) = finite(value) else {
        return 0.0;
    };
    if max <= min {
        return NEUTRAL_SCORE;
    }
    100.0 - min_max_normalize(Some(v), min, max)
}

/// Configured bounds for `metric`, if any.
pub fn metric_bounds(metric: &str) -> Option<(f64, f64)> {
    METRIC_BOUNDS
        .iter()
        .find(|(name, _, _)| *name == metric)
        .map(|&(_, lo, hi)| (lo, hi))
}

/// Clamps `value` into the configured bounds of `metric`.
/// Unknown metrics pass through; `None` becomes 0.
pub fn clamp_metric(value: Option<f64>, metric: &str) -> f64 {
    let Some(v) = value.filter(|v| !v.is_nan()) else {
        return 0.0;
    };
    match metric_bounds(metric) {
        Some((lo, hi)) => v.clamp(lo, hi),
        None if v.is_finite() => v,
        None => 0.0,
    }
}

/// Replaces values below the `percentile` / above the `1 - percentile`
/// quantile with the boundary value. Missing entries keep their position.
pub fn winsorize(values: &[Option<f64>], percentile: f64) -> Vec<Option<f64>> {
    let present: Vec<f64> = values.iter().filter_map(|v| finite(*v)).collect();
    if present.len() < MIN_WINSORIZE_SAMPLES || !(0.0..0.5).contains(&percentile) {
        return values.to_vec();
    }
    let low = percentile_value(&present, percentile * 100.0);
    let high = percentile_value(&present, (1.0 - percentile) * 100.0);
    values
        .iter()
        .map(|v| finite(*v).map(|x| x.clamp(low, high)))
        .collect()
}

/// `numerator / denominator`, or `default` for a missing or zero denominator,
/// a missing numerator, or a non-finite result.
pub fn safe_divide(numerator: Option<f64>, denominator: Option<f64>, default: f64) -> f64 {
    match (finite(numerator), finite(denominator)) {
        (Some(n), Some(d)) if d != 0.0 => {
            let q = n / d;
            if q.is_finite() {
                q
            } else {
                default
            }
        }
        _ => default,
    }
}

/// Compound annual growth rate in percent, or 0 whenever the base is missing,
/// non-positive, below [`MIN_DENOMINATOR`], either value is negative, or
/// `years <= 0`.
pub fn safe_cagr(start: Option<f64>, end: Option<f64>, years: f64) -> f64 {
    let (Some(start), Some(end)) = (finite(start), finite(end)) else {
        return 0.0;
    };
    if start <= 0.0 || start < MIN_DENOMINATOR || end < 0.0 || !(years > 0.0) || !years.is_finite() {
        return 0.0;
    }
    let cagr = ((end / start).powf(1.0 / years) - 1.0) * 100.0;
    if cagr.is_finite() {
        cagr
    } else {
        0.0
    }
}

fn group_average(values: &[Option<f64>], use_abs: bool) -> Option<f64> {
    let present: Vec<f64> = values
        .iter()
        .filter_map(|v| finite(*v))
        .map(|v| if use_abs { v.abs() } else { v })
        .collect();
    if present.is_empty() {
        None
    } else {
        Some(mean(&present))
    }
}

/// Percentage growth between the averages of two period groups.
///
/// With `use_abs` each value is taken by magnitude first, for line items that
/// are reported as negative outflows (capex). When the early average is below
/// [`MIN_DENOMINATOR`] the floor is used as the base and the result is
/// clamped to [`GROWTH_GUARD_BOUNDS`].
pub fn safe_growth_rate(early: &[Option<f64>], late: &[Option<f64>], use_abs: bool) -> f64 {
    let (Some(early_avg), Some(late_avg)) = (group_average(early, use_abs), group_average(late, use_abs))
    else {
        return 0.0;
    };
    let (lo, hi) = GROWTH_GUARD_BOUNDS;
    if early_avg.abs() < MIN_DENOMINATOR {
        if late_avg.abs() < MIN_DENOMINATOR {
            return 0.0;
        }
        return ((late_avg - early_avg) / MIN_DENOMINATOR * 100.0).clamp(lo, hi);
    }
    let growth = (late_avg - early_avg) / early_avg.abs() * 100.0;
    if growth.is_finite() {
        growth
    } else {
        0.0
    }
}

/// Converts a total growth percentage over `years` into an annual rate.
/// Total losses of 100% or more annualize to -100.
pub fn annualize_growth(growth_pct: f64, years: f64) -> f64 {
    if !growth_pct.is_finite() {
        return 0.0;
    }
    if !(years > 0.0) {
        return growth_pct;
    }
    let ratio = 1.0 + growth_pct / 100.0;
    if ratio <= 0.0 {
        return -100.0;
    }
    (ratio.powf(1.0 / years) - 1.0) * 100.0
}

/// Weighted geometric mean of 0-100 scores.
///
/// Keys without a score are dropped from both the product and the weight
/// total. Zero scores are floored to 1 before exponentiation, so the result
/// is 0 only when every present score is 0. Positive scores, including those
/// below 1, enter unchanged.
pub fn geometric_mean_weighted<K: Ord>(scores: &BTreeMap<K, f64>, weights: &BTreeMap<K, f64>) -> f64 {
    let pairs: Vec<(f64, f64)> = weights
        .iter()
        .filter(|(_, w)| **w > 0.0)
        .filter_map(|(k, w)| scores.get(k).filter(|s| s.is_finite()).map(|s| (s.clamp(0.0, 100.0), *w)))
        .collect();
    let total_weight: f64 = pairs.iter().map(|(_, w)| w).sum();
    if pairs.is_empty() || total_weight <= 0.0 || pairs.iter().all(|(s, _)| *s <= 0.0) {
        return 0.0;
    }
    let log_sum: f64 = pairs
        .iter()
        .map(|(s, w)| if *s <= 0.0 { 0.0 } else { w * s.ln() })
        .sum();
    (log_sum / total_weight).exp().clamp(0.0, 100.0)
}

/// Legacy scoring mode: plain Σ(score × weight) over keys present in both maps.
pub fn arithmetic_mean_weighted<K: Ord>(scores: &BTreeMap<K, f64>, weights: &BTreeMap<K, f64>) -> f64 {
    weights
        .iter()
        .filter_map(|(k, w)| scores.get(k).filter(|s| s.is_finite()).map(|s| s * w))
        .sum()
}
