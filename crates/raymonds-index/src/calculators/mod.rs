//! The four sub-index calculators and the metric helpers they share.

mod cei;
mod cgi;
mod mai;
mod rii;

use std::collections::BTreeMap;

use analysis_core::normalize::{annualize_growth, clamp_metric, safe_growth_rate, NEUTRAL_SCORE};
use analysis_core::{FinancialField, FinancialTimeSeries, SubIndex, SubIndexResult};

pub use cei::CapitalEfficiencyCalculator;
pub use cgi::CashGovernanceCalculator;
pub use mai::MomentumAlignmentCalculator;
pub use rii::ReinvestmentIntensityCalculator;

/// Accumulates raw metrics and weighted component scores for one sub-index.
pub(crate) struct ScoreCard {
    sub_index: SubIndex,
    raw_metrics: BTreeMap<String, f64>,
    normalized_metrics: BTreeMap<String, f64>,
    weighted_sum: f64,
    total_weight: f64,
}

impl ScoreCard {
    pub(crate) fn new(sub_index: SubIndex) -> Self {
        Self {
            sub_index,
            raw_metrics: BTreeMap::new(),
            normalized_metrics: BTreeMap::new(),
            weighted_sum: 0.0,
            total_weight: 0.0,
        }
    }

    /// Records a raw metric if it could be computed.
    pub(crate) fn raw(&mut self, name: &str, value: Option<f64>) {
        if let Some(v) = value.filter(|v| v.is_finite()) {
            self.raw_metrics.insert(name.to_string(), v);
        }
    }

    /// Adds a component score; `None` counts as neutral.
    pub(crate) fn component(&mut self, name: &str, weight: f64, score: Option<f64>) {
        let score = score
            .filter(|s| s.is_finite())
            .unwrap_or(NEUTRAL_SCORE)
            .clamp(0.0, 100.0);
        self.normalized_metrics.insert(name.to_string(), score);
        self.weighted_sum += score * weight;
        self.total_weight += weight;
    }

    pub(crate) fn finish(self) -> SubIndexResult {
        let score = if self.total_weight > 0.0 {
            (self.weighted_sum / self.total_weight).clamp(0.0, 100.0)
        } else {
            NEUTRAL_SCORE
        };
        tracing::debug!("{} score {:.2} from {} components", self.sub_index, score, self.normalized_metrics.len());
        SubIndexResult {
            sub_index: self.sub_index,
            score,
            raw_metrics: self.raw_metrics,
            normalized_metrics: self.normalized_metrics,
        }
    }
}

/// `numerator / denominator` for a strictly positive denominator.
pub(crate) fn positive_ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d > 0.0 && n.is_finite() && d.is_finite() => Some(n / d),
        _ => None,
    }
}

/// Annualized growth between the early-half and late-half averages of a field.
///
/// `None` when the series has fewer than two periods or either half has no
/// reported value. The result is clamped under `metric`.
pub(crate) fn annualized_half_growth(
    series: &FinancialTimeSeries,
    field: FinancialField,
    use_abs: bool,
    metric: &str,
) -> Option<f64> {
    if series.len() < 2 {
        return None;
    }
    let (early, late) = series.halves();
    let early: Vec<Option<f64>> = early.iter().map(|r| r.get(field)).collect();
    let late: Vec<Option<f64>> = late.iter().map(|r| r.get(field)).collect();
    if early.iter().all(Option::is_none) || late.iter().all(Option::is_none) {
        return None;
    }
    let growth = safe_growth_rate(&early, &late, use_abs);
    let annual = annualize_growth(growth, series.halves_distance_years());
    Some(clamp_metric(Some(annual), metric))
}

/// Annualized capex growth (by magnitude), shared by RII, MAI and the override rules.
pub(crate) fn capex_growth(series: &FinancialTimeSeries) -> Option<f64> {
    annualized_half_growth(series, FinancialField::Capex, true, "capex_growth")
}

pub(crate) fn revenue_growth(series: &FinancialTimeSeries) -> Option<f64> {
    annualized_half_growth(series, FinancialField::Revenue, false, "revenue_growth")
}
