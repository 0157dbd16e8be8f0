use analysis_core::normalize::{clamp_metric, min_max_normalize, safe_cagr, safe_divide, v_score_normalize};
use analysis_core::{FinancialTimeSeries, SubIndex, SubIndexCalculator, SubIndexResult};

use super::{capex_growth, ScoreCard};

/// Reinvestment Intensity Index, the primary signal: is cash being put back
/// into the business at the pace it accumulates?
#[derive(Debug, Clone, Copy, Default)]
pub struct ReinvestmentIntensityCalculator;

impl ReinvestmentIntensityCalculator {
    pub fn new() -> Self {
        Self
    }

    /// CAGR of cash plus short-term instruments, first to latest period.
    fn cash_cagr(&self, series: &FinancialTimeSeries) -> Option<f64> {
        if series.len() < 2 {
            return None;
        }
        let start = series.first()?.cash_balance()?;
        let end = series.latest()?.cash_balance()?;
        let cagr = safe_cagr(Some(start), Some(end), series.span_years());
        Some(clamp_metric(Some(cagr), "cash_cagr"))
    }

    /// Capex as a percentage of operating cash flow in the latest period.
    fn reinvestment_rate(&self, series: &FinancialTimeSeries) -> Option<f64> {
        let latest = series.latest()?;
        let capex = latest.capex?.abs();
        let ocf = latest.operating_cash_flow.filter(|v| *v > 0.0)?;
        let rate = safe_divide(Some(capex), Some(ocf), 0.0) * 100.0;
        Some(clamp_metric(Some(rate), "reinvestment_rate"))
    }

    /// Capex as a percentage of revenue in the latest period.
    fn capex_intensity(&self, series: &FinancialTimeSeries) -> Option<f64> {
        let latest = series.latest()?;
        let capex = latest.capex?.abs();
        let revenue = latest.revenue.filter(|v| *v > 0.0)?;
        let intensity = safe_divide(Some(capex), Some(revenue), 0.0) * 100.0;
        Some(clamp_metric(Some(intensity), "capex_intensity"))
    }
}

impl SubIndexCalculator for ReinvestmentIntensityCalculator {
    fn sub_index(&self) -> SubIndex {
        SubIndex::Rii
    }

    fn calculate(&self, series: &FinancialTimeSeries) -> SubIndexResult {
        let mut card = ScoreCard::new(SubIndex::Rii);

        let cash_cagr = self.cash_cagr(series);
        let capex_growth = capex_growth(series);
        let investment_gap = match (cash_cagr, capex_growth) {
            (Some(cash), Some(capex)) => Some(clamp_metric(Some(cash - capex), "investment_gap")),
            _ => None,
        };
        let reinvestment_rate = self.reinvestment_rate(series);
        let capex_intensity = self.capex_intensity(series);

        card.raw("cash_cagr", cash_cagr);
        card.raw("capex_growth", capex_growth);
        card.raw("investment_gap", investment_gap);
        card.raw("reinvestment_rate", reinvestment_rate);
        card.raw("capex_intensity", capex_intensity);

        card.component(
            "investment_gap",
            0.40,
            investment_gap.map(|v| v_score_normalize(Some(v), 0.0, -60.0, 60.0)),
        );
        card.component(
            "reinvestment_rate",
            0.25,
            reinvestment_rate.map(|v| v_score_normalize(Some(v), 60.0, 0.0, 150.0)),
        );
        card.component(
            "capex_intensity",
            0.15,
            capex_intensity.map(|v| v_score_normalize(Some(v), 8.0, 0.0, 30.0)),
        );
        card.component(
            "capex_growth",
            0.20,
            capex_growth.map(|v| min_max_normalize(Some(v), -20.0, 25.0)),
        );

        card.finish()
    }
}
