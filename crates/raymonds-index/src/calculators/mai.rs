use analysis_core::normalize::{
    clamp_metric, min_max_normalize, safe_divide, safe_growth_rate, v_score_normalize, winsorize,
    MIN_DENOMINATOR,
};
use analysis_core::{FinancialTimeSeries, SubIndex, SubIndexCalculator, SubIndexResult};

use super::{capex_growth, revenue_growth, ScoreCard};

/// Revenue growth below this magnitude (percent per year) is too flat to
/// compare investment growth against.
const MIN_REVENUE_GROWTH: f64 = 0.5;

/// Momentum Alignment Index: does investment move with the business, and is
/// reported profit backed by cash?
#[derive(Debug, Clone, Copy)]
pub struct MomentumAlignmentCalculator {
    winsorize_percentile: f64,
}

impl Default for MomentumAlignmentCalculator {
    fn default() -> Self {
        Self::new(0.10)
    }
}

impl MomentumAlignmentCalculator {
    pub fn new(winsorize_percentile: f64) -> Self {
        Self { winsorize_percentile }
    }

    /// Share of period-over-period steps in which revenue and capex moved in
    /// the same direction, in percent.
    fn revenue_capex_sync(&self, series: &FinancialTimeSeries) -> Option<f64> {
        let direction = |delta: f64| {
            if delta.abs() < MIN_DENOMINATOR {
                0
            } else if delta > 0.0 {
                1
            } else {
                -1
            }
        };

        let mut steps = 0usize;
        let mut aligned = 0usize;
        for pair in series.records().windows(2) {
            let (Some(rev0), Some(rev1), Some(cap0), Some(cap1)) =
                (pair[0].revenue, pair[1].revenue, pair[0].capex, pair[1].capex)
            else {
                continue;
            };
            steps += 1;
            if direction(rev1 - rev0) == direction(cap1.abs() - cap0.abs()) {
                aligned += 1;
            }
        }

        if steps == 0 {
            None
        } else {
            Some(aligned as f64 / steps as f64 * 100.0)
        }
    }

    /// Operating cash flow per unit of net income in the latest period.
    fn earnings_quality(&self, series: &FinancialTimeSeries) -> Option<f64> {
        let latest = series.latest()?;
        let net_income = latest.net_income.filter(|v| *v > 0.0)?;
        let ocf = latest.operating_cash_flow?;
        Some(clamp_metric(
            Some(safe_divide(Some(ocf), Some(net_income), 0.0)),
            "earnings_quality",
        ))
    }

    /// Growth of average free cash flow from the early to the late half, after
    /// damping outlier periods.
    fn fcf_trend(&self, series: &FinancialTimeSeries) -> Option<f64> {
        if series.len() < 2 {
            return None;
        }
        let fcf: Vec<Option<f64>> = series
            .records()
            .iter()
            .map(|r| match (r.operating_cash_flow, r.capex) {
                (Some(ocf), Some(capex)) => Some(ocf - capex.abs()),
                _ => None,
            })
            .collect();
        let fcf = winsorize(&fcf, self.winsorize_percentile);

        let half = fcf.len() / 2;
        let early = &fcf[..half];
        let late = &fcf[fcf.len() - half..];
        if early.iter().all(Option::is_none) || late.iter().all(Option::is_none) {
            return None;
        }
        Some(clamp_metric(Some(safe_growth_rate(early, late, false)), "fcf_trend"))
    }

    /// Annual capex growth relative to annual revenue growth; 1.0 means
    /// investment keeps pace with the business.
    fn growth_investment_ratio(&self, series: &FinancialTimeSeries) -> Option<f64> {
        let revenue = revenue_growth(series).filter(|g| g.abs() >= MIN_REVENUE_GROWTH)?;
        let capex = capex_growth(series)?;
        Some(clamp_metric(Some(capex / revenue), "growth_investment_ratio"))
    }
}

impl SubIndexCalculator for MomentumAlignmentCalculator {
    fn sub_index(&self) -> SubIndex {
        SubIndex::Mai
    }

    fn calculate(&self, series: &FinancialTimeSeries) -> SubIndexResult {
        let mut card = ScoreCard::new(SubIndex::Mai);

        let sync = self.revenue_capex_sync(series);
        let earnings_quality = self.earnings_quality(series);
        let fcf_trend = self.fcf_trend(series);
        let growth_investment = self.growth_investment_ratio(series);

        card.raw("revenue_capex_sync", sync);
        card.raw("earnings_quality", earnings_quality);
        card.raw("fcf_trend", fcf_trend);
        card.raw("growth_investment_ratio", growth_investment);

        card.component("revenue_capex_sync", 0.30, sync.map(|v| min_max_normalize(Some(v), 0.0, 100.0)));
        card.component(
            "earnings_quality",
            0.25,
            earnings_quality.map(|v| min_max_normalize(Some(v), 0.5, 1.5)),
        );
        card.component("fcf_trend", 0.25, fcf_trend.map(|v| min_max_normalize(Some(v), -50.0, 50.0)));
        card.component(
            "growth_investment_ratio",
            0.20,
            growth_investment.map(|v| v_score_normalize(Some(v), 1.0, -1.0, 3.0)),
        );

        card.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::FinancialRecord;
    use approx::assert_relative_eq;

    fn series(revenue_growth: f64, capex_growth: f64) -> FinancialTimeSeries {
        let records = (0..5)
            .map(|i| FinancialRecord {
                revenue: Some(1000.0 * revenue_growth.powi(i)),
                capex: Some(-80.0 * capex_growth.powi(i)),
                operating_cash_flow: Some(200.0 * revenue_growth.powi(i)),
                net_income: Some(160.0 * revenue_growth.powi(i)),
                ..FinancialRecord::annual(2019 + i)
            })
            .collect();
        FinancialTimeSeries::new("MAI", records)
    }

    #[test]
    fn test_aligned_growth() {
        let result = MomentumAlignmentCalculator::default().calculate(&series(1.1, 1.1));
        assert_eq!(result.raw_metrics["revenue_capex_sync"], 100.0);
        assert_relative_eq!(result.raw_metrics["earnings_quality"], 1.25, epsilon = 1e-9);
        assert_relative_eq!(result.raw_metrics["fcf_trend"], 33.1, epsilon = 1e-9);
        assert_relative_eq!(result.raw_metrics["growth_investment_ratio"], 1.0, epsilon = 1e-9);
        assert!(result.normalized_metrics["growth_investment_ratio"] > 99.99);
        assert!(result.score > 85.0, "score {}", result.score);
    }

    #[test]
    fn test_diverging_investment() {
        let result = MomentumAlignmentCalculator::default().calculate(&series(1.1, 0.8));
        assert_eq!(result.raw_metrics["revenue_capex_sync"], 0.0);
        assert!(result.raw_metrics["growth_investment_ratio"] < -1.0);
        assert_eq!(result.normalized_metrics["growth_investment_ratio"], 0.0);
        let aligned = MomentumAlignmentCalculator::default().calculate(&series(1.1, 1.1));
        assert!(result.score < aligned.score);
    }

    #[test]
    fn test_flat_revenue_skips_growth_ratio() {
        let result = MomentumAlignmentCalculator::default().calculate(&series(1.0, 1.1));
        assert!(!result.raw_metrics.contains_key("growth_investment_ratio"));
        assert_eq!(result.normalized_metrics["growth_investment_ratio"], 50.0);
    }

    #[test]
    fn test_loss_year_earnings_quality_is_neutral() {
        let mut records: Vec<FinancialRecord> = series(1.1, 1.1).records().to_vec();
        records[4].net_income = Some(-5.0);
        let result = MomentumAlignmentCalculator::default().calculate(&FinancialTimeSeries::new("MAI", records));
        assert!(!result.raw_metrics.contains_key("earnings_quality"));
        assert_eq!(result.normalized_metrics["earnings_quality"], 50.0);
    }

    #[test]
    fn test_outlier_fcf_period_is_damped() {
        let mut records: Vec<FinancialRecord> = (0..10)
            .map(|i| FinancialRecord {
                revenue: Some(1000.0),
                capex: Some(-100.0),
                operating_cash_flow: Some(200.0),
                net_income: Some(150.0),
                ..FinancialRecord::annual(2014 + i)
            })
            .collect();
        records[9].operating_cash_flow = Some(100_000.0);
        let series = FinancialTimeSeries::new("MAI", records);

        let damped = MomentumAlignmentCalculator::new(0.10).calculate(&series);
        let raw = MomentumAlignmentCalculator::new(0.0).calculate(&series);
        assert_eq!(damped.raw_metrics["fcf_trend"], 0.0);
        assert_eq!(raw.raw_metrics["fcf_trend"], 200.0);
    }
}
