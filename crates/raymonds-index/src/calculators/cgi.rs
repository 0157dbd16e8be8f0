use analysis_core::normalize::{clamp_metric, inverse_normalize, v_score_normalize, MIN_DENOMINATOR};
use analysis_core::{FinancialRecord, FinancialTimeSeries, SubIndex, SubIndexCalculator, SubIndexResult};

use super::{positive_ratio, ScoreCard};

/// Cash Governance Index: idle cash, shareholder payout, and leverage.
#[derive(Debug, Clone, Copy, Default)]
pub struct CashGovernanceCalculator;

/// Payout ratio that scores 100.
const OPTIMAL_PAYOUT: f64 = 35.0;

impl CashGovernanceCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Cash and short-term instruments as a percentage of total assets.
    fn idle_cash_ratio(&self, r: &FinancialRecord) -> Option<f64> {
        positive_ratio(r.cash_balance(), r.total_assets)
            .map(|v| clamp_metric(Some(v * 100.0), "idle_cash_ratio"))
    }

    /// Dividends as a percentage of net income; undefined for a loss year.
    fn payout_ratio(&self, r: &FinancialRecord) -> Option<f64> {
        let dividends = r.dividend_paid?.abs();
        positive_ratio(Some(dividends), r.net_income)
            .map(|v| clamp_metric(Some(v * 100.0), "payout_ratio"))
    }

    /// Operating income plus depreciation when reported.
    fn ebitda(&self, r: &FinancialRecord) -> Option<f64> {
        r.operating_income
            .map(|oi| oi + r.depreciation.map(f64::abs).unwrap_or(0.0))
    }

    /// (raw ratio, component score). Liabilities against non-positive
    /// EBITDA score 0 with no raw ratio.
    fn debt_to_ebitda(&self, r: &FinancialRecord) -> (Option<f64>, Option<f64>) {
        let Some(liabilities) = r.total_liabilities else {
            return (None, None);
        };
        match self.ebitda(r) {
            Some(ebitda) if ebitda > MIN_DENOMINATOR => {
                let ratio = clamp_metric(Some(liabilities.max(0.0) / ebitda), "debt_to_ebitda");
                (Some(ratio), Some(inverse_normalize(Some(ratio), 0.0, 8.0)))
            }
            Some(_) if liabilities > 0.0 => (None, Some(0.0)),
            _ => (None, None),
        }
    }

    fn debt_to_equity(&self, r: &FinancialRecord) -> (Option<f64>, Option<f64>) {
        let Some(liabilities) = r.total_liabilities else {
            return (None, None);
        };
        match r.total_equity {
            Some(equity) if equity > 0.0 => {
                let ratio = clamp_metric(Some(liabilities.max(0.0) / equity), "debt_to_equity");
                (Some(ratio), Some(inverse_normalize(Some(ratio), 0.0, 3.0)))
            }
            // Impaired capital
            Some(_) if liabilities > 0.0 => (None, Some(0.0)),
            _ => (None, None),
        }
    }
}

impl SubIndexCalculator for CashGovernanceCalculator {
    fn sub_index(&self) -> SubIndex {
        SubIndex::Cgi
    }

    fn calculate(&self, series: &FinancialTimeSeries) -> SubIndexResult {
        let mut card = ScoreCard::new(SubIndex::Cgi);
        let Some(latest) = series.latest() else {
            return card.finish();
        };

        let idle_cash = self.idle_cash_ratio(latest);
        let payout = self.payout_ratio(latest);
        let (debt_ebitda, debt_ebitda_score) = self.debt_to_ebitda(latest);
        let (debt_equity, debt_equity_score) = self.debt_to_equity(latest);

        card.raw("idle_cash_ratio", idle_cash);
        card.raw("payout_ratio", payout);
        card.raw("debt_to_ebitda", debt_ebitda);
        card.raw("debt_to_equity", debt_equity);

        card.component(
            "cash_utilization",
            0.35,
            idle_cash.map(|v| v_score_normalize(Some(v), 10.0, 0.0, 60.0)),
        );
        card.component(
            "payout_ratio",
            0.30,
            payout.map(|v| v_score_normalize(Some(v), OPTIMAL_PAYOUT, 0.0, 100.0)),
        );
        card.component("debt_to_ebitda", 0.20, debt_ebitda_score);
        card.component("debt_to_equity", 0.15, debt_equity_score);

        card.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn record() -> FinancialRecord {
        FinancialRecord {
            total_assets: Some(1000.0),
            cash_and_equivalents: Some(80.0),
            short_term_investments: Some(20.0),
            net_income: Some(100.0),
            dividend_paid: Some(-35.0),
            operating_income: Some(150.0),
            depreciation: Some(50.0),
            total_liabilities: Some(400.0),
            total_equity: Some(600.0),
            ..FinancialRecord::annual(2023)
        }
    }

    fn calc(r: FinancialRecord) -> SubIndexResult {
        CashGovernanceCalculator::new().calculate(&FinancialTimeSeries::new("CGI", vec![r]))
    }

    #[test]
    fn test_well_governed_company() {
        let result = calc(record());
        assert_relative_eq!(result.raw_metrics["idle_cash_ratio"], 10.0, epsilon = 1e-12);
        assert_relative_eq!(result.raw_metrics["payout_ratio"], 35.0, epsilon = 1e-12);
        assert_relative_eq!(result.raw_metrics["debt_to_ebitda"], 2.0, epsilon = 1e-12);
        assert_eq!(result.normalized_metrics["cash_utilization"], 100.0);
        assert_eq!(result.normalized_metrics["payout_ratio"], 100.0);
        assert_relative_eq!(result.normalized_metrics["debt_to_ebitda"], 75.0, epsilon = 1e-9);

        let de_score = 100.0 - (400.0 / 600.0) / 3.0 * 100.0;
        let expected = 0.35 * 100.0 + 0.30 * 100.0 + 0.20 * 75.0 + 0.15 * de_score;
        assert_relative_eq!(result.score, expected, epsilon = 1e-9);
    }

    #[test]
    fn test_idle_cash_pile_scores_low() {
        let result = calc(FinancialRecord {
            cash_and_equivalents: Some(500.0),
            short_term_investments: Some(200.0),
            ..record()
        });
        assert_eq!(result.normalized_metrics["cash_utilization"], 0.0);
    }

    #[test]
    fn test_loss_year_payout_is_neutral() {
        let result = calc(FinancialRecord {
            net_income: Some(-20.0),
            ..record()
        });
        assert!(!result.raw_metrics.contains_key("payout_ratio"));
        assert_eq!(result.normalized_metrics["payout_ratio"], 50.0);
    }

    #[test]
    fn test_negative_ebitda_with_debt_scores_zero() {
        let result = calc(FinancialRecord {
            operating_income: Some(-100.0),
            depreciation: None,
            ..record()
        });
        assert!(!result.raw_metrics.contains_key("debt_to_ebitda"));
        assert_eq!(result.normalized_metrics["debt_to_ebitda"], 0.0);
    }

    #[test]
    fn test_missing_liabilities_is_neutral() {
        let result = calc(FinancialRecord {
            total_liabilities: None,
            ..record()
        });
        assert_eq!(result.normalized_metrics["debt_to_ebitda"], 50.0);
        assert_eq!(result.normalized_metrics["debt_to_equity"], 50.0);
    }
}
