use analysis_core::normalize::{clamp_metric, min_max_normalize};
use analysis_core::{FinancialRecord, FinancialTimeSeries, SubIndex, SubIndexCalculator, SubIndexResult};

use super::{positive_ratio, ScoreCard};

/// Capital Efficiency Index: how much revenue and profit the latest balance
/// sheet generates.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapitalEfficiencyCalculator;

impl CapitalEfficiencyCalculator {
    pub fn new() -> Self {
        Self
    }

    fn asset_turnover(&self, r: &FinancialRecord) -> Option<f64> {
        positive_ratio(r.revenue, r.total_assets).map(|v| clamp_metric(Some(v), "asset_turnover"))
    }

    fn roa(&self, r: &FinancialRecord) -> Option<f64> {
        positive_ratio(r.net_income, r.total_assets).map(|v| clamp_metric(Some(v * 100.0), "roa"))
    }

    fn roe(&self, r: &FinancialRecord) -> Option<f64> {
        // Negative equity makes ROE meaningless, not excellent
        positive_ratio(r.net_income, r.total_equity).map(|v| clamp_metric(Some(v * 100.0), "roe"))
    }

    fn tangible_asset_efficiency(&self, r: &FinancialRecord) -> Option<f64> {
        positive_ratio(r.revenue, r.tangible_assets)
            .map(|v| clamp_metric(Some(v), "tangible_asset_efficiency"))
    }

    fn operating_margin(&self, r: &FinancialRecord) -> Option<f64> {
        positive_ratio(r.operating_income, r.revenue)
            .map(|v| clamp_metric(Some(v * 100.0), "operating_margin"))
    }
}

impl SubIndexCalculator for CapitalEfficiencyCalculator {
    fn sub_index(&self) -> SubIndex {
        SubIndex::Cei
    }

    fn calculate(&self, series: &FinancialTimeSeries) -> SubIndexResult {
        let mut card = ScoreCard::new(SubIndex::Cei);
        let Some(latest) = series.latest() else {
            return card.finish();
        };

        let asset_turnover = self.asset_turnover(latest);
        let roa = self.roa(latest);
        let roe = self.roe(latest);
        let tangible = self.tangible_asset_efficiency(latest);
        let margin = self.operating_margin(latest);

        card.raw("asset_turnover", asset_turnover);
        card.raw("roa", roa);
        card.raw("roe", roe);
        card.raw("tangible_asset_efficiency", tangible);
        card.raw("operating_margin", margin);

        card.component("asset_turnover", 0.30, asset_turnover.map(|v| min_max_normalize(Some(v), 0.1, 3.0)));
        card.component("roa", 0.20, roa.map(|v| min_max_normalize(Some(v), -5.0, 15.0)));
        card.component("roe", 0.20, roe.map(|v| min_max_normalize(Some(v), -10.0, 25.0)));
        card.component(
            "tangible_asset_efficiency",
            0.15,
            tangible.map(|v| min_max_normalize(Some(v), 0.2, 4.0)),
        );
        card.component("operating_margin", 0.15, margin.map(|v| min_max_normalize(Some(v), -10.0, 30.0)));

        card.finish()
    }
}
