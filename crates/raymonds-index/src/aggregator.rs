//! Total score, grade, and the red-flag override rules.
//!
//! Override rules can only cap the grade; the total score is never altered.

use std::collections::BTreeMap;

use analysis_core::normalize::{arithmetic_mean_weighted, clamp_metric, geometric_mean_weighted, MIN_DENOMINATOR};
use analysis_core::{FinancialTimeSeries, Grade, RaymondsIndexResult, SubIndex, SubIndexResult, SubScores};
use serde::{Deserialize, Serialize};

use crate::calculators::capex_growth;
use crate::config::AggregationMethod;

/// Fixed sub-index weights; they sum to 1.
pub const SUB_INDEX_WEIGHTS: [(SubIndex, f64); 4] = [
    (SubIndex::Cei, 0.20),
    (SubIndex::Rii, 0.35),
    (SubIndex::Cgi, 0.25),
    (SubIndex::Mai, 0.20),
];

pub const CASH_TANGIBLE_RATIO_LIMIT: f64 = 30.0;
pub const FUNDRAISING_CONVERSION_FLOOR: f64 = 30.0;
pub const SHORT_TERM_RATIO_LIMIT: f64 = 65.0;

const YELLOW_INVESTMENT_GAP: f64 = 30.0;
const YELLOW_SHORT_TERM_RATIO: f64 = 50.0;
const YELLOW_PAYOUT_RATIO: f64 = 100.0;
const YELLOW_EARNINGS_QUALITY: f64 = 0.5;
const YELLOW_DATA_QUALITY: f64 = 70.0;

pub fn sub_index_weights() -> BTreeMap<SubIndex, f64> {
    SUB_INDEX_WEIGHTS.iter().copied().collect()
}

/// A red-flag combination that caps the grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideRule {
    /// Cash balance grew far faster than tangible assets.
    CashHoarding,
    /// Raised capital was mostly not converted into capex.
    FundraisingNotInvested,
    /// Cash parked in short-term instruments while capex declines.
    ShortTermParking,
}

impl OverrideRule {
    pub fn cap(&self) -> Grade {
        match self {
            OverrideRule::CashHoarding => Grade::BMinus,
            OverrideRule::FundraisingNotInvested => Grade::BMinus,
            OverrideRule::ShortTermParking => Grade::B,
        }
    }

    pub fn describe(&self, signals: &ExtraSignals) -> String {
        match self {
            OverrideRule::CashHoarding => format!(
                "Cash growth outpaced tangible asset growth {:.1}:1",
                signals.cash_tangible_ratio.unwrap_or_default()
            ),
            OverrideRule::FundraisingNotInvested => format!(
                "Only {:.1}% of capital raised was converted into investment",
                signals.fundraising_conversion.unwrap_or_default()
            ),
            OverrideRule::ShortTermParking => format!(
                "{:.1}% of cash held in short-term instruments while capex declines",
                signals.short_term_ratio.unwrap_or_default()
            ),
        }
    }
}

/// Cap applied when two or more rules trigger together.
pub const MULTIPLE_VIOLATION_CAP: Grade = Grade::CPlus;

/// Series-level signals the aggregator needs beyond the four scores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtraSignals {
    /// Cash growth % per point of tangible asset growth %.
    pub cash_tangible_ratio: Option<f64>,
    /// Capex as a percentage of positive financing inflows.
    pub fundraising_conversion: Option<f64>,
    /// Short-term instruments as a percentage of the cash balance.
    pub short_term_ratio: Option<f64>,
    pub capex_trend_declining: bool,
    pub investment_gap: Option<f64>,
    pub payout_ratio: Option<f64>,
    pub earnings_quality: Option<f64>,
    pub data_quality_score: Option<f64>,
    #[serde(default)]
    pub validation_warnings: Vec<String>,
}

impl ExtraSignals {
    /// Extracts the override-rule inputs from the raw series.
    pub fn from_series(series: &FinancialTimeSeries) -> Self {
        Self {
            cash_tangible_ratio: cash_tangible_ratio(series),
            fundraising_conversion: fundraising_conversion(series),
            short_term_ratio: short_term_ratio(series),
            capex_trend_declining: capex_growth(series).is_some_and(|g| g < 0.0),
            ..Default::default()
        }
    }

    /// Picks up the yellow-flag inputs from calculator raw metrics.
    pub fn with_sub_results<'a>(mut self, results: impl IntoIterator<Item = &'a SubIndexResult>) -> Self {
        for result in results {
            let get = |name: &str| result.raw_metrics.get(name).copied();
            match result.sub_index {
                SubIndex::Rii => self.investment_gap = get("investment_gap"),
                SubIndex::Cgi => self.payout_ratio = get("payout_ratio"),
                SubIndex::Mai => self.earnings_quality = get("earnings_quality"),
                SubIndex::Cei => {}
            }
        }
        self
    }

    pub fn with_validation(mut self, quality_score: f64, warnings: &[String]) -> Self {
        self.data_quality_score = Some(quality_score);
        self.validation_warnings = warnings.to_vec();
        self
    }

    /// Rules triggered by these signals, in evaluation order.
    pub fn triggered_rules(&self) -> Vec<OverrideRule> {
        let mut rules = Vec::new();
        if self.cash_tangible_ratio.is_some_and(|r| r > CASH_TANGIBLE_RATIO_LIMIT) {
            rules.push(OverrideRule::CashHoarding);
        }
        if self.fundraising_conversion.is_some_and(|c| c < FUNDRAISING_CONVERSION_FLOOR) {
            rules.push(OverrideRule::FundraisingNotInvested);
        }
        if self.short_term_ratio.is_some_and(|r| r > SHORT_TERM_RATIO_LIMIT) && self.capex_trend_declining {
            rules.push(OverrideRule::ShortTermParking);
        }
        rules
    }

    fn yellow_flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        if let Some(gap) = self.investment_gap.filter(|g| *g > YELLOW_INVESTMENT_GAP) {
            flags.push(format!("Cash growing {:.1}pp/yr faster than capex", gap));
        }
        if let Some(ratio) = self
            .short_term_ratio
            .filter(|r| *r > YELLOW_SHORT_TERM_RATIO && !self.capex_trend_declining)
        {
            flags.push(format!("{:.1}% of cash held in short-term instruments", ratio));
        }
        if let Some(payout) = self.payout_ratio.filter(|p| *p > YELLOW_PAYOUT_RATIO) {
            flags.push(format!("Dividends exceed net income ({:.1}% payout)", payout));
        }
        if let Some(eq) = self.earnings_quality.filter(|q| *q < YELLOW_EARNINGS_QUALITY) {
            flags.push(format!("Weak cash backing of earnings (OCF/NI {:.2})", eq));
        }
        if let Some(quality) = self.data_quality_score.filter(|q| *q < YELLOW_DATA_QUALITY) {
            flags.push(format!("Low data quality ({:.0}/100)", quality));
        }
        flags
    }
}

fn cash_tangible_ratio(series: &FinancialTimeSeries) -> Option<f64> {
    if series.len() < 2 {
        return None;
    }
    let (first, last) = (series.first()?, series.latest()?);
    let cash_start = first.cash_balance().filter(|c| *c >= MIN_DENOMINATOR)?;
    let cash_end = last.cash_balance()?;
    let tangible_start = first.tangible_assets.filter(|t| *t >= MIN_DENOMINATOR)?;
    let tangible_end = last.tangible_assets?;

    let cash_growth = (cash_end / cash_start - 1.0) * 100.0;
    let tangible_growth = (tangible_end / tangible_start - 1.0) * 100.0;
    if cash_growth <= 0.0 {
        return Some(0.0);
    }
    Some(clamp_metric(Some(cash_growth / tangible_growth.max(1.0)), "cash_tangible_ratio"))
}

fn fundraising_conversion(series: &FinancialTimeSeries) -> Option<f64> {
    let raised: f64 = series
        .records()
        .iter()
        .filter_map(|r| r.financing_cash_flow)
        .filter(|f| f.is_finite() && *f > 0.0)
        .sum();
    if raised < MIN_DENOMINATOR {
        return None;
    }
    let invested: f64 = series
        .records()
        .iter()
        .filter_map(|r| r.capex)
        .filter(|c| c.is_finite())
        .map(f64::abs)
        .sum();
    Some(clamp_metric(Some(invested / raised * 100.0), "fundraising_conversion"))
}

fn short_term_ratio(series: &FinancialTimeSeries) -> Option<f64> {
    let latest = series.latest()?;
    let short_term = latest.short_term_investments?;
    let balance = latest.cash_balance().filter(|b| *b >= MIN_DENOMINATOR)?;
    Some(clamp_metric(Some(short_term / balance * 100.0), "short_term_ratio"))
}

/// Combines sub-scores into the graded result.
#[derive(Debug, Clone, Copy)]
pub struct Aggregator {
    method: AggregationMethod,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(AggregationMethod::Geometric)
    }
}

impl Aggregator {
    pub fn new(method: AggregationMethod) -> Self {
        Self { method }
    }

    pub fn total_score(&self, scores: &SubScores) -> f64 {
        let map = scores.to_map();
        let weights = sub_index_weights();
        let total = match self.method {
            AggregationMethod::Geometric => geometric_mean_weighted(&map, &weights),
            AggregationMethod::Arithmetic => arithmetic_mean_weighted(&map, &weights),
        };
        total.clamp(0.0, 100.0)
    }

    pub fn aggregate(&self, scores: &SubScores, signals: &ExtraSignals) -> RaymondsIndexResult {
        let total_score = self.total_score(scores);
        let score_grade = Grade::from_score(total_score);

        let rules = signals.triggered_rules();
        let grade = match rules.len() {
            0 => score_grade,
            1 => score_grade.capped_at(rules[0].cap()),
            _ => score_grade.capped_at(MULTIPLE_VIOLATION_CAP),
        };
        for rule in &rules {
            tracing::debug!("Override rule {:?} triggered (cap {})", rule, rule.cap());
        }

        let mut red_flags: Vec<String> = rules.iter().map(|r| r.describe(signals)).collect();
        if rules.len() >= 2 {
            red_flags.push(format!("{} red flags co-occur (grade cap {})", rules.len(), MULTIPLE_VIOLATION_CAP));
        }

        RaymondsIndexResult {
            total_score,
            grade,
            score_grade,
            sub_scores: *scores,
            violation_count: rules.len(),
            red_flags,
            yellow_flags: signals.yellow_flags(),
            data_quality_score: signals.data_quality_score.unwrap_or(100.0),
            validation_warnings: signals.validation_warnings.clone(),
            verdict: verdict(total_score, score_grade, grade, &rules),
        }
    }
}

fn verdict(total_score: f64, score_grade: Grade, grade: Grade, rules: &[OverrideRule]) -> String {
    let outcome = if grade != score_grade {
        format!("grade capped at {}", grade)
    } else {
        format!("grade {}", grade)
    };
    match rules {
        [] => {
            let band = if total_score >= 80.0 {
                "Excellent capital allocation"
            } else if total_score >= 64.0 {
                "Sound capital allocation"
            } else if total_score >= 45.0 {
                "Average capital allocation with room for improvement"
            } else if total_score >= 20.0 {
                "Weak capital allocation"
            } else {
                "Poor capital allocation"
            };
            format!("{} (score {:.1}, grade {})", band, total_score, grade)
        }
        [rule] => {
            let issue = match rule {
                OverrideRule::CashHoarding => "cash is accumulating instead of being invested",
                OverrideRule::FundraisingNotInvested => "raised capital is not reaching investment",
                OverrideRule::ShortTermParking => "cash is parked in short-term instruments as investment falls",
            };
            format!("Capital allocation concern: {}; {} (score {:.1})", issue, outcome, total_score)
        }
        many => format!(
            "Multiple capital allocation red flags ({}); {} (score {:.1})",
            many.len(),
            outcome,
            total_score
        ),
    }
}
