//! Storage-ready view of an [`IndexReport`]: one row per
//! (company, fiscal year, quarter) with every figure rounded to two decimals.

use std::collections::BTreeMap;

use analysis_core::Grade;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::IndexReport;

/// Rounds to two decimal places, half away from zero. Non-finite input maps to zero.
pub fn round2(value: f64) -> Decimal {
    Decimal::from_f64(value)
        .unwrap_or_default()
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedIndexRecord {
    pub company_id: String,
    pub fiscal_year: i32,
    pub fiscal_quarter: Option<u8>,
    pub total_score: Decimal,
    pub grade: Grade,
    pub cei_score: Decimal,
    pub rii_score: Decimal,
    pub cgi_score: Decimal,
    pub mai_score: Decimal,
    pub violation_count: u32,
    pub red_flags: Vec<String>,
    pub yellow_flags: Vec<String>,
    pub data_quality_score: Decimal,
    pub verdict: String,
    /// Raw metrics keyed as `"<SUB-INDEX>.<metric>"`, e.g. `"RII.investment_gap"`.
    pub raw_metrics: BTreeMap<String, Decimal>,
}

impl PersistedIndexRecord {
    pub fn from_report(report: &IndexReport) -> Self {
        let result = &report.result;
        let raw_metrics = report
            .sub_results
            .iter()
            .flat_map(|(sub_index, sub)| {
                sub.raw_metrics
                    .iter()
                    .map(move |(name, value)| (format!("{}.{}", sub_index, name), round2(*value)))
            })
            .collect();

        Self {
            company_id: report.company_id.clone(),
            fiscal_year: report.fiscal_year,
            fiscal_quarter: report.fiscal_quarter,
            total_score: round2(result.total_score),
            grade: result.grade,
            cei_score: round2(result.sub_scores.cei),
            rii_score: round2(result.sub_scores.rii),
            cgi_score: round2(result.sub_scores.cgi),
            mai_score: round2(result.sub_scores.mai),
            violation_count: result.violation_count as u32,
            red_flags: result.red_flags.clone(),
            yellow_flags: result.yellow_flags.clone(),
            data_quality_score: round2(result.data_quality_score),
            verdict: result.verdict.clone(),
            raw_metrics,
        }
    }
}
