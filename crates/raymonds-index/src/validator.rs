//! Pre-calculation data checks.
//!
//! Errors block calculation (unless a degraded run is requested), warnings
//! only lower the quality score so a reviewer can judge how much to trust
//! the resulting grade.

use analysis_core::normalize::MIN_DENOMINATOR;
use analysis_core::{FinancialField, FinancialRecord, FinancialTimeSeries, ValidationResult};

/// Fields without which the index is not computed.
pub const REQUIRED_FIELDS: [FinancialField; 6] = [
    FinancialField::Revenue,
    FinancialField::OperatingIncome,
    FinancialField::NetIncome,
    FinancialField::TotalAssets,
    FinancialField::OperatingCashFlow,
    FinancialField::Capex,
];

/// Fields whose absence degrades individual components.
pub const RECOMMENDED_FIELDS: [FinancialField; 6] = [
    FinancialField::CashAndEquivalents,
    FinancialField::ShortTermInvestments,
    FinancialField::TangibleAssets,
    FinancialField::TotalEquity,
    FinancialField::TotalLiabilities,
    FinancialField::DividendPaid,
];

pub const MIN_PERIODS: usize = 2;

const ERROR_PENALTY: f64 = 20.0;
const WARNING_PENALTY: f64 = 5.0;
const MISSING_FIELD_PENALTY: f64 = 2.0;

/// An early-period base below this share of the later peak is "near zero".
const NEAR_ZERO_BASE_RATIO: f64 = 0.01;
const MAX_PLAUSIBLE_ASSET_TURNOVER: f64 = 5.0;
/// Allowed mismatch between reported and derived gross profit, as a share of revenue.
const GROSS_PROFIT_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Default)]
pub struct DataValidator {
    allow_degraded: bool,
}

impl DataValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validator for caller-acknowledged degraded runs.
    pub fn degraded() -> Self {
        Self { allow_degraded: true }
    }

    pub fn validate(&self, series: &FinancialTimeSeries) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut missing_fields = Vec::new();

        // 1. Required field presence
        for field in REQUIRED_FIELDS {
            let covered = series.coverage(field);
            if covered == 0 {
                errors.push(format!("missing required field: {}", field));
                missing_fields.push(field.name().to_string());
            } else if covered < series.len() {
                warnings.push(format!(
                    "{} reported in {} of {} periods",
                    field,
                    covered,
                    series.len()
                ));
            }
        }

        // 2. Minimum history
        if series.len() < MIN_PERIODS {
            errors.push(format!(
                "insufficient history: {} period(s), at least {} required",
                series.len(),
                MIN_PERIODS
            ));
        }

        // 3. Sign sanity
        let mut sign_errors = 0;
        for record in series.records() {
            if record.total_assets.is_some_and(|a| a < 0.0) {
                errors.push(format!("negative total_assets in fiscal year {}", record.fiscal_year));
                sign_errors += 1;
            }
        }

        // 4. Recommended coverage
        for field in RECOMMENDED_FIELDS {
            if series.coverage(field) == 0 {
                warnings.push(format!("missing recommended field: {}", field));
                missing_fields.push(field.name().to_string());
            }
        }

        // 5. Magnitude sanity
        self.check_magnitudes(series, &mut warnings);

        for (year, quarter) in series.duplicate_periods() {
            match quarter {
                Some(q) => warnings.push(format!("duplicate period: {} Q{}", year, q)),
                None => warnings.push(format!("duplicate period: {}", year)),
            }
        }

        let quality_score = (100.0
            - ERROR_PENALTY * errors.len() as f64
            - WARNING_PENALTY * warnings.len() as f64
            - MISSING_FIELD_PENALTY * missing_fields.len() as f64)
            .max(0.0);

        let is_valid = errors.is_empty();
        let can_calculate = is_valid || (self.allow_degraded && !series.is_empty() && sign_errors == 0);

        tracing::debug!(
            "Validated {}: valid={} can_calculate={} quality={:.1} ({} errors, {} warnings)",
            series.company_id,
            is_valid,
            can_calculate,
            quality_score,
            errors.len(),
            warnings.len()
        );

        ValidationResult {
            is_valid,
            can_calculate,
            quality_score,
            errors,
            warnings,
            missing_fields,
            data_years: series.data_years(),
        }
    }

    fn check_magnitudes(&self, series: &FinancialTimeSeries, warnings: &mut Vec<String>) {
        let capex: Vec<Option<f64>> = series
            .values(FinancialField::Capex)
            .into_iter()
            .map(|v| v.map(f64::abs))
            .collect();
        if let Some(year) = near_zero_base(series, &capex) {
            warnings.push(format!(
                "near-zero base capex in fiscal year {}: capex growth is guarded",
                year
            ));
        }

        let cash: Vec<Option<f64>> = series.records().iter().map(|r| r.cash_balance()).collect();
        if let Some(year) = near_zero_base(series, &cash) {
            warnings.push(format!(
                "near-zero base cash in fiscal year {}: cash growth is guarded",
                year
            ));
        }

        for record in series.records() {
            if let (Some(revenue), Some(assets)) = (record.revenue, record.total_assets) {
                if assets > MIN_DENOMINATOR && revenue / assets > MAX_PLAUSIBLE_ASSET_TURNOVER {
                    warnings.push(format!(
                        "implausible asset turnover {:.1} in fiscal year {}",
                        revenue / assets,
                        record.fiscal_year
                    ));
                }
            }
            if let (Some(revenue), Some(op_income)) = (record.revenue, record.operating_income) {
                if revenue > 0.0 && op_income > revenue {
                    warnings.push(format!(
                        "operating income exceeds revenue in fiscal year {}",
                        record.fiscal_year
                    ));
                }
            }
            self.check_gross_profit(record, warnings);
        }

        for pair in series.records().windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if (prev.fiscal_year, prev.fiscal_quarter) == (next.fiscal_year, next.fiscal_quarter) {
                continue;
            }
            if let (Some(a), Some(b)) = (prev.period_end, next.period_end) {
                if b <= a {
                    warnings.push(format!(
                        "period_end {} of fiscal year {} does not follow {} of fiscal year {}",
                        b, next.fiscal_year, a, prev.fiscal_year
                    ));
                }
            }
        }
    }

    fn check_gross_profit(&self, record: &FinancialRecord, warnings: &mut Vec<String>) {
        let Some(revenue) = record.revenue.filter(|r| *r > 0.0) else {
            return;
        };
        if let Some(gross) = record.gross_profit.filter(|g| *g > revenue) {
            warnings.push(format!(
                "gross profit {:.1} exceeds revenue {:.1} in fiscal year {}",
                gross, revenue, record.fiscal_year
            ));
        }
        if let (Some(gross), Some(cost)) = (record.gross_profit, record.cost_of_sales) {
            let derived = revenue - cost.abs();
            if (gross - derived).abs() > revenue * GROSS_PROFIT_TOLERANCE {
                warnings.push(format!(
                    "gross_profit disagrees with revenue less cost_of_sales in fiscal year {}",
                    record.fiscal_year
                ));
            }
        }
    }
}

/// Fiscal year of the first reported value if it is tiny relative to the
/// largest later value.
fn near_zero_base(series: &FinancialTimeSeries, values: &[Option<f64>]) -> Option<i32> {
    let (idx, base) = values
        .iter()
        .enumerate()
        .find_map(|(i, v)| v.map(|x| (i, x)))?;
    let later_peak = values[idx + 1..]
        .iter()
        .flatten()
        .fold(f64::NEG_INFINITY, |acc, &x| acc.max(x));
    let threshold = (later_peak * NEAR_ZERO_BASE_RATIO).max(MIN_DENOMINATOR);
    if later_peak > threshold && base.abs() < threshold {
        Some(series.records()[idx].fiscal_year)
    } else {
        None
    }
}
