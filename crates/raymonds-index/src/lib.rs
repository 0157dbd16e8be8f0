//! RaymondsIndex: composite capital-allocation scoring over a company's
//! multi-period financial statements.
//!
//! Pipeline: [`DataValidator`] → four [`SubIndexCalculator`]s (CEI, RII, CGI,
//! MAI) → [`Aggregator`]. Every stage is a deterministic pure function of the
//! input series.

pub mod aggregator;
pub mod calculators;
pub mod config;
pub mod persistence;
pub mod validator;
#[cfg(test)]
mod tests;

use std::collections::BTreeMap;

use analysis_core::{
    AnalysisError, FinancialTimeSeries, RaymondsIndexResult, SubIndex, SubIndexCalculator, SubIndexResult, SubScores,
    ValidationResult,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub use aggregator::{Aggregator, ExtraSignals, OverrideRule};
pub use calculators::{
    CapitalEfficiencyCalculator, CashGovernanceCalculator, MomentumAlignmentCalculator,
    ReinvestmentIntensityCalculator,
};
pub use config::{AggregationMethod, IndexConfig};
pub use persistence::PersistedIndexRecord;
pub use validator::DataValidator;

/// Everything produced by one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexReport {
    pub company_id: String,
    pub fiscal_year: i32,
    pub fiscal_quarter: Option<u8>,
    pub result: RaymondsIndexResult,
    pub validation: ValidationResult,
    pub sub_results: BTreeMap<SubIndex, SubIndexResult>,
    pub signals: ExtraSignals,
}

pub struct RaymondsIndexEngine {
    config: IndexConfig,
    validator: DataValidator,
    calculators: Vec<Box<dyn SubIndexCalculator>>,
    aggregator: Aggregator,
}

impl RaymondsIndexEngine {
    pub fn new() -> Self {
        Self::with_config(IndexConfig::default())
    }

    pub fn with_config(config: IndexConfig) -> Self {
        let validator = if config.allow_degraded {
            DataValidator::degraded()
        } else {
            DataValidator::new()
        };
        let calculators: Vec<Box<dyn SubIndexCalculator>> = vec![
            Box::new(CapitalEfficiencyCalculator::new()),
            Box::new(ReinvestmentIntensityCalculator::new()),
            Box::new(CashGovernanceCalculator::new()),
            Box::new(MomentumAlignmentCalculator::new(config.winsorize_percentile)),
        ];
        Self {
            aggregator: Aggregator::new(config.aggregation),
            config,
            validator,
            calculators,
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn validate(&self, series: &FinancialTimeSeries) -> ValidationResult {
        self.validator.validate(series)
    }

    /// Runs the four calculators; no validation is applied.
    pub fn calculate_sub_indices(&self, series: &FinancialTimeSeries) -> BTreeMap<SubIndex, SubIndexResult> {
        self.calculators
            .iter()
            .map(|calc| (calc.sub_index(), calc.calculate(series)))
            .collect()
    }

    /// Full pipeline: validate, score the four sub-indices, aggregate.
    ///
    /// Returns `ValidationFailed` when the series cannot be calculated; bad
    /// individual figures never fail the run.
    pub fn calculate(&self, series: &FinancialTimeSeries) -> Result<IndexReport, AnalysisError> {
        let validation = self.validate(series);
        if !validation.can_calculate {
            tracing::warn!(
                "Skipping {}: validation failed ({})",
                series.company_id,
                validation.errors.join("; ")
            );
            return Err(AnalysisError::ValidationFailed {
                errors: validation.errors,
            });
        }
        if !validation.is_valid {
            tracing::warn!(
                "Degraded run for {}: {}",
                series.company_id,
                validation.errors.join("; ")
            );
        }
        let latest = series
            .latest()
            .ok_or_else(|| AnalysisError::InsufficientData("empty financial series".to_string()))?;

        let sub_results = self.calculate_sub_indices(series);
        let scores = SubScores::from_map(
            &sub_results.iter().map(|(k, r)| (*k, r.score)).collect(),
        )?;

        let signals = ExtraSignals::from_series(series)
            .with_sub_results(sub_results.values())
            .with_validation(validation.quality_score, &validation.warnings);
        let result = self.aggregator.aggregate(&scores, &signals);

        tracing::info!(
            "RaymondsIndex for {} ({}): {:.2} grade {} ({} violations)",
            series.company_id,
            latest.fiscal_year,
            result.total_score,
            result.grade,
            result.violation_count
        );

        Ok(IndexReport {
            company_id: series.company_id.clone(),
            fiscal_year: latest.fiscal_year,
            fiscal_quarter: latest.fiscal_quarter,
            result,
            validation,
            sub_results,
            signals,
        })
    }

    /// Scores many companies in parallel; results keep the input order.
    pub fn calculate_batch(
        &self,
        batch: &[FinancialTimeSeries],
    ) -> Vec<(String, Result<IndexReport, AnalysisError>)> {
        tracing::info!("Scoring batch of {} companies", batch.len());
        batch
            .par_iter()
            .map(|series| (series.company_id.clone(), self.calculate(series)))
            .collect()
    }
}

impl Default for RaymondsIndexEngine {
    fn default() -> Self {
        Self::new()
    }
}
