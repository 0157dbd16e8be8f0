#[cfg(test)]
mod pipeline_tests {
    use analysis_core::{AnalysisError, FinancialRecord, FinancialTimeSeries, Grade, SubIndex, SubIndexCalculator};
    use approx::assert_relative_eq;

    use crate::{
        AggregationMethod, CapitalEfficiencyCalculator, IndexConfig, PersistedIndexRecord, RaymondsIndexEngine,
    };

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    /// Every line item scaled by `k` in lockstep; capex is 8% of
    /// revenue and 60% of operating cash flow, payout is 35%.
    fn healthy_record(year: i32, k: f64) -> FinancialRecord {
        FinancialRecord {
            revenue: Some(1500.0 * k),
            total_assets: Some(1000.0 * k),
            tangible_assets: Some(500.0 * k),
            total_equity: Some(600.0 * k),
            total_liabilities: Some(400.0 * k),
            operating_income: Some(250.0 * k),
            depreciation: Some(50.0 * k),
            net_income: Some(150.0 * k),
            operating_cash_flow: Some(200.0 * k),
            capex: Some(-120.0 * k),
            cash_and_equivalents: Some(80.0 * k),
            short_term_investments: Some(20.0 * k),
            dividend_paid: Some(-52.5 * k),
            financing_cash_flow: Some(-60.0 * k),
            ..FinancialRecord::annual(year)
        }
    }

    fn healthy_records(periods: i32, growth: f64) -> Vec<FinancialRecord> {
        (0..periods)
            .map(|i| healthy_record(2019 + i, growth.powi(i)))
            .collect()
    }

    fn healthy_series() -> FinancialTimeSeries {
        FinancialTimeSeries::new("HEALTHY", healthy_records(5, 1.1))
    }

    #[test]
    fn lockstep_growth_grades_in_a_range() {
        init_tracing();
        let report = RaymondsIndexEngine::new().calculate(&healthy_series()).unwrap();
        let rii = &report.sub_results[&SubIndex::Rii];

        assert!(rii.raw_metrics["investment_gap"].abs() < 1e-6);
        assert!(rii.score > 80.0, "RII {}", rii.score);
        assert_eq!(report.result.violation_count, 0);
        assert!(report.result.red_flags.is_empty());
        assert!(report.result.grade.is_a_range(), "grade {}", report.result.grade);
        assert_eq!(report.result.grade, report.result.score_grade);
        assert!(report.result.total_score > 85.0);
        assert_eq!(report.result.data_quality_score, 100.0);
        assert_eq!(report.fiscal_year, 2023);
        assert!(report.result.verdict.starts_with("Excellent"));
    }

    #[test]
    fn near_zero_capex_base_is_guarded() {
        let baseline = RaymondsIndexEngine::new().calculate(&healthy_series()).unwrap();

        let mut records = healthy_records(5, 1.1);
        records[0].capex = Some(-0.001);
        let report = RaymondsIndexEngine::new()
            .calculate(&FinancialTimeSeries::new("SPIKE", records.clone()))
            .unwrap();
        let rii = &report.sub_results[&SubIndex::Rii];
        let capex_growth = rii.raw_metrics["capex_growth"];
        let gap = rii.raw_metrics["investment_gap"];
        assert!((-95.0..=500.0).contains(&capex_growth), "capex_growth {capex_growth}");
        assert!((-100.0..=100.0).contains(&gap), "gap {gap}");
        assert!((report.result.total_score - baseline.result.total_score).abs() < 15.0);
        assert!(report
            .validation
            .warnings
            .iter()
            .any(|w| w.contains("near-zero base capex")));

        // An extreme late value still cannot escape the bounds
        records[4].capex = Some(-2_000_000_000.0);
        let report = RaymondsIndexEngine::new()
            .calculate(&FinancialTimeSeries::new("SPIKE", records))
            .unwrap();
        let rii = &report.sub_results[&SubIndex::Rii];
        assert_eq!(rii.raw_metrics["capex_growth"], 500.0);
        assert_eq!(rii.raw_metrics["investment_gap"], -100.0);
        assert!(report.result.total_score.is_finite());
    }

    #[test]
    fn cash_pile_with_falling_capex_caps_at_c_plus() {
        let rows = [(40.0, 10.0, -100.0), (60.0, 100.0, -80.0), (80.0, 250.0, -60.0), (100.0, 400.0, -40.0)];
        let records = rows
            .iter()
            .enumerate()
            .map(|(i, &(cash, short_term, capex))| FinancialRecord {
                total_assets: Some(1000.0 + 100.0 * i as f64),
                tangible_assets: Some(500.0),
                cash_and_equivalents: Some(cash),
                short_term_investments: Some(short_term),
                capex: Some(capex),
                ..healthy_record(2020 + i as i32, 1.0)
            })
            .collect();
        let report = RaymondsIndexEngine::new()
            .calculate(&FinancialTimeSeries::new("HOARD", records))
            .unwrap();

        assert_eq!(report.result.violation_count, 2);
        assert!(report.result.grade.rank() <= Grade::CPlus.rank());
        assert_eq!(report.result.red_flags.len(), 3);
        assert!(report.signals.capex_trend_declining);
        assert!(report.signals.cash_tangible_ratio.unwrap() > 30.0);
        assert!(report.signals.short_term_ratio.unwrap() > 65.0);
    }

    #[test]
    fn missing_net_income_is_rejected() {
        let records = healthy_records(4, 1.05)
            .into_iter()
            .map(|r| FinancialRecord { net_income: None, ..r })
            .collect();
        let series = FinancialTimeSeries::new("NONI", records);
        let engine = RaymondsIndexEngine::new();

        let validation = engine.validate(&series);
        assert!(!validation.is_valid);
        assert!(!validation.can_calculate);
        assert!(validation.missing_fields.contains(&"net_income".to_string()));

        match engine.calculate(&series) {
            Err(AnalysisError::ValidationFailed { errors }) => {
                assert!(errors.iter().any(|e| e.contains("net_income")))
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn single_period_needs_degraded_mode() {
        let series = FinancialTimeSeries::new("ONE", healthy_records(1, 1.0));

        let validation = RaymondsIndexEngine::new().validate(&series);
        assert_eq!(validation.data_years, 1);
        assert!(validation.errors.iter().any(|e| e.contains("insufficient history")));
        assert!(RaymondsIndexEngine::new().calculate(&series).is_err());

        let config = IndexConfig {
            allow_degraded: true,
            ..IndexConfig::default()
        };
        let report = RaymondsIndexEngine::with_config(config).calculate(&series).unwrap();
        assert!(!report.validation.is_valid);
        assert!(report.result.data_quality_score < 100.0);
        let rii = &report.sub_results[&SubIndex::Rii];
        assert_eq!(rii.normalized_metrics["investment_gap"], 50.0);
        assert!((0.0..=100.0).contains(&report.result.total_score));
    }

    #[test]
    fn pipeline_is_deterministic() {
        let engine = RaymondsIndexEngine::new();
        let first = engine.calculate(&healthy_series()).unwrap();
        let second = engine.calculate(&healthy_series()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.result.total_score.to_bits(), second.result.total_score.to_bits());
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn unordered_input_matches_ordered() {
        let mut shuffled = healthy_records(5, 1.1);
        shuffled.swap(0, 3);
        shuffled.swap(1, 4);
        let engine = RaymondsIndexEngine::new();
        let ordered = engine.calculate(&healthy_series()).unwrap();
        let unordered = engine
            .calculate(&FinancialTimeSeries::new("HEALTHY", shuffled))
            .unwrap();
        assert_eq!(ordered, unordered);
    }

    #[test]
    fn batch_matches_single_runs_in_order() {
        let engine = RaymondsIndexEngine::new();
        let batch = vec![
            healthy_series(),
            FinancialTimeSeries::new("ONE", healthy_records(1, 1.0)),
            FinancialTimeSeries::new("SLOW", healthy_records(4, 1.02)),
        ];
        let results = engine.calculate_batch(&batch);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, "HEALTHY");
        assert_eq!(results[1].0, "ONE");
        assert!(results[1].1.is_err());
        assert_eq!(
            results[2].1.as_ref().unwrap(),
            &engine.calculate(&batch[2]).unwrap()
        );
    }

    #[test]
    fn calculators_are_independent() {
        let series = healthy_series();
        let report = RaymondsIndexEngine::new().calculate(&series).unwrap();
        let standalone = CapitalEfficiencyCalculator::new().calculate(&series);
        assert_eq!(report.sub_results[&SubIndex::Cei], standalone);
        assert_eq!(report.result.sub_scores.cei, standalone.score);
    }

    #[test]
    fn arithmetic_mode_is_at_least_geometric() {
        let mut records = healthy_records(5, 1.1);
        for r in records.iter_mut() {
            r.dividend_paid = Some(-400.0);
        }
        let series = FinancialTimeSeries::new("MIXED", records);
        let geometric = RaymondsIndexEngine::new().calculate(&series).unwrap();
        let arithmetic = RaymondsIndexEngine::with_config(IndexConfig {
            aggregation: AggregationMethod::Arithmetic,
            ..IndexConfig::default()
        })
        .calculate(&series)
        .unwrap();
        assert_eq!(geometric.result.sub_scores, arithmetic.result.sub_scores);
        assert!(arithmetic.result.total_score >= geometric.result.total_score);
        assert!(!geometric.result.yellow_flags.is_empty());
    }

    #[test]
    fn persisted_record_is_rounded() {
        let report = RaymondsIndexEngine::new().calculate(&healthy_series()).unwrap();
        let row = PersistedIndexRecord::from_report(&report);
        assert_eq!(row.company_id, "HEALTHY");
        assert_eq!(row.fiscal_year, 2023);
        assert_eq!(row.grade, report.result.grade);
        assert!(row.total_score.scale() <= 2);
        assert!(row.raw_metrics.values().all(|v| v.scale() <= 2));
        assert!(row.raw_metrics.contains_key("RII.investment_gap"));
        assert_relative_eq!(
            row.total_score.to_string().parse::<f64>().unwrap(),
            report.result.total_score,
            epsilon = 0.005
        );
    }
}
