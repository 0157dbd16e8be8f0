use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::AnalysisError;

/// One fiscal period of company financials, all amounts in a single base unit.
///
/// Every line item is optional because source filings may omit it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialRecord {
    pub fiscal_year: i32,
    /// 1-4 for quarterly filings, `None` for annual.
    #[serde(default)]
    pub fiscal_quarter: Option<u8>,
    #[serde(default)]
    pub period_end: Option<NaiveDate>,

    // Balance sheet
    #[serde(default)]
    pub total_assets: Option<f64>,
    #[serde(default)]
    pub total_equity: Option<f64>,
    #[serde(default)]
    pub total_liabilities: Option<f64>,
    #[serde(default)]
    pub cash_and_equivalents: Option<f64>,
    #[serde(default)]
    pub short_term_investments: Option<f64>,
    #[serde(default)]
    pub tangible_assets: Option<f64>,

    // Income statement
    #[serde(default)]
    pub revenue: Option<f64>,
    #[serde(default)]
    pub cost_of_sales: Option<f64>,
    #[serde(default)]
    pub gross_profit: Option<f64>,
    #[serde(default)]
    pub operating_income: Option<f64>,
    #[serde(default)]
    pub net_income: Option<f64>,
    #[serde(default)]
    pub depreciation: Option<f64>,

    // Cash flow statement
    #[serde(default)]
    pub operating_cash_flow: Option<f64>,
    #[serde(default)]
    pub investing_cash_flow: Option<f64>,
    #[serde(default)]
    pub financing_cash_flow: Option<f64>,
    /// Usually reported as a negative outflow; calculators use its magnitude.
    #[serde(default)]
    pub capex: Option<f64>,
    #[serde(default)]
    pub dividend_paid: Option<f64>,
}

impl FinancialRecord {
    pub fn annual(fiscal_year: i32) -> Self {
        Self {
            fiscal_year,
            ..Default::default()
        }
    }

    pub fn quarterly(fiscal_year: i32, fiscal_quarter: u8) -> Self {
        Self {
            fiscal_year,
            fiscal_quarter: Some(fiscal_quarter),
            ..Default::default()
        }
    }

    /// Position of the period on a continuous year axis (Q1 = +0.0, Q4 = +0.75).
    pub fn period_position(&self) -> f64 {
        let quarter_offset = self
            .fiscal_quarter
            .map(|q| (q.clamp(1, 4) - 1) as f64 * 0.25)
            .unwrap_or(0.0);
        self.fiscal_year as f64 + quarter_offset
    }

    /// NaN and infinite figures carry no information; treat them as unreported.
    fn scrub_non_finite(&mut self) {
        for value in [
            &mut self.total_assets,
            &mut self.total_equity,
            &mut self.total_liabilities,
            &mut self.cash_and_equivalents,
            &mut self.short_term_investments,
            &mut self.tangible_assets,
            &mut self.revenue,
            &mut self.cost_of_sales,
            &mut self.gross_profit,
            &mut self.operating_income,
            &mut self.net_income,
            &mut self.depreciation,
            &mut self.operating_cash_flow,
            &mut self.investing_cash_flow,
            &mut self.financing_cash_flow,
            &mut self.capex,
            &mut self.dividend_paid,
        ] {
            if value.is_some_and(|v| !v.is_finite()) {
                *value = None;
            }
        }
    }

    fn sort_key(&self) -> (i32, u8) {
        (self.fiscal_year, self.fiscal_quarter.unwrap_or(0))
    }

    /// Cash plus short-term financial instruments. `None` only if both are absent.
    pub fn cash_balance(&self) -> Option<f64> {
        match (self.cash_and_equivalents, self.short_term_investments) {
            (None, None) => None,
            (cash, st) => Some(cash.unwrap_or(0.0) + st.unwrap_or(0.0)),
        }
    }

    pub fn get(&self, field: FinancialField) -> Option<f64> {
        let value = match field {
            FinancialField::TotalAssets => self.total_assets,
            FinancialField::TotalEquity => self.total_equity,
            FinancialField::TotalLiabilities => self.total_liabilities,
            FinancialField::CashAndEquivalents => self.cash_and_equivalents,
            FinancialField::ShortTermInvestments => self.short_term_investments,
            FinancialField::TangibleAssets => self.tangible_assets,
            FinancialField::Revenue => self.revenue,
            FinancialField::CostOfSales => self.cost_of_sales,
            FinancialField::GrossProfit => self.gross_profit,
            FinancialField::OperatingIncome => self.operating_income,
            FinancialField::NetIncome => self.net_income,
            FinancialField::Depreciation => self.depreciation,
            FinancialField::OperatingCashFlow => self.operating_cash_flow,
            FinancialField::InvestingCashFlow => self.investing_cash_flow,
            FinancialField::FinancingCashFlow => self.financing_cash_flow,
            FinancialField::Capex => self.capex,
            FinancialField::DividendPaid => self.dividend_paid,
        };
        value.filter(|v| v.is_finite())
    }
}

/// Named line items, used wherever a field must be referred to by name
/// (validation coverage checks, missing-field reports).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinancialField {
    TotalAssets,
    TotalEquity,
    TotalLiabilities,
    CashAndEquivalents,
    ShortTermInvestments,
    TangibleAssets,
    Revenue,
    CostOfSales,
    GrossProfit,
    OperatingIncome,
    NetIncome,
    Depreciation,
    OperatingCashFlow,
    InvestingCashFlow,
    FinancingCashFlow,
    Capex,
    DividendPaid,
}

impl FinancialField {
    pub fn name(&self) -> &'static str {
        match self {
            FinancialField::TotalAssets => "total_assets",
            FinancialField::TotalEquity => "total_equity",
            FinancialField::TotalLiabilities => "total_liabilities",
            FinancialField::CashAndEquivalents => "cash_and_equivalents",
            FinancialField::ShortTermInvestments => "short_term_investments",
            FinancialField::TangibleAssets => "tangible_assets",
            FinancialField::Revenue => "revenue",
            FinancialField::CostOfSales => "cost_of_sales",
            FinancialField::GrossProfit => "gross_profit",
            FinancialField::OperatingIncome => "operating_income",
            FinancialField::NetIncome => "net_income",
            FinancialField::Depreciation => "depreciation",
            FinancialField::OperatingCashFlow => "operating_cash_flow",
            FinancialField::InvestingCashFlow => "investing_cash_flow",
            FinancialField::FinancingCashFlow => "financing_cash_flow",
            FinancialField::Capex => "capex",
            FinancialField::DividendPaid => "dividend_paid",
        }
    }
}

impl fmt::Display for FinancialField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered (oldest to newest) financial history of one company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SeriesInput")]
pub struct FinancialTimeSeries {
    pub company_id: String,
    records: Vec<FinancialRecord>,
}

/// Deserialization goes through [`FinancialTimeSeries::new`].
#[derive(Deserialize)]
struct SeriesInput {
    company_id: String,
    #[serde(default)]
    records: Vec<FinancialRecord>,
}

impl From<SeriesInput> for FinancialTimeSeries {
    fn from(input: SeriesInput) -> Self {
        Self::new(input.company_id, input.records)
    }
}

impl FinancialTimeSeries {
    /// Builds a series, sorting records by (fiscal_year, fiscal_quarter) so
    /// callers may pass them in any order. Non-finite figures are dropped.
    pub fn new(company_id: impl Into<String>, mut records: Vec<FinancialRecord>) -> Self {
        records.iter_mut().for_each(FinancialRecord::scrub_non_finite);
        records.sort_by_key(|r| r.sort_key());
        Self {
            company_id: company_id.into(),
            records,
        }
    }

    pub fn records(&self) -> &[FinancialRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first(&self) -> Option<&FinancialRecord> {
        self.records.first()
    }

    pub fn latest(&self) -> Option<&FinancialRecord> {
        self.records.last()
    }

    /// Elapsed years between the first and latest period (0.0 for < 2 periods).
    pub fn span_years(&self) -> f64 {
        match (self.first(), self.latest()) {
            (Some(first), Some(last)) => (last.period_position() - first.period_position()).max(0.0),
            _ => 0.0,
        }
    }

    /// Number of distinct fiscal years covered.
    pub fn data_years(&self) -> usize {
        self.records
            .iter()
            .map(|r| r.fiscal_year)
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn values(&self, field: FinancialField) -> Vec<Option<f64>> {
        self.records.iter().map(|r| r.get(field)).collect()
    }

    /// Number of periods in which `field` is reported.
    pub fn coverage(&self, field: FinancialField) -> usize {
        self.records.iter().filter(|r| r.get(field).is_some()).count()
    }

    /// Early and late halves of the series. For odd lengths the middle period
    /// belongs to neither half.
    pub fn halves(&self) -> (&[FinancialRecord], &[FinancialRecord]) {
        let half = self.records.len() / 2;
        let early = &self.records[..half];
        let late = &self.records[self.records.len() - half..];
        (early, late)
    }

    /// Years between the midpoints of the early and late halves.
    pub fn halves_distance_years(&self) -> f64 {
        let (early, late) = self.halves();
        if early.is_empty() || late.is_empty() {
            return 0.0;
        }
        let midpoint = |rs: &[FinancialRecord]| {
            rs.iter().map(|r| r.period_position()).sum::<f64>() / rs.len() as f64
        };
        (midpoint(late) - midpoint(early)).max(0.0)
    }

    /// Periods that appear more than once, as (fiscal_year, fiscal_quarter).
    pub fn duplicate_periods(&self) -> Vec<(i32, Option<u8>)> {
        let mut duplicates = Vec::new();
        for pair in self.records.windows(2) {
            if pair[0].sort_key() == pair[1].sort_key() {
                let key = (pair[1].fiscal_year, pair[1].fiscal_quarter);
                if !duplicates.contains(&key) {
                    duplicates.push(key);
                }
            }
        }
        duplicates
    }
}

/// The four sub-indices combined into the total score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SubIndex {
    /// Capital Efficiency
    #[serde(rename = "CEI")]
    Cei,
    /// Reinvestment Intensity
    #[serde(rename = "RII")]
    Rii,
    /// Cash Governance
    #[serde(rename = "CGI")]
    Cgi,
    /// Momentum Alignment
    #[serde(rename = "MAI")]
    Mai,
}

impl SubIndex {
    pub const ALL: [SubIndex; 4] = [SubIndex::Cei, SubIndex::Rii, SubIndex::Cgi, SubIndex::Mai];

    pub fn code(&self) -> &'static str {
        match self {
            SubIndex::Cei => "CEI",
            SubIndex::Rii => "RII",
            SubIndex::Cgi => "CGI",
            SubIndex::Mai => "MAI",
        }
    }
}

impl fmt::Display for SubIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Output of one sub-index calculator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubIndexResult {
    pub sub_index: SubIndex,
    /// Blended score, 0 to 100
    pub score: f64,
    /// Ratios and growth figures before normalization
    pub raw_metrics: BTreeMap<String, f64>,
    /// Per-component scores after normalization (0 to 100)
    pub normalized_metrics: BTreeMap<String, f64>,
}

/// All four sub-index scores; the aggregator's required input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    #[serde(rename = "CEI")]
    pub cei: f64,
    #[serde(rename = "RII")]
    pub rii: f64,
    #[serde(rename = "CGI")]
    pub cgi: f64,
    #[serde(rename = "MAI")]
    pub mai: f64,
}

impl SubScores {
    pub fn get(&self, sub_index: SubIndex) -> f64 {
        match sub_index {
            SubIndex::Cei => self.cei,
            SubIndex::Rii => self.rii,
            SubIndex::Cgi => self.cgi,
            SubIndex::Mai => self.mai,
        }
    }

    /// Builds the aggregate input; every sub-index must be present with a
    /// finite score in 0..=100.
    pub fn from_map(scores: &BTreeMap<SubIndex, f64>) -> Result<Self, AnalysisError> {
        let get = |key: SubIndex| -> Result<f64, AnalysisError> {
            let score = scores
                .get(&key)
                .copied()
                .ok_or(AnalysisError::MissingSubScore(key))?;
            if !score.is_finite() || !(0.0..=100.0).contains(&score) {
                return Err(AnalysisError::InvalidData(format!("{} score {} outside 0..=100", key, score)));
            }
            Ok(score)
        };
        Ok(Self {
            cei: get(SubIndex::Cei)?,
            rii: get(SubIndex::Rii)?,
            cgi: get(SubIndex::Cgi)?,
            mai: get(SubIndex::Mai)?,
        })
    }

    pub fn to_map(&self) -> BTreeMap<SubIndex, f64> {
        SubIndex::ALL.iter().map(|&k| (k, self.get(k))).collect()
    }
}

/// Letter grade, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A++")]
    APlusPlus,
    #[serde(rename = "A+")]
    APlus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A-")]
    AMinus,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "B-")]
    BMinus,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "C")]
    C,
}

/// Descending score thresholds; the first one met decides the grade.
pub const GRADE_THRESHOLDS: [(f64, Grade); 8] = [
    (88.0, Grade::APlusPlus),
    (80.0, Grade::APlus),
    (72.0, Grade::A),
    (64.0, Grade::AMinus),
    (55.0, Grade::BPlus),
    (45.0, Grade::B),
    (35.0, Grade::BMinus),
    (20.0, Grade::CPlus),
];

impl Grade {
    pub fn from_score(score: f64) -> Self {
        GRADE_THRESHOLDS
            .iter()
            .find(|(threshold, _)| score >= *threshold)
            .map(|&(_, grade)| grade)
            .unwrap_or(Grade::C)
    }

    /// Higher is better: A++ = 8 down to C = 0.
    pub fn rank(&self) -> u8 {
        match self {
            Grade::APlusPlus => 8,
            Grade::APlus => 7,
            Grade::A => 6,
            Grade::AMinus => 5,
            Grade::BPlus => 4,
            Grade::B => 3,
            Grade::BMinus => 2,
            Grade::CPlus => 1,
            Grade::C => 0,
        }
    }

    /// Returns `cap` if this grade is better than it, otherwise `self`.
    pub fn capped_at(self, cap: Grade) -> Grade {
        if self.rank() > cap.rank() {
            cap
        } else {
            self
        }
    }

    pub fn is_a_range(&self) -> bool {
        self.rank() >= Grade::AMinus.rank()
    }

    pub fn label(&self) -> &'static str {
        match self {
            Grade::APlusPlus => "A++",
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::AMinus => "A-",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::BMinus => "B-",
            Grade::CPlus => "C+",
            Grade::C => "C",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Verdict of the data validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub can_calculate: bool,
    /// 0 to 100
    pub quality_score: f64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub missing_fields: Vec<String>,
    pub data_years: usize,
}

/// Final graded score handed to persistence/presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaymondsIndexResult {
    pub total_score: f64,
    pub grade: Grade,
    /// Grade implied by `total_score` alone, before override caps.
    pub score_grade: Grade,
    pub sub_scores: SubScores,
    pub violation_count: usize,
    pub red_flags: Vec<String>,
    pub yellow_flags: Vec<String>,
    pub data_quality_score: f64,
    pub validation_warnings: Vec<String>,
    pub verdict: String,
}
