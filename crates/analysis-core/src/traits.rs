use crate::{FinancialTimeSeries, SubIndex, SubIndexResult};

/// Common contract for the four sub-index calculators.
///
/// Implementations are pure: they read the series, never mutate shared state,
/// and never fail on missing optional data. Absent inputs degrade the affected
/// component to a neutral score instead.
pub trait SubIndexCalculator: Send + Sync {
    /// Which sub-index this calculator produces.
    fn sub_index(&self) -> SubIndex;

    fn calculate(&self, series: &FinancialTimeSeries) -> SubIndexResult;
}
