/// Validated daily time series.
///
/// Both the per-catchment precipitation and the per-nexus reference
/// discharge are contiguous daily series: one value per calendar day, no
/// gaps, no NaN. Storing only the start date keeps date lookups O(1).
use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::error::{DisaggError, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySeries {
    start: NaiveDate,
    values: Vec<f64>,
}

impl DailySeries {
    /// Create a series starting at `start` with one value per day.
    ///
    /// Validates:
    /// - the series is non-empty
    /// - no NaN or infinite values
    pub fn new(entity: &str, start: NaiveDate, values: Vec<f64>) -> Result<Self> {
        if values.is_empty() {
            return Err(DisaggError::invalid_input(entity, "series is empty"));
        }
        if let Some(i) = values.iter().position(|v| !v.is_finite()) {
            return Err(DisaggError::invalid_input(
                entity,
                format!("non-finite value {} at step {}", values[i], i),
            ));
        }
        Ok(Self { start, values })
    }

    /// Build a series from (date, value) pairs.
    ///
    /// Pairs may arrive in any order but must cover consecutive days
    /// exactly once; a missing or duplicated day is rejected rather than
    /// filled.
    pub fn from_pairs(entity: &str, mut pairs: Vec<(NaiveDate, f64)>) -> Result<Self> {
        if pairs.is_empty() {
            return Err(DisaggError::invalid_input(entity, "series is empty"));
        }
        pairs.sort_by_key(|(d, _)| *d);
        for window in pairs.windows(2) {
            let gap = (window[1].0 - window[0].0).num_days();
            if gap != 1 {
                return Err(DisaggError::invalid_input(
                    entity,
                    format!(
                        "series is not contiguous between {} and {}",
                        window[0].0, window[1].0
                    ),
                ));
            }
        }
        let start = pairs[0].0;
        Self::new(entity, start, pairs.into_iter().map(|(_, v)| v).collect())
    }

    /// Reject negative samples. Used for source data that must be physical.
    pub fn require_non_negative(&self, entity: &str) -> Result<()> {
        match self.values.iter().position(|&v| v < 0.0) {
            Some(i) => Err(DisaggError::invalid_input(
                entity,
                format!("negative value {} on {}", self.values[i], self.date(i)),
            )),
            None => Ok(()),
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last date covered by the series.
    pub fn end(&self) -> NaiveDate {
        self.date(self.values.len() - 1)
    }

    /// Number of daily steps.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if there are no steps. Never true for a validated series.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Date of step `i`.
    pub fn date(&self, i: usize) -> NaiveDate {
        self.start + Duration::days(i as i64)
    }

    /// Step index of `date`, if it falls inside the series.
    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        let offset = (date - self.start).num_days();
        if offset < 0 || offset as usize >= self.values.len() {
            None
        } else {
            Some(offset as usize)
        }
    }

    /// Value on `date`, if covered.
    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.index_of(date).map(|i| self.values[i])
    }

    /// Iterate (date, value) pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(move |(i, &v)| (self.date(i), v))
    }

    /// Whether every date of `other` is also covered by `self`.
    pub fn covers(&self, other: &DailySeries) -> bool {
        self.start <= other.start && other.end() <= self.end()
    }
}
