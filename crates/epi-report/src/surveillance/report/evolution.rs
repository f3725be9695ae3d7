use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use super::ReportError;
use crate::surveillance::domain::Patient;

/// Cumulative count of positive patients per calendar day.
///
/// Every day between the first and last positive sample is present, and
/// iteration is in ascending date order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EvolutionSeries {
    days: BTreeMap<NaiveDate, u64>,
}

impl EvolutionSeries {
    /// Builds the series for an already-filtered patient population.
    ///
    /// The range spans every positive sample of the population; each patient
    /// adds one to the day of their earliest positive sample.
    pub fn build<'a, I>(patients: I) -> Result<Self, ReportError>
    where
        I: IntoIterator<Item = &'a Patient>,
    {
        let mut range: Option<(NaiveDate, NaiveDate)> = None;
        let mut first_positives = Vec::new();

        for patient in patients {
            for day in patient.positive_sample_dates() {
                range = Some(match range {
                    Some((begin, end)) => (begin.min(day), end.max(day)),
                    None => (day, day),
                });
            }
            if let Some(first) = patient.first_positive_sample() {
                first_positives.push(first);
            }
        }

        let (begin, end) = range.ok_or(ReportError::NoPositiveCases)?;
        Ok(Self::accumulate(begin, end, first_positives))
    }

    /// Zero-fills `[begin, end]`, buckets the dates and takes the running sum.
    pub fn accumulate<I>(begin: NaiveDate, end: NaiveDate, first_positives: I) -> Self
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        let mut buckets: BTreeMap<NaiveDate, u64> = BTreeMap::new();
        let mut day = begin;
        while day <= end {
            buckets.insert(day, 0);
            day += Duration::days(1);
        }

        for date in first_positives {
            if let Some(bucket) = buckets.get_mut(&date) {
                *bucket += 1;
            }
        }

        let mut running = 0;
        let days = buckets
            .into_iter()
            .map(|(day, added)| {
                running += added;
                (day, running)
            })
            .collect();

        Self { days }
    }

    pub fn days(&self) -> &BTreeMap<NaiveDate, u64> {
        &self.days
    }

    pub fn total(&self) -> u64 {
        self.days.values().next_back().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

/// Non-cumulative positives per result day, as shown next to the operator evolution chart.
pub fn positives_per_result_day<I>(results: I) -> BTreeMap<NaiveDate, u64>
where
    I: IntoIterator<Item = NaiveDate>,
{
    let mut per_day = BTreeMap::new();
    for day in results {
        *per_day.entry(day).or_insert(0) += 1;
    }
    per_day
}
