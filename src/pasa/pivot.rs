use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use crate::pasa::{MtpasaRecord, RegionId, StpasaRecord};

/// Summed unit availability of one region on one day (latest publication)
#[derive(Debug, Clone, PartialEq)]
pub struct RegionalTotal {
    pub day: NaiveDate,
    pub region: RegionId,
    pub availability_mw: f64,
}

/// Summed unit availability of one region on one day, as published by one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunTotal {
    pub publish_time: NaiveDateTime,
    pub day: NaiveDate,
    pub region: RegionId,
    pub availability_mw: f64,
}

/// Region-level STPASA metrics of one interval from one run
#[derive(Debug, Clone, PartialEq)]
pub struct StpasaPoint {
    pub publish_time: NaiveDateTime,
    pub interval: NaiveDateTime,
    pub region: RegionId,
    pub unconstrained_mw: f64,
    pub constrained_mw: f64,
    pub surplus_reserve_mw: f64,
}

/// NULL availability contributes nothing to a sum
pub fn value_or_zero(value: Option<f64>) -> f64 {
    value.unwrap_or(0.0)
}

/// Group rows by key and sum their values. Every key seen gets an entry, even if all
/// its values were NULL, so a zero total stays distinct from a missing row.
fn sum_by<'a, T: 'a, K: Ord>(
    rows: impl IntoIterator<Item = &'a T>,
    key: impl Fn(&T) -> K,
    value: impl Fn(&T) -> Option<f64>,
) -> BTreeMap<K, f64> {
    let mut sums = BTreeMap::new();
    for row in rows {
        match sums.entry(key(row)) {
            Entry::Vacant(slot) => {
                slot.insert(value_or_zero(value(row)));
            }
            Entry::Occupied(mut slot) => *slot.get_mut() += value_or_zero(value(row)),
        }
    }
    sums
}

/// Region totals per day from a latest-only record set, ordered by (day, region)
pub fn regional_totals(records: &[MtpasaRecord]) -> Vec<RegionalTotal> {
    sum_by(
        records,
        |r: &MtpasaRecord| (r.day, r.region.clone()),
        |r: &MtpasaRecord| r.availability_mw,
    )
    .into_iter()
    .map(|((day, region), availability_mw)| RegionalTotal {
        day,
        region,
        availability_mw,
    })
    .collect()
}

/// Region totals per day and publish run, ordered by (publish time, day, region)
pub fn run_totals(records: &[MtpasaRecord]) -> Vec<RunTotal> {
    sum_by(
        records,
        |r: &MtpasaRecord| (r.publish_time, r.day, r.region.clone()),
        |r: &MtpasaRecord| r.availability_mw,
    )
    .into_iter()
    .map(|((publish_time, day, region), availability_mw)| RunTotal {
        publish_time,
        day,
        region,
        availability_mw,
    })
    .collect()
}

/// STPASA is already region-level; values pass through with NULLs read as zero.
/// Ordered by (publish time, interval, region).
pub fn stpasa_points(records: &[StpasaRecord]) -> Vec<StpasaPoint> {
    let mut points: Vec<StpasaPoint> = records
        .iter()
        .map(|r| StpasaPoint {
            publish_time: r.publish_time,
            interval: r.interval,
            region: r.region.clone(),
            unconstrained_mw: value_or_zero(r.unconstrained_capacity),
            constrained_mw: value_or_zero(r.constrained_capacity),
            surplus_reserve_mw: value_or_zero(r.surplus_reserve),
        })
        .collect();

    points.sort_by(|a, b| {
        (a.publish_time, a.interval, &a.region).cmp(&(b.publish_time, b.interval, &b.region))
    });
    points
}

/// Distinct publish times in ascending order, keeping only the most recent `limit`
pub fn recent_publish_times(
    times: impl IntoIterator<Item = NaiveDateTime>,
    limit: usize,
) -> Vec<NaiveDateTime> {
    let mut distinct: Vec<NaiveDateTime> = times.into_iter().collect();
    distinct.sort();
    distinct.dedup();
    let skip = distinct.len().saturating_sub(limit);
    distinct.split_off(skip)
}
