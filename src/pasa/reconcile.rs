use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::BTreeMap;
use tracing::debug;

use crate::pasa::Revision;

/// Default lookback applied to per-publish-run comparisons
pub const DEFAULT_LOOKBACK_DAYS: u64 = 7;

/// Keep only the most recently published record for each forecast target.
///
/// Records are stably sorted by (publish time, target) and the last one per target wins,
/// so duplicates sharing a publish time resolve to whichever came last in the input.
/// The result is ordered by target.
pub fn reconcile_latest<R: Revision>(records: Vec<R>) -> Vec<R> {
    let input = records.len();
    let mut latest: BTreeMap<R::Target, R> = BTreeMap::new();
    for record in sorted_by_revision(records) {
        latest.insert(record.target(), record);
    }
    debug!(input, output = latest.len(), "latest-only reconciliation");
    latest.into_values().collect()
}

/// Keep one record per (publish time, target), preserving every distinct publish run.
///
/// Values are not carried forward between runs: a run that republishes only part of
/// the units contains only those units. The result is ordered by (publish time, target).
pub fn reconcile_per_run<R: Revision>(records: Vec<R>) -> Vec<R> {
    let input = records.len();
    let mut per_run: BTreeMap<(NaiveDateTime, R::Target), R> = BTreeMap::new();
    for record in sorted_by_revision(records) {
        per_run.insert((record.publish_time(), record.target()), record);
    }
    debug!(input, output = per_run.len(), "per-publish-run reconciliation");
    per_run.into_values().collect()
}

fn sorted_by_revision<R: Revision>(mut records: Vec<R>) -> Vec<R> {
    // sort_by_cached_key is stable, ties keep their input order
    records.sort_by_cached_key(|r| (r.publish_time(), r.target()));
    records
}

/// Date-relative filters applied before aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForecastWindow {
    pub today: NaiveDate,
    pub lookback_days: u64,
}

impl ForecastWindow {
    pub fn new(today: NaiveDate, lookback_days: u64) -> Self {
        Self {
            today,
            lookback_days,
        }
    }

    /// Midnight at the start of yesterday. Horizons at or before it are in the past.
    pub fn cutoff(&self) -> NaiveDateTime {
        self.today
            .checked_sub_days(Days::new(1))
            .unwrap_or(NaiveDate::MIN)
            .and_time(NaiveTime::MIN)
    }

    /// Earliest publish time kept for per-publish-run comparisons
    pub fn lookback_start(&self) -> NaiveDateTime {
        self.today
            .checked_sub_days(Days::new(self.lookback_days))
            .unwrap_or(NaiveDate::MIN)
            .and_time(NaiveTime::MIN)
    }

    pub fn retain_horizon<R: Revision>(&self, mut records: Vec<R>) -> Vec<R> {
        let cutoff = self.cutoff();
        records.retain(|r| r.horizon() > cutoff);
        records
    }

    pub fn retain_lookback<R: Revision>(&self, mut records: Vec<R>) -> Vec<R> {
        let start = self.lookback_start();
        records.retain(|r| r.publish_time() >= start);
        records
    }

    /// Latest-only view of forecasts that are not yet in the past
    pub fn latest<R: Revision>(&self, records: Vec<R>) -> Vec<R> {
        reconcile_latest(self.retain_horizon(records))
    }

    /// Per-publish-run view over the lookback window, past horizons removed
    pub fn per_run<R: Revision>(&self, records: Vec<R>) -> Vec<R> {
        reconcile_per_run(self.retain_horizon(self.retain_lookback(records)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pasa::{MtpasaRecord, StpasaRecord};
    use proptest::prelude::*;
    use rstest::rstest;

    fn at(date: (i32, u32, u32), hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(date.0, date.1, date.2)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn mtpasa(publish: NaiveDateTime, day: (i32, u32, u32), unit: &str, mw: f64) -> MtpasaRecord {
        MtpasaRecord {
            publish_time: publish,
            day: NaiveDate::from_ymd_opt(day.0, day.1, day.2).unwrap(),
            region: "NSW1".to_string(),
            unit: unit.to_string(),
            availability_mw: Some(mw),
            latest_offer: None,
            last_changed: None,
        }
    }

    fn scenario() -> Vec<MtpasaRecord> {
        vec![
            mtpasa(at((2024, 1, 1), 9), (2024, 1, 2), "A", 100.0),
            mtpasa(at((2024, 1, 1), 9), (2024, 1, 2), "B", 50.0),
            mtpasa(at((2024, 1, 1), 12), (2024, 1, 2), "A", 80.0),
        ]
    }

    #[test]
    fn test_latest_keeps_most_recent_revision() {
        let latest = reconcile_latest(scenario());
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].unit, "A");
        assert_eq!(latest[0].availability_mw, Some(80.0));
        assert_eq!(latest[1].unit, "B");
        assert_eq!(latest[1].availability_mw, Some(50.0));
    }

    #[test]
    fn test_per_run_keeps_every_publish_run() {
        let per_run = reconcile_per_run(scenario());
        assert_eq!(per_run.len(), 3);
        assert_eq!(per_run[0].publish_time, at((2024, 1, 1), 9));
        assert_eq!(per_run[2].publish_time, at((2024, 1, 1), 12));
        assert_eq!(per_run[2].availability_mw, Some(80.0));
    }

    #[test]
    fn test_duplicates_within_a_run_keep_last() {
        let records = vec![
            mtpasa(at((2024, 1, 1), 9), (2024, 1, 2), "A", 1.0),
            mtpasa(at((2024, 1, 1), 9), (2024, 1, 2), "A", 2.0),
        ];
        let latest = reconcile_latest(records.clone());
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].availability_mw, Some(2.0));

        let per_run = reconcile_per_run(records);
        assert_eq!(per_run.len(), 1);
        assert_eq!(per_run[0].availability_mw, Some(2.0));
    }

    #[test]
    fn test_empty_input() {
        assert!(reconcile_latest(Vec::<MtpasaRecord>::new()).is_empty());
        assert!(reconcile_per_run(Vec::<StpasaRecord>::new()).is_empty());
        let window = ForecastWindow::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 7);
        assert!(window.per_run(Vec::<MtpasaRecord>::new()).is_empty());
    }

    #[rstest]
    #[case((2023, 12, 30), false)]
    #[case((2023, 12, 31), false)]
    #[case((2024, 1, 1), true)]
    #[case((2024, 1, 2), true)]
    fn test_horizon_boundary(#[case] day: (i32, u32, u32), #[case] kept: bool) {
        let window = ForecastWindow::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 7);
        let records = vec![mtpasa(at((2023, 12, 20), 9), day, "A", 10.0)];
        assert_eq!(window.retain_horizon(records).len() == 1, kept);
    }

    #[rstest]
    #[case(at((2023, 12, 31), 0), false)]
    #[case(at((2023, 12, 31), 6), true)]
    #[case(at((2024, 1, 1), 0), true)]
    fn test_stpasa_interval_boundary(#[case] interval: NaiveDateTime, #[case] kept: bool) {
        let window = ForecastWindow::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 7);
        let records = vec![StpasaRecord {
            publish_time: at((2023, 12, 30), 12),
            interval,
            region: "QLD1".to_string(),
            unconstrained_capacity: Some(1.0),
            constrained_capacity: Some(1.0),
            surplus_reserve: Some(1.0),
        }];
        assert_eq!(window.retain_horizon(records).len() == 1, kept);
    }

    #[rstest]
    #[case(at((2023, 12, 24), 23), false)]
    #[case(at((2023, 12, 25), 0), true)]
    #[case(at((2023, 12, 31), 12), true)]
    fn test_lookback_boundary(#[case] publish: NaiveDateTime, #[case] kept: bool) {
        let window = ForecastWindow::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 7);
        let records = vec![mtpasa(publish, (2024, 1, 5), "A", 10.0)];
        assert_eq!(window.retain_lookback(records).len() == 1, kept);
    }

    #[test]
    fn test_window_per_run_applies_both_filters() {
        let window = ForecastWindow::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 7);
        let records = vec![
            mtpasa(at((2023, 12, 1), 9), (2024, 1, 2), "A", 1.0),
            mtpasa(at((2023, 12, 30), 9), (2023, 12, 31), "A", 2.0),
            mtpasa(at((2023, 12, 30), 9), (2024, 1, 2), "A", 3.0),
        ];
        let kept = window.per_run(records);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].availability_mw, Some(3.0));
    }

    fn arb_records() -> impl Strategy<Value = Vec<MtpasaRecord>> {
        prop::collection::vec((0u32..4, 0u32..3, 0usize..3, 0u32..2, 0.0f64..500.0), 0..40)
            .prop_map(|rows| {
                let units = ["A", "B", "C"];
                let regions = ["NSW1", "VIC1"];
                rows.into_iter()
                    .map(|(hour, day, unit, region, mw)| MtpasaRecord {
                        publish_time: at((2024, 1, 1), hour * 3),
                        day: NaiveDate::from_ymd_opt(2024, 1, 2 + day).unwrap(),
                        region: regions[region as usize].to_string(),
                        unit: units[unit].to_string(),
                        availability_mw: Some(mw.round()),
                        latest_offer: None,
                        last_changed: None,
                    })
                    .collect::<Vec<_>>()
            })
            .prop_map(|records| reconcile_per_run(records))
    }

    // Unique (publish time, target) keys, so the tie-break never applies
    fn shuffled_records() -> impl Strategy<Value = (Vec<MtpasaRecord>, Vec<MtpasaRecord>)> {
        arb_records()
            .prop_flat_map(|records| (Just(records.clone()), Just(records).prop_shuffle()))
    }

    proptest! {
        #[test]
        fn prop_latest_is_idempotent(records in arb_records()) {
            let once = reconcile_latest(records);
            let twice = reconcile_latest(once.clone());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_latest_ignores_input_order((records, shuffled) in shuffled_records()) {
            prop_assert_eq!(reconcile_latest(records), reconcile_latest(shuffled));
        }

        #[test]
        fn prop_per_run_is_idempotent(records in arb_records()) {
            let once = reconcile_per_run(records);
            prop_assert_eq!(reconcile_per_run(once.clone()), once);
        }
    }
}
