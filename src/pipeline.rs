use tracing::info;

use crate::chart::{
    Chart, StpasaMetric, availability_delta_chart, stpasa_delta_chart, total_availability_chart,
};
use crate::pasa::pivot::{regional_totals, run_totals, stpasa_points};
use crate::pasa::reconcile::ForecastWindow;
use crate::pasa::{MtpasaRecord, StpasaRecord};

pub struct MtpasaCharts {
    pub total: Chart,
    pub delta: Chart,
}

/// Latest total availability and the change across recent publish runs
pub fn mtpasa_charts(
    records: Vec<MtpasaRecord>,
    window: &ForecastWindow,
    recent_runs: usize,
) -> MtpasaCharts {
    let latest = window.latest(records.clone());
    let totals = regional_totals(&latest);
    info!(units = latest.len(), rows = totals.len(), "MTPASA latest totals");

    let per_run = window.per_run(records);
    let deltas = run_totals(&per_run);
    info!(units = per_run.len(), rows = deltas.len(), "MTPASA publish run totals");

    MtpasaCharts {
        total: total_availability_chart(&totals),
        delta: availability_delta_chart(&deltas, recent_runs),
    }
}

/// Unconstrained capacity, constrained capacity and surplus reserve across recent publish runs
pub fn stpasa_charts(
    records: Vec<StpasaRecord>,
    window: &ForecastWindow,
    recent_runs: usize,
) -> Vec<Chart> {
    let points = stpasa_points(&window.per_run(records));
    info!(rows = points.len(), "STPASA publish run points");

    [
        StpasaMetric::Unconstrained,
        StpasaMetric::Constrained,
        StpasaMetric::SurplusReserve,
    ]
    .into_iter()
    .map(|metric| stpasa_delta_chart(&points, metric, recent_runs))
    .collect()
}
