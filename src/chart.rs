use chrono::{NaiveDateTime, NaiveTime};
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};

use crate::pasa::RegionId;
use crate::pasa::pivot::{RegionalTotal, RunTotal, StpasaPoint, recent_publish_times};
use crate::pasa::regions;

const DAY_FORMAT: &str = "%Y-%m-%d";
const INTERVAL_FORMAT: &str = "%Y-%m-%d %H:%M";
const PUBLISH_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DELTA_HINTS: [&str; 2] = [
    "Click a legend entry to hide a publish run, double-click to compare one run alone",
    "Use mouse wheel to zoom on chart, double-click to reset",
];

/// One line on a chart
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub region: RegionId,
    pub points: Vec<(NaiveDateTime, f64)>,
}

/// How series relate to the categorical dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    /// One series per region
    RegionTotals,
    /// One series per publish run and region, with a region selector
    PublishRunDelta,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub id: String,
    pub title: String,
    pub subtitle: Vec<String>,
    pub x_title: String,
    pub y_title: String,
    pub x_format: &'static str,
    pub kind: ChartKind,
    pub series: Vec<Series>,
}

/// Selection of series by region and by series name. `None` selects everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesFilter {
    pub regions: Option<BTreeSet<RegionId>>,
    pub names: Option<BTreeSet<String>>,
}

impl SeriesFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn regions<I, S>(regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<RegionId>,
    {
        Self {
            regions: Some(regions.into_iter().map(Into::into).collect()),
            names: None,
        }
    }

    /// Further restrict to the given series names
    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn accepts(&self, series: &Series) -> bool {
        let region_ok = self
            .regions
            .as_ref()
            .is_none_or(|regions| regions.contains(&series.region));
        let name_ok = self
            .names
            .as_ref()
            .is_none_or(|names| names.contains(&series.name));
        region_ok && name_ok
    }
}

/// Which STPASA column a delta chart plots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StpasaMetric {
    Unconstrained,
    Constrained,
    SurplusReserve,
}

impl StpasaMetric {
    fn value(&self, point: &StpasaPoint) -> f64 {
        match self {
            StpasaMetric::Unconstrained => point.unconstrained_mw,
            StpasaMetric::Constrained => point.constrained_mw,
            StpasaMetric::SurplusReserve => point.surplus_reserve_mw,
        }
    }

    fn chart_id(&self) -> &'static str {
        match self {
            StpasaMetric::Unconstrained => "stpasa-unconstrained",
            StpasaMetric::Constrained => "stpasa-constrained",
            StpasaMetric::SurplusReserve => "stpasa-reserve",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            StpasaMetric::Unconstrained => "STPASA Delta",
            StpasaMetric::Constrained => "Constrained Capacity Delta",
            StpasaMetric::SurplusReserve => "Reserve Delta",
        }
    }

    fn axis_title(&self) -> &'static str {
        match self {
            StpasaMetric::Unconstrained => "Unconstrained Capacity (MW)",
            StpasaMetric::Constrained => "Constrained Capacity (MW)",
            StpasaMetric::SurplusReserve => "Surplus Reserve (MW)",
        }
    }
}

/// Latest MTPASA availability, one series per region
pub fn total_availability_chart(totals: &[RegionalTotal]) -> Chart {
    let mut by_region: BTreeMap<(usize, String), Series> = BTreeMap::new();
    for total in totals {
        by_region
            .entry(regions::sort_key(&total.region))
            .or_insert_with(|| Series {
                name: regions::display_name(&total.region),
                region: total.region.clone(),
                points: Vec::new(),
            })
            .points
            .push((total.day.and_time(NaiveTime::MIN), total.availability_mw));
    }

    let mut series: Vec<Series> = by_region.into_values().collect();
    for s in &mut series {
        s.points.sort_by_key(|(x, _)| *x);
    }

    Chart {
        id: "mtpasa-total".to_string(),
        title: "MTPASA".to_string(),
        subtitle: vec!["Total availability, latest publication per unit".to_string()],
        x_title: "Day".to_string(),
        y_title: "PASA Availability (MW)".to_string(),
        x_format: DAY_FORMAT,
        kind: ChartKind::RegionTotals,
        series,
    }
}

/// MTPASA regional availability as published by each of the most recent runs
pub fn availability_delta_chart(totals: &[RunTotal], recent_runs: usize) -> Chart {
    let rows = totals.iter().map(|t| {
        (
            t.publish_time,
            t.day.and_time(NaiveTime::MIN),
            &t.region,
            t.availability_mw,
        )
    });

    Chart {
        id: "mtpasa-delta".to_string(),
        title: "MTPASA Delta".to_string(),
        subtitle: DELTA_HINTS.iter().map(|s| s.to_string()).collect(),
        x_title: "Day".to_string(),
        y_title: "PASA Availability (MW)".to_string(),
        x_format: DAY_FORMAT,
        kind: ChartKind::PublishRunDelta,
        series: publish_run_series(rows, recent_runs),
    }
}

/// One STPASA metric as published by each of the most recent runs
pub fn stpasa_delta_chart(
    points: &[StpasaPoint],
    metric: StpasaMetric,
    recent_runs: usize,
) -> Chart {
    let rows = points
        .iter()
        .map(|p| (p.publish_time, p.interval, &p.region, metric.value(p)));

    Chart {
        id: metric.chart_id().to_string(),
        title: metric.title().to_string(),
        subtitle: DELTA_HINTS.iter().map(|s| s.to_string()).collect(),
        x_title: "Interval".to_string(),
        y_title: metric.axis_title().to_string(),
        x_format: INTERVAL_FORMAT,
        kind: ChartKind::PublishRunDelta,
        series: publish_run_series(rows, recent_runs),
    }
}

fn publish_run_series<'a>(
    rows: impl Iterator<Item = (NaiveDateTime, NaiveDateTime, &'a RegionId, f64)>,
    recent_runs: usize,
) -> Vec<Series> {
    let rows: Vec<_> = rows.collect();
    let runs: BTreeSet<NaiveDateTime> =
        recent_publish_times(rows.iter().map(|(publish, ..)| *publish), recent_runs)
            .into_iter()
            .collect();

    let mut grouped: BTreeMap<(NaiveDateTime, (usize, String)), Series> = BTreeMap::new();
    for (publish, x, region, value) in rows {
        if !runs.contains(&publish) {
            continue;
        }
        grouped
            .entry((publish, regions::sort_key(region)))
            .or_insert_with(|| Series {
                name: publish.format(PUBLISH_FORMAT).to_string(),
                region: region.clone(),
                points: Vec::new(),
            })
            .points
            .push((x, value));
    }

    let mut series: Vec<Series> = grouped.into_values().collect();
    for s in &mut series {
        s.points.sort_by_key(|(x, _)| *x);
    }
    series
}

impl Chart {
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Distinct regions in market order
    pub fn regions(&self) -> Vec<RegionId> {
        let mut ids: Vec<RegionId> = self
            .series
            .iter()
            .map(|s| s.region.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        ids.sort_by_key(|r| regions::sort_key(r));
        ids
    }

    /// Distinct series names in order of first appearance
    pub fn names(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.series
            .iter()
            .filter(|s| seen.insert(s.name.as_str()))
            .map(|s| s.name.clone())
            .collect()
    }

    /// Per-series visibility flags for a selection, in series order
    pub fn visibility(&self, filter: &SeriesFilter) -> Vec<bool> {
        self.series.iter().map(|s| filter.accepts(s)).collect()
    }

    pub fn filtered(&self, filter: &SeriesFilter) -> Vec<&Series> {
        self.series.iter().filter(|s| filter.accepts(s)).collect()
    }

    /// Region shown when the chart loads: the preferred one if present, else the first
    pub fn initial_region(&self, preferred: &str) -> Option<RegionId> {
        let ids = self.regions();
        ids.iter()
            .find(|r| r.as_str() == preferred)
            .or_else(|| ids.first())
            .cloned()
    }

    fn initial_filter(&self, preferred_region: &str) -> SeriesFilter {
        match (self.kind, self.initial_region(preferred_region)) {
            (ChartKind::PublishRunDelta, Some(region)) => SeriesFilter::regions([region]),
            _ => SeriesFilter::all(),
        }
    }

    /// Plotly trace and layout JSON for embedding in a page
    pub fn to_plotly(&self, preferred_region: &str) -> (String, String) {
        let visible = self.visibility(&self.initial_filter(preferred_region));

        let traces: Vec<Value> = self
            .series
            .iter()
            .zip(&visible)
            .map(|(series, visible)| {
                let x: Vec<String> = series
                    .points
                    .iter()
                    .map(|(x, _)| x.format(self.x_format).to_string())
                    .collect();
                let y: Vec<f64> = series.points.iter().map(|(_, y)| *y).collect();
                json!({
                    "x": x,
                    "y": y,
                    "name": series.name,
                    "legendgroup": series.name,
                    "type": "scatter",
                    "mode": "lines",
                    "visible": visible,
                    "line": { "width": 2 }
                })
            })
            .collect();

        let mut title = self.title.clone();
        for line in &self.subtitle {
            title.push_str(&format!("<br><sub>{line}</sub>"));
        }

        let mut layout = json!({
            "title": {
                "text": title,
                "font": { "size": 20 }
            },
            "xaxis": { "title": { "text": self.x_title } },
            "yaxis": { "title": { "text": self.y_title } },
            "hovermode": "closest",
            "height": 600,
            "margin": { "t": 120 },
            "plot_bgcolor": "rgb(250, 250, 250)",
            "paper_bgcolor": "white",
            "showlegend": true,
            "legend": {
                "bgcolor": "rgba(255, 255, 255, 0.8)",
                "bordercolor": "rgba(0, 0, 0, 0.2)",
                "borderwidth": 1
            }
        });

        if self.kind == ChartKind::PublishRunDelta {
            layout["updatemenus"] = self.region_selector(preferred_region);
        }

        (script_safe(Value::Array(traces)), script_safe(layout))
    }

    /// Dropdown restyling trace visibility to one region at a time
    fn region_selector(&self, preferred_region: &str) -> Value {
        let choices = self.regions();
        let active = self
            .initial_region(preferred_region)
            .and_then(|initial| choices.iter().position(|r| *r == initial))
            .unwrap_or(0);

        let buttons: Vec<Value> = choices
            .iter()
            .map(|region| {
                let visible = self.visibility(&SeriesFilter::regions([region.as_str()]));
                json!({
                    "label": regions::display_name(region),
                    "method": "restyle",
                    "args": [{ "visible": visible }]
                })
            })
            .collect();

        json!([{
            "type": "dropdown",
            "direction": "down",
            "active": active,
            "buttons": buttons,
            "x": 1.0,
            "xanchor": "right",
            "y": 1.12,
            "yanchor": "bottom"
        }])
    }
}

// JSON placed inside a <script> element must not close it
fn script_safe(value: Value) -> String {
    value.to_string().replace("</", "<\\/")
}
