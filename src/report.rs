use askama::Template;
use chrono::NaiveDate;

use crate::chart::Chart;

/// A chart slot in the report. Sections without plot data render a notice instead.
pub struct ChartSection {
    pub id: String,
    pub title: String,
    pub notice: Option<String>,
    pub plot_data: String,
    pub plot_layout: String,
}

impl ChartSection {
    pub fn has_plot(&self) -> bool {
        self.notice.is_none()
    }

    pub fn notice_text(&self) -> &str {
        self.notice.as_deref().unwrap_or_default()
    }
}

/// Heading with the charts that belong to it
pub struct ReportGroup {
    pub heading: String,
    pub sections: Vec<ChartSection>,
}

#[derive(Template)]
#[template(path = "report.html")]
struct ReportTemplate<'a> {
    today: String,
    groups: &'a [ReportGroup],
}

/// HTML page with every chart of one run
pub struct Report {
    today: NaiveDate,
    default_region: String,
    groups: Vec<ReportGroup>,
}

impl Report {
    pub fn new(today: NaiveDate, default_region: impl Into<String>) -> Self {
        Self {
            today,
            default_region: default_region.into(),
            groups: Vec::new(),
        }
    }

    pub fn group(&mut self, heading: impl Into<String>) -> &mut Self {
        self.groups.push(ReportGroup {
            heading: heading.into(),
            sections: Vec::new(),
        });
        self
    }

    fn current_group(&mut self) -> &mut ReportGroup {
        if self.groups.is_empty() {
            self.group("Charts");
        }
        let last = self.groups.len() - 1;
        &mut self.groups[last]
    }

    pub fn add_chart(&mut self, chart: &Chart) -> &mut Self {
        let section = if chart.is_empty() {
            ChartSection {
                id: chart.id.clone(),
                title: chart.title.clone(),
                notice: Some("No forecast data in range".to_string()),
                plot_data: String::new(),
                plot_layout: String::new(),
            }
        } else {
            let (plot_data, plot_layout) = chart.to_plotly(&self.default_region);
            ChartSection {
                id: chart.id.clone(),
                title: chart.title.clone(),
                notice: None,
                plot_data,
                plot_layout,
            }
        };
        self.current_group().sections.push(section);
        self
    }

    /// Placeholder for a chart whose data could not be loaded
    pub fn add_unavailable(
        &mut self,
        id: impl Into<String>,
        title: impl Into<String>,
        reason: impl Into<String>,
    ) -> &mut Self {
        let section = ChartSection {
            id: id.into(),
            title: title.into(),
            notice: Some(reason.into()),
            plot_data: String::new(),
            plot_layout: String::new(),
        };
        self.current_group().sections.push(section);
        self
    }

    pub fn groups(&self) -> &[ReportGroup] {
        &self.groups
    }

    pub fn render(&self) -> Result<String, askama::Error> {
        ReportTemplate {
            today: self.today.format("%Y-%m-%d").to_string(),
            groups: &self.groups,
        }
        .render()
    }
}
