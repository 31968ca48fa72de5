use anyhow::{Context, Result};
use pasa_report::config::Config;
use pasa_report::pasa::reconcile::ForecastWindow;
use pasa_report::pasa::{ForecastStore, PasaError};
use pasa_report::pipeline::{mtpasa_charts, stpasa_charts};
use pasa_report::report::Report;
use pasa_report::telemetry::init_tracing;
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::load().context("loading configuration")?;
    let today = config.report.today();
    let window = ForecastWindow::new(today, config.report.lookback_days);
    let recent_runs = config.report.recent_runs;
    info!(
        %today,
        cutoff = %window.cutoff(),
        lookback_start = %window.lookback_start(),
        "building PASA report"
    );

    let mut store = ForecastStore::connect(&config.db).await?;
    let mut report = Report::new(today, config.report.default_region.clone());

    report.group("MTPASA");
    match store.fetch_mtpasa().await {
        Ok(records) => {
            let charts = mtpasa_charts(records, &window, recent_runs);
            report.add_chart(&charts.total).add_chart(&charts.delta);
        }
        Err(e) => {
            skip_or_abort(e)?;
            report
                .add_unavailable("mtpasa-total", "MTPASA", "MTPASA data could not be loaded")
                .add_unavailable("mtpasa-delta", "MTPASA Delta", "MTPASA data could not be loaded");
        }
    }

    report.group("STPASA");
    match store.fetch_stpasa().await {
        Ok(records) => {
            for chart in stpasa_charts(records, &window, recent_runs) {
                report.add_chart(&chart);
            }
        }
        Err(e) => {
            skip_or_abort(e)?;
            report.add_unavailable("stpasa", "STPASA Delta", "STPASA data could not be loaded");
        }
    }

    store.close().await?;

    let html = report.render().context("rendering report")?;
    let output = &config.report.output;
    tokio::fs::write(output, html)
        .await
        .with_context(|| format!("writing {}", output.display()))?;
    info!(output = %output.display(), "report written");

    Ok(())
}

/// Failed queries leave their charts out. Anything else stops the run.
fn skip_or_abort(e: PasaError) -> Result<()> {
    if e.is_fatal() {
        return Err(e.into());
    }
    error!(error = %e, "query failed, charts left out");
    Ok(())
}
