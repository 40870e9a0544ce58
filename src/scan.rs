//! Scan orchestration: acquisition, extraction and incremental reporting

use crate::acquire::{AcquireEvent, Acquirer, Fetcher, ScanInput};
use crate::engine::Engine;
use crate::error::Result;
use crate::models::{RunConfig, RunStatus, ScanRun};
use crate::report::text::TextReport;
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Runs one scan to completion, interruption or failure.
///
/// Every origin is appended to the text report as soon as it is extracted, so
/// when `shutdown` resolves or acquisition fails the report already holds all
/// finished origins and only the trailer is added. Errors are returned only
/// when the report itself cannot be written.
pub async fn run_scan<F>(
    config: &RunConfig,
    input: ScanInput,
    fetcher: Arc<dyn Fetcher>,
    shutdown: F,
) -> Result<ScanRun>
where
    F: Future<Output = ()>,
{
    let engine = Engine::new(&config.extract)?;
    let mut report = TextReport::create(Path::new(&config.report_path))?;
    report.write_header(Local::now())?;

    let mut run = ScanRun::new(input.to_string());
    let (tx, mut rx) = mpsc::channel(config.concurrency.max(1) * 2);
    let acquirer = Acquirer::new(Arc::clone(&fetcher), config.concurrency);
    let acquisition = tokio::spawn(async move { acquirer.run(input, tx).await });

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );

    tokio::pin!(shutdown);
    let mut status = None;

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                warn!("Interrupted, writing partial results");
                status = Some(RunStatus::Interrupted);
                break;
            }
            event = rx.recv() => {
                let Some(event) = event else {
                    break;
                };
                match event {
                    AcquireEvent::Planned(n) => pb.inc_length(n as u64),
                    AcquireEvent::Unit(unit) => {
                        pb.set_message(unit.origin.clone());
                        let origin = engine.extract(&unit);
                        info!(
                            "{}: {} call sites ({} with parameters)",
                            origin.origin,
                            origin.candidate_count(),
                            origin.with_parameters_count()
                        );
                        let written = report.write_origin(&origin);
                        run.result.origins.push(origin);
                        pb.inc(1);
                        if let Err(e) = written {
                            error!("Failed to write report: {e}");
                            status = Some(RunStatus::Failed(e.to_string()));
                            break;
                        }
                    }
                    AcquireEvent::Warning(warning) => {
                        let written = report.write_warning(&warning);
                        run.result.warnings.push(warning);
                        pb.inc(1);
                        if let Err(e) = written {
                            error!("Failed to write report: {e}");
                            status = Some(RunStatus::Failed(e.to_string()));
                            break;
                        }
                    }
                }
            }
        }
    }

    let status = match status {
        Some(status) => {
            acquisition.abort();
            status
        }
        None => match acquisition.await {
            Ok(Ok(())) => RunStatus::Completed,
            Ok(Err(e)) => {
                error!("Acquisition failed: {e}");
                RunStatus::Failed(e.to_string())
            }
            Err(e) => RunStatus::Failed(format!("acquisition task failed: {e}")),
        },
    };

    pb.finish_with_message(match &status {
        RunStatus::Completed => "Scan complete".to_string(),
        other => format!("Scan {other}"),
    });

    run.total_requests = fetcher.request_count();
    run.finish(status.clone());
    report.finish(&status)?;
    info!("Text report saved to {}", config.report_path);

    Ok(run)
}
