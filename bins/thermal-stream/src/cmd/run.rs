use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use codec_json::JsonCodec;
use occupancy_detector::OccupancyDetector;
use pipeline::{Orchestrator, RunSummary};

use crate::cmd::sources::{open_sensor, open_store};
use crate::config::{Effective, RunArgs};
use crate::error::ThermalStreamError;

pub async fn run(args: RunArgs) -> Result<(), ThermalStreamError> {
    let eff = Effective::for_run(&args)?;
    tracing::info!(config = %args.stream.config, stream = %eff.stream, "thermal-stream starting");

    let source = open_sensor(&eff.sensor)?;
    let store = open_store(&eff.store)?;
    let orchestrator = Orchestrator::new(
        eff.pipeline.clone(),
        OccupancyDetector::new(eff.detector.clone()),
        Arc::new(JsonCodec),
        store,
        eff.stream.clone(),
    );

    let token = CancellationToken::new();
    let run = orchestrator.run(source, token.clone());
    tokio::pin!(run);

    let summary = tokio::select! {
        result = &mut run => result?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("shutting down...");
            token.cancel();
            run.await?
        }
    };

    log_summary(&summary);
    Ok(())
}

fn log_summary(s: &RunSummary) {
    tracing::info!(
        frames = s.frames,
        occupied = s.occupied_frames,
        frame_errors = s.frame_errors,
        emitted = s.emitted,
        dropped = s.dropped,
        batches = s.batches,
        appended = s.appended,
        last_seq = ?s.last_seq,
        abandoned = s.abandoned,
        discarded = s.discarded,
        exhausted = s.exhausted,
        "run finished"
    );
}
