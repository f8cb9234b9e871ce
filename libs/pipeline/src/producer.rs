use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use occupancy_detector::OccupancyDetector;
use thermal_api::{
    Frame, FrameSource, OccupancyResult, OverflowPolicy, PluginError, Record, RecordCodec,
};

use crate::{PipelineConfig, PipelineError, PipelineState};

/// Счётчики продюсера за время работы.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    pub frames: u64,
    pub occupied_frames: u64,
    pub frame_errors: u64,
    pub emitted: u64,
    pub dropped: u64,
    /// Источник сообщил об окончании данных.
    pub exhausted: bool,
}

// ═══════════════════════════════════════════════════════════════
//  Producer: sensor → detector → codec → queue
// ═══════════════════════════════════════════════════════════════

pub(crate) struct Producer {
    pub source: Box<dyn FrameSource>,
    pub detector: OccupancyDetector,
    pub codec: Arc<dyn RecordCodec>,
    pub tx: mpsc::Sender<Record>,
    pub cfg: PipelineConfig,
    pub state: Arc<watch::Sender<PipelineState>>,
    pub token: CancellationToken,
}

enum Step {
    Frame(Frame),
    Exhausted,
    Failed(PluginError),
    Cancelled,
}

impl Producer {
    /// Работает до отмены, исчерпания источника или закрытия очереди.
    /// Ошибки отдельных кадров не выходят наружу: лог, backoff, следующий кадр.
    pub async fn run(self) -> Result<ProducerStats, PipelineError> {
        let Producer { source, detector, codec, tx, cfg, state, token } = self;
        let name = source.name().to_string();
        let mut source = Some(source);
        let mut stats = ProducerStats::default();
        let mut last_occupied: Option<bool> = None;

        let mut ticker = tokio::time::interval(cfg.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let step = match source.take() {
                Some(src) => read_frame(src, &mut source, &token).await?,
                None => Step::Cancelled,
            };

            let result = match step {
                Step::Cancelled => break,
                Step::Exhausted => {
                    tracing::info!(sensor = %name, "source exhausted");
                    stats.exhausted = true;
                    break;
                }
                Step::Frame(frame) => {
                    stats.frames += 1;
                    let detection = detector.analyze(&frame);
                    tracing::debug!(
                        occupied = detection.occupied,
                        components = detection.components,
                        clusters = ?detection.clusters,
                        max = frame.max(),
                        "frame analyzed"
                    );
                    let result = OccupancyResult { occupied: detection.occupied, grid: frame };
                    codec.encode(&result).map(|body| (result.occupied, Record::new(body)))
                }
                Step::Failed(e) => Err(e),
            };

            let (occupied, record) = match result {
                Ok(v) => v,
                Err(e) => {
                    stats.frame_errors += 1;
                    tracing::warn!(sensor = %name, error = %e, backoff_ms = cfg.error_backoff_ms, "frame error");
                    state.send_replace(PipelineState::ErrorBackoff);
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(cfg.error_backoff()) => {}
                    }
                    state.send_replace(PipelineState::Running);
                    ticker.reset();
                    continue;
                }
            };

            if occupied {
                stats.occupied_frames += 1;
            }
            if last_occupied != Some(occupied) {
                if last_occupied.is_some() {
                    tracing::info!(occupied, "occupancy changed");
                }
                last_occupied = Some(occupied);
            }

            match cfg.overflow {
                OverflowPolicy::Drop => match tx.try_send(record) {
                    Ok(()) => stats.emitted += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        stats.dropped += 1;
                        tracing::warn!(dropped = stats.dropped, "record queue full, dropping");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                },
                OverflowPolicy::BackPressure => {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        sent = tx.send(record) => match sent {
                            Ok(()) => stats.emitted += 1,
                            Err(_) => break,
                        },
                    }
                }
            }
        }

        tracing::info!(sensor = %name, frames = stats.frames, errors = stats.frame_errors, "producer stopped");
        Ok(stats)
    }
}

/// Одно блокирующее чтение в worker-потоке. Источник возвращается через
/// `slot`; при отмене он остаётся у отцепленного worker'а и дропается там.
async fn read_frame(
    mut src: Box<dyn FrameSource>,
    slot: &mut Option<Box<dyn FrameSource>>,
    token: &CancellationToken,
) -> Result<Step, PipelineError> {
    let handle = tokio::task::spawn_blocking(move || {
        let r = src.read_frame();
        (src, r)
    });

    tokio::select! {
        biased;
        _ = token.cancelled() => Ok(Step::Cancelled),
        joined = handle => {
            let (src, result) = joined.map_err(|e| PipelineError::Worker(format!("sensor read: {e}")))?;
            *slot = Some(src);
            Ok(match result {
                Ok(Some(frame)) => Step::Frame(frame),
                Ok(None) => Step::Exhausted,
                Err(e) => Step::Failed(e),
            })
        }
    }
}
