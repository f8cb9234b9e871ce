use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use occupancy_detector::OccupancyDetector;
use thermal_api::{AppendSession, FrameSource, LogStore, RecordCodec, StreamRef};

use crate::appender::{AppendStats, Appender};
use crate::init::init_source;
use crate::producer::{Producer, ProducerStats};
use crate::{PipelineConfig, PipelineError};

/// INIT → RUNNING ⇄ ERROR_BACKOFF → SHUTDOWN
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    Running,
    ErrorBackoff,
    Shutdown,
}

/// Итоги одного запуска, логируются при выходе.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub occupied_frames: u64,
    pub frame_errors: u64,
    pub emitted: u64,
    pub dropped: u64,
    pub batches: u64,
    pub appended: u64,
    pub last_seq: Option<u64>,
    pub abandoned: u64,
    pub discarded: u64,
    pub exhausted: bool,
}

impl RunSummary {
    fn new(producer: ProducerStats, append: AppendStats) -> Self {
        Self {
            frames: producer.frames,
            occupied_frames: producer.occupied_frames,
            frame_errors: producer.frame_errors,
            emitted: producer.emitted,
            dropped: producer.dropped,
            batches: append.batches,
            appended: append.appended,
            last_seq: append.last_seq,
            abandoned: append.abandoned,
            discarded: append.discarded,
            exhausted: producer.exhausted,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Orchestrator
// ═══════════════════════════════════════════════════════════════

/// Связывает источник кадров, детектор, кодек и append-сессию.
///
/// Один источник и одна сессия на запуск. Продюсер крутится в отдельной
/// задаче, append-цикл в вызывающей; между ними bounded очередь.
pub struct Orchestrator {
    cfg: PipelineConfig,
    detector: OccupancyDetector,
    codec: Arc<dyn RecordCodec>,
    store: Arc<dyn LogStore>,
    stream: StreamRef,
    state: Arc<watch::Sender<PipelineState>>,
}

impl Orchestrator {
    pub fn new(
        cfg: PipelineConfig,
        detector: OccupancyDetector,
        codec: Arc<dyn RecordCodec>,
        store: Arc<dyn LogStore>,
        stream: StreamRef,
    ) -> Self {
        let (state, _) = watch::channel(PipelineState::Init);
        Self { cfg, detector, codec, store, stream, state: Arc::new(state) }
    }

    /// Наблюдать за переходами состояния.
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// Полный цикл: init сенсора, открытие сессии, работа до отмены
    /// или исчерпания источника, закрытие сессии.
    pub async fn run(
        self,
        source: Box<dyn FrameSource>,
        token: CancellationToken,
    ) -> Result<RunSummary, PipelineError> {
        self.state.send_replace(PipelineState::Init);
        let result = self.run_inner(source, token).await;
        self.state.send_replace(PipelineState::Shutdown);
        result
    }

    async fn run_inner(
        &self,
        source: Box<dyn FrameSource>,
        token: CancellationToken,
    ) -> Result<RunSummary, PipelineError> {
        let init = init_source(source, self.cfg.init_timeout(), self.cfg.init_retry_interval());
        let (source, _) = tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::info!("cancelled during sensor init");
                return Ok(RunSummary::default());
            }
            r = init => r?,
        };

        let opened = tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::info!(stream = %self.stream, "cancelled while opening append session");
                return Ok(RunSummary::default());
            }
            r = self.store.open_session(&self.stream) => r,
        };
        let mut session = opened
            .map_err(|source| PipelineError::SessionOpen { stream: self.stream.to_string(), source })?;
        tracing::info!(stream = %self.stream, "append session opened");

        if token.is_cancelled() {
            self.close_session(session.as_mut()).await;
            return Ok(RunSummary::default());
        }

        let (tx, rx) = mpsc::channel(self.cfg.buffer.max(1));
        let producer_token = token.child_token();
        let producer = Producer {
            source,
            detector: self.detector.clone(),
            codec: self.codec.clone(),
            tx,
            cfg: self.cfg.clone(),
            state: self.state.clone(),
            token: producer_token.clone(),
        };

        self.state.send_replace(PipelineState::Running);
        let producer_handle = tokio::spawn(producer.run());

        let appended = Appender {
            session: session.as_mut(),
            stream: &self.stream,
            rx,
            max_batch: self.cfg.max_batch.max(1),
            token: token.clone(),
        }
        .run()
        .await;

        // Append-сторона закончила: продюсеру больше некуда писать.
        producer_token.cancel();
        let produced = producer_handle
            .await
            .map_err(|e| PipelineError::Worker(format!("producer task: {e}")))
            .and_then(|r| r);

        self.close_session(session.as_mut()).await;

        let append_stats = appended?;
        let producer_stats = produced?;
        Ok(RunSummary::new(producer_stats, append_stats))
    }

    async fn close_session(&self, session: &mut dyn AppendSession) {
        match session.close().await {
            Ok(()) => tracing::info!(stream = %self.stream, "append session closed"),
            Err(e) => tracing::warn!(stream = %self.stream, error = %e, "append session close failed"),
        }
    }
}
