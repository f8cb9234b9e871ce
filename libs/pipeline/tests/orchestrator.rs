use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use codec_json::JsonCodec;
use occupancy_detector::OccupancyDetector;
use pipeline::{Orchestrator, PipelineConfig, PipelineError, PipelineState, RunSummary};
use store_memory::MemoryLogStore;
use thermal_api::{
    AppendAck, AppendSession, Frame, FrameSource, LogStore, OverflowPolicy, PluginError, ReadRecord,
    Record, RecordCodec, StreamRef,
};

// ═══════════════════════════════════════════════════════════════
//  Fakes
// ═══════════════════════════════════════════════════════════════

fn cold() -> Frame {
    Frame::uniform(8, 8, 20.0).unwrap()
}

fn hot() -> Frame {
    let mut rows = vec![vec![20.0; 8]; 8];
    for row in rows.iter_mut().skip(2).take(3) {
        for cell in row.iter_mut().skip(2).take(3) {
            *cell = 30.0;
        }
    }
    Frame::from_rows(rows).unwrap()
}

/// Отдаёт заготовленные чтения, затем `Ok(None)`.
struct Scripted {
    reads: VecDeque<Result<Frame, PluginError>>,
}

impl Scripted {
    fn new(reads: Vec<Result<Frame, PluginError>>) -> Box<Self> {
        Box::new(Self { reads: reads.into() })
    }
}

impl FrameSource for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn init(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, PluginError> {
        self.reads.pop_front().transpose()
    }
}

/// Не кончается; у кадра `n` первая клетка равна `n`.
struct Endless {
    n: u64,
}

impl FrameSource for Endless {
    fn name(&self) -> &str {
        "endless"
    }

    fn init(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, PluginError> {
        self.n += 1;
        let mut cells = vec![20.0; 64];
        cells[0] = self.n as f64;
        Frame::new(8, 8, cells).map(Some)
    }
}

struct DeadSensor;

impl FrameSource for DeadSensor {
    fn name(&self) -> &str {
        "dead"
    }

    fn init(&mut self) -> Result<(), PluginError> {
        Err(PluginError::io("i2c: no ack from 0x69"))
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, PluginError> {
        Err(PluginError::io("not initialised"))
    }
}

/// Лог-хранилище с настраиваемыми задержками open/append и отказами.
#[derive(Default)]
struct FakeStore {
    open_delay: Duration,
    delay: Duration,
    fail_open: bool,
    fail_append: bool,
    next_seq: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

struct FakeSession {
    delay: Duration,
    fail_append: bool,
    next_seq: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl AppendSession for FakeSession {
    fn append(
        &mut self,
        records: Vec<Record>,
    ) -> Pin<Box<dyn Future<Output = Result<AppendAck, PluginError>> + Send + '_>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            if self.fail_append {
                return Err(PluginError::io("503 service unavailable after 3 retries"));
            }
            let start = self.next_seq.fetch_add(records.len() as u64, Ordering::SeqCst);
            AppendAck::new(start, start + records.len() as u64)
        })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        Box::pin(async move {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        })
    }
}

impl LogStore for FakeStore {
    fn open_session(
        &self,
        _stream: &StreamRef,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn AppendSession>, PluginError>> + Send + '_>> {
        Box::pin(async move {
            tokio::time::sleep(self.open_delay).await;
            if self.fail_open {
                return Err(PluginError::config("401 unauthorized"));
            }
            Ok(Box::new(FakeSession {
                delay: self.delay,
                fail_append: self.fail_append,
                next_seq: self.next_seq.clone(),
                closed: self.closed.clone(),
            }) as Box<dyn AppendSession>)
        })
    }

    fn check_tail(
        &self,
        _stream: &StreamRef,
    ) -> Pin<Box<dyn Future<Output = Result<u64, PluginError>> + Send + '_>> {
        Box::pin(async move { Ok(self.next_seq.load(Ordering::SeqCst)) })
    }

    fn read(
        &self,
        _stream: &StreamRef,
        _start_seq: u64,
        _limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ReadRecord>, PluginError>> + Send + '_>> {
        Box::pin(async move { Ok(Vec::new()) })
    }
}

fn fast_config() -> PipelineConfig {
    PipelineConfig {
        poll_interval_ms: 1,
        error_backoff_ms: 60,
        init_timeout_ms: 100,
        init_retry_interval_ms: 10,
        ..Default::default()
    }
}

fn stream() -> StreamRef {
    StreamRef::new("home", "amg8833")
}

fn orchestrator(cfg: PipelineConfig, store: Arc<dyn LogStore>) -> Orchestrator {
    Orchestrator::new(cfg, OccupancyDetector::default(), Arc::new(JsonCodec), store, stream())
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn transient_read_error_backs_off_then_resumes() {
    let store = Arc::new(MemoryLogStore::new(1_000));
    let source = Scripted::new(vec![
        Ok(cold()),
        Err(PluginError::io("i2c read timeout")),
        Ok(hot()),
        Ok(cold()),
    ]);

    let orch = orchestrator(fast_config(), store.clone());
    let mut states = orch.subscribe();
    let watcher = tokio::spawn(async move {
        let mut seen = vec![*states.borrow_and_update()];
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            if seen.last() != Some(&state) {
                seen.push(state);
            }
            if state == PipelineState::Shutdown {
                break;
            }
        }
        seen
    });

    let started = Instant::now();
    let summary = orch.run(source, CancellationToken::new()).await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(60));
    assert_eq!(summary.frames, 3);
    assert_eq!(summary.frame_errors, 1);
    assert_eq!(summary.occupied_frames, 1);
    assert_eq!(summary.appended, 3);
    assert!(summary.exhausted);

    assert_eq!(
        watcher.await.unwrap(),
        vec![
            PipelineState::Init,
            PipelineState::Running,
            PipelineState::ErrorBackoff,
            PipelineState::Running,
            PipelineState::Shutdown,
        ]
    );

    let codec = JsonCodec;
    let flags: Vec<bool> = store
        .records(&stream())
        .await
        .iter()
        .map(|r| codec.decode(&r.body).unwrap().occupied)
        .collect();
    assert_eq!(flags, vec![false, true, false]);
    assert_eq!(store.open_sessions(), 0);
}

#[tokio::test]
async fn records_round_trip_with_increasing_sequence_numbers() {
    let store = Arc::new(MemoryLogStore::new(1_000));
    let frames: Vec<Frame> = (0..10)
        .map(|i| if i % 3 == 0 { hot() } else { cold() })
        .collect();
    let source = Scripted::new(frames.iter().cloned().map(Ok).collect());

    let summary = orchestrator(fast_config(), store.clone())
        .run(source, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.appended, 10);
    assert_eq!(summary.last_seq, Some(10));

    let records = store.records(&stream()).await;
    let seqs: Vec<u64> = records.iter().map(|r| r.seq_num).collect();
    assert_eq!(seqs, (0..10).collect::<Vec<_>>());

    let detector = OccupancyDetector::default();
    let codec = JsonCodec;
    for (record, frame) in records.iter().zip(frames) {
        let decoded = codec.decode(&record.body).unwrap();
        assert_eq!(decoded, detector.detect(frame));
    }
}

#[tokio::test]
async fn cancellation_closes_session_and_stops_appending() {
    let store = Arc::new(MemoryLogStore::new(10_000));
    let token = CancellationToken::new();
    let orch = orchestrator(fast_config(), store.clone());
    let mut states = orch.subscribe();

    let canceller = async {
        while store.records(&stream()).await.len() < 5 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        token.cancel();
    };
    let (summary, ()) = tokio::join!(orch.run(Box::new(Endless { n: 0 }), token.clone()), canceller);
    let summary = summary.unwrap();

    assert!(!summary.exhausted);
    assert_eq!(store.open_sessions(), 0);
    assert_eq!(*states.borrow_and_update(), PipelineState::Shutdown);

    let appended = store.records(&stream()).await.len() as u64;
    assert_eq!(summary.appended, appended);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(store.records(&stream()).await.len() as u64, appended);
}

#[tokio::test]
async fn records_queue_up_while_append_is_outstanding() {
    let store = Arc::new(FakeStore { delay: Duration::from_millis(40), ..Default::default() });
    let frames = (0..20).map(|_| Ok(cold())).collect();

    let summary = orchestrator(fast_config(), store.clone())
        .run(Scripted::new(frames), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.appended, 20);
    assert!(summary.batches < 20, "expected batching, got {} batches", summary.batches);
    assert!(store.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn drop_policy_counts_dropped_records() {
    let store = Arc::new(FakeStore { delay: Duration::from_millis(50), ..Default::default() });
    let cfg = PipelineConfig { buffer: 1, overflow: OverflowPolicy::Drop, ..fast_config() };
    let frames = (0..30).map(|_| Ok(cold())).collect();

    let summary = orchestrator(cfg, store)
        .run(Scripted::new(frames), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.frames, 30);
    assert!(summary.dropped > 0);
    assert_eq!(summary.emitted + summary.dropped, 30);
    assert_eq!(summary.appended, summary.emitted);
}

#[tokio::test]
async fn append_failure_is_fatal_and_session_is_closed() {
    let store = Arc::new(FakeStore { fail_append: true, ..Default::default() });
    let err = orchestrator(fast_config(), store.clone())
        .run(Box::new(Endless { n: 0 }), CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        PipelineError::Append { stream, source } => {
            assert_eq!(stream, "home/amg8833");
            assert!(source.message().contains("503"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(store.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn unavailable_sensor_aborts_before_opening_a_session() {
    let store = Arc::new(MemoryLogStore::new(10));
    let orch = orchestrator(fast_config(), store.clone());
    let states = orch.subscribe();

    let err = orch.run(Box::new(DeadSensor), CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, PipelineError::SensorUnavailable { .. }));
    assert!(err.to_string().contains("no ack from 0x69"));
    assert_eq!(store.check_tail(&stream()).await.unwrap(), 0);
    assert_eq!(*states.borrow(), PipelineState::Shutdown);
}

#[tokio::test]
async fn rejected_session_is_fatal() {
    let store = Arc::new(FakeStore { fail_open: true, ..Default::default() });
    let err = orchestrator(fast_config(), store)
        .run(Scripted::new(vec![Ok(cold())]), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::SessionOpen { .. }));
}

#[tokio::test]
async fn cancelled_before_start_appends_nothing() {
    let store = Arc::new(MemoryLogStore::new(10));
    let token = CancellationToken::new();
    token.cancel();

    let summary = orchestrator(fast_config(), store.clone())
        .run(Box::new(Endless { n: 0 }), token)
        .await
        .unwrap();

    assert_eq!(summary.appended, 0);
    assert_eq!(store.open_sessions(), 0);
    assert!(store.records(&stream()).await.is_empty());
}

#[tokio::test]
async fn cancel_while_session_is_opening_shuts_down_cleanly() {
    let store = Arc::new(FakeStore {
        open_delay: Duration::from_secs(3),
        fail_open: true,
        ..Default::default()
    });
    let token = CancellationToken::new();
    let orch = orchestrator(fast_config(), store.clone());
    let states = orch.subscribe();

    let canceller = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
    };
    let started = Instant::now();
    let (summary, ()) = tokio::join!(orch.run(Scripted::new(vec![Ok(cold())]), token.clone()), canceller);

    let summary = summary.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1), "took {:?}", started.elapsed());
    assert_eq!(summary.appended, 0);
    assert_eq!(summary.frames, 0);
    assert!(!store.closed.load(Ordering::SeqCst));
    assert_eq!(*states.borrow(), PipelineState::Shutdown);
}

#[tokio::test]
async fn cancel_during_sensor_init_retries_shuts_down_cleanly() {
    let store = Arc::new(MemoryLogStore::new(10));
    let cfg = PipelineConfig { init_timeout_ms: 5_000, init_retry_interval_ms: 20, ..fast_config() };
    let token = CancellationToken::new();

    let canceller = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
    };
    let started = Instant::now();
    let (summary, ()) = tokio::join!(
        orchestrator(cfg, store.clone()).run(Box::new(DeadSensor), token.clone()),
        canceller
    );

    assert_eq!(summary.unwrap(), RunSummary::default());
    assert!(started.elapsed() < Duration::from_secs(1), "took {:?}", started.elapsed());
    assert_eq!(store.open_sessions(), 0);
    assert_eq!(store.check_tail(&stream()).await.unwrap(), 0);
}
