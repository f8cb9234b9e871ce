use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::RwLock;

use thermal_api::{AppendAck, AppendSession, LogStore, PluginError, ReadRecord, Record, StreamRef};

// ═══════════════════════════════════════════════════════════════
//  MemoryStoreConfig
// ═══════════════════════════════════════════════════════════════

fn default_max_records() -> usize {
    100_000
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MemoryStoreConfig {
    /// Сколько последних записей хранить на стрим.
    #[serde(default = "default_max_records")]
    pub max_records: usize,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  StreamLog
// ═══════════════════════════════════════════════════════════════

/// Хвост одного стрима. Sequence numbers сквозные и не переиспользуются,
/// даже когда старые записи вытеснены из ring-buffer'а.
struct StreamLog {
    records: VecDeque<ReadRecord>,
    next_seq: u64,
}

impl StreamLog {
    fn new() -> Self {
        Self { records: VecDeque::new(), next_seq: 0 }
    }

    fn append(&mut self, records: Vec<Record>, max_records: usize) -> AppendAck {
        let start_seq = self.next_seq;
        for record in records {
            if self.records.len() >= max_records {
                self.records.pop_front();
            }
            self.records.push_back(ReadRecord {
                seq_num: self.next_seq,
                body: record.into_bytes(),
            });
            self.next_seq += 1;
        }
        AppendAck { start_seq, end_seq: self.next_seq }
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryLogStore
// ═══════════════════════════════════════════════════════════════

/// In-process append-only лог. Для dry-run запусков и тестов пайплайна
/// без сетевого хранилища.
pub struct MemoryLogStore {
    streams: RwLock<HashMap<StreamRef, Arc<RwLock<StreamLog>>>>,
    max_records: usize,
    open_sessions: Arc<AtomicUsize>,
}

impl MemoryLogStore {
    pub fn new(max_records: usize) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            max_records: max_records.max(1),
            open_sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn from_config(config: &MemoryStoreConfig) -> Self {
        Self::new(config.max_records)
    }

    async fn stream_log(&self, stream: &StreamRef) -> Arc<RwLock<StreamLog>> {
        if let Some(log) = self.streams.read().await.get(stream) {
            return log.clone();
        }
        self.streams
            .write()
            .await
            .entry(stream.clone())
            .or_insert_with(|| Arc::new(RwLock::new(StreamLog::new())))
            .clone()
    }

    /// Открытые сессии, ещё не закрытые и не дропнутые.
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    /// Все хранимые записи стрима, от старых к новым.
    pub async fn records(&self, stream: &StreamRef) -> Vec<ReadRecord> {
        let log = self.stream_log(stream).await;
        let log = log.read().await;
        log.records.iter().cloned().collect()
    }
}

impl LogStore for MemoryLogStore {
    fn open_session(
        &self,
        stream: &StreamRef,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn AppendSession>, PluginError>> + Send + '_>> {
        let stream = stream.clone();
        Box::pin(async move {
            let log = self.stream_log(&stream).await;
            self.open_sessions.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(%stream, "memory session opened");
            Ok(Box::new(MemorySession {
                stream,
                log,
                max_records: self.max_records,
                open_sessions: self.open_sessions.clone(),
                closed: false,
            }) as Box<dyn AppendSession>)
        })
    }

    fn check_tail(
        &self,
        stream: &StreamRef,
    ) -> Pin<Box<dyn Future<Output = Result<u64, PluginError>> + Send + '_>> {
        let stream = stream.clone();
        Box::pin(async move {
            let log = self.stream_log(&stream).await;
            let next_seq = log.read().await.next_seq;
            Ok(next_seq)
        })
    }

    fn read(
        &self,
        stream: &StreamRef,
        start_seq: u64,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ReadRecord>, PluginError>> + Send + '_>> {
        let stream = stream.clone();
        Box::pin(async move {
            let log = self.stream_log(&stream).await;
            let log = log.read().await;
            Ok(log
                .records
                .iter()
                .filter(|r| r.seq_num >= start_seq)
                .take(limit)
                .cloned()
                .collect())
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemorySession
// ═══════════════════════════════════════════════════════════════

pub struct MemorySession {
    stream: StreamRef,
    log: Arc<RwLock<StreamLog>>,
    max_records: usize,
    open_sessions: Arc<AtomicUsize>,
    closed: bool,
}

impl AppendSession for MemorySession {
    fn append(
        &mut self,
        records: Vec<Record>,
    ) -> Pin<Box<dyn Future<Output = Result<AppendAck, PluginError>> + Send + '_>> {
        Box::pin(async move {
            if self.closed {
                return Err(PluginError::new(format!("session for {} is closed", self.stream)));
            }
            let mut log = self.log.write().await;
            Ok(log.append(records, self.max_records))
        })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        Box::pin(async move {
            if !self.closed {
                self.closed = true;
                self.open_sessions.fetch_sub(1, Ordering::SeqCst);
                tracing::debug!(stream = %self.stream, "memory session closed");
            }
            Ok(())
        })
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if !self.closed {
            self.open_sessions.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream() -> StreamRef {
        StreamRef::new("home", "amg8833")
    }

    fn records(bodies: &[&str]) -> Vec<Record> {
        bodies.iter().map(|b| Record::new(b.as_bytes().to_vec())).collect()
    }

    #[tokio::test]
    async fn acks_are_contiguous_across_appends() {
        let store = MemoryLogStore::new(100);
        let mut session = store.open_session(&stream()).await.unwrap();

        let first = session.append(records(&["a", "b", "c"])).await.unwrap();
        let second = session.append(records(&["d"])).await.unwrap();
        let empty = session.append(Vec::new()).await.unwrap();

        assert_eq!(first, AppendAck { start_seq: 0, end_seq: 3 });
        assert_eq!(second, AppendAck { start_seq: 3, end_seq: 4 });
        assert_eq!(empty.count(), 0);
        assert_eq!(store.check_tail(&stream()).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn ring_buffer_keeps_sequence_numbers() {
        let store = MemoryLogStore::new(2);
        let mut session = store.open_session(&stream()).await.unwrap();
        session.append(records(&["a", "b", "c"])).await.unwrap();

        let kept = store.read(&stream(), 0, 10).await.unwrap();
        assert_eq!(kept.iter().map(|r| r.seq_num).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(kept[1].body, b"c");
        assert_eq!(store.check_tail(&stream()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn read_honours_start_and_limit() {
        let store = MemoryLogStore::new(100);
        let mut session = store.open_session(&stream()).await.unwrap();
        session.append(records(&["a", "b", "c", "d"])).await.unwrap();

        let page = store.read(&stream(), 1, 2).await.unwrap();
        assert_eq!(page.iter().map(|r| r.seq_num).collect::<Vec<_>>(), vec![1, 2]);
        assert!(store.read(&stream(), 4, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn closed_session_rejects_appends() {
        let store = MemoryLogStore::new(10);
        let mut session = store.open_session(&stream()).await.unwrap();
        assert_eq!(store.open_sessions(), 1);

        session.close().await.unwrap();
        session.close().await.unwrap();
        assert_eq!(store.open_sessions(), 0);
        assert!(session.append(records(&["late"])).await.is_err());
    }

    #[tokio::test]
    async fn dropped_session_is_released() {
        let store = MemoryLogStore::new(10);
        let session = store.open_session(&stream()).await.unwrap();
        assert_eq!(store.open_sessions(), 1);
        drop(session);
        assert_eq!(store.open_sessions(), 0);
    }

    #[tokio::test]
    async fn streams_are_independent() {
        let store = MemoryLogStore::new(10);
        let other = StreamRef::new("home", "garage");
        let mut a = store.open_session(&stream()).await.unwrap();
        let mut b = store.open_session(&other).await.unwrap();
        a.append(records(&["x", "y"])).await.unwrap();
        let ack = b.append(records(&["z"])).await.unwrap();
        assert_eq!(ack, AppendAck { start_seq: 0, end_seq: 1 });
        assert_eq!(store.records(&other).await.len(), 1);
    }
}
