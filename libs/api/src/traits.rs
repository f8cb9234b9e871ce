use std::future::Future;
use std::pin::Pin;

use crate::{AppendAck, Frame, OccupancyResult, PluginError, ReadRecord, Record, StreamRef};

// ════════════════════════════════════════════════════════════════
//  Sensor
// ════════════════════════════════════════════════════════════════

/// Источник кадров (тепловой сенсор, мост по TCP, файл-реплей).
///
/// Все методы **блокирующие**, хост вызывает их из blocking-потока.
/// Ретраев внутри нет: повторные попытки и backoff делает пайплайн.
pub trait FrameSource: Send {
    /// Имя источника для логов.
    fn name(&self) -> &str;

    /// Одна попытка рукопожатия с устройством (шина, сокет, файл).
    /// Хост повторяет её в пределах ограниченного окна.
    fn init(&mut self) -> Result<(), PluginError>;

    /// Прочитать текущую сетку. Блокирует до готовности.
    /// None = источник исчерпан (graceful shutdown).
    fn read_frame(&mut self) -> Result<Option<Frame>, PluginError>;
}

// ════════════════════════════════════════════════════════════════
//  Codec
// ════════════════════════════════════════════════════════════════

/// Сериализация результата детекции в payload записи и обратно.
pub trait RecordCodec: Send + Sync {
    fn encode(&self, result: &OccupancyResult) -> Result<Vec<u8>, PluginError>;

    fn decode(&self, data: &[u8]) -> Result<OccupancyResult, PluginError>;
}

// ════════════════════════════════════════════════════════════════
//  Log store
// ════════════════════════════════════════════════════════════════

/// Долгоживущая сессия записи в один стрим.
///
/// Записи одного вызова `append` попадают в лог подряд и в том же
/// порядке. Транзиентные сбои сеть/хранилище сессия обрабатывает сама;
/// ошибка из `append` означает, что бюджет ретраев исчерпан.
pub trait AppendSession: Send {
    fn append(
        &mut self,
        records: Vec<Record>,
    ) -> Pin<Box<dyn Future<Output = Result<AppendAck, PluginError>> + Send + '_>>;

    /// Закрыть сессию. `append` после close возвращает ошибку.
    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>>;
}

/// Клиент append-only лог-хранилища.
pub trait LogStore: Send + Sync {
    /// Открыть сессию записи в стрим.
    fn open_session(
        &self,
        stream: &StreamRef,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn AppendSession>, PluginError>> + Send + '_>>;

    /// Sequence number, который получит следующая запись.
    fn check_tail(
        &self,
        stream: &StreamRef,
    ) -> Pin<Box<dyn Future<Output = Result<u64, PluginError>> + Send + '_>>;

    /// Прочитать до `limit` записей начиная с `start_seq`.
    fn read(
        &self,
        stream: &StreamRef,
        start_seq: u64,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ReadRecord>, PluginError>> + Send + '_>>;
}
