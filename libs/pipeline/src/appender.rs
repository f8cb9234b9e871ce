use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use thermal_api::{AppendSession, Record, StreamRef};

use crate::PipelineError;

/// Счётчики append-стороны.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendStats {
    pub batches: u64,
    pub appended: u64,
    /// `end_seq` последнего подтверждённого батча.
    pub last_seq: Option<u64>,
    /// Записи батча, append которого прервала отмена.
    pub abandoned: u64,
    /// Записи, оставшиеся в очереди при отмене.
    pub discarded: u64,
}

// ═══════════════════════════════════════════════════════════════
//  Appender: queue → session.append()
// ═══════════════════════════════════════════════════════════════

pub(crate) struct Appender<'a> {
    pub session: &'a mut dyn AppendSession,
    pub stream: &'a StreamRef,
    pub rx: mpsc::Receiver<Record>,
    pub max_batch: usize,
    pub token: CancellationToken,
}

impl Appender<'_> {
    /// Забирает записи из очереди в порядке производства. Всё, что накопилось
    /// за время предыдущего append, уходит одним батчем (до `max_batch`).
    ///
    /// Возвращается при отмене или когда продюсер закрыл очередь и она
    /// вычерпана. Ошибка append фатальна: сессия уже исчерпала ретраи.
    pub async fn run(self) -> Result<AppendStats, PipelineError> {
        let Appender { session, stream, mut rx, max_batch, token } = self;
        let mut stats = AppendStats::default();

        loop {
            let first = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                next = rx.recv() => match next {
                    Some(record) => record,
                    None => break,
                },
            };

            let mut batch = Vec::new();
            batch.push(first);
            while batch.len() < max_batch {
                match rx.try_recv() {
                    Ok(record) => batch.push(record),
                    Err(_) => break,
                }
            }
            let sent = batch.len() as u64;

            let ack = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    stats.abandoned += sent;
                    break;
                }
                result = session.append(batch) => result.map_err(|source| PipelineError::Append {
                    stream: stream.to_string(),
                    source,
                })?,
            };

            if ack.count() != sent {
                tracing::warn!(stream = %stream, sent, acked = ack.count(), "ack count differs from batch size");
            }
            if let Some(prev) = stats.last_seq {
                if ack.start_seq < prev {
                    tracing::warn!(stream = %stream, prev_end = prev, start_seq = ack.start_seq, "sequence regressed");
                }
            }

            stats.batches += 1;
            stats.appended += ack.count();
            stats.last_seq = Some(ack.end_seq);
            tracing::info!(
                stream = %stream,
                count = ack.count(),
                start_seq = ack.start_seq,
                end_seq = ack.end_seq,
                "appended"
            );
        }

        if token.is_cancelled() {
            rx.close();
            while rx.try_recv().is_ok() {
                stats.discarded += 1;
            }
            if stats.abandoned + stats.discarded > 0 {
                tracing::info!(
                    stream = %stream,
                    abandoned = stats.abandoned,
                    discarded = stats.discarded,
                    "unsent records dropped on shutdown"
                );
            }
        }

        Ok(stats)
    }
}
