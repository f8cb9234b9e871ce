use std::time::Duration;

use tokio_util::sync::CancellationToken;

use codec_json::JsonCodec;
use store_s2::S2Store;
use thermal_api::{LogStore, PluginError, ReadRecord, RecordCodec, StreamRef};

use crate::config::{TailArgs, TailTarget};
use crate::error::ThermalStreamError;

/// Консьюмер: с текущего хвоста (или `--from`) опрашивать стрим и печатать
/// каждую запись одной строкой до Ctrl+C.
pub async fn run(args: TailArgs) -> Result<(), ThermalStreamError> {
    let target = TailTarget::new(&args)?;
    let store = S2Store::new(&target.token, &target.config)?;
    let codec = JsonCodec;

    let token = CancellationToken::new();
    let follow = follow(
        &store,
        &target.stream,
        args.from,
        Duration::from_millis(args.poll_ms),
        args.limit,
        &token,
        |record| {
            if args.raw {
                println!("{}", String::from_utf8_lossy(&record.body));
            } else {
                println!("{}", format_record(&codec, record));
            }
        },
    );
    tokio::pin!(follow);

    // Один слушатель на весь запуск: сигнал во время read не теряется.
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    tokio::select! {
        result = &mut follow => result?,
        signal = &mut ctrl_c => {
            signal?;
            token.cancel();
            follow.await?
        }
    }
    Ok(())
}

/// Опрос стрима до отмены `token`. Каждое ожидание (тик, check_tail, read)
/// прерывается отменой.
async fn follow(
    store: &dyn LogStore,
    stream: &StreamRef,
    from: Option<u64>,
    poll: Duration,
    limit: usize,
    token: &CancellationToken,
    mut emit: impl FnMut(&ReadRecord),
) -> Result<(), PluginError> {
    let mut next_seq = match from {
        Some(seq) => seq,
        None => tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(()),
            tail = store.check_tail(stream) => tail?,
        },
    };
    tracing::info!(%stream, start_seq = next_seq, "tailing");

    let mut ticker = tokio::time::interval(poll);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        let read = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => tokio::select! {
                biased;
                _ = token.cancelled() => break,
                r = store.read(stream, next_seq, limit) => r,
            },
        };

        let records = match read {
            Ok(r) => r,
            Err(e) if e.is_transient() => {
                tracing::warn!(%stream, error = %e, "read failed, will retry");
                continue;
            }
            Err(e) => return Err(e),
        };

        for record in &records {
            emit(record);
            next_seq = record.seq_num + 1;
        }
    }

    tracing::info!(%stream, next_seq, "tail stopped");
    Ok(())
}

fn format_record(codec: &dyn RecordCodec, record: &ReadRecord) -> String {
    match codec.decode(&record.body) {
        Ok(result) => format!(
            "{:>8}  {:<8}  max {:6.2}  {}x{}",
            record.seq_num,
            if result.occupied { "OCCUPIED" } else { "empty" },
            result.grid.max(),
            result.grid.rows(),
            result.grid.cols(),
        ),
        Err(e) => format!("{:>8}  <undecodable: {e}>", record.seq_num),
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Instant;

    use store_memory::MemoryLogStore;
    use thermal_api::{AppendSession, Record};

    use super::*;

    fn stream() -> StreamRef {
        StreamRef::new("home", "amg8833")
    }

    /// Хранилище, чей read висит дольше любого теста.
    struct StalledReads;

    impl LogStore for StalledReads {
        fn open_session(
            &self,
            _stream: &StreamRef,
        ) -> Pin<Box<dyn Future<Output = Result<Box<dyn AppendSession>, PluginError>> + Send + '_>>
        {
            Box::pin(async { Err(PluginError::config("read-only")) })
        }

        fn check_tail(
            &self,
            _stream: &StreamRef,
        ) -> Pin<Box<dyn Future<Output = Result<u64, PluginError>> + Send + '_>> {
            Box::pin(async { Ok(0) })
        }

        fn read(
            &self,
            _stream: &StreamRef,
            _start_seq: u64,
            _limit: usize,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<ReadRecord>, PluginError>> + Send + '_>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Vec::new())
            })
        }
    }

    #[test]
    fn formats_decoded_and_broken_records() {
        let codec = JsonCodec;
        let ok = ReadRecord {
            seq_num: 42,
            body: br#"{"occupied":true,"grid":[[20.0,31.5],[21.0,22.0]]}"#.to_vec(),
        };
        assert_eq!(format_record(&codec, &ok), "      42  OCCUPIED  max  31.50  2x2");

        let bad = ReadRecord { seq_num: 7, body: b"hello".to_vec() };
        let line = format_record(&codec, &bad);
        assert!(line.starts_with("       7  <undecodable:"));
    }

    #[tokio::test]
    async fn cancel_interrupts_outstanding_read() {
        let token = CancellationToken::new();
        let canceller = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        };

        let started = Instant::now();
        let mut emitted = 0;
        let stream = stream();
        let (result, ()) = tokio::join!(
            follow(&StalledReads, &stream, Some(0), Duration::from_millis(1), 10, &token, |_| {
                emitted += 1
            }),
            canceller
        );

        assert!(result.is_ok());
        assert!(started.elapsed() < Duration::from_secs(1), "took {:?}", started.elapsed());
        assert_eq!(emitted, 0);
    }

    #[tokio::test]
    async fn follows_from_requested_seq_until_cancelled() {
        let store = MemoryLogStore::new(100);
        let mut session = store.open_session(&stream()).await.unwrap();
        let records = (0..5).map(|i| Record::new(format!("r{i}").into_bytes())).collect();
        session.append(records).await.unwrap();
        session.close().await.unwrap();

        let token = CancellationToken::new();
        let mut seen = Vec::new();
        follow(&store, &stream(), Some(2), Duration::from_millis(1), 2, &token, |record| {
            seen.push(record.seq_num);
            if seen.len() == 3 {
                token.cancel();
            }
        })
        .await
        .unwrap();

        assert_eq!(seen, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn cancelled_before_start_reads_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let mut emitted = 0;
        follow(&StalledReads, &stream(), None, Duration::from_millis(1), 10, &token, |_| emitted += 1)
            .await
            .unwrap();
        assert_eq!(emitted, 0);
    }
}
