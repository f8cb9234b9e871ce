use std::time::{Duration, Instant};

use thermal_api::{ErrorKind, FrameSource};

use crate::PipelineError;

/// Итог успешной инициализации сенсора.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitReport {
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Инициализировать источник с повторами в пределах `timeout`.
///
/// Каждая попытка выполняется в blocking-потоке. Ошибки конфигурации
/// не повторяются. По истечении окна возвращается `SensorUnavailable`
/// с последней ошибкой источника.
pub async fn init_source(
    mut source: Box<dyn FrameSource>,
    timeout: Duration,
    retry_interval: Duration,
) -> Result<(Box<dyn FrameSource>, InitReport), PipelineError> {
    let started = Instant::now();
    let sensor = source.name().to_string();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let (returned, result) = tokio::task::spawn_blocking(move || {
            let r = source.init();
            (source, r)
        })
        .await
        .map_err(|e| PipelineError::Worker(format!("sensor init: {e}")))?;
        source = returned;

        let err = match result {
            Ok(()) => {
                let report = InitReport { attempts, elapsed: started.elapsed() };
                tracing::info!(
                    sensor = %sensor,
                    attempts,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "sensor initialized"
                );
                return Ok((source, report));
            }
            Err(e) => e,
        };

        let elapsed = started.elapsed();
        if err.kind() == ErrorKind::Config || elapsed + retry_interval > timeout {
            return Err(PipelineError::SensorUnavailable {
                sensor,
                attempts,
                elapsed_ms: elapsed.as_millis() as u64,
                source: err,
            });
        }
        tracing::debug!(sensor = %sensor, attempt = attempts, error = %err, "sensor init failed, retrying");
        tokio::time::sleep(retry_interval).await;
    }
}
