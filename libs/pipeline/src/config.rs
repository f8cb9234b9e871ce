use std::time::Duration;

use serde::Deserialize;

use thermal_api::OverflowPolicy;

// ═══════════════════════════════════════════════════════════════
//  Pipeline Config
// ═══════════════════════════════════════════════════════════════

/// Тайминги и очередь пайплайна. Собирается в точке входа и передаётся
/// в `Orchestrator` по значению, глобальных настроек нет.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Период опроса сенсора. Пропущенные тики откладываются, а не догоняются пачкой.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Пауза после ошибки чтения/обработки кадра.
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
    /// Сколько всего пытаться инициализировать сенсор.
    #[serde(default = "default_init_timeout_ms")]
    pub init_timeout_ms: u64,
    /// Пауза между попытками инициализации.
    #[serde(default = "default_init_retry_interval_ms")]
    pub init_retry_interval_ms: u64,
    /// Ёмкость очереди записей между продюсером и append-сессией.
    #[serde(default = "default_buffer")]
    pub buffer: usize,
    #[serde(default)]
    pub overflow: OverflowPolicy,
    /// Максимум записей в одном append.
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
}

fn default_poll_interval_ms() -> u64 {
    100
}
fn default_error_backoff_ms() -> u64 {
    5_000
}
fn default_init_timeout_ms() -> u64 {
    1_000
}
fn default_init_retry_interval_ms() -> u64 {
    50
}
fn default_buffer() -> usize {
    1024
}
fn default_max_batch() -> usize {
    64
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            error_backoff_ms: default_error_backoff_ms(),
            init_timeout_ms: default_init_timeout_ms(),
            init_retry_interval_ms: default_init_retry_interval_ms(),
            buffer: default_buffer(),
            overflow: OverflowPolicy::default(),
            max_batch: default_max_batch(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval_ms == 0 {
            return Err("pipeline.poll_interval_ms must be > 0".into());
        }
        if self.buffer == 0 {
            return Err("pipeline.buffer must be > 0".into());
        }
        if self.max_batch == 0 {
            return Err("pipeline.max_batch must be > 0".into());
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    pub fn init_retry_interval(&self) -> Duration {
        Duration::from_millis(self.init_retry_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_section_gets_defaults() {
        let cfg: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.poll_interval(), Duration::from_millis(100));
        assert_eq!(cfg.error_backoff(), Duration::from_secs(5));
        assert_eq!(cfg.init_timeout(), Duration::from_secs(1));
        assert_eq!(cfg.buffer, 1024);
        assert_eq!(cfg.max_batch, 64);
        assert_eq!(cfg.overflow, OverflowPolicy::BackPressure);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let cfg = PipelineConfig { buffer: 0, ..Default::default() };
        assert!(cfg.validate().unwrap_err().contains("buffer"));
        let cfg = PipelineConfig { poll_interval_ms: 0, ..Default::default() };
        assert!(cfg.validate().is_err());
        let cfg = PipelineConfig { max_batch: 0, ..Default::default() };
        assert!(cfg.validate().is_err());
    }
}
