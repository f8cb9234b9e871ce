use thermal_api::PluginError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("sensor {sensor} unavailable after {attempts} attempt(s) in {elapsed_ms} ms: {source}")]
    SensorUnavailable {
        sensor: String,
        attempts: u32,
        elapsed_ms: u64,
        source: PluginError,
    },

    #[error("open session ({stream}): {source}")]
    SessionOpen { stream: String, source: PluginError },

    #[error("append ({stream}): {source}")]
    Append { stream: String, source: PluginError },

    #[error("worker: {0}")]
    Worker(String),
}
