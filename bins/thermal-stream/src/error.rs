use pipeline::PipelineError;
use thermal_api::PluginError;

#[derive(Debug, thiserror::Error)]
pub enum ThermalStreamError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("plugin: {0}")]
    Plugin(#[from] PluginError),

    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}

impl ThermalStreamError {
    pub fn config(context: &'static str, detail: impl Into<String>) -> Self {
        Self::Config { context, detail: detail.into() }
    }

    /// 2 = сенсор так и не ответил, 1 = всё остальное.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Pipeline(PipelineError::SensorUnavailable { .. }) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_unavailable_exits_with_two() {
        let err = ThermalStreamError::from(PipelineError::SensorUnavailable {
            sensor: "tcp".into(),
            attempts: 20,
            elapsed_ms: 1_000,
            source: PluginError::io("connection refused"),
        });
        assert_eq!(err.exit_code(), 2);

        let err = ThermalStreamError::from(PipelineError::Append {
            stream: "home/amg8833".into(),
            source: PluginError::io("503"),
        });
        assert_eq!(err.exit_code(), 1);
        assert_eq!(ThermalStreamError::config("env", "BASIN is not set").exit_code(), 1);
    }
}
