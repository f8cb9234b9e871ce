pub mod config;
pub mod error;
mod appender;
mod init;
mod orchestrator;
mod producer;

pub use appender::AppendStats;
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use init::{InitReport, init_source};
pub use orchestrator::{Orchestrator, PipelineState, RunSummary};
pub use producer::ProducerStats;
