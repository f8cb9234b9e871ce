//! Общие типы и трейты коллабораторов для стрима занятости по тепловой матрице.

mod error;
mod traits;
mod types;
mod util;

pub use error::{ErrorKind, PluginError};
pub use traits::{AppendSession, FrameSource, LogStore, RecordCodec};
pub use types::{AppendAck, Frame, OccupancyResult, OverflowPolicy, ReadRecord, Record, StreamRef};
pub use util::now_ms;
