use std::sync::Arc;

use sensor_file::FileSensor;
use sensor_sim::SimulatedSensor;
use sensor_tcp::TcpSensor;
use store_memory::MemoryLogStore;
use store_s2::S2Store;
use thermal_api::{FrameSource, LogStore};

use crate::config::{SensorConfig, StoreTarget};
use crate::error::ThermalStreamError;

pub fn open_sensor(cfg: &SensorConfig) -> Result<Box<dyn FrameSource>, ThermalStreamError> {
    let source: Box<dyn FrameSource> = match cfg {
        SensorConfig::Sim(c) => Box::new(SimulatedSensor::new(c.clone())?),
        SensorConfig::Tcp(c) => Box::new(TcpSensor::new(c)),
        SensorConfig::File(c) => Box::new(FileSensor::new(c.clone())),
    };
    tracing::info!(sensor = source.name(), "sensor configured");
    Ok(source)
}

pub fn open_store(target: &StoreTarget) -> Result<Arc<dyn LogStore>, ThermalStreamError> {
    let store: Arc<dyn LogStore> = match target {
        StoreTarget::S2 { token, config } => {
            tracing::info!(endpoint = %config.endpoint, "using S2 store");
            Arc::new(S2Store::new(token, config)?)
        }
        StoreTarget::Memory(config) => {
            tracing::info!(max_records = config.max_records, "using in-memory store (dry run)");
            Arc::new(MemoryLogStore::from_config(config))
        }
    };
    Ok(store)
}
