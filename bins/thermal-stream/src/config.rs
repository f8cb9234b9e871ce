use std::path::Path;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use occupancy_detector::DetectorConfig;
use pipeline::PipelineConfig;
use sensor_file::FileSensorConfig;
use sensor_sim::SimConfig;
use sensor_tcp::TcpSensorConfig;
use store_memory::MemoryStoreConfig;
use store_s2::S2Config;
use thermal_api::StreamRef;

use crate::error::ThermalStreamError;

#[derive(Parser)]
#[command(name = "thermal-stream", about = "Тепловой сенсор → детекция присутствия → S2 stream")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Опрашивать сенсор и дописывать результаты в стрим
    Run(RunArgs),
    /// Читать стрим с хвоста и печатать записи
    Tail(TailArgs),
}

// ═══════════════════════════════════════════════════════════════
//  CLI args
// ═══════════════════════════════════════════════════════════════

/// Общие для обеих команд: config-файл и адрес стрима.
#[derive(Args, Clone, Debug)]
pub struct StreamArgs {
    /// Путь к config.toml
    #[arg(long, default_value = "config.toml", env = "THERMAL_STREAM_CONFIG")]
    pub config: String,

    /// Access token S2
    #[arg(long, env = "S2_AUTH_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Basin (namespace стримов)
    #[arg(long, env = "BASIN")]
    pub basin: Option<String>,

    /// Имя стрима
    #[arg(long, env = "STREAM")]
    pub stream: Option<String>,
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub stream: StreamArgs,

    /// Писать в in-process лог вместо S2 (dry run)
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Clone, Debug)]
pub struct TailArgs {
    #[command(flatten)]
    pub stream: StreamArgs,

    /// Начать с этого sequence number вместо текущего хвоста
    #[arg(long)]
    pub from: Option<u64>,

    /// Период опроса стрима, мс
    #[arg(long, default_value_t = 1000)]
    pub poll_ms: u64,

    /// Максимум записей за одно чтение
    #[arg(long, default_value_t = 100)]
    pub limit: usize,

    /// Печатать тело записи как есть (JSON-строки, пригодные для replay)
    #[arg(long)]
    pub raw: bool,
}

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    pub basin: Option<String>,
    pub stream: Option<String>,
    pub sensor: Option<SensorConfig>,
    pub store: Option<StoreConfig>,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorConfig {
    Sim(SimConfig),
    Tcp(TcpSensorConfig),
    File(FileSensorConfig),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    S2(S2Config),
    Memory(MemoryStoreConfig),
}

pub fn load_config(path: &str) -> Result<Config, ThermalStreamError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ThermalStreamError::config("read", format!("'{path}': {e}")))?;
    parse_config(&content).map_err(|e| ThermalStreamError::config("parse", format!("'{path}': {e}")))
}

fn parse_config(content: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(content)
}

/// Отсутствующий файл допустим (всё из env/CLI), битый нет.
fn load_or_default(path: &str) -> Result<Config, ThermalStreamError> {
    match load_config(path) {
        Ok(c) => Ok(c),
        Err(e) if Path::new(path).exists() => Err(e),
        Err(_) => {
            tracing::debug!(config = %path, "config file not found, using defaults");
            Ok(Config::default())
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Effective: merged config
// ═══════════════════════════════════════════════════════════════

/// Куда писать/откуда читать записи.
#[derive(Debug, Clone)]
pub enum StoreTarget {
    S2 { token: String, config: S2Config },
    Memory(MemoryStoreConfig),
}

/// Итоговая конфигурация после мержа: config.toml < env/CLI
#[derive(Debug, Clone)]
pub struct Effective {
    pub sensor: SensorConfig,
    pub store: StoreTarget,
    pub stream: StreamRef,
    pub detector: DetectorConfig,
    pub pipeline: PipelineConfig,
}

impl Effective {
    pub fn for_run(args: &RunArgs) -> Result<Self, ThermalStreamError> {
        Self::merge_run(args, load_or_default(&args.stream.config)?)
    }

    fn merge_run(args: &RunArgs, cfg: Config) -> Result<Self, ThermalStreamError> {
        let sensor = cfg
            .sensor
            .clone()
            .ok_or_else(|| ThermalStreamError::config("sensor", "no [sensor] section in config"))?;
        if !cfg.detector.threshold.is_finite() {
            return Err(ThermalStreamError::config("detector", "threshold must be a finite number"));
        }
        cfg.pipeline
            .validate()
            .map_err(|e| ThermalStreamError::config("pipeline", e))?;

        let store_cfg = if args.dry_run {
            StoreConfig::Memory(MemoryStoreConfig::default())
        } else {
            cfg.store.clone().unwrap_or(StoreConfig::S2(S2Config::default()))
        };
        let (store, stream) = resolve_store(&args.stream, &cfg, store_cfg)?;

        Ok(Self { sensor, store, stream, detector: cfg.detector, pipeline: cfg.pipeline })
    }
}

/// Параметры `tail`: читать можно только из S2.
#[derive(Debug, Clone)]
pub struct TailTarget {
    pub token: String,
    pub config: S2Config,
    pub stream: StreamRef,
}

impl TailTarget {
    pub fn new(args: &TailArgs) -> Result<Self, ThermalStreamError> {
        Self::merge(args, load_or_default(&args.stream.config)?)
    }

    fn merge(args: &TailArgs, cfg: Config) -> Result<Self, ThermalStreamError> {
        if args.limit == 0 || args.poll_ms == 0 {
            return Err(ThermalStreamError::config("cli", "--limit and --poll-ms must be > 0"));
        }
        let store_cfg = cfg.store.clone().unwrap_or(StoreConfig::S2(S2Config::default()));
        match resolve_store(&args.stream, &cfg, store_cfg)? {
            (StoreTarget::S2 { token, config }, stream) => Ok(Self { token, config, stream }),
            (StoreTarget::Memory(_), _) => Err(ThermalStreamError::config(
                "store",
                "tail reads from S2; the memory store lives only inside a run",
            )),
        }
    }
}

fn resolve_store(
    args: &StreamArgs,
    cfg: &Config,
    store: StoreConfig,
) -> Result<(StoreTarget, StreamRef), ThermalStreamError> {
    let basin = args.basin.clone().or_else(|| cfg.basin.clone());
    let stream = args.stream.clone().or_else(|| cfg.stream.clone());

    match store {
        StoreConfig::S2(config) => {
            let token = non_empty(args.token.clone()).ok_or_else(|| missing("S2_AUTH_TOKEN", "token"))?;
            let basin = non_empty(basin).ok_or_else(|| missing("BASIN", "basin"))?;
            let stream = non_empty(stream).ok_or_else(|| missing("STREAM", "stream"))?;
            Ok((StoreTarget::S2 { token, config }, StreamRef::new(basin, stream)))
        }
        StoreConfig::Memory(config) => {
            let basin = non_empty(basin).unwrap_or_else(|| "local".into());
            let stream = non_empty(stream).unwrap_or_else(|| "thermal".into());
            Ok((StoreTarget::Memory(config), StreamRef::new(basin, stream)))
        }
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

fn missing(var: &str, flag: &str) -> ThermalStreamError {
    ThermalStreamError::config("env", format!("{var} is not set (env or --{flag})"))
}
