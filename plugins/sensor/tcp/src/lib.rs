//! Кадры от моста сенсора по TCP: одна JSON-сетка на строку.
//!
//! Мост это любой процесс, владеющий шиной I2C (микроконтроллер, helper
//! на Python), который пишет строки `[[..], ..]` или `{"pixels": [[..], ..]}`.

mod framing;

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use thermal_api::{Frame, FrameSource, PluginError};

pub use framing::LinesFraming;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct TcpSensorConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Сколько ждать очередную строку, прежде чем считать чтение сбоем.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Максимальная длина строки в байтах (0 = без ограничения).
    #[serde(default = "default_max_line")]
    pub max_line: usize,
}

fn default_connect_timeout_ms() -> u64 {
    500
}
fn default_read_timeout_ms() -> u64 {
    2_000
}
fn default_max_line() -> usize {
    64 * 1024
}

pub struct TcpSensor {
    addr: String,
    connect_timeout: Duration,
    read_timeout: Duration,
    framing: LinesFraming,
    stream: Option<TcpStream>,
    buf: Vec<u8>,
}

impl TcpSensor {
    pub fn new(cfg: &TcpSensorConfig) -> Self {
        Self {
            addr: format!("{}:{}", cfg.host, cfg.port),
            connect_timeout: Duration::from_millis(cfg.connect_timeout_ms),
            read_timeout: Duration::from_millis(cfg.read_timeout_ms),
            framing: LinesFraming::new(cfg.max_line),
            stream: None,
            buf: Vec::with_capacity(8192),
        }
    }

    fn connect(&mut self) -> Result<(), PluginError> {
        let addr = self
            .addr
            .to_socket_addrs()
            .map_err(|e| PluginError::io(format!("resolve {}: {e}", self.addr)))?
            .next()
            .ok_or_else(|| PluginError::config(format!("{} resolves to nothing", self.addr)))?;
        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout)
            .map_err(|e| PluginError::io(format!("TCP connect to {}: {e}", self.addr)))?;
        stream.set_read_timeout(Some(self.read_timeout))?;
        self.buf.clear();
        self.stream = Some(stream);
        tracing::info!(addr = %self.addr, "sensor bridge connected");
        Ok(())
    }

    fn drop_connection(&mut self, reason: &PluginError) {
        tracing::warn!(addr = %self.addr, error = %reason, "sensor bridge disconnected");
        self.stream = None;
        self.buf.clear();
    }

    /// Блокирует до полной строки в буфере. Ok(None) = мост закрыл сокет.
    fn next_line(&mut self) -> Result<Option<Vec<u8>>, PluginError> {
        let mut tmp = [0u8; 4096];
        loop {
            if let Some((line, consumed)) = self.framing.decode(&self.buf)? {
                self.buf.drain(..consumed);
                return Ok(Some(line));
            }
            let Some(stream) = self.stream.as_mut() else {
                return Err(PluginError::new("sensor bridge not connected"));
            };
            match stream.read(&mut tmp) {
                Ok(0) => return Ok(None),
                Ok(n) => self.buf.extend_from_slice(&tmp[..n]),
                Err(e) => return Err(PluginError::io(format!("read from {}: {e}", self.addr))),
            }
        }
    }
}

impl FrameSource for TcpSensor {
    fn name(&self) -> &str {
        "tcp"
    }

    fn init(&mut self) -> Result<(), PluginError> {
        self.connect()
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, PluginError> {
        // Ленивый реконнект после обрыва; неудача здесь это обычный
        // сбой чтения, пайплайн сделает backoff и позовёт снова.
        if self.stream.is_none() {
            self.connect()?;
        }

        match self.next_line() {
            Ok(Some(line)) => Frame::from_json(&line).map(Some),
            Ok(None) => {
                let err = PluginError::io(format!("{} closed the connection", self.addr));
                self.drop_connection(&err);
                Err(err)
            }
            Err(e) => {
                // Слишком длинный мусор или мёртвый сокет: ресинк через новое соединение.
                self.drop_connection(&e);
                Err(e)
            }
        }
    }
}
