//! Реплей записанного захвата: одна JSON-сетка на строку.
//!
//! Понимает те же формы строк, что и TCP-мост, плюс записи, выгруженные
//! из самого лога (`{"occupied":..,"grid":[[..]]}`), так что стрим можно
//! прогнать через детектор повторно.

use std::path::PathBuf;

use thermal_api::{Frame, FrameSource, PluginError};

#[derive(Debug, Clone, serde::Deserialize)]
pub struct FileSensorConfig {
    pub path: PathBuf,
    /// Начать сначала по достижении конца файла вместо завершения.
    #[serde(default, rename = "loop")]
    pub looped: bool,
}

pub struct FileSensor {
    cfg: FileSensorConfig,
    lines: Vec<String>,
    pos: usize,
}

impl FileSensor {
    pub fn new(cfg: FileSensorConfig) -> Self {
        Self { cfg, lines: Vec::new(), pos: 0 }
    }

    /// Следующая строка и её номер в захвате (с 1).
    fn next_line(&mut self) -> Option<(usize, &str)> {
        if self.pos >= self.lines.len() {
            if !self.cfg.looped {
                return None;
            }
            tracing::debug!(path = %self.cfg.path.display(), "replay wrapped around");
            self.pos = 0;
        }
        let line = &self.lines[self.pos];
        self.pos += 1;
        Some((self.pos, line))
    }
}

impl FrameSource for FileSensor {
    fn name(&self) -> &str {
        "file"
    }

    fn init(&mut self) -> Result<(), PluginError> {
        let path = self.cfg.path.display().to_string();
        let content = std::fs::read_to_string(&self.cfg.path)
            .map_err(|e| PluginError::io(format!("cannot open {path}: {e}")))?;
        let lines: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_owned)
            .collect();
        if lines.is_empty() {
            return Err(PluginError::config(format!("file has no frames: {path}")));
        }
        tracing::info!(path = %path, frames = lines.len(), looped = self.cfg.looped, "replay loaded");
        self.lines = lines;
        self.pos = 0;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, PluginError> {
        if self.lines.is_empty() {
            return Err(PluginError::new("file sensor not initialised"));
        }
        match self.next_line() {
            Some((line_no, line)) => Frame::from_json(line.as_bytes())
                .map(Some)
                .map_err(|e| e.context(format!("line {line_no}"))),
            None => Ok(None),
        }
    }
}
