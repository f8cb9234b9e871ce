//! Симуляция тепловой матрицы 8×8 (как AMG8833) для запуска пайплайна
//! без железа.

mod rng;

use thermal_api::{Frame, FrameSource, PluginError};

pub use rng::Rng;

/// AMG8833 отдаёт значения с шагом 0.25 °C.
const RESOLUTION: f64 = 0.25;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SimConfig {
    #[serde(default = "default_side")]
    pub rows: usize,
    #[serde(default = "default_side")]
    pub cols: usize,
    /// Температура пустой комнаты, °C.
    #[serde(default = "default_ambient")]
    pub ambient: f64,
    /// Амплитуда шума каждой клетки.
    #[serde(default = "default_noise")]
    pub noise: f64,
    /// Температура «человека».
    #[serde(default = "default_body_temp")]
    pub body_temp: f64,
    /// Сторона квадрата, который занимает человек в сетке.
    #[serde(default = "default_body_size")]
    pub body_size: usize,
    /// Цикл: `absence_frames` пустых кадров, затем `presence_frames` с человеком.
    #[serde(default = "default_phase_frames")]
    pub absence_frames: u64,
    #[serde(default = "default_phase_frames")]
    pub presence_frames: u64,
    /// Вероятность одиночного «горячего» пикселя (шум сенсора).
    #[serde(default = "default_hot_pixel_chance")]
    pub hot_pixel_chance: f64,
    /// Вероятность сбоя чтения с шины.
    #[serde(default)]
    pub read_error_chance: f64,
    /// Сколько первых попыток init завершатся ошибкой.
    #[serde(default)]
    pub init_failures: u32,
    /// После стольких кадров источник исчерпан (None = бесконечно).
    #[serde(default)]
    pub max_frames: Option<u64>,
    #[serde(default)]
    pub seed: u64,
}

fn default_side() -> usize {
    8
}
fn default_ambient() -> f64 {
    21.0
}
fn default_noise() -> f64 {
    0.5
}
fn default_body_temp() -> f64 {
    31.0
}
fn default_body_size() -> usize {
    3
}
fn default_phase_frames() -> u64 {
    50
}
fn default_hot_pixel_chance() -> f64 {
    0.02
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            rows: default_side(),
            cols: default_side(),
            ambient: default_ambient(),
            noise: default_noise(),
            body_temp: default_body_temp(),
            body_size: default_body_size(),
            absence_frames: default_phase_frames(),
            presence_frames: default_phase_frames(),
            hot_pixel_chance: default_hot_pixel_chance(),
            read_error_chance: 0.0,
            init_failures: 0,
            max_frames: None,
            seed: 0,
        }
    }
}

pub struct SimulatedSensor {
    cfg: SimConfig,
    rng: Rng,
    frames: u64,
    body: (usize, usize),
    init_attempts: u32,
    initialized: bool,
}

impl SimulatedSensor {
    pub fn new(cfg: SimConfig) -> Result<Self, PluginError> {
        if cfg.rows == 0 || cfg.cols == 0 {
            return Err(PluginError::config(format!("sim grid {}x{} is empty", cfg.rows, cfg.cols)));
        }
        if cfg.body_size > cfg.rows.min(cfg.cols) {
            return Err(PluginError::config(format!(
                "sim body_size {} does not fit a {}x{} grid",
                cfg.body_size, cfg.rows, cfg.cols
            )));
        }
        let rng = Rng::new(cfg.seed);
        let body = ((cfg.rows - cfg.body_size) / 2, (cfg.cols - cfg.body_size) / 2);
        Ok(Self {
            cfg,
            rng,
            frames: 0,
            body,
            init_attempts: 0,
            initialized: false,
        })
    }

    fn present(&self) -> bool {
        let cycle = self.cfg.absence_frames + self.cfg.presence_frames;
        cycle > 0 && self.frames % cycle >= self.cfg.absence_frames
    }

    /// Случайное блуждание человека, не больше клетки за кадр.
    fn wander(&mut self) {
        let max_r = self.cfg.rows - self.cfg.body_size;
        let max_c = self.cfg.cols - self.cfg.body_size;
        let step = |rng: &mut Rng, pos: usize, max: usize| match rng.next_intn(3) {
            0 => pos.saturating_sub(1),
            1 => (pos + 1).min(max),
            _ => pos,
        };
        self.body = (step(&mut self.rng, self.body.0, max_r), step(&mut self.rng, self.body.1, max_c));
    }

    fn quantize(v: f64) -> f64 {
        (v / RESOLUTION).round() * RESOLUTION
    }

    fn render(&mut self) -> Result<Frame, PluginError> {
        let SimConfig { rows, cols, ambient, noise, body_temp, body_size, hot_pixel_chance, .. } = self.cfg;
        let mut cells = Vec::with_capacity(rows * cols);
        for _ in 0..rows * cols {
            let v = if self.rng.chance(hot_pixel_chance) {
                body_temp
            } else {
                ambient + self.rng.jitter(noise)
            };
            cells.push(v);
        }

        if self.present() {
            let (top, left) = self.body;
            for r in top..top + body_size {
                for c in left..left + body_size {
                    cells[r * cols + c] = body_temp + self.rng.jitter(noise);
                }
            }
            self.wander();
        }

        Frame::new(rows, cols, cells.into_iter().map(Self::quantize).collect())
    }
}

impl FrameSource for SimulatedSensor {
    fn name(&self) -> &str {
        "sim"
    }

    fn init(&mut self) -> Result<(), PluginError> {
        if self.init_attempts < self.cfg.init_failures {
            self.init_attempts += 1;
            return Err(PluginError::io(format!(
                "simulated bus handshake failed (attempt {})",
                self.init_attempts
            )));
        }
        self.initialized = true;
        tracing::info!(rows = self.cfg.rows, cols = self.cfg.cols, seed = self.cfg.seed, "simulated sensor ready");
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, PluginError> {
        if !self.initialized {
            return Err(PluginError::new("simulated sensor read before init"));
        }
        if self.cfg.max_frames.is_some_and(|max| self.frames >= max) {
            return Ok(None);
        }
        if self.rng.chance(self.cfg.read_error_chance) {
            self.frames += 1;
            return Err(PluginError::io("simulated I2C read error"));
        }
        let frame = self.render()?;
        self.frames += 1;
        Ok(Some(frame))
    }
}
