use thermal_api::now_ms;

/// xorshift64: воспроизводимый шум для симуляции без внешних зависимостей.
pub struct Rng {
    state: u64,
}

impl Rng {
    /// `seed == 0` берёт seed из текущего времени.
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { now_ms() as u64 | 1 } else { seed };
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    /// f64 в [0, 1)
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / ((1u64 << 53) as f64)
    }

    /// Симметричный шум в [-amplitude, amplitude).
    pub fn jitter(&mut self, amplitude: f64) -> f64 {
        (self.next_f64() * 2.0 - 1.0) * amplitude
    }

    pub fn next_intn(&mut self, n: usize) -> usize {
        (self.next_u64() % n.max(1) as u64) as usize
    }

    pub fn chance(&mut self, p: f64) -> bool {
        p > 0.0 && self.next_f64() < p
    }
}
