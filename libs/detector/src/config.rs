use serde::Deserialize;

/// Соседство клеток при разметке компонент.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// Только соседи по горизонтали и вертикали.
    Four,
    /// Плюс диагональные соседи.
    #[default]
    Eight,
}

/// Параметры детектора присутствия (секция `[detector]`).
#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    /// Клетка «горячая», если её значение строго больше порога (°C).
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Кластер засчитывается, если в нём строго больше клеток.
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,
    #[serde(default)]
    pub connectivity: Connectivity,
}

fn default_threshold() -> f64 {
    28.0
}
fn default_min_cluster_size() -> usize {
    4
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            min_cluster_size: default_min_cluster_size(),
            connectivity: Connectivity::default(),
        }
    }
}
