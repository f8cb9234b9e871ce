use thermal_api::{Frame, OccupancyResult};

use crate::config::DetectorConfig;
use crate::label::{Labeling, label_components};

/// Горячее пятно, прошедшее фильтр по размеру.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub label: u32,
    pub size: usize,
    /// Максимальная температура внутри пятна.
    pub peak: f64,
    /// Центр масс пятна в координатах сетки (row, col).
    pub centroid: (f64, f64),
}

/// Подробный результат анализа одного кадра.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub occupied: bool,
    /// Все компоненты маски, включая шумовые.
    pub components: usize,
    /// Только валидные кластеры (size > min_cluster_size).
    pub clusters: Vec<Cluster>,
}

/// Детектор присутствия: порог → разметка компонент → фильтр по размеру.
///
/// Чистая функция от кадра, состояния между кадрами нет.
#[derive(Debug, Clone, Default)]
pub struct OccupancyDetector {
    config: DetectorConfig,
}

impl OccupancyDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// `mask[i] = cell[i] > threshold`.
    pub fn mask(&self, frame: &Frame) -> Vec<bool> {
        frame.cells().iter().map(|&v| v > self.config.threshold).collect()
    }

    pub fn label(&self, frame: &Frame) -> Labeling {
        label_components(&self.mask(frame), frame.rows(), frame.cols(), self.config.connectivity)
    }

    pub fn analyze(&self, frame: &Frame) -> Detection {
        let labeling = self.label(frame);

        let mut peaks = vec![f64::NEG_INFINITY; labeling.count()];
        let mut row_sums = vec![0.0; labeling.count()];
        let mut col_sums = vec![0.0; labeling.count()];
        for (i, (&label, &value)) in labeling.labels().iter().zip(frame.cells()).enumerate() {
            if label == 0 {
                continue;
            }
            let k = label as usize - 1;
            peaks[k] = peaks[k].max(value);
            row_sums[k] += (i / frame.cols()) as f64;
            col_sums[k] += (i % frame.cols()) as f64;
        }

        let clusters: Vec<Cluster> = labeling
            .sizes()
            .iter()
            .enumerate()
            .filter(|&(_, &size)| size > self.config.min_cluster_size)
            .map(|(k, &size)| Cluster {
                label: k as u32 + 1,
                size,
                peak: peaks[k],
                centroid: (row_sums[k] / size as f64, col_sums[k] / size as f64),
            })
            .collect();

        Detection {
            occupied: !clusters.is_empty(),
            components: labeling.count(),
            clusters,
        }
    }

    pub fn is_occupied(&self, frame: &Frame) -> bool {
        self.label(frame)
            .sizes()
            .iter()
            .any(|&size| size > self.config.min_cluster_size)
    }

    /// Кадр на входе, `{occupied, grid}` на выходе. Сетка передаётся без изменений.
    pub fn detect(&self, frame: Frame) -> OccupancyResult {
        OccupancyResult {
            occupied: self.is_occupied(&frame),
            grid: frame,
        }
    }
}
