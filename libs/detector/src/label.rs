use std::collections::VecDeque;

use crate::config::Connectivity;

const NEIGHBORS_4: [(isize, isize); 4] = [(-1, 0), (0, -1), (0, 1), (1, 0)];
const NEIGHBORS_8: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Разметка маски на связные компоненты.
///
/// `labels[i] == 0` это фон, иначе номер компоненты `1..=count()`.
#[derive(Debug, Clone)]
pub struct Labeling {
    labels: Vec<u32>,
    sizes: Vec<usize>,
}

impl Labeling {
    /// Число компонент (K).
    pub fn count(&self) -> usize {
        self.sizes.len()
    }

    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    /// Размеры компонент, индекс `label - 1`.
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }
}

/// BFS-заливка по row-major маске. O(rows × cols).
pub fn label_components(mask: &[bool], rows: usize, cols: usize, connectivity: Connectivity) -> Labeling {
    debug_assert_eq!(mask.len(), rows * cols);

    let neighbors: &[(isize, isize)] = match connectivity {
        Connectivity::Four => &NEIGHBORS_4,
        Connectivity::Eight => &NEIGHBORS_8,
    };

    let mut labels = vec![0u32; mask.len()];
    let mut sizes = Vec::new();
    let mut queue = VecDeque::new();

    for start in 0..mask.len() {
        if !mask[start] || labels[start] != 0 {
            continue;
        }

        let label = sizes.len() as u32 + 1;
        labels[start] = label;
        queue.push_back(start);
        let mut size = 0;

        while let Some(idx) = queue.pop_front() {
            size += 1;
            let (y, x) = (idx / cols, idx % cols);

            for &(dy, dx) in neighbors {
                let ny = y.wrapping_add_signed(dy);
                let nx = x.wrapping_add_signed(dx);
                if ny < rows && nx < cols {
                    let n = ny * cols + nx;
                    if mask[n] && labels[n] == 0 {
                        labels[n] = label;
                        queue.push_back(n);
                    }
                }
            }
        }

        sizes.push(size);
    }

    Labeling { labels, sizes }
}
