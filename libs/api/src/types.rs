use serde::{Deserialize, Serialize};

use crate::PluginError;

// ════════════════════════════════════════════════════════════════
//  Overflow Policy
// ════════════════════════════════════════════════════════════════

/// Стратегия поведения при переполнении bounded очереди записей.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// try_send(): если очередь полна, новая запись дропается и логируется.
    Drop,
    /// .send().await: продюсер ждёт, пока появится место (back-pressure).
    #[default]
    #[serde(alias = "backpressure")]
    BackPressure,
}

// ════════════════════════════════════════════════════════════════
//  Frame
// ════════════════════════════════════════════════════════════════

/// Один снимок сенсора: прямоугольная сетка температур (rows × cols).
///
/// Неизменяем после создания. Все конструкторы проверяют форму сетки
/// и конечность значений, поэтому остальной код может полагаться на
/// `cells.len() == rows * cols`.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    rows: usize,
    cols: usize,
    cells: Vec<f64>,
}

impl Frame {
    /// Собрать из плоского row-major вектора.
    pub fn new(rows: usize, cols: usize, cells: Vec<f64>) -> Result<Self, PluginError> {
        if rows == 0 || cols == 0 {
            return Err(PluginError::format_err(format!("empty grid: {rows}x{cols}")));
        }
        if cells.len() != rows * cols {
            return Err(PluginError::format_err(format!(
                "grid {rows}x{cols} needs {} cells, got {}",
                rows * cols,
                cells.len()
            )));
        }
        if let Some(i) = cells.iter().position(|v| !v.is_finite()) {
            return Err(PluginError::format_err(format!(
                "non-finite reading at ({}, {})",
                i / cols,
                i % cols
            )));
        }
        Ok(Self { rows, cols, cells })
    }

    /// Собрать из вложенных строк; строки разной длины отклоняются.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, PluginError> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        let n_rows = rows.len();
        let mut cells = Vec::with_capacity(n_rows * cols);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != cols {
                return Err(PluginError::format_err(format!(
                    "ragged grid: row {i} has {} cells, expected {cols}",
                    row.len()
                )));
            }
            cells.extend(row);
        }
        Self::new(n_rows, cols, cells)
    }

    /// Сетка, в которой все клетки равны `value`.
    pub fn uniform(rows: usize, cols: usize, value: f64) -> Result<Self, PluginError> {
        Self::new(rows, cols, vec![value; rows * cols])
    }

    /// Разобрать одну строку сенсора: голая сетка `[[..], ..]` или объект
    /// с сеткой в поле `grid` (мосты сенсоров называют его `pixels`).
    pub fn from_json(data: &[u8]) -> Result<Self, PluginError> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum GridLine {
            Bare(Vec<Vec<f64>>),
            Wrapped {
                #[serde(alias = "pixels")]
                grid: Vec<Vec<f64>>,
            },
        }

        let rows = match serde_json::from_slice::<GridLine>(data)? {
            GridLine::Bare(rows) => rows,
            GridLine::Wrapped { grid } => grid,
        };
        Self::from_rows(rows)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Показания в порядке row-major.
    pub fn cells(&self) -> &[f64] {
        &self.cells
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        self.cells.chunks_exact(self.cols)
    }

    pub fn max(&self) -> f64 {
        self.cells.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn min(&self) -> f64 {
        self.cells.iter().copied().fold(f64::INFINITY, f64::min)
    }
}

impl Serialize for Frame {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeSeq;
        let mut seq = serializer.serialize_seq(Some(self.rows))?;
        for row in self.iter_rows() {
            seq.serialize_element(row)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Frame {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let rows = Vec::<Vec<f64>>::deserialize(deserializer)?;
        Frame::from_rows(rows).map_err(serde::de::Error::custom)
    }
}

// ════════════════════════════════════════════════════════════════
//  OccupancyResult
// ════════════════════════════════════════════════════════════════

/// Результат детекции: флаг присутствия и исходная сетка без изменений.
/// `occupied` полностью выводится из `grid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancyResult {
    pub occupied: bool,
    pub grid: Frame,
}

// ════════════════════════════════════════════════════════════════
//  Record / AppendAck
// ════════════════════════════════════════════════════════════════

/// Непрозрачный payload одной записи лога. Порядковый номер назначает
/// хранилище при append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    body: Vec<u8>,
}

impl Record {
    pub fn new(body: Vec<u8>) -> Self {
        Self { body }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.body
    }
}

/// Ответ хранилища на один append: диапазон `[start_seq, end_seq)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendAck {
    pub start_seq: u64,
    pub end_seq: u64,
}

impl AppendAck {
    pub fn new(start_seq: u64, end_seq: u64) -> Result<Self, PluginError> {
        if end_seq < start_seq {
            return Err(PluginError::new(format!(
                "invalid ack range [{start_seq}, {end_seq})"
            )));
        }
        Ok(Self { start_seq, end_seq })
    }

    /// Сколько записей добавил батч.
    pub fn count(&self) -> u64 {
        self.end_seq - self.start_seq
    }
}

/// Запись, прочитанная из лога.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRecord {
    pub seq_num: u64,
    pub body: Vec<u8>,
}

// ════════════════════════════════════════════════════════════════
//  StreamRef
// ════════════════════════════════════════════════════════════════

/// Адрес стрима в хранилище: basin (namespace) + имя стрима.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamRef {
    pub basin: String,
    pub stream: String,
}

impl StreamRef {
    pub fn new(basin: impl Into<String>, stream: impl Into<String>) -> Self {
        Self { basin: basin.into(), stream: stream.into() }
    }
}

impl std::fmt::Display for StreamRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.basin, self.stream)
    }
}
