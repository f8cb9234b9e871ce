use thermal_api::PluginError;

/// Разбиение потока по переводу строки. Состояния нет, буфер у вызывающего.
#[derive(Debug, Clone, Copy)]
pub struct LinesFraming {
    max_length: usize,
}

impl LinesFraming {
    /// `max_length == 0` отключает лимит.
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }

    /// Извлечь одну строку из буфера.
    /// Возвращает (line, bytes_consumed) или None, если строка неполная.
    pub fn decode(&self, buf: &[u8]) -> Result<Option<(Vec<u8>, usize)>, PluginError> {
        let Some(pos) = buf.iter().position(|&b| b == b'\n') else {
            if self.max_length > 0 && buf.len() > self.max_length {
                return Err(PluginError::format_err(format!(
                    "line too long: {} bytes (max {}) and no newline found",
                    buf.len(),
                    self.max_length
                )));
            }
            return Ok(None);
        };

        let line = buf[..pos].strip_suffix(b"\r").unwrap_or(&buf[..pos]);
        if self.max_length > 0 && line.len() > self.max_length {
            return Err(PluginError::format_err(format!(
                "line too long: {} bytes (max {})",
                line.len(),
                self.max_length
            )));
        }

        Ok(Some((line.to_vec(), pos + 1)))
    }
}
