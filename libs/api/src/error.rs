/// Категория ошибки коллаборатора. По ней пайплайн решает, пропустить
/// кадр с backoff или остановиться.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Неверная конфигурация или отклонённый токен. Не лечится повтором.
    Config,
    /// Сбой шины, сокета или HTTP. Транзиентная, повтор может пройти.
    Io,
    /// Битая сетка или payload. Такой кадр/запись пропускается.
    Format,
    /// Неверное состояние: закрытая сессия, исчерпанный источник и прочее.
    Logic,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
            ErrorKind::Format => "format",
            ErrorKind::Logic => "logic",
        })
    }
}

/// Ошибка, общая для всех внешних коллабораторов: сенсоров, кодеков
/// и клиентов лог-хранилища.
///
/// `From` impls проставляют `ErrorKind` автоматически, так что в
/// реализациях можно пользоваться `?`.
#[derive(Clone)]
pub struct PluginError {
    kind: ErrorKind,
    message: String,
}

impl PluginError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Logic, msg)
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Config, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Io, msg)
    }

    pub fn format_err(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Format, msg)
    }

    pub fn with_kind(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Io может пройти при повторе, остальные нет.
    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Io
    }

    /// Добавить к сообщению место ошибки, kind не меняется.
    pub fn context(self, ctx: impl std::fmt::Display) -> Self {
        Self { kind: self.kind, message: format!("{ctx}: {}", self.message) }
    }
}

impl std::fmt::Debug for PluginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::fmt::Display for PluginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for PluginError {}

impl From<String> for PluginError {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for PluginError {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<std::io::Error> for PluginError {
    fn from(e: std::io::Error) -> Self {
        Self::io(e.to_string())
    }
}

impl From<serde_json::Error> for PluginError {
    fn from(e: serde_json::Error) -> Self {
        // Broken pipe при записи JSON остаётся I/O-ошибкой.
        if e.is_io() {
            return Self::io(e.to_string());
        }
        Self::format_err(e.to_string())
    }
}

impl From<std::str::Utf8Error> for PluginError {
    fn from(e: std::str::Utf8Error) -> Self {
        Self::format_err(e.to_string())
    }
}

impl From<std::string::FromUtf8Error> for PluginError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        Self::format_err(e.to_string())
    }
}
