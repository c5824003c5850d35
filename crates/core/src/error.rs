/// Result alias that carries the custom [`TabVizError`] type.
pub type Result<T> = std::result::Result<T, TabVizError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum TabVizError {
    /// Free-form failure, mostly raised by behavior hooks that have no more
    /// specific variant to report.
    #[error("{0}")]
    Message(String),
    /// A behavior manager already holds an entry under this name.
    #[error("a behavior named `{0}` is already registered")]
    DuplicateName(String),
    /// No entry is registered under this name.
    #[error("no behavior named `{0}` is registered")]
    UnknownName(String),
    /// The entry exists but its weak reference no longer resolves.
    #[error("behavior `{0}` has expired")]
    Expired(String),
    /// The entry resolved to a behavior of another concrete type.
    #[error("behavior `{name}` is not a `{expected}`")]
    TypeMismatch {
        name: String,
        expected: &'static str,
    },
    /// The manager export view cannot be turned back into a manager.
    #[error("the behavior manager export view is write-only and cannot be deserialized")]
    ExportIsWriteOnly,
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("fft failed: {0}")]
    Fft(#[from] realfft::FftError),
}

impl TabVizError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for TabVizError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for TabVizError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
