use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Format error: {0}")]
    Format(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Panel id out of range: {0}")]
    PanelOutOfRange(i64),
}

impl Error {
    pub fn format_error(msg: &str) -> Self {
        Self::Format(msg.to_string())
    }

    pub fn invalid_data(msg: &str) -> Self {
        Self::InvalidData(msg.to_string())
    }

    /// Get a human-readable category for this error
    pub fn category(&self) -> &'static str {
        match self {
            Error::Format(_) => "Format",
            Error::InvalidData(_) => "InvalidData",
            Error::PanelOutOfRange(_) => "Addressing",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
