/// Crate-wide result type for gateway and delivery operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed errors shared by gateways and the outbound path.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Operation is currently unavailable (not connected, queue closed).
    #[error("channel operation unavailable: {message}")]
    Unavailable { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    #[must_use]
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }
}
