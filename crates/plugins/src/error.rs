use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("plugin {name} is already registered")]
    DuplicatePlugin { name: String },

    #[error("unknown plugin: {name}")]
    UnknownPlugin { name: String },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn duplicate_plugin(name: impl Into<String>) -> Self {
        Self::DuplicatePlugin { name: name.into() }
    }

    #[must_use]
    pub fn unknown_plugin(name: impl Into<String>) -> Self {
        Self::UnknownPlugin { name: name.into() }
    }

    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
