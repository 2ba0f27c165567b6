#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid passive trigger {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
