/// Shared error type for configuration handling across toolwire crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("unknown target: {0}")]
    UnknownTarget(String),
}

pub type Result<T> = std::result::Result<T, Error>;
