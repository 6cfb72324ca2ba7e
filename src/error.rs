use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmitterError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid content key: {0}")]
    InvalidKey(String),

    #[error("Config error: {0}")]
    Config(String),
}

pub type EmitterResult<T> = Result<T, EmitterError>;

impl EmitterError {
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        EmitterError::InvalidArgument(message.into())
    }
}
