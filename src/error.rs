pub type TreadleResult<T> = Result<T, TreadleError>;

#[derive(thiserror::Error, Debug)]
pub enum TreadleError {
    #[error("open failure: {0}")]
    Open(String),

    #[error("invalid connection: {0}")]
    Connection(String),

    #[error("parse failure: {0}")]
    Parse(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("underrun stall: {0}")]
    Stall(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TreadleError {
    pub fn open(msg: impl Into<String>) -> Self {
        Self::Open(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn stall(msg: impl Into<String>) -> Self {
        Self::Stall(msg.into())
    }
}
