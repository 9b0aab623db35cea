use async_openai::error::OpenAIError;
use thiserror::Error;

/// Everything that can go wrong while answering a request.
#[derive(Error, Debug)]
pub enum Error {
    /// Caller supplied empty or malformed input.
    #[error("{0}")]
    Validation(String),

    /// An upstream lookup came back empty.
    #[error("{0} not found")]
    NotFound(String),

    /// Network, HTTP status, auth or decoding failure from any upstream service.
    #[error("upstream request failed: {0}")]
    Upstream(String),

    /// A required setting is missing or unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The assistant run was still pending after the last allowed poll.
    #[error("assistant run still pending after {attempts} polls")]
    Timeout { attempts: u32 },
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Upstream(err.to_string())
    }
}

impl From<OpenAIError> for Error {
    fn from(err: OpenAIError) -> Self {
        Error::Upstream(err.to_string())
    }
}
