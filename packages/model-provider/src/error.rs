use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelProviderError {
    #[error("request to model endpoint failed: {0}")]
    Request(String),
    #[error("model endpoint returned no choices")]
    EmptyResponse,
}

impl From<reqwest::Error> for ModelProviderError {
    fn from(e: reqwest::Error) -> Self {
        ModelProviderError::Request(e.to_string())
    }
}
