use thiserror::Error;

#[derive(Debug, Error)]
pub enum OriginError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
