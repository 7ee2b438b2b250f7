use thiserror::Error;

#[derive(Error, Debug)]
pub enum SonorityError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Decode failure: {0}")]
    DecodeFailure(String),

    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Buffer cache over budget: {resident} bytes resident, maximum is {max}")]
    CacheOverflow { resident: usize, max: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Worker error: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, SonorityError>;
