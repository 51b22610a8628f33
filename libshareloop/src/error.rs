//! Error types for Shareloop

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShareloopError>;

#[derive(Error, Debug)]
pub enum ShareloopError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ShareloopError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ShareloopError::InvalidInput(_) => 3,
            ShareloopError::Platform(PlatformError::Authentication(_)) => 2,
            ShareloopError::Config(_) => 2,
            ShareloopError::Platform(_) => 1,
            ShareloopError::Generation(_) => 1,
            ShareloopError::Database(_) => 1,
        }
    }

    /// Whether the failure is worth retrying on a later rotation turn.
    ///
    /// Transient failures (network, rate limit, generation) leave no
    /// idempotency marker, so the item stays a valid candidate. Permanent
    /// failures (auth, validation) need operator intervention first.
    pub fn is_transient(&self) -> bool {
        match self {
            ShareloopError::Platform(e) => matches!(
                e,
                PlatformError::Network(_) | PlatformError::RateLimit(_)
            ),
            ShareloopError::Generation(_) => true,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Value out of range: {0}")]
    OutOfRange(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Publishing failed: {0}")]
    Publishing(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),
}

#[derive(Error, Debug, Clone)]
pub enum GenerationError {
    #[error("Generation request failed: {0}")]
    Request(String),

    #[error("Generation returned empty content: {0}")]
    Empty(String),

    #[error("Missing generated image: {0}")]
    MissingImage(String),
}
