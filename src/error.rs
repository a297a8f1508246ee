use thiserror::Error;

/// Main error type for the ingestion and scoring pipeline
#[derive(Error, Debug)]
pub enum RinkError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Store error: {0}")]
    Store(String),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Payload errors
    #[error("Invalid payload for game {game_id}: {reason}")]
    InvalidPayload { game_id: i64, reason: String },

    // Scoring errors
    #[error("Model load error: {0}")]
    ModelLoad(String),

    #[error("Scoring error: {0}")]
    Scoring(String),

    // Persistence verification
    #[error("Persistence verification failed for game {game_id}: expected {expected} rows, found {found}")]
    PersistenceVerification {
        game_id: i64,
        expected: usize,
        found: usize,
    },

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for RinkError
pub type Result<T> = std::result::Result<T, RinkError>;

/// Failures of a single upstream HTTP call, after retries
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    /// 5xx / 429 / network failures that exhausted the retry budget.
    #[error("Transient fetch failure for {url} after {attempts} attempts: {message}")]
    Transient {
        url: String,
        status: Option<u16>,
        attempts: u32,
        message: String,
    },

    /// 404-class failures. Not retried this cycle.
    #[error("Permanent fetch failure for {url}: status {status}")]
    Permanent { url: String, status: u16 },

    #[error("Undecodable response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, FetchError::Permanent { .. })
    }
}

/// Per-event extraction failures. Contained: they never abort the game.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractError {
    #[error("Malformed event at index {index}: {reason}")]
    MalformedEvent { index: usize, reason: String },

    #[error("Missing geometry for shot at index {index}")]
    MissingGeometry { index: usize },
}

impl ExtractError {
    pub fn index(&self) -> usize {
        match self {
            ExtractError::MalformedEvent { index, .. } => *index,
            ExtractError::MissingGeometry { index } => *index,
        }
    }
}
