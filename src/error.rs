use thiserror::Error;

/// Malformed caller input, rejected before any simulation starts
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InputError {
    #[error("portfolio has no positions")]
    EmptyPortfolio,

    #[error("negative weight {weight} for {ticker}")]
    NegativeWeight { ticker: String, weight: f64 },

    #[error("weight for {ticker} is not a finite number")]
    InvalidWeight { ticker: String },

    #[error("weights sum to {total}, cannot normalize")]
    ZeroTotalWeight { total: f64 },

    #[error("unknown asset class '{0}'")]
    UnknownAssetClass(String),

    #[error("unknown scenario '{0}'")]
    UnknownScenario(String),

    #[error("invalid horizon {0} years (must be finite, > 0 and <= 50)")]
    InvalidHorizon(f64),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Why a ticker's inputs could not be assembled
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DataGap {
    #[error("insufficient history: {found} returns, need {required}")]
    InsufficientHistory { found: usize, required: usize },

    #[error("missing year-1 return estimate")]
    MissingYear1Return,

    #[error("price series contains a non-positive price")]
    NonPositivePrice,

    /// Flat or otherwise degenerate history, typically a stale feed
    #[error("price history yields no usable volatility")]
    NoVolatility,

    #[error("price fetch failed: {0}")]
    FetchFailed(String),

    #[error("price fetch timed out after {0}s")]
    Timeout(u64),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache worker failed: {0}")]
    Worker(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    Input(#[from] InputError),

    #[error("data unavailable for {ticker}: {gap}")]
    DataUnavailable { ticker: String, gap: DataGap },

    /// Percentile inversion or a non-finite statistic. Always a defect, never retried.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

impl EngineError {
    pub fn data_unavailable(ticker: &str, gap: DataGap) -> Self {
        EngineError::DataUnavailable {
            ticker: ticker.to_string(),
            gap,
        }
    }

    pub fn is_input_error(&self) -> bool {
        matches!(self, EngineError::Input(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::InvariantViolation(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
