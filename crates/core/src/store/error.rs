use std::fmt;

/// Contract violations rejected at the store boundary. Soft not-found cases
/// are not errors; they surface as `false`/no-op returns instead.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    DuplicateTicker(String),
    EmptyTicker,
    InvalidPrice { ticker: String, value: f64 },
    InvalidAmountPct { ticker: String, value: f64 },
    InvalidNewShares { ticker: String, value: f64 },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::DuplicateTicker(ticker) => {
                write!(f, "holding already exists for ticker {ticker}")
            }
            StoreError::EmptyTicker => write!(f, "ticker must be non-empty"),
            StoreError::InvalidPrice { ticker, value } => {
                write!(f, "price for {ticker} must be a non-negative number (got {value})")
            }
            StoreError::InvalidAmountPct { ticker, value } => {
                write!(f, "amountPct for {ticker} must be finite (got {value})")
            }
            StoreError::InvalidNewShares { ticker, value } => {
                write!(f, "newShares for {ticker} must be a non-negative number (got {value})")
            }
        }
    }
}

impl std::error::Error for StoreError {}
