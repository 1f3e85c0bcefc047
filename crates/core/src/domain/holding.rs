use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row per unique ticker. `shares: u64` keeps the non-negativity
/// invariant structural; `price` is validated at the store boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub ticker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    pub shares: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

/// Partial update merged into an existing holding. Absent fields are left
/// untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HoldingPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub shares: Option<u64>,
    #[serde(default)]
    pub price: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeSource {
    User,
    Ai,
}

/// Immutable history entry. `portfolio` is a value copy taken at snapshot
/// time; later store mutations never reach into recorded history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSnapshot {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub portfolio: Vec<Holding>,
    pub change_reason: String,
    pub source: ChangeSource,
}

/// The persisted `{holdings, history}` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub holdings: Vec<Holding>,
    pub history: Vec<PortfolioSnapshot>,
}

impl PortfolioState {
    /// Default starting portfolio used when no persisted slot exists.
    pub fn seed() -> Self {
        Self {
            holdings: vec![
                Holding {
                    ticker: "AAPL".to_string(),
                    name: Some("Apple".to_string()),
                    sector: Some("Tech".to_string()),
                    shares: 10,
                    price: Some(180.0),
                },
                Holding {
                    ticker: "XOM".to_string(),
                    name: Some("Exxon Mobil".to_string()),
                    sector: Some("Energy".to_string()),
                    shares: 5,
                    price: Some(110.0),
                },
            ],
            history: Vec::new(),
        }
    }
}
