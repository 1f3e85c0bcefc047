use crate::domain::holding::{
    ChangeSource, Holding, HoldingPatch, PortfolioSnapshot, PortfolioState,
};
use crate::domain::suggestion::{Suggestion, SuggestionAction};
use chrono::Utc;
use std::collections::HashMap;
use uuid::Uuid;

pub mod error;

pub use error::StoreError;

/// Single source of truth for the holding set and the append-only change
/// history.
///
/// The store is an explicitly constructed value: callers own an instance and
/// pass it where it is needed. Mutations are synchronous and run to
/// completion; concurrent access must be serialized behind one mutex (the
/// API does exactly that).
///
/// Mutation operations do not record snapshots themselves; `log_snapshot` is
/// invoked separately by the caller. The one exception is
/// `apply_suggestions`, which commits a whole batch and records exactly one
/// `ai` snapshot for it.
#[derive(Debug, Clone, Default)]
pub struct PortfolioStore {
    holdings: Vec<Holding>,
    history: Vec<PortfolioSnapshot>,
}

impl PortfolioStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: PortfolioState) -> Self {
        Self {
            holdings: state.holdings,
            history: state.history,
        }
    }

    pub fn seeded() -> Self {
        Self::from_state(PortfolioState::seed())
    }

    pub fn holdings(&self) -> &[Holding] {
        &self.holdings
    }

    /// History entries, most recent first.
    pub fn history(&self) -> &[PortfolioSnapshot] {
        &self.history
    }

    /// Value copy of the persisted pair.
    pub fn state(&self) -> PortfolioState {
        PortfolioState {
            holdings: self.holdings.clone(),
            history: self.history.clone(),
        }
    }

    /// Inserts a new holding. Duplicate tickers are rejected rather than
    /// overwritten, and price bounds are enforced here instead of trusting
    /// callers.
    pub fn add_holding(&mut self, mut holding: Holding) -> Result<(), StoreError> {
        let ticker = holding.ticker.trim().to_string();
        if ticker.is_empty() {
            return Err(StoreError::EmptyTicker);
        }
        validate_price(&ticker, holding.price)?;
        if self.holdings.iter().any(|h| h.ticker == ticker) {
            return Err(StoreError::DuplicateTicker(ticker));
        }

        holding.ticker = ticker;
        self.holdings.push(holding);
        Ok(())
    }

    /// Deletes the holding if present. Absent ticker is a no-op, so calling
    /// this twice is safe; returns whether anything was removed.
    pub fn remove_holding(&mut self, ticker: &str) -> bool {
        let before = self.holdings.len();
        self.holdings.retain(|h| h.ticker != ticker);
        self.holdings.len() != before
    }

    /// Merges the patch into the existing holding. Absent ticker is a soft
    /// no-op returning `false`.
    pub fn update_holding(
        &mut self,
        ticker: &str,
        patch: HoldingPatch,
    ) -> Result<bool, StoreError> {
        if let Some(price) = patch.price {
            validate_price(ticker, Some(price))?;
        }

        let Some(row) = self.holdings.iter_mut().find(|h| h.ticker == ticker) else {
            return Ok(false);
        };

        if let Some(name) = patch.name {
            row.name = Some(name);
        }
        if let Some(sector) = patch.sector {
            row.sector = Some(sector);
        }
        if let Some(shares) = patch.shares {
            row.shares = shares;
        }
        if let Some(price) = patch.price {
            row.price = Some(price);
        }
        Ok(true)
    }

    /// Captures a deep copy of the current holdings as a new history entry,
    /// prepended so history stays most-recent-first.
    pub fn log_snapshot(&mut self, reason: &str, source: ChangeSource) -> Uuid {
        let snapshot = PortfolioSnapshot {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            portfolio: self.holdings.clone(),
            change_reason: reason.to_string(),
            source,
        };
        let id = snapshot.id;
        self.history.insert(0, snapshot);
        id
    }

    /// Applies a suggestion batch atomically and records exactly one `ai`
    /// snapshot for the net effect.
    ///
    /// The whole batch is validated before any mutation, so an invalid
    /// record leaves holdings and history untouched. Resolution goes through
    /// a ticker-keyed map with a separate insertion-order list: existing
    /// rows keep their order, implicit buys append.
    pub fn apply_suggestions(
        &mut self,
        summary: &str,
        suggestions: &[Suggestion],
    ) -> Result<Uuid, StoreError> {
        for suggestion in suggestions {
            validate_suggestion(suggestion)?;
        }

        let mut order: Vec<String> = self.holdings.iter().map(|h| h.ticker.clone()).collect();
        let mut index: HashMap<String, Holding> = self
            .holdings
            .iter()
            .cloned()
            .map(|h| (h.ticker.clone(), h))
            .collect();

        for suggestion in suggestions {
            let ticker = suggestion.ticker.trim();

            let Some(row) = index.get_mut(ticker) else {
                // Unknown ticker: only an explicit buy with a positive
                // target creates a holding; everything else is skipped.
                if suggestion.action == SuggestionAction::Buy {
                    if let Some(target) = suggestion.new_shares {
                        if target > 0.0 {
                            order.push(ticker.to_string());
                            index.insert(
                                ticker.to_string(),
                                Holding {
                                    ticker: ticker.to_string(),
                                    name: Some(ticker.to_string()),
                                    sector: None,
                                    shares: target.floor() as u64,
                                    price: None,
                                },
                            );
                        }
                    }
                }
                continue;
            };

            match (suggestion.new_shares, suggestion.amount_pct) {
                // Absolute target wins over a relative delta.
                (Some(target), _) => {
                    row.shares = target.floor().max(0.0) as u64;
                }
                (None, Some(pct)) => {
                    let delta = ((row.shares as f64) * pct / 100.0).round() as i64;
                    let next = match suggestion.action {
                        SuggestionAction::Decrease | SuggestionAction::Sell => {
                            row.shares as i64 - delta
                        }
                        _ => row.shares as i64 + delta,
                    };
                    row.shares = next.max(0) as u64;
                }
                (None, None) => {
                    // A bare sell liquidates; hold and the rest leave the
                    // row unchanged. Zero-share rows stay visible.
                    if suggestion.action == SuggestionAction::Sell {
                        row.shares = 0;
                    }
                }
            }
        }

        self.holdings = order.into_iter().filter_map(|t| index.remove(&t)).collect();
        Ok(self.log_snapshot(summary, ChangeSource::Ai))
    }

    /// Clears holdings and history. No snapshot is recorded for the reset.
    pub fn reset(&mut self) {
        self.holdings.clear();
        self.history.clear();
    }
}

fn validate_price(ticker: &str, price: Option<f64>) -> Result<(), StoreError> {
    if let Some(value) = price {
        if !value.is_finite() || value < 0.0 {
            return Err(StoreError::InvalidPrice {
                ticker: ticker.to_string(),
                value,
            });
        }
    }
    Ok(())
}

fn validate_suggestion(suggestion: &Suggestion) -> Result<(), StoreError> {
    let ticker = suggestion.ticker.trim();
    if ticker.is_empty() {
        return Err(StoreError::EmptyTicker);
    }

    if let Some(value) = suggestion.amount_pct {
        if !value.is_finite() {
            return Err(StoreError::InvalidAmountPct {
                ticker: ticker.to_string(),
                value,
            });
        }
    }

    if let Some(value) = suggestion.new_shares {
        if !value.is_finite() || value < 0.0 {
            return Err(StoreError::InvalidNewShares {
                ticker: ticker.to_string(),
                value,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suggestion(ticker: &str, action: SuggestionAction) -> Suggestion {
        Suggestion {
            ticker: ticker.to_string(),
            action,
            amount_pct: None,
            new_shares: None,
            reason: String::new(),
        }
    }

    fn holding(ticker: &str, shares: u64) -> Holding {
        Holding {
            ticker: ticker.to_string(),
            name: None,
            sector: None,
            shares,
            price: None,
        }
    }

    #[test]
    fn add_holding_rejects_duplicate_ticker() {
        let mut store = PortfolioStore::seeded();
        let err = store.add_holding(holding("AAPL", 1)).unwrap_err();
        assert_eq!(err, StoreError::DuplicateTicker("AAPL".to_string()));
        assert_eq!(store.holdings().len(), 2);
    }

    #[test]
    fn add_holding_rejects_blank_ticker_and_negative_price() {
        let mut store = PortfolioStore::new();
        assert_eq!(
            store.add_holding(holding("  ", 1)).unwrap_err(),
            StoreError::EmptyTicker
        );

        let mut bad = holding("NVDA", 1);
        bad.price = Some(-3.0);
        assert!(matches!(
            store.add_holding(bad).unwrap_err(),
            StoreError::InvalidPrice { .. }
        ));
        assert!(store.holdings().is_empty());
    }

    #[test]
    fn update_holding_rejects_negative_price_and_skips_absent_ticker() {
        let mut store = PortfolioStore::seeded();

        let patch = HoldingPatch {
            price: Some(-1.0),
            ..Default::default()
        };
        assert!(matches!(
            store.update_holding("AAPL", patch).unwrap_err(),
            StoreError::InvalidPrice { .. }
        ));

        let patch = HoldingPatch {
            shares: Some(7),
            ..Default::default()
        };
        assert!(!store.update_holding("MISSING", patch).unwrap());
        assert_eq!(store.holdings()[0].shares, 10);
    }

    #[test]
    fn update_holding_merges_partial_fields() {
        let mut store = PortfolioStore::seeded();
        let patch = HoldingPatch {
            shares: Some(12),
            price: Some(185.5),
            ..Default::default()
        };
        assert!(store.update_holding("AAPL", patch).unwrap());

        let aapl = &store.holdings()[0];
        assert_eq!(aapl.shares, 12);
        assert_eq!(aapl.price, Some(185.5));
        assert_eq!(aapl.name.as_deref(), Some("Apple"));
    }

    #[test]
    fn remove_holding_is_idempotent() {
        let mut store = PortfolioStore::seeded();
        assert!(store.remove_holding("AAPL"));
        let after_first = store.state().holdings;
        assert!(!store.remove_holding("AAPL"));
        assert_eq!(store.state().holdings, after_first);
        assert_eq!(store.holdings().len(), 1);
    }

    #[test]
    fn snapshots_are_value_copies() {
        let mut store = PortfolioStore::seeded();
        let id = store.log_snapshot("Initial", ChangeSource::User);

        let patch = HoldingPatch {
            shares: Some(0),
            ..Default::default()
        };
        store.update_holding("AAPL", patch).unwrap();

        let snap = store.history().iter().find(|s| s.id == id).unwrap();
        assert_eq!(snap.portfolio[0].shares, 10);
        assert_eq!(store.holdings()[0].shares, 0);
    }

    #[test]
    fn history_is_most_recent_first() {
        let mut store = PortfolioStore::seeded();
        store.log_snapshot("first", ChangeSource::User);
        store.log_snapshot("second", ChangeSource::User);
        assert_eq!(store.history()[0].change_reason, "second");
        assert_eq!(store.history()[1].change_reason, "first");
    }

    #[test]
    fn apply_suggestions_records_one_snapshot_per_batch() {
        let mut store = PortfolioStore::seeded();
        let batch = vec![
            Suggestion {
                amount_pct: Some(10.0),
                ..suggestion("AAPL", SuggestionAction::Decrease)
            },
            Suggestion {
                amount_pct: Some(5.0),
                ..suggestion("XOM", SuggestionAction::Increase)
            },
            suggestion("AAPL", SuggestionAction::Hold),
        ];

        store.apply_suggestions("Rebalance", &batch).unwrap();

        assert_eq!(store.history().len(), 1);
        assert_eq!(store.history()[0].source, ChangeSource::Ai);
        assert_eq!(store.history()[0].change_reason, "Rebalance");
    }

    #[test]
    fn decrease_by_percentage_rounds_the_delta() {
        // AAPL 10 shares, -10% => delta round(1.0) = 1 => 9 shares.
        let mut store = PortfolioStore::seeded();
        let batch = vec![Suggestion {
            amount_pct: Some(10.0),
            reason: "r1".to_string(),
            ..suggestion("AAPL", SuggestionAction::Decrease)
        }];

        store.apply_suggestions("S1", &batch).unwrap();

        assert_eq!(store.holdings()[0].shares, 9);
        assert_eq!(store.holdings()[1].shares, 5);
        let snap = &store.history()[0];
        assert_eq!(snap.change_reason, "S1");
        assert_eq!(snap.source, ChangeSource::Ai);
        assert_eq!(snap.portfolio[0].shares, 9);
    }

    #[test]
    fn buy_with_positive_target_creates_holding() {
        let mut store = PortfolioStore::seeded();
        let batch = vec![Suggestion {
            new_shares: Some(20.0),
            ..suggestion("NEW", SuggestionAction::Buy)
        }];

        store.apply_suggestions("Enter NEW", &batch).unwrap();

        let new = store.holdings().iter().find(|h| h.ticker == "NEW").unwrap();
        assert_eq!(new.shares, 20);
        assert_eq!(new.name.as_deref(), Some("NEW"));
    }

    #[test]
    fn non_buy_actions_on_unknown_ticker_are_skipped() {
        let mut store = PortfolioStore::seeded();
        let batch = vec![
            Suggestion {
                amount_pct: Some(50.0),
                ..suggestion("GHOST", SuggestionAction::Increase)
            },
            suggestion("GHOST2", SuggestionAction::Sell),
        ];

        store.apply_suggestions("noop", &batch).unwrap();
        assert_eq!(store.holdings().len(), 2);
    }

    #[test]
    fn bare_sell_liquidates_but_keeps_the_row() {
        let mut store = PortfolioStore::seeded();
        let batch = vec![suggestion("XOM", SuggestionAction::Sell)];

        store.apply_suggestions("Exit energy", &batch).unwrap();

        let xom = store.holdings().iter().find(|h| h.ticker == "XOM").unwrap();
        assert_eq!(xom.shares, 0);
    }

    #[test]
    fn absolute_target_wins_over_percentage() {
        let mut store = PortfolioStore::seeded();
        let batch = vec![Suggestion {
            amount_pct: Some(50.0),
            new_shares: Some(3.9),
            ..suggestion("AAPL", SuggestionAction::Increase)
        }];

        store.apply_suggestions("target", &batch).unwrap();
        assert_eq!(store.holdings()[0].shares, 3);
    }

    #[test]
    fn shares_clamp_at_zero_on_oversized_decrease() {
        let mut store = PortfolioStore::seeded();
        let batch = vec![Suggestion {
            amount_pct: Some(300.0),
            ..suggestion("XOM", SuggestionAction::Decrease)
        }];

        store.apply_suggestions("clamp", &batch).unwrap();
        let xom = store.holdings().iter().find(|h| h.ticker == "XOM").unwrap();
        assert_eq!(xom.shares, 0);
    }

    #[test]
    fn invalid_record_aborts_the_whole_batch() {
        let mut store = PortfolioStore::seeded();
        let batch = vec![
            Suggestion {
                amount_pct: Some(10.0),
                ..suggestion("AAPL", SuggestionAction::Decrease)
            },
            Suggestion {
                new_shares: Some(-1.0),
                ..suggestion("XOM", SuggestionAction::Buy)
            },
        ];

        let err = store.apply_suggestions("partial", &batch).unwrap_err();
        assert!(matches!(err, StoreError::InvalidNewShares { .. }));
        assert_eq!(store.holdings()[0].shares, 10);
        assert!(store.history().is_empty());
    }

    #[test]
    fn reset_clears_everything_without_logging() {
        let mut store = PortfolioStore::seeded();
        store.log_snapshot("before", ChangeSource::User);
        store.reset();
        assert!(store.holdings().is_empty());
        assert!(store.history().is_empty());
    }
}
