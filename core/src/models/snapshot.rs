use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::BookSide;
use crate::error::SnapshotError;

/// One price level of the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }
}

/// Top-of-book figures derived from a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedPrices {
    pub best_bid: Decimal,
    pub best_ask: Decimal,
    pub mid_price: Decimal,
    pub spread: Decimal,
}

impl DerivedPrices {
    fn from_levels(bids: &[PriceLevel], asks: &[PriceLevel]) -> Result<Self, SnapshotError> {
        let best_bid = bids.first().ok_or(SnapshotError::EmptySide(BookSide::Bid))?.price;
        let best_ask = asks.first().ok_or(SnapshotError::EmptySide(BookSide::Ask))?.price;
        let overflow = || SnapshotError::PriceOverflow { best_bid, best_ask };

        let mid_price = best_bid
            .checked_add(best_ask)
            .and_then(|sum| sum.checked_div(Decimal::TWO))
            .ok_or_else(overflow)?;
        let spread = best_ask.checked_sub(best_bid).ok_or_else(overflow)?;

        Ok(Self {
            best_bid,
            best_ask,
            mid_price,
            spread,
        })
    }
}

/// Top-N bid/ask levels for one pair at one instant.
///
/// Bids are best-first (descending), asks are best-first (ascending).
/// Derived prices are computed on first access and cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub pair: String,
    pub sequence_id: u64,
    pub received_at: DateTime<Utc>,
    pub parsed_at: DateTime<Utc>,

    // Read-only after construction: `derived` caches prices computed from them.
    bids: Vec<PriceLevel>,
    asks: Vec<PriceLevel>,

    #[serde(skip)]
    derived: OnceLock<Result<DerivedPrices, SnapshotError>>,
}

impl OrderSnapshot {
    /// Builds a snapshot capped to `top_levels` per side. `parsed_at` is
    /// stamped at construction.
    pub fn new(
        pair: impl Into<String>,
        sequence_id: u64,
        received_at: DateTime<Utc>,
        mut bids: Vec<PriceLevel>,
        mut asks: Vec<PriceLevel>,
        top_levels: usize,
    ) -> Self {
        bids.truncate(top_levels);
        asks.truncate(top_levels);

        Self {
            pair: pair.into(),
            sequence_id,
            received_at,
            parsed_at: Utc::now(),
            bids,
            asks,
            derived: OnceLock::new(),
        }
    }

    pub fn bids(&self) -> &[PriceLevel] {
        &self.bids
    }

    pub fn asks(&self) -> &[PriceLevel] {
        &self.asks
    }

    /// Consumes the snapshot, returning `(bids, asks)`.
    pub fn into_levels(self) -> (Vec<PriceLevel>, Vec<PriceLevel>) {
        (self.bids, self.asks)
    }

    /// Derived prices. Fails when a side is empty or the arithmetic would
    /// overflow.
    pub fn derived(&self) -> Result<&DerivedPrices, SnapshotError> {
        self.derived
            .get_or_init(|| DerivedPrices::from_levels(&self.bids, &self.asks))
            .as_ref()
            .map_err(Clone::clone)
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.derived().ok().map(|d| d.best_bid)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.derived().ok().map(|d| d.best_ask)
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        self.derived().ok().map(|d| d.mid_price)
    }

    pub fn spread(&self) -> Option<Decimal> {
        self.derived().ok().map(|d| d.spread)
    }

    /// Checks the invariants a snapshot must satisfy before it may be queued.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.sequence_id == 0 {
            return Err(SnapshotError::NonPositiveSequence);
        }
        if self.bids.is_empty() {
            return Err(SnapshotError::EmptySide(BookSide::Bid));
        }
        if self.asks.is_empty() {
            return Err(SnapshotError::EmptySide(BookSide::Ask));
        }

        if let Some(index) = first_violation(&self.bids, |prev, next| next < prev) {
            return Err(SnapshotError::NotStrictlyOrdered {
                side: BookSide::Bid,
                index,
            });
        }
        if let Some(index) = first_violation(&self.asks, |prev, next| next > prev) {
            return Err(SnapshotError::NotStrictlyOrdered {
                side: BookSide::Ask,
                index,
            });
        }

        let best_bid = self.bids[0].price;
        let best_ask = self.asks[0].price;
        if best_ask <= best_bid {
            return Err(SnapshotError::CrossedBook { best_bid, best_ask });
        }

        self.derived().map(|_| ())
    }
}

/// Index of the first level whose price breaks `ordered(prev, next)`.
fn first_violation(
    levels: &[PriceLevel],
    ordered: impl Fn(Decimal, Decimal) -> bool,
) -> Option<usize> {
    levels
        .windows(2)
        .position(|w| !ordered(w[0].price, w[1].price))
        .map(|i| i + 1)
}
