//! Box snapshot data types shared by the engine and the wire protocol.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Ohlc;

/// One tracked scale's directional-range boundary.
///
/// `value` carries the direction: positive means up-state, negative means
/// down-state; its absolute value is `box_size * point_size`, which always
/// equals `high - low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxEntry {
    pub high: Decimal,
    pub low: Decimal,
    pub value: Decimal,
}

/// One element of a replayed box series: the canonical snapshot produced
/// after applying the candle at `timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxSlicePoint {
    pub timestamp: i64,
    pub boxes: Vec<BoxEntry>,
    pub current_ohlc: Ohlc,
}

/// A normalized live delivery handed to a subscription handler.
///
/// Optional wire fields are already defaulted; handlers never observe a
/// partial snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxUpdate {
    pub pair: String,
    pub boxes: Vec<BoxEntry>,
    /// Server-side timestamp string; empty if the server omitted it.
    pub timestamp: String,
    /// Latest OHLC at delivery time; zeroed if the server omitted it.
    pub current_ohlc: Ohlc,
}
