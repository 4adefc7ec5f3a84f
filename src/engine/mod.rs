//! Incremental multi-scale directional-range state machine.
//!
//! This module is organized by concern:
//! - [`BoxStateEngine`] - per-scale boundary tracking from live candles
//! - [`ordering`] - the canonical serialization ordering for snapshots
//! - [`series`] - historical replay producing one snapshot per candle

pub mod ordering;
pub mod series;

use rust_decimal::Decimal;

use crate::catalog::InstrumentConfig;
use crate::models::BoxEntry;

pub use ordering::canonicalize;
pub use series::{build_box_series, build_box_series_for};

/// Live high/low/direction record for one box size.
///
/// Invariant after initialization: `high - low == box_size * point_size`,
/// and `signed_size.abs() == box_size` with the sign carrying the active
/// direction. Mutated only by [`BoxStateEngine::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RangeState {
    high: Decimal,
    low: Decimal,
    signed_size: i64,
}

/// Multi-scale directional-range tracker for one instrument.
///
/// Maintains one [`RangeState`] per configured box size, indexed by the
/// size's position in the instrument's fixed box-size list. Each scale is
/// an isolated record updated independently; there is no shared state
/// between scales or between engine instances.
#[derive(Debug, Clone)]
pub struct BoxStateEngine {
    config: InstrumentConfig,
    states: Vec<RangeState>,
}

impl BoxStateEngine {
    /// Creates an engine seeded at `reference_price`.
    ///
    /// Every scale starts in the up-state by convention: `high` at the
    /// reference price and `low` one magnitude below it.
    #[must_use]
    pub fn new(config: InstrumentConfig, reference_price: Decimal) -> Self {
        let states = config
            .box_sizes()
            .iter()
            .map(|&size| RangeState {
                high: reference_price,
                low: reference_price - config.magnitude(size),
                signed_size: i64::from(size),
            })
            .collect();

        Self { config, states }
    }

    /// Applies one candle's high/low to every tracked scale.
    ///
    /// Per scale, evaluated against the state as of call entry: a new high
    /// relocates the boundary upward (and flips a down-state positive); a
    /// new low relocates it downward (and flips an up-state negative); a
    /// candle fully inside the current range is a no-op. A candle that
    /// breaks both sides of a stale boundary updates the high side only
    /// (up-breaks take priority), and a gap spanning several magnitudes
    /// still causes exactly one relocation per call.
    pub fn update(&mut self, candle_high: Decimal, candle_low: Decimal) {
        for (i, &size) in self.config.box_sizes().iter().enumerate() {
            let magnitude = self.config.magnitude(size);
            let entry = self.states[i];
            let state = &mut self.states[i];

            if candle_high > entry.high {
                state.high = candle_high;
                state.low = candle_high - magnitude;
                if state.signed_size < 0 {
                    state.signed_size = i64::from(size);
                }
            } else if candle_low < entry.low {
                state.low = candle_low;
                state.high = candle_low + magnitude;
                if state.signed_size > 0 {
                    state.signed_size = -i64::from(size);
                }
            }
        }
    }

    /// Current per-scale boundaries in the engine's internal (box-size
    /// list) order. Pure read; apply [`canonicalize`] before serializing.
    #[must_use]
    pub fn snapshot(&self) -> Vec<BoxEntry> {
        self.states
            .iter()
            .map(|state| BoxEntry {
                high: state.high,
                low: state.low,
                value: Decimal::from(state.signed_size) * self.config.point_size(),
            })
            .collect()
    }

    /// The instrument configuration this engine was built from.
    #[must_use]
    pub fn config(&self) -> &InstrumentConfig {
        &self.config
    }
}
