//! Historical replay: one canonical box snapshot per candle.

use tracing::debug;

use crate::catalog::{InstrumentCatalog, InstrumentConfig};
use crate::error::BoxflowError;
use crate::models::{BoxSlicePoint, Candle};

use super::{BoxStateEngine, canonicalize};

/// Replays a chronological candle history through a fresh
/// [`BoxStateEngine`] and returns one [`BoxSlicePoint`] per candle.
///
/// The engine is seeded once with the close of the history's most recent
/// candle, then walked forward from the earliest candle. Each emitted
/// snapshot is canonicalized and never revised by later candles; only the
/// engine's live state moves.
///
/// An empty history produces an empty series.
///
/// # Errors
///
/// Returns [`BoxflowError::History`] if candle timestamps are not
/// strictly increasing, or a candle's open/close fall outside its
/// `[low, high]` range.
pub fn build_box_series(
    config: &InstrumentConfig,
    candles: &[Candle],
) -> crate::Result<Vec<BoxSlicePoint>> {
    let Some(latest) = candles.last() else {
        return Ok(Vec::new());
    };

    for candle in candles {
        let in_range = |price| candle.low <= price && price <= candle.high;
        if !in_range(candle.open) || !in_range(candle.close) {
            return Err(BoxflowError::History(format!(
                "candle at {} has open/close outside [low, high]",
                candle.timestamp
            )));
        }
    }

    for window in candles.windows(2) {
        if window[1].timestamp <= window[0].timestamp {
            return Err(BoxflowError::History(format!(
                "timestamps must be strictly increasing, got {} after {}",
                window[1].timestamp, window[0].timestamp
            )));
        }
    }

    let mut engine = BoxStateEngine::new(config.clone(), latest.close);
    let mut series = Vec::with_capacity(candles.len());

    for candle in candles {
        engine.update(candle.high, candle.low);
        series.push(BoxSlicePoint {
            timestamp: candle.timestamp,
            boxes: canonicalize(&engine.snapshot()),
            current_ohlc: candle.ohlc(),
        });
    }

    debug!(
        candles = candles.len(),
        scales = config.box_sizes().len(),
        "Replayed candle history into box series"
    );

    Ok(series)
}

/// [`build_box_series`] keyed by instrument, resolving the configuration
/// through the catalog.
///
/// # Errors
///
/// Returns [`BoxflowError::InvalidInstrument`] for an unknown key, or any
/// error of [`build_box_series`].
pub fn build_box_series_for(
    catalog: &InstrumentCatalog,
    key: &str,
    candles: &[Candle],
) -> crate::Result<Vec<BoxSlicePoint>> {
    let config = catalog
        .get(key)
        .ok_or_else(|| BoxflowError::InvalidInstrument(format!("unknown instrument {key}")))?;

    build_box_series(config, candles)
}
