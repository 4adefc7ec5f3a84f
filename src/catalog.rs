//! Instrument reference data: tick precision and tracked box scales.
//!
//! Every [`BoxStateEngine`](crate::engine::BoxStateEngine) is built from a
//! validated [`InstrumentConfig`], so engine preconditions (positive point
//! size, non-empty box-size list, no zero sizes) are enforced at one choke
//! point instead of being re-checked in the update loop.

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::error::BoxflowError;

/// Tick precision and the fixed, ordered list of box-size multipliers
/// tracked for one instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentConfig {
    point_size: Decimal,
    box_sizes: Vec<u32>,
}

impl InstrumentConfig {
    /// Creates a validated instrument configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BoxflowError::InvalidInstrument`] if `point_size` is not
    /// strictly positive, `box_sizes` is empty, or any box size is zero or
    /// duplicated.
    pub fn new(point_size: Decimal, box_sizes: Vec<u32>) -> crate::Result<Self> {
        if point_size <= Decimal::ZERO {
            return Err(BoxflowError::InvalidInstrument(format!(
                "point size must be positive, got {point_size}"
            )));
        }
        if box_sizes.is_empty() {
            return Err(BoxflowError::InvalidInstrument(
                "box size list must not be empty".to_string(),
            ));
        }
        if box_sizes.contains(&0) {
            return Err(BoxflowError::InvalidInstrument(
                "box sizes must be positive".to_string(),
            ));
        }
        for (i, size) in box_sizes.iter().enumerate() {
            if box_sizes[..i].contains(size) {
                return Err(BoxflowError::InvalidInstrument(format!(
                    "duplicate box size {size}"
                )));
            }
        }

        Ok(Self {
            point_size,
            box_sizes,
        })
    }

    /// Tick precision used to convert box sizes into price magnitudes.
    #[must_use]
    pub fn point_size(&self) -> Decimal {
        self.point_size
    }

    /// The fixed, ordered box-size multipliers for this instrument.
    #[must_use]
    pub fn box_sizes(&self) -> &[u32] {
        &self.box_sizes
    }

    /// Price-range threshold for one box size: `box_size * point_size`.
    #[must_use]
    pub fn magnitude(&self, box_size: u32) -> Decimal {
        Decimal::from(box_size) * self.point_size
    }
}

/// Lookup table of [`InstrumentConfig`] keyed by instrument symbol.
#[derive(Debug, Default)]
pub struct InstrumentCatalog {
    instruments: HashMap<String, InstrumentConfig>,
}

impl InstrumentCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an instrument, replacing any previous entry for the key.
    pub fn insert(&mut self, key: impl Into<String>, config: InstrumentConfig) {
        self.instruments.insert(key.into(), config);
    }

    /// Looks up the configuration for an instrument key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&InstrumentConfig> {
        self.instruments.get(key)
    }

    /// Number of registered instruments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    /// Returns `true` if no instruments are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}
