//! Multi-resolution directional-range tracking over OHLC price data.
//!
//! Provides the box state engine (per-scale up/down range boundaries,
//! incremental updates, historical replay with a canonical serialization
//! ordering) and an async streaming client that keeps per-instrument box
//! subscriptions alive over one authenticated WebSocket connection.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod websocket;

pub use error::{BoxflowError, Result};
