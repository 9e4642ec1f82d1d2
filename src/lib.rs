//! Regime-driven allocation engine.
//!
//! ```text
//! Bar -> TrendFilter -> TrendClassifier <-> VolatilityRegimeClassifier
//!     -> RegimeAllocationMatrix (+ HedgePreferenceRouter, overlays)
//!     -> AllocationTarget -> RebalanceEngine -> ordered actions
//! ```

pub mod allocation;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod history;
pub mod indicator;
pub mod model;
pub mod rebalance;
pub mod regime;

pub use engine::{AllocationEngine, BarDecision, BarOutcome, SkipReason};
pub use error::{EngineError, EngineResult};
