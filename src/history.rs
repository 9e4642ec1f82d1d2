use std::collections::{HashMap, VecDeque};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::model::bar::Bar;

/// Close-price history the engine reads from. Reads are pure functions of
/// the bars recorded so far.
pub trait PriceHistory {
    fn record(&mut self, bar: &Bar);

    /// Up to `lookback` most recent closes for `symbol`, oldest first.
    fn get_closes(&self, lookback: usize, symbol: &str) -> Vec<Decimal>;

    fn latest_close(&self, symbol: &str) -> Option<Decimal> {
        self.get_closes(1, symbol).last().copied()
    }
}

/// Bounded per-symbol close buffers.
#[derive(Debug, Clone)]
pub struct InMemoryPriceHistory {
    capacity: usize,
    closes: HashMap<String, VecDeque<Decimal>>,
}

impl InMemoryPriceHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(2),
            closes: HashMap::new(),
        }
    }

    pub fn len(&self, symbol: &str) -> usize {
        self.closes.get(symbol).map_or(0, VecDeque::len)
    }
}

impl PriceHistory for InMemoryPriceHistory {
    fn record(&mut self, bar: &Bar) {
        let buf = self.closes.entry(bar.symbol.clone()).or_default();
        buf.push_back(bar.close);
        while buf.len() > self.capacity {
            let _ = buf.pop_front();
        }
    }

    fn get_closes(&self, lookback: usize, symbol: &str) -> Vec<Decimal> {
        let Some(buf) = self.closes.get(symbol) else {
            return Vec::new();
        };
        let skip = buf.len().saturating_sub(lookback);
        buf.iter().skip(skip).copied().collect()
    }

    fn latest_close(&self, symbol: &str) -> Option<Decimal> {
        self.closes.get(symbol).and_then(|b| b.back().copied())
    }
}

/// Lossy conversion for the `f64` statistics paths.
pub fn closes_to_f64(closes: &[Decimal]) -> Vec<f64> {
    closes.iter().map(|c| c.to_f64().unwrap_or(0.0)).collect()
}
