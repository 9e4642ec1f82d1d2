use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

pub const CASH: &str = "CASH";

/// Per-bar target weights. Cash is an explicit entry and the weights sum to
/// exactly one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationTarget {
    weights: BTreeMap<String, Decimal>,
}

impl AllocationTarget {
    pub fn all_cash() -> Self {
        let mut weights = BTreeMap::new();
        weights.insert(CASH.to_string(), Decimal::ONE);
        Self { weights }
    }

    /// Build from non-cash weights; cash becomes `1 - sum`. Zero entries are
    /// kept so every configured instrument shows up in the output.
    pub fn from_invested(mut invested: BTreeMap<String, Decimal>) -> Self {
        invested.remove(CASH);
        let total: Decimal = invested.values().copied().sum();
        invested.insert(CASH.to_string(), Decimal::ONE - total);
        Self { weights: invested }
    }

    pub fn weight(&self, symbol: &str) -> Decimal {
        self.weights.get(symbol).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn cash(&self) -> Decimal {
        self.weight(CASH)
    }

    pub fn total(&self) -> Decimal {
        self.weights.values().copied().sum()
    }

    pub fn weights(&self) -> &BTreeMap<String, Decimal> {
        &self.weights
    }

    /// Non-cash entries only.
    pub fn invested(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.weights
            .iter()
            .filter(|(symbol, _)| symbol.as_str() != CASH)
            .map(|(symbol, w)| (symbol.as_str(), *w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn cash_absorbs_remainder() {
        let mut w = BTreeMap::new();
        w.insert("QQQ".to_string(), dec!(0.35));
        w.insert("TMF".to_string(), dec!(0.2));
        let target = AllocationTarget::from_invested(w);
        assert_eq!(target.cash(), dec!(0.45));
        assert_eq!(target.total(), Decimal::ONE);
        assert_eq!(target.invested().count(), 2);
    }

    #[test]
    fn all_cash_target() {
        let target = AllocationTarget::all_cash();
        assert_eq!(target.cash(), Decimal::ONE);
        assert_eq!(target.weight("QQQ"), Decimal::ZERO);
    }
}
