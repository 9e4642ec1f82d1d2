use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActionKind {
    /// Target is zero: exit the position entirely.
    Close,
    Reduce,
    /// Nothing held yet.
    Open,
    Increase,
}

impl ActionKind {
    pub fn is_reduction(self) -> bool {
        matches!(self, Self::Close | Self::Reduce)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebalanceAction {
    pub symbol: String,
    pub target_weight: Decimal,
    pub kind: ActionKind,
}

/// Stable taxonomy for targets zeroed by pre-trade validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CoercionReasonCode {
    NoPriceData,
    BelowOneUnit,
}

impl CoercionReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoPriceData => "validation.no_price_data",
            Self::BelowOneUnit => "validation.below_one_unit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoercedWeight {
    pub symbol: String,
    pub requested_weight: Decimal,
    pub reason_code: CoercionReasonCode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebalanceDecision {
    pub needed: bool,
    /// L1 distance between held and target weights.
    pub drift: Decimal,
    /// Reductions first, then increases.
    pub ordered_actions: Vec<RebalanceAction>,
    pub coerced: Vec<CoercedWeight>,
    /// Non-cash target after pre-trade validation. Empty when no rebalance.
    pub validated_target: BTreeMap<String, Decimal>,
}

impl RebalanceDecision {
    pub fn hold(drift: Decimal) -> Self {
        Self {
            needed: false,
            drift,
            ordered_actions: Vec::new(),
            coerced: Vec::new(),
            validated_target: BTreeMap::new(),
        }
    }

    pub fn position_of(&self, symbol: &str) -> Option<usize> {
        self.ordered_actions.iter().position(|a| a.symbol == symbol)
    }
}
