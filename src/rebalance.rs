use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;

use crate::config::RebalanceConfig;
use crate::error::{EngineError, EngineResult};
use crate::model::allocation::AllocationTarget;
use crate::model::rebalance::{
    ActionKind, CoercedWeight, CoercionReasonCode, RebalanceAction, RebalanceDecision,
};

/// Drift check, pre-trade validation and two-phase ordering.
#[derive(Debug, Clone)]
pub struct RebalanceEngine {
    drift_threshold: Decimal,
}

impl RebalanceEngine {
    pub fn new(cfg: &RebalanceConfig) -> EngineResult<Self> {
        if cfg.drift_threshold < Decimal::ZERO {
            return Err(EngineError::invalid(
                "rebalance.drift_threshold",
                format!("must be >= 0, got {}", cfg.drift_threshold),
            ));
        }
        Ok(Self {
            drift_threshold: cfg.drift_threshold,
        })
    }

    pub fn drift_threshold(&self) -> Decimal {
        self.drift_threshold
    }

    /// L1 distance over the union of non-cash instruments.
    pub fn drift(current: &BTreeMap<String, Decimal>, target: &AllocationTarget) -> Decimal {
        let symbols: BTreeSet<&str> = current
            .keys()
            .map(String::as_str)
            .chain(target.invested().map(|(s, _)| s))
            .collect();
        symbols
            .into_iter()
            .map(|s| {
                let held = current.get(s).copied().unwrap_or(Decimal::ZERO);
                (held - target.weight(s)).abs()
            })
            .sum()
    }

    /// Strictly greater than the threshold.
    pub fn needs_rebalance(&self, drift: Decimal) -> bool {
        drift > self.drift_threshold
    }

    /// Zero out every positive target that cannot buy at least one unit.
    pub fn validate<F>(
        &self,
        target: &AllocationTarget,
        equity: Decimal,
        price_of: F,
    ) -> (BTreeMap<String, Decimal>, Vec<CoercedWeight>)
    where
        F: Fn(&str) -> Option<Decimal>,
    {
        let mut validated = BTreeMap::new();
        let mut coerced = Vec::new();
        for (symbol, weight) in target.invested() {
            if weight <= Decimal::ZERO {
                validated.insert(symbol.to_string(), Decimal::ZERO);
                continue;
            }
            let reason = match price_of(symbol) {
                None => Some(CoercionReasonCode::NoPriceData),
                Some(price) if equity * weight < price => Some(CoercionReasonCode::BelowOneUnit),
                Some(_) => None,
            };
            match reason {
                Some(reason_code) => {
                    tracing::warn!(
                        symbol,
                        weight = %weight,
                        equity = %equity,
                        reason = reason_code.as_str(),
                        "Target weight coerced to zero"
                    );
                    validated.insert(symbol.to_string(), Decimal::ZERO);
                    coerced.push(CoercedWeight {
                        symbol: symbol.to_string(),
                        requested_weight: weight,
                        reason_code,
                    });
                }
                None => {
                    validated.insert(symbol.to_string(), weight);
                }
            }
        }
        (validated, coerced)
    }

    /// Phase 1 closes and reductions, phase 2 opens and increases; symbol
    /// order inside each phase. Unchanged weights emit nothing.
    pub fn plan(
        current: &BTreeMap<String, Decimal>,
        target: &BTreeMap<String, Decimal>,
    ) -> Vec<RebalanceAction> {
        let mut actions = Vec::new();

        for (symbol, held) in current {
            if *held <= Decimal::ZERO {
                continue;
            }
            let tgt = target.get(symbol).copied().unwrap_or(Decimal::ZERO);
            let kind = if tgt <= Decimal::ZERO {
                ActionKind::Close
            } else if tgt < *held {
                ActionKind::Reduce
            } else {
                continue;
            };
            actions.push(RebalanceAction {
                symbol: symbol.clone(),
                target_weight: tgt.max(Decimal::ZERO),
                kind,
            });
        }

        for (symbol, tgt) in target {
            let held = current.get(symbol).copied().unwrap_or(Decimal::ZERO);
            if *tgt <= held {
                continue;
            }
            let kind = if held <= Decimal::ZERO {
                ActionKind::Open
            } else {
                ActionKind::Increase
            };
            actions.push(RebalanceAction {
                symbol: symbol.clone(),
                target_weight: *tgt,
                kind,
            });
        }

        actions
    }

    pub fn evaluate<F>(
        &self,
        current: &BTreeMap<String, Decimal>,
        target: &AllocationTarget,
        equity: Decimal,
        price_of: F,
    ) -> RebalanceDecision
    where
        F: Fn(&str) -> Option<Decimal>,
    {
        let drift = Self::drift(current, target);
        if !self.needs_rebalance(drift) {
            tracing::debug!(drift = %drift, threshold = %self.drift_threshold, "Drift within threshold");
            return RebalanceDecision::hold(drift);
        }
        let (validated, coerced) = self.validate(target, equity, price_of);
        let ordered_actions = Self::plan(current, &validated);
        tracing::info!(
            drift = %drift,
            actions = ordered_actions.len(),
            coerced = coerced.len(),
            "Rebalance planned"
        );
        RebalanceDecision {
            needed: true,
            drift,
            ordered_actions,
            coerced,
            validated_target: validated,
        }
    }
}
