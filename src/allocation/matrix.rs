use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::allocation::overlay::OverlayAllocation;
use crate::config::{AllocationConfig, CellWeights, SymbolConfig};
use crate::error::{EngineError, EngineResult};
use crate::model::allocation::AllocationTarget;
use crate::model::regime::{TrendState, VolState};

/// Cell index over the 3x2 (trend, vol) grid. Total and deterministic.
pub fn cell_id(trend: TrendState, vol: VolState) -> u8 {
    let row = match trend {
        TrendState::BullStrong => 0,
        TrendState::Sideways => 1,
        TrendState::BearStrong => 2,
    };
    let col = match vol {
        VolState::Low => 1,
        VolState::High => 2,
    };
    row * 2 + col
}

/// High-vol Sideways and high-vol BearStrong route their remainder through
/// an overlay instead of plain cash.
pub fn is_defensive(cell_id: u8) -> bool {
    matches!(cell_id, 4 | 6)
}

#[derive(Debug, Clone)]
pub struct RegimeAllocationMatrix {
    cells: [CellWeights; 6],
    leverage_scalar: Decimal,
    leveraged_long: String,
    core_long: String,
    inverse_hedge: String,
}

impl RegimeAllocationMatrix {
    pub fn new(cfg: &AllocationConfig, symbols: &SymbolConfig) -> EngineResult<Self> {
        if !cfg.cells.is_empty() && cfg.cells.len() != 6 {
            return Err(EngineError::invalid(
                "allocation.cells",
                format!("expected 6 cells, got {}", cfg.cells.len()),
            ));
        }
        let cells = cfg.resolved_cells();
        for (idx, cell) in cells.iter().enumerate() {
            let legs = [cell.leveraged_long, cell.core_long, cell.inverse_hedge];
            if legs.iter().any(|w| *w < Decimal::ZERO) {
                return Err(EngineError::invalid(
                    "allocation.cells",
                    format!("cell {} has a negative weight", idx + 1),
                ));
            }
            if cell.equity_total() > Decimal::ONE {
                return Err(EngineError::invalid(
                    "allocation.cells",
                    format!(
                        "cell {} equity legs sum to {} (> 1)",
                        idx + 1,
                        cell.equity_total()
                    ),
                ));
            }
        }
        if cfg.leverage_scalar < Decimal::ZERO {
            return Err(EngineError::invalid(
                "allocation.leverage_scalar",
                format!("must be >= 0, got {}", cfg.leverage_scalar),
            ));
        }
        Ok(Self {
            cells,
            leverage_scalar: cfg.leverage_scalar,
            leveraged_long: symbols.leveraged_long.clone(),
            core_long: symbols.core_long.clone(),
            inverse_hedge: symbols.inverse_hedge.clone(),
        })
    }

    pub fn base_weights(&self, trend: TrendState, vol: VolState) -> CellWeights {
        self.cells[(cell_id(trend, vol) - 1) as usize]
    }

    /// Budget an overlay may draw from in this cell.
    pub fn defensive_budget(&self, trend: TrendState, vol: VolState) -> Decimal {
        if is_defensive(cell_id(trend, vol)) {
            self.base_weights(trend, vol).remainder()
        } else {
            Decimal::ZERO
        }
    }

    /// Base weights, leverage scalar on the equity legs, overlay legs, then
    /// renormalization so the target sums to exactly one.
    pub fn allocate(
        &self,
        trend: TrendState,
        vol: VolState,
        overlay: Option<&OverlayAllocation>,
    ) -> AllocationTarget {
        let cell = self.base_weights(trend, vol);
        let s = self.leverage_scalar;

        let mut invested: BTreeMap<String, Decimal> = BTreeMap::new();
        for (symbol, w) in [
            (&self.leveraged_long, cell.leveraged_long * s),
            (&self.core_long, cell.core_long * s),
            (&self.inverse_hedge, cell.inverse_hedge * s),
        ] {
            *invested.entry(symbol.clone()).or_insert(Decimal::ZERO) += w;
        }

        let mut remainder = cell.remainder();
        if let Some(overlay) = overlay {
            for (symbol, w) in &overlay.legs {
                *invested.entry(symbol.clone()).or_insert(Decimal::ZERO) += *w;
            }
            remainder -= overlay.invested();
        }
        let cash = remainder.max(Decimal::ZERO);

        let total: Decimal = invested.values().copied().sum::<Decimal>() + cash;
        if total <= Decimal::ZERO {
            tracing::warn!(
                cell_id = cell_id(trend, vol),
                "allocation total is zero, falling back to all cash"
            );
            return AllocationTarget::all_cash();
        }
        for w in invested.values_mut() {
            *w /= total;
        }
        trim_overshoot(&mut invested);
        AllocationTarget::from_invested(invested)
    }
}

/// Division can leave the invested sum a few ulps above one; take the excess
/// out of the largest weight so cash never goes negative.
fn trim_overshoot(weights: &mut BTreeMap<String, Decimal>) {
    let total: Decimal = weights.values().copied().sum();
    let excess = total - Decimal::ONE;
    if excess <= Decimal::ZERO {
        return;
    }
    if let Some(largest) = weights.values_mut().max_by(|a, b| a.cmp(b)) {
        *largest -= excess;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn trim_overshoot_caps_total_at_one() {
        let mut w = BTreeMap::new();
        w.insert("A".to_string(), dec!(0.6000000000000000000000000001));
        w.insert("B".to_string(), dec!(0.4));
        trim_overshoot(&mut w);
        let total: Decimal = w.values().copied().sum();
        assert_eq!(total, Decimal::ONE);
        assert_eq!(w["A"], dec!(0.6));
    }

    #[test]
    fn cell_ids_cover_grid() {
        let mut seen = Vec::new();
        for t in [TrendState::BullStrong, TrendState::Sideways, TrendState::BearStrong] {
            for v in [VolState::Low, VolState::High] {
                seen.push(cell_id(t, v));
            }
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5, 6]);
    }
}
