use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::config::{CommodityConfig, SymbolConfig, TreasuryConfig};
use crate::error::{EngineError, EngineResult};
use crate::indicator::sma::{rate_of_change, sma};

/// Share of the defensive remainder a bond position may take before the cap.
pub const TREASURY_DEFENSIVE_SHARE: Decimal = dec!(0.4);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OverlayKind {
    Treasury,
    Commodity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BondTrend {
    Bull,
    Bear,
}

/// Overlay output: the instruments funded out of a defensive remainder.
/// Whatever the legs do not use stays in cash.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayAllocation {
    pub kind: OverlayKind,
    pub legs: Vec<(String, Decimal)>,
}

impl OverlayAllocation {
    pub fn empty(kind: OverlayKind) -> Self {
        Self {
            kind,
            legs: Vec::new(),
        }
    }

    pub fn invested(&self) -> Decimal {
        self.legs.iter().map(|(_, w)| *w).sum()
    }

    pub fn weight(&self, symbol: &str) -> Decimal {
        self.legs
            .iter()
            .filter(|(s, _)| s == symbol)
            .map(|(_, w)| *w)
            .sum()
    }
}

/// Duration sleeve: a fast/slow SMA crossover on the rates proxy picks the
/// bull or bear bond instrument.
#[derive(Debug, Clone)]
pub struct TreasuryOverlay {
    sma_fast: usize,
    sma_slow: usize,
    max_bond_weight: Decimal,
    bull_bond: String,
    bear_bond: String,
}

impl TreasuryOverlay {
    pub fn new(cfg: &TreasuryConfig, symbols: &SymbolConfig) -> EngineResult<Self> {
        if cfg.bond_sma_fast == 0 || cfg.bond_sma_fast >= cfg.bond_sma_slow {
            return Err(EngineError::invalid(
                "treasury.bond_sma_fast",
                format!(
                    "need 0 < bond_sma_fast < bond_sma_slow, got {} / {}",
                    cfg.bond_sma_fast, cfg.bond_sma_slow
                ),
            ));
        }
        if cfg.max_bond_weight < Decimal::ZERO || cfg.max_bond_weight > Decimal::ONE {
            return Err(EngineError::invalid(
                "treasury.max_bond_weight",
                format!("must be within [0, 1], got {}", cfg.max_bond_weight),
            ));
        }
        Ok(Self {
            sma_fast: cfg.bond_sma_fast,
            sma_slow: cfg.bond_sma_slow,
            max_bond_weight: cfg.max_bond_weight,
            bull_bond: symbols.bull_bond.clone(),
            bear_bond: symbols.bear_bond.clone(),
        })
    }

    pub fn required_history(&self) -> usize {
        self.sma_slow
    }

    pub fn bond_trend(&self, rate_closes: &[Decimal]) -> Option<BondTrend> {
        let fast = sma(rate_closes, self.sma_fast)?;
        let slow = sma(rate_closes, self.sma_slow)?;
        Some(if fast > slow {
            BondTrend::Bull
        } else {
            BondTrend::Bear
        })
    }

    /// Without enough rates history the whole remainder stays in cash.
    pub fn allocate(&self, defensive: Decimal, rate_closes: &[Decimal]) -> OverlayAllocation {
        let Some(trend) = self.bond_trend(rate_closes) else {
            return OverlayAllocation::empty(OverlayKind::Treasury);
        };
        let weight = (defensive * TREASURY_DEFENSIVE_SHARE).min(self.max_bond_weight);
        if weight <= Decimal::ZERO {
            return OverlayAllocation::empty(OverlayKind::Treasury);
        }
        let symbol = match trend {
            BondTrend::Bull => self.bull_bond.clone(),
            BondTrend::Bear => self.bear_bond.clone(),
        };
        OverlayAllocation {
            kind: OverlayKind::Treasury,
            legs: vec![(symbol, weight)],
        }
    }
}

#[derive(Debug, Clone)]
struct SilverLeg {
    symbol: String,
    roc_lookback: usize,
    ratio: Decimal,
}

/// Hard-asset sleeve: gold momentum sets full or half strength, silver joins
/// only when its momentum leads gold's.
#[derive(Debug, Clone)]
pub struct CommodityOverlay {
    gold: String,
    allocation_pct: Decimal,
    gold_sma_window: usize,
    max_gold_weight: Decimal,
    silver: Option<SilverLeg>,
}

impl CommodityOverlay {
    pub fn new(cfg: &CommodityConfig, symbols: &SymbolConfig) -> EngineResult<Self> {
        if cfg.gold_sma_window == 0 {
            return Err(EngineError::invalid(
                "commodity.gold_sma_window",
                "must be > 0",
            ));
        }
        for (name, value) in [
            ("commodity.allocation_pct", cfg.allocation_pct),
            ("commodity.max_gold_weight", cfg.max_gold_weight),
            ("commodity.silver_ratio", cfg.silver_ratio),
        ] {
            if value < Decimal::ZERO || value > Decimal::ONE {
                return Err(EngineError::invalid(
                    name,
                    format!("must be within [0, 1], got {}", value),
                ));
            }
        }
        let silver = if cfg.silver_enabled {
            if cfg.silver_roc_lookback == 0 {
                return Err(EngineError::invalid(
                    "commodity.silver_roc_lookback",
                    "must be > 0",
                ));
            }
            Some(SilverLeg {
                symbol: symbols.silver.clone(),
                roc_lookback: cfg.silver_roc_lookback,
                ratio: cfg.silver_ratio,
            })
        } else {
            None
        };
        Ok(Self {
            gold: symbols.gold.clone(),
            allocation_pct: cfg.allocation_pct,
            gold_sma_window: cfg.gold_sma_window,
            max_gold_weight: cfg.max_gold_weight,
            silver,
        })
    }

    pub fn silver_symbol(&self) -> Option<&str> {
        self.silver.as_ref().map(|s| s.symbol.as_str())
    }

    pub fn history_needed(&self) -> usize {
        let silver = self.silver.as_ref().map_or(0, |s| s.roc_lookback + 1);
        self.gold_sma_window.max(silver)
    }

    /// `true` when gold closes above its long SMA.
    pub fn gold_momentum(&self, gold_closes: &[Decimal]) -> Option<bool> {
        let avg = sma(gold_closes, self.gold_sma_window)?;
        let last = *gold_closes.last()?;
        Some(last > avg)
    }

    pub fn allocate(
        &self,
        defensive: Decimal,
        gold_closes: &[Decimal],
        silver_closes: &[Decimal],
    ) -> OverlayAllocation {
        let Some(full_strength) = self.gold_momentum(gold_closes) else {
            return OverlayAllocation::empty(OverlayKind::Commodity);
        };
        let strength = if full_strength { Decimal::ONE } else { dec!(0.5) };
        let overlay = defensive * self.allocation_pct * strength;
        if overlay <= Decimal::ZERO {
            return OverlayAllocation::empty(OverlayKind::Commodity);
        }

        let mut legs = Vec::with_capacity(2);
        let silver_leads = self.silver.as_ref().and_then(|leg| {
            let roc_silver = rate_of_change(silver_closes, leg.roc_lookback)?;
            let roc_gold = rate_of_change(gold_closes, leg.roc_lookback)?;
            (roc_silver > roc_gold).then_some(leg)
        });
        match silver_leads {
            Some(leg) => {
                let silver_w = overlay * leg.ratio;
                let gold_w = (overlay - silver_w).min(self.max_gold_weight);
                if gold_w > Decimal::ZERO {
                    legs.push((self.gold.clone(), gold_w));
                }
                if silver_w > Decimal::ZERO {
                    legs.push((leg.symbol.clone(), silver_w));
                }
            }
            None => {
                legs.push((self.gold.clone(), overlay.min(self.max_gold_weight)));
            }
        }
        OverlayAllocation {
            kind: OverlayKind::Commodity,
            legs,
        }
    }
}
