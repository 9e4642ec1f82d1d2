use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VolState {
    Low,
    High,
}

impl VolState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrendState {
    BullStrong,
    Sideways,
    BearStrong,
}

impl TrendState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BullStrong => "bull_strong",
            Self::Sideways => "sideways",
            Self::BearStrong => "bear_strong",
        }
    }
}

/// Where defensive capital goes: duration (`Paper`) or hard assets (`Hard`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HedgePreference {
    Paper,
    Hard,
}

/// Regime bookkeeping for one traded universe. Owned by the engine; external
/// readers only ever see a [`RegimeSnapshot`].
#[derive(Debug, Clone)]
pub struct RegimeState {
    pub vol_state: VolState,
    /// `false` until the first bar that was eligible for vol classification.
    pub vol_initialized: bool,
    pub trend_state: TrendState,
    pub cell_id: u8,
    pub hedge_preference: Option<HedgePreference>,
    /// `Some` only when the shock brake is enabled.
    pub shock_timer: Option<u32>,
    pub shock_brake_active: Option<bool>,
    pub vol_crush_active: bool,
    /// Held weights; cash is implicit as `1 - sum`.
    pub weights: BTreeMap<String, Decimal>,
    pub last_filtered_price: Option<f64>,
    pub last_trend_strength: Option<f64>,
    pub last_t_norm: Option<f64>,
    pub last_z_score: Option<f64>,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub bars_processed: u64,
}

impl RegimeState {
    pub fn new(shock_brake_enabled: bool) -> Self {
        Self {
            vol_state: VolState::Low,
            vol_initialized: false,
            trend_state: TrendState::Sideways,
            cell_id: 3,
            hedge_preference: None,
            shock_timer: shock_brake_enabled.then_some(0),
            shock_brake_active: shock_brake_enabled.then_some(false),
            vol_crush_active: false,
            weights: BTreeMap::new(),
            last_filtered_price: None,
            last_trend_strength: None,
            last_t_norm: None,
            last_z_score: None,
            last_timestamp: None,
            bars_processed: 0,
        }
    }

    pub fn invested(&self) -> Decimal {
        self.weights.values().copied().sum()
    }

    pub fn implied_cash(&self) -> Decimal {
        Decimal::ONE - self.invested()
    }

    /// Count one admitted bar against the cooldown, floored at zero.
    pub fn tick_shock_timer(&mut self) {
        if let Some(timer) = self.shock_timer.as_mut() {
            *timer = timer.saturating_sub(1);
        }
    }

    pub fn snapshot(&self) -> RegimeSnapshot {
        RegimeSnapshot {
            vol_state: self.vol_state,
            trend_state: self.trend_state,
            cell_id: self.cell_id,
            hedge_preference: self.hedge_preference,
            shock_timer: self.shock_timer,
            shock_brake_active: self.shock_brake_active,
            vol_crush_active: self.vol_crush_active,
            weights: self.weights.clone(),
            cash: self.implied_cash(),
            filtered_price: self.last_filtered_price,
            trend_strength: self.last_trend_strength,
            t_norm: self.last_t_norm,
            z_score: self.last_z_score,
            timestamp: self.last_timestamp,
            bars_processed: self.bars_processed,
        }
    }
}

/// Read-only copy of [`RegimeState`] for reporting collaborators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegimeSnapshot {
    pub vol_state: VolState,
    pub trend_state: TrendState,
    pub cell_id: u8,
    pub hedge_preference: Option<HedgePreference>,
    pub shock_timer: Option<u32>,
    pub shock_brake_active: Option<bool>,
    pub vol_crush_active: bool,
    pub weights: BTreeMap<String, Decimal>,
    /// Unheld share of the portfolio, `1 - sum(weights)`.
    pub cash: Decimal,
    pub filtered_price: Option<f64>,
    pub trend_strength: Option<f64>,
    pub t_norm: Option<f64>,
    pub z_score: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub bars_processed: u64,
}
