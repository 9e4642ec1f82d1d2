use rust_decimal::Decimal;

use crate::config::TrendConfig;
use crate::error::{EngineError, EngineResult};
use crate::indicator::sma::sma;
use crate::model::regime::TrendState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendReading {
    pub t_norm: f64,
    pub fast_sma: Decimal,
    pub slow_sma: Decimal,
    pub state: TrendState,
}

/// Signed trend strength gated by a fast/slow SMA structure.
#[derive(Debug, Clone)]
pub struct TrendClassifier {
    t_max: f64,
    bull_threshold: f64,
    bear_threshold: f64,
    sma_fast: usize,
    sma_slow: usize,
}

impl TrendClassifier {
    pub fn new(cfg: &TrendConfig) -> EngineResult<Self> {
        if !cfg.t_max.is_finite() || cfg.t_max <= 0.0 {
            return Err(EngineError::invalid(
                "trend.t_max",
                format!("must be positive, got {}", cfg.t_max),
            ));
        }
        if !(cfg.bear_threshold < 0.0 && 0.0 < cfg.bull_threshold) {
            return Err(EngineError::invalid(
                "trend.bull_threshold",
                format!(
                    "need bear_threshold < 0 < bull_threshold, got {} / {}",
                    cfg.bear_threshold, cfg.bull_threshold
                ),
            ));
        }
        if cfg.sma_fast == 0 || cfg.sma_fast >= cfg.sma_slow {
            return Err(EngineError::invalid(
                "trend.sma_fast",
                format!(
                    "need 0 < sma_fast < sma_slow, got {} / {}",
                    cfg.sma_fast, cfg.sma_slow
                ),
            ));
        }
        Ok(Self {
            t_max: cfg.t_max,
            bull_threshold: cfg.bull_threshold,
            bear_threshold: cfg.bear_threshold,
            sma_fast: cfg.sma_fast,
            sma_slow: cfg.sma_slow,
        })
    }

    pub fn required_history(&self) -> usize {
        self.sma_slow
    }

    /// Clamp trend strength into `[-1, 1]`. Non-finite input maps to 0.
    pub fn normalize(&self, trend_strength: f64) -> f64 {
        if !trend_strength.is_finite() {
            return 0.0;
        }
        (trend_strength / self.t_max).clamp(-1.0, 1.0)
    }

    pub fn label(&self, t_norm: f64, fast_sma: Decimal, slow_sma: Decimal) -> TrendState {
        if t_norm > self.bull_threshold && fast_sma > slow_sma {
            TrendState::BullStrong
        } else if t_norm < self.bear_threshold && fast_sma < slow_sma {
            TrendState::BearStrong
        } else {
            TrendState::Sideways
        }
    }

    /// `None` until `sma_slow` closes exist.
    pub fn classify(&self, trend_strength: f64, closes: &[Decimal]) -> Option<TrendReading> {
        let fast_sma = sma(closes, self.sma_fast)?;
        let slow_sma = sma(closes, self.sma_slow)?;
        let t_norm = self.normalize(trend_strength);
        Some(TrendReading {
            t_norm,
            fast_sma,
            slow_sma,
            state: self.label(t_norm, fast_sma, slow_sma),
        })
    }
}

/// A volatility crush (without an active shock brake) vetoes a bearish label.
pub fn apply_crush_veto(state: TrendState, crush_override: bool, shock_override: bool) -> TrendState {
    if crush_override && !shock_override && state == TrendState::BearStrong {
        TrendState::Sideways
    } else {
        state
    }
}
