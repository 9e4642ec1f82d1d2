use crate::config::{ShockBrakeConfig, ShockDirection, VolatilityConfig};
use crate::error::{EngineError, EngineResult};
use crate::indicator::stats::{log_returns, mean, rolling_std, sample_std};
use crate::model::regime::VolState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolReading {
    /// Annualized realized vol over the short window.
    pub realized_vol: f64,
    pub z_score: f64,
    /// Fractional change in realized vol over the crush lookback, if
    /// computable.
    pub vol_change: Option<f64>,
    pub vol_crush: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolResolution {
    pub state: VolState,
    pub crush_override: bool,
    pub shock_override: bool,
}

/// Realized-volatility z-score with a Low/High hysteresis band.
#[derive(Debug, Clone)]
pub struct VolatilityRegimeClassifier {
    short_window: usize,
    baseline_window: usize,
    upper_threshold: f64,
    lower_threshold: f64,
    crush_threshold: f64,
    crush_lookback: usize,
    annualization: f64,
}

impl VolatilityRegimeClassifier {
    pub fn new(cfg: &VolatilityConfig) -> EngineResult<Self> {
        if cfg.short_window < 2 {
            return Err(EngineError::invalid(
                "volatility.short_window",
                "must be >= 2",
            ));
        }
        if cfg.baseline_window < 2 {
            return Err(EngineError::invalid(
                "volatility.baseline_window",
                "must be >= 2",
            ));
        }
        if !(cfg.upper_threshold_z > cfg.lower_threshold_z) {
            return Err(EngineError::invalid(
                "volatility.upper_threshold_z",
                format!(
                    "must be greater than lower_threshold_z ({} <= {})",
                    cfg.upper_threshold_z, cfg.lower_threshold_z
                ),
            ));
        }
        if !(cfg.crush_threshold < 0.0) {
            return Err(EngineError::invalid(
                "volatility.crush_threshold",
                format!("must be negative, got {}", cfg.crush_threshold),
            ));
        }
        if cfg.crush_lookback == 0 || cfg.crush_lookback >= cfg.baseline_window {
            return Err(EngineError::invalid(
                "volatility.crush_lookback",
                format!(
                    "must be within [1, baseline_window), got {}",
                    cfg.crush_lookback
                ),
            ));
        }
        if !(cfg.annualization_days > 0.0) {
            return Err(EngineError::invalid(
                "volatility.annualization_days",
                "must be > 0",
            ));
        }
        Ok(Self {
            short_window: cfg.short_window,
            baseline_window: cfg.baseline_window,
            upper_threshold: cfg.upper_threshold_z,
            lower_threshold: cfg.lower_threshold_z,
            crush_threshold: cfg.crush_threshold,
            crush_lookback: cfg.crush_lookback,
            annualization: cfg.annualization_days.sqrt(),
        })
    }

    /// Closes needed before a reading is possible.
    pub fn required_history(&self) -> usize {
        self.baseline_window + self.short_window
    }

    /// `None` until [`required_history`](Self::required_history) closes are
    /// available; the caller skips the bar in that case.
    pub fn measure(&self, closes: &[f64]) -> Option<VolReading> {
        let needed = self.required_history();
        if closes.len() < needed {
            return None;
        }
        let tail = &closes[closes.len() - needed..];
        let returns = log_returns(tail);
        let series: Vec<f64> = rolling_std(&returns, self.short_window)
            .into_iter()
            .map(|s| s * self.annualization)
            .collect();
        let realized_vol = *series.last()?;

        let z_score = match (mean(&series), sample_std(&series)) {
            (Some(m), Some(sd)) if sd > f64::EPSILON => (realized_vol - m) / sd,
            _ => 0.0,
        };

        let vol_change = if series.len() > self.crush_lookback {
            let prior = series[series.len() - 1 - self.crush_lookback];
            (prior > 0.0).then(|| (realized_vol - prior) / prior)
        } else {
            None
        };
        let vol_crush = vol_change.is_some_and(|c| c < self.crush_threshold);

        Some(VolReading {
            realized_vol,
            z_score,
            vol_change,
            vol_crush,
        })
    }

    /// Plain hysteresis step. `prev` is `None` on the first eligible bar.
    pub fn next_state(&self, prev: Option<VolState>, z_score: f64) -> VolState {
        match prev {
            None => {
                if z_score > 0.0 {
                    VolState::High
                } else {
                    VolState::Low
                }
            }
            Some(_) if z_score > self.upper_threshold => VolState::High,
            Some(_) if z_score < self.lower_threshold => VolState::Low,
            Some(state) => state,
        }
    }

    /// Hysteresis plus overrides. An active shock brake wins over a crush.
    pub fn resolve(
        &self,
        prev: Option<VolState>,
        reading: &VolReading,
        shock_active: bool,
    ) -> VolResolution {
        let base = self.next_state(prev, reading.z_score);
        if shock_active {
            VolResolution {
                state: VolState::High,
                crush_override: false,
                shock_override: true,
            }
        } else if reading.vol_crush {
            VolResolution {
                state: VolState::Low,
                crush_override: true,
                shock_override: false,
            }
        } else {
            VolResolution {
                state: base,
                crush_override: false,
                shock_override: false,
            }
        }
    }
}

/// Single-bar adverse-move detector that arms a cooldown.
#[derive(Debug, Clone)]
pub struct ShockBrake {
    threshold: f64,
    cooldown_days: u32,
    direction: ShockDirection,
}

impl ShockBrake {
    pub fn new(cfg: &ShockBrakeConfig) -> EngineResult<Self> {
        if !cfg.threshold.is_finite() || cfg.threshold <= 0.0 {
            return Err(EngineError::invalid(
                "shock_brake.threshold",
                format!("must be positive, got {}", cfg.threshold),
            ));
        }
        if cfg.cooldown_days == 0 {
            return Err(EngineError::invalid(
                "shock_brake.cooldown_days",
                "must be > 0",
            ));
        }
        Ok(Self {
            threshold: cfg.threshold,
            cooldown_days: cfg.cooldown_days,
            direction: cfg.direction,
        })
    }

    pub fn detect(&self, prev_close: f64, close: f64) -> bool {
        if prev_close <= 0.0 {
            return false;
        }
        let ret = close / prev_close - 1.0;
        match self.direction {
            ShockDirection::DownOnly => ret < -self.threshold,
            ShockDirection::Absolute => ret.abs() > self.threshold,
        }
    }

    pub fn cooldown_days(&self) -> u32 {
        self.cooldown_days
    }
}
