use crate::config::HedgeConfig;
use crate::error::{EngineError, EngineResult};
use crate::indicator::stats::{pearson, simple_returns};
use crate::model::regime::HedgePreference;

/// Chooses bonds or hard assets for defensive capital from the rolling
/// correlation between the risk asset and the rates proxy. When stocks and
/// long bonds move together, duration stops hedging.
#[derive(Debug, Clone)]
pub struct HedgePreferenceRouter {
    lookback: usize,
    threshold: f64,
}

impl HedgePreferenceRouter {
    pub fn new(cfg: &HedgeConfig) -> EngineResult<Self> {
        if cfg.correlation_lookback < 2 {
            return Err(EngineError::invalid(
                "hedge.correlation_lookback",
                "must be >= 2",
            ));
        }
        if !(-1.0..=1.0).contains(&cfg.correlation_threshold) {
            return Err(EngineError::invalid(
                "hedge.correlation_threshold",
                format!("must be within [-1, 1], got {}", cfg.correlation_threshold),
            ));
        }
        Ok(Self {
            lookback: cfg.correlation_lookback,
            threshold: cfg.correlation_threshold,
        })
    }

    /// Closes needed per series (one more than the number of returns).
    pub fn required_history(&self) -> usize {
        self.lookback + 1
    }

    /// Correlation of daily returns over the last `lookback` returns of two
    /// aligned close series.
    pub fn correlation(&self, primary: &[f64], proxy: &[f64]) -> Option<f64> {
        let need = self.required_history();
        if primary.len() < need || proxy.len() < need {
            return None;
        }
        let a = simple_returns(&primary[primary.len() - need..]);
        let b = simple_returns(&proxy[proxy.len() - need..]);
        pearson(&a, &b)
    }

    /// `Paper` on insufficient or degenerate data.
    pub fn route(&self, primary: &[f64], proxy: &[f64]) -> HedgePreference {
        match self.correlation(primary, proxy) {
            Some(corr) if corr >= self.threshold => HedgePreference::Hard,
            _ => HedgePreference::Paper,
        }
    }
}
