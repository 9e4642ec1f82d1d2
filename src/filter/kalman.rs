use std::collections::VecDeque;

use crate::config::FilterConfig;
use crate::error::{EngineError, EngineResult};
use crate::filter::noise::{NoiseInputs, NoiseModel};
use crate::indicator::wma::Wma;
use crate::model::bar::Bar;

type Mat2 = [[f64; 2]; 2];

const IDENTITY: Mat2 = [[1.0, 0.0], [0.0, 1.0]];
const ZERO: Mat2 = [[0.0, 0.0], [0.0, 0.0]];

/// One observation fed to [`TrendFilter::update`]. Which optional fields are
/// required depends on the noise model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterInput {
    pub close: f64,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub volume: Option<f64>,
}

impl FilterInput {
    pub fn close(close: f64) -> Self {
        Self {
            close,
            high: None,
            low: None,
            volume: None,
        }
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn with_range(mut self, high: f64, low: f64) -> Self {
        self.high = Some(high);
        self.low = Some(low);
        self
    }
}

impl From<&Bar> for FilterInput {
    fn from(bar: &Bar) -> Self {
        Self::close(bar.close_f64())
            .with_range(bar.high_f64(), bar.low_f64())
            .with_volume(bar.volume_f64())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterOutput {
    pub filtered_price: f64,
    pub trend_strength: f64,
}

/// Constant-velocity Kalman filter over closes with an adaptive measurement
/// noise and an innovation-based trend oscillator.
///
/// State is `[position, velocity]` with `F = [[1, 1], [0, 1]]` and
/// `H = [1, 0]`. One instance tracks exactly one symbol.
#[derive(Debug, Clone)]
pub struct TrendFilter {
    model: NoiseModel,
    q: Mat2,
    measurement_noise: f64,
    osc_smoothness: usize,
    sigma_lookback: usize,
    signed_output: bool,
    x: [f64; 2],
    p: Mat2,
    innovations: VecDeque<f64>,
    /// Oscillator history (capacity `trend_lookback`), weighted over the
    /// last `osc_smoothness` values.
    oscillators: Wma,
    second_pass: Option<Wma>,
    prev_inputs: NoiseInputs,
    bars: u64,
}

fn positive_finite(name: &'static str, value: f64) -> EngineResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(EngineError::invalid(
            name,
            format!("must be positive and finite, got {}", value),
        ));
    }
    Ok(())
}

fn positive_len(name: &'static str, value: usize) -> EngineResult<()> {
    if value == 0 {
        return Err(EngineError::invalid(name, "must be > 0"));
    }
    Ok(())
}

impl TrendFilter {
    pub fn new(cfg: &FilterConfig) -> EngineResult<Self> {
        positive_finite("filter.process_noise_1", cfg.process_noise_1)?;
        positive_finite("filter.process_noise_2", cfg.process_noise_2)?;
        positive_finite("filter.measurement_noise", cfg.measurement_noise)?;
        positive_len("filter.osc_smoothness", cfg.osc_smoothness)?;
        positive_len("filter.sigma_lookback", cfg.sigma_lookback)?;
        positive_len("filter.trend_lookback", cfg.trend_lookback)?;
        if let Some(n) = cfg.strength_smoothness {
            positive_len("filter.strength_smoothness", n)?;
        }
        if cfg.osc_smoothness > cfg.trend_lookback {
            return Err(EngineError::invalid(
                "filter.osc_smoothness",
                format!(
                    "must not exceed trend_lookback ({} > {})",
                    cfg.osc_smoothness, cfg.trend_lookback
                ),
            ));
        }
        if cfg.osc_smoothness > cfg.sigma_lookback {
            return Err(EngineError::invalid(
                "filter.osc_smoothness",
                format!(
                    "must not exceed sigma_lookback ({} > {})",
                    cfg.osc_smoothness, cfg.sigma_lookback
                ),
            ));
        }

        Ok(Self {
            model: NoiseModel::from_config(cfg),
            q: [[cfg.process_noise_1, 0.0], [0.0, cfg.process_noise_2]],
            measurement_noise: cfg.measurement_noise,
            osc_smoothness: cfg.osc_smoothness,
            sigma_lookback: cfg.sigma_lookback,
            signed_output: cfg.signed_output,
            x: [0.0, 0.0],
            p: ZERO,
            innovations: VecDeque::with_capacity(cfg.sigma_lookback),
            oscillators: Wma::windowed(cfg.osc_smoothness, cfg.trend_lookback),
            second_pass: cfg.strength_smoothness.map(Wma::new),
            prev_inputs: NoiseInputs::default(),
            bars: 0,
        })
    }

    /// Feed one observation. Fails with `MissingInput` before touching any
    /// state when the noise model needs a field that is absent.
    pub fn update(&mut self, input: FilterInput) -> EngineResult<FilterOutput> {
        let inputs = NoiseInputs::new(input.high, input.low, input.volume);

        if self.bars == 0 {
            self.x = [input.close, 0.0];
            self.p = IDENTITY;
            self.prev_inputs = inputs;
            self.bars = 1;
            return Ok(FilterOutput {
                filtered_price: input.close,
                trend_strength: 0.0,
            });
        }

        let ratio = self.model.ratio(&self.prev_inputs, &inputs)?;
        let r_adj = self.measurement_noise * ratio;

        // Predict.
        let x_pred = [self.x[0] + self.x[1], self.x[1]];
        let p = self.p;
        let fp = [[p[0][0] + p[1][0], p[0][1] + p[1][1]], [p[1][0], p[1][1]]];
        let p_pred = [
            [fp[0][0] + fp[0][1] + self.q[0][0], fp[0][1] + self.q[0][1]],
            [fp[1][0] + fp[1][1] + self.q[1][0], fp[1][1] + self.q[1][1]],
        ];

        // Update.
        let s = p_pred[0][0] + r_adj;
        let k = [p_pred[0][0] / s, p_pred[1][0] / s];
        let innovation = input.close - x_pred[0];
        self.x = [x_pred[0] + k[0] * innovation, x_pred[1] + k[1] * innovation];
        self.p = [
            [(1.0 - k[0]) * p_pred[0][0], (1.0 - k[0]) * p_pred[0][1]],
            [
                p_pred[1][0] - k[1] * p_pred[0][0],
                p_pred[1][1] - k[1] * p_pred[0][1],
            ],
        ];
        self.prev_inputs = inputs;
        self.bars += 1;

        let trend_strength = self.oscillate(innovation);
        Ok(FilterOutput {
            filtered_price: self.x[0],
            trend_strength,
        })
    }

    fn oscillate(&mut self, innovation: f64) -> f64 {
        if self.innovations.len() == self.sigma_lookback {
            let _ = self.innovations.pop_front();
        }
        self.innovations.push_back(innovation.abs());
        if self.innovations.len() < self.osc_smoothness {
            return 0.0;
        }

        let max_abs = self.innovations.iter().copied().fold(0.0_f64, f64::max);
        let osc = if max_abs > 0.0 {
            innovation / max_abs * 100.0
        } else {
            0.0
        };
        let first = self.oscillators.push(osc);
        let smoothed = match self.second_pass.as_mut() {
            Some(wma) => wma.push(first),
            None => first,
        };
        if self.signed_output {
            smoothed
        } else {
            smoothed.abs()
        }
    }

    /// Forget everything; the next update re-initializes from its close.
    pub fn reset(&mut self) {
        self.x = [0.0, 0.0];
        self.p = ZERO;
        self.innovations.clear();
        self.oscillators.clear();
        if let Some(wma) = self.second_pass.as_mut() {
            wma.clear();
        }
        self.prev_inputs = NoiseInputs::default();
        self.bars = 0;
    }

    pub fn noise_model(&self) -> NoiseModel {
        self.model
    }

    pub fn position(&self) -> f64 {
        self.x[0]
    }

    pub fn velocity(&self) -> f64 {
        self.x[1]
    }

    pub fn covariance(&self) -> Mat2 {
        self.p
    }

    pub fn bars(&self) -> u64 {
        self.bars
    }

    /// `true` once the innovation buffer is long enough to emit a non-zero
    /// trend strength.
    pub fn is_warm(&self) -> bool {
        self.innovations.len() >= self.osc_smoothness
    }
}
