use crate::config::{FilterConfig, NoiseModelKind};
use crate::error::{EngineError, EngineResult};

const RANGE_EPSILON: f64 = 1e-10;

/// Measurement-noise adjustment applied on every update after the first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoiseModel {
    Standard,
    VolumeAdjusted { symmetric: bool },
    ParkinsonAdjusted,
}

impl NoiseModel {
    pub fn from_config(cfg: &FilterConfig) -> Self {
        match cfg.model {
            NoiseModelKind::Standard => Self::Standard,
            NoiseModelKind::Volume => Self::VolumeAdjusted {
                symmetric: cfg.symmetric_volume,
            },
            NoiseModelKind::Parkinson => Self::ParkinsonAdjusted,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::VolumeAdjusted { .. } => "volume",
            Self::ParkinsonAdjusted => "parkinson",
        }
    }

    /// Multiplier on the base measurement noise.
    pub fn ratio(&self, prev: &NoiseInputs, curr: &NoiseInputs) -> EngineResult<f64> {
        match self {
            Self::Standard => Ok(1.0),
            Self::VolumeAdjusted { symmetric } => {
                let vol = curr.volume.ok_or(EngineError::MissingInput {
                    model: self.name(),
                    field: "volume",
                })?;
                let Some(prev_vol) = prev.volume else {
                    return Ok(1.0);
                };
                if prev_vol <= 0.0 || vol <= 0.0 {
                    return Ok(1.0);
                }
                if *symmetric {
                    Ok(prev_vol / vol)
                } else {
                    Ok(prev_vol / prev_vol.max(vol))
                }
            }
            Self::ParkinsonAdjusted => {
                let curr_range = curr.range.ok_or(EngineError::MissingInput {
                    model: self.name(),
                    field: "high/low",
                })?;
                let Some(prev_range) = prev.range else {
                    return Ok(1.0);
                };
                Ok(1.0 + curr_range.max(RANGE_EPSILON) / prev_range.max(RANGE_EPSILON))
            }
        }
    }
}

/// The per-bar fields a noise model may look at.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NoiseInputs {
    pub volume: Option<f64>,
    pub range: Option<f64>,
}

impl NoiseInputs {
    pub fn new(high: Option<f64>, low: Option<f64>, volume: Option<f64>) -> Self {
        let range = match (high, low) {
            (Some(h), Some(l)) => Some((h - l).abs()),
            _ => None,
        };
        Self { volume, range }
    }
}
