pub mod kalman;
pub mod noise;

pub use kalman::{FilterInput, FilterOutput, TrendFilter};
pub use noise::{NoiseInputs, NoiseModel};
