pub mod hedge;
pub mod trend;
pub mod volatility;

pub use hedge::HedgePreferenceRouter;
pub use trend::{apply_crush_veto, TrendClassifier, TrendReading};
pub use volatility::{ShockBrake, VolReading, VolResolution, VolatilityRegimeClassifier};
