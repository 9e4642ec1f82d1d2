pub mod sma;
pub mod stats;
pub mod wma;
