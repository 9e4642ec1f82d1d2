pub mod allocation;
pub mod bar;
pub mod regime;
pub mod rebalance;
