pub mod matrix;
pub mod overlay;

pub use matrix::{cell_id, is_defensive, RegimeAllocationMatrix};
pub use overlay::{
    BondTrend, CommodityOverlay, OverlayAllocation, OverlayKind, TreasuryOverlay,
    TREASURY_DEFENSIVE_SHARE,
};
