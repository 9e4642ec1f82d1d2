use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::error::{EngineError, EngineResult};

pub const CONFIG_PATH_ENV: &str = "REGIME_ALLOCATOR_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub symbols: SymbolConfig,
    pub filter: FilterConfig,
    pub volatility: VolatilityConfig,
    pub shock_brake: ShockBrakeConfig,
    pub trend: TrendConfig,
    pub hedge: HedgeConfig,
    pub treasury: TreasuryConfig,
    pub commodity: CommodityConfig,
    pub allocation: AllocationConfig,
    pub rebalance: RebalanceConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SymbolConfig {
    /// Series that drives the filter and both classifiers.
    pub signal: String,
    pub leveraged_long: String,
    pub core_long: String,
    pub inverse_hedge: String,
    pub bull_bond: String,
    pub bear_bond: String,
    /// Long-duration rates proxy for hedge routing and bond trend.
    pub rate_proxy: String,
    pub gold: String,
    pub silver: String,
}

impl Default for SymbolConfig {
    fn default() -> Self {
        Self {
            signal: "QQQ".to_string(),
            leveraged_long: "TQQQ".to_string(),
            core_long: "QQQ".to_string(),
            inverse_hedge: "PSQ".to_string(),
            bull_bond: "TMF".to_string(),
            bear_bond: "TMV".to_string(),
            rate_proxy: "TLT".to_string(),
            gold: "GLD".to_string(),
            silver: "SLV".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseModelKind {
    #[default]
    Standard,
    Volume,
    Parkinson,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub model: NoiseModelKind,
    /// Volume model only: also raise noise when volume falls.
    pub symmetric_volume: bool,
    pub process_noise_1: f64,
    pub process_noise_2: f64,
    pub measurement_noise: f64,
    pub osc_smoothness: usize,
    /// Second WMA pass; `None` disables it.
    pub strength_smoothness: Option<usize>,
    pub sigma_lookback: usize,
    pub trend_lookback: usize,
    /// `false` selects the legacy absolute-value output.
    pub signed_output: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            model: NoiseModelKind::Standard,
            symmetric_volume: false,
            process_noise_1: 0.01,
            process_noise_2: 0.01,
            measurement_noise: 500.0,
            osc_smoothness: 15,
            strength_smoothness: Some(15),
            sigma_lookback: 500,
            trend_lookback: 20,
            signed_output: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VolatilityConfig {
    pub short_window: usize,
    pub baseline_window: usize,
    pub upper_threshold_z: f64,
    pub lower_threshold_z: f64,
    /// Fractional drop in realized vol that forces Low; must be negative.
    pub crush_threshold: f64,
    pub crush_lookback: usize,
    pub annualization_days: f64,
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            short_window: 21,
            baseline_window: 126,
            upper_threshold_z: 1.0,
            lower_threshold_z: 0.2,
            crush_threshold: -0.15,
            crush_lookback: 5,
            annualization_days: 252.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShockDirection {
    #[default]
    DownOnly,
    Absolute,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShockBrakeConfig {
    pub enabled: bool,
    /// Single-bar return magnitude, e.g. `0.03` for 3%.
    pub threshold: f64,
    pub cooldown_days: u32,
    pub direction: ShockDirection,
}

impl Default for ShockBrakeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.03,
            cooldown_days: 5,
            direction: ShockDirection::DownOnly,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub t_max: f64,
    pub bull_threshold: f64,
    pub bear_threshold: f64,
    pub sma_fast: usize,
    pub sma_slow: usize,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            t_max: 50.0,
            bull_threshold: 0.3,
            bear_threshold: -0.3,
            sma_fast: 40,
            sma_slow: 140,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HedgeConfig {
    pub enabled: bool,
    pub correlation_lookback: usize,
    pub correlation_threshold: f64,
}

impl Default for HedgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            correlation_lookback: 60,
            correlation_threshold: 0.2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TreasuryConfig {
    pub enabled: bool,
    pub bond_sma_fast: usize,
    pub bond_sma_slow: usize,
    pub max_bond_weight: Decimal,
}

impl Default for TreasuryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bond_sma_fast: 20,
            bond_sma_slow: 60,
            max_bond_weight: dec!(0.4),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommodityConfig {
    pub enabled: bool,
    /// Share of the defensive remainder offered to hard assets.
    pub allocation_pct: Decimal,
    pub gold_sma_window: usize,
    pub max_gold_weight: Decimal,
    pub silver_enabled: bool,
    pub silver_roc_lookback: usize,
    /// Share of the overlay that goes to silver when its momentum leads.
    pub silver_ratio: Decimal,
}

impl Default for CommodityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allocation_pct: dec!(0.6),
            gold_sma_window: 150,
            max_gold_weight: dec!(0.6),
            silver_enabled: true,
            silver_roc_lookback: 20,
            silver_ratio: dec!(0.5),
        }
    }
}

/// Equity legs of one regime cell. Whatever is left over is the remainder
/// (cash, or the overlay budget in a defensive cell).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CellWeights {
    pub leveraged_long: Decimal,
    pub core_long: Decimal,
    pub inverse_hedge: Decimal,
}

impl CellWeights {
    pub const fn new(leveraged_long: Decimal, core_long: Decimal, inverse_hedge: Decimal) -> Self {
        Self {
            leveraged_long,
            core_long,
            inverse_hedge,
        }
    }

    pub fn equity_total(&self) -> Decimal {
        self.leveraged_long + self.core_long + self.inverse_hedge
    }

    pub fn remainder(&self) -> Decimal {
        Decimal::ONE - self.equity_total()
    }
}

/// Cells in id order: Bull/Low, Bull/High, Side/Low, Side/High, Bear/Low,
/// Bear/High.
pub fn default_cells() -> [CellWeights; 6] {
    [
        CellWeights::new(dec!(0.6), dec!(0.4), dec!(0)),
        CellWeights::new(dec!(0), dec!(1.0), dec!(0)),
        CellWeights::new(dec!(0.2), dec!(0.8), dec!(0)),
        CellWeights::new(dec!(0), dec!(0), dec!(0)),
        CellWeights::new(dec!(0), dec!(0.5), dec!(0)),
        CellWeights::new(dec!(0), dec!(0), dec!(0.5)),
    ]
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// Scales the equity legs before renormalization.
    pub leverage_scalar: Decimal,
    /// Six entries in cell-id order; empty means the built-in matrix.
    pub cells: Vec<CellWeights>,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            leverage_scalar: Decimal::ONE,
            cells: Vec::new(),
        }
    }
}

impl AllocationConfig {
    pub fn resolved_cells(&self) -> [CellWeights; 6] {
        match <[CellWeights; 6]>::try_from(self.cells.as_slice()) {
            Ok(cells) => cells,
            Err(_) => default_cells(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RebalanceConfig {
    pub drift_threshold: Decimal,
    /// Equity basis the binary passes to the engine on every bar.
    pub portfolio_equity: Decimal,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            drift_threshold: dec!(0.025),
            portfolio_equity: dec!(100000),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn unit_interval(name: &'static str, value: Decimal) -> EngineResult<()> {
    if value < Decimal::ZERO || value > Decimal::ONE {
        return Err(EngineError::invalid(
            name,
            format!("must be within [0, 1], got {}", value),
        ));
    }
    Ok(())
}

fn non_empty(name: &'static str, value: &str) -> EngineResult<()> {
    if value.trim().is_empty() {
        return Err(EngineError::invalid(name, "symbol must not be empty"));
    }
    Ok(())
}

impl Config {
    pub fn from_toml_str(s: &str) -> EngineResult<Self> {
        let mut config: Config = toml::from_str(s)?;
        config.symbols.normalize();
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> EngineResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Load from `$REGIME_ALLOCATOR_CONFIG` (after `.env`), falling back to
    /// `config/default.toml`.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::from_path(&path).with_context(|| format!("failed to load {}", path.display()))
    }

    /// Cross-section checks that the individual components do not cover on
    /// their own construction.
    pub fn validate(&self) -> EngineResult<()> {
        let s = &self.symbols;
        non_empty("symbols.signal", &s.signal)?;
        non_empty("symbols.leveraged_long", &s.leveraged_long)?;
        non_empty("symbols.core_long", &s.core_long)?;
        non_empty("symbols.inverse_hedge", &s.inverse_hedge)?;
        if self.treasury.enabled || self.hedge.enabled {
            non_empty("symbols.rate_proxy", &s.rate_proxy)?;
        }
        if self.treasury.enabled {
            non_empty("symbols.bull_bond", &s.bull_bond)?;
            non_empty("symbols.bear_bond", &s.bear_bond)?;
            if s.bull_bond == s.bear_bond {
                return Err(EngineError::Config(format!(
                    "bull and bear bond instruments must differ (both {})",
                    s.bull_bond
                )));
            }
        }
        if self.commodity.enabled {
            non_empty("symbols.gold", &s.gold)?;
            if self.commodity.silver_enabled {
                non_empty("symbols.silver", &s.silver)?;
            }
        }
        unit_interval("treasury.max_bond_weight", self.treasury.max_bond_weight)?;
        unit_interval("commodity.allocation_pct", self.commodity.allocation_pct)?;
        unit_interval("commodity.max_gold_weight", self.commodity.max_gold_weight)?;
        unit_interval("commodity.silver_ratio", self.commodity.silver_ratio)?;
        if self.commodity.enabled && self.commodity.gold_sma_window == 0 {
            return Err(EngineError::invalid("commodity.gold_sma_window", "must be > 0"));
        }
        if self.commodity.silver_enabled && self.commodity.silver_roc_lookback == 0 {
            return Err(EngineError::invalid(
                "commodity.silver_roc_lookback",
                "must be > 0",
            ));
        }
        if self.rebalance.drift_threshold < Decimal::ZERO {
            return Err(EngineError::invalid(
                "rebalance.drift_threshold",
                "must be >= 0",
            ));
        }
        if self.rebalance.portfolio_equity <= Decimal::ZERO {
            return Err(EngineError::invalid(
                "rebalance.portfolio_equity",
                "must be > 0",
            ));
        }
        if !self.allocation.cells.is_empty() && self.allocation.cells.len() != 6 {
            return Err(EngineError::invalid(
                "allocation.cells",
                format!("expected 6 cells, got {}", self.allocation.cells.len()),
            ));
        }
        Ok(())
    }

    /// Every instrument the engine can emit a weight for, excluding cash.
    pub fn traded_instruments(&self) -> Vec<String> {
        let s = &self.symbols;
        let mut out = vec![
            s.leveraged_long.clone(),
            s.core_long.clone(),
            s.inverse_hedge.clone(),
        ];
        if self.treasury.enabled {
            out.push(s.bull_bond.clone());
            out.push(s.bear_bond.clone());
        }
        if self.commodity.enabled {
            out.push(s.gold.clone());
            if self.commodity.silver_enabled {
                out.push(s.silver.clone());
            }
        }
        let mut deduped = Vec::with_capacity(out.len());
        for sym in out {
            if !sym.is_empty() && !deduped.contains(&sym) {
                deduped.push(sym);
            }
        }
        deduped
    }
}

impl SymbolConfig {
    fn normalize(&mut self) {
        for sym in [
            &mut self.signal,
            &mut self.leveraged_long,
            &mut self.core_long,
            &mut self.inverse_hedge,
            &mut self.bull_bond,
            &mut self.bear_bond,
            &mut self.rate_proxy,
            &mut self.gold,
            &mut self.silver,
        ] {
            *sym = sym.trim().to_ascii_uppercase();
        }
    }
}
