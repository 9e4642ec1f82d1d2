use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::allocation::{
    cell_id, is_defensive, CommodityOverlay, OverlayAllocation, RegimeAllocationMatrix,
    TreasuryOverlay,
};
use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::filter::{FilterInput, TrendFilter};
use crate::history::{closes_to_f64, PriceHistory};
use crate::model::allocation::AllocationTarget;
use crate::model::bar::Bar;
use crate::model::rebalance::RebalanceDecision;
use crate::model::regime::{HedgePreference, RegimeSnapshot, RegimeState};
use crate::rebalance::RebalanceEngine;
use crate::regime::{
    apply_crush_veto, HedgePreferenceRouter, ShockBrake, TrendClassifier,
    VolatilityRegimeClassifier,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    VolatilityWarmup { required: usize, available: usize },
    TrendWarmup { required: usize, available: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct BarDecision {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub target: AllocationTarget,
    pub overlay: Option<OverlayAllocation>,
    pub rebalance: RebalanceDecision,
    /// State after the bar, including the shock-timer decrement.
    pub snapshot: RegimeSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub enum BarOutcome {
    /// A non-signal bar was recorded into history.
    Recorded,
    Skipped(SkipReason),
    Decided(Box<BarDecision>),
}

/// Closes per symbol the history must retain for every stage to see a full
/// window.
pub fn history_depth(config: &Config) -> usize {
    let v = &config.volatility;
    [
        v.baseline_window + v.short_window,
        config.trend.sma_slow,
        config.hedge.correlation_lookback + 1,
        config.treasury.bond_sma_slow,
        config.commodity.gold_sma_window,
        config.commodity.silver_roc_lookback + 1,
        2,
    ]
    .into_iter()
    .max()
    .unwrap_or(2)
        + 1
}

/// One traded universe: a filter, the classifiers, the matrix and the
/// rebalancer around a single [`RegimeState`]. Bars must arrive in
/// timestamp order; same-day bars for the other instruments go in before the
/// signal bar so overlays and validation see today's closes.
pub struct AllocationEngine<H: PriceHistory> {
    config: Config,
    filter: TrendFilter,
    vol: VolatilityRegimeClassifier,
    shock: Option<ShockBrake>,
    trend: TrendClassifier,
    router: Option<HedgePreferenceRouter>,
    matrix: RegimeAllocationMatrix,
    treasury: Option<TreasuryOverlay>,
    commodity: Option<CommodityOverlay>,
    rebalancer: RebalanceEngine,
    state: RegimeState,
    history: H,
    universe: BTreeSet<String>,
    /// Timestamp of the last admitted bar per symbol.
    last_seen: HashMap<String, DateTime<Utc>>,
    depth: usize,
}

impl<H: PriceHistory> AllocationEngine<H> {
    pub fn new(config: Config, history: H) -> EngineResult<Self> {
        config.validate()?;
        let filter = TrendFilter::new(&config.filter)?;
        let vol = VolatilityRegimeClassifier::new(&config.volatility)?;
        let shock = if config.shock_brake.enabled {
            Some(ShockBrake::new(&config.shock_brake)?)
        } else {
            None
        };
        let trend = TrendClassifier::new(&config.trend)?;
        let router = if config.hedge.enabled {
            Some(HedgePreferenceRouter::new(&config.hedge)?)
        } else {
            None
        };
        let matrix = RegimeAllocationMatrix::new(&config.allocation, &config.symbols)?;
        let treasury = if config.treasury.enabled {
            Some(TreasuryOverlay::new(&config.treasury, &config.symbols)?)
        } else {
            None
        };
        let commodity = if config.commodity.enabled {
            Some(CommodityOverlay::new(&config.commodity, &config.symbols)?)
        } else {
            None
        };
        let rebalancer = RebalanceEngine::new(&config.rebalance)?;

        let mut universe: BTreeSet<String> = config.traded_instruments().into_iter().collect();
        universe.insert(config.symbols.signal.clone());
        if router.is_some() || treasury.is_some() {
            universe.insert(config.symbols.rate_proxy.clone());
        }

        let state = RegimeState::new(shock.is_some());
        let depth = history_depth(&config);
        tracing::info!(
            signal = %config.symbols.signal,
            instruments = universe.len(),
            noise_model = filter.noise_model().name(),
            shock_brake = shock.is_some(),
            hedge_router = router.is_some(),
            "Allocation engine ready"
        );

        Ok(Self {
            config,
            filter,
            vol,
            shock,
            trend,
            router,
            matrix,
            treasury,
            commodity,
            rebalancer,
            state,
            history,
            universe,
            last_seen: HashMap::new(),
            depth,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    /// Owned copy of the regime state.
    pub fn snapshot(&self) -> RegimeSnapshot {
        self.state.snapshot()
    }

    pub fn universe(&self) -> impl Iterator<Item = &str> {
        self.universe.iter().map(String::as_str)
    }

    /// Admit one bar. Non-signal bars are only recorded; the signal bar runs
    /// the full pipeline against `equity` (portfolio value in quote currency).
    /// Each symbol's bars must have strictly increasing timestamps; a repeated
    /// or stale bar is rejected before any state changes.
    pub fn on_bar(&mut self, bar: &Bar, equity: Decimal) -> EngineResult<BarOutcome> {
        if !self.universe.contains(&bar.symbol) {
            return Err(EngineError::UnknownSymbol(bar.symbol.clone()));
        }
        if let Some(last) = self.last_seen.get(&bar.symbol) {
            if bar.timestamp <= *last {
                return Err(EngineError::OutOfOrder {
                    symbol: bar.symbol.clone(),
                    timestamp: bar.timestamp,
                });
            }
        }
        if bar.symbol != self.config.symbols.signal {
            self.history.record(bar);
            self.last_seen.insert(bar.symbol.clone(), bar.timestamp);
            return Ok(BarOutcome::Recorded);
        }
        self.process_signal_bar(bar, equity)
    }

    fn process_signal_bar(&mut self, bar: &Bar, equity: Decimal) -> EngineResult<BarOutcome> {
        // Fallible first: a rejected bar leaves every piece of state as it was.
        let filtered = self.filter.update(FilterInput::from(bar))?;
        self.history.record(bar);
        self.last_seen.insert(bar.symbol.clone(), bar.timestamp);

        self.state.bars_processed += 1;
        self.state.last_timestamp = Some(bar.timestamp);
        self.state.last_filtered_price = Some(filtered.filtered_price);
        self.state.last_trend_strength = Some(filtered.trend_strength);

        let signal = self.config.symbols.signal.clone();
        let closes = self.history.get_closes(self.depth, &signal);
        let closes_f = closes_to_f64(&closes);

        let shock_active = self.update_shock_brake(&closes_f);

        let Some(reading) = self.vol.measure(&closes_f) else {
            return Ok(self.skip(SkipReason::VolatilityWarmup {
                required: self.vol.required_history(),
                available: closes_f.len(),
            }));
        };
        let Some(trend_reading) = self.trend.classify(filtered.trend_strength, &closes) else {
            return Ok(self.skip(SkipReason::TrendWarmup {
                required: self.trend.required_history(),
                available: closes.len(),
            }));
        };

        let prev_vol = self.state.vol_initialized.then_some(self.state.vol_state);
        let resolution = self.vol.resolve(prev_vol, &reading, shock_active);
        let trend_state = apply_crush_veto(
            trend_reading.state,
            resolution.crush_override,
            resolution.shock_override,
        );
        let vol_state = resolution.state;
        let cell = cell_id(trend_state, vol_state);

        if cell != self.state.cell_id || !self.state.vol_initialized {
            tracing::info!(
                from_cell = self.state.cell_id,
                to_cell = cell,
                trend = trend_state.as_str(),
                vol = vol_state.as_str(),
                crush = resolution.crush_override,
                shock = resolution.shock_override,
                "Regime cell changed"
            );
        }
        tracing::debug!(
            z_score = reading.z_score,
            realized_vol = reading.realized_vol,
            t_norm = trend_reading.t_norm,
            trend_strength = filtered.trend_strength,
            "Bar classified"
        );

        self.state.vol_state = vol_state;
        self.state.vol_initialized = true;
        self.state.trend_state = trend_state;
        self.state.cell_id = cell;
        self.state.vol_crush_active = resolution.crush_override;
        self.state.last_z_score = Some(reading.z_score);
        self.state.last_t_norm = Some(trend_reading.t_norm);

        let preference = self.router.as_ref().map(|router| {
            let primary = closes_to_f64(&closes);
            let proxy = closes_to_f64(
                &self
                    .history
                    .get_closes(router.required_history(), &self.config.symbols.rate_proxy),
            );
            router.route(&primary, &proxy)
        });
        self.state.hedge_preference = preference;

        let overlay = if is_defensive(cell) {
            let budget = self.matrix.defensive_budget(trend_state, vol_state);
            self.route_overlay(budget, preference)
        } else {
            None
        };
        let target = self.matrix.allocate(trend_state, vol_state, overlay.as_ref());

        let history = &self.history;
        let rebalance = self.rebalancer.evaluate(&self.state.weights, &target, equity, |s| {
            history.latest_close(s)
        });
        if rebalance.needed {
            self.state.weights = rebalance
                .validated_target
                .iter()
                .filter(|(_, w)| **w > Decimal::ZERO)
                .map(|(s, w)| (s.clone(), *w))
                .collect();
        }

        self.state.tick_shock_timer();
        Ok(BarOutcome::Decided(Box::new(BarDecision {
            symbol: bar.symbol.clone(),
            timestamp: bar.timestamp,
            target,
            overlay,
            rebalance,
            snapshot: self.state.snapshot(),
        })))
    }

    /// Detect a shock on this bar and report whether the brake is engaged.
    fn update_shock_brake(&mut self, closes: &[f64]) -> bool {
        let Some(brake) = self.shock.as_ref() else {
            return false;
        };
        if let [.., prev, last] = closes {
            if brake.detect(*prev, *last) {
                tracing::warn!(
                    prev_close = *prev,
                    close = *last,
                    cooldown_days = brake.cooldown_days(),
                    "Shock brake armed"
                );
                self.state.shock_timer = Some(brake.cooldown_days());
            }
        }
        let active = self.state.shock_timer.is_some_and(|t| t > 0);
        self.state.shock_brake_active = Some(active);
        active
    }

    /// The shock timer still counts skipped bars.
    fn skip(&mut self, reason: SkipReason) -> BarOutcome {
        tracing::debug!(?reason, "Bar skipped");
        self.state.tick_shock_timer();
        BarOutcome::Skipped(reason)
    }

    fn route_overlay(
        &self,
        budget: Decimal,
        preference: Option<HedgePreference>,
    ) -> Option<OverlayAllocation> {
        if budget <= Decimal::ZERO {
            return None;
        }
        let use_commodity = match preference {
            Some(HedgePreference::Hard) => true,
            Some(HedgePreference::Paper) => false,
            None => self.treasury.is_none(),
        };
        let symbols = &self.config.symbols;
        if use_commodity {
            let overlay = self.commodity.as_ref()?;
            let depth = overlay.history_needed();
            let gold = self.history.get_closes(depth, &symbols.gold);
            let silver = overlay
                .silver_symbol()
                .map(|s| self.history.get_closes(depth, s))
                .unwrap_or_default();
            Some(overlay.allocate(budget, &gold, &silver))
        } else {
            let overlay = self.treasury.as_ref()?;
            let rates = self
                .history
                .get_closes(overlay.required_history(), &symbols.rate_proxy);
            Some(overlay.allocate(budget, &rates))
        }
    }
}
