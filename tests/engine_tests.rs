use chrono::{Duration, TimeZone, Utc};
use regime_allocator::allocation::OverlayKind;
use regime_allocator::config::Config;
use regime_allocator::engine::history_depth;
use regime_allocator::history::{InMemoryPriceHistory, PriceHistory};
use regime_allocator::model::bar::Bar;
use regime_allocator::model::rebalance::{ActionKind, CoercionReasonCode};
use regime_allocator::model::regime::{HedgePreference, TrendState, VolState};
use regime_allocator::{AllocationEngine, BarDecision, BarOutcome, EngineError, SkipReason};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const EQUITY: Decimal = dec!(100000);

fn test_config() -> Config {
    let mut config = Config::default();
    config.volatility.short_window = 3;
    config.volatility.baseline_window = 5;
    config.volatility.crush_lookback = 2;
    config.trend.sma_fast = 2;
    config.trend.sma_slow = 4;
    config.shock_brake.cooldown_days = 3;
    config.hedge.enabled = false;
    config.treasury.enabled = false;
    config.commodity.enabled = false;
    config
}

fn engine(config: Config) -> AllocationEngine<InMemoryPriceHistory> {
    let history = InMemoryPriceHistory::new(history_depth(&config));
    AllocationEngine::new(config, history).unwrap()
}

fn bar(symbol: &str, day: i64, close: Decimal) -> Bar {
    Bar {
        symbol: symbol.to_string(),
        timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 21, 0, 0).unwrap() + Duration::days(day),
        open: close,
        high: close + dec!(1),
        low: close - dec!(1),
        close,
        volume: dec!(1000000),
    }
}

fn decided(outcome: BarOutcome) -> BarDecision {
    match outcome {
        BarOutcome::Decided(d) => *d,
        other => panic!("expected a decision, got {:?}", other),
    }
}

#[test]
fn warmup_bars_are_skipped() {
    let mut e = engine(test_config());
    // baseline 5 + short 3 closes before the first reading.
    for day in 0..7 {
        let outcome = e.on_bar(&bar("QQQ", day, dec!(100)), EQUITY).unwrap();
        assert!(matches!(
            outcome,
            BarOutcome::Skipped(SkipReason::VolatilityWarmup { required: 8, .. })
        ));
    }
    let snap = e.snapshot();
    assert_eq!(snap.bars_processed, 7);
    assert!(snap.weights.is_empty());
    assert_eq!(snap.cell_id, 3);

    let d = decided(e.on_bar(&bar("QQQ", 7, dec!(100)), EQUITY).unwrap());
    assert_eq!(d.symbol, "QQQ");
    assert_eq!(d.snapshot.bars_processed, 8);
}

#[test]
fn flat_market_lands_in_side_low_and_opens_positions() {
    let mut e = engine(test_config());
    e.on_bar(&bar("TQQQ", 0, dec!(50)), EQUITY).unwrap();
    let mut last = None;
    for day in 0..8 {
        last = Some(e.on_bar(&bar("QQQ", day, dec!(100)), EQUITY).unwrap());
    }
    let d = decided(last.unwrap());

    assert_eq!(d.snapshot.trend_state, TrendState::Sideways);
    assert_eq!(d.snapshot.vol_state, VolState::Low);
    assert_eq!(d.snapshot.cell_id, 3);
    assert_eq!(d.target.weight("TQQQ"), dec!(0.2));
    assert_eq!(d.target.weight("QQQ"), dec!(0.8));
    assert_eq!(d.target.total(), Decimal::ONE);
    assert!(d.overlay.is_none());

    assert!(d.rebalance.needed);
    assert_eq!(d.rebalance.drift, Decimal::ONE);
    let actions: Vec<(&str, ActionKind)> = d
        .rebalance
        .ordered_actions
        .iter()
        .map(|a| (a.symbol.as_str(), a.kind))
        .collect();
    assert_eq!(
        actions,
        vec![("QQQ", ActionKind::Open), ("TQQQ", ActionKind::Open)]
    );
    assert_eq!(d.snapshot.weights.get("QQQ"), Some(&dec!(0.8)));
    assert_eq!(d.snapshot.weights.get("TQQQ"), Some(&dec!(0.2)));
    assert!(!d.snapshot.weights.contains_key("PSQ"));
    assert_eq!(d.snapshot.cash, Decimal::ZERO);

    // Same regime next bar: nothing to do.
    let next = decided(e.on_bar(&bar("QQQ", 8, dec!(100)), EQUITY).unwrap());
    assert!(!next.rebalance.needed);
    assert_eq!(next.rebalance.drift, Decimal::ZERO);
    assert_eq!(next.snapshot.weights, d.snapshot.weights);
}

#[test]
fn unpriced_instrument_is_coerced_and_not_held() {
    let mut e = engine(test_config());
    let mut last = None;
    for day in 0..8 {
        last = Some(e.on_bar(&bar("QQQ", day, dec!(100)), EQUITY).unwrap());
    }
    let d = decided(last.unwrap());
    assert_eq!(d.rebalance.coerced.len(), 1);
    assert_eq!(d.rebalance.coerced[0].symbol, "TQQQ");
    assert_eq!(
        d.rebalance.coerced[0].reason_code,
        CoercionReasonCode::NoPriceData
    );
    assert_eq!(d.snapshot.weights.len(), 1);
    assert_eq!(d.snapshot.weights.get("QQQ"), Some(&dec!(0.8)));
    assert_eq!(d.snapshot.cash, dec!(0.2));
}

#[test]
fn shock_timer_counts_down_through_warmup() {
    let mut e = engine(test_config());
    e.on_bar(&bar("QQQ", 0, dec!(100)), EQUITY).unwrap();
    assert_eq!(e.snapshot().shock_timer, Some(0));

    // -5% arms a 3-bar cooldown; this bar already counts as one.
    let outcome = e.on_bar(&bar("QQQ", 1, dec!(95)), EQUITY).unwrap();
    assert!(matches!(outcome, BarOutcome::Skipped(_)));
    let snap = e.snapshot();
    assert_eq!(snap.shock_timer, Some(2));
    assert_eq!(snap.shock_brake_active, Some(true));

    e.on_bar(&bar("QQQ", 2, dec!(95)), EQUITY).unwrap();
    assert_eq!(e.snapshot().shock_timer, Some(1));
    assert_eq!(e.snapshot().shock_brake_active, Some(true));

    e.on_bar(&bar("QQQ", 3, dec!(95)), EQUITY).unwrap();
    assert_eq!(e.snapshot().shock_timer, Some(0));
    assert_eq!(e.snapshot().shock_brake_active, Some(true));

    e.on_bar(&bar("QQQ", 4, dec!(95)), EQUITY).unwrap();
    assert_eq!(e.snapshot().shock_timer, Some(0));
    assert_eq!(e.snapshot().shock_brake_active, Some(false));
}

#[test]
fn shock_forces_high_vol_on_decision_bars() {
    let mut e = engine(test_config());
    e.on_bar(&bar("TQQQ", 0, dec!(50)), EQUITY).unwrap();
    for day in 0..8 {
        e.on_bar(&bar("QQQ", day, dec!(100)), EQUITY).unwrap();
    }
    let d = decided(e.on_bar(&bar("QQQ", 8, dec!(90)), EQUITY).unwrap());
    assert_eq!(d.snapshot.vol_state, VolState::High);
    assert_eq!(d.snapshot.shock_brake_active, Some(true));
    assert_eq!(d.snapshot.shock_timer, Some(2));
    assert!(!d.snapshot.vol_crush_active);
}

#[test]
fn disabled_shock_brake_reports_none() {
    let mut config = test_config();
    config.shock_brake.enabled = false;
    let mut e = engine(config);
    e.on_bar(&bar("QQQ", 0, dec!(100)), EQUITY).unwrap();
    e.on_bar(&bar("QQQ", 1, dec!(80)), EQUITY).unwrap();
    let snap = e.snapshot();
    assert_eq!(snap.shock_timer, None);
    assert_eq!(snap.shock_brake_active, None);
}

#[test]
fn non_signal_bars_are_only_recorded() {
    let mut e = engine(test_config());
    let outcome = e.on_bar(&bar("PSQ", 0, dec!(12)), EQUITY).unwrap();
    assert!(matches!(outcome, BarOutcome::Recorded));
    assert_eq!(e.snapshot().bars_processed, 0);
    assert_eq!(e.history().latest_close("PSQ"), Some(dec!(12)));
}

#[test]
fn unknown_symbol_is_rejected_without_side_effects() {
    let mut e = engine(test_config());
    let before = e.snapshot();
    let err = e.on_bar(&bar("GLD", 0, dec!(180)), EQUITY).unwrap_err();
    assert!(matches!(err, EngineError::UnknownSymbol(ref s) if s == "GLD"));
    assert_eq!(e.snapshot(), before);
    assert_eq!(e.history().latest_close("GLD"), None);
}

#[test]
fn universe_follows_enabled_overlays() {
    let e = engine(test_config());
    let universe: Vec<&str> = e.universe().collect();
    assert_eq!(universe, vec!["PSQ", "QQQ", "TQQQ"]);

    let full = engine(Config::default());
    let universe: Vec<&str> = full.universe().collect();
    for symbol in ["GLD", "SLV", "TLT", "TMF", "TMV"] {
        assert!(universe.contains(&symbol), "missing {}", symbol);
    }
}

#[test]
fn invalid_config_is_rejected() {
    let mut config = test_config();
    config.trend.sma_fast = 10;
    config.trend.sma_slow = 5;
    let history = InMemoryPriceHistory::new(16);
    assert!(AllocationEngine::new(config, history).is_err());
}

#[test]
fn repeated_or_stale_signal_bar_is_rejected() {
    let mut e = engine(test_config());
    for day in 0..10 {
        e.on_bar(&bar("QQQ", day, dec!(100)), EQUITY).unwrap();
    }
    e.on_bar(&bar("QQQ", 10, dec!(90)), EQUITY).unwrap();
    let before = e.snapshot();
    assert_eq!(before.shock_timer, Some(2));

    let dup = e.on_bar(&bar("QQQ", 10, dec!(90)), EQUITY).unwrap_err();
    assert!(matches!(dup, EngineError::OutOfOrder { ref symbol, .. } if symbol == "QQQ"));
    let stale = e.on_bar(&bar("QQQ", 3, dec!(100)), EQUITY).unwrap_err();
    assert!(matches!(stale, EngineError::OutOfOrder { .. }));

    assert_eq!(e.snapshot(), before);
    assert_eq!(e.history().get_closes(100, "QQQ").len(), 11);
}

#[test]
fn stale_non_signal_bar_is_rejected_per_symbol() {
    let mut e = engine(test_config());
    e.on_bar(&bar("PSQ", 5, dec!(12)), EQUITY).unwrap();
    // Another symbol on an earlier day is still fine.
    e.on_bar(&bar("QQQ", 1, dec!(100)), EQUITY).unwrap();

    let err = e.on_bar(&bar("PSQ", 5, dec!(13)), EQUITY).unwrap_err();
    assert!(matches!(err, EngineError::OutOfOrder { ref symbol, .. } if symbol == "PSQ"));
    assert_eq!(e.history().latest_close("PSQ"), Some(dec!(12)));

    e.on_bar(&bar("PSQ", 6, dec!(13)), EQUITY).unwrap();
    assert_eq!(e.history().latest_close("PSQ"), Some(dec!(13)));
}

fn routing_config(hedge: bool, treasury: bool, commodity: bool) -> Config {
    let mut config = test_config();
    config.hedge.enabled = hedge;
    config.hedge.correlation_lookback = 5;
    config.treasury.enabled = treasury;
    config.treasury.bond_sma_fast = 2;
    config.treasury.bond_sma_slow = 4;
    config.commodity.enabled = commodity;
    config.commodity.gold_sma_window = 3;
    config.commodity.silver_enabled = false;
    config
}

/// Feed one day: every listed non-signal close that belongs to the universe,
/// then the signal close.
fn feed_day(
    e: &mut AllocationEngine<InMemoryPriceHistory>,
    day: i64,
    others: &[(&str, Decimal)],
    signal: Decimal,
) -> BarOutcome {
    for (symbol, close) in others {
        if e.universe().any(|s| s == *symbol) {
            e.on_bar(&bar(symbol, day, *close), EQUITY).unwrap();
        }
    }
    e.on_bar(&bar("QQQ", day, signal), EQUITY).unwrap()
}

/// Eight flat days, then a 10% drop that forces Sideways/High (cell 4).
/// `tlt_on_shock` is the rates-proxy close on the drop day.
fn run_into_side_high(config: Config, tlt_rising: bool, tlt_on_shock: Decimal) -> BarDecision {
    let mut e = engine(config);
    for day in 0..8 {
        let tlt = if tlt_rising {
            dec!(100) + Decimal::from(day)
        } else {
            dec!(100)
        };
        let gld = dec!(100) + Decimal::from(day);
        let d = decided_or_skip(feed_day(
            &mut e,
            day,
            &[("TLT", tlt), ("GLD", gld), ("TQQQ", dec!(50))],
            dec!(100),
        ));
        if let Some(d) = d {
            // Flat market sits in Side/Low, which never draws an overlay.
            assert_eq!(d.snapshot.cell_id, 3);
            assert!(d.overlay.is_none());
            assert_eq!(d.target.weight("TMF"), Decimal::ZERO);
            assert_eq!(d.target.weight("GLD"), Decimal::ZERO);
        }
    }
    let d = decided(feed_day(
        &mut e,
        8,
        &[("TLT", tlt_on_shock), ("GLD", dec!(108))],
        dec!(90),
    ));
    assert_eq!(d.snapshot.cell_id, 4);
    assert_eq!(d.target.total(), Decimal::ONE);
    d
}

fn decided_or_skip(outcome: BarOutcome) -> Option<BarDecision> {
    match outcome {
        BarOutcome::Decided(d) => Some(*d),
        _ => None,
    }
}

#[test]
fn without_router_defensive_cell_uses_treasury() {
    let d = run_into_side_high(routing_config(false, true, true), true, dec!(108));
    let overlay = d.overlay.expect("treasury overlay");
    assert_eq!(overlay.kind, OverlayKind::Treasury);
    assert_eq!(overlay.legs, vec![("TMF".to_string(), dec!(0.4))]);
    assert_eq!(d.target.weight("TMF"), dec!(0.4));
    assert_eq!(d.target.cash(), dec!(0.6));
    assert_eq!(d.snapshot.hedge_preference, None);
}

#[test]
fn without_router_or_treasury_defensive_cell_uses_commodity() {
    let d = run_into_side_high(routing_config(false, false, true), true, dec!(108));
    let overlay = d.overlay.expect("commodity overlay");
    assert_eq!(overlay.kind, OverlayKind::Commodity);
    assert_eq!(d.target.weight("GLD"), dec!(0.6));
    assert_eq!(d.target.cash(), dec!(0.4));
}

#[test]
fn without_any_overlay_defensive_cell_is_cash() {
    let d = run_into_side_high(routing_config(false, false, false), true, dec!(108));
    assert!(d.overlay.is_none());
    assert_eq!(d.target.cash(), Decimal::ONE);
}

#[test]
fn co_moving_rates_route_to_commodity() {
    // TLT drops with QQQ: correlation 1, hard assets preferred.
    let d = run_into_side_high(routing_config(true, true, true), false, dec!(90));
    assert_eq!(d.snapshot.hedge_preference, Some(HedgePreference::Hard));
    let overlay = d.overlay.expect("commodity overlay");
    assert_eq!(overlay.kind, OverlayKind::Commodity);
    assert_eq!(d.target.weight("GLD"), dec!(0.6));
    assert_eq!(d.target.weight("TMF"), Decimal::ZERO);
    assert_eq!(d.target.cash(), dec!(0.4));
}

#[test]
fn offsetting_rates_route_to_treasury() {
    // TLT rallies as QQQ drops: correlation -1, bonds preferred.
    let d = run_into_side_high(routing_config(true, true, true), false, dec!(105));
    assert_eq!(d.snapshot.hedge_preference, Some(HedgePreference::Paper));
    let overlay = d.overlay.expect("treasury overlay");
    assert_eq!(overlay.kind, OverlayKind::Treasury);
    assert_eq!(d.target.weight("TMF"), dec!(0.4));
    assert_eq!(d.target.weight("GLD"), Decimal::ZERO);
    assert_eq!(d.target.cash(), dec!(0.6));
}

#[test]
fn preferred_overlay_disabled_leaves_cash() {
    let d = run_into_side_high(routing_config(true, true, false), false, dec!(90));
    assert_eq!(d.snapshot.hedge_preference, Some(HedgePreference::Hard));
    assert!(d.overlay.is_none());
    assert_eq!(d.target.cash(), Decimal::ONE);
}

#[test]
fn bear_high_splits_inverse_hedge_and_bonds() {
    let mut e = engine(routing_config(false, true, false));
    let mut close = dec!(200);
    for day in 0..30 {
        feed_day(&mut e, day, &[("TLT", dec!(100) + Decimal::from(day))], close);
        close -= dec!(1);
    }
    // Last close was 171; a 10% drop arms the shock brake.
    let d = decided(feed_day(&mut e, 30, &[("TLT", dec!(130))], dec!(153.9)));
    assert_eq!(d.snapshot.trend_state, TrendState::BearStrong);
    assert_eq!(d.snapshot.vol_state, VolState::High);
    assert_eq!(d.snapshot.cell_id, 6);
    assert_eq!(d.overlay.as_ref().map(|o| o.kind), Some(OverlayKind::Treasury));
    assert_eq!(d.target.weight("PSQ"), dec!(0.5));
    assert_eq!(d.target.weight("TMF"), dec!(0.2));
    assert_eq!(d.target.cash(), dec!(0.3));
    assert_eq!(d.target.total(), Decimal::ONE);
}

#[test]
fn vol_crush_vetoes_bearish_label() {
    let mut e = engine(test_config());
    let mut close = dec!(200);
    e.on_bar(&bar("QQQ", 0, close), EQUITY).unwrap();
    // Choppy decline, then three calm one-point steps.
    for day in 1..30 {
        close -= if day % 2 == 1 { dec!(2.5) } else { dec!(0.5) };
        e.on_bar(&bar("QQQ", day, close), EQUITY).unwrap();
    }
    let mut last = None;
    for day in 30..33 {
        close -= dec!(1);
        last = Some(e.on_bar(&bar("QQQ", day, close), EQUITY).unwrap());
    }
    let d = decided(last.unwrap());
    assert!(d.snapshot.t_norm.unwrap() < -0.3);
    assert!(d.snapshot.vol_crush_active);
    assert_eq!(d.snapshot.vol_state, VolState::Low);
    assert_eq!(d.snapshot.trend_state, TrendState::Sideways);
    assert_eq!(d.snapshot.cell_id, 3);
}
