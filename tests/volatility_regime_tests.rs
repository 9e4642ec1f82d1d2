use regime_allocator::config::{ShockBrakeConfig, VolatilityConfig};
use regime_allocator::model::regime::VolState;
use regime_allocator::regime::{ShockBrake, VolReading, VolatilityRegimeClassifier};
use regime_allocator::EngineError;

fn classifier() -> VolatilityRegimeClassifier {
    VolatilityRegimeClassifier::new(&VolatilityConfig {
        short_window: 5,
        baseline_window: 20,
        crush_lookback: 2,
        ..VolatilityConfig::default()
    })
    .unwrap()
}

fn reading(z_score: f64, vol_crush: bool) -> VolReading {
    VolReading {
        realized_vol: 0.2,
        z_score,
        vol_change: Some(if vol_crush { -0.5 } else { 0.0 }),
        vol_crush,
    }
}

#[test]
fn needs_baseline_plus_short_window() {
    let c = classifier();
    assert_eq!(c.required_history(), 25);
    let closes = vec![100.0; 24];
    assert!(c.measure(&closes).is_none());
    assert!(c.measure(&[100.0; 25]).is_some());
}

#[test]
fn flat_prices_read_zero() {
    let r = classifier().measure(&[100.0; 40]).unwrap();
    assert_eq!(r.realized_vol, 0.0);
    assert_eq!(r.z_score, 0.0);
    assert!(!r.vol_crush);
}

#[test]
fn deadband_never_changes_state() {
    let c = classifier();
    for z in [0.2, 0.5, 0.99, 1.0] {
        assert_eq!(c.next_state(Some(VolState::Low), z), VolState::Low);
        assert_eq!(c.next_state(Some(VolState::High), z), VolState::High);
    }
    assert_eq!(c.next_state(Some(VolState::Low), 1.01), VolState::High);
    assert_eq!(c.next_state(Some(VolState::High), 0.19), VolState::Low);
}

#[test]
fn crush_forces_low() {
    let c = classifier();
    let res = c.resolve(Some(VolState::High), &reading(2.5, true), false);
    assert_eq!(res.state, VolState::Low);
    assert!(res.crush_override);
    assert!(!res.shock_override);
}

#[test]
fn shock_wins_over_crush() {
    let c = classifier();
    let res = c.resolve(Some(VolState::Low), &reading(-3.0, true), true);
    assert_eq!(res.state, VolState::High);
    assert!(res.shock_override);
    assert!(!res.crush_override);
}

#[test]
fn detects_crush_after_calm_tail() {
    // Alternating 5% swings, then the last five returns are flat.
    let mut closes: Vec<f64> = (0..20)
        .map(|i| if i % 2 == 0 { 100.0 } else { 105.0 })
        .collect();
    closes.extend(std::iter::repeat(105.0).take(5));
    let r = classifier().measure(&closes).unwrap();
    assert_eq!(r.realized_vol, 0.0);
    assert!(r.vol_change.unwrap() < -0.15);
    assert!(r.vol_crush);
    assert!(r.z_score < 0.0);
}

#[test]
fn rejects_inverted_thresholds() {
    let cfg = VolatilityConfig {
        upper_threshold_z: 0.1,
        lower_threshold_z: 0.2,
        ..VolatilityConfig::default()
    };
    assert!(matches!(
        VolatilityRegimeClassifier::new(&cfg),
        Err(EngineError::InvalidParameter {
            name: "volatility.upper_threshold_z",
            ..
        })
    ));
    let cfg = VolatilityConfig {
        crush_threshold: 0.1,
        ..VolatilityConfig::default()
    };
    assert!(VolatilityRegimeClassifier::new(&cfg).is_err());
}

#[test]
fn shock_brake_down_only() {
    let brake = ShockBrake::new(&ShockBrakeConfig::default()).unwrap();
    assert!(brake.detect(100.0, 96.0));
    assert!(!brake.detect(100.0, 97.5));
    assert!(!brake.detect(100.0, 110.0));
    assert_eq!(brake.cooldown_days(), 5);
}

#[test]
fn shock_brake_rejects_zero_cooldown() {
    let cfg = ShockBrakeConfig {
        cooldown_days: 0,
        ..ShockBrakeConfig::default()
    };
    assert!(ShockBrake::new(&cfg).is_err());
}
